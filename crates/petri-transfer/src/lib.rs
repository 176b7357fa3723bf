//! Petri Transfer - border exchange between neighboring fragments
//!
//! This crate provides:
//! - TCP dial/accept with bounded retry for neighbor and master connections
//! - The balancing transaction state machines (initiator and responder)
//! - Per-neighbor link tasks for the fixed and balancing strategies
//! - [`BorderExchange`], which refreshes a fragment's halos after each step
//!
//! # Roles
//!
//! Links are asymmetric by adjacency, not by speed. A fragment accepts its
//! left neighbor and runs the responder on that link; it dials its right
//! neighbor and runs the initiator there.
//!
//! # Example
//!
//! ```rust,ignore
//! use petri_transfer::{BorderExchange, LinkPlan, RetryPolicy};
//!
//! let mut exchange = BorderExchange::establish(&LinkPlan {
//!     balancing: true,
//!     height: 400,
//!     left_listen: Some("0.0.0.0:9876".parse()?),
//!     right_dial: Some("10.0.0.12:9876".parse()?),
//!     retry: RetryPolicy::default(),
//!     bind_ip: None,
//! })
//! .await?;
//!
//! fragment.step();
//! let exchanged = exchange.exchange(fragment.grid(), step_nanos).await?;
//! fragment.replace_grid(exchanged.grid, exchanged.x_shift)?;
//! ```

pub mod error;
pub mod exchange;
pub mod link;
pub mod machine;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use exchange::{rebuild, BorderExchange, Exchanged, LinkPlan};
pub use link::{BalancingLink, FixedLink};
pub use machine::{
    Action, Initiator, InitiatorState, Responder, ResponderState, TransactionMachine,
};
pub use transport::{accept_one, bind_listener, dial_with_retry, RetryPolicy};
pub use types::{Outcome, Role, Side, Slice, MIN_BALANCING_WIDTH, SLICE_COLUMNS};
