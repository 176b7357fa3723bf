//! Petri Node - master and worker for the distributed simulation
//!
//! A Petri cluster is one master and `N` workers. Each worker owns a vertical
//! fragment of the grid and exchanges border columns with its neighbors
//! after every step; the master only bootstraps the chain and tracks
//! progress.
//!
//! ```text
//!                 master (Cluster)
//!            METADATA/START |  ^ FRAMEMARK/DONE
//!        +-----------------+--+---------------+
//!        v                 v                  v
//!   worker 0  <------>  worker 1  <------>  worker 2
//!          dial    accept      dial    accept
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use petri_node::{Cluster, ClusterConfig};
//!
//! let cluster = Cluster::bind(ClusterConfig::from_env()?).await?;
//! let report = cluster.run().await?;
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod render;
pub mod worker;

pub use cluster::{metadata_for, Cluster, ClusterReport, WorkerState, WorkerSummary};
pub use config::{ClusterConfig, WorkerConfig};
pub use error::{Error, Result};
pub use render::{LogRenderer, NullRenderer, Renderer};
pub use worker::{Worker, WorkerReport};
