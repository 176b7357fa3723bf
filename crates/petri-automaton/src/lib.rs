//! Petri Automaton
//!
//! Bacteria cellular automaton for one vertical fragment of the shared grid.
//!
//! # Cell Encoding
//!
//! Every cell is a signed byte:
//! - `-128` is empty space, no organism
//! - `-127` is a freshly spawned organism with minimum mass
//! - `127` is an organism at full mass
//!
//! # Simultaneous Update
//!
//! A [`Fragment`] keeps two grids of identical size. Each [`Fragment::step`]
//! snapshots the mutable grid into the read grid and computes every interior
//! cell from the snapshot only, so update order never matters. The outermost
//! ring of cells is a halo: it is never written by `step` and is refreshed by
//! the border exchange between neighboring fragments.

mod error;
mod fragment;
mod grid;
mod hooks;

pub use error::{Error, Result};
pub use fragment::Fragment;
pub use grid::{Cell, Grid, Population};
pub use hooks::{ConstantFood, FoodField, HashWork, NoCost, StepCost, DEFAULT_FOOD};

/// Empty space, no organism.
pub const EMPTY: Cell = -128;

/// Organism with the minimum possible mass.
pub const NEW_ORGANISM: Cell = -127;

/// Organism at full mass.
pub const MAX_MASS: Cell = 127;

/// Mass above which an organism seeds its empty neighbors.
pub const SPLIT_SIZE: i32 = 100;

/// Mass handed to (or paid for) each spawned neighbor.
pub const SPLIT_RATE: i32 = 30;

/// Base hunger paid by every organism each step.
pub const HUNGER_RATE: f64 = 10.0;

/// Extra hunger per occupied neighbor.
pub const NEIGHBOR_HUNGER_FACTOR: f64 = 1.7;

/// Scales the food field into a per-step mass gain.
pub const EAT_RATE_MULTIPLIER: f64 = 0.1;

/// Smallest fragment that still has an interior column between its halos.
pub const MIN_FRAGMENT_WIDTH: usize = 3;

// A spawn from all eight neighbors must still fit in a cell.
const _: () = assert!(NEW_ORGANISM as i32 + 8 * SPLIT_RATE <= MAX_MASS as i32);
