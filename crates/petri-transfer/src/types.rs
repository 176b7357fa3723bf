//! Core types shared by both exchange strategies.

use std::fmt;

use bytes::Bytes;
use petri_automaton::{Cell, Grid};

use crate::error::{Error, Result};

/// Number of columns moved by one boundary migration.
pub const SLICE_COLUMNS: usize = 2;

/// Fragments at or below this width report a zero step time, so they are
/// never picked to shed a slice while their neighbor is wider.
pub const MIN_BALANCING_WIDTH: usize = petri_protocols::MIN_BALANCING_WIDTH as usize;

/// Which neighbor a link talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The balancing role this end plays. Left links are accepted and
    /// respond, right links are dialed and initiate.
    pub fn role(self) -> Role {
        match self {
            Self::Left => Role::Responder,
            Self::Right => Role::Initiator,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// Asymmetric role in the balancing exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Responder => write!(f, "responder"),
        }
    }
}

/// Two adjacent columns, in global left-to-right order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    height: usize,
    cells: Vec<Cell>,
}

impl Slice {
    /// The two interior columns next to the `side` halo.
    ///
    /// Left takes columns `1, 2`; right takes `width - 3, width - 2`.
    pub fn from_grid(grid: &Grid, side: Side) -> Result<Self> {
        let width = grid.width();
        if width < SLICE_COLUMNS + 2 {
            return Err(Error::FragmentTooNarrow { width });
        }
        let first = match side {
            Side::Left => 1,
            Side::Right => width - 1 - SLICE_COLUMNS,
        };
        let mut cells = Vec::with_capacity(SLICE_COLUMNS * grid.height());
        for x in first..first + SLICE_COLUMNS {
            cells.extend_from_slice(grid.column(x));
        }
        Ok(Self {
            height: grid.height(),
            cells,
        })
    }

    /// Parse a `DATA` payload.
    pub fn from_bytes(height: usize, payload: &[u8]) -> Result<Self> {
        let expected = SLICE_COLUMNS * height;
        if payload.len() != expected {
            return Err(petri_protocols::Error::MalformedPayload {
                what: "slice",
                expected,
                actual: payload.len(),
            }
            .into());
        }
        Ok(Self {
            height,
            cells: payload.iter().map(|&b| b as Cell).collect(),
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        self.cells.iter().map(|&c| c as u8).collect()
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn columns(&self) -> impl Iterator<Item = &[Cell]> + '_ {
        self.cells.chunks_exact(self.height)
    }
}

/// How one balancing transaction resolved for this end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The neighbor gave up a slice; it replaces our halo column.
    Gained(Slice),
    /// We gave our slice away and drop our halo column.
    Lost,
}

impl Outcome {
    pub fn width_delta(&self) -> isize {
        match self {
            Self::Gained(_) => 1,
            Self::Lost => -1,
        }
    }
}
