//! Border exchange after each step.
//!
//! Neighboring fragments overlap by two columns: a fragment's last interior
//! column is its right neighbor's left halo and vice versa. After every step
//! the halos are stale and must be refreshed from the neighbor.
//!
//! - **Fixed**: one column each way per link, widths never change.
//! - **Balancing**: every link runs one transaction. The slower side hands
//!   its two boundary-adjacent interior columns to the faster side, which
//!   puts them in place of its halo. Both sides drop their old halo, so the
//!   loser shrinks by one column and the winner grows by one.

use std::net::{IpAddr, SocketAddr};

use petri_automaton::{Cell, Grid, MIN_FRAGMENT_WIDTH};

use crate::error::{Error, Result};
use crate::link::{BalancingLink, FixedLink};
use crate::transport::{accept_one, dial_with_retry, RetryPolicy};
use crate::types::{Outcome, Side, Slice, MIN_BALANCING_WIDTH};

/// Grid to install after an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchanged {
    pub grid: Grid,
    /// Change to the fragment's global x offset.
    pub x_shift: i64,
}

/// Where a fragment's links come from.
#[derive(Debug, Clone)]
pub struct LinkPlan {
    pub balancing: bool,
    pub height: usize,
    /// Listen here for the left neighbor.
    pub left_listen: Option<SocketAddr>,
    /// Dial the right neighbor here.
    pub right_dial: Option<SocketAddr>,
    pub retry: RetryPolicy,
    /// Source address for outgoing connections.
    pub bind_ip: Option<IpAddr>,
}

/// A fragment's links to its neighbors, under one strategy.
pub enum BorderExchange {
    Fixed {
        left: Option<FixedLink>,
        right: Option<FixedLink>,
    },
    Balancing {
        left: Option<BalancingLink>,
        right: Option<BalancingLink>,
    },
}

impl BorderExchange {
    /// Accept the left neighbor, then dial the right one.
    ///
    /// The order matters: the leftmost fragment only dials, so accepting first
    /// lets a chain come up from left to right.
    pub async fn establish(plan: &LinkPlan) -> Result<Self> {
        let left = match plan.left_listen {
            Some(addr) => {
                let (stream, peer) = accept_one(addr).await?;
                tracing::info!(%peer, "Left neighbor connected");
                Some(stream)
            }
            None => None,
        };
        let right = match plan.right_dial {
            Some(addr) => {
                let stream = dial_with_retry(addr, &plan.retry, plan.bind_ip).await?;
                tracing::info!(%addr, "Connected to right neighbor");
                Some(stream)
            }
            None => None,
        };

        let height = plan.height;
        Ok(if plan.balancing {
            Self::Balancing {
                left: left.map(|s| BalancingLink::new(Side::Left, s, height)),
                right: right.map(|s| BalancingLink::new(Side::Right, s, height)),
            }
        } else {
            Self::Fixed {
                left: left.map(|s| FixedLink::new(Side::Left, s, height)),
                right: right.map(|s| FixedLink::new(Side::Right, s, height)),
            }
        })
    }

    /// A fragment with no neighbors.
    pub fn standalone() -> Self {
        Self::Fixed {
            left: None,
            right: None,
        }
    }

    pub fn is_balancing(&self) -> bool {
        matches!(self, Self::Balancing { .. })
    }

    /// Refresh the halos of `grid` from the neighbors.
    ///
    /// `step_nanos` is the wall-clock cost of the step just taken. Only the
    /// balancing strategy uses it.
    pub async fn exchange(&mut self, grid: &Grid, step_nanos: u64) -> Result<Exchanged> {
        match self {
            Self::Fixed { left, right } => exchange_fixed(grid, left, right).await,
            Self::Balancing { left, right } => {
                exchange_balancing(grid, step_nanos, left, right).await
            }
        }
    }

    /// Close every link.
    pub async fn close(self) -> Result<()> {
        match self {
            Self::Fixed { left, right } => {
                for link in [left, right].into_iter().flatten() {
                    link.close().await?;
                }
            }
            Self::Balancing { left, right } => {
                for link in [left, right].into_iter().flatten() {
                    link.close().await?;
                }
            }
        }
        Ok(())
    }
}

async fn exchange_fixed(
    grid: &Grid,
    left: &mut Option<FixedLink>,
    right: &mut Option<FixedLink>,
) -> Result<Exchanged> {
    let width = grid.width();
    if width < MIN_FRAGMENT_WIDTH {
        return Err(Error::FragmentTooNarrow { width });
    }

    if let Some(link) = left.as_mut() {
        link.send_column(grid.column(1)).await?;
    }
    if let Some(link) = right.as_mut() {
        link.send_column(grid.column(width - 2)).await?;
    }

    let mut updated = grid.clone();
    if let Some(link) = left.as_mut() {
        let halo = link.recv_column().await?;
        updated.replace_column(0, &halo)?;
    }
    if let Some(link) = right.as_mut() {
        let halo = link.recv_column().await?;
        updated.replace_column(width - 1, &halo)?;
    }

    Ok(Exchanged {
        grid: updated,
        x_shift: 0,
    })
}

async fn exchange_balancing(
    grid: &Grid,
    step_nanos: u64,
    left: &mut Option<BalancingLink>,
    right: &mut Option<BalancingLink>,
) -> Result<Exchanged> {
    // Above the floor a fragment must never tie with one at the floor.
    let reported = if grid.width() <= MIN_BALANCING_WIDTH {
        0
    } else {
        step_nanos.max(1)
    };

    if let Some(link) = left.as_mut() {
        link.start_transaction(Slice::from_grid(grid, Side::Left)?, reported)
            .await?;
    }
    if let Some(link) = right.as_mut() {
        link.start_transaction(Slice::from_grid(grid, Side::Right)?, reported)
            .await?;
    }

    let left_outcome = match left.as_mut() {
        Some(link) => Some(link.wait_for_transaction().await?),
        None => None,
    };
    let right_outcome = match right.as_mut() {
        Some(link) => Some(link.wait_for_transaction().await?),
        None => None,
    };

    let exchanged = rebuild(grid, left_outcome.as_ref(), right_outcome.as_ref())?;
    tracing::trace!(
        from = grid.width(),
        to = exchanged.grid.width(),
        x_shift = exchanged.x_shift,
        "Rebuilt fragment"
    );
    Ok(exchanged)
}

/// Assemble the next grid from the old one and each link's outcome.
///
/// A link's halo column is always dropped; a gained slice takes its place.
pub fn rebuild(grid: &Grid, left: Option<&Outcome>, right: Option<&Outcome>) -> Result<Exchanged> {
    let width = grid.width();
    let start = usize::from(left.is_some());
    let end = if right.is_some() { width - 1 } else { width };
    if end <= start {
        return Err(Error::FragmentTooNarrow { width });
    }

    let mut columns: Vec<&[Cell]> = Vec::with_capacity(width + 2);
    if let Some(Outcome::Gained(slice)) = left {
        columns.extend(slice.columns());
    }
    columns.extend(grid.columns().skip(start).take(end - start));
    if let Some(Outcome::Gained(slice)) = right {
        columns.extend(slice.columns());
    }

    if columns.len() < MIN_FRAGMENT_WIDTH {
        return Err(Error::FragmentTooNarrow { width });
    }

    let x_shift = match left {
        Some(Outcome::Gained(_)) => -1,
        Some(Outcome::Lost) => 1,
        None => 0,
    };

    Ok(Exchanged {
        grid: Grid::from_columns(grid.height(), columns)?,
        x_shift,
    })
}
