//! Error types for petri-transfer.

use std::net::SocketAddr;

use thiserror::Error;

use crate::types::Side;

/// Result type for petri-transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while establishing or running a neighbor link.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire-level failure, including protocol violations.
    #[error("protocol error: {0}")]
    Protocol(#[from] petri_protocols::Error),

    /// Socket setup failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Every dial attempt failed.
    #[error("could not connect to {addr} after {attempts} attempts: {source}")]
    ConnectExhausted {
        addr: SocketAddr,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// The neighbor went away mid-run.
    #[error("{side} neighbor link closed")]
    LinkClosed { side: Side },

    /// The fragment has no slice left to give.
    #[error("fragment of width {width} is too narrow to exchange a slice")]
    FragmentTooNarrow { width: usize },

    /// `start_transaction` called before the previous one resolved.
    #[error("a transaction is already in flight")]
    TransactionInFlight,

    /// `wait_for_transaction` called without a matching start.
    #[error("no transaction in flight")]
    NoTransaction,

    #[error("automaton error: {0}")]
    Automaton(#[from] petri_automaton::Error),
}

impl Error {
    /// The state machine rejected a message.
    pub(crate) fn violation(state: impl std::fmt::Display, opcode: petri_protocols::Opcode) -> Self {
        Self::Protocol(petri_protocols::Error::UnexpectedOpcode {
            state: state.to_string(),
            opcode: opcode.code(),
        })
    }
}
