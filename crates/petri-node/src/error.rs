//! Error types for petri-node.

use std::net::SocketAddr;

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end a master or worker run.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire error on the control channel
    #[error("Protocol error: {0}")]
    Protocol(#[from] petri_protocols::Error),

    /// Neighbor link or connection setup failed
    #[error("Transfer error: {0}")]
    Transfer(#[from] petri_transfer::Error),

    /// Fragment construction or update failed
    #[error("Automaton error: {0}")]
    Automaton(#[from] petri_automaton::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// START arrived before METADATA
    #[error("Simulation started before metadata was received")]
    NotInitialized,

    /// Neighbor addresses travel as IPv4 on the wire
    #[error("Worker address {0} is not IPv4")]
    UnsupportedAddress(SocketAddr),

    /// Bad configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A simulation or handler task panicked or was cancelled
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
