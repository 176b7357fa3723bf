//! Opcodes and fixed protocol constants.
//!
//! Every participant (master, worker, neighbor links) reads its opcodes from
//! here.

use std::fmt;

use crate::error::{Error, Result};

/// Default TCP port for the master listener and each worker's left-neighbor
/// listener.
pub const DEFAULT_PORT: u16 = 9876;

/// Size of the length prefix.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Size of the opcode field.
pub const OPCODE_FIELD_LEN: usize = 4;

/// Largest payload accepted from the wire (a few very tall columns fit easily).
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Payload carried by opcodes that have nothing to say, so that they are never
/// mistaken for a zero-length keepalive.
pub const FILLER_PAYLOAD: &[u8] = &[1];

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Opcode {
    /// Master to worker: fragment position, neighbors and run parameters.
    Metadata = 50,
    /// Master to worker: begin the frame loop.
    Start = 51,
    /// Worker to master: one frame finished.
    FrameMark = 53,
    /// Worker to master: all frames finished.
    Done = 54,
    /// Neighbor link: local step time in nanoseconds.
    Time = 99,
    /// Neighbor link: initiator asks the responder for a slice.
    Request = 100,
    /// Neighbor link: two boundary columns.
    Data = 101,
    /// Neighbor link: slice received.
    Ack = 102,
}

impl Opcode {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            50 => Ok(Self::Metadata),
            51 => Ok(Self::Start),
            53 => Ok(Self::FrameMark),
            54 => Ok(Self::Done),
            99 => Ok(Self::Time),
            100 => Ok(Self::Request),
            101 => Ok(Self::Data),
            102 => Ok(Self::Ack),
            other => Err(Error::UnknownOpcode(other)),
        }
    }
}

impl TryFrom<i32> for Opcode {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        Self::from_code(code)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Metadata => "METADATA",
            Self::Start => "START",
            Self::FrameMark => "FRAMEMARK",
            Self::Done => "DONE",
            Self::Time => "TIME",
            Self::Request => "REQUEST",
            Self::Data => "DATA",
            Self::Ack => "ACK",
        };
        write!(f, "{}({})", name, self.code())
    }
}
