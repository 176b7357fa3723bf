//! Typed views of frames.
//!
//! [`ControlMessage`] travels between master and worker, [`ExchangeMessage`]
//! between neighboring workers in the balancing exchange.

use bytes::Bytes;

use crate::codec::Frame;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::opcode::Opcode;

/// Master <-> worker messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Metadata(Metadata),
    Start,
    FrameMark,
    Done,
}

impl ControlMessage {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Metadata(_) => Opcode::Metadata,
            Self::Start => Opcode::Start,
            Self::FrameMark => Opcode::FrameMark,
            Self::Done => Opcode::Done,
        }
    }

    /// Encode, validating metadata first.
    pub fn to_frame(&self) -> Result<Frame> {
        match self {
            Self::Metadata(metadata) => Ok(Frame::new(Opcode::Metadata, metadata.encode()?)),
            other => Ok(Frame::signal(other.opcode())),
        }
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        match frame.kind()? {
            Opcode::Metadata => Ok(Self::Metadata(Metadata::decode(&frame.payload)?)),
            Opcode::Start => Ok(Self::Start),
            Opcode::FrameMark => Ok(Self::FrameMark),
            Opcode::Done => Ok(Self::Done),
            other => Err(Error::UnexpectedOpcode {
                state: "control channel".to_string(),
                opcode: other.code(),
            }),
        }
    }
}

/// Balancing-exchange messages between neighboring workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeMessage {
    /// Wall-clock nanoseconds the sender spent on its last step.
    Time(u64),
    Request,
    /// Two concatenated columns.
    Data(Bytes),
    Ack,
}

impl ExchangeMessage {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Time(_) => Opcode::Time,
            Self::Request => Opcode::Request,
            Self::Data(_) => Opcode::Data,
            Self::Ack => Opcode::Ack,
        }
    }

    pub fn to_frame(&self) -> Frame {
        match self {
            Self::Time(nanos) => Frame::new(Opcode::Time, nanos.to_be_bytes().to_vec()),
            Self::Data(columns) => Frame::new(Opcode::Data, columns.clone()),
            other => Frame::signal(other.opcode()),
        }
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        match frame.kind()? {
            Opcode::Time => {
                let bytes: [u8; 8] =
                    frame
                        .payload
                        .as_ref()
                        .try_into()
                        .map_err(|_| Error::MalformedPayload {
                            what: "time",
                            expected: 8,
                            actual: frame.payload.len(),
                        })?;
                Ok(Self::Time(u64::from_be_bytes(bytes)))
            }
            Opcode::Request => Ok(Self::Request),
            Opcode::Data => Ok(Self::Data(frame.payload.clone())),
            Opcode::Ack => Ok(Self::Ack),
            other => Err(Error::UnexpectedOpcode {
                state: "exchange link".to_string(),
                opcode: other.code(),
            }),
        }
    }
}
