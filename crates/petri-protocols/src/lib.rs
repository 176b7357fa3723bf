//! Petri Protocols - framed binary wire protocol
//!
//! Every connection in a Petri cluster carries length-prefixed, opcode-tagged
//! frames over TCP:
//!
//! ```text
//! u32 length | i32 opcode | payload[length]
//! ```
//!
//! All integers are big-endian. A zero length is a keepalive and carries no
//! opcode; readers skip it.
//!
//! # Channels
//!
//! - **Control** (master <-> worker): `METADATA`, `START`, `FRAMEMARK`, `DONE`
//! - **Balancing exchange** (worker <-> worker): `TIME`, `REQUEST`, `DATA`, `ACK`
//! - **Fixed exchange** (worker <-> worker): raw length-prefixed columns, see
//!   [`column_codec`]
//!
//! # Example
//!
//! ```rust,ignore
//! use petri_protocols::{ControlMessage, FrameChannel};
//!
//! let stream = tokio::net::TcpStream::connect("10.0.0.1:9876").await?;
//! let mut channel = FrameChannel::new(stream);
//! let frame = channel.recv().await?;
//! if let ControlMessage::Metadata(metadata) = ControlMessage::from_frame(&frame)? {
//!     println!("fragment at x={}", metadata.x_offset);
//! }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod messages;
pub mod metadata;
pub mod opcode;

pub use channel::{FrameChannel, FrameReceiver, FrameSender};
pub use codec::{column_codec, Frame, FrameCodec, Keepalive};
pub use error::{Error, Result};
pub use messages::{ControlMessage, ExchangeMessage};
pub use metadata::{Metadata, METADATA_LEN, MIN_BALANCING_WIDTH, NO_SEED_CELL};
pub use opcode::{Opcode, DEFAULT_PORT, MAX_PAYLOAD_LEN};
