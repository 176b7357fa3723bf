//! Framed codecs.
//!
//! Two framings are in use:
//! - [`FrameCodec`]: `u32 length | i32 opcode | payload`, big-endian. A length
//!   of zero is a keepalive with no opcode and is skipped by the decoder.
//! - [`column_codec`]: `u32 length | payload`, used by the fixed border
//!   exchange which only ever ships single columns.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::error::{Error, Result};
use crate::opcode::{
    Opcode, FILLER_PAYLOAD, LENGTH_FIELD_LEN, MAX_PAYLOAD_LEN, OPCODE_FIELD_LEN,
};

/// One opcode-tagged message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw opcode as read from the wire.
    pub opcode: i32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode: opcode.code(),
            payload: payload.into(),
        }
    }

    /// A frame with nothing to carry. Goes out with a one-byte filler payload.
    pub fn signal(opcode: Opcode) -> Self {
        Self::new(opcode, Bytes::new())
    }

    /// Decode the opcode, failing on codes outside the protocol.
    pub fn kind(&self) -> Result<Opcode> {
        Opcode::from_code(self.opcode)
    }
}

/// Zero-length keepalive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keepalive;

/// Codec for opcode-tagged frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_payload: MAX_PAYLOAD_LEN,
        }
    }

    /// Lower the accepted payload size.
    #[must_use]
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            if src.len() < LENGTH_FIELD_LEN {
                return Ok(None);
            }
            let mut length_bytes = [0u8; LENGTH_FIELD_LEN];
            length_bytes.copy_from_slice(&src[..LENGTH_FIELD_LEN]);
            let length = u32::from_be_bytes(length_bytes) as usize;

            if length == 0 {
                src.advance(LENGTH_FIELD_LEN);
                tracing::trace!("Skipped keepalive frame");
                continue;
            }
            if length > self.max_payload {
                return Err(Error::FrameTooLarge(length));
            }

            let total = LENGTH_FIELD_LEN + OPCODE_FIELD_LEN + length;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            src.advance(LENGTH_FIELD_LEN);
            let opcode = src.get_i32();
            let payload = src.split_to(length).freeze();
            return Ok(Some(Frame { opcode, payload }));
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let payload: &[u8] = if frame.payload.is_empty() {
            FILLER_PAYLOAD
        } else {
            &frame.payload
        };
        if payload.len() > self.max_payload {
            return Err(Error::FrameTooLarge(payload.len()));
        }
        dst.reserve(LENGTH_FIELD_LEN + OPCODE_FIELD_LEN + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_i32(frame.opcode);
        dst.put_slice(payload);
        Ok(())
    }
}

impl Encoder<Keepalive> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, _: Keepalive, dst: &mut BytesMut) -> Result<()> {
        dst.put_u32(0);
        Ok(())
    }
}

/// Length-prefixed codec for raw columns.
pub fn column_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(LENGTH_FIELD_LEN)
        .max_frame_length(MAX_PAYLOAD_LEN)
        .big_endian()
        .new_codec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout_is_big_endian() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::new(Opcode::Time, vec![9u8, 8]), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 2, 0, 0, 0, 99, 9, 8]);
    }

    #[test]
    fn empty_payload_gets_filler_byte() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Frame::signal(Opcode::Ack), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 1, 0, 0, 0, 102, 1]);
    }

    #[test]
    fn keepalives_are_skipped() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Keepalive, &mut buf).unwrap();
        codec.encode(Keepalive, &mut buf).unwrap();
        codec
            .encode(Frame::signal(Opcode::Start), &mut buf)
            .unwrap();

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.kind().unwrap(), Opcode::Start);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let mut codec = FrameCodec::new();
        let mut full = BytesMut::new();
        codec
            .encode(Frame::new(Opcode::Data, vec![1u8, 2, 3, 4]), &mut full)
            .unwrap();

        let mut buf = BytesMut::from(&full[..6]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&full[6..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.payload[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut codec = FrameCodec::new().with_max_payload(4);
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.put_i32(101);
        assert!(matches!(codec.decode(&mut buf), Err(Error::FrameTooLarge(5))));
    }

    #[test]
    fn unknown_opcode_survives_decoding() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_i32(7);
        buf.put_u8(0);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.opcode, 7);
        assert!(frame.kind().is_err());
    }

    #[test]
    fn column_codec_has_no_opcode() {
        let mut codec = column_codec();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from_static(&[0x80, 0x7f, 0x00]), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 3, 0x80, 0x7f, 0x00]);
    }
}
