//! Fragment metadata sent by the master during bootstrap.
//!
//! Fixed 39-byte payload, big-endian:
//!
//! ```text
//! offset  size  field
//!      0     4  width
//!      4     4  height
//!      8     4  seed
//!     12     4  start x   (-1: no seed cell)
//!     16     4  start y
//!     20     4  right neighbor IPv4 address (zero when absent)
//!     24     4  board x offset
//!     28     4  steps per frame
//!     32     4  frames to simulate
//!     36     1  has left
//!     37     1  has right
//!     38     1  balancing
//! ```

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Exact metadata payload size: nine 4-byte integers and three flag bytes.
pub const METADATA_LEN: usize = 9 * 4 + 3;

/// Sentinel start coordinate meaning "no seed cell".
pub const NO_SEED_CELL: i32 = -1;

/// Fragments at or below this width never shed a slice to a wider neighbor.
/// A balancing fragment with neighbors must start wider than this.
pub const MIN_BALANCING_WIDTH: i32 = 8;

/// Run parameters for one fragment. Immutable once delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub width: i32,
    pub height: i32,
    /// Seed for the food field.
    pub seed: i32,
    /// Local coordinates of the initial organism, if this fragment gets one.
    pub seed_cell: Option<(i32, i32)>,
    /// Address of the right neighbor's listener.
    pub right_address: Option<Ipv4Addr>,
    /// Global column of this fragment's left edge.
    pub x_offset: i32,
    pub steps_per_frame: i32,
    pub frames_to_simulate: i32,
    pub has_left: bool,
    pub has_right: bool,
    pub balancing: bool,
}

impl Metadata {
    /// Check the fields are usable before they go on the wire.
    pub fn validate(&self) -> Result<()> {
        if self.width < 3 || self.height < 3 {
            return Err(Error::InvalidMetadata(format!(
                "fragment {}x{} is smaller than 3x3",
                self.width, self.height
            )));
        }
        if self.steps_per_frame < 1 || self.frames_to_simulate < 1 {
            return Err(Error::InvalidMetadata(format!(
                "{} steps per frame over {} frames",
                self.steps_per_frame, self.frames_to_simulate
            )));
        }
        if self.x_offset < 0 {
            return Err(Error::InvalidMetadata(format!(
                "negative x offset {}",
                self.x_offset
            )));
        }
        if self.balancing
            && (self.has_left || self.has_right)
            && self.width <= MIN_BALANCING_WIDTH
        {
            return Err(Error::InvalidMetadata(format!(
                "balancing fragment of width {} must be wider than {}",
                self.width, MIN_BALANCING_WIDTH
            )));
        }
        if self.has_right != self.right_address.is_some() {
            return Err(Error::InvalidMetadata(
                "right neighbor flag and address disagree".to_string(),
            ));
        }
        if let Some((x, y)) = self.seed_cell {
            if x < 0 || y < 0 || x >= self.width || y >= self.height {
                return Err(Error::InvalidMetadata(format!(
                    "seed cell ({}, {}) outside the fragment",
                    x, y
                )));
            }
        }
        Ok(())
    }

    /// Serialise to the fixed 39-byte layout.
    pub fn encode(&self) -> Result<Bytes> {
        self.validate()?;

        let (start_x, start_y) = self.seed_cell.unwrap_or((NO_SEED_CELL, NO_SEED_CELL));
        let address = self.right_address.unwrap_or(Ipv4Addr::UNSPECIFIED);

        let mut buf = BytesMut::with_capacity(METADATA_LEN);
        buf.put_i32(self.width);
        buf.put_i32(self.height);
        buf.put_i32(self.seed);
        buf.put_i32(start_x);
        buf.put_i32(start_y);
        buf.put_slice(&address.octets());
        buf.put_i32(self.x_offset);
        buf.put_i32(self.steps_per_frame);
        buf.put_i32(self.frames_to_simulate);
        buf.put_u8(u8::from(self.has_left));
        buf.put_u8(u8::from(self.has_right));
        buf.put_u8(u8::from(self.balancing));

        if buf.len() != METADATA_LEN {
            return Err(Error::InvalidMetadata(format!(
                "encoded {} bytes instead of {}",
                buf.len(),
                METADATA_LEN
            )));
        }
        Ok(buf.freeze())
    }

    /// Parse the fixed 39-byte layout.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() != METADATA_LEN {
            return Err(Error::MalformedPayload {
                what: "metadata",
                expected: METADATA_LEN,
                actual: payload.len(),
            });
        }

        let mut buf = payload;
        let width = buf.get_i32();
        let height = buf.get_i32();
        let seed = buf.get_i32();
        let start_x = buf.get_i32();
        let start_y = buf.get_i32();
        let mut octets = [0u8; 4];
        buf.copy_to_slice(&mut octets);
        let x_offset = buf.get_i32();
        let steps_per_frame = buf.get_i32();
        let frames_to_simulate = buf.get_i32();
        let has_left = buf.get_u8() == 1;
        let has_right = buf.get_u8() == 1;
        let balancing = buf.get_u8() == 1;

        let metadata = Self {
            width,
            height,
            seed,
            seed_cell: (start_x >= 0).then_some((start_x, start_y)),
            right_address: has_right.then(|| Ipv4Addr::from(octets)),
            x_offset,
            steps_per_frame,
            frames_to_simulate,
            has_left,
            has_right,
            balancing,
        };
        metadata.validate()?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            width: 500,
            height: 400,
            seed: 1,
            seed_cell: Some((250, 100)),
            right_address: Some(Ipv4Addr::new(192, 168, 0, 12)),
            x_offset: 0,
            steps_per_frame: 50,
            frames_to_simulate: 500,
            has_left: false,
            has_right: true,
            balancing: true,
        }
    }

    #[test]
    fn encoded_size_is_fixed() {
        assert_eq!(sample().encode().unwrap().len(), 39);
    }

    #[test]
    fn round_trip_preserves_fields() {
        let metadata = sample();
        let decoded = Metadata::decode(&metadata.encode().unwrap()).unwrap();
        assert_eq!(decoded, metadata);

        let last = Metadata {
            seed_cell: None,
            right_address: None,
            has_left: true,
            has_right: false,
            balancing: false,
            x_offset: 1000,
            ..sample()
        };
        assert_eq!(Metadata::decode(&last.encode().unwrap()).unwrap(), last);
    }

    #[test]
    fn layout_offsets() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[0..4], &500i32.to_be_bytes());
        assert_eq!(&bytes[12..16], &250i32.to_be_bytes());
        assert_eq!(&bytes[20..24], &[192, 168, 0, 12]);
        assert_eq!(&bytes[28..32], &50i32.to_be_bytes());
        assert_eq!(&bytes[36..39], &[0, 1, 1]);
    }

    #[test]
    fn absent_seed_uses_sentinel() {
        let metadata = Metadata {
            seed_cell: None,
            ..sample()
        };
        let bytes = metadata.encode().unwrap();
        assert_eq!(&bytes[12..16], &(-1i32).to_be_bytes());
    }

    #[test]
    fn wrong_size_rejected() {
        let err = Metadata::decode(&[0u8; 38]).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedPayload {
                expected: 39,
                actual: 38,
                ..
            }
        ));
    }

    #[test]
    fn flag_and_address_must_agree() {
        let metadata = Metadata {
            right_address: None,
            ..sample()
        };
        assert!(matches!(metadata.encode(), Err(Error::InvalidMetadata(_))));
    }

    #[test]
    fn seed_cell_must_be_inside() {
        let metadata = Metadata {
            seed_cell: Some((500, 0)),
            ..sample()
        };
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn narrow_balancing_fragments_rejected() {
        let narrow = Metadata {
            width: 6,
            seed_cell: Some((3, 3)),
            ..sample()
        };
        assert!(matches!(narrow.validate(), Err(Error::InvalidMetadata(_))));

        // Fine without neighbors or without balancing.
        let alone = Metadata {
            right_address: None,
            has_right: false,
            ..narrow.clone()
        };
        alone.validate().unwrap();
        let fixed = Metadata {
            balancing: false,
            ..narrow
        };
        fixed.validate().unwrap();

        let narrowest = Metadata {
            width: MIN_BALANCING_WIDTH + 1,
            seed_cell: None,
            ..sample()
        };
        narrowest.validate().unwrap();
    }
}
