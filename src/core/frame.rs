//! Wire frame layout.
//!
//! One frame = `[schema id: u16 BE][payload len: u32 BE][payload]`.
//! Frames are concatenated back-to-back inside a single transport packet;
//! the fixed length field is the only inter-frame delimiter. Splitting a
//! frame across transport packets is a transport responsibility and never
//! reaches this layer.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ProtocolError, Result};

/// Frame header size on the wire: schema id (2) + payload length (4).
pub const HEADER_LEN: usize = 6;

/// Max allowed payload size per frame (16 MB). A length claim above this is
/// treated as a malformed frame before any allocation happens.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub schema_id: u16,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Append this header to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.schema_id);
        buf.put_u32(self.payload_len as u32);
    }

    /// Parse a header from the front of `buf`, advancing it past the
    /// header on success.
    pub fn parse(buf: &mut &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::MalformedFrame {
                reason: "truncated frame header",
                remaining: buf.len(),
            });
        }
        let schema_id = buf.get_u16();
        let payload_len = buf.get_u32() as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::MalformedFrame {
                reason: "payload length exceeds maximum",
                remaining: buf.len(),
            });
        }
        Ok(Self {
            schema_id,
            payload_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::expect_used)]
    fn test_header_roundtrip() {
        let header = FrameHeader {
            schema_id: 513,
            payload_len: 77,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);

        let mut slice = &buf[..];
        let parsed = FrameHeader::parse(&mut slice).expect("parse");
        assert_eq!(parsed, header);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_truncated_header_rejected() {
        let mut slice = &[0x00u8, 0x01, 0x00][..];
        let err = FrameHeader::parse(&mut slice).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedFrame {
                reason: "truncated frame header",
                remaining: 3
            }
        ));
    }

    #[test]
    fn test_oversized_length_claim_rejected() {
        // Header claiming a 20 MB payload must be rejected up front.
        let mut buf = BytesMut::new();
        buf.put_u16(0);
        buf.put_u32(20_000_000);
        let mut slice = &buf[..];
        let err = FrameHeader::parse(&mut slice).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame { .. }));
    }
}
