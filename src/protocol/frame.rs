//! GPST data frame codec
//!
//! Every IPv4 packet on the tunnel stream is wrapped in a 16-byte header:
//!
//! ```text
//! 0000: magic 1a 2b 3c 4d
//! 0004: big-endian EtherType (0x0800)
//! 0006: big-endian payload length (header excluded)
//! 0008: 01 00 00 00 00 00 00 00
//! 0010: payload
//! ```
//!
//! There is no delimiter between frames; the length field is authoritative.

use crate::error::FrameError;
use crate::protocol::constants::{ETHERTYPE_IPV4, FRAME_MAGIC, HEADER_LEN, MAX_PAYLOAD};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub ethertype: u16,
    pub payload_len: u16,
    /// Trailer as two little-endian words; always `(1, 0)` on a valid frame
    pub trailer: (u32, u32),
}

impl FrameHeader {
    pub const SIZE: usize = HEADER_LEN;

    /// Header for an IPv4 payload of `payload_len` bytes
    pub fn ipv4(payload_len: u16) -> Self {
        Self {
            magic: FRAME_MAGIC,
            ethertype: ETHERTYPE_IPV4,
            payload_len,
            trailer: (1, 0),
        }
    }

    /// Serialize into the first 16 bytes of `out`
    ///
    /// Panics if `out` is shorter than 16 bytes.
    pub fn write_to(&self, mut out: &mut [u8]) {
        out.put_u32(self.magic);
        out.put_u16(self.ethertype);
        out.put_u16(self.payload_len);
        out.put_u32_le(self.trailer.0);
        out.put_u32_le(self.trailer.1);
    }

    /// Read the raw header fields without validating them
    pub fn from_bytes(mut data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::ShortHeader(data.len()));
        }

        let magic = data.get_u32();
        let ethertype = data.get_u16();
        let payload_len = data.get_u16();
        let one = data.get_u32_le();
        let zero = data.get_u32_le();

        Ok(Self {
            magic,
            ethertype,
            payload_len,
            trailer: (one, zero),
        })
    }

    /// Total frame length this header announces
    pub fn frame_len(&self) -> usize {
        Self::SIZE + usize::from(self.payload_len)
    }

    /// Check the header against a received buffer of `actual` bytes
    pub fn validate(&self, actual: usize) -> Result<(), FrameError> {
        if self.magic != FRAME_MAGIC {
            return Err(FrameError::BadMagic(self.magic));
        }
        if self.ethertype != ETHERTYPE_IPV4 {
            return Err(FrameError::BadEtherType(self.ethertype));
        }
        if actual != self.frame_len() {
            return Err(FrameError::LengthMismatch {
                actual,
                declared: self.payload_len,
            });
        }
        if self.trailer != (1, 0) {
            return Err(FrameError::BadTrailer {
                one: self.trailer.0,
                zero: self.trailer.1,
            });
        }
        Ok(())
    }
}

/// Payload length as the 16-bit header field, if it fits
pub fn payload_len(len: usize) -> Result<u16, FrameError> {
    if len > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge(len));
    }
    Ok(len as u16)
}

/// Wrap `payload` in a frame header
pub fn encode(payload: &[u8]) -> Result<Bytes, FrameError> {
    let header = FrameHeader::ipv4(payload_len(payload.len())?);

    let mut frame = BytesMut::zeroed(HEADER_LEN);
    header.write_to(&mut frame);
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

/// Validate a complete received frame and return its EtherType and payload
///
/// `buf` must hold exactly one frame. On error the caller still owns `buf` for
/// diagnostics.
pub fn decode(buf: &[u8]) -> Result<(u16, &[u8]), FrameError> {
    let header = FrameHeader::from_bytes(buf)?;
    header.validate(buf.len())?;
    Ok((header.ethertype, &buf[HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(magic: u32, ethertype: u16, len: u16, one: u32, zero: u32) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        FrameHeader {
            magic,
            ethertype,
            payload_len: len,
            trailer: (one, zero),
        }
        .write_to(&mut buf);
        buf
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode(&[0x45, 0x00, 0x00]).unwrap();
        assert_eq!(
            &frame[..],
            &[
                0x1a, 0x2b, 0x3c, 0x4d, 0x08, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x45, 0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_round_trip_all_lengths() {
        let data: Vec<u8> = (0..MAX_PAYLOAD).map(|i| (i % 251) as u8).collect();
        let lengths = (0..=MAX_PAYLOAD)
            .step_by(7)
            .chain([1, 15, 16, 17, 1500, MAX_PAYLOAD - 1, MAX_PAYLOAD]);

        for len in lengths {
            let payload = &data[..len];
            let frame = encode(payload).unwrap();
            assert_eq!(frame.len(), HEADER_LEN + len);
            assert_eq!(payload_len(len), Ok(len as u16));

            let (ethertype, decoded) = decode(&frame).unwrap();
            assert_eq!(ethertype, ETHERTYPE_IPV4);
            assert_eq!(decoded, payload, "round trip failed at length {len}");
        }
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert_eq!(
            encode(&payload),
            Err(FrameError::PayloadTooLarge(MAX_PAYLOAD + 1))
        );
    }

    #[test]
    fn test_decode_short_header() {
        assert_eq!(decode(&[0u8; 15]), Err(FrameError::ShortHeader(15)));
        assert_eq!(decode(&[]), Err(FrameError::ShortHeader(0)));
    }

    #[test]
    fn test_decode_bad_magic() {
        let buf = header_bytes(0, ETHERTYPE_IPV4, 0, 1, 0);
        assert_eq!(decode(&buf), Err(FrameError::BadMagic(0)));
    }

    #[test]
    fn test_decode_bad_ethertype() {
        let buf = header_bytes(FRAME_MAGIC, 0x86dd, 0, 1, 0);
        assert_eq!(decode(&buf), Err(FrameError::BadEtherType(0x86dd)));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut buf = header_bytes(FRAME_MAGIC, ETHERTYPE_IPV4, 10, 1, 0);
        buf.extend_from_slice(&[0u8; 4]);
        assert_eq!(buf.len(), 20);
        assert_eq!(
            decode(&buf),
            Err(FrameError::LengthMismatch {
                actual: 20,
                declared: 10
            })
        );
    }

    #[test]
    fn test_decode_bad_trailer() {
        let buf = header_bytes(FRAME_MAGIC, ETHERTYPE_IPV4, 0, 0, 0);
        assert_eq!(
            decode(&buf),
            Err(FrameError::BadTrailer { one: 0, zero: 0 })
        );

        let buf = header_bytes(FRAME_MAGIC, ETHERTYPE_IPV4, 0, 1, 7);
        assert_eq!(
            decode(&buf),
            Err(FrameError::BadTrailer { one: 1, zero: 7 })
        );
    }

    #[test]
    fn test_header_round_trip() {
        let header = FrameHeader::ipv4(1400);
        let mut buf = [0u8; HEADER_LEN];
        header.write_to(&mut buf);
        assert_eq!(FrameHeader::from_bytes(&buf).unwrap(), header);
        assert_eq!(header.frame_len(), 1416);
    }
}
