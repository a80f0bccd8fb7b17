//! Owned tunnel packets
//!
//! A packet owns one contiguous buffer holding the 16-byte frame header followed by
//! the IPv4 payload, so a frame can be written straight from it once the header has
//! been filled in. Packets move between the receive buffer, the queues and the
//! in-flight slot; they are never shared.

use crate::error::FrameError;
use crate::protocol::constants::HEADER_LEN;
use crate::protocol::frame::{self, FrameHeader};

pub struct Packet {
    buf: Vec<u8>,
}

impl Packet {
    /// Build an outbound packet with room for its header
    pub fn new(payload: &[u8]) -> Result<Self, FrameError> {
        frame::payload_len(payload.len())?;

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.resize(HEADER_LEN, 0);
        buf.extend_from_slice(payload);
        Ok(Self { buf })
    }

    /// Wrap a received buffer that already holds one validated frame
    pub(crate) fn from_frame(buf: Vec<u8>) -> Self {
        debug_assert!(buf.len() >= HEADER_LEN);
        Self { buf }
    }

    /// Payload length, header excluded
    pub fn len(&self) -> usize {
        self.buf.len() - HEADER_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[HEADER_LEN..]
    }

    pub fn into_payload(mut self) -> Vec<u8> {
        self.buf.drain(..HEADER_LEN);
        self.buf
    }

    /// Fill in the frame header in place
    pub(crate) fn encode_header(&mut self) {
        // Length was checked against the 16-bit field in `new`.
        FrameHeader::ipv4(self.len() as u16).write_to(&mut self.buf);
    }

    /// Header and payload as they go on the wire
    pub(crate) fn frame(&self) -> &[u8] {
        &self.buf
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet").field("len", &self.len()).finish()
    }
}
