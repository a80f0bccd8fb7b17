//! Data-plane mainloop
//!
//! One call per readiness wake-up. Each call:
//!
//! - drains every frame the transport has ready into the inbound queue,
//! - retries the in-flight frame, byte for byte, if its last write did not go out,
//! - then moves outbound packets into the in-flight slot one at a time until the
//!   transport stops accepting them.
//!
//! Losing the transport triggers renegotiation over a fresh one. Corrupt or short
//! frames end the session.

use crate::error::{GpstError, Result};
use crate::protocol::constants::HEADER_LEN;
use crate::protocol::{frame, hex_bytes, trace_hexdump};
use crate::transport::{Connector, Transport};
use crate::tunnel::packet::Packet;
use crate::tunnel::reconnect::Reconnector;
use crate::tunnel::state::{ConnectionState, ConnectionStatus};
use std::io;
use std::time::Instant;

/// What a wake-up achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Nothing was received
    NoWork,
    /// At least one packet was received
    WorkDone,
    /// The transport was replaced; the host must re-register it for polling
    MustReconnect,
}

enum ReadOutcome {
    Drained { received: bool },
    Lost(io::Error),
}

enum WriteOutcome {
    /// Queue empty or parked behind the datagram channel
    Idle,
    /// Transport not writable; buffered bytes or the in-flight frame wait for the
    /// next wake-up
    Blocked,
    Lost(io::Error),
}

/// Run one wake-up of the mainloop
pub fn mainloop<C: Connector>(
    state: &mut ConnectionState<C::Transport>,
    reconnector: &mut Reconnector<C>,
) -> Result<Wake> {
    if state.status == ConnectionStatus::Terminated {
        return Err(GpstError::InvalidState(format!(
            "session terminated: {}",
            state.quit_reason().unwrap_or("unknown reason")
        )));
    }

    if state.transport.is_none() {
        return dispatch_reconnect(state, reconnector, not_connected());
    }

    let received = match read_phase(state) {
        Ok(ReadOutcome::Drained { received }) => received,
        Ok(ReadOutcome::Lost(e)) => return dispatch_reconnect(state, reconnector, e),
        Err(err) => return terminate(state, err),
    };

    match write_phase(state) {
        Ok(WriteOutcome::Idle | WriteOutcome::Blocked) => {}
        Ok(WriteOutcome::Lost(e)) => return dispatch_reconnect(state, reconnector, e),
        Err(err) => return terminate(state, err),
    }

    // Sending alone does not count as work.
    Ok(if received { Wake::WorkDone } else { Wake::NoWork })
}

fn read_phase<T: Transport>(state: &mut ConnectionState<T>) -> Result<ReadOutcome> {
    let mut received = false;

    loop {
        let Some(transport) = state.transport.as_mut() else {
            return Ok(ReadOutcome::Lost(not_connected()));
        };
        let capacity = state.payload_cap + HEADER_LEN;
        let buf = state.rx_buf.get_or_insert_with(|| vec![0u8; capacity]);

        let len = match transport.read_nonblock(buf) {
            Ok(0) => break,
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                log::error!("Packet receive error: {e}");
                return Ok(ReadOutcome::Lost(e));
            }
        };

        if len < HEADER_LEN {
            return Err(GpstError::ShortPacket(len));
        }

        let payload_len = match frame::decode(&buf[..len]) {
            Ok((_, payload)) => payload.len(),
            Err(error) => {
                return Err(GpstError::UnknownPacket {
                    error,
                    raw: buf[..len].to_vec(),
                });
            }
        };

        log::debug!("Got data packet of {payload_len} bytes");
        trace_hexdump(&buf[..len]);

        // Copy out at the frame's size; the receive buffer is kept for the next read.
        let frame = buf[..len].to_vec();

        state.last_rx = Some(Instant::now());
        state.inbound.push_back(Packet::from_frame(frame));
        received = true;
    }

    Ok(ReadOutcome::Drained { received })
}

fn write_phase<T: Transport>(state: &mut ConnectionState<T>) -> Result<WriteOutcome> {
    loop {
        let Some(transport) = state.transport.as_mut() else {
            return Ok(WriteOutcome::Lost(not_connected()));
        };

        // Bytes the transport still buffers keep write interest up, queue or not.
        let buffered = match transport.flush_nonblock() {
            Ok(buffered) => buffered,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) => {
                log::error!("Write error: {e}");
                return Ok(WriteOutcome::Lost(e));
            }
        };
        state.interest.write = buffered;
        if buffered {
            return Ok(WriteOutcome::Blocked);
        }

        if state.in_flight.is_none() {
            if state.datagram_connected() {
                return Ok(WriteOutcome::Idle);
            }
            let Some(mut packet) = state.outbound.pop_front() else {
                return Ok(WriteOutcome::Idle);
            };
            packet.encode_header();
            log::debug!("Sending data packet of {} bytes", packet.len());
            state.in_flight = Some(packet);
        }

        let (Some(transport), Some(packet)) = (state.transport.as_mut(), state.in_flight.as_ref())
        else {
            return Ok(WriteOutcome::Lost(not_connected()));
        };

        let frame = packet.frame();
        log::trace!("Packet outgoing:");
        trace_hexdump(frame);

        let written = match transport.write_nonblock(frame) {
            Ok(0) => 0,
            Ok(written) => written,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                log::error!("Write error: {e}");
                return Ok(WriteOutcome::Lost(e));
            }
        };

        if written == 0 {
            state.interest.write = true;
            return Ok(WriteOutcome::Blocked);
        }

        if written != frame.len() {
            return Err(GpstError::WriteSizeMismatch {
                requested: frame.len(),
                written,
            });
        }

        state.in_flight = None;
        state.last_tx = Some(Instant::now());
    }
}

fn dispatch_reconnect<C: Connector>(
    state: &mut ConnectionState<C::Transport>,
    reconnector: &mut Reconnector<C>,
    cause: io::Error,
) -> Result<Wake> {
    log::warn!("Tunnel transport lost ({cause}); reconnecting");
    state.drop_transport();

    match reconnector.reconnect(state) {
        Ok(()) => Ok(Wake::MustReconnect),
        Err(e) => {
            log::error!("Reconnect failed");
            terminate(state, GpstError::ReconnectFailed(e))
        }
    }
}

fn terminate<T: Transport>(state: &mut ConnectionState<T>, err: GpstError) -> Result<Wake> {
    match &err {
        GpstError::UnknownPacket { raw, .. } => {
            log::error!("{err}");
            log::error!(
                "Unknown packet {}",
                hex_bytes(&raw[..raw.len().min(HEADER_LEN)])
            );
            trace_hexdump(raw);
        }
        _ => log::error!("{err}"),
    }
    state.terminate(err.quit_reason());
    Err(err)
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "no tunnel transport")
}
