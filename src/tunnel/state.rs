//! Per-session connection state
//!
//! Everything the mainloop mutates lives here and is passed by exclusive reference
//! into each wake-up.

use crate::protocol::negotiator::{Established, SessionParameters, TunnelParameters};
use crate::transport::{Interest, Transport};
use crate::tunnel::packet::Packet;
use std::collections::VecDeque;
use std::time::Instant;

/// Default payload capacity of the receive buffer
pub const DEFAULT_RECEIVE_BUFFER: usize = 65536;

/// Connection status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Negotiating,
    Connected,
    Reconnecting,
    /// Protocol corruption or failed reconnect; no further transitions
    Terminated,
}

pub struct ConnectionState<T> {
    pub(crate) status: ConnectionStatus,
    pub(crate) transport: Option<T>,
    session: Option<SessionParameters>,
    tunnel: Option<TunnelParameters>,

    pub(crate) inbound: VecDeque<Packet>,
    pub(crate) outbound: VecDeque<Packet>,
    /// Frame whose write has not completed; at most one
    pub(crate) in_flight: Option<Packet>,
    /// Receive buffer sized for the largest frame, reused across reads
    pub(crate) rx_buf: Option<Vec<u8>>,
    pub(crate) payload_cap: usize,

    pub(crate) last_rx: Option<Instant>,
    pub(crate) last_tx: Option<Instant>,
    pub(crate) interest: Interest,
    datagram_connected: bool,
    quit_reason: Option<String>,
}

impl<T: Transport> ConnectionState<T> {
    pub fn new(payload_cap: usize) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            transport: None,
            session: None,
            tunnel: None,
            inbound: VecDeque::new(),
            outbound: VecDeque::new(),
            in_flight: None,
            rx_buf: None,
            payload_cap,
            last_rx: None,
            last_tx: None,
            interest: Interest::default(),
            datagram_connected: false,
            quit_reason: None,
        }
    }

    /// Take over a freshly negotiated transport
    pub(crate) fn install(&mut self, established: Established<T>) {
        self.transport = Some(established.transport);
        self.session = Some(established.session);
        self.tunnel = Some(established.tunnel);
        self.interest = Interest {
            read: true,
            write: false,
            except: true,
        };
        self.status = ConnectionStatus::Connected;
    }

    /// Close and forget the current transport, keeping queued and in-flight packets
    pub(crate) fn drop_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.interest = Interest::default();
    }

    pub(crate) fn terminate(&mut self, reason: &str) {
        self.drop_transport();
        self.quit_reason = Some(reason.to_string());
        self.status = ConnectionStatus::Terminated;
    }

    /// Tear the session down, discarding queued packets and any partially sent frame
    pub fn teardown(&mut self) {
        self.drop_transport();
        self.inbound.clear();
        self.outbound.clear();
        self.in_flight = None;
        self.rx_buf = None;
        if self.status != ConnectionStatus::Terminated {
            self.status = ConnectionStatus::Disconnected;
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    pub fn session(&self) -> Option<&SessionParameters> {
        self.session.as_ref()
    }

    pub fn tunnel(&self) -> Option<&TunnelParameters> {
        self.tunnel.as_ref()
    }

    /// Queue a packet for transmission
    pub fn enqueue(&mut self, packet: Packet) {
        self.outbound.push_back(packet);
    }

    /// Next received packet, in arrival order
    pub fn dequeue(&mut self) -> Option<Packet> {
        self.inbound.pop_front()
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Mark the parallel datagram channel as carrying data; while set the outbound
    /// queue is left alone
    pub fn set_datagram_connected(&mut self, connected: bool) {
        self.datagram_connected = connected;
    }

    pub fn datagram_connected(&self) -> bool {
        self.datagram_connected
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Time of the last frame received
    pub fn last_rx(&self) -> Option<Instant> {
        self.last_rx
    }

    /// Time of the last frame fully written
    pub fn last_tx(&self) -> Option<Instant> {
        self.last_tx
    }

    pub fn quit_reason(&self) -> Option<&str> {
        self.quit_reason.as_deref()
    }
}

impl<T: Transport> Default for ConnectionState<T> {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIVE_BUFFER)
    }
}
