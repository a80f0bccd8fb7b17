//! GPST Client - host-facing handle for one tunnel session
//!
//! Bundles the cookie, the connector and the per-session state, and exposes the
//! operations a host event loop needs:
//! - negotiating the tunnel
//! - running one mainloop pass per readiness wake-up
//! - exchanging IPv4 packets with the tunnel
//! - reading the freshness timestamps used for keepalive and idle timeouts

use crate::config::Config;
use crate::error::{GpstError, Result};
use crate::protocol::{CookieStore, TunnelParameters};
use crate::transport::{Connector, Interest};
use crate::tunnel::{
    mainloop, ConnectionState, ConnectionStatus, Packet, Reconnector, Wake,
};
use std::time::Instant;

/// GPST tunnel client
pub struct GpstClient<C: Connector> {
    reconnector: Reconnector<C>,
    state: ConnectionState<C::Transport>,
}

impl<C: Connector> GpstClient<C> {
    /// Create a client for `cookie` that reaches the gateway through `connector`
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the cookie is malformed
    pub fn new(config: &Config, cookie: &str, connector: C) -> Result<Self> {
        config.validate()?;
        let cookies = CookieStore::parse(cookie)?;

        Ok(Self {
            reconnector: Reconnector::new(cookies, connector, config.reconnect.policy()),
            state: ConnectionState::new(config.tunnel.receive_buffer),
        })
    }

    /// Negotiate the tunnel
    ///
    /// # Errors
    /// Returns the negotiation error; the client stays disconnected and may retry
    pub fn connect(&mut self) -> Result<&TunnelParameters> {
        if self.state.status() != ConnectionStatus::Disconnected {
            return Err(GpstError::InvalidState(format!(
                "cannot connect while {:?}",
                self.state.status()
            )));
        }

        self.reconnector.connect(&mut self.state)?;
        self.state
            .tunnel()
            .ok_or_else(|| GpstError::InvalidState("tunnel parameters missing".to_string()))
    }

    /// Run one mainloop pass; call once per readiness wake-up
    ///
    /// # Errors
    /// Returns a terminal error once the session has to be shut down; see
    /// [`GpstError::quit_reason`]
    pub fn wake(&mut self) -> Result<Wake> {
        if self.state.status() == ConnectionStatus::Disconnected {
            return Err(GpstError::InvalidState("not connected".to_string()));
        }
        mainloop(&mut self.state, &mut self.reconnector)
    }

    /// Queue an IPv4 packet for the gateway
    pub fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        self.state.enqueue(Packet::new(payload)?);
        Ok(())
    }

    /// Next packet received from the gateway
    pub fn recv_packet(&mut self) -> Option<Packet> {
        self.state.dequeue()
    }

    /// Tell the client whether the parallel datagram channel is carrying traffic
    pub fn set_datagram_connected(&mut self, connected: bool) {
        self.state.set_datagram_connected(connected);
    }

    /// Tear the session down, dropping queued packets
    pub fn disconnect(&mut self) {
        self.state.teardown();
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    pub fn tunnel_parameters(&self) -> Option<&TunnelParameters> {
        self.state.tunnel()
    }

    pub fn interest(&self) -> Interest {
        self.state.interest()
    }

    pub fn last_rx(&self) -> Option<Instant> {
        self.state.last_rx()
    }

    pub fn last_tx(&self) -> Option<Instant> {
        self.state.last_tx()
    }

    pub fn quit_reason(&self) -> Option<&str> {
        self.state.quit_reason()
    }

    /// Snapshot of the session for display
    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            status: self.state.status(),
            username: self.state.session().map(|s| s.username.clone()),
            tunnel: self.state.tunnel().cloned(),
            inbound_queued: self.state.inbound_len(),
            outbound_queued: self.state.outbound_len(),
            write_pending: self.state.has_in_flight(),
            last_rx: self.state.last_rx(),
            last_tx: self.state.last_tx(),
        }
    }
}

/// Session information
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub status: ConnectionStatus,
    pub username: Option<String>,
    pub tunnel: Option<TunnelParameters>,
    pub inbound_queued: usize,
    pub outbound_queued: usize,
    pub write_pending: bool,
    pub last_rx: Option<Instant>,
    pub last_tx: Option<Instant>,
}
