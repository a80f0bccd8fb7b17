//! Tunnel (re)establishment
//!
//! Owns the cookie and the connector so the negotiator can be re-run against a fresh
//! transport whenever the mainloop loses its stream.

use crate::error::ConnectError;
use crate::protocol::cookie::CookieStore;
use crate::protocol::negotiator::establish;
use crate::transport::Connector;
use crate::tunnel::state::{ConnectionState, ConnectionStatus};

/// How hard to try after the stream fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Negotiation attempts per failure, at least 1
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

pub struct Reconnector<C> {
    cookies: CookieStore,
    connector: C,
    policy: ReconnectPolicy,
}

impl<C: Connector> Reconnector<C> {
    pub fn new(cookies: CookieStore, connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            cookies,
            connector,
            policy,
        }
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Initial negotiation: Disconnected -> Negotiating -> Connected
    pub fn connect(
        &mut self,
        state: &mut ConnectionState<C::Transport>,
    ) -> Result<(), ConnectError> {
        state.set_status(ConnectionStatus::Negotiating);
        match establish(&self.cookies, &mut self.connector) {
            Ok(established) => {
                state.install(established);
                Ok(())
            }
            Err(e) => {
                state.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    /// Replace a failed transport: Reconnecting -> Connected
    ///
    /// The caller has already closed the old transport. Queued and in-flight packets
    /// are left in place so they go out over the new stream. Returns the last
    /// negotiation error once the attempts are used up.
    pub fn reconnect(
        &mut self,
        state: &mut ConnectionState<C::Transport>,
    ) -> Result<(), ConnectError> {
        state.set_status(ConnectionStatus::Reconnecting);

        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            log::info!("Reconnecting to gateway (attempt {attempt}/{attempts})");
            match establish(&self.cookies, &mut self.connector) {
                Ok(established) => {
                    state.install(established);
                    log::info!("Reconnected");
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    log::warn!("Reconnect attempt {attempt} failed: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
