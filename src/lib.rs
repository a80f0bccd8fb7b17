//! rgpst - GlobalProtect tunnel (GPST) client library
//!
//! Carries IPv4 packets to a GlobalProtect gateway over the TLS fallback
//! channel once a login cookie has been obtained.
//!
//! ## What This Library Provides
//! - Cookie parsing (`USER=...; AUTH=...`)
//! - Tunnel negotiation over a fresh TLS stream
//! - The 16-byte GPST frame codec
//! - A wake-up driven mainloop with in-place reconnection
//! - TOML configuration and a rustls based transport
//!
//! ## What The Host Must Provide
//! - The login flow that produces the cookie
//! - Readiness notification; call [`GpstClient::wake`] on every wake-up
//! - TUN interface setup from the returned [`protocol::TunnelParameters`]

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod tunnel;

pub use client::{GpstClient, SessionInfo};
pub use config::Config;
pub use error::{GpstError, Result};
pub use tunnel::{ConnectionStatus, Packet, Wake};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
