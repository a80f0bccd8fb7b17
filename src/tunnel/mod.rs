//! Tunnel data plane
//!
//! Packet ownership, per-session state, the wake-up driven mainloop and the
//! reconnection policy it falls back on when the stream is lost.

pub mod mainloop;
pub mod packet;
pub mod reconnect;
pub mod state;

pub use mainloop::{mainloop, Wake};
pub use packet::Packet;
pub use reconnect::{ReconnectPolicy, Reconnector};
pub use state::{ConnectionState, ConnectionStatus, DEFAULT_RECEIVE_BUFFER};
