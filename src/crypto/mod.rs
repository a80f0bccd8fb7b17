/// TLS transport to the gateway
pub mod tls;

pub use tls::{TlsConfig, TlsConnector, TlsTransport};
