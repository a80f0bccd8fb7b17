//! Error types and handling for the GPST tunnel client

use std::io;
use thiserror::Error;

/// Errors raised while parsing the authentication cookie
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    /// A `;`-separated field without an `=`
    #[error("Invalid cookie '{0}'")]
    Malformed(String),
}

/// Errors raised while establishing the tunnel over a fresh transport
#[derive(Error, Debug)]
pub enum ConnectError {
    /// `USER` or `AUTH` missing from the cookie
    #[error("Missing USER and/or AUTH cookie; cannot connect")]
    MissingCredentials,

    /// Opening, writing to or reading from the secure transport failed
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    /// Gateway answered the GET-tunnel request with an HTTP status line
    #[error("Got HTTP error in response to GET-tunnel request: {0}")]
    GatewayHttp(String),

    /// Gateway closed the stream without answering
    #[error("Gateway disconnected immediately after GET-tunnel request")]
    PeerClosed,

    /// Neither `START_TUNNEL` nor an HTTP response
    #[error("Got inappropriate response to GET-tunnel request: {hex}")]
    UnexpectedResponse {
        /// Hex encoding of the bytes received
        hex: String,
    },

    /// Read was interrupted; the caller is expected to retry
    #[error("Interrupted while fetching GET-tunnel response: {0}")]
    Interrupted(#[source] io::Error),
}

impl ConnectError {
    /// Whether the caller should retry the handshake rather than give up
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ConnectError::Interrupted(_))
    }
}

/// Frame header validation failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer than 16 bytes available
    #[error("Short frame header ({0} bytes)")]
    ShortHeader(usize),

    #[error("Bad frame magic {0:#010x}")]
    BadMagic(u32),

    #[error("Expected EtherType 0x800 for IPv4, but got {0:#06x}")]
    BadEtherType(u16),

    /// Buffer length disagrees with the header's payload length
    #[error(
        "Unexpected packet length: read {actual} bytes (includes 16 header bytes) but header has payload_len={declared}"
    )]
    LengthMismatch { actual: usize, declared: u16 },

    #[error("Expected 0100000000000000 as last 8 bytes of packet header, got words ({one}, {zero})")]
    BadTrailer { one: u32, zero: u32 },

    /// Payload does not fit the 16-bit length field
    #[error("Payload of {0} bytes exceeds the 65535 byte frame limit")]
    PayloadTooLarge(usize),
}

/// Main error type for GPST operations
#[derive(Error, Debug)]
pub enum GpstError {
    /// Cookie parsing errors
    #[error("Cookie error: {0}")]
    Cookie(#[from] CookieError),

    /// Tunnel negotiation errors
    #[error("Connection failed: {0}")]
    Connect(#[from] ConnectError),

    /// Frame encoding errors
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Received a read too short to hold a frame header
    #[error("Short packet received ({0} bytes)")]
    ShortPacket(usize),

    /// Received a frame that failed header validation
    #[error("Unknown packet received: {error}")]
    UnknownPacket {
        error: FrameError,
        /// The full received buffer
        raw: Vec<u8>,
    },

    /// The transport accepted part of a frame
    #[error("SSL wrote too few bytes! Asked for {requested}, sent {written}")]
    WriteSizeMismatch { requested: usize, written: usize },

    /// Renegotiation after an I/O failure did not succeed
    #[error("Reconnect failed: {0}")]
    ReconnectFailed(#[source] ConnectError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid state errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// TLS errors
    #[error("TLS error: {0}")]
    Tls(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl GpstError {
    /// Short reason handed to the host when the session is shut down
    #[must_use]
    pub fn quit_reason(&self) -> &'static str {
        match self {
            GpstError::ShortPacket(_) => "Short packet received",
            GpstError::UnknownPacket { .. } => "Unknown packet received",
            GpstError::WriteSizeMismatch { .. } => "Internal error",
            GpstError::ReconnectFailed(_) => "GPST reconnect failed",
            GpstError::Cookie(_) => "Invalid cookie",
            GpstError::Connect(_) => "GPST connect failed",
            GpstError::Frame(_) => "Frame encoding failed",
            GpstError::Config(_) => "Configuration error",
            GpstError::InvalidState(_) => "Invalid state",
            GpstError::Tls(_) => "TLS error",
            GpstError::Io(_) => "I/O error",
        }
    }
}

/// Result type alias for GPST operations
pub type Result<T> = std::result::Result<T, GpstError>;

impl From<toml::de::Error> for GpstError {
    fn from(err: toml::de::Error) -> Self {
        GpstError::Config(format!("TOML parsing error: {err}"))
    }
}

impl From<rustls::Error> for GpstError {
    fn from(err: rustls::Error) -> Self {
        GpstError::Tls(format!("TLS error: {err}"))
    }
}
