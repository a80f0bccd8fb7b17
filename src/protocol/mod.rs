//! GPST SSL-tunnel protocol: cookie handling, tunnel negotiation and framing

pub mod cookie;
pub mod frame;
pub mod negotiator;

pub use cookie::CookieStore;
pub use frame::FrameHeader;
pub use negotiator::{establish, Established, SessionParameters, TunnelParameters};

// Protocol constants
pub mod constants {
    /// First four bytes of every frame header
    pub const FRAME_MAGIC: u32 = 0x1a2b_3c4d;
    /// IPv4 EtherType; the only payload type carried
    pub const ETHERTYPE_IPV4: u16 = 0x0800;
    /// Frame header length
    pub const HEADER_LEN: usize = 16;
    /// Largest payload the 16-bit length field can describe
    pub const MAX_PAYLOAD: usize = u16::MAX as usize;

    pub const DEFAULT_TUNNEL_PATH: &str = "/ssl-tunnel-connect.sslvpn";
    pub const DEFAULT_LOCAL_IP: &str = "0.0.0.0";
    pub const DEFAULT_MTU: u32 = 1500;
    pub const TUNNEL_NETMASK: &str = "255.255.255.255";

    /// Size of the buffer the GET-tunnel response is read into
    pub const RESPONSE_BUF_LEN: usize = 256;
    pub const START_TUNNEL: &[u8] = b"START_TUNNEL";
}

/// Space-separated lowercase hex: `45 00 00 54`
pub(crate) fn hex_bytes(data: &[u8]) -> String {
    let encoded = hex::encode(data);
    let mut out = String::with_capacity(data.len() * 3);
    for (i, c) in encoded.chars().enumerate() {
        if i > 0 && i % 2 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Format `data` as trace-log rows of 16 bytes: `0010: 45 00 00 54 ...`
pub(crate) fn hexdump_rows(data: &[u8]) -> impl Iterator<Item = String> + '_ {
    data.chunks(16)
        .enumerate()
        .map(|(row, chunk)| format!("{:04x}: {}", row * 16, hex_bytes(chunk)))
}

/// Emit `data` at trace level, one row per line
pub(crate) fn trace_hexdump(data: &[u8]) {
    if log::log_enabled!(log::Level::Trace) {
        for row in hexdump_rows(data) {
            log::trace!("{row}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[]), "");
        assert_eq!(hex_bytes(&[0x1a]), "1a");
        assert_eq!(hex_bytes(&[0x1a, 0x2b, 0x3c, 0x4d]), "1a 2b 3c 4d");
    }

    #[test]
    fn test_hexdump_rows() {
        let data: Vec<u8> = (0u8..20).collect();
        let rows: Vec<String> = hexdump_rows(&data).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            "0000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f"
        );
        assert_eq!(rows[1], "0010: 10 11 12 13");
    }

    #[test]
    fn test_hexdump_empty() {
        assert_eq!(hexdump_rows(&[]).count(), 0);
    }
}
