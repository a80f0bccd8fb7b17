//! GET-tunnel negotiation
//!
//! Turns an authenticated cookie and a fresh secure stream into a raw packet tunnel:
//!
//! 1. `USER`, `AUTH` and the optional `TUNNEL`, `IP`, `MTU` fields are read from the cookie.
//! 2. A single `GET <tunnel>?user=<user>&authcookie=<auth> HTTP/1.1` request is sent.
//! 3. The gateway answers `START_TUNNEL` and switches the stream to framed packets,
//!    or answers with an HTTP error.

use crate::error::ConnectError;
use crate::protocol::constants::{
    DEFAULT_LOCAL_IP, DEFAULT_MTU, DEFAULT_TUNNEL_PATH, RESPONSE_BUF_LEN, START_TUNNEL,
    TUNNEL_NETMASK,
};
use crate::protocol::cookie::CookieStore;
use crate::transport::{Connector, Transport};
use std::io;
use std::net::Ipv4Addr;

/// Per-connection session parameters derived from the cookie
#[derive(Clone, PartialEq, Eq)]
pub struct SessionParameters {
    pub username: String,
    pub auth_token: String,
    pub tunnel_path: String,
    pub local_ip: String,
    pub mtu: u32,
}

impl SessionParameters {
    /// Extract parameters from the cookie, applying defaults for optional fields
    pub fn from_cookies(cookies: &CookieStore) -> Result<Self, ConnectError> {
        let (Some(username), Some(auth_token)) = (cookies.lookup("USER"), cookies.lookup("AUTH"))
        else {
            log::error!("Missing USER and/or AUTH cookie; cannot connect");
            return Err(ConnectError::MissingCredentials);
        };

        let tunnel_path = cookies.lookup("TUNNEL").unwrap_or_else(|| {
            log::info!("Missing TUNNEL cookie; assuming {DEFAULT_TUNNEL_PATH}");
            DEFAULT_TUNNEL_PATH
        });

        let local_ip = cookies.lookup("IP").unwrap_or_else(|| {
            log::info!("Missing IP cookie; setting IP address to {DEFAULT_LOCAL_IP}");
            DEFAULT_LOCAL_IP
        });

        let mtu = match cookies.lookup("MTU").map(parse_leading_int) {
            Some(mtu) if mtu > 0 => u32::try_from(mtu).unwrap_or(DEFAULT_MTU),
            _ => {
                log::info!("Missing or zero MTU cookie; assuming {DEFAULT_MTU}");
                DEFAULT_MTU
            }
        };

        Ok(Self {
            username: username.to_string(),
            auth_token: auth_token.to_string(),
            tunnel_path: tunnel_path.to_string(),
            local_ip: local_ip.to_string(),
            mtu,
        })
    }

    /// The GET-tunnel request, terminated by an empty header block
    pub fn tunnel_request(&self) -> String {
        let user: String = url::form_urlencoded::byte_serialize(self.username.as_bytes()).collect();
        format!(
            "GET {}?user={}&authcookie={} HTTP/1.1\r\n\r\n",
            self.tunnel_path, user, self.auth_token
        )
    }
}

// The auth token is a credential.
impl std::fmt::Debug for SessionParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionParameters")
            .field("username", &self.username)
            .field("tunnel_path", &self.tunnel_path)
            .field("local_ip", &self.local_ip)
            .field("mtu", &self.mtu)
            .finish_non_exhaustive()
    }
}

/// Tunnel interface settings handed to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelParameters {
    pub addr: String,
    pub netmask: String,
    pub mtu: u32,
    /// The protocol carries IPv4 only
    pub ipv6_disabled: bool,
}

impl TunnelParameters {
    fn from_session(params: &SessionParameters) -> Self {
        Self {
            addr: params.local_ip.clone(),
            netmask: TUNNEL_NETMASK.to_string(),
            mtu: params.mtu,
            ipv6_disabled: true,
        }
    }

    /// Address as an IPv4 value, if the gateway handed out a parsable one
    pub fn addr_v4(&self) -> Option<Ipv4Addr> {
        self.addr.parse().ok()
    }
}

/// A negotiated tunnel ready for the mainloop
pub struct Established<T> {
    pub transport: T,
    pub session: SessionParameters,
    pub tunnel: TunnelParameters,
}

/// Negotiate a tunnel over a fresh transport from `connector`
///
/// On failure the transport, if one was opened, is closed before returning. An
/// interrupted response read comes back as [`ConnectError::Interrupted`] so the
/// caller can retry.
pub fn establish<C: Connector>(
    cookies: &CookieStore,
    connector: &mut C,
) -> Result<Established<C::Transport>, ConnectError> {
    let session = SessionParameters::from_cookies(cookies)?;

    log::debug!("Disabling IPv6; the tunnel carries IPv4 only");

    let mut transport = connector.connect().map_err(|e| {
        log::error!("Failed to open secure transport: {e}");
        ConnectError::Transport(e)
    })?;

    match request_tunnel(&mut transport, &session) {
        Ok(()) => {
            let tunnel = TunnelParameters::from_session(&session);
            log::info!(
                "Tunnel started: address {} netmask {} MTU {}",
                tunnel.addr,
                tunnel.netmask,
                tunnel.mtu
            );
            Ok(Established {
                transport,
                session,
                tunnel,
            })
        }
        Err(e) => {
            transport.close();
            Err(e)
        }
    }
}

fn request_tunnel<T: Transport>(
    transport: &mut T,
    session: &SessionParameters,
) -> Result<(), ConnectError> {
    let request = session.tunnel_request();
    if log::log_enabled!(log::Level::Trace) {
        for line in request.lines().filter(|l| !l.is_empty()) {
            log::trace!("> {line}");
        }
    }
    transport
        .write_all(request.as_bytes())
        .map_err(ConnectError::Transport)?;

    let mut buf = [0u8; RESPONSE_BUF_LEN];
    let len = match transport.read(&mut buf) {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
            return Err(ConnectError::Interrupted(e));
        }
        Err(e) => {
            log::error!("Error fetching GET-tunnel HTTPS response: {e}");
            return Err(ConnectError::Transport(e));
        }
    };

    classify_response(&buf[..len])
}

fn classify_response(response: &[u8]) -> Result<(), ConnectError> {
    if response.starts_with(START_TUNNEL) {
        Ok(())
    } else if response.starts_with(b"HTTP/") {
        let text = String::from_utf8_lossy(response).trim_end().to_string();
        log::error!("Got HTTP error in response to GET-tunnel request: {text}");
        Err(ConnectError::GatewayHttp(text))
    } else if response.is_empty() {
        log::error!("Gateway disconnected immediately after GET-tunnel request");
        Err(ConnectError::PeerClosed)
    } else {
        log::error!("Got inappropriate response to GET-tunnel request:");
        crate::protocol::trace_hexdump(response);
        Err(ConnectError::UnexpectedResponse {
            hex: hex::encode(response),
        })
    }
}

/// Integer prefix of `s` the way C's `atoi` reads it; 0 if there is none
fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
        });

    if negative {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockConnector, MockTransport};

    fn cookies(raw: &str) -> CookieStore {
        CookieStore::parse(raw).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let params = SessionParameters::from_cookies(&cookies("USER=u; AUTH=t")).unwrap();
        assert_eq!(params.tunnel_path, "/ssl-tunnel-connect.sslvpn");
        assert_eq!(params.local_ip, "0.0.0.0");
        assert_eq!(params.mtu, 1500);
    }

    #[test]
    fn test_optional_fields_used() {
        let params = SessionParameters::from_cookies(&cookies(
            "USER=u; AUTH=t; TUNNEL=/custom; IP=10.1.2.3; MTU=1400",
        ))
        .unwrap();
        assert_eq!(params.tunnel_path, "/custom");
        assert_eq!(params.local_ip, "10.1.2.3");
        assert_eq!(params.mtu, 1400);
    }

    #[test]
    fn test_non_positive_mtu_defaulted() {
        for raw in ["MTU=0", "MTU=-5", "MTU=abc", "MTU="] {
            let params =
                SessionParameters::from_cookies(&cookies(&format!("USER=u; AUTH=t; {raw}")))
                    .unwrap();
            assert_eq!(params.mtu, 1500, "{raw}");
        }
    }

    #[test]
    fn test_mtu_leading_digits() {
        assert_eq!(parse_leading_int(" 1350xyz"), 1350);
        assert_eq!(parse_leading_int("+42"), 42);
        assert_eq!(parse_leading_int("-7"), -7);
        assert_eq!(parse_leading_int("x1"), 0);
    }

    #[test]
    fn test_missing_credentials() {
        assert!(matches!(
            SessionParameters::from_cookies(&cookies("USER=u")),
            Err(ConnectError::MissingCredentials)
        ));
        assert!(matches!(
            SessionParameters::from_cookies(&cookies("AUTH=t")),
            Err(ConnectError::MissingCredentials)
        ));
    }

    #[test]
    fn test_missing_credentials_does_not_connect() {
        let mut connector = MockConnector::with(vec![MockTransport::answering(b"START_TUNNEL")]);
        let result = establish(&cookies("USER=u"), &mut connector);
        assert!(matches!(result, Err(ConnectError::MissingCredentials)));
        assert_eq!(connector.connects, 0);
    }

    #[test]
    fn test_request_line() {
        let params =
            SessionParameters::from_cookies(&cookies("USER=jane doe@corp; AUTH=a1b2")).unwrap();
        assert_eq!(
            params.tunnel_request(),
            "GET /ssl-tunnel-connect.sslvpn?user=jane+doe%40corp&authcookie=a1b2 HTTP/1.1\r\n\r\n"
        );
    }

    #[test]
    fn test_start_tunnel_success() {
        let transport = MockTransport::answering(b"START_TUNNEL");
        let mut connector = MockConnector::with(vec![transport.clone()]);

        let established =
            establish(&cookies("USER=u; AUTH=t; IP=10.0.0.7; MTU=1300"), &mut connector).unwrap();

        assert_eq!(
            established.tunnel,
            TunnelParameters {
                addr: "10.0.0.7".to_string(),
                netmask: "255.255.255.255".to_string(),
                mtu: 1300,
                ipv6_disabled: true,
            }
        );
        assert_eq!(established.tunnel.addr_v4(), Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(
            transport.requests(),
            vec![b"GET /ssl-tunnel-connect.sslvpn?user=u&authcookie=t HTTP/1.1\r\n\r\n".to_vec()]
        );
        assert!(!transport.is_closed());
    }

    #[test]
    fn test_http_error_response() {
        let transport = MockTransport::answering(b"HTTP/1.1 403 Forbidden\r\n");
        let mut connector = MockConnector::with(vec![transport.clone()]);

        match establish(&cookies("USER=u; AUTH=t"), &mut connector) {
            Err(ConnectError::GatewayHttp(text)) => assert_eq!(text, "HTTP/1.1 403 Forbidden"),
            other => panic!("unexpected result: {:?}", other.err()),
        }
        assert!(transport.is_closed());
    }

    #[test]
    fn test_peer_closed() {
        let transport = MockTransport::default();
        let mut connector = MockConnector::with(vec![transport.clone()]);

        let result = establish(&cookies("USER=u; AUTH=t"), &mut connector);
        assert!(matches!(result, Err(ConnectError::PeerClosed)));
        assert!(transport.is_closed());
    }

    #[test]
    fn test_unexpected_response() {
        let transport = MockTransport::answering(b"garbage");
        let mut connector = MockConnector::with(vec![transport.clone()]);

        match establish(&cookies("USER=u; AUTH=t"), &mut connector) {
            Err(ConnectError::UnexpectedResponse { hex }) => assert_eq!(hex, "67617262616765"),
            other => panic!("unexpected result: {:?}", other.err()),
        }
        assert!(transport.is_closed());
    }

    #[test]
    fn test_interrupted_read_propagated() {
        let transport = MockTransport::default();
        transport
            .state
            .borrow_mut()
            .blocking_reads
            .push_back(Err(io::ErrorKind::Interrupted.into()));
        let mut connector = MockConnector::with(vec![transport.clone()]);

        let err = establish(&cookies("USER=u; AUTH=t"), &mut connector)
            .err()
            .unwrap();
        assert!(err.is_interrupted());
    }

    #[test]
    fn test_connector_failure() {
        let mut connector = MockConnector::default();
        connector.push_failure(io::ErrorKind::TimedOut);

        let result = establish(&cookies("USER=u; AUTH=t"), &mut connector);
        assert!(matches!(result, Err(ConnectError::Transport(e)) if e.kind() == io::ErrorKind::TimedOut));
    }

    #[test]
    fn test_request_write_failure() {
        let transport = MockTransport::answering(b"START_TUNNEL");
        transport.state.borrow_mut().blocking_write_error = Some(io::ErrorKind::BrokenPipe);
        let mut connector = MockConnector::with(vec![transport.clone()]);

        let result = establish(&cookies("USER=u; AUTH=t"), &mut connector);
        assert!(matches!(result, Err(ConnectError::Transport(_))));
        assert!(transport.is_closed());
    }

    #[test]
    fn test_session_debug_hides_token() {
        let params = SessionParameters::from_cookies(&cookies("USER=u; AUTH=hunter2")).unwrap();
        assert!(!format!("{params:?}").contains("hunter2"));
    }
}
