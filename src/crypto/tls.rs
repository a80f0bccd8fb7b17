//! TLS/SSL transport to the GPST gateway

use crate::config::ServerConfig;
use crate::error::{GpstError, Result};
use crate::protocol::constants::{FRAME_MAGIC, HEADER_LEN, MAX_PAYLOAD};
use crate::protocol::frame::FrameHeader;
use crate::transport::{Connector, Transport};
use bytes::{Buf, BytesMut};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Plaintext and TLS bytes rustls may hold; one maximum-size frame fits whole
const SEND_BUFFER_LIMIT: usize = HEADER_LEN + MAX_PAYLOAD;

/// Custom certificate verifier that accepts all certificates
#[derive(Debug)]
struct AcceptAllVerifier;

impl rustls::client::danger::ServerCertVerifier for AcceptAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA1,
            rustls::SignatureScheme::ECDSA_SHA1_Legacy,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::ED448,
        ]
    }
}

/// Install the process-wide crypto provider selected by cargo features
fn install_crypto_provider() {
    // Prioritize ring if both features are enabled (for CI --all-features).
    // An already installed provider is fine.
    #[cfg(feature = "ring-crypto")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    #[cfg(all(feature = "aws-lc-crypto", not(feature = "ring-crypto")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

/// TLS configuration for gateway connections
pub struct TlsConfig {
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration
    pub fn new(verify_certificate: bool) -> Result<Self> {
        install_crypto_provider();

        let client_config = if verify_certificate {
            ClientConfig::builder()
                .with_root_certificates(webpki_root_store())
                .with_no_client_auth()
        } else {
            log::warn!("Gateway certificate verification is disabled");
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAllVerifier))
                .with_no_client_auth()
        };

        Ok(Self {
            client_config: Arc::new(client_config),
        })
    }

    /// Create TLS configuration presenting a client certificate
    pub fn with_certificate(cert_path: &str, key_path: &str) -> Result<Self> {
        use std::fs::File;
        use std::io::BufReader;

        install_crypto_provider();

        let cert_file = File::open(cert_path)
            .map_err(|e| GpstError::Config(format!("Cannot open certificate file: {e}")))?;
        let mut cert_reader = BufReader::new(cert_file);

        let key_file = File::open(key_path)
            .map_err(|e| GpstError::Config(format!("Cannot open key file: {e}")))?;
        let mut key_reader = BufReader::new(key_file);

        let certs = rustls_pemfile::certs(&mut cert_reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| GpstError::Config(format!("Invalid certificate: {e}")))?;

        let private_key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|e| GpstError::Config(format!("Invalid private key: {e}")))?
            .ok_or_else(|| GpstError::Config("No private key found".into()))?;

        let client_config = ClientConfig::builder()
            .with_root_certificates(webpki_root_store())
            .with_client_auth_cert(certs, private_key)?;

        Ok(Self {
            client_config: Arc::new(client_config),
        })
    }

    /// Build the TLS configuration described by the `[server]` section
    pub fn from_server_config(server: &ServerConfig) -> Result<Self> {
        match (&server.client_certificate, &server.client_key) {
            (Some(cert), Some(key)) => Self::with_certificate(cert, key),
            _ => Self::new(server.verify_certificate),
        }
    }

    /// Get the client configuration
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }
}

fn webpki_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    root_store
}

/// Opens TLS streams to one gateway
pub struct TlsConnector {
    config: TlsConfig,
    hostname: String,
    port: u16,
    timeout: Duration,
}

impl TlsConnector {
    pub fn new(config: TlsConfig, hostname: &str, port: u16, timeout: Duration) -> Self {
        Self {
            config,
            hostname: hostname.to_string(),
            port,
            timeout,
        }
    }

    /// Connector for the gateway described by the `[server]` section
    pub fn from_server_config(server: &ServerConfig) -> Result<Self> {
        Ok(Self::new(
            TlsConfig::from_server_config(server)?,
            &server.hostname,
            server.port,
            Duration::from_secs(u64::from(server.timeout)),
        ))
    }

    fn open_tcp(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.hostname.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    log::debug!("TCP connection to {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve", self.hostname),
            )
        }))
    }

    fn client_connection(&self) -> io::Result<ClientConnection> {
        let server_name = ServerName::try_from(self.hostname.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut conn = ClientConnection::new(self.config.client_config(), server_name)
            .map_err(io::Error::other)?;
        conn.set_buffer_limit(Some(SEND_BUFFER_LIMIT));
        Ok(conn)
    }
}

impl Connector for TlsConnector {
    type Transport = TlsTransport;

    fn connect(&mut self) -> io::Result<TlsTransport> {
        let mut tcp_stream = self.open_tcp()?;
        tcp_stream.set_nodelay(true)?;

        let mut conn = self.client_connection()?;

        while conn.is_handshaking() {
            conn.complete_io(&mut tcp_stream)?;
        }
        log::debug!(
            "TLS established with {}:{} ({:?})",
            self.hostname,
            self.port,
            conn.protocol_version()
        );

        Ok(TlsTransport {
            stream: StreamOwned::new(conn, tcp_stream),
            nonblocking: false,
            pending: BytesMut::new(),
        })
    }
}

/// TLS stream to the gateway
pub struct TlsTransport {
    stream: StreamOwned<ClientConnection, TcpStream>,
    nonblocking: bool,
    /// Decrypted bytes not yet handed out as a frame
    pending: BytesMut,
}

impl TlsTransport {
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        if self.nonblocking != nonblocking {
            self.stream.sock.set_nonblocking(nonblocking)?;
            self.nonblocking = nonblocking;
        }
        Ok(())
    }
}

/// Split one frame's worth of bytes off `pending` into `buf`
///
/// rustls merges records in its plaintext buffer, while the gateway writes one frame
/// per record. Bytes that do not start with the frame magic are handed out as they
/// are so the codec rejects them.
fn split_frame(pending: &mut BytesMut, buf: &mut [u8]) -> Option<usize> {
    if pending.len() < HEADER_LEN {
        return None;
    }

    let len = match FrameHeader::from_bytes(pending) {
        Ok(header) if header.magic == FRAME_MAGIC => {
            if pending.len() < header.frame_len() {
                return None;
            }
            header.frame_len()
        }
        _ => pending.len(),
    };

    let len = len.min(buf.len());
    buf[..len].copy_from_slice(&pending[..len]);
    pending.advance(len);
    Some(len)
}

impl Transport for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.set_nonblocking(false)?;
        self.stream.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.set_nonblocking(false)?;
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    fn read_nonblock(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.set_nonblocking(true)?;

        let mut chunk = [0u8; 16384];
        loop {
            if let Some(len) = split_frame(&mut self.pending, buf) {
                return Ok(len);
            }

            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "gateway closed the TLS stream",
                    ));
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(e) => return Err(e),
            }
        }
    }

    fn write_nonblock(&mut self, data: &[u8]) -> io::Result<usize> {
        // A frame is handed to rustls only once earlier records are on the wire, so
        // with the raised buffer limit it is taken whole.
        if self.flush_nonblock()? {
            return Ok(0);
        }

        let written = self.stream.conn.writer().write(data)?;
        self.flush_nonblock()?;
        Ok(written)
    }

    fn flush_nonblock(&mut self) -> io::Result<bool> {
        self.set_nonblocking(true)?;

        while self.stream.conn.wants_write() {
            match self.stream.conn.write_tls(&mut self.stream.sock) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    fn close(&mut self) {
        self.stream.conn.send_close_notify();
        let _ = self.stream.conn.complete_io(&mut self.stream.sock);
        let _ = self.stream.sock.shutdown(Shutdown::Both);
    }
}
