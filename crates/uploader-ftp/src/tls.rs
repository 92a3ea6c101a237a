//! TLS helpers for Explicit and Implicit FTPS (RFC 4217).
//!
//! One rustls `ClientConfig` is built per session and shared by the
//! control channel and every data channel, so servers that insist on
//! TLS session reuse for data connections accept our handshakes.

use crate::error::{FtpError, FtpResult};
use crate::protocol::{FtpCodec, ReadHalf, WriteHalf};
use log::warn;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// TLS parameters shared by all streams of one session.
#[derive(Clone)]
pub struct FtpTls {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl FtpTls {
    pub fn new(host: &str, accept_invalid_certs: bool) -> FtpResult<Self> {
        let config = build_client_config(accept_invalid_certs)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| FtpError::tls_failed(format!("Invalid server name '{}': {}", host, e)))?;
        Ok(Self {
            connector: TlsConnector::from(config),
            server_name,
        })
    }

    /// Run the client handshake over `tcp`.
    pub async fn wrap(&self, tcp: TcpStream) -> FtpResult<TlsStream<TcpStream>> {
        self.connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| FtpError::tls_failed(format!("TLS handshake: {}", e)))
    }

    /// Upgrade an existing plain control connection after `AUTH TLS` → 234.
    pub async fn upgrade(&self, codec: FtpCodec) -> FtpResult<FtpCodec> {
        let tcp = reunite_plain(codec)?;
        let tls = self
            .wrap(tcp)
            .await
            .map_err(|e| FtpError::tls_failed(format!("Explicit TLS: {}", e.message)))?;
        Ok(FtpCodec::from_tls(tls))
    }
}

fn build_client_config(accept_invalid_certs: bool) -> FtpResult<Arc<rustls::ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?;

    let config = if accept_invalid_certs {
        warn!("TLS certificate verification disabled – insecure!");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerifier))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(native_roots()?)
            .with_no_client_auth()
    };
    Ok(Arc::new(config))
}

/// Load the platform trust store.
fn native_roots() -> FtpResult<rustls::RootCertStore> {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        warn!("Skipping unreadable system certificate: {}", err);
    }
    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    if ignored > 0 {
        warn!("Ignored {} invalid system certificates", ignored);
    }
    if added == 0 {
        return Err(FtpError::tls_failed("No trusted root certificates found"));
    }
    Ok(roots)
}

/// Reunite the read + write halves back into a `TcpStream`.
fn reunite_plain(codec: FtpCodec) -> FtpResult<TcpStream> {
    let already_tls = || FtpError::protocol_error("Cannot upgrade: connection is already TLS");
    let rd = match codec.reader {
        ReadHalf::Plain(br) => {
            if !br.buffer().is_empty() {
                return Err(FtpError::protocol_error(
                    "Unexpected data buffered before TLS handshake",
                ));
            }
            br.into_inner()
        }
        ReadHalf::Tls(_) => return Err(already_tls()),
    };
    let wr = match codec.writer {
        WriteHalf::Plain(w) => w,
        WriteHalf::Tls(_) => return Err(already_tls()),
    };
    rd.reunite(wr)
        .map_err(|e| FtpError::protocol_error(format!("Reunite failed: {}", e)))
}

// ─── NoCertVerifier (for self-signed certs) ─────────────────────────

#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
