//! TCP and TLS transport for the FTP control connection.

use crate::error::{FtpError, FtpResult};
use crate::protocol::FtpCodec;
use crate::tls::FtpTls;
use crate::types::{FtpConnectionConfig, FtpResponse, FtpSecurityMode};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Open a TCP connection to `addr` within `dur`.
pub(crate) async fn tcp_connect(addr: &str, dur: Duration) -> FtpResult<TcpStream> {
    let tcp = timeout(dur, TcpStream::connect(addr))
        .await
        .map_err(|_| FtpError::timeout(format!("TCP connect to {} timed out", addr)))?
        .map_err(|e| FtpError::connection_failed(format!("TCP connect to {}: {}", addr, e)))?;
    tcp.set_nodelay(true).ok();
    Ok(tcp)
}

/// Establish the control connection and return the codec plus the
/// server welcome banner.
///
/// For Explicit FTPS the caller issues AUTH TLS afterwards.
pub async fn connect(
    config: &FtpConnectionConfig,
    tls: Option<&FtpTls>,
) -> FtpResult<(FtpCodec, FtpResponse)> {
    let addr = format!("{}:{}", config.host, config.port);
    let dur = Duration::from_secs(config.connect_timeout_sec);
    let tcp = tcp_connect(&addr, dur).await?;

    let mut codec = match (config.security, tls) {
        (FtpSecurityMode::Implicit, Some(tls)) => FtpCodec::from_tls(tls.wrap(tcp).await?),
        (FtpSecurityMode::Implicit, None) => {
            return Err(FtpError::invalid_config("Implicit FTPS requires a TLS context"))
        }
        _ => FtpCodec::from_tcp(tcp),
    };

    let banner = timeout(dur, codec.read_response())
        .await
        .map_err(|_| FtpError::timeout(format!("No greeting from {}", addr)))??;
    if !banner.is_completion() {
        return Err(FtpError::from_reply(banner.code, &banner.text()));
    }
    Ok((codec, banner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FtpErrorKind;
    use crate::testing::TestServer;
    use crate::tls::FtpTls;

    #[tokio::test]
    async fn returns_banner() {
        let server = TestServer::start_with(FtpSecurityMode::None, "220 ready", "pw").await;
        let (codec, banner) = tokio_test::assert_ok!(connect(&server.config(), None).await);
        assert_eq!(banner.code, 220);
        assert!(!codec.is_tls());
    }

    #[tokio::test]
    async fn busy_server_is_an_error() {
        let server =
            TestServer::start_with(FtpSecurityMode::None, "421 Too many connections", "pw").await;
        let err = connect(&server.config(), None).await.err().unwrap();
        assert_eq!(err.kind, FtpErrorKind::Disconnected);
        assert_eq!(err.code, Some(421));
    }

    #[tokio::test]
    async fn implicit_needs_tls_context() {
        let server = TestServer::start("pw").await;
        let mut config = server.config();
        config.security = FtpSecurityMode::Implicit;
        let err = connect(&config, None).await.err().unwrap();
        assert_eq!(err.kind, FtpErrorKind::InvalidConfig);
    }

    #[tokio::test]
    async fn implicit_reads_banner_over_tls() {
        let server = TestServer::start_secure(FtpSecurityMode::Implicit, "pw").await;
        let config = server.config();
        let tls = FtpTls::new(&config.host, true).unwrap();
        let (codec, banner) = tokio_test::assert_ok!(connect(&config, Some(&tls)).await);
        assert_eq!(banner.code, 220);
        assert!(codec.is_tls());
    }
}
