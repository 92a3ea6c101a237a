//! Passive data channels (RFC 959 PASV, RFC 2428 EPSV).
//!
//! The data socket is TLS-wrapped whenever the session runs with PROT P.
//! The TCP connection is made before the transfer command is sent, the
//! TLS handshake only after the server has answered it: servers start
//! their side of the handshake once they accept the command.

use crate::connection::tcp_connect;
use crate::error::{FtpError, FtpErrorKind, FtpResult};
use crate::protocol::FtpCodec;
use crate::tls::FtpTls;
use crate::types::DataChannelMode;
use lazy_static::lazy_static;
use regex::Regex;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

lazy_static! {
    static ref PASV_RE: Regex =
        Regex::new(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)").expect("valid PASV regex");
    static ref EPSV_RE: Regex = Regex::new(r"\(\|\|\|(\d+)\|\)").expect("valid EPSV regex");
}

/// A plain or TLS-wrapped data connection.
pub enum DataStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl DataStream {
    /// Borrow the stream as a writer, whichever variant it is.
    pub fn writer(&mut self) -> &mut (dyn AsyncWrite + Unpin + Send) {
        match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(tls) => &mut **tls,
        }
    }

    /// Borrow the stream as a reader.
    pub fn reader(&mut self) -> &mut (dyn AsyncRead + Unpin + Send) {
        match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(tls) => &mut **tls,
        }
    }

    /// Flush and close our side (sends close_notify for TLS, FIN for TCP).
    pub async fn finish(mut self) -> FtpResult<()> {
        let w = self.writer();
        w.flush().await?;
        w.shutdown().await?;
        Ok(())
    }
}

/// Error for an operation that outlived the data timeout.
pub(crate) fn elapsed(what: &str, dur: Duration) -> FtpError {
    FtpError::timeout(format!("{} timed out after {}s", what, dur.as_secs()))
}

/// Run `fut` under `dur`.
pub(crate) async fn timed<T, E, F>(dur: Duration, what: &str, fut: F) -> FtpResult<T>
where
    F: Future<Output = Result<T, E>>,
    FtpError: From<E>,
{
    match tokio::time::timeout(dur, fut).await {
        Ok(res) => res.map_err(FtpError::from),
        Err(_) => Err(elapsed(what, dur)),
    }
}

/// Ask for a passive port (PASV or EPSV) and connect to it.
pub async fn open_data_channel(
    codec: &mut FtpCodec,
    mode: DataChannelMode,
    host: &str,
    data_timeout: Duration,
) -> FtpResult<TcpStream> {
    let addr = match mode {
        DataChannelMode::Passive => {
            let resp = timed(data_timeout, "PASV", codec.expect_ok("PASV")).await?;
            parse_pasv_response(&resp.text())?.to_string()
        }
        DataChannelMode::ExtendedPassive => {
            let resp = timed(data_timeout, "EPSV", codec.expect_ok("EPSV")).await?;
            let port = parse_epsv_response(&resp.text())?;
            if host.contains(':') {
                format!("[{}]:{}", host, port)
            } else {
                format!("{}:{}", host, port)
            }
        }
    };

    tcp_connect(&addr, data_timeout)
        .await
        .map_err(|e| FtpError::data_channel(format!("Data connect: {}", e.message)))
}

/// Wrap an accepted data connection in TLS when the session is secured.
pub async fn secure_data_channel(
    tcp: TcpStream,
    tls: Option<&FtpTls>,
    data_timeout: Duration,
) -> FtpResult<DataStream> {
    match tls {
        Some(tls) => {
            let stream = timed(data_timeout, "Data channel TLS handshake", tls.wrap(tcp))
                .await
                .map_err(|e| match e.kind {
                    FtpErrorKind::Timeout => e,
                    _ => FtpError::tls_failed(format!("Data channel: {}", e.message)),
                })?;
            Ok(DataStream::Tls(Box::new(stream)))
        }
        None => Ok(DataStream::Plain(tcp)),
    }
}

/// Parse `(h1,h2,h3,h4,p1,p2)` from a 227 response.
pub fn parse_pasv_response(text: &str) -> FtpResult<SocketAddr> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse PASV: {}", text)))?;

    let nums = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| FtpError::protocol_error("PASV number out of range"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = u16::from(nums[4]) * 256 + u16::from(nums[5]);
    Ok(SocketAddr::new(ip, port))
}

/// Parse the port from `229 Entering Extended Passive Mode (|||port|)`.
pub fn parse_epsv_response(text: &str) -> FtpResult<u16> {
    let caps = EPSV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse EPSV: {}", text)))?;
    caps[1]
        .parse::<u16>()
        .map_err(|_| FtpError::protocol_error("EPSV port out of range"))
}
