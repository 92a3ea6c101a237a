//! FTP command/response codec (RFC 959 §4).
//!
//! Sends CRLF-terminated commands and reads single-line and multi-line
//! replies over either a plain or a TLS-wrapped control connection.

use crate::error::{FtpError, FtpResult};
use crate::types::FtpResponse;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Read half of the control connection.
pub enum ReadHalf {
    Plain(BufReader<OwnedReadHalf>),
    Tls(BufReader<tokio::io::ReadHalf<TlsStream<TcpStream>>>),
}

/// Write half of the control connection.
pub enum WriteHalf {
    Plain(OwnedWriteHalf),
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

/// The FTP command/response codec operating on split halves.
pub struct FtpCodec {
    pub reader: ReadHalf,
    pub writer: WriteHalf,
}

impl FtpCodec {
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (rd, wr) = stream.into_split();
        Self {
            reader: ReadHalf::Plain(BufReader::new(rd)),
            writer: WriteHalf::Plain(wr),
        }
    }

    pub fn from_tls(stream: TlsStream<TcpStream>) -> Self {
        let (rd, wr) = tokio::io::split(stream);
        Self {
            reader: ReadHalf::Tls(BufReader::new(rd)),
            writer: WriteHalf::Tls(wr),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.writer, WriteHalf::Tls(_))
    }

    /// Send a raw FTP command; CRLF is appended here.
    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        let line = format!("{}\r\n", cmd);
        match &mut self.writer {
            WriteHalf::Plain(w) => w.write_all(line.as_bytes()).await?,
            WriteHalf::Tls(w) => {
                w.write_all(line.as_bytes()).await?;
                w.flush().await?;
            }
        }
        log::trace!(">>> {}", redact(cmd));
        Ok(())
    }

    async fn read_line_raw(&mut self) -> FtpResult<String> {
        let mut buf = String::new();
        let n = match &mut self.reader {
            ReadHalf::Plain(r) => r.read_line(&mut buf).await?,
            ReadHalf::Tls(r) => r.read_line(&mut buf).await?,
        };
        if n == 0 {
            return Err(FtpError::disconnected("Server closed connection"));
        }
        Ok(buf)
    }

    /// Read a complete FTP response (possibly multi-line).
    ///
    /// ```text
    /// 220-Welcome to my FTP server
    /// 220-This is line 2
    /// 220 End of greeting
    /// ```
    pub async fn read_response(&mut self) -> FtpResult<FtpResponse> {
        let first = self.read_line_raw().await?;
        let first = first.trim_end_matches(['\r', '\n']).to_string();
        let code = parse_code(&first)?;

        let mut lines = Vec::with_capacity(1);
        let is_multi = first.as_bytes().get(3) == Some(&b'-');
        lines.push(first);

        if is_multi {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line_raw().await?;
                let next = next.trim_end_matches(['\r', '\n']).to_string();
                let done = next.starts_with(&terminator) || next == code.to_string();
                lines.push(next);
                if done {
                    break;
                }
            }
        }

        let resp = FtpResponse { code, lines };
        log::trace!("<<< {}", resp.lines.last().map(String::as_str).unwrap_or(""));
        Ok(resp)
    }

    /// Send a command and return the response.
    pub async fn execute(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_response().await
    }

    /// Send a command, expect a specific response-code class.
    pub async fn expect(&mut self, cmd: &str, expected_first_digit: u16) -> FtpResult<FtpResponse> {
        let resp = self.execute(cmd).await?;
        if resp.code / 100 != expected_first_digit {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        Ok(resp)
    }

    /// Expect a 2xx reply.
    pub async fn expect_ok(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.expect(cmd, 2).await
    }
}

/// Parse the 3-digit reply code from the start of a line.
fn parse_code(line: &str) -> FtpResult<u16> {
    let digits = line
        .get(..3)
        .ok_or_else(|| FtpError::protocol_error(format!("Response too short: '{}'", line)))?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FtpError::protocol_error(format!("Invalid reply code in: '{}'", line)));
    }
    digits
        .parse::<u16>()
        .map_err(|_| FtpError::protocol_error(format!("Invalid reply code in: '{}'", line)))
}

/// Hide the argument of `PASS` from trace output.
fn redact(cmd: &str) -> &str {
    if cmd.get(..4).is_some_and(|verb| verb.eq_ignore_ascii_case("PASS")) {
        "PASS ****"
    } else {
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Connected codec plus the server's end of the socket.
    async fn pair() -> (FtpCodec, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (FtpCodec::from_tcp(client.unwrap()), server.unwrap().0)
    }

    #[test]
    fn code_parsing() {
        assert_eq!(parse_code("220 Ready").unwrap(), 220);
        assert!(parse_code("22").is_err());
        assert!(parse_code("abc def").is_err());
        assert!(parse_code("+12 x").is_err());
    }

    #[test]
    fn pass_is_redacted() {
        assert_eq!(redact("PASS secret"), "PASS ****");
        assert_eq!(redact("pass secret"), "PASS ****");
        assert_eq!(redact("USER bob"), "USER bob");
        assert_eq!(redact("PWD"), "PWD");
    }

    #[tokio::test]
    async fn reads_multiline_reply() {
        let (mut codec, mut server) = pair().await;
        server
            .write_all(b"220-Welcome\r\n220-second line\r\n220 Ready\r\n")
            .await
            .unwrap();
        assert!(!codec.is_tls());
        let resp = codec.read_response().await.unwrap();
        assert_eq!(resp.code, 220);
        assert_eq!(resp.lines.len(), 3);
        assert_eq!(resp.lines[2], "220 Ready");
    }

    #[tokio::test]
    async fn execute_sends_crlf_terminated_command() {
        let (mut codec, mut server) = pair().await;
        server.write_all(b"200 Type set to I\r\n").await.unwrap();
        let resp = codec.expect_ok("TYPE I").await.unwrap();
        assert_eq!(resp.code, 200);

        let mut buf = [0u8; 8];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"TYPE I\r\n");
    }

    #[tokio::test]
    async fn expect_ok_maps_rejection() {
        let (mut codec, mut server) = pair().await;
        server.write_all(b"530 Not logged in\r\n").await.unwrap();
        let err = codec.expect_ok("PWD").await.unwrap_err();
        assert_eq!(err.code, Some(530));
        assert_eq!(err.kind, crate::error::FtpErrorKind::AuthFailed);
    }

    #[tokio::test]
    async fn eof_is_disconnect() {
        let (mut codec, server) = pair().await;
        drop(server);
        let err = codec.read_response().await.unwrap_err();
        assert_eq!(err.kind, crate::error::FtpErrorKind::Disconnected);
    }
}
