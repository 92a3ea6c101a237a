//! Stateful FTP client owning the control connection.
//!
//! Lifecycle: `connect()` → optional AUTH TLS upgrade + PBSZ/PROT →
//! USER/PASS → FEAT/SYST/PWD probing → TYPE → optional CWD.

use crate::connection;
use crate::error::{FtpError, FtpResult};
use crate::parser;
use crate::protocol::FtpCodec;
use crate::tls::FtpTls;
use crate::transfer::{self, DataStream};
use crate::types::*;
use chrono::Utc;
use log::{debug, info};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// A connected FTP session.
pub struct FtpClient {
    pub id: String,
    pub(crate) codec: FtpCodec,
    pub config: FtpConnectionConfig,
    pub info: FtpSessionInfo,
    pub features: ServerFeatures,
    tls: Option<FtpTls>,
}

impl FtpClient {
    /// Establish and authenticate a new session.
    pub async fn connect(config: FtpConnectionConfig) -> FtpResult<Self> {
        if config.host.is_empty() {
            return Err(FtpError::invalid_config("Host must not be empty"));
        }
        if config.port == 0 {
            return Err(FtpError::invalid_config("Port must not be 0"));
        }

        let tls = if config.security.is_secure() {
            Some(FtpTls::new(&config.host, config.accept_invalid_certs)?)
        } else {
            None
        };

        debug!("FTP connecting to {}:{} ({:?})", config.host, config.port, config.security);
        let (mut codec, banner) = connection::connect(&config, tls.as_ref()).await?;

        // ── Explicit FTPS: AUTH TLS ──────────────────────────────
        if let (FtpSecurityMode::Explicit, Some(tls)) = (config.security, tls.as_ref()) {
            let resp = codec.execute("AUTH TLS").await?;
            if !resp.is_completion() {
                return Err(FtpError::tls_failed(format!("AUTH TLS rejected: {}", resp.text())));
            }
            codec = tls.upgrade(codec).await?;
        }

        // ── Protection level (RFC 4217 §9) ───────────────────────
        if config.security.is_secure() {
            codec.expect_ok("PBSZ 0").await?;
            codec.expect_ok("PROT P").await?;
        }

        // ── Authenticate ─────────────────────────────────────────
        Self::login(&mut codec, &config.username, &config.password).await?;
        debug!("Login Status : true");

        // ── FEAT / OPTS UTF8 / SYST / PWD ────────────────────────
        let features = Self::query_features(&mut codec).await;
        if config.utf8 && features.utf8 {
            let _ = codec.execute("OPTS UTF8 ON").await;
        }

        let system_type = match codec.execute("SYST").await {
            Ok(r) if r.is_completion() => Some(r.text().trim_start_matches("215 ").to_string()),
            _ => None,
        };

        let cwd = Self::get_pwd(&mut codec).await.unwrap_or_else(|_| "/".into());

        // ── TYPE ─────────────────────────────────────────────────
        codec.expect_ok(config.transfer_type.command()).await?;

        // ── Initial CWD ──────────────────────────────────────────
        let current_directory = match config.initial_directory {
            Some(ref dir) => {
                codec.expect_ok(&format!("CWD {}", dir)).await?;
                Self::get_pwd(&mut codec).await.unwrap_or_else(|_| dir.clone())
            }
            None => cwd,
        };

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let info = FtpSessionInfo {
            id: id.clone(),
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            security: config.security,
            connected: true,
            current_directory,
            server_banner: Some(banner.text()),
            system_type,
            connected_at: now,
            last_activity: now,
            transfer_type: config.transfer_type,
            bytes_uploaded: 0,
        };
        info!(
            "FTP session {} established with {}:{} as {} (TLS: {})",
            id,
            info.host,
            info.port,
            info.username,
            codec.is_tls()
        );

        Ok(Self {
            id,
            codec,
            config,
            info,
            features,
            tls,
        })
    }

    /// USER/PASS exchange. A 230 after USER skips the password.
    async fn login(codec: &mut FtpCodec, username: &str, password: &str) -> FtpResult<()> {
        let user_resp = codec.execute(&format!("USER {}", username)).await?;
        match user_resp.code {
            230 => Ok(()),
            331 | 332 => {
                let pass_resp = codec.execute(&format!("PASS {}", password)).await?;
                if pass_resp.is_completion() {
                    Ok(())
                } else {
                    Err(FtpError::auth_failed(format!("Login failed: {}", pass_resp.text()))
                        .with_code(pass_resp.code))
                }
            }
            code => Err(FtpError::auth_failed(format!("USER rejected: {}", user_resp.text()))
                .with_code(code)),
        }
    }

    async fn query_features(codec: &mut FtpCodec) -> ServerFeatures {
        match codec.execute("FEAT").await {
            Ok(resp) if resp.is_completion() => ServerFeatures::from_feat_lines(&resp.lines),
            _ => ServerFeatures::default(),
        }
    }

    // ─── PWD / CWD / NOOP ────────────────────────────────────────

    async fn get_pwd(codec: &mut FtpCodec) -> FtpResult<String> {
        let resp = codec.expect_ok("PWD").await?;
        parse_pwd(&resp.text())
    }

    /// Change into `path` and update `current_directory`.
    pub async fn cwd(&mut self, path: &str) -> FtpResult<String> {
        self.codec.expect_ok(&format!("CWD {}", path)).await?;
        let new_pwd = Self::get_pwd(&mut self.codec).await?;
        self.info.current_directory = new_pwd.clone();
        self.touch();
        Ok(new_pwd)
    }

    /// Keep the control connection alive.
    pub async fn noop(&mut self) -> FtpResult<()> {
        self.codec.expect_ok("NOOP").await?;
        self.touch();
        Ok(())
    }

    /// Switch transfer type, skipping the round trip when already set.
    pub async fn set_type(&mut self, tt: TransferType) -> FtpResult<()> {
        if self.info.transfer_type == tt {
            return Ok(());
        }
        self.codec.expect_ok(tt.command()).await?;
        self.info.transfer_type = tt;
        Ok(())
    }

    // ─── Data channel ────────────────────────────────────────────

    pub(crate) fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.config.data_timeout_sec)
    }

    /// Send `cmd` over a fresh passive data connection. Returns the
    /// server's first reply and, when that reply is 1xx, the (possibly
    /// TLS-wrapped) data stream.
    pub(crate) async fn start_transfer(
        &mut self,
        cmd: &str,
    ) -> FtpResult<(FtpResponse, Option<DataStream>)> {
        let dur = self.data_timeout();
        let tcp = transfer::open_data_channel(
            &mut self.codec,
            self.config.data_channel_mode,
            &self.config.host,
            dur,
        )
        .await?;

        let resp = transfer::timed(dur, cmd, self.codec.execute(cmd)).await?;
        if !resp.is_preliminary() {
            return Ok((resp, None));
        }
        let ds = transfer::secure_data_channel(tcp, self.tls.as_ref(), dur).await?;
        Ok((resp, Some(ds)))
    }

    /// Read the reply that ends a transfer; it must be 2xx.
    pub(crate) async fn finish_transfer(&mut self, what: &str) -> FtpResult<FtpResponse> {
        let dur = self.data_timeout();
        let done = transfer::timed(dur, what, self.codec.read_response()).await?;
        if !done.is_completion() {
            return Err(FtpError::from_reply(done.code, &done.text()));
        }
        Ok(done)
    }

    // ─── Listing ─────────────────────────────────────────────────

    /// LIST `path` (or the current directory) and parse the result.
    pub async fn list(&mut self, path: Option<&str>) -> FtpResult<Vec<FtpEntry>> {
        let cmd = match path {
            Some(p) => format!("LIST {}", p),
            None => "LIST".to_string(),
        };
        let data = self.retrieve_data_as_string(&cmd).await?;
        self.touch();
        Ok(parser::parse_listing(&data))
    }

    /// Send `cmd` over a data channel and collect the body as text.
    async fn retrieve_data_as_string(&mut self, cmd: &str) -> FtpResult<String> {
        let (resp, ds) = self.start_transfer(cmd).await?;
        let Some(mut ds) = ds else {
            // Some servers answer 226 straight away when there is nothing to send.
            if resp.is_completion() {
                return Ok(String::new());
            }
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        };

        let dur = self.data_timeout();
        let mut buf = Vec::new();
        let read = tokio::time::timeout(dur, ds.reader().read_to_end(&mut buf))
            .await
            .map_err(|_| transfer::elapsed("Data read", dur))?;
        match read {
            Ok(_) => {}
            // Servers that drop the TLS data socket without close_notify.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {}
            Err(e) => return Err(e.into()),
        }
        drop(ds);

        self.finish_transfer(cmd).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    // ─── SIZE ────────────────────────────────────────────────────

    /// Size of a remote file (RFC 3659 SIZE).
    pub async fn size(&mut self, path: &str) -> FtpResult<u64> {
        let resp = self.codec.expect_ok(&format!("SIZE {}", path)).await?;
        let text = resp.text();
        text.split_whitespace()
            .nth(1)
            .and_then(|n| n.trim().parse::<u64>().ok())
            .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse SIZE: {}", text)))
    }

    // ─── QUIT ────────────────────────────────────────────────────

    /// Log out and close the session. The session counts as closed even
    /// when QUIT fails; the failure is still returned.
    pub async fn quit(&mut self) -> FtpResult<()> {
        if !self.info.connected {
            return Ok(());
        }
        let result = self.codec.execute("QUIT").await;
        self.info.connected = false;
        info!("FTP session {} closed", self.id);
        result.map(|_| ())
    }

    pub(crate) fn touch(&mut self) {
        self.info.last_activity = Utc::now();
    }

    pub fn is_connected(&self) -> bool {
        self.info.connected
    }
}

/// Parse `257 "/some/path"` into the path string.
fn parse_pwd(text: &str) -> FtpResult<String> {
    let start = text.find('"');
    let end = text.rfind('"');
    match (start, end) {
        (Some(s), Some(e)) if e > s => Ok(text[s + 1..e].replace("\"\"", "\"")),
        _ => Err(FtpError::protocol_error(format!("Cannot parse PWD: {}", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pwd_parsing() {
        assert_eq!(parse_pwd("257 \"/backups\" is current directory").unwrap(), "/backups");
        assert_eq!(parse_pwd("257 \"/a \"\"quoted\"\" dir\"").unwrap(), "/a \"quoted\" dir");
        assert!(parse_pwd("257 no quotes").is_err());
    }

    #[tokio::test]
    async fn empty_host_is_rejected() {
        let err = FtpClient::connect(FtpConnectionConfig::default()).await.err().unwrap();
        assert_eq!(err.kind, crate::error::FtpErrorKind::InvalidConfig);
    }

    #[tokio::test]
    async fn quit_reports_a_dropped_connection_once() {
        let server = crate::testing::TestServer::start("pw").await;
        server.with_state(|s| s.hang_up_on_quit = true);
        let mut client = FtpClient::connect(server.config()).await.unwrap();

        assert!(client.quit().await.is_err());
        assert!(!client.is_connected());
        tokio_test::assert_ok!(client.quit().await);
    }

    #[tokio::test]
    async fn wrong_password_is_auth_failure() {
        let server = crate::testing::TestServer::start("pw").await;
        let mut config = server.config();
        config.password = "nope".into();
        let err = FtpClient::connect(config).await.err().unwrap();
        assert_eq!(err.kind, crate::error::FtpErrorKind::AuthFailed);
        assert_eq!(err.code, Some(530));
    }
}
