//! Uploader configuration: a TOML file plus command-line overrides.
//!
//! ```toml
//! [server]
//! host = "ftp.example.com"
//! username = "device-17"
//! security = "explicit"
//!
//! [upload]
//! local_dir = "/data/backups"
//! remote_dir = "/uploads/device-17"
//! ```

use crate::error::{UploadError, UploadResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uploader_ftp::{FtpConnectionConfig, FtpSecurityMode};

/// Environment variable consulted when no password is configured.
pub const PASSWORD_ENV: &str = "FTPS_UPLOADER_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploaderConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// `[server]`
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub security: Security,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_sec: u64,
    #[serde(default = "default_data_timeout")]
    pub data_timeout_sec: u64,
}

fn default_port() -> u16 {
    21
}
fn default_connect_timeout() -> u64 {
    15
}
fn default_data_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: None,
            security: Security::default(),
            accept_invalid_certs: false,
            connect_timeout_sec: default_connect_timeout(),
            data_timeout_sec: default_data_timeout(),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("security", &self.security)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish_non_exhaustive()
    }
}

/// Control channel security as written in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    #[default]
    Explicit,
    Implicit,
    /// Plain FTP; only meant for local test servers.
    None,
}

impl From<Security> for FtpSecurityMode {
    fn from(s: Security) -> Self {
        match s {
            Security::Explicit => FtpSecurityMode::Explicit,
            Security::Implicit => FtpSecurityMode::Implicit,
            Security::None => FtpSecurityMode::None,
        }
    }
}

/// Which local files compete for "newest backup".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NewestScope {
    /// Every regular file in the directory.
    #[default]
    All,
    /// Only files carrying the database suffix.
    Database,
}

/// `[upload]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadConfig {
    #[serde(default)]
    pub local_dir: PathBuf,
    #[serde(default)]
    pub remote_dir: String,
    #[serde(default)]
    pub create_remote_dir: bool,
    #[serde(default = "default_database_suffix")]
    pub database_suffix: String,
    #[serde(default = "default_metadata_suffix")]
    pub metadata_suffix: String,
    #[serde(default)]
    pub newest_scope: NewestScope,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_database_suffix() -> String {
    ".db".into()
}
fn default_metadata_suffix() -> String {
    ".json".into()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::new(),
            remote_dir: String::new(),
            create_remote_dir: false,
            database_suffix: default_database_suffix(),
            metadata_suffix: default_metadata_suffix(),
            newest_scope: NewestScope::default(),
            dry_run: false,
        }
    }
}

/// Values supplied on the command line; `Some` wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub local_dir: Option<PathBuf>,
    pub remote_dir: Option<String>,
    pub implicit: bool,
    pub insecure: bool,
    pub dry_run: bool,
}

impl UploaderConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> UploadResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> UploadResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            UploadError::config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Layer command-line values on top of the file.
    pub fn apply(&mut self, o: Overrides) {
        if let Some(host) = o.host {
            self.server.host = host;
        }
        if let Some(port) = o.port {
            self.server.port = port;
        }
        if let Some(user) = o.username {
            self.server.username = user;
        }
        if o.password.is_some() {
            self.server.password = o.password;
        }
        if let Some(dir) = o.local_dir {
            self.upload.local_dir = dir;
        }
        if let Some(dir) = o.remote_dir {
            self.upload.remote_dir = dir;
        }
        if o.implicit {
            self.server.security = Security::Implicit;
            if self.server.port == default_port() {
                self.server.port = 990;
            }
        }
        self.server.accept_invalid_certs |= o.insecure;
        self.upload.dry_run |= o.dry_run;
    }

    /// Fill the password from the environment when still unset.
    pub fn apply_env(&mut self) {
        if self.server.password.is_none() {
            self.server.password = std::env::var(PASSWORD_ENV).ok();
        }
    }

    pub fn validate(&self) -> UploadResult<()> {
        if self.server.host.trim().is_empty() {
            return Err(UploadError::config("server.host must not be empty"));
        }
        if self.server.port == 0 {
            return Err(UploadError::config("server.port must not be 0"));
        }
        if self.server.username.trim().is_empty() {
            return Err(UploadError::config("server.username must not be empty"));
        }
        if self.upload.remote_dir.trim().is_empty() {
            return Err(UploadError::config("upload.remote_dir must not be empty"));
        }
        if self.upload.local_dir.as_os_str().is_empty() {
            return Err(UploadError::config("upload.local_dir must not be empty"));
        }
        if self.upload.database_suffix.is_empty() || self.upload.metadata_suffix.is_empty() {
            return Err(UploadError::config("file suffixes must not be empty"));
        }
        Ok(())
    }

    /// Connection settings for the FTP client.
    pub fn connection(&self) -> FtpConnectionConfig {
        FtpConnectionConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            username: self.server.username.clone(),
            password: self.server.password.clone().unwrap_or_default(),
            security: self.server.security.into(),
            connect_timeout_sec: self.server.connect_timeout_sec,
            data_timeout_sec: self.server.data_timeout_sec,
            accept_invalid_certs: self.server.accept_invalid_certs,
            ..FtpConnectionConfig::default()
        }
    }

    /// `remote_dir/name`, without doubling a trailing slash.
    pub fn remote_path(&self, name: &str) -> String {
        let dir = self.upload.remote_dir.trim_end_matches('/');
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        host = "ftp.example.com"
        username = "device"
        password = "pw"

        [upload]
        local_dir = "/data/backups"
        remote_dir = "/uploads/device/"
    "#;

    #[test]
    fn parses_with_defaults() {
        let cfg = UploaderConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.server.port, 21);
        assert_eq!(cfg.server.security, Security::Explicit);
        assert_eq!(cfg.upload.database_suffix, ".db");
        assert_eq!(cfg.upload.metadata_suffix, ".json");
        assert_eq!(cfg.upload.newest_scope, NewestScope::All);
        assert!(!cfg.upload.dry_run);
        cfg.validate().unwrap();
    }

    #[test]
    fn remote_path_joins_once() {
        let cfg = UploaderConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.remote_path("a.db"), "/uploads/device/a.db");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = UploaderConfig::from_toml("[server]\nhots = \"x\"\n").unwrap_err();
        assert_eq!(err.kind, crate::error::UploadErrorKind::Config);
    }

    #[test]
    fn overrides_win_and_implicit_moves_port() {
        let mut cfg = UploaderConfig::from_toml(SAMPLE).unwrap();
        cfg.apply(Overrides {
            host: Some("10.0.0.5".into()),
            implicit: true,
            insecure: true,
            ..Default::default()
        });
        assert_eq!(cfg.server.host, "10.0.0.5");
        assert_eq!(cfg.server.port, 990);
        assert_eq!(cfg.server.security, Security::Implicit);
        assert!(cfg.server.accept_invalid_certs);

        let conn = cfg.connection();
        assert_eq!(conn.security, FtpSecurityMode::Implicit);
        assert_eq!(conn.password, "pw");
    }

    #[test]
    fn validation_catches_missing_fields() {
        let mut cfg = UploaderConfig::from_toml(SAMPLE).unwrap();
        cfg.upload.remote_dir.clear();
        assert!(cfg.validate().is_err());

        let cfg = UploaderConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_hides_password() {
        let cfg = UploaderConfig::from_toml(SAMPLE).unwrap();
        assert!(!format!("{:?}", cfg).contains("\"pw\""));
    }
}
