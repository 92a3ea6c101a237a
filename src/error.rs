//! Errors raised by the upload task.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uploader_ftp::FtpError;

/// Categorised upload error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadError {
    pub kind: UploadErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UploadErrorKind {
    /// Configuration file missing, unparsable, or invalid.
    Config,
    /// Local directory could not be enumerated.
    LocalDir,
    /// Any failure reported by the FTP layer.
    Remote,
    /// The background task panicked or was cancelled.
    Task,
}

pub type UploadResult<T> = Result<T, UploadError>;

impl UploadError {
    pub fn new(kind: UploadErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::Config, msg)
    }

    pub fn local_dir(dir: &Path, cause: impl fmt::Display) -> Self {
        Self::new(
            UploadErrorKind::LocalDir,
            format!("No files found for upload in {}: {}", dir.display(), cause),
        )
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::Task, msg)
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for UploadError {}

impl From<FtpError> for UploadError {
    fn from(e: FtpError) -> Self {
        Self::new(UploadErrorKind::Remote, e.to_string())
    }
}

impl From<toml::de::Error> for UploadError {
    fn from(e: toml::de::Error) -> Self {
        Self::config(format!("Invalid config file: {}", e))
    }
}

impl From<tokio::task::JoinError> for UploadError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::task(format!("Upload task did not finish: {}", e))
    }
}
