//! The remote side of an upload run.

use async_trait::async_trait;
use std::path::Path;
use uploader_ftp::{FtpClient, FtpResult, UploadOutcome};

/// Operations the upload task needs from the server.
#[async_trait]
pub trait RemoteStore: Send {
    /// Whether a file exists at `remote_path`.
    async fn exists(&mut self, remote_path: &str) -> FtpResult<bool>;

    /// Store `local` at `remote_path`, replacing any existing file.
    async fn upload(&mut self, local: &Path, remote_path: &str) -> FtpResult<UploadOutcome>;

    /// Create `dir` and its parents if missing.
    async fn ensure_dir(&mut self, dir: &str) -> FtpResult<()>;

    /// Log out and close the connection.
    async fn quit(&mut self) -> FtpResult<()>;
}

#[async_trait]
impl RemoteStore for FtpClient {
    async fn exists(&mut self, remote_path: &str) -> FtpResult<bool> {
        FtpClient::exists(self, remote_path).await
    }

    async fn upload(&mut self, local: &Path, remote_path: &str) -> FtpResult<UploadOutcome> {
        FtpClient::upload(self, local, remote_path).await
    }

    async fn ensure_dir(&mut self, dir: &str) -> FtpResult<()> {
        self.mkdir_all(dir).await
    }

    async fn quit(&mut self) -> FtpResult<()> {
        FtpClient::quit(self).await
    }
}
