//! Streamed uploads (STOR).

use crate::client::FtpClient;
use crate::error::{FtpError, FtpResult};
use crate::transfer;
use crate::types::TransferType;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Chunk size for streaming transfers (64 KiB).
const CHUNK: usize = 65_536;

/// Result of a completed upload, including the server's final reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub bytes: u64,
    pub reply_code: u16,
    pub reply_text: String,
}

impl FtpClient {
    /// Upload `local_path` to `remote_path`, replacing any existing file.
    pub async fn upload(&mut self, local_path: &Path, remote_path: &str) -> FtpResult<UploadOutcome> {
        self.set_type(TransferType::Binary).await?;

        let mut file = fs::File::open(local_path).await.map_err(|e| {
            FtpError::io_error(format!("Cannot open {}: {}", local_path.display(), e))
        })?;
        let total = file.metadata().await.map(|m| m.len()).ok();

        let cmd = format!("STOR {}", remote_path);
        let (resp, ds) = self.start_transfer(&cmd).await?;
        let Some(mut ds) = ds else {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        };

        let dur = self.data_timeout();
        let mut sent: u64 = 0;
        let mut buf = vec![0u8; CHUNK];
        {
            let w = ds.writer();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                transfer::timed(dur, "Data write", w.write_all(&buf[..n])).await?;
                sent += n as u64;
            }
        }
        transfer::timed(dur, "Data close", ds.finish()).await?;

        let done = self.finish_transfer(&cmd).await?;

        debug!(
            "STOR {} complete: {} of {:?} bytes",
            remote_path, sent, total
        );
        self.info.bytes_uploaded += sent;
        self.touch();

        Ok(UploadOutcome {
            bytes: sent,
            reply_code: done.code,
            reply_text: done.text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestServer;
    use crate::types::FtpSecurityMode;
    use std::io::Write;

    fn local_file(body: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body).unwrap();
        f
    }

    #[tokio::test]
    async fn upload_streams_whole_file() {
        let server = TestServer::start("pw").await;
        let mut client = FtpClient::connect(server.config()).await.unwrap();
        // Larger than one chunk.
        let body: Vec<u8> = (0..CHUNK * 2 + 17).map(|i| (i % 251) as u8).collect();
        let src = local_file(&body);

        let outcome = tokio_test::assert_ok!(client.upload(src.path(), "/in/big.bin").await);
        assert_eq!(outcome.bytes, body.len() as u64);
        assert_eq!(outcome.reply_code, 226);
        assert_eq!(outcome.reply_text, "226 Transfer complete");
        assert_eq!(client.info.bytes_uploaded, body.len() as u64);
        assert_eq!(server.file("/in/big.bin"), Some(body));
    }

    #[tokio::test]
    async fn explicit_ftps_upload_runs_over_tls_data_channel() {
        let server = TestServer::start_secure(FtpSecurityMode::Explicit, "pw").await;
        let mut client = FtpClient::connect(server.config()).await.unwrap();
        assert!(client.codec.is_tls());
        let body: Vec<u8> = (0..CHUNK + 5).map(|i| (i % 13) as u8).collect();
        let src = local_file(&body);

        let outcome = tokio_test::assert_ok!(client.upload(src.path(), "/in/sealed.db").await);
        assert_eq!(outcome.reply_code, 226);
        assert_eq!(server.file("/in/sealed.db"), Some(body));
        assert!(client.exists("/in/sealed.db").await.unwrap());
        assert_eq!(server.with_state(|s| s.tls_data_connections), 2);
        tokio_test::assert_ok!(client.quit().await);
    }

    #[tokio::test]
    async fn rejected_stor_leaves_session_usable() {
        let server = TestServer::start("pw").await;
        server.reject("/in/x.json");
        let mut client = FtpClient::connect(server.config()).await.unwrap();
        let src = local_file(b"{}");

        let err = tokio_test::assert_err!(client.upload(src.path(), "/in/x.json").await);
        assert_eq!(err.code, Some(553));
        assert!(err.is_rejection());
        tokio_test::assert_ok!(client.noop().await);
    }

    #[tokio::test]
    async fn missing_local_file_is_io_error() {
        let server = TestServer::start("pw").await;
        let mut client = FtpClient::connect(server.config()).await.unwrap();
        let err = tokio_test::assert_err!(
            client.upload(Path::new("/nonexistent/file.db"), "/in/file.db").await
        );
        assert_eq!(err.kind, crate::error::FtpErrorKind::IoError);
        assert!(!err.is_rejection());
    }
}
