//! Remote path queries and directory creation.

use crate::client::FtpClient;
use crate::error::{FtpError, FtpResult};

impl FtpClient {
    /// Whether `path` exists on the server.
    ///
    /// Issues `LIST path`: a non-empty listing means present, an empty
    /// listing or a 450/550 reply means absent.
    pub async fn exists(&mut self, path: &str) -> FtpResult<bool> {
        match self.list(Some(path)).await {
            Ok(entries) => Ok(!entries.is_empty()),
            Err(e) if e.is_missing_path() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a directory and all missing parents. FTP has no `mkdir -p`,
    /// so each component is tried with CWD and created with MKD.
    /// The working directory is restored afterwards.
    pub async fn mkdir_all(&mut self, path: &str) -> FtpResult<()> {
        let original = self.info.current_directory.clone();
        let mut current = if path.starts_with('/') { String::from("/") } else { String::new() };

        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() && !current.ends_with('/') {
                current.push('/');
            }
            current.push_str(component);

            let cwd = self.codec.execute(&format!("CWD {}", current)).await?;
            if cwd.is_completion() {
                continue;
            }
            let mkd = self.codec.execute(&format!("MKD {}", current)).await?;
            // 550 here usually means a concurrent creator won the race.
            if !mkd.is_completion() && mkd.code != 550 {
                return Err(FtpError::from_reply(mkd.code, &mkd.text()));
            }
        }

        self.codec.expect_ok(&format!("CWD {}", original)).await?;
        self.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::client::FtpClient;
    use crate::error::FtpErrorKind;
    use crate::testing::{MissingListing, TestServer};
    use std::time::Duration;

    #[tokio::test]
    async fn exists_checks_listing_and_missing_replies() {
        let server = TestServer::start("pw").await;
        server.put("/in/a.db", b"abc");
        let mut client = FtpClient::connect(server.config()).await.unwrap();

        assert!(client.exists("/in/a.db").await.unwrap());
        assert!(!client.exists("/in/b.db").await.unwrap());

        server.with_state(|s| s.missing_listing = MissingListing::NotFound);
        assert!(!client.exists("/in/c.db").await.unwrap());
    }

    #[tokio::test]
    async fn error_text_in_listing_is_not_a_file() {
        let server = TestServer::start("pw").await;
        server.with_state(|s| {
            s.missing_listing = MissingListing::Text(
                "ls: cannot access '/in/a.db': No such file or directory".into(),
            )
        });
        let mut client = FtpClient::connect(server.config()).await.unwrap();

        assert!(!client.exists("/in/a.db").await.unwrap());
    }

    #[tokio::test]
    async fn stalled_listing_times_out() {
        let server = TestServer::start("pw").await;
        server.with_state(|s| s.stall_listing = true);
        let mut config = server.config();
        config.data_timeout_sec = 1;
        let mut client = FtpClient::connect(config).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), client.exists("/in/a.db"))
            .await
            .expect("client gave up on its own");
        let err = result.err().unwrap();
        assert_eq!(err.kind, FtpErrorKind::Timeout);
    }

    #[tokio::test]
    async fn mkdir_all_creates_each_level_and_restores_cwd() {
        let server = TestServer::start("pw").await;
        let mut client = FtpClient::connect(server.config()).await.unwrap();

        client.mkdir_all("/a/b/c").await.unwrap();
        // Already there: a no-op.
        client.mkdir_all("/a/b/c/").await.unwrap();

        for d in ["/a", "/a/b", "/a/b/c"] {
            assert!(server.has_dir(d), "{} missing", d);
        }
        assert_eq!(client.info.current_directory, "/");
    }
}
