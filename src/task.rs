//! The upload task: connect, walk the local directory, upload or prune
//! each file, disconnect.
//!
//! A server rejection of a single STOR is recorded and the run moves on;
//! any other failure aborts the run after a best-effort QUIT.

use crate::config::UploaderConfig;
use crate::error::{UploadError, UploadResult};
use crate::local::{self, LocalFile};
use crate::policy::{FileAction, FileRules};
use crate::remote::RemoteStore;
use crate::report::{FileReport, RunReport};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uploader_ftp::FtpClient;

pub struct UploadTask {
    config: UploaderConfig,
    rules: FileRules,
}

impl UploadTask {
    /// Validate `config` and build a task from it.
    pub fn new(config: UploaderConfig) -> UploadResult<Self> {
        config.validate()?;
        let rules = FileRules {
            database_suffix: config.upload.database_suffix.clone(),
            metadata_suffix: config.upload.metadata_suffix.clone(),
        };
        Ok(Self { config, rules })
    }

    /// Run on a background tokio task.
    pub fn spawn(self) -> JoinHandle<UploadResult<RunReport>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Connect to the configured server and run against it.
    pub async fn run(&self) -> UploadResult<RunReport> {
        let mut client = FtpClient::connect(self.config.connection())
            .await
            .map_err(|e| log_failure(e.into()))?;
        self.run_with(&mut client).await
    }

    /// Run against an already connected store. The store is always
    /// asked to quit before returning.
    pub async fn run_with<R>(&self, remote: &mut R) -> UploadResult<RunReport>
    where
        R: RemoteStore + ?Sized,
    {
        let up = &self.config.upload;
        let mut report = RunReport::new(&self.config.server.host, &up.remote_dir, up.dry_run);

        match self.sync(remote, &mut report).await {
            Ok(()) => {
                // Everything is done by now; a failed QUIT changes nothing.
                if let Err(quit_err) = remote.quit().await {
                    warn!("QUIT after upload: {}", quit_err);
                }
                report.finish();
                info!(
                    "Upload finished: {} uploaded ({} bytes), {} deleted locally, {} rejected",
                    report.uploaded(),
                    report.uploaded_bytes(),
                    report.deleted(),
                    report.rejected()
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(quit_err) = remote.quit().await {
                    debug!("QUIT after failure: {}", quit_err);
                }
                Err(log_failure(e))
            }
        }
    }

    async fn sync<R>(&self, remote: &mut R, report: &mut RunReport) -> UploadResult<()>
    where
        R: RemoteStore + ?Sized,
    {
        let up = &self.config.upload;

        if up.create_remote_dir && !up.dry_run {
            remote.ensure_dir(&up.remote_dir).await?;
        }

        let files = local::list_files(&up.local_dir).await?;
        if files.is_empty() {
            info!("Nothing to upload in {}", up.local_dir.display());
        }

        for file in &files {
            let entry = self.process(remote, file).await?;
            report.files.push(entry);
        }
        Ok(())
    }

    async fn process<R>(&self, remote: &mut R, file: &LocalFile) -> UploadResult<FileReport>
    where
        R: RemoteStore + ?Sized,
    {
        let up = &self.config.upload;
        let remote_path = self.config.remote_path(&file.name);
        let remote_exists = remote.exists(&remote_path).await?;

        // Earlier deletions may change which file is newest.
        let is_newest = if self.rules.needs_newest(&file.name, remote_exists) {
            local::newest_file(&up.local_dir, up.newest_scope, &self.rules.database_suffix)
                .await
                .is_some_and(|newest| newest == file.path)
        } else {
            false
        };

        let action = self.rules.decide(&file.name, remote_exists, is_newest);
        let mut entry = FileReport {
            name: file.name.clone(),
            size: file.size,
            remote_path: remote_path.clone(),
            remote_exists,
            action,
            executed: !up.dry_run,
            upload: None,
            upload_error: None,
            local_deleted: false,
        };

        if up.dry_run {
            info!("[dry-run] {} → {:?}", file.name, action);
            return Ok(entry);
        }

        if action.transfers() {
            let (label, result) = match action {
                FileAction::Reupload { .. } => ("File reupload", " Result"),
                _ => ("File upload", ""),
            };
            match remote.upload(&file.path, &remote_path).await {
                Ok(outcome) => {
                    debug!(
                        "{} : {}{} {} {}",
                        label, file.name, result, outcome.reply_code, outcome.reply_text
                    );
                    entry.upload = Some(outcome);
                }
                Err(e) if e.is_rejection() => {
                    // Local copy stays for the next run.
                    warn!("{} : {} rejected {}", label, file.name, e);
                    entry.upload_error = Some(e.to_string());
                    return Ok(entry);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if action.deletes_local() {
            entry.local_deleted = local::remove_local(&file.path).await;
        }
        Ok(entry)
    }
}

fn log_failure(e: UploadError) -> UploadError {
    error!("FTP Upload Error : {}", e);
    e
}
