//! Summary of one upload run.

use crate::policy::FileAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uploader_ftp::UploadOutcome;

/// What happened to one local file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub name: String,
    /// Local size in bytes when the file was listed.
    pub size: u64,
    pub remote_path: String,
    pub remote_exists: bool,
    pub action: FileAction,
    /// `false` in dry-run mode.
    pub executed: bool,
    pub upload: Option<UploadOutcome>,
    /// Server rejection of the STOR, if any.
    pub upload_error: Option<String>,
    pub local_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub host: String,
    pub remote_dir: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn new(host: &str, remote_dir: &str, dry_run: bool) -> Self {
        Self {
            host: host.to_string(),
            remote_dir: remote_dir.to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            files: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn uploaded(&self) -> usize {
        self.files.iter().filter(|f| f.upload.is_some()).count()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.files
            .iter()
            .filter_map(|f| f.upload.as_ref())
            .map(|u| u.bytes)
            .sum()
    }

    pub fn deleted(&self) -> usize {
        self.files.iter().filter(|f| f.local_deleted).count()
    }

    pub fn rejected(&self) -> usize {
        self.files.iter().filter(|f| f.upload_error.is_some()).count()
    }

    pub fn file(&self, name: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.name == name)
    }
}
