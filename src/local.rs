//! Local directory access: enumeration, newest-backup lookup, deletion.

use crate::config::NewestScope;
use crate::error::{UploadError, UploadResult};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

/// A regular file found directly inside the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Regular files directly in `dir`, sorted by name. Symlinks are followed;
/// subdirectories and names that are not valid UTF-8 are skipped.
pub async fn list_files(dir: &Path) -> UploadResult<Vec<LocalFile>> {
    let mut rd = fs::read_dir(dir)
        .await
        .map_err(|e| UploadError::local_dir(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = rd
        .next_entry()
        .await
        .map_err(|e| UploadError::local_dir(dir, e))?
    {
        let path = entry.path();
        let meta = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!("Skipping non UTF-8 file name {}", path.display());
            continue;
        };
        files.push(LocalFile {
            path,
            name,
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// The most recently modified file in `dir`, or `None` when the directory
/// is missing, unreadable, or holds no candidate. Ties go to the file that
/// sorts first by name.
pub async fn newest_file(dir: &Path, scope: NewestScope, database_suffix: &str) -> Option<PathBuf> {
    let files = list_files(dir).await.ok()?;
    files
        .into_iter()
        .filter(|f| scope == NewestScope::All || f.name.ends_with(database_suffix))
        .fold(None::<LocalFile>, |best, f| match best {
            Some(b) if b.modified >= f.modified => Some(b),
            _ => Some(f),
        })
        .map(|f| f.path)
}

/// Delete a local file. Failure is logged and reported as `false`.
pub async fn remove_local(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!("Deleted local file {}", path.display());
            true
        }
        Err(e) => {
            warn!("Could not delete {}: {}", path.display(), e);
            false
        }
    }
}
