//! Per-file upload rules.
//!
//! | remote copy | database file | newest local file | action                  |
//! |-------------|---------------|-------------------|-------------------------|
//! | absent      | any           | any               | upload                  |
//! | present     | no            | any               | re-upload               |
//! | present     | yes           | yes               | keep                    |
//! | present     | yes           | no                | delete local copy       |
//!
//! Metadata files are deleted locally once uploaded or found remotely.

use serde::{Deserialize, Serialize};

/// File classes recognised by suffix.
#[derive(Debug, Clone)]
pub struct FileRules {
    pub database_suffix: String,
    pub metadata_suffix: String,
}

impl Default for FileRules {
    fn default() -> Self {
        Self {
            database_suffix: ".db".into(),
            metadata_suffix: ".json".into(),
        }
    }
}

impl FileRules {
    pub fn is_database(&self, name: &str) -> bool {
        name.ends_with(&self.database_suffix)
    }

    pub fn is_metadata(&self, name: &str) -> bool {
        name.ends_with(&self.metadata_suffix)
    }

    /// Whether deciding about `name` needs to know the newest local file.
    pub fn needs_newest(&self, name: &str, remote_exists: bool) -> bool {
        remote_exists && self.is_database(name)
    }

    /// Decide what to do with `name`. `is_newest` only matters for
    /// database files whose remote copy exists.
    pub fn decide(&self, name: &str, remote_exists: bool, is_newest: bool) -> FileAction {
        let delete_after = self.is_metadata(name);
        if !remote_exists {
            return FileAction::Upload { delete_after };
        }
        if !self.is_database(name) {
            return FileAction::Reupload { delete_after };
        }
        match (is_newest, delete_after) {
            (false, _) => FileAction::DeleteLocal,
            (true, true) => FileAction::DeleteLocal,
            (true, false) => FileAction::Keep,
        }
    }
}

/// What the task does with one local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "action")]
pub enum FileAction {
    /// Remote copy absent: upload, then optionally delete locally.
    Upload { delete_after: bool },
    /// Remote copy present: upload again over it.
    Reupload { delete_after: bool },
    /// Remote copy present and this is the newest backup.
    Keep,
    /// Stale backup (or handled metadata) already on the server.
    DeleteLocal,
}

impl FileAction {
    pub fn transfers(self) -> bool {
        matches!(self, Self::Upload { .. } | Self::Reupload { .. })
    }

    pub fn deletes_local(self) -> bool {
        match self {
            Self::Upload { delete_after } | Self::Reupload { delete_after } => delete_after,
            Self::DeleteLocal => true,
            Self::Keep => false,
        }
    }
}
