//! # ftps-uploader
//!
//! Uploads the regular files of one local directory to an FTPS server.
//! Database backups already on the server are not re-sent and stale local
//! copies are pruned; metadata files are removed locally once handled.
//!
//! - `config`: TOML config + CLI overrides
//! - `error`: task-level error type
//! - `local`: local directory scanning and deletion
//! - `policy`: per-file upload/delete rules
//! - `remote`: the `RemoteStore` seam over the FTP client
//! - `report`: per-run summary
//! - `task`: the upload run itself
//! - `logging`: subscriber setup for the binary

pub mod config;
pub mod error;
pub mod local;
pub mod logging;
pub mod policy;
pub mod remote;
pub mod report;
pub mod task;

pub use config::{NewestScope, Overrides, Security, UploaderConfig};
pub use error::{UploadError, UploadErrorKind, UploadResult};
pub use policy::{FileAction, FileRules};
pub use remote::RemoteStore;
pub use report::{FileReport, RunReport};
pub use task::UploadTask;
