//! # uploader-ftp: FTP/FTPS client
//!
//! The subset of the FTP protocol (RFC 959) the uploader needs, plus:
//! - **RFC 2228 / 4217**: AUTH TLS, PBSZ, PROT (Explicit & Implicit FTPS)
//! - **RFC 3659**: SIZE, MLSD listings
//! - **RFC 2389**: FEAT negotiation
//! - **RFC 2428**: EPSV
//!
//! Architecture:
//! - `types`: config, responses, listing entries, session info
//! - `error`: FTP-specific error type
//! - `protocol`: command/response codec on the control channel
//! - `tls`: rustls client config and stream upgrades
//! - `connection`: TCP connect + implicit TLS
//! - `transfer`: passive data channels (PASV/EPSV)
//! - `parser`: Unix/Windows/MLSD LIST parsing
//! - `client`: stateful session (login, FEAT, TYPE, LIST, QUIT)
//! - `directory`: existence checks and directory creation
//! - `file_ops`: streamed uploads (STOR)
//! - `testing`: in-process FTP/FTPS server (tests and feature `test-util`)

pub mod types;
pub mod error;
pub mod protocol;
pub mod tls;
pub mod connection;
pub mod transfer;
pub mod parser;
pub mod client;
pub mod directory;
pub mod file_ops;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::FtpClient;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use file_ops::UploadOutcome;
pub use types::*;
