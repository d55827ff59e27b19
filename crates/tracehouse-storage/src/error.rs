//! Storage Error Types
//!
//! ## Error Categories
//!
//! ### Input Errors (rejected synchronously, never reach the flush path)
//! - `Core`: invalid principal, malformed trace, bad key secret
//! - `InvalidKey`: opaque key could not be resolved to a principal
//! - `BufferFull`: the principal already has the maximum number of pending traces
//! - `ShuttingDown`: the store no longer accepts traces
//!
//! ### Configuration Errors
//! - `Config`: `TraceStoreConfig::validate` failed
//!
//! ### I/O Errors
//! - `Io`: file system operation failed
//! - `SharingViolation`: the file stayed locked by another handle after all retries
//!
//! Input errors are the caller's fault; `is_client_error` lets the HTTP layer map
//! them to 4xx responses.

use thiserror::Error;
use tracehouse_core::{CoreError, PrincipalId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Invalid key")]
    InvalidKey,

    #[error("Too many pending traces for principal {principal} (limit {limit})")]
    BufferFull { principal: PrincipalId, limit: usize },

    #[error("Trace store is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sharing violation on {path} after {attempts} attempts")]
    SharingViolation { path: String, attempts: u32 },
}

impl Error {
    /// True for errors caused by caller input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Core(_) | Error::InvalidKey)
    }
}
