//! Trace Store Configuration
//!
//! ## TraceStoreConfig
//!
//! Controls where traces land and how the buffer is flushed:
//!
//! - **password**: secret used to derive the opaque-key cipher (required)
//! - **directory**: root storage directory (default: `Traces`)
//! - **flush_delay_ms**: debounce delay after the most recent trace (default: 1s)
//! - **drain_timeout_ms**: how long shutdown waits for flush tasks (default: 10s)
//! - **file_retry_count**: attempts on a sharing violation (default: 10)
//! - **file_retry_delay_ms**: pause between those attempts (default: 100ms)
//! - **max_pending_per_principal**: optional cap on buffered traces per principal
//! - **excel_compatible**: write a UTF-8 BOM and truncate cells to Excel's limit (default: true)
//!
//! ## Usage
//!
//! ```ignore
//! use tracehouse_storage::TraceStoreConfig;
//!
//! let config = TraceStoreConfig {
//!     password: "s3cret".to_string(),
//!     directory: "/var/lib/tracehouse".into(),
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStoreConfig {
    /// Secret for opaque key derivation
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Root directory; one subfolder per principal
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Debounce delay in milliseconds, measured from the most recent trace
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,

    /// Maximum time shutdown waits for in-flight flush tasks, in milliseconds
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Attempts made when a file is locked by another handle
    #[serde(default = "default_file_retry_count")]
    pub file_retry_count: u32,

    /// Pause between those attempts, in milliseconds
    #[serde(default = "default_file_retry_delay_ms")]
    pub file_retry_delay_ms: u64,

    /// Optional cap on pending traces per principal (None = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pending_per_principal: Option<usize>,

    /// Write a UTF-8 BOM on new files and truncate cells to Excel's limit
    #[serde(default = "default_excel_compatible")]
    pub excel_compatible: bool,
}

impl Default for TraceStoreConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            directory: default_directory(),
            flush_delay_ms: default_flush_delay_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            file_retry_count: default_file_retry_count(),
            file_retry_delay_ms: default_file_retry_delay_ms(),
            max_pending_per_principal: None,
            excel_compatible: default_excel_compatible(),
        }
    }
}

impl TraceStoreConfig {
    /// Check the configuration before starting a store.
    pub fn validate(&self) -> Result<()> {
        if self.password.is_empty() {
            return Err(Error::Config("password must not be empty".to_string()));
        }
        if self.directory.as_os_str().is_empty() {
            return Err(Error::Config("directory must not be empty".to_string()));
        }
        if self.flush_delay_ms == 0 {
            return Err(Error::Config("flush_delay_ms must be positive".to_string()));
        }
        if self.drain_timeout_ms == 0 {
            return Err(Error::Config("drain_timeout_ms must be positive".to_string()));
        }
        if self.file_retry_count == 0 {
            return Err(Error::Config("file_retry_count must be positive".to_string()));
        }
        if self.max_pending_per_principal == Some(0) {
            return Err(Error::Config(
                "max_pending_per_principal must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.file_retry_count,
            delay: Duration::from_millis(self.file_retry_delay_ms),
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("Traces")
}

fn default_flush_delay_ms() -> u64 {
    1000 // 1 second
}

fn default_drain_timeout_ms() -> u64 {
    10_000 // 10 seconds
}

fn default_file_retry_count() -> u32 {
    10
}

fn default_file_retry_delay_ms() -> u64 {
    100
}

fn default_excel_compatible() -> bool {
    true
}
