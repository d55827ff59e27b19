//! Trace Manager
//!
//! Top-level entry point for ingestion. `TraceManager` ties together:
//!
//! - the `KeyCipher` that issues and resolves opaque principal keys
//! - the `FlushScheduler` that buffers traces and flushes them to CSV
//! - read-only browsing of a principal's files
//!
//! ## Thread Safety
//!
//! `TraceManager` is `Send + Sync`; share it as `Arc<TraceManager>`. Ingestion
//! never performs I/O; browsing runs on the blocking pool.
//!
//! ## Usage
//!
//! ```ignore
//! use tracehouse_storage::{TraceManager, TraceStoreConfig};
//!
//! let manager = TraceManager::start(config)?;
//!
//! let key = manager.get_key(&principal);
//! let id = manager.add_with_key(&key, trace)?;
//!
//! // On exit
//! let report = manager.shutdown().await;
//! ```

use std::path::Path;
use std::sync::Arc;

use tracehouse_core::{BufferedTrace, KeyCipher, PrincipalId, Trace};
use uuid::Uuid;

use crate::browse::{self, TraceEntry};
use crate::config::TraceStoreConfig;
use crate::error::{Error, Result};
use crate::scheduler::{DrainReport, FlushScheduler, SchedulerOptions};
use crate::writer::{CategoryWriter, Clock, SystemClock};

/// Ingestion facade over key handling, buffering and browsing.
pub struct TraceManager {
    cipher: KeyCipher,
    scheduler: FlushScheduler,
    config: TraceStoreConfig,
}

impl TraceManager {
    /// Validate `config`, derive the key cipher and start the flush scheduler.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: TraceStoreConfig) -> Result<Self> {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    /// Like `start`, with the clock that picks day files replaced.
    pub fn start_with_clock(config: TraceStoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let cipher = KeyCipher::new(&config.password)?;

        let writer = CategoryWriter::new(
            config.directory.clone(),
            config.excel_compatible,
            config.retry_policy(),
        )
        .with_clock(clock);

        let scheduler = FlushScheduler::start(
            writer,
            SchedulerOptions {
                flush_delay: config.flush_delay(),
                drain_timeout: config.drain_timeout(),
                max_pending_per_principal: config.max_pending_per_principal,
            },
        );

        tracing::info!(
            directory = %config.directory.display(),
            excel_compatible = config.excel_compatible,
            "Trace manager started"
        );

        Ok(Self {
            cipher,
            scheduler,
            config,
        })
    }

    pub fn config(&self) -> &TraceStoreConfig {
        &self.config
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    pub fn scheduler(&self) -> &FlushScheduler {
        &self.scheduler
    }

    /// Buffer a trace for `principal`. Returns the generated trace id.
    pub fn add(&self, principal: PrincipalId, trace: Trace) -> Result<Uuid> {
        let buffered = BufferedTrace::new(trace);
        let id = buffered.id();
        self.scheduler.add(principal, buffered)?;
        Ok(id)
    }

    /// Resolve `key` and buffer the trace for that principal.
    pub fn add_with_key(&self, key: &str, trace: Trace) -> Result<Uuid> {
        let principal = self.resolve_key(key).ok_or(Error::InvalidKey)?;
        self.add(principal, trace)
    }

    /// Opaque key for a principal.
    pub fn get_key(&self, principal: &PrincipalId) -> String {
        self.cipher.encode_principal(principal)
    }

    /// Principal behind an opaque key, if the key is valid.
    pub fn resolve_key(&self, key: &str) -> Option<PrincipalId> {
        self.cipher.decode_principal(key)
    }

    /// File or folder at `relative_path` in the principal's subtree.
    pub async fn entry(&self, principal: PrincipalId, relative_path: &str) -> Result<Option<TraceEntry>> {
        let root = self.config.directory.clone();
        let relative_path = relative_path.to_string();

        tokio::task::spawn_blocking(move || browse::entry(&root, &principal, &relative_path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))
    }

    /// Run a flush cycle now instead of waiting for the debounce delay.
    pub fn flush_now(&self) -> usize {
        self.scheduler.flush_now()
    }

    /// Stop ingestion and drain buffered traces to disk.
    pub async fn shutdown(&self) -> DrainReport {
        self.scheduler.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use tracehouse_core::TraceLevel;

    fn config(dir: &TempDir) -> TraceStoreConfig {
        TraceStoreConfig {
            password: "manager-test".to_string(),
            directory: dir.path().to_path_buf(),
            flush_delay_ms: 60_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = TraceManager::start(TraceStoreConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_key_roundtrip() {
        let dir = TempDir::new().unwrap();
        let manager = TraceManager::start(config(&dir)).unwrap();
        let principal = PrincipalId::random();

        let key = manager.get_key(&principal);
        assert_eq!(manager.resolve_key(&key), Some(principal));
        assert_eq!(manager.resolve_key("garbage"), None);
    }

    #[tokio::test]
    async fn test_add_with_invalid_key() {
        let dir = TempDir::new().unwrap();
        let manager = TraceManager::start(config(&dir)).unwrap();
        let trace = Trace::new(TraceLevel::Info, Utc::now(), "x");

        let err = manager.add_with_key("not-a-key", trace).unwrap_err();
        assert!(matches!(err, Error::InvalidKey));
        assert!(err.is_client_error());
        assert_eq!(manager.scheduler().buffered(), 0);
    }

    #[tokio::test]
    async fn test_add_returns_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let manager = TraceManager::start(config(&dir)).unwrap();
        let principal = PrincipalId::random();
        let key = manager.get_key(&principal);

        let a = manager
            .add_with_key(&key, Trace::new(TraceLevel::Info, Utc::now(), "x"))
            .unwrap();
        let b = manager
            .add(principal, Trace::new(TraceLevel::Info, Utc::now(), "x"))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.scheduler().buffered(), 2);

        let report = manager.shutdown().await;
        assert_eq!(report.tasks, 1);
        assert!(report.is_complete());
    }
}
