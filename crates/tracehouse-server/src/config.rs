//! Server Configuration
//!
//! ## Environment Variables
//!
//! - `TRACES_PASSWORD`: secret for opaque key derivation (required)
//! - `TRACES_DIRECTORY`: storage root (default: `Traces`)
//! - `TRACES_FLUSH_DELAY_MS`: debounce delay (default: 1000)
//! - `TRACES_DRAIN_TIMEOUT_MS`: shutdown drain timeout (default: 10000)
//! - `TRACES_MAX_PENDING`: per-principal pending trace cap (default: unlimited)
//! - `TRACES_EXCEL_COMPATIBLE`: `true`/`false` (default: true)
//! - `TRACES_PORT`: HTTP port (default: 8080)
//! - `RUST_LOG`: log filter (default: info)

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tracehouse_storage::TraceStoreConfig;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub store: TraceStoreConfig,
}

impl ServerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to read variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let password = get("TRACES_PASSWORD")
            .ok_or_else(|| anyhow!("TRACES_PASSWORD environment variable required"))?;

        let mut store = TraceStoreConfig {
            password,
            ..Default::default()
        };

        if let Some(directory) = get("TRACES_DIRECTORY") {
            store.directory = PathBuf::from(directory);
        }
        if let Some(value) = get("TRACES_FLUSH_DELAY_MS") {
            store.flush_delay_ms = parse("TRACES_FLUSH_DELAY_MS", &value)?;
        }
        if let Some(value) = get("TRACES_DRAIN_TIMEOUT_MS") {
            store.drain_timeout_ms = parse("TRACES_DRAIN_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("TRACES_MAX_PENDING") {
            store.max_pending_per_principal = Some(parse("TRACES_MAX_PENDING", &value)?);
        }
        if let Some(value) = get("TRACES_EXCEL_COMPATIBLE") {
            store.excel_compatible = parse("TRACES_EXCEL_COMPATIBLE", &value.to_ascii_lowercase())?;
        }

        let port = match get("TRACES_PORT") {
            Some(value) => parse("TRACES_PORT", &value)?,
            None => DEFAULT_PORT,
        };

        store
            .validate()
            .context("Invalid trace store configuration")?;

        Ok(Self { port, store })
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", name, value))
}
