//! TraceHouse Storage
//!
//! Buffering and flushing of traces to per-principal, per-category CSV files.
//!
//! ## Architecture
//!
//! ```text
//! add(key, trace)
//!     │
//!     ▼
//! TraceManager ── KeyCipher::decode_principal
//!     │
//!     ▼
//! FlushScheduler::add ──► TraceBuffer (principal → traces)
//!     │                        │
//!     └─ re-arm Debouncer      │ swap on fire
//!                              ▼
//!                     FlushTask per principal (serialized per principal)
//!                              │
//!                              ▼ spawn_blocking
//!                     CategoryWriter ──► <root>/<principal>/<category>/YYYY_MM_DD.csv
//! ```
//!
//! ## Modules
//!
//! - `buffer`: concurrency-safe per-principal accumulator
//! - `debounce`: re-armable deadline timer
//! - `scheduler`: flush cycles, live-task registry, drain on shutdown
//! - `writer`: category grouping, headers, advisory locking
//! - `csv`: tab-delimited cell encoding and header parsing
//! - `retry`: sharing-violation retry
//! - `browse`: read-only listing of a principal's files
//! - `manager`: the facade used by the HTTP layer

pub mod browse;
pub mod buffer;
pub mod config;
pub mod csv;
pub mod debounce;
pub mod error;
pub mod manager;
pub mod retry;
pub mod scheduler;
pub mod writer;

pub use browse::{TraceEntry, TraceFile, TraceFolder};
pub use buffer::TraceBuffer;
pub use config::TraceStoreConfig;
pub use error::{Error, Result};
pub use manager::TraceManager;
pub use retry::RetryPolicy;
pub use scheduler::{DrainReport, FlushScheduler, SchedulerOptions};
pub use writer::{CategoryWriter, Clock, FixedClock, FlushOutcome, SystemClock};
