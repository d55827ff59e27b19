//! Buffered Traces
//!
//! `BufferedTrace` is the server-side envelope created the moment a trace is
//! accepted. It stamps the trace with a unique id, the received time and a
//! process-wide sequence number, and sanitizes the category once so the flush
//! path never sees raw caller input.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::category::sanitize_category;
use crate::trace::Trace;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A trace accepted by the server, immutable once created.
#[derive(Debug, Clone)]
pub struct BufferedTrace {
    id: Uuid,
    received_at: DateTime<Utc>,
    sequence: u64,
    category: String,
    trace: Trace,
}

impl BufferedTrace {
    /// Wrap a trace received now.
    pub fn new(trace: Trace) -> Self {
        Self::with_received_at(trace, Utc::now())
    }

    /// Wrap a trace with an explicit receive time.
    pub fn with_received_at(trace: Trace, received_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at,
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            category: sanitize_category(&trace.category),
            trace,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Server-received order; breaks timestamp ties when writing.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Sanitized category, segments joined with `/`.
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }
}
