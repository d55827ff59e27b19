//! Trace Buffer
//!
//! In-memory accumulator of traces waiting for the next flush cycle, keyed by
//! principal.
//!
//! ## Concurrency
//!
//! - `add` takes a short, I/O-free critical section on a `std::sync::Mutex`
//! - `take` swaps the whole map for an empty one in the same critical section,
//!   so every concurrent `add` lands either in the captured snapshot or in the
//!   fresh map; none is lost or seen twice
//! - `close` is a final `take` that also makes every later `add` fail
//!
//! A principal's pending set is an unordered multiset. Ordering is restored by
//! the writer (event timestamp, then server-received sequence).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracehouse_core::{BufferedTrace, PrincipalId};

use crate::error::{Error, Result};

/// Traces captured by one `take`, keyed by principal.
pub type Snapshot = HashMap<PrincipalId, Vec<BufferedTrace>>;

#[derive(Debug, Default)]
struct BufferState {
    pending: Snapshot,
    closed: bool,
}

/// Concurrency-safe per-principal accumulator.
#[derive(Debug, Default)]
pub struct TraceBuffer {
    state: Mutex<BufferState>,
    max_pending_per_principal: Option<usize>,
}

impl TraceBuffer {
    pub fn new(max_pending_per_principal: Option<usize>) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            max_pending_per_principal,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        // a panic while holding the lock cannot leave the map half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a trace to the principal's pending set.
    pub fn add(&self, principal: PrincipalId, trace: BufferedTrace) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::ShuttingDown);
        }

        let pending = state.pending.entry(principal).or_default();
        if let Some(limit) = self.max_pending_per_principal {
            if pending.len() >= limit {
                return Err(Error::BufferFull { principal, limit });
            }
        }
        pending.push(trace);
        Ok(())
    }

    /// Swap out everything buffered so far.
    pub fn take(&self) -> Snapshot {
        std::mem::take(&mut self.lock().pending)
    }

    /// Final `take`; rejects all later adds.
    pub fn close(&self) -> Snapshot {
        let mut state = self.lock();
        state.closed = true;
        std::mem::take(&mut state.pending)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of traces pending for one principal.
    pub fn pending_for(&self, principal: &PrincipalId) -> usize {
        self.lock().pending.get(principal).map_or(0, Vec::len)
    }

    /// Total number of pending traces.
    pub fn len(&self) -> usize {
        self.lock().pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use tracehouse_core::{Trace, TraceLevel};

    fn buffered() -> BufferedTrace {
        BufferedTrace::new(Trace::new(TraceLevel::Info, Utc::now(), "x"))
    }

    #[test]
    fn test_add_and_take() {
        let buffer = TraceBuffer::default();
        let a = PrincipalId::random();
        let b = PrincipalId::random();

        buffer.add(a, buffered()).unwrap();
        buffer.add(a, buffered()).unwrap();
        buffer.add(b, buffered()).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.pending_for(&a), 2);

        let snapshot = buffer.take();
        assert_eq!(snapshot[&a].len(), 2);
        assert_eq!(snapshot[&b].len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_limit_rejects_without_growing() {
        let buffer = TraceBuffer::new(Some(2));
        let principal = PrincipalId::random();

        buffer.add(principal, buffered()).unwrap();
        buffer.add(principal, buffered()).unwrap();
        let err = buffer.add(principal, buffered()).unwrap_err();
        assert!(matches!(err, Error::BufferFull { limit: 2, .. }));
        assert_eq!(buffer.pending_for(&principal), 2);

        // other principals are unaffected
        buffer.add(PrincipalId::random(), buffered()).unwrap();

        // a take frees the slots again
        buffer.take();
        buffer.add(principal, buffered()).unwrap();
    }

    #[test]
    fn test_closed_buffer_rejects_adds() {
        let buffer = TraceBuffer::default();
        let principal = PrincipalId::random();
        buffer.add(principal, buffered()).unwrap();

        let last = buffer.close();
        assert_eq!(last[&principal].len(), 1);
        assert!(buffer.is_closed());
        assert!(matches!(buffer.add(principal, buffered()), Err(Error::ShuttingDown)));
    }

    #[test]
    fn test_concurrent_adds_not_lost_across_takes() {
        let buffer = Arc::new(TraceBuffer::default());
        let principal = PrincipalId::random();

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        buffer.add(principal, buffered()).unwrap();
                    }
                })
            })
            .collect();

        let mut taken = 0;
        while writers.iter().any(|w| !w.is_finished()) {
            taken += buffer.take().values().map(Vec::len).sum::<usize>();
        }
        for writer in writers {
            writer.join().unwrap();
        }
        taken += buffer.take().values().map(Vec::len).sum::<usize>();

        assert_eq!(taken, 8 * 500);
    }
}
