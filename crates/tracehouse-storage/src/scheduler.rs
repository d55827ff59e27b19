//! Flush Scheduler
//!
//! Owns the trace buffer, the debounce timer and the set of running flush tasks.
//!
//! ## Flush Cycle
//!
//! ```text
//! timer fires (or flush_now / shutdown)
//!     │
//!     ├─ 1. swap the buffer map for an empty one (single exchange)
//!     ├─ 2. merge each non-empty principal set into the pending-flush map
//!     ├─ 3. for each pending principal whose lock is free:
//!     │       take the lock, remove its set, spawn a FlushTask
//!     │       (task id, registered in the live-task set)
//!     └─ 4. principals whose lock is held stay pending; the task holding
//!           the lock picks them up before releasing it
//! ```
//!
//! ## Per-Principal Serialization
//!
//! Each principal has a `tokio::sync::Mutex` in a `DashMap`. A task owns the
//! guard for its whole lifetime, so two tasks never write the same principal's
//! files at once, and successive cycles reach disk in cycle order. Different
//! principals flush in parallel. A lock nobody holds is pruned when its task ends.
//!
//! The actual file writes run on the blocking pool (`spawn_blocking`).
//!
//! ## Shutdown
//!
//! `shutdown` stops the timer, closes the buffer with one final cycle, then waits
//! up to the drain timeout for the live-task set to empty. A timeout never
//! cancels a task; it keeps running detached and the `DrainReport` says so.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Notify, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracehouse_core::{BufferedTrace, PrincipalId};

use crate::buffer::{Snapshot, TraceBuffer};
use crate::debounce::Debouncer;
use crate::error::{Error, Result};
use crate::writer::{CategoryWriter, FlushOutcome};

/// Scheduler tuning, usually taken from `TraceStoreConfig`.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub flush_delay: Duration,
    pub drain_timeout: Duration,
    pub max_pending_per_principal: Option<usize>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            flush_delay: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(10),
            max_pending_per_principal: None,
        }
    }
}

/// What shutdown managed to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks live when draining started
    pub tasks: usize,

    /// Tasks that finished within the timeout
    pub completed: usize,

    pub elapsed: Duration,

    /// True if the timeout expired with tasks still running
    pub timed_out: bool,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        !self.timed_out
    }
}

type PrincipalLock = Arc<tokio::sync::Mutex<()>>;

struct SchedulerInner {
    buffer: TraceBuffer,
    writer: CategoryWriter,
    debouncer: Debouncer,
    drain_timeout: Duration,

    /// Traces captured by a cycle but not yet handed to a task
    pending: Mutex<Snapshot>,
    principal_locks: DashMap<PrincipalId, PrincipalLock>,

    next_task_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
    idle: Notify,

    shutting_down: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Debounced, per-principal-serialized flushing of buffered traces.
pub struct FlushScheduler {
    inner: Arc<SchedulerInner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    /// Create the scheduler and start its debounce timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(writer: CategoryWriter, options: SchedulerOptions) -> Self {
        let inner = Arc::new(SchedulerInner {
            buffer: TraceBuffer::new(options.max_pending_per_principal),
            writer,
            debouncer: Debouncer::new(options.flush_delay),
            drain_timeout: options.drain_timeout,
            pending: Mutex::new(HashMap::new()),
            principal_locks: DashMap::new(),
            next_task_id: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
            idle: Notify::new(),
            shutting_down: AtomicBool::new(false),
        });

        // the timer task only holds a weak reference so dropping the scheduler ends it
        let weak = Arc::downgrade(&inner);
        let timer = inner.debouncer.spawn(move || {
            if let Some(inner) = weak.upgrade() {
                inner.run_cycle(false);
            }
        });

        tracing::info!(
            flush_delay_ms = options.flush_delay.as_millis() as u64,
            drain_timeout_ms = options.drain_timeout.as_millis() as u64,
            max_pending_per_principal = ?options.max_pending_per_principal,
            "Flush scheduler started"
        );

        Self {
            inner,
            timer: Mutex::new(Some(timer)),
        }
    }

    /// Buffer a trace and re-arm the debounce timer.
    pub fn add(&self, principal: PrincipalId, trace: BufferedTrace) -> Result<()> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }

        let trace_id = trace.id();
        self.inner.buffer.add(principal, trace)?;
        self.inner.debouncer.arm();

        tracing::trace!(principal = %principal, trace_id = %trace_id, "Trace buffered");
        Ok(())
    }

    /// Run a flush cycle immediately. Returns the number of tasks spawned.
    pub fn flush_now(&self) -> usize {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return 0;
        }
        self.inner.run_cycle(false)
    }

    /// Number of flush tasks still running.
    pub fn live_tasks(&self) -> usize {
        lock(&self.inner.live).len()
    }

    /// Traces buffered and not yet captured by a cycle.
    pub fn buffered(&self) -> usize {
        self.inner.buffer.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    /// Wait until no flush task is running. `false` if `timeout` expired first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.inner.wait_idle()).await.is_ok()
    }

    /// Stop accepting traces, flush everything buffered and wait for the
    /// flush tasks, up to the drain timeout.
    pub async fn shutdown(&self) -> DrainReport {
        let started = Instant::now();

        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            return DrainReport {
                tasks: self.live_tasks(),
                completed: 0,
                elapsed: started.elapsed(),
                timed_out: false,
            };
        }

        tracing::info!("Shutting down flush scheduler, flushing buffered traces");

        self.inner.debouncer.stop();
        let timer = lock(&self.timer).take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                tracing::warn!(error = %e, "Debounce timer task ended abnormally");
            }
        }

        self.inner.run_cycle(true);

        let tasks = self.live_tasks();
        let finished = self.wait_idle(self.inner.drain_timeout).await;
        let remaining = self.live_tasks();

        let report = DrainReport {
            tasks,
            completed: tasks.saturating_sub(remaining),
            elapsed: started.elapsed(),
            timed_out: !finished,
        };

        if finished {
            tracing::info!(
                tasks = report.tasks,
                completed = report.completed,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Flush scheduler drained"
            );
        } else {
            tracing::warn!(
                tasks = report.tasks,
                completed = report.completed,
                remaining = remaining,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Drain timeout expired, detaching running flush tasks"
            );
        }

        report
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.inner.debouncer.stop();
    }
}

impl SchedulerInner {
    fn run_cycle(self: &Arc<Self>, final_cycle: bool) -> usize {
        let snapshot = if final_cycle {
            self.buffer.close()
        } else {
            self.buffer.take()
        };
        let captured: usize = snapshot.values().map(Vec::len).sum();

        let mut pending = lock(&self.pending);
        for (principal, traces) in snapshot {
            if !traces.is_empty() {
                pending.entry(principal).or_default().extend(traces);
            }
        }

        let principals: Vec<PrincipalId> = pending.keys().copied().collect();
        let mut spawned = 0;
        let mut deferred = 0;
        for principal in principals {
            let principal_lock = self
                .principal_locks
                .entry(principal)
                .or_default()
                .clone();

            let Ok(guard) = principal_lock.try_lock_owned() else {
                // a running task for this principal will pick these up
                deferred += 1;
                continue;
            };

            if let Some(traces) = pending.remove(&principal) {
                self.spawn_task(principal, guard, traces);
                spawned += 1;
            }
        }
        drop(pending);

        if captured > 0 || spawned > 0 || deferred > 0 {
            tracing::info!(
                traces = captured,
                tasks = spawned,
                deferred = deferred,
                final_cycle = final_cycle,
                "Flush cycle started"
            );
        }

        spawned
    }

    fn spawn_task(
        self: &Arc<Self>,
        principal: PrincipalId,
        guard: OwnedMutexGuard<()>,
        traces: Vec<BufferedTrace>,
    ) {
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(self);

        // registered before the task can deregister itself
        let mut live = lock(&self.live);
        live.insert(task_id);
        tokio::spawn(async move {
            inner.run_task(task_id, principal, guard, traces).await;
            inner.deregister(task_id);
        });
    }

    async fn run_task(
        &self,
        task_id: u64,
        principal: PrincipalId,
        guard: OwnedMutexGuard<()>,
        mut traces: Vec<BufferedTrace>,
    ) {
        let started = Instant::now();
        let mut total = FlushOutcome::default();
        let mut batches = 0;

        loop {
            batches += 1;
            let count = traces.len();
            let writer = self.writer.clone();

            match tokio::task::spawn_blocking(move || writer.write(&principal, traces)).await {
                Ok(outcome) => {
                    total.groups_written += outcome.groups_written;
                    total.groups_failed += outcome.groups_failed;
                    total.rows_written += outcome.rows_written;
                }
                Err(e) => {
                    total.groups_failed += 1;
                    tracing::error!(
                        task_id = task_id,
                        principal = %principal,
                        dropped = count,
                        error = %e,
                        "Flush task write panicked, traces dropped"
                    );
                }
            }

            // traces captured for this principal while we held its lock
            {
                let mut pending = lock(&self.pending);
                match pending.remove(&principal) {
                    Some(next) => traces = next,
                    None => {
                        drop(guard);
                        self.principal_locks
                            .remove_if(&principal, |_, l| Arc::strong_count(l) == 1);
                        break;
                    }
                }
            }
        }

        tracing::info!(
            task_id = task_id,
            principal = %principal,
            batches = batches,
            rows = total.rows_written,
            groups = total.groups_written,
            groups_failed = total.groups_failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Flush task completed"
        );
    }

    fn deregister(&self, task_id: u64) {
        let mut live = lock(&self.live);
        live.remove(&task_id);
        if live.is_empty() {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if lock(&self.live).is_empty() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::writer::FixedClock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;
    use tracehouse_core::{Trace, TraceLevel};

    fn scheduler(dir: &TempDir, flush_delay: Duration) -> FlushScheduler {
        let clock = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let writer = CategoryWriter::new(dir.path(), true, RetryPolicy::default())
            .with_clock(Arc::new(FixedClock(clock)));
        FlushScheduler::start(
            writer,
            SchedulerOptions {
                flush_delay,
                drain_timeout: Duration::from_secs(5),
                max_pending_per_principal: None,
            },
        )
    }

    fn trace(category: &str) -> BufferedTrace {
        BufferedTrace::new(Trace::new(TraceLevel::Info, Utc::now(), category))
    }

    fn message_trace(category: &str, message: &str) -> BufferedTrace {
        BufferedTrace::new(Trace::new(TraceLevel::Info, Utc::now(), category).with_message(message))
    }

    fn data_rows(path: &std::path::Path) -> usize {
        std::fs::read_to_string(path)
            .map(|text| text.matches("\r\n").count().saturating_sub(1))
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_flush_now_writes_buffered_traces() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir, Duration::from_secs(60));
        let principal = PrincipalId::random();

        scheduler.add(principal, trace("a")).unwrap();
        scheduler.add(principal, trace("a")).unwrap();
        assert_eq!(scheduler.buffered(), 2);

        assert_eq!(scheduler.flush_now(), 1);
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(scheduler.live_tasks(), 0);

        let path = dir.path().join(principal.dir_name()).join("a").join("2024_05_01.csv");
        assert_eq!(data_rows(&path), 2);
    }

    #[tokio::test]
    async fn test_empty_cycle_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir, Duration::from_secs(60));
        assert_eq!(scheduler.flush_now(), 0);
        assert!(scheduler.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_debounce_triggers_flush() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir, Duration::from_millis(50));
        let principal = PrincipalId::random();

        scheduler.add(principal, trace("d")).unwrap();

        let path = dir.path().join(principal.dir_name()).join("d").join("2024_05_01.csv");
        for _ in 0..100 {
            if data_rows(&path) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(data_rows(&path), 1);
        assert_eq!(scheduler.buffered(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir, Duration::from_secs(60));
        let principals: Vec<PrincipalId> = (0..4).map(|_| PrincipalId::random()).collect();

        for principal in &principals {
            for _ in 0..10 {
                scheduler.add(*principal, trace("s")).unwrap();
            }
        }

        let report = scheduler.shutdown().await;
        assert!(report.is_complete());
        assert_eq!(report.tasks, 4);
        assert_eq!(report.completed, 4);

        for principal in &principals {
            let path = dir.path().join(principal.dir_name()).join("s").join("2024_05_01.csv");
            assert_eq!(data_rows(&path), 10);
        }

        assert!(matches!(
            scheduler.add(principals[0], trace("s")),
            Err(Error::ShuttingDown)
        ));
        assert_eq!(scheduler.flush_now(), 0);

        let again = scheduler.shutdown().await;
        assert_eq!(again.tasks, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_busy_principal_defers_next_cycle() {
        use fs2::FileExt;

        let dir = TempDir::new().unwrap();
        let clock = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let retry = RetryPolicy {
            max_attempts: 500,
            delay: Duration::from_millis(10),
        };
        let writer = CategoryWriter::new(dir.path(), true, retry).with_clock(Arc::new(FixedClock(clock)));
        let scheduler = FlushScheduler::start(
            writer,
            SchedulerOptions {
                flush_delay: Duration::from_secs(60),
                drain_timeout: Duration::from_secs(5),
                max_pending_per_principal: None,
            },
        );
        let principal = PrincipalId::random();

        let path = dir.path().join(principal.dir_name()).join("q").join("2024_05_01.csv");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let holder = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        holder.try_lock_exclusive().unwrap();

        scheduler.add(principal, message_trace("q", "first")).unwrap();
        assert_eq!(scheduler.flush_now(), 1);

        // the first task is stuck behind the file lock and still owns the principal
        scheduler.add(principal, message_trace("q", "second")).unwrap();
        assert_eq!(scheduler.flush_now(), 0);
        assert_eq!(scheduler.live_tasks(), 1);

        FileExt::unlock(&holder).unwrap();
        assert!(scheduler.wait_idle(Duration::from_secs(10)).await);

        let records = crate::csv::parse_records(&std::fs::read_to_string(&path).unwrap());
        let messages: Vec<&str> = records[1..].iter().map(|r| r[7].as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(scheduler.buffered(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_back_to_back_cycles_keep_every_trace() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir, Duration::from_secs(60));
        let principal = PrincipalId::random();

        for _ in 0..20 {
            for _ in 0..5 {
                scheduler.add(principal, trace("c")).unwrap();
            }
            scheduler.flush_now();
        }

        assert!(scheduler.wait_idle(Duration::from_secs(10)).await);
        let path = dir.path().join(principal.dir_name()).join("c").join("2024_05_01.csv");
        assert_eq!(data_rows(&path), 100);
    }
}
