//! Debounce Timer
//!
//! A single re-armable deadline shared by all ingestion calls. Every `arm`
//! pushes the deadline to `now + delay`; the callback runs once the deadline
//! passes without being pushed again. This coalesces a burst of traces into one
//! flush cycle instead of ticking on a fixed interval.
//!
//! ```text
//! add  add add        add
//!  │    │   │          │
//!  ▼    ▼   ▼          ▼
//! ─┬────┬───┬──────────┬────────────────►
//!           └─ delay ─►fire  └─ delay ─►fire
//! ```
//!
//! The deadline lives in a `tokio::sync::watch` channel and is consumed by one
//! background task, so `arm` is a non-blocking store. Dropping the `Debouncer`
//! or calling `stop` ends the task.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    Idle,
    At(Instant),
    Stopped,
}

/// Handle used to (re)arm and stop the timer.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: watch::Sender<Deadline>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        let (deadline, _) = watch::channel(Deadline::Idle);
        Self { delay, deadline }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Move the deadline to `delay` from now. No effect once stopped.
    pub fn arm(&self) {
        let at = Instant::now() + self.delay;
        self.deadline.send_if_modified(|deadline| {
            if *deadline == Deadline::Stopped {
                return false;
            }
            *deadline = Deadline::At(at);
            true
        });
    }

    /// Stop the timer for good; a pending deadline never fires.
    pub fn stop(&self) {
        self.deadline.send_replace(Deadline::Stopped);
    }

    pub fn is_stopped(&self) -> bool {
        *self.deadline.borrow() == Deadline::Stopped
    }

    /// Spawn the task that runs `on_fire` each time a deadline passes.
    pub fn spawn<F>(&self, mut on_fire: F) -> JoinHandle<()>
    where
        F: FnMut() + Send + 'static,
    {
        let mut rx = self.deadline.subscribe();

        tokio::spawn(async move {
            let mut fired: Option<Instant> = None;

            loop {
                let current = *rx.borrow_and_update();
                match current {
                    Deadline::Stopped => return,
                    Deadline::At(at) if fired != Some(at) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(at) => {
                                // re-armed while sleeping: wait for the new deadline
                                if *rx.borrow() != current {
                                    continue;
                                }
                                fired = Some(at);
                                tracing::trace!("Debounce deadline reached");
                                on_fire();
                            }
                            changed = rx.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    _ => {
                        if rx.changed().await.is_err() {
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(debouncer: &Debouncer) -> (Arc<AtomicUsize>, JoinHandle<()>) {
        let fires = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fires);
        let handle = debouncer.spawn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (fires, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_fire() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let (fires, _handle) = counting(&debouncer);

        for _ in 0..10 {
            debouncer.arm();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(fires.load(Ordering::SeqCst), 0, "deadline kept moving");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        // idle timer does not fire again
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_after_fire() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let (fires, _handle) = counting(&debouncer);

        debouncer.arm();
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.arm();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(fires.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_deadline() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let (fires, handle) = counting(&debouncer);

        debouncer.arm();
        debouncer.stop();
        handle.await.unwrap();

        debouncer.arm();
        assert!(debouncer.is_stopped());
        assert_eq!(fires.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_ends_task() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        let (_fires, handle) = counting(&debouncer);
        drop(debouncer);
        handle.await.unwrap();
    }
}
