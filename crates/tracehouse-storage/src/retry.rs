//! Sharing-Violation Retry
//!
//! Another process (a spreadsheet, a backup agent, a second server instance) may
//! hold a trace file open in a conflicting mode. Those failures are transient,
//! so file operations are retried with a fixed delay:
//!
//! ```text
//! Attempt 1: immediate
//! Attempt 2: wait 100ms
//! ...
//! Attempt 10: wait 100ms, then give up with SharingViolation
//! ```
//!
//! ## Retryable vs Non-Retryable
//!
//! **Retryable**:
//! - Windows `ERROR_SHARING_VIOLATION` (32) and `ERROR_LOCK_VIOLATION` (33)
//! - `WouldBlock`, which is how a contended advisory lock is reported on Unix
//!
//! **Non-Retryable**: everything else (missing permissions, full disk, ...).
//!
//! The operation runs on a blocking thread, so the delay is a thread sleep.

use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

const ERROR_SHARING_VIOLATION: i32 = 32;
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Fixed-delay retry policy for sharing violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_millis(100),
        }
    }
}

/// True if `err` means the file is held by another handle.
pub fn is_sharing_violation(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    cfg!(windows)
        && matches!(
            err.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
        )
}

/// Run `operation` until it succeeds, fails with a non-sharing error, or the
/// policy's attempts are used up.
pub fn retry_on_sharing_violation<T, F>(policy: &RetryPolicy, path: &Path, mut operation: F) -> Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation() {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        path = %path.display(),
                        attempt = attempt,
                        "File operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if is_sharing_violation(&e) => {
                if attempt >= max_attempts {
                    return Err(Error::SharingViolation {
                        path: path.display().to_string(),
                        attempts: attempt,
                    });
                }
                warn!(
                    path = %path.display(),
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    "File is locked, retrying"
                );
                std::thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}
