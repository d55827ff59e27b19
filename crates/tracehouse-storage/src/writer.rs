//! Category Writer
//!
//! Turns one flush task's traces into CSV rows on disk.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   <principal, 32 hex digits>/
//!     <category segment>/
//!       <category segment>/
//!         2024_05_01.csv     ← one file per UTC day, day taken at flush time
//! ```
//!
//! ## Write Path (per category group)
//!
//! 1. Sort the group by event timestamp, ties broken by server-received order
//! 2. Create parent directories, open the day file for append
//! 3. Take an exclusive advisory lock (`fs2`) for the duration of the write
//! 4. Empty file: write the header (and a BOM when Excel compatibility is on)
//! 5. Existing file: read its header and lay value cells out in that order;
//!    value keys the header does not know are appended as trailing cells
//! 6. Write all rows with a single `write_all`
//!
//! Steps 2-6 are retried on sharing violations. A failing group is logged and
//! skipped; it never affects sibling groups.
//!
//! ## Columns
//!
//! `Id, ReceivedUtc, Category, Version, Level, Timestamp, TraceId, Message`,
//! then one column per distinct value key, sorted by lower-cased key.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use tracehouse_core::{category_path, BufferedTrace, PrincipalId};

use crate::csv::{parse_row, RowWriter, UTF8_BOM};
use crate::error::Result;
use crate::retry::{retry_on_sharing_violation, RetryPolicy};

/// Columns written before the value columns, in order.
pub const FIXED_COLUMNS: [&str; 8] = [
    "Id",
    "ReceivedUtc",
    "Category",
    "Version",
    "Level",
    "Timestamp",
    "TraceId",
    "Message",
];

/// Source of "now" for choosing the day file.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Name of the file holding traces flushed on `day`.
pub fn day_file_name(day: DateTime<Utc>) -> String {
    day.format("%Y_%m_%d.csv").to_string()
}

/// Result of writing one task's traces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub groups_written: usize,
    pub groups_failed: usize,
    pub rows_written: usize,
}

impl FlushOutcome {
    pub fn is_complete(&self) -> bool {
        self.groups_failed == 0
    }
}

/// Writes category groups for one principal at a time.
#[derive(Clone)]
pub struct CategoryWriter {
    root: PathBuf,
    excel_compatible: bool,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CategoryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryWriter")
            .field("root", &self.root)
            .field("excel_compatible", &self.excel_compatible)
            .field("retry", &self.retry)
            .finish()
    }
}

impl CategoryWriter {
    pub fn new(root: impl Into<PathBuf>, excel_compatible: bool, retry: RetryPolicy) -> Self {
        Self {
            root: root.into(),
            excel_compatible,
            retry,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used to pick the day file.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding all of a principal's categories.
    pub fn principal_root(&self, principal: &PrincipalId) -> PathBuf {
        self.root.join(principal.dir_name())
    }

    /// Write every trace for `principal`, one group per category.
    ///
    /// Blocking; run it on a blocking thread.
    pub fn write(&self, principal: &PrincipalId, traces: Vec<BufferedTrace>) -> FlushOutcome {
        let day = day_file_name(self.clock.now());
        let principal_root = self.principal_root(principal);

        let mut groups: BTreeMap<String, Vec<BufferedTrace>> = BTreeMap::new();
        for trace in traces {
            groups.entry(trace.category().to_string()).or_default().push(trace);
        }

        let mut outcome = FlushOutcome::default();
        for (category, mut group) in groups {
            group.sort_by(|a, b| {
                a.trace()
                    .timestamp
                    .cmp(&b.trace().timestamp)
                    .then(a.sequence().cmp(&b.sequence()))
            });

            let path = category_path(&principal_root, &category).join(&day);
            match self.write_group(&path, &group) {
                Ok(rows) => {
                    outcome.groups_written += 1;
                    outcome.rows_written += rows;
                    tracing::debug!(
                        principal = %principal,
                        category = %category,
                        path = %path.display(),
                        rows = rows,
                        "Wrote category group"
                    );
                }
                Err(e) => {
                    outcome.groups_failed += 1;
                    tracing::error!(
                        principal = %principal,
                        category = %category,
                        path = %path.display(),
                        dropped = group.len(),
                        error = %e,
                        "Failed to write category group, traces dropped"
                    );
                }
            }
        }

        outcome
    }

    fn write_group(&self, path: &Path, group: &[BufferedTrace]) -> Result<usize> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        retry_on_sharing_violation(&self.retry, path, || {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)?;
            file.try_lock_exclusive()?;

            let result = self.append_locked(&mut file, path, group);
            let unlocked = FileExt::unlock(&file);
            let rows = result?;
            unlocked?;
            Ok(rows)
        })
    }

    fn append_locked(&self, file: &mut File, path: &Path, group: &[BufferedTrace]) -> io::Result<usize> {
        let mut out = String::new();

        let value_columns = if file.metadata()?.len() == 0 {
            let columns = value_columns(group);
            if self.excel_compatible {
                out.push_str(UTF8_BOM);
            }
            let mut header = RowWriter::new(self.excel_compatible);
            for name in FIXED_COLUMNS.iter().copied().chain(columns.iter().map(String::as_str)) {
                header.push(name);
            }
            out.push_str(&header.finish());
            columns
        } else {
            let existing = read_value_columns(file)?;
            reconcile_columns(path, existing, group)
        };

        for trace in group {
            out.push_str(&self.data_row(trace, &value_columns));
        }

        file.write_all(out.as_bytes())?;
        file.flush()?;
        Ok(group.len())
    }

    fn data_row(&self, buffered: &BufferedTrace, value_columns: &[String]) -> String {
        let trace = buffered.trace();
        let mut row = RowWriter::new(self.excel_compatible);

        row.push(&buffered.id().simple().to_string())
            .push(&format_instant(buffered.received_at()))
            .push(buffered.category())
            .push(&trace.version.to_string())
            .push(trace.level.as_str())
            .push(&format_instant(trace.timestamp))
            .push(trace.external_id.as_deref().unwrap_or(""))
            .push(trace.message.as_deref().unwrap_or(""));

        for column in value_columns {
            match trace.values.get(column) {
                Some(value) => row.push(&value.to_cell()),
                None => row.push_empty(),
            };
        }

        row.finish()
    }
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Union of value keys across the group, sorted by lower-cased key, first
/// casing seen kept.
fn value_columns(group: &[BufferedTrace]) -> Vec<String> {
    let mut columns: BTreeMap<String, String> = BTreeMap::new();
    for buffered in group {
        for (folded, display, _) in buffered.trace().values.iter() {
            columns
                .entry(folded.to_string())
                .or_insert_with(|| display.to_string());
        }
    }
    columns.into_values().collect()
}

fn read_value_columns(file: &File) -> io::Result<Vec<String>> {
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line)?;
    Ok(parse_row(&line).into_iter().skip(FIXED_COLUMNS.len()).collect())
}

/// Keep the existing header's value columns and append any new keys after them.
fn reconcile_columns(path: &Path, mut existing: Vec<String>, group: &[BufferedTrace]) -> Vec<String> {
    let known: Vec<String> = existing.iter().map(|c| c.to_lowercase()).collect();
    let extra: Vec<String> = value_columns(group)
        .into_iter()
        .filter(|c| !known.contains(&c.to_lowercase()))
        .collect();

    if !extra.is_empty() {
        tracing::warn!(
            path = %path.display(),
            columns = ?extra,
            "Value keys missing from existing header, appending as trailing cells"
        );
        existing.extend(extra);
    }
    existing
}
