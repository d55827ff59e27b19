//! Directory Listing
//!
//! Read-only view of a principal's storage subtree, used to browse and
//! download trace files.
//!
//! The requested path is sanitized exactly like a category, so it can only
//! name something below the principal's folder. A path ending in `.csv`
//! (any case) names a file; anything else names a folder, listed one level deep:
//! sub-folders first, then `.csv` files, each group sorted by name.
//!
//! Names in the listing are relative to the storage root and use `/`, e.g.
//! `67e5504410b1426f9247bb680e5fe0c8/api/orders/2024_05_01.csv`.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracehouse_core::{category_path, sanitize_category, PrincipalId};

/// A file in a principal's subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceFile {
    pub name: String,
    pub full_name: String,
    pub parent_full_name: String,
    pub length: u64,
    pub last_write_utc: DateTime<Utc>,

    #[serde(skip)]
    pub path: PathBuf,
}

/// A folder in a principal's subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceFolder {
    pub name: String,
    pub full_name: String,
    pub parent_full_name: String,
    pub is_root: bool,

    /// Immediate children; nested folders are listed without their own entries
    pub entries: Vec<TraceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TraceEntry {
    Folder(TraceFolder),
    File(TraceFile),
}

impl TraceEntry {
    pub fn name(&self) -> &str {
        match self {
            TraceEntry::Folder(folder) => &folder.name,
            TraceEntry::File(file) => &file.name,
        }
    }

    pub fn full_name(&self) -> &str {
        match self {
            TraceEntry::Folder(folder) => &folder.full_name,
            TraceEntry::File(file) => &file.full_name,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, TraceEntry::Folder(_))
    }

    /// Folders before files, then by name.
    fn listing_order(&self, other: &Self) -> Ordering {
        other
            .is_folder()
            .cmp(&self.is_folder())
            .then_with(|| self.name().cmp(other.name()))
    }
}

fn is_csv(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn join_name(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

fn parent_of(full_name: &str) -> String {
    full_name
        .rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_default()
}

fn last_segment(full_name: &str) -> String {
    full_name.rsplit('/').next().unwrap_or(full_name).to_string()
}

fn modified_utc(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

/// Resolve `relative_path` inside the principal's folder under `root`.
///
/// Blocking.
pub fn entry(root: &Path, principal: &PrincipalId, relative_path: &str) -> Option<TraceEntry> {
    let relative = sanitize_category(relative_path);
    let is_root = relative.is_empty();

    let principal_name = principal.dir_name();
    let path = category_path(&root.join(&principal_name), &relative);
    let full_name = join_name(&principal_name, &relative);
    let parent_full_name = if is_root {
        String::new()
    } else {
        parent_of(&full_name)
    };

    if is_csv(&relative) {
        let metadata = fs::metadata(&path).ok().filter(|m| m.is_file())?;
        return Some(TraceEntry::File(TraceFile {
            name: last_segment(&full_name),
            full_name,
            parent_full_name,
            length: metadata.len(),
            last_write_utc: modified_utc(&metadata),
            path,
        }));
    }

    let mut folder = TraceFolder {
        name: last_segment(&full_name),
        full_name,
        parent_full_name,
        is_root,
        entries: Vec::new(),
    };

    if !path.is_dir() {
        return is_root.then_some(TraceEntry::Folder(folder));
    }

    list_children(&mut folder, &path);
    Some(TraceEntry::Folder(folder))
}

fn list_children(folder: &mut TraceFolder, path: &Path) {
    let read_dir = match fs::read_dir(path) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to list trace folder");
            return;
        }
    };

    for item in read_dir {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let name = item.file_name().to_string_lossy().into_owned();
        let metadata = match item.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(path = %item.path().display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let full_name = join_name(&folder.full_name, &name);
        if metadata.is_dir() {
            folder.entries.push(TraceEntry::Folder(TraceFolder {
                name,
                full_name,
                parent_full_name: folder.full_name.clone(),
                is_root: false,
                entries: Vec::new(),
            }));
        } else if metadata.is_file() && is_csv(&name) {
            folder.entries.push(TraceEntry::File(TraceFile {
                name,
                full_name,
                parent_full_name: folder.full_name.clone(),
                length: metadata.len(),
                last_write_utc: modified_utc(&metadata),
                path: item.path(),
            }));
        }
    }

    folder.entries.sort_by(TraceEntry::listing_order);
}
