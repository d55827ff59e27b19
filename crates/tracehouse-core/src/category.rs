//! Category Sanitization
//!
//! Categories are caller-controlled and end up as directory names under the
//! principal's storage root, so every segment is reduced to a name that is safe
//! on any platform before it touches the filesystem:
//!
//! 1. Split on `/` and `\`, dropping empty segments
//! 2. Remove characters that are invalid in a Windows or Unix file name
//! 3. Trim surrounding whitespace, truncate to 254 characters
//! 4. Drop segments that end up empty, consist only of dots, or are reserved
//!    device names (`con`, `nul`, `com1`, `lpt1`, ...)
//! 5. Rejoin with `/`
//!
//! The result never contains `..`, never starts with a separator and never names
//! a device, so joining it under a root can only produce a path inside that root.

use std::path::{Path, PathBuf};

/// Canonical separator between sanitized category segments.
pub const CATEGORY_SEPARATOR: char = '/';

const MAX_SEGMENT_CHARS: usize = 254;

const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com0", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt0", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

fn is_invalid_file_name_char(c: char) -> bool {
    c.is_control() || matches!(c, '"' | '<' | '>' | '|' | ':' | '*' | '?' | '\\' | '/')
}

/// Reduce one path segment to a valid file name, or `None` if nothing usable remains.
pub fn sanitize_segment(segment: &str) -> Option<String> {
    let stripped: String = segment
        .chars()
        .filter(|c| !is_invalid_file_name_char(*c))
        .take(MAX_SEGMENT_CHARS)
        .collect();

    let name = stripped.trim();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        return None;
    }

    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return None;
    }

    Some(name.to_string())
}

/// Sanitize a full category. An empty result means the principal's root folder.
pub fn sanitize_category(category: &str) -> String {
    category
        .split(['/', '\\'])
        .filter_map(sanitize_segment)
        .collect::<Vec<_>>()
        .join(&CATEGORY_SEPARATOR.to_string())
}

/// Join a sanitized category under `base`, one path component per segment.
pub fn category_path(base: &Path, sanitized: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    for segment in sanitized.split(CATEGORY_SEPARATOR).filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Component;

    #[test]
    fn test_plain_categories() {
        assert_eq!(sanitize_category("api/orders"), "api/orders");
        assert_eq!(sanitize_category("api\\orders"), "api/orders");
        assert_eq!(sanitize_category("  api //  orders  /"), "api/orders");
        assert_eq!(sanitize_category(""), "");
        assert_eq!(sanitize_category("   "), "");
    }

    #[test]
    fn test_traversal_segments_dropped() {
        assert_eq!(sanitize_category("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_category("a/./b/.../c"), "a/b/c");
        assert_eq!(sanitize_category(".."), "");
    }

    #[test]
    fn test_reserved_names_dropped() {
        assert_eq!(sanitize_category("logs/CON/x"), "logs/x");
        assert_eq!(sanitize_category("nul"), "");
        assert_eq!(sanitize_category("Lpt1/com9"), "");
        // only exact device names are reserved
        assert_eq!(sanitize_category("console"), "console");
    }

    #[test]
    fn test_invalid_chars_stripped() {
        assert_eq!(sanitize_category("a:b*c?d\"e<f>g|h"), "abcdefgh");
        assert_eq!(sanitize_category("tab\there"), "tabhere");
        assert_eq!(sanitize_category("c:/windows"), "c/windows");
    }

    #[test]
    fn test_long_segment_truncated() {
        let long = "x".repeat(400);
        assert_eq!(sanitize_category(&long).chars().count(), 254);
    }

    #[test]
    fn test_category_path_stays_under_base() {
        let base = Path::new("/data/traces/p");
        for raw in ["../../..", "..\\..\\x", "/abs/path", "a/../../b", "\\\\server\\share"] {
            let path = category_path(base, &sanitize_category(raw));
            assert!(path.starts_with(base), "{raw} escaped to {}", path.display());
            assert!(path
                .components()
                .all(|c| !matches!(c, Component::ParentDir | Component::CurDir)));
        }
    }
}
