#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::{Component, Path};
use tracehouse_core::{category_path, sanitize_category};

fuzz_target!(|data: &[u8]| {
    // Categories become directories; the result must stay under the base
    let raw = String::from_utf8_lossy(data);
    let sanitized = sanitize_category(&raw);

    let base = Path::new("/data/traces/principal");
    let path = category_path(base, &sanitized);
    assert!(path.starts_with(base));
    assert!(path
        .components()
        .skip(base.components().count())
        .all(|c| matches!(c, Component::Normal(_))));

    // Sanitizing is idempotent
    assert_eq!(sanitize_category(&sanitized), sanitized);
});
