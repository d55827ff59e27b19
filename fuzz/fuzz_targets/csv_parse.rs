#![no_main]

use libfuzzer_sys::fuzz_target;
use tracehouse_storage::csv::{encode_cell, parse_records, parse_row, RowWriter};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    // Existing files are read back for header reconciliation
    let _ = parse_records(&text);
    let _ = parse_row(&text);

    let _ = encode_cell(&text, true);
    let _ = encode_cell(&text, false);

    let mut row = RowWriter::new(true);
    row.push(&text);
    row.push_empty();
    let _ = parse_records(&row.finish());
});
