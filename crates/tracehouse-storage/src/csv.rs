//! Tab-Delimited CSV Encoding
//!
//! Trace files are "CSV" in the spreadsheet sense: one record per line, cells
//! separated by a tab, records terminated by `\r\n`.
//!
//! ## Cell Rules
//!
//! - Cells longer than `EXCEL_CELL_LIMIT` characters are truncated when the Excel
//!   limit applies
//! - A cell containing a tab, a double quote, `\r` or `\n` is wrapped in double
//!   quotes, with embedded quotes doubled
//! - Everything else is written verbatim
//!
//! The parser here is the inverse of the encoder. It is used to read back an
//! existing header line and by tests; it is not a general CSV reader.

use std::borrow::Cow;

/// Cell delimiter.
pub const DELIMITER: char = '\t';

/// Record terminator.
pub const LINE_ENDING: &str = "\r\n";

/// Longest cell Excel will load without complaint, in characters.
pub const EXCEL_CELL_LIMIT: usize = 32_758;

/// UTF-8 byte order mark, written at the start of new files for Excel.
pub const UTF8_BOM: &str = "\u{feff}";

fn needs_quoting(cell: &str) -> bool {
    cell.contains(|c| matches!(c, '\t' | '"' | '\r' | '\n'))
}

/// Escape and optionally truncate a single cell.
pub fn encode_cell(cell: &str, for_excel_limit: bool) -> Cow<'_, str> {
    let cell = if for_excel_limit {
        match cell.char_indices().nth(EXCEL_CELL_LIMIT) {
            Some((cut, _)) => &cell[..cut],
            None => cell,
        }
    } else {
        cell
    };

    if !needs_quoting(cell) {
        return Cow::Borrowed(cell);
    }

    let mut quoted = String::with_capacity(cell.len() + 2);
    quoted.push('"');
    for c in cell.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Builds one encoded record.
#[derive(Debug, Default)]
pub struct RowWriter {
    line: String,
    cells: usize,
    excel_limit: bool,
}

impl RowWriter {
    pub fn new(excel_limit: bool) -> Self {
        Self {
            line: String::new(),
            cells: 0,
            excel_limit,
        }
    }

    /// Append one cell.
    pub fn push(&mut self, cell: &str) -> &mut Self {
        if self.cells > 0 {
            self.line.push(DELIMITER);
        }
        self.line.push_str(&encode_cell(cell, self.excel_limit));
        self.cells += 1;
        self
    }

    /// Append an empty cell.
    pub fn push_empty(&mut self) -> &mut Self {
        self.push("")
    }

    pub fn len(&self) -> usize {
        self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells == 0
    }

    /// Terminate the record and return it.
    pub fn finish(mut self) -> String {
        self.line.push_str(LINE_ENDING);
        self.line
    }
}

/// Split one physical line into cells.
///
/// A trailing `\r\n` (or `\n`) and a leading BOM are ignored. Quoted cells may
/// contain tabs and doubled quotes; a quoted line break cannot appear because
/// the input is a single line.
pub fn parse_row(line: &str) -> Vec<String> {
    let line = line.strip_prefix(UTF8_BOM).unwrap_or(line);
    let line = line.trim_end_matches(['\r', '\n']);
    parse_records(line).into_iter().next().unwrap_or_default()
}

/// Parse a whole file body into records, honoring quoted line breaks.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut at_cell_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cell.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(c);
            }
            continue;
        }

        match c {
            '"' if at_cell_start => {
                in_quotes = true;
                at_cell_start = false;
            }
            '\t' => {
                record.push(std::mem::take(&mut cell));
                at_cell_start = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
                at_cell_start = true;
            }
            other => {
                cell.push(other);
                at_cell_start = false;
            }
        }
    }

    if !cell.is_empty() || !record.is_empty() || !at_cell_start {
        record.push(cell);
        records.push(record);
    }

    records
}
