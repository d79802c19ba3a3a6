//! Walks the input table one quotation at a time.

use crate::table::{columns, InputTable};

/// Number of template fields taken from each row (columns 1 to 7)
pub const FIELD_COUNT: usize = 7;

/// One non-blank input row, ready to be written into the template
#[derive(Debug, Clone, PartialEq)]
pub struct QuotationRow {
    /// Row index in the table (the header is row 0)
    pub index: usize,
    /// Trimmed serial number, or `NoSN_<index + 1>` when nothing of it is
    /// usable in a file name
    pub identifier: String,
    /// File-name-safe form of the identifier used for `Q<stem>.xlsx`
    pub stem: String,
    /// Raw text of columns 1 to 7
    pub fields: [String; FIELD_COUNT],
}

/// Lazy iterator over the data rows of a table.
///
/// Rows whose identifier is blank after trimming are skipped. A fresh
/// iterator is needed for every pass.
#[derive(Debug)]
pub struct QuotationRows<'a> {
    table: &'a InputTable,
    next: usize,
}

impl<'a> QuotationRows<'a> {
    pub fn new(table: &'a InputTable) -> Self {
        Self { table, next: 1 }
    }

    /// Number of data rows, blank ones included. Progress is measured
    /// against this.
    pub fn total(&self) -> usize {
        self.table.row_count().saturating_sub(1)
    }
}

impl Iterator for QuotationRows<'_> {
    type Item = QuotationRow;

    fn next(&mut self) -> Option<QuotationRow> {
        while self.next < self.table.row_count() {
            let index = self.next;
            self.next += 1;

            let cells = match self.table.row(index) {
                Some(cells) => cells,
                None => continue,
            };
            let cell = |col: usize| cells.get(col).cloned().unwrap_or_default();

            let trimmed = cell(columns::IDENTIFIER).trim().to_string();
            if trimmed.is_empty() {
                continue;
            }

            let mut stem = file_stem(&trimmed);
            let identifier = if stem.is_empty() {
                stem = format!("NoSN_{}", index + 1);
                stem.clone()
            } else {
                trimmed
            };

            let fields = [
                cell(columns::IDENTIFIER),
                cell(columns::CODE),
                cell(columns::DESCRIPTION),
                cell(columns::UNIT),
                cell(columns::QUANTITY),
                cell(columns::PRICE),
                cell(columns::TAX_RATE),
            ];

            return Some(QuotationRow {
                index,
                identifier,
                stem,
                fields,
            });
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.table.row_count().saturating_sub(self.next)))
    }
}

/// Percentage reported before processing the row at loop position `i`
/// (1-based) out of `total` data rows. Rounds down.
pub fn progress_percent(i: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (i.saturating_mul(100) / total).min(100) as u8
}

/// Strip characters that cannot appear in a file name on Windows
pub fn file_stem(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect()
}
