//! XLSX table reader
//!
//! Loads the first worksheet as rows of display strings. Only values are
//! read; styles, formulas and everything else in the package are ignored.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::cell_ref::CellRef;
use crate::error::{XlsxError, XlsxResult};
use crate::package::{self, SheetSelector};

/// A worksheet as a dense grid of text cells, anchored at A1.
///
/// Rows can have different lengths; a row is as long as its last non-empty
/// cell. Rows after the last non-empty cell of the sheet are not included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    rows: Vec<Vec<String>>,
}

impl SheetGrid {
    /// Wrap already-materialized rows
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Length of the longest row
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Borrow the rows
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Take ownership of the rows
    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    fn set(&mut self, cell: CellRef, text: String) {
        if text.is_empty() {
            return;
        }
        let row = cell.row as usize;
        let col = cell.col as usize;
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize_with(col + 1, String::new);
        }
        cells[col] = text;
    }
}

/// XLSX sheet reader
pub struct SheetReader;

impl SheetReader {
    /// Read the first worksheet of a workbook file
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsxResult<SheetGrid> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Read the first worksheet of a workbook
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<SheetGrid> {
        let mut archive = zip::ZipArchive::new(reader)?;
        package::ensure_xlsx(&mut archive)?;

        let shared_strings = package::read_shared_strings(&mut archive)?;
        let sheet_path = package::resolve_sheet_path(&mut archive, SheetSelector::First)?;
        tracing::debug!(sheet = %sheet_path, shared = shared_strings.len(), "reading worksheet");

        let file = archive
            .by_name(&sheet_path)
            .map_err(|_| XlsxError::MissingPart(sheet_path.clone()))?;
        Self::read_worksheet(BufReader::new(file), &shared_strings)
    }

    fn read_worksheet<R: std::io::BufRead>(
        reader: R,
        shared_strings: &[String],
    ) -> XlsxResult<SheetGrid> {
        let mut xml_reader = Reader::from_reader(reader);

        let mut buf = Vec::new();
        let mut grid = SheetGrid::default();

        // Position tracking for cells and rows that omit their `r` attribute
        let mut row_idx: u32 = 0;
        let mut next_col: u16 = 0;
        let mut seen_row = false;

        let mut cell: Option<PendingCell> = None;
        let mut in_value = false;
        let mut in_inline_text = false;

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"row" => {
                        row_idx = next_row_index(&e, row_idx, seen_row);
                        seen_row = true;
                        next_col = 0;
                    }
                    b"c" => {
                        let pending = PendingCell::from_start(&e, row_idx, next_col);
                        next_col = pending.cell.col.saturating_add(1);
                        cell = Some(pending);
                    }
                    b"v" if cell.is_some() => in_value = true,
                    b"t" if cell.is_some() => in_inline_text = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"row" => {
                        row_idx = next_row_index(&e, row_idx, seen_row);
                        seen_row = true;
                        next_col = 0;
                    }
                    b"c" => {
                        let pending = PendingCell::from_start(&e, row_idx, next_col);
                        next_col = pending.cell.col.saturating_add(1);
                    }
                    _ => {}
                },
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"c" => {
                        if let Some(pending) = cell.take() {
                            let text = pending.display(shared_strings);
                            grid.set(pending.cell, text);
                        }
                    }
                    b"v" => in_value = false,
                    b"t" => in_inline_text = false,
                    b"sheetData" => break,
                    _ => {}
                },
                Ok(Event::Text(e)) if in_value || in_inline_text => {
                    if let (Some(pending), Ok(text)) = (cell.as_mut(), e.unescape()) {
                        pending.raw.push_str(&text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(grid)
    }
}

fn next_row_index(e: &BytesStart<'_>, previous: u32, seen_row: bool) -> u32 {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"r")
        .and_then(|attr| attr.unescape_value().ok()?.parse::<u32>().ok())
        .map(|r| r.saturating_sub(1))
        .unwrap_or(if seen_row { previous + 1 } else { 0 })
}

/// A `<c>` element being collected
struct PendingCell {
    cell: CellRef,
    cell_type: Option<String>,
    raw: String,
}

impl PendingCell {
    fn from_start(e: &BytesStart<'_>, row: u32, next_col: u16) -> Self {
        let mut cell = CellRef::new(row, next_col);
        let mut cell_type = None;

        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"r" => {
                    if let Some(parsed) = attr
                        .unescape_value()
                        .ok()
                        .and_then(|s| CellRef::parse(&s).ok())
                    {
                        cell = parsed;
                    }
                }
                b"t" => cell_type = attr.unescape_value().ok().map(|s| s.to_string()),
                _ => {}
            }
        }

        Self {
            cell,
            cell_type,
            raw: String::new(),
        }
    }

    fn display(&self, shared_strings: &[String]) -> String {
        match self.cell_type.as_deref() {
            Some("s") => self
                .raw
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| shared_strings.get(idx))
                .cloned()
                .unwrap_or_default(),
            Some("inlineStr") => package::decode_excel_escapes(&self.raw),
            Some("b") => match self.raw.trim() {
                "1" | "true" => "TRUE".to_string(),
                _ => "FALSE".to_string(),
            },
            // Formula string results, errors and ISO dates are already text
            Some("str") | Some("e") | Some("d") => self.raw.clone(),
            _ => format_number(&self.raw),
        }
    }
}

/// Render a stored numeric value the way a spreadsheet shows it in General
/// format: integral values without a fractional part.
pub(crate) fn format_number(raw: &str) -> String {
    let raw = raw.trim();
    match raw.parse::<f64>() {
        Ok(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
        Ok(n) => format!("{n}"),
        Err(_) => raw.to_string(),
    }
}
