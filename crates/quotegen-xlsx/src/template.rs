//! Template patching
//!
//! A [`TemplateDocument`] holds the bytes of a template workbook plus a set of
//! pending cell writes for its active sheet. Saving streams the package into a
//! new archive: the active worksheet is rewritten with the new cell values,
//! `workbook.xml` is flagged for a full recalculation on load, and every other
//! entry is copied raw (no recompression), so styles, drawings, merged cells
//! and printer settings come out exactly as they went in.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::iter::Peekable;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::cell_ref::CellRef;
use crate::error::{XlsxError, XlsxResult};
use crate::package::{self, SheetSelector, WORKBOOK_PART};

/// A value to place into a template cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellInput {
    /// Written as an inline string
    Text(String),
    /// Written as a numeric value
    Number(f64),
    /// Clears the value but keeps the cell's formatting
    Blank,
}

impl From<&str> for CellInput {
    fn from(s: &str) -> Self {
        CellInput::Text(s.to_string())
    }
}

impl From<String> for CellInput {
    fn from(s: String) -> Self {
        CellInput::Text(s)
    }
}

impl From<f64> for CellInput {
    fn from(n: f64) -> Self {
        CellInput::Number(n)
    }
}

/// An in-memory copy of a template workbook with pending cell writes.
///
/// Each `open` reads the file again, so two documents never share state.
#[derive(Debug)]
pub struct TemplateDocument {
    source: PathBuf,
    bytes: Vec<u8>,
    sheet_path: String,
    writes: BTreeMap<CellRef, CellInput>,
}

type RowWrites<'a> = BTreeMap<u16, &'a CellInput>;

impl TemplateDocument {
    /// Load a template from disk and locate its active sheet
    pub fn open<P: AsRef<Path>>(path: P) -> XlsxResult<Self> {
        let source = path.as_ref().to_path_buf();
        let bytes = fs::read(&source)?;

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice()))?;
        package::ensure_xlsx(&mut archive)?;
        let sheet_path = package::resolve_sheet_path(&mut archive, SheetSelector::Active)?;
        drop(archive);

        Ok(Self {
            source,
            bytes,
            sheet_path,
            writes: BTreeMap::new(),
        })
    }

    /// Path the template was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Archive path of the sheet that will be patched
    pub fn active_sheet_path(&self) -> &str {
        &self.sheet_path
    }

    /// Queue a value for a cell on the active sheet. A later write to the same
    /// cell replaces an earlier one.
    pub fn set(&mut self, cell: CellRef, value: impl Into<CellInput>) {
        self.writes.insert(cell, value.into());
    }

    /// Write the patched workbook to `path`. A partially written file is
    /// removed on failure.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> XlsxResult<()> {
        let path = path.as_ref();
        let result = File::create(path)
            .map_err(XlsxError::from)
            .and_then(|file| self.write(BufWriter::new(file)));

        if result.is_err() {
            let _ = fs::remove_file(path);
        }
        result
    }

    /// Write the patched workbook to any seekable writer
    pub fn write<W: Write + Seek>(&self, writer: W) -> XlsxResult<()> {
        let mut archive = zip::ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut zip = zip::ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for index in 0..archive.len() {
            let name = archive.by_index_raw(index)?.name().to_string();

            if name == self.sheet_path {
                let xml = read_entry(&mut archive, index)?;
                zip.start_file(name, options)?;
                zip.write_all(&patch_sheet_xml(&xml, &self.writes)?)?;
            } else if name == WORKBOOK_PART {
                let xml = read_entry(&mut archive, index)?;
                zip.start_file(name, options)?;
                zip.write_all(&enable_full_calc_on_load(&xml)?)?;
            } else {
                zip.raw_copy_file(archive.by_index_raw(index)?)?;
            }
        }

        let mut inner = zip.finish()?;
        inner.flush()?;
        Ok(())
    }
}

fn read_entry<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, index: usize) -> XlsxResult<Vec<u8>> {
    let mut file = archive.by_index(index)?;
    let mut xml = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut xml)?;
    Ok(xml)
}


/// Rewrite `<sheetData>` so that every cell in `writes` carries its new value.
///
/// Existing cells keep their attributes (style index included) apart from the
/// type, which is set from the new value; their children (`<v>`, `<f>`, `<is>`)
/// are replaced. Missing rows and cells are inserted in row-major order.
pub(crate) fn patch_sheet_xml(
    xml: &[u8],
    writes: &BTreeMap<CellRef, CellInput>,
) -> XlsxResult<Vec<u8>> {
    let mut by_row: BTreeMap<u32, RowWrites<'_>> = BTreeMap::new();
    for (cell, value) in writes {
        by_row.entry(cell.row).or_default().insert(cell.col, value);
    }
    let mut pending_rows = by_row.into_iter().peekable();

    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 512));
    let mut buf = Vec::new();

    let mut names = ElementNames::default();
    let mut in_sheet_data = false;
    let mut last_row: Option<u32> = None;
    // Pending writes for the row currently being copied, if it is targeted
    let mut open_row: Option<(u32, RowWrites<'_>)> = None;
    let mut last_col: Option<u16> = None;
    // Depth inside a replaced `<c>` whose children are being dropped
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => {
                    return Err(XlsxError::InvalidFormat(
                        "worksheet ended inside a cell".into(),
                    ))
                }
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                names = ElementNames::from_sibling(&e);
                in_sheet_data = true;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                names = ElementNames::from_sibling(&e);
                writer.write_event(Event::Start(e.clone()))?;
                flush_rows_before(&mut writer, &names, &mut pending_rows, None)?;
                writer.write_event(Event::End(e.to_end()))?;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                flush_rows_before(&mut writer, &names, &mut pending_rows, None)?;
                in_sheet_data = false;
                writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = row_index(&e, last_row);
                last_row = Some(row);
                last_col = None;
                flush_rows_before(&mut writer, &names, &mut pending_rows, Some(row))?;

                match take_row(&mut pending_rows, row) {
                    Some(cells) => {
                        writer.write_event(Event::Start(without_spans(&e)))?;
                        open_row = Some((row, cells));
                    }
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = row_index(&e, last_row);
                last_row = Some(row);
                flush_rows_before(&mut writer, &names, &mut pending_rows, Some(row))?;

                match take_row(&mut pending_rows, row) {
                    Some(cells) => {
                        let start = without_spans(&e);
                        let end = start.to_end().into_owned();
                        writer.write_event(Event::Start(start))?;
                        write_new_cells(&mut writer, &names, row, cells)?;
                        writer.write_event(Event::End(end))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                if let Some((row, cells)) = open_row.take() {
                    write_new_cells(&mut writer, &names, row, cells)?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if open_row.is_some() && e.local_name().as_ref() == b"c" => {
                if replace_cell(&mut writer, &names, &e, &mut open_row, &mut last_col)? {
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) if open_row.is_some() && e.local_name().as_ref() == b"c" => {
                if !replace_cell(&mut writer, &names, &e, &mut open_row, &mut last_col)? {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    if pending_rows.peek().is_some() {
        return Err(XlsxError::InvalidFormat(
            "worksheet has no <sheetData> element".into(),
        ));
    }

    Ok(writer.into_inner())
}

/// Qualified element names used when inserting new markup, so that a
/// worksheet written with a namespace prefix (`x:row`) stays consistent.
#[derive(Debug, Clone)]
struct ElementNames {
    row: String,
    cell: String,
    value: String,
    inline: String,
    text: String,
}

impl Default for ElementNames {
    fn default() -> Self {
        Self::with_prefix(None)
    }
}

impl ElementNames {
    fn from_sibling(e: &BytesStart<'_>) -> Self {
        let name = e.name();
        let prefix = name
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
        Self::with_prefix(prefix.as_deref())
    }

    fn with_prefix(prefix: Option<&str>) -> Self {
        let qualify = |local: &str| match prefix {
            Some(p) => format!("{p}:{local}"),
            None => local.to_string(),
        };
        Self {
            row: qualify("row"),
            cell: qualify("c"),
            value: qualify("v"),
            inline: qualify("is"),
            text: qualify("t"),
        }
    }
}

type PendingRows<'a> = Peekable<std::collections::btree_map::IntoIter<u32, RowWrites<'a>>>;

fn row_index(e: &BytesStart<'_>, last_row: Option<u32>) -> u32 {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"r")
        .and_then(|attr| attr.unescape_value().ok()?.parse::<u32>().ok())
        .map(|r| r.saturating_sub(1))
        .unwrap_or_else(|| last_row.map_or(0, |r| r + 1))
}

fn cell_column(e: &BytesStart<'_>) -> Option<u16> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"r")
        .and_then(|attr| CellRef::parse(&attr.unescape_value().ok()?).ok())
        .map(|cell| cell.col)
}

/// Copy of a `<row>` start tag without `spans`, which would go stale once
/// cells are inserted
fn without_spans(e: &BytesStart<'_>) -> BytesStart<'static> {
    let mut start = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != b"spans" {
            start.push_attribute(attr);
        }
    }
    start
}

fn take_row<'a>(pending: &mut PendingRows<'a>, row: u32) -> Option<RowWrites<'a>> {
    match pending.peek() {
        Some((next, _)) if *next == row => pending.next().map(|(_, cells)| cells),
        _ => None,
    }
}

/// Emit whole new rows for every pending row above `before` (all of them when
/// `before` is `None`)
fn flush_rows_before<W: Write>(
    writer: &mut Writer<W>,
    names: &ElementNames,
    pending: &mut PendingRows<'_>,
    before: Option<u32>,
) -> XlsxResult<()> {
    while let Some((row, _)) = pending.peek() {
        if before.is_some_and(|limit| *row >= limit) {
            break;
        }
        let Some((row, cells)) = pending.next() else {
            break;
        };

        let mut start = BytesStart::new(names.row.as_str());
        let number = (row + 1).to_string();
        start.push_attribute(("r", number.as_str()));
        writer.write_event(Event::Start(start))?;
        write_new_cells(writer, names, row, cells)?;
        writer.write_event(Event::End(BytesEnd::new(names.row.as_str())))?;
    }
    Ok(())
}

fn write_new_cells<W: Write>(
    writer: &mut Writer<W>,
    names: &ElementNames,
    row: u32,
    cells: RowWrites<'_>,
) -> XlsxResult<()> {
    for (col, value) in cells {
        write_cell(writer, names, CellRef::new(row, col), value, None)?;
    }
    Ok(())
}

/// Handle an existing `<c>` inside a targeted row. Pending cells that sort
/// before it are inserted first. Returns `true` when the cell itself was
/// replaced, in which case its original children must be skipped.
fn replace_cell<W: Write>(
    writer: &mut Writer<W>,
    names: &ElementNames,
    e: &BytesStart<'_>,
    open_row: &mut Option<(u32, RowWrites<'_>)>,
    last_col: &mut Option<u16>,
) -> XlsxResult<bool> {
    let Some((row, cells)) = open_row.as_mut() else {
        return Ok(false);
    };
    let row = *row;

    let col = cell_column(e).unwrap_or_else(|| last_col.map_or(0, |c| c.saturating_add(1)));
    *last_col = Some(col);

    let later = cells.split_off(&col);
    let earlier = std::mem::replace(cells, later);
    write_new_cells(writer, names, row, earlier)?;

    match cells.remove(&col) {
        Some(value) => {
            write_cell(writer, names, CellRef::new(row, col), value, Some(e))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Write one `<c>` element. Attributes of `existing` survive except the ones
/// that describe the old value.
fn write_cell<W: Write>(
    writer: &mut Writer<W>,
    names: &ElementNames,
    cell: CellRef,
    value: &CellInput,
    existing: Option<&BytesStart<'_>>,
) -> XlsxResult<()> {
    let name = match existing {
        Some(e) => String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        None => names.cell.clone(),
    };
    let mut start = BytesStart::new(name.as_str());
    let reference = cell.to_string();
    start.push_attribute(("r", reference.as_str()));
    if let Some(e) = existing {
        for attr in e.attributes().flatten() {
            // r is rewritten; t, cm and vm describe the value being replaced
            if !matches!(attr.key.as_ref(), b"r" | b"t" | b"cm" | b"vm") {
                start.push_attribute(attr);
            }
        }
    }

    match value {
        CellInput::Blank => {
            writer.write_event(Event::Empty(start))?;
        }
        CellInput::Number(n) if n.is_finite() => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, &names.value, &n.to_string(), false)?;
            writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        }
        CellInput::Number(n) => {
            // NaN and infinities have no XLSX representation
            write_inline_string(writer, names, start, &name, &n.to_string())?;
        }
        CellInput::Text(text) => {
            write_inline_string(writer, names, start, &name, text)?;
        }
    }
    Ok(())
}

fn write_inline_string<W: Write>(
    writer: &mut Writer<W>,
    names: &ElementNames,
    mut start: BytesStart<'_>,
    name: &str,
    text: &str,
) -> XlsxResult<()> {
    start.push_attribute(("t", "inlineStr"));
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Start(BytesStart::new(names.inline.as_str())))?;
    let preserve = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
    write_text_element(writer, &names.text, &package::encode_excel_escapes(text), preserve)?;
    writer.write_event(Event::End(BytesEnd::new(names.inline.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
    preserve_space: bool,
) -> XlsxResult<()> {
    let mut start = BytesStart::new(name);
    if preserve_space {
        start.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Elements of `<workbook>` that must follow `<calcPr>`
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Set `fullCalcOnLoad="1"` on `<calcPr>`, inserting the element if needed,
/// so formulas that depend on patched cells are recomputed when opened.
pub(crate) fn enable_full_calc_on_load(xml: &[u8]) -> XlsxResult<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 64));
    let mut buf = Vec::new();

    let mut depth = 0usize;
    let mut prefix: Option<String> = None;
    let mut done = false;
    // Depth inside an existing <calcPr> whose children (only extLst) are dropped
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Start(e) if depth == 1 && !done && e.local_name().as_ref() == b"calcPr" => {
                writer.write_event(Event::Empty(with_full_calc(&e)))?;
                done = true;
                skip_depth = 1;
            }
            Event::Empty(e) if depth == 1 && !done && e.local_name().as_ref() == b"calcPr" => {
                writer.write_event(Event::Empty(with_full_calc(&e)))?;
                done = true;
            }
            Event::Start(e) => {
                if depth == 0 {
                    let name = e.name();
                    prefix = name
                        .prefix()
                        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
                }
                if depth == 1 && !done && AFTER_CALC_PR.contains(&e.local_name().as_ref()) {
                    write_calc_pr(&mut writer, prefix.as_deref())?;
                    done = true;
                }
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) => {
                if depth == 1 && !done && AFTER_CALC_PR.contains(&e.local_name().as_ref()) {
                    write_calc_pr(&mut writer, prefix.as_deref())?;
                    done = true;
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !done {
                    write_calc_pr(&mut writer, prefix.as_deref())?;
                    done = true;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn with_full_calc(e: &BytesStart<'_>) -> BytesStart<'static> {
    let mut calc = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != b"fullCalcOnLoad" {
            calc.push_attribute(attr);
        }
    }
    calc.push_attribute(("fullCalcOnLoad", "1"));
    calc
}

fn write_calc_pr<W: Write>(writer: &mut Writer<W>, prefix: Option<&str>) -> XlsxResult<()> {
    let name = match prefix {
        Some(p) => format!("{p}:calcPr"),
        None => "calcPr".to_string(),
    };
    let mut calc = BytesStart::new(name);
    calc.push_attribute(("fullCalcOnLoad", "1"));
    writer.write_event(Event::Empty(calc))?;
    Ok(())
}
