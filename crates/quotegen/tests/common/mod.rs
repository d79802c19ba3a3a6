//! Shared fixtures: a template workbook, input tables and scripted PDF
//! backends.

#![allow(dead_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quotegen::export::{ExportError, ExportResult};
use quotegen::{BatchEvent, LogLevel, PdfBackend, PdfSession};
use zip::write::SimpleFileOptions;

const QUOTE_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:I13"/><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>QUOTATION</t></is></c></row><row r="10"><c r="B10" t="inlineStr"><is><t>SN</t></is></c><c r="F10" t="inlineStr"><is><t>Qty</t></is></c></row><row r="11"><c r="B11" s="1"/><c r="F11" s="2"><v>0</v></c><c r="G11" s="2"><v>0</v></c><c r="I11" s="2"><f>F11*G11</f><v>0</v></c></row><row r="12"><c r="H12" s="2"/></row></sheetData><mergeCells count="1"><mergeCell ref="A1:I1"/></mergeCells><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="49" fontId="0" fillId="0" borderId="0" applyNumberFormat="1"/><xf numFmtId="4" fontId="0" fillId="0" borderId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#;

/// Write a one-sheet quotation template
pub fn write_template(path: &Path) {
    write_package(path, QUOTE_SHEET);
}

/// Write an input workbook whose first sheet holds `rows` as inline strings
pub fn write_input_xlsx(path: &Path, rows: &[&[&str]]) {
    let mut data = String::new();
    for (r, row) in rows.iter().enumerate() {
        data.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, text) in row.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let col = (b'A' + c as u8) as char;
            data.push_str(&format!(
                r#"<c r="{col}{}" t="inlineStr"><is><t>{text}</t></is></c>"#,
                r + 1
            ));
        }
        data.push_str("</row>");
    }
    let sheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{data}</sheetData></worksheet>"#
    );
    write_package(path, &sheet);
}

fn write_package(path: &Path, sheet: &str) {
    let file = File::create(path).expect("create package");
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let parts = [
        ("[Content_Types].xml", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#),
        ("_rels/.rels", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#),
        ("xl/workbook.xml", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><bookViews><workbookView activeTab="0"/></bookViews><sheets><sheet name="Quotation" sheetId="1" r:id="rId1"/></sheets></workbook>"#),
        ("xl/_rels/workbook.xml.rels", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#),
        ("xl/styles.xml", STYLES),
        ("xl/worksheets/sheet1.xml", sheet),
    ];
    for (name, content) in parts {
        zip.start_file(name, options).expect("start part");
        zip.write_all(content.as_bytes()).expect("write part");
    }
    zip.finish().expect("finish package");
}

/// Write a CSV input; every row is written as given
pub fn write_csv(path: &Path, rows: &[&[&str]]) {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .expect("create csv");
    for row in rows {
        writer.write_record(*row).expect("write row");
    }
    writer.flush().expect("flush csv");
}

/// Input rows: header plus one row per identifier, with quantity and price
pub fn item_rows(ids: &[&'static str]) -> Vec<Vec<&'static str>> {
    let mut rows = vec![vec!["No", "SN", "Code", "Description", "UOM", "Qty", "Price", "VAT"]];
    for id in ids {
        rows.push(vec!["1", id, "NUP-1", "Gloves", "BOX", "5", "12.50", "0.15"]);
    }
    rows
}

pub fn as_slices<'a>(rows: &'a [Vec<&'a str>]) -> Vec<&'a [&'a str]> {
    rows.iter().map(Vec::as_slice).collect()
}

/// Raw XML of the first worksheet of a generated document
pub fn sheet_xml(path: &Path) -> String {
    let file = File::open(path).expect("open output");
    let mut archive = zip::ZipArchive::new(file).expect("read output");
    let mut part = archive
        .by_name("xl/worksheets/sheet1.xml")
        .expect("sheet present");
    let mut xml = String::new();
    part.read_to_string(&mut xml).expect("read sheet");
    xml
}

/// Files in `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn progress(events: &[BatchEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect()
}

pub fn logs(events: &[BatchEvent], level: LogLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Log { level: l, message } if *l == level => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn items(events: &[BatchEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Item(id) => Some(id.clone()),
            _ => None,
        })
        .collect()
}

/// What a scripted backend did
#[derive(Debug, Default)]
pub struct Calls {
    pub starts: AtomicUsize,
    pub exports: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Backend that writes a stub PDF, failing for workbooks named in `fail_for`
pub struct ScriptedBackend {
    pub calls: Arc<Calls>,
    pub fail_start: bool,
    pub fail_for: Vec<String>,
}

impl ScriptedBackend {
    pub fn new(calls: Arc<Calls>) -> Self {
        Self {
            calls,
            fail_start: false,
            fail_for: Vec::new(),
        }
    }
}

impl PdfBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn start(&self) -> ExportResult<Box<dyn PdfSession>> {
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(ExportError::Unavailable("no spreadsheet application".into()));
        }
        Ok(Box::new(ScriptedSession {
            calls: self.calls.clone(),
            fail_for: self.fail_for.clone(),
        }))
    }
}

struct ScriptedSession {
    calls: Arc<Calls>,
    fail_for: Vec<String>,
}

impl PdfSession for ScriptedSession {
    fn export_pdf(&mut self, workbook: &Path, pdf: &Path) -> ExportResult<()> {
        self.calls.exports.fetch_add(1, Ordering::SeqCst);
        let name = workbook
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_for.contains(&name) {
            return Err(ExportError::Bridge(format!("cannot export {name}")));
        }
        std::fs::write(pdf, b"%PDF-1.4\n")?;
        Ok(())
    }

    fn shutdown(&mut self) -> ExportResult<()> {
        self.calls.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scratch layout for one batch
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub input: PathBuf,
    pub template: PathBuf,
    pub output: PathBuf,
}

impl Workspace {
    /// CSV input with the given rows and the standard template
    pub fn with_csv(rows: &[&[&str]]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("items.csv");
        let template = dir.path().join("template.xlsx");
        let output = dir.path().join("out");
        write_csv(&input, rows);
        write_template(&template);
        Self {
            dir,
            input,
            template,
            output,
        }
    }

    pub fn config(&self) -> quotegen::BatchConfig {
        quotegen::BatchConfig::new(&self.input, &self.template, &self.output)
    }

    pub fn excel_files(&self) -> Vec<String> {
        file_names(&self.output.join("Excel Output"))
    }

    pub fn pdf_files(&self) -> Vec<String> {
        file_names(&self.output.join("PDF Output"))
    }
}
