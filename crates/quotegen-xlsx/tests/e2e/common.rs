//! Common utilities for E2E tests.
//!
//! Fixtures are assembled part by part with `zip` so each test controls the
//! exact XML a spreadsheet application would have produced.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="&quot;SAR&quot; #,##0.00"/></numFmts><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellXfs count="5"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#;

/// Builder for a small but well-formed XLSX package
pub struct XlsxFixture {
    sheets: Vec<(String, String)>,
    shared_strings: Vec<String>,
    active_tab: Option<usize>,
    calc_pr: Option<String>,
}

impl XlsxFixture {
    pub fn new() -> Self {
        Self {
            sheets: Vec::new(),
            shared_strings: Vec::new(),
            active_tab: None,
            calc_pr: None,
        }
    }

    /// Add a worksheet whose `<sheetData>` children are `rows_xml`
    pub fn sheet(mut self, name: &str, rows_xml: &str) -> Self {
        self.sheets.push((name.to_string(), rows_xml.to_string()));
        self
    }

    pub fn shared_strings(mut self, strings: &[&str]) -> Self {
        self.shared_strings = strings.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn active_tab(mut self, index: usize) -> Self {
        self.active_tab = Some(index);
        self
    }

    /// Raw `<calcPr .../>` markup to include in workbook.xml
    pub fn calc_pr(mut self, markup: &str) -> Self {
        self.calc_pr = Some(markup.to_string());
        self
    }

    pub fn write_to(&self, path: &Path) {
        let file = File::create(path).expect("create fixture");
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        let mut overrides = String::new();
        for idx in 1..=self.sheets.len() {
            overrides.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{idx}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
        }
        put(&mut zip, options, "[Content_Types].xml", &format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>{overrides}</Types>"#
        ));
        put(&mut zip, options, "_rels/.rels", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#);

        let mut sheets = String::new();
        let mut rels = String::new();
        for (idx, (name, _)) in self.sheets.iter().enumerate() {
            let n = idx + 1;
            sheets.push_str(&format!(
                r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
        }
        let styles_rel = self.sheets.len() + 1;
        let strings_rel = self.sheets.len() + 2;
        rels.push_str(&format!(
            r#"<Relationship Id="rId{styles_rel}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId{strings_rel}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#
        ));

        let views = match self.active_tab {
            Some(tab) => format!(r#"<bookViews><workbookView activeTab="{tab}"/></bookViews>"#),
            None => r#"<bookViews><workbookView/></bookViews>"#.to_string(),
        };
        let calc = self.calc_pr.clone().unwrap_or_default();
        put(&mut zip, options, "xl/workbook.xml", &format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">{views}<sheets>{sheets}</sheets>{calc}</workbook>"#
        ));
        put(&mut zip, options, "xl/_rels/workbook.xml.rels", &format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        ));
        put(&mut zip, options, "xl/styles.xml", STYLES_XML);

        let mut strings = String::new();
        for s in &self.shared_strings {
            strings.push_str(&format!("<si><t>{s}</t></si>"));
        }
        put(&mut zip, options, "xl/sharedStrings.xml", &format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">{strings}</sst>"#,
            self.shared_strings.len()
        ));

        for (idx, (_, rows)) in self.sheets.iter().enumerate() {
            put(&mut zip, options, &format!("xl/worksheets/sheet{}.xml", idx + 1), &format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:H20"/><sheetData>{rows}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#
            ));
        }

        zip.finish().expect("finish fixture");
    }
}

fn put<W: Write + std::io::Seek>(
    zip: &mut zip::ZipWriter<W>,
    options: SimpleFileOptions,
    name: &str,
    content: &str,
) {
    zip.start_file(name, options).expect("start part");
    zip.write_all(content.as_bytes()).expect("write part");
}

/// Read one part of a package as a string
pub fn read_part(path: &Path, name: &str) -> String {
    let file = File::open(path).expect("open package");
    let mut archive = zip::ZipArchive::new(file).expect("read package");
    let mut part = archive.by_name(name).expect("part present");
    let mut content = String::new();
    part.read_to_string(&mut content).expect("read part");
    content
}

/// Names of all entries in a package, in archive order
pub fn part_names(path: &Path) -> Vec<String> {
    let file = File::open(path).expect("open package");
    let archive = zip::ZipArchive::new(file).expect("read package");
    archive.file_names().map(str::to_string).collect()
}
