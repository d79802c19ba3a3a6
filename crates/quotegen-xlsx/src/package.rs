//! Package-level parts shared by the reader and the template patcher:
//! `workbook.xml`, its relationships, and the shared string table.

use std::collections::HashMap;
use std::io::{BufReader, Read, Seek};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Which worksheet of a workbook to address
#[derive(Debug, Clone, Copy)]
pub(crate) enum SheetSelector {
    /// First sheet in workbook order
    First,
    /// The sheet selected in the first `<workbookView>`
    Active,
}

/// Sheet list and view state from `workbook.xml`
#[derive(Debug, Default)]
struct WorkbookInfo {
    /// (name, relationship id) in workbook order
    sheets: Vec<(String, String)>,
    active_tab: usize,
}

pub(crate) fn ensure_xlsx<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> XlsxResult<()> {
    if archive.by_name("[Content_Types].xml").is_err() {
        return Err(XlsxError::InvalidFormat(
            "Missing [Content_Types].xml".into(),
        ));
    }
    Ok(())
}

/// Resolve the archive path of the selected worksheet, e.g. `xl/worksheets/sheet1.xml`.
pub(crate) fn resolve_sheet_path<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    selector: SheetSelector,
) -> XlsxResult<String> {
    let info = read_workbook_info(archive)?;
    let paths = read_worksheet_paths(archive)?;

    let index = match selector {
        SheetSelector::First => 0,
        // An out-of-range activeTab is treated like Excel does: first sheet
        SheetSelector::Active if info.active_tab < info.sheets.len() => info.active_tab,
        SheetSelector::Active => 0,
    };

    let (name, r_id) = info
        .sheets
        .get(index)
        .ok_or_else(|| XlsxError::InvalidFormat("workbook has no worksheets".into()))?;

    paths.get(r_id).cloned().ok_or_else(|| {
        XlsxError::MissingPart(format!("worksheet '{name}' (relationship {r_id})"))
    })
}

fn read_workbook_info<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> XlsxResult<WorkbookInfo> {
    let file = archive
        .by_name(WORKBOOK_PART)
        .map_err(|_| XlsxError::MissingPart(WORKBOOK_PART.into()))?;

    let mut xml_reader = Reader::from_reader(BufReader::new(file));
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut info = WorkbookInfo::default();
    let mut seen_view = false;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sheet" => {
                    let mut name = None;
                    let mut r_id = None;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"name" {
                            name = attr.unescape_value().ok().map(|s| s.to_string());
                        } else if attr.key.local_name().as_ref() == b"id"
                            && attr.key.prefix().is_some()
                        {
                            r_id = attr.unescape_value().ok().map(|s| s.to_string());
                        }
                    }
                    if let (Some(name), Some(r_id)) = (name, r_id) {
                        info.sheets.push((name, r_id));
                    }
                }
                // Only the first view decides which sheet opens
                b"workbookView" if !seen_view => {
                    seen_view = true;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"activeTab" {
                            info.active_tab = attr
                                .unescape_value()
                                .ok()
                                .and_then(|s| s.parse::<usize>().ok())
                                .unwrap_or(0);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(info)
}

/// Map relationship ids to worksheet part paths
fn read_worksheet_paths<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> XlsxResult<HashMap<String, String>> {
    let file = archive
        .by_name(WORKBOOK_RELS_PART)
        .map_err(|_| XlsxError::MissingPart(WORKBOOK_RELS_PART.into()))?;

    let mut xml_reader = Reader::from_reader(BufReader::new(file));
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut rels = HashMap::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                let mut rel_type = None;

                for attr in e.attributes().flatten() {
                    let value = attr.unescape_value().ok().map(|s| s.to_string());
                    match attr.key.as_ref() {
                        b"Id" => id = value,
                        b"Target" => target = value,
                        b"Type" => rel_type = value,
                        _ => {}
                    }
                }

                if let (Some(id), Some(target), Some(rel_type)) = (id, target, rel_type) {
                    if rel_type.ends_with("/worksheet") {
                        // Targets are relative to xl/ unless absolute
                        let full_path = match target.strip_prefix('/') {
                            Some(absolute) => absolute.to_string(),
                            None => format!("xl/{target}"),
                        };
                        rels.insert(id, full_path);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Read the shared strings table. A workbook without one is valid.
pub(crate) fn read_shared_strings<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> XlsxResult<Vec<String>> {
    let mut strings = Vec::new();

    let file = match archive.by_name(SHARED_STRINGS_PART) {
        Ok(f) => f,
        Err(_) => return Ok(strings),
    };

    let mut xml_reader = Reader::from_reader(BufReader::new(file));

    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    // Phonetic runs repeat the text in another script; skip them
    let mut in_phonetic = false;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"rPh" => in_phonetic = true,
                b"t" if in_si && !in_phonetic => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(decode_excel_escapes(&current));
                    current.clear();
                    in_si = false;
                }
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_t => {
                if let Ok(text) = e.unescape() {
                    current.push_str(&text);
                }
            }
            Ok(Event::CData(e)) if in_t => {
                current.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// Decode Excel's `_xHHHH_` escape sequences in strings.
///
/// Excel stores characters that XML cannot carry (control characters, and a
/// literal `_x` prefix via `_x005F_`) in this form.
pub(crate) fn decode_excel_escapes(s: &str) -> String {
    if !s.contains("_x") {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("_x") {
        result.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate
            .get(2..6)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .filter(|_| candidate.as_bytes().get(6) == Some(&b'_'))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);

        match decoded {
            Some(c) => {
                result.push(c);
                rest = &candidate[7..];
            }
            None => {
                result.push_str("_x");
                rest = &candidate[2..];
            }
        }
    }
    result.push_str(rest);

    result
}

/// Inverse of [`decode_excel_escapes`] for text written into a sheet
pub(crate) fn encode_excel_escapes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for (idx, c) in s.char_indices() {
        if c.is_control() && !matches!(c, '\t' | '\n' | '\r') {
            result.push_str(&format!("_x{:04X}_", c as u32));
        } else if c == '_' && looks_like_escape(&s[idx..]) {
            // Protect a literal "_xHHHH_" from being decoded on read
            result.push_str("_x005F_");
        } else {
            result.push(c);
        }
    }

    result
}

fn looks_like_escape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 7
        && bytes[1] == b'x'
        && bytes[2..6].iter().all(|b| b.is_ascii_hexdigit())
        && bytes[6] == b'_'
}
