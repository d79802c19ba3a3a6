//! Reading input tables

use pretty_assertions::assert_eq;
use quotegen_xlsx::{SheetReader, XlsxError};

use crate::XlsxFixture;

#[test]
fn test_reads_first_sheet_as_text_grid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.xlsx");
    XlsxFixture::new()
        .shared_strings(&["No", "SN", "Gloves", "BOX"])
        .sheet(
            "Items",
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
               <row r="2"><c r="A2"><v>1</v></c><c r="B2" t="inlineStr"><is><t>A-100</t></is></c><c r="D2" t="s"><v>2</v></c><c r="E2" t="s"><v>3</v></c><c r="F2"><v>12.5</v></c></row>"#,
        )
        .write_to(&path);

    let grid = SheetReader::read_file(&path).unwrap();

    assert_eq!(grid.row_count(), 2);
    assert_eq!(grid.column_count(), 6);
    assert_eq!(grid.rows()[0], vec!["No", "SN"]);
    assert_eq!(grid.rows()[1], vec!["1", "A-100", "", "Gloves", "BOX", "12.5"]);
}

#[test]
fn test_reads_first_sheet_even_when_another_is_active() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.xlsx");
    XlsxFixture::new()
        .sheet("Data", r#"<row r="1"><c r="A1" t="inlineStr"><is><t>first</t></is></c></row>"#)
        .sheet("Notes", r#"<row r="1"><c r="A1" t="inlineStr"><is><t>second</t></is></c></row>"#)
        .active_tab(1)
        .write_to(&path);

    let grid = SheetReader::read_file(&path).unwrap();
    assert_eq!(grid.rows()[0], vec!["first"]);
}

#[test]
fn test_formula_string_results_and_errors_are_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.xlsx");
    XlsxFixture::new()
        .sheet(
            "Data",
            r#"<row r="1"><c r="A1" t="str"><f>"Q"&amp;B1</f><v>Q7</v></c><c r="B1"><v>7</v></c><c r="C1" t="e"><v>#N/A</v></c></row>"#,
        )
        .write_to(&path);

    let grid = SheetReader::read_file(&path).unwrap();
    assert_eq!(grid.rows()[0], vec!["Q7", "7", "#N/A"]);
}

#[test]
fn test_rejects_non_xlsx_zip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-workbook.xlsx");
    {
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut zip, b"hello").unwrap();
        zip.finish().unwrap();
    }

    let err = SheetReader::read_file(&path).unwrap_err();
    assert!(matches!(err, XlsxError::InvalidFormat(_)), "got {err:?}");
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SheetReader::read_file(dir.path().join("absent.xlsx")).unwrap_err();
    assert!(matches!(err, XlsxError::Io(_)), "got {err:?}");
}
