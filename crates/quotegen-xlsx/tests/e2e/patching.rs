//! Patching template cells

use pretty_assertions::assert_eq;
use quotegen_xlsx::{CellInput, CellRef, SheetReader, TemplateDocument};

use crate::{part_names, read_part, XlsxFixture};

fn cell(s: &str) -> CellRef {
    CellRef::parse(s).unwrap()
}

const QUOTE_ROWS: &str = r#"<row r="1" spans="1:8"><c r="A1" t="inlineStr"><is><t>QUOTATION</t></is></c></row><row r="10" spans="1:8"><c r="B10" t="inlineStr"><is><t>SN</t></is></c></row><row r="11" spans="1:8"><c r="A11" s="1"><v>1</v></c><c r="B11" s="2" t="inlineStr"><is><t>placeholder</t></is></c><c r="F11" s="3"><v>0</v></c><c r="G11" s="4"><v>0</v></c><c r="I11" s="1"><f>F11*G11</f><v>0</v></c></row><row r="13"><c r="H13" s="4"><f>G11*H12</f><v>0</v></c></row>"#;

#[test]
fn test_existing_cells_keep_style_and_missing_cells_are_inserted() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    let output = dir.path().join("QA1.xlsx");
    XlsxFixture::new().sheet("Quote", QUOTE_ROWS).write_to(&template);

    let mut doc = TemplateDocument::open(&template).unwrap();
    doc.set(cell("B11"), "A1");
    doc.set(cell("C11"), "NUP-77");
    doc.set(cell("D11"), "Nitrile gloves");
    doc.set(cell("E11"), "BOX");
    doc.set(cell("F11"), 5.0);
    doc.set(cell("G11"), 12.5);
    doc.set(cell("H12"), 0.15);
    doc.save(&output).unwrap();

    let sheet = read_part(&output, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains(
        r#"<row r="11"><c r="A11" s="1"><v>1</v></c><c r="B11" s="2" t="inlineStr"><is><t>A1</t></is></c><c r="C11" t="inlineStr"><is><t>NUP-77</t></is></c><c r="D11" t="inlineStr"><is><t>Nitrile gloves</t></is></c><c r="E11" t="inlineStr"><is><t>BOX</t></is></c><c r="F11" s="3"><v>5</v></c><c r="G11" s="4"><v>12.5</v></c><c r="I11" s="1"><f>F11*G11</f><v>0</v></c></row>"#
    ), "{sheet}");
    assert!(sheet.contains(r#"<row r="12"><c r="H12"><v>0.15</v></c></row><row r="13">"#), "{sheet}");
    assert!(!sheet.contains("placeholder"));
    assert!(sheet.contains(r#"<pageMargins left="0.7""#));

    let grid = SheetReader::read_file(&output).unwrap();
    assert_eq!(
        grid.rows()[10],
        vec!["1", "A1", "NUP-77", "Nitrile gloves", "BOX", "5", "12.5", "", "0"]
    );
    assert_eq!(grid.rows()[11], vec!["", "", "", "", "", "", "", "0.15"]);
}

#[test]
fn test_other_parts_are_copied_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    let output = dir.path().join("out.xlsx");
    XlsxFixture::new().sheet("Quote", QUOTE_ROWS).write_to(&template);
    let before = std::fs::read(&template).unwrap();

    let mut doc = TemplateDocument::open(&template).unwrap();
    doc.set(cell("B11"), "X");
    doc.save(&output).unwrap();

    assert_eq!(std::fs::read(&template).unwrap(), before, "template must not change");
    assert_eq!(part_names(&output), part_names(&template));
    assert_eq!(
        read_part(&output, "xl/styles.xml"),
        read_part(&template, "xl/styles.xml")
    );
    assert_eq!(
        read_part(&output, "xl/sharedStrings.xml"),
        read_part(&template, "xl/sharedStrings.xml")
    );
}

#[test]
fn test_active_sheet_is_patched() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    let output = dir.path().join("out.xlsx");
    XlsxFixture::new()
        .sheet("Cover", r#"<row r="1"><c r="A1" t="inlineStr"><is><t>cover</t></is></c></row>"#)
        .sheet("Quote", "")
        .active_tab(1)
        .write_to(&template);

    let mut doc = TemplateDocument::open(&template).unwrap();
    assert_eq!(doc.active_sheet_path(), "xl/worksheets/sheet2.xml");
    doc.set(cell("B11"), "A3");
    doc.save(&output).unwrap();

    assert_eq!(
        read_part(&output, "xl/worksheets/sheet1.xml"),
        read_part(&template, "xl/worksheets/sheet1.xml")
    );
    let quote = read_part(&output, "xl/worksheets/sheet2.xml");
    assert!(
        quote.contains(r#"<sheetData><row r="11"><c r="B11" t="inlineStr"><is><t>A3</t></is></c></row></sheetData>"#),
        "{quote}"
    );
}

#[test]
fn test_blank_clears_value_but_keeps_style() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    let output = dir.path().join("out.xlsx");
    XlsxFixture::new().sheet("Quote", QUOTE_ROWS).write_to(&template);

    let mut doc = TemplateDocument::open(&template).unwrap();
    doc.set(cell("G11"), CellInput::Blank);
    doc.save(&output).unwrap();

    let sheet = read_part(&output, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains(r#"<c r="G11" s="4"/>"#), "{sheet}");
}

#[test]
fn test_text_is_escaped_and_whitespace_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    let output = dir.path().join("out.xlsx");
    XlsxFixture::new().sheet("Quote", QUOTE_ROWS).write_to(&template);

    let mut doc = TemplateDocument::open(&template).unwrap();
    doc.set(cell("D11"), " Gloves <L> & \"XL\"");
    doc.save(&output).unwrap();

    let grid = SheetReader::read_file(&output).unwrap();
    assert_eq!(grid.rows()[10][3], " Gloves <L> & \"XL\"");
    let sheet = read_part(&output, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains(r#"<t xml:space="preserve">"#), "{sheet}");
}

#[test]
fn test_workbook_is_flagged_for_recalculation() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.xlsx");
    let with_calc = dir.path().join("calc.xlsx");
    XlsxFixture::new().sheet("Quote", QUOTE_ROWS).write_to(&plain);
    XlsxFixture::new()
        .sheet("Quote", QUOTE_ROWS)
        .calc_pr(r#"<calcPr calcId="191029" fullCalcOnLoad="0"/>"#)
        .write_to(&with_calc);

    for template in [&plain, &with_calc] {
        let output = dir.path().join("out.xlsx");
        let mut doc = TemplateDocument::open(template).unwrap();
        doc.set(cell("F11"), 2.0);
        doc.save(&output).unwrap();

        let workbook = read_part(&output, "xl/workbook.xml");
        assert_eq!(workbook.matches("<calcPr").count(), 1, "{workbook}");
        assert!(workbook.contains(r#"fullCalcOnLoad="1""#), "{workbook}");
        assert!(!workbook.contains(r#"fullCalcOnLoad="0""#), "{workbook}");
        assert!(workbook.contains("<sheets>"), "{workbook}");
    }

    let workbook = read_part(&dir.path().join("out.xlsx"), "xl/workbook.xml");
    assert!(workbook.contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#), "{workbook}");
}

#[test]
fn test_each_open_starts_from_the_template() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    XlsxFixture::new().sheet("Quote", QUOTE_ROWS).write_to(&template);

    let mut first = TemplateDocument::open(&template).unwrap();
    first.set(cell("C11"), "only-in-first");
    first.save(dir.path().join("first.xlsx")).unwrap();

    let mut second = TemplateDocument::open(&template).unwrap();
    second.set(cell("B11"), "B");
    second.save(dir.path().join("second.xlsx")).unwrap();

    let sheet = read_part(&dir.path().join("second.xlsx"), "xl/worksheets/sheet1.xml");
    assert!(!sheet.contains("only-in-first"));
}

#[test]
fn test_failed_save_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    XlsxFixture::new().sheet("Quote", QUOTE_ROWS).write_to(&template);

    let doc = TemplateDocument::open(&template).unwrap();
    let target = dir.path().join("missing-dir").join("out.xlsx");
    assert!(doc.save(&target).is_err());
    assert!(!target.exists());
}
