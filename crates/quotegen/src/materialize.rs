//! Writes one quotation row into a fresh copy of the template.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use quotegen_xlsx::{CellInput, CellRef, TemplateDocument};
use regex::Regex;

use crate::error::{Error, Result};
use crate::rows::{QuotationRow, FIELD_COUNT};

/// Target cell for each row field, in field order: serial number, code,
/// description, unit, quantity, price, tax rate.
pub const TEMPLATE_FIELDS: [CellRef; FIELD_COUNT] = [
    CellRef::new(10, 1), // B11
    CellRef::new(10, 2), // C11
    CellRef::new(10, 3), // D11
    CellRef::new(10, 4), // E11
    CellRef::new(10, 5), // F11
    CellRef::new(10, 6), // G11
    CellRef::new(11, 7), // H12
];

/// Quantity, price and tax rate are numbers when they look like one
const NUMERIC_FIELDS: [usize; 3] = [4, 5, 6];

static PLAIN_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$").unwrap());

/// Produces `Q<stem>.xlsx` files from a template
#[derive(Debug, Clone)]
pub struct Materializer {
    template: PathBuf,
    output_dir: PathBuf,
}

impl Materializer {
    pub fn new(template: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Where the document for `row` is written
    pub fn output_path(&self, row: &QuotationRow) -> PathBuf {
        self.output_dir.join(format!("Q{}.xlsx", row.stem))
    }

    /// Read the template afresh, fill in the row and save it.
    ///
    /// An existing file with the same name is overwritten.
    pub fn materialize(&self, row: &QuotationRow) -> Result<PathBuf> {
        if !self.template.exists() {
            return Err(Error::FileNotFound {
                what: "Template",
                path: self.template.clone(),
            });
        }

        let mut doc = TemplateDocument::open(&self.template)?;
        for (idx, (cell, text)) in TEMPLATE_FIELDS.iter().zip(&row.fields).enumerate() {
            doc.set(*cell, field_input(idx, text));
        }

        let path = self.output_path(row);
        doc.save(&path)?;
        tracing::debug!(row = row.index, path = %path.display(), "materialized");
        Ok(path)
    }
}

fn field_input(field: usize, text: &str) -> CellInput {
    if text.is_empty() {
        return CellInput::Blank;
    }
    if NUMERIC_FIELDS.contains(&field) {
        let trimmed = text.trim();
        if PLAIN_DECIMAL.is_match(trimmed) {
            if let Ok(n) = trimmed.parse::<f64>() {
                return CellInput::Number(n);
            }
        }
    }
    CellInput::Text(text.to_string())
}
