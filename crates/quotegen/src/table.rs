//! The input table: rows of text cells with fixed column roles.

use std::path::Path;

use quotegen_xlsx::SheetReader;

use crate::error::{Error, Result};
use crate::numeric::extract_number;

/// Every row has at least this many cells after loading
pub const MIN_COLUMNS: usize = 12;

/// Column positions (0-based). Row 0 is a header.
pub mod columns {
    /// Serial number; blank means the row is skipped
    pub const IDENTIFIER: usize = 1;
    pub const CODE: usize = 2;
    pub const DESCRIPTION: usize = 3;
    pub const UNIT: usize = 4;
    pub const QUANTITY: usize = 5;
    pub const PRICE: usize = 6;
    pub const TAX_RATE: usize = 7;
    /// Free-form text holding a number somewhere inside it
    pub const NUMERIC_SOURCE: usize = 10;
    /// [`extract_number`](crate::extract_number) of `NUMERIC_SOURCE`, kept in memory
    pub const DERIVED: usize = 11;
}

/// Rows of an input file, padded to [`MIN_COLUMNS`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTable {
    rows: Vec<Vec<String>>,
}

impl InputTable {
    /// Build a table from raw rows, padding ragged rows and filling the
    /// derived column of every row.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        for row in rows.iter_mut() {
            if row.len() < MIN_COLUMNS {
                row.resize_with(MIN_COLUMNS, String::new);
            }
            let value = extract_number(Some(&row[columns::NUMERIC_SOURCE]));
            row[columns::DERIVED] = value.to_string();
        }
        Self { rows }
    }

    /// Load `.xlsx`/`.xlsm` (first worksheet) or `.csv` input
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                what: "Input",
                path: path.to_path_buf(),
            });
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let rows = match extension.as_str() {
            "xlsx" | "xlsm" => SheetReader::read_file(path)?.into_rows(),
            "csv" => read_csv(path)?,
            other => {
                return Err(Error::UnsupportedFormat(if other.is_empty() {
                    path.display().to_string()
                } else {
                    format!(".{other}")
                }))
            }
        };

        tracing::debug!(path = %path.display(), rows = rows.len(), "loaded input table");
        Ok(Self::from_rows(rows))
    }

    /// Number of rows including the header
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns (at least [`MIN_COLUMNS`] unless the table is empty)
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn header(&self) -> Option<&[String]> {
        self.row(0)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}
