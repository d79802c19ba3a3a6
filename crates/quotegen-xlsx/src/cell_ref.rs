//! A1-style cell references

use std::fmt;
use std::str::FromStr;

use crate::error::{XlsxError, XlsxResult};

/// Maximum number of rows in a worksheet
pub const MAX_ROWS: u32 = 1_048_576;
/// Maximum number of columns in a worksheet
pub const MAX_COLS: u16 = 16_384;

/// A cell position on a worksheet.
///
/// Both indices are 0-based; `B11` is `row: 10, col: 1`. Ordering is row-major,
/// which is the order cells must appear in inside `<sheetData>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    /// Row index (0-based)
    pub row: u32,
    /// Column index (0-based, A=0)
    pub col: u16,
}

impl CellRef {
    /// Create a reference from 0-based indices
    pub const fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// Parse an A1-style reference. `$` markers are accepted and ignored.
    ///
    /// ```
    /// use quotegen_xlsx::CellRef;
    ///
    /// let cell = CellRef::parse("H12").unwrap();
    /// assert_eq!((cell.row, cell.col), (11, 7));
    /// ```
    pub fn parse(s: &str) -> XlsxResult<Self> {
        let s = s.trim();
        let bytes = s.as_bytes();
        let mut pos = 0;

        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }
        let col_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == col_start {
            return Err(XlsxError::InvalidCellRef(format!(
                "no column letters in '{s}'"
            )));
        }
        let col = Self::letters_to_column(&s[col_start..pos])?;

        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }
        let row: u32 = s[pos..]
            .parse()
            .map_err(|_| XlsxError::InvalidCellRef(format!("invalid row number in '{s}'")))?;
        if row == 0 || row > MAX_ROWS {
            return Err(XlsxError::InvalidCellRef(format!(
                "row number out of range in '{s}'"
            )));
        }

        Ok(Self { row: row - 1, col })
    }

    /// 1-based row number as it appears in `<row r="..">`
    pub fn row_number(&self) -> u32 {
        self.row + 1
    }

    /// Convert column index to letters (0 = A, 25 = Z, 26 = AA, etc.)
    pub fn column_to_letters(col: u16) -> String {
        let mut result = String::new();
        let mut n = col as u32 + 1;

        while n > 0 {
            n -= 1;
            result.insert(0, ((n % 26) as u8 + b'A') as char);
            n /= 26;
        }

        result
    }

    /// Convert column letters to index (A = 0, Z = 25, AA = 26, etc.)
    pub fn letters_to_column(letters: &str) -> XlsxResult<u16> {
        if letters.is_empty() {
            return Err(XlsxError::InvalidCellRef("empty column letters".into()));
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(XlsxError::InvalidCellRef(format!(
                    "invalid column letter '{c}'"
                )));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
            if col > MAX_COLS as u32 {
                return Err(XlsxError::InvalidCellRef(format!(
                    "column '{letters}' out of range"
                )));
            }
        }

        Ok((col - 1) as u16)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            Self::column_to_letters(self.col),
            self.row_number()
        )
    }
}

impl FromStr for CellRef {
    type Err = XlsxError;

    fn from_str(s: &str) -> XlsxResult<Self> {
        Self::parse(s)
    }
}
