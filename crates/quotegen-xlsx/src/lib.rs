//! # quotegen-xlsx
//!
//! The two XLSX operations quotegen needs, built directly on `zip` and
//! `quick-xml`:
//!
//! - [`SheetReader`] loads the first worksheet of a workbook as a grid of
//!   display strings.
//! - [`TemplateDocument`] rewrites a handful of cells on the active sheet of a
//!   template and saves the result as a new file, copying every other part of
//!   the package untouched.

pub mod cell_ref;
pub mod error;
pub mod reader;
pub mod template;

mod package;

pub use cell_ref::CellRef;
pub use error::{XlsxError, XlsxResult};
pub use reader::{SheetGrid, SheetReader};
pub use template::{CellInput, TemplateDocument};
