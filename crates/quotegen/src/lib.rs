//! # quotegen
//!
//! Generates one quotation workbook per row of an input table by filling a
//! fixed template, and optionally exports each workbook to PDF through Excel
//! or LibreOffice.
//!
//! ## Quick Start
//!
//! ```no_run
//! use quotegen::{BatchConfig, BatchEvent, BatchRunner, PdfMode};
//!
//! let config = BatchConfig::new("items.xlsx", "template.xlsx", "out").with_pdf(PdfMode::None);
//! let handle = BatchRunner::new(config).spawn(|event: BatchEvent| {
//!     if let BatchEvent::Log { message, .. } = event {
//!         println!("{message}");
//!     }
//! });
//! let outcome = handle.join();
//! println!("{}", outcome.message());
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod materialize;
pub mod numeric;
pub mod rows;
pub mod table;

pub use batch::{
    BatchEvent, BatchHandle, BatchOutcome, BatchRunner, BatchState, BatchSummary,
    CancellationToken, EventSink, LogLevel,
};
pub use config::BatchConfig;
pub use error::{Error, Result};
pub use export::{PdfBackend, PdfMode, PdfSession};
pub use materialize::Materializer;
pub use numeric::extract_number;
pub use rows::{progress_percent, QuotationRow, QuotationRows};
pub use table::InputTable;
