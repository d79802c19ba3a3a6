//! Error types for quotegen

use std::path::PathBuf;

use thiserror::Error;

/// Result type for quotegen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort a batch or fail a single row
#[derive(Debug, Error)]
pub enum Error {
    /// Workbook could not be read or written
    #[error(transparent)]
    Xlsx(#[from] quotegen_xlsx::XlsxError),

    /// CSV input could not be parsed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required input does not exist
    #[error("{what} file not found: {}", .path.display())]
    FileNotFound { what: &'static str, path: PathBuf },

    /// Output folder could not be created
    #[error("Cannot create folder {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input file type not recognised
    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),
}
