//! PDF export through an external spreadsheet application.
//!
//! A [`PdfBackend`] starts the application once per batch and hands back a
//! [`PdfSession`]. The session converts one workbook at a time and is shut
//! down when the batch ends.

pub mod excel;
pub mod libreoffice;
mod process;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use excel::{linux_to_wine_path, ExcelBridge, ExcelBridgeConfig};
pub use libreoffice::{LibreOffice, LibreOfficeConfig};

/// Result type for export operations
pub type ExportResult<T> = std::result::Result<T, ExportError>;

/// Errors from PDF backends
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WINE not found. Install WINE and ensure 'wine' is in PATH.")]
    WineNotFound,

    #[error("Bridge executable not found at: {0}")]
    BridgeExeNotFound(String),

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Bridge returned error: {0}")]
    Bridge(String),

    #[error("Unexpected response from bridge")]
    UnexpectedResponse,

    #[error("LibreOffice not found. Install LibreOffice and ensure 'soffice' is in PATH.")]
    SofficeNotFound,

    #[error("{0} did not finish within {1} seconds")]
    Timeout(String, u64),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("No PDF backend available: {0}")]
    Unavailable(String),
}

/// Starts an external application able to render workbooks as PDF
pub trait PdfBackend: Send {
    /// Short name for log messages
    fn name(&self) -> &str;

    fn start(&self) -> ExportResult<Box<dyn PdfSession>>;
}

/// A running application. Lives for one batch.
pub trait PdfSession {
    /// Open `workbook`, write it to `pdf` and close it without saving.
    /// Closing is attempted even when the export itself fails.
    fn export_pdf(&mut self, workbook: &Path, pdf: &Path) -> ExportResult<()>;

    /// Release the application. Calling it again does nothing.
    fn shutdown(&mut self) -> ExportResult<()>;
}

/// Which backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfMode {
    /// Excel first, then LibreOffice
    #[default]
    Auto,
    Excel,
    LibreOffice,
    /// Workbooks only
    None,
}

impl FromStr for PdfMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(PdfMode::Auto),
            "excel" => Ok(PdfMode::Excel),
            "libreoffice" | "soffice" => Ok(PdfMode::LibreOffice),
            "none" | "off" => Ok(PdfMode::None),
            other => Err(format!(
                "unknown PDF mode '{other}' (expected auto, excel, libreoffice or none)"
            )),
        }
    }
}

impl fmt::Display for PdfMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PdfMode::Auto => "auto",
            PdfMode::Excel => "excel",
            PdfMode::LibreOffice => "libreoffice",
            PdfMode::None => "none",
        })
    }
}

/// Build the backend for `mode`, or nothing when export is off
pub fn backend_for(
    mode: PdfMode,
    excel: &ExcelBridgeConfig,
    libreoffice: &LibreOfficeConfig,
) -> Option<Box<dyn PdfBackend>> {
    match mode {
        PdfMode::None => None,
        PdfMode::Excel => Some(Box::new(ExcelBridge::new(excel.clone()))),
        PdfMode::LibreOffice => Some(Box::new(LibreOffice::new(libreoffice.clone()))),
        PdfMode::Auto => Some(Box::new(FirstAvailable::new(vec![
            Box::new(ExcelBridge::new(excel.clone())),
            Box::new(LibreOffice::new(libreoffice.clone())),
        ]))),
    }
}

/// Tries each backend in turn and keeps the first that starts
pub struct FirstAvailable {
    backends: Vec<Box<dyn PdfBackend>>,
}

impl FirstAvailable {
    pub fn new(backends: Vec<Box<dyn PdfBackend>>) -> Self {
        Self { backends }
    }
}

impl PdfBackend for FirstAvailable {
    fn name(&self) -> &str {
        "auto"
    }

    fn start(&self) -> ExportResult<Box<dyn PdfSession>> {
        let mut reasons = Vec::new();
        for backend in &self.backends {
            match backend.start() {
                Ok(session) => {
                    tracing::info!(backend = backend.name(), "PDF backend started");
                    return Ok(session);
                }
                Err(e) => {
                    tracing::debug!(backend = backend.name(), error = %e, "PDF backend unavailable");
                    reasons.push(format!("{}: {e}", backend.name()));
                }
            }
        }
        Err(ExportError::Unavailable(reasons.join("; ")))
    }
}

/// Owns the session for a batch and shuts it down exactly once, on drop at
/// the latest.
pub(crate) struct SessionGuard {
    session: Option<Box<dyn PdfSession>>,
}

impl SessionGuard {
    pub(crate) fn new(session: Option<Box<dyn PdfSession>>) -> Self {
        Self { session }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn session(&mut self) -> Option<&mut (dyn PdfSession + 'static)> {
        self.session.as_deref_mut()
    }

    pub(crate) fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.shutdown() {
                tracing::warn!(error = %e, "PDF backend did not shut down cleanly");
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}
