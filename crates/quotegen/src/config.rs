//! Batch configuration

use std::path::{Path, PathBuf};

use crate::export::{ExcelBridgeConfig, LibreOfficeConfig, PdfMode};

/// Folder under the output directory that receives the workbooks
pub const EXCEL_OUTPUT_DIR: &str = "Excel Output";
/// Folder under the output directory that receives the PDFs
pub const PDF_OUTPUT_DIR: &str = "PDF Output";

/// Everything a batch run needs
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// `.xlsx`, `.xlsm` or `.csv` table, one quotation per row
    pub input: PathBuf,
    /// Template workbook; its active sheet receives the row fields
    pub template: PathBuf,
    /// Root of the `Excel Output` and `PDF Output` folders
    pub output_dir: PathBuf,
    pub pdf: PdfMode,
    pub excel: ExcelBridgeConfig,
    pub libreoffice: LibreOfficeConfig,
}

impl BatchConfig {
    pub fn new(
        input: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            template: template.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_pdf(mut self, pdf: PdfMode) -> Self {
        self.pdf = pdf;
        self
    }

    pub fn excel_dir(&self) -> PathBuf {
        self.output_dir.join(EXCEL_OUTPUT_DIR)
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.output_dir.join(PDF_OUTPUT_DIR)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
