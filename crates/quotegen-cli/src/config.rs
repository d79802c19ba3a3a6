//! Optional `quotegen.toml` settings. Command-line flags win over the file.
//!
//! ```toml
//! pdf = "libreoffice"
//! soffice = "/opt/libreoffice/program/soffice"
//! export_timeout_secs = 180
//! shutdown_grace_secs = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use quotegen::{BatchConfig, PdfMode};
use serde::Deserialize;

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub pdf: Option<PdfMode>,
    pub soffice: Option<PathBuf>,
    pub bridge_exe: Option<PathBuf>,
    pub wine: Option<PathBuf>,
    pub wine_prefix: Option<PathBuf>,
    /// Per-document limit for either backend
    pub export_timeout_secs: Option<u64>,
    /// How long Ctrl-C waits for the row in progress
    pub shutdown_grace_secs: Option<u64>,
}

/// Settings given on the command line
#[derive(Debug, Default)]
pub struct Overrides {
    pub pdf: Option<PdfMode>,
    pub soffice: Option<PathBuf>,
    pub bridge_exe: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config '{}'", path.display()))
    }

    pub fn apply(&self, mut config: BatchConfig, overrides: &Overrides) -> BatchConfig {
        if let Some(pdf) = overrides.pdf.or(self.pdf) {
            config.pdf = pdf;
        }

        let soffice = overrides.soffice.as_ref().or(self.soffice.as_ref());
        if let Some(soffice) = soffice {
            config.libreoffice.soffice_path = Some(soffice.clone());
        }
        let bridge_exe = overrides.bridge_exe.as_ref().or(self.bridge_exe.as_ref());
        if let Some(exe) = bridge_exe {
            config.excel.bridge_exe_path = Some(exe.clone());
        }
        if let Some(wine) = &self.wine {
            config.excel.wine_path = wine.clone();
        }
        if let Some(prefix) = &self.wine_prefix {
            config.excel.wine_prefix = Some(prefix.clone());
        }
        if let Some(secs) = self.export_timeout_secs {
            config.excel.timeout = Duration::from_secs(secs);
            config.libreoffice.convert_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE)
    }
}
