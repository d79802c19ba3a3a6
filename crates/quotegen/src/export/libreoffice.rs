//! LibreOffice backend: one headless `soffice --convert-to pdf` run per
//! workbook, sharing a private user profile for the whole batch.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;
use url::Url;

use super::process::run_with_timeout;
use super::{ExportError, ExportResult, PdfBackend, PdfSession};

/// Configuration for the LibreOffice backend.
#[derive(Debug, Clone)]
pub struct LibreOfficeConfig {
    /// Path to the `soffice` executable. If None, searches PATH.
    pub soffice_path: Option<PathBuf>,
    /// Limit for the `--version` probe at batch start. Default: 30 seconds.
    pub startup_timeout: Duration,
    /// Limit for converting one workbook. Default: 120 seconds.
    pub convert_timeout: Duration,
    /// Extra arguments to pass to soffice.
    pub extra_args: Vec<String>,
}

impl Default for LibreOfficeConfig {
    fn default() -> Self {
        Self {
            soffice_path: None,
            startup_timeout: Duration::from_secs(30),
            convert_timeout: Duration::from_secs(120),
            extra_args: Vec::new(),
        }
    }
}

pub struct LibreOffice {
    config: LibreOfficeConfig,
}

impl LibreOffice {
    pub fn new(config: LibreOfficeConfig) -> Self {
        Self { config }
    }

    fn program(&self) -> PathBuf {
        self.config
            .soffice_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("soffice"))
    }
}

impl PdfBackend for LibreOffice {
    fn name(&self) -> &str {
        "libreoffice"
    }

    fn start(&self) -> ExportResult<Box<dyn PdfSession>> {
        let program = self.program();
        let mut probe = Command::new(&program);
        probe.arg("--version");

        let finished = match run_with_timeout(probe, "soffice", self.config.startup_timeout) {
            Err(ExportError::Spawn { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                return Err(ExportError::SofficeNotFound)
            }
            other => other?,
        };
        if !finished.status.success() {
            return Err(ExportError::ConversionFailed(format!(
                "soffice --version exited with {}",
                finished.status
            )));
        }
        tracing::info!(version = finished.stdout.trim(), "using LibreOffice");

        // A private profile keeps us clear of a desktop instance holding the lock
        let profile = tempfile::Builder::new()
            .prefix("quotegen-soffice-")
            .tempdir()?;

        Ok(Box::new(LibreOfficeSession {
            program,
            profile: Some(profile),
            timeout: self.config.convert_timeout,
            extra_args: self.config.extra_args.clone(),
        }))
    }
}

struct LibreOfficeSession {
    program: PathBuf,
    profile: Option<TempDir>,
    timeout: Duration,
    extra_args: Vec<String>,
}

impl PdfSession for LibreOfficeSession {
    fn export_pdf(&mut self, workbook: &Path, pdf: &Path) -> ExportResult<()> {
        let profile = self.profile.as_ref().ok_or(ExportError::NotRunning)?;
        let outdir = pdf.parent().unwrap_or_else(|| Path::new("."));
        let stem = workbook.file_stem().ok_or_else(|| {
            ExportError::ConversionFailed(format!("no file name in {}", workbook.display()))
        })?;

        // soffice names its output after the input file
        let mut produced_name = OsString::from(stem);
        produced_name.push(".pdf");
        let produced = outdir.join(produced_name);
        for stale in [produced.as_path(), pdf] {
            if stale.exists() {
                fs::remove_file(stale)?;
            }
        }

        let profile_url = file_url(profile.path())?;
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "--headless",
            "--invisible",
            "--nocrashreport",
            "--nodefault",
            "--nologo",
            "--nofirststartwizard",
            "--norestore",
        ])
        .arg(format!("-env:UserInstallation={profile_url}"))
        .args(&self.extra_args)
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(outdir)
        .arg(workbook);

        tracing::debug!(?cmd, "converting");
        let finished = run_with_timeout(cmd, "soffice", self.timeout)?;

        if !finished.status.success() || !produced.exists() {
            let detail = finished.stderr.trim();
            return Err(ExportError::ConversionFailed(if detail.is_empty() {
                format!("soffice exited with {} and wrote no PDF", finished.status)
            } else {
                detail.to_string()
            }));
        }
        if produced.as_path() != pdf {
            fs::rename(&produced, pdf)?;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> ExportResult<()> {
        if let Some(profile) = self.profile.take() {
            profile.close()?;
        }
        Ok(())
    }
}

/// `file://` URL for a local directory, as `-env:UserInstallation` expects
fn file_url(path: &Path) -> ExportResult<String> {
    Url::from_directory_path(path).map(String::from).map_err(|()| {
        ExportError::ConversionFailed(format!(
            "profile path {} cannot be expressed as a file URL",
            path.display()
        ))
    })
}
