//! Excel backend: drives the `quotegen-bridge.exe` process over JSON lines.
//!
//! On Windows the bridge runs directly; elsewhere it runs under WINE and
//! paths are translated to WINE's `Z:` drive.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use quotegen_bridge_protocol::{
    Command as BridgeCommand, Request, Response, ResponseData, ResponseResult,
};

use super::process::wait_with_timeout;
use super::{ExportError, ExportResult, PdfBackend, PdfSession};

const BRIDGE_EXE: &str = "quotegen-bridge.exe";
const EXIT_GRACE: Duration = Duration::from_secs(10);

/// Configuration for the Excel bridge.
#[derive(Debug, Clone)]
pub struct ExcelBridgeConfig {
    /// Path to `quotegen-bridge.exe`.
    /// If None, searched next to the current binary and in `target/`.
    pub bridge_exe_path: Option<PathBuf>,

    /// Path to the WINE executable. Defaults to "wine". Unused on Windows.
    pub wine_path: PathBuf,

    /// Optional WINEPREFIX to use.
    pub wine_prefix: Option<PathBuf>,

    /// Timeout for each bridge response.
    pub timeout: Duration,
}

impl Default for ExcelBridgeConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            wine_path: PathBuf::from("wine"),
            wine_prefix: None,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct ExcelBridge {
    config: ExcelBridgeConfig,
}

impl ExcelBridge {
    pub fn new(config: ExcelBridgeConfig) -> Self {
        Self { config }
    }
}

impl PdfBackend for ExcelBridge {
    fn name(&self) -> &str {
        "excel"
    }

    fn start(&self) -> ExportResult<Box<dyn PdfSession>> {
        let exe = self
            .config
            .bridge_exe_path
            .clone()
            .unwrap_or_else(find_bridge_exe);
        if !exe.exists() {
            return Err(ExportError::BridgeExeNotFound(exe.display().to_string()));
        }

        let under_wine = !cfg!(windows);
        let mut cmd = if under_wine {
            let mut cmd = std::process::Command::new(&self.config.wine_path);
            if let Some(prefix) = &self.config.wine_prefix {
                cmd.env("WINEPREFIX", prefix);
            }
            cmd.arg(&exe);
            cmd
        } else {
            std::process::Command::new(&exe)
        };
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(exe = %exe.display(), under_wine, "starting Excel bridge");
        let mut child = cmd.spawn().map_err(|source| {
            if under_wine && source.kind() == std::io::ErrorKind::NotFound {
                ExportError::WineNotFound
            } else {
                ExportError::Spawn {
                    program: exe.display().to_string(),
                    source,
                }
            }
        })?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExportError::NotRunning);
            }
        };

        // Responses are read on their own thread so every wait can time out
        let (tx, responses) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                tracing::debug!(target: "quotegen::bridge", "{line}");
            }
        });

        let mut session = ExcelSession {
            child,
            stdin: Some(stdin),
            responses,
            next_id: 1,
            timeout: self.config.timeout,
            under_wine,
            closed: false,
        };
        session.send(BridgeCommand::Init)?;

        Ok(Box::new(session))
    }
}

struct ExcelSession {
    child: Child,
    stdin: Option<ChildStdin>,
    responses: Receiver<std::io::Result<String>>,
    next_id: u64,
    timeout: Duration,
    under_wine: bool,
    closed: bool,
}

impl ExcelSession {
    /// Send a command and wait for the response with the same id
    fn send(&mut self, command: BridgeCommand) -> ExportResult<Option<ResponseData>> {
        let stdin = self.stdin.as_mut().ok_or(ExportError::NotRunning)?;
        let id = self.next_id;
        self.next_id += 1;

        let json = serde_json::to_string(&Request { id, command })?;
        writeln!(stdin, "{json}")?;
        stdin.flush()?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match self.responses.recv_timeout(remaining) {
                Ok(line) => line?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ExportError::Timeout(
                        "Excel bridge".into(),
                        self.timeout.as_secs(),
                    ))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(ExportError::NotRunning),
            };

            let response: Response = serde_json::from_str(&line)?;
            if response.id != id {
                // Left over from a request that timed out
                tracing::debug!(expected = id, got = response.id, "discarding bridge response");
                continue;
            }
            return match response.result {
                ResponseResult::Ok { data } => Ok(data),
                ResponseResult::Error { message } => Err(ExportError::Bridge(message)),
            };
        }
    }

    fn host_path(&self, path: &Path) -> String {
        if self.under_wine {
            linux_to_wine_path(path)
        } else {
            absolute(path).display().to_string()
        }
    }
}

impl PdfSession for ExcelSession {
    fn export_pdf(&mut self, workbook: &Path, pdf: &Path) -> ExportResult<()> {
        let handle = match self.send(BridgeCommand::OpenWorkbook {
            path: self.host_path(workbook),
        })? {
            Some(ResponseData::WorkbookHandle { workbook }) => workbook,
            None => return Err(ExportError::UnexpectedResponse),
        };

        let exported = self
            .send(BridgeCommand::ExportPdf {
                workbook: handle,
                path: self.host_path(pdf),
            })
            .map(drop);
        let closed = self
            .send(BridgeCommand::CloseWorkbook { workbook: handle })
            .map(drop);

        if let (Err(_), Err(e)) = (&exported, &closed) {
            tracing::debug!(error = %e, "close after failed export also failed");
        }
        exported.and(closed)
    }

    fn shutdown(&mut self) -> ExportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.send(BridgeCommand::Shutdown).map(drop);
        // EOF tells the bridge to quit even if Shutdown was lost
        self.stdin.take();

        if wait_with_timeout(&mut self.child, EXIT_GRACE)?.is_none() {
            tracing::warn!("Excel bridge did not exit, killing it");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        result
    }
}

impl Drop for ExcelSession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

/// Convert a Linux filesystem path to a WINE (Windows) path.
///
/// WINE maps `/` to `Z:\`, so `/home/user/file.xlsx` becomes `Z:\home\user\file.xlsx`.
pub fn linux_to_wine_path(linux_path: &Path) -> String {
    format!("Z:{}", absolute(linux_path).display()).replace('/', "\\")
}

/// Look for the bridge next to the current executable, then in the
/// cross-compile target directory.
fn find_bridge_exe() -> PathBuf {
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join(BRIDGE_EXE);
        if candidate.exists() {
            return candidate;
        }
    }

    for profile in ["release", "debug"] {
        let candidate = PathBuf::from(format!(
            "target/x86_64-pc-windows-gnu/{profile}/{BRIDGE_EXE}"
        ));
        if candidate.exists() {
            return candidate;
        }
    }

    PathBuf::from(BRIDGE_EXE)
}
