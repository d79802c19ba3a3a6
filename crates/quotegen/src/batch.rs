//! Batch orchestration: one worker thread walks the input table, writes a
//! workbook per row, exports PDFs when a backend is available and reports
//! everything through [`BatchEvent`]s.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::export::{self, PdfBackend, SessionGuard};
use crate::materialize::Materializer;
use crate::rows::{progress_percent, QuotationRows};
use crate::table::InputTable;

/// Failed identifiers listed by name in the final report
const REPORTED_FAILURES: usize = 5;

/// Lifecycle of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Preparing,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Idle => "idle",
            BatchState::Preparing => "preparing",
            BatchState::Running => "running",
            BatchState::Completed => "completed",
            BatchState::Cancelled => "cancelled",
            BatchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Notifications from the worker to whoever displays the run
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    State(BatchState),
    /// Percentage, never decreasing within a run
    Progress(u8),
    Log { level: LogLevel, message: String },
    /// Identifier of the row about to be processed
    Item(String),
    /// Always the last event of a run
    Finished(BatchOutcome),
}

/// Receives [`BatchEvent`]s on the worker thread
pub trait EventSink: Send {
    fn emit(&mut self, event: BatchEvent);
}

impl<F> EventSink for F
where
    F: FnMut(BatchEvent) + Send,
{
    fn emit(&mut self, event: BatchEvent) {
        self(event)
    }
}

impl EventSink for mpsc::Sender<BatchEvent> {
    fn emit(&mut self, event: BatchEvent) {
        // Nobody listening any more is not the worker's problem
        let _ = self.send(event);
    }
}

/// Shared flag asking the worker to stop before its next row
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Counts gathered over a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    /// Workbooks written
    pub succeeded: usize,
    /// PDFs written
    pub exported: usize,
    /// Identifiers whose workbook could not be written, in row order
    pub failed: Vec<String>,
    pub output_dir: PathBuf,
    /// Whether a PDF backend was running for this batch
    pub pdf_enabled: bool,
}

impl BatchSummary {
    /// One-line result, e.g. `Done! Generated 3 Excel files and 3 PDF files`
    pub fn headline(&self, cancelled: bool) -> String {
        if cancelled {
            format!("Cancelled! Generated {} Excel files", self.succeeded)
        } else if self.pdf_enabled {
            format!(
                "Done! Generated {} Excel files and {} PDF files",
                self.succeeded, self.exported
            )
        } else {
            format!("Done! Generated {} Excel files", self.succeeded)
        }
    }

    /// Lines of the final report after the headline
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("Location: {}", self.output_dir.display())];
        if !self.failed.is_empty() {
            let shown: Vec<&str> = self
                .failed
                .iter()
                .take(REPORTED_FAILURES)
                .map(String::as_str)
                .collect();
            lines.push(format!(
                "Failed items ({}): {}",
                self.failed.len(),
                shown.join(", ")
            ));
            if self.failed.len() > REPORTED_FAILURES {
                lines.push(format!(
                    "... and {} more",
                    self.failed.len() - REPORTED_FAILURES
                ));
            }
        }
        lines
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Completed(BatchSummary),
    /// Stopped early on request; the summary covers the rows processed
    Cancelled(BatchSummary),
    /// Aborted before any row was processed
    Failed { message: String },
}

impl BatchOutcome {
    pub fn summary(&self) -> Option<&BatchSummary> {
        match self {
            BatchOutcome::Completed(s) | BatchOutcome::Cancelled(s) => Some(s),
            BatchOutcome::Failed { .. } => None,
        }
    }

    pub fn state(&self) -> BatchState {
        match self {
            BatchOutcome::Completed(_) => BatchState::Completed,
            BatchOutcome::Cancelled(_) => BatchState::Cancelled,
            BatchOutcome::Failed { .. } => BatchState::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, BatchOutcome::Failed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            BatchOutcome::Completed(s) => s.headline(false),
            BatchOutcome::Cancelled(s) => s.headline(true),
            BatchOutcome::Failed { message } => message.clone(),
        }
    }
}

/// Runs a batch, either on the calling thread ([`run`](Self::run)) or on a
/// worker thread ([`spawn`](Self::spawn)).
pub struct BatchRunner {
    config: BatchConfig,
    backend: Option<Box<dyn PdfBackend>>,
}

impl BatchRunner {
    /// Runner with the PDF backend selected by `config.pdf`
    pub fn new(config: BatchConfig) -> Self {
        let backend = export::backend_for(config.pdf, &config.excel, &config.libreoffice);
        Self { config, backend }
    }

    /// Use `backend` for PDF export instead
    pub fn with_backend(mut self, backend: impl PdfBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    pub fn without_pdf(mut self) -> Self {
        self.backend = None;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Start the batch on its own thread
    pub fn spawn<S: EventSink + 'static>(self, mut sink: S) -> BatchHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let thread = thread::spawn(move || self.run(&mut sink, &token));
        BatchHandle { cancel, thread }
    }

    /// Run the whole batch on the calling thread
    pub fn run<S: EventSink + ?Sized>(
        self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut worker = Worker {
            sink,
            cancel,
            config: &self.config,
        };
        worker.run(self.backend.as_deref())
    }
}

/// Control over a spawned batch
pub struct BatchHandle {
    cancel: CancellationToken,
    thread: thread::JoinHandle<BatchOutcome>,
}

impl BatchHandle {
    /// Ask the worker to stop after the row in progress
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker
    pub fn join(self) -> BatchOutcome {
        self.thread.join().unwrap_or_else(|_| BatchOutcome::Failed {
            message: "batch worker panicked".to_string(),
        })
    }

    /// Wait at most `timeout`; hands the handle back if the worker is still busy
    pub fn join_timeout(self, timeout: Duration) -> std::result::Result<BatchOutcome, Self> {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return Err(self);
            }
            thread::sleep(Duration::from_millis(20));
        }
        Ok(self.join())
    }
}

struct Worker<'a, S: ?Sized> {
    sink: &'a mut S,
    cancel: &'a CancellationToken,
    config: &'a BatchConfig,
}

impl<S: EventSink + ?Sized> Worker<'_, S> {
    fn run(&mut self, backend: Option<&dyn PdfBackend>) -> BatchOutcome {
        self.state(BatchState::Preparing);

        let table = match self.prepare() {
            Ok(table) => table,
            Err(e) => {
                let message = e.to_string();
                self.log(LogLevel::Error, format!("Error: {message}"));
                self.emit(BatchEvent::Progress(100));
                let outcome = BatchOutcome::Failed { message };
                self.finish(&outcome);
                return outcome;
            }
        };

        let mut guard = SessionGuard::new(self.start_backend(backend));
        let outcome = self.process(&table, &mut guard);
        guard.release();

        self.finish(&outcome);
        outcome
    }

    fn prepare(&mut self) -> Result<InputTable> {
        require(&self.config.input, "Input")?;
        require(&self.config.template, "Template")?;

        for dir in [self.config.excel_dir(), self.config.pdf_dir()] {
            fs::create_dir_all(&dir).map_err(|source| Error::CreateDir { path: dir, source })?;
        }

        self.log(LogLevel::Info, "Loading input file...");
        InputTable::load(&self.config.input)
    }

    fn start_backend(
        &mut self,
        backend: Option<&dyn PdfBackend>,
    ) -> Option<Box<dyn export::PdfSession>> {
        let Some(backend) = backend else {
            self.log(
                LogLevel::Info,
                "PDF export disabled, generating Excel files only",
            );
            return None;
        };

        self.log(
            LogLevel::Info,
            format!("Starting {} for PDF export...", backend.name()),
        );
        match backend.start() {
            Ok(session) => {
                self.log(LogLevel::Info, "PDF export ready");
                Some(session)
            }
            Err(e) => {
                self.log(
                    LogLevel::Warn,
                    format!("Could not start PDF export ({e}), generating Excel files only"),
                );
                None
            }
        }
    }

    fn process(&mut self, table: &InputTable, guard: &mut SessionGuard) -> BatchOutcome {
        self.state(BatchState::Running);

        let materializer = Materializer::new(&self.config.template, self.config.excel_dir());
        let pdf_dir = self.config.pdf_dir();
        let rows = QuotationRows::new(table);
        let total = rows.total();

        let mut summary = BatchSummary {
            output_dir: self.config.output_dir.clone(),
            pdf_enabled: guard.is_active(),
            ..Default::default()
        };

        for row in rows {
            if self.cancel.is_cancelled() {
                self.log(LogLevel::Warn, "Process cancelled by user");
                break;
            }

            let id = row.identifier.clone();
            self.emit(BatchEvent::Item(id.clone()));
            self.emit(BatchEvent::Progress(progress_percent(row.index, total)));
            self.log(
                LogLevel::Info,
                format!("Processing {id} ({}/{total})...", row.index),
            );

            let workbook = match materializer.materialize(&row) {
                Ok(path) => path,
                Err(e) => {
                    summary.failed.push(id.clone());
                    self.log(LogLevel::Error, format!("Error processing {id}: {e}"));
                    continue;
                }
            };
            summary.succeeded += 1;

            // A cancel request skips the export of the row in flight
            if self.cancel.is_cancelled() {
                continue;
            }
            if let Some(session) = guard.session() {
                let pdf = pdf_dir.join(format!("Q{}.pdf", row.stem));
                match session.export_pdf(&workbook, &pdf) {
                    Ok(()) => summary.exported += 1,
                    Err(e) => self.log(LogLevel::Warn, format!("PDF failed for {id}: {e}")),
                }
            }
        }

        let cancelled = self.cancel.is_cancelled();
        self.emit(BatchEvent::Progress(100));
        self.log(LogLevel::Info, summary.headline(cancelled));
        for line in summary.report_lines() {
            self.log(LogLevel::Info, line);
        }

        if cancelled {
            BatchOutcome::Cancelled(summary)
        } else {
            BatchOutcome::Completed(summary)
        }
    }

    fn finish(&mut self, outcome: &BatchOutcome) {
        self.state(outcome.state());
        self.emit(BatchEvent::Finished(outcome.clone()));
    }

    fn state(&mut self, state: BatchState) {
        tracing::debug!(%state, "batch state");
        self.emit(BatchEvent::State(state));
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        self.emit(BatchEvent::Log { level, message });
    }

    fn emit(&mut self, event: BatchEvent) {
        self.sink.emit(event);
    }
}

fn require(path: &Path, what: &'static str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::FileNotFound {
            what,
            path: path.to_path_buf(),
        })
    }
}
