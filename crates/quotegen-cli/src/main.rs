//! quotegen CLI - batch quotation generator

mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use quotegen::table::columns;
use quotegen::{
    BatchConfig, BatchEvent, BatchOutcome, BatchRunner, BatchState, InputTable, LogLevel, PdfMode,
    QuotationRows,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::config::{FileConfig, Overrides};

#[derive(Parser)]
#[command(name = "quotegen")]
#[command(
    author,
    version,
    about = "Generate quotation workbooks (and PDFs) from a table of items"
)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill the template once per input row and export PDFs
    Generate(GenerateArgs),

    /// Show which rows would produce which files, without writing anything
    Plan {
        /// Input table (xlsx, xlsm, csv)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show information about an input table
    Inspect {
        /// Input table (xlsx, xlsm, csv)
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Input table (xlsx, xlsm, csv), one item per row after the header
    #[arg(short, long)]
    input: PathBuf,

    /// Quotation template workbook
    #[arg(short, long)]
    template: PathBuf,

    /// Folder that receives "Excel Output" and "PDF Output"
    #[arg(short, long)]
    output: PathBuf,

    /// PDF backend: auto, excel, libreoffice or none
    #[arg(long)]
    pdf: Option<PdfMode>,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the soffice executable
    #[arg(long)]
    soffice: Option<PathBuf>,

    /// Path to quotegen-bridge.exe
    #[arg(long)]
    bridge_exe: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate(args) => generate(args),
        Commands::Plan { input } => plan(&input),
        Commands::Inspect { input } => inspect(&input),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn generate(args: GenerateArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let overrides = Overrides {
        pdf: args.pdf,
        soffice: args.soffice,
        bridge_exe: args.bridge_exe,
    };
    let config = file.apply(
        BatchConfig::new(args.input, args.template, args.output),
        &overrides,
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(run_batch(config, file.shutdown_grace()))
}

async fn run_batch(config: BatchConfig, grace: Duration) -> Result<()> {
    tracing::debug!(pdf = %config.pdf, output = %config.output_dir.display(), "starting batch");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = BatchRunner::new(config).spawn(move |event: BatchEvent| {
        let _ = tx.send(event);
    });

    let mut view = ProgressView::default();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut outcome = None;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(BatchEvent::Finished(done)) => {
                    outcome = Some(done);
                    break;
                }
                Some(event) => view.show(&event),
                None => break,
            },
            _ = &mut ctrl_c => {
                eprintln!("Cancellation requested... finishing current item...");
                handle.cancel();
                break;
            }
        }
    }

    if outcome.is_none() {
        let drain = async {
            while let Some(event) = rx.recv().await {
                match event {
                    BatchEvent::Finished(done) => return Some(done),
                    event => view.show(&event),
                }
            }
            None
        };
        tokio::select! {
            waited = tokio::time::timeout(grace, drain) => outcome = waited.ok().flatten(),
            _ = tokio::signal::ctrl_c() => eprintln!("Not waiting for the current item"),
        }
    }

    let Some(outcome) = outcome else {
        bail!(
            "batch did not stop within {} seconds; generated files may be incomplete",
            grace.as_secs()
        );
    };

    // The worker has already released the PDF backend; collect the thread
    let _ = tokio::task::spawn_blocking(move || handle.join_timeout(grace).is_ok()).await;

    match outcome {
        BatchOutcome::Completed(_) | BatchOutcome::Cancelled(_) => Ok(()),
        BatchOutcome::Failed { message } => bail!(message),
    }
}

/// Prints batch events as they arrive
#[derive(Default)]
struct ProgressView {
    percent: u8,
}

impl ProgressView {
    fn show(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::State(state) => tracing::debug!(%state, "batch state"),
            BatchEvent::Progress(percent) => self.percent = *percent,
            BatchEvent::Item(id) => tracing::debug!(item = %id, "current item"),
            BatchEvent::Log { level, message } => match level {
                LogLevel::Info => println!("[{:>3}%] {message}", self.percent),
                LogLevel::Warn => eprintln!("warning: {message}"),
                LogLevel::Error => eprintln!("error: {message}"),
            },
            BatchEvent::Finished(outcome) => {
                if outcome.state() == BatchState::Cancelled {
                    eprintln!("cancelled");
                }
            }
        }
    }
}

fn plan(input: &Path) -> Result<()> {
    let table = InputTable::load(input)
        .with_context(|| format!("Failed to read '{}'", input.display()))?;
    let rows = QuotationRows::new(&table);
    let total = rows.total();

    let mut planned = 0;
    let mut next_index = 1;
    let mut producers: HashMap<String, Vec<usize>> = HashMap::new();

    for row in rows {
        for skipped in next_index..row.index {
            println!("{:>6}  (no serial number, skipped)", skipped + 1);
        }
        println!(
            "{:>6}  {:<24} Q{}.xlsx",
            row.index + 1,
            row.identifier,
            row.stem
        );
        producers
            .entry(row.stem.clone())
            .or_default()
            .push(row.index + 1);
        next_index = row.index + 1;
        planned += 1;
    }
    for skipped in next_index..=total {
        println!("{:>6}  (no serial number, skipped)", skipped + 1);
    }

    println!();
    println!("{planned} of {total} rows produce a quotation");

    let mut clashes: Vec<_> = producers
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .collect();
    clashes.sort();
    for (stem, rows) in clashes {
        let rows: Vec<String> = rows.iter().map(usize::to_string).collect();
        eprintln!(
            "warning: Q{stem}.xlsx is written by rows {}; the last one wins",
            rows.join(", ")
        );
    }

    Ok(())
}

fn inspect(input: &Path) -> Result<()> {
    let table = InputTable::load(input)
        .with_context(|| format!("Failed to read '{}'", input.display()))?;

    println!("File: {}", input.display());
    println!(
        "Rows: {} (header + {} items)",
        table.row_count(),
        table.row_count().saturating_sub(1)
    );
    println!("Columns: {}", table.column_count());

    let Some(header) = table.header() else {
        println!("  (empty)");
        return Ok(());
    };
    println!();
    for (idx, name) in header.iter().enumerate() {
        let role = column_role(idx);
        if name.is_empty() && role.is_empty() {
            continue;
        }
        println!("  {idx:>3}  {name:<28} {role}");
    }

    Ok(())
}

fn column_role(idx: usize) -> &'static str {
    match idx {
        columns::IDENTIFIER => "serial number -> B11",
        columns::CODE => "code -> C11",
        columns::DESCRIPTION => "description -> D11",
        columns::UNIT => "unit -> E11",
        columns::QUANTITY => "quantity -> F11",
        columns::PRICE => "price -> G11",
        columns::TAX_RATE => "tax rate -> H12",
        columns::NUMERIC_SOURCE => "numeric source",
        columns::DERIVED => "derived number (not written)",
        _ => "",
    }
}
