//! # a2b CLI
//!
//! Command-line interface for the a2b library.
//! Fills origin/destination tables or orders location lists kept in Excel workbooks.

use std::path::{Path, PathBuf};

use a2b::{
    format_duration, EngineOptions, FailurePolicy, RowFailure, ServiceConfig, WorkbookData,
    LOCATION_SHEET, PAIR_SHEET, RESULTS_SHEET,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error};

mod cli;

use cli::Mode;

/// Command-line interface for a2b
#[derive(Parser, Debug)]
#[command(name = "a2b")]
#[command(about = "Geocode, route and order locations stored in Excel workbooks")]
#[command(long_about = "Works on one Excel workbook in one of two modes:
  a2b trips.xlsx --mode a2b        # Fill missing coordinates, distances and durations of sheet \"A->B\"
  a2b stops.xlsx --mode order      # Order sheet \"A ordonner\" into sheet \"Résultats\"
  a2b                              # Pick a workbook from ./data and a mode interactively

Cells that already hold a value are never recomputed.
The workbook is rewritten in place unless --output is given.")]
#[command(version = env!("A2B_VERSION"))]
struct Cli {
    /// Workbook to process; picked from --data-dir when omitted
    file: Option<PathBuf>,

    /// Workflow: "a2b" fills a pair table, "order" orders a location list
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Input sheet (default: "A->B" or "A ordonner" depending on the mode)
    #[arg(long)]
    sheet: Option<String>,

    /// Sheet receiving the ordered legs
    #[arg(long, default_value = RESULTS_SHEET)]
    results_sheet: String,

    /// Description of the first location to visit (order mode)
    #[arg(long)]
    start: Option<String>,

    /// Output workbook (default: overwrite the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory listed when no file is given
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Report unresolved rows and go on instead of stopping at the first one
    #[arg(short, long)]
    keep_going: bool,

    /// Maximum number of concurrent routing requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Base URL of the Nominatim geocoding service
    #[arg(long)]
    geocoder_url: Option<String>,

    /// Base URL of the OSRM routing service
    #[arg(long)]
    router_url: Option<String>,

    /// Show what would be processed without calling any service
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Service configuration: public defaults overridden by flags
    fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        if let Some(url) = &self.geocoder_url {
            config.geocoder_url = url.clone();
        }
        if let Some(url) = &self.router_url {
            config.router_url = url.clone();
        }
        if let Some(n) = self.concurrency {
            config.max_concurrency = n.max(1);
        }
        config
    }

    fn failure_policy(&self) -> FailurePolicy {
        if self.keep_going {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        }
    }

    fn input_sheet(&self, mode: Mode) -> String {
        self.sheet.clone().unwrap_or_else(|| default_sheet(mode).to_string())
    }
}

fn default_sheet(mode: Mode) -> &'static str {
    match mode {
        Mode::Fill => PAIR_SHEET,
        Mode::Order => LOCATION_SHEET,
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    if cli.verbose {
        eprintln!("🚗 a2b v{} starting...", env!("A2B_VERSION"));
    }

    let file = match &cli.file {
        Some(file) => file.clone(),
        None => {
            let stdin = std::io::stdin();
            cli::pick_file(&cli.data_dir, &mut stdin.lock(), &mut std::io::stderr())
                .with_context(|| format!("no workbook selected in {}", cli.data_dir.display()))?
        }
    };
    let mode = match cli.mode {
        Some(mode) => mode,
        None => {
            let stdin = std::io::stdin();
            cli::pick_mode(&mut stdin.lock(), &mut std::io::stderr()).context("no mode selected")?
        }
    };
    let output = cli.output.clone().unwrap_or_else(|| file.clone());
    let sheet = cli.input_sheet(mode);
    let config = cli.service_config();
    debug!("Service configuration: {config:?}");

    if cli.dry_run {
        return dry_run(&cli, mode, &file, &sheet, &output);
    }

    eprintln!("📁 Reading {} (sheet '{sheet}')", file.display());

    match mode {
        Mode::Fill => fill(&cli, &file, &sheet, &output, config).await,
        Mode::Order => order(&cli, &file, &sheet, &output, config).await,
    }
}

/// Describe the run without any network call
fn dry_run(cli: &Cli, mode: Mode, file: &Path, sheet: &str, output: &Path) -> Result<()> {
    let workbook = WorkbookData::open(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    match mode {
        Mode::Fill => {
            let rows = workbook.pair_rows(sheet)?;
            let incomplete = rows.iter().filter(|row| !row.is_complete()).count();
            eprintln!(
                "🔍 [DRY RUN] Would fill {incomplete} of {} rows of sheet '{sheet}' and write {}",
                rows.len(),
                output.display()
            );
        }
        Mode::Order => {
            let descriptions = workbook.location_descriptions(sheet)?;
            let start = cli
                .start
                .as_deref()
                .or(descriptions.first().map(String::as_str))
                .unwrap_or("-");
            eprintln!(
                "🔍 [DRY RUN] Would order {} locations of sheet '{sheet}' from '{start}' into sheet '{}' of {}",
                descriptions.len(),
                cli.results_sheet,
                output.display()
            );
        }
    }
    Ok(())
}

async fn fill(cli: &Cli, file: &Path, sheet: &str, output: &Path, config: ServiceConfig) -> Result<()> {
    let progress_manager = cli::ProgressManager::new(0, "🌐 Resolving rows");
    let options = EngineOptions {
        progress: Some(progress_manager.callback()),
        failure_policy: cli.failure_policy(),
    };

    let report = a2b::fill_workbook(file, output, sheet, config, options).await;
    progress_manager.pb.finish_and_clear();
    let report = report.with_context(|| format!("failed to fill sheet '{sheet}' of {}", file.display()))?;

    print_failures(&report.failures);
    eprintln!(
        "✅ {} rows written to {} ({} requests, {} cache hits)",
        report.rows.len(),
        output.display(),
        report.stats.external_requests(),
        report.stats.geocoding_cache_hits + report.stats.routing_cache_hits
    );
    Ok(())
}

async fn order(cli: &Cli, file: &Path, sheet: &str, output: &Path, config: ServiceConfig) -> Result<()> {
    let progress_manager = cli::ProgressManager::new(0, "🌐 Resolving locations and routes");
    let options = EngineOptions {
        progress: Some(progress_manager.callback()),
        failure_policy: cli.failure_policy(),
    };

    let route = a2b::order_workbook(
        file,
        output,
        sheet,
        &cli.results_sheet,
        cli.start.as_deref(),
        config,
        options,
    )
    .await;
    progress_manager.pb.finish_and_clear();
    let route = route.with_context(|| format!("failed to order sheet '{sheet}' of {}", file.display()))?;

    print_failures(&route.skipped);
    for leg in &route.legs {
        eprintln!("  {leg}");
    }
    eprintln!(
        "✅ {} locations, {:.2} km, {} written to sheet '{}' of {}",
        route.order.len(),
        route.total_distance_km(),
        format_duration(route.total_duration_s()),
        cli.results_sheet,
        output.display()
    );
    Ok(())
}

fn print_failures(failures: &[RowFailure]) {
    if failures.is_empty() {
        return;
    }
    eprintln!("⚠️  {} unresolved:", failures.len());
    for failure in failures {
        eprintln!("  {}: {}", failure.label, failure.error);
    }
}
