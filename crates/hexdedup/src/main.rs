//! hexdedup CLI - duplicate H3 cell detection and resolution.

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use hexdedup::{
    ArtifactPaths, Crs, DedupConfig, DetectOptions, DetectReport, Pipeline, PostgresSource,
    ResolveReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;

/// Detect and resolve duplicate H3 cell records.
///
/// `detect` scans the source table, writes the id count artifacts and the
/// rows of every duplicated id. `resolve` collapses those rows to one
/// canonical row per id.
#[derive(Parser, Debug)]
#[command(name = "hexdedup")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose (debug) logging. RUST_LOG overrides.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output the run report as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Show a progress spinner.
    #[arg(long, global = true)]
    progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find duplicate ids and persist their rows
    Detect(DetectArgs),
    /// Collapse persisted duplicate groups to one row per id
    Resolve(ResolveArgs),
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory holding the artifacts.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Column holding the H3 cell id.
    #[arg(long, default_value = "hex_id")]
    id_column: String,

    /// CRS of stored and output geometries (EPSG:<code> or a PROJ string).
    #[arg(long, default_value = "EPSG:27700")]
    working_crs: Crs,
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Source table, optionally schema-qualified.
    #[arg(short, long, default_value = "national_dataset")]
    table: String,

    /// Column holding the encoded geometry.
    #[arg(long, default_value = "geom")]
    geometry_column: String,

    /// Reuse the duplicate id artifact from a previous run instead of scanning.
    #[arg(long)]
    read_cached_duplicates: bool,

    /// Rows per round trip during the id scan.
    #[arg(long, default_value = "100000")]
    scan_batch_size: usize,

    /// Ids per query when fetching duplicate rows.
    #[arg(long, default_value = "10000")]
    fetch_batch_size: usize,

    /// Rows between progress log lines.
    #[arg(long, default_value = "100000")]
    report_interval: usize,

    /// Keep only the polygonal parts of fetched geometries.
    #[arg(long)]
    sanitize_geometries: bool,
}

#[derive(Args, Debug)]
struct ResolveArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Quality column gating the area comparison.
    #[arg(long, default_value = "evi")]
    quality_column: String,
}

#[derive(Serialize)]
struct JsonOutput<'a, R: Serialize> {
    command: &'a str,
    output_dir: String,
    #[serde(flatten)]
    report: &'a R,
}

/// Create a spinner for indeterminate progress.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "hexdedup=debug,hexdedup_core=debug"
    } else {
        "hexdedup=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(io::stderr)
        .compact()
        .init();
}

impl CommonArgs {
    fn config(&self) -> DedupConfig {
        let mut config = DedupConfig::default().with_working_crs(self.working_crs.clone());
        config.id_column = self.id_column.clone();
        config
    }
}

fn print_detect(report: &DetectReport) {
    eprintln!();
    eprintln!("Detection Results:");
    match (report.rows_scanned, report.distinct_ids) {
        (Some(rows), Some(distinct)) => {
            eprintln!("  Rows scanned:      {rows}");
            eprintln!("  Distinct ids:      {distinct}");
        }
        _ => eprintln!("  Rows scanned:      (cached duplicate ids)"),
    }
    eprintln!("  Duplicate ids:     {}", report.duplicate_ids);
    eprintln!("  Expected rows:     {}", report.expected_rows);
    eprintln!("  Rows fetched:      {}", report.rows_fetched);
    eprintln!("  Processing time:   {:.3}s", report.elapsed_secs);
}

fn print_resolve(report: &ResolveReport) {
    eprintln!();
    eprintln!("Resolution Results:");
    eprintln!("  Rows read:         {}", report.rows_read);
    eprintln!("  Groups resolved:   {}", report.groups_resolved);
    eprintln!("  Null quality skipped: {}", report.null_quality_skipped);
    eprintln!("  Processing time:   {:.3}s", report.elapsed_secs);
}

struct OutputFlags {
    json: bool,
    progress: bool,
}

fn run_detect(args: DetectArgs, flags: &OutputFlags) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = args.common.config();
    config.table = args.table;
    config.geometry_column = args.geometry_column;
    config.scan_batch_size = args.scan_batch_size;
    config.fetch_batch_size = args.fetch_batch_size;
    config.report_interval = args.report_interval;
    config.sanitize_geometries = args.sanitize_geometries;

    let pipeline = Pipeline::new(config, ArtifactPaths::in_dir(&args.common.output_dir))?;

    let mut source = match PostgresSource::connect(&args.database_url, pipeline.config()) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, "could not connect to the data source");
            std::process::exit(1);
        }
    };

    let pb = flags
        .progress
        .then(|| create_spinner("Detecting duplicate ids..."));
    let options = DetectOptions {
        reuse_cached_duplicates: args.read_cached_duplicates,
    };
    let report = pipeline.detect(&mut source, options)?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if flags.json {
        let output = JsonOutput {
            command: "detect",
            output_dir: args.common.output_dir.display().to_string(),
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_detect(&report);
    }
    Ok(())
}

fn run_resolve(args: ResolveArgs, flags: &OutputFlags) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = args.common.config();
    config.quality_column = args.quality_column;

    let pipeline = Pipeline::new(config, ArtifactPaths::in_dir(&args.common.output_dir))?;

    let pb = flags
        .progress
        .then(|| create_spinner("Resolving duplicate groups..."));
    let report = pipeline.resolve()?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if flags.json {
        let output = JsonOutput {
            command: "resolve",
            output_dir: args.common.output_dir.display().to_string(),
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_resolve(&report);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let flags = OutputFlags {
        json: cli.json,
        progress: cli.progress && !cli.json,
    };

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "hexdedup", &mut io::stdout());
            Ok(())
        }
        Commands::Detect(args) => {
            init_tracing(cli.verbose);
            run_detect(args, &flags)
        }
        Commands::Resolve(args) => {
            init_tracing(cli.verbose);
            run_resolve(args, &flags)
        }
    }
}
