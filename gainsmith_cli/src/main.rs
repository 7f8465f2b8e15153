mod cli;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use cli::{Cli, Commands, FeaturesArgs, SchemaArgs, SignalsArgs, ValidateArgs};
use features_rs::{
    SchemaManifest, feature_schema, prepare_features, signal_summary, validate_frame,
};
use polars::prelude::*;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, prelude::*};

const LOG_FILE: &str = "gainsmith.log";

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries command output (schema names, reports), so logs go to stderr.
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))?;
        return Ok(None);
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
    let (writer, guard) = non_blocking(file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize tracing: {err}"))?;
    Ok(Some(guard))
}

fn log_invocation(log_file: Option<&Path>) {
    let cwd = std::env::current_dir().ok();
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?cwd,
        log_file = ?log_file,
        argv = ?argv,
        "gainsmith_cli invoked"
    );
    if argv.len() >= 2 {
        tracing::debug!(
            "cargo_repro_command=cargo run --release -p gainsmith_cli -- {}",
            argv[1..].join(" ")
        );
    }
}

fn run_features(args: FeaturesArgs) -> Result<()> {
    let options = args.into_options()?;
    let prepared = prepare_features(&options)?;
    println!("{}", prepared.features_path.display());
    Ok(())
}

fn run_schema(args: &SchemaArgs) -> Result<()> {
    if args.json {
        println!("{}", SchemaManifest::current().to_json_pretty()?);
    } else {
        for name in feature_schema() {
            println!("{name}");
        }
    }
    Ok(())
}

fn run_validate(args: &ValidateArgs) -> Result<()> {
    let frame = LazyCsvReader::new(&args.csv_path)
        .has_header(true)
        .finish()
        .with_context(|| format!("Failed to initialize CSV reader for {}", args.csv_path.display()))?
        .collect()
        .with_context(|| format!("Failed to read {}", args.csv_path.display()))?;
    let skip = args.skip_rows.min(frame.height());
    let frame = frame.slice(skip as i64, frame.height() - skip);

    let report = validate_frame(&frame)?;
    for warning in report.warnings() {
        tracing::warn!(
            column = %warning.column,
            kind = ?warning.kind,
            count = warning.count,
            "Non-finite feature values"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    if args.strict && !report.valid {
        return Err(anyhow!(
            "{} does not match the feature schema ({} missing, {} with NaN, {} with inf)",
            args.csv_path.display(),
            report.missing_columns.len(),
            report.nan_columns.len(),
            report.inf_columns.len()
        ));
    }
    Ok(())
}

fn run_signals(args: &SignalsArgs) -> Result<()> {
    let series = args.input.to_input()?.load()?;
    let summary = signal_summary(&series).ok_or_else(|| anyhow!("No bars to summarize"))?;
    tracing::info!(
        as_of = %summary.as_of,
        score = summary.score.score,
        "Indicator signals computed"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file: Option<PathBuf> = match &cli.command {
        Commands::Features(args) if !args.no_file_log => Some(args.output_dir.join(LOG_FILE)),
        _ => None,
    };
    let _guard = init_tracing(log_file.as_deref())?;
    log_invocation(log_file.as_deref());

    match cli.command {
        Commands::Features(args) => run_features(args),
        Commands::Schema(args) => run_schema(&args),
        Commands::Validate(args) => run_validate(&args),
        Commands::Signals(args) => run_signals(&args),
    }
}
