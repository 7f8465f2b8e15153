//! End-to-end preparation: price CSV in, feature CSV and schema manifest out.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use gainsmith_rs::storage::{WriteOutcome, write_csv_guarded};
use gainsmith_rs::{CsvDirectorySource, EngineConfig, Interval, Period, PriceSeries, PriceSource};
use tracing::info;

use crate::composer::compute_features_with_config;
use crate::schema::{SchemaManifest, ensure_complete};

pub const FEATURES_FILE: &str = "gainsmith_features.csv";
pub const SCHEMA_FILE: &str = "schema.json";
pub const CONFIG_FILE: &str = "engine_config.json";

/// Where the price history comes from.
#[derive(Debug, Clone)]
pub enum PriceInput {
    Csv(PathBuf),
    Directory {
        data_dir: PathBuf,
        symbol: String,
        period: Period,
    },
}

impl PriceInput {
    pub fn load(&self) -> Result<PriceSeries> {
        match self {
            Self::Csv(path) => PriceSeries::from_csv(path),
            Self::Directory {
                data_dir,
                symbol,
                period,
            } => CsvDirectorySource::new(data_dir)
                .fetch(symbol, *period, Interval::Daily)
                .with_context(|| format!("Unable to load {symbol} from {}", data_dir.display())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub input: PriceInput,
    pub output_dir: PathBuf,
    pub config: EngineConfig,
    pub include_target: bool,
    /// Drop warm-up rows (and target tail rows) before writing.
    pub drop_undefined: bool,
    /// Allow replacing an existing feature CSV whose contents differ.
    pub ack_new_df: bool,
}

impl PrepareOptions {
    pub fn new(input: PriceInput, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input,
            output_dir: output_dir.into(),
            config: EngineConfig::default(),
            include_target: false,
            drop_undefined: false,
            ack_new_df: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    pub features_path: PathBuf,
    pub schema_path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub outcome: WriteOutcome,
    pub config_hash: String,
}

pub fn prepare_features(options: &PrepareOptions) -> Result<PreparedFeatures> {
    fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("Unable to create {}", options.output_dir.display()))?;

    let series = options.input.load()?;
    info!(
        rows = series.len(),
        first = ?series.first_timestamp(),
        last = ?series.last_timestamp(),
        "Loaded price series"
    );

    let mut table = compute_features_with_config(&series, options.include_target, &options.config)
        .context("Feature computation failed")?;
    if options.drop_undefined {
        let before = table.len();
        table = table.drop_undefined_rows();
        info!(
            dropped = before - table.len(),
            kept = table.len(),
            "Dropped rows with undefined features"
        );
        if table.is_empty() {
            return Err(anyhow!(
                "Every row has at least one undefined feature; nothing left to write"
            ));
        }
    }

    ensure_complete(table.names().iter().map(String::as_str))
        .context("Feature table does not cover the schema")?;

    let features_path = options.output_dir.join(FEATURES_FILE);
    let mut frame = table.to_frame()?;
    let outcome = write_csv_guarded(&mut frame, &features_path, options.ack_new_df)?;

    let manifest = if table.has_targets() {
        SchemaManifest::current().with_targets()
    } else {
        SchemaManifest::current()
    };
    let schema_path = options.output_dir.join(SCHEMA_FILE);
    write_json(&schema_path, &manifest.to_json_pretty()?)?;

    let config_hash = options.config.stable_hash()?;
    let config_record = serde_json::json!({
        "hash": config_hash,
        "config": options.config,
    });
    write_json(
        &options.output_dir.join(CONFIG_FILE),
        &serde_json::to_string_pretty(&config_record)?,
    )?;

    info!(
        rows = table.len(),
        columns = table.width(),
        schema_fingerprint = %manifest.fingerprint,
        config_hash = %config_hash,
        outcome = ?outcome,
        "Feature preparation finished"
    );
    Ok(PreparedFeatures {
        features_path,
        schema_path,
        rows: table.len(),
        columns: table.width(),
        outcome,
        config_hash,
    })
}

fn write_json(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Unable to write {}", path.display()))
}
