use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use features_rs::prepare::{CONFIG_FILE, FEATURES_FILE, SCHEMA_FILE};
use features_rs::{
    PrepareOptions, PriceInput, SchemaManifest, feature_schema, prepare_features, target_columns,
};
use gainsmith_rs::storage::WriteOutcome;
use gainsmith_rs::{EngineConfig, Period};
use tempfile::tempdir;

fn write_sample_csv(path: &Path, rows: usize) -> anyhow::Result<()> {
    let start = chrono::NaiveDate::from_ymd_opt(2021, 6, 1).expect("date");
    let mut csv = String::from("Date,Open,High,Low,Close,Volume\n");
    for i in 0..rows {
        let t = i as f64;
        let close = 50.0 + 4.0 * (t / 11.0).sin() + 0.02 * t;
        let open = close - 0.3 * (t * 0.7).cos();
        let high = open.max(close) + 0.25;
        let low = open.min(close) - 0.25;
        let volume = 20_000 + (i * 37) % 5_000;
        let date = start + chrono::Duration::days(i as i64);
        writeln!(csv, "{date},{open:.4},{high:.4},{low:.4},{close:.4},{volume}")?;
    }
    fs::write(path, csv)?;
    Ok(())
}

#[test]
fn prepare_reuses_identical_output_and_guards_changes() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let csv_path = dir.path().join("prices.csv");
    write_sample_csv(&csv_path, 300)?;
    let output_dir = dir.path().join("out");

    let mut options = PrepareOptions::new(PriceInput::Csv(csv_path.clone()), &output_dir);
    let first = prepare_features(&options)?;
    assert_eq!(first.outcome, WriteOutcome::Created);
    assert_eq!(first.rows, 300);
    assert_eq!(first.columns, feature_schema().len());
    assert_eq!(first.features_path, output_dir.join(FEATURES_FILE));

    let manifest = SchemaManifest::from_json(&fs::read_to_string(output_dir.join(SCHEMA_FILE))?)?;
    assert_eq!(manifest, SchemaManifest::current());
    let config_record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output_dir.join(CONFIG_FILE))?)?;
    assert_eq!(config_record["hash"], first.config_hash.as_str());

    let header = fs::read_to_string(&first.features_path)?
        .lines()
        .next()
        .map(str::to_string)
        .unwrap_or_default();
    assert!(header.starts_with("date,return_1d,return_2d"));

    let second = prepare_features(&options)?;
    assert_eq!(second.outcome, WriteOutcome::Reused);

    options.include_target = true;
    let err = prepare_features(&options).expect_err("changed table without ack");
    let message = format!("{err:#}");
    assert!(message.contains("--ack-new-df"), "{message}");

    options.ack_new_df = true;
    let third = prepare_features(&options)?;
    assert_eq!(third.outcome, WriteOutcome::Overwritten);
    assert_eq!(third.columns, feature_schema().len() + 5);

    let manifest = SchemaManifest::from_json(&fs::read_to_string(output_dir.join(SCHEMA_FILE))?)?;
    assert_eq!(manifest.target_names, target_columns());
    assert_eq!(manifest.feature_names, feature_schema());
    assert!(manifest.check_compatible().is_ok());
    Ok(())
}

#[test]
fn prepare_can_drop_warm_up_rows() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let data_dir = dir.path().join("prices");
    fs::create_dir_all(&data_dir)?;
    write_sample_csv(&data_dir.join("ACME.csv"), 320)?;

    let mut options = PrepareOptions::new(
        PriceInput::Directory {
            data_dir,
            symbol: "ACME".to_string(),
            period: Period::Max,
        },
        dir.path().join("out"),
    );
    options.drop_undefined = true;
    let prepared = prepare_features(&options)?;
    assert!(prepared.rows > 0);
    assert!(prepared.rows <= 320 - 251);
    Ok(())
}

#[test]
fn prepare_reports_short_history() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let csv_path = dir.path().join("short.csv");
    write_sample_csv(&csv_path, 100)?;
    let mut options = PrepareOptions::new(PriceInput::Csv(csv_path), dir.path().join("out"));
    options.config = EngineConfig::default();
    let err = prepare_features(&options).expect_err("short history");
    assert!(format!("{err:#}").contains("insufficient data"));
    Ok(())
}
