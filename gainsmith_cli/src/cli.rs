use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use features_rs::{PrepareOptions, PriceInput};
use gainsmith_rs::config::DEFAULT_MIN_HISTORY;
use gainsmith_rs::{EngineConfig, Period};

#[derive(Parser, Debug)]
#[command(
    name = "gainsmith",
    about = "Feature engine for next-day gainer models"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the feature table for one instrument and write it as CSV
    #[command(name = "features")]
    Features(FeaturesArgs),
    /// Print the ordered feature schema
    #[command(name = "schema")]
    Schema(SchemaArgs),
    /// Check a feature CSV against the schema
    #[command(name = "validate")]
    Validate(ValidateArgs),
    /// Print indicator votes, their score and pivot levels for the newest bar
    #[command(name = "signals")]
    Signals(SignalsArgs),
}

#[derive(Args, Debug)]
pub struct PriceInputArgs {
    /// Path to a CSV file with date and OHLCV columns
    #[arg(
        long = "csv",
        value_name = "FILE",
        value_hint = clap::ValueHint::FilePath,
        conflicts_with = "data_dir"
    )]
    pub csv_path: Option<PathBuf>,

    /// Directory holding one `<SYMBOL>.csv` per instrument
    #[arg(long = "data-dir", value_hint = clap::ValueHint::DirPath, requires = "symbol")]
    pub data_dir: Option<PathBuf>,

    /// Instrument to load from --data-dir
    #[arg(long)]
    pub symbol: Option<String>,

    /// How much history to load from --data-dir (1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, max)
    #[arg(long, default_value = "5y")]
    pub period: Period,
}

#[derive(Args, Debug)]
pub struct FeaturesArgs {
    #[command(flatten)]
    pub input: PriceInputArgs,

    /// Output directory for the feature CSV, schema manifest and log
    #[arg(long = "output-dir", value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// Append target columns for training
    #[arg(long = "target", default_value_t = false)]
    pub target: bool,

    /// Forward return that labels a row as a gainer (fraction, e.g. 0.05)
    #[arg(long = "gain-threshold")]
    pub gain_threshold: Option<f64>,

    /// Bars ahead used for the primary target column
    #[arg(long = "horizon")]
    pub horizon: Option<usize>,

    /// Minimum bars of history required before computing features (at least 252)
    #[arg(long = "min-history")]
    pub min_history: Option<usize>,

    /// JSON engine config; flags above override its fields
    #[arg(long = "config", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Drop warm-up rows that still hold undefined features
    #[arg(long = "drop-undefined", default_value_t = false)]
    pub drop_undefined: bool,

    /// Acknowledge that a newly computed table differs from an existing
    /// gainsmith_features.csv in the output directory; overwrite it.
    #[arg(long = "ack-new-df", default_value_t = false)]
    pub ack_new_df: bool,

    /// Disable writing gainsmith.log into the output directory
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,

    /// Compute feature groups on the calling thread only
    #[arg(long = "sequential", default_value_t = false)]
    pub sequential: bool,
}

#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Emit the versioned manifest as JSON instead of one name per line
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Feature CSV to check
    #[arg(long = "csv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub csv_path: PathBuf,

    /// Ignore this many leading rows (warm-up period)
    #[arg(long = "skip-rows", default_value_t = 0)]
    pub skip_rows: usize,

    /// Exit with an error when the report is not valid
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct SignalsArgs {
    #[command(flatten)]
    pub input: PriceInputArgs,
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}

impl PriceInputArgs {
    pub fn to_input(&self) -> Result<PriceInput> {
        match (&self.csv_path, &self.data_dir, &self.symbol) {
            (Some(path), _, _) => Ok(PriceInput::Csv(path.clone())),
            (None, Some(data_dir), Some(symbol)) => Ok(PriceInput::Directory {
                data_dir: data_dir.clone(),
                symbol: symbol.to_ascii_uppercase(),
                period: self.period,
            }),
            _ => Err(anyhow!(
                "Provide either --csv FILE or --data-dir DIR with --symbol SYMBOL"
            )),
        }
    }
}

impl FeaturesArgs {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(threshold) = self.gain_threshold {
            if !threshold.is_finite() {
                return Err(anyhow!("--gain-threshold must be a finite number"));
            }
            config.target.gain_threshold = threshold;
        }
        if let Some(horizon) = self.horizon {
            if horizon == 0 {
                return Err(anyhow!("--horizon must be at least 1"));
            }
            config.target.horizon = horizon;
        }
        if let Some(min_history) = self.min_history {
            if min_history < DEFAULT_MIN_HISTORY {
                return Err(anyhow!(
                    "--min-history must be at least {DEFAULT_MIN_HISTORY} (the 52-week lookback)"
                ));
            }
            config.min_history = min_history;
        }
        if self.sequential {
            config.parallel = false;
        }
        Ok(config)
    }

    pub fn into_options(self) -> Result<PrepareOptions> {
        let input = self.input.to_input()?;
        let config = self.engine_config()?;
        let mut options = PrepareOptions::new(input, self.output_dir);
        options.config = config;
        options.include_target = self.target;
        options.drop_undefined = self.drop_undefined;
        options.ack_new_df = self.ack_new_df;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn base_args() -> FeaturesArgs {
        FeaturesArgs {
            input: PriceInputArgs {
                csv_path: Some(PathBuf::from("prices.csv")),
                data_dir: None,
                symbol: None,
                period: Period::FiveYears,
            },
            output_dir: PathBuf::from("out"),
            target: false,
            gain_threshold: None,
            horizon: None,
            min_history: None,
            config: None,
            drop_undefined: false,
            ack_new_df: false,
            no_file_log: false,
            sequential: false,
        }
    }

    #[test]
    fn defaults_map_to_default_engine_config() {
        let options = base_args().into_options().expect("options");
        assert_eq!(options.config, EngineConfig::default());
        assert!(!options.include_target);
        assert!(matches!(options.input, PriceInput::Csv(ref p) if p == &PathBuf::from("prices.csv")));
    }

    #[test]
    fn flags_override_config_file_fields() {
        let dir = tempdir().expect("tempdir");
        let config_path = dir.path().join("engine.json");
        fs::write(
            &config_path,
            r#"{"min_history": 300, "target": {"gain_threshold": 0.02, "horizon": 3}}"#,
        )
        .expect("write config");

        let mut args = base_args();
        args.config = Some(config_path);
        args.gain_threshold = Some(0.08);
        args.sequential = true;
        let options = args.into_options().expect("options");
        assert_eq!(options.config.min_history, 300);
        assert_eq!(options.config.target.horizon, 3);
        assert!((options.config.target.gain_threshold - 0.08).abs() < 1e-12);
        assert!(!options.config.parallel);
    }

    #[test]
    fn data_dir_requires_symbol() {
        let mut args = base_args();
        args.input.csv_path = None;
        args.input.data_dir = Some(PathBuf::from("prices"));
        assert!(args.into_options().is_err());

        let mut args = base_args();
        args.input.csv_path = None;
        args.input.data_dir = Some(PathBuf::from("prices"));
        args.input.symbol = Some("aapl".to_string());
        let options = args.into_options().expect("options");
        match options.input {
            PriceInput::Directory { symbol, period, .. } => {
                assert_eq!(symbol, "AAPL");
                assert_eq!(period, Period::FiveYears);
            }
            other => panic!("unexpected input {other:?}"),
        }
    }

    #[test]
    fn zero_horizon_is_rejected() {
        let mut args = base_args();
        args.horizon = Some(0);
        let err = args.into_options().expect_err("zero horizon");
        assert!(err.to_string().contains("--horizon"));
    }

    #[test]
    fn min_history_below_the_yearly_lookback_is_rejected() {
        let mut args = base_args();
        args.min_history = Some(100);
        let err = args.into_options().expect_err("short min history");
        assert!(err.to_string().contains("--min-history"));

        let mut args = base_args();
        args.min_history = Some(400);
        let options = args.into_options().expect("options");
        assert_eq!(options.config.min_history, 400);
    }

    #[test]
    fn subcommands_parse() {
        let cli = <Cli as Parser>::try_parse_from([
            "gainsmith",
            "validate",
            "--csv",
            "features.csv",
            "--skip-rows",
            "252",
            "--strict",
        ])
        .expect("parse");
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.skip_rows, 252);
                assert!(args.strict);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let err = <Cli as Parser>::try_parse_from([
            "gainsmith",
            "features",
            "--csv",
            "a.csv",
            "--data-dir",
            "prices",
            "--symbol",
            "AAPL",
            "--output-dir",
            "out",
        ]);
        assert!(err.is_err());

        let cli = <Cli as Parser>::try_parse_from([
            "gainsmith",
            "signals",
            "--data-dir",
            "prices",
            "--symbol",
            "msft",
            "--period",
            "1y",
        ])
        .expect("parse");
        match cli.command {
            Commands::Signals(args) => match args.input.to_input().expect("input") {
                PriceInput::Directory { symbol, period, .. } => {
                    assert_eq!(symbol, "MSFT");
                    assert_eq!(period, Period::OneYear);
                }
                other => panic!("unexpected input {other:?}"),
            },
            other => panic!("unexpected command {other:?}"),
        }
    }
}
