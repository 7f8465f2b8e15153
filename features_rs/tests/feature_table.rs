use chrono::{Datelike, Duration, NaiveDate};
use features_rs::schema::lag_name;
use features_rs::{
    FeatureTable, SchemaManifest, align_frame, compute_features, compute_features_batch,
    compute_features_with_config, feature_schema, target_columns, validate, validate_frame,
};
use gainsmith_rs::{EngineConfig, FeatureError, PriceSeries};
use polars::prelude::*;

/// Raw OHLCV columns behind the synthetic series.
struct Bars {
    timestamps: Vec<NaiveDate>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
}

impl Bars {
    fn into_series(self) -> PriceSeries {
        PriceSeries::new(
            self.timestamps,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
        .expect("synthetic series")
    }
}

/// Deterministic daily bars: a drifting double sine with weekday-only dates.
fn synthetic_bars(len: usize) -> Bars {
    let mut date = NaiveDate::from_ymd_opt(2022, 1, 3).expect("date");
    let mut timestamps = Vec::with_capacity(len);
    while timestamps.len() < len {
        if date.weekday().num_days_from_monday() < 5 {
            timestamps.push(date);
        }
        date += Duration::days(1);
    }
    let close: Vec<f64> = (0..len)
        .map(|i| {
            let t = i as f64;
            100.0 + 10.0 * (t / 9.0).sin() + 0.05 * t + 2.0 * (t * 1.7).sin()
        })
        .collect();
    let open: Vec<f64> = close
        .iter()
        .enumerate()
        .map(|(i, c)| c - 0.8 * ((i as f64) * 0.9).sin())
        .collect();
    let high = open
        .iter()
        .zip(&close)
        .enumerate()
        .map(|(i, (o, c))| o.max(*c) + 0.4 + 0.3 * ((i as f64) * 0.37).sin().abs())
        .collect();
    let low = open
        .iter()
        .zip(&close)
        .enumerate()
        .map(|(i, (o, c))| o.min(*c) - 0.4 - 0.3 * ((i as f64) * 0.53).cos().abs())
        .collect();
    let volume = (0..len)
        .map(|i| 1_000_000.0 * (1.0 + 0.5 * ((i as f64) / 5.0).sin()) + 100_000.0 * (i % 7) as f64)
        .collect();
    Bars {
        timestamps,
        open,
        high,
        low,
        close,
        volume,
    }
}

fn synthetic_series(len: usize) -> PriceSeries {
    synthetic_bars(len).into_series()
}

/// Synthetic bars with gaps in the data: missing closes, untraded days and
/// bars without any range.
fn irregular_series(len: usize) -> PriceSeries {
    let mut bars = synthetic_bars(len);
    for i in (40..len).step_by(37) {
        bars.close[i] = f64::NAN;
    }
    for i in (25..len).step_by(19) {
        bars.volume[i] = 0.0;
    }
    for i in (61..len).step_by(23) {
        let price = bars.close[i];
        bars.open[i] = price;
        bars.high[i] = price;
        bars.low[i] = price;
    }
    bars.into_series()
}

fn same_value(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

fn assert_tables_identical(left: &FeatureTable, right: &FeatureTable) {
    assert_eq!(left.names(), right.names());
    assert_eq!(left.timestamps(), right.timestamps());
    for (name, values) in left.columns() {
        let other = right.column(name).expect("column present");
        for (idx, (a, b)) in values.iter().zip(other).enumerate() {
            assert!(same_value(*a, *b), "{name}[{idx}]: {a} != {b}");
        }
    }
}

fn assert_prefix_stable(series: &PriceSeries) -> anyhow::Result<()> {
    let full = compute_features(series, false)?;
    for cut in 252..series.len() {
        let truncated = compute_features(&series.head(cut), false)?;
        assert_eq!(truncated.len(), cut);
        for name in feature_schema() {
            let a = full.column(name).expect("full column");
            let b = truncated.column(name).expect("truncated column");
            for t in 0..cut {
                assert!(
                    same_value(a[t], b[t]),
                    "{name} changed at row {t} with {cut} bars: {} vs {}",
                    a[t],
                    b[t]
                );
            }
        }
    }
    Ok(())
}

fn assert_no_infinities(table: &FeatureTable) {
    for (name, values) in table.columns() {
        if let Some(idx) = values.iter().position(|v| v.is_infinite()) {
            panic!("{name}[{idx}] is {}", values[idx]);
        }
    }
}

#[test]
fn features_only_read_past_bars() -> anyhow::Result<()> {
    let full_series = synthetic_series(320);
    assert_prefix_stable(&full_series)?;

    // Targets are the one place future bars are read.
    let cut = 280;
    let full = compute_features(&full_series, true)?;
    let truncated = compute_features(&full_series.head(cut), true)?;
    let target_full = full.column("target_return_1d").expect("target");
    let target_cut = truncated.column("target_return_1d").expect("target");
    assert!(target_full[cut - 1].is_finite());
    assert!(target_cut[cut - 1].is_nan());
    assert_no_infinities(&full);
    Ok(())
}

#[test]
fn gaps_and_flat_bars_stay_causal_and_finite() -> anyhow::Result<()> {
    let series = irregular_series(320);
    assert!(series.close()[77].is_nan());
    assert_eq!(series.volume()[44], 0.0);
    assert_eq!(series.high()[84], series.low()[84]);

    assert_prefix_stable(&series)?;

    let table = compute_features(&series, true)?;
    assert_no_infinities(&table);
    // An untraded bar has no defined volume change.
    let change = table.column("volume_change").expect("volume_change");
    assert!(change[45].is_nan());
    Ok(())
}

#[test]
fn output_columns_follow_the_schema() -> anyhow::Result<()> {
    assert_eq!(feature_schema(), feature_schema());
    let series = synthetic_series(300);

    let inference = compute_features(&series, false)?;
    assert_eq!(inference.names(), feature_schema());
    assert!(!inference.has_targets());
    assert_eq!(inference.len(), series.len());
    assert_eq!(inference.timestamps(), series.timestamps());

    let training = compute_features(&series, true)?;
    let expected: Vec<String> = feature_schema()
        .iter()
        .chain(target_columns())
        .cloned()
        .collect();
    assert_eq!(training.names(), expected.as_slice());
    assert!(training.has_targets());

    let manifest = SchemaManifest::current();
    assert_eq!(manifest.feature_names, inference.names());
    Ok(())
}

#[test]
fn warm_up_rows_are_undefined_and_kept() -> anyhow::Result<()> {
    let series = synthetic_series(300);
    let table = compute_features(&series, false)?;
    let sma200 = table.column("sma_200").expect("sma_200");
    assert!(sma200[198].is_nan());
    assert!(sma200[199].is_finite());
    let lagged = table.column(&lag_name("close", 10)).expect("lag");
    assert!(lagged[9].is_nan());
    assert_eq!(lagged[10], series.close()[0]);

    let report = validate(&table);
    assert!(!report.valid);
    assert!(report.nan_columns.iter().any(|c| c == "sma_200"));
    assert!(report.missing_columns.is_empty());
    assert!(report.inf_columns.is_empty());

    let dense = table.drop_undefined_rows();
    assert!(!dense.is_empty());
    assert!(dense.len() <= table.len() - 251);
    let report = validate(&dense);
    assert!(report.valid, "{report:?}");
    assert!(report.warnings().is_empty());
    Ok(())
}

#[test]
fn short_history_is_rejected() {
    let err = compute_features(&synthetic_series(251), false).expect_err("too short");
    assert!(matches!(
        err,
        FeatureError::InsufficientData {
            rows: 251,
            required: 252
        }
    ));
    assert!(err.is_recoverable());

    // A lower minimum cannot undercut the longest lookback.
    let relaxed = EngineConfig {
        min_history: 100,
        ..EngineConfig::default()
    };
    let err = compute_features_with_config(&synthetic_series(120), false, &relaxed)
        .expect_err("below the longest lookback");
    assert!(matches!(
        err,
        FeatureError::InsufficientData {
            rows: 120,
            required: 252
        }
    ));

    let strict = EngineConfig {
        min_history: 300,
        ..EngineConfig::default()
    };
    let err = compute_features_with_config(&synthetic_series(280), false, &strict)
        .expect_err("above the configured minimum");
    assert!(matches!(
        err,
        FeatureError::InsufficientData {
            rows: 280,
            required: 300
        }
    ));
}

#[test]
fn sequential_and_parallel_runs_agree() -> anyhow::Result<()> {
    let series = synthetic_series(300);
    let parallel = compute_features_with_config(&series, true, &EngineConfig::default())?;
    let sequential = compute_features_with_config(
        &series,
        true,
        &EngineConfig {
            parallel: false,
            ..EngineConfig::default()
        },
    )?;
    assert_tables_identical(&parallel, &sequential);
    Ok(())
}

#[test]
fn batch_skips_short_instruments() {
    let instruments = vec![
        ("LONG".to_string(), synthetic_series(260)),
        ("SHORT".to_string(), synthetic_series(40)),
    ];
    let results = compute_features_batch(&instruments, false, &EngineConfig::default());
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "LONG");
    assert!(results[0].1.is_ok());
    assert_eq!(results[1].0, "SHORT");
    assert!(matches!(
        results[1].1,
        Err(FeatureError::InsufficientData { rows: 40, .. })
    ));
}

#[test]
fn composite_scores_match_their_inputs() -> anyhow::Result<()> {
    let table = compute_features(&synthetic_series(300), false)?;
    let trend = table.column("trend_strength").expect("trend");
    let vs20 = table.column("price_vs_sma20").expect("vs20");
    let vs50 = table.column("price_vs_sma50").expect("vs50");
    let vs200 = table.column("price_vs_sma200").expect("vs200");
    let sign = |v: f64| {
        if v > 0.0 {
            1.0
        } else if v < 0.0 {
            -1.0
        } else {
            0.0
        }
    };
    for t in 0..table.len() {
        assert_eq!(trend[t], sign(vs20[t]) + sign(vs50[t]) + sign(vs200[t]), "row {t}");
        assert!((-3.0..=3.0).contains(&trend[t]));
    }
    let breakout = table.column("breakout_score").expect("breakout");
    let reversal = table.column("reversal_signal").expect("reversal");
    assert!(breakout.iter().all(|v| (0.0..=5.0).contains(v)));
    assert!(reversal.iter().all(|v| (0.0..=5.0).contains(v)));
    Ok(())
}

#[test]
fn foreign_frames_are_validated_and_aligned() -> anyhow::Result<()> {
    let table = compute_features(&synthetic_series(300), false)?.slice_from(260);
    let frame = table.to_frame()?;
    let report = validate_frame(&frame)?;
    assert!(report.valid, "{report:?}");

    let mut foreign = frame.drop("rsi_14")?;
    foreign.with_column(Series::new("junk", vec![1.0; foreign.height()]))?;
    let report = validate_frame(&foreign)?;
    assert!(!report.valid);
    assert_eq!(report.missing_columns, vec!["rsi_14".to_string()]);
    assert_eq!(report.unexpected_columns, vec!["junk".to_string()]);

    let aligned = align_frame(&foreign)?;
    let names = aligned.get_column_names();
    assert_eq!(names[0], "date");
    assert_eq!(names.len(), feature_schema().len() + 1);
    assert!(names[1..].iter().zip(feature_schema()).all(|(a, b)| *a == b.as_str()));
    let report = validate_frame(&aligned)?;
    assert_eq!(report.nan_columns, vec!["rsi_14".to_string()]);
    assert!(report.unexpected_columns.is_empty());
    Ok(())
}
