//! Canonical feature schema.
//!
//! The schema is the ordered list of feature columns the composer emits. It
//! is the contract between training and inference: a model records the
//! [`SchemaManifest`] it was trained with, and a feature frame produced
//! elsewhere can be checked with [`validate_frame`] or reshaped with
//! [`align_frame`].

use std::collections::HashSet;

use gainsmith_rs::{FeatureCategory, FeatureDescriptor, FeatureError, FeatureResult};
use once_cell::sync::Lazy;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::patterns::{BEARISH_SCORE, BULLISH_SCORE, PATTERN_SCORE, pattern_names};
use crate::table::FeatureTable;

/// Bumped whenever a column is added, removed, renamed or moved.
pub const SCHEMA_VERSION: u32 = 1;

pub const DATE_COLUMN: &str = "date";

pub const PRICE_FEATURES: &[&str] = &[
    "return_1d",
    "return_2d",
    "return_5d",
    "return_10d",
    "return_20d",
    "log_return",
    "log_return_5d",
    "high_low_ratio",
    "close_open_ratio",
    "high_close_ratio",
    "low_close_ratio",
    "body",
    "body_pct",
    "upper_shadow",
    "lower_shadow",
    "shadow_ratio",
    "range",
    "range_pct",
    "gap",
    "gap_pct",
    "dist_from_high",
    "dist_from_low",
    "price_position",
    "intraday_range",
    "price_vs_sma20",
    "price_vs_sma50",
    "price_vs_sma200",
    "distance_52w_high",
    "distance_52w_low",
    "price_position_52w",
];

pub const MOMENTUM_FEATURES: &[&str] = &["momentum_score", "acceleration"];

pub const VOLUME_FEATURES: &[&str] = &[
    "volume_change",
    "volume_change_5d",
    "volume_ma_5",
    "volume_ma_10",
    "volume_ma_20",
    "volume_ratio_5",
    "volume_ratio_10",
    "volume_ratio_20",
    "volume_trend",
    "pv_trend",
    "pv_trend_ma",
    "volume_zscore",
    "up_volume",
    "down_volume",
    "up_down_volume_ratio",
    "obv_change",
    "volume_slope_20",
    "vwap_distance",
    "volume_spike",
];

pub const INDICATOR_FEATURES: &[&str] = &[
    // Moving averages
    "sma_5",
    "sma_10",
    "sma_20",
    "sma_50",
    "sma_200",
    "ema_9",
    "ema_12",
    "ema_21",
    "ema_26",
    "wma_20",
    "dema_20",
    "tema_20",
    "hull_20",
    "vwma_20",
    "sma_5_20_cross",
    "sma_20_50_cross",
    "sma_50_200_cross",
    "ema_9_21_cross",
    // MACD
    "macd",
    "macd_signal",
    "macd_histogram",
    "macd_cross",
    // RSI
    "rsi_7",
    "rsi_14",
    "rsi_21",
    "rsi_oversold",
    "rsi_overbought",
    "rsi_bullish_div",
    "rsi_bearish_div",
    // Stochastic
    "stoch_k",
    "stoch_d",
    "stoch_cross",
    "stoch_oversold",
    "stoch_overbought",
    "stoch_rsi_k",
    "stoch_rsi_d",
    // Directional movement
    "adx",
    "adx_plus_di",
    "adx_minus_di",
    "adx_strong_trend",
    "adx_bullish",
    "adx_ewm",
    // Volatility
    "bb_upper",
    "bb_middle",
    "bb_lower",
    "bb_bandwidth",
    "bb_percent_b",
    "bb_squeeze",
    "atr",
    "atr_percent",
    "atr_ma_ratio",
    "atr_ewm_percent",
    "kc_upper",
    "kc_middle",
    "kc_lower",
    "dc_upper",
    "dc_middle",
    "dc_lower",
    "chandelier_long",
    "chandelier_short",
    "hist_volatility",
    // Oscillators
    "williams_r",
    "cci",
    "cci_oversold",
    "cci_overbought",
    "roc",
    "momentum",
    "tsi",
    "ao",
    "uo",
    // Volume flow
    "mfi",
    "mfi_oversold",
    "mfi_overbought",
    "obv",
    "obv_ma",
    "obv_trend",
    "ad_line",
    "cmf",
    "cmf_bullish",
    "force_index",
    "eom",
    "volume_osc",
    "vwap",
    // Trend
    "aroon_up",
    "aroon_down",
    "aroon_osc",
    "aroon_bullish",
    "choppiness",
    "choppy_market",
    "bull_power",
    "bear_power",
    "psar",
    "close_above_psar",
    "supertrend",
    "supertrend_direction",
    // Levels
    "ichimoku_tenkan",
    "ichimoku_kijun",
    "ichimoku_senkou_a",
    "ichimoku_senkou_b",
    "ichimoku_cloud_bullish",
    "price_above_cloud",
    "fib_382",
    "fib_500",
    "fib_618",
    "pivot",
    "pivot_r1",
    "pivot_s1",
    "pivot_r2",
    "pivot_s2",
];

pub const DATE_FEATURES: &[&str] = &[
    "day_of_week",
    "day_of_month",
    "week_of_year",
    "month",
    "quarter",
    "day_sin",
    "day_cos",
    "month_sin",
    "month_cos",
    "quarter_sin",
    "quarter_cos",
    "is_month_start",
    "is_month_end",
    "is_quarter_start",
    "is_quarter_end",
];

pub const COMPOSITE_FEATURES: &[&str] = &["trend_strength", "reversal_signal", "breakout_score"];

pub const TARGET_FEATURES: &[&str] = &[
    "target",
    "target_up_1d",
    "target_up_3d",
    "target_up_5d",
    "target_return_1d",
];

/// Columns holding 0/1 values (NaN where an input is undefined).
pub const FLAG_FEATURES: &[&str] = &[
    "volume_spike",
    "sma_5_20_cross",
    "sma_20_50_cross",
    "sma_50_200_cross",
    "ema_9_21_cross",
    "macd_cross",
    "rsi_oversold",
    "rsi_overbought",
    "rsi_bullish_div",
    "rsi_bearish_div",
    "stoch_cross",
    "stoch_oversold",
    "stoch_overbought",
    "adx_strong_trend",
    "adx_bullish",
    "bb_squeeze",
    "cci_oversold",
    "cci_overbought",
    "mfi_oversold",
    "mfi_overbought",
    "obv_trend",
    "cmf_bullish",
    "aroon_bullish",
    "choppy_market",
    "close_above_psar",
    "ichimoku_cloud_bullish",
    "price_above_cloud",
    "is_month_start",
    "is_month_end",
    "is_quarter_start",
    "is_quarter_end",
    "target",
    "target_up_1d",
    "target_up_3d",
    "target_up_5d",
];

pub const LAG_SOURCES: &[&str] = &["close", "volume", "return_1d", "rsi_14"];
pub const LAGS: &[usize] = &[1, 2, 3, 5, 10];
pub const PATTERN_SCORE_LAGS: &[usize] = &[1, 2, 3];
pub const ROLLING_WINDOWS: &[usize] = &[5, 10, 20];

pub fn lag_name(source: &str, lag: usize) -> String {
    format!("{source}_lag_{lag}")
}

pub fn pattern_column(pattern: &str) -> String {
    format!("pattern_{pattern}")
}

fn descriptor(name: String, category: FeatureCategory) -> FeatureDescriptor {
    let pattern_flag = category == FeatureCategory::Pattern
        && name.starts_with("pattern_")
        && name != PATTERN_SCORE;
    if pattern_flag || FLAG_FEATURES.contains(&name.as_str()) {
        FeatureDescriptor::flag(name, category)
    } else {
        FeatureDescriptor::continuous(name, category)
    }
}

fn rolling_names() -> Vec<String> {
    let mut names = Vec::new();
    for window in ROLLING_WINDOWS {
        for stem in [
            "return_mean",
            "return_std",
            "return_skew",
            "return_kurt",
            "high_max",
            "low_min",
            "range",
        ] {
            names.push(format!("{stem}_{window}"));
        }
    }
    for window in ROLLING_WINDOWS {
        names.push(format!("cumulative_return_{window}"));
    }
    names.push("up_streak".to_string());
    names.push("down_streak".to_string());
    names
}

fn lag_names() -> Vec<String> {
    let mut names: Vec<String> = LAG_SOURCES
        .iter()
        .flat_map(|source| LAGS.iter().map(move |lag| lag_name(source, *lag)))
        .collect();
    names.extend(
        PATTERN_SCORE_LAGS
            .iter()
            .map(|lag| lag_name(PATTERN_SCORE, *lag)),
    );
    names
}

fn pattern_feature_names() -> Vec<String> {
    let mut names: Vec<String> = pattern_names().map(pattern_column).collect();
    names.extend([BULLISH_SCORE, BEARISH_SCORE, PATTERN_SCORE].map(String::from));
    names
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

static FEATURE_DESCRIPTORS: Lazy<Vec<FeatureDescriptor>> = Lazy::new(|| {
    let groups = [
        (FeatureCategory::Price, owned(PRICE_FEATURES)),
        (FeatureCategory::Momentum, owned(MOMENTUM_FEATURES)),
        (FeatureCategory::Volume, owned(VOLUME_FEATURES)),
        (FeatureCategory::Indicator, owned(INDICATOR_FEATURES)),
        (FeatureCategory::Pattern, pattern_feature_names()),
        (FeatureCategory::Lag, lag_names()),
        (FeatureCategory::Rolling, rolling_names()),
        (FeatureCategory::Date, owned(DATE_FEATURES)),
        (FeatureCategory::Composite, owned(COMPOSITE_FEATURES)),
    ];
    groups
        .into_iter()
        .flat_map(|(category, names)| names.into_iter().map(move |name| descriptor(name, category)))
        .collect()
});

static TARGET_DESCRIPTORS: Lazy<Vec<FeatureDescriptor>> = Lazy::new(|| {
    TARGET_FEATURES
        .iter()
        .map(|name| descriptor(name.to_string(), FeatureCategory::Target))
        .collect()
});

static FEATURE_NAMES: Lazy<Vec<String>> =
    Lazy::new(|| FEATURE_DESCRIPTORS.iter().map(|d| d.name.clone()).collect());

static TARGET_NAMES: Lazy<Vec<String>> = Lazy::new(|| owned(TARGET_FEATURES));

/// Ordered feature descriptors, targets excluded.
pub fn feature_descriptors() -> &'static [FeatureDescriptor] {
    &FEATURE_DESCRIPTORS
}

/// Target descriptors, in column order.
pub fn target_descriptors() -> &'static [FeatureDescriptor] {
    &TARGET_DESCRIPTORS
}

/// Ordered feature names. Identical on every call and equal to the columns
/// of an inference-mode [`FeatureTable`].
pub fn feature_schema() -> &'static [String] {
    &FEATURE_NAMES
}

/// Target columns, in the order they follow the features in training mode.
pub fn target_columns() -> &'static [String] {
    &TARGET_NAMES
}

pub fn is_target_column(name: &str) -> bool {
    TARGET_FEATURES.contains(&name)
}

fn fingerprint(descriptors: &[FeatureDescriptor]) -> String {
    let mut hasher = Sha256::new();
    for d in descriptors {
        hasher.update(d.category.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(d.name.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Validation

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFinite {
    Nan,
    Infinite,
}

/// A derived column that holds NaN or infinite values. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputationWarning {
    pub column: String,
    pub kind: NonFinite,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub rows: usize,
    pub missing_columns: Vec<String>,
    pub nan_columns: Vec<String>,
    pub inf_columns: Vec<String>,
    /// Present in the input but not part of the schema; does not affect
    /// validity.
    pub unexpected_columns: Vec<String>,
    #[serde(skip)]
    warnings: Vec<ComputationWarning>,
}

impl ValidationReport {
    pub fn warnings(&self) -> &[ComputationWarning] {
        &self.warnings
    }

    fn record(&mut self, column: &str, values: impl Iterator<Item = f64>) {
        let (mut nan, mut inf) = (0usize, 0usize);
        for value in values {
            if value.is_nan() {
                nan += 1;
            } else if value.is_infinite() {
                inf += 1;
            }
        }
        if nan > 0 {
            self.nan_columns.push(column.to_string());
            self.warnings.push(ComputationWarning {
                column: column.to_string(),
                kind: NonFinite::Nan,
                count: nan,
            });
        }
        if inf > 0 {
            self.inf_columns.push(column.to_string());
            self.warnings.push(ComputationWarning {
                column: column.to_string(),
                kind: NonFinite::Infinite,
                count: inf,
            });
        }
    }

    fn finish(mut self) -> Self {
        self.valid = self.missing_columns.is_empty()
            && self.nan_columns.is_empty()
            && self.inf_columns.is_empty();
        self
    }
}

/// Check a computed table against the schema.
///
/// Target columns are checked for presence only when the table carries them;
/// their undefined tail rows are expected and are not reported.
pub fn validate(table: &FeatureTable) -> ValidationReport {
    let mut report = ValidationReport {
        rows: table.len(),
        ..Default::default()
    };
    for name in feature_schema() {
        match table.column(name) {
            Some(values) => report.record(name, values.iter().copied()),
            None => report.missing_columns.push(name.clone()),
        }
    }
    let known: HashSet<&str> = feature_schema()
        .iter()
        .chain(target_columns())
        .map(String::as_str)
        .collect();
    report.unexpected_columns = table
        .names()
        .iter()
        .filter(|name| !known.contains(name.as_str()))
        .cloned()
        .collect();
    report.finish()
}

fn float_values(series: &Series) -> FeatureResult<Vec<f64>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

/// Check a feature frame, for example one read back from CSV. Nulls count
/// as NaN. The date column and target columns are ignored.
pub fn validate_frame(frame: &DataFrame) -> FeatureResult<ValidationReport> {
    let mut report = ValidationReport {
        rows: frame.height(),
        ..Default::default()
    };
    for name in feature_schema() {
        match frame.column(name) {
            Ok(series) => report.record(name, float_values(series)?.into_iter()),
            Err(_) => report.missing_columns.push(name.clone()),
        }
    }
    let known: HashSet<&str> = feature_schema()
        .iter()
        .chain(target_columns())
        .map(String::as_str)
        .chain(std::iter::once(DATE_COLUMN))
        .collect();
    report.unexpected_columns = frame
        .get_column_names()
        .into_iter()
        .filter(|name| !known.contains(name))
        .map(str::to_string)
        .collect();
    Ok(report.finish())
}

/// Reorder a foreign feature frame into schema order.
///
/// A leading `date` column and any target columns are kept. Missing feature
/// columns are added as all-NaN; unknown columns are dropped.
pub fn align_frame(frame: &DataFrame) -> FeatureResult<DataFrame> {
    let height = frame.height();
    let mut columns: Vec<Series> = Vec::with_capacity(feature_schema().len() + 1);
    if let Ok(date) = frame.column(DATE_COLUMN) {
        columns.push(date.clone());
    }
    let mut missing = Vec::new();
    for name in feature_schema() {
        match frame.column(name) {
            Ok(series) => columns.push(series.cast(&DataType::Float64)?),
            Err(_) => {
                missing.push(name.as_str());
                columns.push(Series::new(name, vec![f64::NAN; height]));
            }
        }
    }
    for name in target_columns() {
        if let Ok(series) = frame.column(name) {
            columns.push(series.clone());
        }
    }
    if !missing.is_empty() {
        warn!(
            count = missing.len(),
            columns = ?missing,
            "Feature frame is missing schema columns; filled with NaN"
        );
    }
    let known: HashSet<&str> = columns.iter().map(|s| s.name()).collect();
    let dropped: Vec<&str> = frame
        .get_column_names()
        .into_iter()
        .filter(|name| !known.contains(name))
        .collect();
    if !dropped.is_empty() {
        info!(
            count = dropped.len(),
            columns = ?dropped,
            "Dropped columns outside the feature schema"
        );
    }
    Ok(DataFrame::new(columns)?)
}

// ---------------------------------------------------------------------------
// Manifest

/// Serializable description of the feature set a model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaManifest {
    pub version: u32,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
    /// SHA-256 over the ordered `category|name` lines.
    pub fingerprint: String,
    /// Target columns written after the features, empty for inference output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "feature schema drift: {} added, {} removed, {} reordered (expected fingerprint {expected}, found {found})",
    added.len(),
    removed.len(),
    reordered.len()
)]
pub struct SchemaDrift {
    /// In the running engine but not in the manifest.
    pub added: Vec<String>,
    /// In the manifest but no longer produced.
    pub removed: Vec<String>,
    /// Present in both but at a different relative position.
    pub reordered: Vec<String>,
    pub expected: String,
    pub found: String,
}

impl SchemaManifest {
    pub fn current() -> Self {
        Self {
            version: SCHEMA_VERSION,
            feature_count: feature_schema().len(),
            feature_names: feature_schema().to_vec(),
            fingerprint: fingerprint(feature_descriptors()),
            target_names: Vec::new(),
        }
    }

    /// Manifest for a training table: the features plus the target columns.
    pub fn with_targets(mut self) -> Self {
        self.target_names = target_descriptors().iter().map(|d| d.name.clone()).collect();
        self
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Compare this (stored) manifest with the running engine.
    pub fn check_compatible(&self) -> Result<(), SchemaDrift> {
        let current = Self::current();
        if current.fingerprint == self.fingerprint && current.feature_names == self.feature_names {
            return Ok(());
        }
        let stored: HashSet<&str> = self.feature_names.iter().map(String::as_str).collect();
        let live: HashSet<&str> = current.feature_names.iter().map(String::as_str).collect();
        let added = current
            .feature_names
            .iter()
            .filter(|name| !stored.contains(name.as_str()))
            .cloned()
            .collect();
        let removed = self
            .feature_names
            .iter()
            .filter(|name| !live.contains(name.as_str()))
            .cloned()
            .collect();
        let common_stored: Vec<&String> = self
            .feature_names
            .iter()
            .filter(|name| live.contains(name.as_str()))
            .collect();
        let common_live: Vec<&String> = current
            .feature_names
            .iter()
            .filter(|name| stored.contains(name.as_str()))
            .collect();
        let reordered = common_stored
            .iter()
            .zip(&common_live)
            .filter(|(a, b)| a != b)
            .map(|(a, _)| (*a).clone())
            .collect();
        Err(SchemaDrift {
            added,
            removed,
            reordered,
            expected: self.fingerprint.clone(),
            found: current.fingerprint,
        })
    }
}

/// Fail with [`FeatureError::MissingFeature`] unless `names` covers the schema.
pub fn ensure_complete<'a>(names: impl IntoIterator<Item = &'a str>) -> FeatureResult<()> {
    let present: HashSet<&str> = names.into_iter().collect();
    match feature_schema().iter().find(|name| !present.contains(name.as_str())) {
        Some(name) => Err(FeatureError::MissingFeature(name.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_sizes_match_the_catalog() {
        let count = |category| {
            feature_descriptors()
                .iter()
                .filter(|d| d.category == category)
                .count()
        };
        assert_eq!(count(FeatureCategory::Price), 30);
        assert_eq!(count(FeatureCategory::Momentum), 2);
        assert_eq!(count(FeatureCategory::Volume), 19);
        assert_eq!(count(FeatureCategory::Pattern), 61);
        assert_eq!(count(FeatureCategory::Lag), 23);
        assert_eq!(count(FeatureCategory::Rolling), 26);
        assert_eq!(count(FeatureCategory::Date), 15);
        assert_eq!(count(FeatureCategory::Composite), 3);
        assert_eq!(count(FeatureCategory::Target), 0);
    }

    #[test]
    fn names_are_unique() {
        let names: HashSet<&str> = feature_schema()
            .iter()
            .chain(target_columns())
            .map(String::as_str)
            .collect();
        assert_eq!(names.len(), feature_schema().len() + target_columns().len());
    }

    #[test]
    fn pattern_flags_are_flags_and_scores_are_not() {
        let kind_of = |name: &str| {
            feature_descriptors()
                .iter()
                .find(|d| d.name == name)
                .map(|d| d.kind)
        };
        use gainsmith_rs::FeatureKind;
        assert_eq!(kind_of("pattern_doji"), Some(FeatureKind::Flag));
        assert_eq!(kind_of("pattern_score"), Some(FeatureKind::Continuous));
        assert_eq!(kind_of("pattern_score_lag_1"), Some(FeatureKind::Continuous));
        assert_eq!(kind_of("volume_spike"), Some(FeatureKind::Flag));
        assert_eq!(kind_of("rsi_14"), Some(FeatureKind::Continuous));
    }

    #[test]
    fn manifest_detects_drift() {
        let manifest = SchemaManifest::current();
        assert!(manifest.check_compatible().is_ok());
        assert_eq!(manifest.feature_count, feature_schema().len());

        let mut stale = manifest.clone();
        stale.feature_names.retain(|name| name != "rsi_14");
        stale.feature_names.push("legacy_feature".to_string());
        stale.feature_names.swap(0, 1);
        stale.fingerprint = "0".repeat(64);
        let drift = stale.check_compatible().expect_err("drift");
        assert_eq!(drift.added, vec!["rsi_14".to_string()]);
        assert_eq!(drift.removed, vec!["legacy_feature".to_string()]);
        assert_eq!(drift.reordered, vec!["return_2d".to_string(), "return_1d".to_string()]);
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let manifest = SchemaManifest::current();
        let raw = manifest.to_json_pretty().expect("json");
        assert!(!raw.contains("target_names"));
        assert_eq!(SchemaManifest::from_json(&raw).expect("parse"), manifest);

        let training = SchemaManifest::current().with_targets();
        assert_eq!(training.target_names, target_columns());
        assert!(training.check_compatible().is_ok());
        let raw = training.to_json_pretty().expect("json");
        assert_eq!(SchemaManifest::from_json(&raw).expect("parse"), training);
    }

    #[test]
    fn incomplete_name_sets_are_reported() {
        assert!(ensure_complete(feature_schema().iter().map(String::as_str)).is_ok());
        let with_targets = feature_schema().iter().chain(target_columns());
        assert!(ensure_complete(with_targets.map(String::as_str)).is_ok());

        let partial = feature_schema()
            .iter()
            .map(String::as_str)
            .filter(|name| *name != "rsi_14");
        match ensure_complete(partial) {
            Err(FeatureError::MissingFeature(name)) => assert_eq!(name, "rsi_14"),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
