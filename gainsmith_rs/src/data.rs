use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::{FeatureError, FeatureResult};

/// Columns every price table must carry (matched case-insensitively).
pub const REQUIRED_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Accepted names for the timestamp column, in order of preference.
pub const TIMESTAMP_COLUMNS: [&str; 4] = ["date", "timestamp", "datetime", "time"];

/// Days from 0001-01-01 (CE) to 1970-01-01, used to decode polars `Date` values.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBar {
    pub timestamp: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Daily OHLCV history for a single instrument, stored column-wise.
///
/// A `PriceSeries` is immutable once built: every constructor normalizes the
/// bars into strictly increasing timestamp order and the engine only ever
/// borrows it.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    timestamps: Vec<NaiveDate>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
}

impl PriceSeries {
    pub fn new(
        timestamps: Vec<NaiveDate>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
        volume: Vec<f64>,
    ) -> FeatureResult<Self> {
        let expected = timestamps.len();
        if expected == 0 {
            return Err(FeatureError::EmptySeries);
        }
        for (name, column) in [
            ("open", &open),
            ("high", &high),
            ("low", &low),
            ("close", &close),
            ("volume", &volume),
        ] {
            if column.len() != expected {
                return Err(FeatureError::LengthMismatch {
                    column: name.to_string(),
                    len: column.len(),
                    expected,
                });
            }
        }

        let series = Self {
            timestamps,
            open,
            high,
            low,
            close,
            volume,
        };
        let series = series.into_chronological_order()?;
        series.report_bar_shape_violations();
        Ok(series)
    }

    pub fn from_bars(bars: Vec<PriceBar>) -> FeatureResult<Self> {
        let len = bars.len();
        let mut timestamps = Vec::with_capacity(len);
        let mut open = Vec::with_capacity(len);
        let mut high = Vec::with_capacity(len);
        let mut low = Vec::with_capacity(len);
        let mut close = Vec::with_capacity(len);
        let mut volume = Vec::with_capacity(len);
        for bar in bars {
            timestamps.push(bar.timestamp);
            open.push(bar.open);
            high.push(bar.high);
            low.push(bar.low);
            close.push(bar.close);
            volume.push(bar.volume);
        }
        Self::new(timestamps, open, high, low, close, volume)
    }

    /// Validate and normalize a polars frame into a price series.
    ///
    /// Column names are matched case-insensitively. Interior nulls become
    /// NaN and flow through to the indicators as undefined values; only a
    /// missing column or an empty frame is fatal.
    pub fn from_frame(frame: &DataFrame) -> FeatureResult<Self> {
        let open = required_floats(frame, "open")?;
        let high = required_floats(frame, "high")?;
        let low = required_floats(frame, "low")?;
        let close = required_floats(frame, "close")?;
        let volume = required_floats(frame, "volume")?;
        let ts_series = TIMESTAMP_COLUMNS
            .iter()
            .find_map(|name| find_column(frame, name))
            .ok_or_else(|| FeatureError::missing_column("date"))?;
        if frame.height() == 0 {
            return Err(FeatureError::EmptySeries);
        }
        let timestamps = parse_timestamps(ts_series)?;
        debug!(
            rows = frame.height(),
            timestamp_column = ts_series.name(),
            "Normalized OHLCV frame"
        );

        Self::new(timestamps, open, high, low, close, volume)
    }

    pub fn from_csv(path: &Path) -> Result<Self> {
        let frame = LazyCsvReader::new(path)
            .has_header(true)
            .with_try_parse_dates(true)
            .with_ignore_errors(true)
            .finish()
            .with_context(|| format!("Failed to initialize CSV reader for {}", path.display()))?
            .collect()
            .with_context(|| format!("Failed to read price data from {}", path.display()))?;
        Self::from_frame(&frame)
            .with_context(|| format!("Invalid price data in {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDate] {
        &self.timestamps
    }

    pub fn open(&self) -> &[f64] {
        &self.open
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn close(&self) -> &[f64] {
        &self.close
    }

    pub fn volume(&self) -> &[f64] {
        &self.volume
    }

    pub fn first_timestamp(&self) -> Option<NaiveDate> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDate> {
        self.timestamps.last().copied()
    }

    pub fn bar(&self, index: usize) -> Option<PriceBar> {
        if index >= self.len() {
            return None;
        }
        Some(PriceBar {
            timestamp: self.timestamps[index],
            open: self.open[index],
            high: self.high[index],
            low: self.low[index],
            close: self.close[index],
            volume: self.volume[index],
        })
    }

    pub fn bars(&self) -> impl Iterator<Item = PriceBar> + '_ {
        (0..self.len()).filter_map(|idx| self.bar(idx))
    }

    /// Copy of the first `n` bars (all bars when `n` exceeds the length).
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            timestamps: self.timestamps[..n].to_vec(),
            open: self.open[..n].to_vec(),
            high: self.high[..n].to_vec(),
            low: self.low[..n].to_vec(),
            close: self.close[..n].to_vec(),
            volume: self.volume[..n].to_vec(),
        }
    }

    /// Bars whose timestamp is on or after `start`.
    pub fn since(&self, start: NaiveDate) -> Self {
        let offset = self.timestamps.partition_point(|ts| *ts < start);
        Self {
            timestamps: self.timestamps[offset..].to_vec(),
            open: self.open[offset..].to_vec(),
            high: self.high[offset..].to_vec(),
            low: self.low[offset..].to_vec(),
            close: self.close[offset..].to_vec(),
            volume: self.volume[offset..].to_vec(),
        }
    }

    fn into_chronological_order(self) -> FeatureResult<Self> {
        let already_sorted = self.timestamps.windows(2).all(|pair| pair[0] < pair[1]);
        if already_sorted {
            return Ok(self);
        }

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&idx| self.timestamps[idx]);
        if let Some(pair) = order
            .windows(2)
            .find(|pair| self.timestamps[pair[0]] == self.timestamps[pair[1]])
        {
            return Err(FeatureError::DuplicateTimestamp(self.timestamps[pair[0]]));
        }

        let displaced = order
            .iter()
            .enumerate()
            .filter(|(position, idx)| position != *idx)
            .count();
        warn!(
            rows = self.len(),
            displaced,
            "Price bars were not in chronological order; sorted by timestamp"
        );

        let pick = |values: &[f64]| order.iter().map(|&idx| values[idx]).collect::<Vec<_>>();
        Ok(Self {
            timestamps: order.iter().map(|&idx| self.timestamps[idx]).collect(),
            open: pick(&self.open),
            high: pick(&self.high),
            low: pick(&self.low),
            close: pick(&self.close),
            volume: pick(&self.volume),
        })
    }

    fn report_bar_shape_violations(&self) {
        let violations = (0..self.len())
            .filter(|&i| {
                let body_high = self.open[i].max(self.close[i]);
                let body_low = self.open[i].min(self.close[i]);
                self.high[i] < body_high || self.low[i] > body_low
            })
            .count();
        if violations > 0 {
            warn!(
                violations,
                rows = self.len(),
                "Bars with high below the body or low above the body"
            );
        }
    }
}

fn find_column<'a>(frame: &'a DataFrame, name: &str) -> Option<&'a Series> {
    frame
        .get_columns()
        .iter()
        .find(|series| series.name().eq_ignore_ascii_case(name))
}

fn required_floats(frame: &DataFrame, name: &str) -> FeatureResult<Vec<f64>> {
    let series = find_column(frame, name).ok_or_else(|| FeatureError::missing_column(name))?;
    float_values(series)
}

fn float_values(series: &Series) -> FeatureResult<Vec<f64>> {
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

fn parse_timestamps(series: &Series) -> FeatureResult<Vec<NaiveDate>> {
    let series = series.rechunk();
    let mut out = Vec::with_capacity(series.len());
    for value in series.iter() {
        let parsed = match &value {
            AnyValue::Date(days) => {
                NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            }
            AnyValue::Datetime(raw, unit, _) => date_from_epoch(*raw, *unit),
            AnyValue::String(s) => parse_date_str(s),
            AnyValue::StringOwned(s) => parse_date_str(s.as_str()),
            _ => None,
        };
        let date = parsed.ok_or_else(|| FeatureError::UnparseableTimestamp {
            value: value.to_string(),
        })?;
        out.push(date);
    }
    Ok(out)
}

fn date_from_epoch(raw: i64, unit: TimeUnit) -> Option<NaiveDate> {
    let per_second: i64 = match unit {
        TimeUnit::Nanoseconds => 1_000_000_000,
        TimeUnit::Microseconds => 1_000_000,
        TimeUnit::Milliseconds => 1_000,
    };
    let secs = raw.div_euclid(per_second);
    let nanos = raw.rem_euclid(per_second) * (1_000_000_000 / per_second);
    DateTime::from_timestamp(secs, nanos as u32).map(|dt| dt.date_naive())
}

/// Parse the date part of `YYYY-MM-DD`, RFC 3339 or `YYYY-MM-DD HH:MM:SS`
/// strings.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok()
}
