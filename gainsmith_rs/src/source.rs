//! Price-source collaborators.
//!
//! The feature engine never fetches data itself. Callers obtain a
//! [`PriceSeries`] through a [`PriceSource`] first and hand it to the engine.
//! The implementations here are local: a directory of per-symbol CSV files and
//! a time-bounded memoizing wrapper around any other source.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{Months, NaiveDate};
use thiserror::Error;
use tracing::{debug, info};

use crate::data::PriceSeries;
use crate::error::FeatureError;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("no price data available for {symbol}: {reason}")]
    NotAvailable {
        symbol: String,
        reason: NotAvailableReason,
    },
    #[error("failed to read price data for {symbol}: {message}")]
    Io { symbol: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotAvailableReason {
    UnknownSymbol,
    EmptyResult,
    MissingColumns(String),
    UnsupportedInterval(Interval),
}

impl fmt::Display for NotAvailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSymbol => write!(f, "unknown symbol"),
            Self::EmptyResult => write!(f, "empty result"),
            Self::MissingColumns(detail) => write!(f, "missing required columns ({detail})"),
            Self::UnsupportedInterval(interval) => write!(f, "unsupported interval {interval}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    TenYears,
    Max,
}

impl Period {
    fn months(self) -> Option<u32> {
        match self {
            Self::OneMonth => Some(1),
            Self::ThreeMonths => Some(3),
            Self::SixMonths => Some(6),
            Self::OneYear => Some(12),
            Self::TwoYears => Some(24),
            Self::FiveYears => Some(60),
            Self::TenYears => Some(120),
            Self::Max => None,
        }
    }

    /// First date covered by this period when the newest bar is `last`.
    pub fn start_from(self, last: NaiveDate) -> Option<NaiveDate> {
        self.months()
            .and_then(|months| last.checked_sub_months(Months::new(months)))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::TenYears => "10y",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1mo" => Ok(Self::OneMonth),
            "3mo" => Ok(Self::ThreeMonths),
            "6mo" => Ok(Self::SixMonths),
            "1y" => Ok(Self::OneYear),
            "2y" => Ok(Self::TwoYears),
            "5y" => Ok(Self::FiveYears),
            "10y" => Ok(Self::TenYears),
            "max" => Ok(Self::Max),
            other => Err(format!(
                "unknown period '{other}' (expected 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y or max)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Daily,
    Hourly,
    FiveMinutes,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daily => "1d",
            Self::Hourly => "1h",
            Self::FiveMinutes => "5m",
        })
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Self::Daily),
            "1h" => Ok(Self::Hourly),
            "5m" => Ok(Self::FiveMinutes),
            other => Err(format!("unknown interval '{other}' (expected 1d, 1h or 5m)")),
        }
    }
}

pub trait PriceSource: Send + Sync {
    fn fetch(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> Result<PriceSeries, SourceError>;
}

/// Reads `<root>/<SYMBOL>.csv` files with a header row containing the OHLCV
/// columns and a date column.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.root.join(format!("{symbol}.csv"))
    }
}

impl PriceSource for CsvDirectorySource {
    fn fetch(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> Result<PriceSeries, SourceError> {
        let not_available = |reason| SourceError::NotAvailable {
            symbol: symbol.to_string(),
            reason,
        };
        if interval != Interval::Daily {
            return Err(not_available(NotAvailableReason::UnsupportedInterval(
                interval,
            )));
        }
        let path = self.path_for(symbol);
        if !path.is_file() {
            return Err(not_available(NotAvailableReason::UnknownSymbol));
        }

        let series = match PriceSeries::from_csv(&path) {
            Ok(series) => series,
            Err(err) => {
                return match err.downcast_ref::<FeatureError>() {
                    Some(FeatureError::Schema { column }) => Err(not_available(
                        NotAvailableReason::MissingColumns(column.clone()),
                    )),
                    Some(FeatureError::EmptySeries) => {
                        Err(not_available(NotAvailableReason::EmptyResult))
                    }
                    _ => Err(SourceError::Io {
                        symbol: symbol.to_string(),
                        message: format!("{err:#}"),
                    }),
                };
            }
        };

        let windowed = match series.last_timestamp().and_then(|last| period.start_from(last)) {
            Some(start) => series.since(start),
            None => series,
        };
        if windowed.is_empty() {
            return Err(not_available(NotAvailableReason::EmptyResult));
        }
        debug!(
            symbol,
            %period,
            rows = windowed.len(),
            path = %path.display(),
            "Loaded price series from CSV directory"
        );
        Ok(windowed)
    }
}

struct CacheEntry {
    fetched_at: Instant,
    series: PriceSeries,
}

/// Memoizes successful fetches per `(symbol, period, interval)` for a fixed
/// time-to-live. Failures are never cached.
pub struct CachedSource<S> {
    inner: S,
    ttl: Duration,
    entries: Mutex<HashMap<(String, Period, Interval), CacheEntry>>,
}

impl<S: PriceSource> CachedSource<S> {
    pub fn new(inner: S) -> Self {
        Self::with_ttl(inner, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn cached(&self, key: &(String, Period, Interval)) -> Option<PriceSeries> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        (entry.fetched_at.elapsed() < self.ttl).then(|| entry.series.clone())
    }
}

impl<S: PriceSource> PriceSource for CachedSource<S> {
    fn fetch(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> Result<PriceSeries, SourceError> {
        let key = (symbol.to_string(), period, interval);
        if let Some(series) = self.cached(&key) {
            debug!(symbol, %period, %interval, "Price cache hit");
            return Ok(series);
        }
        let series = self.inner.fetch(symbol, period, interval)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    fetched_at: Instant::now(),
                    series: series.clone(),
                },
            );
        }
        info!(symbol, %period, %interval, rows = series.len(), "Price series cached");
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_parse_and_render() {
        for raw in ["1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "max"] {
            let period: Period = raw.parse().expect("known period");
            assert_eq!(period.to_string(), raw);
        }
        assert!("7y".parse::<Period>().is_err());
    }

    #[test]
    fn period_start_counts_calendar_months_back() {
        let last = NaiveDate::from_ymd_opt(2024, 3, 31).expect("date");
        assert_eq!(
            Period::OneMonth.start_from(last),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            Period::OneYear.start_from(last),
            NaiveDate::from_ymd_opt(2023, 3, 31)
        );
        assert_eq!(Period::Max.start_from(last), None);
    }
}
