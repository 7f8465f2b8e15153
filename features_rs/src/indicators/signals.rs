//! Discrete indicator votes on the newest bar and the 0-100 score built from
//! them.

use std::fmt;

use chrono::NaiveDate;
use gainsmith_rs::PriceSeries;
use serde::Serialize;

use super::levels::{PivotSnapshot, fibonacci_pivots, pivot_points};
use super::moving_average::{macd, sma};
use super::oscillators::{rsi, stochastic};
use super::trend::adx;
use super::volatility::bollinger;
use super::volume::mfi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Bullish => "BULLISH",
            Signal::Bearish => "BEARISH",
            Signal::Neutral => "NEUTRAL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSignal {
    pub indicator: &'static str,
    pub signal: Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorScore {
    /// 50 is neutral; each net bullish vote moves it by `50 / votes`.
    pub score: f64,
    pub reasons: Vec<String>,
}

fn last(values: &[f64]) -> f64 {
    values.last().copied().unwrap_or(f64::NAN)
}

fn previous(values: &[f64]) -> f64 {
    values
        .len()
        .checked_sub(2)
        .map_or(f64::NAN, |idx| values[idx])
}

// Below `low` is bullish, above `high` bearish; undefined reads neutral.
fn band_vote(value: f64, low: f64, high: f64) -> Signal {
    if value < low {
        Signal::Bullish
    } else if value > high {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

/// Votes of seven indicators on the newest bar, in a fixed order.
///
/// An empty series has no votes.
pub fn indicator_signals(series: &PriceSeries) -> Vec<IndicatorSignal> {
    if series.is_empty() {
        return Vec::new();
    }
    let (high, low, close, volume) = (series.high(), series.low(), series.close(), series.volume());
    let price = last(close);

    let rsi_vote = band_vote(last(&rsi(close, 14)), 30.0, 70.0);

    let histogram = macd(close, 12, 26, 9).histogram;
    let (now, before) = (last(&histogram), previous(&histogram));
    let macd_vote = if now > 0.0 && before < 0.0 {
        Signal::Bullish
    } else if now < 0.0 && before > 0.0 {
        Signal::Bearish
    } else if now > 0.0 {
        Signal::Bullish
    } else {
        Signal::Bearish
    };

    let bands = bollinger(close, 20, 2.0);
    let bollinger_vote = band_vote(price, last(&bands.lower), last(&bands.upper));

    let (sma20, sma50) = (last(&sma(close, 20)), last(&sma(close, 50)));
    let ma_vote = if price > sma20 && sma20 > sma50 {
        Signal::Bullish
    } else if price < sma20 && sma20 < sma50 {
        Signal::Bearish
    } else {
        Signal::Neutral
    };

    let stoch_vote = band_vote(last(&stochastic(high, low, close, 14, 3, 3).k), 20.0, 80.0);

    let trend = adx(high, low, close, 14);
    let adx_vote = if last(&trend.adx) > 25.0 {
        if last(&trend.plus_di) > last(&trend.minus_di) {
            Signal::Bullish
        } else {
            Signal::Bearish
        }
    } else {
        Signal::Neutral
    };

    let mfi_vote = band_vote(last(&mfi(high, low, close, volume, 14)), 20.0, 80.0);

    [
        ("rsi", rsi_vote),
        ("macd", macd_vote),
        ("bollinger", bollinger_vote),
        ("ma_trend", ma_vote),
        ("stochastic", stoch_vote),
        ("adx", adx_vote),
        ("mfi", mfi_vote),
    ]
    .into_iter()
    .map(|(indicator, signal)| IndicatorSignal { indicator, signal })
    .collect()
}

pub fn score_signals(signals: &[IndicatorSignal]) -> IndicatorScore {
    if signals.is_empty() {
        return IndicatorScore {
            score: 50.0,
            reasons: Vec::new(),
        };
    }
    let bullish = signals.iter().filter(|s| s.signal == Signal::Bullish).count() as f64;
    let bearish = signals.iter().filter(|s| s.signal == Signal::Bearish).count() as f64;
    let score = (50.0 + (bullish - bearish) * 50.0 / signals.len() as f64).clamp(0.0, 100.0);
    let reasons = signals
        .iter()
        .filter_map(|s| {
            let label = s.indicator.to_uppercase();
            match s.signal {
                Signal::Bullish => Some(format!("{label}: Bullish signal")),
                Signal::Bearish => Some(format!("{label}: Bearish signal")),
                Signal::Neutral => None,
            }
        })
        .collect();
    IndicatorScore { score, reasons }
}

/// Everything known about the newest bar: the votes, their score and the
/// pivot levels derived from the bar before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSummary {
    pub as_of: NaiveDate,
    pub close: f64,
    pub signals: Vec<IndicatorSignal>,
    #[serde(flatten)]
    pub score: IndicatorScore,
    pub pivots: PivotSnapshot,
    pub fibonacci_pivots: PivotSnapshot,
}

/// `None` for an empty series.
pub fn signal_summary(series: &PriceSeries) -> Option<SignalSummary> {
    let as_of = series.last_timestamp()?;
    let newest = series.len() - 1;
    let (high, low, close) = (series.high(), series.low(), series.close());
    let signals = indicator_signals(series);
    let score = score_signals(&signals);
    Some(SignalSummary {
        as_of,
        close: close[newest],
        signals,
        score,
        pivots: pivot_points(high, low, close).at(newest)?,
        fibonacci_pivots: fibonacci_pivots(high, low, close).at(newest)?,
    })
}
