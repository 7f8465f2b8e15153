//! Support and resistance levels.
//!
//! Pivots are computed from the previous bar, so the first row is undefined.
//! Ichimoku leading spans are projected forward by the base-line period: the
//! value reported at bar `t` was computed at `t - kijun`.

use serde::Serialize;

use super::oscillators::midpoint;
use super::rolling::{rolling_max, rolling_min, shift};

#[derive(Debug, Clone)]
pub struct PivotLevels {
    pub pivot: Vec<f64>,
    pub r1: Vec<f64>,
    pub r2: Vec<f64>,
    pub r3: Vec<f64>,
    pub s1: Vec<f64>,
    pub s2: Vec<f64>,
    pub s3: Vec<f64>,
}

impl PivotLevels {
    fn with_len(len: usize) -> Self {
        Self {
            pivot: Vec::with_capacity(len),
            r1: Vec::with_capacity(len),
            r2: Vec::with_capacity(len),
            r3: Vec::with_capacity(len),
            s1: Vec::with_capacity(len),
            s2: Vec::with_capacity(len),
            s3: Vec::with_capacity(len),
        }
    }

    /// Levels in force at bar `idx`.
    pub fn at(&self, idx: usize) -> Option<PivotSnapshot> {
        Some(PivotSnapshot {
            pivot: *self.pivot.get(idx)?,
            r1: self.r1[idx],
            r2: self.r2[idx],
            r3: self.r3[idx],
            s1: self.s1[idx],
            s2: self.s2[idx],
            s3: self.s3[idx],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PivotSnapshot {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Floor-trader pivots from the prior bar.
pub fn pivot_points(high: &[f64], low: &[f64], close: &[f64]) -> PivotLevels {
    let (h, l, c) = (shift(high, 1), shift(low, 1), shift(close, 1));
    let mut out = PivotLevels::with_len(close.len());
    for i in 0..close.len() {
        let pp = (h[i] + l[i] + c[i]) / 3.0;
        out.pivot.push(pp);
        out.r1.push(2.0 * pp - l[i]);
        out.s1.push(2.0 * pp - h[i]);
        out.r2.push(pp + (h[i] - l[i]));
        out.s2.push(pp - (h[i] - l[i]));
        out.r3.push(h[i] + 2.0 * (pp - l[i]));
        out.s3.push(l[i] - 2.0 * (h[i] - pp));
    }
    out
}

/// Pivots whose bands sit at 0.382, 0.618 and 1.0 of the prior bar's range.
pub fn fibonacci_pivots(high: &[f64], low: &[f64], close: &[f64]) -> PivotLevels {
    let (h, l, c) = (shift(high, 1), shift(low, 1), shift(close, 1));
    let mut out = PivotLevels::with_len(close.len());
    for i in 0..close.len() {
        let pp = (h[i] + l[i] + c[i]) / 3.0;
        let range = h[i] - l[i];
        out.pivot.push(pp);
        out.r1.push(pp + 0.382 * range);
        out.r2.push(pp + 0.618 * range);
        out.r3.push(pp + range);
        out.s1.push(pp - 0.382 * range);
        out.s2.push(pp - 0.618 * range);
        out.s3.push(pp - range);
    }
    out
}

pub const RETRACEMENT_RATIOS: [f64; 7] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];

/// Retracement levels measured up from the rolling low, one vector per entry
/// of [`RETRACEMENT_RATIOS`].
#[derive(Debug, Clone)]
pub struct Retracement {
    pub levels: Vec<Vec<f64>>,
}

impl Retracement {
    /// Level for `ratio`, if it is one of [`RETRACEMENT_RATIOS`].
    pub fn level(&self, ratio: f64) -> Option<&[f64]> {
        RETRACEMENT_RATIOS
            .iter()
            .position(|r| (r - ratio).abs() < 1e-9)
            .map(|idx| self.levels[idx].as_slice())
    }
}

pub fn fibonacci_retracement(high: &[f64], low: &[f64], lookback: usize) -> Retracement {
    let hh = rolling_max(high, lookback);
    let ll = rolling_min(low, lookback);
    let levels = RETRACEMENT_RATIOS
        .iter()
        .map(|ratio| {
            hh.iter()
                .zip(&ll)
                .map(|(h, l)| {
                    // The top level is the high itself, not low + 1.0 * range.
                    if *ratio == 1.0 { *h } else { l + ratio * (h - l) }
                })
                .collect()
        })
        .collect();
    Retracement { levels }
}

#[derive(Debug, Clone)]
pub struct Ichimoku {
    pub tenkan: Vec<f64>,
    pub kijun: Vec<f64>,
    pub span_a: Vec<f64>,
    pub span_b: Vec<f64>,
}

fn donchian_mid(high: &[f64], low: &[f64], period: usize) -> Vec<f64> {
    midpoint(&rolling_max(high, period), &rolling_min(low, period))
}

/// Ichimoku cloud without the lagging span, which would read future closes.
pub fn ichimoku(high: &[f64], low: &[f64], tenkan: usize, kijun: usize, senkou_b: usize) -> Ichimoku {
    let tenkan_line = donchian_mid(high, low, tenkan);
    let kijun_line = donchian_mid(high, low, kijun);
    let span_a = shift(&midpoint(&tenkan_line, &kijun_line), kijun);
    let span_b = shift(&donchian_mid(high, low, senkou_b), kijun);
    Ichimoku {
        tenkan: tenkan_line,
        kijun: kijun_line,
        span_a,
        span_b,
    }
}
