use std::collections::VecDeque;

use super::moving_average::ema;
use super::oscillators::midpoint;
use super::rolling::{ewm_span, rolling_max, rolling_mean, rolling_min, rolling_sum, safe_div};
use super::volatility::{atr, true_range};

#[derive(Debug, Clone)]
pub struct Adx {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

/// +DM and -DM. A move only counts when it is positive and larger than the
/// opposite move; the first bar is zero.
fn directional_movement(high: &[f64], low: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut plus = vec![0.0; high.len()];
    let mut minus = vec![0.0; high.len()];
    for i in 1..high.len() {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        if up > down && up > 0.0 {
            plus[i] = up;
        }
        if down > up && down > 0.0 {
            minus[i] = down;
        }
    }
    (plus, minus)
}

fn assemble_adx<S>(high: &[f64], low: &[f64], close: &[f64], smooth: S) -> Adx
where
    S: Fn(&[f64]) -> Vec<f64>,
{
    let range = smooth(&true_range(high, low, close));
    let (plus_dm, minus_dm) = directional_movement(high, low);
    let plus_avg = smooth(&plus_dm);
    let minus_avg = smooth(&minus_dm);
    let plus_di: Vec<f64> = (0..close.len())
        .map(|i| 100.0 * safe_div(plus_avg[i], range[i]))
        .collect();
    let minus_di: Vec<f64> = (0..close.len())
        .map(|i| 100.0 * safe_div(minus_avg[i], range[i]))
        .collect();
    let dx: Vec<f64> = (0..close.len())
        .map(|i| 100.0 * safe_div((plus_di[i] - minus_di[i]).abs(), plus_di[i] + minus_di[i]))
        .collect();
    Adx {
        adx: smooth(&dx),
        plus_di,
        minus_di,
    }
}

/// ADX with simple rolling means for every smoothing stage.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Adx {
    assemble_adx(high, low, close, |values| rolling_mean(values, period))
}

/// ADX with exponential smoothing (`span = period`) for every stage.
pub fn adx_ewm(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Adx {
    assemble_adx(high, low, close, |values| ewm_span(values, period))
}

#[derive(Debug, Clone)]
pub struct Aroon {
    pub up: Vec<f64>,
    pub down: Vec<f64>,
    pub oscillator: Vec<f64>,
}

/// Tracks the earliest extreme of a sliding window with a monotonic deque.
struct ExtremeTracker {
    indices: VecDeque<usize>,
    last_invalid: Option<usize>,
    prefer: fn(f64, f64) -> bool,
}

impl ExtremeTracker {
    fn new(prefer: fn(f64, f64) -> bool) -> Self {
        Self {
            indices: VecDeque::new(),
            last_invalid: None,
            prefer,
        }
    }

    fn push(&mut self, values: &[f64], idx: usize) {
        let value = values[idx];
        if !value.is_finite() {
            self.last_invalid = Some(idx);
            return;
        }
        // Equal values stay queued so the front is the first occurrence.
        while let Some(&back) = self.indices.back() {
            if (self.prefer)(value, values[back]) {
                self.indices.pop_back();
            } else {
                break;
            }
        }
        self.indices.push_back(idx);
    }

    fn extreme_since(&mut self, start: usize) -> Option<usize> {
        while self.indices.front().is_some_and(|&front| front < start) {
            self.indices.pop_front();
        }
        if self.last_invalid.is_some_and(|bad| bad >= start) {
            return None;
        }
        self.indices.front().copied()
    }
}

/// Aroon over a window of `period + 1` bars. Aroon up is the position of the
/// window's first highest high scaled to 0..100; aroon down likewise for the
/// lowest low.
pub fn aroon(high: &[f64], low: &[f64], period: usize) -> Aroon {
    let len = high.len();
    let mut up = vec![f64::NAN; len];
    let mut down = vec![f64::NAN; len];
    if period > 0 {
        let mut highs = ExtremeTracker::new(|new, old| new > old);
        let mut lows = ExtremeTracker::new(|new, old| new < old);
        let scale = 100.0 / period as f64;
        for i in 0..len {
            highs.push(high, i);
            lows.push(low, i);
            if i < period {
                continue;
            }
            let start = i - period;
            if let Some(idx) = highs.extreme_since(start) {
                up[i] = (idx - start) as f64 * scale;
            }
            if let Some(idx) = lows.extreme_since(start) {
                down[i] = (idx - start) as f64 * scale;
            }
        }
    }
    let oscillator = up.iter().zip(&down).map(|(u, d)| u - d).collect();
    Aroon {
        up,
        down,
        oscillator,
    }
}

/// Choppiness index: 100 near pure chop, low values in a clean trend.
pub fn choppiness_index(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let tr_sum = rolling_sum(&true_range(high, low, close), period);
    let hh = rolling_max(high, period);
    let ll = rolling_min(low, period);
    let norm = (period as f64).log10();
    (0..close.len())
        .map(|i| {
            // A window without range has no defined chop; log10(0) would be -inf.
            let ratio = safe_div(tr_sum[i], hh[i] - ll[i]);
            if ratio > 0.0 {
                100.0 * ratio.log10() / norm
            } else {
                f64::NAN
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ElderRay {
    pub bull_power: Vec<f64>,
    pub bear_power: Vec<f64>,
}

pub fn elder_ray(high: &[f64], low: &[f64], close: &[f64], period: usize) -> ElderRay {
    let base = ema(close, period);
    ElderRay {
        bull_power: high.iter().zip(&base).map(|(h, e)| h - e).collect(),
        bear_power: low.iter().zip(&base).map(|(l, e)| l - e).collect(),
    }
}

#[derive(Debug, Clone)]
pub struct ParabolicSar {
    pub sar: Vec<f64>,
    /// 1.0 while long, -1.0 while short.
    pub trend: Vec<f64>,
}

/// Parabolic stop-and-reverse.
///
/// Bars 0 and 1 carry the close and an uptrend. From bar 2 the stop moves
/// toward the extreme point by the acceleration factor, is clamped by the
/// two previous bars, and flips to the extreme point when price crosses it.
pub fn parabolic_sar(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    af_start: f64,
    af_step: f64,
    af_max: f64,
) -> ParabolicSar {
    let len = close.len();
    let mut sar = close.to_vec();
    let mut trend = vec![1.0; len];
    if len == 0 {
        return ParabolicSar { sar, trend };
    }
    let mut long = true;
    let mut af = af_start;
    let mut extreme = low[0];
    for i in 2..len {
        let prev = sar[i - 1];
        let mut stop;
        if long {
            stop = (prev + af * (extreme - prev)).min(low[i - 1]).min(low[i - 2]);
            if high[i] > extreme {
                extreme = high[i];
                af = (af + af_step).min(af_max);
            }
            if low[i] < stop {
                long = false;
                stop = extreme;
                extreme = low[i];
                af = af_start;
            }
        } else {
            stop = (prev - af * (prev - extreme)).max(high[i - 1]).max(high[i - 2]);
            if low[i] < extreme {
                extreme = low[i];
                af = (af + af_step).min(af_max);
            }
            if high[i] > stop {
                long = true;
                stop = extreme;
                extreme = high[i];
                af = af_start;
            }
        }
        sar[i] = stop;
        trend[i] = if long { 1.0 } else { -1.0 };
    }
    ParabolicSar { sar, trend }
}

#[derive(Debug, Clone)]
pub struct Supertrend {
    pub value: Vec<f64>,
    /// 1.0 in an uptrend, -1.0 in a downtrend, NaN during warm-up.
    pub direction: Vec<f64>,
}

// A NaN band stays NaN; a NaN previous value yields the band.
fn ratchet(band: f64, prev: f64, keep: fn(f64, f64) -> f64) -> f64 {
    if band.is_nan() || prev.is_nan() {
        band
    } else {
        keep(band, prev)
    }
}

/// Supertrend bands at `hl2 ± multiplier * atr(period)`, evaluated bar by
/// bar from `period` onward.
pub fn supertrend(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    multiplier: f64,
) -> Supertrend {
    let len = close.len();
    let mid = midpoint(high, low);
    let range = atr(high, low, close, period);
    let upper: Vec<f64> = mid.iter().zip(&range).map(|(m, a)| m + multiplier * a).collect();
    let lower: Vec<f64> = mid.iter().zip(&range).map(|(m, a)| m - multiplier * a).collect();
    let mut value = vec![f64::NAN; len];
    let mut direction = vec![f64::NAN; len];
    for i in period.max(1)..len {
        if close[i] > upper[i - 1] {
            value[i] = lower[i];
            direction[i] = 1.0;
        } else if close[i] < lower[i - 1] {
            value[i] = upper[i];
            direction[i] = -1.0;
        } else if direction[i - 1] == 1.0 {
            value[i] = ratchet(lower[i], value[i - 1], f64::max);
            direction[i] = 1.0;
        } else {
            value[i] = ratchet(upper[i], value[i - 1], f64::min);
            direction[i] = -1.0;
        }
    }
    Supertrend { value, direction }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_aroon_up(high: &[f64], period: usize, i: usize) -> f64 {
        let window = &high[i - period..=i];
        let mut best = 0;
        for (idx, v) in window.iter().enumerate() {
            if *v > window[best] {
                best = idx;
            }
        }
        best as f64 * (100.0 / period as f64)
    }

    #[test]
    fn aroon_tracker_matches_a_naive_scan() {
        let high: Vec<f64> = (0..200)
            .map(|i| ((i * 37 % 23) as f64).round() + (i as f64 * 0.1).sin())
            .collect();
        let low: Vec<f64> = high.iter().map(|h| h - 1.0).collect();
        let out = aroon(&high, &low, 25);
        assert!(out.up[24].is_nan());
        for i in 25..high.len() {
            assert_eq!(out.up[i], naive_aroon_up(&high, 25, i), "bar {i}");
        }
    }

    #[test]
    fn aroon_prefers_the_first_of_equal_highs() {
        let high = [1.0, 5.0, 2.0, 5.0];
        let low = [0.0; 4];
        let out = aroon(&high, &low, 3);
        assert!((out.up[3] - 100.0 / 3.0).abs() < 1e-12);
        assert_eq!(out.down[3], 0.0);
    }

    #[test]
    fn aroon_window_with_a_gap_is_undefined() {
        let mut high: Vec<f64> = (0..10).map(|v| v as f64).collect();
        high[4] = f64::NAN;
        let low = vec![0.0; 10];
        let out = aroon(&high, &low, 3);
        assert!(out.up[6].is_nan());
        assert!(out.up[7].is_nan());
        assert_eq!(out.up[8], 100.0);
    }

    #[test]
    fn rolling_and_exponential_adx_are_distinct() {
        let high: Vec<f64> = (0..80)
            .map(|i| 50.0 + i as f64 * 0.4 + (i as f64 * 0.7).sin() * 2.0)
            .collect();
        let low: Vec<f64> = high.iter().map(|h| h - 1.5).collect();
        let close: Vec<f64> = high.iter().map(|h| h - 0.4).collect();
        let simple = adx(&high, &low, &close, 14);
        let smooth = adx_ewm(&high, &low, &close, 14);
        assert!(simple.adx[25].is_nan());
        assert!(simple.adx[26].is_finite());
        assert!(smooth.adx[5].is_finite());
        assert!(simple.plus_di[79] > simple.minus_di[79]);
        assert!((simple.adx[79] - smooth.adx[79]).abs() > 1e-6);
    }

    #[test]
    fn exponential_adx_uses_span_smoothing() {
        let high = [10.0, 12.0, 13.0];
        let low = [9.0, 11.0, 12.0];
        let close = [9.5, 11.5, 12.5];
        let out = adx_ewm(&high, &low, &close, 3);
        // alpha = 2 / (3 + 1): TR smooths to 1.625 and +DM to 1.0.
        assert!((out.plus_di[2] - 100.0 / 1.625).abs() < 1e-9, "{}", out.plus_di[2]);
        assert_eq!(out.minus_di[2], 0.0);
    }

    #[test]
    fn parabolic_sar_flips_on_a_reversal() {
        let mut close: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        close.extend((0..20).map(|i| 119.0 - 2.0 * i as f64));
        let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
        let out = parabolic_sar(&high, &low, &close, 0.02, 0.02, 0.2);
        assert_eq!(out.sar[0], close[0]);
        assert_eq!(out.sar[1], close[1]);
        assert_eq!(out.trend[15], 1.0);
        assert!(out.sar[15] < low[15]);
        assert_eq!(out.trend[39], -1.0);
        assert!(out.sar[39] > high[39]);
    }

    #[test]
    fn supertrend_switches_direction_on_band_breaks() {
        let mut close = vec![100.0; 15];
        close.extend([110.0; 10]);
        close.extend([90.0; 10]);
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let out = supertrend(&high, &low, &close, 10, 3.0);
        assert!(out.direction[9].is_nan());
        assert_eq!(out.direction[14], -1.0);
        assert!((out.value[14] - 106.0).abs() < 1e-9);
        // The jump clears the prior upper band and the line moves below price.
        assert_eq!(out.direction[15], 1.0);
        assert!(out.value[24] < close[24]);
        assert_eq!(out.direction[25], -1.0);
        assert!(out.value[34] > close[34]);
    }

    #[test]
    fn choppiness_is_low_in_a_straight_trend() {
        let high: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let low: Vec<f64> = high.iter().map(|h| h - 1.0).collect();
        let close = high.clone();
        let out = choppiness_index(&high, &low, &close, 14);
        assert!(out[12].is_nan());
        assert!(out[29] < 38.2, "{}", out[29]);
    }

    #[test]
    fn choppiness_is_undefined_without_range() {
        let mut high: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        high.extend(std::iter::repeat_n(29.0, 20));
        let low: Vec<f64> = high
            .iter()
            .enumerate()
            .map(|(i, h)| if i < 20 { h - 1.0 } else { *h })
            .collect();
        let close = high.clone();
        let out = choppiness_index(&high, &low, &close, 14);
        // Window 12..=25 still spans the ramp.
        assert!(out[25].abs() < 1e-12, "{}", out[25]);
        for (i, value) in out.iter().enumerate().skip(33) {
            assert!(value.is_nan(), "flat window ending at {i} gave {value}");
        }
    }
}
