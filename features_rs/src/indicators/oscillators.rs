use super::moving_average::sma;
use super::rolling::{
    diff, divide, ewm_adjusted, ewm_span, rolling_max, rolling_mean, rolling_mean_abs_dev,
    rolling_min, rolling_sum, safe_div, shift,
};

/// Relative strength index.
///
/// Average gain and loss use the bias-adjusted exponential mean with
/// `alpha = 1 / period`; the first value appears at index `period - 1`. A
/// window without losses saturates at 100, including a perfectly flat one.
pub fn rsi(close: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; close.len()];
    }
    let deltas: Vec<f64> = diff(close, 1)
        .into_iter()
        .map(|d| if d.is_finite() { d } else { 0.0 })
        .collect();
    let gains: Vec<f64> = deltas.iter().map(|d| d.max(0.0)).collect();
    let losses: Vec<f64> = deltas.iter().map(|d| (-d).max(0.0)).collect();
    let alpha = 1.0 / period as f64;
    let avg_gain = ewm_adjusted(&gains, alpha, period);
    let avg_loss = ewm_adjusted(&losses, alpha, period);
    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(gain, loss)| {
            if !gain.is_finite() || !loss.is_finite() {
                f64::NAN
            } else if *loss == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + gain / loss)
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Raw %K is smoothed by `smooth_k` before %D is taken over the smoothed %K.
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    d_period: usize,
    smooth_k: usize,
) -> Stochastic {
    let hh = rolling_max(high, k_period);
    let ll = rolling_min(low, k_period);
    let raw: Vec<f64> = (0..close.len())
        .map(|i| 100.0 * safe_div(close[i] - ll[i], hh[i] - ll[i]))
        .collect();
    let k = sma(&raw, smooth_k);
    let d = sma(&k, d_period);
    Stochastic { k, d }
}

pub fn stochastic_rsi(
    close: &[f64],
    rsi_period: usize,
    stoch_period: usize,
    k_period: usize,
    d_period: usize,
) -> Stochastic {
    let rsi = rsi(close, rsi_period);
    let hi = rolling_max(&rsi, stoch_period);
    let lo = rolling_min(&rsi, stoch_period);
    let raw: Vec<f64> = (0..rsi.len())
        .map(|i| safe_div(rsi[i] - lo[i], hi[i] - lo[i]))
        .collect();
    let k: Vec<f64> = sma(&raw, k_period).into_iter().map(|v| v * 100.0).collect();
    let d = sma(&k, d_period);
    Stochastic { k, d }
}

pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let hh = rolling_max(high, period);
    let ll = rolling_min(low, period);
    (0..close.len())
        .map(|i| -100.0 * safe_div(hh[i] - close[i], hh[i] - ll[i]))
        .collect()
}

pub(crate) fn typical_price(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| (high[i] + low[i] + close[i]) / 3.0)
        .collect()
}

pub(crate) fn midpoint(high: &[f64], low: &[f64]) -> Vec<f64> {
    high.iter().zip(low).map(|(h, l)| (h + l) / 2.0).collect()
}

/// Commodity channel index with the 0.015 Lambert constant.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let tp = typical_price(high, low, close);
    let mean = rolling_mean(&tp, period);
    let mad = rolling_mean_abs_dev(&tp, period);
    (0..tp.len())
        .map(|i| safe_div(tp[i] - mean[i], 0.015 * mad[i]))
        .collect()
}

/// Rate of change in percent.
pub fn roc(close: &[f64], period: usize) -> Vec<f64> {
    let prior = shift(close, period);
    (0..close.len())
        .map(|i| 100.0 * safe_div(close[i] - prior[i], prior[i]))
        .collect()
}

pub fn momentum(close: &[f64], period: usize) -> Vec<f64> {
    diff(close, period)
}

/// True strength index: double-smoothed price change over double-smoothed
/// absolute price change.
pub fn tsi(close: &[f64], long_period: usize, short_period: usize) -> Vec<f64> {
    let change = diff(close, 1);
    let abs_change: Vec<f64> = change.iter().map(|c| c.abs()).collect();
    let smooth = ewm_span(&ewm_span(&change, long_period), short_period);
    let abs_smooth = ewm_span(&ewm_span(&abs_change, long_period), short_period);
    divide(&smooth, &abs_smooth)
        .into_iter()
        .map(|v| v * 100.0)
        .collect()
}

pub fn awesome_oscillator(high: &[f64], low: &[f64]) -> Vec<f64> {
    let mid = midpoint(high, low);
    let fast = sma(&mid, 5);
    let slow = sma(&mid, 34);
    fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
}

fn nan_min(a: f64, b: f64) -> f64 {
    match (a.is_nan(), b.is_nan()) {
        (true, _) => b,
        (_, true) => a,
        _ => a.min(b),
    }
}

fn nan_max(a: f64, b: f64) -> f64 {
    match (a.is_nan(), b.is_nan()) {
        (true, _) => b,
        (_, true) => a,
        _ => a.max(b),
    }
}

/// Ultimate oscillator with 4:2:1 weighting of the three averages.
pub fn ultimate_oscillator(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    short: usize,
    medium: usize,
    long: usize,
) -> Vec<f64> {
    let prev_close = shift(close, 1);
    let floor: Vec<f64> = (0..close.len())
        .map(|i| nan_min(low[i], prev_close[i]))
        .collect();
    let buying_pressure: Vec<f64> = (0..close.len()).map(|i| close[i] - floor[i]).collect();
    let true_range: Vec<f64> = (0..close.len())
        .map(|i| nan_max(high[i], prev_close[i]) - floor[i])
        .collect();
    let average = |period: usize| {
        divide(
            &rolling_sum(&buying_pressure, period),
            &rolling_sum(&true_range, period),
        )
    };
    let (a1, a2, a3) = (average(short), average(medium), average(long));
    (0..close.len())
        .map(|i| 100.0 * (4.0 * a1[i] + 2.0 * a2[i] + a3[i]) / 7.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_stays_within_bounds() {
        let close: Vec<f64> = (0..200)
            .map(|i| 100.0 + 10.0 * (i as f64 * 0.37).sin() + (i % 7) as f64)
            .collect();
        let out = rsi(&close, 14);
        assert!(out[..13].iter().all(|v| v.is_nan()));
        for value in out[13..].iter() {
            assert!((0.0..=100.0).contains(value), "rsi out of range: {value}");
        }
    }

    #[test]
    fn rsi_saturates_on_a_rising_series() {
        let close: Vec<f64> = (1..=40).map(|v| v as f64).collect();
        let out = rsi(&close, 14);
        assert_eq!(out[13], 100.0);
        assert_eq!(out[39], 100.0);
    }

    #[test]
    fn stochastic_d_smooths_the_smoothed_k() {
        let high: Vec<f64> = (0..40).map(|i| 11.0 + (i as f64 * 0.5).sin()).collect();
        let low: Vec<f64> = high.iter().map(|h| h - 2.0).collect();
        let close: Vec<f64> = high.iter().map(|h| h - 0.5).collect();
        let out = stochastic(&high, &low, &close, 14, 3, 3);
        // Raw %K from index 13, smoothed %K from 15, %D from 17.
        assert!(out.k[14].is_nan() && out.k[15].is_finite());
        assert!(out.d[16].is_nan() && out.d[17].is_finite());
        let expected = (out.k[15] + out.k[16] + out.k[17]) / 3.0;
        assert!((out.d[17] - expected).abs() < 1e-12);
    }

    #[test]
    fn williams_r_spans_minus_hundred_to_zero() {
        let high = [10.0, 12.0, 11.0];
        let low = [8.0, 9.0, 7.0];
        let out = williams_r(&high, &low, &[9.0, 12.0, 7.0], 3);
        assert_eq!(out[2], -100.0);
        let out = williams_r(&high, &low, &[9.0, 10.0, 12.0], 3);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn roc_and_momentum_measure_change() {
        let close = [100.0, 101.0, 110.0];
        assert!((roc(&close, 2)[2] - 10.0).abs() < 1e-12);
        assert_eq!(momentum(&close, 2)[2], 10.0);
        assert!(momentum(&close, 2)[1].is_nan());
    }

    #[test]
    fn tsi_is_plus_hundred_on_a_steady_rise() {
        let close: Vec<f64> = (0..60).map(|v| v as f64).collect();
        let out = tsi(&close, 25, 13);
        assert!(out[0].is_nan());
        assert!((out[59] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn ultimate_oscillator_is_hundred_when_closing_at_highs() {
        let high: Vec<f64> = (0..40).map(|v| 10.0 + v as f64).collect();
        let low: Vec<f64> = high.iter().map(|h| h - 1.0).collect();
        let out = ultimate_oscillator(&high, &low, &high, 7, 14, 28);
        assert!(out[26].is_nan());
        assert!((out[39] - 100.0).abs() < 1e-9);
    }
}
