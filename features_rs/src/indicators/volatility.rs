use super::moving_average::{ema, sma};
use super::rolling::{
    divide, ewm_span, rolling_max, rolling_mean, rolling_min, rolling_std, safe_div,
};

/// True range. The first bar has no previous close and uses `high - low`.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            let high_low = high[i] - low[i];
            if i == 0 {
                return high_low;
            }
            let prev = close[i - 1];
            [high_low, (high[i] - prev).abs(), (low[i] - prev).abs()]
                .into_iter()
                .filter(|v| !v.is_nan())
                .fold(f64::NAN, f64::max)
        })
        .collect()
}

/// Average true range as a simple rolling mean.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    rolling_mean(&true_range(high, low, close), period)
}

/// Average true range with exponential smoothing (`span = period`).
pub fn atr_ewm(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    ewm_span(&true_range(high, low, close), period)
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
    /// Band width as a percentage of the middle band.
    pub bandwidth: Vec<f64>,
    /// Position of close inside the bands, 0 at the lower band and 1 at the upper.
    pub percent_b: Vec<f64>,
}

pub fn bollinger(close: &[f64], period: usize, std_dev: f64) -> Bollinger {
    let middle = sma(close, period);
    let std = rolling_std(close, period);
    let upper: Vec<f64> = middle.iter().zip(&std).map(|(m, s)| m + std_dev * s).collect();
    let lower: Vec<f64> = middle.iter().zip(&std).map(|(m, s)| m - std_dev * s).collect();
    let bandwidth = (0..close.len())
        .map(|i| 100.0 * safe_div(upper[i] - lower[i], middle[i]))
        .collect();
    let percent_b = (0..close.len())
        .map(|i| safe_div(close[i] - lower[i], upper[i] - lower[i]))
        .collect();
    Bollinger {
        upper,
        middle,
        lower,
        bandwidth,
        percent_b,
    }
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Keltner channel: EMA of close plus or minus a multiple of ATR.
pub fn keltner(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    ema_period: usize,
    atr_period: usize,
    multiplier: f64,
) -> Channel {
    let middle = ema(close, ema_period);
    let range = atr(high, low, close, atr_period);
    Channel {
        upper: middle.iter().zip(&range).map(|(m, a)| m + multiplier * a).collect(),
        lower: middle.iter().zip(&range).map(|(m, a)| m - multiplier * a).collect(),
        middle,
    }
}

pub fn donchian(high: &[f64], low: &[f64], period: usize) -> Channel {
    let upper = rolling_max(high, period);
    let lower = rolling_min(low, period);
    let middle = upper.iter().zip(&lower).map(|(u, l)| (u + l) / 2.0).collect();
    Channel {
        upper,
        middle,
        lower,
    }
}

#[derive(Debug, Clone)]
pub struct Chandelier {
    pub long_exit: Vec<f64>,
    pub short_exit: Vec<f64>,
}

pub fn chandelier(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    multiplier: f64,
) -> Chandelier {
    let range = atr(high, low, close, period);
    let hh = rolling_max(high, period);
    let ll = rolling_min(low, period);
    Chandelier {
        long_exit: hh.iter().zip(&range).map(|(h, a)| h - multiplier * a).collect(),
        short_exit: ll.iter().zip(&range).map(|(l, a)| l + multiplier * a).collect(),
    }
}

/// Annualized standard deviation of daily log returns, in percent.
pub fn historical_volatility(close: &[f64], period: usize) -> Vec<f64> {
    let ratios: Vec<f64> = (0..close.len())
        .map(|i| if i == 0 { f64::NAN } else { safe_div(close[i], close[i - 1]) })
        .collect();
    let log_returns: Vec<f64> = ratios
        .iter()
        .map(|r| if *r > 0.0 { r.ln() } else { f64::NAN })
        .collect();
    let annualization = 252f64.sqrt() * 100.0;
    rolling_std(&log_returns, period)
        .into_iter()
        .map(|s| s * annualization)
        .collect()
}

/// ATR as a percentage of close.
pub fn atr_percent(atr: &[f64], close: &[f64]) -> Vec<f64> {
    divide(atr, close).into_iter().map(|v| v * 100.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_range_uses_previous_close_gaps() {
        let high = [10.0, 12.0, 9.0];
        let low = [9.0, 11.5, 8.0];
        let close = [9.5, 11.8, 8.5];
        let tr = true_range(&high, &low, &close);
        for (got, want) in tr.iter().zip([1.0, 2.5, 3.8]) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
    }

    #[test]
    fn rolling_and_exponential_atr_differ() {
        let high: Vec<f64> = (0..30).map(|i| 10.0 + (i % 5) as f64).collect();
        let low: Vec<f64> = high.iter().map(|h| h - 1.0 - (h % 2.0)).collect();
        let close: Vec<f64> = high.iter().map(|h| h - 0.5).collect();
        let simple = atr(&high, &low, &close, 14);
        let exponential = atr_ewm(&high, &low, &close, 14);
        assert!(simple[12].is_nan());
        assert!(exponential[12].is_finite());
        assert!((simple[29] - exponential[29]).abs() > 1e-6);
    }

    #[test]
    fn bollinger_percent_b_is_half_at_the_middle_band() {
        let close = [1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 2.5];
        let out = bollinger(&close, 5, 2.0);
        assert!(out.upper[3].is_nan());
        let i = 6;
        assert!((out.upper[i] + out.lower[i] - 2.0 * out.middle[i]).abs() < 1e-12);
        let at_mid = safe_div(out.middle[i] - out.lower[i], out.upper[i] - out.lower[i]);
        assert!((at_mid - 0.5).abs() < 1e-12);
    }

    #[test]
    fn donchian_midpoint_sits_between_extremes() {
        let out = donchian(&[5.0, 7.0, 6.0], &[4.0, 3.0, 5.0], 3);
        assert_eq!(out.upper[2], 7.0);
        assert_eq!(out.lower[2], 3.0);
        assert_eq!(out.middle[2], 5.0);
    }

    #[test]
    fn flat_prices_have_zero_historical_volatility() {
        let out = historical_volatility(&[50.0; 30], 20);
        assert!(out[19].is_nan());
        assert_eq!(out[20], 0.0);
    }
}
