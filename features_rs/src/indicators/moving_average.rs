use super::rolling::{divide, ewm_span, rolling_apply, rolling_mean, rolling_sum};

pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    rolling_mean(values, period)
}

/// Exponential moving average with `alpha = 2 / (period + 1)`, defined from
/// the first finite input onward.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    ewm_span(values, period)
}

/// Linearly weighted mean, newest bar weighted `period`.
pub fn wma(values: &[f64], period: usize) -> Vec<f64> {
    let denom = (period * (period + 1)) as f64 / 2.0;
    rolling_apply(values, period, |w| {
        w.iter()
            .enumerate()
            .map(|(idx, v)| v * (idx + 1) as f64)
            .sum::<f64>()
            / denom
    })
}

pub fn dema(values: &[f64], period: usize) -> Vec<f64> {
    let e1 = ema(values, period);
    let e2 = ema(&e1, period);
    e1.iter().zip(&e2).map(|(a, b)| 2.0 * a - b).collect()
}

pub fn tema(values: &[f64], period: usize) -> Vec<f64> {
    let e1 = ema(values, period);
    let e2 = ema(&e1, period);
    let e3 = ema(&e2, period);
    e1.iter()
        .zip(&e2)
        .zip(&e3)
        .map(|((a, b), c)| 3.0 * a - 3.0 * b + c)
        .collect()
}

/// Hull moving average: `wma(2 * wma(p / 2) - wma(p), floor(sqrt(p)))`.
pub fn hull_ma(values: &[f64], period: usize) -> Vec<f64> {
    let half = wma(values, period / 2);
    let full = wma(values, period);
    let raw: Vec<f64> = half.iter().zip(&full).map(|(h, f)| 2.0 * h - f).collect();
    let smoothing = (period as f64).sqrt().floor() as usize;
    wma(&raw, smoothing)
}

/// Volume-weighted moving average of close.
pub fn vwma(close: &[f64], volume: &[f64], period: usize) -> Vec<f64> {
    let weighted: Vec<f64> = close.iter().zip(volume).map(|(c, v)| c * v).collect();
    divide(&rolling_sum(&weighted, period), &rolling_sum(volume, period))
}

#[derive(Debug, Clone)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(close, fast);
    let slow_ema = ema(close, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema(&line, signal);
    let histogram = line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();
    Macd {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f64> {
        (1..=n).map(|v| v as f64).collect()
    }

    #[test]
    fn sma_is_padded_until_the_window_fills() {
        let close = ramp(30);
        let out = sma(&close, 20);
        assert!(out[..19].iter().all(|v| v.is_nan()));
        assert_eq!(out[19], 10.5);
        assert_eq!(out[29], 20.5);
    }

    #[test]
    fn wma_weights_recent_bars_more() {
        let out = wma(&[1.0, 2.0, 3.0], 3);
        assert!((out[2] - 14.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn dema_and_tema_track_a_constant_exactly() {
        let flat = vec![42.0; 50];
        assert!(dema(&flat, 10).iter().all(|v| (v - 42.0).abs() < 1e-9));
        assert!(tema(&flat, 10).iter().all(|v| (v - 42.0).abs() < 1e-9));
    }

    #[test]
    fn hull_warm_up_covers_both_stages() {
        let out = hull_ma(&ramp(40), 16);
        // wma(16) is defined from index 15, the sqrt stage adds 3 more bars.
        assert!(out[17].is_nan());
        assert!(out[18].is_finite());
        // On a ramp the residual lag is (4 - 1) / 3 - 1 / 3 bars.
        assert!((out[39] - (40.0 - 2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn vwma_weights_by_volume() {
        let out = vwma(&[10.0, 20.0], &[1.0, 3.0], 2);
        assert!((out[1] - 17.5).abs() < 1e-12);
        assert!(vwma(&[10.0, 20.0], &[0.0, 0.0], 2)[1].is_nan());
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let close: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let out = macd(&close, 12, 26, 9);
        for i in 0..close.len() {
            assert!((out.histogram[i] - (out.macd[i] - out.signal[i])).abs() < 1e-12);
        }
        assert_eq!(out.macd[0], 0.0);
    }
}
