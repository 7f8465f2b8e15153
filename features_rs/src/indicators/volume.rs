use super::oscillators::typical_price;
use super::rolling::{
    cumulative_sum, divide, ewm_span, rolling_mean, rolling_sum, safe_div, shift,
};

/// On-balance volume. Starts at the first bar's volume and holds on an
/// unchanged close.
pub fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(close.len());
    let mut running = match volume.first() {
        Some(v) => *v,
        None => return out,
    };
    out.push(running);
    for i in 1..close.len() {
        if close[i] > close[i - 1] {
            running += volume[i];
        } else if close[i] < close[i - 1] {
            running -= volume[i];
        }
        out.push(running);
    }
    out
}

// Close location value: +1 at the high, -1 at the low.
fn close_location(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            let clv = safe_div(
                (close[i] - low[i]) - (high[i] - close[i]),
                high[i] - low[i],
            );
            if clv.is_nan() { 0.0 } else { clv }
        })
        .collect()
}

/// Accumulation/distribution line. Bars without range contribute nothing.
pub fn ad_line(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let flow: Vec<f64> = close_location(high, low, close)
        .iter()
        .zip(volume)
        .map(|(clv, v)| clv * v)
        .collect();
    cumulative_sum(&flow)
}

/// Chaikin money flow.
pub fn cmf(high: &[f64], low: &[f64], close: &[f64], volume: &[f64], period: usize) -> Vec<f64> {
    let flow: Vec<f64> = close_location(high, low, close)
        .iter()
        .zip(volume)
        .map(|(clv, v)| clv * v)
        .collect();
    divide(&rolling_sum(&flow, period), &rolling_sum(volume, period))
}

/// Money flow index.
///
/// A window without negative flow reads 100 when it had positive flow and 50
/// when it had none at all.
pub fn mfi(high: &[f64], low: &[f64], close: &[f64], volume: &[f64], period: usize) -> Vec<f64> {
    let tp = typical_price(high, low, close);
    let prev = shift(&tp, 1);
    let mut positive = vec![0.0; tp.len()];
    let mut negative = vec![0.0; tp.len()];
    for i in 0..tp.len() {
        let flow = tp[i] * volume[i];
        if tp[i] > prev[i] {
            positive[i] = flow;
        } else if tp[i] < prev[i] {
            negative[i] = flow;
        }
    }
    let pos = rolling_sum(&positive, period);
    let neg = rolling_sum(&negative, period);
    pos.iter()
        .zip(&neg)
        .map(|(p, n)| {
            if !p.is_finite() || !n.is_finite() {
                f64::NAN
            } else if *n == 0.0 {
                if *p > 0.0 { 100.0 } else { 50.0 }
            } else {
                100.0 - 100.0 / (1.0 + p / n)
            }
        })
        .collect()
}

/// Cumulative volume-weighted typical price since the first bar.
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let weighted: Vec<f64> = typical_price(high, low, close)
        .iter()
        .zip(volume)
        .map(|(tp, v)| tp * v)
        .collect();
    divide(&cumulative_sum(&weighted), &cumulative_sum(volume))
}

pub fn force_index(close: &[f64], volume: &[f64], period: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..close.len())
        .map(|i| {
            if i == 0 {
                f64::NAN
            } else {
                (close[i] - close[i - 1]) * volume[i]
            }
        })
        .collect();
    ewm_span(&raw, period)
}

/// Ease of movement: midpoint move per unit of volume over range, averaged
/// over `period`. Zero-volume bars are undefined.
pub fn ease_of_movement(high: &[f64], low: &[f64], volume: &[f64], period: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..high.len())
        .map(|i| {
            if i == 0 {
                return f64::NAN;
            }
            let distance = (high[i] + low[i]) / 2.0 - (high[i - 1] + low[i - 1]) / 2.0;
            safe_div(distance * (high[i] - low[i]), volume[i])
        })
        .collect();
    rolling_mean(&raw, period)
}

/// Percentage spread between a fast and a slow exponential volume average.
pub fn volume_oscillator(volume: &[f64], short_period: usize, long_period: usize) -> Vec<f64> {
    let fast = ewm_span(volume, short_period);
    let slow = ewm_span(volume, long_period);
    (0..volume.len())
        .map(|i| 100.0 * safe_div(fast[i] - slow[i], slow[i]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obv_holds_on_equal_closes() {
        let out = obv(&[10.0, 11.0, 10.0, 10.0, 12.0], &[100.0; 5]);
        assert_eq!(out, vec![100.0, 200.0, 100.0, 100.0, 200.0]);
    }

    #[test]
    fn obv_of_an_empty_series_is_empty() {
        assert!(obv(&[], &[]).is_empty());
    }

    #[test]
    fn ad_line_ignores_bars_without_range() {
        let high = [10.0, 11.0, 12.0];
        let low = [8.0, 11.0, 10.0];
        let close = [10.0, 11.0, 10.0];
        let out = ad_line(&high, &low, &close, &[100.0, 50.0, 10.0]);
        assert_eq!(out, vec![100.0, 100.0, 90.0]);
    }

    #[test]
    fn mfi_guards_one_sided_windows() {
        let rising: Vec<f64> = (0..20).map(|v| 10.0 + v as f64).collect();
        let out = mfi(&rising, &rising, &rising, &[1000.0; 20], 14);
        assert!(out[12].is_nan());
        assert_eq!(out[14], 100.0);

        let flat = vec![10.0; 20];
        let out = mfi(&flat, &flat, &flat, &[1000.0; 20], 14);
        assert_eq!(out[19], 50.0);
    }

    #[test]
    fn cmf_is_positive_when_closing_near_highs() {
        let high: Vec<f64> = (0..25).map(|v| 11.0 + v as f64).collect();
        let low: Vec<f64> = high.iter().map(|h| h - 2.0).collect();
        let close: Vec<f64> = high.iter().map(|h| h - 0.2).collect();
        let out = cmf(&high, &low, &close, &[500.0; 25], 20);
        assert!(out[18].is_nan());
        assert!((out[24] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn vwap_weights_typical_price_by_volume() {
        let out = vwap(&[3.0, 6.0], &[3.0, 6.0], &[3.0, 6.0], &[1.0, 2.0]);
        assert_eq!(out[0], 3.0);
        assert_eq!(out[1], 5.0);
    }

    #[test]
    fn zero_volume_makes_ease_of_movement_undefined() {
        let high = [10.0, 11.0, 12.0];
        let low = [9.0, 10.0, 11.0];
        let out = ease_of_movement(&high, &low, &[100.0, 0.0, 100.0], 1);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn volume_oscillator_is_zero_for_constant_volume() {
        let out = volume_oscillator(&[250.0; 30], 5, 20);
        assert!(out.iter().all(|v| v.abs() < 1e-12));
    }
}
