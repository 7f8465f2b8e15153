//! Window and smoothing primitives shared by every indicator.
//!
//! All helpers return a vector of the input length. A rolling window is only
//! defined once it is full and every value inside it is finite; otherwise the
//! position is NaN.

pub(crate) fn full_window(values: &[f64], idx: usize, period: usize) -> Option<&[f64]> {
    if period == 0 || idx + 1 < period {
        return None;
    }
    let window = &values[idx + 1 - period..=idx];
    window.iter().all(|v| v.is_finite()).then_some(window)
}

/// Apply `reduce` to every full, finite window.
pub fn rolling_apply<F>(values: &[f64], period: usize, reduce: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    (0..values.len())
        .map(|idx| full_window(values, idx, period).map_or(f64::NAN, &reduce))
        .collect()
}

pub fn rolling_sum(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |w| w.iter().sum())
}

pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    if period < 2 {
        return vec![f64::NAN; values.len()];
    }
    rolling_apply(values, period, |w| {
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        let ss = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
        (ss / (n - 1.0)).sqrt()
    })
}

pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |w| {
        w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Mean absolute deviation from the window mean.
pub fn rolling_mean_abs_dev(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |w| {
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        w.iter().map(|x| (x - mean).abs()).sum::<f64>() / n
    })
}

// Variances this small are treated as a flat window.
const FLAT_VARIANCE: f64 = 1e-14;

/// Bias-corrected sample skewness. Needs at least three observations.
pub fn rolling_skew(values: &[f64], period: usize) -> Vec<f64> {
    if period < 3 {
        return vec![f64::NAN; values.len()];
    }
    rolling_apply(values, period, |w| {
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        let m2 = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        if m2 <= FLAT_VARIANCE {
            return f64::NAN;
        }
        let m3 = w.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / n;
        (n * (n - 1.0)).sqrt() / (n - 2.0) * m3 / m2.powf(1.5)
    })
}

/// Bias-corrected excess kurtosis. Needs at least four observations.
pub fn rolling_kurt(values: &[f64], period: usize) -> Vec<f64> {
    if period < 4 {
        return vec![f64::NAN; values.len()];
    }
    rolling_apply(values, period, |w| {
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        let ss = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
        if ss / n <= FLAT_VARIANCE {
            return f64::NAN;
        }
        let s4 = w.iter().map(|x| (x - mean).powi(4)).sum::<f64>();
        let variance = ss / (n - 1.0);
        let lead = n * (n + 1.0) / ((n - 1.0) * (n - 2.0) * (n - 3.0));
        let tail = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
        lead * s4 / variance.powi(2) - tail
    })
}

/// Least-squares slope of the window against `0..period`.
pub fn rolling_slope(values: &[f64], period: usize) -> Vec<f64> {
    if period < 2 {
        return vec![f64::NAN; values.len()];
    }
    let n = period as f64;
    let x_mean = (n - 1.0) / 2.0;
    let sxx: f64 = (0..period).map(|x| (x as f64 - x_mean).powi(2)).sum();
    rolling_apply(values, period, |w| {
        let y_mean = w.iter().sum::<f64>() / n;
        let sxy: f64 = w
            .iter()
            .enumerate()
            .map(|(x, y)| (x as f64 - x_mean) * (y - y_mean))
            .sum();
        sxy / sxx
    })
}

/// Value `lag` bars earlier; the first `lag` positions are NaN.
pub fn shift(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|idx| if idx < lag { f64::NAN } else { values[idx - lag] })
        .collect()
}

/// `values[t] - values[t - lag]`.
pub fn diff(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|idx| {
            if idx < lag {
                f64::NAN
            } else {
                values[idx] - values[idx - lag]
            }
        })
        .collect()
}

/// Fractional change over `lag` bars.
pub fn pct_change(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|idx| {
            if idx < lag {
                f64::NAN
            } else {
                safe_div(values[idx] - values[idx - lag], values[idx - lag])
            }
        })
        .collect()
}

/// Division that yields NaN instead of infinity for a zero denominator.
#[inline]
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 { f64::NAN } else { num / den }
}

pub fn divide(num: &[f64], den: &[f64]) -> Vec<f64> {
    num.iter().zip(den).map(|(n, d)| safe_div(*n, *d)).collect()
}

/// Exponential smoothing without bias adjustment:
/// `y[t] = alpha * x[t] + (1 - alpha) * y[t - 1]`.
///
/// Seeded with the first finite input. Leading non-finite inputs stay NaN and
/// an interior non-finite input repeats the previous output.
pub fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    let mut prev: Option<f64> = None;
    for (idx, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            if let Some(prev_val) = prev {
                result[idx] = prev_val;
            }
            continue;
        }
        let next = match prev {
            Some(prev_val) => alpha * value + (1.0 - alpha) * prev_val,
            None => value,
        };
        result[idx] = next;
        prev = Some(next);
    }
    result
}

/// [`ewm`] with `alpha = 2 / (span + 1)`.
pub fn ewm_span(values: &[f64], span: usize) -> Vec<f64> {
    if span == 0 {
        return vec![f64::NAN; values.len()];
    }
    ewm(values, 2.0 / (span as f64 + 1.0))
}

/// Bias-adjusted exponential mean: every observation keeps weight
/// `(1 - alpha)^age` and the output is the weighted average. Undefined until
/// `min_periods` finite observations have been seen.
pub fn ewm_adjusted(values: &[f64], alpha: f64, min_periods: usize) -> Vec<f64> {
    let decay = 1.0 - alpha;
    let mut result = vec![f64::NAN; values.len()];
    let mut num = 0.0;
    let mut den = 0.0;
    let mut observed = 0usize;
    for (idx, &value) in values.iter().enumerate() {
        num *= decay;
        den *= decay;
        if value.is_finite() {
            num += value;
            den += 1.0;
            observed += 1;
        }
        if observed >= min_periods.max(1) && den > 0.0 {
            result[idx] = num / den;
        }
    }
    result
}

/// Running sum that leaves non-finite terms out; their own position is NaN.
pub fn cumulative_sum(values: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    values
        .iter()
        .map(|&value| {
            if value.is_finite() {
                total += value;
                total
            } else {
                f64::NAN
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn windows_with_nan_are_undefined() {
        let values = [1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0];
        let mean = rolling_mean(&values, 2);
        assert!(mean[0].is_nan());
        assert!(approx(mean[1], 1.5));
        assert!(mean[2].is_nan());
        assert!(mean[3].is_nan());
        assert!(approx(mean[4], 4.5));
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        let std = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert!(approx(std[7], (32.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn skew_and_kurt_match_known_values() {
        // Reference values from the bias-corrected estimators.
        let values = [1.0, 2.0, 3.0, 4.0, 10.0];
        let skew = rolling_skew(&values, 5);
        let kurt = rolling_kurt(&values, 5);
        assert!((skew[4] - 1.697_056_274_847_714).abs() < 1e-9, "{}", skew[4]);
        assert!((kurt[4] - 3.152).abs() < 1e-9, "{}", kurt[4]);
        assert!(rolling_skew(&[3.0; 5], 5)[4].is_nan());
    }

    #[test]
    fn ewm_seeds_with_first_finite_value_and_holds_gaps() {
        let out = ewm(&[f64::NAN, 10.0, 20.0, f64::NAN, 20.0], 0.5);
        assert!(out[0].is_nan());
        assert!(approx(out[1], 10.0));
        assert!(approx(out[2], 15.0));
        assert!(approx(out[3], 15.0));
        assert!(approx(out[4], 17.5));
    }

    #[test]
    fn adjusted_ewm_weights_all_history() {
        let out = ewm_adjusted(&[1.0, 2.0, 3.0], 0.5, 2);
        assert!(out[0].is_nan());
        assert!(approx(out[1], (2.0 + 0.5) / 1.5));
        assert!(approx(out[2], (3.0 + 1.0 + 0.25) / 1.75));
    }

    #[test]
    fn slope_of_a_line_is_its_gradient() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 * i as f64 + 1.0).collect();
        let slope = rolling_slope(&values, 5);
        assert!(slope[3].is_nan());
        assert!(approx(slope[9], 3.0));
    }

    #[test]
    fn cumulative_sum_skips_missing_terms() {
        let out = cumulative_sum(&[1.0, f64::NAN, 2.0]);
        assert_eq!(out[0], 1.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 3.0);
    }
}
