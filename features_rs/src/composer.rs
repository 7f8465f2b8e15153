//! Feature Composer.
//!
//! Runs the indicator library and the pattern detector over one price series
//! and adds the price, volume, lag, rolling, calendar and composite groups.
//! Every column except the targets is causal: the value at bar `t` only
//! reads bars `..=t`.

use std::collections::HashMap;
use std::f64::consts::TAU;

use chrono::{Datelike, NaiveDate};
use gainsmith_rs::config::DEFAULT_MIN_HISTORY;
use gainsmith_rs::{EngineConfig, FeatureError, FeatureResult, PriceSeries, TargetConfig};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::indicators::rolling::{
    divide, pct_change, rolling_apply, rolling_kurt, rolling_max, rolling_mean,
    rolling_min, rolling_skew, rolling_slope, rolling_std, rolling_sum, safe_div, shift,
};
use crate::indicators::{
    ad_line, adx, adx_ewm, aroon, atr, atr_ewm, atr_percent, awesome_oscillator, bollinger, cci,
    chandelier, choppiness_index, cmf, dema, donchian, ease_of_movement, elder_ray, ema,
    fibonacci_retracement, force_index, historical_volatility, hull_ma, ichimoku, keltner, macd,
    mfi, momentum, obv, parabolic_sar, pivot_points, roc, rsi, sma, stochastic, stochastic_rsi,
    supertrend, tema, tsi, ultimate_oscillator, volume_oscillator, vwap, vwma, williams_r, wma,
};
use crate::patterns::{BEARISH_SCORE, BULLISH_SCORE, PATTERN_SCORE, PatternSet, detect_patterns};
use crate::schema::{
    DATE_FEATURES, LAG_SOURCES, LAGS, PATTERN_SCORE_LAGS, ROLLING_WINDOWS, feature_schema,
    lag_name, pattern_column, target_columns, validate,
};
use crate::table::FeatureTable;

/// Denominator offset for the shadow, z-score and 20-day position ratios.
const RATIO_EPS: f64 = 0.0001;
const VOLUME_SPIKE_RATIO: f64 = 2.5;
const YEAR_BARS: usize = 252;

/// Named columns produced by one group, keyed by schema name.
#[derive(Debug, Default)]
struct ColumnSet {
    columns: HashMap<String, Vec<f64>>,
}

impl ColumnSet {
    fn put(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    fn get(&self, name: &str) -> FeatureResult<&[f64]> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| FeatureError::MissingFeature(name.to_string()))
    }

    fn take(&mut self, name: &str) -> FeatureResult<Vec<f64>> {
        self.columns
            .remove(name)
            .ok_or_else(|| FeatureError::MissingFeature(name.to_string()))
    }

    fn merge(&mut self, other: ColumnSet) {
        self.columns.extend(other.columns);
    }
}

/// Compute the feature table with the default [`EngineConfig`].
pub fn compute_features(series: &PriceSeries, include_target: bool) -> FeatureResult<FeatureTable> {
    compute_features_with_config(series, include_target, &EngineConfig::default())
}

/// Compute every feature column for `series`.
///
/// Returns [`FeatureError::InsufficientData`] when the series is shorter than
/// `config.min_history`, or than [`DEFAULT_MIN_HISTORY`] when the config asks
/// for less; a partially populated table is never returned.
/// Target columns are appended only when `include_target` is set.
pub fn compute_features_with_config(
    series: &PriceSeries,
    include_target: bool,
    config: &EngineConfig,
) -> FeatureResult<FeatureTable> {
    let rows = series.len();
    // The 52-week window needs a full year before any row is complete.
    let required = config.min_history.max(DEFAULT_MIN_HISTORY);
    if rows < required {
        return Err(FeatureError::InsufficientData { rows, required });
    }

    let mut columns = if config.parallel {
        let ((indicators, patterns), (price, volume)) = rayon::join(
            || rayon::join(|| indicator_features(series), || pattern_features(series)),
            || rayon::join(|| price_features(series), || volume_features(series)),
        );
        let mut merged = indicators;
        merged.merge(patterns);
        merged.merge(price);
        merged.merge(volume);
        merged
    } else {
        let mut merged = indicator_features(series);
        merged.merge(pattern_features(series));
        merged.merge(price_features(series));
        merged.merge(volume_features(series));
        merged
    };

    let lags = lag_features(series, &columns)?;
    let rolling = rolling_features(series, &columns)?;
    let composite = composite_features(&columns)?;
    columns.merge(lags);
    columns.merge(rolling);
    columns.merge(composite);
    columns.merge(date_features(series.timestamps()));

    let mut names: Vec<String> = feature_schema().to_vec();
    if include_target {
        columns.merge(target_features(series.close(), &config.target));
        names.extend(target_columns().iter().cloned());
    }

    let values = names
        .iter()
        .map(|name| columns.take(name))
        .collect::<FeatureResult<Vec<_>>>()?;
    let table = FeatureTable::new(series.timestamps().to_vec(), names, values)?;

    let report = validate(&table);
    for warning in report.warnings() {
        debug!(
            column = %warning.column,
            kind = ?warning.kind,
            count = warning.count,
            "Non-finite values in derived column"
        );
    }
    debug!(
        rows = table.len(),
        columns = table.width(),
        targets = include_target,
        "Feature table computed"
    );
    Ok(table)
}

/// Compute features for many instruments. Each instrument gets its own
/// result so one short history does not fail the batch.
pub fn compute_features_batch(
    instruments: &[(String, PriceSeries)],
    include_target: bool,
    config: &EngineConfig,
) -> Vec<(String, FeatureResult<FeatureTable>)> {
    let compute = |(symbol, series): &(String, PriceSeries)| {
        let result = compute_features_with_config(series, include_target, config);
        if let Err(err) = &result {
            if err.is_recoverable() {
                warn!(symbol = %symbol, error = %err, "Skipping instrument");
            } else {
                warn!(symbol = %symbol, error = %err, "Feature computation failed");
            }
        }
        (symbol.clone(), result)
    };
    let results: Vec<_> = if config.parallel {
        instruments.par_iter().map(compute).collect()
    } else {
        instruments.iter().map(compute).collect()
    };
    let computed = results.iter().filter(|(_, result)| result.is_ok()).count();
    info!(
        instruments = results.len(),
        computed,
        skipped = results.len() - computed,
        "Batch feature computation finished"
    );
    results
}

// ---------------------------------------------------------------------------
// Elementwise helpers

fn map1(values: &[f64], f: impl Fn(f64) -> f64) -> Vec<f64> {
    values.iter().map(|v| f(*v)).collect()
}

fn map2(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect()
}

#[inline]
fn flag(cond: bool) -> f64 {
    if cond { 1.0 } else { 0.0 }
}

/// 0/1 flag, NaN where the input is undefined.
fn flag_if(values: &[f64], pred: impl Fn(f64) -> bool) -> Vec<f64> {
    map1(values, |v| if v.is_finite() { flag(pred(v)) } else { f64::NAN })
}

fn flag_if2(a: &[f64], b: &[f64], pred: impl Fn(f64, f64) -> bool) -> Vec<f64> {
    map2(a, b, |x, y| {
        if x.is_finite() && y.is_finite() {
            flag(pred(x, y))
        } else {
            f64::NAN
        }
    })
}

/// `(value - reference) / reference * 100`.
fn percent_from(value: &[f64], reference: &[f64]) -> Vec<f64> {
    map2(value, reference, |v, r| safe_div(v - r, r) * 100.0)
}

fn scaled(values: &[f64], factor: f64) -> Vec<f64> {
    map1(values, |v| v * factor)
}

// ---------------------------------------------------------------------------
// Price and momentum

fn price_features(series: &PriceSeries) -> ColumnSet {
    let (open, high, low, close) = (series.open(), series.high(), series.low(), series.close());
    let mut out = ColumnSet::default();

    let r1 = pct_change(close, 1);
    let r5 = pct_change(close, 5);
    let r10 = pct_change(close, 10);
    let r20 = pct_change(close, 20);
    out.put("return_2d", pct_change(close, 2));
    out.put("log_return", map1(&divide(close, &shift(close, 1)), f64::ln));
    out.put("log_return_5d", map1(&divide(close, &shift(close, 5)), f64::ln));

    out.put("high_low_ratio", divide(high, low));
    out.put("close_open_ratio", divide(close, open));
    out.put("high_close_ratio", divide(high, close));
    out.put("low_close_ratio", divide(low, close));

    let body = map2(close, open, |c, o| (c - o).abs());
    let body_top = map2(open, close, f64::max);
    let body_bottom = map2(open, close, f64::min);
    let upper_shadow = map2(high, &body_top, |h, t| h - t);
    let lower_shadow = map2(&body_bottom, low, |b, l| b - l);
    out.put("body_pct", scaled(&divide(&body, close), 100.0));
    out.put(
        "shadow_ratio",
        map2(&upper_shadow, &lower_shadow, |u, l| u / (l + RATIO_EPS)),
    );
    out.put("body", body);
    out.put("upper_shadow", upper_shadow);
    out.put("lower_shadow", lower_shadow);

    let range = map2(high, low, |h, l| h - l);
    out.put("range_pct", scaled(&divide(&range, close), 100.0));
    out.put("intraday_range", scaled(&divide(&range, open), 100.0));
    out.put("range", range);

    let prev_close = shift(close, 1);
    let gap = map2(open, &prev_close, |o, p| o - p);
    out.put("gap_pct", scaled(&divide(&gap, &prev_close), 100.0));
    out.put("gap", gap);

    let high_20 = rolling_max(high, 20);
    let low_20 = rolling_min(low, 20);
    out.put("dist_from_high", map2(&high_20, close, |h, c| safe_div(h - c, h) * 100.0));
    out.put("dist_from_low", percent_from(close, &low_20));
    out.put(
        "price_position",
        close
            .iter()
            .zip(&high_20)
            .zip(&low_20)
            .map(|((c, h), l)| (c - l) / (h - l + RATIO_EPS))
            .collect(),
    );

    out.put("price_vs_sma20", percent_from(close, &sma(close, 20)));
    out.put("price_vs_sma50", percent_from(close, &sma(close, 50)));
    out.put("price_vs_sma200", percent_from(close, &sma(close, 200)));

    let high_52w = rolling_max(high, YEAR_BARS);
    let low_52w = rolling_min(low, YEAR_BARS);
    out.put(
        "distance_52w_high",
        map2(&high_52w, close, |h, c| safe_div(h - c, h) * 100.0),
    );
    out.put("distance_52w_low", percent_from(close, &low_52w));
    out.put(
        "price_position_52w",
        close
            .iter()
            .zip(&high_52w)
            .zip(&low_52w)
            .map(|((c, h), l)| safe_div(c - l, h - l))
            .collect(),
    );

    out.put(
        "momentum_score",
        r1.iter()
            .zip(&r5)
            .zip(&r10)
            .map(|((a, b), c)| (0.4 * a + 0.35 * b + 0.25 * c) * 100.0)
            .collect(),
    );
    out.put("acceleration", map2(&r5, &r20, |s, l| (s - l) * 100.0));

    out.put("return_1d", r1);
    out.put("return_5d", r5);
    out.put("return_10d", r10);
    out.put("return_20d", r20);
    out
}

// ---------------------------------------------------------------------------
// Volume

fn volume_features(series: &PriceSeries) -> ColumnSet {
    let (open, high, low, close, volume) = (
        series.open(),
        series.high(),
        series.low(),
        series.close(),
        series.volume(),
    );
    let mut out = ColumnSet::default();

    out.put("volume_change", pct_change(volume, 1));
    out.put("volume_change_5d", pct_change(volume, 5));

    let ma5 = rolling_mean(volume, 5);
    let ma10 = rolling_mean(volume, 10);
    let ma20 = rolling_mean(volume, 20);
    out.put("volume_ratio_5", divide(volume, &ma5));
    out.put("volume_ratio_10", divide(volume, &ma10));
    let ratio_20 = divide(volume, &ma20);
    out.put("volume_trend", divide(&ma5, &ma20));

    let pv = map2(close, volume, |c, v| c * v);
    out.put("pv_trend_ma", rolling_mean(&pv, 10));
    out.put("pv_trend", pv);

    let std20 = rolling_std(volume, 20);
    out.put(
        "volume_zscore",
        volume
            .iter()
            .zip(&ma20)
            .zip(&std20)
            .map(|((v, m), s)| (v - m) / (s + RATIO_EPS))
            .collect(),
    );

    let split = |up: bool| -> Vec<f64> {
        open.iter()
            .zip(close)
            .zip(volume)
            .map(|((o, c), v)| {
                if !(o.is_finite() && c.is_finite()) {
                    f64::NAN
                } else if (up && c > o) || (!up && c < o) {
                    *v
                } else {
                    0.0
                }
            })
            .collect()
    };
    let up_volume = split(true);
    let down_volume = split(false);
    out.put(
        "up_down_volume_ratio",
        map2(
            &rolling_sum(&up_volume, 10),
            &rolling_sum(&down_volume, 10),
            |u, d| u / (d + 1.0),
        ),
    );
    out.put("up_volume", up_volume);
    out.put("down_volume", down_volume);

    out.put("obv_change", scaled(&pct_change(&obv(close, volume), 20), 100.0));
    out.put("volume_slope_20", divide(&rolling_slope(volume, 20), &ma20));
    out.put("vwap_distance", percent_from(close, &vwap(high, low, close, volume)));
    out.put("volume_spike", flag_if(&ratio_20, |r| r > VOLUME_SPIKE_RATIO));

    out.put("volume_ma_5", ma5);
    out.put("volume_ma_10", ma10);
    out.put("volume_ma_20", ma20);
    out.put("volume_ratio_20", ratio_20);
    out
}

// ---------------------------------------------------------------------------
// Indicators

fn indicator_features(series: &PriceSeries) -> ColumnSet {
    let (high, low, close, volume) = (series.high(), series.low(), series.close(), series.volume());
    let len = close.len();
    let mut out = ColumnSet::default();

    let sma5 = sma(close, 5);
    let sma20 = sma(close, 20);
    let sma50 = sma(close, 50);
    let sma200 = sma(close, 200);
    let ema9 = ema(close, 9);
    let ema21 = ema(close, 21);
    out.put("sma_5_20_cross", flag_if2(&sma5, &sma20, |a, b| a > b));
    out.put("sma_20_50_cross", flag_if2(&sma20, &sma50, |a, b| a > b));
    out.put("sma_50_200_cross", flag_if2(&sma50, &sma200, |a, b| a > b));
    out.put("ema_9_21_cross", flag_if2(&ema9, &ema21, |a, b| a > b));
    out.put("sma_5", sma5);
    out.put("sma_10", sma(close, 10));
    out.put("sma_20", sma20);
    out.put("sma_50", sma50);
    out.put("sma_200", sma200);
    out.put("ema_9", ema9);
    out.put("ema_12", ema(close, 12));
    out.put("ema_21", ema21);
    out.put("ema_26", ema(close, 26));
    out.put("wma_20", wma(close, 20));
    out.put("dema_20", dema(close, 20));
    out.put("tema_20", tema(close, 20));
    out.put("hull_20", hull_ma(close, 20));
    out.put("vwma_20", vwma(close, volume, 20));

    let lines = macd(close, 12, 26, 9);
    out.put("macd_cross", flag_if2(&lines.macd, &lines.signal, |m, s| m > s));
    out.put("macd", lines.macd);
    out.put("macd_signal", lines.signal);
    out.put("macd_histogram", lines.histogram);

    let rsi14 = rsi(close, 14);
    let close_5 = shift(close, 5);
    let rsi14_5 = shift(&rsi14, 5);
    let divergence = |bullish: bool| -> Vec<f64> {
        (0..len)
            .map(|i| {
                let (c, c5, r, r5) = (close[i], close_5[i], rsi14[i], rsi14_5[i]);
                if ![c, c5, r, r5].iter().all(|v| v.is_finite()) {
                    f64::NAN
                } else if bullish {
                    flag(c < c5 && r > r5)
                } else {
                    flag(c > c5 && r < r5)
                }
            })
            .collect()
    };
    out.put("rsi_bullish_div", divergence(true));
    out.put("rsi_bearish_div", divergence(false));
    out.put("rsi_oversold", flag_if(&rsi14, |r| r < 30.0));
    out.put("rsi_overbought", flag_if(&rsi14, |r| r > 70.0));
    out.put("rsi_7", rsi(close, 7));
    out.put("rsi_21", rsi(close, 21));

    let stoch = stochastic(high, low, close, 14, 3, 3);
    out.put("stoch_cross", flag_if2(&stoch.k, &stoch.d, |k, d| k > d));
    out.put("stoch_oversold", flag_if(&stoch.k, |k| k < 20.0));
    out.put("stoch_overbought", flag_if(&stoch.k, |k| k > 80.0));
    out.put("stoch_k", stoch.k);
    out.put("stoch_d", stoch.d);
    let stoch_rsi = stochastic_rsi(close, 14, 14, 3, 3);
    out.put("stoch_rsi_k", stoch_rsi.k);
    out.put("stoch_rsi_d", stoch_rsi.d);
    out.put("rsi_14", rsi14);

    let trend = adx(high, low, close, 14);
    out.put("adx_strong_trend", flag_if(&trend.adx, |a| a > 25.0));
    out.put("adx_bullish", flag_if2(&trend.plus_di, &trend.minus_di, |p, m| p > m));
    out.put("adx", trend.adx);
    out.put("adx_plus_di", trend.plus_di);
    out.put("adx_minus_di", trend.minus_di);
    out.put("adx_ewm", adx_ewm(high, low, close, 14).adx);

    let bands = bollinger(close, 20, 2.0);
    out.put(
        "bb_squeeze",
        flag_if2(&bands.bandwidth, &rolling_mean(&bands.bandwidth, 50), |b, m| b < m),
    );
    out.put("bb_upper", bands.upper);
    out.put("bb_middle", bands.middle);
    out.put("bb_lower", bands.lower);
    out.put("bb_bandwidth", bands.bandwidth);
    out.put("bb_percent_b", bands.percent_b);

    let atr14 = atr(high, low, close, 14);
    out.put("atr_percent", atr_percent(&atr14, close));
    out.put("atr_ma_ratio", divide(&atr14, &rolling_mean(&atr14, 20)));
    out.put("atr_ewm_percent", atr_percent(&atr_ewm(high, low, close, 14), close));
    out.put("atr", atr14);

    let kc = keltner(high, low, close, 20, 10, 2.0);
    out.put("kc_upper", kc.upper);
    out.put("kc_middle", kc.middle);
    out.put("kc_lower", kc.lower);
    let dc = donchian(high, low, 20);
    out.put("dc_upper", dc.upper);
    out.put("dc_middle", dc.middle);
    out.put("dc_lower", dc.lower);
    let exits = chandelier(high, low, close, 22, 3.0);
    out.put("chandelier_long", exits.long_exit);
    out.put("chandelier_short", exits.short_exit);
    out.put("hist_volatility", historical_volatility(close, 20));

    out.put("williams_r", williams_r(high, low, close, 14));
    let cci20 = cci(high, low, close, 20);
    out.put("cci_oversold", flag_if(&cci20, |c| c < -100.0));
    out.put("cci_overbought", flag_if(&cci20, |c| c > 100.0));
    out.put("cci", cci20);
    out.put("roc", roc(close, 12));
    out.put("momentum", momentum(close, 10));
    out.put("tsi", tsi(close, 25, 13));
    out.put("ao", awesome_oscillator(high, low));
    out.put("uo", ultimate_oscillator(high, low, close, 7, 14, 28));

    let mfi14 = mfi(high, low, close, volume, 14);
    out.put("mfi_oversold", flag_if(&mfi14, |m| m < 20.0));
    out.put("mfi_overbought", flag_if(&mfi14, |m| m > 80.0));
    out.put("mfi", mfi14);
    let obv_line = obv(close, volume);
    let obv_ma = rolling_mean(&obv_line, 20);
    out.put("obv_trend", flag_if2(&obv_line, &obv_ma, |o, m| o > m));
    out.put("obv", obv_line);
    out.put("obv_ma", obv_ma);
    out.put("ad_line", ad_line(high, low, close, volume));
    let cmf20 = cmf(high, low, close, volume, 20);
    out.put("cmf_bullish", flag_if(&cmf20, |c| c > 0.0));
    out.put("cmf", cmf20);
    out.put("force_index", force_index(close, volume, 13));
    out.put("eom", ease_of_movement(high, low, volume, 14));
    out.put("volume_osc", volume_oscillator(volume, 5, 20));
    out.put("vwap", vwap(high, low, close, volume));

    let aroon_lines = aroon(high, low, 25);
    out.put(
        "aroon_bullish",
        flag_if2(&aroon_lines.up, &aroon_lines.down, |u, d| u > d),
    );
    out.put("aroon_up", aroon_lines.up);
    out.put("aroon_down", aroon_lines.down);
    out.put("aroon_osc", aroon_lines.oscillator);
    let chop = choppiness_index(high, low, close, 14);
    out.put("choppy_market", flag_if(&chop, |c| c > 61.8));
    out.put("choppiness", chop);
    let elder = elder_ray(high, low, close, 13);
    out.put("bull_power", elder.bull_power);
    out.put("bear_power", elder.bear_power);

    let sar = parabolic_sar(high, low, close, 0.02, 0.02, 0.2).sar;
    out.put("close_above_psar", flag_if2(close, &sar, |c, s| c > s));
    out.put("psar", sar);
    let st = supertrend(high, low, close, 10, 3.0);
    out.put("supertrend", st.value);
    out.put("supertrend_direction", st.direction);

    let cloud = ichimoku(high, low, 9, 26, 52);
    out.put(
        "ichimoku_cloud_bullish",
        flag_if2(&cloud.span_a, &cloud.span_b, |a, b| a > b),
    );
    out.put("price_above_cloud", flag_if2(close, &cloud.span_a, |c, a| c > a));
    out.put("ichimoku_tenkan", cloud.tenkan);
    out.put("ichimoku_kijun", cloud.kijun);
    out.put("ichimoku_senkou_a", cloud.span_a);
    out.put("ichimoku_senkou_b", cloud.span_b);

    let retracement = fibonacci_retracement(high, low, 100);
    for (name, ratio) in [("fib_382", 0.382), ("fib_500", 0.5), ("fib_618", 0.618)] {
        let level = retracement
            .level(ratio)
            .map_or_else(|| vec![f64::NAN; len], <[f64]>::to_vec);
        out.put(name, level);
    }

    let pivots = pivot_points(high, low, close);
    out.put("pivot", pivots.pivot);
    out.put("pivot_r1", pivots.r1);
    out.put("pivot_s1", pivots.s1);
    out.put("pivot_r2", pivots.r2);
    out.put("pivot_s2", pivots.s2);
    out
}

// ---------------------------------------------------------------------------
// Patterns, lags and rolling statistics

fn pattern_features(series: &PriceSeries) -> ColumnSet {
    let set = detect_patterns(series);
    let mut out = ColumnSet::default();
    for (name, flags) in set.iter() {
        out.put(pattern_column(name), flags.to_vec());
    }
    let PatternSet {
        bullish_score,
        bearish_score,
        score,
        ..
    } = set;
    out.put(BULLISH_SCORE, bullish_score);
    out.put(BEARISH_SCORE, bearish_score);
    out.put(PATTERN_SCORE, score);
    out
}

fn lag_features(series: &PriceSeries, computed: &ColumnSet) -> FeatureResult<ColumnSet> {
    let mut out = ColumnSet::default();
    for source in LAG_SOURCES {
        let values = match *source {
            "close" => series.close(),
            "volume" => series.volume(),
            derived => computed.get(derived)?,
        };
        for lag in LAGS {
            out.put(lag_name(source, *lag), shift(values, *lag));
        }
    }
    let score = computed.get(PATTERN_SCORE)?;
    for lag in PATTERN_SCORE_LAGS {
        out.put(lag_name(PATTERN_SCORE, *lag), shift(score, *lag));
    }
    Ok(out)
}

/// Bars since `resets` last held. The first bar is 0; an undefined return
/// keeps the run going.
pub(crate) fn streak(returns: &[f64], resets: impl Fn(f64) -> bool) -> Vec<f64> {
    let mut run = 0.0;
    returns
        .iter()
        .enumerate()
        .map(|(idx, &r)| {
            run = if idx == 0 || resets(r) { 0.0 } else { run + 1.0 };
            run
        })
        .collect()
}

fn rolling_features(series: &PriceSeries, computed: &ColumnSet) -> FeatureResult<ColumnSet> {
    let returns = computed.get("return_1d")?;
    let (high, low) = (series.high(), series.low());
    let mut out = ColumnSet::default();
    for window in ROLLING_WINDOWS.iter().copied() {
        out.put(format!("return_mean_{window}"), rolling_mean(returns, window));
        out.put(format!("return_std_{window}"), rolling_std(returns, window));
        out.put(format!("return_skew_{window}"), rolling_skew(returns, window));
        out.put(format!("return_kurt_{window}"), rolling_kurt(returns, window));
        let high_max = rolling_max(high, window);
        let low_min = rolling_min(low, window);
        out.put(format!("range_{window}"), map2(&high_max, &low_min, |h, l| h - l));
        out.put(format!("high_max_{window}"), high_max);
        out.put(format!("low_min_{window}"), low_min);
        out.put(
            format!("cumulative_return_{window}"),
            rolling_apply(returns, window, |w| {
                w.iter().map(|r| 1.0 + r).product::<f64>() - 1.0
            }),
        );
    }
    out.put("up_streak", streak(returns, |r| r <= 0.0));
    out.put("down_streak", streak(returns, |r| r >= 0.0));
    Ok(out)
}

// ---------------------------------------------------------------------------
// Calendar

/// Calendar values for one bar, in [`DATE_FEATURES`] order.
pub(crate) fn date_row(date: NaiveDate) -> [f64; 15] {
    let day_of_week = date.weekday().num_days_from_monday() as f64;
    let month = date.month();
    let quarter = (month - 1) / 3 + 1;
    let month_end = date
        .succ_opt()
        .is_none_or(|next| next.month() != month);
    let month_start = date.day() == 1;
    let quarter_month = |offset: u32| (month - 1) % 3 == offset;
    let (m, q) = (month as f64, quarter as f64);
    [
        day_of_week,
        date.day() as f64,
        date.iso_week().week() as f64,
        m,
        q,
        (TAU * day_of_week / 7.0).sin(),
        (TAU * day_of_week / 7.0).cos(),
        (TAU * m / 12.0).sin(),
        (TAU * m / 12.0).cos(),
        (TAU * q / 4.0).sin(),
        (TAU * q / 4.0).cos(),
        flag(month_start),
        flag(month_end),
        flag(month_start && quarter_month(0)),
        flag(month_end && quarter_month(2)),
    ]
}

fn date_features(timestamps: &[NaiveDate]) -> ColumnSet {
    let mut columns = vec![Vec::with_capacity(timestamps.len()); DATE_FEATURES.len()];
    for date in timestamps {
        for (column, value) in columns.iter_mut().zip(date_row(*date)) {
            column.push(value);
        }
    }
    let mut out = ColumnSet::default();
    for (name, values) in DATE_FEATURES.iter().zip(columns) {
        out.put(*name, values);
    }
    out
}

// ---------------------------------------------------------------------------
// Composite scores. An undefined input fails its comparison and adds 0.

fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub(crate) fn trend_strength(vs_sma20: f64, vs_sma50: f64, vs_sma200: f64) -> f64 {
    sign(vs_sma20) + sign(vs_sma50) + sign(vs_sma200)
}

pub(crate) fn reversal_signal(rsi14: f64, volume_spike: f64, position_52w: f64) -> f64 {
    2.0 * flag(rsi14 < 30.0)
        + flag(rsi14 < 20.0)
        + flag(volume_spike == 1.0)
        + flag(position_52w < 0.2)
}

pub(crate) fn breakout_score(
    distance_52w_high: f64,
    volume_ratio_10: f64,
    rsi14: f64,
    macd_histogram: f64,
) -> f64 {
    2.0 * flag(distance_52w_high < 5.0)
        + flag(volume_ratio_10 > 1.5)
        + flag(rsi14 > 55.0 && rsi14 < 75.0)
        + flag(macd_histogram > 0.0)
}

fn composite_features(computed: &ColumnSet) -> FeatureResult<ColumnSet> {
    let vs20 = computed.get("price_vs_sma20")?;
    let vs50 = computed.get("price_vs_sma50")?;
    let vs200 = computed.get("price_vs_sma200")?;
    let rsi14 = computed.get("rsi_14")?;
    let spike = computed.get("volume_spike")?;
    let position = computed.get("price_position_52w")?;
    let distance = computed.get("distance_52w_high")?;
    let volume_ratio = computed.get("volume_ratio_10")?;
    let histogram = computed.get("macd_histogram")?;

    let len = rsi14.len();
    let mut out = ColumnSet::default();
    out.put(
        "trend_strength",
        (0..len).map(|i| trend_strength(vs20[i], vs50[i], vs200[i])).collect(),
    );
    out.put(
        "reversal_signal",
        (0..len)
            .map(|i| reversal_signal(rsi14[i], spike[i], position[i]))
            .collect(),
    );
    out.put(
        "breakout_score",
        (0..len)
            .map(|i| breakout_score(distance[i], volume_ratio[i], rsi14[i], histogram[i]))
            .collect(),
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Targets: the only columns that read future bars.

fn forward_return(close: &[f64], bars: usize) -> Vec<f64> {
    (0..close.len())
        .map(|idx| match close.get(idx + bars) {
            Some(&future) => safe_div(future, close[idx]) - 1.0,
            None => f64::NAN,
        })
        .collect()
}

fn target_features(close: &[f64], target: &TargetConfig) -> ColumnSet {
    let mut out = ColumnSet::default();
    let threshold = target.gain_threshold;
    out.put(
        "target",
        flag_if(&forward_return(close, target.horizon), |r| r >= threshold),
    );
    for bars in [1usize, 3, 5] {
        out.put(
            format!("target_up_{bars}d"),
            flag_if(&forward_return(close, bars), |r| r > 0.0),
        );
    }
    out.put("target_return_1d", forward_return(close, 1));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaks_count_bars_since_reset() {
        let returns = [f64::NAN, 0.01, 0.02, -0.01, f64::NAN, 0.03, 0.0, -0.02, -0.01];
        assert_eq!(
            streak(&returns, |r| r <= 0.0),
            vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0]
        );
        assert_eq!(
            streak(&returns, |r| r >= 0.0),
            vec![0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 1.0, 2.0]
        );
    }

    #[test]
    fn calendar_flags_follow_the_calendar() {
        let q_end = date_row(NaiveDate::from_ymd_opt(2024, 3, 31).expect("date"));
        assert_eq!(q_end[0], 6.0); // Sunday
        assert_eq!(q_end[3], 3.0);
        assert_eq!(q_end[4], 1.0);
        assert_eq!(&q_end[11..], &[0.0, 1.0, 0.0, 1.0]);

        let q_start = date_row(NaiveDate::from_ymd_opt(2024, 4, 1).expect("date"));
        assert_eq!(q_start[0], 0.0);
        assert_eq!(q_start[4], 2.0);
        assert_eq!(&q_start[11..], &[1.0, 0.0, 1.0, 0.0]);

        let leap = date_row(NaiveDate::from_ymd_opt(2024, 2, 29).expect("date"));
        assert_eq!(&leap[11..], &[0.0, 1.0, 0.0, 0.0]);

        let new_year = date_row(NaiveDate::from_ymd_opt(2021, 1, 1).expect("date"));
        // ISO week 53 of 2020.
        assert_eq!(new_year[2], 53.0);
        assert!((new_year[5] - (TAU * 4.0 / 7.0).sin()).abs() < 1e-12);
        assert_eq!(DATE_FEATURES.len(), new_year.len());
    }

    #[test]
    fn composite_weights() {
        assert_eq!(trend_strength(1.5, -0.2, 0.0), 0.0);
        assert_eq!(trend_strength(1.0, 2.0, 3.0), 3.0);
        assert_eq!(trend_strength(f64::NAN, -1.0, -1.0), -2.0);

        assert_eq!(reversal_signal(25.0, 0.0, 0.5), 2.0);
        assert_eq!(reversal_signal(15.0, 1.0, 0.1), 5.0);
        assert_eq!(reversal_signal(f64::NAN, f64::NAN, f64::NAN), 0.0);

        assert_eq!(breakout_score(3.0, 2.0, 60.0, 0.1), 5.0);
        assert_eq!(breakout_score(6.0, 1.5, 75.0, -0.1), 0.0);
        assert_eq!(breakout_score(4.9, f64::NAN, 55.5, f64::NAN), 3.0);
    }

    #[test]
    fn targets_are_undefined_without_a_future_bar() {
        let close = [100.0, 106.0, 104.0, 110.0];
        let config = TargetConfig {
            gain_threshold: 0.05,
            horizon: 1,
        };
        let mut targets = target_features(&close, &config);
        let target = targets.take("target").expect("target");
        assert_eq!(&target[..3], &[1.0, 0.0, 1.0]);
        assert!(target[3].is_nan());
        let up_3d = targets.take("target_up_3d").expect("up");
        assert_eq!(up_3d[0], 1.0);
        assert!(up_3d[1].is_nan());
        let ret = targets.take("target_return_1d").expect("return");
        assert!((ret[0] - 0.06).abs() < 1e-12);
    }

    #[test]
    fn missing_inputs_are_named() {
        let err = composite_features(&ColumnSet::default()).expect_err("missing");
        assert!(matches!(err, FeatureError::MissingFeature(name) if name == "price_vs_sma20"));
    }
}
