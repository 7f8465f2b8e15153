//! Candlestick pattern detector.
//!
//! Every pattern is a predicate over the current bar and up to four earlier
//! bars. A predicate that needs bars before the start of the series, or a
//! reference average that is not yet defined, reports "no pattern". Flags are
//! therefore always 0 or 1, never NaN.

use gainsmith_rs::PriceSeries;

use crate::indicators::rolling::rolling_mean;

/// Window of the body and range averages used by relative-size predicates.
const REFERENCE_WINDOW: usize = 20;

/// Direction a pattern votes for in the aggregate scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Bullish,
    Bearish,
    /// Emitted as a flag but not scored.
    Neutral,
}

/// Per-bar candle geometry shared by all predicates.
struct Candles<'a> {
    open: &'a [f64],
    high: &'a [f64],
    low: &'a [f64],
    close: &'a [f64],
    body: Vec<f64>,
    range: Vec<f64>,
    upper: Vec<f64>,
    lower: Vec<f64>,
    avg_body: Vec<f64>,
    avg_range: Vec<f64>,
}

impl<'a> Candles<'a> {
    fn new(open: &'a [f64], high: &'a [f64], low: &'a [f64], close: &'a [f64]) -> Self {
        let len = close.len();
        let mut body = Vec::with_capacity(len);
        let mut range = Vec::with_capacity(len);
        let mut upper = Vec::with_capacity(len);
        let mut lower = Vec::with_capacity(len);
        for i in 0..len {
            body.push((close[i] - open[i]).abs());
            range.push(high[i] - low[i]);
            upper.push(high[i] - open[i].max(close[i]));
            lower.push(open[i].min(close[i]) - low[i]);
        }
        let avg_body = rolling_mean(&body, REFERENCE_WINDOW);
        let avg_range = rolling_mean(&range, REFERENCE_WINDOW);
        Self {
            open,
            high,
            low,
            close,
            body,
            range,
            upper,
            lower,
            avg_body,
            avg_range,
        }
    }

    fn len(&self) -> usize {
        self.close.len()
    }

    fn bull(&self, i: usize) -> bool {
        self.close[i] > self.open[i]
    }

    fn bear(&self, i: usize) -> bool {
        self.close[i] < self.open[i]
    }

    /// Midpoint of the real body.
    fn body_mid(&self, i: usize) -> f64 {
        (self.open[i] + self.close[i]) / 2.0
    }
}

type Predicate = fn(&Candles<'_>, usize) -> Option<bool>;

/// Index `back` bars before `i`, if the series reaches that far.
fn prior(i: usize, back: usize) -> Option<usize> {
    i.checked_sub(back)
}

// ---------------------------------------------------------------------------
// Single candle

fn doji(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.body[i] < c.range[i] * 0.1)
}

fn long_legged_doji(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(
        c.body[i] < c.range[i] * 0.1
            && c.upper[i] > c.range[i] * 0.3
            && c.lower[i] > c.range[i] * 0.3,
    )
}

fn dragonfly_doji(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(
        c.body[i] < c.range[i] * 0.1
            && c.upper[i] < c.range[i] * 0.1
            && c.lower[i] > c.range[i] * 0.6,
    )
}

fn gravestone_doji(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(
        c.body[i] < c.range[i] * 0.1
            && c.lower[i] < c.range[i] * 0.1
            && c.upper[i] > c.range[i] * 0.6,
    )
}

fn hammer(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.lower[i] > c.body[i] * 2.0 && c.upper[i] < c.body[i] * 0.5 && c.body[i] > 0.0)
}

fn inverted_hammer(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.upper[i] > c.body[i] * 2.0 && c.lower[i] < c.body[i] * 0.5 && c.body[i] > 0.0)
}

// The trend context compares the prior close with the close five bars back.
fn trend_context(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.close[prior(i, 1)?] < c.close[prior(i, 5)?])
}

fn hanging_man(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.lower[i] > c.body[i] * 2.0 && c.upper[i] < c.body[i] * 0.5 && trend_context(c, i)?)
}

fn shooting_star(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.upper[i] > c.body[i] * 2.0 && c.lower[i] < c.body[i] * 0.5 && trend_context(c, i)?)
}

fn shaven(c: &Candles<'_>, i: usize) -> bool {
    c.upper[i] < c.range[i] * 0.05 && c.lower[i] < c.range[i] * 0.05
}

fn bullish_marubozu(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.bull(i) && shaven(c, i))
}

fn bearish_marubozu(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.bear(i) && shaven(c, i))
}

fn spinning_top(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(
        c.body[i] < c.range[i] * 0.3
            && c.upper[i] > c.body[i]
            && c.lower[i] > c.body[i]
            && !doji(c, i)?,
    )
}

fn high_wave(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(
        c.body[i] < c.range[i] * 0.2
            && c.upper[i] > c.range[i] * 0.35
            && c.lower[i] > c.range[i] * 0.35,
    )
}

fn bullish_belt_hold(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.bull(i) && c.lower[i] < c.range[i] * 0.05 && c.body[i] > c.avg_body[i] * 1.5)
}

fn bearish_belt_hold(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.bear(i) && c.upper[i] < c.range[i] * 0.05 && c.body[i] > c.avg_body[i] * 1.5)
}

// ---------------------------------------------------------------------------
// Two candles

fn bullish_engulfing(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(
        c.bear(p)
            && c.bull(i)
            && c.open[i] < c.close[p]
            && c.close[i] > c.open[p]
            && c.body[i] > c.body[p],
    )
}

fn bearish_engulfing(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(
        c.bull(p)
            && c.bear(i)
            && c.open[i] > c.close[p]
            && c.close[i] < c.open[p]
            && c.body[i] > c.body[p],
    )
}

fn bullish_harami(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(
        c.bear(p)
            && c.bull(i)
            && c.open[i] > c.close[p]
            && c.close[i] < c.open[p]
            && c.body[i] < c.body[p] * 0.5,
    )
}

fn bearish_harami(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(
        c.bull(p)
            && c.bear(i)
            && c.open[i] < c.close[p]
            && c.close[i] > c.open[p]
            && c.body[i] < c.body[p] * 0.5,
    )
}

fn bullish_harami_cross(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(c.bear(p) && doji(c, i)? && c.high[i] < c.open[p] && c.low[i] > c.close[p])
}

fn bearish_harami_cross(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(c.bull(p) && doji(c, i)? && c.high[i] < c.close[p] && c.low[i] > c.open[p])
}

fn piercing_line(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(
        c.bear(p)
            && c.bull(i)
            && c.open[i] < c.low[p]
            && c.close[i] > c.body_mid(p)
            && c.close[i] < c.open[p],
    )
}

fn dark_cloud_cover(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(
        c.bull(p)
            && c.bear(i)
            && c.open[i] > c.high[p]
            && c.close[i] < c.body_mid(p)
            && c.close[i] > c.open[p],
    )
}

fn tweezer_top(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(c.bull(p) && c.bear(i) && (c.high[i] - c.high[p]).abs() < c.avg_range[i] * 0.05)
}

fn tweezer_bottom(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(c.bear(p) && c.bull(i) && (c.low[i] - c.low[p]).abs() < c.avg_range[i] * 0.05)
}

fn bullish_kicking(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(bearish_marubozu(c, p)? && bullish_marubozu(c, i)? && c.open[i] > c.open[p])
}

fn bearish_kicking(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(bullish_marubozu(c, p)? && bearish_marubozu(c, i)? && c.open[i] < c.open[p])
}

fn bullish_meeting_lines(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(c.bear(p) && c.bull(i) && (c.close[i] - c.close[p]).abs() < c.avg_range[i] * 0.03)
}

fn bearish_meeting_lines(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p = prior(i, 1)?;
    Some(c.bull(p) && c.bear(i) && (c.close[i] - c.close[p]).abs() < c.avg_range[i] * 0.03)
}

// ---------------------------------------------------------------------------
// Three candles

fn morning_star(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bear(p2)
            && c.body[p2] > c.avg_body[i]
            && c.body[p1] < c.avg_body[i] * 0.5
            && c.bull(i)
            && c.close[i] > c.body_mid(p2),
    )
}

fn evening_star(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bull(p2)
            && c.body[p2] > c.avg_body[i]
            && c.body[p1] < c.avg_body[i] * 0.5
            && c.bear(i)
            && c.close[i] < c.body_mid(p2),
    )
}

fn morning_doji_star(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(c.bear(p2) && doji(c, p1)? && c.bull(i) && c.close[i] > c.body_mid(p2))
}

fn evening_doji_star(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(c.bull(p2) && doji(c, p1)? && c.bear(i) && c.close[i] < c.body_mid(p2))
}

fn three_white_soldiers(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bull(i)
            && c.bull(p1)
            && c.bull(p2)
            && c.close[i] > c.close[p1]
            && c.close[p1] > c.close[p2]
            && c.open[i] > c.open[p1]
            && c.open[p1] > c.open[p2]
            && c.upper[i] < c.body[i] * 0.3
            && c.upper[p1] < c.body[p1] * 0.3,
    )
}

fn three_black_crows(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bear(i)
            && c.bear(p1)
            && c.bear(p2)
            && c.close[i] < c.close[p1]
            && c.close[p1] < c.close[p2]
            && c.open[i] < c.open[p1]
            && c.open[p1] < c.open[p2]
            && c.lower[i] < c.body[i] * 0.3
            && c.lower[p1] < c.body[p1] * 0.3,
    )
}

fn three_inside_up(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(bullish_harami(c, p1)? && c.bull(i) && c.close[i] > c.high[p2])
}

fn three_inside_down(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(bearish_harami(c, p1)? && c.bear(i) && c.close[i] < c.low[p2])
}

fn three_outside_up(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p1 = prior(i, 1)?;
    Some(bullish_engulfing(c, p1)? && c.bull(i) && c.close[i] > c.close[p1])
}

fn three_outside_down(c: &Candles<'_>, i: usize) -> Option<bool> {
    let p1 = prior(i, 1)?;
    Some(bearish_engulfing(c, p1)? && c.bear(i) && c.close[i] < c.close[p1])
}

fn bullish_abandoned_baby(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bear(p2)
            && doji(c, p1)?
            && c.low[p1] > c.high[p2]
            && c.bull(i)
            && c.low[i] > c.high[p1],
    )
}

fn bearish_abandoned_baby(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bull(p2)
            && doji(c, p1)?
            && c.high[p1] < c.low[p2]
            && c.bear(i)
            && c.high[i] < c.low[p1],
    )
}

fn three_dojis(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(doji(c, i)? && doji(c, prior(i, 1)?)? && doji(c, prior(i, 2)?)?)
}

fn bullish_tri_star(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(three_dojis(c, i)? && c.low[p1] < c.low[p2] && c.low[i] > c.low[p1])
}

fn bearish_tri_star(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(three_dojis(c, i)? && c.high[p1] > c.high[p2] && c.high[i] < c.high[p1])
}

// ---------------------------------------------------------------------------
// Four and five candles

fn rising_three_methods(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2, p3, p4) = (prior(i, 1)?, prior(i, 2)?, prior(i, 3)?, prior(i, 4)?);
    Some(
        c.bull(p4)
            && c.body[p4] > c.avg_body[i]
            && c.bear(p3)
            && c.bear(p2)
            && c.bear(p1)
            && c.low[p1] > c.low[p4]
            && c.high[p1] < c.high[p4]
            && c.bull(i)
            && c.close[i] > c.close[p4],
    )
}

fn falling_three_methods(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2, p3, p4) = (prior(i, 1)?, prior(i, 2)?, prior(i, 3)?, prior(i, 4)?);
    Some(
        c.bear(p4)
            && c.body[p4] > c.avg_body[i]
            && c.bull(p3)
            && c.bull(p2)
            && c.bull(p1)
            && c.high[p1] < c.high[p4]
            && c.low[p1] > c.low[p4]
            && c.bear(i)
            && c.close[i] < c.close[p4],
    )
}

fn upside_gap_two_crows(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bull(p2)
            && c.bear(p1)
            && c.open[p1] > c.close[p2]
            && c.bear(i)
            && c.open[i] > c.open[p1]
            && c.close[i] < c.close[p1]
            && c.close[i] > c.close[p2],
    )
}

fn mat_hold(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2, p3, p4) = (prior(i, 1)?, prior(i, 2)?, prior(i, 3)?, prior(i, 4)?);
    Some(
        c.bull(p4)
            && c.body[p4] > c.avg_body[i]
            && c.open[p3] > c.close[p4]
            && c.bear(p2)
            && c.bear(p1)
            && c.low[p1] > c.low[p4]
            && c.bull(i)
            && c.close[i] > c.high[p4],
    )
}

fn bullish_breakaway(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2, p3, p4) = (prior(i, 1)?, prior(i, 2)?, prior(i, 3)?, prior(i, 4)?);
    Some(
        c.bear(p4)
            && c.bear(p3)
            && c.open[p3] < c.close[p4]
            && c.bear(p2)
            && c.body[p1] < c.avg_body[i] * 0.5
            && c.bull(i)
            && c.close[i] > c.close[p3]
            && c.close[i] < c.close[p4],
    )
}

// Bearish candle followed by a bullish one that opens below its low.
fn gapped_reply(c: &Candles<'_>, i: usize) -> Option<(bool, usize)> {
    let p = prior(i, 1)?;
    Some((c.bear(p) && c.bull(i) && c.open[i] < c.low[p], p))
}

fn on_neck_line(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (setup, p) = gapped_reply(c, i)?;
    Some(setup && (c.close[i] - c.low[p]).abs() < c.avg_range[i] * 0.03)
}

fn in_neck_line(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (setup, p) = gapped_reply(c, i)?;
    Some(setup && c.close[i] > c.low[p] && c.close[i] < c.close[p] + c.body[p] * 0.2)
}

fn thrusting_line(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (setup, p) = gapped_reply(c, i)?;
    Some(setup && c.close[i] > c.close[p] && c.close[i] < c.body_mid(p))
}

fn advance_block(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bull(i)
            && c.bull(p1)
            && c.bull(p2)
            && c.body[i] < c.body[p1]
            && c.body[p1] < c.body[p2]
            && c.upper[i] > c.upper[p1],
    )
}

fn deliberation(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bull(i)
            && c.bull(p1)
            && c.bull(p2)
            && c.body[p2] > c.avg_body[i]
            && c.body[p1] > c.avg_body[i]
            && c.body[i] < c.avg_body[i] * 0.5,
    )
}

// ---------------------------------------------------------------------------
// Gaps

fn up_gap(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.low[i] > c.high[prior(i, 1)?])
}

fn down_gap(c: &Candles<'_>, i: usize) -> Option<bool> {
    Some(c.high[i] < c.low[prior(i, 1)?])
}

fn upward_tasuki_gap(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bull(p2)
            && c.bull(p1)
            && c.low[p1] > c.high[p2]
            && c.bear(i)
            && c.open[i] > c.open[p1]
            && c.close[i] < c.close[p1]
            && c.close[i] > c.high[p2],
    )
}

fn downward_tasuki_gap(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bear(p2)
            && c.bear(p1)
            && c.high[p1] < c.low[p2]
            && c.bull(i)
            && c.open[i] < c.open[p1]
            && c.close[i] > c.close[p1]
            && c.close[i] < c.low[p2],
    )
}

fn side_by_side_white(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    let tolerance = c.avg_range[i] * 0.05;
    Some(
        c.bull(p2)
            && c.bull(p1)
            && c.bull(i)
            && c.low[p1] > c.high[p2]
            && (c.open[i] - c.open[p1]).abs() < tolerance
            && (c.close[i] - c.close[p1]).abs() < tolerance,
    )
}

fn stick_sandwich(c: &Candles<'_>, i: usize) -> Option<bool> {
    let (p1, p2) = (prior(i, 1)?, prior(i, 2)?);
    Some(
        c.bear(p2)
            && c.bull(p1)
            && c.bear(i)
            && (c.close[i] - c.close[p2]).abs() < c.avg_range[i] * 0.03,
    )
}

// ---------------------------------------------------------------------------
// Catalog

pub struct PatternSpec {
    pub name: &'static str,
    pub bias: Bias,
    detect: Predicate,
}

impl PatternSpec {
    /// Score weight: 2 for engulfing and star formations, otherwise 1.
    pub fn weight(&self) -> f64 {
        if self.name.contains("engulfing") || self.name.contains("star") {
            2.0
        } else {
            1.0
        }
    }
}

macro_rules! pattern {
    ($name:ident, $bias:ident) => {
        PatternSpec {
            name: stringify!($name),
            bias: Bias::$bias,
            detect: $name,
        }
    };
}

/// All patterns in output order.
pub static PATTERNS: [PatternSpec; 58] = [
    pattern!(doji, Neutral),
    pattern!(long_legged_doji, Neutral),
    pattern!(dragonfly_doji, Bullish),
    pattern!(gravestone_doji, Bearish),
    pattern!(hammer, Bullish),
    pattern!(inverted_hammer, Bullish),
    pattern!(hanging_man, Bearish),
    pattern!(shooting_star, Bearish),
    pattern!(bullish_marubozu, Bullish),
    pattern!(bearish_marubozu, Bearish),
    pattern!(spinning_top, Neutral),
    pattern!(high_wave, Neutral),
    pattern!(bullish_belt_hold, Bullish),
    pattern!(bearish_belt_hold, Bearish),
    pattern!(bullish_engulfing, Bullish),
    pattern!(bearish_engulfing, Bearish),
    pattern!(bullish_harami, Bullish),
    pattern!(bearish_harami, Bearish),
    pattern!(bullish_harami_cross, Bullish),
    pattern!(bearish_harami_cross, Bearish),
    pattern!(piercing_line, Bullish),
    pattern!(dark_cloud_cover, Bearish),
    pattern!(tweezer_top, Bearish),
    pattern!(tweezer_bottom, Bullish),
    pattern!(bullish_kicking, Bullish),
    pattern!(bearish_kicking, Bearish),
    pattern!(bullish_meeting_lines, Bullish),
    pattern!(bearish_meeting_lines, Bearish),
    pattern!(morning_star, Bullish),
    pattern!(evening_star, Bearish),
    pattern!(morning_doji_star, Bullish),
    pattern!(evening_doji_star, Bearish),
    pattern!(three_white_soldiers, Bullish),
    pattern!(three_black_crows, Bearish),
    pattern!(three_inside_up, Bullish),
    pattern!(three_inside_down, Bearish),
    pattern!(three_outside_up, Bullish),
    pattern!(three_outside_down, Bearish),
    pattern!(bullish_abandoned_baby, Bullish),
    pattern!(bearish_abandoned_baby, Bearish),
    pattern!(bullish_tri_star, Bullish),
    pattern!(bearish_tri_star, Bearish),
    pattern!(rising_three_methods, Bullish),
    pattern!(falling_three_methods, Bearish),
    pattern!(upside_gap_two_crows, Bearish),
    pattern!(mat_hold, Bullish),
    pattern!(bullish_breakaway, Bullish),
    pattern!(on_neck_line, Bearish),
    pattern!(in_neck_line, Bearish),
    pattern!(thrusting_line, Neutral),
    pattern!(advance_block, Bearish),
    pattern!(deliberation, Bearish),
    pattern!(up_gap, Bullish),
    pattern!(down_gap, Bearish),
    pattern!(upward_tasuki_gap, Bullish),
    pattern!(downward_tasuki_gap, Bearish),
    pattern!(side_by_side_white, Bullish),
    pattern!(stick_sandwich, Bullish),
];

pub const BULLISH_SCORE: &str = "bullish_pattern_score";
pub const BEARISH_SCORE: &str = "bearish_pattern_score";
pub const PATTERN_SCORE: &str = "pattern_score";

pub fn pattern_names() -> impl Iterator<Item = &'static str> {
    PATTERNS.iter().map(|p| p.name)
}

/// Flags and scores for every bar of a series.
#[derive(Debug, Clone)]
pub struct PatternSet {
    /// One 0/1 column per entry of [`PATTERNS`], in the same order.
    pub flags: Vec<Vec<f64>>,
    pub bullish_score: Vec<f64>,
    pub bearish_score: Vec<f64>,
    /// `(bull - bear) / (bull + bear + 1) * 100`.
    pub score: Vec<f64>,
}

impl PatternSet {
    pub fn flag(&self, name: &str) -> Option<&[f64]> {
        PATTERNS
            .iter()
            .position(|p| p.name == name)
            .map(|idx| self.flags[idx].as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[f64])> + '_ {
        PATTERNS
            .iter()
            .zip(&self.flags)
            .map(|(spec, column)| (spec.name, column.as_slice()))
    }
}

pub fn detect_patterns(series: &PriceSeries) -> PatternSet {
    detect_patterns_ohlc(series.open(), series.high(), series.low(), series.close())
}

pub fn detect_patterns_ohlc(open: &[f64], high: &[f64], low: &[f64], close: &[f64]) -> PatternSet {
    let candles = Candles::new(open, high, low, close);
    let len = candles.len();
    let flags: Vec<Vec<f64>> = PATTERNS
        .iter()
        .map(|spec| {
            (0..len)
                .map(|i| {
                    if (spec.detect)(&candles, i).unwrap_or(false) {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();

    let mut bullish_score = vec![0.0; len];
    let mut bearish_score = vec![0.0; len];
    for (spec, column) in PATTERNS.iter().zip(&flags) {
        let target = match spec.bias {
            Bias::Bullish => &mut bullish_score,
            Bias::Bearish => &mut bearish_score,
            Bias::Neutral => continue,
        };
        let weight = spec.weight();
        for (total, hit) in target.iter_mut().zip(column) {
            *total += hit * weight;
        }
    }
    let score = bullish_score
        .iter()
        .zip(&bearish_score)
        .map(|(bull, bear)| (bull - bear) / (bull + bear + 1.0) * 100.0)
        .collect();

    PatternSet {
        flags,
        bullish_score,
        bearish_score,
        score,
    }
}
