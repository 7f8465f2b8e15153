//! Technical indicator library.
//!
//! Every indicator is a pure function over `&[f64]` slices that returns
//! vectors of the input length. Positions before the first full window are
//! NaN. Multi-line indicators return a named struct of vectors.

pub mod levels;
pub mod moving_average;
pub mod oscillators;
pub mod rolling;
pub mod signals;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use levels::{
    Ichimoku, PivotLevels, PivotSnapshot, RETRACEMENT_RATIOS, Retracement, fibonacci_pivots,
    fibonacci_retracement, ichimoku, pivot_points,
};
pub use moving_average::{Macd, dema, ema, hull_ma, macd, sma, tema, vwma, wma};
pub use oscillators::{
    Stochastic, awesome_oscillator, cci, momentum, roc, rsi, stochastic, stochastic_rsi, tsi,
    ultimate_oscillator, williams_r,
};
pub use signals::{
    IndicatorScore, IndicatorSignal, Signal, SignalSummary, indicator_signals, score_signals,
    signal_summary,
};
pub use trend::{
    Adx, Aroon, ElderRay, ParabolicSar, Supertrend, adx, adx_ewm, aroon, choppiness_index,
    elder_ray, parabolic_sar, supertrend,
};
pub use volatility::{
    Bollinger, Chandelier, Channel, atr, atr_ewm, atr_percent, bollinger, chandelier, donchian,
    historical_volatility, keltner, true_range,
};
pub use volume::{
    ad_line, cmf, ease_of_movement, force_index, mfi, obv, volume_oscillator, vwap,
};
