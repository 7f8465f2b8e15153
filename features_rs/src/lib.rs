mod composer;
pub mod indicators;
pub mod patterns;
pub mod prepare;
pub mod schema;
mod table;

pub use composer::{compute_features, compute_features_batch, compute_features_with_config};
pub use indicators::{
    IndicatorScore, IndicatorSignal, Signal, SignalSummary, indicator_signals, signal_summary,
};
pub use patterns::{Bias, PATTERNS, PatternSet, PatternSpec, detect_patterns, pattern_names};
pub use prepare::{PrepareOptions, PreparedFeatures, PriceInput, prepare_features};
pub use schema::{
    ComputationWarning, NonFinite, SchemaDrift, SchemaManifest, ValidationReport, align_frame,
    ensure_complete, feature_descriptors, feature_schema, target_columns, target_descriptors,
    validate, validate_frame,
};
pub use table::{FeatureRow, FeatureTable};
