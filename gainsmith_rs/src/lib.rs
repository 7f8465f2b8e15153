pub mod config;
pub mod data;
pub mod error;
pub mod feature;
pub mod source;
pub mod storage;

pub use config::{EngineConfig, TargetConfig};
pub use data::{PriceBar, PriceSeries};
pub use error::{FeatureError, FeatureResult};
pub use feature::{FeatureCategory, FeatureDescriptor, FeatureKind};
pub use source::{CachedSource, CsvDirectorySource, Interval, Period, PriceSource, SourceError};
