use std::fmt;

use serde::{Deserialize, Serialize};

/// Group a feature column belongs to. Groups appear in the output table in
/// declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Price,
    Momentum,
    Volume,
    Indicator,
    Pattern,
    Lag,
    Rolling,
    Date,
    Composite,
    /// Forward-looking label; only present when targets are requested.
    Target,
}

impl FeatureCategory {
    pub const ALL: [FeatureCategory; 10] = [
        Self::Price,
        Self::Momentum,
        Self::Volume,
        Self::Indicator,
        Self::Pattern,
        Self::Lag,
        Self::Rolling,
        Self::Date,
        Self::Composite,
        Self::Target,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Momentum => "momentum",
            Self::Volume => "volume",
            Self::Indicator => "indicator",
            Self::Pattern => "pattern",
            Self::Lag => "lag",
            Self::Rolling => "rolling",
            Self::Date => "date",
            Self::Composite => "composite",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value domain of a feature column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// 0.0 / 1.0, or NaN where an input is undefined.
    Flag,
    Continuous,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub name: String,
    pub category: FeatureCategory,
    pub kind: FeatureKind,
}

impl FeatureDescriptor {
    pub fn new(name: impl Into<String>, category: FeatureCategory, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            category,
            kind,
        }
    }

    pub fn continuous(name: impl Into<String>, category: FeatureCategory) -> Self {
        Self::new(name, category, FeatureKind::Continuous)
    }

    pub fn flag(name: impl Into<String>, category: FeatureCategory) -> Self {
        Self::new(name, category, FeatureKind::Flag)
    }

    pub fn is_target(&self) -> bool {
        self.category == FeatureCategory::Target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_serialize_as_snake_case() {
        let json = serde_json::to_string(&FeatureCategory::Composite).expect("serialize");
        assert_eq!(json, "\"composite\"");
        for category in FeatureCategory::ALL {
            assert_eq!(
                serde_json::to_string(&category).expect("serialize"),
                format!("\"{category}\"")
            );
        }
    }
}
