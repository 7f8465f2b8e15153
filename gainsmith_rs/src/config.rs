use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One trading year of daily bars; the longest lookback any feature needs.
pub const DEFAULT_MIN_HISTORY: usize = 252;
pub const DEFAULT_GAIN_THRESHOLD: f64 = 0.05;
pub const DEFAULT_TARGET_HORIZON: usize = 1;

fn default_min_history() -> usize {
    DEFAULT_MIN_HISTORY
}

fn default_gain_threshold() -> f64 {
    DEFAULT_GAIN_THRESHOLD
}

fn default_horizon() -> usize {
    DEFAULT_TARGET_HORIZON
}

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// Forward return at or above this fraction labels a row as a gainer.
    #[serde(default = "default_gain_threshold")]
    pub gain_threshold: f64,
    /// Number of bars ahead used for the primary `target` column.
    #[serde(default = "default_horizon")]
    pub horizon: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            gain_threshold: DEFAULT_GAIN_THRESHOLD,
            horizon: DEFAULT_TARGET_HORIZON,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Minimum number of bars a series must have before features are
    /// computed. Shorter series yield `InsufficientData`. Values below
    /// [`DEFAULT_MIN_HISTORY`], the longest lookback in the schema, are
    /// raised to it.
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    #[serde(default)]
    pub target: TargetConfig,
    /// Fan out indicator and pattern stages on the rayon pool. Results are
    /// identical either way.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_history: DEFAULT_MIN_HISTORY,
            target: TargetConfig::default(),
            parallel: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Unable to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid engine config in {}", path.display()))
    }

    /// Hash of the serialized configuration, recorded next to prepared
    /// artefacts so a changed config is visible in the output directory.
    pub fn stable_hash(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self).context("Failed to serialize engine config")?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}
