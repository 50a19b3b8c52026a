use crate::model::forest::ForestParams;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ARTIFACT_PATH: &str = "models/credit_score_model.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub n_samples: usize,
    pub seed: u64,
    pub test_fraction: f64,
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_samples: 2000,
            seed: 42,
            test_fraction: 0.2,
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
        }
    }
}

impl TrainingConfig {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub artifact_path: String,
    pub database_path: String,
    pub training: TrainingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            artifact_path: DEFAULT_ARTIFACT_PATH.into(),
            database_path: ":memory:".into(),
            training: TrainingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file. Keys left out fall back to the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        if !(config.training.test_fraction > 0.0 && config.training.test_fraction < 1.0) {
            anyhow::bail!(
                "training.test_fraction must be in (0, 1), got {}",
                config.training.test_fraction
            );
        }
        Ok(config)
    }

    /// Small, fast configuration for tests. Not for production scoring.
    pub fn default_test() -> Self {
        Self {
            artifact_path: "target/test-models/credit_score_model.json".into(),
            database_path: ":memory:".into(),
            training: TrainingConfig {
                n_samples: 400,
                seed: 42,
                test_fraction: 0.2,
                n_trees: 15,
                max_depth: 6,
                min_samples_split: 2,
            },
        }
    }
}
