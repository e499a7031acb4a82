use serde::{Deserialize, Serialize};
use shared::Predictions;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierConfigError {
    #[error("Failed to read classifier config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse classifier config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Classifier config must list at least one prediction")]
    NoPredictions,
    #[error("Prediction scores must lie between 0 and 100")]
    ScoreOutOfRange,
}

/// Settings for the stub model: how long it pretends to think and what it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    #[serde(default = "default_predictions")]
    pub predictions: Predictions,
}

fn default_latency_ms() -> u64 {
    1000
}

fn default_predictions() -> Predictions {
    [("Gir", 92.0), ("Sahiwal", 5.0), ("Red Sindhi", 3.0)]
        .into_iter()
        .collect()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            predictions: default_predictions(),
        }
    }
}

impl ClassifierConfig {
    pub fn load(path: &Path) -> Result<Self, ClassifierConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ClassifierConfigError> {
        let config: ClassifierConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClassifierConfigError> {
        if self.predictions.is_empty() {
            return Err(ClassifierConfigError::NoPredictions);
        }
        if !self.predictions.has_valid_scores() {
            return Err(ClassifierConfigError::ScoreOutOfRange);
        }
        Ok(())
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}
