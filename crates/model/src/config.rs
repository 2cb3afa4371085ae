use serde::{Deserialize, Serialize};
use validator::Validate;

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModelConfig {
    #[serde(default = "default_epochs")]
    #[validate(range(min = 1))]
    pub epochs: usize,
    /// Epochs without validation-loss improvement before training stops
    #[serde(default = "default_patience")]
    pub early_stopping_patience: usize,
    #[serde(default = "default_learning_rate")]
    #[validate(range(min = 0.000001, max = 1.0))]
    pub learning_rate: f32,
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
    /// Seeds weight initialization and per-epoch shuffling
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_epochs() -> usize {
    10
}

fn default_patience() -> usize {
    3
}

fn default_learning_rate() -> f32 {
    0.001
}

fn default_batch_size() -> usize {
    32
}

fn default_seed() -> u64 {
    42
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            early_stopping_patience: default_patience(),
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            seed: default_seed(),
        }
    }
}
