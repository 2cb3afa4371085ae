//! Run configuration, threaded explicitly into every stage.

use dataset::DatasetConfig;
use features::FeaturesConfig;
use model::ModelConfig;
use ranker_core::{Error, Result};
use serde::{Deserialize, Serialize};
use store::PathsConfig;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[validate(nested)]
    pub paths: PathsConfig,
    #[validate(nested)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    #[validate(nested)]
    pub features: FeaturesConfig,
    #[serde(default)]
    #[validate(nested)]
    pub model: ModelConfig,
}

impl PipelineConfig {
    /// Validate, turning any violation into a configuration error.
    pub fn validated(self) -> Result<Self> {
        self.validate().map_err(|e| Error::config(e.to_string()))?;
        Ok(self)
    }
}
