//! Storage locations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Where the event log is read from and where every snapshot is written.
///
/// All paths are required: a missing path is a fatal configuration error.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PathsConfig {
    /// Raw event log (JSON lines, gzip when the name ends in `.gz`)
    #[validate(length(min = 1))]
    pub input_data_path: String,
    /// Splits, merged features, and predictions
    #[validate(length(min = 1))]
    pub output_data_root: String,
    /// Per-extractor feature tables
    #[validate(length(min = 1))]
    pub interim_data_root: String,
    /// Model checkpoints
    #[validate(length(min = 1))]
    pub models_root: String,
    /// Training history
    #[validate(length(min = 1))]
    pub logs_root: String,
}

impl PathsConfig {
    pub fn input_data_path(&self) -> PathBuf {
        PathBuf::from(&self.input_data_path)
    }

    pub fn output_data_root(&self) -> PathBuf {
        PathBuf::from(&self.output_data_root)
    }

    pub fn interim_data_root(&self) -> PathBuf {
        PathBuf::from(&self.interim_data_root)
    }

    pub fn models_root(&self) -> PathBuf {
        PathBuf::from(&self.models_root)
    }

    pub fn logs_root(&self) -> PathBuf {
        PathBuf::from(&self.logs_root)
    }

    /// Every directory lives under `root`, the event log at `input`.
    pub fn under(root: impl Into<PathBuf>, input: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dir = |name: &str| root.join(name).to_string_lossy().into_owned();
        Self {
            input_data_path: input.into().to_string_lossy().into_owned(),
            output_data_root: dir("processed"),
            interim_data_root: dir("interim"),
            models_root: dir("models"),
            logs_root: dir("logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_fails_to_deserialize() {
        let result = serde_json::from_str::<PathsConfig>(
            r#"{"input_data_path": "events.json.gz", "output_data_root": "out"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_path_fails_validation() {
        let mut paths = PathsConfig::under("/tmp/ranker", "/tmp/ranker/events.json.gz");
        assert!(paths.validate().is_ok());

        paths.models_root = String::new();
        assert!(paths.validate().is_err());
    }
}
