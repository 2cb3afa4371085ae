//! Common test setup functions.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use pipeline::PipelineConfig;
use store::PathsConfig;
use uuid::Uuid;

use crate::fixtures;

/// Scratch directory holding a compressed event log and every output area.
///
/// Removed on drop.
pub struct TestWorkspace {
    pub root: PathBuf,
    pub paths: PathsConfig,
}

impl TestWorkspace {
    /// Create an empty workspace under the system temp directory.
    ///
    /// Installs the tracing subscriber on first use so `RUST_LOG` shows stage logs.
    pub fn new() -> Self {
        telemetry::init_tracing_from_env();
        let root = std::env::temp_dir().join(format!("feed-ranker-{}", Uuid::new_v4()));
        fs::create_dir_all(root.join("raw")).expect("Failed to create workspace");
        let paths = PathsConfig::under(&root, root.join("raw").join("events.json.gz"));
        tracing::debug!(root = %root.display(), "Test workspace created");
        Self { root, paths }
    }

    /// Create a workspace whose log holds [`fixtures::feed_log`].
    pub fn with_feed_log() -> Self {
        let workspace = Self::new();
        workspace.write_log(&fixtures::feed_log());
        workspace
    }

    pub fn log_path(&self) -> PathBuf {
        self.paths.input_data_path()
    }

    /// Write `records` as gzip-compressed JSON lines at the log path.
    pub fn write_log(&self, records: &[serde_json::Value]) {
        let file = File::create(self.log_path()).expect("Failed to create event log");
        let mut encoder = GzEncoder::new(file, Compression::default());
        for record in records {
            writeln!(encoder, "{}", record).expect("Failed to write record");
        }
        encoder.finish().expect("Failed to finish gzip stream");
    }

    /// Pipeline configuration over this workspace with a short training run.
    pub fn pipeline_config(&self, epochs: usize) -> PipelineConfig {
        let mut config = PipelineConfig {
            paths: self.paths.clone(),
            dataset: fixtures::dataset_config(),
            features: Default::default(),
            model: Default::default(),
        };
        config.model.epochs = epochs;
        config.model.batch_size = 8;
        config
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestWorkspace {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.root).ok();
    }
}
