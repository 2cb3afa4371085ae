//! Unified error types for the feed ranker.
//!
//! Error kinds map to the stage that raised them:
//! - CONFIG: configuration is missing or inconsistent (fatal before any stage runs)
//! - IO: unreadable input or unwritable output, always carries the path
//! - PARSE: a record in the event log could not be decoded
//! - SCHEMA: a table does not have the shape a join or projection expects
//! - MODEL: training or prediction could not proceed

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the feed ranker.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A line of the event log failed to decode.
    #[error("parse error in {}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("invalid window: {0}")]
    Window(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an I/O failure with the path that caused it.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(path: impl AsRef<Path>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn missing_column(name: impl Into<String>) -> Self {
        Self::MissingColumn(name.into())
    }

    pub fn window(msg: impl Into<String>) -> Self {
        Self::Window(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short kind label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Window(_) => "CONFIG",
            Self::Io { .. } => "IO",
            Self::Serialization(_) | Self::Parse { .. } => "PARSE",
            Self::Schema(_) | Self::MissingColumn(_) => "SCHEMA",
            Self::Model(_) => "MODEL",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether this error must stop the process before any stage executes.
    pub fn is_config(&self) -> bool {
        self.kind() == "CONFIG"
    }
}
