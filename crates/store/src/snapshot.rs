//! Columnar table snapshots on disk.
//!
//! One JSON document per table. Snapshots are written to a temporary file and
//! renamed into place, so a reader never sees a partially written table.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ranker_core::{Error, Result, Table};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::{debug, info};

use crate::config::PathsConfig;

/// Snapshot format version, bumped on incompatible layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

const SNAPSHOT_EXTENSION: &str = "json";

/// On-disk envelope around a table.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    name: String,
    written_at: DateTime<Utc>,
    rows: usize,
    table: Table,
}

/// Snapshot locations: which root a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// Splits, merged features, predictions
    Output,
    /// Per-extractor feature tables
    Interim,
    /// Model checkpoints
    Models,
    /// Training history
    Logs,
}

/// Reads and writes snapshots under the configured roots.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    paths: PathsConfig,
}

impl SnapshotStore {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    pub fn root(&self, area: Area) -> PathBuf {
        match area {
            Area::Output => self.paths.output_data_root(),
            Area::Interim => self.paths.interim_data_root(),
            Area::Models => self.paths.models_root(),
            Area::Logs => self.paths.logs_root(),
        }
    }

    /// Path of the snapshot named `name` in `area`.
    pub fn table_path(&self, area: Area, name: &str) -> PathBuf {
        self.root(area)
            .join(format!("{}.{}", name, SNAPSHOT_EXTENSION))
    }

    pub fn write_table(&self, area: Area, name: &str, table: &Table) -> Result<PathBuf> {
        let path = self.table_path(area, name);
        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            name: name.to_string(),
            written_at: Utc::now(),
            rows: table.len(),
            table: table.clone(),
        };
        write_json_atomic(&path, &snapshot)?;

        metrics().snapshots_written.inc();
        info!(
            table = name,
            rows = table.len(),
            columns = table.num_columns(),
            path = %path.display(),
            "Wrote snapshot"
        );
        Ok(path)
    }

    pub fn read_table(&self, area: Area, name: &str) -> Result<Table> {
        let path = self.table_path(area, name);
        let snapshot: SnapshotFile = read_json(&path)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::schema(format!(
                "{}: snapshot version {} is not supported (expected {})",
                path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            )));
        }
        if snapshot.rows != snapshot.table.len() {
            return Err(Error::schema(format!(
                "{}: header declares {} rows, table has {}",
                path.display(),
                snapshot.rows,
                snapshot.table.len()
            )));
        }

        debug!(table = name, rows = snapshot.rows, "Read snapshot");
        Ok(snapshot.table)
    }

    /// Column names of a stored table.
    pub fn table_columns(&self, area: Area, name: &str) -> Result<Vec<String>> {
        Ok(self
            .read_table(area, name)?
            .column_names()
            .into_iter()
            .map(String::from)
            .collect())
    }

    /// Store any serializable document (models, manifests) as `name.json`.
    pub fn write_document<T: Serialize>(&self, area: Area, name: &str, doc: &T) -> Result<PathBuf> {
        let path = self.table_path(area, name);
        write_json_atomic(&path, doc)?;
        debug!(document = name, path = %path.display(), "Wrote document");
        Ok(path)
    }

    pub fn read_document<T: DeserializeOwned>(&self, area: Area, name: &str) -> Result<T> {
        read_json(&self.table_path(area, name))
    }

    /// Rewrite a JSON-lines log with one record per line.
    pub fn write_lines<T: Serialize>(&self, area: Area, file_name: &str, records: &[T]) -> Result<PathBuf> {
        let path = self.root(area).join(file_name);
        ensure_parent(&path)?;

        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n").map_err(|e| Error::io(&path, e))?;
        }
        writer.flush().map_err(|e| Error::io(&path, e))?;
        Ok(path)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    Ok(())
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;

    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush().map_err(|e| Error::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::parse(path, e.line(), e.to_string()))
}
