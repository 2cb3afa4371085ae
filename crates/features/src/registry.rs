//! Named feature extractors.
//!
//! Extractors are plain functions registered under a name together with the
//! key set their tables are joined on. Feature groups in the configuration
//! refer to extractors by name.

use ranker_core::{Error, Event, KeySet, Result, Table, Window};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::info;

use crate::base::base_features;
use crate::config::{FeatureGroup, FeaturesConfig};
use crate::extra::extra_features;
use crate::popularity::{post_popularity, user_post_popularity};

/// One feature table and the key it joins on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub name: String,
    pub key: KeySet,
    pub table: Table,
}

impl FeatureTable {
    pub fn new(name: impl Into<String>, key: KeySet, table: Table) -> Self {
        Self {
            name: name.into(),
            key,
            table,
        }
    }

    /// Columns this table adds beyond its key.
    pub fn feature_columns(&self) -> Vec<String> {
        self.table
            .column_names()
            .into_iter()
            .filter(|name| !self.key.is_key_column(name))
            .map(str::to_string)
            .collect()
    }
}

/// Inputs shared by every extractor.
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub windows: Vec<Window>,
    pub user_columns: Vec<String>,
    pub post_columns: Vec<String>,
}

impl From<&FeaturesConfig> for ExtractorSettings {
    fn from(config: &FeaturesConfig) -> Self {
        Self {
            windows: config.windows.clone(),
            user_columns: config.user_columns.clone(),
            post_columns: config.post_columns.clone(),
        }
    }
}

pub type ExtractFn = fn(&[Event], &ExtractorSettings) -> Result<Vec<FeatureTable>>;

/// A registered extractor.
#[derive(Clone, Copy)]
pub struct FeatureExtractor {
    pub name: &'static str,
    pub key: KeySet,
    pub extract: ExtractFn,
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish()
    }
}

/// Tables built for one feature group, in extractor order.
#[derive(Debug, Clone)]
pub struct GroupTables {
    pub group: String,
    pub key: KeySet,
    pub tables: Vec<FeatureTable>,
}

/// Ordered name → extractor registry.
#[derive(Debug, Clone)]
pub struct FeatureRegistry {
    extractors: Vec<FeatureExtractor>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// The built-in extractors.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("base_features", KeySet::UserPost, base_features);
        registry.register("extra_features", KeySet::UserPost, extra_features);
        registry.register("post_popularity", KeySet::Post, post_popularity);
        registry.register("user_post_popularity", KeySet::UserPost, user_post_popularity);
        registry
    }

    /// Register an extractor; a later registration under the same name replaces it in place.
    pub fn register(&mut self, name: &'static str, key: KeySet, extract: ExtractFn) {
        let extractor = FeatureExtractor { name, key, extract };
        match self.extractors.iter_mut().find(|e| e.name == name) {
            Some(existing) => *existing = extractor,
            None => self.extractors.push(extractor),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FeatureExtractor> {
        self.extractors.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name).collect()
    }

    /// Run the extractors of one group.
    ///
    /// Every extractor must produce tables on the group's declared key.
    pub fn build_group(&self, group: &FeatureGroup, events: &[Event], settings: &ExtractorSettings) -> Result<GroupTables> {
        let mut tables = Vec::new();

        for name in &group.extractors {
            let extractor = self
                .get(name)
                .ok_or_else(|| Error::config(format!("unknown feature extractor '{}'", name)))?;
            if extractor.key != group.key {
                return Err(Error::config(format!(
                    "extractor '{}' joins on {:?} but group '{}' declares {:?}",
                    name, extractor.key, group.name, group.key
                )));
            }

            for table in (extractor.extract)(events, settings)? {
                metrics().feature_tables_built.inc();
                metrics().feature_rows.inc_by(table.table.len() as u64);
                info!(
                    group = %group.name,
                    table = %table.name,
                    rows = table.table.len(),
                    columns = table.table.num_columns(),
                    "Feature table built"
                );
                tables.push(table);
            }
        }

        Ok(GroupTables {
            group: group.name.clone(),
            key: group.key,
            tables,
        })
    }

    /// Run every group, in configuration order.
    pub fn build_all(&self, groups: &[FeatureGroup], events: &[Event], settings: &ExtractorSettings) -> Result<Vec<GroupTables>> {
        groups
            .iter()
            .map(|group| self.build_group(group, events, settings))
            .collect()
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
