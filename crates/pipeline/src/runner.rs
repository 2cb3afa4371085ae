//! Stage runner.
//!
//! Every stage reads the snapshots written by the previous one and writes its
//! own, so stages can run one at a time from the CLI or chained by `run_all`.

use std::collections::HashSet;

use features::{
    bind, merge_groups, resolve_bind_plan, to_matrix, BindStep, ExtractorSettings, FeatureManifest, FeatureRegistry,
    FeatureTable, GroupTables,
};
use model::{
    predictions_table, Hyperparameters, LogisticRegression, Predictor, RankingReport, Trainer, TrainingReport,
    FINAL_MODEL, HISTORY_FILE, PREDICTIONS_TABLE,
};
use ranker_core::{Error, Event, FeatureMatrix, KeySet, Result, SplitRow, Table};
use serde::{Deserialize, Serialize};
use store::{load_events, Area, SnapshotStore};
use telemetry::metrics;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;

pub const TRAIN_TABLE: &str = "train";
pub const EVAL_TABLE: &str = "eval";
pub const TEST_TABLE: &str = "test";
pub const FEATURES_TABLE: &str = "features";
pub const FEATURE_MANIFEST: &str = "feature_manifest";
/// Interim index of the tables each feature group produced.
pub const FEATURE_TABLES_INDEX: &str = "feature_tables";

/// Tables produced for one group by `build_features`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltGroup {
    pub name: String,
    pub key: KeySet,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuiltTables {
    pub groups: Vec<BuiltGroup>,
}

/// Row and user counts of one split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub name: String,
    pub rows: usize,
    pub users: usize,
    pub opened: usize,
}

impl SplitSummary {
    fn of(name: &str, rows: &[SplitRow]) -> Self {
        let users: HashSet<_> = rows.iter().map(|r| &r.user_id).collect();
        Self {
            name: name.to_string(),
            rows: rows.len(),
            users: users.len(),
            opened: rows.iter().filter(|r| r.opened).count(),
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    store: SnapshotStore,
    registry: FeatureRegistry,
    run_id: Uuid,
}

impl Pipeline {
    /// Validate the configuration and prepare a run.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let config = config.validated()?;
        let store = SnapshotStore::new(config.paths.clone());
        Ok(Self {
            config,
            store,
            registry: FeatureRegistry::standard(),
            run_id: Uuid::new_v4(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn load_events(&self) -> Result<Vec<Event>> {
        load_events(&self.config.paths.input_data_path())
    }

    /// Split the event log into train, eval, and test snapshots.
    pub fn make_dataset(&self) -> Result<Vec<SplitSummary>> {
        let span = info_span!("make_dataset", run_id = %self.run_id);
        let _enter = span.enter();
        let _timer = metrics().time_stage("make_dataset");

        let events = self.load_events()?;
        let splits = dataset::DatasetSplitter::new(self.config.dataset.clone()).split(&events);

        let mut summaries = Vec::with_capacity(3);
        for (name, rows) in [(TRAIN_TABLE, &splits.train), (EVAL_TABLE, &splits.eval), (TEST_TABLE, &splits.test)] {
            let path = self.store.write_table(Area::Output, name, &SplitRow::to_table(rows))?;
            let summary = SplitSummary::of(name, rows);
            if summary.rows == 0 {
                warn!(split = name, "Split is empty");
            }
            info!(
                split = name,
                rows = summary.rows,
                users = summary.users,
                opened = summary.opened,
                path = %path.display(),
                "Split written"
            );
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Run every configured feature group and write its tables.
    pub fn build_features(&self) -> Result<BuiltTables> {
        let span = info_span!("build_features", run_id = %self.run_id);
        let _enter = span.enter();
        let _timer = metrics().time_stage("build_features");

        let events = self.load_events()?;
        let settings = ExtractorSettings::from(&self.config.features);
        let groups = self.registry.build_all(&self.config.features.groups, &events, &settings)?;

        let mut index = BuiltTables::default();
        for group in &groups {
            for feature in &group.tables {
                self.store.write_table(Area::Interim, &feature.name, &feature.table)?;
            }
            index.groups.push(BuiltGroup {
                name: group.group.clone(),
                key: group.key,
                tables: group.tables.iter().map(|t| t.name.clone()).collect(),
            });
        }
        self.store.write_document(Area::Interim, FEATURE_TABLES_INDEX, &index)?;

        info!(
            groups = index.groups.len(),
            tables = index.groups.iter().map(|g| g.tables.len()).sum::<usize>(),
            windows = ?self.config.features.windows.iter().map(|w| w.label()).collect::<Vec<_>>(),
            "Feature tables built"
        );
        Ok(index)
    }

    /// Left-join every built table into the wide feature table.
    ///
    /// Groups merge in configuration order.
    pub fn merge_features(&self) -> Result<FeatureManifest> {
        let span = info_span!("merge_features", run_id = %self.run_id);
        let _enter = span.enter();
        let _timer = metrics().time_stage("merge_features");

        let index: BuiltTables = self.store.read_document(Area::Interim, FEATURE_TABLES_INDEX)?;
        let mut groups = Vec::with_capacity(self.config.features.groups.len());
        for group in &self.config.features.groups {
            let built = index
                .groups
                .iter()
                .find(|g| g.name == group.name)
                .ok_or_else(|| Error::config(format!("feature group '{}' has not been built", group.name)))?;
            let tables = built
                .tables
                .iter()
                .map(|name| {
                    let table = self.store.read_table(Area::Interim, name)?;
                    Ok(FeatureTable::new(name.clone(), group.key, table))
                })
                .collect::<Result<Vec<_>>>()?;
            groups.push(GroupTables {
                group: group.name.clone(),
                key: group.key,
                tables,
            });
        }

        let (wide, manifest) = merge_groups(&groups)?;
        let path = self.store.write_table(Area::Output, FEATURES_TABLE, &wide)?;
        self.store.write_document(Area::Output, FEATURE_MANIFEST, &manifest)?;
        info!(rows = wide.len(), path = %path.display(), "Wide table written");
        Ok(manifest)
    }

    fn bind_plan(&self, selected: &[String]) -> Result<(Table, Vec<BindStep>)> {
        let wide = self.store.read_table(Area::Output, FEATURES_TABLE)?;
        let manifest: FeatureManifest = self.store.read_document(Area::Output, FEATURE_MANIFEST)?;
        let plan = resolve_bind_plan(&self.config.features.bind_groups, &manifest, selected)?;
        info!(
            selected = ?selected,
            steps = ?plan.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Bind plan resolved"
        );
        Ok((wide, plan))
    }

    fn bound_matrix(&self, split: &str, wide: &Table, plan: &[BindStep]) -> Result<FeatureMatrix> {
        let rows = self.store.read_table(Area::Output, split)?;
        let bound = bind(&rows, wide, plan)?;
        let matrix = to_matrix(&bound)?;
        info!(split, rows = matrix.len(), features = matrix.num_features(), "Split bound");
        Ok(matrix)
    }

    /// Train on the train split, validating on eval.
    ///
    /// `selected` restricts the feature groups (empty means all).
    pub fn train(&self, selected: &[String]) -> Result<TrainingReport> {
        let span = info_span!("train", run_id = %self.run_id);
        let _enter = span.enter();
        let _timer = metrics().time_stage("train");

        let (wide, plan) = self.bind_plan(selected)?;
        let train = self.bound_matrix(TRAIN_TABLE, &wide, &plan)?;
        let validation = self.bound_matrix(EVAL_TABLE, &wide, &plan)?;

        let mut checkpoint = self.store.clone();
        let trainer = Trainer::new(Hyperparameters::from(&self.config.model));
        let report = trainer.fit(&train, &validation, &mut checkpoint)?;

        let model_path = self.store.write_document(Area::Models, FINAL_MODEL, &report.model)?;
        let history_path = self.store.write_lines(Area::Logs, HISTORY_FILE, &report.history)?;
        info!(
            epochs = report.history.len(),
            best_epoch = ?report.best_epoch,
            stopped_early = report.stopped_early,
            model = %model_path.display(),
            history = %history_path.display(),
            "Model trained"
        );
        Ok(report)
    }

    /// Score and rank the test split with the final model.
    pub fn predict(&self, selected: &[String]) -> Result<RankingReport> {
        let span = info_span!("predict", run_id = %self.run_id);
        let _enter = span.enter();
        let _timer = metrics().time_stage("predict");

        let model: LogisticRegression = self.store.read_document(Area::Models, FINAL_MODEL)?;
        let (wide, plan) = self.bind_plan(selected)?;
        let test = self.bound_matrix(TEST_TABLE, &wide, &plan)?;

        let (predictions, report) = Predictor::new(&model).predict(&test)?;
        let path = self
            .store
            .write_table(Area::Output, PREDICTIONS_TABLE, &predictions_table(&predictions)?)?;

        match report.mean_rank {
            Some(mean_rank) => info!(mean_rank, map_at_10 = report.map_at_10, "Mean rank and MAP@10"),
            None => warn!("No opened rows in the test split, mean rank is undefined"),
        }
        info!(path = %path.display(), "Predictions written");
        Ok(report)
    }

    /// Every stage, in order.
    pub fn run_all(&self, selected: &[String]) -> Result<RankingReport> {
        let span = info_span!("run", run_id = %self.run_id);
        let _enter = span.enter();

        self.make_dataset()?;
        self.build_features()?;
        self.merge_features()?;
        self.train(selected)?;
        self.predict(selected)
    }
}
