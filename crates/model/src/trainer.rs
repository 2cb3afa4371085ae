//! Mini-batch training with validation, checkpoints, and early stopping.

use ndarray::{Array1, Axis};
use rand::seq::SliceRandom;
use ranker_core::{FeatureMatrix, Result};
use serde::{Deserialize, Serialize};
use store::{Area, SnapshotStore};
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::logistic::{binary_cross_entropy, Hyperparameters, LogisticRegression};
use crate::normalizer::Normalizer;
use crate::optim::Adam;

pub const BEST_MODEL: &str = "best_model";
pub const FINAL_MODEL: &str = "final_model";
pub const HISTORY_FILE: &str = "training_history.jsonl";

/// Losses of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f32,
    pub val_loss: Option<f32>,
    /// Whether the monitored loss reached a new best
    pub improved: bool,
}

/// Receives the best model each time the monitored loss improves.
pub trait Checkpoint {
    fn save(&mut self, name: &str, model: &LogisticRegression) -> Result<()>;
}

impl Checkpoint for SnapshotStore {
    fn save(&mut self, name: &str, model: &LogisticRegression) -> Result<()> {
        self.write_document(Area::Models, name, model)?;
        Ok(())
    }
}

/// Discards checkpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCheckpoint;

impl Checkpoint for NoCheckpoint {
    fn save(&mut self, _name: &str, _model: &LogisticRegression) -> Result<()> {
        Ok(())
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Weights of the best epoch (initial weights when nothing was trained)
    pub model: LogisticRegression,
    pub history: Vec<EpochRecord>,
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

pub struct Trainer {
    hyper: Hyperparameters,
}

impl Trainer {
    pub fn new(hyper: Hyperparameters) -> Self {
        Self { hyper }
    }

    /// Fit on `train`, monitoring loss on `validation`.
    ///
    /// Validation loss is monitored when validation has rows, training loss
    /// otherwise. The returned model carries the best epoch's weights.
    pub fn fit<C: Checkpoint + ?Sized>(
        &self,
        train: &FeatureMatrix,
        validation: &FeatureMatrix,
        checkpoint: &mut C,
    ) -> Result<TrainingReport> {
        let mut rng = self.hyper.rng();
        let normalizer = Normalizer::adapt(&train.values);
        let mut model = self.hyper.build(train.columns.clone(), normalizer, &mut rng);

        if train.is_empty() {
            warn!(columns = train.columns.len(), "Training matrix is empty, keeping the untrained model");
            return Ok(TrainingReport {
                model,
                history: Vec::new(),
                best_epoch: None,
                stopped_early: false,
            });
        }

        let x = model.prepare(train)?;
        let y = Array1::from(train.labels.clone());
        let validation = (!validation.is_empty()).then_some(validation);

        let mut optimizer = Adam::new(self.hyper.get_learning_rate(), train.num_features());
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::new();
        let mut best: Option<(f32, LogisticRegression, usize)> = None;
        let mut wait = 0;
        let mut stopped_early = false;

        info!(
            rows = train.len(),
            features = train.num_features(),
            validation_rows = validation.map(|v| v.len()).unwrap_or(0),
            epochs = self.hyper.get_num_epochs(),
            "Training started"
        );

        for epoch in 1..=self.hyper.get_num_epochs() {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0f32;

            for batch in order.chunks(self.hyper.get_batch_size()) {
                let xb = x.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch);
                let pb = model.forward(&xb);

                loss_sum += binary_cross_entropy(&pb, yb.view()) * batch.len() as f32;

                let err = &pb - &yb;
                let n = batch.len() as f32;
                let grad_weights = xb.t().dot(&err) / n;
                let grad_bias = err.sum() / n;
                let (weights, bias) = model.parameters_mut();
                optimizer.update(weights, bias, &grad_weights, grad_bias);
            }

            let loss = loss_sum / train.len() as f32;
            let val_loss = validation.map(|v| model.loss(v)).transpose()?;
            let monitored = val_loss.unwrap_or(loss);
            let improved = best.as_ref().map_or(true, |(b, _, _)| monitored < *b);

            if improved {
                checkpoint.save(BEST_MODEL, &model)?;
                best = Some((monitored, model.clone(), epoch));
                wait = 0;
            } else {
                wait += 1;
            }

            metrics().epochs_run.inc();
            info!(epoch, loss, val_loss = ?val_loss, improved, "Epoch finished");
            history.push(EpochRecord {
                epoch,
                loss,
                val_loss,
                improved,
            });

            if !improved && wait >= self.hyper.get_patience() {
                debug!(epoch, patience = self.hyper.get_patience(), "Early stopping");
                stopped_early = true;
                break;
            }
        }

        let (model, best_epoch) = match best {
            Some((_, model, epoch)) => (model, Some(epoch)),
            None => (model, None),
        };
        Ok(TrainingReport {
            model,
            history,
            best_epoch,
            stopped_early,
        })
    }
}
