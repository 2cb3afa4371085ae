//! Logistic regression: a normalizer followed by a single sigmoid unit.

use ndarray::{Array1, Array2, ArrayView1};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ranker_core::{FeatureMatrix, Result};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::normalizer::Normalizer;

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` inside the loss.
const EPSILON: f32 = 1e-7;

pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Mean binary cross-entropy. Zero for no rows.
pub fn binary_cross_entropy(probabilities: &Array1<f32>, labels: ArrayView1<f32>) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f32 = probabilities
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = p.clamp(EPSILON, 1.0 - EPSILON);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / labels.len() as f32
}

/// Hyperparameters describing the model and its training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hyperparameters {
    learning_rate: f32,
    batch_size: usize,
    num_epochs: usize,
    patience: usize,
    seed: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for Hyperparameters {
    fn from(config: &ModelConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            batch_size: config.batch_size.max(1),
            num_epochs: config.epochs,
            patience: config.early_stopping_patience,
            seed: config.seed,
        }
    }
}

impl Hyperparameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the learning rate.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the mini-batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the maximum number of epochs.
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Set the early-stopping patience.
    pub fn patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    /// Set the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn get_learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn get_batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn get_num_epochs(&self) -> usize {
        self.num_epochs
    }

    pub fn get_patience(&self) -> usize {
        self.patience
    }

    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// Untrained model over `columns`, weights drawn Glorot-uniform.
    pub fn build(&self, columns: Vec<String>, normalizer: Normalizer, rng: &mut StdRng) -> LogisticRegression {
        let width = columns.len();
        let limit = (6.0 / (width + 1) as f32).sqrt();
        let uniform = Uniform::new_inclusive(-limit, limit);
        let weights = Array1::from_shape_fn(width, |_| uniform.sample(rng));

        LogisticRegression {
            columns,
            normalizer,
            weights,
            bias: 0.0,
        }
    }
}

/// Trained (or freshly initialized) click model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    columns: Vec<String>,
    normalizer: Normalizer,
    weights: Array1<f32>,
    bias: f32,
}

impl LogisticRegression {
    /// Feature columns the model expects, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn weights(&self) -> &Array1<f32> {
        &self.weights
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub(crate) fn parameters_mut(&mut self) -> (&mut Array1<f32>, &mut f32) {
        (&mut self.weights, &mut self.bias)
    }

    /// Probabilities for already-normalized rows.
    pub(crate) fn forward(&self, normalized: &Array2<f32>) -> Array1<f32> {
        (normalized.dot(&self.weights) + self.bias).mapv(sigmoid)
    }

    /// Normalize a matrix laid out on this model's columns.
    ///
    /// Columns the model does not know are ignored; missing ones are zero.
    pub fn prepare(&self, matrix: &FeatureMatrix) -> Result<Array2<f32>> {
        let aligned = if matrix.columns == self.columns {
            matrix.values.clone()
        } else {
            matrix.aligned_to(&self.columns).values
        };
        self.normalizer.transform(&aligned)
    }

    /// Open probability for every row.
    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f32>> {
        Ok(self.forward(&self.prepare(matrix)?).to_vec())
    }

    /// Mean binary cross-entropy against the matrix labels.
    pub fn loss(&self, matrix: &FeatureMatrix) -> Result<f32> {
        let probabilities = self.forward(&self.prepare(matrix)?);
        Ok(binary_cross_entropy(&probabilities, ArrayView1::from(matrix.labels.as_slice())))
    }
}
