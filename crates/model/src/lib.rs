//! Click-prediction model: a normalized logistic regression trained with
//! Adam, plus ranking of scored impressions.

pub mod config;
pub mod logistic;
pub mod normalizer;
pub mod optim;
pub mod predictor;
pub mod trainer;

pub use config::ModelConfig;
pub use logistic::{Hyperparameters, LogisticRegression};
pub use normalizer::Normalizer;
pub use predictor::{
    map_at_k, mean_rank, predictions_table, rank_predictions, ranking_report, Prediction, Predictor,
    RankingReport, MAP_CUTOFF, PREDICTIONS_TABLE,
};
pub use trainer::{Checkpoint, EpochRecord, NoCheckpoint, Trainer, TrainingReport, BEST_MODEL, FINAL_MODEL, HISTORY_FILE};
