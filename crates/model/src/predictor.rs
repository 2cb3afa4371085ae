//! Scoring and within-impression ranking.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ranker_core::schema::{EVENT_TIME, OPENED, POST_ID, PREDICTION, RANK, USER_ID};
use ranker_core::{Column, Error, FeatureMatrix, PostId, Result, Table, UserId, Value};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::info;

use crate::logistic::LogisticRegression;

pub const PREDICTIONS_TABLE: &str = "raw_predictions";

/// Cutoff of the reported mean average precision.
pub const MAP_CUTOFF: usize = 10;

/// One scored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub post_id: PostId,
    pub user_id: UserId,
    pub event_time: DateTime<Utc>,
    pub opened: bool,
    pub prediction: f32,
    /// 1-based position within the (user, event time) impression
    pub rank: usize,
}

/// Ranking quality over opened rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub rows: usize,
    pub opened: usize,
    /// Mean rank of opened rows, absent when nothing was opened
    pub mean_rank: Option<f64>,
    pub map_at_10: f64,
}

/// Higher score first; equal scores by post id ascending.
fn rank_order(a: &Prediction, b: &Prediction) -> Ordering {
    b.prediction
        .total_cmp(&a.prediction)
        .then_with(|| a.post_id.cmp(&b.post_id))
}

/// Indices of each (user, time) impression, in first-seen order.
fn impressions(predictions: &[Prediction]) -> Vec<Vec<usize>> {
    let mut index: HashMap<(&UserId, DateTime<Utc>), usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, p) in predictions.iter().enumerate() {
        let next = groups.len();
        let g = *index.entry((&p.user_id, p.event_time)).or_insert(next);
        if g == next {
            groups.push(Vec::new());
        }
        groups[g].push(i);
    }
    groups
}

/// Attach scores to matrix rows and rank them within each (user, time).
///
/// Rows keep the matrix order.
pub fn rank_predictions(matrix: &FeatureMatrix, scores: &[f32]) -> Result<Vec<Prediction>> {
    if scores.len() != matrix.len() || matrix.ids.len() != matrix.len() {
        return Err(Error::model(format!(
            "{} scores and {} ids for {} rows",
            scores.len(),
            matrix.ids.len(),
            matrix.len()
        )));
    }

    let mut predictions: Vec<Prediction> = matrix
        .ids
        .iter()
        .zip(scores)
        .zip(&matrix.labels)
        .map(|((id, &score), &label)| Prediction {
            post_id: id.post_id.clone(),
            user_id: id.user_id.clone(),
            event_time: id.event_time,
            opened: label > 0.5,
            prediction: score,
            rank: 0,
        })
        .collect();

    for mut group in impressions(&predictions) {
        group.sort_by(|&a, &b| rank_order(&predictions[a], &predictions[b]));
        for (position, i) in group.into_iter().enumerate() {
            predictions[i].rank = position + 1;
        }
    }
    Ok(predictions)
}

/// Mean rank of the opened rows.
pub fn mean_rank(predictions: &[Prediction]) -> Option<f64> {
    let ranks: Vec<f64> = predictions
        .iter()
        .filter(|p| p.opened)
        .map(|p| p.rank as f64)
        .collect();
    if ranks.is_empty() {
        None
    } else {
        Some(ranks.iter().sum::<f64>() / ranks.len() as f64)
    }
}

/// Mean average precision at `k` over impressions with at least one open.
pub fn map_at_k(predictions: &[Prediction], k: usize) -> f64 {
    let mut total = 0.0;
    let mut counted = 0usize;

    for group in impressions(predictions) {
        let relevant = group.iter().filter(|&&i| predictions[i].opened).count();
        if relevant == 0 {
            continue;
        }

        let mut ranked: Vec<&Prediction> = group.iter().map(|&i| &predictions[i]).collect();
        ranked.sort_by_key(|p| p.rank);

        let mut hits = 0usize;
        let mut precision_sum = 0.0;
        for (position, p) in ranked.iter().take(k).enumerate() {
            if p.opened {
                hits += 1;
                precision_sum += hits as f64 / (position + 1) as f64;
            }
        }
        total += precision_sum / relevant.min(k) as f64;
        counted += 1;
    }

    if counted == 0 {
        0.0
    } else {
        total / counted as f64
    }
}

pub fn ranking_report(predictions: &[Prediction]) -> RankingReport {
    RankingReport {
        rows: predictions.len(),
        opened: predictions.iter().filter(|p| p.opened).count(),
        mean_rank: mean_rank(predictions),
        map_at_10: map_at_k(predictions, MAP_CUTOFF),
    }
}

/// Predictions laid out as a snapshot table.
pub fn predictions_table(predictions: &[Prediction]) -> Result<Table> {
    let n = predictions.len();
    let mut post_ids = Vec::with_capacity(n);
    let mut user_ids = Vec::with_capacity(n);
    let mut times = Vec::with_capacity(n);
    let mut opened = Vec::with_capacity(n);
    let mut scores = Vec::with_capacity(n);
    let mut ranks = Vec::with_capacity(n);

    for p in predictions {
        post_ids.push(Value::Str(p.post_id.to_string()));
        user_ids.push(Value::Str(p.user_id.to_string()));
        times.push(Value::Time(p.event_time));
        opened.push(Value::Bool(p.opened));
        scores.push(Value::Float(f64::from(p.prediction)));
        ranks.push(Value::Int(p.rank as i64));
    }

    Table::from_columns(vec![
        Column::new(POST_ID, post_ids),
        Column::new(USER_ID, user_ids),
        Column::new(EVENT_TIME, times),
        Column::new(OPENED, opened),
        Column::new(PREDICTION, scores),
        Column::new(RANK, ranks),
    ])
}

/// Scores and ranks bound matrices with a trained model.
pub struct Predictor<'a> {
    model: &'a LogisticRegression,
}

impl<'a> Predictor<'a> {
    pub fn new(model: &'a LogisticRegression) -> Self {
        Self { model }
    }

    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<(Vec<Prediction>, RankingReport)> {
        let scores = self.model.predict(matrix)?;
        let predictions = rank_predictions(matrix, &scores)?;
        let report = ranking_report(&predictions);

        metrics().rows_scored.inc_by(predictions.len() as u64);
        info!(
            rows = report.rows,
            opened = report.opened,
            mean_rank = ?report.mean_rank,
            map_at_10 = report.map_at_10,
            "Predictions ranked"
        );
        Ok((predictions, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::Array2;
    use ranker_core::RowId;

    fn matrix(rows: &[(&str, &str, u32, bool)]) -> FeatureMatrix {
        FeatureMatrix {
            ids: rows
                .iter()
                .map(|&(post, user, hour, _)| RowId {
                    post_id: post.into(),
                    user_id: user.into(),
                    event_time: Utc.with_ymd_and_hms(2021, 5, 3, hour, 0, 0).unwrap(),
                })
                .collect(),
            columns: Vec::new(),
            values: Array2::zeros((rows.len(), 0)),
            labels: rows.iter().map(|r| if r.3 { 1.0 } else { 0.0 }).collect(),
        }
    }

    fn ranks(predictions: &[Prediction]) -> Vec<usize> {
        predictions.iter().map(|p| p.rank).collect()
    }

    #[test]
    fn test_ranks_within_user_and_time() {
        let m = matrix(&[
            ("p1", "u1", 8, false),
            ("p2", "u1", 8, true),
            ("p3", "u1", 8, false),
            ("p1", "u1", 9, true),
            ("p1", "u2", 8, false),
        ]);
        let predictions = rank_predictions(&m, &[0.2, 0.9, 0.5, 0.1, 0.3]).unwrap();

        assert_eq!(ranks(&predictions), vec![3, 1, 2, 1, 1]);
    }

    #[test]
    fn test_equal_scores_rank_by_post_id() {
        let m = matrix(&[("p9", "u1", 8, false), ("p1", "u1", 8, false), ("p5", "u1", 8, true)]);
        let predictions = rank_predictions(&m, &[0.5, 0.5, 0.5]).unwrap();

        assert_eq!(ranks(&predictions), vec![3, 1, 2]);
    }

    #[test]
    fn test_metrics() {
        let m = matrix(&[
            ("p1", "u1", 8, false),
            ("p2", "u1", 8, true),
            ("p3", "u2", 8, true),
            ("p4", "u2", 8, false),
            ("p5", "u3", 8, false),
        ]);
        // u1: opened post ranked 2nd. u2: opened post ranked 1st. u3: no opens.
        let predictions = rank_predictions(&m, &[0.9, 0.1, 0.8, 0.2, 0.5]).unwrap();
        let report = ranking_report(&predictions);

        assert_eq!(report.opened, 2);
        assert_eq!(report.mean_rank, Some(1.5));
        assert!((report.map_at_10 - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_nothing_opened() {
        let m = matrix(&[("p1", "u1", 8, false)]);
        let predictions = rank_predictions(&m, &[0.4]).unwrap();
        let report = ranking_report(&predictions);

        assert_eq!(report.mean_rank, None);
        assert_eq!(report.map_at_10, 0.0);
    }

    #[test]
    fn test_score_count_mismatch() {
        let m = matrix(&[("p1", "u1", 8, false)]);
        assert!(rank_predictions(&m, &[]).is_err());
    }

    #[test]
    fn test_predictions_table_layout() {
        let m = matrix(&[("p1", "u1", 8, true)]);
        let table = predictions_table(&rank_predictions(&m, &[0.25]).unwrap()).unwrap();

        assert_eq!(
            table.column_names(),
            vec!["post_id", "user_id", "event_time", "opened", "prediction", "rank"]
        );
        assert_eq!(table.column("rank").unwrap().values[0], Value::Int(1));
        assert_eq!(table.column("prediction").unwrap().values[0], Value::Float(0.25));
    }
}
