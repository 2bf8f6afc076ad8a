//! Holdout evaluation
//!
//! Train on every season but one, score the held-out season, and report
//! per-class precision, recall and F1 alongside accuracy and Brier score.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::feature_set::TrainingSlice;
use crate::error::{PipelineError, Result};
use crate::predictor::{WinPredictor, DECISION_THRESHOLD};

/// Metrics for one class of the winner label
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub holdout_year: Option<i32>,
    /// Label 0: did not win
    pub loser: ClassMetrics,
    /// Label 1: won
    pub winner: ClassMetrics,
    pub accuracy: f64,
    pub brier_score: f64,
    pub total: usize,
}

impl ClassificationReport {
    /// Score probabilities against true labels
    pub fn from_probabilities(labels: &[bool], probs: &[f64]) -> Result<Self> {
        if labels.len() != probs.len() {
            return Err(PipelineError::Prediction(format!(
                "{} labels but {} probabilities",
                labels.len(),
                probs.len()
            )));
        }
        if labels.is_empty() {
            return Ok(Self::default());
        }

        let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        let mut squared_error = 0.0;
        for (&y, &p) in labels.iter().zip(probs) {
            let predicted = p >= DECISION_THRESHOLD;
            match (predicted, y) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
            let outcome = if y { 1.0 } else { 0.0 };
            squared_error += (p - outcome).powi(2);
        }

        let total = labels.len();
        Ok(Self {
            holdout_year: None,
            // The negative class swaps the roles of the counts
            loser: ClassMetrics::from_counts(tn, fn_, fp),
            winner: ClassMetrics::from_counts(tp, fp, fn_),
            accuracy: ratio(tp + tn, total),
            brier_score: squared_error / total as f64,
            total,
        })
    }

    pub fn macro_f1(&self) -> f64 {
        (self.loser.f1 + self.winner.f1) / 2.0
    }

    /// Support-weighted average of a per-class metric
    pub fn weighted<F>(&self, metric: F) -> f64
    where
        F: Fn(&ClassMetrics) -> f64,
    {
        if self.total == 0 {
            return 0.0;
        }
        (metric(&self.loser) * self.loser.support as f64
            + metric(&self.winner) * self.winner.support as f64)
            / self.total as f64
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(year) = self.holdout_year {
            writeln!(f, "Holdout season {}", year)?;
        }
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (label, m) in [("0", &self.loser), ("1", &self.winner)] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        writeln!(
            f,
            "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
            "macro avg",
            (self.loser.precision + self.winner.precision) / 2.0,
            (self.loser.recall + self.winner.recall) / 2.0,
            self.macro_f1(),
            self.total
        )?;
        writeln!(
            f,
            "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
            "weighted avg",
            self.weighted(|m| m.precision),
            self.weighted(|m| m.recall),
            self.weighted(|m| m.f1),
            self.total
        )?;
        write!(f, "{:>14} {:>10.4}", "brier", self.brier_score)
    }
}

/// Fit on every season except `year` and report on `year`
pub fn holdout_report(
    slice: &TrainingSlice,
    year: i32,
    predictor: &mut dyn WinPredictor,
) -> Result<ClassificationReport> {
    let (train, holdout) = slice.split_by_year(year);
    if holdout.is_empty() {
        return Err(PipelineError::Config(format!(
            "No rows with complete history in holdout season {}",
            year
        )));
    }
    if train.is_empty() {
        return Err(PipelineError::Config(format!(
            "No training rows outside holdout season {}",
            year
        )));
    }

    predictor.fit(&train)?;
    let probs = predictor.predict_proba(&holdout.features)?;
    let mut report = ClassificationReport::from_probabilities(&holdout.labels, &probs)?;
    report.holdout_year = Some(year);

    info!(
        "Holdout {}: {} rows, accuracy {:.3}, winner F1 {:.3}, Brier {:.4}",
        year, report.total, report.accuracy, report.winner.f1, report.brier_score
    );
    Ok(report)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
