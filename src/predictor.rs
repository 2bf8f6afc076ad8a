//! Winner classifiers and ranking

use tracing::{debug, info};

use crate::data::feature_set::TrainingSlice;
use crate::error::{PipelineError, Result};
use crate::models::{RaceIdentity, WinProbability};

/// Winners are roughly one row in twenty; the positive class is upweighted to match
pub const DEFAULT_POSITIVE_WEIGHT: f64 = 16.0;
const DEFAULT_EPOCHS: usize = 500;
const DEFAULT_LEARNING_RATE: f64 = 0.1;
const DEFAULT_L2: f64 = 1e-3;
/// Probability at or above which a row is classified as a winner
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Binary classifier producing P(winner) per feature row
pub trait WinPredictor {
    fn fit(&mut self, train: &TrainingSlice) -> Result<()>;

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Hard 0/1 predictions at [`DECISION_THRESHOLD`]
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<bool>> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| p >= DECISION_THRESHOLD)
            .collect())
    }
}

/// Fitted parameters
#[derive(Debug, Clone)]
struct LogisticModel {
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticModel {
    fn score(&self, x: &[f64]) -> f64 {
        let z: f64 = x
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.weights)
            .map(|(((v, m), s), w)| (v - m) / s * w)
            .sum::<f64>()
            + self.bias;
        sigmoid(z)
    }
}

/// Class-weighted logistic regression trained by full-batch gradient descent
///
/// Features are standardized on the training slice. Training is
/// deterministic: weights start at zero and every epoch sees every row.
#[derive(Debug, Clone)]
pub struct LogisticPredictor {
    positive_weight: f64,
    epochs: usize,
    learning_rate: f64,
    l2: f64,
    model: Option<LogisticModel>,
}

impl Default for LogisticPredictor {
    fn default() -> Self {
        Self {
            positive_weight: DEFAULT_POSITIVE_WEIGHT,
            epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
            l2: DEFAULT_L2,
            model: None,
        }
    }
}

impl LogisticPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positive_weight(mut self, weight: f64) -> Self {
        self.positive_weight = weight;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Fitted weights on the standardized features
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.model.as_ref().map(|m| m.weights.as_slice())
    }
}

impl WinPredictor for LogisticPredictor {
    fn fit(&mut self, train: &TrainingSlice) -> Result<()> {
        if train.is_empty() {
            return Err(PipelineError::Prediction(
                "Cannot fit on an empty training slice".to_string(),
            ));
        }
        if train.labels.len() != train.len() {
            return Err(PipelineError::Prediction(format!(
                "{} feature rows but {} labels",
                train.len(),
                train.labels.len()
            )));
        }

        let width = train.features[0].len();
        check_width(&train.features, width)?;

        let n = train.len() as f64;
        let mut means = vec![0.0; width];
        for row in &train.features {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut scales = vec![0.0; width];
        for row in &train.features {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2) / n;
            }
        }
        // Constant columns contribute nothing after centering
        for s in &mut scales {
            *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
        }

        let standardized: Vec<Vec<f64>> = train
            .features
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&means)
                    .zip(&scales)
                    .map(|((v, m), s)| (v - m) / s)
                    .collect()
            })
            .collect();
        let sample_weights: Vec<f64> = train
            .labels
            .iter()
            .map(|&y| if y { self.positive_weight } else { 1.0 })
            .collect();
        let total_weight: f64 = sample_weights.iter().sum();

        let mut weights = vec![0.0; width];
        let mut bias = 0.0;
        for _ in 0..self.epochs {
            let mut grad = vec![0.0; width];
            let mut grad_bias = 0.0;

            for ((x, &y), sw) in standardized.iter().zip(&train.labels).zip(&sample_weights) {
                let z: f64 = x.iter().zip(&weights).map(|(v, w)| v * w).sum::<f64>() + bias;
                let err = (sigmoid(z) - if y { 1.0 } else { 0.0 }) * sw;
                for (g, v) in grad.iter_mut().zip(x) {
                    *g += err * v;
                }
                grad_bias += err;
            }

            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= self.learning_rate * (g / total_weight + self.l2 * *w);
            }
            bias -= self.learning_rate * grad_bias / total_weight;
        }

        info!(
            "Fitted logistic predictor on {} rows ({} winners, {} features)",
            train.len(),
            train.winners(),
            width
        );
        self.model = Some(LogisticModel {
            means,
            scales,
            weights,
            bias,
        });
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
        let model = self.model.as_ref().ok_or_else(|| {
            PipelineError::Prediction("Predictor has not been fitted".to_string())
        })?;
        check_width(features, model.weights.len())?;

        let probs: Vec<f64> = features.iter().map(|x| model.score(x)).collect();
        debug!("Scored {} rows", probs.len());
        Ok(probs)
    }
}

fn check_width(features: &[Vec<f64>], width: usize) -> Result<()> {
    match features.iter().position(|row| row.len() != width) {
        Some(i) => Err(PipelineError::Prediction(format!(
            "Row {} has {} features, expected {}",
            i,
            features[i].len(),
            width
        ))),
        None => Ok(()),
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Pair identities with win probabilities, most likely winner first
///
/// Equal probabilities are ordered by driver code.
pub fn rank_winners(ids: &[RaceIdentity], probs: &[f64]) -> Result<Vec<WinProbability>> {
    if ids.len() != probs.len() {
        return Err(PipelineError::Prediction(format!(
            "{} drivers but {} probabilities",
            ids.len(),
            probs.len()
        )));
    }

    let mut ranked: Vec<WinProbability> = ids
        .iter()
        .zip(probs)
        .map(|(id, &probability)| WinProbability {
            driver: id.driver.clone(),
            year: id.year,
            race_id: id.race_id,
            probability,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.driver.cmp(&b.driver))
    });
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(driver: &str) -> RaceIdentity {
        RaceIdentity {
            driver: driver.to_string(),
            year: 2025,
            race_id: 5,
        }
    }

    /// Low previous average position wins
    fn separable_slice() -> TrainingSlice {
        let mut slice = TrainingSlice {
            columns: vec!["Prev_Avg_Position", "Prev_Avg_GridPosition"],
            ..Default::default()
        };
        for i in 0..40 {
            let pos = (i % 20) as f64 + 1.0;
            slice.features.push(vec![pos, pos + 0.5]);
            slice.labels.push(pos <= 1.0);
            slice.ids.push(RaceIdentity {
                driver: format!("D{:02}", i % 20),
                year: 2024,
                race_id: i / 20 + 1,
            });
        }
        slice
    }

    #[test]
    fn test_fit_ranks_front_runner_first() {
        let mut predictor = LogisticPredictor::new();
        predictor.fit(&separable_slice()).unwrap();
        assert!(predictor.is_fitted());

        let probs = predictor
            .predict_proba(&[vec![1.0, 1.5], vec![10.0, 10.5], vec![20.0, 20.5]])
            .unwrap();
        assert!(probs[0] > probs[1]);
        assert!(probs[1] > probs[2]);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));

        // Both coefficients push toward lower positions
        assert!(predictor.coefficients().unwrap().iter().all(|&w| w < 0.0));
    }

    #[test]
    fn test_predict_thresholds_probabilities() {
        let mut predictor = LogisticPredictor::new();
        predictor.fit(&separable_slice()).unwrap();
        let hard = predictor.predict(&[vec![1.0, 1.5], vec![20.0, 20.5]]).unwrap();
        assert_eq!(hard, vec![true, false]);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let mut a = LogisticPredictor::new();
        let mut b = LogisticPredictor::new();
        a.fit(&separable_slice()).unwrap();
        b.fit(&separable_slice()).unwrap();
        assert_eq!(a.coefficients(), b.coefficients());
    }

    #[test]
    fn test_constant_column_is_harmless() {
        let mut slice = separable_slice();
        for row in &mut slice.features {
            row.push(0.0);
        }
        let mut predictor = LogisticPredictor::new();
        predictor.fit(&slice).unwrap();
        let probs = predictor.predict_proba(&[vec![1.0, 1.5, 0.0]]).unwrap();
        assert!(probs[0].is_finite());
    }

    #[test]
    fn test_errors() {
        let mut predictor = LogisticPredictor::new();
        assert!(predictor.predict_proba(&[vec![1.0]]).is_err());
        assert!(predictor.fit(&TrainingSlice::default()).is_err());

        predictor.fit(&separable_slice()).unwrap();
        let err = predictor.predict_proba(&[vec![1.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::Prediction(_)));
    }

    #[test]
    fn test_rank_winners_orders_and_breaks_ties() {
        let ids = vec![id("SAI"), id("NOR"), id("LEC"), id("ALB")];
        let ranked = rank_winners(&ids, &[0.10, 0.45, 0.10, 0.05]).unwrap();

        let order: Vec<&str> = ranked.iter().map(|w| w.driver.as_str()).collect();
        assert_eq!(order, vec!["NOR", "LEC", "SAI", "ALB"]);
        assert_eq!(ranked[0].race_id, 5);
        assert_eq!(ranked[0].percent(), "45.00%");
    }

    #[test]
    fn test_rank_winners_length_mismatch() {
        assert!(rank_winners(&[id("VER")], &[0.3, 0.2]).is_err());
    }
}
