//! Two-model fusion: one reconstruction model plus the isolation scorer.
//!
//! Raw scores are divided by per-model calibration thresholds (95th percentile of
//! in-sample scores) and clipped to [0, 2], so 1.0 sits exactly on the threshold.

use crate::config::{EngineConfig, HybridConfig};
use crate::error::{EngineError, Result};
use crate::features::SequenceBatch;
use crate::model::stats::percentile;
use crate::model::{IsolationScorer, ReconstructionKind, ReconstructionModel, Reconstructor};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

const NORMALIZE_EPS: f64 = 1e-8;
const NORMALIZED_CAP: f64 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridDetector {
    config: HybridConfig,
    reconstruction: Reconstructor,
    isolation: IsolationScorer,
    thresholds: Option<Thresholds>,
}

/// Per-model calibration thresholds, fixed at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub reconstruction: f64,
    pub isolation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridScores {
    pub reconstruction: Vec<f64>,
    pub isolation: Vec<f64>,
    pub reconstruction_normalized: Vec<f64>,
    pub isolation_normalized: Vec<f64>,
    /// Weighted sum of the normalized scores, in [0, 2]
    pub hybrid: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridLabels {
    pub reconstruction: Vec<u8>,
    /// From the isolation scorer's own boundary, not the label threshold
    pub isolation: Vec<u8>,
    pub hybrid: Vec<u8>,
    pub scores: HybridScores,
}

/// Reject negative weights; warn when they do not sum to 1.
pub(crate) fn validate_weights(weights: &[(&str, f64)]) -> Result<()> {
    if let Some((name, w)) = weights.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
        return Err(EngineError::InvalidConfig(format!("weight {name} must be non-negative, got {w}")));
    }
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if (total - 1.0).abs() > 1e-6 {
        tracing::warn!(total, "fusion weights do not sum to 1");
    }
    Ok(())
}

fn normalize(raw: &[f64], threshold: f64) -> Vec<f64> {
    raw.iter()
        .map(|s| (s / (threshold + NORMALIZE_EPS)).clamp(0.0, NORMALIZED_CAP))
        .collect()
}

impl HybridDetector {
    pub fn new(config: HybridConfig, reconstruction: Reconstructor, isolation: IsolationScorer) -> Result<Self> {
        validate_weights(&[
            ("reconstruction", config.reconstruction_weight),
            ("isolation", config.isolation_weight),
        ])?;
        Ok(Self {
            config,
            reconstruction,
            isolation,
            thresholds: None,
        })
    }

    /// Recurrent reconstruction model plus isolation scorer, from engine configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(
            config.hybrid.clone(),
            Reconstructor::new(ReconstructionKind::Recurrent, config.recurrent.clone()),
            IsolationScorer::new(config.isolation.clone()),
        )
    }

    pub fn is_fitted(&self) -> bool {
        self.thresholds.is_some() && self.reconstruction.is_fitted() && self.isolation.is_fitted()
    }

    pub fn thresholds(&self) -> Option<Thresholds> {
        self.thresholds
    }

    pub fn label_threshold(&self) -> f64 {
        self.config.label_threshold
    }

    /// Windows the members are fitted on: `batch`, plus its steady-state
    /// windows when enabled.
    pub(crate) fn training_batch<'a>(&self, batch: &'a SequenceBatch) -> Cow<'a, SequenceBatch> {
        if self.config.steady_state_windows {
            Cow::Owned(batch.with_steady_state())
        } else {
            Cow::Borrowed(batch)
        }
    }

    /// Fit both members on normal-only windows, then calibrate thresholds on the same data.
    pub fn fit(&mut self, batch: &SequenceBatch) -> Result<()> {
        let batch = self.training_batch(batch);
        self.reconstruction.fit(&batch.sequences)?;
        self.isolation.fit(&batch.aggregated)?;

        let recon = self.reconstruction.reconstruction_error(&batch.sequences)?;
        let iso = self.isolation.score(&batch.aggregated)?;
        let thresholds = Thresholds {
            reconstruction: percentile(&recon, self.config.percentile)
                .max(self.config.min_reconstruction_threshold),
            isolation: percentile(&iso, self.config.percentile).max(self.config.min_isolation_threshold),
        };
        tracing::info!(
            windows = batch.len(),
            reconstruction_threshold = thresholds.reconstruction,
            isolation_threshold = thresholds.isolation,
            "hybrid detector fitted"
        );
        self.thresholds = Some(thresholds);
        Ok(())
    }

    pub fn predict_scores(&self, batch: &SequenceBatch) -> Result<HybridScores> {
        let thresholds = self.thresholds.ok_or_else(|| EngineError::not_fitted("hybrid"))?;
        let reconstruction = self.reconstruction.reconstruction_error(&batch.sequences)?;
        let isolation = self.isolation.score(&batch.aggregated)?;

        let reconstruction_normalized = normalize(&reconstruction, thresholds.reconstruction);
        let isolation_normalized = normalize(&isolation, thresholds.isolation);
        let hybrid = reconstruction_normalized
            .iter()
            .zip(&isolation_normalized)
            .map(|(r, i)| self.config.reconstruction_weight * r + self.config.isolation_weight * i)
            .collect();

        Ok(HybridScores {
            reconstruction,
            isolation,
            reconstruction_normalized,
            isolation_normalized,
            hybrid,
        })
    }

    pub fn predict_labels(&self, batch: &SequenceBatch, threshold: f64) -> Result<HybridLabels> {
        let scores = self.predict_scores(batch)?;
        let flag = |v: &Vec<f64>| v.iter().map(|s| u8::from(*s > threshold)).collect::<Vec<u8>>();
        Ok(HybridLabels {
            reconstruction: flag(&scores.reconstruction_normalized),
            isolation: self.isolation.classify(&batch.aggregated)?,
            hybrid: flag(&scores.hybrid),
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::{fast_config, outlier_batch, synthetic_batch};
    use crate::features::{build_sequences, FeatureVector, FEATURE_DIM};

    fn fitted() -> HybridDetector {
        let mut d = HybridDetector::from_config(&fast_config()).unwrap();
        d.fit(&synthetic_batch(60, 1)).unwrap();
        d
    }

    #[test]
    fn negative_weight_rejected() {
        let mut config = fast_config();
        config.hybrid.isolation_weight = -0.1;
        assert!(matches!(
            HybridDetector::from_config(&config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn default_weights_sum_to_one() {
        let c = HybridConfig::default();
        assert!((c.reconstruction_weight + c.isolation_weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scores_are_bounded_and_weighted() {
        let d = fitted();
        for batch in [synthetic_batch(20, 9), outlier_batch(5)] {
            let s = d.predict_scores(&batch).unwrap();
            for i in 0..batch.len() {
                assert!((0.0..=2.0).contains(&s.hybrid[i]));
                let expected = 0.6 * s.reconstruction_normalized[i] + 0.4 * s.isolation_normalized[i];
                assert!((s.hybrid[i] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn outliers_score_higher_than_normal() {
        let d = fitted();
        let normal = d.predict_scores(&synthetic_batch(20, 3)).unwrap();
        let weird = d.predict_scores(&outlier_batch(3)).unwrap();
        let max_normal = normal.hybrid.iter().copied().fold(0.0, f64::max);
        assert!(weird.hybrid.iter().all(|s| *s >= max_normal));
        let labels = d.predict_labels(&outlier_batch(3), 0.5).unwrap();
        assert!(labels.hybrid.iter().all(|l| *l == 1));
    }

    #[test]
    fn labels_follow_their_own_rules() {
        let d = fitted();
        let batch = synthetic_batch(30, 4);
        let labels = d.predict_labels(&batch, 0.5).unwrap();
        assert_eq!(labels.isolation, d.isolation.classify(&batch.aggregated).unwrap());
        for (l, s) in labels.hybrid.iter().zip(&labels.scores.hybrid) {
            assert_eq!(*l == 1, *s > 0.5);
        }
    }

    #[test]
    fn isolation_labels_ignore_the_label_threshold() {
        let d = fitted();

        // Outside the scorer's boundary, yet below a threshold past the cap
        let outliers = outlier_batch(3);
        let strict = d.predict_labels(&outliers, NORMALIZED_CAP + 0.5).unwrap();
        assert!(strict.isolation.iter().all(|l| *l == 1));
        assert!(strict.scores.isolation_normalized.iter().all(|s| *s <= NORMALIZED_CAP));
        assert!(strict.hybrid.iter().all(|l| *l == 0));
        assert_eq!(strict.isolation, d.predict_labels(&outliers, 0.5).unwrap().isolation);

        // Every normalized score clears a negative threshold; most windows stay inside the boundary
        let normal = synthetic_batch(30, 4);
        let lax = d.predict_labels(&normal, -1.0).unwrap();
        assert!(lax.reconstruction.iter().all(|l| *l == 1));
        assert!(lax.isolation.iter().any(|l| *l == 0));
    }

    #[test]
    fn uniform_training_data_keeps_threshold_floors() {
        let config = fast_config();
        let vectors = vec![FeatureVector { values: [2.5; FEATURE_DIM] }; 40];
        let batch = build_sequences(&vectors, 10, 1);
        let mut d = HybridDetector::from_config(&config).unwrap();
        d.fit(&batch).unwrap();

        let t = d.thresholds().unwrap();
        assert_eq!(t.reconstruction, config.hybrid.min_reconstruction_threshold);
        assert_eq!(t.isolation, config.hybrid.min_isolation_threshold);
        let labels = d.predict_labels(&batch, config.hybrid.label_threshold).unwrap();
        assert!(labels.hybrid.iter().all(|l| *l == 0));
    }

    #[test]
    fn unfitted_refuses() {
        let d = HybridDetector::from_config(&fast_config()).unwrap();
        assert!(!d.is_fitted());
        assert!(matches!(
            d.predict_scores(&synthetic_batch(2, 1)),
            Err(EngineError::NotFitted { .. })
        ));
    }
}
