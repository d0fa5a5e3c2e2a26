//! Score fusion, adaptive thresholds and streaming detection.
//!
//! - [`hybrid`] — reconstruction model + isolation scorer, threshold-ratio normalization
//! - [`ensemble`] — hybrid + attention model + second isolation scorer, batch min–max normalization
//! - [`online`] — adaptive threshold with analyst feedback
//! - [`realtime`] — bounded per-stream buffers, one result per event
//! - [`bundle`] — persisted, checksummed detector
//! - [`fallback`] — rule-based scorer used when no bundle is available
//! - [`service`] — model-or-rules dispatch
//! - [`training`] — offline fit and evaluation from labeled events

pub mod bundle;
pub mod ensemble;
pub mod fallback;
pub mod hybrid;
pub mod online;
pub mod realtime;
pub mod service;
pub mod training;

pub use bundle::ModelBundle;
pub use ensemble::{EnsembleDetector, EnsembleLabels, EnsembleScores};
pub use fallback::RuleBasedScorer;
pub use hybrid::{HybridDetector, HybridLabels, HybridScores, Thresholds};
pub use online::{OnlineLearningDetector, OnlineSnapshot};
pub use realtime::{BufferStats, RealTimeDetector};
pub use service::{DetectionService, Scored};
pub use training::{EvaluationReport, LabeledEvent, Trainer, TrainingOutcome};

use crate::config::{BackendKind, EngineConfig};
use crate::error::Result;
use crate::events::{EventDetails, Timestamp};
use crate::features::SequenceBatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-event verdict. Model-scored, rule-scored and cold-start results share this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub event_id: String,
    pub timestamp: Option<Timestamp>,
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub confidence: f64,
    pub reason: String,
    /// Stable keys: `lstm_score`, `isolation_score`, `hybrid_score`,
    /// `ensemble_score`, `transformer_score`, `rule_based_score`
    pub model_scores: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_details: Option<EventDetails>,
}

/// Fitted detector that scores windows; also the persisted bundle payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    Hybrid(HybridDetector),
    Ensemble(EnsembleDetector),
}

/// Fused outcome for one window, with the member signals used to explain it.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowVerdict {
    pub score: f64,
    pub is_anomaly: bool,
    /// Label threshold `score` was compared against
    pub label_threshold: f64,
    /// Sequence (temporal) member flagged
    pub temporal_flag: bool,
    pub temporal_score: f64,
    /// Isolation member flagged
    pub outlier_flag: bool,
    pub outlier_score: f64,
    pub model_scores: BTreeMap<String, f64>,
}

impl DetectorBackend {
    /// Unfitted detector of the configured kind
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(match config.realtime.backend {
            BackendKind::Hybrid => DetectorBackend::Hybrid(HybridDetector::from_config(config)?),
            BackendKind::Ensemble => DetectorBackend::Ensemble(EnsembleDetector::from_config(config)?),
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            DetectorBackend::Hybrid(_) => BackendKind::Hybrid,
            DetectorBackend::Ensemble(_) => BackendKind::Ensemble,
        }
    }

    pub fn is_fitted(&self) -> bool {
        match self {
            DetectorBackend::Hybrid(d) => d.is_fitted(),
            DetectorBackend::Ensemble(d) => d.is_fitted(),
        }
    }

    pub fn fit(&mut self, batch: &SequenceBatch) -> Result<()> {
        match self {
            DetectorBackend::Hybrid(d) => d.fit(batch),
            DetectorBackend::Ensemble(d) => d.fit(batch),
        }
    }

    /// Binary labels at the detector's configured label threshold
    pub fn predict_labels(&self, batch: &SequenceBatch) -> Result<Vec<u8>> {
        match self {
            DetectorBackend::Hybrid(d) => Ok(d.predict_labels(batch, d.label_threshold())?.hybrid),
            DetectorBackend::Ensemble(d) => Ok(d.predict_labels(batch, d.label_threshold())?.ensemble),
        }
    }

    /// Score the first window of `batch`
    pub fn score_window(&self, batch: &SequenceBatch) -> Result<WindowVerdict> {
        match self {
            DetectorBackend::Hybrid(d) => {
                let threshold = d.label_threshold();
                let labels = d.predict_labels(batch, threshold)?;
                let s = &labels.scores;
                let score = first(&s.hybrid);
                Ok(WindowVerdict {
                    score,
                    is_anomaly: first(&labels.hybrid) == 1,
                    label_threshold: threshold,
                    temporal_flag: first(&labels.reconstruction) == 1,
                    temporal_score: first(&s.reconstruction_normalized),
                    outlier_flag: first(&labels.isolation) == 1,
                    outlier_score: first(&s.isolation_normalized),
                    model_scores: BTreeMap::from([
                        ("lstm_score".to_string(), first(&s.reconstruction_normalized)),
                        ("isolation_score".to_string(), first(&s.isolation_normalized)),
                        ("hybrid_score".to_string(), score),
                    ]),
                })
            }
            DetectorBackend::Ensemble(d) => {
                let threshold = d.label_threshold();
                let labels = d.predict_labels(batch, threshold)?;
                let s = &labels.scores;
                let score = first(&s.ensemble);
                Ok(WindowVerdict {
                    score,
                    is_anomaly: first(&labels.ensemble) == 1,
                    label_threshold: threshold,
                    temporal_flag: first(&s.transformer) > threshold,
                    temporal_score: first(&s.transformer),
                    outlier_flag: first(&s.isolation) > threshold,
                    outlier_score: first(&s.isolation),
                    model_scores: BTreeMap::from([
                        ("ensemble_score".to_string(), score),
                        ("hybrid_score".to_string(), first(&s.hybrid)),
                        ("transformer_score".to_string(), first(&s.transformer)),
                        ("isolation_score".to_string(), first(&s.isolation)),
                    ]),
                })
            }
        }
    }
}

fn first<T: Copy + Default>(values: &[T]) -> T {
    values.first().copied().unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::EngineConfig;
    use crate::features::{build_sequences, FeatureVector, SequenceBatch, FEATURE_DIM};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Small training budget for unit tests
    pub fn fast_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.recurrent.epochs = 80;
        config.attention.epochs = 80;
        config.isolation.n_estimators = 50;
        config
    }

    /// Jittered vectors around a fixed per-dimension baseline
    pub fn normal_vectors(n: usize, seed: u64) -> Vec<FeatureVector> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let mut fv = FeatureVector::zeros();
                for j in 0..FEATURE_DIM {
                    let base = 1.0 + j as f64 * 0.5;
                    fv.values[j] = base * (1.0 + rng.gen_range(-0.1..0.1));
                }
                fv
            })
            .collect()
    }

    /// `windows` overlapping normal windows
    pub fn synthetic_batch(windows: usize, seed: u64) -> SequenceBatch {
        build_sequences(&normal_vectors(windows + 9, seed), 10, 1)
    }

    /// Windows whose every value is far outside the normal baseline
    pub fn outlier_batch(windows: usize) -> SequenceBatch {
        let mut vectors = normal_vectors(windows + 9, 99);
        for (i, fv) in vectors.iter_mut().enumerate() {
            for (j, v) in fv.values.iter_mut().enumerate() {
                *v *= if (i + j) % 2 == 0 { 40.0 } else { -30.0 };
            }
        }
        build_sequences(&vectors, 10, 1)
    }
}
