//! Offline training from labeled events.
//!
//! Labels select the normal-only training windows and score the evaluation; they
//! never reach the models themselves.

use super::DetectorBackend;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::features::{build_sequences, FeatureExtractor, SequenceBatch};
use serde::{Deserialize, Serialize};

/// Minimum number of normal windows required to fit.
const MIN_NORMAL_WINDOWS: usize = 2;

/// One training line: `{"event": {...}, "label": true}`; `true` marks an anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledEvent {
    pub event: Event,
    #[serde(default)]
    pub label: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
}

impl EvaluationReport {
    /// `predicted[i]` is 1 for a flagged window; `actual[i]` is the ground truth.
    pub fn from_predictions(predicted: &[u8], actual: &[bool]) -> Self {
        let (mut tp, mut fp, mut tn, mut fn_) = (0, 0, 0, 0);
        for (p, a) in predicted.iter().zip(actual) {
            match (*p == 1, *a) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
        }
        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            true_positives: tp,
            false_positives: fp,
            true_negatives: tn,
            false_negatives: fn_,
            precision,
            recall,
            f1,
            accuracy: ratio(tp + tn, tp + fp + tn + fn_),
        }
    }
}

pub struct TrainingOutcome {
    pub detector: DetectorBackend,
    pub report: EvaluationReport,
    pub normal_windows: usize,
    pub total_windows: usize,
}

pub struct Trainer {
    config: EngineConfig,
    extractor: FeatureExtractor,
}

impl Trainer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
        }
    }

    /// Sequence windows over the events in order, with a per-window label that is
    /// true when any event inside the window is anomalous.
    pub fn prepare(&self, events: &[LabeledEvent]) -> (SequenceBatch, Vec<bool>) {
        let length = self.config.features.sequence_length.max(1);
        let step = self.config.features.step_size.max(1);
        let vectors: Vec<_> = events.iter().map(|e| self.extractor.extract(&e.event)).collect();
        let batch = build_sequences(&vectors, length, step);

        // Windows are laid over the left-padded row space, as in build_sequences
        let rows = events.len().max(length);
        let pad = rows - events.len();
        let labels = (0..=rows - length)
            .step_by(step)
            .map(|start| {
                let lo = start.saturating_sub(pad);
                let hi = (start + length).saturating_sub(pad);
                events[lo..hi].iter().any(|e| e.label)
            })
            .collect();
        (batch, labels)
    }

    /// Fit the configured backend on normal windows, then evaluate it on all windows.
    pub fn train(&self, events: &[LabeledEvent]) -> Result<TrainingOutcome> {
        let (batch, labels) = self.prepare(events);
        let normal: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter_map(|(i, anomalous)| (!anomalous).then_some(i))
            .collect();
        if normal.len() < MIN_NORMAL_WINDOWS {
            return Err(EngineError::InsufficientData {
                min: MIN_NORMAL_WINDOWS,
                actual: normal.len(),
            });
        }

        let mut detector = DetectorBackend::from_config(&self.config)?;
        tracing::info!(
            events = events.len(),
            windows = batch.len(),
            normal_windows = normal.len(),
            backend = ?detector.kind(),
            "training on normal windows"
        );
        detector.fit(&batch.select(&normal))?;

        let report = Self::evaluate(&detector, &batch, &labels)?;
        tracing::info!(
            precision = report.precision,
            recall = report.recall,
            f1 = report.f1,
            accuracy = report.accuracy,
            "evaluation complete"
        );
        Ok(TrainingOutcome {
            detector,
            report,
            normal_windows: normal.len(),
            total_windows: batch.len(),
        })
    }

    pub fn evaluate(detector: &DetectorBackend, batch: &SequenceBatch, labels: &[bool]) -> Result<EvaluationReport> {
        let predicted = detector.predict_labels(batch)?;
        Ok(EvaluationReport::from_predictions(&predicted, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::fast_config;

    fn labeled(n: usize, anomalous: &[usize]) -> Vec<LabeledEvent> {
        (0..n)
            .map(|i| LabeledEvent {
                event: Event {
                    id: Some(i.to_string()),
                    packet_count: Some(10 + (i % 3) as u64),
                    byte_count: Some(1000 + (i % 7) as u64 * 40),
                    duration: Some(1.0 + (i % 5) as f64 * 0.1),
                    src_port: Some(40000 + (i % 11) as u16),
                    dst_port: Some(443),
                    protocol: Some("tcp".into()),
                    ..Event::default()
                },
                label: anomalous.contains(&i),
            })
            .collect()
    }

    #[test]
    fn window_label_is_any_event() {
        let trainer = Trainer::new(fast_config());
        let (batch, labels) = trainer.prepare(&labeled(15, &[12]));
        assert_eq!(batch.len(), 6);
        assert_eq!(labels, vec![false, false, false, true, true, true]);
    }

    #[test]
    fn short_input_is_one_padded_window() {
        let trainer = Trainer::new(fast_config());
        let (batch, labels) = trainer.prepare(&labeled(4, &[1]));
        assert_eq!(batch.len(), 1);
        assert_eq!(labels, vec![true]);
    }

    #[test]
    fn too_few_normal_windows() {
        let trainer = Trainer::new(fast_config());
        let err = trainer.train(&labeled(11, &[5])).err().unwrap();
        assert!(matches!(err, EngineError::InsufficientData { min: 2, actual: 0 }));
    }

    #[test]
    fn report_metrics() {
        let r = EvaluationReport::from_predictions(&[1, 1, 0, 0, 1], &[true, false, false, true, true]);
        assert_eq!((r.true_positives, r.false_positives, r.true_negatives, r.false_negatives), (2, 1, 1, 1));
        assert!((r.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.f1 - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.accuracy - 0.6).abs() < 1e-12);
    }

    #[test]
    fn empty_denominators_are_zero() {
        let r = EvaluationReport::from_predictions(&[0, 0], &[false, false]);
        assert_eq!(r.precision, 0.0);
        assert_eq!(r.recall, 0.0);
        assert_eq!(r.f1, 0.0);
        assert_eq!(r.accuracy, 1.0);
    }

    #[test]
    fn trains_configured_backend() {
        let trainer = Trainer::new(fast_config());
        let outcome = trainer.train(&labeled(60, &[55])).unwrap();
        assert!(outcome.detector.is_fitted());
        assert_eq!(outcome.total_windows, 51);
        assert_eq!(outcome.normal_windows, 46);
        let r = outcome.report;
        assert_eq!(
            r.true_positives + r.false_positives + r.true_negatives + r.false_negatives,
            51
        );
    }
}
