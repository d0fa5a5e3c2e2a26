//! Streaming detector: one event in, one [`AnomalyResult`] out.
//!
//! Keeps bounded buffers of recent events and their feature vectors; once
//! `sequence_length` vectors are buffered, the newest window is scored by the
//! fitted backend.

use super::{AnomalyResult, DetectorBackend, WindowVerdict};
use crate::buffer::RingBuffer;
use crate::config::{EngineConfig, RealtimeConfig};
use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::features::{FeatureExtractor, FeatureVector, SequenceBatch, FEATURE_DIM};
use ndarray::Array2;
use serde::Serialize;
use std::collections::BTreeMap;

pub const INSUFFICIENT_DATA: &str = "Insufficient data for analysis";
/// Score at which confidence is zero
const DECISION_POINT: f64 = 0.5;

pub struct RealTimeDetector {
    extractor: FeatureExtractor,
    backend: DetectorBackend,
    sequence_length: usize,
    events: RingBuffer<Event>,
    features: RingBuffer<FeatureVector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub buffer_size: usize,
    pub max_buffer_size: usize,
    pub sequence_length: usize,
    pub ready_for_analysis: bool,
}

impl RealTimeDetector {
    /// The backend must already be fitted (or loaded from a bundle).
    pub fn new(backend: DetectorBackend, sequence_length: usize, config: &RealtimeConfig) -> Result<Self> {
        if !backend.is_fitted() {
            return Err(EngineError::not_fitted("realtime backend"));
        }
        let sequence_length = sequence_length.max(1);
        if config.buffer_size < sequence_length {
            return Err(EngineError::InvalidConfig(format!(
                "buffer_size {} is smaller than sequence_length {sequence_length}",
                config.buffer_size
            )));
        }
        tracing::info!(
            backend = ?backend.kind(),
            sequence_length,
            buffer_size = config.buffer_size,
            "real-time detector initialized"
        );
        Ok(Self {
            extractor: FeatureExtractor::new(),
            backend,
            sequence_length,
            events: RingBuffer::new(config.buffer_size),
            features: RingBuffer::new(config.buffer_size),
        })
    }

    pub fn from_config(backend: DetectorBackend, config: &EngineConfig) -> Result<Self> {
        Self::new(backend, config.features.sequence_length, &config.realtime)
    }

    pub fn backend(&self) -> &DetectorBackend {
        &self.backend
    }

    pub fn process_event(&mut self, event: Event) -> AnomalyResult {
        let fv = self.extractor.extract(&event);
        let event_id = event.event_id();
        let timestamp = event.timestamp.clone();
        let details = event.details();
        self.events.push(event);
        self.features.push(fv);

        if self.features.len() < self.sequence_length {
            return AnomalyResult {
                event_id,
                timestamp,
                is_anomaly: false,
                anomaly_score: 0.0,
                confidence: 0.0,
                reason: INSUFFICIENT_DATA.to_string(),
                model_scores: BTreeMap::new(),
                event_details: None,
            };
        }

        match self.score_latest() {
            Ok(verdict) => {
                let result = AnomalyResult {
                    event_id,
                    timestamp,
                    is_anomaly: verdict.is_anomaly,
                    anomaly_score: verdict.score,
                    confidence: (((verdict.score - DECISION_POINT).abs()) * 2.0).min(1.0),
                    reason: reason_for(&verdict),
                    model_scores: verdict.model_scores,
                    event_details: Some(details),
                };
                if result.is_anomaly {
                    tracing::warn!(
                        event_id = %result.event_id,
                        score = result.anomaly_score,
                        reason = %result.reason,
                        "anomaly detected"
                    );
                }
                result
            }
            Err(e) => {
                tracing::error!(event_id = %event_id, error = %e, "error processing event");
                AnomalyResult {
                    event_id,
                    timestamp,
                    is_anomaly: false,
                    anomaly_score: 0.0,
                    confidence: 0.0,
                    reason: format!("Processing error: {e}"),
                    model_scores: BTreeMap::new(),
                    event_details: None,
                }
            }
        }
    }

    pub fn process_batch(&mut self, events: impl IntoIterator<Item = Event>) -> Vec<AnomalyResult> {
        events.into_iter().map(|e| self.process_event(e)).collect()
    }

    fn score_latest(&self) -> Result<WindowVerdict> {
        let values: Vec<f64> = self
            .features
            .last_n(self.sequence_length)
            .flat_map(|fv| fv.values)
            .collect();
        let window = Array2::from_shape_vec((self.sequence_length, FEATURE_DIM), values)
            .map_err(|e| EngineError::Shape(e.to_string()))?;
        self.backend.score_window(&SequenceBatch::single(window.view()))
    }

    pub fn buffer_stats(&self) -> BufferStats {
        BufferStats {
            buffer_size: self.events.len(),
            max_buffer_size: self.events.capacity(),
            sequence_length: self.sequence_length,
            ready_for_analysis: self.features.len() >= self.sequence_length,
        }
    }

    pub fn clear_buffer(&mut self) {
        self.events.clear();
        self.features.clear();
        tracing::info!("event buffer cleared");
    }
}

fn reason_for(v: &WindowVerdict) -> String {
    match (v.temporal_flag, v.outlier_flag) {
        (true, true) => "Both temporal pattern and feature outlier detected".to_string(),
        (true, false) => format!("Unusual temporal sequence pattern (score: {:.3})", v.temporal_score),
        (false, true) => format!("Statistical outlier in features (score: {:.3})", v.outlier_score),
        (false, false) if v.score > v.label_threshold => "Combined anomaly score exceeded threshold".to_string(),
        (false, false) => "Normal traffic pattern".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::{fast_config, synthetic_batch};
    use crate::detector::HybridDetector;

    fn detector() -> RealTimeDetector {
        let config = fast_config();
        let mut hybrid = HybridDetector::from_config(&config).unwrap();
        hybrid.fit(&synthetic_batch(40, 11)).unwrap();
        RealTimeDetector::from_config(DetectorBackend::Hybrid(hybrid), &config).unwrap()
    }

    fn event(i: usize) -> Event {
        Event {
            id: Some(format!("e{i}")),
            packet_count: Some(10),
            byte_count: Some(1500),
            duration: Some(1.0),
            protocol: Some("tcp".into()),
            ..Event::default()
        }
    }

    #[test]
    fn unfitted_backend_rejected() {
        let config = fast_config();
        let backend = DetectorBackend::from_config(&config).unwrap();
        assert!(matches!(
            RealTimeDetector::from_config(backend, &config),
            Err(EngineError::NotFitted { .. })
        ));
    }

    #[test]
    fn cold_start_results() {
        let mut d = detector();
        let results = d.process_batch((0..9).map(event));
        assert_eq!(results.len(), 9);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.event_id, format!("e{i}"));
            assert!(!r.is_anomaly);
            assert_eq!(r.anomaly_score, 0.0);
            assert_eq!(r.confidence, 0.0);
            assert_eq!(r.reason, INSUFFICIENT_DATA);
            assert!(r.model_scores.is_empty());
        }
        assert!(!d.buffer_stats().ready_for_analysis);
    }

    #[test]
    fn tenth_event_is_scored() {
        let mut d = detector();
        let r = d.process_batch((0..10).map(event)).pop().unwrap();
        assert_ne!(r.reason, INSUFFICIENT_DATA);
        let keys: Vec<&str> = r.model_scores.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["hybrid_score", "isolation_score", "lstm_score"]);
        assert_eq!(r.model_scores["hybrid_score"], r.anomaly_score);
        assert!((0.0..=1.0).contains(&r.confidence));
        assert_eq!(r.event_details.as_ref().and_then(|d| d.byte_count), Some(1500));
    }

    #[test]
    fn buffer_stays_bounded_and_clears() {
        let mut d = detector();
        d.process_batch((0..150).map(event));
        let stats = d.buffer_stats();
        assert_eq!(stats.buffer_size, 100);
        assert_eq!(stats.max_buffer_size, 100);
        assert!(stats.ready_for_analysis);
        d.clear_buffer();
        assert_eq!(d.buffer_stats().buffer_size, 0);
        assert_eq!(d.process_event(event(0)).reason, INSUFFICIENT_DATA);
    }

    #[test]
    fn reasons_by_priority() {
        let mut v = WindowVerdict {
            score: 0.2,
            is_anomaly: false,
            label_threshold: 0.5,
            temporal_flag: true,
            temporal_score: 1.23456,
            outlier_flag: true,
            outlier_score: 0.9,
            model_scores: BTreeMap::new(),
        };
        assert_eq!(reason_for(&v), "Both temporal pattern and feature outlier detected");
        v.outlier_flag = false;
        assert_eq!(reason_for(&v), "Unusual temporal sequence pattern (score: 1.235)");
        v.temporal_flag = false;
        v.outlier_flag = true;
        assert_eq!(reason_for(&v), "Statistical outlier in features (score: 0.900)");
        v.outlier_flag = false;
        assert_eq!(reason_for(&v), "Normal traffic pattern");
        v.score = 0.7;
        assert_eq!(reason_for(&v), "Combined anomaly score exceeded threshold");
    }

    #[test]
    fn combined_reason_follows_backend_threshold() {
        // Ensemble members h=1, t=0.2, i=0.2 under weights 0.3/0.3/0.4
        let v = WindowVerdict {
            score: 0.3 * 1.0 + 0.3 * 0.2 + 0.4 * 0.2,
            is_anomaly: true,
            label_threshold: 0.4,
            temporal_flag: false,
            temporal_score: 0.2,
            outlier_flag: false,
            outlier_score: 0.2,
            model_scores: BTreeMap::new(),
        };
        assert_eq!(reason_for(&v), "Combined anomaly score exceeded threshold");
        let stricter = WindowVerdict {
            label_threshold: 0.5,
            ..v
        };
        assert_eq!(reason_for(&stricter), "Normal traffic pattern");
    }
}
