//! Adaptive threshold over a sliding window of recent scores, nudged by analyst feedback.

use crate::buffer::RingBuffer;
use crate::config::OnlineConfig;
use crate::features::FeatureVector;
use crate::model::stats::mean_std;
use serde::Serialize;

const INITIAL_THRESHOLD: f64 = 0.5;
/// Statistics are only recomputed once the window holds more than this many samples.
const MIN_SAMPLES: usize = 10;
const FALSE_POSITIVE_FACTOR: f64 = 1.1;
const FALSE_NEGATIVE_FACTOR: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct OnlineLearningDetector {
    adaptation_rate: f64,
    recent: RingBuffer<(FeatureVector, f64)>,
    threshold: f64,
    score_mean: f64,
    score_std: f64,
}

/// Point-in-time view of the running statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OnlineSnapshot {
    pub threshold: f64,
    pub score_mean: f64,
    pub score_std: f64,
    pub window_len: usize,
    pub window_capacity: usize,
}

impl OnlineLearningDetector {
    pub fn new(config: &OnlineConfig) -> Self {
        Self {
            adaptation_rate: config.adaptation_rate.clamp(0.0, 1.0),
            recent: RingBuffer::new(config.window_size),
            threshold: INITIAL_THRESHOLD,
            score_mean: 0.0,
            score_std: 1.0,
        }
    }

    /// Append `(features, scores)` pairs; `feedback[i]` is true when sample i is
    /// actually anomalous.
    pub fn update(&mut self, features: &[FeatureVector], scores: &[f64], feedback: Option<&[bool]>) {
        for (fv, score) in features.iter().zip(scores) {
            self.recent.push((fv.clone(), *score));
        }

        if self.recent.len() > MIN_SAMPLES {
            let window: Vec<f64> = self.recent.iter().map(|(_, s)| *s).collect();
            let (mean, std) = mean_std(&window);
            let rate = self.adaptation_rate;
            self.score_mean = (1.0 - rate) * self.score_mean + rate * mean;
            self.score_std = (1.0 - rate) * self.score_std + rate * std;
            self.threshold = self.score_mean + 2.0 * self.score_std;
        }

        if let Some(feedback) = feedback {
            self.apply_feedback(scores, feedback);
        }
    }

    fn apply_feedback(&mut self, scores: &[f64], feedback: &[bool]) {
        let threshold = self.threshold;
        let pairs = || scores.iter().zip(feedback);
        let false_positive = pairs().any(|(s, anomalous)| *s > threshold && !anomalous);
        let false_negative = pairs().any(|(s, anomalous)| *s <= threshold && *anomalous);
        if false_positive {
            self.threshold *= FALSE_POSITIVE_FACTOR;
        }
        if false_negative {
            self.threshold *= FALSE_NEGATIVE_FACTOR;
        }
        if false_positive || false_negative {
            tracing::debug!(
                before = threshold,
                after = self.threshold,
                false_positive,
                false_negative,
                "threshold adjusted from feedback"
            );
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_anomalous(&self, score: f64) -> bool {
        score > self.threshold
    }

    pub fn snapshot(&self) -> OnlineSnapshot {
        OnlineSnapshot {
            threshold: self.threshold,
            score_mean: self.score_mean,
            score_std: self.score_std,
            window_len: self.recent.len(),
            window_capacity: self.recent.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(d: &mut OnlineLearningDetector, score: f64, n: usize) {
        for _ in 0..n {
            d.update(&[FeatureVector::zeros()], &[score], None);
        }
    }

    #[test]
    fn starts_from_defaults() {
        let d = OnlineLearningDetector::new(&OnlineConfig::default());
        let snap = d.snapshot();
        assert_eq!(snap.threshold, 0.5);
        assert_eq!(snap.score_mean, 0.0);
        assert_eq!(snap.score_std, 1.0);
        assert_eq!(snap.window_capacity, 1000);
    }

    #[test]
    fn ten_samples_do_not_move_threshold() {
        let mut d = OnlineLearningDetector::new(&OnlineConfig::default());
        feed(&mut d, 0.3, 10);
        assert_eq!(d.threshold(), 0.5);
        feed(&mut d, 0.3, 1);
        assert_ne!(d.threshold(), 0.5);
    }

    #[test]
    fn constant_scores_converge() {
        let mut d = OnlineLearningDetector::new(&OnlineConfig::default());
        feed(&mut d, 0.3, 400);
        assert!((d.threshold() - 0.3).abs() < 1e-6, "threshold {}", d.threshold());
        assert!(d.is_anomalous(0.31));
    }

    #[test]
    fn false_positive_raises_ten_percent() {
        let mut d = OnlineLearningDetector::new(&OnlineConfig::default());
        d.update(&[FeatureVector::zeros()], &[0.9], Some(&[false]));
        assert!((d.threshold() - 0.55).abs() < 1e-12);
    }

    #[test]
    fn false_negative_lowers_ten_percent() {
        let mut d = OnlineLearningDetector::new(&OnlineConfig::default());
        d.update(&[FeatureVector::zeros()], &[0.1], Some(&[true]));
        assert!((d.threshold() - 0.45).abs() < 1e-12);
    }

    #[test]
    fn both_corrections_compound() {
        let mut d = OnlineLearningDetector::new(&OnlineConfig::default());
        let fvs = vec![FeatureVector::zeros(); 2];
        d.update(&fvs, &[0.9, 0.1], Some(&[false, true]));
        assert!((d.threshold() - 0.5 * 1.1 * 0.9).abs() < 1e-12);
    }

    #[test]
    fn window_is_bounded() {
        let config = OnlineConfig {
            window_size: 20,
            ..OnlineConfig::default()
        };
        let mut d = OnlineLearningDetector::new(&config);
        feed(&mut d, 0.2, 50);
        assert_eq!(d.snapshot().window_len, 20);
    }
}
