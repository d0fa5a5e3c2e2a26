//! Feature extraction: event → fixed 15-dim vector, plus sequence and time-window builders.

mod extractor;
mod heuristics;
mod sequence;
mod window;

pub use extractor::{shannon_entropy, FeatureExtractor};
pub use heuristics::{bot_score, ddos_score, geo_anomaly_score, sql_injection_score, xss_score};
pub use sequence::{aggregate, build_sequences, SequenceBatch};
pub use window::{TimeWindowProcessor, WindowStats};

use serde::{Deserialize, Serialize};

pub const FEATURE_NAMES: [&str; 15] = [
    "packet_count",
    "byte_count",
    "duration",
    "packets_per_second",
    "bytes_per_second",
    "avg_packet_size",
    "port_entropy",
    "ip_entropy",
    "protocol_diversity",
    "time_interval",
    "sql_injection_score",
    "xss_score",
    "ddos_score",
    "bot_score",
    "geo_anomaly",
];

/// Number of dimensions produced by [`FeatureExtractor`]
pub const FEATURE_DIM: usize = FEATURE_NAMES.len();

/// Length of one aggregated window vector (mean ‖ std ‖ range)
pub const AGGREGATED_DIM: usize = 3 * FEATURE_DIM;

/// Ordered feature values for a single event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_DIM],
}

impl FeatureVector {
    pub fn zeros() -> Self {
        Self {
            values: [0.0; FEATURE_DIM],
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Look up a dimension by name
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }
}
