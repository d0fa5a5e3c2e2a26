//! Anomaly Engine — multi-model ensemble anomaly detection for network flows and web requests.
//!
//! Modular structure:
//! - [`events`] — Lenient event records (flow and web-request fields)
//! - [`features`] — 15-dim feature extraction, time windows, sequence batches
//! - [`model`] — Reconstruction models and the isolation scorer
//! - [`detector`] — Fusion, adaptive thresholds, streaming detection, bundles, fallback
//! - [`buffer`] — Bounded ring buffer
//! - [`logging`] — Structured JSON logging

pub mod buffer;
pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod features;
pub mod logging;
pub mod model;

pub use config::EngineConfig;
pub use detector::{
    AnomalyResult, DetectionService, DetectorBackend, EnsembleDetector, HybridDetector, ModelBundle,
    OnlineLearningDetector, RealTimeDetector, Scored, Trainer,
};
pub use error::{EngineError, Result};
pub use events::Event;
pub use features::{FeatureExtractor, FeatureVector};
pub use logging::StructuredLogger;
