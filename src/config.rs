//! Engine configuration. Loaded once at startup and handed to each component.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the persisted model bundle
    pub model_path: PathBuf,
    /// Sequence construction parameters
    pub features: FeaturesConfig,
    /// Time-bounded batching for offline training corpora
    pub windowing: WindowingConfig,
    /// Reconstruction model A (recurrent)
    pub recurrent: ReconstructionConfig,
    /// Reconstruction model B (attention)
    pub attention: ReconstructionConfig,
    pub isolation: IsolationConfig,
    pub hybrid: HybridConfig,
    pub ensemble: EnsembleConfig,
    pub online: OnlineConfig,
    pub realtime: RealtimeConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Vectors per analysis window
    pub sequence_length: usize,
    /// Stride between window starts when building training sequences
    pub step_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowingConfig {
    pub window_size_seconds: u64,
    /// Fraction of each window shared with the next one (0.0–1.0)
    pub overlap_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Bottleneck width; keep below the feature dimension
    pub hidden_dim: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
    /// Leak factor of the recurrent context (ignored by the attention variant)
    pub context_decay: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Expected anomaly fraction in the training data
    pub contamination: f64,
    pub n_estimators: usize,
    /// Upper bound on samples drawn per tree
    pub max_samples: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub reconstruction_weight: f64,
    pub isolation_weight: f64,
    /// Percentile of in-sample scores used as calibration threshold
    pub percentile: f64,
    /// Threshold applied to normalized scores by `predict_labels`
    pub label_threshold: f64,
    /// Also fit on constant windows built from each training vector
    pub steady_state_windows: bool,
    /// Lower bounds on the calibration thresholds; near-uniform training data
    /// otherwise collapses them toward zero
    pub min_reconstruction_threshold: f64,
    pub min_isolation_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub hybrid_weight: f64,
    pub transformer_weight: f64,
    pub isolation_weight: f64,
    pub label_threshold: f64,
    /// Contamination prior of the ensemble's own isolation scorer
    pub isolation_contamination: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineConfig {
    pub window_size: usize,
    /// Exponential smoothing factor for running statistics
    pub adaptation_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Hybrid,
    Ensemble,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Capacity of the event and feature ring buffers
    pub buffer_size: usize,
    /// Detector trained and served by default
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("data/models/bundle.json"),
            features: FeaturesConfig::default(),
            windowing: WindowingConfig::default(),
            recurrent: ReconstructionConfig::default(),
            attention: ReconstructionConfig {
                epochs: 150,
                seed: 7,
                ..ReconstructionConfig::default()
            },
            isolation: IsolationConfig::default(),
            hybrid: HybridConfig::default(),
            ensemble: EnsembleConfig::default(),
            online: OnlineConfig::default(),
            realtime: RealtimeConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            sequence_length: 10,
            step_size: 1,
        }
    }
}

impl Default for WindowingConfig {
    fn default() -> Self {
        Self {
            window_size_seconds: 60,
            overlap_ratio: 0.5,
        }
    }
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 8,
            epochs: 200,
            learning_rate: 0.01,
            seed: 42,
            context_decay: 0.5,
        }
    }
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            reconstruction_weight: 0.6,
            isolation_weight: 0.4,
            percentile: 95.0,
            label_threshold: 0.5,
            steady_state_windows: true,
            min_reconstruction_threshold: 0.01,
            min_isolation_threshold: 0.05,
        }
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            hybrid_weight: 0.3,
            transformer_weight: 0.3,
            isolation_weight: 0.4,
            label_threshold: 0.4,
            isolation_contamination: 0.05,
        }
    }
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            adaptation_rate: 0.1,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            backend: BackendKind::Hybrid,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl EngineConfig {
    /// Parse the file at `path`. `Ok(None)` when it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &Path) -> Self {
        match Self::read(path) {
            Ok(config) => config.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid config; using defaults");
                Self::default()
            }
        }
    }
}
