//! Scoring models: two interchangeable sequence-reconstruction variants and the
//! tree-based isolation scorer. Every model reports "higher = more anomalous".

mod attention;
mod autoencoder;
mod isolation;
mod recurrent;
mod scaler;
pub mod stats;

pub use attention::{positional_encoding, AttentionAutoencoder};
pub use autoencoder::{DenseAutoencoder, SequenceAutoencoder};
pub use isolation::IsolationScorer;
pub use recurrent::RecurrentAutoencoder;
pub use scaler::StandardScaler;

use crate::config::ReconstructionConfig;
use crate::error::Result;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Learns the normal manifold of fixed-length sequences and reports how badly
/// new sequences reconstruct. Fit only on known-normal sequences.
pub trait ReconstructionModel: Send + Sync {
    fn name(&self) -> &str;

    /// `sequences` has shape (n, length, feature_dim)
    fn fit(&mut self, sequences: &Array3<f64>) -> Result<()>;

    /// One mean squared error per sequence. Deterministic once fitted.
    fn reconstruction_error(&self, sequences: &Array3<f64>) -> Result<Vec<f64>>;

    fn is_fitted(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionKind {
    Recurrent,
    Attention,
}

/// Configuration-time choice of reconstruction variant; serializable so it can
/// travel inside a model bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconstructor {
    Recurrent(RecurrentAutoencoder),
    Attention(AttentionAutoencoder),
}

impl Reconstructor {
    pub fn new(kind: ReconstructionKind, config: ReconstructionConfig) -> Self {
        match kind {
            ReconstructionKind::Recurrent => Reconstructor::Recurrent(RecurrentAutoencoder::new(config)),
            ReconstructionKind::Attention => Reconstructor::Attention(AttentionAutoencoder::new(config)),
        }
    }

    pub fn kind(&self) -> ReconstructionKind {
        match self {
            Reconstructor::Recurrent(_) => ReconstructionKind::Recurrent,
            Reconstructor::Attention(_) => ReconstructionKind::Attention,
        }
    }

    fn inner(&self) -> &dyn ReconstructionModel {
        match self {
            Reconstructor::Recurrent(m) => m,
            Reconstructor::Attention(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ReconstructionModel {
        match self {
            Reconstructor::Recurrent(m) => m,
            Reconstructor::Attention(m) => m,
        }
    }
}

impl ReconstructionModel for Reconstructor {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn fit(&mut self, sequences: &Array3<f64>) -> Result<()> {
        self.inner_mut().fit(sequences)
    }

    fn reconstruction_error(&self, sequences: &Array3<f64>) -> Result<Vec<f64>> {
        self.inner().reconstruction_error(sequences)
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn normal_sequences(n: usize) -> Array3<f64> {
        Array3::from_shape_fn((n, 10, 15), |(i, t, j)| {
            1.0 + 0.1 * (((i + t) as f64) * 0.7 + j as f64).sin()
        })
    }

    fn small_config() -> ReconstructionConfig {
        ReconstructionConfig {
            epochs: 120,
            ..ReconstructionConfig::default()
        }
    }

    #[test]
    fn variants_are_interchangeable() {
        let train = normal_sequences(40);
        let mut outlier = normal_sequences(1);
        outlier.mapv_inplace(|v| v * 25.0);

        for kind in [ReconstructionKind::Recurrent, ReconstructionKind::Attention] {
            let mut model = Reconstructor::new(kind, small_config());
            assert!(!model.is_fitted());
            model.fit(&train).unwrap();
            assert!(model.is_fitted());
            assert_eq!(model.kind(), kind);

            let normal = model.reconstruction_error(&train).unwrap();
            let weird = model.reconstruction_error(&outlier).unwrap();
            let max_normal = normal.iter().copied().fold(0.0, f64::max);
            assert_eq!(normal.len(), 40);
            assert!(weird[0] > max_normal, "{kind:?}: {} vs {max_normal}", weird[0]);
        }
    }

    #[test]
    fn inference_is_deterministic() {
        let train = normal_sequences(20);
        let mut model = Reconstructor::new(ReconstructionKind::Attention, small_config());
        model.fit(&train).unwrap();
        assert_eq!(
            model.reconstruction_error(&train).unwrap(),
            model.reconstruction_error(&train).unwrap()
        );
    }

    #[test]
    fn serde_round_trip_keeps_scores() {
        let train = normal_sequences(20);
        let mut model = Reconstructor::new(ReconstructionKind::Recurrent, small_config());
        model.fit(&train).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let back: Reconstructor = serde_json::from_str(&json).unwrap();
        assert_eq!(
            model.reconstruction_error(&train).unwrap(),
            back.reconstruction_error(&train).unwrap()
        );
    }
}
