//! Reconstruction model B: positional encoding plus self-attention context.
//!
//! Without recurrence, order survives only through the fixed sinusoidal
//! encoding added to every step before attention mixes the window.

use super::autoencoder::SequenceAutoencoder;
use super::ReconstructionModel;
use crate::config::ReconstructionConfig;
use crate::error::{EngineError, Result};
use ndarray::{concatenate, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionAutoencoder {
    config: ReconstructionConfig,
    state: Option<SequenceAutoencoder>,
}

/// Sinusoidal encoding: even columns sin, odd columns cos, wavelengths growing by 10000^(2i/d).
pub fn positional_encoding(length: usize, dim: usize) -> Array2<f64> {
    Array2::from_shape_fn((length, dim), |(pos, j)| {
        let pair = (j / 2 * 2) as f64;
        let angle = pos as f64 / 10000f64.powf(pair / dim.max(1) as f64);
        if j % 2 == 0 {
            angle.sin()
        } else {
            angle.cos()
        }
    })
}

fn softmax_rows(scores: &mut Array2<f64>) {
    for mut row in scores.rows_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|s| (s - max).exp());
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        }
    }
}

impl AttentionAutoencoder {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config, state: None }
    }

    /// Step inputs: `p_t = x_t + pe_t` concatenated with `softmax(P Pᵀ / √d) P`.
    fn step_inputs(window: ArrayView2<'_, f64>) -> Array2<f64> {
        let (length, dim) = window.dim();
        let encoded = &window + &positional_encoding(length, dim);
        let mut weights = encoded.dot(&encoded.t()) / (dim.max(1) as f64).sqrt();
        softmax_rows(&mut weights);
        let attended = weights.dot(&encoded);
        let joined = concatenate(Axis(1), &[encoded.view(), attended.view()]);
        joined.unwrap_or_else(|_| Array2::zeros((length, 2 * dim)))
    }
}

impl ReconstructionModel for AttentionAutoencoder {
    fn name(&self) -> &str {
        "attention"
    }

    fn fit(&mut self, sequences: &Array3<f64>) -> Result<()> {
        let state = SequenceAutoencoder::fit(sequences, &self.config, Self::step_inputs)?;
        tracing::info!(
            model = self.name(),
            sequences = sequences.len_of(Axis(0)),
            loss = state.final_loss(),
            "reconstruction model fitted"
        );
        self.state = Some(state);
        Ok(())
    }

    fn reconstruction_error(&self, sequences: &Array3<f64>) -> Result<Vec<f64>> {
        let state = self.state.as_ref().ok_or_else(|| EngineError::not_fitted(self.name()))?;
        state.errors(sequences, Self::step_inputs)
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_first_position() {
        let pe = positional_encoding(3, 4);
        assert_eq!(pe[[0, 0]], 0.0);
        assert_eq!(pe[[0, 1]], 1.0);
        assert!((pe[[1, 0]] - 1f64.sin()).abs() < 1e-12);
    }

    #[test]
    fn attention_rows_are_convex_mixtures() {
        let window = Array2::from_shape_fn((5, 3), |(i, j)| (i + j) as f64 * 0.3);
        let u = AttentionAutoencoder::step_inputs(window.view());
        assert_eq!(u.dim(), (5, 6));
        let encoded = &window + &positional_encoding(5, 3);
        for j in 0..3 {
            let col = encoded.column(j);
            let lo = col.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            for t in 0..5 {
                assert!(u[[t, 3 + j]] >= lo - 1e-9 && u[[t, 3 + j]] <= hi + 1e-9);
            }
        }
    }

    #[test]
    fn order_changes_inputs() {
        let a = Array2::from_shape_fn((4, 2), |(i, _)| i as f64);
        let b = Array2::from_shape_fn((4, 2), |(i, _)| (3 - i) as f64);
        let ua = AttentionAutoencoder::step_inputs(a.view());
        let ub = AttentionAutoencoder::step_inputs(b.view());
        assert_ne!(ua.row(0), ub.row(3));
    }
}
