//! Reconstruction model A: order-sensitive through a leaky recurrent context.

use super::autoencoder::SequenceAutoencoder;
use super::ReconstructionModel;
use crate::config::ReconstructionConfig;
use crate::error::{EngineError, Result};
use ndarray::{concatenate, Array1, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentAutoencoder {
    config: ReconstructionConfig,
    state: Option<SequenceAutoencoder>,
}

impl RecurrentAutoencoder {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config, state: None }
    }

    /// Step t sees its own values plus `c_{t-1}`, where
    /// `c_t = decay * c_{t-1} + (1 - decay) * x_t` and `c_{-1} = 0`.
    fn step_inputs(decay: f64, window: ArrayView2<'_, f64>) -> Array2<f64> {
        let dim = window.ncols();
        let mut context = Array1::<f64>::zeros(dim);
        let mut contexts = Array2::<f64>::zeros(window.raw_dim());
        for (t, x) in window.outer_iter().enumerate() {
            contexts.row_mut(t).assign(&context);
            context = &context * decay + &(&x * (1.0 - decay));
        }
        let joined = concatenate(Axis(1), &[window.view(), contexts.view()]);
        joined.unwrap_or_else(|_| Array2::zeros((window.nrows(), 2 * dim)))
    }
}

impl ReconstructionModel for RecurrentAutoencoder {
    fn name(&self) -> &str {
        "recurrent"
    }

    fn fit(&mut self, sequences: &Array3<f64>) -> Result<()> {
        let decay = self.config.context_decay.clamp(0.0, 1.0);
        let state = SequenceAutoencoder::fit(sequences, &self.config, |w| Self::step_inputs(decay, w))?;
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
        let decay = self.config.context_decay.clamp(0.0, 1.0);
        state.errors(sequences, |w| Self::step_inputs(decay, w))
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn context_lags_one_step() {
        let w = array![[1.0], [3.0], [5.0]];
        let u = RecurrentAutoencoder::step_inputs(0.5, w.view());
        assert_eq!(u, array![[1.0, 0.0], [3.0, 0.5], [5.0, 1.75]]);
    }

    #[test]
    fn unfitted_errors() {
        let m = RecurrentAutoencoder::new(ReconstructionConfig::default());
        let seqs = Array3::<f64>::zeros((1, 10, 15));
        assert!(matches!(m.reconstruction_error(&seqs), Err(EngineError::NotFitted { .. })));
    }
}
