//! Dense bottleneck autoencoder shared by both reconstruction variants.
//!
//! Each time step is encoded from a variant-specific input row (the step plus its
//! temporal context) and decoded back to the step alone. The bottleneck is
//! narrower than the feature dimension, so only the normal manifold reconstructs
//! well. Trained full-batch with Adam from a seeded initialization.

use super::scaler::StandardScaler;
use crate::config::ReconstructionConfig;
use crate::error::{EngineError, Result};
use ndarray::{concatenate, Array, Array1, Array2, Array3, ArrayView2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseAutoencoder {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
}

impl DenseAutoencoder {
    /// Xavier-uniform weights, zero biases.
    pub fn new(input_dim: usize, hidden_dim: usize, output_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            w1: xavier(input_dim, hidden_dim, &mut rng),
            b1: Array1::zeros(hidden_dim),
            w2: xavier(hidden_dim, output_dim, &mut rng),
            b2: Array1::zeros(output_dim),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.w1.nrows()
    }

    fn hidden(&self, inputs: &Array2<f64>) -> Array2<f64> {
        let mut h = inputs.dot(&self.w1) + &self.b1;
        h.mapv_inplace(f64::tanh);
        h
    }

    pub fn forward(&self, inputs: &Array2<f64>) -> Array2<f64> {
        self.hidden(inputs).dot(&self.w2) + &self.b2
    }

    /// Minimize mean squared reconstruction error; returns the last epoch's loss.
    pub fn train(&mut self, inputs: &Array2<f64>, targets: &Array2<f64>, epochs: usize, lr: f64) -> f64 {
        let n = (targets.nrows() * targets.ncols()).max(1) as f64;
        let mut m = Moments::zeros_like(self);
        let mut v = Moments::zeros_like(self);
        let mut loss = (&self.forward(inputs) - targets).iter().map(|d| d * d).sum::<f64>() / n;

        for epoch in 1..=epochs {
            let h = self.hidden(inputs);
            let y = h.dot(&self.w2) + &self.b2;
            let diff = &y - targets;
            loss = diff.iter().map(|d| d * d).sum::<f64>() / n;

            let dy = diff * (2.0 / n);
            let gw2 = h.t().dot(&dy);
            let gb2 = dy.sum_axis(Axis(0));
            let dz = dy.dot(&self.w2.t()) * &h.mapv(|a| 1.0 - a * a);
            let gw1 = inputs.t().dot(&dz);
            let gb1 = dz.sum_axis(Axis(0));

            let t = epoch as i32;
            adam_step(&mut self.w1, &gw1, &mut m.w1, &mut v.w1, lr, t);
            adam_step(&mut self.b1, &gb1, &mut m.b1, &mut v.b1, lr, t);
            adam_step(&mut self.w2, &gw2, &mut m.w2, &mut v.w2, lr, t);
            adam_step(&mut self.b2, &gb2, &mut m.b2, &mut v.b2, lr, t);

            if epoch % 50 == 0 {
                tracing::debug!(epoch, epochs, loss, "autoencoder epoch");
            }
        }
        loss
    }
}

struct Moments {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
}

impl Moments {
    fn zeros_like(net: &DenseAutoencoder) -> Self {
        Self {
            w1: Array2::zeros(net.w1.raw_dim()),
            b1: Array1::zeros(net.b1.raw_dim()),
            w2: Array2::zeros(net.w2.raw_dim()),
            b2: Array1::zeros(net.b2.raw_dim()),
        }
    }
}

fn xavier(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
    let bound = (6.0 / (rows + cols).max(1) as f64).sqrt();
    Array2::from_shape_simple_fn((rows, cols), || rng.gen_range(-bound..bound))
}

fn adam_step<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr: f64,
    t: i32,
) {
    let c1 = 1.0 - BETA1.powi(t);
    let c2 = 1.0 - BETA2.powi(t);
    Zip::from(param).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
        *m = BETA1 * *m + (1.0 - BETA1) * g;
        *v = BETA2 * *v + (1.0 - BETA2) * g * g;
        *p -= lr * (*m / c1) / ((*v / c2).sqrt() + ADAM_EPS);
    });
}

/// Fitted state of a reconstruction variant: frozen scaler plus trained network.
/// `build_inputs` maps one scaled (length × dim) window to its per-step encoder inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceAutoencoder {
    scaler: StandardScaler,
    network: DenseAutoencoder,
    feature_dim: usize,
    final_loss: f64,
}

impl SequenceAutoencoder {
    pub fn fit<F>(sequences: &Array3<f64>, config: &ReconstructionConfig, build_inputs: F) -> Result<Self>
    where
        F: Fn(ArrayView2<'_, f64>) -> Array2<f64>,
    {
        let n = sequences.len_of(Axis(0));
        if n == 0 {
            return Err(EngineError::InsufficientData { min: 1, actual: 0 });
        }
        let feature_dim = sequences.len_of(Axis(2));
        let rows: Vec<ArrayView2<'_, f64>> = sequences.outer_iter().collect();
        let stacked = concatenate(Axis(0), &rows).map_err(|e| EngineError::Shape(e.to_string()))?;
        let scaler = StandardScaler::fit(stacked.view());

        let mut inputs = Vec::with_capacity(n);
        let mut targets = Vec::with_capacity(n);
        for seq in sequences.outer_iter() {
            let scaled = scaler.transform(seq)?;
            inputs.push(build_inputs(scaled.view()));
            targets.push(scaled);
        }
        let inputs = stack_rows(&inputs)?;
        let targets = stack_rows(&targets)?;

        let hidden = config.hidden_dim.max(1);
        let mut network = DenseAutoencoder::new(inputs.ncols(), hidden, feature_dim, config.seed);
        let final_loss = network.train(&inputs, &targets, config.epochs, config.learning_rate);

        Ok(Self {
            scaler,
            network,
            feature_dim,
            final_loss,
        })
    }

    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }

    /// Mean squared difference per sequence, in standardized units.
    pub fn errors<F>(&self, sequences: &Array3<f64>, build_inputs: F) -> Result<Vec<f64>>
    where
        F: Fn(ArrayView2<'_, f64>) -> Array2<f64>,
    {
        let dim = sequences.len_of(Axis(2));
        if dim != self.feature_dim {
            return Err(EngineError::DimensionMismatch {
                expected: self.feature_dim,
                actual: dim,
            });
        }
        sequences
            .outer_iter()
            .map(|seq| {
                let scaled = self.scaler.transform(seq)?;
                let inputs = build_inputs(scaled.view());
                if inputs.ncols() != self.network.input_dim() {
                    return Err(EngineError::Shape(format!(
                        "encoder expects {} inputs, got {}",
                        self.network.input_dim(),
                        inputs.ncols()
                    )));
                }
                let recon = self.network.forward(&inputs);
                let diff = &scaled - &recon;
                Ok(diff.iter().map(|d| d * d).sum::<f64>() / diff.len().max(1) as f64)
            })
            .collect()
    }
}

fn stack_rows(parts: &[Array2<f64>]) -> Result<Array2<f64>> {
    let views: Vec<ArrayView2<'_, f64>> = parts.iter().map(|p| p.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| EngineError::Shape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn training_reduces_loss() {
        let x = Array::from_shape_fn((64, 4), |(i, j)| ((i * (j + 1)) as f64 * 0.1).sin());
        let mut net = DenseAutoencoder::new(4, 3, 4, 1);
        let before = (&net.forward(&x) - &x).mapv(|d| d * d).mean().unwrap();
        let after = net.train(&x, &x, 300, 0.01);
        assert!(after < before, "loss {after} should drop below {before}");
    }

    #[test]
    fn same_seed_same_weights() {
        let a = DenseAutoencoder::new(6, 3, 2, 9);
        let b = DenseAutoencoder::new(6, 3, 2, 9);
        assert_eq!(a.w1, b.w1);
        assert_eq!(a.w2, b.w2);
    }
}
