//! Per-dimension standardization frozen at fit time.

use crate::error::{EngineError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Variance below this is treated as a constant dimension (scale 1)
const MIN_SCALE: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Rows are samples, columns are dimensions.
    pub fn fit(x: ArrayView2<'_, f64>) -> Self {
        let dim = x.ncols();
        if x.nrows() == 0 {
            return Self {
                mean: Array1::zeros(dim),
                scale: Array1::ones(dim),
            };
        }
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(dim));
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > MIN_SCALE { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.dim() {
            return Err(EngineError::DimensionMismatch {
                expected: self.dim(),
                actual: x.ncols(),
            });
        }
        Ok((&x - &self.mean) / &self.scale)
    }
}
