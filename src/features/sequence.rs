//! Fixed-length sequences for the reconstruction models and aggregated window
//! statistics for the isolation scorer.

use super::{FeatureVector, AGGREGATED_DIM, FEATURE_DIM};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};

/// Model-ready batch: `sequences` is (n, length, FEATURE_DIM), `aggregated` is (n, AGGREGATED_DIM).
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    pub sequences: Array3<f64>,
    pub aggregated: Array2<f64>,
}

impl SequenceBatch {
    pub fn len(&self) -> usize {
        self.sequences.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sequence_length(&self) -> usize {
        self.sequences.len_of(Axis(1))
    }

    /// Single-window batch, as assembled by the streaming detector
    pub fn single(window: ArrayView2<'_, f64>) -> Self {
        let aggregated = aggregate(window).insert_axis(Axis(0));
        Self {
            sequences: window.to_owned().insert_axis(Axis(0)),
            aggregated,
        }
    }

    /// Rows at `indices`, in order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            sequences: self.sequences.select(Axis(0), indices),
            aggregated: self.aggregated.select(Axis(0), indices),
        }
    }

    /// This batch followed by one constant window per source vector: every row
    /// of the first window, then the newest row of each later window. A steady
    /// stream of one normal event looks like these windows. All-zero padding
    /// rows are skipped.
    pub fn with_steady_state(&self) -> Self {
        let n = self.len();
        let length = self.sequence_length();
        if n == 0 || length == 0 {
            return self.clone();
        }
        let sources: Vec<Array1<f64>> = (0..length)
            .map(|t| (0, t))
            .chain((1..n).map(|k| (k, length - 1)))
            .map(|(k, t)| self.sequences.slice(s![k, t, ..]).to_owned())
            .filter(|row| row.iter().any(|v| *v != 0.0))
            .collect();

        let total = n + sources.len();
        let mut sequences = Array3::<f64>::zeros((total, length, self.sequences.len_of(Axis(2))));
        let mut aggregated = Array2::<f64>::zeros((total, self.aggregated.ncols()));
        sequences.slice_mut(s![..n, .., ..]).assign(&self.sequences);
        aggregated.slice_mut(s![..n, ..]).assign(&self.aggregated);
        for (i, row) in sources.iter().enumerate() {
            sequences.slice_mut(s![n + i, .., ..]).assign(row);
            aggregated
                .row_mut(n + i)
                .assign(&aggregate(sequences.slice(s![n + i, .., ..])));
        }

        Self {
            sequences,
            aggregated,
        }
    }
}

/// Per-dimension mean ‖ population std ‖ range over one window. The order is
/// part of the model contract and must not change between fit and inference.
pub fn aggregate(window: ArrayView2<'_, f64>) -> Array1<f64> {
    let dim = window.ncols();
    let mut out = Array1::zeros(3 * dim);
    if window.nrows() == 0 {
        return out;
    }
    for (j, col) in window.axis_iter(Axis(1)).enumerate() {
        let n = col.len() as f64;
        let mean = col.sum() / n;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let (min, max) = col
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        out[j] = mean;
        out[dim + j] = var.sqrt();
        out[2 * dim + j] = max - min;
    }
    out
}

/// Slide a `length`-row window over `features` with stride `step`. Fewer than
/// `length` vectors are left-padded with zero rows into a single window.
pub fn build_sequences(features: &[FeatureVector], length: usize, step: usize) -> SequenceBatch {
    let length = length.max(1);
    let step = step.max(1);

    let rows = features.len().max(length);
    let pad = rows - features.len();
    let mut matrix = Array2::<f64>::zeros((rows, FEATURE_DIM));
    for (i, fv) in features.iter().enumerate() {
        matrix.row_mut(pad + i).assign(&ArrayView1::from(&fv.values[..]));
    }

    let starts: Vec<usize> = (0..=rows - length).step_by(step).collect();
    let mut sequences = Array3::<f64>::zeros((starts.len(), length, FEATURE_DIM));
    let mut aggregated = Array2::<f64>::zeros((starts.len(), AGGREGATED_DIM));
    for (k, &start) in starts.iter().enumerate() {
        let window = matrix.slice(s![start..start + length, ..]);
        sequences.slice_mut(s![k, .., ..]).assign(&window);
        aggregated.row_mut(k).assign(&aggregate(window));
    }

    SequenceBatch {
        sequences,
        aggregated,
    }
}
