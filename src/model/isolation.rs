//! Isolation scorer
//!
//! Outlier scoring by random partitioning over standardized aggregated features.
//! Points that need fewer random splits to isolate have shorter path lengths and
//! score higher.

use super::scaler::StandardScaler;
use super::stats::percentile;
use crate::config::IsolationConfig;
use crate::error::{EngineError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Expected path length of an unsuccessful BST search over `n` points, c(n).
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationScorer {
    config: IsolationConfig,
    state: Option<FittedForest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedForest {
    scaler: StandardScaler,
    trees: Vec<IsolationTree>,
    /// Samples drawn per tree (ψ)
    sample_size: usize,
    /// Contamination percentile of in-sample `-s(x)`; the decision boundary
    offset: f64,
}

impl IsolationScorer {
    pub fn new(config: IsolationConfig) -> Self {
        Self { config, state: None }
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    pub fn contamination(&self) -> f64 {
        self.config.contamination
    }

    /// Standardize, then grow `n_estimators` trees on subsamples drawn without replacement.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let n = x.nrows();
        if n < 2 {
            return Err(EngineError::InsufficientData { min: 2, actual: n });
        }
        let scaler = StandardScaler::fit(x.view());
        let scaled = scaler.transform(x.view())?;

        let sample_size = self.config.max_samples.clamp(2, n);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let trees: Vec<IsolationTree> = (0..self.config.n_estimators.max(1))
            .map(|_| {
                let rows = sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::build(scaled.view(), rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = FittedForest {
            scaler,
            trees,
            sample_size,
            offset: 0.0,
        };
        let in_sample: Vec<f64> = scaled.outer_iter().map(|row| -forest.anomaly_score(row)).collect();
        let contamination = self.config.contamination.clamp(0.0, 0.5);
        forest.offset = percentile(&in_sample, 100.0 * contamination);

        tracing::info!(
            samples = n,
            trees = forest.trees.len(),
            sample_size,
            offset = forest.offset,
            "isolation scorer fitted"
        );
        self.state = Some(forest);
        Ok(())
    }

    fn fitted(&self) -> Result<&FittedForest> {
        self.state.as_ref().ok_or_else(|| EngineError::not_fitted("isolation"))
    }

    /// Negated decision function: `s(x) + offset`. Positive means outside the
    /// scorer's own boundary; higher is more anomalous.
    pub fn score(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        let forest = self.fitted()?;
        let scaled = forest.scaler.transform(x.view())?;
        Ok(scaled
            .outer_iter()
            .map(|row| forest.anomaly_score(row) + forest.offset)
            .collect())
    }

    /// 1 = anomaly, 0 = normal, by the contamination-derived boundary. This is
    /// independent of any calibration threshold a detector applies to `score`.
    pub fn classify(&self, x: &Array2<f64>) -> Result<Vec<u8>> {
        Ok(self.score(x)?.into_iter().map(|s| u8::from(s > 0.0)).collect())
    }

    pub fn predict_anomalies(&self, x: &Array2<f64>) -> Result<Vec<u8>> {
        self.classify(x)
    }
}

impl FittedForest {
    /// s(x) = 2^(-E[h(x)] / c(ψ)), in (0, 1]
    fn anomaly_score(&self, row: ArrayView1<'_, f64>) -> f64 {
        let c = average_path_length(self.sample_size);
        if self.trees.is_empty() || c == 0.0 {
            return 0.5;
        }
        let mean_path =
            self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
        2f64.powf(-mean_path / c)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IsolationTree {
    root: IsolationNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum IsolationNode {
    Internal {
        feature: usize,
        split: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationTree {
    fn build(data: ArrayView2<'_, f64>, rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: Self::build_node(data, rows, 0, max_depth, rng),
        }
    }

    fn build_node(
        data: ArrayView2<'_, f64>,
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> IsolationNode {
        if depth >= max_depth || rows.len() <= 1 {
            return IsolationNode::Leaf { size: rows.len() };
        }

        // Only features with spread inside this node can split it
        let spans: Vec<(usize, f64, f64)> = data
            .axis_iter(Axis(1))
            .enumerate()
            .filter_map(|(j, col)| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    (lo.min(col[r]), hi.max(col[r]))
                });
                (hi > lo).then_some((j, lo, hi))
            })
            .collect();
        if spans.is_empty() {
            return IsolationNode::Leaf { size: rows.len() };
        }

        let (feature, lo, hi) = spans[rng.gen_range(0..spans.len())];
        let split = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[[r, feature]] < split);

        IsolationNode::Internal {
            feature,
            split,
            left: Box::new(Self::build_node(data, left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build_node(data, right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Leaf { size } => return depth as f64 + average_path_length(*size),
                IsolationNode::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    node = if v < *split { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 6), |(i, j)| 10.0 + ((i * 7 + j * 3) % 11) as f64 * 0.1)
    }

    #[test]
    fn average_path_length_grows() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }

    #[test]
    fn outlier_scores_higher_than_inlier() {
        let mut scorer = IsolationScorer::new(IsolationConfig::default());
        scorer.fit(&cluster(200)).unwrap();

        let mut probe = cluster(2);
        probe.row_mut(1).fill(80.0);
        let scores = scorer.score(&probe).unwrap();
        assert!(scores[1] > scores[0]);
        assert_eq!(scorer.classify(&probe).unwrap()[1], 1);
    }

    #[test]
    fn labels_are_binary_and_follow_own_boundary() {
        let mut scorer = IsolationScorer::new(IsolationConfig::default());
        let train = cluster(150);
        scorer.fit(&train).unwrap();
        let labels = scorer.predict_anomalies(&train).unwrap();
        let scores = scorer.score(&train).unwrap();
        assert_eq!(labels.len(), train.nrows());
        for (l, s) in labels.iter().zip(&scores) {
            assert!(*l <= 1);
            assert_eq!(*l == 1, *s > 0.0);
        }
        // Roughly the contamination share is flagged in-sample
        let flagged = labels.iter().filter(|&&l| l == 1).count();
        assert!(flagged <= 150 / 10 + 1, "flagged {flagged}");
    }

    #[test]
    fn unfitted_scorer_refuses() {
        let scorer = IsolationScorer::new(IsolationConfig::default());
        assert!(matches!(scorer.score(&cluster(3)), Err(EngineError::NotFitted { .. })));
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let train = cluster(100);
        let mut a = IsolationScorer::new(IsolationConfig::default());
        let mut b = IsolationScorer::new(IsolationConfig::default());
        a.fit(&train).unwrap();
        b.fit(&train).unwrap();
        assert_eq!(a.score(&train).unwrap(), b.score(&train).unwrap());
    }
}
