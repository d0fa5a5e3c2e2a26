//! Three-model fusion: the hybrid detector's fused score, an attention
//! reconstruction model and a second isolation scorer.
//!
//! Unlike [`HybridDetector`], members are min–max normalized across the current
//! batch, so scores are only comparable between windows scored together.

use super::hybrid::{validate_weights, HybridDetector};
use crate::config::{EngineConfig, EnsembleConfig, IsolationConfig};
use crate::error::{EngineError, Result};
use crate::features::SequenceBatch;
use crate::model::stats::min_max_normalize;
use crate::model::{IsolationScorer, ReconstructionKind, ReconstructionModel, Reconstructor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleDetector {
    config: EnsembleConfig,
    hybrid: HybridDetector,
    transformer: Reconstructor,
    isolation: IsolationScorer,
    fitted: bool,
}

/// Batch-normalized member scores and their weighted sum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleScores {
    pub ensemble: Vec<f64>,
    pub hybrid: Vec<f64>,
    pub transformer: Vec<f64>,
    pub isolation: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleLabels {
    pub ensemble: Vec<u8>,
    pub scores: EnsembleScores,
}

impl EnsembleDetector {
    pub fn new(
        config: EnsembleConfig,
        hybrid: HybridDetector,
        transformer: Reconstructor,
        isolation: IsolationScorer,
    ) -> Result<Self> {
        validate_weights(&[
            ("hybrid", config.hybrid_weight),
            ("transformer", config.transformer_weight),
            ("isolation", config.isolation_weight),
        ])?;
        Ok(Self {
            config,
            hybrid,
            transformer,
            isolation,
            fitted: false,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let isolation = IsolationConfig {
            contamination: config.ensemble.isolation_contamination,
            ..config.isolation.clone()
        };
        Self::new(
            config.ensemble.clone(),
            HybridDetector::from_config(config)?,
            Reconstructor::new(ReconstructionKind::Attention, config.attention.clone()),
            IsolationScorer::new(isolation),
        )
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn label_threshold(&self) -> f64 {
        self.config.label_threshold
    }

    pub fn hybrid(&self) -> &HybridDetector {
        &self.hybrid
    }

    /// Members are trained independently on the same normal-only windows,
    /// steady-state windows included when the hybrid configuration enables them.
    pub fn fit(&mut self, batch: &SequenceBatch) -> Result<()> {
        self.fitted = false;
        self.hybrid.fit(batch)?;
        let training = self.hybrid.training_batch(batch);
        self.transformer.fit(&training.sequences)?;
        self.isolation.fit(&training.aggregated)?;
        self.fitted = true;
        tracing::info!(windows = batch.len(), "ensemble detector fitted");
        Ok(())
    }

    pub fn predict_scores(&self, batch: &SequenceBatch) -> Result<EnsembleScores> {
        if !self.fitted {
            return Err(EngineError::not_fitted("ensemble"));
        }
        let hybrid = min_max_normalize(&self.hybrid.predict_scores(batch)?.hybrid);
        let transformer = min_max_normalize(&self.transformer.reconstruction_error(&batch.sequences)?);
        let isolation = min_max_normalize(&self.isolation.score(&batch.aggregated)?);

        let ensemble = (0..batch.len())
            .map(|i| {
                self.config.hybrid_weight * hybrid[i]
                    + self.config.transformer_weight * transformer[i]
                    + self.config.isolation_weight * isolation[i]
            })
            .collect();

        Ok(EnsembleScores {
            ensemble,
            hybrid,
            transformer,
            isolation,
        })
    }

    pub fn predict_labels(&self, batch: &SequenceBatch, threshold: f64) -> Result<EnsembleLabels> {
        let scores = self.predict_scores(batch)?;
        Ok(EnsembleLabels {
            ensemble: scores.ensemble.iter().map(|s| u8::from(*s > threshold)).collect(),
            scores,
        })
    }
}
