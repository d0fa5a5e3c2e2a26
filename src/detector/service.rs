//! Detection entry point for one event stream: model-backed when a bundle is
//! available, rule-based otherwise. Constructed by the caller and passed where needed.

use super::{AnomalyResult, ModelBundle, RealTimeDetector, RuleBasedScorer};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::Event;
use serde::Serialize;

/// Which path produced a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "result", rename_all = "snake_case")]
pub enum Scored {
    Model(AnomalyResult),
    FallbackRules(AnomalyResult),
}

impl Scored {
    pub fn result(&self) -> &AnomalyResult {
        match self {
            Scored::Model(r) | Scored::FallbackRules(r) => r,
        }
    }

    pub fn into_result(self) -> AnomalyResult {
        match self {
            Scored::Model(r) | Scored::FallbackRules(r) => r,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Scored::FallbackRules(_))
    }
}

enum Mode {
    Model(Box<RealTimeDetector>),
    Rules,
}

pub struct DetectionService {
    mode: Mode,
    rules: RuleBasedScorer,
}

impl DetectionService {
    /// Load the configured bundle. An unavailable bundle degrades to rules;
    /// dimension and configuration errors propagate.
    pub fn load(config: &EngineConfig) -> Result<Self> {
        match ModelBundle::load(&config.model_path) {
            Ok(bundle) => {
                let mut realtime = config.realtime.clone();
                realtime.buffer_size = realtime.buffer_size.max(bundle.sequence_length);
                if bundle.sequence_length != config.features.sequence_length {
                    tracing::warn!(
                        bundle = bundle.sequence_length,
                        configured = config.features.sequence_length,
                        "sequence length taken from bundle"
                    );
                }
                let sequence_length = bundle.sequence_length;
                let detector = RealTimeDetector::new(bundle.into_detector(), sequence_length, &realtime)?;
                Ok(Self::with_detector(detector))
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "model bundle unavailable; using rule-based detection");
                Ok(Self::rules_only())
            }
            Err(e) => Err(e),
        }
    }

    pub fn with_detector(detector: RealTimeDetector) -> Self {
        Self {
            mode: Mode::Model(Box::new(detector)),
            rules: RuleBasedScorer::new(),
        }
    }

    pub fn rules_only() -> Self {
        Self {
            mode: Mode::Rules,
            rules: RuleBasedScorer::new(),
        }
    }

    pub fn is_model_backed(&self) -> bool {
        matches!(self.mode, Mode::Model(_))
    }

    pub fn detector(&self) -> Option<&RealTimeDetector> {
        match &self.mode {
            Mode::Model(d) => Some(d),
            Mode::Rules => None,
        }
    }

    pub fn process_event(&mut self, event: Event) -> Scored {
        match &mut self.mode {
            Mode::Model(detector) => Scored::Model(detector.process_event(event)),
            Mode::Rules => Scored::FallbackRules(self.rules.score(&event)),
        }
    }

    pub fn process_batch(&mut self, events: impl IntoIterator<Item = Event>) -> Vec<Scored> {
        events.into_iter().map(|e| self.process_event(e)).collect()
    }
}
