//! Structured logging: tracing subscriber setup and NDJSON result lines.

use crate::detector::{AnomalyResult, Scored};
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// One scored event as written by the CLI.
#[derive(Serialize)]
pub struct ResultLine<'a> {
    pub ts: String,
    /// `model` or `fallback_rules`
    pub source: &'a str,
    #[serde(flatten)]
    pub result: &'a AnomalyResult,
}

impl<'a> ResultLine<'a> {
    pub fn new(scored: &'a Scored) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            source: if scored.is_fallback() { "fallback_rules" } else { "model" },
            result: scored.result(),
        }
    }
}

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber writing to stderr, so stdout stays free for
    /// result lines. RUST_LOG overrides `default_level`.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let registry = tracing_subscriber::registry().with(filter);
        let installed = if json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(FmtSpan::NONE)
                        .with_writer(std::io::stderr),
                )
                .try_init()
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
        };
        if let Err(e) = installed {
            eprintln!("logging already initialized: {e}");
        }
    }

    /// Write one JSON object per line, bypassing tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) -> std::io::Result<()> {
        let line = serde_json::to_string(event).map_err(std::io::Error::other)?;
        writeln!(w, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::RuleBasedScorer;
    use crate::events::Event;

    #[test]
    fn result_line_flattens_result() {
        let scored = Scored::FallbackRules(RuleBasedScorer::new().score(&Event::default()));
        let mut out = Vec::new();
        StructuredLogger::emit_json(&ResultLine::new(&scored), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        let v: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(v["source"], "fallback_rules");
        assert_eq!(v["event_id"], "unknown");
        assert_eq!(v["is_anomaly"], false);
        assert!(v["model_scores"]["rule_based_score"].is_number());
    }
}
