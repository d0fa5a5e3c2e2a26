//! Rule-based scorer used when no model bundle is available.

use super::AnomalyResult;
use crate::events::{Event, Timestamp};
use chrono::Utc;
use std::collections::BTreeMap;

const SUSPICIOUS_DST_PORTS: [u16; 7] = [22, 23, 135, 139, 445, 1433, 3389];
const SUSPICIOUS_SRC_PORTS: [u16; 4] = [1337, 31337, 4444, 6666];
const ANOMALY_CUTOFF: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl RuleBasedScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, event: &Event) -> AnomalyResult {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        let dst_port = event.dst_port.unwrap_or(80);
        if SUSPICIOUS_DST_PORTS.contains(&dst_port) {
            score += 0.3;
            reasons.push(format!("Suspicious destination port: {dst_port}"));
        }
        let packet_count = event.packet_count.unwrap_or(1);
        if packet_count > 100 {
            score += 0.2;
            reasons.push(format!("High packet count: {packet_count}"));
        }
        let byte_count = event.byte_count.unwrap_or(0);
        if byte_count > 10_000 {
            score += 0.2;
            reasons.push(format!("Large data transfer: {byte_count} bytes"));
        }
        let duration = event.duration.unwrap_or(0.1);
        if duration > 10.0 {
            score += 0.2;
            reasons.push(format!("Long connection duration: {duration}s"));
        }
        let src_port = event.src_port.unwrap_or(80);
        if SUSPICIOUS_SRC_PORTS.contains(&src_port) {
            score += 0.4;
            reasons.push(format!("Suspicious source port: {src_port}"));
        }

        let reason = if reasons.is_empty() {
            "Normal traffic pattern".to_string()
        } else {
            reasons.join("; ")
        };

        AnomalyResult {
            event_id: event.event_id(),
            timestamp: Some(Timestamp::from(Utc::now())),
            is_anomaly: score >= ANOMALY_CUTOFF,
            anomaly_score: score,
            confidence: score.min(1.0),
            reason,
            model_scores: BTreeMap::from([
                ("rule_based_score".to_string(), score),
                ("lstm_score".to_string(), 0.0),
                ("isolation_score".to_string(), 0.0),
                ("hybrid_score".to_string(), score),
            ]),
            event_details: Some(event.details()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_event_is_normal() {
        let r = RuleBasedScorer::new().score(&Event::default());
        assert!(!r.is_anomaly);
        assert_eq!(r.anomaly_score, 0.0);
        assert_eq!(r.reason, "Normal traffic pattern");
        assert_eq!(r.event_id, "unknown");
        assert_eq!(r.model_scores.len(), 4);
    }

    #[test]
    fn rules_accumulate() {
        let event = Event {
            id: Some("x".into()),
            src_port: Some(4444),
            dst_port: Some(3389),
            byte_count: Some(50_000),
            ..Event::default()
        };
        let r = RuleBasedScorer::new().score(&event);
        assert!((r.anomaly_score - 0.9).abs() < 1e-12);
        assert!(r.is_anomaly);
        assert_eq!(r.confidence, r.anomaly_score);
        assert_eq!(
            r.reason,
            "Suspicious destination port: 3389; Large data transfer: 50000 bytes; Suspicious source port: 4444"
        );
        assert_eq!(r.model_scores["rule_based_score"], r.model_scores["hybrid_score"]);
        assert_eq!(r.model_scores["lstm_score"], 0.0);
    }

    #[test]
    fn cutoff_is_inclusive() {
        let event = Event {
            dst_port: Some(22),
            packet_count: Some(500),
            ..Event::default()
        };
        let r = RuleBasedScorer::new().score(&event);
        assert!((r.anomaly_score - 0.5).abs() < 1e-12);
        assert!(r.is_anomaly);
    }
}
