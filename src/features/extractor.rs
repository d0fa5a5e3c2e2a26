//! Per-event feature extraction. Pure: the same event always yields the same vector.

use super::heuristics::{bot_score, ddos_score, geo_anomaly_score, sql_injection_score, xss_score};
use super::{FeatureVector, FEATURE_DIM};
use crate::events::Event;
use chrono::Timelike;
use std::collections::HashMap;
use std::hash::Hash;

/// Guard against zero-length flows when deriving rates
const MIN_DURATION: f64 = 0.001;

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn feature_dim(&self) -> usize {
        FEATURE_DIM
    }

    /// Total over any input: absent fields fall back to neutral defaults.
    pub fn extract(&self, event: &Event) -> FeatureVector {
        let packets = event.packet_count.unwrap_or(0) as f64;
        let bytes = event.byte_count.unwrap_or(0) as f64;
        let duration = event.duration.unwrap_or(0.0);

        let rate_packets = event.packet_count.unwrap_or(1) as f64;
        let rate_duration = event.duration.unwrap_or(1.0).max(MIN_DURATION);
        let packets_per_second = rate_packets / rate_duration;
        let bytes_per_second = bytes / rate_duration;
        let avg_packet_size = bytes / rate_packets.max(1.0);

        let text = request_text(event);
        // Only a sensor-reported rate feeds the flood heuristic
        let declared_rate = event.packets_per_second.unwrap_or(0.0);

        let values = [
            packets,
            bytes,
            duration,
            packets_per_second,
            bytes_per_second,
            avg_packet_size,
            port_entropy(event),
            ip_entropy(event),
            protocol_diversity(event.protocol.as_deref()),
            hour_of_day(event),
            sql_injection_score(&text),
            xss_score(&text),
            ddos_score(
                declared_rate,
                event.byte_count.unwrap_or(0),
                event.duration.unwrap_or(1.0),
            ),
            bot_score(event.user_agent.as_deref().unwrap_or("")),
            geo_anomaly_score(event.country.as_deref().unwrap_or("")),
        ];

        FeatureVector {
            values: values.map(|v| if v.is_finite() { v } else { 0.0 }),
        }
    }

    pub fn extract_all(&self, events: &[Event]) -> Vec<FeatureVector> {
        events.iter().map(|e| self.extract(e)).collect()
    }
}

/// Path with the query string appended, the surface the injection heuristics scan.
fn request_text(event: &Event) -> String {
    let path = event.path.as_deref().unwrap_or("");
    match event.query.as_deref() {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_string(),
    }
}

fn port_entropy(event: &Event) -> f64 {
    let ports: Vec<u16> = [event.src_port, event.dst_port].into_iter().flatten().collect();
    shannon_entropy(&ports)
}

fn ip_entropy(event: &Event) -> f64 {
    let ips: Vec<&str> = [event.src_ip.as_deref(), event.dst_ip.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    shannon_entropy(&ips)
}

fn protocol_diversity(protocol: Option<&str>) -> f64 {
    match protocol.map(str::to_lowercase).as_deref() {
        Some("tcp") => 0.3,
        Some("udp") => 0.2,
        Some("icmp") => 0.1,
        Some("http") => 0.4,
        Some("https") => 0.5,
        Some("dns") => 0.3,
        _ => 0.0,
    }
}

fn hour_of_day(event: &Event) -> f64 {
    event
        .parsed_timestamp()
        .map(|dt| dt.hour() as f64 / 24.0)
        .unwrap_or(0.0)
}

/// Shannon entropy in bits over a multiset. Empty and singleton sets are 0.
pub fn shannon_entropy<T: Eq + Hash>(values: &[T]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let mut counts: HashMap<&T, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let n = values.len() as f64;
    let h: f64 = counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum();
    // A single distinct value sums to -0.0
    h.max(0.0)
}
