//! Time-bounded batching of raw events for offline training corpora.

use crate::config::WindowingConfig;
use crate::events::Event;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Summary of one time window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub event_count: usize,
    pub total_bytes: u64,
    pub total_packets: u64,
    pub unique_src_ips: usize,
    pub unique_dst_ips: usize,
    /// Distinct (src_port, dst_port) pairs
    pub unique_ports: usize,
    pub avg_packet_size: f64,
    pub window_duration: u64,
}

/// One hundred years; larger windows are clamped
const MAX_WINDOW_SECONDS: u64 = 100 * 365 * 24 * 3600;

pub struct TimeWindowProcessor {
    window_size: u64,
    step_size: u64,
}

impl TimeWindowProcessor {
    pub fn new(config: &WindowingConfig) -> Self {
        let window_size = config.window_size_seconds.clamp(1, MAX_WINDOW_SECONDS);
        let overlap = config.overlap_ratio.clamp(0.0, 1.0);
        let step_size = ((window_size as f64 * (1.0 - overlap)) as u64).max(1);
        Self {
            window_size,
            step_size,
        }
    }

    pub fn step_size(&self) -> u64 {
        self.step_size
    }

    /// Overlapping windows `[start, start + window)` advancing by the step from the
    /// earliest timestamp. Events without a usable timestamp are left out and
    /// empty windows are skipped.
    pub fn create_time_windows(&self, events: &[Event]) -> Vec<Vec<Event>> {
        let mut stamped: Vec<(DateTime<Utc>, &Event)> = events
            .iter()
            .filter_map(|e| e.parsed_timestamp().map(|ts| (ts, e)))
            .collect();
        let skipped = events.len() - stamped.len();
        if skipped > 0 {
            tracing::debug!(skipped, "events without timestamp excluded from windowing");
        }
        if stamped.is_empty() {
            return Vec::new();
        }
        stamped.sort_by_key(|(ts, _)| *ts);

        let first = stamped[0].0;
        let last = stamped[stamped.len() - 1].0;
        let window = Duration::seconds(self.window_size as i64);
        let step = Duration::seconds(self.step_size as i64);

        let mut windows = Vec::new();
        let mut start = first;
        loop {
            let lo = stamped.partition_point(|(ts, _)| *ts < start);
            let hi = match start.checked_add_signed(window) {
                Some(end) => stamped.partition_point(|(ts, _)| *ts < end),
                None => stamped.len(),
            };
            if hi > lo {
                windows.push(stamped[lo..hi].iter().map(|(_, e)| (*e).clone()).collect());
            }
            match start.checked_add_signed(step) {
                Some(next) if next <= last => start = next,
                _ => break,
            }
        }
        windows
    }

    pub fn aggregate_window_stats(&self, window: &[Event]) -> WindowStats {
        if window.is_empty() {
            return WindowStats::default();
        }
        let total_bytes = window.iter().fold(0u64, |acc, e| acc.saturating_add(e.byte_count.unwrap_or(0)));
        let total_packets = window.iter().fold(0u64, |acc, e| acc.saturating_add(e.packet_count.unwrap_or(0)));
        let src: HashSet<&str> = window.iter().map(|e| e.src_ip.as_deref().unwrap_or("")).collect();
        let dst: HashSet<&str> = window.iter().map(|e| e.dst_ip.as_deref().unwrap_or("")).collect();
        let ports: HashSet<(Option<u16>, Option<u16>)> =
            window.iter().map(|e| (e.src_port, e.dst_port)).collect();

        WindowStats {
            event_count: window.len(),
            total_bytes,
            total_packets,
            unique_src_ips: src.len(),
            unique_dst_ips: dst.len(),
            unique_ports: ports.len(),
            avg_packet_size: if total_packets > 0 {
                total_bytes as f64 / total_packets as f64
            } else {
                0.0
            },
            window_duration: self.window_size,
        }
    }
}
