//! Detection worker and decision state
//!
//! The single consumer of the packet channel: reconstructs flows, drives
//! periodic model evaluation per flow, and debounces noisy per-evaluation
//! labels into confirmed per-host detection events.

pub mod hosts;
pub mod worker;

pub use hosts::HostTracker;
pub use worker::DetectWorker;

use serde::{Deserialize, Serialize};

/// Detector tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Packets a flow accumulates before the first evaluation
    pub start_threshold: u64,
    /// Packets after which a flow is force-expired
    pub end_threshold: u64,
    /// Evaluate every n-th packet of an eligible flow
    pub predict_rate: u64,
    /// Seconds a flow may live regardless of packet count
    pub flow_ttl_secs: f64,
    /// Flow cache capacity (distinct keys)
    pub cache_capacity: usize,
    /// Minimum recent positive evaluations inside the sliding interval
    pub flow_number_for_detect: usize,
    /// Span of the sliding detection-timestamp list, seconds
    pub detection_time_interval_secs: f64,
    /// Minimum vpn-to-non-vpn evaluation ratio
    pub vpn_to_novpn_ratio: f64,
    /// Minimum total positive evaluations per host
    pub total_detected_flow_threshold: u64,
    /// Bound on the per-host counter map
    pub max_hosts: usize,
    /// Seconds between stats log lines / shared snapshot refreshes
    pub stats_interval_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            start_threshold: 27,
            end_threshold: 30,
            predict_rate: 5,
            flow_ttl_secs: 3.0,
            cache_capacity: 10_000,
            flow_number_for_detect: 1,
            detection_time_interval_secs: 10.0,
            vpn_to_novpn_ratio: 0.0,
            total_detected_flow_threshold: 3,
            max_hosts: 10_000,
            stats_interval_secs: 10,
        }
    }
}

/// One confirmed detection, raised when the debounce gate passes
#[derive(Debug, Clone, Serialize)]
pub struct DetectionEvent {
    /// Host-level key of the remote pair
    pub host_key: String,
    /// Positive evaluations so far
    pub possible_vpn: u64,
    /// Negative evaluations so far
    pub possible_non_vpn: u64,
    /// Entries in the pruned sliding timestamp list
    pub recent_detections: usize,
    /// Wall-clock time of the qualifying evaluation, epoch seconds
    pub timestamp: f64,
}

/// Worker counters, refreshed into the shared snapshot periodically
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectorStats {
    pub packets: u64,
    pub filtered: u64,
    pub flows_created: u64,
    pub flows_expired: u64,
    pub evaluations: u64,
    pub incomplete_rows: u64,
    pub rejected_samples: u64,
    pub model_skips: u64,
    pub vpn_hits: u64,
    pub normal_hits: u64,
    pub detections: u64,
    pub active_flows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();
        assert_eq!(config.start_threshold, 27);
        assert_eq!(config.end_threshold, 30);
        assert_eq!(config.predict_rate, 5);
        assert_eq!(config.cache_capacity, 10_000);
        assert_eq!(config.flow_ttl_secs, 3.0);
    }
}
