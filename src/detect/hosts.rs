//! Per-host decision state
//!
//! Counters aggregate evaluations across every flow to or from one remote
//! pair, independent of ports. They are monotonic for the life of the entry:
//! flow expiry never resets them, only host-map capacity pressure drops whole
//! entries.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::core::HostKey;

use super::{DetectionEvent, DetectorConfig};

/// Accumulated evaluations for one host pair
#[derive(Debug, Default)]
pub struct HostState {
    pub possible_vpn: u64,
    pub possible_non_vpn: u64,
    /// Recent positive-evaluation timestamps, pruned from the front
    pub detections: VecDeque<f64>,
    last_update: f64,
}

/// Bounded map of host pair -> decision state with the debounce gate
pub struct HostTracker {
    hosts: HashMap<String, HostState>,
    max_hosts: usize,
    interval: f64,
    min_recent: usize,
    count_threshold: u64,
    ratio: f64,
}

impl HostTracker {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            hosts: HashMap::new(),
            max_hosts: config.max_hosts.max(1),
            interval: config.detection_time_interval_secs,
            min_recent: config.flow_number_for_detect,
            count_threshold: config.total_detected_flow_threshold,
            ratio: config.vpn_to_novpn_ratio,
        }
    }

    /// Record a positive evaluation; returns the detection event when the
    /// debounce gate passes on this same evaluation
    pub fn record_vpn(&mut self, key: &HostKey, now: f64) -> Option<DetectionEvent> {
        let interval = self.interval;
        let count_threshold = self.count_threshold;
        let min_recent = self.min_recent;
        let ratio = self.ratio;
        let state = self.entry(key, now);

        state.possible_vpn += 1;
        state.detections.push_back(now);
        // Prune from the front while the list spans more than the interval.
        while let (Some(&first), Some(&last)) = (state.detections.front(), state.detections.back())
        {
            if last - first > interval {
                state.detections.pop_front();
            } else {
                break;
            }
        }

        let passes = state.possible_vpn >= count_threshold
            && state.detections.len() >= min_recent
            && ratio_holds(state.possible_vpn, state.possible_non_vpn, ratio);

        if passes {
            Some(DetectionEvent {
                host_key: key.as_str().to_string(),
                possible_vpn: state.possible_vpn,
                possible_non_vpn: state.possible_non_vpn,
                recent_detections: state.detections.len(),
                timestamp: now,
            })
        } else {
            None
        }
    }

    /// Record a negative evaluation
    pub fn record_normal(&mut self, key: &HostKey, now: f64) {
        self.entry(key, now).possible_non_vpn += 1;
    }

    pub fn get(&self, key: &HostKey) -> Option<&HostState> {
        self.hosts.get(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    fn entry(&mut self, key: &HostKey, now: f64) -> &mut HostState {
        if !self.hosts.contains_key(key.as_str()) && self.hosts.len() >= self.max_hosts {
            self.evict_stalest();
        }

        let state = self.hosts.entry(key.as_str().to_string()).or_default();
        state.last_update = now;
        state
    }

    fn evict_stalest(&mut self) {
        if let Some(key) = self
            .hosts
            .iter()
            .min_by(|(_, a), (_, b)| a.last_update.total_cmp(&b.last_update))
            .map(|(k, _)| k.clone())
        {
            debug!(host = %key, "host map at capacity, dropping stalest entry");
            self.hosts.remove(&key);
        }
    }
}

/// Zero negatives count as the ratio condition being satisfied
fn ratio_holds(vpn: u64, non_vpn: u64, ratio: f64) -> bool {
    if non_vpn == 0 {
        return true;
    }
    vpn as f64 / non_vpn as f64 >= ratio
}
