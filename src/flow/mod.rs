//! Flow entity and its bounded working set
//!
//! A [`Flow`] owns one extractor set plus lightweight metadata; flows live
//! exclusively inside the [`BoundedFlowCache`] and leave it exactly once,
//! either through the detector's expiry policy or through capacity pressure.

pub mod cache;
pub mod splay;

pub use cache::{BoundedFlowCache, CacheStats};

use std::time::Instant;

use crate::core::PacketMeta;
use crate::features::{FeatureRow, FeatureSet};

/// Observation count after which the extraction-time window resets.
/// Moving-window approximation of the average, not a true mean.
const TIME_WINDOW_OBSERVATIONS: u32 = 300;

/// Aggregated state of one bidirectional connection
pub struct Flow {
    /// Unique flow ID, assigned by the detector
    pub id: u64,
    features: FeatureSet,
    packet_count: u64,
    total_length: u64,
    created_at: Option<f64>,
    time_spent: f64,
    observations: u32,
}

impl Flow {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            features: FeatureSet::production(),
            packet_count: 0,
            total_length: 0,
            created_at: None,
            time_spent: 0.0,
            observations: 0,
        }
    }

    /// Fold one packet into every extractor and advance the counters.
    /// The first packet stamps the creation time.
    pub fn ingest(&mut self, pkt: &PacketMeta) {
        let start = Instant::now();

        if self.created_at.is_none() {
            self.created_at = Some(pkt.timestamp);
        }
        self.features.ingest(pkt);
        self.packet_count += 1;
        self.total_length += pkt.length as u64;

        self.account(start.elapsed().as_secs_f64());
    }

    /// Concatenated feature row across all extractors
    pub fn features(&mut self) -> FeatureRow {
        let start = Instant::now();
        let row = self.features.summarize();
        self.account(start.elapsed().as_secs_f64());
        row
    }

    /// Row without touching the time accounting (diagnostics/export)
    pub fn summarize(&self) -> FeatureRow {
        self.features.summarize()
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Timestamp of the first packet; `None` before any packet arrived
    pub fn created_at(&self) -> Option<f64> {
        self.created_at
    }

    /// Seconds spent in extraction over the current observation window
    pub fn time_spent(&self) -> f64 {
        self.time_spent
    }

    fn account(&mut self, elapsed: f64) {
        if self.observations > TIME_WINDOW_OBSERVATIONS {
            self.time_spent = 0.0;
            self.observations = 0;
        }
        self.time_spent += elapsed;
        self.observations += 1;
    }
}
