//! Windowed aggregators
//!
//! A window is a run of packets whose gap from the window's anchor timestamp
//! stays below the configured threshold; the first packet past the threshold
//! anchors a new window. Per-window values pass the IQR fence and a pluggable
//! reducer, and the resulting cross-window scalars are summarized as
//! max/min/std/mean. The packet-count variant summarizes raw counts directly.

use crate::core::PacketMeta;

use super::outliers::iqr_filter;
use super::{FeatureExtractor, FeatureRow};

/// Reduction applied to one fenced window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Sum,
}

impl Reducer {
    pub fn name(&self) -> &'static str {
        match self {
            Reducer::Mean => "mean_func",
            Reducer::Sum => "sum_func",
        }
    }

    pub fn apply(&self, values: &[f64]) -> f64 {
        let sum: f64 = values.iter().sum();
        match self {
            Reducer::Mean => sum / values.len() as f64,
            Reducer::Sum => sum,
        }
    }
}

/// Feature names for one windowed aggregate
#[derive(Debug, Clone)]
struct StatNames {
    max: String,
    min: String,
    std: String,
    mean: String,
}

impl StatNames {
    /// `{stat}_feature_{reducer}_{kind}_per_{threshold}`: deterministic, so
    /// rows from different configurations never collide when concatenated.
    fn reduced(reducer: Reducer, kind: &str, threshold: f64) -> Self {
        let suffix = format!("{}_{}_per_{}", reducer.name(), kind, threshold);
        Self::with_suffix(&suffix)
    }

    fn counted(threshold: f64) -> Self {
        Self::with_suffix(&format!("packet_number_per_{}", threshold))
    }

    fn with_suffix(suffix: &str) -> Self {
        Self {
            max: format!("max_feature_{}", suffix),
            min: format!("min_feature_{}", suffix),
            std: format!("std_feature_{}", suffix),
            mean: format!("mean_feature_{}", suffix),
        }
    }
}

/// Summarize cross-window scalars; all-sentinel row when none qualified
fn window_summary(names: &StatNames, scalars: &[f64]) -> FeatureRow {
    let mut row = FeatureRow::new();

    if scalars.is_empty() {
        row.push(names.max.clone(), None);
        row.push(names.min.clone(), None);
        row.push(names.std.clone(), None);
        row.push(names.mean.clone(), None);
        return row;
    }

    let max = scalars.iter().copied().fold(f64::MIN, f64::max);
    let min = scalars.iter().copied().fold(f64::MAX, f64::min);
    let mean = scalars.iter().sum::<f64>() / scalars.len() as f64;
    let variance = scalars.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / scalars.len() as f64;

    row.push(names.max.clone(), Some(max));
    row.push(names.min.clone(), Some(min));
    row.push(names.std.clone(), Some(variance.sqrt()));
    row.push(names.mean.clone(), Some(mean));
    row
}

#[derive(Debug)]
struct Window {
    anchor: f64,
    values: Vec<f64>,
}

/// Interpacket gaps per window, reduced to one scalar each
///
/// The packet that anchors a window contributes no gap; windows need more
/// than one gap before they count.
pub struct IntervalPerWindowFeature {
    threshold: f64,
    reducer: Reducer,
    windows: Vec<Window>,
    names: StatNames,
}

impl IntervalPerWindowFeature {
    pub fn new(reducer: Reducer, threshold: f64) -> Self {
        Self {
            threshold,
            reducer,
            windows: Vec::new(),
            names: StatNames::reduced(reducer, "interpacket_interval", threshold),
        }
    }
}

impl FeatureExtractor for IntervalPerWindowFeature {
    fn ingest(&mut self, pkt: &PacketMeta) {
        if let Some(window) = self.windows.last_mut() {
            let gap = pkt.timestamp - window.anchor;
            if gap < self.threshold {
                window.values.push(gap);
                return;
            }
        }
        self.windows.push(Window {
            anchor: pkt.timestamp,
            values: Vec::new(),
        });
    }

    fn summarize(&self) -> FeatureRow {
        let scalars: Vec<f64> = self
            .windows
            .iter()
            .filter(|w| w.values.len() > 1)
            .filter_map(|w| {
                let fenced = iqr_filter(&w.values);
                if fenced.is_empty() {
                    None
                } else {
                    Some(self.reducer.apply(&fenced))
                }
            })
            .collect();

        window_summary(&self.names, &scalars)
    }
}

/// Packet lengths per window, reduced to one scalar each
///
/// Windows need more than two lengths before they count.
pub struct LengthPerWindowFeature {
    threshold: f64,
    reducer: Reducer,
    windows: Vec<Window>,
    names: StatNames,
}

impl LengthPerWindowFeature {
    pub fn new(reducer: Reducer, threshold: f64) -> Self {
        Self {
            threshold,
            reducer,
            windows: Vec::new(),
            names: StatNames::reduced(reducer, "packet_length", threshold),
        }
    }
}

impl FeatureExtractor for LengthPerWindowFeature {
    fn ingest(&mut self, pkt: &PacketMeta) {
        let length = pkt.length as f64;
        if let Some(window) = self.windows.last_mut() {
            if pkt.timestamp - window.anchor < self.threshold {
                window.values.push(length);
                return;
            }
        }
        self.windows.push(Window {
            anchor: pkt.timestamp,
            values: vec![length],
        });
    }

    fn summarize(&self) -> FeatureRow {
        let scalars: Vec<f64> = self
            .windows
            .iter()
            .filter(|w| w.values.len() > 2)
            .filter_map(|w| {
                let fenced = iqr_filter(&w.values);
                if fenced.is_empty() {
                    None
                } else {
                    Some(self.reducer.apply(&fenced))
                }
            })
            .collect();

        window_summary(&self.names, &scalars)
    }
}

/// Raw packet count per window, no fence and no reducer
pub struct PacketCountPerWindowFeature {
    threshold: f64,
    windows: Vec<(f64, u64)>,
    names: StatNames,
}

impl PacketCountPerWindowFeature {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            windows: Vec::new(),
            names: StatNames::counted(threshold),
        }
    }

    /// Per-window packet counts, in window order
    pub fn counts(&self) -> Vec<u64> {
        self.windows.iter().map(|(_, count)| *count).collect()
    }
}

impl FeatureExtractor for PacketCountPerWindowFeature {
    fn ingest(&mut self, pkt: &PacketMeta) {
        if let Some((anchor, count)) = self.windows.last_mut() {
            if pkt.timestamp - *anchor < self.threshold {
                *count += 1;
                return;
            }
        }
        self.windows.push((pkt.timestamp, 1));
    }

    fn summarize(&self) -> FeatureRow {
        let scalars: Vec<f64> = self.windows.iter().map(|(_, c)| *c as f64).collect();
        window_summary(&self.names, &scalars)
    }
}
