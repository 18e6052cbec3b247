//! Whole-flow accumulators
//!
//! These summarize the entire observed sequence without windowing: the
//! interpacket interval statistics and the packet length statistics.

use std::collections::HashMap;

use crate::core::PacketMeta;

use super::{FeatureExtractor, FeatureRow};

pub const MAX_INTERPACKET_INTERVAL: &str = "max_interpacket_interval";
pub const MIN_INTERPACKET_INTERVAL: &str = "min_interpacket_interval";
pub const AVG_INTERPACKET_INTERVAL: &str = "avg_interpacket_interval";
pub const SUM_INTERPACKET_INTERVAL: &str = "sum_interpacket_interval";

/// Interpacket interval over the whole flow
///
/// Needs at least two packets before any field is defined.
#[derive(Debug, Default)]
pub struct InterpacketIntervalFeature {
    packet_times: Vec<f64>,
}

impl InterpacketIntervalFeature {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureExtractor for InterpacketIntervalFeature {
    fn ingest(&mut self, pkt: &PacketMeta) {
        self.packet_times.push(pkt.timestamp);
    }

    fn summarize(&self) -> FeatureRow {
        let mut row = FeatureRow::new();

        if self.packet_times.len() < 2 {
            row.push(MAX_INTERPACKET_INTERVAL, None);
            row.push(MIN_INTERPACKET_INTERVAL, None);
            row.push(AVG_INTERPACKET_INTERVAL, None);
            row.push(SUM_INTERPACKET_INTERVAL, None);
            return row;
        }

        let intervals: Vec<f64> = self
            .packet_times
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect();

        let max = intervals.iter().copied().fold(f64::MIN, f64::max);
        let min = intervals.iter().copied().fold(f64::MAX, f64::min);
        let avg = intervals.iter().sum::<f64>() / intervals.len() as f64;
        // Endpoint form: algebraically equal to the pairwise sum but
        // numerically stable over long flows.
        let sum = self.packet_times[self.packet_times.len() - 1] - self.packet_times[0];

        row.push(MAX_INTERPACKET_INTERVAL, Some(max));
        row.push(MIN_INTERPACKET_INTERVAL, Some(min));
        row.push(AVG_INTERPACKET_INTERVAL, Some(avg));
        row.push(SUM_INTERPACKET_INTERVAL, Some(sum));
        row
    }
}

pub const MAX_PACKET_LENGTH: &str = "max_packet_length";
pub const MIN_PACKET_LENGTH: &str = "min_packet_length";
pub const AVG_PACKET_LENGTH: &str = "avg_packet_length";
pub const SUM_PACKET_LENGTH: &str = "sum_packet_length";
pub const MODE_PACKET_LENGTH: &str = "mode_packet_length";

/// Packet length over the whole flow, including the statistical mode
#[derive(Debug, Default)]
pub struct PacketLengthFeature {
    packet_lengths: Vec<u32>,
}

impl PacketLengthFeature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most frequent length; the first one observed wins ties
    fn mode(&self) -> u32 {
        let mut counts: HashMap<u32, (usize, usize)> = HashMap::new();
        for (index, len) in self.packet_lengths.iter().enumerate() {
            let entry = counts.entry(*len).or_insert((0, index));
            entry.0 += 1;
        }

        let mut best = (0usize, usize::MAX, 0u32);
        for (len, (count, first_index)) in counts {
            if count > best.0 || (count == best.0 && first_index < best.1) {
                best = (count, first_index, len);
            }
        }
        best.2
    }
}

impl FeatureExtractor for PacketLengthFeature {
    fn ingest(&mut self, pkt: &PacketMeta) {
        self.packet_lengths.push(pkt.length);
    }

    fn summarize(&self) -> FeatureRow {
        let mut row = FeatureRow::new();

        if self.packet_lengths.is_empty() {
            row.push(MAX_PACKET_LENGTH, None);
            row.push(MIN_PACKET_LENGTH, None);
            row.push(AVG_PACKET_LENGTH, None);
            row.push(SUM_PACKET_LENGTH, None);
            row.push(MODE_PACKET_LENGTH, None);
            return row;
        }

        let max = *self.packet_lengths.iter().max().unwrap_or(&0) as f64;
        let min = *self.packet_lengths.iter().min().unwrap_or(&0) as f64;
        let sum: u64 = self.packet_lengths.iter().map(|l| *l as u64).sum();
        let avg = sum as f64 / self.packet_lengths.len() as f64;

        row.push(MAX_PACKET_LENGTH, Some(max));
        row.push(MIN_PACKET_LENGTH, Some(min));
        row.push(AVG_PACKET_LENGTH, Some(avg));
        row.push(SUM_PACKET_LENGTH, Some(sum as f64));
        row.push(MODE_PACKET_LENGTH, Some(self.mode() as f64));
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::core::packet::Transport;

    fn packet_at(timestamp: f64, length: u32) -> PacketMeta {
        PacketMeta::new(
            timestamp,
            length,
            Ipv4Addr::new(192, 168, 0, 2),
            Ipv4Addr::new(10, 0, 0, 1),
            Transport::Udp {
                src_port: 50000,
                dst_port: 1194,
            },
        )
    }

    #[test]
    fn test_interval_sentinel_below_two_samples() {
        let mut feature = InterpacketIntervalFeature::new();
        feature.ingest(&packet_at(1.0, 100));

        let row = feature.summarize();
        assert_eq!(row.len(), 4);
        assert!(row.iter().all(|(_, v)| v.is_none()));
    }

    #[test]
    fn test_interval_statistics() {
        let mut feature = InterpacketIntervalFeature::new();
        for t in [0.0, 0.1, 0.3, 0.6] {
            feature.ingest(&packet_at(t, 100));
        }

        let row = feature.summarize();
        assert!((row.get(MAX_INTERPACKET_INTERVAL).unwrap() - 0.3).abs() < 1e-9);
        assert!((row.get(MIN_INTERPACKET_INTERVAL).unwrap() - 0.1).abs() < 1e-9);
        assert!((row.get(AVG_INTERPACKET_INTERVAL).unwrap() - 0.2).abs() < 1e-9);
        // Sum is taken from the endpoints, not the pairwise deltas.
        assert!((row.get(SUM_INTERPACKET_INTERVAL).unwrap() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_length_sentinel_with_no_samples() {
        let feature = PacketLengthFeature::new();
        let row = feature.summarize();
        assert_eq!(row.len(), 5);
        assert!(row.iter().all(|(_, v)| v.is_none()));
    }

    #[test]
    fn test_length_statistics() {
        let mut feature = PacketLengthFeature::new();
        for len in [100u32, 200, 200, 400] {
            feature.ingest(&packet_at(0.0, len));
        }

        let row = feature.summarize();
        assert_eq!(row.get(MAX_PACKET_LENGTH), Some(400.0));
        assert_eq!(row.get(MIN_PACKET_LENGTH), Some(100.0));
        assert_eq!(row.get(AVG_PACKET_LENGTH), Some(225.0));
        assert_eq!(row.get(SUM_PACKET_LENGTH), Some(900.0));
        assert_eq!(row.get(MODE_PACKET_LENGTH), Some(200.0));
    }

    #[test]
    fn test_length_mode_tie_takes_first_observed() {
        let mut feature = PacketLengthFeature::new();
        for len in [300u32, 100, 300, 100] {
            feature.ingest(&packet_at(0.0, len));
        }

        let row = feature.summarize();
        assert_eq!(row.get(MODE_PACKET_LENGTH), Some(300.0));
    }
}
