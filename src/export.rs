//! Diagnostic feature export
//!
//! Replays a capture into a flow cache and dumps every flow's feature row to
//! a CSV file (flow key column first, then the feature columns). This is a
//! test/labeling utility, not part of the steady-state pipeline.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::capture::PacketSource;
use crate::core::FlowKey;
use crate::features::FeatureSet;
use crate::flow::{BoundedFlowCache, Flow};

/// Feed a whole source through flow reconstruction, without detection
pub fn collect_flows(source: &mut dyn PacketSource, capacity: usize) -> Result<BoundedFlowCache> {
    let mut cache = BoundedFlowCache::new(capacity);
    let mut next_id = 1u64;

    loop {
        match source.next_packet()? {
            Some(pkt) => {
                let Some(key) = FlowKey::from_packet(&pkt) else {
                    continue;
                };
                let id = next_id;
                let (flows, created) = cache.get_or_create(key.as_str(), || Flow::new(id));
                if created {
                    next_id += 1;
                }
                for flow in flows.iter_mut() {
                    flow.ingest(&pkt);
                }
            }
            None => {
                if source.done() {
                    break;
                }
            }
        }
    }

    info!(flows = cache.len(), "collected flows for export");
    Ok(cache)
}

/// Write one CSV row per flow; undefined features become empty cells
pub fn write_features_csv<P: AsRef<Path>>(cache: &BoundedFlowCache, path: P) -> Result<usize> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create {}", path.display()))?;

    // Column set is fixed by the production extractor roster.
    let mut header = vec!["flow".to_string()];
    header.extend(FeatureSet::production().summarize().names().map(String::from));
    writer.write_record(&header)?;

    let mut rows = 0usize;
    for (key, flows) in cache.items() {
        for flow in flows {
            let mut record = vec![key.to_string()];
            record.extend(
                flow.summarize()
                    .iter()
                    .map(|(_, value)| value.map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&record)?;
            rows += 1;
        }
    }

    writer.flush()?;
    info!(rows, path = %path.display(), "feature export written");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::capture::CaptureStats;
    use crate::core::packet::{PacketMeta, Transport};
    use crate::error::Result as VpnResult;

    struct VecSource {
        packets: Vec<PacketMeta>,
        cursor: usize,
    }

    impl PacketSource for VecSource {
        fn next_packet(&mut self) -> VpnResult<Option<PacketMeta>> {
            let pkt = self.packets.get(self.cursor).cloned();
            if pkt.is_some() {
                self.cursor += 1;
            }
            Ok(pkt)
        }

        fn done(&self) -> bool {
            self.cursor >= self.packets.len()
        }

        fn stats(&self) -> CaptureStats {
            CaptureStats::default()
        }
    }

    fn packet(dst_last: u8, timestamp: f64) -> PacketMeta {
        PacketMeta::new(
            timestamp,
            200,
            Ipv4Addr::new(192, 168, 0, 2),
            Ipv4Addr::new(10, 0, 0, dst_last),
            Transport::Tcp {
                src_port: 40000,
                dst_port: 443,
            },
        )
    }

    #[test]
    fn test_collect_builds_one_flow_per_connection() {
        let mut source = VecSource {
            packets: vec![packet(1, 0.0), packet(1, 0.1), packet(2, 0.2)],
            cursor: 0,
        };

        let cache = collect_flows(&mut source, 100).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_csv_layout() {
        let mut source = VecSource {
            packets: (0..6).map(|i| packet(1, i as f64 * 0.01)).collect(),
            cursor: 0,
        };
        let cache = collect_flows(&mut source, 100).unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        let rows = write_features_csv(&cache, file.path()).unwrap();
        assert_eq!(rows, 1);

        let content = std::fs::read_to_string(file.path()).unwrap();
        let mut lines = content.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("flow,"));
        assert!(header.contains("max_packet_length"));

        let row = lines.next().unwrap();
        assert!(row.starts_with("192.168.0.2:40000<-->10.0.0.1:443,"));
        // Same column count in header and row.
        assert_eq!(header.split(',').count(), row.split(',').count());
    }
}
