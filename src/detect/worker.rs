//! Detection worker loop
//!
//! Single consumer of the packet channel. Per packet: routability filter,
//! key canonicalization, flow lookup/creation, then the per-flow state
//! machine: accumulate until `start_threshold`, evaluate every
//! `predict_rate`-th packet, expire past `end_threshold` packets or
//! `flow_ttl_secs` of age, whichever comes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::core::{FlowKey, HostKey, PacketMeta};
use crate::flow::{BoundedFlowCache, Flow};
use crate::model::{GuardedModel, Verdict};

use super::{DetectionEvent, DetectorConfig, DetectorStats, HostTracker};

/// Wall-clock epoch seconds, used for the sliding detection lists
fn wall_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

pub struct DetectWorker {
    config: DetectorConfig,
    cache: BoundedFlowCache,
    hosts: HostTracker,
    model: GuardedModel,
    packet_rx: Receiver<PacketMeta>,
    event_tx: Option<Sender<DetectionEvent>>,
    shutdown: Arc<AtomicBool>,
    shared: Arc<RwLock<DetectorStats>>,
    local: DetectorStats,
    next_flow_id: u64,
}

impl DetectWorker {
    pub fn new(
        config: DetectorConfig,
        model: GuardedModel,
        packet_rx: Receiver<PacketMeta>,
        shutdown: Arc<AtomicBool>,
        shared: Arc<RwLock<DetectorStats>>,
    ) -> Self {
        let cache = BoundedFlowCache::new(config.cache_capacity);
        let hosts = HostTracker::new(&config);
        Self {
            config,
            cache,
            hosts,
            model,
            packet_rx,
            event_tx: None,
            shutdown,
            shared,
            local: DetectorStats::default(),
            next_flow_id: 1,
        }
    }

    /// Deliver confirmed detections to a channel in addition to the log
    pub fn with_event_channel(mut self, tx: Sender<DetectionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Consume packets until the channel closes or the shutdown flag is set
    pub fn run(mut self) -> DetectorStats {
        info!("detect worker started");
        let mut last_stats = Instant::now();

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match self.packet_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(pkt) => self.process_packet(&pkt),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("packet channel closed, stopping detect worker");
                    break;
                }
            }

            if last_stats.elapsed().as_secs() >= self.config.stats_interval_secs {
                self.publish_stats();
                last_stats = Instant::now();
            }
        }

        self.publish_stats();
        info!(
            packets = self.local.packets,
            detections = self.local.detections,
            "detect worker stopped"
        );
        self.local
    }

    fn process_packet(&mut self, pkt: &PacketMeta) {
        self.local.packets += 1;

        let Some(key) = FlowKey::from_packet(pkt) else {
            self.local.filtered += 1;
            return;
        };

        let flow_id = self.next_flow_id;
        let (flows, created) = self.cache.get_or_create(key.as_str(), || Flow::new(flow_id));

        if created {
            self.next_flow_id += 1;
            self.local.flows_created += 1;
            if let Some(flow) = flows.first_mut() {
                flow.ingest(pkt);
            }
            // No evaluation on the creation packet.
            return;
        }

        let mut expired: Vec<u64> = Vec::new();

        for flow in flows.iter_mut() {
            flow.ingest(pkt);

            let count = flow.packet_count();
            let flow_created = flow.created_at().unwrap_or(pkt.timestamp);
            let aged_out = pkt.timestamp - flow_created > self.config.flow_ttl_secs;

            if count > self.config.end_threshold || aged_out {
                expired.push(flow.id);
                continue;
            }
            if count < self.config.start_threshold || count % self.config.predict_rate != 0 {
                continue;
            }

            let row = flow.features();
            if !row.is_complete() {
                // Not enough clean data yet; judgement is deferred and the
                // flow keeps accumulating.
                self.local.incomplete_rows += 1;
                continue;
            }

            self.local.evaluations += 1;
            match self.model.evaluate(&row) {
                Verdict::Rejected => {
                    self.local.rejected_samples += 1;
                    expired.push(flow.id);
                }
                Verdict::Skipped => {
                    self.local.model_skips += 1;
                }
                Verdict::Vpn => {
                    self.local.vpn_hits += 1;
                    let host = HostKey::from_packet(pkt);
                    if let Some(event) = self.hosts.record_vpn(&host, wall_now()) {
                        self.local.detections += 1;
                        info!(
                            host = %event.host_key,
                            vpn = event.possible_vpn,
                            non_vpn = event.possible_non_vpn,
                            recent = event.recent_detections,
                            "confirmed tunnel traffic"
                        );
                        if let Some(tx) = &self.event_tx {
                            let _ = tx.send(event);
                        }
                    }
                }
                Verdict::Normal => {
                    self.local.normal_hits += 1;
                    let host = HostKey::from_packet(pkt);
                    self.hosts.record_normal(&host, wall_now());
                }
            }
        }

        for id in expired {
            self.cache.remove(key.as_str(), id);
            self.local.flows_expired += 1;
        }
    }

    fn publish_stats(&mut self) {
        self.local.active_flows = self.cache.len();
        debug!(
            packets = self.local.packets,
            active_flows = self.local.active_flows,
            evaluations = self.local.evaluations,
            avg_model_latency = self.model.average_latency(),
            "detector stats"
        );
        *self.shared.write() = self.local.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crossbeam_channel::unbounded;

    use crate::core::packet::Transport;
    use crate::model::{Classifier, GuardConfig, Label};

    struct AlwaysVpn;

    impl Classifier for AlwaysVpn {
        fn predict(&self, _row: &crate::features::FeatureRow) -> crate::error::Result<Label> {
            Ok(Label::Vpn)
        }

        fn filter(&self, _row: &crate::features::FeatureRow) -> crate::error::Result<bool> {
            Ok(false)
        }
    }

    struct RejectAll;

    impl Classifier for RejectAll {
        fn predict(&self, _row: &crate::features::FeatureRow) -> crate::error::Result<Label> {
            Ok(Label::Normal)
        }

        fn filter(&self, _row: &crate::features::FeatureRow) -> crate::error::Result<bool> {
            Ok(true)
        }
    }

    fn packet_at(timestamp: f64) -> PacketMeta {
        PacketMeta::new(
            timestamp,
            400,
            Ipv4Addr::new(192, 168, 0, 2),
            Ipv4Addr::new(10, 0, 0, 1),
            Transport::Udp {
                src_port: 50000,
                dst_port: 1194,
            },
        )
    }

    /// Tight bursts separated by idle gaps, so every windowed feature has a
    /// qualifying window well before the first evaluation.
    fn burst_timestamps(count: usize) -> Vec<f64> {
        (0..count)
            .map(|i| (i / 4) as f64 * 0.3 + (i % 4) as f64 * 0.01)
            .collect()
    }

    fn worker(config: DetectorConfig, model: Box<dyn Classifier>) -> (DetectWorker, Receiver<DetectionEvent>) {
        let (_tx, rx) = unbounded::<PacketMeta>();
        let (event_tx, event_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(RwLock::new(DetectorStats::default()));
        let worker = DetectWorker::new(
            config,
            GuardedModel::new(model, GuardConfig::default()),
            rx,
            shutdown,
            shared,
        )
        .with_event_channel(event_tx);
        (worker, event_rx)
    }

    #[test]
    fn test_unroutable_packets_are_filtered() {
        let (mut w, _events) = worker(DetectorConfig::default(), Box::new(AlwaysVpn));

        let icmp = PacketMeta::new(
            0.0,
            64,
            Ipv4Addr::new(192, 168, 0, 2),
            Ipv4Addr::new(10, 0, 0, 1),
            Transport::Other(1),
        );
        w.process_packet(&icmp);

        assert_eq!(w.local.packets, 1);
        assert_eq!(w.local.filtered, 1);
        assert_eq!(w.cache.len(), 0);
    }

    #[test]
    fn test_end_to_end_detection_scenario() {
        let config = DetectorConfig {
            start_threshold: 10,
            end_threshold: 29,
            predict_rate: 5,
            total_detected_flow_threshold: 3,
            flow_number_for_detect: 1,
            vpn_to_novpn_ratio: 0.0,
            ..DetectorConfig::default()
        };
        let (mut w, events) = worker(config, Box::new(AlwaysVpn));

        let mut first_event_at = None;
        for (i, t) in burst_timestamps(30).into_iter().enumerate() {
            w.process_packet(&packet_at(t));
            if first_event_at.is_none() && !events.is_empty() {
                first_event_at = Some(i + 1);
            }
        }

        // Evaluations land on packets 10, 15, 20 and 25; the third positive
        // crosses the count threshold.
        assert_eq!(first_event_at, Some(20));
        assert_eq!(events.len(), 2);

        // Packet 30 pushed the flow past the end threshold.
        assert_eq!(w.local.flows_expired, 1);
        assert_eq!(w.cache.len(), 0);

        let event = events.recv().unwrap();
        assert_eq!(event.host_key, "10.0.0.1<-->192.168.0.2");
        assert_eq!(event.possible_vpn, 3);
        assert_eq!(event.possible_non_vpn, 0);
    }

    #[test]
    fn test_incomplete_row_retains_flow() {
        let config = DetectorConfig {
            start_threshold: 10,
            end_threshold: 100,
            predict_rate: 5,
            flow_ttl_secs: 1e9,
            ..DetectorConfig::default()
        };
        let (mut w, _events) = worker(config, Box::new(AlwaysVpn));

        // Packets 0.5s apart: every window stays a singleton, so windowed
        // features never become defined.
        for i in 0..12 {
            w.process_packet(&packet_at(i as f64 * 0.5));
        }

        assert!(w.local.incomplete_rows > 0);
        assert_eq!(w.local.evaluations, 0);
        assert_eq!(w.cache.len(), 1);
    }

    #[test]
    fn test_filter_rejection_evicts_flow() {
        let config = DetectorConfig {
            start_threshold: 10,
            end_threshold: 100,
            predict_rate: 5,
            ..DetectorConfig::default()
        };
        let (mut w, events) = worker(config, Box::new(RejectAll));

        for t in burst_timestamps(10) {
            w.process_packet(&packet_at(t));
        }

        assert_eq!(w.local.rejected_samples, 1);
        assert_eq!(w.local.flows_expired, 1);
        assert_eq!(w.cache.len(), 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_flow_expires_by_age() {
        let config = DetectorConfig {
            flow_ttl_secs: 3.0,
            ..DetectorConfig::default()
        };
        let (mut w, _events) = worker(config, Box::new(AlwaysVpn));

        w.process_packet(&packet_at(0.0));
        w.process_packet(&packet_at(0.1));
        assert_eq!(w.cache.len(), 1);

        // Well past the ttl: ingested, then expired on the same packet.
        w.process_packet(&packet_at(5.0));
        assert_eq!(w.local.flows_expired, 1);
        assert_eq!(w.cache.len(), 0);
    }

    #[test]
    fn test_run_drains_channel_and_stops_on_disconnect() {
        let (tx, rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(RwLock::new(DetectorStats::default()));
        let worker = DetectWorker::new(
            DetectorConfig::default(),
            GuardedModel::new(Box::new(AlwaysVpn), GuardConfig::default()),
            rx,
            shutdown,
            Arc::clone(&shared),
        );

        let handle = std::thread::spawn(move || worker.run());

        for t in burst_timestamps(8) {
            tx.send(packet_at(t)).unwrap();
        }
        drop(tx);

        let stats = handle.join().unwrap();
        assert_eq!(stats.packets, 8);
        assert_eq!(stats.flows_created, 1);
        assert_eq!(shared.read().packets, 8);
    }

    #[test]
    fn test_shutdown_flag_stops_worker() {
        let (_tx, rx) = unbounded::<PacketMeta>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(RwLock::new(DetectorStats::default()));
        let worker = DetectWorker::new(
            DetectorConfig::default(),
            GuardedModel::new(Box::new(AlwaysVpn), GuardConfig::default()),
            rx,
            Arc::clone(&shutdown),
            shared,
        );

        let handle = std::thread::spawn(move || worker.run());
        shutdown.store(true, Ordering::Relaxed);

        let stats = handle.join().unwrap();
        assert_eq!(stats.packets, 0);
    }
}
