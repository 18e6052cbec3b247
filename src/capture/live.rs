//! Live interface capture via libpcap

use pcap::{Active, Capture};
use tracing::info;

use crate::core::PacketMeta;
use crate::error::{Result, VpnmonError};

use super::{parse_frame, CaptureConfig, CaptureStats, PacketSource};

pub struct LiveSource {
    capture: Capture<Active>,
    stats: CaptureStats,
}

impl LiveSource {
    /// Open an interface for live capture
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let interface = config
            .interface
            .clone()
            .ok_or_else(|| VpnmonError::Capture("capture interface required".into()))?;

        let capture = Capture::from_device(interface.as_str())
            .map_err(|e| VpnmonError::Capture(format!("device {interface}: {e}")))?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen as i32)
            .timeout(config.read_timeout_ms as i32)
            .open()
            .map_err(|e| VpnmonError::Capture(format!("open {interface}: {e}")))?;

        info!(interface = %interface, promiscuous = config.promiscuous, "live capture started");
        Ok(Self {
            capture,
            stats: CaptureStats::default(),
        })
    }
}

impl PacketSource for LiveSource {
    fn next_packet(&mut self) -> Result<Option<PacketMeta>> {
        match self.capture.next_packet() {
            Ok(frame) => {
                self.stats.received += 1;
                let timestamp =
                    frame.header.ts.tv_sec as f64 + frame.header.ts.tv_usec as f64 * 1e-6;
                match parse_frame(timestamp, frame.header.len, frame.data) {
                    Some(pkt) => Ok(Some(pkt)),
                    None => {
                        self.stats.non_ip += 1;
                        Ok(None)
                    }
                }
            }
            // Read timeout: nothing arrived inside read_timeout_ms. This is
            // the suspension point where the sniffer checks for shutdown.
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(VpnmonError::Capture(e.to_string())),
        }
    }

    fn stats(&self) -> CaptureStats {
        self.stats.clone()
    }
}
