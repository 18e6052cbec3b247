//! Offline pcap replay
//!
//! Feeds a recorded capture through the same pipeline as live traffic,
//! using the pcap header timestamps. Used for diagnostics, feature export
//! and regression runs against labeled captures.

use std::path::Path;

use pcap::{Capture, Offline};
use tracing::info;

use crate::core::PacketMeta;
use crate::error::{Result, VpnmonError};

use super::{parse_frame, CaptureStats, PacketSource};

pub struct FileSource {
    capture: Capture<Offline>,
    stats: CaptureStats,
    finished: bool,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let capture = Capture::from_file(path)
            .map_err(|e| VpnmonError::Capture(format!("open {}: {e}", path.display())))?;

        info!(path = %path.display(), "replaying capture file");
        Ok(Self {
            capture,
            stats: CaptureStats::default(),
            finished: false,
        })
    }
}

impl PacketSource for FileSource {
    fn next_packet(&mut self) -> Result<Option<PacketMeta>> {
        if self.finished {
            return Ok(None);
        }

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
            Err(pcap::Error::NoMorePackets) => {
                self.finished = true;
                info!(frames = self.stats.received, "capture file exhausted");
                Ok(None)
            }
            Err(e) => Err(VpnmonError::Capture(e.to_string())),
        }
    }

    fn done(&self) -> bool {
        self.finished
    }

    fn stats(&self) -> CaptureStats {
        self.stats.clone()
    }
}
