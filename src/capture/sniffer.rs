//! Producer loop: capture source -> packet channel
//!
//! The channel between the sniffer and the detect worker is the only
//! packet-path synchronization in the process. It is bounded by default;
//! when the consumer falls behind, overflowing packets are dropped and
//! counted instead of growing memory without limit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use tracing::{info, warn};

use crate::core::PacketMeta;

use super::PacketSource;

/// Sniffer counters
#[derive(Debug, Clone, Default)]
pub struct SnifferStats {
    /// Packets forwarded into the channel
    pub forwarded: u64,
    /// Packets dropped because the channel was full
    pub dropped: u64,
    /// Capture read errors (logged, not fatal)
    pub errors: u64,
}

pub struct Sniffer {
    source: Box<dyn PacketSource>,
    tx: Sender<PacketMeta>,
    shutdown: Arc<AtomicBool>,
    stats: SnifferStats,
}

impl Sniffer {
    pub fn new(
        source: Box<dyn PacketSource>,
        tx: Sender<PacketMeta>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            tx,
            shutdown,
            stats: SnifferStats::default(),
        }
    }

    /// Forward packets until shutdown, source end, or consumer disconnect.
    /// Dropping the sender on return tells the worker the stream is over.
    pub fn run(mut self) -> SnifferStats {
        info!("sniffer started");

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.source.next_packet() {
                Ok(Some(pkt)) => match self.tx.try_send(pkt) {
                    Ok(()) => self.stats.forwarded += 1,
                    Err(TrySendError::Full(_)) => {
                        self.stats.dropped += 1;
                        if self.stats.dropped % 10_000 == 1 {
                            warn!(
                                dropped = self.stats.dropped,
                                "packet channel full, dropping"
                            );
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        info!("consumer gone, stopping sniffer");
                        break;
                    }
                },
                Ok(None) => {
                    if self.source.done() {
                        break;
                    }
                }
                Err(e) => {
                    self.stats.errors += 1;
                    warn!("capture read failed: {e}");
                }
            }
        }

        info!(
            forwarded = self.stats.forwarded,
            dropped = self.stats.dropped,
            "sniffer stopped"
        );
        self.stats
    }
}
