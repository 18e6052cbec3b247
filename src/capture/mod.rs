//! Packet capture sources
//!
//! Capture is a narrow external boundary: a [`PacketSource`] yields
//! [`PacketMeta`] records in non-decreasing timestamp order (the windowing
//! logic relies on this; out-of-order delivery is not repaired here). Frames
//! that are not IPv4 yield nothing rather than an error.

pub mod file;
pub mod live;
pub mod sniffer;

pub use file::FileSource;
pub use live::LiveSource;
pub use sniffer::Sniffer;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use serde::{Deserialize, Serialize};

use crate::core::{PacketMeta, Transport};
use crate::error::Result;

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interface name for live capture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Snapshot length
    pub snaplen: u32,
    /// Enable promiscuous mode
    pub promiscuous: bool,
    /// Read timeout in milliseconds (bounds the shutdown latency)
    pub read_timeout_ms: u32,
    /// Packet channel bound; 0 keeps the channel unbounded
    pub channel_bound: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            snaplen: 65535,
            promiscuous: true,
            read_timeout_ms: 100,
            channel_bound: 10_000,
        }
    }
}

/// Capture counters
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    /// Frames delivered by the capture device
    pub received: u64,
    /// Frames without an IPv4 layer
    pub non_ip: u64,
}

/// Trait for packet capture implementations
pub trait PacketSource: Send {
    /// Next packet; `Ok(None)` when nothing is available right now
    fn next_packet(&mut self) -> Result<Option<PacketMeta>>;

    /// True once the source can never yield again (file replay ended)
    fn done(&self) -> bool {
        false
    }

    /// Capture statistics
    fn stats(&self) -> CaptureStats;
}

/// Slice an ethernet frame down to the pipeline's packet summary
///
/// Returns `None` for anything that is not IPv4; TCP/UDP ports are carried
/// through, other transports keep only the protocol number and get filtered
/// by the worker.
pub fn parse_frame(timestamp: f64, wire_len: u32, data: &[u8]) -> Option<PacketMeta> {
    let sliced = SlicedPacket::from_ethernet(data).ok()?;

    let ipv4 = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => ipv4,
        _ => return None,
    };
    let header = ipv4.header();
    let src_ip = header.source_addr();
    let dst_ip = header.destination_addr();

    let transport = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => Transport::Tcp {
            src_port: tcp.source_port(),
            dst_port: tcp.destination_port(),
        },
        Some(TransportSlice::Udp(udp)) => Transport::Udp {
            src_port: udp.source_port(),
            dst_port: udp.destination_port(),
        },
        _ => Transport::Other(header.protocol().0),
    };

    Some(PacketMeta::new(timestamp, wire_len, src_ip, dst_ip, transport))
}
