//! Capture-time packet summary
//!
//! Only header-derived fields survive capture: timestamp, wire length,
//! IPv4 endpoints and the transport ports. Payload bytes never enter the
//! pipeline.

use std::net::Ipv4Addr;

/// Transport layer of a captured packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp { src_port: u16, dst_port: u16 },
    Udp { src_port: u16, dst_port: u16 },
    /// Any other IPv4 protocol (ICMP, GRE, ...), by protocol number
    Other(u8),
}

impl Transport {
    pub fn src_port(&self) -> Option<u16> {
        match self {
            Transport::Tcp { src_port, .. } | Transport::Udp { src_port, .. } => Some(*src_port),
            Transport::Other(_) => None,
        }
    }

    pub fn dst_port(&self) -> Option<u16> {
        match self {
            Transport::Tcp { dst_port, .. } | Transport::Udp { dst_port, .. } => Some(*dst_port),
            Transport::Other(_) => None,
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp { .. } => write!(f, "TCP"),
            Transport::Udp { .. } => write!(f, "UDP"),
            Transport::Other(n) => write!(f, "Proto({})", n),
        }
    }
}

/// One captured packet, reduced to the fields the flow pipeline consumes
#[derive(Debug, Clone)]
pub struct PacketMeta {
    /// Capture timestamp, epoch seconds (non-decreasing per source)
    pub timestamp: f64,
    /// Raw wire length including headers
    pub length: u32,
    /// IPv4 source address
    pub src_ip: Ipv4Addr,
    /// IPv4 destination address
    pub dst_ip: Ipv4Addr,
    /// Transport layer
    pub transport: Transport,
}

impl PacketMeta {
    pub fn new(
        timestamp: f64,
        length: u32,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        transport: Transport,
    ) -> Self {
        Self {
            timestamp,
            length,
            src_ip,
            dst_ip,
            transport,
        }
    }

    /// TCP or UDP packets are the only ones the flow pipeline accepts
    pub fn is_routable(&self) -> bool {
        matches!(
            self.transport,
            Transport::Tcp { .. } | Transport::Udp { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routable_filter() {
        let tcp = PacketMeta::new(
            0.0,
            64,
            Ipv4Addr::new(192, 168, 1, 2),
            Ipv4Addr::new(10, 0, 0, 1),
            Transport::Tcp {
                src_port: 44321,
                dst_port: 443,
            },
        );
        assert!(tcp.is_routable());

        let icmp = PacketMeta::new(
            0.0,
            64,
            Ipv4Addr::new(192, 168, 1, 2),
            Ipv4Addr::new(10, 0, 0, 1),
            Transport::Other(1),
        );
        assert!(!icmp.is_routable());
        assert_eq!(icmp.transport.src_port(), None);
    }
}
