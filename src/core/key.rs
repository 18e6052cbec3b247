//! Flow and host key canonicalization
//!
//! Two distinct canonicalization rules coexist:
//!
//! - [`FlowKey`] identifies one bidirectional connection. Endpoints are
//!   ordered by the numerically larger first dotted-decimal octet (ties
//!   broken by full address, then port) so both directions hash identically.
//! - [`HostKey`] identifies the pair of hosts regardless of ports. The two
//!   IP strings are sorted lexicographically, independent of the flow-key
//!   ordering rule.

use std::net::Ipv4Addr;

use super::packet::PacketMeta;

/// Direction-independent identity of one connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey(String);

impl FlowKey {
    /// Canonical key for a routable packet; `None` for anything that is not
    /// IPv4 + TCP/UDP (filtered before the pipeline, not an error).
    pub fn from_packet(pkt: &PacketMeta) -> Option<Self> {
        let src_port = pkt.transport.src_port()?;
        let dst_port = pkt.transport.dst_port()?;

        let src = Endpoint::new(pkt.src_ip, src_port);
        let dst = Endpoint::new(pkt.dst_ip, dst_port);

        // Larger first octet goes first; ties fall back to the full address
        // and port so that key(a->b) == key(b->a) always holds.
        let (first, second) = if src.rank() > dst.rank() {
            (src, dst)
        } else {
            (dst, src)
        };

        Some(Self(format!("{}<-->{}", first, second)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Port-free identity of the two hosts behind a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey(String);

impl HostKey {
    pub fn from_packet(pkt: &PacketMeta) -> Self {
        let a = pkt.src_ip.to_string();
        let b = pkt.dst_ip.to_string();
        if a <= b {
            Self(format!("{}<-->{}", a, b))
        } else {
            Self(format!("{}<-->{}", b, a))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Endpoint {
    ip: Ipv4Addr,
    port: u16,
}

impl Endpoint {
    fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Ordering rank: first octet dominates, full address and port break ties
    fn rank(&self) -> (u8, [u8; 4], u16) {
        (self.ip.octets()[0], self.ip.octets(), self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}
