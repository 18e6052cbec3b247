//! Core packet and key types shared by every pipeline stage

pub mod key;
pub mod packet;

pub use key::{FlowKey, HostKey};
pub use packet::{PacketMeta, Transport};
