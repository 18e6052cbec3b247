//! vpnmon: real-time VPN/tunnel traffic detection
//!
//! Classifies live traffic into bidirectional flows and decides, per remote
//! host, whether the traffic looks tunneled, using only packet-header
//! statistics. One capture thread feeds one detection thread through a
//! bounded channel:
//!
//! ```text
//! capture -> channel -> detect worker -> (key -> flow cache -> extractors)
//!                                     -> feature row -> classifier
//!                                     -> per-host debounce -> events
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod detect;
pub mod error;
pub mod export;
pub mod features;
pub mod flow;
pub mod model;

pub use config::Config;
pub use error::{Result, VpnmonError};
