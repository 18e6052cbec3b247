//! Library error type and `Result` alias.
//!
//! A small `thiserror` enum with message-bearing variants for the two fallible
//! boundaries the library owns (packet capture and the model seam). `anyhow`
//! stays at the binary/config boundary. Grounded on `layer234/error.rs`.

use thiserror::Error;

/// Library-level result alias.
pub type Result<T> = std::result::Result<T, VpnmonError>;

/// Errors surfaced by the vpnmon library.
#[derive(Debug, Error)]
pub enum VpnmonError {
    /// Packet capture / source failures.
    #[error("capture error: {0}")]
    Capture(String),

    /// Failures loading or parsing a model configuration.
    #[error("model config error: {0}")]
    ModelConfig(String),

    /// Failures evaluating the model at the classification seam.
    #[error("model error: {0}")]
    Model(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
