//! Error types for live-array replication

use thiserror::Error;

/// Result alias used across this crate
pub type LiveArrayResult<T> = Result<T, LiveArrayError>;

/// Errors raised while decoding or applying live-array deltas
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LiveArrayError {
    /// The engine was torn down; no further deltas are accepted
    #[error("live array '{name}' has been destroyed")]
    Destroyed { name: String },

    /// A packet was structurally invalid for its action
    #[error("malformed live array packet: {0}")]
    MalformedPacket(String),

    /// The event payload could not be decoded at all
    #[error("failed to decode live array packet: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for LiveArrayError {
    fn from(err: serde_json::Error) -> Self {
        LiveArrayError::Decode(err.to_string())
    }
}
