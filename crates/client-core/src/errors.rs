//! Error types for verto-client-core

use thiserror::Error;

use crate::dialog::{CallId, CallState};
use crate::media::MediaError;
use crate::transport::RpcError;
use verto_live_array::LiveArrayError;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client API
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport is not connected; no call can be placed
    #[error("transport is not connected")]
    NotConnected,

    /// Operation on a call that does not exist (or was already destroyed)
    #[error("call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    /// Call state machine rejected a transition
    #[error("invalid call state transition from {from} to {to}")]
    InvalidTransition { from: CallState, to: CallState },

    /// A message was missing required fields
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// An inbound notification could not be interpreted
    #[error("malformed inbound message: {0}")]
    MalformedMessage(String),

    /// Configuration failed validation or parsing
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A remote procedure call failed
    #[error("{method} failed: {source}")]
    Rpc {
        method: String,
        #[source]
        source: RpcError,
    },

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    LiveArray(#[from] LiveArrayError),
}

impl ClientError {
    pub fn rpc(method: impl Into<String>, source: RpcError) -> Self {
        ClientError::Rpc {
            method: method.into(),
            source,
        }
    }

    pub fn call_not_found(call_id: &CallId) -> Self {
        ClientError::CallNotFound {
            call_id: call_id.clone(),
        }
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::Configuration(err.to_string())
    }
}
