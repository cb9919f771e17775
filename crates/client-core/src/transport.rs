//! JSON-RPC transport seam
//!
//! The client never owns a socket. Framing, authentication handshakes and
//! reconnects belong to a [`Transport`] implementation supplied by the
//! application; the client only issues calls through it and receives inbound
//! notifications via [`VertoClient::handle_message`](crate::VertoClient::handle_message).

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error object returned by the server or synthesized by the transport
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Error used when the transport dropped before a reply arrived
    pub fn transport_closed() -> Self {
        Self::new(-32000, "transport closed")
    }
}

/// Outbound RPC channel to the Verto server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `method` with `params` and wait for the reply's `result`
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// Whether the connection is up and authenticated
    fn is_ready(&self) -> bool;
}

/// Verto protocol methods
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VertoMethod {
    Invite,
    Answer,
    Attach,
    Bye,
    Modify,
    Info,
    Display,
    Media,
    Event,
    Subscribe,
    Unsubscribe,
    Broadcast,
    Login,
    Unknown(String),
}

impl VertoMethod {
    pub fn as_str(&self) -> &str {
        match self {
            VertoMethod::Invite => "verto.invite",
            VertoMethod::Answer => "verto.answer",
            VertoMethod::Attach => "verto.attach",
            VertoMethod::Bye => "verto.bye",
            VertoMethod::Modify => "verto.modify",
            VertoMethod::Info => "verto.info",
            VertoMethod::Display => "verto.display",
            VertoMethod::Media => "verto.media",
            VertoMethod::Event => "verto.event",
            VertoMethod::Subscribe => "verto.subscribe",
            VertoMethod::Unsubscribe => "verto.unsubscribe",
            VertoMethod::Broadcast => "verto.broadcast",
            VertoMethod::Login => "login",
            VertoMethod::Unknown(other) => other,
        }
    }

    /// Whether requests for this method carry the session description in
    /// their `dialogParams`
    pub fn carries_sdp(&self) -> bool {
        matches!(self, VertoMethod::Invite | VertoMethod::Attach)
    }
}

impl FromStr for VertoMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "verto.invite" => VertoMethod::Invite,
            "verto.answer" => VertoMethod::Answer,
            "verto.attach" => VertoMethod::Attach,
            "verto.bye" => VertoMethod::Bye,
            "verto.modify" => VertoMethod::Modify,
            "verto.info" => VertoMethod::Info,
            "verto.display" => VertoMethod::Display,
            "verto.media" => VertoMethod::Media,
            "verto.event" => VertoMethod::Event,
            "verto.subscribe" => VertoMethod::Subscribe,
            "verto.unsubscribe" => VertoMethod::Unsubscribe,
            "verto.broadcast" => VertoMethod::Broadcast,
            "login" => VertoMethod::Login,
            other => VertoMethod::Unknown(other.to_string()),
        })
    }
}

impl fmt::Display for VertoMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-initiated notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl InboundMessage {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn verto_method(&self) -> VertoMethod {
        match self.method.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        }
    }

    /// `callID` of a call-scoped notification
    pub fn call_id(&self) -> Option<&str> {
        self.params.get("callID").and_then(Value::as_str)
    }
}
