//! Wire representation of live-array traffic
//!
//! Inbound deltas arrive inside `verto.event` notifications as the event's
//! `data` object:
//!
//! ```json
//! { "action": "add", "name": "conf-roster", "wireSerno": 12,
//!   "hashKey": "a1b2", "arrIndex": 3, "data": ["a1b2", "1000", "Alice"] }
//! ```
//!
//! Outbound commands are broadcast on the bound channel wrapped in a
//! `liveArray` envelope (see [`LiveArrayCommand::to_broadcast`]).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{LiveArrayError, LiveArrayResult};

/// Delta action carried by a packet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LiveArrayAction {
    /// Metadata announcement (e.g. column names); does not mutate
    Init,
    /// Full state bootstrap
    BootObj,
    Add,
    Modify,
    Del,
    Clear,
    Reorder,
    /// Anything else, forwarded verbatim
    Other(String),
}

impl LiveArrayAction {
    pub fn as_str(&self) -> &str {
        match self {
            LiveArrayAction::Init => "init",
            LiveArrayAction::BootObj => "bootObj",
            LiveArrayAction::Add => "add",
            LiveArrayAction::Modify => "modify",
            LiveArrayAction::Del => "del",
            LiveArrayAction::Clear => "clear",
            LiveArrayAction::Reorder => "reorder",
            LiveArrayAction::Other(other) => other,
        }
    }
}

impl From<String> for LiveArrayAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "init" => LiveArrayAction::Init,
            "bootObj" => LiveArrayAction::BootObj,
            "add" => LiveArrayAction::Add,
            "modify" => LiveArrayAction::Modify,
            "del" => LiveArrayAction::Del,
            "clear" => LiveArrayAction::Clear,
            "reorder" => LiveArrayAction::Reorder,
            _ => LiveArrayAction::Other(s),
        }
    }
}

impl From<LiveArrayAction> for String {
    fn from(action: LiveArrayAction) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for LiveArrayAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded live-array packet
#[derive(Debug, Clone, Deserialize)]
pub struct LiveArrayPacket {
    pub action: LiveArrayAction,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "wireSerno", default)]
    pub wire_serno: Option<i64>,

    #[serde(rename = "hashKey", default)]
    pub hash_key: Option<Value>,

    #[serde(rename = "arrIndex", default)]
    pub arr_index: Option<i64>,

    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default)]
    pub order: Option<Vec<Value>>,
}

impl LiveArrayPacket {
    /// Decode a packet from an event `data` value
    pub fn from_value(value: Value) -> LiveArrayResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// The packet key as a string, when present
    pub fn key(&self) -> Option<String> {
        self.hash_key.as_ref().and_then(key_from_value)
    }

    /// Array index; negative indexes count as absent
    pub fn index(&self) -> Option<usize> {
        self.arr_index
            .filter(|i| *i >= 0)
            .map(|i| i as usize)
    }

    /// Convert into an engine delta.
    ///
    /// `modify` and `del` require a key or an index.
    pub fn into_delta(self) -> LiveArrayResult<(Option<i64>, Delta)> {
        let key = self.key();
        let index = self.index();
        let serial = self.wire_serno;

        let delta = match self.action {
            LiveArrayAction::Init => Delta::Init {
                key,
                index,
                data: self.data.unwrap_or(Value::Null),
            },
            LiveArrayAction::BootObj => Delta::BootObj(boot_pairs(self.data)?),
            LiveArrayAction::Add => Delta::Add {
                key,
                index,
                data: self.data.unwrap_or(Value::Null),
            },
            LiveArrayAction::Modify => {
                if key.is_none() && index.is_none() {
                    return Err(LiveArrayError::MalformedPacket(
                        "modify without hashKey or arrIndex".to_string(),
                    ));
                }
                Delta::Modify {
                    key,
                    index,
                    data: self.data.unwrap_or(Value::Null),
                }
            }
            LiveArrayAction::Del => {
                if key.is_none() && index.is_none() {
                    return Err(LiveArrayError::MalformedPacket(
                        "del without hashKey or arrIndex".to_string(),
                    ));
                }
                Delta::Del { key, index }
            }
            LiveArrayAction::Clear => Delta::Clear,
            LiveArrayAction::Reorder => Delta::Reorder(
                self.order
                    .unwrap_or_default()
                    .iter()
                    .filter_map(key_from_value)
                    .collect(),
            ),
            LiveArrayAction::Other(action) => Delta::Other {
                action,
                data: self.data,
            },
        };

        Ok((serial, delta))
    }
}

/// A mutation to apply to a [`LiveArray`](crate::LiveArray)
///
/// `key` defaults to the serial number when absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Init {
        key: Option<String>,
        index: Option<usize>,
        data: Value,
    },
    BootObj(Vec<(String, Value)>),
    Add {
        key: Option<String>,
        index: Option<usize>,
        data: Value,
    },
    Modify {
        key: Option<String>,
        index: Option<usize>,
        data: Value,
    },
    Del {
        key: Option<String>,
        index: Option<usize>,
    },
    Clear,
    Reorder(Vec<String>),
    Other {
        action: String,
        data: Option<Value>,
    },
}

impl Delta {
    pub fn action(&self) -> LiveArrayAction {
        match self {
            Delta::Init { .. } => LiveArrayAction::Init,
            Delta::BootObj(_) => LiveArrayAction::BootObj,
            Delta::Add { .. } => LiveArrayAction::Add,
            Delta::Modify { .. } => LiveArrayAction::Modify,
            Delta::Del { .. } => LiveArrayAction::Del,
            Delta::Clear => LiveArrayAction::Clear,
            Delta::Reorder(_) => LiveArrayAction::Reorder,
            Delta::Other { action, .. } => LiveArrayAction::Other(action.clone()),
        }
    }
}

/// Commands a live array sends to the server
#[derive(Debug, Clone, PartialEq)]
pub enum LiveArrayCommand {
    /// Ask the server to resend the full state
    Bootstrap(Value),
    /// Ask for a different page or slice
    ChangePage(Value),
    /// Periodic liveness signal
    Heartbeat(Value),
}

impl LiveArrayCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LiveArrayCommand::Bootstrap(_) => "bootstrap",
            LiveArrayCommand::ChangePage(_) => "changepage",
            LiveArrayCommand::Heartbeat(_) => "heartbeat",
        }
    }

    pub fn obj(&self) -> &Value {
        match self {
            LiveArrayCommand::Bootstrap(obj)
            | LiveArrayCommand::ChangePage(obj)
            | LiveArrayCommand::Heartbeat(obj) => obj,
        }
    }

    /// Broadcast payload for the bound channel
    pub fn to_broadcast(&self, context: &str, name: &str) -> Value {
        json!({
            "liveArray": {
                "command": self.name(),
                "context": context,
                "name": name,
                "obj": self.obj(),
            }
        })
    }
}

fn key_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn boot_pairs(data: Option<Value>) -> LiveArrayResult<Vec<(String, Value)>> {
    let items = match data {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(LiveArrayError::MalformedPacket(format!(
                "bootObj data is not a list: {}",
                other
            )))
        }
    };

    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        let mut pair = match item {
            Value::Array(pair) if pair.len() >= 2 => pair,
            other => {
                return Err(LiveArrayError::MalformedPacket(format!(
                    "bootObj entry is not a [key, value] pair: {}",
                    other
                )))
            }
        };
        let value = pair.swap_remove(1);
        let key = key_from_value(&pair[0]).ok_or_else(|| {
            LiveArrayError::MalformedPacket(format!("bootObj key is not scalar: {}", pair[0]))
        })?;
        pairs.push((key, value));
    }
    Ok(pairs)
}
