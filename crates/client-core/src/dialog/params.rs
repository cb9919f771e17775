//! Negotiation parameters carried by a dialog
//!
//! These are echoed to the server as `dialogParams` on every dialog request.
//! Fields the client does not interpret are kept in `extra` and passed
//! through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn is_false(b: &bool) -> bool {
    !*b
}

/// Per-dialog parameters (`dialogParams` on the wire)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogParams {
    #[serde(rename = "callID", skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee_id_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee_id_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_caller_id_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_caller_id_number: Option<String>,

    #[serde(rename = "useVideo")]
    pub use_video: bool,

    #[serde(rename = "useStereo")]
    pub use_stereo: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,

    /// Remote session description of an inbound offer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,

    /// The far end offered video on an inbound invite
    #[serde(rename = "wantVideo", skip_serializing_if = "is_false")]
    pub want_video: bool,

    /// Set for recovery attaches
    #[serde(skip_serializing_if = "is_false")]
    pub attach: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DialogParams {
    /// Parameters for an outbound call to `destination`
    pub fn outbound(destination: impl Into<String>) -> Self {
        Self {
            destination_number: Some(destination.into()),
            ..Default::default()
        }
    }

    /// Decode the params object of an inbound notification
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    pub fn with_caller_id(mut self, name: impl Into<String>, number: impl Into<String>) -> Self {
        self.caller_id_name = Some(name.into());
        self.caller_id_number = Some(number.into());
        self
    }

    pub fn with_video(mut self, enabled: bool) -> Self {
        self.use_video = enabled;
        self
    }

    pub fn with_stereo(mut self, enabled: bool) -> Self {
        self.use_stereo = enabled;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// JSON object for the `dialogParams` field of a request
    pub fn to_wire(&self, include_sdp: bool) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if !include_sdp {
            if let Value::Object(map) = &mut value {
                map.remove("sdp");
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_params_keep_unknown_fields() {
        let params = DialogParams::from_value(&json!({
            "callID": "c-1",
            "caller_id_name": "Alice",
            "caller_id_number": "1000",
            "sdp": "v=0",
            "verto_h_custom": "x",
        }))
        .unwrap();

        assert_eq!(params.call_id.as_deref(), Some("c-1"));
        assert_eq!(params.extra.get("verto_h_custom"), Some(&json!("x")));

        let wire = params.to_wire(true);
        assert_eq!(wire["callID"], "c-1");
        assert_eq!(wire["verto_h_custom"], "x");
        assert_eq!(wire["sdp"], "v=0");
    }

    #[test]
    fn test_sdp_omitted_on_request() {
        let mut params = DialogParams::outbound("3000");
        params.sdp = Some("v=0".into());

        let wire = params.to_wire(false);
        assert!(wire.get("sdp").is_none());
        assert_eq!(wire["destination_number"], "3000");
        assert_eq!(wire["useVideo"], false);
        assert!(wire.get("attach").is_none());
    }
}
