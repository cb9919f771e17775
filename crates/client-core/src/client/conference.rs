//! Conference moderation
//!
//! Moderators of a conference get a private moderator channel. The server
//! publishes moderator broadcasts there, and moderator commands are
//! broadcast on it as `conf-control` requests. The conference roster itself
//! is an ordinary live array, see [`VertoClient::live_array`].

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::{VertoClient, WeakVertoClient};
use crate::subscription::{SubscribeOptions, SubscriptionHandle};

/// Called with the params of every moderator channel event
pub type BroadcastHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Moderator controls for one conference
#[derive(Debug)]
pub struct ConferenceModerator {
    client: WeakVertoClient,
    mod_channel: String,
    handles: Vec<SubscriptionHandle>,
    destroyed: bool,
}

impl ConferenceModerator {
    /// Subscribe to `mod_channel`, forwarding its events to `on_broadcast`
    pub fn new<F>(client: &VertoClient, mod_channel: impl Into<String>, on_broadcast: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mod_channel = mod_channel.into();
        let handler: BroadcastHandler = Arc::new(on_broadcast);
        let handles = client.subscribe(
            [mod_channel.clone()],
            SubscribeOptions::new().with_handler(move |params, _| handler(params)),
        );

        debug!(channel = %mod_channel, "Conference moderator ready");
        Self {
            client: client.downgrade(),
            mod_channel,
            handles,
            destroyed: false,
        }
    }

    pub fn mod_channel(&self) -> &str {
        &self.mod_channel
    }

    /// Send a `conf-control` command such as `kick`, `mute` or `vol_in`.
    ///
    /// `id` is usually a member id; `value` carries command arguments.
    pub fn mod_command(&self, command: &str, id: Option<Value>, value: Option<Value>) {
        if self.destroyed {
            debug!(channel = %self.mod_channel, command, "Moderator destroyed, command dropped");
            return;
        }
        let Some(client) = self.client.upgrade() else {
            return;
        };

        let mut data = json!({
            "application": "conf-control",
            "command": command,
        });
        if let Value::Object(map) = &mut data {
            if let Some(id) = id {
                map.insert("id".to_string(), id);
            }
            if let Some(value) = value {
                map.insert("value".to_string(), value);
            }
        }
        client.broadcast(&self.mod_channel, data);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Unsubscribe the moderator channel
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Some(client) = self.client.upgrade() {
            client.unsubscribe(&self.handles);
        }
        self.handles.clear();
    }
}
