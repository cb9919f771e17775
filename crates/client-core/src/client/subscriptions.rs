//! Channel subscription operations
//!
//! Thin async glue around [`SubscriptionManager`](crate::subscription::SubscriptionManager):
//! registry changes happen under the session lock, server requests and
//! ready callbacks run after it is released.

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::VertoClient;
use crate::events::ClientEvent;
use crate::subscription::{ReadyNotification, SubscribeOptions, SubscriptionHandle};
use crate::transport::VertoMethod;

impl VertoClient {
    /// Subscribe to one or more channels.
    ///
    /// Returns one handle per channel. Channels nobody was subscribed to are
    /// requested from the server in a single `verto.subscribe`.
    pub fn subscribe<I, S>(&self, channels: I, options: SubscribeOptions) -> Vec<SubscriptionHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let outcome = self.state().lock().subscriptions.subscribe(channels, &options);

        fire_ready(&outcome.ready);

        if let Some(request) = outcome.request {
            self.spawn_call(VertoMethod::Subscribe, request, |client, result| {
                let reply = match result {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(error = %err, "Subscribe request failed");
                        match err.data {
                            Some(data) => data,
                            None => return,
                        }
                    }
                };
                client.process_subscribe_reply(&reply);
            });
        }

        outcome.handles
    }

    /// Remove individual subscribers; the server is told about channels
    /// that lost their last subscriber
    pub fn unsubscribe(&self, handles: &[SubscriptionHandle]) {
        let request = self.state().lock().subscriptions.unsubscribe(handles);
        self.send_unsubscribe(request);
    }

    /// Drop a channel with every subscriber on it
    pub fn unsubscribe_channel(&self, channel: &str) {
        let request = self.state().lock().subscriptions.unsubscribe_channel(channel);
        self.send_unsubscribe(request);
    }

    pub fn unsubscribe_all(&self) {
        let request = self.state().lock().subscriptions.unsubscribe_all();
        self.send_unsubscribe(request);
    }

    /// Publish `data` on `channel` through the server
    pub fn broadcast(&self, channel: &str, data: Value) {
        let params = json!({
            "eventChannel": channel,
            "data": data,
        });
        let channel = channel.to_string();
        self.spawn_call(VertoMethod::Broadcast, params, move |_, result| {
            if let Err(err) = result {
                warn!(channel = %channel, error = %err, "Broadcast failed");
            }
        });
    }

    fn process_subscribe_reply(&self, reply: &Value) {
        let outcome = self.state().lock().subscriptions.process_subscribe_reply(reply);

        for channel in outcome.rejected {
            self.emit(ClientEvent::SubscriptionRejected { channel });
        }
        for channel in outcome.confirmed {
            self.emit(ClientEvent::SubscriptionReady { channel });
        }
        fire_ready(&outcome.ready);
    }

    fn send_unsubscribe(&self, request: Option<Value>) {
        let Some(request) = request else {
            return;
        };
        self.spawn_call(VertoMethod::Unsubscribe, request, |_, result| match result {
            Ok(_) => debug!("Unsubscribed"),
            Err(err) => warn!(error = %err, "Unsubscribe request failed"),
        });
    }
}

fn fire_ready(notifications: &[ReadyNotification]) {
    notifications.iter().for_each(ReadyNotification::fire);
}
