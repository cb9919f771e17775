//! Channel subscriptions
//!
//! [`SubscriptionManager`] keeps, per channel, the ordered list of local
//! subscribers and decides when the server has to be told about a channel.
//! It never talks to the transport itself: operations return the
//! `verto.subscribe` / `verto.unsubscribe` parameters to send (if any) and the
//! ready callbacks to run, so the owner can do both outside its lock.
//!
//! Readiness is a per-channel property. The first subscriber on a channel
//! waits for the server to confirm it; later subscribers on a confirmed
//! channel are ready at once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

/// Process-wide subscriber serial counter
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Channel event callback: event params and the subscriber's user data
pub type EventHandler = Arc<dyn Fn(&Value, Option<&Value>) + Send + Sync>;

/// Called with the channel name once a subscription is confirmed
pub type ReadyHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Options for [`SubscriptionManager::subscribe`]
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    pub handler: Option<EventHandler>,
    pub ready_handler: Option<ReadyHandler>,
    pub user_data: Option<Value>,
    /// Ready immediately, without a server round trip
    pub local: bool,
    /// Extra parameters for the server subscribe request
    pub sub_params: Option<Value>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Value, Option<&Value>) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn with_ready_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.ready_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_user_data(mut self, user_data: Value) -> Self {
        self.user_data = Some(user_data);
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn with_sub_params(mut self, params: Value) -> Self {
        self.sub_params = Some(params);
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .field("ready_handler", &self.ready_handler.as_ref().map(|_| "<handler>"))
            .field("user_data", &self.user_data)
            .field("local", &self.local)
            .field("sub_params", &self.sub_params)
            .finish()
    }
}

/// Identifies one subscriber record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub serial: u64,
    pub channel: String,
}

struct Subscriber {
    serial: u64,
    handler: Option<EventHandler>,
    ready_handler: Option<ReadyHandler>,
    user_data: Option<Value>,
    ready: bool,
    local: bool,
}

/// A ready callback to run once the lock is released
#[derive(Clone)]
pub struct ReadyNotification {
    pub channel: String,
    pub handler: ReadyHandler,
}

impl ReadyNotification {
    pub fn fire(&self) {
        (self.handler)(&self.channel)
    }
}

impl fmt::Debug for ReadyNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyNotification")
            .field("channel", &self.channel)
            .finish()
    }
}

/// Result of a subscribe call
#[derive(Debug, Default)]
pub struct SubscribeOutcome {
    pub handles: Vec<SubscriptionHandle>,
    /// `verto.subscribe` params, when new channels must be requested
    pub request: Option<Value>,
    /// Late joiners on already confirmed channels
    pub ready: Vec<ReadyNotification>,
}

/// Result of a `verto.subscribe` reply
#[derive(Debug, Default)]
pub struct SubscribeReplyOutcome {
    pub rejected: Vec<String>,
    pub confirmed: Vec<String>,
    pub ready: Vec<ReadyNotification>,
}

/// How one subscriber receives a channel event
#[derive(Clone)]
pub enum Delivery {
    Handler {
        handler: EventHandler,
        user_data: Option<Value>,
    },
    /// No handler: surface as a generic session-level event
    Fallback { user_data: Option<Value> },
}

impl Delivery {
    pub fn user_data(&self) -> Option<&Value> {
        match self {
            Delivery::Handler { user_data, .. } | Delivery::Fallback { user_data } => {
                user_data.as_ref()
            }
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Handler { user_data, .. } => f
                .debug_struct("Handler")
                .field("user_data", user_data)
                .finish(),
            Delivery::Fallback { user_data } => f
                .debug_struct("Fallback")
                .field("user_data", user_data)
                .finish(),
        }
    }
}

/// Channel → subscribers registry
#[derive(Default)]
pub struct SubscriptionManager {
    channels: HashMap<String, Vec<Subscriber>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one subscriber per channel.
    ///
    /// Channels seen for the first time are batched into a single server
    /// request (a bare string for one channel, a list for several).
    pub fn subscribe<I, S>(&mut self, channels: I, options: &SubscribeOptions) -> SubscribeOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut outcome = SubscribeOutcome::default();
        let mut new_channels: Vec<String> = Vec::new();

        for channel in channels {
            let channel = channel.into();
            let mut record = Subscriber {
                serial: next_serial(),
                handler: options.handler.clone(),
                ready_handler: options.ready_handler.clone(),
                user_data: options.user_data.clone(),
                ready: options.local,
                local: options.local,
            };

            let list = self.channels.entry(channel.clone()).or_default();
            let is_new = list.is_empty();
            if is_new {
                new_channels.push(channel.clone());
            }

            if !is_new && !record.ready && list[0].ready {
                record.ready = true;
                if let Some(handler) = &record.ready_handler {
                    outcome.ready.push(ReadyNotification {
                        channel: channel.clone(),
                        handler: handler.clone(),
                    });
                }
            }

            debug!(channel = %channel, serial = record.serial, ready = record.ready, "Subscriber added");
            outcome.handles.push(SubscriptionHandle {
                serial: record.serial,
                channel,
            });
            list.push(record);
        }

        if !new_channels.is_empty() {
            let mut params = Map::new();
            params.insert("eventChannel".to_string(), channel_list(new_channels));
            if let Some(sub_params) = &options.sub_params {
                params.insert("subParams".to_string(), sub_params.clone());
            }
            outcome.request = Some(Value::Object(params));
        }

        outcome
    }

    /// Apply the server's reply to a subscribe request
    pub fn process_subscribe_reply(&mut self, reply: &Value) -> SubscribeReplyOutcome {
        let mut outcome = SubscribeReplyOutcome::default();

        for channel in channels_in(reply.get("unauthorizedChannels")) {
            error!(channel = %channel, "Dropping unauthorized channel");
            self.channels.remove(&channel);
            outcome.rejected.push(channel);
        }

        for channel in channels_in(reply.get("subscribedChannels")) {
            let Some(list) = self.channels.get_mut(&channel) else {
                debug!(channel = %channel, "Confirmation for a channel no longer subscribed");
                continue;
            };
            for record in list.iter_mut().filter(|r| !r.ready) {
                record.ready = true;
                if let Some(handler) = &record.ready_handler {
                    outcome.ready.push(ReadyNotification {
                        channel: channel.clone(),
                        handler: handler.clone(),
                    });
                }
            }
            debug!(channel = %channel, "Subscribed to channel");
            outcome.confirmed.push(channel);
        }

        outcome
    }

    /// Remove individual subscribers.
    ///
    /// Returns `verto.unsubscribe` params for channels whose last subscriber
    /// went away.
    pub fn unsubscribe(&mut self, handles: &[SubscriptionHandle]) -> Option<Value> {
        let mut emptied: Vec<String> = Vec::new();

        for handle in handles {
            let Some(list) = self.channels.get_mut(&handle.channel) else {
                continue;
            };
            list.retain(|r| r.serial != handle.serial);
            if list.is_empty() {
                self.channels.remove(&handle.channel);
                if !emptied.contains(&handle.channel) {
                    emptied.push(handle.channel.clone());
                }
            }
        }

        self.unsubscribe_request(emptied)
    }

    /// Drop a channel with every subscriber on it
    pub fn unsubscribe_channel(&mut self, channel: &str) -> Option<Value> {
        match self.channels.remove(channel) {
            Some(_) => self.unsubscribe_request(vec![channel.to_string()]),
            None => None,
        }
    }

    /// Drop every channel
    pub fn unsubscribe_all(&mut self) -> Option<Value> {
        let mut channels: Vec<String> = self.channels.drain().map(|(k, _)| k).collect();
        channels.sort();
        self.unsubscribe_request(channels)
    }

    /// Forget everything without telling the server (transport is gone)
    pub fn purge(&mut self) {
        for channel in self.channels.keys() {
            debug!(channel = %channel, "Purging subscription");
        }
        self.channels.clear();
    }

    /// Deliveries for an event on `channel`.
    ///
    /// Matches the exact channel first, then its dot-separated root. Returns
    /// `None` when neither has subscribers. Subscribers that are not ready yet
    /// are skipped.
    pub fn deliveries(&self, channel: &str) -> Option<Vec<Delivery>> {
        let list = self.channels.get(channel).or_else(|| {
            let root = channel.split('.').next().unwrap_or(channel);
            self.channels.get(root)
        })?;

        let mut deliveries = Vec::with_capacity(list.len());
        for record in list {
            if !record.ready {
                warn!(channel = %channel, serial = record.serial, "Event for a subscriber that is not ready, ignored");
                continue;
            }
            deliveries.push(match &record.handler {
                Some(handler) => Delivery::Handler {
                    handler: handler.clone(),
                    user_data: record.user_data.clone(),
                },
                None => Delivery::Fallback {
                    user_data: record.user_data.clone(),
                },
            });
        }
        Some(deliveries)
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Whether the channel's first subscriber is ready
    pub fn is_ready(&self, channel: &str) -> bool {
        self.channels
            .get(channel)
            .and_then(|list| list.first())
            .map(|r| r.ready)
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(Vec::len).unwrap_or(0)
    }

    pub fn local_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|list| list.iter().filter(|r| r.local).count())
            .unwrap_or(0)
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.channels.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn unsubscribe_request(&self, channels: Vec<String>) -> Option<Value> {
        if channels.is_empty() {
            return None;
        }
        for channel in &channels {
            debug!(channel = %channel, "Sending unsubscribe");
        }
        Some(json!({ "eventChannel": channel_list(channels) }))
    }
}

/// One channel goes out bare, several as a list
fn channel_list(mut channels: Vec<String>) -> Value {
    if channels.len() == 1 {
        Value::String(channels.remove(0))
    } else {
        Value::Array(channels.into_iter().map(Value::String).collect())
    }
}

fn channels_in(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
