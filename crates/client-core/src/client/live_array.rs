//! Live arrays bound to a session
//!
//! A [`LiveArrayBinding`] subscribes a [`LiveArray`] engine to its channel,
//! feeds it the `data` of every event on that channel and broadcasts the
//! commands it produces (bootstrap on creation and on gaps, change page,
//! heartbeat) back on the same channel.
//!
//! The subscription handler only holds a weak reference: dropping every
//! clone of the binding stops updates, [`LiveArrayBinding::destroy`] also
//! unsubscribes.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use verto_live_array::{LiveArray, LiveArrayCommand, LiveArrayListener, LiveArrayPacket};

use super::{VertoClient, WeakVertoClient};
use crate::errors::ClientResult;
use crate::subscription::{SubscribeOptions, SubscriptionHandle};

/// Options for [`VertoClient::live_array`]
#[derive(Debug, Clone, Default)]
pub struct LiveArrayOptions {
    /// Sent back to the server with every bootstrap
    pub user_obj: Value,
    /// Extra parameters for the channel subscription
    pub sub_params: Option<Value>,
}

impl LiveArrayOptions {
    pub fn new(user_obj: Value) -> Self {
        Self {
            user_obj,
            sub_params: None,
        }
    }

    pub fn with_sub_params(mut self, sub_params: Value) -> Self {
        self.sub_params = Some(sub_params);
        self
    }
}

struct BindingInner {
    client: WeakVertoClient,
    context: String,
    name: String,
    engine: Mutex<LiveArray>,
    listener: Arc<dyn LiveArrayListener>,
    handles: Mutex<Vec<SubscriptionHandle>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for BindingInner {
    fn drop(&mut self) {
        if let Some(task) = self.heartbeat.get_mut().take() {
            task.abort();
        }
    }
}

/// A live array replicated over a channel of a [`VertoClient`]
#[derive(Clone)]
pub struct LiveArrayBinding {
    inner: Arc<BindingInner>,
}

impl VertoClient {
    /// Bind a live array named `name` to channel `context`.
    ///
    /// Subscribes the channel and immediately asks the server for a
    /// bootstrap. Changes and sequence gaps are reported to `listener`.
    pub fn live_array(
        &self,
        context: impl Into<String>,
        name: impl Into<String>,
        options: LiveArrayOptions,
        listener: Arc<dyn LiveArrayListener>,
    ) -> LiveArrayBinding {
        let context = context.into();
        let name = name.into();

        let inner = Arc::new(BindingInner {
            client: self.downgrade(),
            context: context.clone(),
            name: name.clone(),
            engine: Mutex::new(LiveArray::new(context.clone(), name, options.user_obj)),
            listener,
            handles: Mutex::new(Vec::new()),
            heartbeat: Mutex::new(None),
        });

        let weak: Weak<BindingInner> = Arc::downgrade(&inner);
        let mut subscribe = SubscribeOptions::new().with_handler(move |params, _| {
            if let Some(inner) = weak.upgrade() {
                LiveArrayBinding { inner }.on_event(params);
            }
        });
        if let Some(sub_params) = options.sub_params {
            subscribe = subscribe.with_sub_params(sub_params);
        }

        let handles = self.subscribe([context], subscribe);
        *inner.handles.lock() = handles;

        let binding = LiveArrayBinding { inner };
        binding.bootstrap();
        binding
    }
}

impl LiveArrayBinding {
    pub fn context(&self) -> &str {
        &self.inner.context
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Request a full resync
    pub fn bootstrap(&self) {
        let command = self.inner.engine.lock().bootstrap();
        self.send(&command);
    }

    /// Clear local contents and ask the server for another page
    pub fn change_page(&self, obj: Value) {
        let outcome = self.inner.engine.lock().change_page(obj);
        outcome.deliver(self.inner.listener.as_ref());
        for command in &outcome.commands {
            self.send(command);
        }
    }

    /// Send a heartbeat now and then every heartbeat interval until the
    /// binding is destroyed. Replaces a running heartbeat.
    pub fn heartbeat(&self, obj: Value) {
        let Some(client) = self.inner.client.upgrade() else {
            return;
        };
        let command = LiveArrayCommand::Heartbeat(obj);
        self.send(&command);

        let interval = client.config().heartbeat_interval();
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let binding = LiveArrayBinding { inner };
                if binding.is_destroyed() || binding.inner.client.upgrade().is_none() {
                    break;
                }
                binding.send(&command);
            }
        });

        if let Some(previous) = self.inner.heartbeat.lock().replace(task) {
            previous.abort();
        }
    }

    /// Leave the degraded state and bootstrap again
    pub fn reset_errors(&self) {
        let command = self.inner.engine.lock().reset_errors();
        self.send(&command);
    }

    /// Clear the replica, stop the heartbeat and unsubscribe the channel
    pub fn destroy(&self) {
        self.inner.engine.lock().destroy();

        if let Some(task) = self.inner.heartbeat.lock().take() {
            task.abort();
        }

        let handles = std::mem::take(&mut *self.inner.handles.lock());
        if let Some(client) = self.inner.client.upgrade() {
            client.unsubscribe(&handles);
        }
        debug!(context = %self.inner.context, name = %self.inner.name, "Live array destroyed");
    }

    /// Current contents in order
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.inner
            .engine
            .lock()
            .items()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.engine.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.engine.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.engine.lock().is_empty()
    }

    pub fn last_serial(&self) -> i64 {
        self.inner.engine.lock().last_serial()
    }

    pub fn is_degraded(&self) -> bool {
        self.inner.engine.lock().is_degraded()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.engine.lock().is_destroyed()
    }

    /// Apply a raw packet, as received in an event's `data`
    pub fn apply(&self, data: Value) -> ClientResult<()> {
        let packet = LiveArrayPacket::from_value(data)?;
        let outcome = self.inner.engine.lock().apply_packet(packet)?;

        outcome.deliver(self.inner.listener.as_ref());
        for command in &outcome.commands {
            self.send(command);
        }
        Ok(())
    }

    fn on_event(&self, params: &Value) {
        let Some(data) = params.get("data") else {
            warn!(context = %self.inner.context, "Live array event without data");
            return;
        };
        if let Err(err) = self.apply(data.clone()) {
            warn!(context = %self.inner.context, name = %self.inner.name, error = %err, "Live array packet dropped");
        }
    }

    fn send(&self, command: &LiveArrayCommand) {
        let Some(client) = self.inner.client.upgrade() else {
            return;
        };
        debug!(context = %self.inner.context, command = command.name(), "Sending live array command");
        client.broadcast(
            &self.inner.context,
            command.to_broadcast(&self.inner.context, &self.inner.name),
        );
    }
}

impl fmt::Debug for LiveArrayBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveArrayBinding")
            .field("context", &self.inner.context)
            .field("name", &self.inner.name)
            .finish()
    }
}
