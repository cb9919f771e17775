//! The Verto session
//!
//! [`VertoClient`] owns every dialog and subscription of one signaling
//! session. It is a cheap, cloneable handle; clones share the same session.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  handle_message   ┌──────────────────────────────┐
//! │  Transport   │ ────────────────► │          VertoClient         │
//! │ (app owned)  │ ◄──────────────── │  ┌────────────────────────┐  │
//! └──────────────┘   call(method)    │  │ Mutex<SessionState>    │  │
//!                                    │  │  dialogs: callID→Dialog│  │
//! ┌──────────────┐  offer / answer   │  │  subscriptions         │  │
//! │ MediaEngine  │ ◄──────────────── │  └────────────────────────┘  │
//! │ (per dialog) │ ────────────────► │   actions run after unlock   │
//! └──────────────┘    completions    └──────────────┬───────────────┘
//!                                                   │ broadcast
//!                                                   ▼
//!                                              ClientEvent
//! ```
//!
//! All session state sits behind one lock. State machine calls run under it
//! and hand back actions; RPCs, media operations and timers are then spawned
//! on the Tokio runtime with the lock released, and their completions re-enter
//! the state machine. The client must therefore be used from within a Tokio
//! runtime.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use verto_client_core::{DialogParams, VertoClient, VertoConfig};
//! # use verto_client_core::{MediaEngineFactory, Transport};
//!
//! # async fn run(transport: Arc<dyn Transport>, media: Arc<dyn MediaEngineFactory>) -> verto_client_core::ClientResult<()> {
//! let client = VertoClient::builder()
//!     .config(VertoConfig::new().with_login("1008@example.com", "1234"))
//!     .transport(transport)
//!     .media_factory(media)
//!     .build()?;
//!
//! client.login().await?;
//! let call_id = client.new_call(DialogParams::outbound("3000"))?;
//! println!("calling, state {:?}", client.call_state(&call_id));
//! # Ok(())
//! # }
//! ```

mod calls;
mod conference;
mod live_array;
mod router;
mod subscriptions;

pub use conference::ConferenceModerator;
pub use live_array::{LiveArrayBinding, LiveArrayOptions};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::VertoConfig;
use crate::dialog::{CallId, CallState, Dialog};
use crate::errors::{ClientError, ClientResult};
use crate::events::ClientEvent;
use crate::media::{MediaEngine, MediaEngineFactory};
use crate::subscription::SubscriptionManager;
use crate::transport::{RpcError, Transport, VertoMethod};

/// A dialog together with its media engine
pub(crate) struct CallEntry {
    pub(crate) dialog: Dialog,
    pub(crate) media: Arc<dyn MediaEngine>,
}

/// Everything guarded by the session lock
#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) dialogs: HashMap<CallId, CallEntry>,
    pub(crate) subscriptions: SubscriptionManager,
}

pub(crate) struct ClientInner {
    session_id: String,
    config: VertoConfig,
    transport: Arc<dyn Transport>,
    media_factory: Arc<dyn MediaEngineFactory>,
    state: Mutex<SessionState>,
    event_tx: broadcast::Sender<ClientEvent>,
}

/// Handle to one Verto signaling session
#[derive(Clone)]
pub struct VertoClient {
    inner: Arc<ClientInner>,
}

/// Non-owning handle, used by timers and subscription handlers
#[derive(Clone)]
pub struct WeakVertoClient {
    inner: Weak<ClientInner>,
}

impl WeakVertoClient {
    pub fn upgrade(&self) -> Option<VertoClient> {
        self.inner.upgrade().map(|inner| VertoClient { inner })
    }
}

impl fmt::Debug for WeakVertoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakVertoClient")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Builder for [`VertoClient`]
#[derive(Default)]
pub struct VertoClientBuilder {
    config: VertoConfig,
    transport: Option<Arc<dyn Transport>>,
    media_factory: Option<Arc<dyn MediaEngineFactory>>,
}

impl VertoClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: VertoConfig) -> Self {
        self.config = config;
        self
    }

    /// The JSON-RPC channel to the server (required)
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Creates the per-dialog media engines (required)
    pub fn media_factory(mut self, factory: Arc<dyn MediaEngineFactory>) -> Self {
        self.media_factory = Some(factory);
        self
    }

    /// Validate the configuration and create the session
    pub fn build(self) -> ClientResult<VertoClient> {
        self.config.validate()?;

        let transport = self
            .transport
            .ok_or_else(|| ClientError::Configuration("a transport is required".to_string()))?;
        let media_factory = self.media_factory.ok_or_else(|| {
            ClientError::Configuration("a media engine factory is required".to_string())
        })?;

        let session_id = self
            .config
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let (event_tx, _) = broadcast::channel(self.config.event_channel_capacity);

        info!(session_id = %session_id, "Created Verto session");

        Ok(VertoClient {
            inner: Arc::new(ClientInner {
                session_id,
                config: self.config,
                transport,
                media_factory,
                state: Mutex::new(SessionState::default()),
                event_tx,
            }),
        })
    }
}

impl VertoClient {
    pub fn builder() -> VertoClientBuilder {
        VertoClientBuilder::new()
    }

    /// Session id sent as `sessid`
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn config(&self) -> &VertoConfig {
        &self.inner.config
    }

    /// Receive client events. Only events published after this call are seen.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn downgrade(&self) -> WeakVertoClient {
        WeakVertoClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Current state of a live call
    pub fn call_state(&self, call_id: &CallId) -> Option<CallState> {
        self.inner
            .state
            .lock()
            .dialogs
            .get(call_id)
            .map(|entry| entry.dialog.state())
    }

    /// Ids of every live call
    pub fn call_ids(&self) -> Vec<CallId> {
        self.inner.state.lock().dialogs.keys().cloned().collect()
    }

    /// Copy of a live call's dialog
    pub fn dialog(&self, call_id: &CallId) -> Option<Dialog> {
        self.inner
            .state
            .lock()
            .dialogs
            .get(call_id)
            .map(|entry| entry.dialog.clone())
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.inner.state.lock().subscriptions.is_subscribed(channel)
    }

    /// Whether the server confirmed `channel`
    pub fn is_subscription_ready(&self, channel: &str) -> bool {
        self.inner.state.lock().subscriptions.is_ready(channel)
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.inner.state.lock().subscriptions.channels()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub(crate) fn media_factory(&self) -> &Arc<dyn MediaEngineFactory> {
        &self.inner.media_factory
    }

    pub(crate) fn state(&self) -> &Mutex<SessionState> {
        &self.inner.state
    }

    /// Publish an event; having no receivers is fine
    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    /// Issue an RPC on a spawned task and hand the reply to `on_reply`
    pub(crate) fn spawn_call<F>(&self, method: VertoMethod, params: Value, on_reply: F)
    where
        F: FnOnce(&VertoClient, Result<Value, RpcError>) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            debug!(method = %method, "Sending request");
            let result = client.inner.transport.call(method.as_str(), params).await;
            if let Err(err) = &result {
                debug!(method = %method, error = %err, "Request failed");
            }
            on_reply(&client, result);
        });
    }
}

impl fmt::Debug for VertoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertoClient")
            .field("session_id", &self.inner.session_id)
            .finish()
    }
}
