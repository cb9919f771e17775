//! # Verto Client Core
//!
//! Signaling client for the Verto protocol (JSON-RPC over websocket) used by
//! FreeSWITCH. This crate coordinates:
//!
//! - **dialogs**: one state machine per call, including the early media and
//!   answer race
//! - **subscriptions**: per-channel subscriber lists with batched server
//!   requests and readiness tracking
//! - **routing**: inbound notifications to dialogs, channel subscribers and
//!   session-level events
//! - **live arrays**: server-replicated collections bound to a channel (see
//!   the `verto-live-array` crate for the engine itself)
//!
//! The socket and the media path are supplied by the application through the
//! [`Transport`] and [`MediaEngine`] traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use verto_client_core::{
//!     ClientEvent, DialogParams, InboundMessage, MediaEngineFactory, Transport, VertoClient,
//!     VertoConfig,
//! };
//!
//! # async fn run(
//! #     transport: Arc<dyn Transport>,
//! #     media: Arc<dyn MediaEngineFactory>,
//! #     inbound: Vec<InboundMessage>,
//! # ) -> verto_client_core::ClientResult<()> {
//! let client = VertoClient::builder()
//!     .config(VertoConfig::new().with_login("1008@example.com", "1234"))
//!     .transport(transport)
//!     .media_factory(media)
//!     .build()?;
//!
//! let mut events = client.subscribe_events();
//! client.login().await?;
//! client.new_call(DialogParams::outbound("3000").with_caller_id("Alice", "1008"))?;
//!
//! // Feed every server notification to the client
//! for message in inbound {
//!     client.handle_message(message);
//! }
//!
//! while let Ok(event) = events.recv().await {
//!     if let ClientEvent::CallStateChanged { info, .. } = event {
//!         println!("{} → {}", info.call_id, info.new_state);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`config`] | [`VertoConfig`], TOML loading and validation |
//! | [`dialog`] | Call ids, states and the [`Dialog`] state machine |
//! | [`subscription`] | The channel registry behind [`VertoClient::subscribe`] |
//! | [`events`] | [`ClientEvent`]s published on a broadcast channel |
//! | [`transport`] / [`media`] | Application supplied seams |
//! | [`logging`] | Optional `tracing-subscriber` setup |

pub mod client;
pub mod config;
pub mod dialog;
pub mod errors;
pub mod events;
pub mod logging;
pub mod media;
pub mod subscription;
pub mod transport;

pub use client::{
    ConferenceModerator, LiveArrayBinding, LiveArrayOptions, VertoClient, VertoClientBuilder,
    WeakVertoClient,
};
pub use config::{IceServer, IceServers, VertoConfig};
pub use dialog::{
    AnswerOptions, CallDirection, CallId, CallState, Dialog, DialogAction, DialogParams,
};
pub use errors::{ClientError, ClientResult};
pub use events::{CallStatusInfo, ClientEvent, EventPriority, IncomingCallInfo};
pub use logging::{setup_logging, LoggingConfig};
pub use media::{MediaEngine, MediaEngineFactory, MediaError, MediaOptions};
pub use subscription::{SubscribeOptions, SubscriptionHandle};
pub use transport::{InboundMessage, RpcError, Transport, VertoMethod};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
