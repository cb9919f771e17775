//! # Verto
//!
//! Client side of the Verto signaling protocol spoken by FreeSWITCH's
//! `mod_verto`: call dialogs negotiated over JSON-RPC, event channel
//! subscriptions, and server-synchronized live arrays for conference
//! rosters.
//!
//! This crate bundles the individual components:
//!
//! - [`client_core`]: the session, its dialogs and subscriptions
//! - [`live_array`]: the ordered map kept in sync from channel deltas
//!
//! The socket and the media engine are supplied by the application through
//! the [`Transport`] and [`MediaEngineFactory`] traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use verto::prelude::*;
//!
//! # async fn example(
//! #     transport: Arc<dyn Transport>,
//! #     media: Arc<dyn MediaEngineFactory>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let client = VertoClient::builder()
//!     .config(VertoConfig::new().with_login("1008@example.com", "secret"))
//!     .transport(transport)
//!     .media_factory(media)
//!     .build()?;
//!
//! client.login().await?;
//! let call_id = client.new_call(DialogParams::outbound("3000"))?;
//!
//! let mut events = client.subscribe_events();
//! while let Ok(event) = events.recv().await {
//!     if let ClientEvent::CallStateChanged { info, .. } = event {
//!         println!("{} -> {}", info.call_id, info.new_state);
//!     }
//! }
//! # let _ = call_id;
//! # Ok(())
//! # }
//! ```

pub use verto_client_core as client_core;
pub use verto_live_array as live_array;

pub use verto_client_core::{
    AnswerOptions, CallDirection, CallId, CallState, ClientError, ClientEvent, ClientResult,
    ConferenceModerator, DialogParams, InboundMessage, LiveArrayBinding, LiveArrayOptions,
    MediaEngine, MediaEngineFactory, MediaError, MediaOptions, RpcError, SubscribeOptions,
    SubscriptionHandle, Transport, VertoClient, VertoClientBuilder, VertoConfig, VertoMethod,
};
pub use verto_live_array::{LiveArrayChange, LiveArrayListener, SequenceGap};

/// Everything an application usually needs in one import
pub mod prelude {
    pub use verto_client_core::{
        AnswerOptions, CallId, CallState, CallStatusInfo, ClientError, ClientEvent, ClientResult,
        ConferenceModerator, DialogParams, IncomingCallInfo, InboundMessage, LiveArrayBinding,
        LiveArrayOptions, MediaEngine, MediaEngineFactory, MediaError, MediaOptions, RpcError,
        SubscribeOptions, Transport, VertoClient, VertoConfig,
    };
    pub use verto_live_array::{LiveArrayChange, LiveArrayListener, SequenceGap};
}

/// Version of the verto crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
