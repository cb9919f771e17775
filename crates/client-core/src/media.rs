//! Media negotiation seam
//!
//! SDP generation, ICE and the media path itself are out of scope for this
//! crate. Each dialog owns one [`MediaEngine`] created by the application's
//! [`MediaEngineFactory`]; the dialog state machine asks it for offers and
//! answers and feeds it remote descriptions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::IceServers;
use crate::dialog::{CallDirection, CallId};

/// Errors reported by a media engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MediaError {
    /// Offer or answer generation failed
    #[error("media negotiation failed: {0}")]
    Negotiation(String),

    /// A remote session description was rejected
    #[error("remote description rejected: {0}")]
    RemoteDescription(String),

    /// No usable capture device or peer connection
    #[error("media unavailable: {0}")]
    Unavailable(String),
}

/// Parameters handed to the factory when a dialog is created
#[derive(Debug, Clone)]
pub struct MediaOptions {
    pub call_id: CallId,
    pub direction: CallDirection,
    pub use_video: bool,
    pub use_stereo: bool,
    pub ice_servers: IceServers,
    pub video_params: Value,
}

/// Per-call media negotiation engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Produce a local offer once candidates are gathered
    async fn create_offer(&self) -> Result<String, MediaError>;

    /// Apply a remote answer (or early media description) to a local offer
    async fn answer(&self, sdp: &str) -> Result<(), MediaError>;

    /// Apply a remote offer and produce the local answer
    async fn create_answer(&self, remote_sdp: &str) -> Result<String, MediaError>;

    /// Release every media resource held for the call
    async fn stop(&self);

    fn use_video(&self, enabled: bool);

    fn use_stereo(&self, enabled: bool);
}

/// Creates one [`MediaEngine`] per dialog
pub trait MediaEngineFactory: Send + Sync {
    fn create(&self, options: &MediaOptions) -> Arc<dyn MediaEngine>;
}

impl<F> MediaEngineFactory for F
where
    F: Fn(&MediaOptions) -> Arc<dyn MediaEngine> + Send + Sync,
{
    fn create(&self, options: &MediaOptions) -> Arc<dyn MediaEngine> {
        self(options)
    }
}

/// Whether an SDP body offers a video stream
pub fn sdp_has_video(sdp: &str) -> bool {
    sdp.contains("m=video")
}

/// Whether an SDP body requests stereo audio
pub fn sdp_has_stereo(sdp: &str) -> bool {
    sdp.contains("stereo=1")
}
