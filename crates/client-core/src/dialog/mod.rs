//! Call dialogs
//!
//! This module contains the per-call signaling state machine:
//!
//! - [`CallId`]: call identifiers (`callID` on the wire)
//! - [`CallState`] / [`CallDirection`]: lifecycle states and the transition table
//! - [`DialogParams`]: negotiation parameters echoed as `dialogParams`
//! - [`Dialog`]: the state machine itself, returning [`DialogAction`]s
//!
//! ## Dialog Lifecycle
//!
//! ```text
//! outbound:  new → requesting → trying → (early) → active → hangup → destroy
//!             offer ready   invite ok  verto.media  verto.answer   bye
//!
//! inbound:   new → ringing → answering → active → hangup → destroy
//!           verto.invite  answer()   answer ok    bye
//! ```
//!
//! Dialogs are owned by [`VertoClient`](crate::VertoClient), which executes
//! the returned actions against the transport and the media engine.

pub mod dialog_id;
pub mod dialog_impl;
pub mod dialog_state;
pub mod params;

pub use dialog_id::CallId;
pub(crate) use dialog_impl::build_chat_message;
pub use dialog_impl::{
    AnswerOptions, Dialog, DialogAction, SdpPurpose, Transition, NORMAL_CLEARING,
    NORMAL_CLEARING_CODE,
};
pub use dialog_state::{CallDirection, CallState};
pub use params::DialogParams;
