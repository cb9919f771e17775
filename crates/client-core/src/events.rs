//! Client events
//!
//! Everything the client wants to tell the application (call state changes,
//! incoming calls, ring indication, display updates, channel events without
//! a dedicated handler, subscription diagnostics) is published as a
//! [`ClientEvent`] on a `tokio::sync::broadcast` channel. Subscribe with
//! [`VertoClient::subscribe_events`](crate::VertoClient::subscribe_events).
//!
//! ```rust,no_run
//! # async fn run(client: verto_client_core::VertoClient) {
//! use verto_client_core::events::ClientEvent;
//!
//! let mut events = client.subscribe_events();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         ClientEvent::IncomingCall { info, .. } => {
//!             println!("call from {} <{}>", info.caller_name, info.caller_number);
//!         }
//!         ClientEvent::CallStateChanged { info, .. } => {
//!             println!("{} is now {}", info.call_id, info.new_state);
//!         }
//!         _ => {}
//!     }
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::dialog::{CallDirection, CallId, CallState};

/// Relative importance of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    Low,
    Normal,
    High,
}

/// An inbound call waiting to be answered
#[derive(Debug, Clone)]
pub struct IncomingCallInfo {
    pub call_id: CallId,
    pub caller_name: String,
    pub caller_number: String,
    pub use_video: bool,
    pub use_stereo: bool,
    pub created_at: DateTime<Utc>,
}

/// A call state transition
#[derive(Debug, Clone)]
pub struct CallStatusInfo {
    pub call_id: CallId,
    pub direction: CallDirection,
    pub new_state: CallState,
    pub previous_state: CallState,
    /// Hangup cause text (`NORMAL_CLEARING` unless the far end said otherwise)
    pub cause: String,
    pub cause_code: u32,
    pub timestamp: DateTime<Utc>,
}

/// Events published by the client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A dialog changed state
    CallStateChanged {
        info: CallStatusInfo,
        priority: EventPriority,
    },
    /// An unmatched `verto.invite` created a ringing inbound dialog
    IncomingCall {
        info: IncomingCallInfo,
        priority: EventPriority,
    },
    /// Play the ring tone (re-emitted every ring interval while ringing)
    RingingStarted { call_id: CallId, ring_file: String },
    /// Stop the ring tone
    RingingStopped { call_id: CallId },
    /// The far end updated its display identity
    DisplayUpdated {
        call_id: CallId,
        name: String,
        number: String,
    },
    /// Call-scoped `verto.info` message
    CallInfo { call_id: CallId, message: Value },
    /// Channel event addressed to a call's id
    CallPrivateEvent { call_id: CallId, params: Value },
    /// Channel event addressed to the session id
    SessionPrivateEvent { params: Value },
    /// Session-scoped `verto.info` message
    SessionMessage { message: Value },
    /// Channel event for a subscriber without its own handler
    ChannelEvent {
        channel: String,
        params: Value,
        user_data: Option<Value>,
    },
    /// The server confirmed a subscription
    SubscriptionReady { channel: String },
    /// The server refused a subscription; the channel was dropped
    SubscriptionRejected { channel: String },
}

impl ClientEvent {
    pub fn priority(&self) -> EventPriority {
        match self {
            ClientEvent::CallStateChanged { priority, .. } => *priority,
            ClientEvent::IncomingCall { priority, .. } => *priority,
            ClientEvent::SubscriptionRejected { .. } => EventPriority::High,
            ClientEvent::RingingStarted { .. } | ClientEvent::RingingStopped { .. } => {
                EventPriority::Low
            }
            _ => EventPriority::Normal,
        }
    }

    /// The call this event concerns, if any
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            ClientEvent::CallStateChanged { info, .. } => Some(&info.call_id),
            ClientEvent::IncomingCall { info, .. } => Some(&info.call_id),
            ClientEvent::RingingStarted { call_id, .. }
            | ClientEvent::RingingStopped { call_id }
            | ClientEvent::DisplayUpdated { call_id, .. }
            | ClientEvent::CallInfo { call_id, .. }
            | ClientEvent::CallPrivateEvent { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_call_id_and_priority() {
        let call_id = CallId::new();
        let event = ClientEvent::RingingStopped {
            call_id: call_id.clone(),
        };
        assert_eq!(event.call_id(), Some(&call_id));
        assert_eq!(event.priority(), EventPriority::Low);

        let rejected = ClientEvent::SubscriptionRejected {
            channel: "conference-liveArray.3000".into(),
        };
        assert_eq!(rejected.call_id(), None);
        assert_eq!(rejected.priority(), EventPriority::High);
    }
}
