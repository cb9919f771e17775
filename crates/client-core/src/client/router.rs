//! Inbound message routing
//!
//! Call-scoped notifications (those carrying a `callID`) go to the matching
//! dialog, or create one for an unmatched `verto.invite` / `verto.attach`.
//! Everything else is session scoped: `verto.event` is dispatched to channel
//! subscribers and `verto.info` surfaces as a session message.

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::{CallEntry, VertoClient};
use crate::dialog::{CallDirection, CallId, Dialog, DialogAction, DialogParams};
use crate::errors::ClientError;
use crate::events::ClientEvent;
use crate::media::{sdp_has_stereo, sdp_has_video};
use crate::subscription::Delivery;
use crate::transport::{InboundMessage, VertoMethod};

impl VertoClient {
    /// Handle one server-initiated notification.
    ///
    /// Returns the acknowledgement (`{"method": ...}`) the transport should
    /// reply with for call-scoped messages, `None` otherwise.
    pub fn handle_message(&self, message: InboundMessage) -> Option<Value> {
        if message.method.is_empty() {
            error!(params = %message.params, "Inbound message without method ignored");
            return None;
        }

        let method = message.verto_method();

        match message.call_id() {
            Some(call_id) => {
                let call_id = CallId::from(call_id);
                self.route_call_message(&call_id, &method, &message.params);
                Some(json!({ "method": message.method }))
            }
            None => {
                self.route_session_message(&method, &message.params);
                None
            }
        }
    }

    fn route_call_message(&self, call_id: &CallId, method: &VertoMethod, params: &Value) {
        let exists = self.state().lock().dialogs.contains_key(call_id);
        if !exists {
            match method {
                VertoMethod::Invite | VertoMethod::Attach => self.create_inbound(method, params),
                _ => debug!(call_id = %call_id, method = %method, "Message for unknown call ignored"),
            }
            return;
        }

        let result = match method {
            VertoMethod::Bye => self.drive(call_id, |dialog| dialog.hangup(Some(params))),
            VertoMethod::Answer => self.drive(call_id, |dialog| dialog.handle_answer(params)),
            VertoMethod::Media => self.drive(call_id, |dialog| dialog.handle_media(params)),
            VertoMethod::Display => self.drive(call_id, |dialog| dialog.handle_display(params)),
            VertoMethod::Info => self.drive(call_id, |dialog| dialog.handle_info(params)),
            _ => {
                debug!(call_id = %call_id, method = %method, "Unhandled method for existing call ignored");
                Ok(())
            }
        };

        if let Err(err) = result {
            debug!(call_id = %call_id, method = %method, error = %err, "Call went away while routing");
        }
    }

    fn create_inbound(&self, method: &VertoMethod, raw: &Value) {
        let mut params = match DialogParams::from_value(raw) {
            Ok(params) => params,
            Err(err) => {
                warn!(method = %method, error = %err, "Malformed inbound call parameters");
                return;
            }
        };

        let sdp = params.sdp.clone().unwrap_or_default();
        match method {
            VertoMethod::Attach => {
                params.attach = true;
                if sdp_has_video(&sdp) {
                    params.use_video = true;
                }
            }
            _ => {
                if sdp_has_video(&sdp) {
                    params.want_video = true;
                }
            }
        }
        if sdp_has_stereo(&sdp) {
            params.use_stereo = true;
        }

        let mut dialog = Dialog::new(CallDirection::Inbound, params);
        let call_id = dialog.id().clone();
        let media = self.create_media(&dialog);

        let actions = {
            let mut state = self.state().lock();
            if state.dialogs.contains_key(&call_id) {
                debug!(call_id = %call_id, "Duplicate inbound call ignored");
                return;
            }
            let actions = dialog.start_inbound();
            if !actions.iter().any(|a| matches!(a, DialogAction::Remove)) {
                state.dialogs.insert(
                    call_id.clone(),
                    CallEntry {
                        dialog,
                        media: media.clone(),
                    },
                );
            }
            actions
        };

        info!(call_id = %call_id, method = %method, "Inbound call");
        self.execute(&call_id, &media, actions);
    }

    fn route_session_message(&self, method: &VertoMethod, params: &Value) {
        match method {
            VertoMethod::Event => self.dispatch_event(params),
            VertoMethod::Info => self.emit(ClientEvent::SessionMessage {
                message: params.get("msg").cloned().unwrap_or(Value::Null),
            }),
            other => error!(method = %other, "Unsupported session message ignored"),
        }
    }

    fn dispatch_event(&self, params: &Value) {
        let Some(channel) = params.get("eventChannel").and_then(Value::as_str) else {
            error!("Event without channel ignored");
            return;
        };

        let deliveries = self.state().lock().subscriptions.deliveries(channel);

        let Some(deliveries) = deliveries else {
            if channel == self.session_id() {
                self.emit(ClientEvent::SessionPrivateEvent {
                    params: params.clone(),
                });
                return;
            }

            match self.drive(&CallId::from(channel), |dialog| {
                dialog.handle_private_event(params)
            }) {
                Ok(()) => {}
                Err(ClientError::CallNotFound { .. }) => {
                    error!(channel = %channel, "Event for unsubscribed channel ignored");
                }
                Err(err) => error!(channel = %channel, error = %err, "Private event failed"),
            }
            return;
        };

        debug!(channel = %channel, subscribers = deliveries.len(), "Dispatching event");
        for delivery in deliveries {
            match delivery {
                Delivery::Handler { handler, user_data } => handler(params, user_data.as_ref()),
                Delivery::Fallback { user_data } => self.emit(ClientEvent::ChannelEvent {
                    channel: channel.to_string(),
                    params: params.clone(),
                    user_data,
                }),
            }
        }
    }
}
