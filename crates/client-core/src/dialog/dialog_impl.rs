//! The per-call state machine
//!
//! A [`Dialog`] is network free. Every operation mutates the dialog and
//! returns the [`DialogAction`]s the owner must carry out (send a request,
//! drive the media engine, arm a timer, publish an event). Completions of
//! those actions come back in through `process_reply`, `on_offer_ready`,
//! `on_answer_ready`, `on_remote_sdp_applied` and `on_media_error`.
//!
//! Because all decisions, including the early-media/answer race, are taken
//! inside one `&mut self` call, the owner only has to serialize access to
//! the dialog (one lock) to make the latches race free.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::dialog_id::CallId;
use super::dialog_state::{CallDirection, CallState};
use super::params::DialogParams;
use crate::errors::{ClientError, ClientResult};
use crate::events::{CallStatusInfo, ClientEvent, EventPriority, IncomingCallInfo};
use crate::media::MediaError;
use crate::transport::{RpcError, VertoMethod};

/// Default hangup cause
pub const NORMAL_CLEARING: &str = "NORMAL_CLEARING";

/// Q.850 code of [`NORMAL_CLEARING`]
pub const NORMAL_CLEARING_CODE: u32 = 16;

/// Why a remote description is being applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpPurpose {
    /// Final answer to our offer
    Answer,
    /// Early media (`verto.media`) before the answer
    EarlyMedia,
}

/// Side effects requested by the state machine
#[derive(Debug, Clone)]
pub enum DialogAction {
    /// Issue an RPC; `params` already carries `dialogParams`
    SendRequest { method: VertoMethod, params: Value },
    /// Ask the media engine for a local offer
    CreateOffer,
    /// Ask the media engine to answer `remote_sdp`
    CreateAnswer { remote_sdp: String },
    /// Hand a remote answer or early-media description to the media engine
    ApplyRemoteSdp { sdp: String, purpose: SdpPurpose },
    StopMedia,
    /// Hang up if still `trying` once the trying timeout elapses
    ArmTryingTimer,
    /// Start ring indication and re-arm it while ringing
    StartRinging,
    StopRinging,
    UseVideo(bool),
    UseStereo(bool),
    Emit(ClientEvent),
    /// Drop the dialog from the session
    Remove,
}

/// Result of an explicit state change request
#[derive(Debug, Clone)]
pub struct Transition {
    /// Whether the requested transition was applied
    pub accepted: bool,
    pub actions: Vec<DialogAction>,
}

/// Options for answering an inbound call
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    pub use_video: bool,
    pub callee_id_name: Option<String>,
    pub callee_id_number: Option<String>,
}

/// One call's signaling state
#[derive(Debug, Clone)]
pub struct Dialog {
    id: CallId,
    direction: CallDirection,
    state: CallState,
    last_state: CallState,
    params: DialogParams,
    attach: bool,
    answered: bool,
    got_early: bool,
    got_answer: bool,
    cause: String,
    cause_code: u32,
    created_at: DateTime<Utc>,
}

impl Dialog {
    /// Create a dialog in state `new`.
    ///
    /// The call id comes from `params.call_id` when present, otherwise a fresh
    /// one is generated and written back into the parameters.
    pub fn new(direction: CallDirection, mut params: DialogParams) -> Self {
        let id = params
            .call_id
            .clone()
            .map(CallId::from)
            .unwrap_or_else(CallId::new);
        params.call_id = Some(id.to_string());

        match direction {
            CallDirection::Inbound => {
                params.remote_caller_id_name = Some(
                    params
                        .caller_id_name
                        .clone()
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| "Nobody".to_string()),
                );
                params.remote_caller_id_number = Some(
                    params
                        .caller_id_number
                        .clone()
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| "UNKNOWN".to_string()),
                );
            }
            CallDirection::Outbound => {
                params.remote_caller_id_name = Some("Outbound Call".to_string());
                params.remote_caller_id_number = params.destination_number.clone();
            }
        }

        Self {
            id,
            direction,
            state: CallState::New,
            last_state: CallState::New,
            attach: params.attach,
            params,
            answered: false,
            got_early: false,
            got_answer: false,
            cause: NORMAL_CLEARING.to_string(),
            cause_code: NORMAL_CLEARING_CODE,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn last_state(&self) -> CallState {
        self.last_state
    }

    pub fn params(&self) -> &DialogParams {
        &self.params
    }

    pub fn is_attach(&self) -> bool {
        self.attach
    }

    pub fn answered(&self) -> bool {
        self.answered
    }

    pub fn got_early(&self) -> bool {
        self.got_early
    }

    pub fn got_answer(&self) -> bool {
        self.got_answer
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }

    pub fn cause_code(&self) -> u32 {
        self.cause_code
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// "Name <number>" of the far end
    pub fn cid_string(&self) -> String {
        format!(
            "{} <{}>",
            self.params.remote_caller_id_name.as_deref().unwrap_or_default(),
            self.params.remote_caller_id_number.as_deref().unwrap_or_default()
        )
    }

    /// Request a transition to `to`.
    ///
    /// An illegal transition (including a self transition) is logged as a
    /// consistency violation and forces a hangup instead; `accepted` is then
    /// false and the actions carry the hangup.
    pub fn set_state(&mut self, to: CallState) -> Transition {
        let mut actions = Vec::new();
        let accepted = self.enter(to, &mut actions);
        Transition { accepted, actions }
    }

    /// Hang the call up, recording `cause`/`causeCode` from `params` if given
    pub fn hangup(&mut self, params: Option<&Value>) -> Vec<DialogAction> {
        let mut out = Vec::new();
        self.hangup_into(params, &mut out);
        out
    }

    /// Start an outbound call: the offer comes back via [`Dialog::on_offer_ready`]
    pub fn invite(&mut self) -> Vec<DialogAction> {
        if self.direction != CallDirection::Outbound || self.state != CallState::New {
            warn!(call_id = %self.id, state = %self.state, "Ignoring invite for a dialog already in progress");
            return Vec::new();
        }
        vec![DialogAction::CreateOffer]
    }

    /// Present a fresh inbound dialog: attaches answer at once, invites ring
    pub fn start_inbound(&mut self) -> Vec<DialogAction> {
        let mut out = Vec::new();

        if self.attach {
            self.enter(CallState::Recovering, &mut out);
            self.answer_into(None, &mut out);
            return out;
        }

        if self.enter(CallState::Ringing, &mut out) {
            out.push(DialogAction::Emit(ClientEvent::IncomingCall {
                info: IncomingCallInfo {
                    call_id: self.id.clone(),
                    caller_name: self.params.remote_caller_id_name.clone().unwrap_or_default(),
                    caller_number: self
                        .params
                        .remote_caller_id_number
                        .clone()
                        .unwrap_or_default(),
                    use_video: self.params.want_video || self.params.use_video,
                    use_stereo: self.params.use_stereo,
                    created_at: self.created_at,
                },
                priority: EventPriority::High,
            }));
        }
        out
    }

    /// Answer an inbound call. Only the first call has any effect.
    pub fn answer(&mut self, options: Option<AnswerOptions>) -> Vec<DialogAction> {
        let mut out = Vec::new();
        self.answer_into(options, &mut out);
        out
    }

    /// The media engine produced our offer
    pub fn on_offer_ready(&mut self, sdp: String) -> Vec<DialogAction> {
        let mut out = Vec::new();
        if self.enter(CallState::Requesting, &mut out) {
            out.push(self.request(VertoMethod::Invite, json!({ "sdp": sdp })));
        }
        out
    }

    /// The media engine produced our answer
    pub fn on_answer_ready(&mut self, sdp: String) -> Vec<DialogAction> {
        let mut out = Vec::new();
        if self.enter(CallState::Answering, &mut out) {
            let method = if self.attach {
                VertoMethod::Attach
            } else {
                VertoMethod::Answer
            };
            out.push(self.request(method, json!({ "sdp": sdp })));
        }
        out
    }

    /// The media engine accepted a remote description
    pub fn on_remote_sdp_applied(&mut self, purpose: SdpPurpose) -> Vec<DialogAction> {
        let mut out = Vec::new();
        match purpose {
            SdpPurpose::Answer => {
                if self.state < CallState::Active {
                    self.enter(CallState::Active, &mut out);
                }
            }
            SdpPurpose::EarlyMedia => {
                debug!(call_id = %self.id, "Establishing early media");
                if self.state < CallState::Early && !self.enter(CallState::Early, &mut out) {
                    return out;
                }
                if self.got_answer && self.state < CallState::Active {
                    debug!(call_id = %self.id, "Answer arrived during early media, answering channel");
                    self.enter(CallState::Active, &mut out);
                }
            }
        }
        out
    }

    /// Any media engine failure ends the call
    pub fn on_media_error(&mut self, err: &MediaError) -> Vec<DialogAction> {
        error!(call_id = %self.id, error = %err, "Media engine error");
        self.hangup(None)
    }

    /// The trying timer fired
    pub fn on_trying_timeout(&mut self) -> Vec<DialogAction> {
        let mut out = Vec::new();
        if self.state == CallState::Trying {
            warn!(call_id = %self.id, "No answer while trying, hanging up");
            self.enter(CallState::Hangup, &mut out);
        }
        out
    }

    /// The ring interval elapsed; keep ringing if nothing happened
    pub fn on_ring_timer(&self) -> Vec<DialogAction> {
        if self.state == CallState::Ringing {
            vec![DialogAction::StartRinging]
        } else {
            Vec::new()
        }
    }

    /// Reply (or failure) of a request this dialog sent
    pub fn process_reply(
        &mut self,
        method: &VertoMethod,
        result: &Result<Value, RpcError>,
    ) -> Vec<DialogAction> {
        let mut out = Vec::new();

        match method {
            VertoMethod::Invite => match result {
                Ok(_) => {
                    self.enter(CallState::Trying, &mut out);
                }
                Err(err) => {
                    warn!(call_id = %self.id, error = %err, "Invite rejected");
                    if self.state.can_transition(CallState::Destroy) {
                        self.enter(CallState::Destroy, &mut out);
                    } else {
                        self.hangup_into(None, &mut out);
                    }
                }
            },
            VertoMethod::Answer | VertoMethod::Attach => match result {
                Ok(_) => {
                    self.enter(CallState::Active, &mut out);
                }
                Err(err) => {
                    warn!(call_id = %self.id, method = %method, error = %err, "Answer rejected");
                    self.hangup_into(None, &mut out);
                }
            },
            VertoMethod::Bye => self.hangup_into(None, &mut out),
            VertoMethod::Modify => {
                let hold_state = match result {
                    Ok(value) => value.get("holdState"),
                    Err(err) => err.data.as_ref().and_then(|d| d.get("holdState")),
                };
                match hold_state.and_then(Value::as_str) {
                    Some("held") if self.state != CallState::Held => {
                        self.enter(CallState::Held, &mut out);
                    }
                    Some("active") if self.state != CallState::Active => {
                        self.enter(CallState::Active, &mut out);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        out
    }

    /// Inbound `verto.answer`
    pub fn handle_answer(&mut self, params: &Value) -> Vec<DialogAction> {
        let mut out = Vec::new();
        let answer_in_flight = self.got_answer;
        self.got_answer = true;

        if self.state >= CallState::Active {
            return out;
        }

        if self.state >= CallState::Early {
            self.enter(CallState::Active, &mut out);
        } else if self.got_early || answer_in_flight {
            debug!(call_id = %self.id, "Answer while media negotiation is in flight, delaying");
        } else {
            match params.get("sdp").and_then(Value::as_str) {
                Some(sdp) => {
                    debug!(call_id = %self.id, "Answering channel");
                    out.push(DialogAction::ApplyRemoteSdp {
                        sdp: sdp.to_string(),
                        purpose: SdpPurpose::Answer,
                    });
                }
                None => {
                    warn!(call_id = %self.id, "Answer without session description");
                    self.hangup_into(None, &mut out);
                }
            }
        }
        out
    }

    /// Inbound `verto.media` (early media)
    pub fn handle_media(&mut self, params: &Value) -> Vec<DialogAction> {
        let mut out = Vec::new();

        if self.state >= CallState::Early {
            return out;
        }
        if self.got_early || self.got_answer {
            debug!(call_id = %self.id, "Media negotiation already in flight, ignoring early media");
            return out;
        }

        self.got_early = true;

        match params.get("sdp").and_then(Value::as_str) {
            Some(sdp) => out.push(DialogAction::ApplyRemoteSdp {
                sdp: sdp.to_string(),
                purpose: SdpPurpose::EarlyMedia,
            }),
            None => {
                warn!(call_id = %self.id, "Early media without session description");
                self.hangup_into(None, &mut out);
            }
        }
        out
    }

    /// Inbound `verto.display`
    pub fn handle_display(&mut self, params: &Value) -> Vec<DialogAction> {
        if let Some(name) = params.get("display_name").and_then(Value::as_str) {
            self.params.remote_caller_id_name = Some(name.to_string());
        }
        if let Some(number) = params.get("display_number").and_then(Value::as_str) {
            self.params.remote_caller_id_number = Some(number.to_string());
        }

        vec![DialogAction::Emit(ClientEvent::DisplayUpdated {
            call_id: self.id.clone(),
            name: self.params.remote_caller_id_name.clone().unwrap_or_default(),
            number: self.params.remote_caller_id_number.clone().unwrap_or_default(),
        })]
    }

    /// Inbound call-scoped `verto.info`
    pub fn handle_info(&self, params: &Value) -> Vec<DialogAction> {
        vec![DialogAction::Emit(ClientEvent::CallInfo {
            call_id: self.id.clone(),
            message: params.get("msg").cloned().unwrap_or(Value::Null),
        })]
    }

    /// Channel event addressed to this call
    pub fn handle_private_event(&self, params: &Value) -> Vec<DialogAction> {
        vec![DialogAction::Emit(ClientEvent::CallPrivateEvent {
            call_id: self.id.clone(),
            params: params.clone(),
        })]
    }

    pub fn dtmf(&self, digits: &str) -> Vec<DialogAction> {
        if digits.is_empty() {
            return Vec::new();
        }
        vec![self.request(VertoMethod::Info, json!({ "dtmf": digits }))]
    }

    pub fn transfer(&self, destination: &str, params: Option<Value>) -> Vec<DialogAction> {
        if destination.is_empty() {
            return Vec::new();
        }
        vec![self.modify("transfer", Some(destination), params)]
    }

    pub fn hold(&self, params: Option<Value>) -> Vec<DialogAction> {
        vec![self.modify("hold", None, params)]
    }

    pub fn unhold(&self, params: Option<Value>) -> Vec<DialogAction> {
        vec![self.modify("unhold", None, params)]
    }

    pub fn toggle_hold(&self, params: Option<Value>) -> Vec<DialogAction> {
        vec![self.modify("toggleHold", None, params)]
    }

    /// In-call chat message; `to` and `body` are required, `from` is the login
    pub fn message(&self, msg: Map<String, Value>) -> ClientResult<Vec<DialogAction>> {
        let msg = build_chat_message(msg, self.params.login.as_deref())?;
        Ok(vec![self.request(VertoMethod::Info, json!({ "msg": msg }))])
    }

    pub fn use_video(&mut self, enabled: bool) -> Vec<DialogAction> {
        self.params.use_video = enabled;
        vec![DialogAction::UseVideo(enabled)]
    }

    pub fn use_stereo(&mut self, enabled: bool) -> Vec<DialogAction> {
        self.params.use_stereo = enabled;
        vec![DialogAction::UseStereo(enabled)]
    }

    fn answer_into(&mut self, options: Option<AnswerOptions>, out: &mut Vec<DialogAction>) {
        if self.answered {
            debug!(call_id = %self.id, "Call already answered");
            return;
        }

        if let Some(options) = options {
            if options.use_video {
                out.extend(self.use_video(true));
            }
            self.params.callee_id_name = options.callee_id_name;
            self.params.callee_id_number = options.callee_id_number;
        }

        self.answered = true;

        match self.params.sdp.clone() {
            Some(remote_sdp) => out.push(DialogAction::CreateAnswer { remote_sdp }),
            None => {
                warn!(call_id = %self.id, "Cannot answer without a remote offer");
                self.hangup_into(None, out);
            }
        }
    }

    fn hangup_into(&mut self, params: Option<&Value>, out: &mut Vec<DialogAction>) {
        if let Some(params) = params {
            if let Some(code) = params
                .get("causeCode")
                .and_then(Value::as_u64)
                .and_then(|code| u32::try_from(code).ok())
            {
                self.cause_code = code;
            }
            if let Some(cause) = params.get("cause").and_then(Value::as_str) {
                self.cause = cause.to_string();
            }
        }

        if self.state > CallState::New && self.state < CallState::Hangup {
            self.enter(CallState::Hangup, out);
        } else if self.state < CallState::Destroy {
            self.enter(CallState::Destroy, out);
        }
    }

    fn enter(&mut self, to: CallState, out: &mut Vec<DialogAction>) -> bool {
        if self.state == to || !self.state.can_transition(to) {
            error!(
                call_id = %self.id,
                from = %self.state,
                to = %to,
                "Invalid state change, forcing hangup"
            );
            self.hangup_into(None, out);
            return false;
        }

        if self.state == CallState::Ringing {
            out.push(DialogAction::StopRinging);
        }

        info!(call_id = %self.id, from = %self.state, to = %to, "Dialog state change");

        self.last_state = self.state;
        self.state = to;

        out.push(DialogAction::Emit(ClientEvent::CallStateChanged {
            info: CallStatusInfo {
                call_id: self.id.clone(),
                direction: self.direction,
                new_state: to,
                previous_state: self.last_state,
                cause: self.cause.clone(),
                cause_code: self.cause_code,
                timestamp: Utc::now(),
            },
            priority: if to >= CallState::Hangup {
                EventPriority::High
            } else {
                EventPriority::Normal
            },
        }));

        match to {
            CallState::Trying => out.push(DialogAction::ArmTryingTimer),
            CallState::Ringing => out.push(DialogAction::StartRinging),
            CallState::Purge => {
                self.enter(CallState::Destroy, out);
            }
            CallState::Hangup => {
                if self.last_state > CallState::Requesting && self.last_state < CallState::Hangup {
                    out.push(self.request(VertoMethod::Bye, json!({})));
                }
                self.enter(CallState::Destroy, out);
            }
            CallState::Destroy => {
                out.push(DialogAction::Remove);
                out.push(DialogAction::StopMedia);
            }
            _ => {}
        }

        true
    }

    fn modify(&self, action: &str, destination: Option<&str>, params: Option<Value>) -> DialogAction {
        let mut body = Map::new();
        body.insert("action".to_string(), json!(action));
        if let Some(destination) = destination {
            body.insert("destination".to_string(), json!(destination));
        }
        if let Some(params) = params {
            body.insert("params".to_string(), params);
        }
        self.request(VertoMethod::Modify, Value::Object(body))
    }

    fn request(&self, method: VertoMethod, mut body: Value) -> DialogAction {
        if let Value::Object(map) = &mut body {
            map.insert(
                "dialogParams".to_string(),
                self.params.to_wire(method.carries_sdp()),
            );
        }
        DialogAction::SendRequest {
            method,
            params: body,
        }
    }
}

/// Validate a chat message and stamp its sender
pub(crate) fn build_chat_message(
    mut msg: Map<String, Value>,
    from: Option<&str>,
) -> ClientResult<Map<String, Value>> {
    let present = |v: Option<&Value>| match v {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };

    let mut missing = Vec::new();
    if !present(msg.get("to")) {
        missing.push("to");
    }
    if !present(msg.get("body")) {
        missing.push("body");
    }
    if !missing.is_empty() {
        return Err(ClientError::InvalidMessage(format!(
            "missing {}",
            missing.join(" and ")
        )));
    }

    if let Some(from) = from {
        msg.insert("from".to_string(), json!(from));
    }
    Ok(msg)
}
