//! Call operations
//!
//! Placing, answering and controlling calls, plus the executor that carries
//! out the [`DialogAction`]s returned by the dialog state machine.
//!
//! Every operation follows the same shape: take the session lock, run one
//! state machine call on the dialog, drop the dialog if it reached
//! `destroy`, release the lock, then execute the returned actions.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{CallEntry, VertoClient};
use crate::dialog::{
    build_chat_message, AnswerOptions, CallDirection, CallId, CallState, Dialog, DialogAction,
    DialogParams,
};
use crate::errors::{ClientError, ClientResult};
use crate::events::ClientEvent;
use crate::media::{MediaEngine, MediaOptions};
use crate::transport::VertoMethod;

impl VertoClient {
    /// Place an outbound call.
    ///
    /// Video, stereo, tag and login default from the configuration. The call
    /// moves to `requesting` once the media engine produced an offer, and to
    /// `trying` when the server accepts the invite.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] when the transport is not ready.
    pub fn new_call(&self, mut params: DialogParams) -> ClientResult<CallId> {
        if !self.transport().is_ready() {
            return Err(ClientError::NotConnected);
        }

        let config = self.config();
        params.use_video |= config.use_video;
        params.use_stereo |= config.use_stereo;
        if params.tag.is_none() {
            params.tag = config.tag.clone();
        }
        if params.login.is_none() {
            params.login = config.login.clone();
        }

        let mut dialog = Dialog::new(CallDirection::Outbound, params);
        let call_id = dialog.id().clone();
        let media = self.create_media(&dialog);
        let actions = dialog.invite();

        {
            let mut state = self.state().lock();
            if state.dialogs.contains_key(&call_id) {
                return Err(ClientError::InvalidMessage(format!(
                    "call id {} is already in use",
                    call_id
                )));
            }
            state.dialogs.insert(
                call_id.clone(),
                CallEntry {
                    dialog,
                    media: media.clone(),
                },
            );
        }

        info!(call_id = %call_id, "Created outgoing call");
        self.execute(&call_id, &media, actions);
        Ok(call_id)
    }

    /// Answer a ringing inbound call. Repeated answers are ignored.
    pub fn answer(&self, call_id: &CallId, options: Option<AnswerOptions>) -> ClientResult<()> {
        self.drive(call_id, |dialog| dialog.answer(options))
    }

    /// Hang up a call; `params` may carry `cause` / `causeCode`
    pub fn hangup(&self, call_id: &CallId, params: Option<Value>) -> ClientResult<()> {
        self.drive(call_id, |dialog| dialog.hangup(params.as_ref()))
    }

    /// Hang up every live call
    pub fn hangup_all(&self) {
        for call_id in self.call_ids() {
            if let Err(err) = self.hangup(&call_id, None) {
                debug!(call_id = %call_id, error = %err, "Call vanished before hangup");
            }
        }
    }

    pub fn dtmf(&self, call_id: &CallId, digits: &str) -> ClientResult<()> {
        self.drive(call_id, |dialog| dialog.dtmf(digits))
    }

    pub fn transfer(
        &self,
        call_id: &CallId,
        destination: &str,
        params: Option<Value>,
    ) -> ClientResult<()> {
        self.drive(call_id, |dialog| dialog.transfer(destination, params))
    }

    pub fn hold(&self, call_id: &CallId, params: Option<Value>) -> ClientResult<()> {
        self.drive(call_id, |dialog| dialog.hold(params))
    }

    pub fn unhold(&self, call_id: &CallId, params: Option<Value>) -> ClientResult<()> {
        self.drive(call_id, |dialog| dialog.unhold(params))
    }

    pub fn toggle_hold(&self, call_id: &CallId, params: Option<Value>) -> ClientResult<()> {
        self.drive(call_id, |dialog| dialog.toggle_hold(params))
    }

    /// In-call chat message; `to` and `body` are required
    pub fn call_message(&self, call_id: &CallId, msg: Map<String, Value>) -> ClientResult<()> {
        self.try_drive(call_id, |dialog| dialog.message(msg))
    }

    pub fn use_video(&self, call_id: &CallId, enabled: bool) -> ClientResult<()> {
        self.drive(call_id, |dialog| dialog.use_video(enabled))
    }

    pub fn use_stereo(&self, call_id: &CallId, enabled: bool) -> ClientResult<()> {
        self.drive(call_id, |dialog| dialog.use_stereo(enabled))
    }

    /// Session-level chat message sent as `verto.info`
    pub fn message(&self, msg: Map<String, Value>) -> ClientResult<()> {
        let msg = build_chat_message(msg, self.config().login.as_deref())?;
        self.spawn_call(VertoMethod::Info, json!({ "msg": msg }), |_, result| {
            if let Err(err) = result {
                warn!(error = %err, "Session message rejected");
            }
        });
        Ok(())
    }

    /// Authenticate with the configured credentials
    pub async fn login(&self) -> ClientResult<Value> {
        let config = self.config();
        let (Some(login), Some(passwd)) = (&config.login, &config.passwd) else {
            return Err(ClientError::Configuration(
                "login requires credentials".to_string(),
            ));
        };

        let params = json!({
            "login": login,
            "passwd": passwd,
            "sessid": self.session_id(),
        });

        let method = VertoMethod::Login;
        let result = self
            .transport()
            .call(method.as_str(), params)
            .await
            .map_err(|err| ClientError::rpc(method.as_str(), err))?;

        info!(login = %login, "Logged in");
        Ok(result)
    }

    /// Drop the session: every call is purged and every subscription
    /// forgotten. Closing the socket is left to the transport owner.
    pub fn logout(&self) {
        info!(session_id = %self.session_id(), "Logging out");
        self.purge();
    }

    /// The transport went away
    pub fn on_transport_closed(&self) {
        warn!(session_id = %self.session_id(), "Transport closed, purging session");
        self.purge();
    }

    /// Purge every dialog and subscription without telling the server
    pub fn purge(&self) {
        let work: Vec<(CallId, Arc<dyn MediaEngine>, Vec<DialogAction>)> = {
            let mut state = self.state().lock();
            let drained: Vec<(CallId, CallEntry)> = state.dialogs.drain().collect();
            state.subscriptions.purge();

            drained
                .into_iter()
                .map(|(call_id, mut entry)| {
                    let transition = entry.dialog.set_state(CallState::Purge);
                    (call_id, entry.media, transition.actions)
                })
                .collect()
        };

        for (call_id, media, actions) in work {
            self.execute(&call_id, &media, actions);
        }
    }

    pub(crate) fn drive<F>(&self, call_id: &CallId, f: F) -> ClientResult<()>
    where
        F: FnOnce(&mut Dialog) -> Vec<DialogAction>,
    {
        self.try_drive(call_id, |dialog| Ok(f(dialog)))
    }

    pub(crate) fn try_drive<F>(&self, call_id: &CallId, f: F) -> ClientResult<()>
    where
        F: FnOnce(&mut Dialog) -> ClientResult<Vec<DialogAction>>,
    {
        let (media, actions) = {
            let mut state = self.state().lock();
            let entry = state
                .dialogs
                .get_mut(call_id)
                .ok_or_else(|| ClientError::call_not_found(call_id))?;
            let actions = f(&mut entry.dialog)?;
            let media = entry.media.clone();
            if actions.iter().any(|a| matches!(a, DialogAction::Remove)) {
                state.dialogs.remove(call_id);
            }
            (media, actions)
        };

        self.execute(call_id, &media, actions);
        Ok(())
    }

    /// Feed an asynchronous completion back into a dialog that may be gone
    fn complete<F>(&self, call_id: &CallId, f: F)
    where
        F: FnOnce(&mut Dialog) -> Vec<DialogAction>,
    {
        if let Err(err) = self.drive(call_id, f) {
            debug!(call_id = %call_id, error = %err, "Completion for a finished call dropped");
        }
    }

    pub(crate) fn create_media(&self, dialog: &Dialog) -> Arc<dyn MediaEngine> {
        let config = self.config();
        self.media_factory().create(&MediaOptions {
            call_id: dialog.id().clone(),
            direction: dialog.direction(),
            use_video: dialog.params().use_video,
            use_stereo: dialog.params().use_stereo,
            ice_servers: config.ice_servers.clone(),
            video_params: config.video_params.clone(),
        })
    }

    pub(crate) fn execute(
        &self,
        call_id: &CallId,
        media: &Arc<dyn MediaEngine>,
        actions: Vec<DialogAction>,
    ) {
        for action in actions {
            match action {
                DialogAction::SendRequest { method, params } => {
                    let call_id = call_id.clone();
                    self.spawn_call(method.clone(), params, move |client, result| {
                        client.complete(&call_id, |dialog| dialog.process_reply(&method, &result));
                    });
                }
                DialogAction::CreateOffer => {
                    let client = self.clone();
                    let media = media.clone();
                    let call_id = call_id.clone();
                    tokio::spawn(async move {
                        let result = media.create_offer().await;
                        client.complete(&call_id, |dialog| match result {
                            Ok(sdp) => dialog.on_offer_ready(sdp),
                            Err(err) => dialog.on_media_error(&err),
                        });
                    });
                }
                DialogAction::CreateAnswer { remote_sdp } => {
                    let client = self.clone();
                    let media = media.clone();
                    let call_id = call_id.clone();
                    tokio::spawn(async move {
                        let result = media.create_answer(&remote_sdp).await;
                        client.complete(&call_id, |dialog| match result {
                            Ok(sdp) => dialog.on_answer_ready(sdp),
                            Err(err) => dialog.on_media_error(&err),
                        });
                    });
                }
                DialogAction::ApplyRemoteSdp { sdp, purpose } => {
                    let client = self.clone();
                    let media = media.clone();
                    let call_id = call_id.clone();
                    tokio::spawn(async move {
                        let result = media.answer(&sdp).await;
                        client.complete(&call_id, |dialog| match result {
                            Ok(()) => dialog.on_remote_sdp_applied(purpose),
                            Err(err) => dialog.on_media_error(&err),
                        });
                    });
                }
                DialogAction::StopMedia => {
                    let media = media.clone();
                    tokio::spawn(async move {
                        media.stop().await;
                    });
                }
                DialogAction::ArmTryingTimer => {
                    let weak = self.downgrade();
                    let call_id = call_id.clone();
                    let timeout = self.config().trying_timeout();
                    tokio::spawn(async move {
                        tokio::time::sleep(timeout).await;
                        if let Some(client) = weak.upgrade() {
                            client.complete(&call_id, |dialog| dialog.on_trying_timeout());
                        }
                    });
                }
                DialogAction::StartRinging => {
                    let Some(ring_file) = self.config().ring_file.clone() else {
                        continue;
                    };
                    self.emit(ClientEvent::RingingStarted {
                        call_id: call_id.clone(),
                        ring_file,
                    });

                    let weak = self.downgrade();
                    let call_id = call_id.clone();
                    let sleep = self.config().ring_sleep();
                    tokio::spawn(async move {
                        tokio::time::sleep(sleep).await;
                        if let Some(client) = weak.upgrade() {
                            client.complete(&call_id, |dialog| dialog.on_ring_timer());
                        }
                    });
                }
                DialogAction::StopRinging => {
                    if self.config().ring_file.is_some() {
                        self.emit(ClientEvent::RingingStopped {
                            call_id: call_id.clone(),
                        });
                    }
                }
                DialogAction::UseVideo(enabled) => media.use_video(enabled),
                DialogAction::UseStereo(enabled) => media.use_stereo(enabled),
                DialogAction::Emit(event) => self.emit(event),
                DialogAction::Remove => {
                    debug!(call_id = %call_id, "Dialog removed from session");
                }
            }
        }
    }
}
