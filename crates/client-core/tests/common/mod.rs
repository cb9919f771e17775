//! Shared fixtures: a scripted transport and a counting media engine

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Notify};

use verto_client_core::{
    ClientEvent, InboundMessage, MediaEngine, MediaEngineFactory, MediaError, MediaOptions,
    RpcError, Transport, VertoClient, VertoConfig,
};

pub const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";
pub const REMOTE_SDP: &str = "v=0\r\no=FreeSWITCH 3 3 IN IP4 10.0.0.1\r\nm=audio 16384 RTP/SAVPF 111\r\na=fmtp:111 stereo=1\r\n";

/// Transport that records every call and answers from a script
#[derive(Default)]
pub struct MockTransport {
    not_ready: AtomicBool,
    calls: Mutex<Vec<(String, Value)>>,
    replies: Mutex<HashMap<String, Result<Value, RpcError>>>,
}

impl MockTransport {
    pub fn set_ready(&self, ready: bool) {
        self.not_ready.store(!ready, Ordering::SeqCst);
    }

    /// Reply to every future call of `method` with `reply`
    pub fn reply_with(&self, method: &str, reply: Result<Value, RpcError>) {
        self.replies.lock().insert(method.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Params of every call of `method`, in order
    pub fn calls_for(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls_for(method).len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls.lock().push((method.to_string(), params.clone()));

        if let Some(reply) = self.replies.lock().get(method) {
            return reply.clone();
        }

        match method {
            // Confirm whatever was asked for
            "verto.subscribe" => Ok(json!({ "subscribedChannels": params["eventChannel"] })),
            _ => Ok(json!({ "message": "OK" })),
        }
    }

    fn is_ready(&self) -> bool {
        !self.not_ready.load(Ordering::SeqCst)
    }
}

/// Media engine counting every negotiation step
#[derive(Default)]
pub struct MockMediaEngine {
    pub offers: AtomicUsize,
    pub remote_answers: AtomicUsize,
    pub created_answers: AtomicUsize,
    pub stops: AtomicUsize,
    pub video: AtomicBool,
    /// When set, `answer()` waits for a permit before completing
    pub answer_gate: Option<Arc<Notify>>,
    pub fail_answer: bool,
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn create_offer(&self) -> Result<String, MediaError> {
        self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(OFFER_SDP.to_string())
    }

    async fn answer(&self, _sdp: &str) -> Result<(), MediaError> {
        self.remote_answers.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.answer_gate {
            gate.notified().await;
        }
        if self.fail_answer {
            return Err(MediaError::RemoteDescription("rejected by test".into()));
        }
        Ok(())
    }

    async fn create_answer(&self, _remote_sdp: &str) -> Result<String, MediaError> {
        self.created_answers.fetch_add(1, Ordering::SeqCst);
        Ok(ANSWER_SDP.to_string())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn use_video(&self, enabled: bool) {
        self.video.store(enabled, Ordering::SeqCst);
    }

    fn use_stereo(&self, _enabled: bool) {}
}

/// Factory keeping every engine it created
#[derive(Default)]
pub struct MockMediaFactory {
    pub answer_gate: Option<Arc<Notify>>,
    pub fail_answer: bool,
    engines: Mutex<Vec<(MediaOptions, Arc<MockMediaEngine>)>>,
}

impl MockMediaFactory {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            answer_gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_answer: true,
            ..Default::default()
        }
    }

    pub fn last(&self) -> Arc<MockMediaEngine> {
        self.engines
            .lock()
            .last()
            .map(|(_, engine)| engine.clone())
            .expect("no media engine created")
    }

    pub fn last_options(&self) -> MediaOptions {
        self.engines
            .lock()
            .last()
            .map(|(options, _)| options.clone())
            .expect("no media engine created")
    }

    pub fn created(&self) -> usize {
        self.engines.lock().len()
    }
}

impl MediaEngineFactory for MockMediaFactory {
    fn create(&self, options: &MediaOptions) -> Arc<dyn MediaEngine> {
        let engine = Arc::new(MockMediaEngine {
            answer_gate: self.answer_gate.clone(),
            fail_answer: self.fail_answer,
            ..Default::default()
        });
        self.engines.lock().push((options.clone(), engine.clone()));
        engine
    }
}

pub struct Harness {
    pub client: VertoClient,
    pub transport: Arc<MockTransport>,
    pub media: Arc<MockMediaFactory>,
    pub events: broadcast::Receiver<ClientEvent>,
}

pub fn harness() -> Harness {
    harness_with(VertoConfig::new(), MockMediaFactory::default())
}

pub fn harness_with(config: VertoConfig, media: MockMediaFactory) -> Harness {
    let transport = Arc::new(MockTransport::default());
    let media = Arc::new(media);
    let client = VertoClient::builder()
        .config(config)
        .transport(transport.clone())
        .media_factory(media.clone())
        .build()
        .expect("client should build");
    let events = client.subscribe_events();

    Harness {
        client,
        transport,
        media,
        events,
    }
}

pub fn message(method: &str, params: Value) -> InboundMessage {
    InboundMessage::new(method, params)
}

/// Poll `check` until it holds, giving spawned tasks time to run
pub async fn eventually<F>(check: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Everything published so far
pub fn drain(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
