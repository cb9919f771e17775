//! Early media and answer arriving in either order
//!
//! Whatever the interleaving, the call must reach `active` exactly once and
//! the media engine must be handed the remote description exactly once.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Notify;
use verto_client_core::{CallId, CallState, ClientEvent, DialogParams, VertoConfig};

use common::*;

async fn trying_call(h: &Harness) -> CallId {
    let call_id = h.client.new_call(DialogParams::outbound("3000")).unwrap();
    assert!(eventually(|| h.client.call_state(&call_id) == Some(CallState::Trying)).await);
    call_id
}

fn times_entered(events: &[ClientEvent], state: CallState) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ClientEvent::CallStateChanged { info, .. } if info.new_state == state))
        .count()
}

#[tokio::test]
async fn test_early_media_then_answer() {
    let gate = Arc::new(Notify::new());
    let mut h = harness_with(VertoConfig::new(), MockMediaFactory::gated(gate.clone()));
    let call_id = trying_call(&h).await;
    let engine = h.media.last();

    h.client.handle_message(message(
        "verto.media",
        json!({"callID": call_id.as_str(), "sdp": REMOTE_SDP}),
    ));
    // Early negotiation is now parked in the media engine
    assert!(eventually(|| engine.remote_answers.load(Ordering::SeqCst) == 1).await);

    h.client.handle_message(message(
        "verto.answer",
        json!({"callID": call_id.as_str(), "sdp": REMOTE_SDP}),
    ));
    assert_eq!(h.client.call_state(&call_id), Some(CallState::Trying));

    gate.notify_one();

    assert!(eventually(|| h.client.call_state(&call_id) == Some(CallState::Active)).await);
    assert_eq!(engine.remote_answers.load(Ordering::SeqCst), 1);

    let events = drain(&mut h.events);
    assert_eq!(times_entered(&events, CallState::Early), 1);
    assert_eq!(times_entered(&events, CallState::Active), 1);
}

#[tokio::test]
async fn test_answer_then_early_media() {
    let gate = Arc::new(Notify::new());
    let mut h = harness_with(VertoConfig::new(), MockMediaFactory::gated(gate.clone()));
    let call_id = trying_call(&h).await;
    let engine = h.media.last();

    h.client.handle_message(message(
        "verto.answer",
        json!({"callID": call_id.as_str(), "sdp": REMOTE_SDP}),
    ));
    assert!(eventually(|| engine.remote_answers.load(Ordering::SeqCst) == 1).await);

    // Late early media must not start a second negotiation
    h.client.handle_message(message(
        "verto.media",
        json!({"callID": call_id.as_str(), "sdp": REMOTE_SDP}),
    ));

    gate.notify_one();

    assert!(eventually(|| h.client.call_state(&call_id) == Some(CallState::Active)).await);
    assert_eq!(engine.remote_answers.load(Ordering::SeqCst), 1);

    let events = drain(&mut h.events);
    assert_eq!(times_entered(&events, CallState::Early), 0);
    assert_eq!(times_entered(&events, CallState::Active), 1);
}

#[tokio::test]
async fn test_answer_while_early_media_is_up_skips_negotiation() {
    let mut h = harness();
    let call_id = trying_call(&h).await;
    let engine = h.media.last();

    h.client.handle_message(message(
        "verto.media",
        json!({"callID": call_id.as_str(), "sdp": REMOTE_SDP}),
    ));
    assert!(eventually(|| h.client.call_state(&call_id) == Some(CallState::Early)).await);

    h.client.handle_message(message("verto.answer", json!({"callID": call_id.as_str()})));

    // Transition is immediate: no media round trip
    assert_eq!(h.client.call_state(&call_id), Some(CallState::Active));
    assert_eq!(engine.remote_answers.load(Ordering::SeqCst), 1);

    let events = drain(&mut h.events);
    assert_eq!(times_entered(&events, CallState::Active), 1);
}

#[tokio::test]
async fn test_rejected_remote_answer_hangs_up() {
    let h = harness_with(VertoConfig::new(), MockMediaFactory::failing());
    let call_id = trying_call(&h).await;

    h.client.handle_message(message(
        "verto.answer",
        json!({"callID": call_id.as_str(), "sdp": REMOTE_SDP}),
    ));

    assert!(eventually(|| h.client.call_state(&call_id).is_none()).await);
    assert!(eventually(|| h.transport.count("verto.bye") == 1).await);
}
