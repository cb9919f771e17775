//! Subscription lifecycle and event dispatch through the client

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use verto_client_core::{
    CallState, ClientEvent, ConferenceModerator, DialogParams, RpcError, SubscribeOptions,
};

use common::*;

fn counting_handler() -> (Arc<AtomicUsize>, SubscribeOptions) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let options = SubscribeOptions::new().with_handler(move |_, _| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    (count, options)
}

fn event(channel: &str) -> verto_client_core::InboundMessage {
    message("verto.event", json!({"eventChannel": channel, "data": {"x": 1}}))
}

#[tokio::test]
async fn test_two_subscribers_survive_partial_unsubscribe() {
    let h = harness();
    let (first_count, first) = counting_handler();
    let (second_count, second) = counting_handler();

    let first_handles = h.client.subscribe(["presence"], first);
    h.client.subscribe(["presence"], second);

    assert!(eventually(|| h.client.is_subscription_ready("presence")).await);
    // One server request for the channel, not one per subscriber
    assert_eq!(h.transport.count("verto.subscribe"), 1);

    h.client.handle_message(event("presence"));
    assert_eq!(first_count.load(Ordering::SeqCst), 1);
    assert_eq!(second_count.load(Ordering::SeqCst), 1);

    h.client.unsubscribe(&first_handles);
    h.client.handle_message(event("presence"));

    assert_eq!(first_count.load(Ordering::SeqCst), 1);
    assert_eq!(second_count.load(Ordering::SeqCst), 2);
    assert!(h.client.is_subscribed("presence"));
    assert_eq!(h.transport.count("verto.unsubscribe"), 0);
}

#[tokio::test]
async fn test_last_unsubscribe_tells_the_server() {
    let h = harness();
    let handles = h.client.subscribe(["presence", "chat"], SubscribeOptions::new());
    assert!(eventually(|| h.client.is_subscription_ready("chat")).await);

    assert_eq!(
        h.transport.calls_for("verto.subscribe"),
        vec![json!({"eventChannel": ["presence", "chat"]})]
    );

    h.client.unsubscribe(&handles);
    assert!(eventually(|| h.transport.count("verto.unsubscribe") == 1).await);
    assert_eq!(
        h.transport.calls_for("verto.unsubscribe"),
        vec![json!({"eventChannel": ["presence", "chat"]})]
    );
    assert!(h.client.subscribed_channels().is_empty());
}

#[tokio::test]
async fn test_unauthorized_channel_is_dropped() {
    let mut h = harness();
    h.transport.reply_with(
        "verto.subscribe",
        Err(RpcError::new(-32600, "Invalid Request")
            .with_data(json!({"unauthorizedChannels": ["secret"]}))),
    );

    h.client.subscribe(["secret"], SubscribeOptions::new());
    assert!(eventually(|| !h.client.is_subscribed("secret")).await);

    let events = drain(&mut h.events);
    assert!(events.iter().any(
        |e| matches!(e, ClientEvent::SubscriptionRejected { channel } if channel == "secret")
    ));
}

#[tokio::test]
async fn test_ready_callbacks_fire_once() {
    let h = harness();
    let ready = Arc::new(AtomicUsize::new(0));

    let r = ready.clone();
    h.client.subscribe(
        ["conference.3000"],
        SubscribeOptions::new().with_ready_handler(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert!(eventually(|| ready.load(Ordering::SeqCst) == 1).await);

    // Late joiner is ready at once, without another request
    let r = ready.clone();
    h.client.subscribe(
        ["conference.3000"],
        SubscribeOptions::new().with_ready_handler(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(ready.load(Ordering::SeqCst), 2);
    assert_eq!(h.transport.count("verto.subscribe"), 1);
}

#[tokio::test]
async fn test_events_before_confirmation_are_skipped() {
    let h = harness();
    let (count, options) = counting_handler();
    h.client.subscribe(["presence"], options);

    // The subscribe reply has not been processed yet
    h.client.handle_message(event("presence"));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    assert!(eventually(|| h.client.is_subscription_ready("presence")).await);
    h.client.handle_message(event("presence"));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dispatch_fallbacks() {
    let mut h = harness();

    // Root segment match, no handler: generic channel event with user data
    h.client.subscribe(
        ["conference"],
        SubscribeOptions::new().with_user_data(json!({"room": 3000})),
    );
    assert!(eventually(|| h.client.is_subscription_ready("conference")).await);
    drain(&mut h.events);

    h.client.handle_message(event("conference.3000"));
    let events = drain(&mut h.events);
    assert!(matches!(
        events.as_slice(),
        [ClientEvent::ChannelEvent { channel, user_data: Some(data), .. }]
            if channel == "conference.3000" && data["room"] == 3000
    ));

    // Session id: private session event
    let session_id = h.client.session_id().to_string();
    h.client.handle_message(event(&session_id));
    assert!(matches!(
        drain(&mut h.events).as_slice(),
        [ClientEvent::SessionPrivateEvent { .. }]
    ));

    // Call id: private call event
    let call_id = h.client.new_call(DialogParams::outbound("3000")).unwrap();
    assert!(eventually(|| h.client.call_state(&call_id) == Some(CallState::Trying)).await);
    drain(&mut h.events);
    h.client.handle_message(event(call_id.as_str()));
    assert!(matches!(
        drain(&mut h.events).as_slice(),
        [ClientEvent::CallPrivateEvent { call_id: target, .. }] if *target == call_id
    ));

    // Nobody: dropped
    h.client.handle_message(event("nowhere"));
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test]
async fn test_session_info_message() {
    let mut h = harness();
    let ack = h.client.handle_message(message(
        "verto.info",
        json!({"msg": {"from": "1009", "body": "hi"}}),
    ));
    assert_eq!(ack, None);

    assert!(matches!(
        drain(&mut h.events).as_slice(),
        [ClientEvent::SessionMessage { message }] if message["body"] == "hi"
    ));
}

#[tokio::test]
async fn test_conference_moderator_commands() {
    let h = harness();
    let received: Arc<Mutex<Vec<Value>>> = Arc::default();

    let sink = received.clone();
    let mut moderator = ConferenceModerator::new(&h.client, "conference-mod.3000", move |params| {
        sink.lock().push(params.clone());
    });
    assert!(eventually(|| h.client.is_subscription_ready("conference-mod.3000")).await);

    h.client.handle_message(message(
        "verto.event",
        json!({"eventChannel": "conference-mod.3000", "data": {"action": "conference-info"}}),
    ));
    assert_eq!(received.lock().len(), 1);

    moderator.mod_command("kick", Some(json!("17")), None);
    moderator.mod_command("volume_in", Some(json!("17")), Some(json!("up")));
    assert!(eventually(|| h.transport.count("verto.broadcast") == 2).await);

    let broadcasts = h.transport.calls_for("verto.broadcast");
    assert_eq!(
        broadcasts[0],
        json!({
            "eventChannel": "conference-mod.3000",
            "data": {"application": "conf-control", "command": "kick", "id": "17"},
        })
    );
    assert_eq!(broadcasts[1]["data"]["value"], "up");

    moderator.destroy();
    assert!(!h.client.is_subscribed("conference-mod.3000"));
    moderator.mod_command("kick", Some(json!("18")), None);
    assert!(eventually(|| h.transport.count("verto.unsubscribe") == 1).await);
    assert_eq!(h.transport.count("verto.broadcast"), 2);
}

#[tokio::test]
async fn test_local_subscriber_still_requests_channel() {
    let h = harness();
    h.client.subscribe(["room"], SubscribeOptions::new().local());
    assert!(h.client.is_subscription_ready("room"));

    let (count, options) = counting_handler();
    h.client.subscribe(["room"], options);

    assert!(eventually(|| h.transport.count("verto.subscribe") == 1).await);
    assert_eq!(
        h.transport.calls_for("verto.subscribe"),
        vec![json!({"eventChannel": "room"})]
    );

    h.client.handle_message(event("room"));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
