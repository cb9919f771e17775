//! Live arrays fed from channel events

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use verto_client_core::{LiveArrayOptions, VertoConfig};
use verto_live_array::{LiveArrayAction, LiveArrayChange, LiveArrayListener, SequenceGap};

use common::*;

const CHANNEL: &str = "conference-liveArray.3000@example.com";

#[derive(Default)]
struct Recorder {
    changes: Mutex<Vec<LiveArrayChange>>,
    gaps: Mutex<Vec<SequenceGap>>,
}

impl LiveArrayListener for Recorder {
    fn on_change(&self, change: &LiveArrayChange) {
        self.changes.lock().push(change.clone());
    }

    fn on_error(&self, gap: &SequenceGap) {
        self.gaps.lock().push(*gap);
    }
}

fn packet(data: Value) -> verto_client_core::InboundMessage {
    message("verto.event", json!({"eventChannel": CHANNEL, "data": data}))
}

fn commands(h: &Harness) -> Vec<String> {
    h.transport
        .calls_for("verto.broadcast")
        .iter()
        .filter(|p| p["eventChannel"] == CHANNEL)
        .filter_map(|p| p["data"]["liveArray"]["command"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_binding_bootstraps_and_applies_deltas() {
    let h = harness();
    let recorder = Arc::new(Recorder::default());

    let roster = h.client.live_array(
        CHANNEL,
        "3000",
        LiveArrayOptions::new(json!({"user": "1008"})),
        recorder.clone(),
    );
    assert!(eventually(|| h.client.is_subscription_ready(CHANNEL)).await);
    assert!(eventually(|| commands(&h) == vec!["bootstrap"]).await);

    let bootstrap = &h.transport.calls_for("verto.broadcast")[0];
    assert_eq!(
        bootstrap["data"],
        json!({"liveArray": {
            "command": "bootstrap",
            "context": CHANNEL,
            "name": "3000",
            "obj": {"user": "1008"},
        }})
    );

    h.client.handle_message(packet(json!({
        "action": "bootObj",
        "name": "3000",
        "wireSerno": -1,
        "data": [["m-1", ["m-1", "Alice"]], ["m-2", ["m-2", "Bob"]]],
    })));
    h.client.handle_message(packet(json!({
        "action": "add",
        "name": "3000",
        "wireSerno": 1,
        "hashKey": "m-3",
        "data": ["m-3", "Carol"],
    })));
    h.client.handle_message(packet(json!({
        "action": "del",
        "name": "3000",
        "wireSerno": 2,
        "hashKey": "m-1",
    })));
    // Another roster on the same channel
    h.client.handle_message(packet(json!({
        "action": "add",
        "name": "4000",
        "wireSerno": 3,
        "hashKey": "x",
        "data": [],
    })));

    let keys: Vec<String> = roster.snapshot().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["m-2", "m-3"]);
    assert_eq!(roster.last_serial(), 2);
    assert_eq!(recorder.changes.lock().len(), 3);
}

#[tokio::test]
async fn test_gap_triggers_single_bootstrap() {
    let h = harness();
    let recorder = Arc::new(Recorder::default());
    let roster = h.client.live_array(CHANNEL, "3000", LiveArrayOptions::default(), recorder.clone());
    assert!(eventually(|| h.client.is_subscription_ready(CHANNEL)).await);

    for serial in [1, 2, 4] {
        h.client.handle_message(packet(json!({
            "action": "add",
            "name": "3000",
            "wireSerno": serial,
            "hashKey": format!("k{}", serial),
            "data": serial,
        })));
    }

    assert_eq!(roster.len(), 2);
    assert_eq!(recorder.gaps.lock().len(), 1);
    assert!(eventually(|| commands(&h) == vec!["bootstrap", "bootstrap"]).await);
}

#[tokio::test]
async fn test_change_page_clears_and_requests() {
    let h = harness();
    let recorder = Arc::new(Recorder::default());
    let roster = h.client.live_array(CHANNEL, "3000", LiveArrayOptions::default(), recorder.clone());
    assert!(eventually(|| h.client.is_subscription_ready(CHANNEL)).await);

    h.client.handle_message(packet(json!({
        "action": "add", "name": "3000", "wireSerno": 1, "hashKey": "a", "data": 1,
    })));
    assert_eq!(roster.len(), 1);
    assert_eq!(recorder.changes.lock().len(), 1);

    roster.change_page(json!({"page": 2}));
    assert!(roster.is_empty());

    // The listener is told to drop the old page
    let changes = recorder.changes.lock();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1].action, LiveArrayAction::Clear);
    assert!(changes[1].key.is_none());
    drop(changes);
    assert!(eventually(|| commands(&h) == vec!["bootstrap", "changepage"]).await);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_repeats_until_destroyed() {
    let h = harness_with(
        VertoConfig::new().with_heartbeat_interval(Duration::from_secs(30)),
        MockMediaFactory::default(),
    );
    let roster = h.client.live_array(
        CHANNEL,
        "3000",
        LiveArrayOptions::default(),
        Arc::new(Recorder::default()),
    );
    assert!(eventually(|| h.client.is_subscription_ready(CHANNEL)).await);

    roster.heartbeat(json!({"alive": true}));
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(
        eventually(|| commands(&h) == vec!["bootstrap", "heartbeat", "heartbeat", "heartbeat"])
            .await
    );

    roster.destroy();
    assert!(roster.is_destroyed());
    assert!(!h.client.is_subscribed(CHANNEL));
    assert!(eventually(|| h.transport.count("verto.unsubscribe") == 1).await);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(commands(&h).len(), 4);

    // Packets after teardown are dropped
    h.client.handle_message(packet(json!({
        "action": "add", "name": "3000", "wireSerno": 1, "hashKey": "a", "data": 1,
    })));
    assert!(roster.is_empty());
}
