//! Unit tests for the notarization bridge
//!
//! Tests drive the bridge through an in-process page channel: agent replies are
//! dispatched as page events and posted messages are read from the outbox.

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{bridge_config, DUMMY_INTENT_HASH, PAGE_ORIGIN};

use escrow_client::bridge::{
    Discovery, NotarizationBridge, PageChannel, PageEvent, ProofCorrelation, ProofStatus,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn create_bridge() -> (NotarizationBridge, Arc<PageChannel>, UnboundedReceiver<Value>) {
    let (channel, outbox) = PageChannel::new(PAGE_ORIGIN);
    let channel = Arc::new(channel);
    let bridge = NotarizationBridge::new(channel.clone(), &bridge_config());
    (bridge, channel, outbox)
}

fn agent_event(data: Value) -> PageEvent {
    PageEvent {
        origin: PAGE_ORIGIN.to_string(),
        data,
    }
}

fn drain(outbox: &mut UnboundedReceiver<Value>) -> Vec<Value> {
    let mut messages = Vec::new();
    while let Ok(message) = outbox.try_recv() {
        messages.push(message);
    }
    messages
}

fn proof_response(id: &str, status: &str) -> Value {
    json!({
        "type": "FETCH_PROOF_BY_ID_RESPONSE",
        "requestHistory": {
            "notaryRequest": { "id": id, "status": status, "proof": { "claim": "ok" } }
        }
    })
}

// ============================================================================
// DISCOVERY TESTS
// ============================================================================

/// What is tested: init() probes immediately and keeps probing until a version arrives
/// Why: The agent may load after the page; discovery must not give up
#[tokio::test(start_paused = true)]
async fn test_probe_until_discovered() {
    let (bridge, channel, mut outbox) = create_bridge();
    bridge.init();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(drain(&mut outbox), vec![json!({ "type": "FETCH_EXTENSION_VERSION" })]);

    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(drain(&mut outbox).len(), 1);
    assert_eq!(bridge.discovery(), Discovery::Probing);

    channel.dispatch(agent_event(json!({ "type": "EXTENSION_VERSION_RESPONSE", "version": "0.3.1" })));
    assert!(bridge.is_sidebar_installed());
    assert_eq!(bridge.sidebar_version().as_deref(), Some("0.3.1"));

    tokio::time::sleep(Duration::from_millis(20_000)).await;
    assert!(drain(&mut outbox).is_empty());
}

/// What is tested: events from another origin are ignored
/// Why: Any frame can post messages to the page
#[tokio::test]
async fn test_foreign_origin_ignored() {
    let (bridge, channel, _outbox) = create_bridge();
    bridge.init();

    let handled = channel.dispatch(PageEvent {
        origin: "https://evil.example.com".to_string(),
        data: json!({ "type": "EXTENSION_VERSION_RESPONSE", "version": "6.6.6" }),
    });

    assert_eq!(handled, 0);
    assert!(!bridge.is_sidebar_installed());
}

/// What is tested: unknown message types and malformed payloads are ignored
/// Why: The page carries unrelated traffic on the same channel
#[tokio::test]
async fn test_unrecognized_messages_ignored() {
    let (bridge, channel, _outbox) = create_bridge();
    bridge.init();

    channel.dispatch(agent_event(json!({ "type": "SOMETHING_ELSE" })));
    channel.dispatch(agent_event(json!("plain string")));
    channel.dispatch(agent_event(json!({ "type": "FETCH_PROOF_REQUEST_ID_RESPONSE" })));

    assert_eq!(bridge.proof_state().proof_id, None);
    assert_eq!(bridge.discovery(), Discovery::Probing);
}

/// What is tested: dispose() unsubscribes and stops probing
/// Why: A disposed bridge must neither react nor post
#[tokio::test(start_paused = true)]
async fn test_dispose_unsubscribes() {
    let (bridge, channel, mut outbox) = create_bridge();
    bridge.init();
    assert_eq!(channel.subscriber_count(), 1);
    assert!(bridge.is_listening());

    bridge.dispose();
    drain(&mut outbox);

    assert_eq!(channel.subscriber_count(), 0);
    assert!(!bridge.is_listening());
    tokio::time::sleep(Duration::from_millis(15_000)).await;
    assert!(drain(&mut outbox).is_empty());
}

/// What is tested: calling init() twice keeps a single subscription
/// Why: Double registration would apply every event twice
#[tokio::test]
async fn test_init_is_idempotent() {
    let (bridge, channel, _outbox) = create_bridge();
    bridge.init();
    bridge.init();
    assert_eq!(channel.subscriber_count(), 1);
}

// ============================================================================
// PROOF CORRELATION TESTS
// ============================================================================

/// What is tested: fetch_payment_proof() is a no-op until the request id arrives, then sends it
/// Why: Polling is only meaningful for an accepted request
#[tokio::test]
async fn test_fetch_waits_for_request_id() {
    let (bridge, channel, mut outbox) = create_bridge();
    bridge.init();
    drain(&mut outbox);

    bridge.generate_payment_proof("venmo", DUMMY_INTENT_HASH, 0, None).unwrap();
    assert_eq!(
        drain(&mut outbox),
        vec![json!({
            "type": "GENERATE_PROOF",
            "intentHash": DUMMY_INTENT_HASH,
            "originalIndex": 0,
            "platform": "venmo",
        })]
    );

    assert!(!bridge.fetch_payment_proof("venmo").unwrap());
    assert!(drain(&mut outbox).is_empty());
    assert_eq!(bridge.proof_state().proof_id, None);

    channel.dispatch(agent_event(json!({ "type": "FETCH_PROOF_REQUEST_ID_RESPONSE", "proofId": "p1" })));
    assert!(bridge.fetch_payment_proof("venmo").unwrap());
    assert_eq!(
        drain(&mut outbox),
        vec![json!({ "type": "FETCH_PROOF_BY_ID", "proofId": "p1" })]
    );
}

/// What is tested: a record is stored only when its id matches the outstanding request
/// Why: Late responses for a superseded request must not be taken as the current proof
#[tokio::test]
async fn test_proof_attributed_by_id() {
    let (bridge, channel, _outbox) = create_bridge();
    bridge.init();
    bridge.generate_payment_proof("venmo", DUMMY_INTENT_HASH, 0, None).unwrap();
    channel.dispatch(agent_event(json!({ "type": "FETCH_PROOF_REQUEST_ID_RESPONSE", "proofId": "p1" })));

    channel.dispatch(agent_event(proof_response("p0", "success")));
    assert!(bridge.proof_state().payment_proof.is_none());

    channel.dispatch(agent_event(proof_response("p1", "pending")));
    assert_eq!(bridge.proof_state().payment_proof.unwrap().status, ProofStatus::Pending);

    channel.dispatch(agent_event(proof_response("p1", "success")));
    let record = bridge.proof_state().payment_proof.unwrap();
    assert_eq!(record.status, ProofStatus::Success);
    assert_eq!(record.proof, Some(json!({ "claim": "ok" })));
}

/// What is tested: a new request clears the previous correlation
/// Why: After a reset, records for the earlier request id must be ignored
#[tokio::test]
async fn test_new_request_resets_correlation() {
    let (bridge, channel, _outbox) = create_bridge();
    bridge.init();
    bridge.generate_payment_proof("venmo", DUMMY_INTENT_HASH, 0, None).unwrap();
    channel.dispatch(agent_event(json!({ "type": "FETCH_PROOF_REQUEST_ID_RESPONSE", "proofId": "p1" })));
    channel.dispatch(agent_event(proof_response("p1", "success")));

    bridge.generate_payment_proof("venmo", DUMMY_INTENT_HASH, 1, None).unwrap();
    assert_eq!(bridge.proof_state(), ProofCorrelation::default());

    channel.dispatch(agent_event(proof_response("p1", "success")));
    assert!(bridge.proof_state().payment_proof.is_none());
}

/// What is tested: subscribe_proof_state() wakes on request id and record updates
/// Why: Callers wait on changes instead of spinning
#[tokio::test]
async fn test_proof_state_subscription() {
    let (bridge, channel, _outbox) = create_bridge();
    bridge.init();
    let mut rx = bridge.subscribe_proof_state();
    rx.borrow_and_update();

    channel.dispatch(agent_event(json!({ "type": "FETCH_PROOF_REQUEST_ID_RESPONSE", "proofId": "p9" })));
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().proof_id.as_deref(), Some("p9"));

    bridge.reset_proof_state();
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().proof_id, None);
}

/// What is tested: multi-proof requests carry proofIndex
/// Why: The agent needs to know which proof of the payment to produce
#[tokio::test]
async fn test_generate_with_proof_index() {
    let (bridge, _channel, mut outbox) = create_bridge();
    bridge.generate_payment_proof("revolut", DUMMY_INTENT_HASH, 3, Some(1)).unwrap();

    let sent = drain(&mut outbox);
    assert_eq!(sent[0]["proofIndex"], json!(1));
    assert_eq!(sent[0]["originalIndex"], json!(3));
}

/// What is tested: open_new_tab() posts OPEN_NEW_TAB
/// Why: The agent opens the platform login from this message
#[tokio::test]
async fn test_open_new_tab() {
    let (bridge, _channel, mut outbox) = create_bridge();
    bridge.open_new_tab("transfer", "venmo").unwrap();

    assert_eq!(
        drain(&mut outbox),
        vec![json!({ "type": "OPEN_NEW_TAB", "actionType": "transfer", "platform": "venmo" })]
    );
}

/// What is tested: sends fail once nothing reads the outbox
/// Why: Callers must learn that the request never left the page
#[tokio::test]
async fn test_send_fails_when_outbox_dropped() {
    let (bridge, _channel, outbox) = create_bridge();
    drop(outbox);
    assert!(bridge.open_new_tab("transfer", "venmo").is_err());
}

// ============================================================================
// METADATA TESTS
// ============================================================================

/// What is tested: metadata responses are stored per platform and cleared independently
/// Why: Clearing one platform must not drop another's payments
#[tokio::test]
async fn test_metadata_per_platform() {
    let (bridge, channel, _outbox) = create_bridge();
    bridge.init();

    channel.dispatch(agent_event(json!({
        "type": "METADATA_MESSAGES_RESPONSE",
        "platform": "venmo",
        "metadata": [
            { "originalIndex": 0, "amount": "12.50", "recipient": "alice", "hidden": false, "paymentId": "v1" },
            { "originalIndex": 1, "amount": 3, "hidden": true }
        ]
    })));
    channel.dispatch(agent_event(json!({
        "type": "METADATA_MESSAGES_RESPONSE",
        "platform": "revolut",
        "metadata": []
    })));

    let venmo = bridge.platform_metadata("venmo").unwrap();
    let items = venmo.metadata.as_ref().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].recipient.as_deref(), Some("alice"));
    assert_eq!(items[0].extra["paymentId"], json!("v1"));
    assert_eq!(venmo.visible_items().len(), 1);

    bridge.clear_platform_metadata("venmo");
    assert!(bridge.platform_metadata("venmo").is_none());
    assert!(bridge.platform_metadata("revolut").is_some());

    bridge.clear_all_metadata();
    assert!(bridge.metadata().platforms().is_empty());
}

/// What is tested: an expired entry reads as absent
/// Why: Stale payment lists must not be offered for proving
#[tokio::test]
async fn test_metadata_expiry() {
    let (bridge, channel, _outbox) = create_bridge();
    bridge.init();

    channel.dispatch(agent_event(json!({
        "type": "METADATA_MESSAGES_RESPONSE",
        "platform": "venmo",
        "metadata": [],
        "expiresAt": 1_000u64
    })));

    assert!(bridge.platform_metadata("venmo").is_none());
    let raw = bridge.metadata().get("venmo").unwrap();
    assert_eq!(raw.expires_at, Some(1_000));
    assert_eq!(bridge.metadata().purge_expired(2_000), 1);
    assert!(bridge.metadata().get("venmo").is_none());
}
