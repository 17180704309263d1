//! Reply window tests
//!
//! Exercises the hold-open behavior of inbound pushes against a paused
//! clock, driving the router in-process so no real time passes: with the
//! runtime paused, timers only fire once every task is idle, which makes
//! the capture/expiry ordering deterministic.
//!
//! Run with: cargo test --test reply_window

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tower::ServiceExt;

use smssyncd::account::{AccountContext, FixedAccount, SharedResolver};
use smssyncd::bootstrap::Shutdown;
use smssyncd::bus::{self, BusEndpoint, BusMessage, DeliveryEvent};
use smssyncd::dispatch::{self, OutboundHandle};
use smssyncd::gateway::{build_router, GatewayState};
use smssyncd::msginfo;
use smssyncd::queue::OutboundQueues;

struct Harness {
    endpoint: BusEndpoint,
    outbound: OutboundHandle,
    queues: Arc<OutboundQueues>,
    _shutdown: Arc<Shutdown>,
    _dispatcher: JoinHandle<()>,
}

fn build_gateway(reply_delay: Duration) -> (Router, Harness) {
    let shutdown = Arc::new(Shutdown::new());
    let (publisher, endpoint) = bus::channel(64);
    let queues = Arc::new(OutboundQueues::new(16));
    let (outbound, dispatcher) = dispatch::start(queues.clone(), publisher.clone(), &shutdown);

    let resolver: SharedResolver = Arc::new(FixedAccount::new(AccountContext::new(
        "default",
        "topsecret",
        "+27",
    )));
    let state = Arc::new(GatewayState {
        resolver,
        queues: queues.clone(),
        publisher,
        reply_delay,
    });

    let router = build_router("/smssync", state);

    (
        router,
        Harness {
            endpoint,
            outbound,
            queues,
            _shutdown: shutdown,
            _dispatcher: dispatcher,
        },
    )
}

fn push_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/smssync?secret=topsecret")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(
            "sent_to=555&from=%2B27831112222&message=ping&sent_timestamp=04-09-13+13%3A12&message_id=m1",
        ))
        .unwrap()
}

fn poll_request() -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/smssync?task=send&secret=topsecret")
        .body(Body::empty())
        .unwrap()
}

fn reply_to(inbound: &BusMessage) -> BusMessage {
    let context = msginfo::decode(&inbound.metadata).expect("routing context");
    let mut reply = BusMessage::new(
        inbound.to_addr.clone(),
        inbound.from_addr.clone(),
        "pong",
        Utc::now(),
    )
    .with_in_reply_to(inbound.message_id.clone());
    msginfo::encode(&context, &mut reply.metadata);
    reply
}

async fn read_json(response: Response) -> Value {
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Yield until the dispatcher has drained its channel.
async fn settle_dispatcher(queues: &OutboundQueues, account_id: &str, want: usize) {
    for _ in 0..20 {
        if queues.depth(account_id) == want {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("queue for '{}' never reached depth {}", account_id, want);
}

#[tokio::test(start_paused = true)]
async fn test_reply_inside_window_is_captured() {
    let (router, mut harness) = build_gateway(Duration::from_secs(5));

    let push = tokio::spawn(router.oneshot(push_request()));

    // The inbound message is on the bus while the response is pending
    let inbound = harness.endpoint.messages.recv().await.expect("no message");
    assert_eq!(inbound.content, "ping");

    let reply = reply_to(&inbound);
    let reply_id = reply.message_id.clone();
    harness.outbound.send(reply).await.expect("dispatcher gone");

    // Awaiting the response lets the paused clock jump to the window
    // deadline, but only after the dispatcher has routed the reply.
    let response = push.await.expect("push task failed").expect("infallible");
    let body = read_json(response).await;

    assert_eq!(body["payload"]["success"], "true");
    assert_eq!(
        body["payload"]["messages"],
        json!([{"to": "+27831112222", "message": "pong"}])
    );

    // Handed off in the response, so acked and never queued
    let event = harness.endpoint.events.recv().await.expect("no event");
    assert_eq!(event.message_id(), reply_id);
    assert_eq!(harness.queues.depth("default"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_window_without_reply_closes_empty() {
    let (router, mut harness) = build_gateway(Duration::from_secs(5));

    let push = tokio::spawn(router.oneshot(push_request()));
    let _inbound = harness.endpoint.messages.recv().await.expect("no message");

    let response = push.await.expect("push task failed").expect("infallible");
    let body = read_json(response).await;

    assert_eq!(
        body,
        json!({"payload": {"success": "true", "messages": []}})
    );
    assert_eq!(harness.queues.stats().open_windows, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reply_after_window_lands_in_queue() {
    let (router, mut harness) = build_gateway(Duration::from_secs(5));

    let push = tokio::spawn(router.oneshot(push_request()));
    let inbound = harness.endpoint.messages.recv().await.expect("no message");

    // Let the window expire before replying
    let response = push.await.expect("push task failed").expect("infallible");
    let body = read_json(response).await;
    assert_eq!(body["payload"]["messages"], json!([]));

    harness
        .outbound
        .send(reply_to(&inbound))
        .await
        .expect("dispatcher gone");
    settle_dispatcher(&harness.queues, "default", 1).await;

    // Late replies wait for the next poll and are not acked early
    assert!(harness.endpoint.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_mid_window_requeues_reply() {
    let (router, mut harness) = build_gateway(Duration::from_secs(5));

    let push = tokio::spawn(router.clone().oneshot(push_request()));

    let inbound = harness.endpoint.messages.recv().await.expect("no message");
    assert_eq!(harness.queues.stats().open_windows, 1);

    // Device gone: the handler future is dropped at the deadline sleep.
    push.abort();
    let _ = push.await;
    assert_eq!(harness.queues.stats().open_windows, 0);

    let reply = reply_to(&inbound);
    let reply_id = reply.message_id.clone();
    harness.outbound.send(reply).await.expect("dispatcher gone");
    settle_dispatcher(&harness.queues, "default", 1).await;

    // The reply waits for the next poll, with no premature ack or nack
    assert!(harness.endpoint.events.try_recv().is_err());

    let response = router.oneshot(poll_request()).await.expect("infallible");
    let body = read_json(response).await;
    assert_eq!(
        body["payload"]["messages"],
        json!([{"to": "+27831112222", "message": "pong"}])
    );

    let event = harness.endpoint.events.recv().await.expect("no event");
    assert!(matches!(event, DeliveryEvent::Ack { .. }));
    assert_eq!(event.message_id(), reply_id);
    assert_eq!(harness.queues.depth("default"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_reply_delay_disables_window() {
    let (router, mut harness) = build_gateway(Duration::ZERO);

    let push = tokio::spawn(router.oneshot(push_request()));
    let inbound = harness.endpoint.messages.recv().await.expect("no message");

    let response = push.await.expect("push task failed").expect("infallible");
    let body = read_json(response).await;
    assert_eq!(
        body,
        json!({"payload": {"success": "true", "messages": []}})
    );

    // With no window, even an instant reply is queued for the next poll
    harness
        .outbound
        .send(reply_to(&inbound))
        .await
        .expect("dispatcher gone");
    settle_dispatcher(&harness.queues, "default", 1).await;
}
