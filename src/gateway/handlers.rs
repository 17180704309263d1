//! Device-facing HTTP handlers.
//!
//! One URL speaks the whole protocol: the device pushes inbound SMS to
//! it and polls it with `task=send` to fetch outbound. Request fields
//! may arrive in the query string or in a form-encoded body; both are
//! read, with body values winning. Every response is HTTP 200 and the
//! JSON body signals success or failure (see [`super::wire`]).

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::account::{AccountContext, ResolveError};
use crate::bus::{BusMessage, BusPublisher, DeliveryEvent};
use crate::msginfo;
use crate::msisdn;
use crate::queue::{OutboundQueues, QueuedOutbound, RouteOutcome};

use super::server::SharedGatewayState;
use super::wire::{Failure, InboundAccepted, OutgoingMessage, PollReply};

/// Timestamp format the device reports, e.g. `04-09-13 13:12`.
const SENT_TIMESTAMP_FORMAT: &str = "%m-%d-%y %H:%M";

// ============================================================================
// Request parsing
// ============================================================================

/// Why an inbound push could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A required request parameter was absent.
    #[error("missing parameter '{0}'")]
    MissingParam(&'static str),
    /// `sent_timestamp` did not match the device's format.
    #[error("unparsable sent_timestamp '{0}'")]
    BadTimestamp(String),
}

/// Fields of one inbound push, still carrying raw device addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub from_raw: String,
    pub to_raw: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub external_id: String,
}

impl InboundEnvelope {
    /// Parse the device's push parameters.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ParseError> {
        let get = |key: &'static str| {
            params
                .get(key)
                .cloned()
                .ok_or(ParseError::MissingParam(key))
        };

        let from_raw = get("from")?;
        let to_raw = get("sent_to")?;
        let body = get("message")?;
        let external_id = get("message_id")?;

        let raw_timestamp = get("sent_timestamp")?;
        // The device reports local-less wall time; it is taken as UTC.
        let sent_at = NaiveDateTime::parse_from_str(&raw_timestamp, SENT_TIMESTAMP_FORMAT)
            .map_err(|_| ParseError::BadTimestamp(raw_timestamp))?
            .and_utc();

        Ok(Self {
            from_raw,
            to_raw,
            body,
            sent_at,
            external_id,
        })
    }
}

/// Collect request parameters from the query string and, for form
/// POSTs, the body. The device mixes both; body values win.
fn merge_params(query: Option<&str>, headers: &HeaderMap, body: &Bytes) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query) = query {
        if let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            params.extend(pairs);
        }
    }

    if is_form(headers) {
        if let Ok(pairs) = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
            params.extend(pairs);
        }
    }

    params
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

// ============================================================================
// Device endpoint
// ============================================================================

/// Device endpoint without an account path segment (single-account mode).
pub async fn sync_handler(
    State(state): State<SharedGatewayState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = merge_params(query.as_deref(), &headers, &body);
    handle_sync(state, None, params).await
}

/// Device endpoint with an account path segment (multi-account mode).
pub async fn sync_account_handler(
    State(state): State<SharedGatewayState>,
    Path(account_id): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = merge_params(query.as_deref(), &headers, &body);
    handle_sync(state, Some(account_id), params).await
}

async fn handle_sync(
    state: SharedGatewayState,
    segment: Option<String>,
    params: HashMap<String, String>,
) -> Response {
    // A device with no secret configured sends none at all.
    let claimed_secret = params.get("secret").cloned().unwrap_or_default();

    let account = match state.resolver.resolve(segment.as_deref(), &claimed_secret) {
        Ok(account) => account,
        Err(err) => {
            let reason = match err {
                ResolveError::AuthenticationFailed => "auth",
                ResolveError::AccountNotFound => "unknown_account",
            };
            warn!(segment = ?segment, error = %err, "device request rejected");
            metrics::counter!("smssync.request.rejected", "reason" => reason).increment(1);
            return failure_response();
        }
    };

    // Anything other than task=send is treated as an inbound push.
    if params.get("task").map(String::as_str) == Some("send") {
        handle_poll(state, account).await
    } else {
        handle_inbound(state, account, &params).await
    }
}

async fn handle_inbound(
    state: SharedGatewayState,
    account: AccountContext,
    params: &HashMap<String, String>,
) -> Response {
    let envelope = match InboundEnvelope::from_params(params) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(account = %account.account_id, error = %err, "malformed inbound push");
            metrics::counter!("smssync.request.rejected", "reason" => "malformed").increment(1);
            return failure_response();
        }
    };

    let from_addr = msisdn::normalize(&envelope.from_raw, &account.dialing_code);
    let to_addr = msisdn::normalize(&envelope.to_raw, &account.dialing_code);

    let mut message = BusMessage::new(from_addr, to_addr, envelope.body, envelope.sent_at)
        .with_external_id(envelope.external_id);
    msginfo::encode(&account, &mut message.metadata);

    let inbound_id = message.message_id.clone();
    let reply_delay = state.reply_delay;

    // The window must exist before the publish; a consumer replying
    // immediately would otherwise miss it. The guard closes it even when
    // the device disconnects and this future is dropped mid-wait.
    let window = (!reply_delay.is_zero()).then(|| {
        ReplyWindowGuard::open(
            state.queues.clone(),
            state.publisher.clone(),
            inbound_id.clone(),
            account.account_id.clone(),
        )
    });

    debug!(
        account = %account.account_id,
        message_id = %inbound_id,
        from = %message.from_addr,
        "inbound push accepted"
    );

    if state.publisher.publish_message(message).await.is_err() {
        error!(account = %account.account_id, "bus closed, dropping inbound push");
        // Dropping the guard closes the never-used window.
        return failure_response();
    }

    metrics::counter!("smssync.inbound.accepted").increment(1);

    let replies = match window {
        Some(window) => {
            tokio::time::sleep(reply_delay).await;
            window.close()
        }
        None => Vec::new(),
    };

    // Captured replies ride back in this response, so they count as
    // delivered now.
    ack_all(&state, &replies).await;

    let messages: Vec<OutgoingMessage> = replies.into_iter().map(Into::into).collect();
    Json(InboundAccepted::envelope(messages)).into_response()
}

/// Reply window that survives request cancellation.
///
/// Hyper drops the handler future as soon as the device disconnects, and
/// the deadline sleep is where an inbound request spends its life, so
/// cancellation lands there. Without cleanup the window entry would
/// outlive the request and swallow every later reply correlated to it.
/// On drop the window is closed and whatever it captured goes back onto
/// the account's FIFO unacked: a reply that never made it into an HTTP
/// response was not delivered.
struct ReplyWindowGuard {
    queues: Arc<OutboundQueues>,
    publisher: BusPublisher,
    inbound_id: String,
    account_id: String,
    closed: bool,
}

impl ReplyWindowGuard {
    fn open(
        queues: Arc<OutboundQueues>,
        publisher: BusPublisher,
        inbound_id: String,
        account_id: String,
    ) -> Self {
        queues.open_window(&inbound_id, &account_id);
        Self {
            queues,
            publisher,
            inbound_id,
            account_id,
            closed: false,
        }
    }

    /// Close the window and take the replies it captured.
    fn close(mut self) -> Vec<QueuedOutbound> {
        self.closed = true;
        self.queues.close_window(&self.inbound_id)
    }
}

impl Drop for ReplyWindowGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let replies = self.queues.close_window(&self.inbound_id);
        if replies.is_empty() {
            return;
        }
        warn!(
            account = %self.account_id,
            count = replies.len(),
            "request cancelled mid-window, re-queueing captured replies"
        );
        for item in replies {
            let correlation_id = item.correlation_id.clone();
            if self.queues.route(&self.account_id, None, item) == RouteOutcome::QueueFull {
                error!(account = %self.account_id, "outbound queue full, dropping captured reply");
                metrics::counter!("smssync.outbound.dropped", "reason" => "queue_full")
                    .increment(1);
                let event = DeliveryEvent::nack(correlation_id, "queue full");
                if self.publisher.try_publish_event(event).is_err() {
                    debug!("bus unavailable, dropping delivery nack");
                }
            }
        }
    }
}

async fn handle_poll(state: SharedGatewayState, account: AccountContext) -> Response {
    metrics::counter!("smssync.poll.requests").increment(1);

    let drained = state.queues.drain(&account.account_id);

    if !drained.is_empty() {
        info!(
            account = %account.account_id,
            count = drained.len(),
            "poll drained outbound queue"
        );
        metrics::counter!("smssync.poll.drained").increment(drained.len() as u64);
    }

    ack_all(&state, &drained).await;

    let messages: Vec<OutgoingMessage> = drained.into_iter().map(Into::into).collect();
    Json(PollReply::envelope(account.secret, messages)).into_response()
}

/// Publish one delivery ack per message handed to the device.
async fn ack_all(state: &SharedGatewayState, handed_off: &[QueuedOutbound]) {
    for entry in handed_off {
        let event = DeliveryEvent::ack(entry.correlation_id.clone());
        if state.publisher.publish_event(event).await.is_err() {
            debug!("bus closed, dropping delivery ack");
        }
    }
}

fn failure_response() -> Response {
    Json(Failure::envelope()).into_response()
}

// ============================================================================
// Operational endpoints
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check handler.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Stats handler.
///
/// GET /stats - Queue depths and open reply windows
pub async fn stats_handler(State(state): State<SharedGatewayState>) -> impl IntoResponse {
    Json(state.queues.stats())
}

// ============================================================================
// Tests
// ============================================================================
