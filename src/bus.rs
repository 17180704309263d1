//! Message-bus seam.
//!
//! The adapter does not own a broker. It talks to the surrounding system
//! through bounded channels: inbound messages and delivery events flow
//! out via a [`BusPublisher`], outbound messages flow in via the
//! dispatcher's `OutboundHandle` (see `dispatch`). Embedders keep the
//! [`BusEndpoint`] receivers; the standalone daemon wires a logging sink
//! instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Canonical message crossing the bus in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    /// Bus-unique message id
    pub message_id: String,
    /// Normalized sender address
    pub from_addr: String,
    /// Normalized recipient address
    pub to_addr: String,
    /// Text body
    pub content: String,
    /// UTC timestamp (device-reported for inbound)
    pub timestamp: DateTime<Utc>,
    /// Id of the inbound message this one replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// The gateway device's own id for this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Opaque metadata; the routing context lives under
    /// `msginfo::METADATA_KEY`
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl BusMessage {
    /// Create a message with a fresh id and empty metadata.
    pub fn new(
        from_addr: impl Into<String>,
        to_addr: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().simple().to_string(),
            from_addr: from_addr.into(),
            to_addr: to_addr.into(),
            content: content.into(),
            timestamp,
            in_reply_to: None,
            external_id: None,
            metadata: Map::new(),
        }
    }

    /// Mark as a reply to an earlier inbound message.
    pub fn with_in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self
    }

    /// Attach the device-side message id.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

/// Delivery confirmation for one outbound message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// Handed to the gateway: drained by a poll or folded into an inbound
    /// response's reply window.
    Ack {
        /// Original outbound message id
        message_id: String,
    },
    /// Dropped before hand-off; the producer may re-send.
    Nack {
        /// Original outbound message id
        message_id: String,
        /// Why delivery was refused
        reason: String,
    },
}

impl DeliveryEvent {
    /// Acknowledgement for `message_id`.
    pub fn ack(message_id: impl Into<String>) -> Self {
        Self::Ack {
            message_id: message_id.into(),
        }
    }

    /// Negative acknowledgement for `message_id`.
    pub fn nack(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Nack {
            message_id: message_id.into(),
            reason: reason.into(),
        }
    }

    /// Id of the outbound message the event refers to.
    pub fn message_id(&self) -> &str {
        match self {
            Self::Ack { message_id } | Self::Nack { message_id, .. } => message_id,
        }
    }
}

/// The system side of the bus went away.
#[derive(Debug, Error)]
#[error("bus receiver dropped")]
pub struct BusClosed;

/// Adapter-side sender half of the bus.
#[derive(Clone)]
pub struct BusPublisher {
    messages: mpsc::Sender<BusMessage>,
    events: mpsc::Sender<DeliveryEvent>,
}

impl BusPublisher {
    /// Publish an inbound message toward the system.
    pub async fn publish_message(&self, message: BusMessage) -> Result<(), BusClosed> {
        self.messages.send(message).await.map_err(|_| BusClosed)
    }

    /// Publish a delivery event toward the outbound producer.
    pub async fn publish_event(&self, event: DeliveryEvent) -> Result<(), BusClosed> {
        self.events.send(event).await.map_err(|_| BusClosed)
    }

    /// Publish a delivery event without waiting for channel capacity.
    ///
    /// For callers that cannot suspend, e.g. drop paths.
    pub fn try_publish_event(
        &self,
        event: DeliveryEvent,
    ) -> Result<(), mpsc::error::TrySendError<DeliveryEvent>> {
        self.events.try_send(event)
    }
}

/// System-side receiver half of the bus.
pub struct BusEndpoint {
    /// Inbound messages published by the gateway
    pub messages: mpsc::Receiver<BusMessage>,
    /// Delivery acks/nacks for outbound messages
    pub events: mpsc::Receiver<DeliveryEvent>,
}

/// Create a connected publisher/endpoint pair.
pub fn channel(capacity: usize) -> (BusPublisher, BusEndpoint) {
    let (msg_tx, msg_rx) = mpsc::channel(capacity);
    let (event_tx, event_rx) = mpsc::channel(capacity);
    (
        BusPublisher {
            messages: msg_tx,
            events: event_tx,
        },
        BusEndpoint {
            messages: msg_rx,
            events: event_rx,
        },
    )
}
