//! Device wire format.
//!
//! Every gateway reply is HTTP 200 with a JSON body wrapped in a
//! top-level `payload` object; failure is signaled in-band by the flag
//! `"success": "false"`. The flags are the strings `"true"` and
//! `"false"`, not JSON booleans; fielded devices reject anything else.

use serde::{Deserialize, Serialize};

use crate::queue::QueuedOutbound;

/// One outbound SMS handed to the device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: String,
    pub message: String,
}

impl From<QueuedOutbound> for OutgoingMessage {
    fn from(item: QueuedOutbound) -> Self {
        Self {
            to: item.to_addr,
            message: item.content,
        }
    }
}

/// Top-level `{"payload": ...}` wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub payload: T,
}

/// Body acknowledging an accepted inbound push.
///
/// `messages` carries the replies captured while the request was held
/// open and is present even when empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundAccepted {
    pub success: String,
    pub messages: Vec<OutgoingMessage>,
}

impl InboundAccepted {
    pub fn envelope(messages: Vec<OutgoingMessage>) -> Envelope<Self> {
        Envelope {
            payload: Self {
                success: "true".to_string(),
                messages,
            },
        }
    }
}

/// Body rejecting a request. Carries only the flag; on the wire an
/// authentication failure and a malformed push look the same.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub success: String,
}

impl Failure {
    pub fn envelope() -> Envelope<Self> {
        Envelope {
            payload: Self {
                success: "false".to_string(),
            },
        }
    }
}

/// Body answering a `task=send` poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollReply {
    pub task: String,
    /// The account's configured secret, not the one the device sent
    pub secret: String,
    pub messages: Vec<OutgoingMessage>,
}

impl PollReply {
    pub fn envelope(secret: String, messages: Vec<OutgoingMessage>) -> Envelope<Self> {
        Envelope {
            payload: Self {
                task: "send".to_string(),
                secret,
                messages,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
