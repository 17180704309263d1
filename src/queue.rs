//! Outbound queues and reply windows.
//!
//! One FIFO per account holds outbound messages until the device polls.
//! While an inbound request sits in its reply-delay window, outbound
//! replies correlated to it are captured into the window instead of the
//! queue and folded into the synchronous HTTP response. A single mutex
//! covers queues and windows, so routing, draining and window close are
//! atomic with respect to each other: an entry lands in exactly one
//! place and a drain observes either all of a concurrent append or none
//! of it.
//!
//! Volatile by design; a restart loses queued-but-unpolled messages.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;

/// Outbound message held for an account until polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedOutbound {
    /// Destination address
    pub to_addr: String,
    /// Text body
    pub content: String,
    /// Original bus message id, echoed in the delivery ack
    pub correlation_id: String,
}

impl QueuedOutbound {
    /// Create a queued outbound entry.
    pub fn new(
        to_addr: impl Into<String>,
        content: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            to_addr: to_addr.into(),
            content: content.into(),
            correlation_id: correlation_id.into(),
        }
    }
}

/// Where `route` put an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Captured by an open reply window; goes out in the inbound
    /// response.
    Captured,
    /// Appended to the account's FIFO; goes out on the next poll.
    Queued,
    /// Dropped: the account's queue is at capacity.
    QueueFull,
}

/// Snapshot for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Queued outbound messages per account
    pub queued: HashMap<String, usize>,
    /// Reply windows currently open
    pub open_windows: usize,
}

struct ReplyWindow {
    account_id: String,
    replies: Vec<QueuedOutbound>,
}

#[derive(Default)]
struct Inner {
    /// Account id → FIFO awaiting a poll
    queues: HashMap<String, VecDeque<QueuedOutbound>>,
    /// Inbound bus message id → open window
    windows: HashMap<String, ReplyWindow>,
}

/// All outbound state: per-account FIFOs plus open reply windows.
pub struct OutboundQueues {
    inner: Mutex<Inner>,
    max_per_account: usize,
}

impl OutboundQueues {
    /// Create with a per-account queue bound.
    pub fn new(max_per_account: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_per_account,
        }
    }

    /// Open a reply window for an in-flight inbound request.
    ///
    /// Must happen before the inbound message is published, so a reply
    /// arriving immediately cannot race the registration.
    pub fn open_window(&self, inbound_id: &str, account_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.windows.insert(
            inbound_id.to_string(),
            ReplyWindow {
                account_id: account_id.to_string(),
                replies: Vec::new(),
            },
        );
    }

    /// Close a window, returning the replies captured while it was open.
    ///
    /// Closing an unknown (or already closed) window yields no replies.
    pub fn close_window(&self, inbound_id: &str) -> Vec<QueuedOutbound> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .windows
            .remove(inbound_id)
            .map(|w| w.replies)
            .unwrap_or_default()
    }

    /// Route one outbound message: into a matching open window for the
    /// same account, otherwise onto the account's FIFO.
    pub fn route(
        &self,
        account_id: &str,
        in_reply_to: Option<&str>,
        item: QueuedOutbound,
    ) -> RouteOutcome {
        let mut inner = self.inner.lock().unwrap();

        if let Some(inbound_id) = in_reply_to {
            if let Some(window) = inner.windows.get_mut(inbound_id) {
                if window.account_id == account_id {
                    window.replies.push(item);
                    return RouteOutcome::Captured;
                }
            }
        }

        let queue = inner.queues.entry(account_id.to_string()).or_default();
        if queue.len() >= self.max_per_account {
            return RouteOutcome::QueueFull;
        }
        queue.push_back(item);
        RouteOutcome::Queued
    }

    /// Atomically take every queued message for an account, oldest first.
    pub fn drain(&self, account_id: &str) -> Vec<QueuedOutbound> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .queues
            .remove(account_id)
            .map(|q| q.into_iter().collect())
            .unwrap_or_default()
    }

    /// Messages currently waiting for an account.
    pub fn depth(&self, account_id: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.queues.get(account_id).map(|q| q.len()).unwrap_or(0)
    }

    /// Snapshot queue depths and open window count.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        QueueStats {
            queued: inner
                .queues
                .iter()
                .map(|(k, v)| (k.clone(), v.len()))
                .collect(),
            open_windows: inner.windows.len(),
        }
    }
}
