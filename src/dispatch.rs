//! Outbound dispatcher.
//!
//! Consumes outbound bus messages and routes each one:
//! 1. Decode the routing context stamped in the message metadata
//! 2. Capture into an open reply window when `in_reply_to` matches
//! 3. Otherwise append to the account's FIFO for the next poll
//! 4. Nack what cannot be delivered (missing context, full queue)
//!
//! One dispatcher task serves all accounts; per-message work is a map
//! lookup and a queue push, so a single consumer keeps the append path
//! totally ordered with respect to polling.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::bootstrap::Shutdown;
use crate::bus::{BusMessage, BusPublisher, DeliveryEvent};
use crate::msginfo;
use crate::queue::{OutboundQueues, QueuedOutbound, RouteOutcome};

/// Capacity of the channel feeding the dispatcher.
const OUTBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Handle for submitting outbound messages to the adapter.
#[derive(Clone)]
pub struct OutboundHandle {
    tx: mpsc::Sender<BusMessage>,
}

impl OutboundHandle {
    /// Submit an outbound message, waiting for channel capacity.
    pub async fn send(
        &self,
        message: BusMessage,
    ) -> Result<(), mpsc::error::SendError<BusMessage>> {
        self.tx.send(message).await
    }

    /// Try to submit without blocking.
    pub fn try_send(
        &self,
        message: BusMessage,
    ) -> Result<(), mpsc::error::TrySendError<BusMessage>> {
        self.tx.try_send(message)
    }
}

/// Background task routing outbound messages into windows and queues.
pub struct OutboundDispatcher {
    rx: mpsc::Receiver<BusMessage>,
    queues: Arc<OutboundQueues>,
    publisher: BusPublisher,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl OutboundDispatcher {
    /// Run until shutdown or until every producer handle is dropped.
    pub async fn run(mut self) {
        info!("outbound dispatcher started");

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow_and_update() {
                        info!("outbound dispatcher shutting down");
                        break;
                    }
                }

                message = self.rx.recv() => {
                    let Some(message) = message else {
                        info!("outbound channel closed");
                        break;
                    };

                    self.route_outbound(message).await;
                }
            }
        }
    }

    /// Route a single outbound message.
    #[instrument(skip_all, fields(message_id = %message.message_id))]
    async fn route_outbound(&self, message: BusMessage) {
        let ctx = match msginfo::decode(&message.metadata) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, "outbound message without usable routing context, dropping");
                metrics::counter!("smssync.outbound.dropped", "reason" => "no_context")
                    .increment(1);
                self.nack(&message.message_id, "routing context missing or invalid")
                    .await;
                return;
            }
        };

        let item = QueuedOutbound::new(&message.to_addr, &message.content, &message.message_id);

        match self
            .queues
            .route(&ctx.account_id, message.in_reply_to.as_deref(), item)
        {
            RouteOutcome::Captured => {
                debug!(account = %ctx.account_id, "reply captured by open window");
                metrics::counter!("smssync.replies.captured").increment(1);
            }
            RouteOutcome::Queued => {
                debug!(account = %ctx.account_id, "outbound queued for next poll");
                metrics::counter!("smssync.outbound.queued").increment(1);
            }
            RouteOutcome::QueueFull => {
                error!(account = %ctx.account_id, "outbound queue full, dropping message");
                metrics::counter!("smssync.outbound.dropped", "reason" => "queue_full")
                    .increment(1);
                self.nack(&message.message_id, "queue full").await;
            }
        }
    }

    async fn nack(&self, message_id: &str, reason: &str) {
        let event = DeliveryEvent::nack(message_id, reason);
        if self.publisher.publish_event(event).await.is_err() {
            debug!("event receiver gone, dropping nack");
        }
    }
}

/// Start the dispatcher.
///
/// Returns the producer handle and the task's join handle.
pub fn start(
    queues: Arc<OutboundQueues>,
    publisher: BusPublisher,
    shutdown: &Shutdown,
) -> (OutboundHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

    let dispatcher = OutboundDispatcher {
        rx,
        queues,
        publisher,
        shutdown_rx: shutdown.subscribe(),
    };

    let handle = tokio::spawn(async move {
        dispatcher.run().await;
        info!("outbound dispatcher stopped");
    });

    (OutboundHandle { tx }, handle)
}
