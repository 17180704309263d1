use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, span, warn, Level};

use crate::account;
use crate::bus::{self, BusEndpoint};
use crate::config::Config;
use crate::dispatch;
use crate::gateway::{GatewayServer, GatewayState};
use crate::queue::OutboundQueues;

use super::shutdown::{spawn_signal_listener, Shutdown};

/// Capacity of each bus direction.
const BUS_CHANNEL_CAPACITY: usize = 1024;

/// Main smssyncd server
///
/// Components:
/// - Gateway HTTP server: speaks the device protocol
/// - Outbound dispatcher: routes bus traffic into queues and reply windows
/// - Bus sink: drains the application side of the bus in the standalone
///   daemon, logging every message and delivery event
pub struct Server {
    /// Configuration
    config: Arc<Config>,

    /// Shutdown handle
    shutdown: Arc<Shutdown>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Run the server until shutdown
    pub async fn run(self) -> Result<()> {
        let span = span!(Level::INFO, "smssyncd", version = env!("CARGO_PKG_VERSION"));
        let _enter = span.enter();

        info!(
            address = %self.config.server.address,
            web_path = %self.config.gateway.web_path,
            "starting smssyncd server"
        );

        let resolver = account::create_resolver(&self.config)?;
        let queues = Arc::new(OutboundQueues::new(
            self.config.gateway.max_queued_per_account,
        ));
        let (publisher, endpoint) = bus::channel(BUS_CHANNEL_CAPACITY);

        // Dropping every outbound handle stops the dispatcher, so the
        // daemon holds one for its lifetime.
        let (_outbound_handle, dispatcher_task) =
            dispatch::start(queues.clone(), publisher.clone(), &self.shutdown);

        let sink_task = spawn_bus_sink(endpoint, &self.shutdown);
        let signal_task = spawn_signal_listener(self.shutdown.clone());

        let state = Arc::new(GatewayState {
            resolver,
            queues,
            publisher,
            reply_delay: self.config.gateway.reply_delay,
        });

        let gateway = GatewayServer::new(
            &self.config.server,
            &self.config.gateway,
            state,
            self.shutdown.clone(),
        );

        info!(
            reply_delay_ms = self.config.gateway.reply_delay.as_millis() as u64,
            max_queued_per_account = self.config.gateway.max_queued_per_account,
            drain_timeout_secs = self.config.server.drain_timeout.as_secs(),
            "smssyncd server started"
        );

        // Record startup metrics
        metrics::counter!("smssync.server.starts").increment(1);

        // Serve until shutdown; bind failures land here
        let serve_result = gateway.run().await;

        // Force the trigger in case the listener exited on its own
        self.shutdown.trigger();

        let drain_result = tokio::time::timeout(self.config.server.drain_timeout, async {
            let _ = dispatcher_task.await;
            let _ = sink_task.await;
        })
        .await;

        if drain_result.is_err() {
            warn!("drain timeout reached, abandoning background tasks");
        }

        signal_task.abort();

        serve_result.context("gateway server failed")?;

        info!("smssyncd server stopped");

        Ok(())
    }

    /// Get the shutdown handle
    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }
}

/// Drain the application side of the bus, logging both streams.
///
/// The standalone daemon has no in-process bus consumer; this keeps the
/// channels open and makes the traffic visible.
fn spawn_bus_sink(mut endpoint: BusEndpoint, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow_and_update() {
                        break;
                    }
                }
                message = endpoint.messages.recv() => {
                    let Some(message) = message else { break };
                    info!(
                        message_id = %message.message_id,
                        from = %message.from_addr,
                        to = %message.to_addr,
                        "inbound message on bus"
                    );
                }
                event = endpoint.events.recv() => {
                    let Some(event) = event else { break };
                    info!(
                        message_id = %event.message_id(),
                        event = ?event,
                        "delivery event on bus"
                    );
                }
            }
        }
        info!("bus sink stopped");
    })
}
