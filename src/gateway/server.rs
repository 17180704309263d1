//! Gateway HTTP server.

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::account::SharedResolver;
use crate::bootstrap::Shutdown;
use crate::bus::BusPublisher;
use crate::config::{GatewayConfig, ServerConfig};
use crate::queue::OutboundQueues;

use super::handlers::{health_handler, stats_handler, sync_account_handler, sync_handler};

/// Shared state behind every gateway handler.
pub struct GatewayState {
    /// Account resolution and authentication
    pub resolver: SharedResolver,
    /// Outbound FIFOs and reply windows
    pub queues: Arc<OutboundQueues>,
    /// Adapter-side bus sender
    pub publisher: BusPublisher,
    /// How long an inbound request is held open for synchronous replies
    pub reply_delay: Duration,
}

pub type SharedGatewayState = Arc<GatewayState>;

/// Build the gateway router.
///
/// The device endpoint is mounted on `web_path` both with and without
/// an account path segment; the trailing slash is optional in both
/// forms because device firmware is inconsistent about it.
pub fn build_router(web_path: &str, state: SharedGatewayState) -> Router {
    let device = get(sync_handler).post(sync_handler);
    let device_account = get(sync_account_handler).post(sync_account_handler);

    Router::new()
        .route(web_path, device.clone())
        .route(&format!("{}/", web_path), device)
        .route(&format!("{}/{{account_id}}", web_path), device_account.clone())
        .route(&format!("{}/{{account_id}}/", web_path), device_account)
        .route("/healthz", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Gateway HTTP server.
pub struct GatewayServer {
    server_config: ServerConfig,
    gateway_config: GatewayConfig,
    state: SharedGatewayState,
    shutdown: Arc<Shutdown>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(
        server_config: &ServerConfig,
        gateway_config: &GatewayConfig,
        state: SharedGatewayState,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            server_config: server_config.clone(),
            gateway_config: gateway_config.clone(),
            state,
            shutdown,
        }
    }

    /// Run the gateway server until shutdown.
    pub async fn run(self) -> std::io::Result<()> {
        let router = build_router(&self.gateway_config.web_path, self.state);
        let addr = self.server_config.address;

        info!(
            address = %addr,
            web_path = %self.gateway_config.web_path,
            "starting gateway server"
        );

        let listener = TcpListener::bind(addr).await?;
        let shutdown = self.shutdown.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                info!("gateway server shutting down");
            })
            .await?;

        Ok(())
    }
}
