//! Device-facing HTTP gateway using Axum.
//!
//! Provides endpoints for:
//! - The device protocol URL (inbound push and `task=send` poll),
//!   mounted with and without an account path segment
//! - Health checks (/healthz)
//! - Runtime stats (/stats)

mod handlers;
mod server;
mod wire;

pub use handlers::{health_handler, stats_handler, sync_account_handler, sync_handler};
pub use server::{build_router, GatewayServer, GatewayState, SharedGatewayState};
pub use wire::{Envelope, Failure, InboundAccepted, OutgoingMessage, PollReply};
