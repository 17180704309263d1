//! SMSSync gateway adapter daemon.
//!
//! Bridges the asymmetric SMSSync device protocol onto a symmetric message
//! bus. The Android gateway pushes received SMS to us over HTTP and polls
//! the same URL with `task=send` to fetch messages to transmit; on the bus
//! side every message is a plain publish with delivery acknowledgements
//! flowing back as events.
//!
//! ```text
//!   device ── HTTP push ──▶ gateway ── BusMessage ──▶ embedder
//!   device ◀── poll drain ── queues ◀── OutboundHandle ── embedder
//! ```
//!
//! The crate is usable as a library: embedders construct the gateway with
//! their own bus channels, while `src/main.rs` wires a standalone daemon
//! with a logging sink on the system side.

pub mod account;
pub mod bootstrap;
pub mod bus;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod msginfo;
pub mod msisdn;
pub mod queue;
pub mod telemetry;
