use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration for smssyncd
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Device gateway behavior
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Single-account mode
    pub account: Option<AccountConfig>,

    /// Multi-account mode, keyed by account id
    pub accounts: Option<HashMap<String, AccountEntry>>,

    /// Logging settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_address")]
    pub address: SocketAddr,

    /// How long shutdown waits for in-flight requests and tasks
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

fn default_address() -> SocketAddr {
    "0.0.0.0:9080".parse().unwrap()
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Device gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// URL path the device is pointed at
    #[serde(default = "default_web_path")]
    pub web_path: String,

    /// How long an inbound push is held open for synchronous replies;
    /// zero disables the reply window
    #[serde(default = "default_reply_delay", with = "humantime_serde")]
    pub reply_delay: Duration,

    /// Outbound messages held per account before new ones are refused
    #[serde(default = "default_max_queued")]
    pub max_queued_per_account: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            web_path: default_web_path(),
            reply_delay: default_reply_delay(),
            max_queued_per_account: default_max_queued(),
        }
    }
}

fn default_web_path() -> String {
    "/smssync".to_string()
}

fn default_reply_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_queued() -> usize {
    1000
}

/// Single-account mode configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Account identifier (used as the queue key)
    #[serde(default = "default_account_id")]
    pub id: String,

    /// Shared secret the device must present
    #[serde(default)]
    pub secret: String,

    /// Accept any claimed secret; only valid when `secret` is empty
    #[serde(default)]
    pub accept_any_secret: bool,

    /// International dialing code, e.g. "+27"
    pub dialing_code: String,
}

fn default_account_id() -> String {
    "default".to_string()
}

/// One account in multi-account mode
#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntry {
    /// Shared secret the device must present
    #[serde(default)]
    pub secret: String,

    /// Accept any claimed secret; only valid when `secret` is empty
    #[serde(default)]
    pub accept_any_secret: bool,

    /// International dialing code, e.g. "+27"
    pub dialing_code: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter, overridden by RUST_LOG when set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
