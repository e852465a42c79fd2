//! Settings held by the lifecycle controller.

use std::path::PathBuf;
use std::time::Duration;

use ensemble_config::{
    Config, default_backlog, default_bind_host, default_port, default_ready_timeout_ms,
    default_tick_time_ms,
};

/// Configuration of one embedded server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host the client port binds to.
    pub bind_host: String,
    /// Client port; `0` lets the OS pick one.
    pub bind_port: u16,
    /// Marker file written once the server answers its first round-trip.
    pub readiness_artifact: Option<PathBuf>,
    /// Engine tick; session timeouts derive from it.
    pub tick_interval: Duration,
    /// Listen backlog of the client port.
    pub backlog: u32,
    /// How long the readiness wait keeps probing. `None` waits until close.
    pub readiness_deadline: Option<Duration>,
    /// Base directory for ephemeral storage; the system temp dir when unset.
    pub storage_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            bind_port: default_port(),
            readiness_artifact: None,
            tick_interval: Duration::from_millis(default_tick_time_ms()),
            backlog: default_backlog(),
            readiness_deadline: Some(Duration::from_millis(default_ready_timeout_ms())),
            storage_dir: None,
        }
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind_host: config.bind_host().to_owned(),
            bind_port: config.port(),
            readiness_artifact: config.ready_flag_file().map(PathBuf::from),
            tick_interval: config.tick_time(),
            backlog: config.backlog(),
            readiness_deadline: config.ready_timeout(),
            storage_dir: config.storage_dir().map(PathBuf::from),
        }
    }
}
