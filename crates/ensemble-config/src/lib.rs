//! Layered configuration for the embedded coordination server.
//!
//! Values are resolved by [`ortho_config`] in increasing order of
//! precedence: built-in defaults, an optional TOML file (selected with
//! `--config-path` or `ENSEMBLE_CONFIG_PATH`), `ENSEMBLE_*` environment
//! variables, and finally command-line flags.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BACKLOG, DEFAULT_BIND_HOST, DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_READY_TIMEOUT_MS,
    DEFAULT_TICK_TIME_MS, default_backlog, default_bind_host, default_log_filter,
    default_log_filter_string, default_log_format, default_port, default_ready_timeout_ms,
    default_tick_time_ms,
};
pub use logging::LogFormat;

/// Resolved configuration for the embedded server and its host binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "ENSEMBLE")]
pub struct Config {
    /// Host name or address the client listener binds to.
    #[serde(default = "default_bind_host")]
    #[ortho_config(default = default_bind_host())]
    pub bind_host: String,
    /// Client port; `0` selects any free port.
    #[serde(default = "default_port")]
    #[ortho_config(default = DEFAULT_PORT)]
    pub port: u16,
    /// Marker file created once the server answers its first round-trip.
    #[serde(default)]
    pub ready_flag_file: Option<PathBuf>,
    /// Engine tick interval in milliseconds.
    #[serde(default = "default_tick_time_ms")]
    #[ortho_config(default = DEFAULT_TICK_TIME_MS)]
    pub tick_time_ms: u64,
    /// Pending connection backlog for the client listener.
    #[serde(default = "default_backlog")]
    #[ortho_config(default = DEFAULT_BACKLOG)]
    pub backlog: u32,
    /// Readiness wait deadline in milliseconds; `0` waits indefinitely.
    #[serde(default = "default_ready_timeout_ms")]
    #[ortho_config(default = DEFAULT_READY_TIMEOUT_MS)]
    pub ready_timeout_ms: u64,
    /// Base directory for ephemeral storage; the system temp dir when unset.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log records.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            port: DEFAULT_PORT,
            ready_flag_file: None,
            tick_time_ms: DEFAULT_TICK_TIME_MS,
            backlog: DEFAULT_BACKLOG,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            storage_dir: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from an explicit argument list.
    ///
    /// The first element is treated as the program name, mirroring
    /// [`std::env::args_os`].
    pub fn load_from_args<I>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = OsString>,
    {
        Self::load_from_iter(args)
    }

    /// Host the client listener binds to.
    #[must_use]
    pub fn bind_host(&self) -> &str {
        self.bind_host.as_str()
    }

    /// Configured client port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Readiness marker path, when configured.
    #[must_use]
    pub fn ready_flag_file(&self) -> Option<&Path> {
        self.ready_flag_file.as_deref()
    }

    /// Engine tick interval.
    #[must_use]
    pub const fn tick_time(&self) -> Duration {
        Duration::from_millis(self.tick_time_ms)
    }

    /// Pending connection backlog.
    #[must_use]
    pub const fn backlog(&self) -> u32 {
        self.backlog
    }

    /// Readiness deadline; `None` when the wait is unbounded.
    #[must_use]
    pub const fn ready_timeout(&self) -> Option<Duration> {
        if self.ready_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.ready_timeout_ms))
        }
    }

    /// Base directory for ephemeral storage.
    #[must_use]
    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
