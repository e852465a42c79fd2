//! Built-in configuration defaults shared by the library and the binary.

use crate::logging::LogFormat;

/// Loopback address the embedded server binds to unless overridden.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Port zero asks the operating system for any free port.
pub const DEFAULT_PORT: u16 = 0;

/// Engine tick interval in milliseconds.
pub const DEFAULT_TICK_TIME_MS: u64 = 500;

/// Pending connection backlog handed to `listen(2)`.
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Upper bound on the asynchronous readiness wait, in milliseconds.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 60_000;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default bind host as an owned value (serde default hook).
pub fn default_bind_host() -> String {
    DEFAULT_BIND_HOST.to_owned()
}

/// Default port (serde default hook).
pub const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Default tick interval (serde default hook).
pub const fn default_tick_time_ms() -> u64 {
    DEFAULT_TICK_TIME_MS
}

/// Default backlog (serde default hook).
pub const fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

/// Default readiness timeout (serde default hook).
pub const fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

/// Default log filter expression used by the binary.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
