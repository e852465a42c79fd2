//! Boundary to the embedded coordination engine.
//!
//! The controller never looks inside the engine: it builds one through an
//! [`EngineProvider`], starts it over the provisioned storage, hands it the
//! connections accepted on the client port, and shuts it down. The
//! [`StandaloneEngine`] shipped with the crate answers the admin
//! four-letter-word commands so the server can be probed and inspected
//! without any external runtime.

mod commands;
mod standalone;

use std::fmt;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::transport::ConnectionHandler;

pub use self::commands::FourLetterWord;
pub use self::standalone::{StandaloneEngine, StandaloneEngineProvider};

pub(crate) const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

/// Settings used to construct an engine for one server run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Directory receiving snapshots.
    pub snapshot_dir: PathBuf,
    /// Directory receiving the transaction log.
    pub log_dir: PathBuf,
    /// Base time unit of the engine; session timeouts derive from it.
    pub tick_time: Duration,
    /// Port the client listener is bound to.
    pub client_port: u16,
    /// Maximum concurrent client connections reported by the engine.
    pub max_client_connections: u32,
}

impl EngineSettings {
    /// Lower bound on negotiated session timeouts (two ticks).
    #[must_use]
    pub fn min_session_timeout(&self) -> Duration {
        self.tick_time.saturating_mul(2)
    }

    /// Upper bound on negotiated session timeouts (twenty ticks).
    #[must_use]
    pub fn max_session_timeout(&self) -> Duration {
        self.tick_time.saturating_mul(20)
    }
}

/// How an engine should wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Stop accepting work and give in-flight requests a short drain window.
    Graceful,
    /// Stop immediately; used when a start attempt is abandoned.
    Forced,
}

impl fmt::Display for ShutdownMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Graceful => "graceful",
            Self::Forced => "forced",
        };
        formatter.write_str(label)
    }
}

/// Capabilities the controller requires from an embedded engine.
pub trait CoordinationEngine: Send + Sync + 'static {
    /// Prepares storage and begins serving.
    fn start(&self) -> Result<(), EngineError>;

    /// Serves one accepted client connection until it completes.
    fn serve(&self, stream: TcpStream);

    /// Stops serving. Calling it more than once must be harmless.
    fn shutdown(&self, mode: ShutdownMode) -> Result<(), EngineError>;
}

/// Factory building an engine for each server run.
pub trait EngineProvider: Send + Sync {
    /// Constructs an engine over the supplied settings without starting it.
    fn create(&self, settings: &EngineSettings)
    -> Result<Arc<dyn CoordinationEngine>, EngineError>;
}

/// Errors reported by engine implementations.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
    /// Optional source error reported by the engine implementation.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that wraps an underlying source.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-readable message describing the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Adapts an engine to the listener's connection handler seam.
pub(crate) struct EngineConnectionHandler {
    engine: Arc<dyn CoordinationEngine>,
}

impl EngineConnectionHandler {
    pub(crate) fn new(engine: Arc<dyn CoordinationEngine>) -> Self {
        Self { engine }
    }
}

impl ConnectionHandler for EngineConnectionHandler {
    fn handle(&self, stream: TcpStream) {
        self.engine.serve(stream);
    }
}
