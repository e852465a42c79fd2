//! Host process wiring for the `ensembled` binary.
//!
//! The host loads layered configuration, installs telemetry, starts one
//! [`ServerController`], blocks until a termination signal arrives, and
//! then closes the controller. Every collaborator is injected through
//! [`run_server_with`] so the whole sequence runs in tests without real
//! signals or process-wide configuration.

mod shutdown;

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;
use tracing::info;

use ensemble_config::Config;

use crate::controller::{ServerConfig, ServerController, StartError};
use crate::engine::{EngineProvider, StandaloneEngineProvider};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::telemetry::{self, TelemetryError};

pub use self::shutdown::{ShutdownSignal, SignalError, SystemShutdownSignal};

const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader reading the process arguments, environment, and config file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_args(std::env::args_os())
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps a pre-built configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced by the host process.
#[derive(Debug, Error)]
pub enum HostError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The embedded server failed to start.
    #[error("failed to start embedded server: {source}")]
    Start {
        /// Underlying start error.
        #[source]
        source: StartError,
    },
    /// Waiting for a termination signal failed.
    #[error("failed to wait for shutdown signal: {source}")]
    Signal {
        /// Underlying signal error.
        #[source]
        source: SignalError,
    },
}

/// Collaborators used by [`run_server_with`].
pub struct HostDeps<'a, P> {
    /// Source of the layered configuration.
    pub loader: &'a dyn ConfigLoader,
    /// Receiver of lifecycle events.
    pub reporter: Arc<dyn HealthReporter>,
    /// Engine factory for the controller.
    pub provider: P,
    /// Blocks until the host should stop.
    pub shutdown: &'a dyn ShutdownSignal,
}

/// Runs the server with system configuration, signals, and the standalone engine.
pub fn run_server() -> Result<(), HostError> {
    run_server_with(HostDeps {
        loader: &SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        provider: StandaloneEngineProvider,
        shutdown: &SystemShutdownSignal::new(),
    })
}

/// Runs the server until `deps.shutdown` fires, then closes it.
pub fn run_server_with<P>(deps: HostDeps<'_, P>) -> Result<(), HostError>
where
    P: EngineProvider,
{
    let HostDeps {
        loader,
        reporter,
        provider,
        shutdown,
    } = deps;
    let config = loader
        .load()
        .map_err(|source| HostError::Configuration { source })?;
    telemetry::initialise(&config).map_err(|source| HostError::Telemetry { source })?;

    let controller =
        ServerController::with_collaborators(ServerConfig::from(&config), provider, reporter);
    let handle = controller
        .start()
        .map_err(|source| HostError::Start { source })?;
    info!(
        target: HOST_TARGET,
        address = %handle.local_addr(),
        "serving until a shutdown signal arrives"
    );

    let waited = shutdown.wait();
    controller.close();
    waited.map_err(|source| HostError::Signal { source })
}
