//! Structured health reporting for server lifecycle events.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::controller::{ServerConfig, ServerHandle, ShutdownError, StartError};
use crate::readiness::ReadinessError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before a start attempt provisions anything.
    fn server_starting(&self, config: &ServerConfig);

    /// Invoked once the acceptor is dispatching connections.
    fn server_started(&self, handle: &ServerHandle, elapsed: Duration);

    /// Invoked when a start attempt fails or is interrupted.
    fn start_failed(&self, error: &StartError);

    /// Invoked after the readiness artifact has been written.
    fn server_ready(&self, address: SocketAddr, artifact: &Path);

    /// Invoked when the server became ready but the artifact could not be written.
    fn artifact_failed(&self, artifact: &Path, error: &io::Error);

    /// Invoked when the readiness wait gives up.
    fn readiness_failed(&self, error: &ReadinessError);

    /// Invoked for each failure swallowed while closing the server.
    fn shutdown_failed(&self, error: &ShutdownError);

    /// Invoked after a running server has been closed.
    fn server_stopped(&self, address: SocketAddr);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn server_starting(&self, config: &ServerConfig) {
        (**self).server_starting(config);
    }

    fn server_started(&self, handle: &ServerHandle, elapsed: Duration) {
        (**self).server_started(handle, elapsed);
    }

    fn start_failed(&self, error: &StartError) {
        (**self).start_failed(error);
    }

    fn server_ready(&self, address: SocketAddr, artifact: &Path) {
        (**self).server_ready(address, artifact);
    }

    fn artifact_failed(&self, artifact: &Path, error: &io::Error) {
        (**self).artifact_failed(artifact, error);
    }

    fn readiness_failed(&self, error: &ReadinessError) {
        (**self).readiness_failed(error);
    }

    fn shutdown_failed(&self, error: &ShutdownError) {
        (**self).shutdown_failed(error);
    }

    fn server_stopped(&self, address: SocketAddr) {
        (**self).server_stopped(address);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn server_starting(&self, config: &ServerConfig) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_starting",
            bind_host = %config.bind_host,
            bind_port = config.bind_port,
            tick_ms = config.tick_interval.as_millis(),
            readiness_artifact = ?config.readiness_artifact,
            "starting embedded server"
        );
    }

    fn server_started(&self, handle: &ServerHandle, elapsed: Duration) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_started",
            generation = handle.generation(),
            address = %handle.local_addr(),
            snapshot_dir = %handle.snapshot_dir().display(),
            log_dir = %handle.log_dir().display(),
            elapsed_ms = elapsed.as_millis(),
            "embedded server started"
        );
    }

    fn start_failed(&self, error: &StartError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "start_failed",
            error = %error,
            "embedded server failed to start"
        );
    }

    fn server_ready(&self, address: SocketAddr, artifact: &Path) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_ready",
            address = %address,
            artifact = %artifact.display(),
            "embedded server ready"
        );
    }

    fn artifact_failed(&self, artifact: &Path, error: &io::Error) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "artifact_failed",
            artifact = %artifact.display(),
            error = %error,
            "failed to write readiness artifact"
        );
    }

    fn readiness_failed(&self, error: &ReadinessError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "readiness_failed",
            error = %error,
            "embedded server never became ready"
        );
    }

    fn shutdown_failed(&self, error: &ShutdownError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "shutdown_failed",
            error = %error,
            error_detail = ?error,
            "error while closing embedded server"
        );
    }

    fn server_stopped(&self, address: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_stopped",
            address = %address,
            "embedded server stopped"
        );
    }
}
