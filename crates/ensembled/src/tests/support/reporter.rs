//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::controller::{ServerConfig, ServerHandle, ShutdownError, StartError};
use crate::health::HealthReporter;
use crate::readiness::ReadinessError;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// A start attempt began for the configured port.
    ServerStarting { port: u16 },
    /// A run with the given generation is accepting connections.
    ServerStarted { generation: u64 },
    /// A start attempt failed with an error description.
    StartFailed(String),
    /// The readiness artifact was written.
    ServerReady(PathBuf),
    /// The readiness artifact could not be written.
    ArtifactFailed(PathBuf),
    /// The readiness wait gave up.
    ReadinessFailed(String),
    /// Close swallowed an error.
    ShutdownFailed(String),
    /// A running server was closed.
    ServerStopped(SocketAddr),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }

    /// Counts events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&HealthEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn server_starting(&self, config: &ServerConfig) {
        self.record(HealthEvent::ServerStarting {
            port: config.bind_port,
        });
    }

    fn server_started(&self, handle: &ServerHandle, _elapsed: Duration) {
        self.record(HealthEvent::ServerStarted {
            generation: handle.generation(),
        });
    }

    fn start_failed(&self, error: &StartError) {
        self.record(HealthEvent::StartFailed(error.to_string()));
    }

    fn server_ready(&self, _address: SocketAddr, artifact: &Path) {
        self.record(HealthEvent::ServerReady(artifact.to_path_buf()));
    }

    fn artifact_failed(&self, artifact: &Path, _error: &io::Error) {
        self.record(HealthEvent::ArtifactFailed(artifact.to_path_buf()));
    }

    fn readiness_failed(&self, error: &ReadinessError) {
        self.record(HealthEvent::ReadinessFailed(error.to_string()));
    }

    fn shutdown_failed(&self, error: &ShutdownError) {
        self.record(HealthEvent::ShutdownFailed(error.to_string()));
    }

    fn server_stopped(&self, address: SocketAddr) {
        self.record(HealthEvent::ServerStopped(address));
    }
}
