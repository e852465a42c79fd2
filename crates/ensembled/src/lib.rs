//! Embedded coordination server with managed lifecycle and readiness.
//!
//! The crate runs a single-node coordination server inside the host
//! process for integration tests and local development. The
//! [`ServerController`] owns one server run at a time: it provisions
//! throwaway snapshot and transaction-log directories, binds the client
//! port, starts the engine over that storage, and hands accepted
//! connections to it.
//!
//! A bound port is not the same as a usable server. When a readiness
//! artifact is configured, the controller keeps probing the client port in
//! the background and creates the artifact only after the first
//! successful client round-trip. External tooling can poll for that file.
//!
//! Closing is idempotent and never fails to its caller. It cancels and
//! joins the readiness wait, stops the engine and the acceptor, and removes
//! the run's storage. Failures along the way go to the configured
//! [`HealthReporter`] and the log.
//!
//! The `ensembled` binary wraps the controller in a host process that
//! loads [`ensemble_config::Config`], installs telemetry, and serves until
//! it receives a termination signal.

mod cancel;
mod controller;
pub mod engine;
mod health;
mod host;
pub mod readiness;
mod storage;
mod telemetry;
mod transport;

pub use cancel::CancellationToken;
pub use controller::{
    ConfigurationError, LifecycleState, ServerConfig, ServerController, ServerHandle,
    ShutdownError, StartError,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use host::{
    ConfigLoader, HostDeps, HostError, ShutdownSignal, SignalError, StaticConfigLoader,
    SystemConfigLoader, SystemShutdownSignal, run_server, run_server_with,
};
pub use storage::{EphemeralStorage, StorageProvisioner, StorageProvisioningError};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
