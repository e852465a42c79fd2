//! Error types raised by the lifecycle controller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;
use crate::storage::StorageProvisioningError;
use crate::transport::ListenerError;

/// Raised when configuration changes while the server runs.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot change {setting} while the server is running")]
pub struct ConfigurationError {
    /// Name of the setting the caller tried to change.
    pub setting: &'static str,
}

/// Start-time failures propagated to the caller.
#[derive(Debug, Error)]
pub enum StartError {
    /// Ephemeral storage could not be provisioned.
    #[error("failed to provision storage: {source}")]
    Storage {
        /// Underlying provisioning error.
        #[source]
        source: StorageProvisioningError,
    },
    /// The client port could not be bound.
    #[error("failed to bind client port: {source}")]
    Bind {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// The engine could not be built or started.
    #[error("failed to start engine: {source}")]
    Engine {
        /// Underlying engine error.
        #[source]
        source: EngineError,
    },
    /// The accept loop could not be started.
    #[error("failed to start client listener: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// The caller interrupted the start attempt.
    #[error("server start was interrupted")]
    Interrupted,
}

/// Failures swallowed by `close`, surfaced to the health reporter only.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The engine reported an error while stopping.
    #[error("engine shutdown failed: {source}")]
    Engine {
        /// Underlying engine error.
        #[source]
        source: EngineError,
    },
    /// The accept thread could not be joined.
    #[error("client listener shutdown failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// The storage root could not be removed.
    #[error("failed to remove storage root '{path}': {source}")]
    Storage {
        /// Root that was left behind.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
