//! Ephemeral on-disk storage for one server run.
//!
//! Each start provisions a fresh, uniquely named root holding a snapshot
//! area and a transaction-log area. The root is removed when the storage is
//! released or dropped, so repeated start/stop cycles do not accumulate
//! directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};
use thiserror::Error;
use tracing::{debug, info};

const STORAGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::storage");
const ROOT_PREFIX: &str = "ensemble-";
const SNAPSHOT_DIR: &str = "snapshot";
const LOG_DIR: &str = "log";

/// Errors raised while provisioning ephemeral storage.
#[derive(Debug, Error)]
pub enum StorageProvisioningError {
    /// The base directory could not be created.
    #[error("failed to create storage base directory '{path}': {source}")]
    CreateBase {
        /// Base directory.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The uniquely named root could not be created.
    #[error("failed to create storage root under '{base}': {source}")]
    CreateRoot {
        /// Directory the root was created in.
        base: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A storage area below the root could not be created.
    #[error("failed to create storage directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Allocates [`EphemeralStorage`] under a base directory.
#[derive(Debug, Clone, Default)]
pub struct StorageProvisioner {
    base_dir: Option<PathBuf>,
}

impl StorageProvisioner {
    /// Provisions under the system temporary directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_dir: None }
    }

    /// Provisions under `base_dir`, creating it on demand.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Creates a fresh root with snapshot and log areas.
    pub fn provision(&self) -> Result<EphemeralStorage, StorageProvisioningError> {
        let base = self.base_dir.clone().unwrap_or_else(std::env::temp_dir);
        fs::create_dir_all(&base).map_err(|source| StorageProvisioningError::CreateBase {
            path: base.clone(),
            source,
        })?;
        let root = Builder::new()
            .prefix(ROOT_PREFIX)
            .tempdir_in(&base)
            .map_err(|source| StorageProvisioningError::CreateRoot {
                base: base.clone(),
                source,
            })?;
        let snapshot_dir = create_area(root.path(), SNAPSHOT_DIR)?;
        let log_dir = create_area(root.path(), LOG_DIR)?;
        info!(
            target: STORAGE_TARGET,
            root = %root.path().display(),
            "provisioned ephemeral storage"
        );
        Ok(EphemeralStorage {
            root,
            snapshot_dir,
            log_dir,
        })
    }
}

fn create_area(root: &Path, name: &str) -> Result<PathBuf, StorageProvisioningError> {
    let path = root.join(name);
    fs::create_dir(&path).map_err(|source| StorageProvisioningError::CreateDirectory {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Snapshot and transaction-log directories owned by one server run.
#[derive(Debug)]
pub struct EphemeralStorage {
    root: TempDir,
    snapshot_dir: PathBuf,
    log_dir: PathBuf,
}

impl EphemeralStorage {
    /// Uniquely named root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Directory receiving snapshots.
    #[must_use]
    pub fn snapshot_dir(&self) -> &Path {
        self.snapshot_dir.as_path()
    }

    /// Directory receiving the transaction log.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_path()
    }

    /// Removes the root and everything below it.
    pub fn release(self) -> io::Result<()> {
        let root = self.root.path().to_path_buf();
        self.root.close()?;
        debug!(
            target: STORAGE_TARGET,
            root = %root.display(),
            "released ephemeral storage"
        );
        Ok(())
    }
}
