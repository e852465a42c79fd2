//! Lifecycle controller for the embedded coordination server.
//!
//! [`ServerController`] is the surface embedders use. It provisions fresh
//! storage, binds the client port, starts the engine over that storage, and
//! hands accepted connections to it. When a readiness artifact is
//! configured it also starts a background readiness wait that writes the
//! artifact after the first successful client round-trip.
//!
//! All lifecycle operations serialise on one mutex, so callers only ever
//! observe a stopped or a running server. [`ServerController::close`] is
//! idempotent and never fails; problems met while tearing down are logged
//! and handed to the [`HealthReporter`].

mod config;
mod errors;

use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tempfile::Builder;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::engine::{
    CoordinationEngine, EngineConnectionHandler, EngineProvider, EngineSettings, ShutdownMode,
    StandaloneEngineProvider,
};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::readiness::{ReadinessError, ReadinessPolicy, ReadinessWait, await_ready};
use crate::storage::{EphemeralStorage, StorageProvisioner};
use crate::transport::{ListenerHandle, SocketListener};

pub use self::config::ServerConfig;
pub use self::errors::{ConfigurationError, ShutdownError, StartError};

const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::controller");
const MAX_CLIENT_CONNECTIONS: u32 = 60;

/// Observable lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Never started, closed, or start interrupted.
    Stopped,
    /// A start attempt holds the controller.
    Starting,
    /// Accepting client connections.
    Running,
    /// The last start attempt failed.
    Failed,
}

/// Descriptor of one server run.
///
/// Handles are cheap to clone. Calling `start` again on a running
/// controller returns a handle equal to the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandle {
    generation: u64,
    local_addr: SocketAddr,
    snapshot_dir: PathBuf,
    log_dir: PathBuf,
}

impl ServerHandle {
    /// Counter distinguishing successive runs of one controller.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Address the client port is bound to, with the real port.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Snapshot directory of this run.
    #[must_use]
    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Transaction-log directory of this run.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Owns and drives the embedded server.
pub struct ServerController<P = StandaloneEngineProvider>
where
    P: EngineProvider,
{
    provider: P,
    reporter: Arc<dyn HealthReporter>,
    inner: Mutex<Inner>,
}

struct Inner {
    config: ServerConfig,
    state: LifecycleState,
    generation: u64,
    running: Option<RunningServer>,
}

impl ServerController {
    /// Builds a controller using the standalone engine and structured reporting.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_collaborators(
            config,
            StandaloneEngineProvider,
            Arc::new(StructuredHealthReporter::new()),
        )
    }
}

impl Default for ServerController {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl<P> ServerController<P>
where
    P: EngineProvider,
{
    /// Builds a controller with explicit collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: ServerConfig,
        provider: P,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            provider,
            reporter,
            inner: Mutex::new(Inner {
                config,
                state: LifecycleState::Stopped,
                generation: 0,
                running: None,
            }),
        }
    }

    /// Sets the client port used by the next start.
    pub fn configure_port(&self, port: u16) -> Result<(), ConfigurationError> {
        self.reconfigure("port", |config| config.bind_port = port)
    }

    /// Sets or clears the readiness artifact used by the next start.
    pub fn configure_readiness_artifact(
        &self,
        artifact: Option<PathBuf>,
    ) -> Result<(), ConfigurationError> {
        self.reconfigure("readiness artifact", |config| {
            config.readiness_artifact = artifact;
        })
    }

    fn reconfigure(
        &self,
        setting: &'static str,
        apply: impl FnOnce(&mut ServerConfig),
    ) -> Result<(), ConfigurationError> {
        let mut inner = self.lock();
        if inner.running.is_some() {
            return Err(ConfigurationError { setting });
        }
        apply(&mut inner.config);
        Ok(())
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> ServerConfig {
        self.lock().config.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    /// Returns true while the server accepts client connections.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    /// Bound client address of the running server.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock()
            .running
            .as_ref()
            .map(|running| running.handle.local_addr)
    }

    /// Starts the server, or returns the current handle when already running.
    ///
    /// Returns once the client port is accepting. Readiness is confirmed in
    /// the background when an artifact is configured.
    pub fn start(&self) -> Result<ServerHandle, StartError> {
        self.start_interruptible(&CancellationToken::new())
    }

    /// Like [`start`](Self::start), abandoning the attempt when `interrupt`
    /// is triggered before the server is running.
    pub fn start_interruptible(
        &self,
        interrupt: &CancellationToken,
    ) -> Result<ServerHandle, StartError> {
        let mut inner = self.lock();
        if let Some(running) = &inner.running {
            return Ok(running.handle.clone());
        }

        inner.state = LifecycleState::Starting;
        self.reporter.server_starting(&inner.config);
        let started = Instant::now();
        let generation = inner.generation + 1;
        match self.launch(&inner.config, generation, interrupt) {
            Ok(running) => {
                let handle = running.handle.clone();
                let elapsed = started.elapsed();
                inner.generation = generation;
                inner.state = LifecycleState::Running;
                inner.running = Some(running);
                info!(
                    target: CONTROLLER_TARGET,
                    address = %handle.local_addr,
                    generation,
                    elapsed_ms = elapsed.as_millis(),
                    "embedded server running"
                );
                self.reporter.server_started(&handle, elapsed);
                Ok(handle)
            }
            Err(error) => {
                inner.state = match error {
                    StartError::Interrupted => LifecycleState::Stopped,
                    _ => LifecycleState::Failed,
                };
                self.reporter.start_failed(&error);
                Err(error)
            }
        }
    }

    fn launch(
        &self,
        config: &ServerConfig,
        generation: u64,
        interrupt: &CancellationToken,
    ) -> Result<RunningServer, StartError> {
        checkpoint(interrupt)?;
        let provisioner = match &config.storage_dir {
            Some(base) => StorageProvisioner::with_base_dir(base),
            None => StorageProvisioner::new(),
        };
        let storage = provisioner
            .provision()
            .map_err(|source| StartError::Storage { source })?;
        checkpoint(interrupt)?;

        let listener = SocketListener::bind(&config.bind_host, config.bind_port, config.backlog)
            .map_err(|source| StartError::Bind { source })?;
        let local_addr = listener.local_addr();

        let settings = EngineSettings {
            snapshot_dir: storage.snapshot_dir().to_path_buf(),
            log_dir: storage.log_dir().to_path_buf(),
            tick_time: config.tick_interval,
            client_port: local_addr.port(),
            max_client_connections: MAX_CLIENT_CONNECTIONS,
        };
        let engine = self
            .provider
            .create(&settings)
            .map_err(|source| StartError::Engine { source })?;
        let abandon = AbandonGuard::new(Arc::clone(&engine));
        engine
            .start()
            .map_err(|source| StartError::Engine { source })?;
        checkpoint(interrupt)?;

        let handler = Arc::new(EngineConnectionHandler::new(Arc::clone(&engine)));
        let listener = listener
            .start(handler)
            .map_err(|source| StartError::Listener { source })?;
        abandon.disarm();

        let handle = ServerHandle {
            generation,
            local_addr,
            snapshot_dir: settings.snapshot_dir,
            log_dir: settings.log_dir,
        };
        let readiness = config.readiness_artifact.as_ref().and_then(|artifact| {
            self.watch_readiness(local_addr, artifact.clone(), config.readiness_deadline)
        });
        Ok(RunningServer {
            handle,
            engine,
            listener,
            storage,
            readiness,
        })
    }

    fn watch_readiness(
        &self,
        local_addr: SocketAddr,
        artifact: PathBuf,
        deadline: Option<Duration>,
    ) -> Option<ReadinessWait> {
        let address = probe_address(local_addr);
        let reporter = Arc::clone(&self.reporter);
        let policy = ReadinessPolicy::with_deadline(deadline);
        let spawned = await_ready(address, policy, move |outcome| match outcome {
            Ok(_) => match write_artifact(&artifact) {
                Ok(()) => reporter.server_ready(address, &artifact),
                Err(error) => reporter.artifact_failed(&artifact, &error),
            },
            Err(ReadinessError::Cancelled { .. }) => {}
            Err(error) => reporter.readiness_failed(error),
        });
        match spawned {
            Ok(wait) => Some(wait),
            Err(error) => {
                warn!(
                    target: CONTROLLER_TARGET,
                    error = %error,
                    "failed to spawn readiness wait; no artifact will be written"
                );
                None
            }
        }
    }

    /// Stops the server and releases its storage.
    ///
    /// Safe to call repeatedly and on a controller that never started.
    /// The readiness wait is joined, so no artifact appears after return.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.state = LifecycleState::Stopped;
        let Some(running) = inner.running.take() else {
            return;
        };
        let address = running.handle.local_addr;
        for error in running.shutdown() {
            warn!(
                target: CONTROLLER_TARGET,
                error = %error,
                "error while closing embedded server"
            );
            self.reporter.shutdown_failed(&error);
        }
        info!(
            target: CONTROLLER_TARGET,
            address = %address,
            "embedded server closed"
        );
        self.reporter.server_stopped(address);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P> Drop for ServerController<P>
where
    P: EngineProvider,
{
    fn drop(&mut self) {
        self.close();
    }
}

fn checkpoint(interrupt: &CancellationToken) -> Result<(), StartError> {
    if interrupt.is_cancelled() {
        Err(StartError::Interrupted)
    } else {
        Ok(())
    }
}

/// Force-stops an engine whose start attempt is abandoned.
///
/// Storage and the bound listener need no guard; dropping them removes
/// the root and closes the socket.
struct AbandonGuard {
    engine: Option<Arc<dyn CoordinationEngine>>,
}

impl AbandonGuard {
    const fn new(engine: Arc<dyn CoordinationEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    fn disarm(mut self) {
        self.engine = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        if let Err(error) = engine.shutdown(ShutdownMode::Forced) {
            warn!(
                target: CONTROLLER_TARGET,
                error = %error,
                "engine failed to stop after an abandoned start"
            );
        }
    }
}

struct RunningServer {
    handle: ServerHandle,
    engine: Arc<dyn CoordinationEngine>,
    listener: ListenerHandle,
    storage: EphemeralStorage,
    readiness: Option<ReadinessWait>,
}

impl RunningServer {
    /// Tears the run down engine first, collecting every failure.
    fn shutdown(self) -> Vec<ShutdownError> {
        let Self {
            engine,
            listener,
            storage,
            readiness,
            ..
        } = self;
        let mut errors = Vec::new();

        if let Some(wait) = &readiness {
            wait.cancel();
        }
        if let Err(source) = engine.shutdown(ShutdownMode::Graceful) {
            errors.push(ShutdownError::Engine { source });
        }
        listener.shutdown();
        if let Err(source) = listener.join() {
            errors.push(ShutdownError::Listener { source });
        }
        if let Some(wait) = readiness {
            match wait.join() {
                Err(ReadinessError::ThreadPanic) => warn!(
                    target: CONTROLLER_TARGET,
                    "readiness thread panicked"
                ),
                outcome => debug!(
                    target: CONTROLLER_TARGET,
                    ready = outcome.is_ok(),
                    "readiness wait joined"
                ),
            }
        }
        if let Err(error) = release_storage(storage) {
            errors.push(error);
        }
        errors
    }
}

fn release_storage(storage: EphemeralStorage) -> Result<(), ShutdownError> {
    let path = storage.root().to_path_buf();
    storage.release().map_err(|source| {
        warn!(
            target: CONTROLLER_TARGET,
            root = %path.display(),
            error = %source,
            "failed to remove storage root"
        );
        ShutdownError::Storage { path, source }
    })
}

/// Address the readiness probe dials; wildcard binds are probed on loopback.
fn probe_address(bound: SocketAddr) -> SocketAddr {
    let ip = match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, bound.port())
}

/// Creates the empty readiness marker, adding parent directories as needed.
///
/// The marker is persisted from a temporary sibling so its appearance is
/// atomic for readers polling the path.
fn write_artifact(path: &Path) -> io::Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory)?;
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("ensemble-ready");
    let file = Builder::new().prefix(prefix).tempfile_in(directory)?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    #[case("0.0.0.0:2181", "127.0.0.1:2181")]
    #[case("[::]:2181", "[::1]:2181")]
    #[case("127.0.0.1:2181", "127.0.0.1:2181")]
    #[case("192.0.2.7:2181", "192.0.2.7:2181")]
    fn wildcard_binds_are_probed_on_loopback(#[case] bound: &str, #[case] expected: &str) {
        let bound: SocketAddr = bound.parse().expect("bound address");
        let expected: SocketAddr = expected.parse().expect("expected address");
        assert_eq!(probe_address(bound), expected);
    }

    #[rstest]
    fn artifact_parents_are_created_on_demand() {
        let dir = TempDir::new().expect("temp dir");
        let artifact = dir.path().join("nested").join("deeper").join("ready.flag");
        write_artifact(&artifact).expect("write artifact");
        let metadata = fs::metadata(&artifact).expect("artifact metadata");
        assert!(metadata.is_file());
        assert_eq!(metadata.len(), 0);
    }

    #[rstest]
    fn existing_artifact_is_replaced() {
        let dir = TempDir::new().expect("temp dir");
        let artifact = dir.path().join("ready.flag");
        fs::write(&artifact, b"stale").expect("seed artifact");
        write_artifact(&artifact).expect("write artifact");
        assert_eq!(fs::metadata(&artifact).expect("metadata").len(), 0);
    }

    #[rstest]
    fn artifact_under_a_file_fails() {
        let dir = TempDir::new().expect("temp dir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").expect("seed blocker");
        assert!(write_artifact(&blocker.join("ready.flag")).is_err());
    }
}
