//! BDD test world for controller lifecycle scenarios.

use std::cell::RefCell;
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rstest::fixture;
use tempfile::TempDir;

use crate::cancel::CancellationToken;
use crate::controller::{
    ConfigurationError, LifecycleState, ServerConfig, ServerController, ServerHandle, StartError,
};

use super::engine::ScriptedEngineProvider;
use super::reporter::RecordingHealthReporter;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

pub type StepResult = Result<(), String>;

/// Builds a server config for tests: loopback, any port, fast ticks, and
/// storage under `storage_dir`.
#[must_use]
pub fn test_server_config(storage_dir: &Path) -> ServerConfig {
    ServerConfig {
        tick_interval: Duration::from_millis(50),
        readiness_deadline: Some(WAIT_TIMEOUT),
        storage_dir: Some(storage_dir.to_path_buf()),
        ..ServerConfig::default()
    }
}

/// Sends `ruok` to `address` and returns the reply.
pub fn round_trip(address: SocketAddr) -> std::io::Result<String> {
    let mut stream = TcpStream::connect_timeout(&address, CLIENT_TIMEOUT)?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.write_all(b"ruok")?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply)?;
    Ok(reply)
}

/// Polls until `path` exists or the timeout passes.
#[must_use]
pub fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    path.exists()
}

/// Lists the entries left under a storage base directory.
#[must_use]
pub fn storage_roots(base: &Path) -> Vec<PathBuf> {
    fs::read_dir(base)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .collect()
        })
        .unwrap_or_default()
}

/// Scenario world shared across lifecycle steps.
pub struct LifecycleWorld {
    pub reporter: Arc<RecordingHealthReporter>,
    pub provider: ScriptedEngineProvider,
    pub controller: ServerController<ScriptedEngineProvider>,
    pub interrupt: CancellationToken,
    storage_dir: TempDir,
    artifact_dir: TempDir,
    handles: Vec<ServerHandle>,
    start_error: Option<StartError>,
    config_errors: Vec<ConfigurationError>,
    config_before: Option<ServerConfig>,
    previous_addr: Option<SocketAddr>,
    blocker: Option<TcpListener>,
}

impl LifecycleWorld {
    #[must_use]
    pub fn new() -> Self {
        let storage_dir = TempDir::new().expect("storage temp dir");
        let artifact_dir = TempDir::new().expect("artifact temp dir");
        let reporter = Arc::new(RecordingHealthReporter::default());
        let provider = ScriptedEngineProvider::default();
        let controller = ServerController::with_collaborators(
            test_server_config(storage_dir.path()),
            provider.clone(),
            reporter.clone(),
        );
        Self {
            reporter,
            provider,
            controller,
            interrupt: CancellationToken::new(),
            storage_dir,
            artifact_dir,
            handles: Vec::new(),
            start_error: None,
            config_errors: Vec::new(),
            config_before: None,
            previous_addr: None,
            blocker: None,
        }
    }

    /// Path the readiness artifact is written to, nested to exercise parent creation.
    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.artifact_dir.path().join("state").join("ready.flag")
    }

    pub fn enable_artifact(&self) -> StepResult {
        self.controller
            .configure_readiness_artifact(Some(self.artifact_path()))
            .map_err(|error| error.to_string())
    }

    /// Occupies a loopback port and points the controller at it.
    pub fn occupy_port(&mut self) -> StepResult {
        let blocker = TcpListener::bind("127.0.0.1:0").map_err(|error| error.to_string())?;
        let port = blocker
            .local_addr()
            .map_err(|error| error.to_string())?
            .port();
        self.controller
            .configure_port(port)
            .map_err(|error| error.to_string())?;
        self.blocker = Some(blocker);
        Ok(())
    }

    pub fn start(&mut self) {
        match self.controller.start_interruptible(&self.interrupt) {
            Ok(handle) => {
                self.previous_addr = Some(handle.local_addr());
                self.handles.push(handle);
                self.start_error = None;
            }
            Err(error) => self.start_error = Some(error),
        }
    }

    pub fn start_successfully(&mut self) -> StepResult {
        self.start();
        match self.start_error.take() {
            Some(error) => Err(format!("start failed: {error}")),
            None => Ok(()),
        }
    }

    pub fn close(&self) {
        self.controller.close();
    }

    pub fn reconfigure_port(&mut self, port: u16) {
        self.remember_config();
        if let Err(error) = self.controller.configure_port(port) {
            self.config_errors.push(error);
        }
    }

    pub fn clear_artifact(&mut self) {
        self.remember_config();
        if let Err(error) = self.controller.configure_readiness_artifact(None) {
            self.config_errors.push(error);
        }
    }

    fn remember_config(&mut self) {
        if self.config_before.is_none() {
            self.config_before = Some(self.controller.config());
        }
    }

    #[must_use]
    pub fn handles(&self) -> &[ServerHandle] {
        &self.handles
    }

    #[must_use]
    pub fn start_error(&self) -> Option<&StartError> {
        self.start_error.as_ref()
    }

    #[must_use]
    pub fn config_errors(&self) -> &[ConfigurationError] {
        &self.config_errors
    }

    #[must_use]
    pub fn config_before(&self) -> Option<&ServerConfig> {
        self.config_before.as_ref()
    }

    #[must_use]
    pub const fn previous_addr(&self) -> Option<SocketAddr> {
        self.previous_addr
    }

    #[must_use]
    pub fn storage_roots(&self) -> Vec<PathBuf> {
        storage_roots(self.storage_dir.path())
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.controller.state()
    }
}

impl Default for LifecycleWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[fixture]
pub fn world() -> RefCell<LifecycleWorld> {
    RefCell::new(LifecycleWorld::new())
}
