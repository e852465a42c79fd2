//! Host process test world shared across BDD scenarios.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tempfile::TempDir;

use ensemble_config::Config;

use crate::health::HealthReporter;
use crate::host::{HostDeps, HostError, StaticConfigLoader, run_server_with};

use super::engine::ScriptedEngineProvider;
use super::reporter::RecordingHealthReporter;
use super::signal::TestShutdownSignal;
use super::world::{POLL_INTERVAL, StepResult, WAIT_TIMEOUT, storage_roots};

pub struct HostWorld {
    config: Config,
    pub reporter: Arc<RecordingHealthReporter>,
    pub provider: ScriptedEngineProvider,
    shutdown: TestShutdownSignal,
    handle: Option<thread::JoinHandle<Result<(), HostError>>>,
    result: Option<Result<(), HostError>>,
    blocker: Option<TcpListener>,
    storage_dir: TempDir,
    artifact_dir: TempDir,
}

impl HostWorld {
    #[must_use]
    pub fn new() -> Self {
        let storage_dir = TempDir::new().expect("storage temp dir");
        let artifact_dir = TempDir::new().expect("artifact temp dir");
        let config = Config {
            storage_dir: Some(storage_dir.path().to_path_buf()),
            tick_time_ms: 50,
            ready_timeout_ms: 5_000,
            log_filter: "warn".to_owned(),
            ..Config::default()
        };
        Self {
            config,
            reporter: Arc::new(RecordingHealthReporter::default()),
            provider: ScriptedEngineProvider::default(),
            shutdown: TestShutdownSignal::default(),
            handle: None,
            result: None,
            blocker: None,
            storage_dir,
            artifact_dir,
        }
    }

    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.artifact_dir.path().join("ready.flag")
    }

    /// Points the host at the readiness artifact path.
    pub fn enable_artifact(&mut self) {
        self.config.ready_flag_file = Some(self.artifact_path());
    }

    pub fn occupy_port(&mut self) -> StepResult {
        let blocker = TcpListener::bind("127.0.0.1:0").map_err(|error| error.to_string())?;
        self.config.port = blocker
            .local_addr()
            .map_err(|error| error.to_string())?
            .port();
        self.blocker = Some(blocker);
        Ok(())
    }

    pub fn run_background(&mut self) -> StepResult {
        if self.handle.is_some() {
            return Err("host already running".to_owned());
        }
        let loader = StaticConfigLoader::new(self.config.clone());
        let reporter = self.reporter.clone() as Arc<dyn HealthReporter>;
        let provider = self.provider.clone();
        let shutdown = self.shutdown.clone();
        self.handle = Some(thread::spawn(move || {
            run_server_with(HostDeps {
                loader: &loader,
                reporter,
                provider,
                shutdown: &shutdown,
            })
        }));
        Ok(())
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Waits for the host thread to exit and records its result.
    pub fn join(&mut self) -> StepResult {
        let handle = self.handle.take().ok_or("host was not started")?;
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                self.shutdown.trigger();
                return Err("host did not exit in time".to_owned());
            }
            thread::sleep(POLL_INTERVAL);
        }
        let result = handle
            .join()
            .map_err(|_| "host thread panicked".to_owned())?;
        self.result = Some(result);
        Ok(())
    }

    #[must_use]
    pub fn result(&self) -> Option<&Result<(), HostError>> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn storage_roots(&self) -> Vec<PathBuf> {
        storage_roots(self.storage_dir.path())
    }
}

impl Default for HostWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HostWorld {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
