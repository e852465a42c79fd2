//! Engine provider whose engines follow a test script.
//!
//! Engines delegate to [`StandaloneEngine`] so they serve real client
//! traffic, while the script can fail starts or shutdowns, withhold
//! replies until released, and trigger an interrupt from inside `start`.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::cancel::CancellationToken;
use crate::engine::{
    CoordinationEngine, EngineError, EngineProvider, EngineSettings, ShutdownMode,
    StandaloneEngine,
};

#[derive(Debug, Default)]
struct Script {
    fail_start: AtomicBool,
    fail_shutdown: AtomicBool,
    withhold_replies: AtomicBool,
    interrupt_on_start: Mutex<Option<CancellationToken>>,
    created: AtomicUsize,
    graceful_shutdowns: AtomicUsize,
    forced_shutdowns: AtomicUsize,
}

/// Provider building scripted engines; clones share one script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngineProvider {
    script: Arc<Script>,
}

impl ScriptedEngineProvider {
    /// Makes engine starts fail.
    pub fn fail_start(&self) {
        self.script.fail_start.store(true, Ordering::SeqCst);
    }

    /// Lets engine starts succeed again.
    pub fn allow_start(&self) {
        self.script.fail_start.store(false, Ordering::SeqCst);
    }

    /// Makes engine shutdowns report an error after stopping.
    pub fn fail_shutdown(&self) {
        self.script.fail_shutdown.store(true, Ordering::SeqCst);
    }

    /// Closes client connections without replying until released.
    pub fn withhold_replies(&self) {
        self.script.withhold_replies.store(true, Ordering::SeqCst);
    }

    /// Lets engines answer client requests again.
    pub fn release_replies(&self) {
        self.script.withhold_replies.store(false, Ordering::SeqCst);
    }

    /// Triggers `token` once an engine has started.
    pub fn interrupt_on_start(&self, token: CancellationToken) {
        *self
            .script
            .interrupt_on_start
            .lock()
            .expect("script mutex poisoned") = Some(token);
    }

    /// Number of engines created so far.
    pub fn created(&self) -> usize {
        self.script.created.load(Ordering::SeqCst)
    }

    /// Number of graceful shutdowns requested.
    pub fn graceful_shutdowns(&self) -> usize {
        self.script.graceful_shutdowns.load(Ordering::SeqCst)
    }

    /// Number of forced shutdowns requested.
    pub fn forced_shutdowns(&self) -> usize {
        self.script.forced_shutdowns.load(Ordering::SeqCst)
    }
}

impl EngineProvider for ScriptedEngineProvider {
    fn create(
        &self,
        settings: &EngineSettings,
    ) -> Result<Arc<dyn CoordinationEngine>, EngineError> {
        self.script.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedEngine {
            inner: StandaloneEngine::new(settings.clone()),
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedEngine {
    inner: StandaloneEngine,
    script: Arc<Script>,
}

impl CoordinationEngine for ScriptedEngine {
    fn start(&self) -> Result<(), EngineError> {
        if self.script.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::new("scripted start failure"));
        }
        self.inner.start()?;
        if let Some(token) = self
            .script
            .interrupt_on_start
            .lock()
            .expect("script mutex poisoned")
            .as_ref()
        {
            token.cancel();
        }
        Ok(())
    }

    fn serve(&self, stream: TcpStream) {
        if self.script.withhold_replies.load(Ordering::SeqCst) {
            return;
        }
        self.inner.serve(stream);
    }

    fn shutdown(&self, mode: ShutdownMode) -> Result<(), EngineError> {
        let counter = match mode {
            ShutdownMode::Graceful => &self.script.graceful_shutdowns,
            ShutdownMode::Forced => &self.script.forced_shutdowns,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.inner.shutdown(mode)?;
        if self.script.fail_shutdown.load(Ordering::SeqCst) {
            return Err(EngineError::new("scripted shutdown failure"));
        }
        Ok(())
    }
}
