//! Single-node engine answering admin commands over the client port.

use std::collections::HashMap;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{
    CoordinationEngine, ENGINE_TARGET, EngineError, EngineProvider, EngineSettings, FourLetterWord,
    ShutdownMode,
};

const STORAGE_VERSION_DIR: &str = "version-2";
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Builds [`StandaloneEngine`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneEngineProvider;

impl EngineProvider for StandaloneEngineProvider {
    fn create(
        &self,
        settings: &EngineSettings,
    ) -> Result<Arc<dyn CoordinationEngine>, EngineError> {
        Ok(Arc::new(StandaloneEngine::new(settings.clone())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Created,
    Serving { since: Instant },
    Stopped,
}

/// Standalone engine serving the four-letter-word admin surface.
#[derive(Debug)]
pub struct StandaloneEngine {
    settings: EngineSettings,
    state: Mutex<EngineState>,
    connections: ConnectionRegistry,
    packets_received: AtomicU64,
    packets_sent: AtomicU64,
}

impl StandaloneEngine {
    /// Creates an engine that is not yet serving.
    #[must_use]
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(EngineState::Created),
            connections: ConnectionRegistry::default(),
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
        }
    }

    /// Returns true while the engine answers requests.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        matches!(self.state(), EngineState::Serving { .. })
    }

    fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn respond(&self, stream: &mut TcpStream, peer: Option<SocketAddr>) -> io::Result<()> {
        stream.set_read_timeout(Some(self.settings.max_session_timeout()))?;
        let mut command = [0_u8; 4];
        stream.read_exact(&mut command)?;
        self.packets_received.fetch_add(1, Ordering::Relaxed);

        let Some(word) = FourLetterWord::from_bytes(&command) else {
            debug!(
                target: ENGINE_TARGET,
                command = %String::from_utf8_lossy(&command),
                "closing connection after unknown command"
            );
            return Ok(());
        };
        // A shutdown racing the read wins; the client sees a closed socket.
        let EngineState::Serving { since } = self.state() else {
            return Ok(());
        };
        let reply = match word {
            FourLetterWord::Ruok => "imok".to_owned(),
            FourLetterWord::Isro => "rw".to_owned(),
            FourLetterWord::Srvr => self.summary(since),
            FourLetterWord::Stat => self.status(since, peer),
            FourLetterWord::Conf => self.configuration(),
            FourLetterWord::Envi => environment(),
        };
        stream.write_all(reply.as_bytes())?;
        stream.flush()?;
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: ENGINE_TARGET,
            command = %word,
            "answered admin command"
        );
        Ok(())
    }

    fn summary(&self, since: Instant) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "Ensemble version: {}", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(body, "Uptime: {}ms", since.elapsed().as_millis());
        let _ = writeln!(body, "Latency min/avg/max: 0/0/0");
        let _ = writeln!(
            body,
            "Received: {}",
            self.packets_received.load(Ordering::Relaxed)
        );
        let _ = writeln!(body, "Sent: {}", self.packets_sent.load(Ordering::Relaxed));
        let _ = writeln!(body, "Connections: {}", self.connections.len());
        let _ = writeln!(body, "Outstanding: 0");
        let _ = writeln!(body, "Zxid: 0x0");
        let _ = writeln!(body, "Mode: standalone");
        body
    }

    fn status(&self, since: Instant, peer: Option<SocketAddr>) -> String {
        let mut body = String::from("Clients:\n");
        if let Some(peer) = peer {
            let _ = writeln!(body, " /{peer}[0](queued=0,recved=1,sent=0)");
        }
        body.push('\n');
        body.push_str(&self.summary(since));
        body
    }

    fn configuration(&self) -> String {
        let settings = &self.settings;
        let mut body = String::new();
        let _ = writeln!(body, "clientPort={}", settings.client_port);
        let _ = writeln!(body, "dataDir={}", settings.snapshot_dir.display());
        let _ = writeln!(body, "dataLogDir={}", settings.log_dir.display());
        let _ = writeln!(body, "tickTime={}", settings.tick_time.as_millis());
        let _ = writeln!(body, "maxClientCnxns={}", settings.max_client_connections);
        let _ = writeln!(
            body,
            "minSessionTimeout={}",
            settings.min_session_timeout().as_millis()
        );
        let _ = writeln!(
            body,
            "maxSessionTimeout={}",
            settings.max_session_timeout().as_millis()
        );
        let _ = writeln!(body, "serverId=0");
        body
    }

    /// Lets in-flight replies finish, then cuts off whatever is left.
    ///
    /// Closing the read side first wakes clients that have not sent a
    /// command yet without disturbing replies already being written.
    fn drain(&self) {
        self.connections.close_all(Shutdown::Read);
        let deadline = Instant::now() + self.settings.tick_time.saturating_mul(2);
        while !self.connections.is_empty() && Instant::now() < deadline {
            thread::sleep(DRAIN_POLL);
        }
        let remaining = self.connections.close_all(Shutdown::Both);
        if remaining > 0 {
            warn!(
                target: ENGINE_TARGET,
                remaining,
                "terminated connections still open after drain window"
            );
        }
    }
}

impl CoordinationEngine for StandaloneEngine {
    fn start(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            EngineState::Serving { .. } => return Ok(()),
            EngineState::Stopped => {
                return Err(EngineError::new("engine cannot restart after shutdown"));
            }
            EngineState::Created => {}
        }
        prepare_storage(&self.settings.snapshot_dir)?;
        prepare_storage(&self.settings.log_dir)?;
        *state = EngineState::Serving {
            since: Instant::now(),
        };
        info!(
            target: ENGINE_TARGET,
            client_port = self.settings.client_port,
            tick_ms = self.settings.tick_time.as_millis(),
            snapshot_dir = %self.settings.snapshot_dir.display(),
            log_dir = %self.settings.log_dir.display(),
            "standalone engine serving"
        );
        Ok(())
    }

    fn serve(&self, mut stream: TcpStream) {
        if !self.is_serving() {
            return;
        }
        let _connection = match self.connections.register(&stream) {
            Ok(guard) => guard,
            Err(error) => {
                debug!(
                    target: ENGINE_TARGET,
                    error = %error,
                    "could not track client connection; closing it"
                );
                return;
            }
        };
        // A shutdown that swept the registry before this registration has
        // already left the serving state.
        if !self.is_serving() {
            return;
        }
        let peer = stream.peer_addr().ok();
        if let Err(error) = self.respond(&mut stream, peer) {
            debug!(
                target: ENGINE_TARGET,
                error = %error,
                "client connection ended with error"
            );
        }
    }

    fn shutdown(&self, mode: ShutdownMode) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == EngineState::Stopped {
                return Ok(());
            }
            *state = EngineState::Stopped;
        }
        match mode {
            ShutdownMode::Graceful => self.drain(),
            ShutdownMode::Forced => {
                self.connections.close_all(Shutdown::Both);
            }
        }
        info!(
            target: ENGINE_TARGET,
            %mode,
            "standalone engine stopped"
        );
        Ok(())
    }
}

/// Client connections currently being served, keyed by a local id.
///
/// Each entry is a clone of the served socket so shutdown can end
/// connections whose workers are blocked in a read.
#[derive(Debug, Default)]
struct ConnectionRegistry {
    next_id: AtomicU64,
    open: Mutex<HashMap<u64, TcpStream>>,
}

impl ConnectionRegistry {
    fn register(&self, stream: &TcpStream) -> io::Result<ConnectionGuard<'_>> {
        let tracked = stream.try_clone()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, tracked);
        Ok(ConnectionGuard { registry: self, id })
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Shuts `how` on every open connection and returns how many there were.
    fn close_all(&self, how: Shutdown) -> usize {
        let open = self.lock();
        for stream in open.values() {
            // The peer may already have gone; nothing is left to close then.
            if let Err(error) = stream.shutdown(how) {
                debug!(
                    target: ENGINE_TARGET,
                    error = %error,
                    "client connection already closed"
                );
            }
        }
        open.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct ConnectionGuard<'a> {
    registry: &'a ConnectionRegistry,
    id: u64,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

fn prepare_storage(dir: &Path) -> Result<(), EngineError> {
    let versioned = dir.join(STORAGE_VERSION_DIR);
    fs::create_dir_all(&versioned).map_err(|source| {
        EngineError::with_source(
            format!("failed to prepare storage '{}'", versioned.display()),
            source,
        )
    })
}

fn environment() -> String {
    let mut body = String::from("Environment:\n");
    let _ = writeln!(body, "ensemble.version={}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(body, "os.name={}", env::consts::OS);
    let _ = writeln!(body, "os.arch={}", env::consts::ARCH);
    if let Ok(dir) = env::current_dir() {
        let _ = writeln!(body, "user.dir={}", dir.display());
    }
    let _ = writeln!(body, "temp.dir={}", env::temp_dir().display());
    body
}
