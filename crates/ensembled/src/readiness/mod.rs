//! Readiness detection for the embedded server.
//!
//! Binding the client port only proves the process is up. The server is
//! considered ready once a client round-trip succeeds, so the prober keeps
//! issuing [`probe`] attempts with bounded exponential backoff until one
//! succeeds, an optional deadline passes, or the wait is cancelled. The
//! wait runs on its own thread so the caller is never blocked.

mod probe;

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::cancel::CancellationToken;

pub use self::probe::{ProbeError, probe};

const READINESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::readiness");

/// Tuning knobs for a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Give up after this long; `None` waits until cancelled.
    pub deadline: Option<Duration>,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Ceiling for the delay between attempts.
    pub max_backoff: Duration,
    /// Connect and IO timeout of a single attempt.
    pub probe_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            deadline: Some(Duration::from_secs(60)),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
        }
    }
}

impl ReadinessPolicy {
    /// Default policy with the supplied deadline.
    #[must_use]
    pub fn with_deadline(deadline: Option<Duration>) -> Self {
        Self {
            deadline,
            ..Self::default()
        }
    }
}

/// Outcomes of a readiness wait other than success.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// The deadline passed before any round-trip succeeded.
    #[error("server at {address} not ready after {waited:?} ({attempts} attempts)")]
    Timeout {
        /// Probed address.
        address: SocketAddr,
        /// Time spent waiting.
        waited: Duration,
        /// Number of probes issued.
        attempts: u32,
        /// Failure of the final probe.
        #[source]
        last_error: Option<ProbeError>,
    },
    /// The wait was cancelled, usually because the server is closing.
    #[error("readiness wait for {address} cancelled")]
    Cancelled {
        /// Probed address.
        address: SocketAddr,
    },
    /// The readiness thread panicked.
    #[error("readiness thread panicked")]
    ThreadPanic,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    const fn new(initial: Duration, max: Duration) -> Self {
        Self { next: initial, max }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next.min(self.max);
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }
}

/// Blocks until `address` answers a round-trip, the deadline passes, or
/// `cancel` is triggered. Returns the time it took to become ready.
pub fn wait_until_ready(
    address: SocketAddr,
    policy: &ReadinessPolicy,
    cancel: &CancellationToken,
) -> Result<Duration, ReadinessError> {
    let started = Instant::now();
    let deadline = policy.deadline.map(|limit| started + limit);
    let mut backoff = Backoff::new(policy.initial_backoff, policy.max_backoff);
    let mut attempts = 0_u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ReadinessError::Cancelled { address });
        }
        attempts = attempts.saturating_add(1);
        let timeout = remaining(deadline).map_or(policy.probe_timeout, |left| {
            left.min(policy.probe_timeout).max(Duration::from_millis(1))
        });
        let last_error = match probe(address, timeout) {
            Ok(()) if cancel.is_cancelled() => return Err(ReadinessError::Cancelled { address }),
            Ok(()) => return Ok(started.elapsed()),
            Err(error) => {
                trace!(
                    target: READINESS_TARGET,
                    address = %address,
                    attempt = attempts,
                    not_listening = error.is_not_listening(),
                    error = %error,
                    "server not ready yet"
                );
                error
            }
        };

        let mut delay = backoff.next_delay();
        if let Some(left) = remaining(deadline) {
            if left.is_zero() {
                return Err(ReadinessError::Timeout {
                    address,
                    waited: started.elapsed(),
                    attempts,
                    last_error: Some(last_error),
                });
            }
            delay = delay.min(left);
        }
        if cancel.wait_timeout(delay) {
            return Err(ReadinessError::Cancelled { address });
        }
    }
}

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|at| at.saturating_duration_since(Instant::now()))
}

/// Background readiness wait started by [`await_ready`].
#[derive(Debug)]
pub struct ReadinessWait {
    cancel: CancellationToken,
    handle: thread::JoinHandle<Result<Duration, ReadinessError>>,
}

impl ReadinessWait {
    /// Asks the wait to stop at its next attempt or backoff.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the wait and its continuation have completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the background thread and returns its outcome.
    pub fn join(self) -> Result<Duration, ReadinessError> {
        self.handle
            .join()
            .map_err(|_| ReadinessError::ThreadPanic)?
    }
}

/// Starts waiting for `address` on a dedicated thread.
///
/// `on_complete` runs on that thread with the outcome once the wait ends,
/// before [`ReadinessWait::join`] returns. A wait cancelled after its last
/// successful probe reports [`ReadinessError::Cancelled`].
pub fn await_ready<F>(
    address: SocketAddr,
    policy: ReadinessPolicy,
    on_complete: F,
) -> std::io::Result<ReadinessWait>
where
    F: FnOnce(&Result<Duration, ReadinessError>) + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = thread::Builder::new()
        .name("ensemble-readiness".to_owned())
        .spawn(move || {
            let outcome = wait_until_ready(address, &policy, &token);
            match &outcome {
                Ok(elapsed) => {
                    info!(
                        target: READINESS_TARGET,
                        address = %address,
                        elapsed_ms = elapsed.as_millis(),
                        "server answered first round-trip"
                    );
                }
                Err(error @ ReadinessError::Timeout { .. }) => {
                    warn!(
                        target: READINESS_TARGET,
                        address = %address,
                        error = %error,
                        "gave up waiting for server readiness"
                    );
                }
                Err(error) => {
                    debug!(
                        target: READINESS_TARGET,
                        address = %address,
                        error = %error,
                        "readiness wait ended"
                    );
                }
            }
            on_complete(&outcome);
            outcome
        })?;
    Ok(ReadinessWait { cancel, handle })
}
