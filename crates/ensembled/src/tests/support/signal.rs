//! Shutdown signal triggered by tests instead of the operating system.

use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::host::{ShutdownSignal, SignalError};

const WAIT_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct TestShutdownSignal {
    token: CancellationToken,
}

impl TestShutdownSignal {
    pub fn trigger(&self) {
        self.token.cancel();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<(), SignalError> {
        while !self.token.wait_timeout(WAIT_SLICE) {}
        Ok(())
    }
}
