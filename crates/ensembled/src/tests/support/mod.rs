//! Test harness utilities for the controller and host behavioural suites.

mod engine;
mod host_world;
mod reporter;
mod signal;
mod world;

pub use engine::ScriptedEngineProvider;
pub use host_world::HostWorld;
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use signal::TestShutdownSignal;
pub use world::{
    LifecycleWorld, POLL_INTERVAL, StepResult, WAIT_TIMEOUT, round_trip, storage_roots,
    test_server_config, wait_for_file, world,
};
