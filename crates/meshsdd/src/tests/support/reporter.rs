//! Test double for [`HealthReporter`] that records structured events for
//! assertions.

use std::path::Path;
use std::sync::Mutex;

use meshsd_config::Config;

use crate::bootstrap::BootstrapError;
use crate::engine::{BrowserId, EngineError, EngineId, EngineState};
use crate::health::HealthReporter;
use crate::registry::RegistryError;
use crate::supervisor::SupervisorOutcome;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    EngineCreating,
    EngineState(EngineId, EngineState),
    BrowserCreated(BrowserId),
    BrowserFailed(String),
    RecycleStarted,
    DumpWritten,
    DumpFailed(String),
    StoppedGracefully,
    StoppedFatally(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub(crate) fn count(&self, event: &HealthEvent) -> usize {
        self.events()
            .iter()
            .filter(|recorded| *recorded == event)
            .count()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn engine_creating(&self) {
        self.record(HealthEvent::EngineCreating);
    }

    fn engine_state_changed(&self, engine: EngineId, state: EngineState) {
        self.record(HealthEvent::EngineState(engine, state));
    }

    fn browser_created(&self, browser: BrowserId) {
        self.record(HealthEvent::BrowserCreated(browser));
    }

    fn browser_failed(&self, error: &EngineError) {
        self.record(HealthEvent::BrowserFailed(error.to_string()));
    }

    fn recycle_started(&self) {
        self.record(HealthEvent::RecycleStarted);
    }

    fn dump_written(&self, _destination: &Path) {
        self.record(HealthEvent::DumpWritten);
    }

    fn dump_failed(&self, error: &RegistryError) {
        self.record(HealthEvent::DumpFailed(error.to_string()));
    }

    fn supervisor_stopped(&self, outcome: &SupervisorOutcome) {
        self.record(match outcome {
            SupervisorOutcome::Graceful => HealthEvent::StoppedGracefully,
            SupervisorOutcome::Fatal(error) => HealthEvent::StoppedFatally(error.to_string()),
        });
    }
}
