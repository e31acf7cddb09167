//! Structured health reporting for daemon lifecycle events.

use std::path::Path;
use std::sync::Arc;

use meshsd_config::Config;

use crate::bootstrap::BootstrapError;
use crate::engine::{BrowserId, EngineError, EngineId, EngineState};
use crate::registry::RegistryError;
use crate::supervisor::SupervisorOutcome;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked before an engine is created.
    fn engine_creating(&self);

    /// Invoked when the live engine reports a state.
    fn engine_state_changed(&self, engine: EngineId, state: EngineState);

    /// Invoked after a type browser starts.
    fn browser_created(&self, browser: BrowserId);

    /// Invoked when a type browser cannot be created.
    fn browser_failed(&self, error: &EngineError);

    /// Invoked when the restart timer recycles the responder.
    fn recycle_started(&self);

    /// Invoked after a snapshot dump succeeds.
    fn dump_written(&self, destination: &Path);

    /// Invoked when a snapshot dump fails.
    fn dump_failed(&self, error: &RegistryError);

    /// Invoked once the supervisor stops.
    fn supervisor_stopped(&self, outcome: &SupervisorOutcome);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn engine_creating(&self) {
        (**self).engine_creating();
    }

    fn engine_state_changed(&self, engine: EngineId, state: EngineState) {
        (**self).engine_state_changed(engine, state);
    }

    fn browser_created(&self, browser: BrowserId) {
        (**self).browser_created(browser);
    }

    fn browser_failed(&self, error: &EngineError) {
        (**self).browser_failed(error);
    }

    fn recycle_started(&self) {
        (**self).recycle_started();
    }

    fn dump_written(&self, destination: &Path) {
        (**self).dump_written(destination);
    }

    fn dump_failed(&self, error: &RegistryError) {
        (**self).dump_failed(error);
    }

    fn supervisor_stopped(&self, outcome: &SupervisorOutcome) {
        (**self).supervisor_stopped(outcome);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.management_socket(),
            runtime_dir = %config.runtime_dir(),
            restart_interval_secs = config.restart_interval_secs,
            browse_domain = config.browse_domain(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn engine_creating(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "engine_creating",
            "creating discovery engine"
        );
    }

    fn engine_state_changed(&self, engine: EngineId, state: EngineState) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "engine_state_changed",
            %engine,
            %state,
            "discovery engine state changed"
        );
    }

    fn browser_created(&self, browser: BrowserId) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "browser_created",
            %browser,
            "service type browser created"
        );
    }

    fn browser_failed(&self, error: &EngineError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "browser_failed",
            error = %error,
            "failed to create service type browser"
        );
    }

    fn recycle_started(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "recycle_started",
            "recycling discovery engine"
        );
    }

    fn dump_written(&self, destination: &Path) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "dump_written",
            file = %destination.display(),
            "service snapshot dumped"
        );
    }

    fn dump_failed(&self, error: &RegistryError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "dump_failed",
            error = %error,
            "service snapshot dump failed"
        );
    }

    fn supervisor_stopped(&self, outcome: &SupervisorOutcome) {
        match outcome {
            SupervisorOutcome::Graceful => tracing::info!(
                target: HEALTH_TARGET,
                event = "supervisor_stopped",
                outcome = "graceful",
                "supervisor stopped"
            ),
            SupervisorOutcome::Fatal(error) => tracing::error!(
                target: HEALTH_TARGET,
                event = "supervisor_stopped",
                outcome = "fatal",
                error = %error,
                "supervisor stopped"
            ),
        }
    }
}
