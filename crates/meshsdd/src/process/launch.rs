//! Launch sequencing: bootstrap, process guard, event loop and supervisor.

use std::sync::Arc;

use tracing::info;

use meshsd_config::{Config, RuntimePaths};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::engine::{DiscoveryEngine, MulticastEngine};
use crate::event_loop::EventLoop;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::registry::{InMemoryRegistry, ServiceRegistry};
use crate::restart::RestartTimer;
use crate::signals::{PendingSignals, SignalSource, SystemSignalSource};
use crate::supervisor::Supervisor;

use super::PROCESS_TARGET;
use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::{HealthState, ProcessGuard};

/// Launch mode for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Remain attached to the terminal; primarily used for debugging and tests.
    Foreground,
}

impl LaunchMode {
    /// Mode selected by the `foreground` setting.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        if config.foreground() {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}

/// Process-level collaborators needed to control daemon lifecycle.
pub(crate) struct ProcessControl<D, S> {
    pub(crate) daemonizer: D,
    pub(crate) signals: S,
}

/// Service dependencies required to construct the daemon runtime.
pub(crate) struct ServiceDeps<L, E, R> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) engine: E,
    pub(crate) registry: R,
}

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, D, S, E, R> {
    pub(crate) process: ProcessControl<D, S>,
    pub(crate) services: ServiceDeps<L, E, R>,
}

/// Runs the daemon using the production collaborators.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        process: ProcessControl {
            daemonizer: SystemDaemonizer::new(),
            signals: SystemSignalSource,
        },
        services: ServiceDeps {
            loader: SystemConfigLoader,
            reporter: Arc::new(StructuredHealthReporter::new()),
            engine: MulticastEngine::new(),
            registry: InMemoryRegistry::new(),
        },
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, D, S, E, R>(
    plan: LaunchPlan<L, D, S, E, R>,
) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    D: Daemonizer,
    S: SignalSource,
    E: DiscoveryEngine + 'static,
    R: ServiceRegistry + 'static,
{
    let LaunchPlan { process, services } = plan;
    let ProcessControl {
        daemonizer,
        signals,
    } = process;
    let ServiceDeps {
        loader,
        reporter,
        engine,
        registry,
    } = services;

    let daemon = bootstrap_with(&loader, reporter.as_ref())?;
    let config = daemon.config();
    let mode = LaunchMode::from_config(config);
    info!(target: PROCESS_TARGET, ?mode, "starting daemon runtime");

    let runtime_paths = RuntimePaths::from_config(config)?;
    let mut guard = ProcessGuard::acquire(runtime_paths)?;
    if mode == LaunchMode::Background {
        daemonizer.daemonize(guard.paths())?;
    }
    guard.write_pid(std::process::id())?;
    guard.write_health(HealthState::Starting)?;

    let mut event_loop = EventLoop::new()?;
    let pending = PendingSignals::new();
    let registration = signals.install(&pending, &event_loop.wake_handle()?)?;
    let mut supervisor = Supervisor::new(
        engine,
        registry,
        daemon.engine_config().clone(),
        pending,
        Arc::clone(&reporter),
        config.output_file().as_std_path().to_path_buf(),
    );
    Supervisor::schedule_start(&mut event_loop)?;
    RestartTimer::new(daemon.restart_interval()).arm(&mut event_loop)?;

    guard.write_health(HealthState::Ready)?;
    let run = event_loop.run(&mut supervisor);
    let stopping = guard.write_health(HealthState::Stopping);
    supervisor.teardown(&mut event_loop.io());
    drop(registration);
    drop(event_loop);

    run?;
    stopping?;
    supervisor.finish()?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
