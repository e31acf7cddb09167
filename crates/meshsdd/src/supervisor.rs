//! Responder supervisor: owns the engine and browser handles and drives
//! their lifecycle from the event loop.
//!
//! Every transition runs on the loop thread, either from the start timer,
//! the restart timer, a dispatch-cycle hook or engine readiness. Engine
//! notifications are drained after each of those, so state reports raised
//! inside an engine call are handled before the loop blocks again.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mio::Token;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::engine::{
    BrowserHandle, BrowserId, DiscoveryEngine, EngineConfig, EngineError, EngineEvent,
    EngineEvents, EngineHandle, EngineId, EngineState,
};
use crate::event_loop::{EventLoop, EventLoopError, IoRegistry, LoopContext, Scheduler, TimerId};
use crate::health::HealthReporter;
use crate::registry::ServiceRegistry;
use crate::restart::Recyclable;
use crate::signals::{PendingSignals, SIGNALS_TARGET};

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Lifecycle of the supervised responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    /// Created, waiting for the start timer.
    Unstarted,
    /// An engine exists but has not reported running.
    Starting,
    /// The engine is running.
    Running,
    /// The engine reported a transient problem.
    Degraded,
    /// Terminal; the loop has been asked to quit.
    Stopped,
}

/// Fatal conditions that stop the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Creating an engine failed.
    #[error("failed to create discovery engine: {source}")]
    EngineCreate {
        /// Engine error.
        #[source]
        source: EngineError,
    },
    /// The live engine reported an unrecoverable failure.
    #[error("{engine} reported an unrecoverable failure")]
    EngineFailure {
        /// Failed engine.
        engine: EngineId,
    },
}

/// How the supervisor stopped.
#[derive(Debug)]
pub enum SupervisorOutcome {
    /// A termination signal was handled.
    Graceful,
    /// A fatal engine condition ended supervision.
    Fatal(SupervisorError),
}

/// Owns the engine and browser handles and reacts to engine, timer and
/// signal input.
pub struct Supervisor<E, R> {
    engine: E,
    registry: R,
    config: EngineConfig,
    events: EngineEvents,
    signals: PendingSignals,
    reporter: Arc<dyn HealthReporter>,
    output_file: PathBuf,
    state: SupervisorState,
    engine_handle: Option<EngineHandle>,
    browser: Option<BrowserHandle>,
    outcome: Option<SupervisorOutcome>,
}

impl<E, R> Supervisor<E, R>
where
    E: DiscoveryEngine,
    R: ServiceRegistry,
{
    /// Builds an unstarted supervisor.
    pub fn new(
        engine: E,
        registry: R,
        config: EngineConfig,
        signals: PendingSignals,
        reporter: Arc<dyn HealthReporter>,
        output_file: PathBuf,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
            events: EngineEvents::new(),
            signals,
            reporter,
            output_file,
            state: SupervisorState::Unstarted,
            engine_handle: None,
            browser: None,
            outcome: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Whether an engine handle is held.
    #[must_use]
    pub fn has_engine(&self) -> bool {
        self.engine_handle.is_some()
    }

    /// Whether a browser handle is held.
    #[must_use]
    pub fn has_browser(&self) -> bool {
        self.browser.is_some()
    }

    /// The engine collaborator.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The registry collaborator.
    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// How supervision ended, once it has.
    #[must_use]
    pub fn outcome(&self) -> Option<&SupervisorOutcome> {
        self.outcome.as_ref()
    }

    /// Creates the first engine. Runs once; later calls are ignored.
    pub fn start(&mut self, scheduler: &mut Scheduler<'_, Self>) {
        if self.state != SupervisorState::Unstarted {
            debug!(target: SUPERVISOR_TARGET, state = ?self.state, "start ignored");
            return;
        }
        self.create_engine(scheduler);
        self.pump_events(scheduler);
    }

    /// Tears down the browser and engine, then creates a fresh engine.
    ///
    /// Ignored once the supervisor has stopped, the loop is terminating or
    /// a termination signal is waiting for the next cycle.
    pub fn recycle(&mut self, scheduler: &mut Scheduler<'_, Self>) {
        if self.state == SupervisorState::Stopped
            || scheduler.is_quitting()
            || self.signals.quit_pending()
        {
            debug!(target: SUPERVISOR_TARGET, "recycle ignored; supervisor stopping");
            return;
        }
        self.reporter.recycle_started();
        self.release(scheduler.io());
        self.create_engine(scheduler);
        self.pump_events(scheduler);
    }

    /// Releases the browser and then the engine. Safe to call repeatedly.
    pub fn teardown(&mut self, io: &mut IoRegistry<'_>) {
        self.release(io);
        self.state = SupervisorState::Stopped;
    }

    /// Consumes the supervisor, reporting how it ended.
    pub fn finish(mut self) -> Result<(), SupervisorError> {
        match self.outcome.take() {
            Some(SupervisorOutcome::Fatal(error)) => Err(error),
            Some(SupervisorOutcome::Graceful) | None => Ok(()),
        }
    }

    fn release(&mut self, io: &mut IoRegistry<'_>) {
        if let Some(browser) = self.browser.take() {
            debug!(target: SUPERVISOR_TARGET, browser = %browser.id(), "destroying browser");
            self.engine.destroy_type_browser(browser);
        }
        if let Some(handle) = self.engine_handle.take() {
            debug!(target: SUPERVISOR_TARGET, engine = %handle.id(), "destroying engine");
            self.engine.destroy_engine(handle, io);
        }
    }

    fn create_engine(&mut self, scheduler: &mut Scheduler<'_, Self>) {
        self.state = SupervisorState::Starting;
        self.reporter.engine_creating();
        match self
            .engine
            .create_engine(&self.config, scheduler.io(), self.events.sender())
        {
            Ok(handle) => {
                info!(target: SUPERVISOR_TARGET, engine = %handle.id(), "engine created");
                self.engine_handle = Some(handle);
            }
            Err(source) => self.stop_fatally(SupervisorError::EngineCreate { source }, scheduler),
        }
    }

    fn pump_events(&mut self, scheduler: &mut Scheduler<'_, Self>) {
        while self.state != SupervisorState::Stopped {
            let Some(event) = self.events.next_event() else {
                return;
            };
            match event {
                EngineEvent::State { engine, state } => self.on_state(engine, state, scheduler),
                EngineEvent::TypeFound {
                    browser,
                    service_type,
                    domain,
                } => {
                    if self.is_live_browser(browser) {
                        self.registry.service_type_found(&service_type, &domain);
                    }
                }
                EngineEvent::TypeRemoved {
                    browser,
                    service_type,
                    domain,
                } => {
                    if self.is_live_browser(browser) {
                        self.registry.service_type_removed(&service_type, &domain);
                    }
                }
            }
        }
    }

    fn is_live_browser(&self, id: BrowserId) -> bool {
        let live = self.browser.as_ref().is_some_and(|browser| browser.id() == id);
        if !live {
            debug!(target: SUPERVISOR_TARGET, browser = %id, "ignoring result from stale browser");
        }
        live
    }

    fn on_state(
        &mut self,
        engine: EngineId,
        state: EngineState,
        scheduler: &mut Scheduler<'_, Self>,
    ) {
        if self.engine_handle.as_ref().map(EngineHandle::id) != Some(engine) {
            debug!(target: SUPERVISOR_TARGET, %engine, %state, "ignoring report from stale engine");
            return;
        }
        self.reporter.engine_state_changed(engine, state);
        match state {
            EngineState::Running => self.enter_running(),
            EngineState::Collision => {
                warn!(target: SUPERVISOR_TARGET, %engine, "host name collision; waiting for next recycle");
                self.degrade();
            }
            EngineState::Registering => {
                warn!(target: SUPERVISOR_TARGET, %engine, "engine re-registering records; waiting for next recycle");
                self.degrade();
            }
            EngineState::Invalid => {
                warn!(target: SUPERVISOR_TARGET, %engine, "engine reported an invalid state; waiting for next recycle");
                self.degrade();
            }
            EngineState::Failure => {
                self.stop_fatally(SupervisorError::EngineFailure { engine }, scheduler);
            }
        }
    }

    fn enter_running(&mut self) {
        self.state = SupervisorState::Running;
        if self.browser.is_some() {
            return;
        }
        let Some(handle) = self.engine_handle.as_ref() else {
            return;
        };
        match self
            .engine
            .create_type_browser(handle, self.config.browse_domain())
        {
            Ok(browser) => {
                self.reporter.browser_created(browser.id());
                self.browser = Some(browser);
            }
            Err(error) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    error = %error,
                    "continuing without a service type browser"
                );
                self.reporter.browser_failed(&error);
            }
        }
    }

    fn degrade(&mut self) {
        if let Some(browser) = self.browser.take() {
            self.engine.destroy_type_browser(browser);
        }
        self.state = SupervisorState::Degraded;
    }

    fn stop_fatally(&mut self, error: SupervisorError, scheduler: &mut Scheduler<'_, Self>) {
        error!(target: SUPERVISOR_TARGET, error = %error, "supervisor stopping after fatal error");
        self.stop(SupervisorOutcome::Fatal(error), scheduler);
    }

    fn stop(&mut self, outcome: SupervisorOutcome, scheduler: &mut Scheduler<'_, Self>) {
        if self.state == SupervisorState::Stopped {
            scheduler.quit();
            return;
        }
        self.state = SupervisorState::Stopped;
        self.reporter.supervisor_stopped(&outcome);
        self.outcome = Some(outcome);
        scheduler.quit();
    }

    fn dump(&self) {
        match self.registry.dump_snapshot(&self.output_file) {
            Ok(()) => self.reporter.dump_written(&self.output_file),
            Err(error) => self.reporter.dump_failed(&error),
        }
    }
}

impl<E, R> Supervisor<E, R>
where
    E: DiscoveryEngine + 'static,
    R: ServiceRegistry + 'static,
{
    /// Arms the zero-delay timer that creates the first engine once the
    /// loop is running.
    pub fn schedule_start(
        event_loop: &mut EventLoop<Self>,
    ) -> Result<TimerId, EventLoopError> {
        event_loop.schedule_once(Duration::ZERO, |supervisor: &mut Self, scheduler| {
            supervisor.start(scheduler);
        })
    }
}

impl<E, R> LoopContext for Supervisor<E, R>
where
    E: DiscoveryEngine,
    R: ServiceRegistry,
{
    fn on_cycle(&mut self, scheduler: &mut Scheduler<'_, Self>) {
        let requests = self.signals.take();
        if requests.dump {
            info!(target: SIGNALS_TARGET, state = ?self.state, "dump requested");
            self.dump();
        }
        if requests.quit {
            info!(target: SIGNALS_TARGET, state = ?self.state, "termination requested");
            self.stop(SupervisorOutcome::Graceful, scheduler);
        }
        self.pump_events(scheduler);
    }

    fn on_ready(&mut self, token: Token, scheduler: &mut Scheduler<'_, Self>) {
        self.engine.process_io(token);
        self.pump_events(scheduler);
    }
}

impl<E, R> Recyclable for Supervisor<E, R>
where
    E: DiscoveryEngine,
    R: ServiceRegistry,
{
    fn recycle(&mut self, scheduler: &mut Scheduler<'_, Self>) {
        Supervisor::recycle(self, scheduler);
    }
}
