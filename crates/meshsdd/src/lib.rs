//! Supervisor daemon for a multicast service-discovery responder on mesh
//! networks.
//!
//! Multicast delivery on ad hoc mesh links is lossy and asymmetric, so the
//! responder and its service-type browser are torn down and rebuilt on a
//! fixed cadence to make peers re-announce and re-resolve their services.
//! The crate is organised around that lifecycle:
//!
//! - [`event_loop`] owns the process's single blocking wait and dispatches
//!   timers and socket readiness on one thread.
//! - [`Supervisor`] owns the engine and browser handles and turns engine
//!   reports, restart timer fires and signals into state transitions.
//! - [`RestartTimer`] recycles the responder every interval (64 seconds by
//!   default).
//! - [`signals`] turns SIGINT, SIGTERM and SIGUSR1 into flags the loop
//!   consumes, so no work ever happens in signal context.
//! - [`engine`] defines the discovery engine boundary and ships the
//!   multicast DNS implementation used in production.
//!
//! Process concerns (configuration, telemetry, daemonisation, the PID lock
//! and health snapshots) follow the same bootstrap sequence as the rest of
//! the workspace; see [`run_daemon`].

mod bootstrap;
pub mod engine;
pub mod event_loop;
mod health;
mod process;
mod registry;
mod restart;
pub mod signals;
mod supervisor;
pub mod telemetry;

pub use bootstrap::{BootstrapError, ConfigLoader, Daemon, SystemConfigLoader, bootstrap_with};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    DaemonizeError, Daemonizer, LaunchError, LaunchMode, SystemDaemonizer, run_daemon,
};
pub use registry::{InMemoryRegistry, RegistryError, ServiceRegistry};
pub use restart::{Recyclable, RestartTimer};
pub use supervisor::{Supervisor, SupervisorError, SupervisorOutcome, SupervisorState};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
