//! Process lifecycle: daemonisation, singleton lock, PID and health files,
//! and the launch sequence that runs the supervisor.

pub(crate) mod daemonizer;
mod errors;
pub(crate) mod files;
mod guard;
pub(crate) mod launch;

pub use daemonizer::{DaemonizeError, Daemonizer, SystemDaemonizer};
pub use errors::LaunchError;
pub use launch::{LaunchMode, run_daemon};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
