//! Test doubles shared by the unit and behavioural suites.

mod config_loader;
mod daemonizer;
mod engine;
mod reporter;
mod signals;

pub(crate) use config_loader::{FailingConfigLoader, TestConfigLoader};
pub(crate) use daemonizer::TestDaemonizer;
pub(crate) use engine::{EngineCall, RecordingEngine};
pub(crate) use reporter::{HealthEvent, RecordingHealthReporter};
pub(crate) use signals::TestSignalSource;
