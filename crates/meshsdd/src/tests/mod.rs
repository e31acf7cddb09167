//! Test suites for the supervisor daemon.

mod process_behaviour;
pub(crate) mod support;
