//! Daemonizer double that counts invocations instead of forking.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use meshsd_config::RuntimePaths;

use crate::process::{DaemonizeError, Daemonizer};

#[derive(Clone, Default)]
pub(crate) struct TestDaemonizer {
    calls: Arc<AtomicUsize>,
}

impl TestDaemonizer {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Daemonizer for TestDaemonizer {
    fn daemonize(&self, _paths: &RuntimePaths) -> Result<(), DaemonizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
