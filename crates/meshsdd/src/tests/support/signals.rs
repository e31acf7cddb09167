//! Signal source double: scenarios raise requests from the test thread
//! instead of the kernel.

use std::sync::{Arc, Mutex};

use crate::event_loop::WakeHandle;
use crate::signals::{PendingSignals, SignalError, SignalRegistration, SignalSource};

#[derive(Default)]
struct Installed {
    pending: Option<PendingSignals>,
    wake: Option<WakeHandle>,
    quit_on_install: bool,
}

#[derive(Clone, Default)]
pub(crate) struct TestSignalSource {
    inner: Arc<Mutex<Installed>>,
}

impl TestSignalSource {
    /// Source that delivers a termination request as soon as it is
    /// installed, so a foreground run returns without another thread.
    pub(crate) fn pretriggered() -> Self {
        let source = Self::default();
        source.lock().quit_on_install = true;
        source
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub(crate) fn trigger_quit(&self) {
        self.deliver(PendingSignals::request_quit);
    }

    pub(crate) fn trigger_dump(&self) {
        self.deliver(PendingSignals::request_dump);
    }

    fn deliver(&self, request: impl FnOnce(&PendingSignals)) {
        let installed = self.lock();
        let pending = installed
            .pending
            .as_ref()
            .expect("signal source not installed");
        request(pending);
        if let Some(wake) = &installed.wake {
            wake.wake().expect("wake event loop");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Installed> {
        self.inner.lock().expect("signal source mutex poisoned")
    }
}

impl SignalSource for TestSignalSource {
    fn install(
        &self,
        pending: &PendingSignals,
        wake: &WakeHandle,
    ) -> Result<SignalRegistration, SignalError> {
        let mut installed = self.lock();
        if installed.quit_on_install {
            pending.request_quit();
        }
        installed.pending = Some(pending.clone());
        installed.wake = Some(
            wake.try_clone()
                .map_err(|source| SignalError::Wakeup { source })?,
        );
        Ok(SignalRegistration::empty())
    }
}
