//! Bridges OS signals into flags the event loop consumes.
//!
//! Handlers only store to an atomic flag and write one byte to the loop's
//! wakeup pipe, both performed by `signal-hook`'s async-signal-safe
//! actions. Everything else happens on the loop thread when the supervisor
//! calls [`PendingSignals::take`].

use std::io;
use std::os::raw::c_int;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::SigId;
use signal_hook::consts::signal::{SIGINT, SIGTERM, SIGUSR1};
use thiserror::Error;
use tracing::{debug, info};

use crate::event_loop::WakeHandle;

pub(crate) const SIGNALS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::signals");

/// Flags set from signal context and consumed once per dispatch cycle.
#[derive(Debug, Clone, Default)]
pub struct PendingSignals {
    quit: Arc<AtomicBool>,
    dump: Arc<AtomicBool>,
}

/// Requests observed by one call to [`PendingSignals::take`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalRequests {
    /// A termination signal arrived.
    pub quit: bool,
    /// A dump-request signal arrived.
    pub dump: bool,
}

impl PendingSignals {
    /// Creates cleared flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags a termination request.
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    /// Flags a dump request.
    pub fn request_dump(&self) {
        self.dump.store(true, Ordering::SeqCst);
    }

    /// Whether a termination request is waiting to be taken.
    #[must_use]
    pub fn quit_pending(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Clears both flags, returning what was pending.
    pub fn take(&self) -> SignalRequests {
        SignalRequests {
            quit: self.quit.swap(false, Ordering::SeqCst),
            dump: self.dump.swap(false, Ordering::SeqCst),
        }
    }
}

/// Errors raised while installing signal handlers.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Registering a handler failed.
    #[error("failed to register handler for {signal}: {source}")]
    Register {
        /// Signal name.
        signal: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Duplicating the loop wakeup handle failed.
    #[error("failed to duplicate loop wakeup handle: {source}")]
    Wakeup {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Installs handlers that feed [`PendingSignals`].
pub trait SignalSource {
    /// Routes termination and dump-request signals to `pending`, waking the
    /// loop through `wake`. Handlers stay installed until the returned
    /// registration is dropped.
    fn install(
        &self,
        pending: &PendingSignals,
        wake: &WakeHandle,
    ) -> Result<SignalRegistration, SignalError>;
}

/// Handlers installed by a [`SignalSource`]; dropping it unregisters them.
#[derive(Debug, Default)]
pub struct SignalRegistration {
    ids: Vec<SigId>,
}

impl SignalRegistration {
    /// A registration owning no OS handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of OS handlers held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no OS handlers are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Drop for SignalRegistration {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
        debug!(target: SIGNALS_TARGET, "signal handlers removed");
    }
}

/// Installs real handlers for SIGINT, SIGTERM and SIGUSR1.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSignalSource;

impl SignalSource for SystemSignalSource {
    fn install(
        &self,
        pending: &PendingSignals,
        wake: &WakeHandle,
    ) -> Result<SignalRegistration, SignalError> {
        let mut registration = SignalRegistration::empty();
        let routes: [(c_int, &'static str, &Arc<AtomicBool>); 3] = [
            (SIGINT, "SIGINT", &pending.quit),
            (SIGTERM, "SIGTERM", &pending.quit),
            (SIGUSR1, "SIGUSR1", &pending.dump),
        ];
        for (signal, name, flag) in routes {
            let register_error = |source| SignalError::Register {
                signal: name,
                source,
            };
            // Flag first: actions run in registration order, so the loop
            // never wakes without seeing the flag.
            let flag_id =
                signal_hook::flag::register(signal, Arc::clone(flag)).map_err(register_error)?;
            registration.ids.push(flag_id);
            let writer = wake
                .try_clone()
                .map_err(|source| SignalError::Wakeup { source })?
                .into_stream();
            let pipe_id =
                signal_hook::low_level::pipe::register(signal, writer).map_err(register_error)?;
            registration.ids.push(pipe_id);
        }
        info!(
            target: SIGNALS_TARGET,
            handlers = registration.len(),
            "signal handlers installed"
        );
        Ok(registration)
    }
}
