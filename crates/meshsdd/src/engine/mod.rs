//! Boundary with the discovery engine.
//!
//! The supervisor owns at most one [`EngineHandle`] and at most one
//! [`BrowserHandle`]. Handles are opaque and not `Clone`; destroying one
//! consumes it, so a handle can never be destroyed twice. Engines report
//! state and browse results through an [`EngineEventSender`], and the
//! supervisor drains the matching [`EngineEvents`] on the loop thread.

mod config;
mod multicast;
pub mod wire;

use std::fmt;
use std::io;
use std::sync::mpsc;

use mio::Token;
use thiserror::Error;

use crate::event_loop::IoRegistry;

pub use config::{EngineConfig, EngineConfigError, PublicationFlags};
pub use multicast::MulticastEngine;

pub(crate) const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

/// Identifies one engine generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

impl EngineId {
    /// Wraps a raw generation number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Identifies one type browser generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowserId(u64);

impl BrowserId {
    /// Wraps a raw generation number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for BrowserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "browser#{}", self.0)
    }
}

/// A live responder instance.
#[derive(Debug, PartialEq, Eq)]
pub struct EngineHandle {
    id: EngineId,
}

impl EngineHandle {
    /// Issued by a [`DiscoveryEngine`] when an engine is created.
    #[must_use]
    pub const fn new(id: EngineId) -> Self {
        Self { id }
    }

    /// Generation of this engine.
    #[must_use]
    pub const fn id(&self) -> EngineId {
        self.id
    }
}

/// A service-type browser scoped to one engine.
#[derive(Debug, PartialEq, Eq)]
pub struct BrowserHandle {
    id: BrowserId,
    engine: EngineId,
}

impl BrowserHandle {
    /// Issued by a [`DiscoveryEngine`] when a browser is created.
    #[must_use]
    pub const fn new(id: BrowserId, engine: EngineId) -> Self {
        Self { id, engine }
    }

    /// Generation of this browser.
    #[must_use]
    pub const fn id(&self) -> BrowserId {
        self.id
    }

    /// Engine the browser belongs to.
    #[must_use]
    pub const fn engine(&self) -> EngineId {
        self.engine
    }
}

/// States an engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Responder is up; browsers may be created.
    Running,
    /// Another host claimed our records.
    Collision,
    /// Records are being (re)registered.
    Registering,
    /// Engine reported an invalid configuration or state.
    Invalid,
    /// Unrecoverable failure.
    Failure,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Collision => "collision",
            Self::Registering => "registering",
            Self::Invalid => "invalid",
            Self::Failure => "failure",
        })
    }
}

/// Notification emitted by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine changed state.
    State {
        /// Reporting engine.
        engine: EngineId,
        /// New state.
        state: EngineState,
    },
    /// A browser saw a service type.
    TypeFound {
        /// Reporting browser.
        browser: BrowserId,
        /// Service type, e.g. `_http._tcp`.
        service_type: String,
        /// Domain the type was seen in.
        domain: String,
    },
    /// A browser saw a service type withdrawn.
    TypeRemoved {
        /// Reporting browser.
        browser: BrowserId,
        /// Service type, e.g. `_http._tcp`.
        service_type: String,
        /// Domain the type was withdrawn from.
        domain: String,
    },
}

/// Sending half handed to engines on creation.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    sender: mpsc::Sender<EngineEvent>,
}

impl EngineEventSender {
    /// Reports a state change. Reports after the receiver is gone are dropped.
    pub fn state(&self, engine: EngineId, state: EngineState) {
        self.send(EngineEvent::State { engine, state });
    }

    /// Reports a discovered service type.
    pub fn type_found(&self, browser: BrowserId, service_type: String, domain: String) {
        self.send(EngineEvent::TypeFound {
            browser,
            service_type,
            domain,
        });
    }

    /// Reports a withdrawn service type.
    pub fn type_removed(&self, browser: BrowserId, service_type: String, domain: String) {
        self.send(EngineEvent::TypeRemoved {
            browser,
            service_type,
            domain,
        });
    }

    fn send(&self, event: EngineEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!(target: ENGINE_TARGET, "engine event dropped; supervisor gone");
        }
    }
}

/// Receiving half drained by the supervisor.
#[derive(Debug)]
pub struct EngineEvents {
    receiver: mpsc::Receiver<EngineEvent>,
    sender: mpsc::Sender<EngineEvent>,
}

impl EngineEvents {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { receiver, sender }
    }

    /// Sender to pass to [`DiscoveryEngine::create_engine`].
    #[must_use]
    pub fn sender(&self) -> EngineEventSender {
        EngineEventSender {
            sender: self.sender.clone(),
        }
    }

    /// Next pending event, if any.
    pub fn next_event(&self) -> Option<EngineEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Default for EngineEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors reported by a discovery engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Opening or configuring the engine socket failed.
    #[error("failed to open discovery socket: {source}")]
    Socket {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Registering the engine socket with the event loop failed.
    #[error("failed to register discovery socket: {source}")]
    Register {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The handle does not refer to the live engine.
    #[error("{engine} is not live")]
    StaleEngine {
        /// Engine named by the caller.
        engine: EngineId,
    },
    /// The browse domain could not be encoded into a query.
    #[error("invalid browse domain '{domain}': {source}")]
    Domain {
        /// Requested domain.
        domain: String,
        /// Encoding failure.
        #[source]
        source: wire::WireError,
    },
    /// The engine refused the request.
    #[error("discovery engine rejected the request: {reason}")]
    Rejected {
        /// Engine-provided reason.
        reason: String,
    },
}

/// Operations the supervisor needs from a discovery engine.
///
/// All methods run on the loop thread. Destroy operations consume the
/// handle and never fail.
pub trait DiscoveryEngine {
    /// Starts a responder with `config`. State changes are reported through
    /// `events`, possibly before this call returns.
    fn create_engine(
        &mut self,
        config: &EngineConfig,
        io: &mut IoRegistry<'_>,
        events: EngineEventSender,
    ) -> Result<EngineHandle, EngineError>;

    /// Stops a responder and releases its resources.
    fn destroy_engine(&mut self, handle: EngineHandle, io: &mut IoRegistry<'_>);

    /// Starts enumerating service types in `domain`.
    fn create_type_browser(
        &mut self,
        engine: &EngineHandle,
        domain: &str,
    ) -> Result<BrowserHandle, EngineError>;

    /// Stops a browser.
    fn destroy_type_browser(&mut self, browser: BrowserHandle);

    /// Handles readiness on `token`. Tokens the engine does not own are ignored.
    fn process_io(&mut self, token: Token);
}
