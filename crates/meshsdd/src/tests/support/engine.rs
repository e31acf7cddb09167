//! Scriptable [`DiscoveryEngine`] that records every call in order.
//!
//! Clones share state, so a scenario can keep a handle on the engine after
//! moving it into a supervisor running on another thread.

use std::sync::{Arc, Mutex, MutexGuard};

use mio::Token;

use crate::engine::{
    BrowserHandle, BrowserId, DiscoveryEngine, EngineConfig, EngineError, EngineEventSender,
    EngineHandle, EngineId, EngineState,
};
use crate::event_loop::IoRegistry;

/// One observed engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineCall {
    CreateEngine(EngineId),
    CreateEngineFailed,
    DestroyEngine(EngineId),
    CreateBrowser(BrowserId),
    CreateBrowserFailed,
    DestroyBrowser(BrowserId),
}

#[derive(Debug)]
struct Script {
    calls: Vec<EngineCall>,
    next_engine: u64,
    next_browser: u64,
    attempts: usize,
    fail_creates_from: Option<usize>,
    fail_browsers: bool,
    on_create: Vec<EngineState>,
    live_engine: Option<EngineId>,
    live_browser: Option<BrowserId>,
    sender: Option<EngineEventSender>,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordingEngine {
    script: Arc<Mutex<Script>>,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    /// Engine that reports running as soon as it is created.
    pub(crate) fn new() -> Self {
        Self::reporting_on_create(vec![EngineState::Running])
    }

    /// Engine that stays quiet until a scenario reports a state.
    pub(crate) fn silent() -> Self {
        Self::reporting_on_create(Vec::new())
    }

    fn reporting_on_create(on_create: Vec<EngineState>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                calls: Vec::new(),
                next_engine: 0,
                next_browser: 0,
                attempts: 0,
                fail_creates_from: None,
                fail_browsers: false,
                on_create,
                live_engine: None,
                live_browser: None,
                sender: None,
            })),
        }
    }

    /// The `attempt`-th creation (counting from one) and all later ones fail.
    pub(crate) fn fail_creates_from(self, attempt: usize) -> Self {
        self.lock().fail_creates_from = Some(attempt);
        self
    }

    /// Every browser creation fails.
    pub(crate) fn fail_browsers(self) -> Self {
        self.lock().fail_browsers = true;
        self
    }

    /// Reports `state` for the live engine, as a real engine would from its
    /// socket callbacks.
    pub(crate) fn report(&self, state: EngineState) {
        let script = self.lock();
        if let (Some(engine), Some(sender)) = (script.live_engine, &script.sender) {
            sender.state(engine, state);
        }
    }

    /// Reports `state` on behalf of an engine that may already be gone.
    pub(crate) fn report_for(&self, engine: EngineId, state: EngineState) {
        if let Some(sender) = &self.lock().sender {
            sender.state(engine, state);
        }
    }

    /// Reports a service type seen by the live browser.
    pub(crate) fn discover(&self, service_type: &str, domain: &str) {
        let script = self.lock();
        if let (Some(browser), Some(sender)) = (script.live_browser, &script.sender) {
            sender.type_found(browser, service_type.to_owned(), domain.to_owned());
        }
    }

    pub(crate) fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub(crate) fn creations(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::CreateEngine(_)))
    }

    pub(crate) fn destroys(&self) -> usize {
        self.count(|call| {
            matches!(
                call,
                EngineCall::DestroyEngine(_) | EngineCall::DestroyBrowser(_)
            )
        })
    }

    pub(crate) fn live_engine(&self) -> Option<EngineId> {
        self.lock().live_engine
    }

    pub(crate) fn live_browser(&self) -> Option<BrowserId> {
        self.lock().live_browser
    }

    fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("engine script mutex poisoned")
    }
}

impl DiscoveryEngine for RecordingEngine {
    fn create_engine(
        &mut self,
        _config: &EngineConfig,
        _io: &mut IoRegistry<'_>,
        events: EngineEventSender,
    ) -> Result<EngineHandle, EngineError> {
        let mut script = self.lock();
        script.attempts += 1;
        if script
            .fail_creates_from
            .is_some_and(|first| script.attempts >= first)
        {
            script.calls.push(EngineCall::CreateEngineFailed);
            return Err(EngineError::Rejected {
                reason: "scripted failure".to_owned(),
            });
        }
        if let Some(live) = script.live_engine {
            return Err(EngineError::Rejected {
                reason: format!("{live} is still live"),
            });
        }
        script.next_engine += 1;
        let id = EngineId::new(script.next_engine);
        script.calls.push(EngineCall::CreateEngine(id));
        script.live_engine = Some(id);
        for state in &script.on_create {
            events.state(id, *state);
        }
        script.sender = Some(events);
        Ok(EngineHandle::new(id))
    }

    fn destroy_engine(&mut self, handle: EngineHandle, _io: &mut IoRegistry<'_>) {
        let mut script = self.lock();
        assert!(
            script.live_browser.is_none(),
            "engine destroyed while its browser is live"
        );
        script.calls.push(EngineCall::DestroyEngine(handle.id()));
        if script.live_engine == Some(handle.id()) {
            script.live_engine = None;
        }
    }

    fn create_type_browser(
        &mut self,
        engine: &EngineHandle,
        _domain: &str,
    ) -> Result<BrowserHandle, EngineError> {
        let mut script = self.lock();
        if script.fail_browsers {
            script.calls.push(EngineCall::CreateBrowserFailed);
            return Err(EngineError::Rejected {
                reason: "scripted browser failure".to_owned(),
            });
        }
        script.next_browser += 1;
        let id = BrowserId::new(script.next_browser);
        script.calls.push(EngineCall::CreateBrowser(id));
        script.live_browser = Some(id);
        Ok(BrowserHandle::new(id, engine.id()))
    }

    fn destroy_type_browser(&mut self, browser: BrowserHandle) {
        let mut script = self.lock();
        script.calls.push(EngineCall::DestroyBrowser(browser.id()));
        if script.live_browser == Some(browser.id()) {
            script.live_browser = None;
        }
    }

    fn process_io(&mut self, _token: Token) {}
}
