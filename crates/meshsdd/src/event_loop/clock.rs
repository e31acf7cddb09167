//! Time sources driving the event loop's blocking wait.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Source of the loop's notion of "now" and of how long a wait may block.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Timeout handed to the poller when the next timer is due at `deadline`.
    ///
    /// `None` blocks until I/O readiness.
    fn wait_budget(&self, deadline: Option<Instant>) -> Option<Duration>;

    /// Invoked after the poller returns.
    fn waited(&self, _deadline: Option<Instant>) {}
}

/// Wall-clock time; waits block until the next deadline.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait_budget(&self, deadline: Option<Instant>) -> Option<Duration> {
        deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// Deterministic time for tests.
///
/// Waits never block: after each poll the clock jumps straight to the next
/// timer deadline, so hours of supervision replay in microseconds.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    origin: Instant,
    now: Rc<Cell<Instant>>,
}

impl VirtualClock {
    /// Starts virtual time at the current instant.
    #[must_use]
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            origin,
            now: Rc::new(Cell::new(origin)),
        }
    }

    /// Virtual time elapsed since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.now.get().saturating_duration_since(self.origin)
    }

    /// Moves virtual time forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn wait_budget(&self, _deadline: Option<Instant>) -> Option<Duration> {
        Some(Duration::ZERO)
    }

    fn waited(&self, deadline: Option<Instant>) {
        if let Some(deadline) = deadline
            && deadline > self.now.get()
        {
            self.now.set(deadline);
        }
    }
}
