//! Periodic forced recycling of the responder.
//!
//! Multicast delivery on mesh links is lossy, so the responder is rebuilt on
//! a fixed cadence to make peers re-announce their services. The timer is a
//! pure trigger; what a recycle means is up to the [`Recyclable`] context.

use std::time::Duration;

use tracing::debug;

use crate::event_loop::{EventLoop, EventLoopError, LoopContext, Scheduler, TimerId};

const RESTART_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::restart");

/// Loop context that can rebuild its resources.
pub trait Recyclable: LoopContext {
    /// Destroys and recreates the supervised resources.
    fn recycle(&mut self, scheduler: &mut Scheduler<'_, Self>);
}

/// Recurring timer that recycles a [`Recyclable`] context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartTimer {
    interval: Duration,
}

impl RestartTimer {
    /// Timer firing every `interval`, measured from each fire.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Period between recycles.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Registers the timer; the first recycle happens one interval from now.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::DeadlineOverflow`] when the interval cannot
    /// be added to the loop's clock.
    pub fn arm<C>(&self, event_loop: &mut EventLoop<C>) -> Result<TimerId, EventLoopError>
    where
        C: Recyclable + 'static,
    {
        let interval = self.interval;
        let id = event_loop.schedule_recurring(interval, move |context: &mut C, scheduler| {
            debug!(
                target: RESTART_TARGET,
                interval_secs = interval.as_secs(),
                "restart timer fired"
            );
            context.recycle(scheduler);
        })?;
        debug!(
            target: RESTART_TARGET,
            interval_secs = interval.as_secs(),
            "restart timer armed"
        );
        Ok(id)
    }
}
