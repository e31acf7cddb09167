//! Single-threaded cooperative event loop.
//!
//! The loop owns the process's only blocking wait: a `mio::Poll` bounded by
//! the earliest timer deadline. Each iteration is one dispatch cycle:
//!
//! 1. drain the wakeup pipe,
//! 2. let the context observe cross-context state ([`LoopContext::on_cycle`]),
//! 3. deliver I/O readiness ([`LoopContext::on_ready`]),
//! 4. fire due timers in `(deadline, insertion)` order.
//!
//! Once [`Scheduler::quit`] has been requested, steps 3 and 4 are skipped for
//! the remainder of the cycle, recurring timers are no longer re-armed, and
//! [`EventLoop::run`] returns after the cycle completes.

mod clock;
mod timers;
mod wake;

use std::io;
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token};
use thiserror::Error;
use tracing::{debug, trace, warn};

pub use clock::{Clock, SystemClock, VirtualClock};
pub use timers::TimerId;
pub use wake::WakeHandle;

use timers::{Timer, TimerCallback, TimerQueue};

const LOOP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::event_loop");
const WAKE_TOKEN: Token = Token(0);
const FIRST_IO_TOKEN: usize = 1;
const EVENT_CAPACITY: usize = 64;

/// Errors raised by the event loop.
#[derive(Debug, Error)]
pub enum EventLoopError {
    /// Allocating the poller or its wakeup pipe failed.
    #[error("failed to allocate event loop: {source}")]
    Allocate {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The blocking wait failed.
    #[error("event loop wait failed: {source}")]
    Wait {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Duplicating the wakeup handle failed.
    #[error("failed to create loop wakeup handle: {source}")]
    Wakeup {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// A timer delay pushes the deadline past what the clock can represent.
    #[error("timer delay of {delay:?} overflows the loop clock")]
    DeadlineOverflow {
        /// Requested delay or period.
        delay: Duration,
    },
}

fn deadline_after(clock: &dyn Clock, delay: Duration) -> Result<Instant, EventLoopError> {
    clock
        .now()
        .checked_add(delay)
        .ok_or(EventLoopError::DeadlineOverflow { delay })
}

/// State driven by the loop. All callbacks run on the loop thread.
pub trait LoopContext: Sized {
    /// Runs once per dispatch cycle, before I/O and timers.
    fn on_cycle(&mut self, _scheduler: &mut Scheduler<'_, Self>) {}

    /// Runs when a registered I/O source becomes ready.
    fn on_ready(&mut self, _token: Token, _scheduler: &mut Scheduler<'_, Self>) {}
}

/// Registers I/O sources with the loop's poller.
pub struct IoRegistry<'a> {
    registry: &'a Registry,
    next_token: &'a mut usize,
}

impl<'a> IoRegistry<'a> {
    #[cfg(test)]
    pub(crate) fn for_tests(registry: &'a Registry, next_token: &'a mut usize) -> Self {
        Self {
            registry,
            next_token,
        }
    }

    /// Registers `source` and returns the token its readiness is reported with.
    pub fn register<S>(&mut self, source: &mut S, interests: Interest) -> io::Result<Token>
    where
        S: Source + ?Sized,
    {
        let token = Token(*self.next_token);
        self.registry.register(source, token, interests)?;
        *self.next_token += 1;
        Ok(token)
    }

    /// Removes `source` from the poller.
    pub fn deregister<S>(&mut self, source: &mut S) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.registry.deregister(source)
    }
}

/// Handle given to callbacks for scheduling work and requesting termination.
pub struct Scheduler<'a, C> {
    timers: &'a mut TimerQueue<C>,
    clock: &'a dyn Clock,
    io: IoRegistry<'a>,
    quit: &'a mut bool,
}

impl<'a, C> Scheduler<'a, C> {
    /// Runs `callback` once, `delay` from now.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::DeadlineOverflow`] when `delay` cannot be
    /// added to the current time.
    pub fn schedule_once<F>(
        &mut self,
        delay: Duration,
        callback: F,
    ) -> Result<TimerId, EventLoopError>
    where
        F: FnOnce(&mut C, &mut Scheduler<'_, C>) + 'static,
    {
        let deadline = deadline_after(self.clock, delay)?;
        Ok(self.timers.schedule(deadline, None, once(callback)))
    }

    /// Runs `callback` every `period`, measured from each fire.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::DeadlineOverflow`] when the first deadline
    /// cannot be represented.
    pub fn schedule_recurring<F>(
        &mut self,
        period: Duration,
        callback: F,
    ) -> Result<TimerId, EventLoopError>
    where
        F: FnMut(&mut C, &mut Scheduler<'_, C>) + 'static,
    {
        let deadline = deadline_after(self.clock, period)?;
        Ok(self.timers.schedule(deadline, Some(period), Box::new(callback)))
    }

    /// Cancels a pending timer. Unknown ids are ignored.
    pub fn cancel(&mut self, id: TimerId) {
        self.timers.cancel(id);
    }

    /// Marks the loop for termination after the current dispatch cycle.
    /// Idempotent.
    pub fn quit(&mut self) {
        if !*self.quit {
            debug!(target: LOOP_TARGET, "loop termination requested");
        }
        *self.quit = true;
    }

    /// Whether termination has been requested.
    #[must_use]
    pub fn is_quitting(&self) -> bool {
        *self.quit
    }

    /// The loop's current time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Access to I/O registration.
    pub fn io(&mut self) -> &mut IoRegistry<'a> {
        &mut self.io
    }
}

fn once<C, F>(callback: F) -> TimerCallback<C>
where
    F: FnOnce(&mut C, &mut Scheduler<'_, C>) + 'static,
{
    let mut callback = Some(callback);
    Box::new(move |context: &mut C, scheduler: &mut Scheduler<'_, C>| {
        if let Some(callback) = callback.take() {
            callback(context, scheduler);
        }
    })
}

/// The event loop.
pub struct EventLoop<C> {
    poll: Poll,
    events: Events,
    timers: TimerQueue<C>,
    clock: Box<dyn Clock>,
    wake_reader: mio::net::UnixStream,
    wake_writer: WakeHandle,
    next_token: usize,
    quit: bool,
}

impl<C: LoopContext> EventLoop<C> {
    /// Allocates a loop driven by wall-clock time.
    pub fn new() -> Result<Self, EventLoopError> {
        Self::with_clock(SystemClock)
    }

    /// Allocates a loop driven by `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Result<Self, EventLoopError> {
        let poll = Poll::new().map_err(|source| EventLoopError::Allocate { source })?;
        let (mut wake_reader, wake_writer) =
            wake::pipe().map_err(|source| EventLoopError::Allocate { source })?;
        poll.registry()
            .register(&mut wake_reader, WAKE_TOKEN, Interest::READABLE)
            .map_err(|source| EventLoopError::Allocate { source })?;
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            timers: TimerQueue::new(),
            clock: Box::new(clock),
            wake_reader,
            wake_writer,
            next_token: FIRST_IO_TOKEN,
            quit: false,
        })
    }

    /// Returns a handle that interrupts the blocking wait.
    pub fn wake_handle(&self) -> Result<WakeHandle, EventLoopError> {
        self.wake_writer
            .try_clone()
            .map_err(|source| EventLoopError::Wakeup { source })
    }

    /// Schedules a one-shot timer before or between runs.
    pub fn schedule_once<F>(
        &mut self,
        delay: Duration,
        callback: F,
    ) -> Result<TimerId, EventLoopError>
    where
        F: FnOnce(&mut C, &mut Scheduler<'_, C>) + 'static,
    {
        let deadline = deadline_after(self.clock.as_ref(), delay)?;
        Ok(self.timers.schedule(deadline, None, once(callback)))
    }

    /// Schedules a recurring timer before or between runs.
    pub fn schedule_recurring<F>(
        &mut self,
        period: Duration,
        callback: F,
    ) -> Result<TimerId, EventLoopError>
    where
        F: FnMut(&mut C, &mut Scheduler<'_, C>) + 'static,
    {
        let deadline = deadline_after(self.clock.as_ref(), period)?;
        Ok(self
            .timers
            .schedule(deadline, Some(period), Box::new(callback)))
    }

    /// Cancels a pending timer.
    pub fn cancel(&mut self, id: TimerId) {
        self.timers.cancel(id);
    }

    /// Number of armed timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// I/O registration outside a dispatch cycle, e.g. during teardown.
    pub fn io(&mut self) -> IoRegistry<'_> {
        IoRegistry {
            registry: self.poll.registry(),
            next_token: &mut self.next_token,
        }
    }

    /// Dispatches events until a callback calls [`Scheduler::quit`].
    pub fn run(&mut self, context: &mut C) -> Result<(), EventLoopError> {
        self.quit = false;
        debug!(target: LOOP_TARGET, timers = self.timers.len(), "event loop running");
        loop {
            let deadline = self.timers.next_deadline();
            let timeout = self.clock.wait_budget(deadline);
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => return Err(EventLoopError::Wait { source }),
            }
            self.clock.waited(deadline);
            if self.dispatch_cycle(context)? {
                debug!(target: LOOP_TARGET, "event loop stopped");
                return Ok(());
            }
        }
    }

    /// Runs one dispatch cycle; returns whether termination was requested.
    fn dispatch_cycle(&mut self, context: &mut C) -> Result<bool, EventLoopError> {
        let ready: Vec<Token> = self.events.iter().map(mio::event::Event::token).collect();
        if ready.contains(&WAKE_TOKEN) {
            wake::drain(&mut self.wake_reader).map_err(|source| EventLoopError::Wait { source })?;
            trace!(target: LOOP_TARGET, "woken");
        }

        let mut scheduler = Scheduler {
            timers: &mut self.timers,
            clock: self.clock.as_ref(),
            io: IoRegistry {
                registry: self.poll.registry(),
                next_token: &mut self.next_token,
            },
            quit: &mut self.quit,
        };

        context.on_cycle(&mut scheduler);

        for token in ready.into_iter().filter(|token| *token != WAKE_TOKEN) {
            if scheduler.is_quitting() {
                break;
            }
            context.on_ready(token, &mut scheduler);
        }

        if !scheduler.is_quitting() {
            fire_due_timers(context, &mut scheduler);
        }

        Ok(scheduler.is_quitting())
    }
}

fn fire_due_timers<C>(context: &mut C, scheduler: &mut Scheduler<'_, C>) {
    let fired_at = scheduler.now();
    let mut due = scheduler.timers.take_due(fired_at).into_iter();
    while let Some(mut timer) = due.next() {
        if scheduler.is_quitting() {
            // Left for a later run; they never fire in this one.
            requeue(scheduler, fired_at, timer);
            due.by_ref()
                .for_each(|timer| requeue(scheduler, fired_at, timer));
            break;
        }
        if scheduler.timers.is_cancelled(timer.id) {
            scheduler.timers.settle(timer.id);
            continue;
        }
        (timer.callback)(context, scheduler);
        rearm(scheduler, fired_at, timer);
    }
}

fn requeue<C>(scheduler: &mut Scheduler<'_, C>, fired_at: Instant, timer: Timer<C>) {
    if !scheduler.timers.settle(timer.id) {
        scheduler.timers.arm(fired_at, timer);
    }
}

fn rearm<C>(scheduler: &mut Scheduler<'_, C>, fired_at: Instant, timer: Timer<C>) {
    let cancelled = scheduler.timers.settle(timer.id);
    let Some(period) = timer.period else {
        return;
    };
    if cancelled || scheduler.is_quitting() {
        trace!(target: LOOP_TARGET, timer = ?timer.id, "recurring timer not re-armed");
        return;
    }
    match fired_at.checked_add(period) {
        Some(deadline) => scheduler.timers.arm(deadline, timer),
        None => warn!(
            target: LOOP_TARGET,
            timer = ?timer.id,
            period_secs = period.as_secs(),
            "recurring timer dropped; next deadline overflows the loop clock"
        ),
    }
}
