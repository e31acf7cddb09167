//! Ordered timer queue backing `schedule_once` and `schedule_recurring`.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use super::Scheduler;

/// Callback run on the loop thread when a timer fires.
pub(super) type TimerCallback<C> = Box<dyn FnMut(&mut C, &mut Scheduler<'_, C>)>;

/// Identifies a scheduled timer for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub(super) struct Timer<C> {
    pub(super) id: TimerId,
    pub(super) period: Option<Duration>,
    pub(super) callback: TimerCallback<C>,
}

/// Timers keyed by `(deadline, sequence)`, so equal deadlines fire in the
/// order they were armed.
///
/// Timers handed out by [`TimerQueue::take_due`] stay in flight until
/// [`TimerQueue::settle`] is called for them; only those can be cancelled
/// while detached.
pub(super) struct TimerQueue<C> {
    entries: BTreeMap<(Instant, u64), Timer<C>>,
    in_flight: HashSet<TimerId>,
    cancelled: HashSet<TimerId>,
    next_sequence: u64,
    next_id: u64,
}

impl<C> TimerQueue<C> {
    pub(super) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            in_flight: HashSet::new(),
            cancelled: HashSet::new(),
            next_sequence: 0,
            next_id: 0,
        }
    }

    pub(super) fn schedule(
        &mut self,
        deadline: Instant,
        period: Option<Duration>,
        callback: TimerCallback<C>,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.arm(
            deadline,
            Timer {
                id,
                period,
                callback,
            },
        );
        id
    }

    pub(super) fn arm(&mut self, deadline: Instant, timer: Timer<C>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert((deadline, sequence), timer);
    }

    /// Removes a pending timer. An in-flight timer is marked so it is
    /// neither run nor re-armed; any other id is ignored.
    pub(super) fn cancel(&mut self, id: TimerId) {
        let before = self.entries.len();
        self.entries.retain(|_, timer| timer.id != id);
        if self.entries.len() == before && self.in_flight.contains(&id) {
            self.cancelled.insert(id);
        }
    }

    pub(super) fn is_cancelled(&self, id: TimerId) -> bool {
        self.cancelled.contains(&id)
    }

    /// Ends the in-flight period of a detached timer, returning whether it
    /// was cancelled meanwhile.
    pub(super) fn settle(&mut self, id: TimerId) -> bool {
        self.in_flight.remove(&id);
        self.cancelled.remove(&id)
    }

    pub(super) fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Detaches every timer due at or before `now`, in firing order.
    pub(super) fn take_due(&mut self, now: Instant) -> Vec<Timer<C>> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let timer = entry.remove();
            self.in_flight.insert(timer.id);
            due.push(timer);
        }
        due
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}
