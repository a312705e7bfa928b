use std::collections::BTreeMap;
use std::mem;
use std::time::{Duration, Instant};

/// Position of a timer in the queue. Deadlines are stored as offsets from the queue's epoch so
/// that a huge delay saturates instead of overflowing `Instant`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    at: Duration,
    // Breaks ties between timers due at the same instant, in scheduling order.
    seq: u64,
    scheduled: Duration,
}

/// Identifies one scheduled timer. Handles are neither `Clone` nor `Copy`: cancelling consumes
/// the handle, so a timer can't be cancelled twice or confused with a later one.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct TimerHandle(Deadline);

/// A single-shot timer queue driven by an external clock.
///
/// Nothing fires on its own. The owner calls [`TimerQueue::fire_due`] with the current time and
/// applies the payloads it gets back; each timer is handed out at most once and a cancelled timer
/// is never handed out. A timer never fires at the instant it was scheduled, so a zero delay still
/// waits for the clock to move.
#[derive(Debug)]
pub(crate) struct TimerQueue<T> {
    epoch: Instant,
    next_seq: u64,
    pending: BTreeMap<Deadline, T>,
}

impl<T> TimerQueue<T> {
    pub fn new(epoch: Instant) -> TimerQueue<T> {
        TimerQueue {
            epoch,
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    fn offset(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.epoch)
    }

    /// Schedules `payload` to fire once `delay` has passed since `now`.
    pub fn schedule(&mut self, now: Instant, delay: Duration, payload: T) -> TimerHandle {
        let scheduled = self.offset(now);
        let deadline = Deadline {
            at: scheduled.saturating_add(delay),
            seq: self.next_seq,
            scheduled,
        };
        self.next_seq += 1;
        self.pending.insert(deadline, payload);
        TimerHandle(deadline)
    }

    /// Cancels a timer, returning its payload if it had not fired yet.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        self.pending.remove(&handle.0)
    }

    /// Removes every timer due at or before `now` and returns their payloads, earliest first.
    /// Timers scheduled at `now` itself stay pending.
    pub fn fire_due(&mut self, now: Instant) -> Vec<T> {
        let now = self.offset(now);
        let threshold = Deadline {
            at: now,
            seq: u64::MAX,
            scheduled: Duration::MAX,
        };
        let mut due = self.pending.split_off(&threshold);
        mem::swap(&mut self.pending, &mut due);

        let mut fired = Vec::with_capacity(due.len());
        for (deadline, payload) in due {
            if deadline.scheduled < now {
                fired.push(payload);
            } else {
                self.pending.insert(deadline, payload);
            }
        }
        fired
    }

    /// Cancels every pending timer, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let cancelled = self.pending.len();
        self.pending.clear();
        cancelled
    }

    #[cfg(test)]
    pub fn is_live(&self, handle: &TimerHandle) -> bool {
        self.pending.contains_key(&handle.0)
    }

    /// The earliest pending deadline. A timer scheduled with a zero delay is due strictly after it.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .keys()
            .next()
            .and_then(|deadline| self.epoch.checked_add(deadline.at))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
