//! Containers whose entries expire a fixed time after they were last written.
//!
//! [`ExpiringMap`] and [`ExpiringSet`] give every entry its own single-shot eviction timer.
//! Writing an entry again cancels its timer and schedules a fresh one, so the time-to-live is
//! always measured from the most recent write. Deleting or clearing cancels timers eagerly;
//! a timer that fires removes its entry.
//!
//! Timers are kept in a private queue read against an injectable [`Clock`]. Every operation
//! first fires the timers that are due and only then does its own work, so an eviction never
//! interleaves with an operation. Tests use [`FakeClock`] to move time by hand:
//!
//! ```
//! use std::time::Duration;
//! use expiring::{ExpiringMap, FakeClock};
//!
//! let clock = FakeClock::default();
//! let mut m = ExpiringMap::with_clock(Duration::from_millis(100), clock.clone());
//! m.set("x", 1);
//! assert!(m.has("x"));
//!
//! clock.advance(Duration::from_millis(150));
//! assert!(!m.has("x"));
//! assert_eq!(m.len(), 0);
//! ```
//!
//! Dropping a container drops its timers with it, so nothing fires after the container is gone.

use std::time::{Duration, Instant};

mod fake_clock;
mod map;
mod set;
mod timer;
mod ttl;

pub use fake_clock::FakeClock;
pub use map::ExpiringMap;
pub use set::ExpiringSet;
pub use ttl::{Ttl, TtlError};

pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// What [`ExpiringMap`] and [`ExpiringSet`] have in common.
pub trait Expiring {
    /// What a snapshot yields: `(key, value)` for maps, the member itself for sets.
    type Item;

    fn ttl(&self) -> Duration;

    // &mut because every call may run pending evictions first
    fn len(&mut self) -> usize;

    fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Fires every eviction timer that is due, returning how many entries were evicted.
    fn run_pending_timers(&mut self) -> usize;

    /// When the next eviction is due, if anything is pending. A sweeper that wants expired
    /// entries gone without waiting for the next operation can sleep until then:
    ///
    /// ```
    /// use std::time::Duration;
    /// use expiring::{Clock, Expiring, ExpiringSet, FakeClock};
    ///
    /// fn sweep<E: Expiring>(container: &mut E, clock: &FakeClock) -> usize {
    ///     let mut evicted = 0;
    ///     while let Some(due) = container.next_expiry() {
    ///         clock.advance(due.saturating_duration_since(clock.now()) + Duration::from_nanos(1));
    ///         evicted += container.run_pending_timers();
    ///     }
    ///     evicted
    /// }
    ///
    /// let clock = FakeClock::default();
    /// let mut s = ExpiringSet::with_clock(Duration::from_secs(5), clock.clone());
    /// s.add("a").add("b");
    /// assert_eq!(sweep(&mut s, &clock), 2);
    /// ```
    fn next_expiry(&self) -> Option<Instant>;

    /// The live contents at call time, in the container's default iteration order.
    fn snapshot(&mut self) -> Vec<Self::Item>;
}
