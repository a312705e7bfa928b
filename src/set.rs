use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::time::{Duration, Instant};
use std::vec;

use log::{debug, trace};

use crate::timer::{TimerHandle, TimerQueue};
use crate::{Clock, Expiring, SystemClock, Ttl};

/// A set whose members are evicted `ttl` after they were last `add`ed.
///
/// `members` and `handles` always hold the same values: a value is a member exactly when it has
/// a live eviction timer.
#[derive(Debug)]
pub struct ExpiringSet<T, C = SystemClock> {
    ttl: Ttl,
    clock: C,
    members: HashSet<T>,
    handles: HashMap<T, TimerHandle>,
    timers: TimerQueue<T>,
}

impl<T> ExpiringSet<T, SystemClock>
where
    T: Eq + Hash + Clone,
{
    pub fn new(ttl: impl Into<Ttl>) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<T, C> ExpiringSet<T, C>
where
    T: Eq + Hash + Clone,
    C: Clock,
{
    pub fn with_clock(ttl: impl Into<Ttl>, clock: C) -> Self {
        let timers = TimerQueue::new(clock.now());
        ExpiringSet {
            ttl: ttl.into(),
            clock,
            members: HashSet::new(),
            handles: HashMap::new(),
            timers,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl.as_duration()
    }

    /// When the earliest pending eviction is due. Doesn't run any evictions itself.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn run_pending_timers(&mut self) -> usize {
        let expired = self.timers.fire_due(self.clock.now());
        if expired.is_empty() {
            return 0;
        }
        let mut evicted = 0;
        for value in expired {
            // Both halves go together or the two structures drift apart.
            self.handles.remove(&value);
            if self.members.remove(&value) {
                evicted += 1;
            }
        }
        debug!(
            "Evicted {} expired set members (ttl {}), {} remaining",
            evicted,
            self.ttl,
            self.members.len()
        );
        evicted
    }

    /// Adds `value`, or restarts its TTL if it is already a member.
    pub fn add(&mut self, value: T) -> &mut Self {
        self.run_pending_timers();
        if let Some(stale) = self.handles.remove(&value) {
            self.timers.cancel(stale);
            trace!("Refreshed set member, expires in {}", self.ttl);
        }
        let handle = self
            .timers
            .schedule(self.clock.now(), self.ttl.as_duration(), value.clone());
        self.members.insert(value.clone());
        self.handles.insert(value, handle);
        self
    }

    pub fn has<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.run_pending_timers();
        self.members.contains(value)
    }

    pub fn delete<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.run_pending_timers();
        if !self.members.remove(value) {
            return false;
        }
        if let Some(handle) = self.handles.remove(value) {
            self.timers.cancel(handle);
        }
        true
    }

    pub fn clear(&mut self) {
        let cancelled = self.timers.clear();
        self.members.clear();
        self.handles.clear();
        trace!("Cleared set, cancelled {} timers", cancelled);
    }

    pub fn len(&mut self) -> usize {
        self.run_pending_timers();
        self.members.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current members, in no particular order.
    pub fn values(&mut self) -> vec::IntoIter<T> {
        self.run_pending_timers();
        self.members.iter().cloned().collect::<Vec<_>>().into_iter()
    }

    /// Same as [`ExpiringSet::values`].
    pub fn keys(&mut self) -> vec::IntoIter<T> {
        self.values()
    }

    /// Every member paired with itself, mirroring [`crate::ExpiringMap::entries`].
    pub fn entries(&mut self) -> vec::IntoIter<(T, T)> {
        self.run_pending_timers();
        self.members
            .iter()
            .map(|value| (value.clone(), value.clone()))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl<T, C> Expiring for ExpiringSet<T, C>
where
    T: Eq + Hash + Clone,
    C: Clock,
{
    type Item = T;

    fn ttl(&self) -> Duration {
        ExpiringSet::ttl(self)
    }

    fn len(&mut self) -> usize {
        ExpiringSet::len(self)
    }

    fn clear(&mut self) {
        ExpiringSet::clear(self)
    }

    fn run_pending_timers(&mut self) -> usize {
        ExpiringSet::run_pending_timers(self)
    }

    fn next_expiry(&self) -> Option<Instant> {
        ExpiringSet::next_expiry(self)
    }

    fn snapshot(&mut self) -> Vec<T> {
        self.values().collect()
    }
}

impl<'a, T, C> IntoIterator for &'a mut ExpiringSet<T, C>
where
    T: Eq + Hash + Clone,
    C: Clock,
{
    type Item = T;
    type IntoIter = vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values()
    }
}

impl<T, C> IntoIterator for ExpiringSet<T, C>
where
    T: Eq + Hash + Clone,
    C: Clock,
{
    type Item = T;
    type IntoIter = vec::IntoIter<T>;

    fn into_iter(mut self) -> Self::IntoIter {
        self.run_pending_timers();
        self.members.into_iter().collect::<Vec<_>>().into_iter()
    }
}

impl<T, C> Extend<T> for ExpiringSet<T, C>
where
    T: Eq + Hash + Clone,
    C: Clock,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::FakeClock;
    use quickcheck_macros::quickcheck;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn fake_set<T: Eq + Hash + Clone>(ttl_ms: u64) -> (ExpiringSet<T, FakeClock>, FakeClock) {
        let clock = FakeClock::default();
        (ExpiringSet::with_clock(millis(ttl_ms), clock.clone()), clock)
    }

    fn invariant_holds<T: Eq + Hash + Clone, C: Clock>(s: &ExpiringSet<T, C>) -> bool {
        s.members.len() == s.handles.len()
            && s.handles.len() == s.timers.len()
            && s.members.iter().all(|value| {
                s.handles
                    .get(value)
                    .map_or(false, |handle| s.timers.is_live(handle))
            })
    }

    fn sorted<T: Ord>(iter: impl Iterator<Item = T>) -> Vec<T> {
        let mut items: Vec<_> = iter.collect();
        items.sort();
        items
    }

    #[test]
    fn smoke_test() {
        let (mut s, clock) = fake_set(15);

        assert!(!s.has(&0));
        s.add(0);
        assert!(s.has(&0));

        clock.advance(millis(10));
        assert!(s.has(&0));

        clock.advance(millis(10));
        assert!(!s.has(&0));
        assert!(invariant_holds(&s));
    }

    #[test]
    fn re_adding_refreshes_ttl_and_evicts_once() {
        let (mut s, clock) = fake_set(50);
        s.add("a");
        clock.advance(millis(10));
        s.add("a");
        assert_eq!(s.len(), 1);
        assert!(invariant_holds(&s));

        clock.advance(millis(49));
        assert_eq!(s.run_pending_timers(), 0);
        assert!(s.has("a"));

        clock.advance(millis(11));
        assert_eq!(s.run_pending_timers(), 1);
        assert_eq!(s.run_pending_timers(), 0);
        assert!(!s.has("a"));
        assert!(invariant_holds(&s));
    }

    #[test]
    fn zero_ttl_survives_until_the_clock_moves() {
        let (mut s, clock) = fake_set(0);
        s.add("a").add("b").add("a");

        assert!(s.has("a"));
        assert_eq!(s.len(), 2);
        assert!(invariant_holds(&s));

        clock.advance(Duration::from_nanos(1));
        assert_eq!(s.run_pending_timers(), 2);
        assert!(s.is_empty());
        assert!(invariant_holds(&s));
    }

    #[test]
    fn delete_cancels_pending_eviction() {
        let (mut s, clock) = fake_set(50);
        s.add("a").add("b");
        assert!(s.delete("a"));
        assert!(!s.delete("a"));
        assert!(invariant_holds(&s));

        clock.advance(millis(50));
        assert_eq!(s.run_pending_timers(), 1);
        assert!(s.is_empty());
    }

    #[test]
    fn clear_twice_is_safe() {
        let (mut s, clock) = fake_set(50);
        s.extend(vec![1, 2, 3]);
        assert_eq!(s.len(), 3);

        s.clear();
        assert_eq!(s.len(), 0);
        s.clear();
        assert_eq!(s.len(), 0);
        assert!(invariant_holds(&s));

        clock.advance(millis(50));
        assert_eq!(s.run_pending_timers(), 0);
    }

    #[test]
    fn iteration_views_agree() {
        let (mut s, clock) = fake_set(50);
        s.add(3).add(1);
        clock.advance(millis(20));
        s.add(2);

        assert_eq!(sorted(s.values()), vec![1, 2, 3]);
        assert_eq!(sorted(s.keys()), vec![1, 2, 3]);
        assert_eq!(sorted(s.entries()), vec![(1, 1), (2, 2), (3, 3)]);
        assert_eq!(sorted((&mut s).into_iter()), vec![1, 2, 3]);

        clock.advance(millis(30));
        assert_eq!(sorted(s.values()), vec![2]);
        assert_eq!(s.into_iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn snapshots_survive_mutation() {
        let (mut s, _clock) = fake_set(50);
        s.extend(vec!['a', 'b', 'c']);

        let captured = s.values();
        s.delete(&'b');

        assert_eq!(sorted(captured), vec!['a', 'b', 'c']);
        assert_eq!(sorted(s.values()), vec!['a', 'c']);
    }

    #[test]
    fn borrowed_lookups() {
        let mut s = ExpiringSet::new(Duration::from_secs(60));
        s.add(String::from("idempotency-key"));
        assert!(s.has("idempotency-key"));
        assert!(s.delete("idempotency-key"));
        assert!(s.is_empty());
    }

    #[quickcheck]
    fn quickcheck_matches_model(ops: Vec<(u8, u8, u8)>) -> bool {
        const TTL_MS: u64 = 50;
        let (mut s, clock) = fake_set::<u8>(TTL_MS);
        let mut model: HashMap<u8, u64> = HashMap::new();
        let mut now = 0;

        for (op, value, arg) in ops {
            let value = value % 8;
            match op % 4 {
                0 => {
                    s.add(value);
                    model.insert(value, now + TTL_MS);
                }
                1 => {
                    let expected = model.remove(&value).map_or(false, |at| at > now);
                    if s.delete(&value) != expected {
                        return false;
                    }
                }
                2 => {
                    let step = u64::from(arg % 30);
                    clock.advance(millis(step));
                    now += step;
                }
                _ => {
                    s.clear();
                    model.clear();
                }
            }
            model.retain(|_, &mut at| at > now);

            if sorted(s.values()) != sorted(model.keys().copied()) || !invariant_holds(&s) {
                return false;
            }
        }
        true
    }
}
