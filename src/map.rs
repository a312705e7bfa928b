use std::borrow::Borrow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::mem;
use std::time::{Duration, Instant};
use std::vec;

use log::{debug, trace};

use crate::timer::{TimerHandle, TimerQueue};
use crate::{Clock, Expiring, SystemClock, Ttl};

#[derive(Debug)]
struct Slot<V> {
    value: V,
    timer: TimerHandle,
    // First-insertion position; overwriting a key keeps it.
    order: u64,
}

/// A map whose entries are evicted `ttl` after they were last `set`.
///
/// A key is present exactly when it has a live eviction timer in `timers`, and it has exactly
/// one. Reads take `&mut self` because they run the evictions that are due before answering.
#[derive(Debug)]
pub struct ExpiringMap<K, V, C = SystemClock> {
    ttl: Ttl,
    clock: C,
    entries: HashMap<K, Slot<V>>,
    timers: TimerQueue<K>,
    next_order: u64,
}

impl<K, V> ExpiringMap<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
{
    pub fn new(ttl: impl Into<Ttl>) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<K, V, C> ExpiringMap<K, V, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    pub fn with_clock(ttl: impl Into<Ttl>, clock: C) -> Self {
        let timers = TimerQueue::new(clock.now());
        ExpiringMap {
            ttl: ttl.into(),
            clock,
            entries: HashMap::new(),
            timers,
            next_order: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl.as_duration()
    }

    /// When the earliest pending eviction is due. Doesn't run any evictions itself.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Evicts every entry whose timer is due, returning how many were evicted.
    pub fn run_pending_timers(&mut self) -> usize {
        let expired = self.timers.fire_due(self.clock.now());
        if expired.is_empty() {
            return 0;
        }
        let evicted = expired
            .iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count();
        debug!(
            "Evicted {} expired map entries (ttl {}), {} remaining",
            evicted,
            self.ttl,
            self.entries.len()
        );
        evicted
    }

    /// Inserts or overwrites `key`. Either way the entry now expires a full TTL from now.
    pub fn set(&mut self, key: K, value: V) -> &mut Self {
        self.run_pending_timers();
        let timer = self
            .timers
            .schedule(self.clock.now(), self.ttl.as_duration(), key.clone());
        match self.entries.entry(key) {
            Entry::Occupied(mut occ) => {
                let slot = occ.get_mut();
                let stale = mem::replace(&mut slot.timer, timer);
                self.timers.cancel(stale);
                slot.value = value;
                trace!("Refreshed map entry, expires in {}", self.ttl);
            }
            Entry::Vacant(vac) => {
                vac.insert(Slot {
                    value,
                    timer,
                    order: self.next_order,
                });
                self.next_order += 1;
                trace!("Inserted map entry, expires in {}", self.ttl);
            }
        }
        self
    }

    /// Looks up `key` without refreshing its TTL.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.run_pending_timers();
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn has<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.run_pending_timers();
        self.entries.contains_key(key)
    }

    /// Removes `key` and cancels its eviction. Returns whether it was present.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.run_pending_timers();
        match self.entries.remove(key) {
            Some(slot) => {
                self.timers.cancel(slot.timer);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        let cancelled = self.timers.clear();
        self.entries.clear();
        trace!("Cleared map, cancelled {} timers", cancelled);
    }

    pub fn len(&mut self) -> usize {
        self.run_pending_timers();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn ordered(&self) -> Vec<(&K, &Slot<V>)> {
        let mut slots: Vec<_> = self.entries.iter().collect();
        slots.sort_unstable_by_key(|(_, slot)| slot.order);
        slots
    }

    /// Snapshot of the live keys, in insertion order.
    pub fn keys(&mut self) -> vec::IntoIter<K> {
        self.run_pending_timers();
        self.ordered()
            .into_iter()
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl<K, V, C> ExpiringMap<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    /// Snapshot of the live values, in insertion order of their keys.
    pub fn values(&mut self) -> vec::IntoIter<V> {
        self.run_pending_timers();
        self.ordered()
            .into_iter()
            .map(|(_, slot)| slot.value.clone())
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Snapshot of the live entries, in insertion order. Mutating the map afterwards doesn't
    /// change what the returned iterator yields.
    pub fn entries(&mut self) -> vec::IntoIter<(K, V)> {
        self.run_pending_timers();
        self.ordered()
            .into_iter()
            .map(|(key, slot)| (key.clone(), slot.value.clone()))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl<K, V, C> Expiring for ExpiringMap<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    type Item = (K, V);

    fn ttl(&self) -> Duration {
        ExpiringMap::ttl(self)
    }

    fn len(&mut self) -> usize {
        ExpiringMap::len(self)
    }

    fn clear(&mut self) {
        ExpiringMap::clear(self)
    }

    fn run_pending_timers(&mut self) -> usize {
        ExpiringMap::run_pending_timers(self)
    }

    fn next_expiry(&self) -> Option<Instant> {
        ExpiringMap::next_expiry(self)
    }

    fn snapshot(&mut self) -> Vec<(K, V)> {
        self.entries().collect()
    }
}

impl<'a, K, V, C> IntoIterator for &'a mut ExpiringMap<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    type Item = (K, V);
    type IntoIter = vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries()
    }
}

/// Consumes the map, yielding the entries still live at that moment in insertion order.
impl<K, V, C> IntoIterator for ExpiringMap<K, V, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    type Item = (K, V);
    type IntoIter = vec::IntoIter<(K, V)>;

    fn into_iter(mut self) -> Self::IntoIter {
        self.run_pending_timers();
        let mut slots: Vec<_> = self.entries.into_iter().collect();
        slots.sort_unstable_by_key(|(_, slot)| slot.order);
        slots
            .into_iter()
            .map(|(key, slot)| (key, slot.value))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl<K, V, C> Extend<(K, V)> for ExpiringMap<K, V, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}
