//! Timer manager
//!
//! Timers are kept in a BTreeSet ordered by (deadline, id), so the nearest
//! expiry is always the first entry and insertion/removal are O(log n).
//! The caller supplies `now`; the manager never reads the clock itself.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Timer handle. Ids are never reused within one manager.
pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
    deadline: Instant,
    id: TimerId,
}

#[derive(Debug)]
struct TimerEntry<T> {
    data: T,
    deadline: Option<Instant>,
}

/// Deadline timer manager carrying a user payload per timer
#[derive(Debug)]
pub struct TimerMgr<T> {
    timers: HashMap<TimerId, TimerEntry<T>>,
    tree: BTreeSet<TimerKey>,
    next_id: TimerId,
}

impl<T> Default for TimerMgr<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerMgr<T> {
    pub fn new() -> Self {
        TimerMgr {
            timers: HashMap::new(),
            tree: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Add a stopped timer carrying `data`
    pub fn add(&mut self, data: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.timers.insert(id, TimerEntry { data, deadline: None });
        id
    }

    /// Delete a timer, stopping it first. Returns its payload.
    pub fn delete(&mut self, id: TimerId) -> Option<T> {
        self.stop(id);
        self.timers.remove(&id).map(|entry| entry.data)
    }

    /// (Re)start a timer so it expires `duration` after `now`.
    ///
    /// Returns false if the timer does not exist.
    pub fn start(&mut self, id: TimerId, duration: Duration, now: Instant) -> bool {
        let Some(entry) = self.timers.get_mut(&id) else {
            return false;
        };
        if let Some(deadline) = entry.deadline.take() {
            self.tree.remove(&TimerKey { deadline, id });
        }
        let deadline = now + duration;
        entry.deadline = Some(deadline);
        self.tree.insert(TimerKey { deadline, id });
        true
    }

    pub fn stop(&mut self, id: TimerId) {
        if let Some(entry) = self.timers.get_mut(&id) {
            if let Some(deadline) = entry.deadline.take() {
                self.tree.remove(&TimerKey { deadline, id });
            }
        }
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.timers
            .get(&id)
            .map(|entry| entry.deadline.is_some())
            .unwrap_or(false)
    }

    /// Deadline of the earliest running timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tree.first().map(|key| key.deadline)
    }

    /// Number of running timers
    pub fn count(&self) -> usize {
        self.tree.len()
    }

    /// Number of timers, running or not
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<T: Clone> TimerMgr<T> {
    /// Stop every timer whose deadline is at or before `now` and return them
    /// in deadline order. Expired timers stay allocated and may be restarted.
    pub fn expire(&mut self, now: Instant) -> Vec<(TimerId, T)> {
        let mut expired = Vec::new();
        while let Some(key) = self.tree.first().copied() {
            if key.deadline > now {
                break;
            }
            self.tree.remove(&key);
            if let Some(entry) = self.timers.get_mut(&key.id) {
                entry.deadline = None;
                expired.push((key.id, entry.data.clone()));
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_add_delete() {
        let mut mgr = TimerMgr::new();
        let id = mgr.add(42);
        assert_eq!(mgr.len(), 1);
        assert!(!mgr.is_running(id));

        assert_eq!(mgr.delete(id), Some(42));
        assert!(mgr.is_empty());
        assert_eq!(mgr.delete(id), None);
    }

    #[test]
    fn test_start_stop() {
        let now = Instant::now();
        let mut mgr = TimerMgr::new();
        let id = mgr.add(());

        assert!(mgr.start(id, ms(100), now));
        assert!(mgr.is_running(id));
        assert_eq!(mgr.count(), 1);

        mgr.stop(id);
        assert!(!mgr.is_running(id));
        assert_eq!(mgr.count(), 0);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_start_unknown_timer() {
        let mut mgr: TimerMgr<()> = TimerMgr::new();
        assert!(!mgr.start(7, ms(10), Instant::now()));
    }

    #[test]
    fn test_restart_replaces_deadline() {
        let now = Instant::now();
        let mut mgr = TimerMgr::new();
        let id = mgr.add(());

        mgr.start(id, ms(100), now);
        mgr.start(id, ms(200), now);
        assert_eq!(mgr.count(), 1);
        assert_eq!(mgr.next_deadline(), Some(now + ms(200)));
    }

    #[test]
    fn test_next_deadline() {
        let now = Instant::now();
        let mut mgr = TimerMgr::new();
        assert_eq!(mgr.next_deadline(), None);

        let id1 = mgr.add(());
        let id2 = mgr.add(());
        mgr.start(id1, ms(200), now);
        mgr.start(id2, ms(100), now);
        assert_eq!(mgr.next_deadline(), Some(now + ms(100)));

        mgr.delete(id2);
        assert_eq!(mgr.next_deadline(), Some(now + ms(200)));
    }

    #[test]
    fn test_expire_in_deadline_order() {
        let now = Instant::now();
        let mut mgr = TimerMgr::new();
        let id1 = mgr.add("first");
        let id2 = mgr.add("second");
        let id3 = mgr.add("third");

        mgr.start(id3, ms(300), now);
        mgr.start(id2, ms(200), now);
        mgr.start(id1, ms(100), now);

        let expired = mgr.expire(now + ms(250));
        assert_eq!(expired, vec![(id1, "first"), (id2, "second")]);
        assert!(mgr.is_running(id3));
        assert!(!mgr.is_running(id1));

        assert!(mgr.expire(now + ms(250)).is_empty());
    }

    #[test]
    fn test_expired_timer_can_restart() {
        let now = Instant::now();
        let mut mgr = TimerMgr::new();
        let id = mgr.add(1u8);

        mgr.start(id, ms(10), now);
        assert_eq!(mgr.expire(now + ms(10)).len(), 1);

        mgr.start(id, ms(10), now + ms(10));
        assert_eq!(mgr.expire(now + ms(20)), vec![(id, 1u8)]);
    }

    #[test]
    fn test_deleted_timer_never_fires() {
        let now = Instant::now();
        let mut mgr = TimerMgr::new();
        let id = mgr.add(());
        mgr.start(id, ms(10), now);
        mgr.delete(id);

        assert!(mgr.expire(now + ms(100)).is_empty());
        assert_eq!(mgr.next_deadline(), None);
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Every started timer expires exactly once, in deadline order.
            #[test]
            fn prop_expire_once_in_order(delays in prop::collection::vec(0u64..1000, 1..32)) {
                let now = Instant::now();
                let mut mgr = TimerMgr::new();
                for (i, delay) in delays.iter().enumerate() {
                    let id = mgr.add(i);
                    mgr.start(id, ms(*delay), now);
                }

                let expired = mgr.expire(now + ms(1000));
                prop_assert_eq!(expired.len(), delays.len());
                for pair in expired.windows(2) {
                    prop_assert!(delays[pair[0].1] <= delays[pair[1].1]);
                }
                prop_assert_eq!(mgr.count(), 0);
                prop_assert!(mgr.expire(now + ms(5000)).is_empty());
            }
        }
    }
}
