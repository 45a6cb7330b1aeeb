// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timer table keyed by monotonically increasing ids.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub(crate) type TimerCallback = Box<dyn FnMut()>;

struct TimerEntry {
    fire_at: Instant,
    interval: Option<Duration>,
    // Taken out while the callback is being fired; `clear` during the fire
    // removes the entry, which suppresses interval rescheduling.
    callback: Option<TimerCallback>,
}

/// A timer due for firing in the current tick. The callback has been taken
/// out of the table; hand it back via [`TimerQueue::finish_fire`].
pub(crate) struct DueTimer {
    pub id: u64,
    pub interval: Option<Duration>,
    pub callback: TimerCallback,
}

/// Keyed timer table. Due timers fire in ascending `(fire_at, id)` order,
/// so ties resolve in registration order.
pub(crate) struct TimerQueue {
    entries: BTreeMap<u64, TimerEntry>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a timer firing at `fire_at`, repeating every `interval`
    /// when one is given. Returns the timer id.
    pub fn insert(
        &mut self,
        fire_at: Instant,
        interval: Option<Duration>,
        callback: TimerCallback,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            TimerEntry {
                fire_at,
                interval,
                callback: Some(callback),
            },
        );
        id
    }

    /// Remove a timer (timeout or interval). Unknown ids are a no-op.
    pub fn clear(&mut self, id: u64) {
        self.entries.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every timer due at `now`, in firing order.
    pub fn take_due(&mut self, now: Instant) -> Vec<DueTimer> {
        let mut due: Vec<(Instant, u64)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.fire_at <= now && e.callback.is_some())
            .map(|(id, e)| (e.fire_at, *id))
            .collect();
        due.sort();
        due.into_iter()
            .filter_map(|(_, id)| {
                let entry = self.entries.get_mut(&id)?;
                let callback = entry.callback.take()?;
                Some(DueTimer {
                    id,
                    interval: entry.interval,
                    callback,
                })
            })
            .collect()
    }

    /// Return a fired timer to the table: one-shots are removed, intervals
    /// are rescheduled at `now + interval`. If the entry was cleared while
    /// its callback ran, the callback is dropped.
    pub fn finish_fire(&mut self, fired: DueTimer, now: Instant) {
        let Some(entry) = self.entries.get_mut(&fired.id) else {
            return;
        };
        match fired.interval {
            Some(interval) => {
                entry.fire_at = now + interval;
                entry.callback = Some(fired.callback);
            }
            None => {
                self.entries.remove(&fired.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn noop() -> TimerCallback {
        Box::new(|| {})
    }

    #[test]
    fn empty_queue_has_nothing_due() {
        let mut q = TimerQueue::new();
        assert!(q.is_empty());
        assert!(q.take_due(Instant::now()).is_empty());
    }

    #[test]
    fn ids_increase_from_one() {
        let mut q = TimerQueue::new();
        let base = Instant::now();
        assert_eq!(q.insert(base, None, noop()), 1);
        assert_eq!(q.insert(base, None, noop()), 2);
        assert_eq!(q.insert(base, None, noop()), 3);
    }

    #[test]
    fn due_order_is_fire_time_then_id() {
        let mut q = TimerQueue::new();
        let base = Instant::now();
        let at = |ms| base + Duration::from_millis(ms);
        let a = q.insert(at(200), None, noop());
        let b = q.insert(at(100), None, noop());
        let c = q.insert(at(100), None, noop());
        let due = q.take_due(at(300));
        let ids: Vec<u64> = due.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![b, c, a]);
    }

    #[test]
    fn not_yet_due_timers_stay() {
        let mut q = TimerQueue::new();
        let base = Instant::now();
        q.insert(base + Duration::from_millis(100), None, noop());
        assert!(q.take_due(base + Duration::from_millis(50)).is_empty());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn one_shot_is_removed_after_finish() {
        let mut q = TimerQueue::new();
        let base = Instant::now();
        q.insert(base, None, noop());
        let mut due = q.take_due(base);
        assert_eq!(due.len(), 1);
        q.finish_fire(due.pop().unwrap(), base);
        assert!(q.is_empty());
    }

    #[test]
    fn interval_reschedules_from_now() {
        let mut q = TimerQueue::new();
        let base = Instant::now();
        let iv = Duration::from_millis(50);
        q.insert(base + iv, Some(iv), noop());

        // Fire late, at +80ms; next fire should be 80+50 = 130ms, not 100ms.
        let late = base + Duration::from_millis(80);
        let mut due = q.take_due(late);
        q.finish_fire(due.pop().unwrap(), late);
        assert_eq!(q.len(), 1);
        assert!(q.take_due(base + Duration::from_millis(120)).is_empty());
        assert_eq!(q.take_due(base + Duration::from_millis(130)).len(), 1);
    }

    #[test]
    fn clear_during_fire_suppresses_interval_reschedule() {
        let mut q = TimerQueue::new();
        let base = Instant::now();
        let iv = Duration::from_millis(10);
        let id = q.insert(base, Some(iv), noop());
        let mut due = q.take_due(base);
        // The callback cleared its own timer while running.
        q.clear(id);
        q.finish_fire(due.pop().unwrap(), base);
        assert!(q.is_empty());
    }

    #[test]
    fn clear_unknown_id_is_noop() {
        let mut q = TimerQueue::new();
        q.clear(999);
        assert!(q.is_empty());
    }

    #[test]
    fn callbacks_survive_the_round_trip() {
        let mut q = TimerQueue::new();
        let base = Instant::now();
        let iv = Duration::from_millis(5);
        let hits: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));
        let hits2 = Rc::clone(&hits);
        q.insert(base, Some(iv), Box::new(move || *hits2.borrow_mut() += 1));

        for round in 0..3u64 {
            let now = base + Duration::from_millis(round * 5);
            for mut due in q.take_due(now) {
                (due.callback)();
                q.finish_fire(due, now);
            }
        }
        assert_eq!(*hits.borrow(), 3);
    }
}
