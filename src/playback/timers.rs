//! Deadline-ordered one-shot timers for the session loop.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Timer handle allocated by the playback controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug, Default)]
pub struct TimerQueue {
    by_deadline: BTreeSet<(Instant, TimerId)>,
    deadlines: HashMap<TimerId, Instant>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `id` to fire `after` from `now`. Rescheduling an id replaces
    /// its earlier deadline.
    pub fn schedule(&mut self, id: TimerId, now: Instant, after: Duration) {
        self.cancel(id);
        let deadline = now + after;
        self.by_deadline.insert((deadline, id));
        self.deadlines.insert(id, deadline);
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.by_deadline.remove(&(deadline, id)),
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.by_deadline.clear();
        self.deadlines.clear();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_deadline.first().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due = Vec::new();
        while let Some(&(deadline, id)) = self.by_deadline.first() {
            if deadline > now {
                break;
            }
            self.by_deadline.pop_first();
            self.deadlines.remove(&id);
            due.push(id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }
}
