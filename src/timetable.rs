//! Task timetable
//!
//! Deadline-ordered multimap of pending entries. Entries sharing a
//! deadline keep their insertion order through a monotonically
//! increasing sequence number in the key.

use std::collections::BTreeMap;
use std::time::Instant;

pub(crate) struct Timetable<T> {
    entries: BTreeMap<(Instant, u64), T>,
    seq: u64,
}

impl<T> Timetable<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            seq: 0,
        }
    }

    /// Queue `value` for execution at `at`.
    pub(crate) fn insert(&mut self, at: Instant, value: T) {
        let seq = self.seq;
        self.seq += 1;
        self.entries.insert((at, seq), value);
    }

    /// Deadline of the earliest entry.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|&(at, _)| at)
    }

    /// Extract the earliest entry by move, provided its deadline has been
    /// reached.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<(Instant, T)> {
        let (&(at, _), _) = self.entries.first_key_value()?;
        if at > now {
            return None;
        }
        self.entries.pop_first().map(|((at, _), value)| (at, value))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
