//! Bytes sent ahead of playback, grouped by when they fall due.

use std::collections::VecDeque;

/// Bytes whose transmit times fall in `[start, start + width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueEntry {
    pub start: i64,
    /// Latest transmit time merged into the entry.
    pub due: i64,
    pub bytes: i32,
}

/// FIFO of outstanding bytes keyed by transmit time.
///
/// Packets leave a track in transmit-time order, so entries are released
/// from the front once their due time has passed. Capacity is fixed at
/// construction; when it is reached new bytes are merged into the last
/// entry, which only delays their release.
#[derive(Debug, Clone)]
pub struct DueLedger {
    entries: VecDeque<DueEntry>,
    capacity: usize,
    width: i64,
    total: i32,
}

impl DueLedger {
    pub fn new(width_ms: u32, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            width: i64::from(width_ms.max(1)),
            total: 0,
        }
    }

    /// Bytes not yet released.
    pub fn total(&self) -> i32 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn front(&self) -> Option<DueEntry> {
        self.entries.front().copied()
    }

    /// Count `bytes` until `due` has passed.
    pub fn record(&mut self, due: i64, bytes: i32) {
        self.total = self.total.saturating_add(bytes);
        let full = self.entries.len() >= self.capacity;
        if let Some(back) = self.entries.back_mut()
            && (full || due < back.start + self.width)
        {
            back.due = back.due.max(due);
            back.bytes = back.bytes.saturating_add(bytes);
            return;
        }
        self.entries.push_back(DueEntry {
            start: due,
            due,
            bytes,
        });
    }

    /// Release every entry due strictly before `now`. Returns the bytes
    /// released.
    pub fn release_before(&mut self, now: i64) -> i32 {
        let mut released = 0i32;
        while let Some(front) = self.entries.front() {
            if front.due >= now {
                break;
            }
            released = released.saturating_add(front.bytes);
            self.entries.pop_front();
        }
        self.total = self.total.saturating_sub(released).max(0);
        released
    }

    /// Earliest time at which at least `bytes` will have been released.
    /// `None` when nothing is outstanding.
    pub fn release_time_for(&self, bytes: i32) -> Option<i64> {
        let mut freed = 0i32;
        for entry in &self.entries {
            freed = freed.saturating_add(entry.bytes);
            if freed >= bytes {
                return Some(entry.due + 1);
            }
        }
        self.entries.back().map(|entry| entry.due + 1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
    }
}
