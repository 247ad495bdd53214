/// Bytes counted during one fixed-width accounting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot {
    pub bytes: i32,
    /// Start of the interval, in ms.
    pub start: i64,
}

/// A current/previous pair of accounting slots at one granularity.
///
/// The window keeps two of these: one-second slots for byte aging and
/// bitrate estimation, and `send_interval`-wide buckets for tracking the
/// stream's lead over real time. Only two slots ever exist; when the
/// current one is closed it becomes `previous`, and whatever was previous
/// is released.
#[derive(Debug, Clone)]
pub struct SlotPair {
    current: Slot,
    previous: Slot,
    width: i64,
    anchored: bool,
    has_previous: bool,
}

impl SlotPair {
    pub fn new(width_ms: u32) -> Self {
        debug_assert!(width_ms > 0, "slot width must be positive");
        Self {
            current: Slot::default(),
            previous: Slot::default(),
            width: i64::from(width_ms.max(1)),
            anchored: false,
            has_previous: false,
        }
    }

    pub fn current(&self) -> Slot {
        self.current
    }

    pub fn previous(&self) -> Slot {
        self.previous
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    /// Whether the current slot has a start time yet.
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Whether `previous` holds a slot that was actually closed.
    pub fn has_previous(&self) -> bool {
        self.has_previous
    }

    /// Start the current slot at `at` if no slot has been started yet.
    pub fn anchor(&mut self, at: i64) {
        if !self.anchored {
            self.current.start = at;
            self.anchored = true;
        }
    }

    /// End of the current slot (start of the next one).
    pub fn next_boundary(&self) -> i64 {
        self.current.start + self.width
    }

    pub fn add(&mut self, bytes: i32) {
        self.current.bytes = self.current.bytes.saturating_add(bytes);
    }

    /// Bytes held by both slots.
    pub fn total(&self) -> i32 {
        self.current.bytes.saturating_add(self.previous.bytes)
    }

    /// Advance to the slot containing `now`.
    ///
    /// Returns `None` if `now` still falls inside the current slot, or
    /// `Some(released)` with the bytes that dropped out of the pair. A
    /// single boundary crossing releases the old `previous`; crossing two
    /// or more releases both slots. New slots start on boundaries, not at
    /// `now`.
    pub fn roll_to(&mut self, now: i64) -> Option<i32> {
        if !self.anchored {
            return None;
        }
        let crossed = (now - self.current.start).div_euclid(self.width);
        if crossed <= 0 {
            return None;
        }

        let released = if crossed == 1 {
            let released = self.previous.bytes;
            self.previous = self.current;
            released
        } else {
            let released = self.total();
            self.previous = Slot {
                bytes: 0,
                start: self.current.start + (crossed - 1) * self.width,
            };
            released
        };
        self.current = Slot {
            bytes: 0,
            start: self.current.start + crossed * self.width,
        };
        self.has_previous = true;
        Some(released)
    }

    /// Close the current slot early and start a fresh one at `at`.
    ///
    /// Used when a new write burst begins, so the burst is measured from
    /// its own start instead of against a stale slot.
    pub fn begin_new(&mut self, at: i64) {
        if self.anchored {
            self.previous = self.current;
            self.has_previous = true;
        }
        self.current = Slot { bytes: 0, start: at };
        self.anchored = true;
    }

    pub fn reset(&mut self) {
        self.current = Slot::default();
        self.previous = Slot::default();
        self.anchored = false;
        self.has_previous = false;
    }
}
