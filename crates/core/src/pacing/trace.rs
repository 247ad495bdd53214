/// Number of samples kept by [`OverbufferTrace`].
pub const TRACE_CAPACITY: usize = 15;

/// How far ahead of real time a packet was when it was admitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeAheadSample {
    pub time_ahead_ms: i64,
    pub current_time_ms: i64,
}

/// Fixed-size history of recent time-ahead samples, oldest first.
///
/// Diagnostic only: lets an operator see how hard a stream is being
/// overbuffered without turning on per-packet trace logging.
#[derive(Debug, Clone)]
pub struct OverbufferTrace {
    samples: [TimeAheadSample; TRACE_CAPACITY],
    next: usize,
    len: usize,
}

impl OverbufferTrace {
    pub fn new() -> Self {
        Self {
            samples: [TimeAheadSample::default(); TRACE_CAPACITY],
            next: 0,
            len: 0,
        }
    }

    pub fn record(&mut self, time_ahead_ms: i64, current_time_ms: i64) {
        self.samples[self.next] = TimeAheadSample {
            time_ahead_ms,
            current_time_ms,
        };
        self.next = (self.next + 1) % TRACE_CAPACITY;
        self.len = (self.len + 1).min(TRACE_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.next = 0;
        self.len = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = TimeAheadSample> + '_ {
        let first = (self.next + TRACE_CAPACITY - self.len) % TRACE_CAPACITY;
        (0..self.len).map(move |i| self.samples[(first + i) % TRACE_CAPACITY])
    }
}

impl Default for OverbufferTrace {
    fn default() -> Self {
        Self::new()
    }
}
