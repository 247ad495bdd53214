//! Millisecond time sources.
//!
//! The pacing engine never reads a clock itself; the delivery loop reads one
//! of these once per pass and hands the value down. All sessions of a
//! server share the same clock so that times stay comparable and
//! non-decreasing.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Current time in milliseconds. Never decreases.
    fn now_ms(&self) -> i64;
}

/// Wall-clock milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// Hand-driven clock for tests and simulation. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    /// Move time forward. Going backwards is ignored.
    pub fn set(&self, ms: i64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        debug_assert!(delta_ms >= 0, "clock cannot move backwards");
        self.now.fetch_add(delta_ms.max(0), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
