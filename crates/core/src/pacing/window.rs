use crate::config::PacingConfig;

use super::ledger::DueLedger;
use super::slot::SlotPair;
use super::trace::{OverbufferTrace, TimeAheadSample};

/// Width of the slots used for bitrate estimation.
const ONE_SECOND_MS: u32 = 1000;

/// Upper bound on due-time entries kept per window.
const MAX_DUE_ENTRIES: usize = 1024;

/// Accounting phase of an [`OverbufferWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Freshly constructed or reset; nothing has been measured yet.
    Idle,
    /// At least one send decision or packet has been accounted.
    Accounting,
}

/// Send-ahead rate controller for one RTP track.
///
/// An RTSP server may push media to a client faster than real time to fill
/// the client's receive buffer ("overbuffering"). The window decides, per
/// packet, whether that is allowed right now:
///
/// - **Byte budget**: at most [`window_size`](Self::window_size) bytes may
///   be outstanding. Sent bytes count until their packet's transmit time
///   has passed, so a packet sent on time is released almost at once and
///   only data sent ahead of playback fills the client's buffer.
/// - **Rate**: media may run ahead of real time by at most
///   `overbuffer_rate ×` playback speed. Each `send_interval` bucket may
///   extend the media frontier by `send_ahead_duration`
///   (`overbuffer_rate × send_interval`) past the lead carried in from the
///   previous bucket. The lead decays one millisecond per millisecond of
///   real time. A write burst opens its own bucket, carrying the lead
///   reached by its first packet.
/// - **Ceiling**: no packet goes out more than `max_send_ahead` before its
///   transmit time, and no deferral ever points further out than
///   `now + max_send_ahead`. A zero ceiling turns send-ahead off: future
///   packets are deferred to their transmit time.
///
/// ## Usage from a send loop
///
/// ```
/// use overbuffer::pacing::OverbufferWindow;
///
/// let mut window = OverbufferWindow::new(1000, 65536, 10, 1.5);
///
/// // Packet due now, plenty of budget: send it.
/// assert_eq!(window.check_transmit_time(0, 0, 1400), None);
/// window.add_packet_to_window(1400);
/// assert_eq!(window.available_space(), 64136);
/// ```
///
/// All times are caller-supplied milliseconds from a single monotonic
/// clock. The window never reads a clock, never allocates after
/// construction and never blocks. It is not `Sync`-shared: one send path
/// owns it and serializes every call.
#[derive(Debug, Clone)]
pub struct OverbufferWindow {
    window_size: i32,
    send_interval_ms: u32,

    /// Outstanding bytes by transmit time.
    outstanding: DueLedger,
    /// Transmit time of the packet admitted last and not yet added.
    admitted_transmit_time: Option<i64>,
    seconds: SlotPair,
    buckets: SlotPair,

    /// Stream lead measured at `lead_stamp`.
    bucket_time_ahead: i64,
    /// Lead carried into the current bucket when it opened.
    previous_bucket_time_ahead: i64,
    lead_stamp: i64,

    max_send_ahead_ms: u32,

    write_burst_beginning: bool,
    overbuffering_enabled: bool,

    overbuffer_rate: f32,
    send_ahead_duration_ms: u32,

    window_begin: Option<i64>,
    state: WindowState,
    /// Latest time supplied by the caller.
    last_time: i64,
    trace: Option<OverbufferTrace>,
}

impl OverbufferWindow {
    /// Create a window for one track.
    ///
    /// `send_interval_ms` must be non-zero and `overbuffer_rate` at least
    /// 1.0; both are checked by [`PacingConfig::validate`]. A rate below
    /// 1.0 (or NaN) is treated as 1.0.
    pub fn new(
        send_interval_ms: u32,
        initial_window_size: u32,
        max_send_ahead_secs: u32,
        overbuffer_rate: f32,
    ) -> Self {
        debug_assert!(send_interval_ms > 0, "send interval must be positive");
        debug_assert!(
            overbuffer_rate >= 1.0,
            "overbuffer rate must be at least 1.0, got {overbuffer_rate}"
        );

        let send_interval_ms = send_interval_ms.max(1);
        let overbuffer_rate = if overbuffer_rate >= 1.0 {
            overbuffer_rate
        } else {
            1.0
        };
        let send_ahead_duration_ms =
            (f64::from(overbuffer_rate) * f64::from(send_interval_ms)).ceil() as u32;
        let max_send_ahead_ms = max_send_ahead_secs.saturating_mul(1000);
        let due_entries =
            ((max_send_ahead_ms / send_interval_ms) as usize + 2).min(MAX_DUE_ENTRIES);

        tracing::debug!(
            send_interval_ms,
            window_size = initial_window_size,
            max_send_ahead_ms,
            overbuffer_rate,
            send_ahead_duration_ms,
            "overbuffer window created"
        );

        Self {
            window_size: clamp_bytes(initial_window_size as usize),
            send_interval_ms,
            outstanding: DueLedger::new(send_interval_ms, due_entries),
            admitted_transmit_time: None,
            seconds: SlotPair::new(ONE_SECOND_MS),
            buckets: SlotPair::new(send_interval_ms),
            bucket_time_ahead: 0,
            previous_bucket_time_ahead: 0,
            lead_stamp: 0,
            max_send_ahead_ms,
            write_burst_beginning: false,
            overbuffering_enabled: true,
            overbuffer_rate,
            send_ahead_duration_ms,
            window_begin: None,
            state: WindowState::Idle,
            last_time: i64::MIN,
            trace: None,
        }
    }

    /// Create a window from a [`PacingConfig`], including its on/off switch
    /// and trace setting.
    pub fn from_config(config: &PacingConfig) -> Self {
        let mut window = Self::new(
            config.send_interval_ms,
            config.window_size_bytes,
            config.max_send_ahead_secs,
            config.overbuffer_rate,
        );
        window.overbuffering_enabled = config.overbuffering_enabled;
        if config.trace_time_ahead {
            window.trace = Some(OverbufferTrace::new());
        }
        window
    }

    /// Clear all accounting state after a playback discontinuity (seek,
    /// restart, pause → play).
    ///
    /// Configuration, the current window size and the overbuffering switch
    /// are kept.
    pub fn reset(&mut self) {
        self.outstanding.clear();
        self.admitted_transmit_time = None;
        self.seconds.reset();
        self.buckets.reset();
        self.bucket_time_ahead = 0;
        self.previous_bucket_time_ahead = 0;
        self.lead_stamp = 0;
        self.write_burst_beginning = false;
        self.window_begin = None;
        self.state = WindowState::Idle;
        if let Some(trace) = &mut self.trace {
            trace.clear();
        }
        tracing::debug!(window_size = self.window_size, "overbuffer window reset");
    }

    pub fn send_interval(&self) -> u32 {
        self.send_interval_ms
    }

    pub fn window_size(&self) -> i32 {
        self.window_size
    }

    /// Bytes still counted against the budget.
    pub fn bytes_sent_since_report(&self) -> i32 {
        self.outstanding.total()
    }

    /// Remaining byte budget. Negative while over budget.
    pub fn available_space(&self) -> i32 {
        self.window_size.saturating_sub(self.outstanding.total())
    }

    /// Replace the byte budget. Accounting is untouched, so shrinking the
    /// window can leave it over budget and growing it frees space at once.
    pub fn set_window_size(&mut self, window_size_bytes: u32) {
        let window_size = clamp_bytes(window_size_bytes as usize);
        if window_size != self.window_size {
            tracing::debug!(
                old = self.window_size,
                new = window_size,
                "overbuffer window resized"
            );
        }
        self.window_size = window_size;
    }

    pub fn max_send_ahead(&self) -> u32 {
        self.max_send_ahead_ms
    }

    pub fn overbuffer_rate(&self) -> f32 {
        self.overbuffer_rate
    }

    /// Media time one bucket may add to the frontier: `rate × send_interval`.
    pub fn send_ahead_duration(&self) -> u32 {
        self.send_ahead_duration_ms
    }

    pub fn turn_on_overbuffering(&mut self) {
        self.overbuffering_enabled = true;
    }

    pub fn turn_off_overbuffering(&mut self) {
        self.overbuffering_enabled = false;
    }

    pub fn set_overbuffering_enabled(&mut self, enabled: bool) {
        self.overbuffering_enabled = enabled;
    }

    pub fn is_overbuffering_enabled(&self) -> bool {
        self.overbuffering_enabled
    }

    /// Flag the next [`add_packet_to_window`](Self::add_packet_to_window)
    /// as the first write of a burst.
    ///
    /// The burst then opens its own bucket instead of being measured
    /// against the bucket that was open while the sender was idle.
    pub fn mark_beginning_of_write_burst(&mut self) {
        self.write_burst_beginning = true;
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Start of the current accounting epoch, if one has begun.
    pub fn window_begin(&self) -> Option<i64> {
        self.window_begin
    }

    /// Stream lead recorded by the latest admission that raised it.
    pub fn bucket_time_ahead(&self) -> i64 {
        self.bucket_time_ahead
    }

    /// Lead carried into the current bucket.
    pub fn previous_bucket_time_ahead(&self) -> i64 {
        self.previous_bucket_time_ahead
    }

    /// Bits sent during the last completed one-second slot.
    pub fn sustained_bitrate_bps(&self) -> Option<u64> {
        self.seconds
            .has_previous()
            .then(|| self.seconds.previous().bytes.max(0) as u64 * 8)
    }

    /// Recently admitted time-ahead samples, oldest first. Empty unless the
    /// window was built with `trace_time_ahead`.
    pub fn overbuffer_times(&self) -> impl Iterator<Item = TimeAheadSample> + '_ {
        self.trace.iter().flat_map(|trace| trace.iter())
    }

    /// Account for a packet that has just been sent.
    ///
    /// Call only for packets that actually went out, never for deferred
    /// ones. The bytes count until the transmit time of the packet last
    /// admitted by [`check_transmit_time`](Self::check_transmit_time) has
    /// passed, or until the current clock has passed if there was none.
    pub fn add_packet_to_window(&mut self, packet_size: usize) {
        let size = clamp_bytes(packet_size);
        let at = self.clock();
        let due = self.admitted_transmit_time.take().unwrap_or(at);
        self.state = WindowState::Accounting;
        self.seconds.anchor(at);
        self.buckets.anchor(at);

        if self.write_burst_beginning {
            self.write_burst_beginning = false;
            self.previous_bucket_time_ahead = self.lead_at(at);
            self.buckets.begin_new(at);
            tracing::trace!(
                at,
                carried_lead = self.previous_bucket_time_ahead,
                "write burst bucket opened"
            );
        }

        self.outstanding.record(due, size);
        self.seconds.add(size);
        self.buckets.add(size);
    }

    /// Bring the accounting up to `current_time`.
    ///
    /// Releases bytes whose transmit time has passed, closes elapsed
    /// one-second slots and closes elapsed buckets, carrying the decayed
    /// lead into the new one. Called by [`check_transmit_time`](Self::check_transmit_time);
    /// call it directly on a timer while idle so the budget keeps draining.
    pub fn empty_out_window(&mut self, current_time: i64) {
        debug_assert!(
            current_time >= self.last_time,
            "clock went backwards: {current_time} < {}",
            self.last_time
        );
        self.last_time = self.last_time.max(current_time);

        if self.window_begin.is_none() {
            self.window_begin = Some(current_time);
            self.state = WindowState::Accounting;
        }
        self.seconds.anchor(current_time);
        self.buckets.anchor(current_time);

        self.outstanding.release_before(current_time);
        self.seconds.roll_to(current_time);
        if self.buckets.roll_to(current_time).is_some() {
            self.previous_bucket_time_ahead = self.lead_at(self.buckets.current().start);
        }
    }

    /// Decide whether a packet may go out at `current_time`.
    ///
    /// Returns `None` to send now, or `Some(t)` with the earliest time the
    /// packet may be reconsidered. `t` is always in
    /// `(current_time, current_time + max_send_ahead]`. With a zero ceiling
    /// the upper bound is dropped instead: a future packet waits for its
    /// transmit time. The caller re-checks at `t`; nothing fires on its own.
    ///
    /// With overbuffering off, always returns `None`.
    pub fn check_transmit_time(
        &mut self,
        transmit_time: i64,
        current_time: i64,
        packet_size: usize,
    ) -> Option<i64> {
        if !self.overbuffering_enabled {
            return None;
        }
        self.empty_out_window(current_time);

        let size = clamp_bytes(packet_size);
        let time_ahead = transmit_time - current_time;
        let max_ahead = i64::from(self.max_send_ahead_ms);
        let mut earliest: Option<i64> = None;

        if time_ahead > max_ahead {
            earliest = later(earliest, transmit_time - max_ahead);
        }
        if transmit_time > self.bucket_media_cap() {
            earliest = later(earliest, self.buckets.next_boundary());
        }
        if !self.has_room_for(size) {
            earliest = later(earliest, self.space_available_at(size, current_time));
        }

        match earliest {
            None => {
                self.record_admission(transmit_time, current_time);
                None
            }
            Some(t) => {
                let deferred = t.max(current_time + 1);
                let deferred = if max_ahead > 0 {
                    deferred.min(current_time + max_ahead)
                } else {
                    deferred
                };
                tracing::trace!(
                    transmit_time,
                    current_time,
                    packet_size,
                    available = self.available_space(),
                    deferred,
                    "packet deferred"
                );
                Some(deferred)
            }
        }
    }

    /// Latest transmit time the current bucket may carry.
    fn bucket_media_cap(&self) -> i64 {
        self.buckets.current().start
            + self.previous_bucket_time_ahead
            + i64::from(self.send_ahead_duration_ms)
    }

    /// Admission is per whole packet; an empty window always takes one.
    fn has_room_for(&self, size: i32) -> bool {
        self.available_space() >= size || self.outstanding.total() == 0
    }

    /// First time at which enough outstanding bytes fall due for `size`.
    fn space_available_at(&self, size: i32, current_time: i64) -> i64 {
        let deficit = size.saturating_sub(self.available_space());
        self.outstanding
            .release_time_for(deficit)
            .unwrap_or(current_time + 1)
    }

    fn record_admission(&mut self, transmit_time: i64, current_time: i64) {
        self.admitted_transmit_time = Some(transmit_time);
        let time_ahead = transmit_time - current_time;
        let lead = time_ahead.clamp(0, i64::from(self.max_send_ahead_ms));
        if lead >= self.lead_at(current_time) {
            self.bucket_time_ahead = lead;
            self.lead_stamp = current_time;
        }
        if let Some(trace) = &mut self.trace {
            trace.record(lead, current_time);
        }
    }

    /// Lead at `t`, decayed by real time elapsed since it was measured.
    fn lead_at(&self, t: i64) -> i64 {
        (self.bucket_time_ahead - (t - self.lead_stamp).max(0)).max(0)
    }

    fn clock(&self) -> i64 {
        if self.last_time == i64::MIN {
            0
        } else {
            self.last_time
        }
    }
}

fn later(current: Option<i64>, candidate: i64) -> Option<i64> {
    Some(current.map_or(candidate, |t| t.max(candidate)))
}

fn clamp_bytes(bytes: usize) -> i32 {
    i32::try_from(bytes).unwrap_or(i32::MAX)
}
