//! Per-track send scheduling.
//!
//! A [`TrackSender`] is the only caller of its track's
//! [`OverbufferWindow`]. Each [`poll`](TrackSender::poll) walks the queue
//! head-first:
//!
//! ```text
//! head packet ─▶ check_transmit_time ─┬─ None ──▶ send ─▶ add_packet_to_window ─▶ next
//!                                     └─ Some(t) ▶ stop, wake at t
//! ```
//!
//! Packets leave in queue order only; a deferred head blocks the rest of
//! the track, which keeps RTP sequence numbers in order on the wire.

use std::collections::VecDeque;

use crate::config::PacingConfig;
use crate::pacing::OverbufferWindow;
use crate::transport::PacketSink;

/// A fully framed RTP packet waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPacket {
    /// When the packet would be sent with no overbuffering, in ms.
    pub transmit_time_ms: i64,
    pub data: Vec<u8>,
}

impl OutgoingPacket {
    pub fn new(transmit_time_ms: i64, data: Vec<u8>) -> Self {
        Self {
            transmit_time_ms,
            data,
        }
    }
}

/// Counters for one track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    /// Times the head packet was held back by the window or its own
    /// transmit time.
    pub deferrals: u64,
    pub send_errors: u64,
    /// Wake time returned by the most recent deferral.
    pub last_deferral_ms: Option<i64>,
}

/// Result of one [`TrackSender::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Packets written during this poll.
    pub sent: usize,
    /// When the head packet should be reconsidered. `None` when the queue
    /// is empty or the track is paused.
    pub next_wake: Option<i64>,
}

/// Queue, pacing window and sink for one RTP track.
pub struct TrackSender {
    queue: VecDeque<OutgoingPacket>,
    window: OverbufferWindow,
    sink: Box<dyn PacketSink>,
    stats: SenderStats,
    /// The next successful write starts a new burst.
    burst_pending: bool,
    paused_at: Option<i64>,
}

impl TrackSender {
    pub fn new(config: &PacingConfig, sink: Box<dyn PacketSink>) -> Self {
        Self {
            queue: VecDeque::new(),
            window: OverbufferWindow::from_config(config),
            sink,
            stats: SenderStats::default(),
            burst_pending: true,
            paused_at: None,
        }
    }

    pub fn enqueue(&mut self, packet: OutgoingPacket) {
        self.queue.push_back(packet);
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    pub fn window(&self) -> &OverbufferWindow {
        &self.window
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Apply a client buffer-size report.
    pub fn set_window_size(&mut self, bytes: u32) {
        self.window.set_window_size(bytes);
    }

    pub fn set_overbuffering(&mut self, enabled: bool) {
        self.window.set_overbuffering_enabled(enabled);
    }

    /// Send every packet that may go out at `now`.
    pub fn poll(&mut self, now: i64) -> PollOutcome {
        if self.is_paused() {
            return PollOutcome {
                sent: 0,
                next_wake: None,
            };
        }

        let mut sent = 0;
        loop {
            let (transmit_time, size) = match self.queue.front() {
                Some(head) => (head.transmit_time_ms, head.data.len()),
                None => {
                    // Keep draining the budget while there is nothing to send.
                    self.window.empty_out_window(now);
                    self.burst_pending = true;
                    return PollOutcome {
                        sent,
                        next_wake: None,
                    };
                }
            };

            if let Some(wake) = self.hold_until(transmit_time, now, size) {
                self.stats.deferrals += 1;
                self.stats.last_deferral_ms = Some(wake);
                self.burst_pending = true;
                return PollOutcome {
                    sent,
                    next_wake: Some(wake),
                };
            }

            let Some(packet) = self.queue.pop_front() else {
                continue;
            };
            if self.burst_pending {
                self.window.mark_beginning_of_write_burst();
                self.burst_pending = false;
            }

            match self.sink.send(&packet.data) {
                Ok(written) => {
                    self.window.add_packet_to_window(written);
                    self.stats.packets_sent += 1;
                    self.stats.bytes_sent += written as u64;
                    sent += 1;
                    tracing::trace!(
                        transmit_time = packet.transmit_time_ms,
                        now,
                        size = written,
                        available = self.window.available_space(),
                        "RTP packet sent"
                    );
                }
                Err(e) => {
                    self.stats.send_errors += 1;
                    tracing::warn!(error = %e, size, "RTP send failed, packet dropped");
                }
            }
        }
    }

    /// With overbuffering on, the window decides. With it off, packets go
    /// out at their transmit time and never earlier.
    fn hold_until(&mut self, transmit_time: i64, now: i64, size: usize) -> Option<i64> {
        if self.window.is_overbuffering_enabled() {
            self.window.check_transmit_time(transmit_time, now, size)
        } else if transmit_time > now {
            self.window.empty_out_window(now);
            Some(transmit_time)
        } else {
            None
        }
    }

    /// Stop sending. Queued packets are kept.
    pub fn pause(&mut self, now: i64) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
            tracing::debug!(now, queued = self.queue.len(), "track paused");
        }
    }

    /// Resume after [`pause`](Self::pause).
    ///
    /// Queued packets are shifted later by the paused duration so their
    /// transmit times stay relative to the resumed playback, and the
    /// window starts a fresh accounting epoch.
    pub fn resume(&mut self, now: i64) {
        if let Some(paused_at) = self.paused_at.take() {
            let shift = (now - paused_at).max(0);
            for packet in &mut self.queue {
                packet.transmit_time_ms += shift;
            }
            tracing::debug!(now, shift, queued = self.queue.len(), "track resumed");
        }
        self.window.reset();
        self.burst_pending = true;
    }

    /// Drop everything queued (seek) and reset the window.
    pub fn flush(&mut self) {
        let dropped = self.queue.len();
        self.queue.clear();
        self.window.reset();
        self.burst_pending = true;
        tracing::debug!(dropped, "track flushed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PacingError, Result};
    use std::sync::Arc;

    use parking_lot::Mutex;

    /// Records every packet it is given.
    #[derive(Clone, Default)]
    struct RecordingSink {
        packets: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: bool,
    }

    impl PacketSink for RecordingSink {
        fn send(&mut self, packet: &[u8]) -> Result<usize> {
            if self.fail {
                return Err(PacingError::Io(std::io::Error::other("unreachable")));
            }
            self.packets.lock().push(packet.to_vec());
            Ok(packet.len())
        }
    }

    fn sender_with(config: PacingConfig) -> (TrackSender, RecordingSink) {
        let sink = RecordingSink::default();
        (TrackSender::new(&config, Box::new(sink.clone())), sink)
    }

    fn packet(transmit_time_ms: i64, size: usize, tag: u8) -> OutgoingPacket {
        OutgoingPacket::new(transmit_time_ms, vec![tag; size])
    }

    #[test]
    fn sends_due_packets_in_order() {
        let (mut sender, sink) = sender_with(PacingConfig::default());
        for i in 0..3u8 {
            sender.enqueue(packet(0, 100, i));
        }

        let outcome = sender.poll(0);
        assert_eq!(outcome.sent, 3);
        assert_eq!(outcome.next_wake, None);
        let tags: Vec<u8> = sink.packets.lock().iter().map(|p| p[0]).collect();
        assert_eq!(tags, vec![0, 1, 2]);
        assert_eq!(sender.window().bytes_sent_since_report(), 300);
    }

    #[test]
    fn rate_limited_head_blocks_queue() {
        let config = PacingConfig::default()
            .with_send_interval_ms(1000)
            .with_overbuffer_rate(1.5);
        let (mut sender, sink) = sender_with(config);
        sender.enqueue(packet(1000, 100, 0));
        sender.enqueue(packet(2600, 100, 1));
        sender.enqueue(packet(2700, 100, 2));

        // The burst may reach 1500ms past the 1000ms frontier.
        let outcome = sender.poll(0);
        assert_eq!(outcome.sent, 1);
        assert_eq!(outcome.next_wake, Some(1000));
        assert_eq!(sender.queued(), 2);

        // Real time caught up with the frontier; this bucket reaches 2500.
        let outcome = sender.poll(1000);
        assert_eq!(outcome.sent, 0);
        assert_eq!(outcome.next_wake, Some(2000));

        let outcome = sender.poll(2000);
        assert_eq!(outcome.sent, 2);
        assert_eq!(sink.packets.lock().len(), 3);
        assert_eq!(sender.stats().deferrals, 2);
    }

    #[test]
    fn disabled_overbuffering_sends_on_transmit_time() {
        let config = PacingConfig::default().with_overbuffering(false);
        let (mut sender, _sink) = sender_with(config);
        sender.enqueue(packet(0, 100, 0));
        sender.enqueue(packet(40, 100, 1));

        let outcome = sender.poll(0);
        assert_eq!(outcome.sent, 1);
        assert_eq!(outcome.next_wake, Some(40));

        assert_eq!(sender.poll(40).sent, 1);
    }

    #[test]
    fn failed_sends_are_not_accounted() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let mut sender = TrackSender::new(&PacingConfig::default(), Box::new(sink));
        sender.enqueue(packet(0, 100, 0));

        let outcome = sender.poll(0);
        assert_eq!(outcome.sent, 0);
        assert_eq!(sender.queued(), 0);
        assert_eq!(sender.stats().send_errors, 1);
        assert_eq!(
            sender.window().available_space(),
            sender.window().window_size()
        );
    }

    #[test]
    fn pause_holds_and_resume_shifts_queue() {
        let config = PacingConfig::default().with_overbuffering(false);
        let (mut sender, _sink) = sender_with(config);
        sender.enqueue(packet(100, 100, 0));

        sender.pause(50);
        assert!(sender.is_paused());
        assert_eq!(
            sender.poll(200),
            PollOutcome {
                sent: 0,
                next_wake: None
            }
        );

        sender.resume(1050);
        assert!(!sender.is_paused());
        assert_eq!(sender.poll(1050).next_wake, Some(1100));
        assert_eq!(sender.poll(1100).sent, 1);
    }

    #[test]
    fn resume_resets_window_accounting() {
        let (mut sender, _sink) = sender_with(PacingConfig::default());
        sender.enqueue(packet(0, 5000, 0));
        sender.poll(0);
        assert_eq!(sender.window().bytes_sent_since_report(), 5000);

        sender.pause(10);
        sender.resume(20);
        assert_eq!(
            sender.window().available_space(),
            sender.window().window_size()
        );
    }

    #[test]
    fn flush_drops_queue() {
        let (mut sender, _sink) = sender_with(PacingConfig::default());
        sender.enqueue(packet(60_000, 100, 0));
        sender.enqueue(packet(60_000, 100, 1));
        sender.flush();
        assert_eq!(sender.queued(), 0);
        assert_eq!(sender.poll(0).next_wake, None);
    }

    #[test]
    fn client_window_report_applies_immediately() {
        let config = PacingConfig::default().with_window_size_bytes(1000);
        let (mut sender, _sink) = sender_with(config);
        for i in 0..3u8 {
            sender.enqueue(packet(0, 600, i));
        }
        assert_eq!(sender.poll(0).sent, 1);

        sender.set_window_size(10_000);
        assert_eq!(sender.poll(0).sent, 2);
    }
}
