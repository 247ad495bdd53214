//! Whole-stream pacing runs on a manual clock.
//!
//! A synthetic constant-bitrate track is pushed through a [`TrackSender`]
//! and the sink records, for every packet, when it went out relative to its
//! transmit time.

use std::sync::Arc;

use approx::assert_relative_eq;
use parking_lot::Mutex;

use overbuffer::{
    Clock, ManualClock, OutgoingPacket, PacingConfig, PacketSink, Result, TrackSender,
};

const PACKET_SIZE: usize = 1000;
const FRAME_MS: i64 = 50;

/// (sent at, transmit time, bytes)
type SendLog = Arc<Mutex<Vec<(i64, i64, usize)>>>;

struct TimedSink {
    clock: ManualClock,
    log: SendLog,
}

impl PacketSink for TimedSink {
    fn send(&mut self, packet: &[u8]) -> Result<usize> {
        let mut tx = [0u8; 8];
        tx.copy_from_slice(&packet[..8]);
        self.log
            .lock()
            .push((self.clock.now_ms(), i64::from_be_bytes(tx), packet.len()));
        Ok(packet.len())
    }
}

fn sized_packet(transmit_time_ms: i64, size: usize) -> OutgoingPacket {
    let mut data = vec![0u8; size.max(8)];
    data[..8].copy_from_slice(&transmit_time_ms.to_be_bytes());
    OutgoingPacket::new(transmit_time_ms, data)
}

fn stream_packet(transmit_time_ms: i64) -> OutgoingPacket {
    sized_packet(transmit_time_ms, PACKET_SIZE)
}

/// Play `duration_ms` of media (one packet per frame) and return the log.
fn run_stream(config: PacingConfig, duration_ms: i64) -> (SendLog, TrackSender) {
    let packets = (0..duration_ms)
        .step_by(FRAME_MS as usize)
        .map(stream_packet)
        .collect();
    run_packets(config, packets)
}

/// Drive a sender holding `packets` until its queue drains.
fn run_packets(config: PacingConfig, packets: Vec<OutgoingPacket>) -> (SendLog, TrackSender) {
    let clock = ManualClock::new(0);
    let log = SendLog::default();
    let sink = TimedSink {
        clock: clock.clone(),
        log: log.clone(),
    };
    let mut sender = TrackSender::new(&config, Box::new(sink));
    for packet in packets {
        sender.enqueue(packet);
    }

    for _ in 0..100_000 {
        let outcome = sender.poll(clock.now_ms());
        match outcome.next_wake {
            Some(wake) => {
                assert!(wake > clock.now_ms(), "wake must be in the future");
                clock.set(wake);
            }
            None => break,
        }
    }
    assert_eq!(sender.queued(), 0, "stream did not drain");
    (log, sender)
}

#[test]
fn no_packet_leaves_beyond_the_ceiling() {
    let config = PacingConfig::default()
        .with_send_interval_ms(100)
        .with_max_send_ahead_secs(5)
        .with_overbuffer_rate(2.0);
    let (log, _) = run_stream(config, 30_000);

    for &(sent_at, tx, _) in log.lock().iter() {
        assert!(tx - sent_at <= 5000, "sent {}ms ahead", tx - sent_at);
    }
}

#[test]
fn overbuffering_fills_ahead_then_tracks_real_time() {
    let config = PacingConfig::default()
        .with_send_interval_ms(100)
        .with_max_send_ahead_secs(10)
        .with_overbuffer_rate(2.0);
    let (log, _) = run_stream(config, 30_000);
    let log = log.lock();

    assert_eq!(log.len(), 600);
    // Bounded ramp: media never runs far beyond a small multiple of real time.
    for &(sent_at, tx, _) in log.iter() {
        assert!(tx <= 3 * sent_at + 1000, "tx {tx} sent at {sent_at}");
    }
    // The client buffer is full long before the media ends.
    let (last_sent, last_tx, _) = log[log.len() - 1];
    assert!(
        last_tx - last_sent >= 5000,
        "only {}ms ahead at the end",
        last_tx - last_sent
    );
}

#[test]
fn disabled_overbuffering_sends_at_transmit_time() {
    let config = PacingConfig::default().with_overbuffering(false);
    let (log, sender) = run_stream(config, 10_000);

    for &(sent_at, tx, _) in log.lock().iter() {
        assert_eq!(sent_at, tx);
    }
    // 20 packets of 1000 bytes per second.
    let bitrate = sender
        .window()
        .sustained_bitrate_bps()
        .expect("a full second has elapsed");
    assert_relative_eq!(bitrate as f64, 160_000.0, max_relative = 0.05);
}

#[test]
fn outstanding_bytes_stay_within_budget() {
    let window = 8 * PACKET_SIZE as u32;
    let clock = ManualClock::new(0);
    let log = SendLog::default();
    let sink = TimedSink {
        clock: clock.clone(),
        log: log.clone(),
    };
    let config = PacingConfig::default()
        .with_send_interval_ms(100)
        .with_window_size_bytes(window);
    let mut sender = TrackSender::new(&config, Box::new(sink));
    for tx in (0..5_000).step_by(FRAME_MS as usize) {
        sender.enqueue(stream_packet(tx));
    }

    for _ in 0..10_000 {
        let outcome = sender.poll(clock.now_ms());
        assert!(sender.window().bytes_sent_since_report() <= window as i32);
        match outcome.next_wake {
            Some(wake) => clock.set(wake),
            None => break,
        }
    }
    assert_eq!(sender.queued(), 0);
    assert_eq!(log.lock().len(), 100);
    for &(sent_at, tx, _) in log.lock().iter() {
        assert!(sent_at - tx <= 100, "tx {tx} sent late at {sent_at}");
    }
}

#[test]
fn stream_larger_than_window_stays_on_time() {
    // 2 Mbit/s at 25 fps in 1400-byte packets: two seconds of media is
    // 500 kB, almost twice the default window.
    let config = PacingConfig::default();
    let send_interval = i64::from(config.send_interval_ms);
    let mut packets = Vec::new();
    for tx in (0..20_000).step_by(40) {
        let mut remaining = 10_000usize;
        while remaining > 0 {
            let len = remaining.min(1400);
            remaining -= len;
            packets.push(sized_packet(tx, len));
        }
    }
    let total = packets.len();

    let (log, _) = run_packets(config, packets);
    let log = log.lock();
    assert_eq!(log.len(), total);

    let worst = log
        .iter()
        .map(|&(sent_at, tx, _)| sent_at - tx)
        .max()
        .unwrap_or(0);
    assert!(
        worst <= send_interval,
        "delivery fell {worst}ms behind playback"
    );
    // Overbuffering still sends ahead of playback.
    assert!(log.iter().any(|&(sent_at, tx, _)| tx - sent_at >= 500));
}

#[test]
fn send_ahead_duration_scales_with_rate() {
    for rate in [1.0f32, 1.25, 2.0, 3.5] {
        let window = overbuffer::OverbufferWindow::new(200, 65536, 10, rate);
        let effective = f64::from(window.send_ahead_duration()) / f64::from(window.send_interval());
        assert_relative_eq!(effective, f64::from(rate), epsilon = 0.01);
    }
}
