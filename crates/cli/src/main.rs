use clap::Parser;
use overbuffer::{
    MediaTimeline, OutgoingPacket, PacingConfig, RtpHeader, Server, ServerConfig, config,
};
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

/// 90 kHz video clock (RFC 3551).
const CLOCK_RATE: u32 = 90_000;
const FRAME_RATE: u32 = 25;
const PAYLOAD_TYPE: u8 = 96;
const RTP_HEADER_LEN: usize = 12;

#[derive(Parser)]
#[command(
    name = "overbuffer-sim",
    about = "Stream a synthetic on-demand RTP track through the overbuffer pacer"
)]
struct Args {
    /// Destination for the RTP packets (host:port)
    #[arg(long, short, default_value = "127.0.0.1:5004")]
    dest: SocketAddr,

    /// Media bitrate in kbit/s
    #[arg(long, default_value_t = 2000)]
    bitrate_kbps: u32,

    /// RTP packet size in bytes, header included
    #[arg(long, default_value_t = 1400)]
    packet_size: usize,

    /// Length of the stream in seconds
    #[arg(long, default_value_t = 30)]
    duration_secs: u32,

    /// Pacing bucket width in ms
    #[arg(long, default_value_t = config::DEFAULT_SEND_INTERVAL_MS)]
    send_interval_ms: u32,

    /// Client buffer size in bytes
    #[arg(long, default_value_t = config::DEFAULT_WINDOW_SIZE_BYTES)]
    window_bytes: u32,

    /// Never send more than this far ahead of playback
    #[arg(long, default_value_t = config::DEFAULT_MAX_SEND_AHEAD_SECS)]
    max_send_ahead_secs: u32,

    /// Send-ahead speed relative to real time
    #[arg(long, default_value_t = config::DEFAULT_OVERBUFFER_RATE)]
    overbuffer_rate: f32,

    /// Send every packet at its transmit time
    #[arg(long)]
    no_overbuffer: bool,
}

impl Args {
    fn pacing(&self) -> PacingConfig {
        PacingConfig::default()
            .with_send_interval_ms(self.send_interval_ms)
            .with_window_size_bytes(self.window_bytes)
            .with_max_send_ahead_secs(self.max_send_ahead_secs)
            .with_overbuffer_rate(self.overbuffer_rate)
            .with_overbuffering(!self.no_overbuffer)
    }
}

/// Build the whole stream: `FRAME_RATE` frames per second, each split into
/// packets of at most `packet_size` bytes, the last one marked.
fn synthetic_stream(args: &Args, play_start_ms: i64) -> Vec<OutgoingPacket> {
    let mut header = RtpHeader::with_random_ssrc(PAYLOAD_TYPE);
    let timeline = MediaTimeline::new(CLOCK_RATE, header.timestamp(), play_start_ms);
    let frame_ticks = CLOCK_RATE / FRAME_RATE;
    let frame_bytes = (u64::from(args.bitrate_kbps) * 1000 / 8 / u64::from(FRAME_RATE)) as usize;
    let max_payload = args.packet_size.saturating_sub(RTP_HEADER_LEN).max(1);

    let mut packets = Vec::new();
    for _ in 0..args.duration_secs * FRAME_RATE {
        let transmit_time_ms = timeline.transmit_time_ms(header.timestamp());
        let mut remaining = frame_bytes.max(1);
        while remaining > 0 {
            let len = remaining.min(max_payload);
            remaining -= len;
            let data = header.packet(remaining == 0, &vec![0u8; len]);
            packets.push(OutgoingPacket::new(transmit_time_ms, data));
        }
        header.advance_timestamp(frame_ticks);
    }
    packets
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = ServerConfig {
        pacing: args.pacing(),
        ..Default::default()
    };
    let mut server = Server::with_config(config);

    if let Err(e) = server.start() {
        tracing::error!(error = %e, "failed to start server");
        return;
    }

    let session = server.create_session("rtsp://localhost/synthetic");
    let track = match server.add_udp_track(&session.id, args.dest) {
        Ok(track) => track,
        Err(e) => {
            tracing::error!(error = %e, "failed to add UDP track");
            server.stop();
            return;
        }
    };

    let packets = synthetic_stream(&args, server.now_ms());
    let total = packets.len();
    for packet in packets {
        if let Err(e) = server.enqueue(&session.id, track, packet) {
            tracing::error!(error = %e, "failed to queue packet");
            server.stop();
            return;
        }
    }
    tracing::info!(
        dest = %args.dest,
        packets = total,
        duration_secs = args.duration_secs,
        overbuffering = !args.no_overbuffer,
        "stream loaded"
    );

    if let Err(e) = server.play(&session.id) {
        tracing::error!(error = %e, "failed to start playback");
        server.stop();
        return;
    }

    let started = server.now_ms();
    loop {
        thread::sleep(Duration::from_secs(1));
        let Ok(stats) = server.track_stats(&session.id) else {
            break;
        };
        let Some(stats) = stats.first().copied() else {
            break;
        };
        let elapsed_ms = server.now_ms() - started;
        let bitrate_bps = session
            .track(track)
            .and_then(|t| t.lock().window().sustained_bitrate_bps())
            .unwrap_or(0);
        tracing::info!(
            elapsed_ms,
            sent = stats.packets_sent,
            bytes = stats.bytes_sent,
            deferrals = stats.deferrals,
            errors = stats.send_errors,
            bitrate_bps,
            "delivery progress"
        );
        if stats.packets_sent + stats.send_errors >= total as u64 {
            break;
        }
    }

    tracing::info!("stream complete");
    server.stop();
}
