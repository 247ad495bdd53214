use rand::RngExt;

/// RTP fixed header writer (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Padding, extension and CSRC count are never set. The sequence number
/// advances (wrapping) with every [`write`](Self::write); the timestamp is
/// moved only by [`advance_timestamp`](Self::advance_timestamp), so every
/// packet of a frame carries the same one.
#[derive(Debug, Clone)]
pub struct RtpHeader {
    payload_type: u8,
    ssrc: u32,
    next_sequence: u16,
    timestamp: u32,
}

impl RtpHeader {
    const VERSION: u8 = 2;
    pub const LEN: usize = 12;

    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        tracing::debug!(
            payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP stream framing created"
        );
        Self {
            payload_type: payload_type & 0x7f,
            ssrc,
            next_sequence: 0,
            timestamp: 0,
        }
    }

    /// SSRC drawn at random, as RFC 3550 §8.1 asks.
    pub fn with_random_ssrc(payload_type: u8) -> Self {
        Self::new(payload_type, rand::rng().random())
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number the next [`write`](Self::write) will use.
    pub fn sequence(&self) -> u16 {
        self.next_sequence
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Serialize the fixed header and step the sequence number.
    pub fn write(&mut self, marker: bool) -> [u8; Self::LEN] {
        let [s0, s1] = self.next_sequence.to_be_bytes();
        let [t0, t1, t2, t3] = self.timestamp.to_be_bytes();
        let [c0, c1, c2, c3] = self.ssrc.to_be_bytes();
        let marker_bit = if marker { 0x80 } else { 0 };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        [
            Self::VERSION << 6,
            marker_bit | self.payload_type,
            s0,
            s1,
            t0,
            t1,
            t2,
            t3,
            c0,
            c1,
            c2,
            c3,
        ]
    }

    /// Header followed by `payload`, ready for a [`PacketSink`](crate::transport::PacketSink).
    pub fn packet(&mut self, marker: bool, payload: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(Self::LEN + payload.len());
        packet.extend_from_slice(&self.write(marker));
        packet.extend_from_slice(payload);
        packet
    }

    /// Move to the next frame's timestamp.
    pub fn advance_timestamp(&mut self, ticks: u32) {
        self.timestamp = self.timestamp.wrapping_add(ticks);
    }
}

/// RTP timestamp carried in bytes 4..8 of a packet, if it is long enough.
pub fn packet_timestamp(packet: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = packet.get(4..8)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Maps RTP timestamps onto the server's millisecond clock.
///
/// A packet's nominal transmit time is the moment its media should be
/// played if playback had started at `play_start_ms` on `base_timestamp`:
///
/// ```text
/// transmit_ms = play_start_ms + (ts - base_timestamp) * 1000 / clock_rate
/// ```
///
/// The subtraction wraps on 32 bits, so a stream crossing the timestamp
/// wrap point keeps a continuous timeline. Re-anchor with
/// [`rebase`](Self::rebase) on every PLAY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaTimeline {
    clock_rate: u32,
    base_timestamp: u32,
    play_start_ms: i64,
}

impl MediaTimeline {
    pub fn new(clock_rate: u32, base_timestamp: u32, play_start_ms: i64) -> Self {
        debug_assert!(clock_rate > 0, "clock rate must be positive");
        Self {
            clock_rate: clock_rate.max(1),
            base_timestamp,
            play_start_ms,
        }
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    pub fn rebase(&mut self, base_timestamp: u32, play_start_ms: i64) {
        self.base_timestamp = base_timestamp;
        self.play_start_ms = play_start_ms;
    }

    pub fn transmit_time_ms(&self, timestamp: u32) -> i64 {
        let ticks = i64::from(timestamp.wrapping_sub(self.base_timestamp));
        self.play_start_ms + ticks * 1000 / i64::from(self.clock_rate)
    }

    /// RTP ticks covering `ms` milliseconds.
    pub fn ticks_for_ms(&self, ms: u32) -> u32 {
        (u64::from(ms) * u64::from(self.clock_rate) / 1000) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_header_fields() {
        let mut framing = RtpHeader::new(0xE0, 0x0102_0304);
        assert_eq!(framing.payload_type(), 0x60);

        let header = framing.write(false);
        assert_eq!(header[0], 0x80);
        assert_eq!(header[1], 0x60);
        assert_eq!(&header[8..], &[1, 2, 3, 4]);

        assert_eq!(framing.write(true)[1], 0xE0);
    }

    #[test]
    fn sequence_steps_and_wraps() {
        let mut framing = RtpHeader::new(96, 7);
        framing.next_sequence = u16::MAX - 1;
        let sequences: Vec<u16> = (0..3)
            .map(|_| {
                let h = framing.write(false);
                u16::from_be_bytes([h[2], h[3]])
            })
            .collect();
        assert_eq!(sequences, vec![u16::MAX - 1, u16::MAX, 0]);
        assert_eq!(framing.sequence(), 1);
    }

    #[test]
    fn frame_packets_share_timestamp() {
        let mut framing = RtpHeader::new(96, 7);
        framing.advance_timestamp(3600);
        let first = framing.packet(false, &[1, 2, 3]);
        let last = framing.packet(true, &[4]);
        assert_eq!(first.len(), RtpHeader::LEN + 3);
        assert_eq!(&first[RtpHeader::LEN..], &[1, 2, 3]);
        assert_eq!(packet_timestamp(&first), Some(3600));
        assert_eq!(packet_timestamp(&last), Some(3600));
    }

    #[test]
    fn truncated_packet_has_no_timestamp() {
        assert_eq!(packet_timestamp(&[0x80, 96, 0, 1]), None);
    }

    #[test]
    fn random_ssrcs_are_distinct() {
        let a = RtpHeader::with_random_ssrc(96);
        let b = RtpHeader::with_random_ssrc(96);
        assert_ne!(a.ssrc(), b.ssrc());
    }

    #[test]
    fn timeline_maps_ticks_to_ms() {
        let timeline = MediaTimeline::new(90_000, 1000, 5000);
        assert_eq!(timeline.transmit_time_ms(1000), 5000);
        assert_eq!(timeline.transmit_time_ms(1000 + 90_000), 6000);
        assert_eq!(timeline.transmit_time_ms(1000 + 3000), 5033);
        assert_eq!(timeline.ticks_for_ms(40), 3600);
    }

    #[test]
    fn timeline_survives_timestamp_wrap() {
        let timeline = MediaTimeline::new(90_000, u32::MAX - 44_999, 0);
        assert_eq!(timeline.transmit_time_ms(45_000), 1000);
    }

    #[test]
    fn rebase_moves_origin() {
        let mut timeline = MediaTimeline::new(8000, 0, 0);
        timeline.rebase(16_000, 10_000);
        assert_eq!(timeline.transmit_time_ms(24_000), 11_000);
    }
}
