//! RTP packet framing and media timing.
//!
//! Packetization of specific codecs happens upstream. What the send path
//! needs from the media side is narrow:
//!
//! - **Framing** ([`rtp::RtpHeader`]): the 12-byte fixed header, with
//!   sequence number, timestamp and SSRC bookkeeping (RFC 3550).
//! - **Timing** ([`rtp::MediaTimeline`]): each packet's nominal transmit
//!   time, derived from its RTP timestamp and the moment playback started.
//!   This is the `transmit_time` the overbuffer window compares against the
//!   clock.

pub mod rtp;

pub use rtp::{MediaTimeline, RtpHeader};
