//! Outbound packet delivery.
//!
//! The send path only needs "put these bytes on the wire for this track",
//! expressed as the [`PacketSink`] trait. [`udp`] provides the RTP/AVP
//! unicast implementation: one shared ephemeral socket, one sink per
//! destination.

pub mod udp;

pub use udp::{UdpSink, UdpTransport};

use crate::error::Result;

/// Destination for a track's RTP packets.
pub trait PacketSink: Send {
    /// Send one complete packet. Returns the number of bytes written.
    fn send(&mut self, packet: &[u8]) -> Result<usize>;
}
