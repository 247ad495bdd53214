use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::error::Result;

use super::PacketSink;

/// UDP transport for outbound RTP packet delivery.
///
/// Binds a single ephemeral socket (`0.0.0.0:0`) shared by every track.
/// This layer is address-only; [`UdpSink`] pairs it with one destination
/// so a track sender can own its own sink.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket for outbound RTP.
    pub fn bind() -> Result<Self> {
        Self::bind_to("0.0.0.0:0")
    }

    /// Bind to a specific local address (e.g. loopback in tests).
    pub fn bind_to(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        tracing::debug!(local_addr = ?socket.local_addr().ok(), "UDP transport bound");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(payload, addr)?)
    }

    /// A sink that delivers to `addr` through this transport.
    pub fn sink(&self, addr: SocketAddr) -> UdpSink {
        UdpSink {
            transport: self.clone(),
            addr,
        }
    }
}

/// One destination on a shared [`UdpTransport`].
pub struct UdpSink {
    transport: UdpTransport,
    addr: SocketAddr,
}

impl UdpSink {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl PacketSink for UdpSink {
    fn send(&mut self, packet: &[u8]) -> Result<usize> {
        self.transport.send_to(packet, self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sink_delivers_to_destination() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let transport = UdpTransport::bind_to("127.0.0.1:0").unwrap();
        let mut sink = transport.sink(receiver.local_addr().unwrap());

        assert_eq!(sink.send(&[1, 2, 3, 4]).unwrap(), 4);

        let mut buf = [0u8; 16];
        let (n, from) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3, 4]);
        assert_eq!(from, transport.local_addr().unwrap());
    }
}
