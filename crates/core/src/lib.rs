//! Client-aware RTP send pacing.
//!
//! The core of this crate is [`OverbufferWindow`], which decides for every
//! outgoing RTP packet whether it may be sent now or how long to wait. The
//! rest is the delivery plumbing around it: a per-track [`TrackSender`]
//! queue, a session registry, a UDP sink and a [`Server`] that drives
//! everything from one delivery thread.

pub mod clock;
pub mod config;
pub mod error;
pub mod media;
pub mod pacing;
pub mod sender;
pub mod server;
pub mod session;
pub mod transport;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{PacingConfig, ServerConfig};
pub use error::{PacingError, Result};
pub use media::{MediaTimeline, RtpHeader};
pub use pacing::{OverbufferWindow, WindowState};
pub use sender::{OutgoingPacket, PollOutcome, SenderStats, TrackSender};
pub use server::Server;
pub use session::{Session, SessionManager, SessionState};
pub use transport::{PacketSink, UdpSink, UdpTransport};
