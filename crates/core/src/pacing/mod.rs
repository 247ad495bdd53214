//! Overbuffer pacing: per-track send-ahead control.
//!
//! An RTSP server streaming stored media can send packets before their
//! presentation time so the client builds up a receive buffer. Sending too
//! far ahead overflows that buffer; sending too fast floods the path. The
//! [`OverbufferWindow`] bounds both, one instance per playing track.
//!
//! ```text
//!             check_transmit_time(tx, now, size)
//! sender ───────────────────────────────────────▶ window
//!        ◀─────────────── None | Some(wake_at) ──
//!        ── send ─▶ sink
//!        ── add_packet_to_window(size) ─────────▶ window
//! ```
//!
//! - [`window`]: the decision engine.
//! - [`ledger`]: outstanding bytes keyed by transmit time, released once
//!   their playback time has passed.
//! - [`slot`]: the two-slot (current/previous) accounting it uses at
//!   one-second and per-bucket granularity.
//! - [`trace`]: optional fixed-size history of admitted time-ahead values.

pub mod ledger;
pub mod slot;
pub mod trace;
pub mod window;

pub use trace::{OverbufferTrace, TimeAheadSample};
pub use window::{OverbufferWindow, WindowState};
