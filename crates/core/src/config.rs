//! Pacing and delivery configuration.
//!
//! Configuration is always passed explicitly: a server holds one
//! [`ServerConfig`], and every [`OverbufferWindow`](crate::pacing::OverbufferWindow)
//! is built from a [`PacingConfig`] handed to it. Nothing is read from
//! process-wide state.

use crate::error::{PacingError, Result};

/// Default bucket width / scheduler tick, in ms.
pub const DEFAULT_SEND_INTERVAL_MS: u32 = 50;

/// Default client buffer budget in bytes, used until the client reports one.
pub const DEFAULT_WINDOW_SIZE_BYTES: u32 = 256 * 1024;

/// Default ceiling on how far ahead of playback a packet may be sent.
pub const DEFAULT_MAX_SEND_AHEAD_SECS: u32 = 25;

/// Default overbuffer multiplier: up to twice real-time while filling.
pub const DEFAULT_OVERBUFFER_RATE: f32 = 2.0;

/// Default upper bound on how long the delivery loop sleeps when idle.
pub const DEFAULT_IDLE_POLL_MS: u64 = 10;

/// Per-track pacing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    /// Nominal period between window ticks; also the bucket width. Must be > 0.
    pub send_interval_ms: u32,
    /// Initial byte budget for send-ahead.
    pub window_size_bytes: u32,
    /// Hard ceiling on send-ahead, in seconds.
    pub max_send_ahead_secs: u32,
    /// How much faster than real time data may be pushed (≥ 1.0).
    pub overbuffer_rate: f32,
    /// Whether new windows start with overbuffering on.
    pub overbuffering_enabled: bool,
    /// Keep a short history of admitted time-ahead values per window.
    pub trace_time_ahead: bool,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: DEFAULT_SEND_INTERVAL_MS,
            window_size_bytes: DEFAULT_WINDOW_SIZE_BYTES,
            max_send_ahead_secs: DEFAULT_MAX_SEND_AHEAD_SECS,
            overbuffer_rate: DEFAULT_OVERBUFFER_RATE,
            overbuffering_enabled: true,
            trace_time_ahead: false,
        }
    }
}

impl PacingConfig {
    pub fn with_send_interval_ms(mut self, ms: u32) -> Self {
        self.send_interval_ms = ms;
        self
    }

    pub fn with_window_size_bytes(mut self, bytes: u32) -> Self {
        self.window_size_bytes = bytes;
        self
    }

    pub fn with_max_send_ahead_secs(mut self, secs: u32) -> Self {
        self.max_send_ahead_secs = secs;
        self
    }

    pub fn with_overbuffer_rate(mut self, rate: f32) -> Self {
        self.overbuffer_rate = rate;
        self
    }

    pub fn with_overbuffering(mut self, enabled: bool) -> Self {
        self.overbuffering_enabled = enabled;
        self
    }

    pub fn with_time_ahead_trace(mut self, enabled: bool) -> Self {
        self.trace_time_ahead = enabled;
        self
    }

    /// Check the construction preconditions of an overbuffer window.
    pub fn validate(&self) -> Result<()> {
        if self.send_interval_ms == 0 {
            return Err(PacingError::InvalidConfig {
                field: "send_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.overbuffer_rate.is_nan() || self.overbuffer_rate < 1.0 {
            return Err(PacingError::InvalidConfig {
                field: "overbuffer_rate",
                reason: "must be at least 1.0",
            });
        }
        if self.window_size_bytes > i32::MAX as u32 {
            return Err(PacingError::InvalidConfig {
                field: "window_size_bytes",
                reason: "must fit in a signed 32-bit byte count",
            });
        }
        Ok(())
    }
}

/// Server-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Template for every track's overbuffer window.
    pub pacing: PacingConfig,
    /// Longest the delivery loop sleeps when no track has a pending wake time.
    pub idle_poll_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PacingConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_sets_fields() {
        let config = PacingConfig::default()
            .with_send_interval_ms(1000)
            .with_window_size_bytes(65536)
            .with_max_send_ahead_secs(10)
            .with_overbuffer_rate(1.5)
            .with_overbuffering(false)
            .with_time_ahead_trace(true);

        assert_eq!(config.send_interval_ms, 1000);
        assert_eq!(config.window_size_bytes, 65536);
        assert_eq!(config.max_send_ahead_secs, 10);
        assert_eq!(config.overbuffer_rate, 1.5);
        assert!(!config.overbuffering_enabled);
        assert!(config.trace_time_ahead);
    }

    #[test]
    fn zero_send_interval_rejected() {
        let err = PacingConfig::default()
            .with_send_interval_ms(0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            PacingError::InvalidConfig {
                field: "send_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn rate_below_one_rejected() {
        assert!(
            PacingConfig::default()
                .with_overbuffer_rate(0.5)
                .validate()
                .is_err()
        );
        assert!(
            PacingConfig::default()
                .with_overbuffer_rate(f32::NAN)
                .validate()
                .is_err()
        );
        assert!(
            PacingConfig::default()
                .with_overbuffer_rate(1.0)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn oversized_window_rejected() {
        let err = PacingConfig::default()
            .with_window_size_bytes(u32::MAX)
            .validate()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid pacing config: window_size_bytes must fit in a signed 32-bit byte count"
        );
    }
}
