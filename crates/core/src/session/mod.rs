//! Client sessions and their per-track pacing state.
//!
//! A session groups the tracks one client is playing. Each track owns its
//! own [`TrackSender`] and therefore its own overbuffer window; nothing is
//! shared between tracks or sessions, so no cross-session locking happens
//! on the send path.
//!
//! ## Session lifecycle (RFC 2326 §A.1)
//!
//! ```text
//! SETUP         -> Ready
//! PLAY          -> Playing   (windows reset)
//! PAUSE         -> Paused    (from Playing)
//! PLAY          -> Playing   (from Paused, windows reset)
//! TEARDOWN      -> (removed)
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::PacingConfig;
use crate::error::{PacingError, Result};
use crate::sender::{OutgoingPacket, PollOutcome, SenderStats, TrackSender};
use crate::transport::PacketSink;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Playback state (RFC 2326 §A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Tracks configured, not yet playing.
    Ready,
    /// Packets are being delivered.
    Playing,
    /// Delivery suspended; can resume via PLAY.
    Paused,
}

/// A single client session.
///
/// Interior mutability lets the delivery loop poll tracks while control
/// requests (play, pause, window reports) arrive on other threads. Each
/// track sits behind its own mutex; the track list lock is only taken for
/// writing when a track is added.
pub struct Session {
    /// Unique session identifier (16-char hex string).
    pub id: String,
    /// URI the session was created for.
    pub uri: String,
    state: RwLock<SessionState>,
    tracks: RwLock<Vec<Arc<Mutex<TrackSender>>>>,
    pacing: PacingConfig,
}

impl Session {
    /// Create a session whose tracks will be paced with `pacing`.
    pub fn new(uri: &str, pacing: PacingConfig) -> Self {
        let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
        Session {
            id: format!("{:016X}", id),
            uri: uri.to_string(),
            state: RwLock::new(SessionState::Ready),
            tracks: RwLock::new(Vec::new()),
            pacing,
        }
    }

    /// Add a track delivering to `sink`. Returns its index.
    pub fn add_track(&self, sink: Box<dyn PacketSink>) -> usize {
        let mut tracks = self.tracks.write();
        tracks.push(Arc::new(Mutex::new(TrackSender::new(&self.pacing, sink))));
        let index = tracks.len() - 1;
        tracing::debug!(session_id = %self.id, track = index, "track added");
        index
    }

    pub fn track(&self, index: usize) -> Option<Arc<Mutex<TrackSender>>> {
        self.tracks.read().get(index).cloned()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.read().len()
    }

    /// Queue a packet on one track.
    pub fn enqueue(&self, track: usize, packet: OutgoingPacket) -> Result<()> {
        let sender = self.track(track).ok_or_else(|| PacingError::TrackNotFound {
            session: self.id.clone(),
            track,
        })?;
        sender.lock().enqueue(packet);
        Ok(())
    }

    /// Start or resume delivery. Every track's window is reset because
    /// playback position is discontinuous.
    pub fn play(&self, now: i64) {
        self.set_state(SessionState::Playing);
        for track in self.tracks.read().iter() {
            track.lock().resume(now);
        }
    }

    /// Suspend delivery, keeping queued packets.
    pub fn pause(&self, now: i64) -> Result<()> {
        if !self.is_playing() {
            return Err(PacingError::SessionNotPlaying(self.id.clone()));
        }
        self.set_state(SessionState::Paused);
        for track in self.tracks.read().iter() {
            track.lock().pause(now);
        }
        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.write();
        tracing::debug!(session_id = %self.id, old_state = ?*current, new_state = ?state, "state transition");
        *current = state;
    }

    pub fn get_state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_playing(&self) -> bool {
        *self.state.read() == SessionState::Playing
    }

    /// Apply a client buffer-size report to every track.
    pub fn set_window_size(&self, bytes: u32) {
        tracing::debug!(session_id = %self.id, bytes, "client window size report");
        for track in self.tracks.read().iter() {
            track.lock().set_window_size(bytes);
        }
    }

    pub fn set_overbuffering(&self, enabled: bool) {
        for track in self.tracks.read().iter() {
            track.lock().set_overbuffering(enabled);
        }
    }

    /// Poll every track. `next_wake` is the earliest wake time of any track.
    pub fn poll(&self, now: i64) -> PollOutcome {
        let mut outcome = PollOutcome {
            sent: 0,
            next_wake: None,
        };
        if !self.is_playing() {
            return outcome;
        }
        for track in self.tracks.read().iter() {
            let polled = track.lock().poll(now);
            outcome.sent += polled.sent;
            outcome.next_wake = earliest(outcome.next_wake, polled.next_wake);
        }
        outcome
    }

    pub fn stats(&self) -> Vec<SenderStats> {
        self.tracks
            .read()
            .iter()
            .map(|track| track.lock().stats())
            .collect()
    }
}

pub(crate) fn earliest(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Thread-safe registry of active sessions.
///
/// Backed by `parking_lot::RwLock`: the delivery loop reads the registry on
/// every pass, while writes only happen on session setup and teardown.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    pacing: Arc<PacingConfig>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_pacing(PacingConfig::default())
    }

    /// Registry whose sessions pace their tracks with `pacing`.
    pub fn with_pacing(pacing: PacingConfig) -> Self {
        SessionManager {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            pacing: Arc::new(pacing),
        }
    }

    pub fn pacing(&self) -> &PacingConfig {
        &self.pacing
    }

    /// Create a new session for the given URI and register it.
    pub fn create_session(&self, uri: &str) -> Arc<Session> {
        let session = Arc::new(Session::new(uri, (*self.pacing).clone()));
        let id = session.id.clone();
        let total = {
            let mut sessions = self.sessions.write();
            sessions.insert(id.clone(), session.clone());
            sessions.len()
        };
        tracing::debug!(session_id = %id, uri, total_sessions = total, "session created");
        session
    }

    pub fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Look up a session or fail with [`PacingError::SessionNotFound`].
    pub fn require_session(&self, id: &str) -> Result<Arc<Session>> {
        self.get_session(id)
            .ok_or_else(|| PacingError::SessionNotFound(id.to_string()))
    }

    pub fn remove_session(&self, id: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, total_sessions = sessions.len(), "session removed");
        }
        removed
    }

    /// Apply a client buffer-size report to every track of a session.
    pub fn set_client_window_size(&self, id: &str, bytes: u32) -> Result<()> {
        self.require_session(id)?.set_window_size(bytes);
        Ok(())
    }

    pub fn get_playing_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_playing())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
