use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::config::ServerConfig;
use crate::error::{PacingError, Result};
use crate::sender::{OutgoingPacket, SenderStats};
use crate::session::{Session, SessionManager, earliest};
use crate::transport::{PacketSink, UdpTransport};

/// RTP delivery server.
///
/// Owns the session registry, the shared clock and a delivery thread.
/// The thread repeatedly polls every playing session and sleeps until the
/// earliest wake time any track asked for, capped at
/// [`ServerConfig::idle_poll_ms`] so newly queued packets are picked up
/// promptly. UDP delivery goes through one shared [`UdpTransport`].
pub struct Server {
    session_manager: SessionManager,
    running: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    config: Arc<ServerConfig>,
    udp: Option<UdpTransport>,
    worker: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Create a server driven by a custom clock (e.g. a
    /// [`ManualClock`](crate::clock::ManualClock) in simulations).
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            session_manager: SessionManager::with_pacing(config.pacing.clone()),
            running: Arc::new(AtomicBool::new(false)),
            clock,
            config: Arc::new(config),
            udp: None,
            worker: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(PacingError::AlreadyRunning);
        }
        self.config.pacing.validate()?;

        self.udp = Some(UdpTransport::bind()?);
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let sessions = self.session_manager.clone();
        let clock = self.clock.clone();
        let idle_poll_ms = self.config.idle_poll_ms.max(1);

        tracing::info!(
            send_interval_ms = self.config.pacing.send_interval_ms,
            overbuffer_rate = self.config.pacing.overbuffer_rate,
            max_send_ahead_secs = self.config.pacing.max_send_ahead_secs,
            "RTP delivery started"
        );

        self.worker = Some(thread::spawn(move || {
            delivery_loop(sessions, clock, running, idle_poll_ms);
        }));

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("delivery thread panicked");
        }
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn create_session(&self, uri: &str) -> Arc<Session> {
        self.session_manager.create_session(uri)
    }

    /// Add a track that delivers over the server's UDP socket.
    pub fn add_udp_track(&self, session_id: &str, dest: SocketAddr) -> Result<usize> {
        let udp = self.udp.as_ref().ok_or(PacingError::NotStarted)?;
        self.add_track(session_id, Box::new(udp.sink(dest)))
    }

    pub fn add_track(&self, session_id: &str, sink: Box<dyn PacketSink>) -> Result<usize> {
        Ok(self
            .session_manager
            .require_session(session_id)?
            .add_track(sink))
    }

    pub fn enqueue(&self, session_id: &str, track: usize, packet: OutgoingPacket) -> Result<()> {
        self.session_manager
            .require_session(session_id)?
            .enqueue(track, packet)
    }

    pub fn play(&self, session_id: &str) -> Result<()> {
        let session = self.session_manager.require_session(session_id)?;
        session.play(self.clock.now_ms());
        Ok(())
    }

    pub fn pause(&self, session_id: &str) -> Result<()> {
        self.session_manager
            .require_session(session_id)?
            .pause(self.clock.now_ms())
    }

    pub fn teardown(&self, session_id: &str) -> Result<()> {
        self.session_manager
            .remove_session(session_id)
            .map(|_| ())
            .ok_or_else(|| PacingError::SessionNotFound(session_id.to_string()))
    }

    /// Apply a client buffer-size report to every track of a session.
    pub fn set_client_window_size(&self, session_id: &str, bytes: u32) -> Result<()> {
        self.session_manager.set_client_window_size(session_id, bytes)
    }

    pub fn track_stats(&self, session_id: &str) -> Result<Vec<SenderStats>> {
        Ok(self.session_manager.require_session(session_id)?.stats())
    }

    /// One delivery pass at `now`. Returns the earliest wake time.
    pub fn run_once(&self, now: i64) -> Option<i64> {
        run_once(&self.session_manager, now)
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

fn run_once(sessions: &SessionManager, now: i64) -> Option<i64> {
    let mut next_wake = None;
    for session in sessions.get_playing_sessions() {
        let outcome = session.poll(now);
        next_wake = earliest(next_wake, outcome.next_wake);
    }
    next_wake
}

fn delivery_loop(
    sessions: SessionManager,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
    idle_poll_ms: u64,
) {
    while running.load(Ordering::SeqCst) {
        let now = clock.now_ms();
        let next_wake = run_once(&sessions, now);
        let sleep_ms = next_wake
            .map_or(idle_poll_ms, |wake| (wake - now).clamp(1, idle_poll_ms as i64) as u64);
        thread::sleep(Duration::from_millis(sleep_ms));
    }
    tracing::debug!("delivery loop exited");
}
