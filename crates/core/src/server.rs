use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::protocol::handler::MethodHandler;
use crate::session::SessionRegistry;
use crate::source::{SourceRegistry, SourceState};
use crate::transport::{http, tcp, udp};

/// Server-level configuration consumed by the transport bridges, the
/// method handlers, and the maintenance loop.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// RTSP control port (TCP).
    pub port: u16,
    /// Hard cap on concurrent sessions; accepts past it are dropped.
    pub maximum_clients: usize,
    /// Control socket receive timeout; the read loop re-arms on expiry.
    pub receive_timeout_ms: u64,
    /// Control socket send timeout.
    pub send_timeout_ms: u64,
    /// Seconds of silence before Maintenance culls a session; -1 disables.
    pub client_inactivity_timeout_secs: i64,
    /// Reject requests without a `User-Agent:` header.
    pub require_user_agent: bool,
    /// Reject PLAY without a `Range:` header.
    pub require_range_header: bool,
    /// Value of the `Server:` header on every response.
    pub server_name: String,
    /// Lower bound of the UDP media port pool (even port = RTP).
    pub minimum_udp_port: Option<u16>,
    /// Upper bound of the UDP media port pool.
    pub maximum_udp_port: Option<u16>,
    /// Optional RTSP-over-UDP control port.
    pub udp_port: Option<u16>,
    /// Bind the UDP control socket on the IPv6 wildcard instead.
    pub udp_ipv6: bool,
    /// Optional RTSP-over-HTTP tunnel port.
    pub http_port: Option<u16>,
    /// Seconds between maintenance sweeps.
    pub maintenance_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 554,
            maximum_clients: 1024,
            receive_timeout_ms: 1000,
            send_timeout_ms: 1000,
            client_inactivity_timeout_secs: 60,
            require_user_agent: false,
            require_range_header: false,
            server_name: "ASTI Media Server".to_string(),
            minimum_udp_port: None,
            maximum_udp_port: None,
            udp_port: None,
            udp_ipv6: false,
            http_port: None,
            maintenance_interval_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Serve RTSP over HTTP tunnelling on `port`.
    pub fn enable_http(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }

    /// Serve RTSP over UDP on `port`.
    pub fn enable_udp(mut self, port: u16, ipv6: bool) -> Self {
        self.udp_port = Some(port);
        self.udp_ipv6 = ipv6;
        self
    }
}

/// The RTSP relay server: owns the registries, the listener threads,
/// and the maintenance timer.
pub struct Server {
    config: Arc<ServerConfig>,
    sources: SourceRegistry,
    sessions: SessionRegistry,
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            sources: SourceRegistry::new(),
            sessions: SessionRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
        }
    }

    /// The source registry; sources may be added before or after start.
    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Bound control endpoint, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the listeners, start every registered source, and spawn the
    /// accept and maintenance threads.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(RelayError::AlreadyRunning);
        }
        if self.config.maximum_clients == 0 {
            return Err(RelayError::InvalidConfig(
                "maximum_clients must be > 0".to_string(),
            ));
        }

        let listener = TcpListener::bind(("0.0.0.0", self.config.port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        self.running.store(true, Ordering::SeqCst);
        self.sources.set_listening(true);
        for source in self.sources.snapshot() {
            source.start();
        }

        let handler = Arc::new(MethodHandler::new(
            self.sources.clone(),
            self.sessions.clone(),
            self.config.clone(),
            local_addr,
        ));

        tracing::info!(addr = %local_addr, "RTSP relay listening");

        {
            let h = handler.clone();
            let se = self.sessions.clone();
            let so = self.sources.clone();
            let c = self.config.clone();
            let r = self.running.clone();
            thread::spawn(move || tcp::accept_loop(listener, h, se, so, c, r));
        }

        if let Some(port) = self.config.udp_port {
            let socket = udp::bind_control_socket(port, self.config.udp_ipv6)?;
            tracing::info!(port, ipv6 = self.config.udp_ipv6, "RTSP over UDP enabled");
            let h = handler.clone();
            let se = self.sessions.clone();
            let c = self.config.clone();
            let r = self.running.clone();
            thread::spawn(move || udp::listen_loop(socket, h, se, c, r));
        }

        if let Some(port) = self.config.http_port {
            let listener = TcpListener::bind(("0.0.0.0", port))?;
            listener.set_nonblocking(true)?;
            tracing::info!(port, "HTTP tunnel enabled");
            let h = handler.clone();
            let se = self.sessions.clone();
            let c = self.config.clone();
            let r = self.running.clone();
            thread::spawn(move || http::accept_loop(listener, h, se, c, r));
        }

        {
            let se = self.sessions.clone();
            let so = self.sources.clone();
            let c = self.config.clone();
            let r = self.running.clone();
            thread::spawn(move || maintenance_loop(se, so, c, r));
        }

        Ok(())
    }

    /// Signal every loop, stop the sources, and drop all sessions.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        tracing::info!("server stopping");
        self.running.store(false, Ordering::SeqCst);
        self.sources.set_listening(false);

        for source in self.sources.snapshot() {
            source.stop();
        }
        for session in self.sessions.snapshot() {
            session.close(&self.sources);
        }
        self.sessions.clear();
        self.sources.clear();
        self.local_addr = None;
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Timer thread driving [`maintenance_sweep`] at the configured cadence,
/// polling the run flag once a second so shutdown stays prompt.
fn maintenance_loop(
    sessions: SessionRegistry,
    sources: SourceRegistry,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    let interval = Duration::from_secs(config.maintenance_interval_secs.max(1));
    let mut elapsed = Duration::ZERO;

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(1));
        elapsed += Duration::from_secs(1);
        if elapsed < interval {
            continue;
        }
        elapsed = Duration::ZERO;
        maintenance_sweep(&sessions, &sources, config.client_inactivity_timeout_secs);
    }
    tracing::debug!("maintenance loop exited");
}

/// One maintenance pass: cull idle sessions and restart stuck sources.
///
/// Nothing in here may take the server down; failures are logged and
/// the sweep moves on.
pub fn maintenance_sweep(
    sessions: &SessionRegistry,
    sources: &SourceRegistry,
    inactivity_timeout_secs: i64,
) {
    if inactivity_timeout_secs >= 0 {
        let limit = Duration::from_secs(inactivity_timeout_secs as u64);
        for session in sessions.snapshot() {
            if session.idle_for() <= limit {
                continue;
            }
            tracing::info!(
                session_id = %session.id,
                idle_secs = session.idle_for().as_secs(),
                "session timed out"
            );
            if let Some(client) = session.media_client() {
                client.send_goodbyes();
            }
            session.close(sources);
            sessions.remove(session.id);
        }
    }

    for source in sources.snapshot() {
        match source.state() {
            SourceState::Started if !source.is_ready() => {
                tracing::warn!(source = %source.name(), "source started but not ready, restarting");
                source.restart();
            }
            SourceState::Faulted => {
                tracing::warn!(source = %source.name(), "source faulted, restarting");
                source.restart();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdp::{MediaDescription, MediaKind, SessionDescription};
    use crate::session::{ControlProtocol, Session, SessionState};
    use crate::source::Source;

    fn started_source() -> Arc<Source> {
        let source = Arc::new(Source::new("cam", "rtsp://upstream/cam"));
        source.start();
        source.description_established(SessionDescription::new("cam").with_media(
            MediaDescription::new(MediaKind::Video, 96, "H264", 90000, "trackID=0"),
        ));
        source.media_received();
        source
    }

    #[test]
    fn start_rejects_zero_client_cap() {
        let mut server = Server::new(ServerConfig {
            maximum_clients: 0,
            ..ServerConfig::default()
        });
        let err = server.start().unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig(_)));
    }

    #[test]
    fn sweep_culls_idle_sessions() {
        let sessions = SessionRegistry::new();
        let sources = SourceRegistry::new();

        let idle = Arc::new(Session::new(
            "127.0.0.1:9000".parse().unwrap(),
            ControlProtocol::Tcp,
            0,
        ));
        sessions.add(idle.clone());
        std::thread::sleep(Duration::from_millis(20));

        maintenance_sweep(&sessions, &sources, 0);
        assert!(sessions.find_by_id(idle.id).is_none());
        assert_eq!(idle.state(), SessionState::Closed);
    }

    #[test]
    fn sweep_disabled_by_negative_timeout() {
        let sessions = SessionRegistry::new();
        let sources = SourceRegistry::new();

        let session = Arc::new(Session::new(
            "127.0.0.1:9000".parse().unwrap(),
            ControlProtocol::Tcp,
            -1,
        ));
        sessions.add(session.clone());
        std::thread::sleep(Duration::from_millis(20));

        maintenance_sweep(&sessions, &sources, -1);
        assert!(sessions.find_by_id(session.id).is_some());
    }

    #[test]
    fn sweep_restarts_stuck_sources() {
        let sessions = SessionRegistry::new();
        let sources = SourceRegistry::new();

        let stuck = Arc::new(Source::new("cam", "rtsp://upstream/cam"));
        stuck.start();
        stuck.description_established(SessionDescription::new("cam").with_media(
            MediaDescription::new(MediaKind::Video, 96, "H264", 90000, "trackID=0"),
        ));
        // Started, but media never arrived.
        sources.add(stuck.clone()).unwrap();

        maintenance_sweep(&sessions, &sources, 60);
        assert_eq!(stuck.state(), SourceState::Starting);
    }

    #[test]
    fn sweep_restarts_faulted_sources() {
        let sessions = SessionRegistry::new();
        let sources = SourceRegistry::new();
        let source = started_source();
        sources.add(source.clone()).unwrap();
        source.fault();

        maintenance_sweep(&sessions, &sources, 60);
        assert_eq!(source.state(), SourceState::Starting);
    }

    #[test]
    fn sweep_leaves_ready_sources_alone() {
        let sessions = SessionRegistry::new();
        let sources = SourceRegistry::new();
        let source = started_source();
        sources.add(source.clone()).unwrap();

        maintenance_sweep(&sessions, &sources, 60);
        assert_eq!(source.state(), SourceState::Started);
        assert!(source.is_ready());
    }
}
