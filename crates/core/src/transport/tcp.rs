use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::protocol::handler::MethodHandler;
use crate::protocol::request::RtspRequest;
use crate::server::ServerConfig;
use crate::session::{ControlProtocol, Session, SessionRegistry, SessionState};
use crate::source::SourceRegistry;

/// Non-blocking TCP accept loop for the RTSP control port.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
/// Accepts past the client cap are dropped on the floor.
pub fn accept_loop(
    listener: TcpListener,
    handler: Arc<MethodHandler>,
    sessions: SessionRegistry,
    sources: SourceRegistry,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if sessions.len() >= config.maximum_clients {
                    tracing::warn!(%peer_addr, cap = config.maximum_clients, "client cap reached, connection dropped");
                    continue;
                }
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let h = handler.clone();
                let se = sessions.clone();
                let so = sources.clone();
                let c = config.clone();
                let r = running.clone();
                thread::spawn(move || {
                    Connection::handle(stream, peer_addr, h, se, so, c, r);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single RTSP control connection with its own session and lifecycle.
struct Connection {
    stream: TcpStream,
    session: Arc<Session>,
    handler: Arc<MethodHandler>,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up the session and run the request loop.
    pub fn handle(
        stream: TcpStream,
        peer_addr: SocketAddr,
        handler: Arc<MethodHandler>,
        sessions: SessionRegistry,
        sources: SourceRegistry,
        config: Arc<ServerConfig>,
        running: Arc<AtomicBool>,
    ) {
        tracing::info!(%peer_addr, "client connected");

        let timeout = Duration::from_millis(config.receive_timeout_ms);
        if stream.set_read_timeout(Some(timeout)).is_err() {
            return;
        }
        let _ = stream.set_write_timeout(Some(Duration::from_millis(config.send_timeout_ms)));

        let session = Arc::new(Session::new(
            peer_addr,
            ControlProtocol::Tcp,
            config.client_inactivity_timeout_secs,
        ));
        if let Ok(clone) = stream.try_clone() {
            session.set_control_stream(clone);
        }

        let mut conn = Connection {
            stream,
            session,
            handler,
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.cleanup(&sessions, &sources);

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Request/response loop over a growing receive buffer. Returns the
    /// reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        let mut buffer: Vec<u8> = Vec::with_capacity(4096);
        let mut chunk = [0u8; 4096];

        while running.load(Ordering::SeqCst) {
            // Maintenance may close the session between reads.
            if self.session.state() == SessionState::Closed {
                return "session timed out";
            }

            // Drain every complete request already buffered before
            // reading again; interleaved clients pipeline requests.
            loop {
                match RtspRequest::parse_buffer(&buffer) {
                    Ok(Some((request, consumed))) => {
                        buffer.drain(..consumed);
                        if !self.dispatch(&request) {
                            return "write error";
                        }
                        if self.session.state() == SessionState::Closed {
                            return "session torn down";
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                        let _ = self
                            .stream
                            .write_all(self.handler.malformed_response().serialize().as_bytes());
                        return "parse error";
                    }
                }
            }

            match self.stream.read(&mut chunk) {
                Ok(0) => return "connection closed by client",
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    // Receive timeout: re-arm and keep waiting.
                    continue;
                }
                Err(_) => return "read error",
            }
        }

        "server shutting down"
    }

    /// Handle one request and send its response. Returns false when the
    /// connection is no longer writable.
    fn dispatch(&mut self, request: &RtspRequest) -> bool {
        let Some(response) = self.handler.handle(&self.session, request) else {
            return true;
        };
        self.stream
            .write_all(response.serialize().as_bytes())
            .is_ok()
    }

    /// Release the session if the client vanished without TEARDOWN.
    fn cleanup(&self, sessions: &SessionRegistry, sources: &SourceRegistry) {
        if self.session.state() != SessionState::Closed {
            self.session.close(sources);
        }
        sessions.remove(self.session.id);
    }
}
