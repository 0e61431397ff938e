use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::Result;
use crate::protocol::handler::MethodHandler;
use crate::protocol::request::RtspRequest;
use crate::server::ServerConfig;
use crate::session::{ControlProtocol, Session, SessionRegistry};

/// Bind the optional RTSP-over-UDP control socket.
pub fn bind_control_socket(port: u16, ipv6: bool) -> Result<UdpSocket> {
    let socket = if ipv6 {
        UdpSocket::bind(("::", port))?
    } else {
        UdpSocket::bind(("0.0.0.0", port))?
    };
    Ok(socket)
}

/// Datagram loop for the RTSP-over-UDP control path.
///
/// The first datagram from an endpoint seeds a session bound to that
/// peer; later datagrams from the same endpoint route to it. Each
/// datagram must hold one complete request, and responses go back to
/// the sending endpoint.
pub fn listen_loop(
    socket: UdpSocket,
    handler: Arc<MethodHandler>,
    sessions: SessionRegistry,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    // Read timeout doubles as the shutdown poll interval.
    let _ = socket.set_read_timeout(Some(Duration::from_millis(config.receive_timeout_ms)));

    let mut peers: HashMap<SocketAddr, Uuid> = HashMap::new();
    let mut buf = [0u8; 8192];

    while running.load(Ordering::SeqCst) {
        let (len, peer_addr) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "UDP receive error");
                }
                continue;
            }
        };

        let session = peers
            .get(&peer_addr)
            .and_then(|id| sessions.find_by_id(*id))
            .unwrap_or_else(|| {
                let session = Arc::new(Session::new(
                    peer_addr,
                    ControlProtocol::Udp,
                    config.client_inactivity_timeout_secs,
                ));
                tracing::info!(%peer_addr, session_id = %session.id, "UDP control peer seeded");
                peers.insert(peer_addr, session.id);
                session
            });

        let response = match RtspRequest::parse(&buf[..len]) {
            Ok(request) => handler.handle(&session, &request),
            Err(e) => {
                tracing::warn!(%peer_addr, error = %e, "parse error");
                Some(handler.malformed_response())
            }
        };

        if let Some(response) = response {
            if let Err(e) = socket.send_to(response.serialize().as_bytes(), peer_addr) {
                tracing::warn!(%peer_addr, error = %e, "UDP send error");
            }
        }

        // Sessions culled by Maintenance or TEARDOWN must not pin their
        // endpoint mapping.
        peers.retain(|_, id| sessions.find_by_id(*id).is_some());
    }
    tracing::debug!("UDP control loop exited");
}
