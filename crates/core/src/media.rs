//! Outgoing media client: the per-session delivery half of the relay.
//!
//! A [`MediaClient`] is created lazily on a session's first SETUP and
//! owns everything needed to push RTP/RTCP toward that client: bound UDP
//! socket pairs in UDP mode, a clone of the control connection in
//! interleaved mode, the per-track transport contexts, and an outgoing
//! packet queue. The control plane only drives its lifecycle (connect,
//! disconnect, mode switches, senders reports, goodbyes); actual RTP
//! forwarding happens on the source's distribution path.

use std::collections::VecDeque;
use std::io::Write;
use std::net::{IpAddr, SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::error::{RelayError, Result};
use crate::sdp::MediaDescription;
use crate::session::transport::{ClientTransportContext, TransportMode};

/// Default media port range when the operator configures none.
pub const DEFAULT_MIN_UDP_PORT: u16 = 5000;
pub const DEFAULT_MAX_UDP_PORT: u16 = 65534;

/// A bound even/odd UDP socket pair: even port carries RTP, the next odd
/// port carries RTCP (RFC 3550 §11).
#[derive(Debug)]
pub struct UdpPair {
    pub rtp: UdpSocket,
    pub rtcp: UdpSocket,
    pub ports: (u16, u16),
}

/// Bind the first free even/odd pair inside `[min, max]`.
pub fn allocate_udp_pair(min: u16, max: u16) -> Result<UdpPair> {
    let start = if min % 2 == 0 { min } else { min + 1 };
    let mut port = start;
    while port < max {
        if let Ok(rtp) = UdpSocket::bind(("0.0.0.0", port)) {
            if let Ok(rtcp) = UdpSocket::bind(("0.0.0.0", port + 1)) {
                return Ok(UdpPair {
                    rtp,
                    rtcp,
                    ports: (port, port + 1),
                });
            }
        }
        port += 2;
    }
    Err(RelayError::UdpPortsExhausted { min, max })
}

/// Per-session outgoing media delivery state.
pub struct MediaClient {
    peer_ip: IpAddr,
    mode: RwLock<TransportMode>,
    contexts: RwLock<Vec<Arc<ClientTransportContext>>>,
    /// UDP socket pairs, parallel to `contexts`; empty in interleaved mode.
    sockets: Mutex<Vec<Option<UdpPair>>>,
    /// Clone of the RTSP control connection; interleaved mode only.
    control: Mutex<Option<TcpStream>>,
    queue: Mutex<VecDeque<Vec<u8>>>,
    connected: AtomicBool,
}

impl MediaClient {
    /// New client delivering over unicast UDP.
    pub fn udp(peer_ip: IpAddr) -> Self {
        Self {
            peer_ip,
            mode: RwLock::new(TransportMode::Udp),
            contexts: RwLock::new(Vec::new()),
            sockets: Mutex::new(Vec::new()),
            control: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(false),
        }
    }

    /// New client delivering interleaved over the control connection.
    pub fn interleaved(peer_ip: IpAddr, control: TcpStream) -> Self {
        Self {
            peer_ip,
            mode: RwLock::new(TransportMode::Interleaved),
            contexts: RwLock::new(Vec::new()),
            sockets: Mutex::new(Vec::new()),
            control: Mutex::new(Some(control)),
            queue: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> TransportMode {
        *self.mode.read()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::Release);
    }

    /// Stop delivery and drop every transport resource.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.queue.lock().clear();
        self.sockets.lock().clear();
        *self.control.lock() = None;
    }

    /// Register a track. `sockets` carries the bound pair in UDP mode.
    pub fn add_context(&self, ctx: Arc<ClientTransportContext>, sockets: Option<UdpPair>) {
        self.contexts.write().push(ctx);
        self.sockets.lock().push(sockets);
    }

    pub fn transport_contexts(&self) -> Vec<Arc<ClientTransportContext>> {
        self.contexts.read().clone()
    }

    /// Drop one track: remove its context and release the parallel
    /// socket pair. Used by track-level TEARDOWN.
    pub fn remove_context(&self, media: &MediaDescription) {
        let index = {
            let mut contexts = self.contexts.write();
            match contexts.iter().position(|c| c.media.same_media(media)) {
                Some(index) => {
                    contexts.remove(index);
                    Some(index)
                }
                None => None,
            }
        };
        if let Some(index) = index {
            let mut sockets = self.sockets.lock();
            if index < sockets.len() {
                sockets.remove(index);
            }
        }
    }

    /// Switch delivery mode mid-session.
    ///
    /// Pending packets belong to the old transport and are dropped, and
    /// the context list is emptied: the client re-issues SETUP per track
    /// on the new transport, rebuilding each context.
    pub fn set_transport_protocol(&self, mode: TransportMode, control: Option<TcpStream>) {
        tracing::debug!(?mode, "media client transport switch");
        *self.mode.write() = mode;
        self.queue.lock().clear();
        self.contexts.write().clear();
        self.sockets.lock().clear();
        match mode {
            TransportMode::Interleaved => {
                *self.control.lock() = control;
            }
            TransportMode::Udp => {
                *self.control.lock() = None;
            }
        }
    }

    pub fn clear_queues(&self) {
        self.queue.lock().clear();
    }

    pub fn queued_packets(&self) -> usize {
        self.queue.lock().len()
    }

    /// Queue an outgoing media packet (drained by the forwarding worker).
    pub fn enqueue(&self, packet: Vec<u8>) {
        self.queue.lock().push_back(packet);
    }

    /// Emit one RTCP senders report per track, best effort.
    pub fn send_senders_reports(&self) {
        for ctx in self.transport_contexts() {
            if !ctx.rtcp_enabled {
                continue;
            }
            let report = build_senders_report(ctx.ssrc, ctx.last_ntp(), ctx.last_rtp());
            if let Err(e) = self.send_rtcp(&ctx, &report) {
                tracing::debug!(ssrc = format_args!("{:08X}", ctx.ssrc), error = %e, "senders report not sent");
            }
        }
    }

    /// Emit one RTCP BYE per track, best effort.
    pub fn send_goodbyes(&self) {
        for ctx in self.transport_contexts() {
            if !ctx.rtcp_enabled {
                continue;
            }
            let bye = build_goodbye(ctx.ssrc);
            if let Err(e) = self.send_rtcp(&ctx, &bye) {
                tracing::debug!(ssrc = format_args!("{:08X}", ctx.ssrc), error = %e, "goodbye not sent");
            }
        }
    }

    fn send_rtcp(&self, ctx: &ClientTransportContext, packet: &[u8]) -> std::io::Result<()> {
        match self.mode() {
            TransportMode::Udp => {
                let (_, rtcp_port) = ctx.client_ports.ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotConnected, "no client ports")
                })?;
                // Contexts and sockets are parallel lists; resolve the
                // index first so the two locks are never held together.
                let index = self.contexts.read().iter().position(|c| c.ssrc == ctx.ssrc);
                let sockets = self.sockets.lock();
                let pair = index
                    .and_then(|i| sockets.get(i))
                    .and_then(|pair| pair.as_ref())
                    .ok_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::NotConnected, "no bound pair")
                    })?;
                pair.rtcp
                    .send_to(packet, SocketAddr::new(self.peer_ip, rtcp_port))?;
                Ok(())
            }
            TransportMode::Interleaved => {
                let mut control = self.control.lock();
                let stream = control.as_mut().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotConnected, "no control stream")
                })?;
                stream.write_all(&interleave(ctx.channels.1, packet))
            }
        }
    }
}

/// Minimal RTCP SR: header + SSRC + NTP + RTP timestamp, zero counts
/// (RFC 3550 §6.4.1).
fn build_senders_report(ssrc: u32, ntp: u64, rtp: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(28);
    packet.push(0x80); // V=2, P=0, RC=0
    packet.push(200); // PT=SR
    packet.extend_from_slice(&6u16.to_be_bytes()); // length in words - 1
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet.extend_from_slice(&ntp.to_be_bytes());
    packet.extend_from_slice(&rtp.to_be_bytes());
    packet.extend_from_slice(&0u32.to_be_bytes()); // packet count
    packet.extend_from_slice(&0u32.to_be_bytes()); // octet count
    packet
}

/// RTCP BYE for a single SSRC (RFC 3550 §6.6).
fn build_goodbye(ssrc: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8);
    packet.push(0x81); // V=2, P=0, SC=1
    packet.push(203); // PT=BYE
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet
}

/// Frame a packet for interleaved transport: `$`, channel, length
/// (RFC 2326 §10.12).
pub fn interleave(channel: u8, payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 4);
    framed.push(b'$');
    framed.push(channel);
    framed.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}
