use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::sdp::MediaDescription;

/// How RTP/RTCP reaches the client for one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Unicast UDP to the client's `client_port` pair.
    Udp,
    /// Framed inside the RTSP TCP connection (`$`-interleaved).
    Interleaved,
}

/// Per-track transport state negotiated during SETUP (RFC 2326 §12.39).
///
/// Every context carries interleaved channel numbers even in UDP mode:
/// when the client later re-issues SETUP over TCP the channels are
/// already assigned and the switch only has to rebuild the media client.
#[derive(Debug)]
pub struct ClientTransportContext {
    pub media: Arc<MediaDescription>,
    /// Interleaved (data, control) channel pair.
    pub channels: (u8, u8),
    /// Client's (RTP, RTCP) receive ports; UDP mode only.
    pub client_ports: Option<(u16, u16)>,
    /// Server's (RTP, RTCP) send ports; UDP mode only.
    pub server_ports: Option<(u16, u16)>,
    /// Synchronization source identifier advertised to the client
    /// (random per RFC 3550 §8.1).
    pub ssrc: u32,
    /// False when the media description zeroes both report bandwidths.
    pub rtcp_enabled: bool,
    last_ntp: AtomicU64,
    last_rtp: AtomicU32,
}

impl ClientTransportContext {
    /// Context for UDP unicast delivery.
    pub fn udp(
        media: Arc<MediaDescription>,
        channels: (u8, u8),
        client_ports: (u16, u16),
        server_ports: (u16, u16),
    ) -> Self {
        let rtcp_enabled = !media.rtcp_disabled();
        Self {
            media,
            channels,
            client_ports: Some(client_ports),
            server_ports: Some(server_ports),
            ssrc: rand::rng().random::<u32>(),
            rtcp_enabled,
            last_ntp: AtomicU64::new(0),
            last_rtp: AtomicU32::new(0),
        }
    }

    /// Context for interleaved delivery over the control connection.
    pub fn interleaved(media: Arc<MediaDescription>, channels: (u8, u8)) -> Self {
        let rtcp_enabled = !media.rtcp_disabled();
        Self {
            media,
            channels,
            client_ports: None,
            server_ports: None,
            ssrc: rand::rng().random::<u32>(),
            rtcp_enabled,
            last_ntp: AtomicU64::new(0),
            last_rtp: AtomicU32::new(0),
        }
    }

    /// Seed NTP/RTP clocks from the source side of the attachment.
    pub fn set_timestamps(&self, ntp: u64, rtp: u32) {
        self.last_ntp.store(ntp, Ordering::Relaxed);
        self.last_rtp.store(rtp, Ordering::Relaxed);
    }

    pub fn last_ntp(&self) -> u64 {
        self.last_ntp.load(Ordering::Relaxed)
    }

    pub fn last_rtp(&self) -> u32 {
        self.last_rtp.load(Ordering::Relaxed)
    }
}

/// Parsed client-side `Transport:` header (RFC 2326 §12.39).
///
/// Only the parameters the relay negotiates on are extracted; everything
/// else in the token list is ignored. A header carrying neither
/// `client_port=` nor `interleaved=` parses to `None` and the handler
/// answers 400.
#[derive(Debug, Clone)]
pub struct TransportHeader {
    /// Requested `interleaved=a-b` channel pair.
    pub interleaved: Option<(u8, u8)>,
    /// Requested `client_port=a-b` UDP port pair.
    pub client_port: Option<(u16, u16)>,
}

impl TransportHeader {
    /// Parse the `Transport` header value, splitting on `;`.
    pub fn parse(header: &str) -> Option<Self> {
        let mut interleaved = None;
        let mut client_port = None;

        for token in header.split(';') {
            let token = token.trim();
            if let Some(spec) = token.strip_prefix("interleaved=") {
                interleaved = parse_pair::<u8>(spec);
            } else if let Some(spec) = token.strip_prefix("client_port=") {
                client_port = parse_pair::<u16>(spec);
            }
        }

        if interleaved.is_none() && client_port.is_none() {
            return None;
        }
        Some(Self {
            interleaved,
            client_port,
        })
    }
}

/// `"a-b"` → `(a, b)`.
fn parse_pair<T: std::str::FromStr>(spec: &str) -> Option<(T, T)> {
    let (a, b) = spec.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdp::{MediaDescription, MediaKind};

    #[test]
    fn parse_udp_transport() {
        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        assert_eq!(th.client_port, Some((5000, 5001)));
        assert_eq!(th.interleaved, None);
    }

    #[test]
    fn parse_interleaved_transport() {
        let th = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=0-1").unwrap();
        assert_eq!(th.interleaved, Some((0, 1)));
        assert_eq!(th.client_port, None);
    }

    #[test]
    fn parse_neither_is_none() {
        assert!(TransportHeader::parse("RTP/AVP;unicast").is_none());
        assert!(TransportHeader::parse("RTP/AVP;unicast;client_port=8000").is_none());
    }

    #[test]
    fn context_timestamps() {
        let media = Arc::new(MediaDescription::new(
            MediaKind::Video,
            96,
            "H264",
            90000,
            "trackID=0",
        ));
        let ctx = ClientTransportContext::interleaved(media, (0, 1));
        ctx.set_timestamps(0x1122334455667788, 90_000);
        assert_eq!(ctx.last_ntp(), 0x1122334455667788);
        assert_eq!(ctx.last_rtp(), 90_000);
    }

    #[test]
    fn rtcp_disabled_by_bandwidth() {
        let mut media = MediaDescription::new(MediaKind::Video, 96, "H264", 90000, "trackID=0");
        media.bandwidth_rr = Some(0);
        media.bandwidth_rs = Some(0);
        let ctx = ClientTransportContext::udp(Arc::new(media), (0, 1), (5000, 5001), (6000, 6001));
        assert!(!ctx.rtcp_enabled);
    }
}
