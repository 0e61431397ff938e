//! Session description model (RFC 4566 / RFC 8866).
//!
//! A [`SessionDescription`] is attached to a source once its upstream
//! negotiation completes, and is rendered into the DESCRIBE response body.
//! The relay only cares about the parts of SDP that drive the control
//! plane: one [`MediaDescription`] per track, its `a=control:` attribute
//! (used to match SETUP/TEARDOWN URIs), and the `b=RR:`/`b=RS:` bandwidth
//! lines that can disable RTCP for a track.
//!
//! ```text
//! v=0
//! o=- 0 0 IN IP4 <addr>
//! s=<session-name>
//! c=IN IP4 <addr>
//! t=0 0
//! m=video 0 RTP/AVP 96          ← one block per MediaDescription
//! b=RR:0                        ← optional receiver-report bandwidth
//! b=RS:0                        ← optional sender-report bandwidth
//! a=rtpmap:96 H264/90000
//! a=control:trackID=0
//! ```

use std::sync::Arc;

/// Top-level media type of one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Application,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Application => "application",
        }
    }
}

/// One `m=` block: a single RTP track within a session description.
#[derive(Debug, Clone)]
pub struct MediaDescription {
    pub kind: MediaKind,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    /// Encoding name for `a=rtpmap` (e.g. `H264`).
    pub encoding: String,
    /// Clock rate in Hz for `a=rtpmap`.
    pub clock_rate: u32,
    /// Value of the `a=control:` attribute (e.g. `trackID=0`).
    pub control: String,
    /// `b=RR:` bandwidth, when present.
    pub bandwidth_rr: Option<u32>,
    /// `b=RS:` bandwidth, when present.
    pub bandwidth_rs: Option<u32>,
    /// Extra media-level `a=` attribute lines (fmtp and friends).
    pub attributes: Vec<String>,
}

impl MediaDescription {
    pub fn new(kind: MediaKind, payload_type: u8, encoding: &str, clock_rate: u32, control: &str) -> Self {
        Self {
            kind,
            payload_type,
            encoding: encoding.to_string(),
            clock_rate,
            control: control.to_string(),
            bandwidth_rr: None,
            bandwidth_rs: None,
            attributes: Vec::new(),
        }
    }

    /// RTCP is off for a track when both report directions are zeroed.
    pub fn rtcp_disabled(&self) -> bool {
        self.bandwidth_rr == Some(0) && self.bandwidth_rs == Some(0)
    }

    /// Whether a URI track segment addresses this media.
    ///
    /// Matches on equality or containment in either direction, so both
    /// `trackID=0` against `a=control:trackID=0` and a fully qualified
    /// control URL against its last segment resolve.
    pub fn matches_control(&self, segment: &str) -> bool {
        if segment.is_empty() || self.control.is_empty() {
            return false;
        }
        self.control == segment
            || segment.contains(self.control.as_str())
            || self.control.contains(segment)
    }

    /// Two descriptions refer to the same media when type and format agree.
    pub fn same_media(&self, other: &MediaDescription) -> bool {
        self.kind == other.kind && self.payload_type == other.payload_type
    }
}

/// A complete session description: session name plus one entry per track.
///
/// Tracks are shared as `Arc` so that source and client transport
/// contexts can reference the same media without copying.
#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    pub name: String,
    pub media: Vec<Arc<MediaDescription>>,
}

impl SessionDescription {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            media: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: MediaDescription) -> Self {
        self.media.push(Arc::new(media));
        self
    }

    /// Find the track addressed by a URI segment via `a=control:` matching.
    pub fn find_by_control(&self, segment: &str) -> Option<Arc<MediaDescription>> {
        self.media
            .iter()
            .find(|m| m.matches_control(segment))
            .cloned()
    }

    /// Render to SDP text for the DESCRIBE response body.
    pub fn render(&self, ip: &str) -> String {
        let mut sdp: Vec<String> = Vec::new();

        sdp.push("v=0".to_string());
        sdp.push(format!("o=- 0 0 IN IP4 {}", ip));
        sdp.push(format!("s={}", self.name));
        sdp.push(format!("c=IN IP4 {}", ip));
        sdp.push("t=0 0".to_string());

        for media in &self.media {
            sdp.push(format!(
                "m={} 0 RTP/AVP {}",
                media.kind.as_str(),
                media.payload_type
            ));
            if let Some(rr) = media.bandwidth_rr {
                sdp.push(format!("b=RR:{}", rr));
            }
            if let Some(rs) = media.bandwidth_rs {
                sdp.push(format!("b=RS:{}", rs));
            }
            sdp.push(format!(
                "a=rtpmap:{} {}/{}",
                media.payload_type, media.encoding, media.clock_rate
            ));
            sdp.extend(media.attributes.iter().cloned());
            sdp.push(format!("a=control:{}", media.control));
        }

        format!("{}\r\n", sdp.join("\r\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_track() -> MediaDescription {
        MediaDescription::new(MediaKind::Video, 96, "H264", 90000, "trackID=0")
    }

    #[test]
    fn render_single_track() {
        let desc = SessionDescription::new("Camera 1").with_media(video_track());
        let sdp = desc.render("192.168.1.10");

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("s=Camera 1\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.10\r\n"));
        assert!(sdp.contains("m=video 0 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000\r\n"));
        assert!(sdp.contains("a=control:trackID=0\r\n"));
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn render_bandwidth_lines() {
        let mut track = video_track();
        track.bandwidth_rr = Some(0);
        track.bandwidth_rs = Some(0);
        let sdp = SessionDescription::new("s").with_media(track).render("10.0.0.1");

        let m_idx = sdp.find("m=video").unwrap();
        let b_idx = sdp.find("b=RR:0").unwrap();
        let a_idx = sdp.find("a=rtpmap").unwrap();
        assert!(m_idx < b_idx && b_idx < a_idx, "b= lines sit between m= and a=");
        assert!(sdp.contains("b=RS:0\r\n"));
    }

    #[test]
    fn rtcp_disabled_needs_both_directions() {
        let mut track = video_track();
        assert!(!track.rtcp_disabled());
        track.bandwidth_rr = Some(0);
        assert!(!track.rtcp_disabled());
        track.bandwidth_rs = Some(0);
        assert!(track.rtcp_disabled());
    }

    #[test]
    fn control_matching() {
        let track = video_track();
        assert!(track.matches_control("trackID=0"));
        assert!(track.matches_control("rtsp://host/live/cam/trackID=0"));
        assert!(!track.matches_control("trackID=1"));
        assert!(!track.matches_control(""));
    }

    #[test]
    fn find_by_control_picks_matching_track() {
        let desc = SessionDescription::new("s")
            .with_media(video_track())
            .with_media(MediaDescription::new(
                MediaKind::Audio,
                0,
                "PCMU",
                8000,
                "trackID=1",
            ));

        let audio = desc.find_by_control("trackID=1").unwrap();
        assert_eq!(audio.kind, MediaKind::Audio);
        assert!(desc.find_by_control("trackID=9").is_none());
    }
}
