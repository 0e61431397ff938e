//! RTSP-over-HTTP tunnelling codec.
//!
//! Clients behind restrictive firewalls POST base64-encoded RTSP requests
//! with `Accept: application/x-rtsp-tunnelled`; the server decodes the
//! body, runs it through the normal method handlers, and replies with a
//! base64-encoded RTSP response in an HTTP envelope.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{ParseErrorKind, RelayError};

/// Content type used by both directions of the tunnel.
pub const TUNNEL_CONTENT_TYPE: &str = "application/x-rtsp-tunnelled";

/// Decode a tunnelled HTTP body into raw RTSP request bytes.
///
/// Whitespace inside the body is tolerated; some clients chunk the
/// base64 payload across lines.
pub fn decode_body(body: &[u8]) -> crate::error::Result<Vec<u8>> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    BASE64.decode(&compact).map_err(|_| RelayError::Parse {
        kind: ParseErrorKind::InvalidTunnelBody,
    })
}

/// Wrap a serialized RTSP response into the HTTP tunnel envelope.
pub fn encode_response(rtsp: &str) -> String {
    let encoded = BASE64.encode(rtsp.as_bytes());
    format!(
        "HTTP/1.0 200 OK\r\n\
         Content-Type: {}\r\n\
         Cache-Control: no-cache\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        TUNNEL_CONTENT_TYPE,
        encoded.len(),
        encoded
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::request::{Method, RtspRequest};

    #[test]
    fn decode_tolerates_line_breaks() {
        let raw = b"OPTIONS rtsp://host/live/cam RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let mut encoded = BASE64.encode(raw);
        encoded.insert(10, '\n');

        let decoded = decode_body(encoded.as_bytes()).unwrap();
        let req = RtspRequest::parse(&decoded).unwrap();
        assert_eq!(req.method, Method::Options);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_body(b"!!not base64!!").is_err());
    }

    #[test]
    fn encode_builds_http_envelope() {
        let http = encode_response("RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n");
        assert!(http.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(http.contains("Content-Type: application/x-rtsp-tunnelled\r\n"));
        assert!(http.contains("Cache-Control: no-cache\r\n"));

        let body = http.split("\r\n\r\n").nth(1).unwrap();
        let decoded = BASE64.decode(body).unwrap();
        assert!(decoded.starts_with(b"RTSP/1.0 200 OK"));
    }
}
