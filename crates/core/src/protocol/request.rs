use crate::error::{ParseErrorKind, RelayError};

/// RTSP method token (RFC 2326 §6.1).
///
/// Unrecognised tokens are carried in [`Unknown`](Self::Unknown) so the
/// handler can still echo `CSeq` and answer `405 Method Not Allowed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    GetParameter,
    SetParameter,
    Unknown(String),
}

impl Method {
    pub fn from_token(token: &str) -> Self {
        match token {
            "OPTIONS" => Self::Options,
            "DESCRIBE" => Self::Describe,
            "SETUP" => Self::Setup,
            "PLAY" => Self::Play,
            "PAUSE" => Self::Pause,
            "TEARDOWN" => Self::Teardown,
            "GET_PARAMETER" => Self::GetParameter,
            "SET_PARAMETER" => Self::SetParameter,
            _ => Self::Unknown(token.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Options => "OPTIONS",
            Self::Describe => "DESCRIBE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
            Self::GetParameter => "GET_PARAMETER",
            Self::SetParameter => "SET_PARAMETER",
            Self::Unknown(token) => token,
        }
    }
}

/// A parsed RTSP request (RFC 2326 §6).
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body, Content-Length bytes]
/// ```
///
/// Header names are stored as received; lookups via
/// [`header`](Self::header) are case-insensitive per RFC 2326 §4.2.
/// Header values may continue across lines via leading whitespace.
#[derive(Debug)]
pub struct RtspRequest {
    pub method: Method,
    pub uri: String,
    /// Protocol version as (major, minor); `RTSP/1.0` parses to `(1, 0)`.
    pub version: (u8, u8),
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RtspRequest {
    /// Try to frame one request out of a receive buffer.
    ///
    /// Returns `Ok(None)` while the buffer does not yet hold a complete
    /// head (terminated by an empty line) plus `Content-Length` body
    /// bytes; the connection worker keeps reading and retries. On success
    /// the second tuple element is the number of bytes consumed, so
    /// pipelined requests behind this one stay in the buffer.
    pub fn parse_buffer(buf: &[u8]) -> crate::error::Result<Option<(RtspRequest, usize)>> {
        let Some(head_len) = find_head_end(buf) else {
            return Ok(None);
        };

        let head = std::str::from_utf8(&buf[..head_len]).map_err(|_| RelayError::Parse {
            kind: ParseErrorKind::InvalidRequestLine,
        })?;

        let mut lines = head.split("\r\n");

        let request_line = lines.next().unwrap_or("");
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(RelayError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = Method::from_token(parts[0]);
        let uri = parts[1].to_string();
        let version = parse_version(parts[2]).ok_or(RelayError::Parse {
            kind: ParseErrorKind::InvalidRequestLine,
        })?;

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }

            // Continuation line: leading whitespace folds into the
            // previous header value (RFC 2326 §4.1).
            if line.starts_with(' ') || line.starts_with('\t') {
                match headers.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                        continue;
                    }
                    None => {
                        return Err(RelayError::Parse {
                            kind: ParseErrorKind::InvalidHeader,
                        });
                    }
                }
            }

            let colon_pos = line.find(':').ok_or(RelayError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        let content_length = match lookup(&headers, "Content-Length") {
            Some(v) => v.parse::<usize>().map_err(|_| RelayError::Parse {
                kind: ParseErrorKind::InvalidContentLength,
            })?,
            None => 0,
        };

        let total = head_len + content_length;
        if buf.len() < total {
            return Ok(None);
        }

        Ok(Some((
            RtspRequest {
                method,
                uri,
                version,
                headers,
                body: buf[head_len..total].to_vec(),
            },
            total,
        )))
    }

    /// Parse a whole message (one UDP datagram or one tunnelled body).
    ///
    /// Unlike [`parse_buffer`](Self::parse_buffer) there is no more data
    /// coming: an incomplete message is an error, and so are trailing
    /// bytes after the head when no `Content-Length` announced them.
    pub fn parse(buf: &[u8]) -> crate::error::Result<RtspRequest> {
        match Self::parse_buffer(buf)? {
            Some((request, consumed)) => {
                if consumed < buf.len() {
                    return Err(RelayError::Parse {
                        kind: ParseErrorKind::BodyWithoutLength,
                    });
                }
                Ok(request)
            }
            None => Err(RelayError::Parse {
                kind: ParseErrorKind::Truncated,
            }),
        }
    }

    /// Look up a header value by name (case-insensitive, RFC 2326 §4.2).
    pub fn header(&self, name: &str) -> Option<&str> {
        lookup(&self.headers, name)
    }

    /// The CSeq header value parsed as a number (RFC 2326 §12.17).
    pub fn cseq(&self) -> Option<u64> {
        self.header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    /// The `Session:` token with any `;timeout=` parameter stripped.
    pub fn session_token(&self) -> Option<&str> {
        self.header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
            .filter(|s| !s.is_empty())
    }

    /// Final path segment of the request URI, used for track addressing.
    pub fn last_uri_segment(&self) -> Option<&str> {
        self.uri
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
    }
}

fn lookup<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// `RTSP/1.0` → `(1, 0)`.
fn parse_version(token: &str) -> Option<(u8, u8)> {
    let rest = token.strip_prefix("RTSP/")?;
    let (major, minor) = rest.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Byte offset just past the `\r\n\r\n` head terminator, if present.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_request() {
        let raw = b"OPTIONS rtsp://localhost:554/live/cam RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, Method::Options);
        assert_eq!(req.uri, "rtsp://localhost:554/live/cam");
        assert_eq!(req.version, (1, 0));
        assert_eq!(req.cseq(), Some(1));
        assert!(req.body.is_empty());
    }

    #[test]
    fn parse_buffer_incomplete_returns_none() {
        let raw = b"SETUP rtsp://host/live/cam/trackID=0 RTSP/1.0\r\nCSeq: 3\r\n";
        assert!(RtspRequest::parse_buffer(raw).unwrap().is_none());
    }

    #[test]
    fn parse_buffer_waits_for_body() {
        let raw = b"SET_PARAMETER rtsp://host/live/cam RTSP/1.0\r\nCSeq: 7\r\nContent-Length: 10\r\n\r\nabc";
        assert!(RtspRequest::parse_buffer(raw).unwrap().is_none());

        let raw = b"SET_PARAMETER rtsp://host/live/cam RTSP/1.0\r\nCSeq: 7\r\nContent-Length: 3\r\n\r\nabc";
        let (req, consumed) = RtspRequest::parse_buffer(raw).unwrap().unwrap();
        assert_eq!(req.body, b"abc");
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn parse_buffer_leaves_pipelined_request() {
        let raw = b"OPTIONS rtsp://host/live/cam RTSP/1.0\r\nCSeq: 1\r\n\r\nOPTIONS rtsp://host/live/cam RTSP/1.0\r\nCSeq: 2\r\n\r\n";
        let (req, consumed) = RtspRequest::parse_buffer(raw).unwrap().unwrap();
        assert_eq!(req.cseq(), Some(1));

        let (req2, _) = RtspRequest::parse_buffer(&raw[consumed..]).unwrap().unwrap();
        assert_eq!(req2.cseq(), Some(2));
    }

    #[test]
    fn whole_message_rejects_unannounced_body() {
        let raw = b"OPTIONS rtsp://host/live/cam RTSP/1.0\r\nCSeq: 1\r\n\r\ntrailing";
        let err = RtspRequest::parse(raw).unwrap_err();
        assert!(matches!(
            err,
            RelayError::Parse {
                kind: ParseErrorKind::BodyWithoutLength
            }
        ));
    }

    #[test]
    fn parse_invalid_request_line() {
        assert!(RtspRequest::parse(b"JUST_A_METHOD\r\n\r\n").is_err());
        assert!(RtspRequest::parse(b"OPTIONS * HTTP/1.1\r\n\r\n").is_err());
    }

    #[test]
    fn unknown_method_is_carried_not_rejected() {
        let raw = b"RECORD rtsp://host/live/cam RTSP/1.0\r\nCSeq: 9\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, Method::Unknown("RECORD".to_string()));
        assert_eq!(req.method.as_str(), "RECORD");
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let raw = b"OPTIONS rtsp://host RTSP/1.0\r\ncseq: 42\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.header("CSeq"), Some("42"));
        assert_eq!(req.header("CSEQ"), Some("42"));
    }

    #[test]
    fn continuation_line_folds_into_value() {
        let raw =
            b"DESCRIBE rtsp://host/live/cam RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp,\r\n application/rtsl\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(
            req.header("Accept"),
            Some("application/sdp, application/rtsl")
        );
    }

    #[test]
    fn session_token_strips_timeout() {
        let raw = b"PLAY rtsp://host/live/cam RTSP/1.0\r\nCSeq: 4\r\nSession: ABCDEF0123456789;timeout=60\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.session_token(), Some("ABCDEF0123456789"));
    }

    #[test]
    fn last_uri_segment() {
        let raw = b"SETUP rtsp://host:554/live/cam/trackID=0 RTSP/1.0\r\nCSeq: 3\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.last_uri_segment(), Some("trackID=0"));
    }

    #[test]
    fn version_parses_futures() {
        let raw = b"OPTIONS rtsp://host RTSP/2.0\r\nCSeq: 1\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.version, (2, 0));
    }
}
