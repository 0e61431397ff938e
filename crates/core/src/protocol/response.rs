/// An RTSP response (RFC 2326 §7).
///
/// Builder pattern: chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then [`serialize`](Self::serialize).
/// `Content-Length` is computed automatically when a body is present.
///
/// Every response that leaves the server carries a `Server:` header and
/// echoes the request's `CSeq:`; the method handler injects both through
/// its response constructor, so the serializer here stays dumb.
#[must_use]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Reason phrase for the status codes this server emits (RFC 2326 §7.1.1).
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        412 => "Precondition Failed",
        454 => "Session Not Found",
        461 => "Unsupported Transport",
        500 => "Internal Server Error",
        505 => "RTSP Version Not Supported",
        _ => "Unknown",
    }
}

impl RtspResponse {
    pub fn new(status_code: u16) -> Self {
        RtspResponse {
            status_code,
            status_text: reason_phrase(status_code).to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically
    /// (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        use std::fmt::Write;

        let mut out = String::with_capacity(128 + self.body.as_ref().map_or(0, String::len));
        let _ = write!(out, "RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);
        for (name, value) in &self.headers {
            let _ = write!(out, "{}: {}\r\n", name, value);
        }
        match &self.body {
            Some(body) => {
                let _ = write!(out, "Content-Length: {}\r\n\r\n{}", body.len(), body);
            }
            None => out.push_str("\r\n"),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_no_body() {
        let wire = RtspResponse::ok()
            .add_header("CSeq", "1")
            .add_header("Public", "OPTIONS")
            .serialize();
        assert_eq!(
            wire,
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS\r\n\r\n"
        );
    }

    #[test]
    fn serialize_with_body() {
        let wire = RtspResponse::ok()
            .add_header("CSeq", "2")
            .with_body("v=0\r\n".to_string())
            .serialize();
        assert!(wire.contains("\r\nContent-Length: 5\r\n\r\nv=0\r\n"));
    }

    #[test]
    fn reason_phrases() {
        assert_eq!(RtspResponse::new(454).status_text, "Session Not Found");
        assert_eq!(RtspResponse::new(461).status_text, "Unsupported Transport");
        assert_eq!(
            RtspResponse::new(505).status_text,
            "RTSP Version Not Supported"
        );
    }
}
