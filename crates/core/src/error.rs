//! Error types for the RTSP relay server library.

use std::fmt;

/// Errors produced by the server infrastructure.
///
/// Protocol-level failures (a malformed SETUP, a bad credential) are not
/// errors in this sense; method handlers turn them into RTSP responses
/// with the appropriate status code and the connection keeps running.
/// `RelayError` covers the failures that have no response to carry them:
///
/// - **Transport**: [`Io`](Self::Io) — socket/bind/network failures.
/// - **Protocol framing**: [`Parse`](Self::Parse) — a byte stream that
///   cannot be framed as an RTSP message at all.
/// - **Registry**: [`SourceAlreadyPresent`](Self::SourceAlreadyPresent).
/// - **Media plane**: [`UdpPortsExhausted`](Self::UdpPortsExhausted).
/// - **Server lifecycle**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning),
///   [`InvalidConfig`](Self::InvalidConfig).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to frame an RTSP request from the wire bytes.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// A source with this identifier is already registered.
    #[error("source already present: {0}")]
    SourceAlreadyPresent(uuid::Uuid),

    /// No free even/odd UDP port pair inside the configured media range.
    #[error("no free UDP port pair in {min}-{max}")]
    UdpPortsExhausted { min: u16, max: u16 },

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// A configuration value is out of its accepted domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Specific kind of RTSP framing failure.
///
/// Every variant maps to `400 Bad Request` when it occurs inside a
/// connection worker; the parse error is logged and the connection is
/// closed because the stream can no longer be re-synchronised.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty or ended before the request was complete.
    Truncated,
    /// Request line did not have the `Method URI RTSP/x.y` shape.
    InvalidRequestLine,
    /// A header line had no colon separator.
    InvalidHeader,
    /// `Content-Length` was present but not a number.
    InvalidContentLength,
    /// Body bytes followed the header block without a `Content-Length`.
    BodyWithoutLength,
    /// An HTTP-tunnelled body was not valid base64.
    InvalidTunnelBody,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
            Self::BodyWithoutLength => write!(f, "body without Content-Length"),
            Self::InvalidTunnelBody => write!(f, "invalid tunnel body"),
        }
    }
}

/// Convenience alias for `Result<T, RelayError>`.
pub type Result<T> = std::result::Result<T, RelayError>;
