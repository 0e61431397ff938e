//! Transport bridges: the listeners that feed bytes into the control
//! plane.
//!
//! Three bridges produce identically shaped requests for the same
//! [`MethodHandler`](crate::protocol::handler::MethodHandler):
//!
//! - [`tcp`] — the mandatory RTSP control port. One accept loop, one
//!   worker thread per connection, buffer-based framing with pipelining.
//! - [`udp`] — optional RTSP over UDP. Datagram-per-request; sessions
//!   are keyed by the sending endpoint.
//! - [`http`] — optional RTSP-over-HTTP tunnelling for clients behind
//!   firewalls; base64 bodies POSTed and answered synchronously.

pub mod http;
pub mod tcp;
pub mod udp;
