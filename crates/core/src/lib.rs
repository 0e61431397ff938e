//! # relay — RTSP aggregation/relay server
//!
//! A library for re-publishing upstream RTP media sources to many
//! downstream RTSP clients. Operators register [`Source`]s under logical
//! names; clients discover them at `rtsp://host/live/<name-or-id>` and
//! drive the usual RTSP session lifecycle against them.
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response parsing, session lifecycle, transport negotiation |
//! | [RFC 2617](https://tools.ietf.org/html/rfc2617) | HTTP auth | Basic and Digest challenge/verify on protected sources |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP/RTCP | SSRC generation, senders reports, goodbyes |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Session descriptions served by DESCRIBE |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Server          — orchestrator, maintenance │
//! ├─────────────────────────────────────────────┤
//! │  Transport       — TCP / UDP / HTTP bridges  │
//! │  Protocol        — wire codec, dispatch      │
//! ├─────────────────────────────────────────────┤
//! │  SourceRegistry  — upstream sources          │
//! │  SessionRegistry — client sessions           │
//! ├─────────────────────────────────────────────┤
//! │  MediaClient     — per-session delivery      │
//! │  Auth / Sdp      — credentials, descriptions │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use relay::{Server, ServerConfig, Source};
//! use std::sync::Arc;
//!
//! let mut server = Server::new(ServerConfig::default());
//! server
//!     .sources()
//!     .add(Arc::new(Source::new("cam1", "rtsp://10.0.0.5/stream")))
//!     .unwrap();
//! server.start().unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — [`Server`] orchestrator, [`ServerConfig`], maintenance.
//! - [`source`] — [`Source`] lifecycle and [`SourceRegistry`] resolution.
//! - [`session`] — [`Session`] state machine and [`SessionRegistry`].
//! - [`protocol`] — request/response codec, method handlers, ranges,
//!   HTTP tunnelling.
//! - [`transport`] — the TCP/UDP/HTTP listeners feeding the handlers.
//! - [`media`] — per-session outgoing media client and port allocation.
//! - [`auth`] — Basic/Digest challenge and verification.
//! - [`sdp`] — session description model rendered by DESCRIBE.
//! - [`error`] — [`RelayError`] enum and [`Result`] alias.

pub mod auth;
pub mod error;
pub mod media;
pub mod protocol;
pub mod sdp;
pub mod server;
pub mod session;
pub mod source;
pub mod transport;

pub use auth::{AuthScheme, Credential};
pub use error::{RelayError, Result};
pub use media::MediaClient;
pub use sdp::{MediaDescription, MediaKind, SessionDescription};
pub use server::{Server, ServerConfig};
pub use session::{Session, SessionRegistry, SessionState};
pub use source::{Source, SourceRegistry, SourceState};
