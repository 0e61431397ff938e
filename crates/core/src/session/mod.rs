//! Client sessions and their registry (RFC 2326 §3, §12.37).
//!
//! A [`Session`] is created when a control connection appears (TCP
//! accept, first UDP datagram, or first HTTP tunnel POST) and tracks
//! everything the relay knows about one client: the negotiated token,
//! the per-track transport contexts on both ends of the attachment, the
//! lazily created outgoing media client, and the activity clock that
//! Maintenance sweeps against.
//!
//! ## Lifecycle
//!
//! ```text
//! New   --SETUP-----> Ready    (token minted, transport bound)
//! Ready --PLAY------> Playing  (attached to source)
//! Playing --PAUSE---> Ready    (detached, contexts kept)
//! any   --TEARDOWN--> Closed   (terminal; registry entry removed)
//! any   --inactivity> Closed   (via Maintenance)
//! ```

pub mod transport;

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use uuid::Uuid;

use crate::media::MediaClient;
use crate::sdp::MediaDescription;
use crate::source::{SourceRegistry, SourceTransportContext};
pub use transport::{ClientTransportContext, TransportHeader, TransportMode};

/// Control-plane state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no transport bound yet.
    New,
    /// At least one SETUP completed.
    Ready,
    /// Attached to a source, media flowing.
    Playing,
    /// Terminal: socket closed, attachments released.
    Closed,
}

/// Which kind of control endpoint the session arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlProtocol {
    Tcp,
    Udp,
    HttpTunnel,
}

/// One connected RTSP client.
pub struct Session {
    pub id: Uuid,
    /// Remote endpoint of the control connection; requests presenting
    /// this session's token from a different endpoint are rejected.
    pub peer_addr: SocketAddr,
    pub protocol: ControlProtocol,
    token: RwLock<Option<String>>,
    state: RwLock<SessionState>,
    last_activity: RwLock<Instant>,
    last_cseq: RwLock<Option<u64>>,
    /// Clone of the TCP control stream, for interleaved transport.
    control: Mutex<Option<TcpStream>>,
    media_client: RwLock<Option<Arc<MediaClient>>>,
    client_contexts: RwLock<Vec<Arc<ClientTransportContext>>>,
    source_contexts: RwLock<Vec<Arc<SourceTransportContext>>>,
    attached_source: RwLock<Option<Uuid>>,
    /// Advertised inactivity timeout in seconds; -1 disables culling.
    pub timeout_secs: i64,
}

impl Session {
    pub fn new(peer_addr: SocketAddr, protocol: ControlProtocol, timeout_secs: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_addr,
            protocol,
            token: RwLock::new(None),
            state: RwLock::new(SessionState::New),
            last_activity: RwLock::new(Instant::now()),
            last_cseq: RwLock::new(None),
            control: Mutex::new(None),
            media_client: RwLock::new(None),
            client_contexts: RwLock::new(Vec::new()),
            source_contexts: RwLock::new(Vec::new()),
            attached_source: RwLock::new(None),
            timeout_secs,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn set_token(&self, token: String) {
        *self.token.write() = Some(token);
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: SessionState) {
        tracing::debug!(session_id = %self.id, old = ?*self.state.read(), new = ?state, "session state");
        *self.state.write() = state;
    }

    /// Record client activity; Maintenance culls idle sessions.
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    pub fn last_cseq(&self) -> Option<u64> {
        *self.last_cseq.read()
    }

    pub fn record_cseq(&self, cseq: u64) {
        *self.last_cseq.write() = Some(cseq);
    }

    /// Stash a clone of the TCP control stream for interleaved setup.
    pub fn set_control_stream(&self, stream: TcpStream) {
        *self.control.lock() = Some(stream);
    }

    /// A further clone of the control stream, when one is stashed.
    pub fn control_stream(&self) -> Option<TcpStream> {
        self.control.lock().as_ref().and_then(|s| s.try_clone().ok())
    }

    pub fn media_client(&self) -> Option<Arc<MediaClient>> {
        self.media_client.read().clone()
    }

    pub fn set_media_client(&self, client: Arc<MediaClient>) {
        *self.media_client.write() = Some(client);
    }

    pub fn client_contexts(&self) -> Vec<Arc<ClientTransportContext>> {
        self.client_contexts.read().clone()
    }

    pub fn add_client_context(&self, ctx: Arc<ClientTransportContext>) {
        self.client_contexts.write().push(ctx);
    }

    /// Drop every per-track context; used when transports are rebuilt
    /// mid-session and on close.
    pub fn clear_contexts(&self) {
        self.client_contexts.write().clear();
        self.source_contexts.write().clear();
    }

    /// Interleaved channel pair for the next track: 0/1 first, then each
    /// track two above the last.
    pub fn next_channels(&self) -> (u8, u8) {
        match self.client_contexts.read().last() {
            Some(last) => (
                last.channels.0.saturating_add(2),
                last.channels.1.saturating_add(2),
            ),
            None => (0, 1),
        }
    }

    pub fn source_contexts(&self) -> Vec<Arc<SourceTransportContext>> {
        self.source_contexts.read().clone()
    }

    /// Attach a source-side context; one entry per media, aligned with
    /// the client context list.
    pub fn add_source_context(&self, ctx: Arc<SourceTransportContext>) {
        let mut contexts = self.source_contexts.write();
        if !contexts.iter().any(|c| c.media.same_media(&ctx.media)) {
            contexts.push(ctx);
        }
    }

    /// Remove the source context carrying `media`. Returns whether any
    /// contexts remain.
    pub fn remove_source_context(&self, media: &MediaDescription) -> bool {
        let mut contexts = self.source_contexts.write();
        if let Some(pos) = contexts.iter().position(|c| c.media.same_media(media)) {
            contexts.remove(pos);
        }
        !contexts.is_empty()
    }

    /// Remove the client context carrying `media`; the counterpart of
    /// [`remove_source_context`](Self::remove_source_context), so the
    /// two lists stay aligned track for track.
    pub fn remove_client_context(&self, media: &MediaDescription) {
        let mut contexts = self.client_contexts.write();
        if let Some(pos) = contexts.iter().position(|c| c.media.same_media(media)) {
            contexts.remove(pos);
        }
    }

    pub fn attached_source(&self) -> Option<Uuid> {
        *self.attached_source.read()
    }

    pub fn set_attached_source(&self, source: Option<Uuid>) {
        *self.attached_source.write() = source;
    }

    /// Format the `Session` response header value (RFC 2326 §12.37).
    pub fn session_header_value(&self) -> String {
        let token = self.token().unwrap_or_default();
        format!("{};timeout={}", token, self.timeout_secs)
    }

    /// Tear everything down: detach from the source, disconnect the
    /// media client, clear context lists, enter the terminal state.
    /// The caller removes the registry entry.
    pub fn close(&self, sources: &SourceRegistry) {
        if let Some(source_id) = self.attached_source.write().take() {
            if let Some(source) = sources.get(source_id) {
                source.detach(self.id);
            }
        }
        if let Some(client) = self.media_client.read().as_ref() {
            client.disconnect();
        }
        self.clear_contexts();
        *self.control.lock() = None;
        self.set_state(SessionState::Closed);
    }
}

/// Thread-safe registry of live sessions, keyed by internal id.
///
/// Token lookup is a linear scan; the session count is bounded by
/// `maximum_clients`, so an index has not been worth its bookkeeping.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn add(&self, session: Arc<Session>) {
        let id = session.id;
        self.sessions.write().insert(id, session);
        let total = self.sessions.read().len();
        tracing::debug!(session_id = %id, total_sessions = total, "session registered");
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(&id);
        if removed.is_some() {
            let total = self.sessions.read().len();
            tracing::debug!(session_id = %id, total_sessions = total, "session removed");
        }
        removed
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Look up by RTSP `Session:` token — trimmed, case-sensitive.
    pub fn find_by_token(&self, token: &str) -> Option<Arc<Session>> {
        let token = token.trim();
        self.sessions
            .read()
            .values()
            .find(|s| s.token().as_deref() == Some(token))
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn clear(&self) {
        self.sessions.write().clear();
    }

    /// Mint a session token that is unique among live sessions: 16 hex
    /// chars of CSPRNG output, re-drawn on the (unlikely) collision.
    pub fn mint_token(&self) -> String {
        loop {
            let token = format!("{:016X}", rand::rng().random::<u64>());
            if self.find_by_token(&token).is_none() {
                return token;
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
