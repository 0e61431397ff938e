//! Upstream media sources and their registry.
//!
//! A [`Source`] represents one pullable upstream (a camera, an encoder)
//! published under `/live/<name-or-id>/…`. The upstream puller itself is
//! a collaborator outside this crate; it drives the source through its
//! lifecycle by reporting the negotiated session description and the
//! first received media:
//!
//! ```text
//! Stopped --start()--> Starting --description_established()--> Started
//! Started --media_received()--> Started + ready
//! Started --fault()--> Faulted  (restartable)
//! any     --stop()---> Stopped
//! ```
//!
//! The control plane polls [`state`](Source::state) and
//! [`is_ready`](Source::is_ready) and manages the attachment list; it
//! never consumes upstream events directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::auth::{AuthScheme, Credential};
use crate::error::{RelayError, Result};
use crate::sdp::{MediaDescription, SessionDescription};

/// Lifecycle state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Stopped,
    Starting,
    Started,
    Faulted,
}

/// Per-track state on the source side: the upstream clocks and sequence
/// numbers that seed client transport contexts at SETUP time.
#[derive(Debug)]
pub struct SourceTransportContext {
    pub media: Arc<MediaDescription>,
    sequence: AtomicU16,
    last_ntp: AtomicU64,
    last_rtp: AtomicU32,
}

impl SourceTransportContext {
    pub fn new(media: Arc<MediaDescription>) -> Self {
        Self {
            media,
            sequence: AtomicU16::new(0),
            last_ntp: AtomicU64::new(0),
            last_rtp: AtomicU32::new(0),
        }
    }

    /// Called by the upstream receiver as packets flow.
    pub fn observe(&self, sequence: u16, ntp: u64, rtp: u32) {
        self.sequence.store(sequence, Ordering::Relaxed);
        self.last_ntp.store(ntp, Ordering::Relaxed);
        self.last_rtp.store(rtp, Ordering::Relaxed);
    }

    pub fn sequence(&self) -> u16 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub fn last_ntp(&self) -> u64 {
        self.last_ntp.load(Ordering::Relaxed)
    }

    pub fn last_rtp(&self) -> u32 {
        self.last_rtp.load(Ordering::Relaxed)
    }
}

/// One upstream media source published by the relay.
pub struct Source {
    id: Uuid,
    name: String,
    /// Upstream URL the puller collaborator connects to.
    url: String,
    /// Alias strings, stored lowercased; matching is case-insensitive.
    aliases: Vec<String>,
    state: RwLock<SourceState>,
    ready: AtomicBool,
    description: RwLock<Option<Arc<SessionDescription>>>,
    contexts: RwLock<Vec<Arc<SourceTransportContext>>>,
    credential: Option<Credential>,
    auth_scheme: AuthScheme,
    force_tcp: bool,
    /// Sessions currently receiving this source's packets.
    attached: RwLock<Vec<Uuid>>,
}

impl Source {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            url: url.to_string(),
            aliases: Vec::new(),
            state: RwLock::new(SourceState::Stopped),
            ready: AtomicBool::new(false),
            description: RwLock::new(None),
            contexts: RwLock::new(Vec::new()),
            credential: None,
            auth_scheme: AuthScheme::None,
            force_tcp: false,
            attached: RwLock::new(Vec::new()),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_lowercase());
        self
    }

    pub fn with_credential(mut self, credential: Credential, scheme: AuthScheme) -> Self {
        self.credential = Some(credential);
        self.auth_scheme = scheme;
        self
    }

    pub fn with_force_tcp(mut self) -> Self {
        self.force_tcp = true;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        self.auth_scheme
    }

    pub fn force_tcp(&self) -> bool {
        self.force_tcp
    }

    pub fn state(&self) -> SourceState {
        *self.state.read()
    }

    /// Started and at least one media packet seen.
    pub fn is_ready(&self) -> bool {
        self.state() == SourceState::Started && self.ready.load(Ordering::Acquire)
    }

    pub fn description(&self) -> Option<Arc<SessionDescription>> {
        self.description.read().clone()
    }

    pub fn transport_contexts(&self) -> Vec<Arc<SourceTransportContext>> {
        self.contexts.read().clone()
    }

    /// Find the source context carrying the given media.
    pub fn find_context(&self, media: &MediaDescription) -> Option<Arc<SourceTransportContext>> {
        self.contexts
            .read()
            .iter()
            .find(|ctx| ctx.media.same_media(media))
            .cloned()
    }

    /// Begin pulling from upstream.
    pub fn start(&self) {
        let mut state = self.state.write();
        match *state {
            SourceState::Stopped | SourceState::Faulted => {
                tracing::info!(source = %self.name, id = %self.id, "source starting");
                *state = SourceState::Starting;
            }
            _ => {}
        }
    }

    /// Upstream negotiation finished: description known, tracks built.
    pub fn description_established(&self, description: SessionDescription) {
        let description = Arc::new(description);
        let contexts: Vec<Arc<SourceTransportContext>> = description
            .media
            .iter()
            .map(|m| Arc::new(SourceTransportContext::new(m.clone())))
            .collect();

        *self.description.write() = Some(description);
        *self.contexts.write() = contexts;
        *self.state.write() = SourceState::Started;
        tracing::info!(source = %self.name, "source started");
    }

    /// First media packet arrived; the source becomes describable.
    pub fn media_received(&self) {
        if self.state() == SourceState::Started {
            self.ready.store(true, Ordering::Release);
        }
    }

    /// Upstream failed; Maintenance will restart a faulted source.
    pub fn fault(&self) {
        tracing::warn!(source = %self.name, "source faulted");
        *self.state.write() = SourceState::Faulted;
        self.ready.store(false, Ordering::Release);
    }

    pub fn stop(&self) {
        tracing::info!(source = %self.name, "source stopped");
        *self.state.write() = SourceState::Stopped;
        self.ready.store(false, Ordering::Release);
        self.contexts.write().clear();
        self.attached.write().clear();
    }

    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    /// Install a forwarding binding toward a session.
    pub fn attach(&self, session_id: Uuid) {
        let mut attached = self.attached.write();
        if !attached.contains(&session_id) {
            attached.push(session_id);
            tracing::debug!(source = %self.name, %session_id, "session attached");
        }
    }

    /// Remove a forwarding binding.
    pub fn detach(&self, session_id: Uuid) {
        let mut attached = self.attached.write();
        if let Some(pos) = attached.iter().position(|id| *id == session_id) {
            attached.swap_remove(pos);
            tracing::debug!(source = %self.name, %session_id, "session detached");
        }
    }

    pub fn attached_sessions(&self) -> Vec<Uuid> {
        self.attached.read().clone()
    }

    /// Whether a stream key addresses this source.
    fn matches_key(&self, key: &str) -> bool {
        self.name.eq_ignore_ascii_case(key)
            || self.id.to_string().eq_ignore_ascii_case(key)
            || self.aliases.iter().any(|a| a == &key.to_lowercase())
    }
}

/// Process-wide registry of sources, keyed by id.
///
/// Shared freely across listener and maintenance threads; the inner lock
/// is only held for map access, never across source start/stop I/O.
#[derive(Clone)]
pub struct SourceRegistry {
    sources: Arc<RwLock<HashMap<Uuid, Arc<Source>>>>,
    listening: Arc<AtomicBool>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Arc::new(RwLock::new(HashMap::new())),
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a source. While the server is listening, newly added
    /// sources are started immediately.
    pub fn add(&self, source: Arc<Source>) -> Result<()> {
        {
            let mut sources = self.sources.write();
            if sources.contains_key(&source.id()) {
                return Err(RelayError::SourceAlreadyPresent(source.id()));
            }
            sources.insert(source.id(), source.clone());
        }
        tracing::info!(source = %source.name(), id = %source.id(), "source registered");
        if self.listening.load(Ordering::Acquire) {
            source.start();
        }
        Ok(())
    }

    /// Remove a source, optionally stopping it. Returns whether anything
    /// was removed.
    pub fn remove(&self, id: Uuid, stop: bool) -> bool {
        let removed = self.sources.write().remove(&id);
        match removed {
            Some(source) => {
                if stop {
                    source.stop();
                }
                tracing::info!(source = %source.name(), %id, "source removed");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Source>> {
        self.sources.read().get(&id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Arc<Source>> {
        self.sources.read().values().cloned().collect()
    }

    pub fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::Release);
    }

    /// Drop every source; part of server teardown.
    pub fn clear(&self) {
        self.sources.write().clear();
    }

    /// Resolve a request URI to a source.
    ///
    /// The path is split on `/`; the segment after a `live` token is the
    /// stream key, matched case-insensitively against source names,
    /// stringified ids, and aliases. `archive` paths are recognised but
    /// not yet served.
    pub fn resolve(&self, uri: &str) -> Option<Arc<Source>> {
        let path = strip_scheme_and_host(uri);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let token_pos = segments
            .iter()
            .position(|s| s.eq_ignore_ascii_case("live") || s.eq_ignore_ascii_case("archive"))?;
        if segments[token_pos].eq_ignore_ascii_case("archive") {
            // Archive playback is not served yet.
            return None;
        }
        let key = segments.get(token_pos + 1)?;

        self.sources
            .read()
            .values()
            .find(|source| source.matches_key(key))
            .cloned()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `rtsp://host:554/live/cam/trackID=0` → `/live/cam/trackID=0`.
fn strip_scheme_and_host(uri: &str) -> &str {
    if let Some(after) = uri
        .strip_prefix("rtsp://")
        .or_else(|| uri.strip_prefix("rtspu://"))
        .or_else(|| uri.strip_prefix("http://"))
    {
        match after.find('/') {
            Some(slash) => &after[slash..],
            None => "/",
        }
    } else {
        uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdp::{MediaKind, SessionDescription};

    fn started_source(name: &str) -> Arc<Source> {
        let source = Arc::new(Source::new(name, "rtsp://upstream/cam"));
        source.start();
        source.description_established(
            SessionDescription::new(name).with_media(MediaDescription::new(
                MediaKind::Video,
                96,
                "H264",
                90000,
                "trackID=0",
            )),
        );
        source.media_received();
        source
    }

    #[test]
    fn lifecycle_reaches_ready() {
        let source = Source::new("cam", "rtsp://upstream/cam");
        assert_eq!(source.state(), SourceState::Stopped);
        assert!(!source.is_ready());

        source.start();
        assert_eq!(source.state(), SourceState::Starting);

        source.description_established(SessionDescription::new("cam").with_media(
            MediaDescription::new(MediaKind::Video, 96, "H264", 90000, "trackID=0"),
        ));
        assert_eq!(source.state(), SourceState::Started);
        assert!(!source.is_ready(), "ready needs first media");

        source.media_received();
        assert!(source.is_ready());
        assert_eq!(source.transport_contexts().len(), 1);
    }

    #[test]
    fn fault_clears_ready_and_is_restartable() {
        let source = started_source("cam");
        source.fault();
        assert_eq!(source.state(), SourceState::Faulted);
        assert!(!source.is_ready());

        source.restart();
        assert_eq!(source.state(), SourceState::Starting);
    }

    #[test]
    fn stop_clears_contexts_and_attachments() {
        let source = started_source("cam");
        source.attach(Uuid::new_v4());
        source.stop();
        assert!(source.transport_contexts().is_empty());
        assert!(source.attached_sessions().is_empty());
    }

    #[test]
    fn attach_is_idempotent() {
        let source = started_source("cam");
        let id = Uuid::new_v4();
        source.attach(id);
        source.attach(id);
        assert_eq!(source.attached_sessions().len(), 1);
        source.detach(id);
        assert!(source.attached_sessions().is_empty());
    }

    #[test]
    fn registry_rejects_duplicate_id() {
        let registry = SourceRegistry::new();
        let source = Arc::new(Source::new("cam", "rtsp://upstream/cam"));
        registry.add(source.clone()).unwrap();
        let err = registry.add(source).unwrap_err();
        assert!(matches!(err, RelayError::SourceAlreadyPresent(_)));
    }

    #[test]
    fn registry_starts_sources_while_listening() {
        let registry = SourceRegistry::new();
        registry.set_listening(true);
        let source = Arc::new(Source::new("cam", "rtsp://upstream/cam"));
        registry.add(source.clone()).unwrap();
        assert_eq!(source.state(), SourceState::Starting);
    }

    #[test]
    fn resolve_by_name_id_and_alias() {
        let registry = SourceRegistry::new();
        let source = Arc::new(Source::new("Front-Door", "rtsp://upstream/cam").with_alias("Lobby"));
        let id = source.id();
        registry.add(source).unwrap();

        assert!(registry
            .resolve("rtsp://host:554/live/front-door")
            .is_some());
        assert!(registry
            .resolve(&format!("rtsp://host/live/{}", id))
            .is_some());
        assert!(registry
            .resolve("rtsp://host/live/LOBBY/trackID=0")
            .is_some());
        assert!(registry.resolve("rtsp://host/live/unknown").is_none());
        assert!(registry.resolve("rtsp://host/other/front-door").is_none());
    }

    #[test]
    fn resolve_archive_is_stubbed() {
        let registry = SourceRegistry::new();
        registry
            .add(Arc::new(Source::new("cam", "rtsp://upstream/cam")))
            .unwrap();
        assert!(registry.resolve("rtsp://host/archive/cam").is_none());
    }

    #[test]
    fn remove_optionally_stops() {
        let registry = SourceRegistry::new();
        let source = started_source("cam");
        let id = source.id();
        registry.add(source.clone()).unwrap();

        assert!(registry.remove(id, true));
        assert_eq!(source.state(), SourceState::Stopped);
        assert!(!registry.remove(id, false));
    }
}
