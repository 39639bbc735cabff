//! The session engine: connect lifecycle, outbound operations, and
//! inbound dispatch.
//!
//! The engine is a thin state machine over a [`Transport`]. Outbound calls
//! build envelopes and hand them to the link; the transport feeds link and
//! packet events back through the engine's inbound surface. All state lives
//! behind two mutexes: one for connection state (phase, link, rooms,
//! limits), one for the coupled resource caches. Callbacks always run
//! outside lock scopes.

use std::cmp;
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::constants::{
    CAP_RESOURCE_ANNOUNCEMENT, HELLO_LOOP_SLICE, LINK_SETTLE_DELAY, PATH_WAIT_MAX,
    POLL_BACKOFF_FACTOR, POLL_INTERVAL_INITIAL, POLL_INTERVAL_MAX, RES_KIND_MOTD, RES_KIND_NOTICE,
};
use crate::core::{DestinationHash, MessageId, SessionError, ValidationError};
use crate::delivery::{Correlation, DeliveryTracker};
use crate::envelope::{
    decode, encode, Envelope, HelloInfo, Payload, ResourceAnnouncement, WelcomeInfo,
};
use crate::resource::ExpectationCache;
use crate::session::config::SessionConfig;
use crate::session::events::SessionEvents;
use crate::session::latency::LatencyTracker;
use crate::session::limits::{normalize_room, NegotiatedLimits};
use crate::transport::{
    Link, LocalIdentity, ResourceStrategy, TransferId, TransferStatus, Transport,
};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No connection attempt in progress.
    Disconnected,
    /// Waiting for the mesh to learn a path to the destination.
    PathDiscovery,
    /// Waiting for the destination's identity to become recallable.
    IdentityRecall,
    /// Link opened, waiting for it to become active.
    LinkEstablishing,
    /// Link active, HELLO sent, waiting for WELCOME.
    Handshaking,
    /// WELCOME received; the session is usable.
    Active,
    /// Closed locally.
    Closed,
    /// Connect failed (timeout or protocol mismatch).
    Failed,
}

/// Connection-side state, guarded by one mutex.
struct ConnState {
    phase: SessionPhase,
    link: Option<Arc<dyn Link>>,
    destination: Option<DestinationHash>,
    limits: NegotiatedLimits,
    rooms: BTreeSet<String>,
    nickname: Option<String>,
    welcome: Option<WelcomeInfo>,
    // Bumped whenever the link slot changes; a HELLO loop carrying a
    // stale generation stops instead of greeting a newer link.
    link_generation: u64,
}

struct Inner {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    identity: LocalIdentity,
    events: Arc<dyn SessionEvents>,
    conn: Mutex<ConnState>,
    resources: Mutex<ExpectationCache>,
    latency: Mutex<LatencyTracker>,
    tracker: DeliveryTracker,
    welcomed_tx: watch::Sender<bool>,
    hello_task: Mutex<Option<JoinHandle<()>>>,
    keepalive_task: Mutex<Option<JoinHandle<()>>>,
}

/// Client session over an encrypted mesh link.
///
/// Cheaply cloneable; clones share the session. The transport calls the
/// inbound surface ([`link_established`](Self::link_established),
/// [`packet_received`](Self::packet_received), ...) from any thread.
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<Inner>,
}

impl SessionEngine {
    /// Create an engine over the given transport and local identity.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        identity: LocalIdentity,
        events: Arc<dyn SessionEvents>,
    ) -> Self {
        let (welcomed_tx, _) = watch::channel(false);
        let tracker = DeliveryTracker::new(config.delivery_timeout);
        let engine = Self {
            inner: Arc::new(Inner {
                resources: Mutex::new(ExpectationCache::new(
                    config.resource_ttl,
                    config.resource_max_pending,
                )),
                config,
                transport,
                identity,
                events,
                conn: Mutex::new(ConnState {
                    phase: SessionPhase::Disconnected,
                    link: None,
                    destination: None,
                    limits: NegotiatedLimits::default(),
                    rooms: BTreeSet::new(),
                    nickname: None,
                    welcome: None,
                    link_generation: 0,
                }),
                latency: Mutex::new(LatencyTracker::new()),
                tracker,
                welcomed_tx,
                hello_task: Mutex::new(None),
                keepalive_task: Mutex::new(None),
            }),
        };

        let events = engine.inner.events.clone();
        engine
            .inner
            .tracker
            .set_timeout_handler(Arc::new(move |id, pending| {
                events.on_delivery_timeout(id, &pending.room, &pending.text);
            }));

        engine
    }

    // =========================================================================
    // CONNECT LIFECYCLE
    // =========================================================================

    /// Connect to the hub at `destination`.
    ///
    /// Runs path discovery and identity recall with exponential backoff
    /// polling, verifies the recalled identity derives the requested
    /// destination, optionally tears down leftover links, and opens a fresh
    /// one. Returns once the link is opened; the handshake continues when
    /// the transport reports the link established. Use
    /// [`wait_welcome`](Self::wait_welcome) to block until the hub answers.
    pub async fn connect(&self, destination: DestinationHash) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.inner.config.connect_timeout;
        let transport = self.inner.transport.clone();

        // A fresh attempt starts un-welcomed. send_replace stores the
        // value even while no receiver is subscribed.
        self.inner.welcomed_tx.send_replace(false);
        self.set_phase(SessionPhase::PathDiscovery);
        if !transport.has_path(&destination) {
            debug!(%destination, "no known path, requesting");
            if let Err(err) = transport.request_path(&destination) {
                // Discovery errors are tolerated; identity recall below
                // still has the full deadline to succeed.
                warn!(%err, "path request failed");
            }
            let path_deadline = cmp::min(deadline, Instant::now() + PATH_WAIT_MAX);
            let mut interval = POLL_INTERVAL_INITIAL;
            while !transport.has_path(&destination) && Instant::now() < path_deadline {
                tokio::time::sleep(interval).await;
                interval = next_poll_interval(interval);
            }
        }

        self.set_phase(SessionPhase::IdentityRecall);
        let mut interval = POLL_INTERVAL_INITIAL;
        let remote = loop {
            if let Some(remote) = transport.recall_identity(&destination) {
                break remote;
            }
            if Instant::now() >= deadline {
                self.set_phase(SessionPhase::Failed);
                return Err(SessionError::Timeout(format!(
                    "could not reach hub {destination}: the hub may be offline, \
                     the destination hash may be wrong, or its announce has not \
                     propagated yet"
                )));
            }
            tokio::time::sleep(interval).await;
            interval = next_poll_interval(interval);
        };

        let derived = transport.derive_destination(&remote, &self.inner.config.dest_name);
        if derived != destination {
            self.set_phase(SessionPhase::Failed);
            return Err(SessionError::ProtocolMismatch(format!(
                "identity at {destination} derives destination {derived}; \
                 the peer is not an rrc hub"
            )));
        }

        if self.inner.config.cleanup_existing_links && transport.teardown_links_to(&destination) {
            debug!(%destination, "tore down leftover links, settling");
            tokio::time::sleep(LINK_SETTLE_DELAY).await;
        }

        self.set_phase(SessionPhase::LinkEstablishing);
        let link = match transport.open_link(&destination) {
            Ok(link) => link,
            Err(err) => {
                self.set_phase(SessionPhase::Failed);
                return Err(err.into());
            }
        };

        {
            let mut conn = self.conn();
            conn.link = Some(link);
            conn.destination = Some(destination);
            conn.link_generation += 1;
        }
        info!(%destination, "link opened");
        Ok(())
    }

    /// Block until the hub's WELCOME arrives, or `timeout` elapses.
    pub async fn wait_welcome(&self, timeout: Duration) -> Result<(), SessionError> {
        let mut rx = self.inner.welcomed_tx.subscribe();
        if *rx.borrow() {
            return Ok(());
        }
        let welcomed = tokio::time::timeout(timeout, async {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return true;
                }
            }
            false
        })
        .await;
        match welcomed {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(SessionError::Timeout(
                "no WELCOME from hub".to_string(),
            )),
        }
    }

    /// Close the session: stop background tasks, cancel transfers, tear
    /// the link down, and fire `on_close`.
    pub fn close(&self) {
        self.stop_keepalive();
        self.inner.tracker.clear();
        self.inner.tracker.stop();
        self.teardown_session(SessionPhase::Closed);
        self.emit("on_close", |e| e.on_close());
    }

    fn teardown_session(&self, phase: SessionPhase) {
        if let Some(handle) = self.inner.hello_task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        let link = {
            let mut conn = self.conn();
            conn.phase = phase;
            conn.link_generation += 1;
            conn.rooms.clear();
            conn.destination = None;
            conn.welcome = None;
            conn.link.take()
        };
        let cancelled = self.resources().clear();
        if let Some(link) = link {
            for transfer in cancelled {
                link.cancel_transfer(transfer);
            }
            link.teardown();
        }
        *self.latency() = LatencyTracker::new();
        self.inner.welcomed_tx.send_replace(false);
    }

    // =========================================================================
    // OUTBOUND OPERATIONS
    // =========================================================================

    /// Join a room, optionally with a room key.
    ///
    /// The room name is normalized (trimmed, lowercased) before
    /// validation; membership is recorded when the hub confirms.
    pub fn join(&self, room: &str, key: Option<&str>) -> Result<(), SessionError> {
        let room = normalize_room(room);
        let link = {
            let conn = self.conn();
            conn.limits.validate_room(&room)?;
            if !conn.rooms.contains(&room) && conn.rooms.len() >= conn.limits.max_rooms_per_session
            {
                return Err(ValidationError::RoomCapReached {
                    joined: conn.rooms.len(),
                    limit: conn.limits.max_rooms_per_session,
                }
                .into());
            }
            conn.link.clone().ok_or(SessionError::NotConnected)?
        };
        let key = key.filter(|k| !k.is_empty()).map(String::from);
        let envelope = Envelope::new(self.source_bytes(), Payload::Join { key }).with_room(&room);
        self.send_envelope(&link, &envelope)
    }

    /// Leave a room. Membership is dropped locally right away.
    pub fn part(&self, room: &str) -> Result<(), SessionError> {
        let room = normalize_room(room);
        let link = {
            let mut conn = self.conn();
            conn.limits.validate_room(&room)?;
            conn.rooms.remove(&room);
            conn.link.clone().ok_or(SessionError::NotConnected)?
        };
        let envelope = Envelope::new(self.source_bytes(), Payload::Part).with_room(&room);
        self.send_envelope(&link, &envelope)
    }

    /// Send a chat message to a room.
    ///
    /// Returns the message id; delivery is confirmed when the hub echo
    /// arrives, or reported through `on_delivery_timeout` if it never does.
    pub fn msg(&self, room: &str, text: &str) -> Result<MessageId, SessionError> {
        let room = normalize_room(room);
        let (link, nickname) = {
            let conn = self.conn();
            conn.limits.validate_room(&room)?;
            conn.limits.validate_message(text)?;
            (
                conn.link.clone().ok_or(SessionError::NotConnected)?,
                conn.nickname.clone(),
            )
        };
        let mut envelope =
            Envelope::new(self.source_bytes(), Payload::Msg(text.to_string())).with_room(&room);
        if let Some(nickname) = nickname {
            envelope = envelope.with_nickname(nickname);
        }
        let id = envelope.header.id;
        self.send_envelope(&link, &envelope)?;
        self.inner.tracker.add(id, room, text);
        Ok(id)
    }

    /// Send a latency probe.
    pub fn ping(&self) -> Result<MessageId, SessionError> {
        let link = self.active_link()?;
        let envelope = Envelope::new(self.source_bytes(), Payload::Ping(None));
        let id = envelope.header.id;
        self.send_envelope(&link, &envelope)?;
        self.latency().record_ping(id);
        Ok(id)
    }

    /// Set (or clear) the nickname stamped into HELLO and MSG envelopes.
    pub fn set_nickname(&self, nickname: Option<String>) -> Result<(), SessionError> {
        let mut conn = self.conn();
        if let Some(nickname) = &nickname {
            conn.limits.validate_nickname(nickname)?;
        }
        conn.nickname = nickname;
        Ok(())
    }

    /// Start the periodic keepalive ping task. Idempotent.
    ///
    /// The task stops itself once the session is no longer connected.
    pub fn start_keepalive(&self) {
        let mut guard = self
            .inner
            .keepalive_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return;
        }
        let engine = self.clone();
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.inner.config.keepalive_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                match engine.ping() {
                    Ok(_) => {}
                    Err(SessionError::NotConnected) => {
                        debug!("link gone, keepalive stopping");
                        return;
                    }
                    Err(err) => debug!(%err, "keepalive ping failed"),
                }
            }
        }));
    }

    /// Stop the keepalive task and clear measured latency.
    pub fn stop_keepalive(&self) {
        if let Some(handle) = self
            .inner
            .keepalive_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        *self.latency() = LatencyTracker::new();
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.conn().phase
    }

    /// Whether the handshake has completed and the link is still up.
    pub fn is_connected(&self) -> bool {
        let conn = self.conn();
        conn.phase == SessionPhase::Active
            && conn.link.as_ref().is_some_and(|link| link.is_active())
    }

    /// Snapshot of currently joined rooms.
    pub fn rooms(&self) -> Vec<String> {
        self.conn().rooms.iter().cloned().collect()
    }

    /// Latest round-trip sample in milliseconds, if any.
    pub fn latency_ms(&self) -> Option<f64> {
        self.latency().last_rtt().map(|d| d.as_secs_f64() * 1000.0)
    }

    /// Current nickname.
    pub fn nickname(&self) -> Option<String> {
        self.conn().nickname.clone()
    }

    /// Limits currently in force.
    pub fn limits(&self) -> NegotiatedLimits {
        self.conn().limits.clone()
    }

    /// WELCOME details, once the handshake has completed.
    pub fn welcome(&self) -> Option<WelcomeInfo> {
        self.conn().welcome.clone()
    }

    // =========================================================================
    // INBOUND SURFACE (called by the transport)
    // =========================================================================

    /// The link reported active; begin the handshake.
    pub fn link_established(&self) {
        let (link, generation) = {
            let mut conn = self.conn();
            conn.phase = SessionPhase::Handshaking;
            (conn.link.clone(), conn.link_generation)
        };
        let Some(link) = link else {
            debug!("link established with no link slot, ignoring");
            return;
        };

        link.set_resource_strategy(ResourceStrategy::AcceptApp);
        if let Err(err) = link.identify(&self.inner.identity) {
            warn!(%err, "identify failed, tearing link down");
            self.teardown_session(SessionPhase::Failed);
            self.emit("on_close", |e| e.on_close());
            return;
        }

        self.spawn_hello_loop(link, generation);
    }

    /// The link closed underneath us.
    pub fn link_closed(&self) {
        info!("link closed");
        self.teardown_session(SessionPhase::Disconnected);
        self.emit("on_close", |e| e.on_close());
    }

    /// A raw packet arrived on the link.
    pub fn packet_received(&self, raw: &[u8]) {
        let envelope = match decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%err, "dropping undecodable packet");
                return;
            }
        };
        self.dispatch(envelope);
    }

    /// The peer announced an inbound transfer of `size` bytes; the return
    /// value is whether to accept it.
    pub fn resource_advertised(&self, transfer: TransferId, size: u64) -> bool {
        if size == 0 || size > self.inner.config.max_resource_size {
            debug!(%transfer, size, "rejecting transfer: size out of bounds");
            return false;
        }
        let mut resources = self.resources();
        if resources.active_count() >= self.inner.config.max_active_transfers {
            debug!(%transfer, "rejecting transfer: too many active");
            return false;
        }
        // Accept even without a matching expectation; conclude() gets a
        // second chance to match by size.
        let expectation = resources.match_size(size, Instant::now());
        resources.start_transfer(transfer, expectation);
        true
    }

    /// An accepted transfer ended.
    pub fn resource_concluded(
        &self,
        transfer: TransferId,
        status: TransferStatus,
        size: u64,
        data: Option<Vec<u8>>,
    ) {
        let expectation = self
            .resources()
            .conclude(transfer, size, Instant::now());

        if status != TransferStatus::Complete {
            debug!(%transfer, ?status, "transfer did not complete");
            return;
        }
        let Some(data) = data else {
            debug!(%transfer, "transfer completed without data");
            return;
        };
        let Some(expectation) = expectation else {
            debug!(%transfer, "no expectation for concluded transfer, discarding");
            return;
        };

        if let Some(declared) = expectation.sha256 {
            let digest: [u8; 32] = Sha256::digest(&data).into();
            if digest != declared {
                warn!(%transfer, "resource digest mismatch, discarding");
                return;
            }
        }

        if let Some(encoding) = &expectation.encoding {
            if !encoding.eq_ignore_ascii_case("utf-8") && !encoding.eq_ignore_ascii_case("utf8") {
                warn!(%encoding, "unknown resource encoding, trying utf-8");
            }
        }
        let text = match String::from_utf8(data) {
            Ok(text) => text,
            Err(_) => {
                warn!(%transfer, "resource is not valid utf-8, discarding");
                return;
            }
        };

        match expectation.kind.as_str() {
            RES_KIND_NOTICE | RES_KIND_MOTD => {
                let destination = self.conn().destination;
                let source = destination
                    .map(|d| d.as_bytes().to_vec())
                    .unwrap_or_default();
                let mut envelope = Envelope::new(source, Payload::Notice(text));
                if let Some(room) = expectation.room {
                    envelope = envelope.with_room(room);
                }
                self.emit("on_notice", |e| e.on_notice(&envelope));
            }
            other => debug!(kind = other, "ignoring resource of unrecognized kind"),
        }
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    fn dispatch(&self, mut envelope: Envelope) {
        if let Some(room) = &envelope.header.room {
            envelope.header.room = Some(normalize_room(room));
        }

        match &envelope.payload {
            Payload::Welcome(info) => self.handle_welcome(info.clone()),
            Payload::Joined(_) => {
                if let Some(room) = envelope.header.room.clone() {
                    self.conn().rooms.insert(room.clone());
                    self.emit("on_joined", |e| e.on_joined(&room, &envelope));
                } else {
                    debug!("JOINED without a room, ignoring");
                }
            }
            Payload::Parted => {
                if let Some(room) = envelope.header.room.clone() {
                    self.conn().rooms.remove(&room);
                    self.emit("on_parted", |e| e.on_parted(&room, &envelope));
                } else {
                    debug!("PARTED without a room, ignoring");
                }
            }
            Payload::Msg(_) => {
                match self
                    .inner
                    .tracker
                    .correlate(&envelope, &self.source_bytes())
                {
                    Correlation::Confirmed(pending) => {
                        let id = envelope.header.id;
                        self.emit("on_delivery_confirmed", |e| {
                            e.on_delivery_confirmed(id, &pending.room)
                        });
                    }
                    Correlation::Mismatch(_) | Correlation::NotEcho | Correlation::NotPending => {}
                }
                self.emit("on_message", |e| e.on_message(&envelope));
            }
            Payload::Notice(_) => self.emit("on_notice", |e| e.on_notice(&envelope)),
            Payload::Error(text) => {
                warn!(%text, "hub reported an error");
                self.emit("on_error", |e| e.on_error(&envelope));
            }
            Payload::Ping(body) => {
                // The reply carries the ping's id and echoes its body, so
                // the other side can correlate it.
                let mut pong = Envelope::new(self.source_bytes(), Payload::Pong(body.clone()));
                pong.header.id = envelope.header.id;
                if let Ok(link) = self.active_link() {
                    if let Err(err) = self.send_envelope(&link, &pong) {
                        debug!(%err, "pong send failed");
                    }
                }
            }
            Payload::Pong(_) => {
                // Every pong reaches the callback; the RTT sample is only
                // present when it answers a locally recorded ping.
                let sample = self.latency().record_pong(&envelope.header.id);
                let rtt_ms = sample.map(|rtt| rtt.as_secs_f64() * 1000.0);
                self.emit("on_pong", |e| e.on_pong(&envelope, rtt_ms));
            }
            Payload::ResourceAnnouncement(ann) => {
                self.handle_resource_announcement(ann.clone(), envelope.header.room.clone());
            }
            Payload::Hello(_) | Payload::Join { .. } | Payload::Part => {
                debug!(kind = ?envelope.kind(), "ignoring client-to-hub message type");
            }
        }
    }

    fn handle_welcome(&self, info: WelcomeInfo) {
        let first = {
            let mut conn = self.conn();
            if let Some(limits) = &info.limits {
                conn.limits.apply(limits);
            }
            let first = conn.welcome.is_none();
            conn.welcome = Some(info.clone());
            conn.phase = SessionPhase::Active;
            first
        };
        self.inner.welcomed_tx.send_replace(true);
        if first {
            info!(hub = ?info.hub_name, "welcomed by hub");
            self.emit("on_welcome", |e| e.on_welcome(&info));
        } else {
            debug!("duplicate WELCOME, limits refreshed");
        }
    }

    fn handle_resource_announcement(&self, ann: ResourceAnnouncement, room: Option<String>) {
        if ann.size > self.inner.config.max_resource_size {
            warn!(size = ann.size, "ignoring oversized resource announcement");
            return;
        }
        debug!(kind = %ann.kind, size = ann.size, "expecting resource");
        self.resources().register(&ann, room, Instant::now());
    }

    // =========================================================================
    // INTERNAL
    // =========================================================================

    fn spawn_hello_loop(&self, link: Arc<dyn Link>, generation: u64) {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let welcomed = engine.inner.welcomed_tx.subscribe();
            let max_attempts = engine.inner.config.hello_max_attempts;
            for attempt in 1..=max_attempts {
                if *welcomed.borrow() || engine.generation() != generation || !link.is_active() {
                    return;
                }
                match engine.send_hello(&link) {
                    Ok(()) => debug!(attempt, "HELLO sent"),
                    Err(err) => warn!(%err, attempt, "HELLO send failed"),
                }
                // Sleep in short slices so a welcome or a superseding
                // connect stops the loop promptly.
                let until = Instant::now() + engine.inner.config.hello_interval;
                while Instant::now() < until {
                    if *welcomed.borrow() || engine.generation() != generation {
                        return;
                    }
                    tokio::time::sleep(HELLO_LOOP_SLICE).await;
                }
            }
            if !*welcomed.borrow() && engine.generation() == generation {
                warn!(max_attempts, "no WELCOME after HELLO attempts, giving up");
                engine.set_phase(SessionPhase::Failed);
            }
        });
        *self
            .inner
            .hello_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn send_hello(&self, link: &Arc<dyn Link>) -> Result<(), SessionError> {
        let nickname = self.conn().nickname.clone();
        let info = HelloInfo {
            name: self.inner.config.app_name.clone(),
            version: self.inner.config.app_version.clone(),
            capabilities: [(CAP_RESOURCE_ANNOUNCEMENT, true)].into(),
        };
        let mut envelope = Envelope::new(self.source_bytes(), Payload::Hello(info));
        if let Some(nickname) = nickname {
            envelope = envelope.with_nickname(nickname);
        }
        self.send_envelope(link, &envelope)
    }

    /// Encode and send, refusing anything that would not fit one packet.
    fn send_envelope(&self, link: &Arc<dyn Link>, envelope: &Envelope) -> Result<(), SessionError> {
        let bytes = encode(envelope)?;
        if !link.would_fit(&bytes) {
            self.emit("on_resource_warning", |e| {
                e.on_resource_warning("outbound message exceeds the link packet size; not sent")
            });
            return Err(SessionError::MessageTooLarge);
        }
        link.send(&bytes)?;
        Ok(())
    }

    fn active_link(&self) -> Result<Arc<dyn Link>, SessionError> {
        let link = self.conn().link.clone().ok_or(SessionError::NotConnected)?;
        if !link.is_active() {
            return Err(SessionError::NotConnected);
        }
        Ok(link)
    }

    fn source_bytes(&self) -> Vec<u8> {
        self.inner.identity.hash.as_bytes().to_vec()
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.conn().phase = phase;
    }

    fn generation(&self) -> u64 {
        self.conn().link_generation
    }

    /// Run a callback isolated from panics.
    fn emit(&self, name: &str, f: impl FnOnce(&dyn SessionEvents)) {
        if catch_unwind(AssertUnwindSafe(|| f(self.inner.events.as_ref()))).is_err() {
            error!(callback = name, "panic in session event callback");
        }
    }

    fn conn(&self) -> MutexGuard<'_, ConnState> {
        self.inner.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resources(&self) -> MutexGuard<'_, ExpectationCache> {
        self.inner
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn latency(&self) -> MutexGuard<'_, LatencyTracker> {
        self.inner
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn next_poll_interval(current: Duration) -> Duration {
    cmp::min(current.mul_f64(POLL_BACKOFF_FACTOR), POLL_INTERVAL_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_backoff_caps_at_max() {
        let mut interval = POLL_INTERVAL_INITIAL;
        for _ in 0..20 {
            let next = next_poll_interval(interval);
            assert!(next >= interval);
            interval = next;
        }
        assert_eq!(interval, POLL_INTERVAL_MAX);
    }
}
