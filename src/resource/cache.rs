//! Resource expectation cache.
//!
//! Bridges the transport's size-only resource advertisement to the metadata
//! announced earlier in a resource announcement envelope. The cache holds no
//! lock of its own; the session engine guards it (together with the active
//! transfer set, so bindings stay consistent) behind one mutex.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::envelope::ResourceAnnouncement;
use crate::transport::TransferId;

/// Metadata for an expected incoming resource transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    /// Resource id from the announcement.
    pub id: Vec<u8>,
    /// Resource kind (e.g. "notice", "motd", "blob").
    pub kind: String,
    /// Declared payload size in bytes.
    pub size: u64,
    /// Declared SHA-256 digest, if any.
    pub sha256: Option<[u8; 32]>,
    /// Declared text encoding, if any.
    pub encoding: Option<String>,
    /// When the expectation was registered.
    pub created_at: Instant,
    /// When the expectation lapses.
    pub expires_at: Instant,
    /// Room the resource concerns, if any.
    pub room: Option<String>,
}

/// Bounded, TTL-evicting store of expectations plus the set of in-flight
/// transfers bound to them.
#[derive(Debug)]
pub struct ExpectationCache {
    ttl: Duration,
    max_pending: usize,
    pending: HashMap<Vec<u8>, Expectation>,
    active: HashSet<TransferId>,
    bindings: HashMap<TransferId, Vec<u8>>,
}

impl ExpectationCache {
    /// Create a cache with the given TTL and pending-entry cap.
    pub fn new(ttl: Duration, max_pending: usize) -> Self {
        Self {
            ttl,
            max_pending,
            pending: HashMap::new(),
            active: HashSet::new(),
            bindings: HashMap::new(),
        }
    }

    /// Register an expectation from a resource announcement.
    ///
    /// At capacity, the single oldest entry by creation time is evicted
    /// first; the newest registration is never the one rejected.
    pub fn register(&mut self, ann: &ResourceAnnouncement, room: Option<String>, now: Instant) {
        if self.pending.len() >= self.max_pending {
            if let Some(oldest) = self
                .pending
                .iter()
                .min_by_key(|(_, exp)| exp.created_at)
                .map(|(id, _)| id.clone())
            {
                self.pending.remove(&oldest);
            }
        }

        self.pending.insert(
            ann.id.clone(),
            Expectation {
                id: ann.id.clone(),
                kind: ann.kind.clone(),
                size: ann.size,
                sha256: ann.sha256,
                encoding: ann.encoding.clone(),
                created_at: now,
                expires_at: now + self.ttl,
                room,
            },
        );
    }

    /// Drop every expired expectation.
    pub fn purge_expired(&mut self, now: Instant) {
        self.pending.retain(|_, exp| now < exp.expires_at);
    }

    /// Find an unexpired expectation matching the advertised size.
    ///
    /// Purges expired entries first. First match wins; ties among same-size
    /// entries are resolved arbitrarily, which is acceptable because payload
    /// integrity is re-verified independently.
    pub fn match_size(&mut self, size: u64, now: Instant) -> Option<Vec<u8>> {
        self.purge_expired(now);
        self.pending
            .values()
            .find(|exp| exp.size == size)
            .map(|exp| exp.id.clone())
    }

    /// Record a transfer as in flight, optionally bound to an expectation.
    pub fn start_transfer(&mut self, transfer: TransferId, expectation: Option<Vec<u8>>) {
        self.active.insert(transfer);
        if let Some(id) = expectation {
            self.bindings.insert(transfer, id);
        }
    }

    /// Number of in-flight transfers.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of pending expectations.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolve a concluded transfer to its expectation.
    ///
    /// Removes the transfer from the active set and its binding; resolves
    /// via the binding, or falls back to a size match if the transfer was
    /// accepted speculatively. The resolved expectation is removed from the
    /// pending map.
    pub fn conclude(&mut self, transfer: TransferId, size: u64, now: Instant) -> Option<Expectation> {
        self.active.remove(&transfer);

        let id = match self.bindings.remove(&transfer) {
            Some(id) => Some(id),
            None => self.match_size(size, now),
        };

        id.and_then(|id| self.pending.remove(&id))
    }

    /// Drop all state, returning the transfers that were still in flight so
    /// the caller can cancel them.
    pub fn clear(&mut self) -> Vec<TransferId> {
        self.pending.clear();
        self.bindings.clear();
        self.active.drain().collect()
    }
}
