//! Shared mock transport and event recorder for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rrc_protocol::envelope::{decode, Envelope, WelcomeInfo};
use rrc_protocol::prelude::*;

/// A link that records everything sent through it.
#[derive(Debug)]
pub struct MockLink {
    pub active: AtomicBool,
    /// Largest payload `would_fit` accepts.
    pub mdu: AtomicUsize,
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub identified: AtomicBool,
    pub torn_down: AtomicBool,
    pub cancelled: Mutex<Vec<TransferId>>,
    pub strategy: Mutex<Option<ResourceStrategy>>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self {
            active: AtomicBool::new(true),
            mdu: AtomicUsize::new(usize::MAX),
            sent: Mutex::new(Vec::new()),
            identified: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            cancelled: Mutex::new(Vec::new()),
            strategy: Mutex::new(None),
        }
    }
}

impl MockLink {
    /// Decode every packet sent so far.
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| decode(raw).expect("mock link holds undecodable packet"))
            .collect()
    }
}

impl Link for MockLink {
    fn send(&self, payload: &[u8]) -> Result<(), LinkError> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(LinkError::Inactive);
        }
        self.sent.lock().unwrap().push(payload.to_vec());
        Ok(())
    }

    fn would_fit(&self, payload: &[u8]) -> bool {
        payload.len() <= self.mdu.load(Ordering::SeqCst)
    }

    fn identify(&self, _identity: &LocalIdentity) -> Result<(), LinkError> {
        self.identified.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_resource_strategy(&self, strategy: ResourceStrategy) {
        *self.strategy.lock().unwrap() = Some(strategy);
    }

    fn cancel_transfer(&self, transfer: TransferId) {
        self.cancelled.lock().unwrap().push(transfer);
    }

    fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// A transport with scripted path, identity, and link behavior.
pub struct MockTransport {
    pub path_known: AtomicBool,
    pub identity: Mutex<Option<RemoteIdentity>>,
    /// What `derive_destination` returns, regardless of identity.
    pub derived: Mutex<Option<DestinationHash>>,
    pub link: Arc<MockLink>,
    pub path_requests: AtomicU64,
    pub leftover_links: AtomicBool,
}

impl MockTransport {
    /// A transport that connects to `destination` without delay.
    pub fn reachable(destination: DestinationHash) -> Self {
        Self {
            path_known: AtomicBool::new(true),
            identity: Mutex::new(Some(RemoteIdentity::new(IdentityHash::from_bytes(
                [0x42; 16],
            )))),
            derived: Mutex::new(Some(destination)),
            link: Arc::new(MockLink::default()),
            path_requests: AtomicU64::new(0),
            leftover_links: AtomicBool::new(false),
        }
    }

    /// A transport where the destination never becomes reachable.
    pub fn unreachable() -> Self {
        Self {
            path_known: AtomicBool::new(false),
            identity: Mutex::new(None),
            derived: Mutex::new(None),
            link: Arc::new(MockLink::default()),
            path_requests: AtomicU64::new(0),
            leftover_links: AtomicBool::new(false),
        }
    }
}

impl Transport for MockTransport {
    fn request_path(&self, _destination: &DestinationHash) -> Result<(), LinkError> {
        self.path_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn has_path(&self, _destination: &DestinationHash) -> bool {
        self.path_known.load(Ordering::SeqCst)
    }

    fn recall_identity(&self, _destination: &DestinationHash) -> Option<RemoteIdentity> {
        *self.identity.lock().unwrap()
    }

    fn derive_destination(
        &self,
        _identity: &RemoteIdentity,
        _dest_name: &str,
    ) -> DestinationHash {
        (*self.derived.lock().unwrap())
            .unwrap_or_else(|| DestinationHash::from_bytes([0xFF; 16]))
    }

    fn teardown_links_to(&self, _destination: &DestinationHash) -> bool {
        self.leftover_links.swap(false, Ordering::SeqCst)
    }

    fn open_link(&self, _destination: &DestinationHash) -> Result<Arc<dyn Link>, LinkError> {
        Ok(self.link.clone())
    }
}

/// Events implementation that records every callback.
#[derive(Default)]
pub struct RecordingEvents {
    pub messages: Mutex<Vec<Envelope>>,
    pub notices: Mutex<Vec<Envelope>>,
    pub errors: Mutex<Vec<Envelope>>,
    pub welcomes: Mutex<Vec<WelcomeInfo>>,
    pub joined: Mutex<Vec<String>>,
    pub parted: Mutex<Vec<String>>,
    pub closes: AtomicU64,
    pub pongs: Mutex<Vec<Option<f64>>>,
    pub warnings: Mutex<Vec<String>>,
    pub confirmed: Mutex<Vec<(MessageId, String)>>,
    pub timed_out: Mutex<Vec<(MessageId, String, String)>>,
}

impl SessionEvents for RecordingEvents {
    fn on_message(&self, envelope: &Envelope) {
        self.messages.lock().unwrap().push(envelope.clone());
    }

    fn on_notice(&self, envelope: &Envelope) {
        self.notices.lock().unwrap().push(envelope.clone());
    }

    fn on_error(&self, envelope: &Envelope) {
        self.errors.lock().unwrap().push(envelope.clone());
    }

    fn on_welcome(&self, welcome: &WelcomeInfo) {
        self.welcomes.lock().unwrap().push(welcome.clone());
    }

    fn on_joined(&self, room: &str, _envelope: &Envelope) {
        self.joined.lock().unwrap().push(room.to_string());
    }

    fn on_parted(&self, room: &str, _envelope: &Envelope) {
        self.parted.lock().unwrap().push(room.to_string());
    }

    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_pong(&self, _envelope: &Envelope, rtt_ms: Option<f64>) {
        self.pongs.lock().unwrap().push(rtt_ms);
    }

    fn on_resource_warning(&self, text: &str) {
        self.warnings.lock().unwrap().push(text.to_string());
    }

    fn on_delivery_confirmed(&self, id: MessageId, room: &str) {
        self.confirmed.lock().unwrap().push((id, room.to_string()));
    }

    fn on_delivery_timeout(&self, id: MessageId, room: &str, text: &str) {
        self.timed_out
            .lock()
            .unwrap()
            .push((id, room.to_string(), text.to_string()));
    }
}
