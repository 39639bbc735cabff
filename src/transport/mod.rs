//! Transport seam.
//!
//! The engine talks to the underlying mesh transport exclusively through the
//! [`Transport`] and [`Link`] traits; link establishment, encryption, path
//! discovery, and the resource transfer byte protocol all live on the other
//! side of this boundary. Inbound events flow the other way, into the
//! engine's inbound surface (`link_established`, `packet_received`, and the
//! resource callbacks on [`crate::session::SessionEngine`]).

use std::sync::Arc;

use thiserror::Error;

use crate::core::{DestinationHash, IdentityHash};

/// Errors reported by the transport on a link operation.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The link is not (or no longer) active.
    #[error("link inactive")]
    Inactive,

    /// A packet could not be sent.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Identity assertion over the link failed.
    #[error("identify failed: {0}")]
    IdentifyFailed(String),

    /// The link could not be established.
    #[error("link establishment failed: {0}")]
    EstablishFailed(String),
}

/// Opaque handle for an in-flight resource transfer.
///
/// The transport assigns these; the engine keys its side tables by them and
/// never relies on transfer object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(pub u64);

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transfer-{}", self.0)
    }
}

/// Final status of a concluded resource transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// All bytes arrived.
    Complete,
    /// The transfer failed partway.
    Failed,
    /// The transfer was cancelled locally.
    Cancelled,
}

/// Resource acceptance policy for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStrategy {
    /// The application decides per transfer (via the advertise callback).
    AcceptApp,
    /// Accept every advertised transfer.
    AcceptAll,
    /// Reject every advertised transfer.
    AcceptNone,
}

/// The local identity this session asserts over the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Hash of the local identity.
    pub hash: IdentityHash,
}

impl LocalIdentity {
    /// Create a local identity from its hash.
    pub fn new(hash: IdentityHash) -> Self {
        Self { hash }
    }
}

/// An identity recalled from the transport's knowledge of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteIdentity {
    /// Hash of the remote identity.
    pub hash: IdentityHash,
}

impl RemoteIdentity {
    /// Create a remote identity from its hash.
    pub fn new(hash: IdentityHash) -> Self {
        Self { hash }
    }
}

/// The transport provider: path discovery, identity recall, and link
/// creation.
///
/// Implementations must be safe to call from multiple threads; the engine
/// polls `has_path`/`recall_identity` from its connect task while transport
/// callbacks may arrive concurrently.
pub trait Transport: Send + Sync {
    /// Ask the network for a path to the destination. Best-effort; errors
    /// are reported but non-fatal to the caller's retry loop.
    fn request_path(&self, destination: &DestinationHash) -> Result<(), LinkError>;

    /// Whether a path to the destination is currently known.
    fn has_path(&self, destination: &DestinationHash) -> bool;

    /// Recall the identity behind a destination, if known.
    fn recall_identity(&self, destination: &DestinationHash) -> Option<RemoteIdentity>;

    /// Derive the destination hash for an identity under the given
    /// application name. Destinations are not forgeable: the result must
    /// match the hash the caller was given.
    fn derive_destination(&self, identity: &RemoteIdentity, dest_name: &str) -> DestinationHash;

    /// Tear down any pre-existing active links to the destination.
    /// Returns whether any link was found.
    fn teardown_links_to(&self, destination: &DestinationHash) -> bool;

    /// Open a new link to the destination. Establishment completes
    /// asynchronously; the transport notifies the engine through its
    /// inbound surface.
    fn open_link(&self, destination: &DestinationHash) -> Result<Arc<dyn Link>, LinkError>;
}

/// An established (or establishing) point-to-point link.
pub trait Link: Send + Sync {
    /// Send one packet over the link.
    fn send(&self, payload: &[u8]) -> Result<(), LinkError>;

    /// Whether a payload of this size would fit a single packet (MDU).
    fn would_fit(&self, payload: &[u8]) -> bool;

    /// Assert the local identity over the link.
    fn identify(&self, identity: &LocalIdentity) -> Result<(), LinkError>;

    /// Configure the resource acceptance policy.
    fn set_resource_strategy(&self, strategy: ResourceStrategy);

    /// Cancel an in-flight resource transfer and release its buffer.
    /// Best-effort; unknown ids are ignored.
    fn cancel_transfer(&self, transfer: TransferId);

    /// Tear the link down.
    fn teardown(&self);

    /// Whether the link is currently active.
    fn is_active(&self) -> bool;
}
