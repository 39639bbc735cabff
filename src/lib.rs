//! # RRC Protocol
//!
//! **R**eticulum **R**elay **C**hat
//!
//! RRC is a lightweight room-based chat protocol for encrypted mesh
//! networks. This crate implements the client session engine:
//!
//! - **Connection**: path discovery, identity recall, and link setup with
//!   exponential backoff polling and a single overall deadline
//! - **Envelopes**: compact CBOR maps with integer keys, one message type
//!   per envelope
//! - **Limits**: hub-negotiated caps on nicknames, room names, message
//!   bodies, and rooms per session
//! - **Resources**: bounded, TTL'd expectation cache for out-of-band
//!   transfers with digest verification
//! - **Delivery**: optimistic confirmation of sent messages via hub echo
//!
//! The engine is transport-agnostic: the mesh stack plugs in behind the
//! [`transport::Transport`] and [`transport::Link`] traits, and feeds
//! events back through the engine's inbound surface.
//!
//! ## Modules
//!
//! - [`core`]: identifiers, constants, and error types
//! - [`envelope`]: typed envelopes and the CBOR wire codec
//! - [`transport`]: the seam the mesh stack implements
//! - [`resource`]: resource expectation cache
//! - [`delivery`]: delivery confirmation tracker
//! - [`session`]: the session engine, configuration, and event callbacks
//!
//! ## Example
//!
//! ```rust
//! use rrc_protocol::prelude::*;
//!
//! let config = SessionConfigBuilder::new()
//!     .app_name("my-client")
//!     .build();
//!
//! let hub = DestinationHash::from_hex("a1b2c3d4e5f60718293a4b5c6d7e8f90").unwrap();
//! assert_eq!(config.dest_name, "rrc.hub");
//! assert_eq!(hub.to_string(), "a1b2c3d4e5f60718293a4b5c6d7e8f90");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod delivery;
pub mod envelope;
pub mod resource;
pub mod session;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        DestinationHash, HashParseError, IdentityHash, MessageId, SessionError, ValidationError,
    };
    pub use crate::delivery::{DeliveryTracker, PendingMessage};
    pub use crate::envelope::{Envelope, Payload, WelcomeInfo};
    pub use crate::session::{
        NegotiatedLimits, NullEvents, SessionConfig, SessionConfigBuilder, SessionEngine,
        SessionEvents, SessionPhase,
    };
    pub use crate::transport::{
        Link, LinkError, LocalIdentity, RemoteIdentity, ResourceStrategy, TransferId,
        TransferStatus, Transport,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{DestinationHash, IdentityHash, MessageId, SessionError};
pub use crate::session::{SessionConfig, SessionConfigBuilder, SessionEngine, SessionPhase};
