//! Envelope model and wire codec.
//!
//! An envelope is the protocol's structured application message, carried as
//! the payload of one transport packet. See [`types`] for the in-memory
//! model and [`codec`] for the CBOR wire form.

mod codec;
mod types;

pub use codec::{decode, encode, EnvelopeError};
pub use types::{
    now_ms, Envelope, EnvelopeHeader, HelloInfo, JoinedInfo, LimitOverrides, MessageType, Payload,
    ResourceAnnouncement, WelcomeInfo,
};
