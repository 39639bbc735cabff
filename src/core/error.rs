//! Error types for the RRC protocol.

use thiserror::Error;

/// Errors from local validation of nicknames, rooms, and messages.
///
/// These are raised before any envelope is built; nothing is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Room name is empty after normalization.
    #[error("room name cannot be empty")]
    EmptyRoom,

    /// Room name exceeds the negotiated byte limit.
    #[error("room name too long: {actual} bytes exceeds hub limit of {limit} bytes")]
    RoomTooLong {
        /// Actual UTF-8 byte length.
        actual: usize,
        /// Negotiated limit.
        limit: usize,
    },

    /// Message text is empty or whitespace-only.
    #[error("message text cannot be empty")]
    EmptyMessage,

    /// Message text exceeds the negotiated byte limit.
    #[error("message too long: {actual} bytes exceeds hub limit of {limit} bytes")]
    MessageTooLong {
        /// Actual UTF-8 byte length.
        actual: usize,
        /// Negotiated limit.
        limit: usize,
    },

    /// Nickname exceeds the negotiated byte limit.
    #[error("nickname too long: {actual} bytes exceeds hub limit of {limit} bytes")]
    NicknameTooLong {
        /// Actual UTF-8 byte length.
        actual: usize,
        /// Negotiated limit.
        limit: usize,
    },

    /// Already at the per-session room cap.
    #[error("cannot join more rooms: already in {joined} rooms (hub limit: {limit})")]
    RoomCapReached {
        /// Rooms currently joined.
        joined: usize,
        /// Negotiated limit.
        limit: usize,
    },
}

/// Errors from parsing a destination hash out of user input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashParseError {
    /// Input is not valid hexadecimal.
    #[error("invalid hash {input:?}: not valid hex")]
    InvalidHex {
        /// The offending input.
        input: String,
    },

    /// Decoded byte length is wrong.
    #[error("destination hash must be {expected} bytes (got {actual})")]
    WrongLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
}

/// Top-level session errors surfaced to callers of the engine.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Local validation rejected the input; nothing was sent.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A deadline elapsed during connect or welcome wait.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The derived destination does not match the requested one, or the
    /// peer speaks an unsupported protocol version.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The encoded envelope would not fit a single transport packet.
    /// Nothing was sent.
    #[error("message exceeds link MDU")]
    MessageTooLarge,

    /// No link is attached to the session.
    #[error("not connected to hub")]
    NotConnected,

    /// The transport reported an error on the link.
    #[error("link error: {0}")]
    Link(#[from] crate::transport::LinkError),

    /// Envelope encoding failed.
    #[error("envelope error: {0}")]
    Envelope(#[from] crate::envelope::EnvelopeError),
}
