//! Typed envelope model.
//!
//! The wire form is a CBOR map with small integer keys; in memory an
//! envelope is a common header plus a payload variant per message type, so
//! dispatch is by discriminant instead of dynamic field access.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use ciborium::Value;

use crate::core::constants::{
    SHA256_SIZE, T_ERROR, T_HELLO, T_JOIN, T_JOINED, T_MSG, T_NOTICE, T_PART, T_PARTED, T_PING,
    T_PONG, T_RESOURCE_ANNOUNCEMENT, T_WELCOME,
};
use crate::core::MessageId;

/// Message type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Client handshake greeting.
    Hello,
    /// Hub handshake reply.
    Welcome,
    /// Join a room.
    Join,
    /// Hub confirmation of a join.
    Joined,
    /// Leave a room.
    Part,
    /// Hub confirmation of a part.
    Parted,
    /// Chat message.
    Msg,
    /// Informational notice.
    Notice,
    /// Latency probe.
    Ping,
    /// Latency probe reply.
    Pong,
    /// Hub error report.
    Error,
    /// Announcement of an upcoming resource transfer.
    ResourceAnnouncement,
}

impl MessageType {
    /// Map a wire message type number to a discriminant.
    pub fn from_wire(value: u64) -> Option<Self> {
        match value {
            T_HELLO => Some(Self::Hello),
            T_WELCOME => Some(Self::Welcome),
            T_JOIN => Some(Self::Join),
            T_JOINED => Some(Self::Joined),
            T_PART => Some(Self::Part),
            T_PARTED => Some(Self::Parted),
            T_MSG => Some(Self::Msg),
            T_NOTICE => Some(Self::Notice),
            T_PING => Some(Self::Ping),
            T_PONG => Some(Self::Pong),
            T_ERROR => Some(Self::Error),
            T_RESOURCE_ANNOUNCEMENT => Some(Self::ResourceAnnouncement),
            _ => None,
        }
    }

    /// Wire message type number.
    pub fn wire(self) -> u64 {
        match self {
            Self::Hello => T_HELLO,
            Self::Welcome => T_WELCOME,
            Self::Join => T_JOIN,
            Self::Joined => T_JOINED,
            Self::Part => T_PART,
            Self::Parted => T_PARTED,
            Self::Msg => T_MSG,
            Self::Notice => T_NOTICE,
            Self::Ping => T_PING,
            Self::Pong => T_PONG,
            Self::Error => T_ERROR,
            Self::ResourceAnnouncement => T_RESOURCE_ANNOUNCEMENT,
        }
    }
}

/// HELLO body: client name, version, and declared capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HelloInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
    /// Capability map (capability id -> supported).
    pub capabilities: BTreeMap<u64, bool>,
}

/// WELCOME body: hub self-description and limit overrides.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WelcomeInfo {
    /// Hub name.
    pub hub_name: Option<String>,
    /// Greeting text.
    pub greeting: Option<String>,
    /// Hub software version.
    pub version: Option<String>,
    /// Limit overrides; only present keys override the defaults.
    pub limits: Option<LimitOverrides>,
}

/// Limits sub-map of a WELCOME body. Each entry overrides independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimitOverrides {
    /// Maximum nickname length in bytes.
    pub max_nickname_bytes: Option<u64>,
    /// Maximum room name length in bytes.
    pub max_room_name_bytes: Option<u64>,
    /// Maximum message body length in bytes.
    pub max_message_body_bytes: Option<u64>,
    /// Maximum rooms joined per session.
    pub max_rooms_per_session: Option<u64>,
    /// Messages-per-minute rate limit.
    pub rate_limit_per_minute: Option<u64>,
}

/// JOINED body: current members of the room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinedInfo {
    /// Identity hashes of current room members.
    pub users: Vec<Vec<u8>>,
}

/// Body of a resource announcement control envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAnnouncement {
    /// Resource id.
    pub id: Vec<u8>,
    /// Resource kind (e.g. "notice", "motd", "blob").
    pub kind: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Optional SHA-256 digest of the payload.
    pub sha256: Option<[u8; SHA256_SIZE]>,
    /// Optional text encoding of the payload.
    pub encoding: Option<String>,
}

/// Payload variants, one per message type.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Client handshake greeting.
    Hello(HelloInfo),
    /// Hub handshake reply.
    Welcome(WelcomeInfo),
    /// Join a room, with an optional room key.
    Join {
        /// Room key, if the room requires one.
        key: Option<String>,
    },
    /// Hub confirmation of a join.
    Joined(JoinedInfo),
    /// Leave a room.
    Part,
    /// Hub confirmation of a part.
    Parted,
    /// Chat message text.
    Msg(String),
    /// Notice text.
    Notice(String),
    /// Error text.
    Error(String),
    /// Latency probe; the body is echoed back verbatim.
    Ping(Option<Value>),
    /// Latency probe reply carrying the echoed body.
    Pong(Option<Value>),
    /// Announcement of an upcoming resource transfer.
    ResourceAnnouncement(ResourceAnnouncement),
}

impl Payload {
    /// Discriminant of this payload.
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Hello(_) => MessageType::Hello,
            Self::Welcome(_) => MessageType::Welcome,
            Self::Join { .. } => MessageType::Join,
            Self::Joined(_) => MessageType::Joined,
            Self::Part => MessageType::Part,
            Self::Parted => MessageType::Parted,
            Self::Msg(_) => MessageType::Msg,
            Self::Notice(_) => MessageType::Notice,
            Self::Ping(_) => MessageType::Ping,
            Self::Pong(_) => MessageType::Pong,
            Self::Error(_) => MessageType::Error,
            Self::ResourceAnnouncement(_) => MessageType::ResourceAnnouncement,
        }
    }
}

/// Fields shared by every envelope.
#[derive(Debug, Clone)]
pub struct EnvelopeHeader {
    /// Message id (8 random bytes).
    pub id: MessageId,
    /// Timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Source identity hash.
    pub source: Vec<u8>,
    /// Room name, if the message concerns one.
    pub room: Option<String>,
    /// Sender nickname.
    pub nickname: Option<String>,
}

/// A structured application message, carried as the payload of one
/// transport packet.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Shared header fields.
    pub header: EnvelopeHeader,
    /// Type-specific payload.
    pub payload: Payload,
}

impl Envelope {
    /// Build an envelope with a fresh id and the current timestamp.
    pub fn new(source: Vec<u8>, payload: Payload) -> Self {
        Self {
            header: EnvelopeHeader {
                id: MessageId::generate(),
                timestamp_ms: now_ms(),
                source,
                room: None,
                nickname: None,
            },
            payload,
        }
    }

    /// Set the room field.
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.header.room = Some(room.into());
        self
    }

    /// Set the nickname field.
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.header.nickname = Some(nickname.into());
        self
    }

    /// Message type of this envelope.
    pub fn kind(&self) -> MessageType {
        self.payload.kind()
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for wire in 0..=11 {
            let t = MessageType::from_wire(wire).unwrap();
            assert_eq!(t.wire(), wire);
        }
        assert!(MessageType::from_wire(12).is_none());
    }

    #[test]
    fn test_envelope_new_fills_header() {
        let env = Envelope::new(vec![1, 2, 3], Payload::Part).with_room("general");
        assert_eq!(env.kind(), MessageType::Part);
        assert_eq!(env.header.source, vec![1, 2, 3]);
        assert_eq!(env.header.room.as_deref(), Some("general"));
        assert!(env.header.timestamp_ms > 0);
    }
}
