//! Envelope wire codec.
//!
//! Envelopes travel as a CBOR map with small integer keys (see the key
//! constants in [`crate::core::constants`]). Keys are emitted in ascending
//! order. Decode is strict: malformed envelopes yield an error and the
//! caller drops the packet.

use std::collections::BTreeMap;

use ciborium::Value;
use thiserror::Error;

use crate::core::constants::{
    B_HELLO_CAPS, B_HELLO_NAME, B_HELLO_VERSION, B_JOINED_USERS, B_RES_ENCODING, B_RES_ID,
    B_RES_KIND, B_RES_SHA256, B_RES_SIZE, B_WELCOME_GREETING, B_WELCOME_HUB, B_WELCOME_LIMITS,
    B_WELCOME_VERSION, K_BODY, K_ID, K_NICKNAME, K_ROOM, K_SOURCE, K_TIMESTAMP, K_TYPE, K_VERSION,
    L_MAX_MESSAGE_BODY_BYTES, L_MAX_NICKNAME_BYTES, L_MAX_ROOMS_PER_SESSION,
    L_MAX_ROOM_NAME_BYTES, L_RATE_LIMIT_PER_MINUTE, RRC_VERSION, SHA256_SIZE,
};
use crate::core::MessageId;

use super::types::{
    Envelope, EnvelopeHeader, HelloInfo, JoinedInfo, LimitOverrides, MessageType, Payload,
    ResourceAnnouncement, WelcomeInfo,
};

/// Errors from encoding or decoding an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// CBOR serialization failed.
    #[error("cbor encode failed: {0}")]
    Encode(String),

    /// CBOR deserialization failed.
    #[error("cbor decode failed: {0}")]
    Decode(String),

    /// The top level is not a CBOR map.
    #[error("envelope must be a cbor map")]
    NotAMap,

    /// A top-level key is not a non-negative integer.
    #[error("envelope keys must be unsigned integers")]
    InvalidKey,

    /// A required key is absent.
    #[error("envelope missing required key {0}")]
    MissingKey(u64),

    /// A field has the wrong type.
    #[error("envelope field {field} has wrong type")]
    WrongType {
        /// Field description.
        field: &'static str,
    },

    /// The envelope carries an unsupported protocol version.
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u64),

    /// The message type number is unknown.
    #[error("unknown message type {0}")]
    UnknownMessageType(u64),

    /// A declared SHA-256 digest has the wrong length.
    #[error("sha256 digest must be {SHA256_SIZE} bytes (got {0})")]
    BadDigestLength(usize),

    /// A declared size is zero or negative.
    #[error("resource size must be positive")]
    NonPositiveSize,
}

fn uint(value: u64) -> Value {
    Value::Integer(value.into())
}

fn as_u64(value: &Value, field: &'static str) -> Result<u64, EnvelopeError> {
    match value {
        Value::Integer(i) => u64::try_from(*i).map_err(|_| EnvelopeError::WrongType { field }),
        _ => Err(EnvelopeError::WrongType { field }),
    }
}

fn as_bytes(value: &Value, field: &'static str) -> Result<Vec<u8>, EnvelopeError> {
    match value {
        Value::Bytes(b) => Ok(b.clone()),
        _ => Err(EnvelopeError::WrongType { field }),
    }
}

fn as_text(value: &Value, field: &'static str) -> Result<String, EnvelopeError> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        _ => Err(EnvelopeError::WrongType { field }),
    }
}

/// Look up an integer key in a decoded CBOR map.
fn lookup<'a>(map: &'a [(Value, Value)], key: u64) -> Option<&'a Value> {
    map.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if u64::try_from(*i).map_or(false, |k| k == key) => Some(v),
        _ => None,
    })
}

/// Encode an envelope to its wire bytes.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
    let mut pairs: Vec<(Value, Value)> = vec![
        (uint(K_VERSION), uint(RRC_VERSION)),
        (uint(K_TYPE), uint(envelope.kind().wire())),
        (uint(K_ID), Value::Bytes(envelope.header.id.as_bytes().to_vec())),
        (uint(K_TIMESTAMP), uint(envelope.header.timestamp_ms)),
        (uint(K_SOURCE), Value::Bytes(envelope.header.source.clone())),
    ];

    if let Some(room) = &envelope.header.room {
        pairs.push((uint(K_ROOM), Value::Text(room.clone())));
    }
    if let Some(body) = encode_body(&envelope.payload) {
        pairs.push((uint(K_BODY), body));
    }
    if let Some(nickname) = &envelope.header.nickname {
        pairs.push((uint(K_NICKNAME), Value::Text(nickname.clone())));
    }

    let mut out = Vec::new();
    ciborium::ser::into_writer(&Value::Map(pairs), &mut out)
        .map_err(|e| EnvelopeError::Encode(e.to_string()))?;
    Ok(out)
}

fn encode_body(payload: &Payload) -> Option<Value> {
    match payload {
        Payload::Hello(info) => {
            let caps: Vec<(Value, Value)> = info
                .capabilities
                .iter()
                .map(|(cap, supported)| (uint(*cap), Value::Bool(*supported)))
                .collect();
            Some(Value::Map(vec![
                (uint(B_HELLO_NAME), Value::Text(info.name.clone())),
                (uint(B_HELLO_VERSION), Value::Text(info.version.clone())),
                (uint(B_HELLO_CAPS), Value::Map(caps)),
            ]))
        }
        Payload::Welcome(info) => {
            let mut pairs = Vec::new();
            if let Some(hub) = &info.hub_name {
                pairs.push((uint(B_WELCOME_HUB), Value::Text(hub.clone())));
            }
            if let Some(greeting) = &info.greeting {
                pairs.push((uint(B_WELCOME_GREETING), Value::Text(greeting.clone())));
            }
            if let Some(version) = &info.version {
                pairs.push((uint(B_WELCOME_VERSION), Value::Text(version.clone())));
            }
            if let Some(limits) = &info.limits {
                pairs.push((uint(B_WELCOME_LIMITS), encode_limits(limits)));
            }
            Some(Value::Map(pairs))
        }
        Payload::Join { key } => key.as_ref().map(|k| Value::Text(k.clone())),
        Payload::Joined(info) => Some(Value::Map(vec![(
            uint(B_JOINED_USERS),
            Value::Array(info.users.iter().map(|u| Value::Bytes(u.clone())).collect()),
        )])),
        Payload::Part | Payload::Parted => None,
        Payload::Msg(text) | Payload::Notice(text) | Payload::Error(text) => {
            Some(Value::Text(text.clone()))
        }
        Payload::Ping(body) | Payload::Pong(body) => body.clone(),
        Payload::ResourceAnnouncement(ann) => {
            let mut pairs = vec![
                (uint(B_RES_ID), Value::Bytes(ann.id.clone())),
                (uint(B_RES_KIND), Value::Text(ann.kind.clone())),
                (uint(B_RES_SIZE), uint(ann.size)),
            ];
            if let Some(digest) = &ann.sha256 {
                pairs.push((uint(B_RES_SHA256), Value::Bytes(digest.to_vec())));
            }
            if let Some(encoding) = &ann.encoding {
                pairs.push((uint(B_RES_ENCODING), Value::Text(encoding.clone())));
            }
            Some(Value::Map(pairs))
        }
    }
}

fn encode_limits(limits: &LimitOverrides) -> Value {
    let mut pairs = Vec::new();
    if let Some(v) = limits.max_nickname_bytes {
        pairs.push((uint(L_MAX_NICKNAME_BYTES), uint(v)));
    }
    if let Some(v) = limits.max_room_name_bytes {
        pairs.push((uint(L_MAX_ROOM_NAME_BYTES), uint(v)));
    }
    if let Some(v) = limits.max_message_body_bytes {
        pairs.push((uint(L_MAX_MESSAGE_BODY_BYTES), uint(v)));
    }
    if let Some(v) = limits.max_rooms_per_session {
        pairs.push((uint(L_MAX_ROOMS_PER_SESSION), uint(v)));
    }
    if let Some(v) = limits.rate_limit_per_minute {
        pairs.push((uint(L_RATE_LIMIT_PER_MINUTE), uint(v)));
    }
    Value::Map(pairs)
}

/// Decode and schema-validate an envelope from wire bytes.
pub fn decode(data: &[u8]) -> Result<Envelope, EnvelopeError> {
    let value: Value =
        ciborium::de::from_reader(data).map_err(|e| EnvelopeError::Decode(e.to_string()))?;

    let map = match value {
        Value::Map(pairs) => pairs,
        _ => return Err(EnvelopeError::NotAMap),
    };

    // All top-level keys must be non-negative integers.
    for (key, _) in &map {
        match key {
            Value::Integer(i) if u64::try_from(*i).is_ok() => {}
            _ => return Err(EnvelopeError::InvalidKey),
        }
    }

    let version = as_u64(
        lookup(&map, K_VERSION).ok_or(EnvelopeError::MissingKey(K_VERSION))?,
        "version",
    )?;
    if version != RRC_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(version));
    }

    let wire_type = as_u64(
        lookup(&map, K_TYPE).ok_or(EnvelopeError::MissingKey(K_TYPE))?,
        "type",
    )?;
    let kind =
        MessageType::from_wire(wire_type).ok_or(EnvelopeError::UnknownMessageType(wire_type))?;

    let id_bytes = as_bytes(
        lookup(&map, K_ID).ok_or(EnvelopeError::MissingKey(K_ID))?,
        "id",
    )?;
    let id = MessageId::try_from(id_bytes.as_slice())
        .map_err(|_| EnvelopeError::WrongType { field: "id" })?;

    let timestamp_ms = as_u64(
        lookup(&map, K_TIMESTAMP).ok_or(EnvelopeError::MissingKey(K_TIMESTAMP))?,
        "timestamp",
    )?;

    let source = as_bytes(
        lookup(&map, K_SOURCE).ok_or(EnvelopeError::MissingKey(K_SOURCE))?,
        "source",
    )?;

    let room = match lookup(&map, K_ROOM) {
        Some(v) => Some(as_text(v, "room")?),
        None => None,
    };
    let nickname = match lookup(&map, K_NICKNAME) {
        Some(v) => Some(as_text(v, "nickname")?),
        None => None,
    };

    let payload = decode_body(kind, lookup(&map, K_BODY))?;

    Ok(Envelope {
        header: EnvelopeHeader {
            id,
            timestamp_ms,
            source,
            room,
            nickname,
        },
        payload,
    })
}

fn decode_body(kind: MessageType, body: Option<&Value>) -> Result<Payload, EnvelopeError> {
    match kind {
        MessageType::Hello => {
            let mut info = HelloInfo::default();
            if let Some(Value::Map(pairs)) = body {
                if let Some(v) = lookup(pairs, B_HELLO_NAME) {
                    info.name = as_text(v, "hello name")?;
                }
                if let Some(v) = lookup(pairs, B_HELLO_VERSION) {
                    info.version = as_text(v, "hello version")?;
                }
                if let Some(Value::Map(caps)) = lookup(pairs, B_HELLO_CAPS) {
                    let mut out = BTreeMap::new();
                    for (cap, supported) in caps {
                        if let (Ok(cap), Value::Bool(supported)) =
                            (as_u64(cap, "capability"), supported)
                        {
                            out.insert(cap, *supported);
                        }
                    }
                    info.capabilities = out;
                }
            }
            Ok(Payload::Hello(info))
        }
        MessageType::Welcome => {
            let mut info = WelcomeInfo::default();
            if let Some(Value::Map(pairs)) = body {
                if let Some(v) = lookup(pairs, B_WELCOME_HUB) {
                    info.hub_name = Some(as_text(v, "hub name")?);
                }
                if let Some(v) = lookup(pairs, B_WELCOME_GREETING) {
                    info.greeting = Some(as_text(v, "greeting")?);
                }
                if let Some(v) = lookup(pairs, B_WELCOME_VERSION) {
                    info.version = Some(as_text(v, "hub version")?);
                }
                if let Some(Value::Map(limits)) = lookup(pairs, B_WELCOME_LIMITS) {
                    info.limits = Some(decode_limits(limits)?);
                }
            }
            Ok(Payload::Welcome(info))
        }
        MessageType::Join => {
            let key = match body {
                Some(v) => Some(as_text(v, "join key")?),
                None => None,
            };
            Ok(Payload::Join { key })
        }
        MessageType::Joined => {
            let mut info = JoinedInfo::default();
            if let Some(Value::Map(pairs)) = body {
                if let Some(Value::Array(users)) = lookup(pairs, B_JOINED_USERS) {
                    for user in users {
                        info.users.push(as_bytes(user, "joined user")?);
                    }
                }
            }
            Ok(Payload::Joined(info))
        }
        MessageType::Part => Ok(Payload::Part),
        MessageType::Parted => Ok(Payload::Parted),
        MessageType::Msg => Ok(Payload::Msg(text_or_empty(body)?)),
        MessageType::Notice => Ok(Payload::Notice(text_or_empty(body)?)),
        MessageType::Error => Ok(Payload::Error(text_or_empty(body)?)),
        MessageType::Ping => Ok(Payload::Ping(body.cloned())),
        MessageType::Pong => Ok(Payload::Pong(body.cloned())),
        MessageType::ResourceAnnouncement => {
            let pairs = match body {
                Some(Value::Map(pairs)) => pairs,
                _ => return Err(EnvelopeError::WrongType { field: "resource body" }),
            };

            let id = as_bytes(
                lookup(pairs, B_RES_ID).ok_or(EnvelopeError::MissingKey(B_RES_ID))?,
                "resource id",
            )?;
            let kind = as_text(
                lookup(pairs, B_RES_KIND).ok_or(EnvelopeError::MissingKey(B_RES_KIND))?,
                "resource kind",
            )?;
            let size = match lookup(pairs, B_RES_SIZE) {
                Some(Value::Integer(i)) => {
                    u64::try_from(*i).map_err(|_| EnvelopeError::NonPositiveSize)?
                }
                Some(_) => return Err(EnvelopeError::WrongType { field: "resource size" }),
                None => return Err(EnvelopeError::MissingKey(B_RES_SIZE)),
            };
            if size == 0 {
                return Err(EnvelopeError::NonPositiveSize);
            }

            let sha256 = match lookup(pairs, B_RES_SHA256) {
                Some(v) => {
                    let bytes = as_bytes(v, "resource sha256")?;
                    let digest: [u8; SHA256_SIZE] = bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| EnvelopeError::BadDigestLength(bytes.len()))?;
                    Some(digest)
                }
                None => None,
            };
            let encoding = match lookup(pairs, B_RES_ENCODING) {
                Some(v) => Some(as_text(v, "resource encoding")?),
                None => None,
            };

            Ok(Payload::ResourceAnnouncement(ResourceAnnouncement {
                id,
                kind,
                size,
                sha256,
                encoding,
            }))
        }
    }
}

fn decode_limits(pairs: &[(Value, Value)]) -> Result<LimitOverrides, EnvelopeError> {
    let mut limits = LimitOverrides::default();
    if let Some(v) = lookup(pairs, L_MAX_NICKNAME_BYTES) {
        limits.max_nickname_bytes = Some(as_u64(v, "nickname limit")?);
    }
    if let Some(v) = lookup(pairs, L_MAX_ROOM_NAME_BYTES) {
        limits.max_room_name_bytes = Some(as_u64(v, "room name limit")?);
    }
    if let Some(v) = lookup(pairs, L_MAX_MESSAGE_BODY_BYTES) {
        limits.max_message_body_bytes = Some(as_u64(v, "message limit")?);
    }
    if let Some(v) = lookup(pairs, L_MAX_ROOMS_PER_SESSION) {
        limits.max_rooms_per_session = Some(as_u64(v, "rooms limit")?);
    }
    if let Some(v) = lookup(pairs, L_RATE_LIMIT_PER_MINUTE) {
        limits.rate_limit_per_minute = Some(as_u64(v, "rate limit")?);
    }
    Ok(limits)
}

fn text_or_empty(body: Option<&Value>) -> Result<String, EnvelopeError> {
    match body {
        Some(v) => as_text(v, "body"),
        None => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src() -> Vec<u8> {
        vec![0xAA; 16]
    }

    #[test]
    fn test_msg_roundtrip() {
        let env = Envelope::new(src(), Payload::Msg("hello world".into()))
            .with_room("general")
            .with_nickname("ada");

        let wire = encode(&env).unwrap();
        let decoded = decode(&wire).unwrap();

        assert_eq!(decoded.kind(), MessageType::Msg);
        assert_eq!(decoded.header.id, env.header.id);
        assert_eq!(decoded.header.timestamp_ms, env.header.timestamp_ms);
        assert_eq!(decoded.header.source, env.header.source);
        assert_eq!(decoded.header.room.as_deref(), Some("general"));
        assert_eq!(decoded.header.nickname.as_deref(), Some("ada"));
        match decoded.payload {
            Payload::Msg(text) => assert_eq!(text, "hello world"),
            other => panic!("expected Msg, got {other:?}"),
        }
    }

    #[test]
    fn test_hello_roundtrip() {
        let mut info = HelloInfo {
            name: "rrc-client".into(),
            version: "0.1.0".into(),
            capabilities: BTreeMap::new(),
        };
        info.capabilities.insert(0, true);

        let env = Envelope::new(src(), Payload::Hello(info.clone()));
        let decoded = decode(&encode(&env).unwrap()).unwrap();

        match decoded.payload {
            Payload::Hello(got) => assert_eq!(got, info),
            other => panic!("expected Hello, got {other:?}"),
        }
    }

    #[test]
    fn test_welcome_limits_roundtrip() {
        let info = WelcomeInfo {
            hub_name: Some("testhub".into()),
            greeting: Some("welcome aboard".into()),
            version: None,
            limits: Some(LimitOverrides {
                max_nickname_bytes: Some(16),
                max_message_body_bytes: Some(512),
                ..Default::default()
            }),
        };

        let env = Envelope::new(src(), Payload::Welcome(info.clone()));
        let decoded = decode(&encode(&env).unwrap()).unwrap();

        match decoded.payload {
            Payload::Welcome(got) => assert_eq!(got, info),
            other => panic!("expected Welcome, got {other:?}"),
        }
    }

    #[test]
    fn test_resource_announcement_roundtrip() {
        let ann = ResourceAnnouncement {
            id: vec![1, 2, 3, 4],
            kind: "motd".into(),
            size: 120,
            sha256: Some([7u8; 32]),
            encoding: Some("utf-8".into()),
        };

        let env = Envelope::new(src(), Payload::ResourceAnnouncement(ann.clone()));
        let decoded = decode(&encode(&env).unwrap()).unwrap();

        match decoded.payload {
            Payload::ResourceAnnouncement(got) => assert_eq!(got, ann),
            other => panic!("expected ResourceAnnouncement, got {other:?}"),
        }
    }

    #[test]
    fn test_ping_echoes_body() {
        let env = Envelope::new(src(), Payload::Ping(Some(Value::Text("probe".into()))));
        let decoded = decode(&encode(&env).unwrap()).unwrap();

        match decoded.payload {
            Payload::Ping(Some(Value::Text(text))) => assert_eq!(text, "probe"),
            other => panic!("expected Ping body, got {other:?}"),
        }
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let env = Envelope::new(src(), Payload::Part);
        let mut wire = encode(&env).unwrap();

        // Patch the version value. Key 0 is first; its value follows the
        // map header and the key byte.
        assert_eq!(wire[2], RRC_VERSION as u8);
        wire[2] = 9;

        assert!(matches!(
            decode(&wire),
            Err(EnvelopeError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        let pairs = vec![
            (uint(K_VERSION), uint(RRC_VERSION)),
            (uint(K_TYPE), uint(99)),
            (uint(K_ID), Value::Bytes(vec![0u8; 8])),
            (uint(K_TIMESTAMP), uint(1)),
            (uint(K_SOURCE), Value::Bytes(src())),
        ];
        let mut wire = Vec::new();
        ciborium::ser::into_writer(&Value::Map(pairs), &mut wire).unwrap();

        assert!(matches!(
            decode(&wire),
            Err(EnvelopeError::UnknownMessageType(99))
        ));
    }

    #[test]
    fn test_non_integer_key_rejected() {
        let pairs = vec![(Value::Text("version".into()), uint(RRC_VERSION))];
        let mut wire = Vec::new();
        ciborium::ser::into_writer(&Value::Map(pairs), &mut wire).unwrap();

        assert!(matches!(decode(&wire), Err(EnvelopeError::InvalidKey)));
    }

    #[test]
    fn test_missing_required_key_rejected() {
        let pairs = vec![
            (uint(K_VERSION), uint(RRC_VERSION)),
            (uint(K_TYPE), uint(crate::core::constants::T_MSG)),
        ];
        let mut wire = Vec::new();
        ciborium::ser::into_writer(&Value::Map(pairs), &mut wire).unwrap();

        assert!(matches!(
            decode(&wire),
            Err(EnvelopeError::MissingKey(K_ID))
        ));
    }

    #[test]
    fn test_bad_digest_length_rejected() {
        let body = Value::Map(vec![
            (uint(B_RES_ID), Value::Bytes(vec![1])),
            (uint(B_RES_KIND), Value::Text("motd".into())),
            (uint(B_RES_SIZE), uint(10)),
            (uint(B_RES_SHA256), Value::Bytes(vec![0u8; 8])),
        ]);
        let pairs = vec![
            (uint(K_VERSION), uint(RRC_VERSION)),
            (
                uint(K_TYPE),
                uint(crate::core::constants::T_RESOURCE_ANNOUNCEMENT),
            ),
            (uint(K_ID), Value::Bytes(vec![0u8; 8])),
            (uint(K_TIMESTAMP), uint(1)),
            (uint(K_SOURCE), Value::Bytes(src())),
            (uint(K_BODY), body),
        ];
        let mut wire = Vec::new();
        ciborium::ser::into_writer(&Value::Map(pairs), &mut wire).unwrap();

        assert!(matches!(
            decode(&wire),
            Err(EnvelopeError::BadDigestLength(8))
        ));
    }
}
