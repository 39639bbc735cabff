//! Negotiated protocol limits and input validation.

use crate::core::constants::{
    DEFAULT_MAX_MESSAGE_BODY_BYTES, DEFAULT_MAX_NICKNAME_BYTES, DEFAULT_MAX_ROOMS_PER_SESSION,
    DEFAULT_MAX_ROOM_NAME_BYTES, DEFAULT_RATE_LIMIT_PER_MINUTE,
};
use crate::core::ValidationError;
use crate::envelope::LimitOverrides;

/// Protocol limits in force for the session.
///
/// Starts at daemon defaults and is tightened (or relaxed) by the limits
/// map a WELCOME carries. Fields a WELCOME omits keep their prior value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedLimits {
    /// Longest accepted nickname, in bytes.
    pub max_nickname_bytes: usize,
    /// Longest accepted room name, in bytes.
    pub max_room_name_bytes: usize,
    /// Longest accepted message body, in bytes.
    pub max_message_body_bytes: usize,
    /// Most rooms a session may be joined to at once.
    pub max_rooms_per_session: usize,
    /// Advisory hub-side rate limit, messages per minute.
    pub rate_limit_per_minute: u64,
}

impl Default for NegotiatedLimits {
    fn default() -> Self {
        Self {
            max_nickname_bytes: DEFAULT_MAX_NICKNAME_BYTES,
            max_room_name_bytes: DEFAULT_MAX_ROOM_NAME_BYTES,
            max_message_body_bytes: DEFAULT_MAX_MESSAGE_BODY_BYTES,
            max_rooms_per_session: DEFAULT_MAX_ROOMS_PER_SESSION,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
        }
    }
}

impl NegotiatedLimits {
    /// Overlay the overrides a WELCOME carried.
    pub fn apply(&mut self, overrides: &LimitOverrides) {
        if let Some(v) = overrides.max_nickname_bytes {
            self.max_nickname_bytes = v as usize;
        }
        if let Some(v) = overrides.max_room_name_bytes {
            self.max_room_name_bytes = v as usize;
        }
        if let Some(v) = overrides.max_message_body_bytes {
            self.max_message_body_bytes = v as usize;
        }
        if let Some(v) = overrides.max_rooms_per_session {
            self.max_rooms_per_session = v as usize;
        }
        if let Some(v) = overrides.rate_limit_per_minute {
            self.rate_limit_per_minute = v;
        }
    }

    /// Validate a nickname against the negotiated limits.
    pub fn validate_nickname(&self, nickname: &str) -> Result<(), ValidationError> {
        if nickname.len() > self.max_nickname_bytes {
            return Err(ValidationError::NicknameTooLong {
                actual: nickname.len(),
                limit: self.max_nickname_bytes,
            });
        }
        Ok(())
    }

    /// Validate an already-normalized room name.
    pub fn validate_room(&self, room: &str) -> Result<(), ValidationError> {
        if room.is_empty() {
            return Err(ValidationError::EmptyRoom);
        }
        if room.len() > self.max_room_name_bytes {
            return Err(ValidationError::RoomTooLong {
                actual: room.len(),
                limit: self.max_room_name_bytes,
            });
        }
        Ok(())
    }

    /// Validate a message body.
    pub fn validate_message(&self, text: &str) -> Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if text.len() > self.max_message_body_bytes {
            return Err(ValidationError::MessageTooLong {
                actual: text.len(),
                limit: self.max_message_body_bytes,
            });
        }
        Ok(())
    }
}

/// Canonical form of a room name: surrounding whitespace stripped,
/// lowercased. All joins, parts, sends, and comparisons use this form.
pub fn normalize_room(room: &str) -> String {
    room.trim().to_lowercase()
}
