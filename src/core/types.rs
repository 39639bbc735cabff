//! Shared newtypes for protocol identifiers.

use super::constants::{DESTINATION_HASH_SIZE, MESSAGE_ID_SIZE};
use super::error::HashParseError;

/// Message id carried in every envelope (8 random bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; MESSAGE_ID_SIZE]);

impl MessageId {
    /// Create a message id from bytes.
    pub fn from_bytes(bytes: [u8; MESSAGE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a random message id.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Get the id as bytes.
    pub fn as_bytes(&self) -> &[u8; MESSAGE_ID_SIZE] {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl TryFrom<&[u8]> for MessageId {
    type Error = std::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(value.try_into()?))
    }
}

/// Hash of a transport destination (16 bytes).
///
/// Destinations are derived from a remote identity plus the application
/// name, so a destination hash is not forgeable independently of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationHash([u8; DESTINATION_HASH_SIZE]);

impl DestinationHash {
    /// Create a destination hash from bytes.
    pub fn from_bytes(bytes: [u8; DESTINATION_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a destination hash from hex input.
    ///
    /// Tolerates a `0x` prefix, surrounding whitespace, and mixed case.
    pub fn from_hex(input: &str) -> Result<Self, HashParseError> {
        let mut s: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        if let Some(stripped) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = stripped.to_string();
        }

        let bytes = hex::decode(&s).map_err(|_| HashParseError::InvalidHex {
            input: input.to_string(),
        })?;
        let bytes: [u8; DESTINATION_HASH_SIZE] =
            bytes
                .try_into()
                .map_err(|v: Vec<u8>| HashParseError::WrongLength {
                    expected: DESTINATION_HASH_SIZE,
                    actual: v.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Get the hash as bytes.
    pub fn as_bytes(&self) -> &[u8; DESTINATION_HASH_SIZE] {
        &self.0
    }
}

impl std::fmt::Display for DestinationHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Hash of an identity (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityHash([u8; DESTINATION_HASH_SIZE]);

impl IdentityHash {
    /// Create an identity hash from bytes.
    pub fn from_bytes(bytes: [u8; DESTINATION_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the hash as bytes.
    pub fn as_bytes(&self) -> &[u8; DESTINATION_HASH_SIZE] {
        &self.0
    }
}

impl std::fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
