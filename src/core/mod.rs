//! Core constants, error types, and shared newtypes.

pub mod constants;
mod error;
mod types;

pub use error::{HashParseError, SessionError, ValidationError};
pub use types::{DestinationHash, IdentityHash, MessageId};
