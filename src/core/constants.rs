//! Protocol constants for RRC.
//!
//! Wire-level keys and message type numbers are fixed by the protocol and
//! MUST NOT be changed. Defaults are the values a session starts with before
//! the hub's WELCOME overrides them.

use std::time::Duration;

// =============================================================================
// PROTOCOL VERSION
// =============================================================================

/// Supported envelope protocol version.
///
/// Envelopes carrying any other version are rejected at decode.
pub const RRC_VERSION: u64 = 1;

// =============================================================================
// ENVELOPE KEYS (top-level CBOR map, integer keys)
// =============================================================================

/// Protocol version.
pub const K_VERSION: u64 = 0;

/// Message type.
pub const K_TYPE: u64 = 1;

/// Message id (8 random bytes).
pub const K_ID: u64 = 2;

/// Timestamp (milliseconds since the Unix epoch).
pub const K_TIMESTAMP: u64 = 3;

/// Source identity hash.
pub const K_SOURCE: u64 = 4;

/// Room name (lowercase-normalized).
pub const K_ROOM: u64 = 5;

/// Body (polymorphic, depends on message type).
pub const K_BODY: u64 = 6;

/// Nickname.
pub const K_NICKNAME: u64 = 7;

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// Client handshake greeting.
pub const T_HELLO: u64 = 0;

/// Hub handshake reply carrying negotiated limits.
pub const T_WELCOME: u64 = 1;

/// Join a room.
pub const T_JOIN: u64 = 2;

/// Hub confirmation of a join.
pub const T_JOINED: u64 = 3;

/// Leave a room.
pub const T_PART: u64 = 4;

/// Hub confirmation of a part.
pub const T_PARTED: u64 = 5;

/// Chat message.
pub const T_MSG: u64 = 6;

/// Informational notice.
pub const T_NOTICE: u64 = 7;

/// Latency probe.
pub const T_PING: u64 = 8;

/// Latency probe reply.
pub const T_PONG: u64 = 9;

/// Hub error report.
pub const T_ERROR: u64 = 10;

/// Announcement of an upcoming resource transfer.
pub const T_RESOURCE_ANNOUNCEMENT: u64 = 11;

// =============================================================================
// HELLO BODY KEYS
// =============================================================================

/// Client name.
pub const B_HELLO_NAME: u64 = 1;

/// Client version.
pub const B_HELLO_VERSION: u64 = 2;

/// Capability map (capability id -> bool).
pub const B_HELLO_CAPS: u64 = 3;

/// Capability: the client understands resource announcements.
pub const CAP_RESOURCE_ANNOUNCEMENT: u64 = 0;

// =============================================================================
// WELCOME BODY KEYS
// =============================================================================

/// Hub name.
pub const B_WELCOME_HUB: u64 = 0;

/// Greeting text.
pub const B_WELCOME_GREETING: u64 = 1;

/// Hub software version.
pub const B_WELCOME_VERSION: u64 = 2;

/// Limits sub-map.
pub const B_WELCOME_LIMITS: u64 = 3;

// =============================================================================
// WELCOME LIMITS SUB-MAP KEYS
// =============================================================================

/// Maximum nickname length in bytes.
pub const L_MAX_NICKNAME_BYTES: u64 = 0;

/// Maximum room name length in bytes.
pub const L_MAX_ROOM_NAME_BYTES: u64 = 1;

/// Maximum message body length in bytes.
pub const L_MAX_MESSAGE_BODY_BYTES: u64 = 2;

/// Maximum rooms joined per session.
pub const L_MAX_ROOMS_PER_SESSION: u64 = 3;

/// Messages-per-minute rate limit.
pub const L_RATE_LIMIT_PER_MINUTE: u64 = 4;

// =============================================================================
// JOINED BODY KEYS
// =============================================================================

/// Identity hashes of current room members.
pub const B_JOINED_USERS: u64 = 0;

// =============================================================================
// RESOURCE ANNOUNCEMENT BODY KEYS
// =============================================================================

/// Resource id.
pub const B_RES_ID: u64 = 0;

/// Resource kind (e.g. "notice", "motd", "blob").
pub const B_RES_KIND: u64 = 1;

/// Resource size in bytes.
pub const B_RES_SIZE: u64 = 2;

/// Optional SHA-256 digest of the payload.
pub const B_RES_SHA256: u64 = 3;

/// Optional text encoding of the payload.
pub const B_RES_ENCODING: u64 = 4;

// =============================================================================
// RESOURCE KINDS
// =============================================================================

/// Informational notice, forwarded to the notice callback.
pub const RES_KIND_NOTICE: &str = "notice";

/// Message of the day, forwarded to the notice callback.
pub const RES_KIND_MOTD: &str = "motd";

// =============================================================================
// DEFAULT LIMITS (overridden by the hub's WELCOME)
// =============================================================================

/// Default maximum nickname length in bytes.
pub const DEFAULT_MAX_NICKNAME_BYTES: usize = 32;

/// Default maximum room name length in bytes.
pub const DEFAULT_MAX_ROOM_NAME_BYTES: usize = 64;

/// Default maximum message body length in bytes.
pub const DEFAULT_MAX_MESSAGE_BODY_BYTES: usize = 1024;

/// Default maximum rooms joined per session.
pub const DEFAULT_MAX_ROOMS_PER_SESSION: usize = 16;

/// Default messages-per-minute rate limit.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u64 = 60;

// =============================================================================
// TIMING CONSTANTS - CONNECT
// =============================================================================

/// Initial sleep between path/identity polls.
pub const POLL_INTERVAL_INITIAL: Duration = Duration::from_millis(50);

/// Backoff factor applied to the poll interval after each miss.
pub const POLL_BACKOFF_FACTOR: f64 = 1.5;

/// Cap on the poll interval.
pub const POLL_INTERVAL_MAX: Duration = Duration::from_millis(500);

/// Cap on the path discovery wait, regardless of the connect timeout.
pub const PATH_WAIT_MAX: Duration = Duration::from_secs(5);

/// Settle delay after tearing down a pre-existing link to the same hub.
pub const LINK_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

// =============================================================================
// TIMING CONSTANTS - SESSION
// =============================================================================

/// Interval between HELLO retries.
pub const DEFAULT_HELLO_INTERVAL: Duration = Duration::from_secs(3);

/// Maximum HELLO attempts per connection.
pub const DEFAULT_HELLO_MAX_ATTEMPTS: u32 = 3;

/// Sleep slice inside the HELLO retry loop; keeps it responsive to
/// supersession and welcome.
pub const HELLO_LOOP_SLICE: Duration = Duration::from_millis(100);

/// Default keepalive ping interval.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// RESOURCE TRANSFER DEFAULTS
// =============================================================================

/// Default maximum accepted resource size in bytes.
pub const DEFAULT_MAX_RESOURCE_BYTES: u64 = 262_144;

/// Default TTL of a resource expectation.
pub const DEFAULT_EXPECTATION_TTL: Duration = Duration::from_secs(30);

/// Default cap on pending resource expectations.
pub const DEFAULT_MAX_PENDING_EXPECTATIONS: usize = 8;

/// Default cap on concurrently active resource transfers.
pub const DEFAULT_MAX_ACTIVE_TRANSFERS: usize = 16;

// =============================================================================
// DELIVERY CONFIRMATION
// =============================================================================

/// Default timeout before an unconfirmed message is reported.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Cadence of the confirmation timeout sweep.
pub const DELIVERY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// DESTINATIONS
// =============================================================================

/// Destination application name hubs announce under.
pub const DEFAULT_DEST_NAME: &str = "rrc.hub";

// =============================================================================
// SIZES
// =============================================================================

/// Message id size in bytes.
pub const MESSAGE_ID_SIZE: usize = 8;

/// Destination and identity hash size in bytes.
pub const DESTINATION_HASH_SIZE: usize = 16;

/// SHA-256 digest size in bytes.
pub const SHA256_SIZE: usize = 32;
