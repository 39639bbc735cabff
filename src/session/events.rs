//! Session event callbacks.

use crate::core::MessageId;
use crate::envelope::{Envelope, WelcomeInfo};

/// Callbacks the engine raises as the session progresses.
///
/// Every method has a no-op default, so implementors override only what
/// they care about. Invocations are panic-isolated: a panicking callback
/// is logged and the session carries on.
#[allow(unused_variables)]
pub trait SessionEvents: Send + Sync {
    /// A chat message arrived (including echoes of local sends).
    fn on_message(&self, envelope: &Envelope) {}

    /// A notice arrived, either on the wire or synthesized from an
    /// informational resource.
    fn on_notice(&self, envelope: &Envelope) {}

    /// The hub reported an error.
    fn on_error(&self, envelope: &Envelope) {}

    /// The handshake completed; fired once per session.
    fn on_welcome(&self, welcome: &WelcomeInfo) {}

    /// The hub confirmed a room join.
    fn on_joined(&self, room: &str, envelope: &Envelope) {}

    /// The hub confirmed a room part.
    fn on_parted(&self, room: &str, envelope: &Envelope) {}

    /// The link closed, locally or remotely.
    fn on_close(&self) {}

    /// A pong arrived. `rtt_ms` carries the raw round-trip sample when
    /// the pong answers a locally recorded ping.
    fn on_pong(&self, envelope: &Envelope, rtt_ms: Option<f64>) {}

    /// An outbound message or resource was flagged before sending.
    fn on_resource_warning(&self, text: &str) {}

    /// The hub echoed a locally sent message back.
    fn on_delivery_confirmed(&self, id: MessageId, room: &str) {}

    /// A locally sent message was never echoed within the timeout.
    fn on_delivery_timeout(&self, id: MessageId, room: &str, text: &str) {}
}

/// Events implementation that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl SessionEvents for NullEvents {}
