//! Ping-based round-trip latency estimation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::MessageId;

/// Alpha for smoothed RTT (0.125 = 1/8, per RFC 6298).
const SRTT_ALPHA: f64 = 0.125;

/// Tracks outstanding pings and maintains a smoothed round-trip estimate.
///
/// The first sample seeds the estimate; later samples are folded in with
/// `SRTT = (1 - alpha) * SRTT + alpha * sample`.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    outstanding: HashMap<MessageId, Instant>,
    srtt_ms: Option<f64>,
    last: Option<Duration>,
}

impl LatencyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a ping sent now under the given id.
    pub fn record_ping(&mut self, id: MessageId) {
        self.outstanding.insert(id, Instant::now());
    }

    /// Fold in the pong for a previously recorded ping.
    ///
    /// Returns the raw round-trip sample, or `None` if the id was never
    /// pinged (or was already answered).
    pub fn record_pong(&mut self, id: &MessageId) -> Option<Duration> {
        let sent_at = self.outstanding.remove(id)?;
        let sample = sent_at.elapsed();
        let sample_ms = sample.as_secs_f64() * 1000.0;

        self.srtt_ms = Some(match self.srtt_ms {
            None => sample_ms,
            Some(srtt) => (1.0 - SRTT_ALPHA) * srtt + SRTT_ALPHA * sample_ms,
        });
        self.last = Some(sample);
        Some(sample)
    }

    /// Smoothed round-trip estimate, if any sample has arrived.
    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.srtt_ms.map(|ms| Duration::from_secs_f64(ms / 1000.0))
    }

    /// Most recent raw sample.
    pub fn last_rtt(&self) -> Option<Duration> {
        self.last
    }

    /// Drop all outstanding pings. Estimates survive reconnects.
    pub fn reset_outstanding(&mut self) {
        self.outstanding.clear();
    }
}
