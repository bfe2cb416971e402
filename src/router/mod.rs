//! The Router (§4.5): capability-checks a validated envelope, resolves its
//! recipients, and enqueues it on each recipient's connection send queue or
//! pause queue.

pub mod implementation;

pub use implementation::RouterImpl;

use crate::domain::{Envelope, ParticipantId};
use crate::error::RouterError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Per-route outcome: which recipients were delivered to directly, which
/// were queued behind a pause, and which could not be reached at all.
#[derive(Debug, Default, Clone)]
pub struct RouteReport {
    pub delivered: Vec<ParticipantId>,
    pub queued_while_paused: Vec<ParticipantId>,
    pub failed: Vec<(ParticipantId, RouterError)>,
}

/// Point-in-time router throughput and queue statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterStats {
    pub messages_routed: u64,
    pub messages_dropped: u64,
    pub envelopes_per_second: f64,
    pub connected_participants: usize,
}

/// The routing surface: registering connections and routing envelopes
/// through the capability matcher to their recipients (§4.5).
///
/// Kept object-safe (no generic methods) so it can be shared as
/// `Arc<dyn Router>` across connection tasks.
#[async_trait]
pub trait Router: Send + Sync {
    /// Registers the outbound send queue for a newly-joined connection.
    async fn register_connection(&self, id: ParticipantId, sender: mpsc::Sender<Envelope>);

    /// Removes a connection's send queue, e.g. on disconnect.
    async fn deregister_connection(&self, id: ParticipantId);

    /// Capability-checks and routes a validated envelope from its sender to
    /// its recipients (§4.5, steps 1-3).
    ///
    /// # Errors
    /// Returns [`RouterError::CapabilityViolation`] if the sender cannot
    /// send this envelope, or [`RouterError::UnknownRecipient`] if the
    /// sender is not itself a registered/connected participant.
    async fn route(&self, envelope: Envelope) -> Result<RouteReport, RouterError>;

    /// Drains and returns all envelopes queued for `id` while paused, in
    /// FIFO order. Called by the control plane on `participant/resume`.
    async fn drain_pause_queue(&self, id: ParticipantId) -> Vec<Envelope>;

    /// Delivers a gateway-originated envelope (`system/welcome`,
    /// `system/presence`, `system/error`) directly to `recipients`, skipping
    /// the sender capability check in [`Router::route`] since these
    /// envelopes are not participant-authored. Still honors each
    /// recipient's pause state/queue and backpressure handling.
    async fn deliver_system(&self, recipients: Vec<ParticipantId>, envelope: Envelope) -> RouteReport;

    /// A snapshot of current router statistics.
    fn stats(&self) -> RouterStats;
}
