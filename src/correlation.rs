//! Client-side MCP request/response correlation (§4.6, first half): a table
//! keyed by envelope id mapping to a resolver and a timeout, held by the
//! Participant Runtime rather than the gateway.
//!
//! A `DashMap`-keyed aggregate-with-timeout-sweep shape, here resolving a
//! `oneshot` channel rather than mutating an in-place aggregate — per
//! design note §9's "table keyed by envelope id mapping to a resolver
//! and a timer" equivalence.

use crate::domain::{EnvelopeId, PendingKind, PendingRequest, ProposalId, RequestTimeoutMs};
use crate::error::ProposalError;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

/// The outcome a pending request/proposal resolves with: either the MCP
/// result or an MCP-shaped error (§6's `mcp/response` payload).
#[derive(Debug, Clone)]
pub enum CorrelationOutcome {
    /// The operation succeeded with this JSON result.
    Result(Value),
    /// The operation failed; `reason` carries the rejector/error detail.
    Error {
        /// Machine-readable detail (an `mcp/response.error` object or a
        /// rejection reason).
        reason: Value,
    },
}

/// Tracks every outstanding `mcp/request`/`mcp/proposal` this participant
/// has sent and not yet resolved (§3, §4.6).
pub struct CorrelationTable {
    pending: DashMap<EnvelopeId, PendingRequest>,
    resolvers: DashMap<EnvelopeId, oneshot::Sender<CorrelationOutcome>>,
    default_timeout: RequestTimeoutMs,
}

impl CorrelationTable {
    /// Creates an empty table with `default_timeout` applied to requests
    /// that don't specify their own.
    #[must_use]
    pub fn new(default_timeout: RequestTimeoutMs) -> Self {
        Self {
            pending: DashMap::new(),
            resolvers: DashMap::new(),
            default_timeout,
        }
    }

    /// Records a newly sent `mcp/request`/`mcp/proposal`, returning the
    /// receiver end the caller should `.await` (with a timeout derived
    /// from [`CorrelationTable::default_timeout`] unless the caller applies
    /// its own).
    pub fn track(
        &self,
        id: EnvelopeId,
        kind_sent: PendingKind,
        proposer_id: crate::domain::ParticipantId,
    ) -> oneshot::Receiver<CorrelationOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, PendingRequest::new(id, kind_sent, proposer_id));
        self.resolvers.insert(id, tx);
        rx
    }

    /// This table's configured default request timeout.
    #[must_use]
    pub fn default_timeout(&self) -> RequestTimeoutMs {
        self.default_timeout
    }

    /// Whether `id` is a currently tracked `mcp/proposal` awaiting
    /// fulfillment, i.e. a valid target for [`CorrelationTable::link_fulfillment`].
    #[must_use]
    pub fn is_pending_proposal(&self, id: EnvelopeId) -> bool {
        self.pending
            .get(&id)
            .is_some_and(|entry| entry.kind_sent() == PendingKind::Proposal)
    }

    /// Links a proposal's fulfillment request id so a later response
    /// correlated to the fulfillment also resolves the original proposal
    /// (§4.6).
    ///
    /// # Errors
    /// Returns [`ProposalError::PendingRequestNotFound`] if `proposal_id`
    /// is not (or no longer) tracked.
    pub fn link_fulfillment(
        &self,
        proposal_id: ProposalId,
        fulfillment_request_id: EnvelopeId,
    ) -> Result<(), ProposalError> {
        let original = EnvelopeId::from(proposal_id.into_inner());
        let mut entry = self
            .pending
            .get_mut(&original)
            .ok_or(ProposalError::PendingRequestNotFound { envelope: original })?;
        entry.link_fulfillment(fulfillment_request_id);
        Ok(())
    }

    /// Attempts to resolve whichever pending entry's correlation targets
    /// include any of `correlation_ids` — the response/rejection envelope's
    /// own `correlation_id` list. Returns `true` if a resolver was found
    /// and fired.
    pub fn resolve(&self, correlation_ids: &[EnvelopeId], outcome: CorrelationOutcome) -> bool {
        let Some(matched_id) = self
            .pending
            .iter()
            .find(|entry| entry.value().resolved_by(correlation_ids))
            .map(|entry| *entry.key())
        else {
            return false;
        };
        self.pending.remove(&matched_id);
        if let Some((_, resolver)) = self.resolvers.remove(&matched_id) {
            let _ = resolver.send(outcome);
        }
        true
    }

    /// Clears state for a single pending entry without resolving its
    /// receiver (used on explicit cancellation, §5: "cancelling a pending
    /// request clears the timer and local state; no envelope is sent").
    pub fn cancel(&self, id: EnvelopeId) {
        self.pending.remove(&id);
        self.resolvers.remove(&id);
    }

    /// Fails every currently tracked entry with a connection-closed error
    /// and clears the table (§5: disconnect cancels all pending local
    /// requests; §8 invariant 8: bounded-time failure on disconnect).
    pub fn fail_all(&self, reason: Value) {
        let ids: Vec<EnvelopeId> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.pending.remove(&id);
            if let Some((_, resolver)) = self.resolvers.remove(&id) {
                let _ = resolver.send(CorrelationOutcome::Error {
                    reason: reason.clone(),
                });
            }
        }
    }

    /// Number of currently outstanding entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the table holds no outstanding entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParticipantId;
    use serde_json::json;

    #[tokio::test]
    async fn resolve_by_correlation_membership_fires_receiver() {
        let table = CorrelationTable::new(RequestTimeoutMs::try_new(5_000).unwrap());
        let id = EnvelopeId::generate();
        let rx = table.track(id, PendingKind::Request, ParticipantId::generate());

        assert!(table.resolve(&[id], CorrelationOutcome::Result(json!({"ok": true}))));
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, CorrelationOutcome::Result(_)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn proposal_fulfillment_link_resolves_on_fulfillment_response() {
        let table = CorrelationTable::new(RequestTimeoutMs::try_new(5_000).unwrap());
        let proposal_id = ProposalId::generate();
        let original_envelope = EnvelopeId::from(proposal_id.into_inner());
        let rx = table.track(original_envelope, PendingKind::Proposal, ParticipantId::generate());

        let fulfillment_request = EnvelopeId::generate();
        table.link_fulfillment(proposal_id, fulfillment_request).unwrap();

        assert!(table.resolve(&[fulfillment_request], CorrelationOutcome::Result(json!(3))));
        assert!(matches!(rx.await.unwrap(), CorrelationOutcome::Result(_)));
    }

    #[tokio::test]
    async fn disconnect_fails_all_pending_entries() {
        let table = CorrelationTable::new(RequestTimeoutMs::try_new(5_000).unwrap());
        let a = table.track(EnvelopeId::generate(), PendingKind::Request, ParticipantId::generate());
        let b = table.track(EnvelopeId::generate(), PendingKind::Request, ParticipantId::generate());

        table.fail_all(json!({"code": "internal"}));
        assert!(table.is_empty());
        assert!(matches!(a.await.unwrap(), CorrelationOutcome::Error { .. }));
        assert!(matches!(b.await.unwrap(), CorrelationOutcome::Error { .. }));
    }

    #[tokio::test]
    async fn cancel_clears_state_without_resolving() {
        let table = CorrelationTable::new(RequestTimeoutMs::try_new(5_000).unwrap());
        let id = EnvelopeId::generate();
        let rx = table.track(id, PendingKind::Request, ParticipantId::generate());
        table.cancel(id);
        assert!(table.is_empty());
        drop(rx);
    }
}
