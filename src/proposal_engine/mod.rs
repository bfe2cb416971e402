//! The Correlation & Proposal Engine (§4.6): gateway-observable proposal
//! lifecycle tracking (open/fulfill/reject/withdraw/complete) plus the
//! fulfillment-request index that links a fulfiller's eventual response
//! back to the original proposer.
//!
//! Client-side MCP request/response correlation (the other half of §4.6)
//! lives in [`crate::correlation`], since it is Participant Runtime state,
//! not gateway state.

pub mod implementation;

pub use implementation::ProposalEngineImpl;

use crate::domain::{EnvelopeId, GatewayTimestamp, ParticipantId, Proposal, ProposalId};
use crate::error::ProposalError;
use async_trait::async_trait;

/// Gateway-side proposal bookkeeping (§4.6), kept object-safe for
/// `Arc<dyn ProposalEngine>` sharing across connection tasks.
#[async_trait]
pub trait ProposalEngine: Send + Sync {
    /// Opens a new proposal.
    async fn open(
        &self,
        id: ProposalId,
        proposer: ParticipantId,
        targets: Vec<ParticipantId>,
    ) -> Result<(), ProposalError>;

    /// Records `fulfiller` as the first (and only authoritative) claimant of
    /// `proposal_id`, keyed by the fulfillment request's envelope id.
    ///
    /// Returns `Ok(true)` if this call won the claim, `Ok(false)` if the
    /// proposal was already fulfilling/terminal (§4.6: later fulfillment
    /// attempts are still routed but do not alter proposer state).
    async fn claim_fulfillment(
        &self,
        proposal_id: ProposalId,
        fulfiller: ParticipantId,
        fulfillment_request_id: EnvelopeId,
    ) -> Result<bool, ProposalError>;

    /// Marks the proposal completed once the fulfiller's response has
    /// resolved the proposer's pending promise.
    async fn complete(&self, proposal_id: ProposalId) -> Result<(), ProposalError>;

    /// Rejects a proposal on behalf of `rejector`. Returns `Ok(true)` if this
    /// call's reject was the one applied (first rejector wins, §4.6).
    async fn reject(&self, proposal_id: ProposalId, rejector: ParticipantId) -> Result<bool, ProposalError>;

    /// Withdraws a proposal on behalf of `withdrawer`. Returns `Ok(false)`
    /// without error if `withdrawer` is not the original proposer — per §4.6
    /// such withdrawals are dropped, not rejected with an error, so the
    /// caller can log a security event without surfacing a protocol error.
    async fn withdraw(&self, proposal_id: ProposalId, withdrawer: ParticipantId) -> Result<bool, ProposalError>;

    /// Fetches a snapshot of a tracked proposal.
    async fn get(&self, proposal_id: ProposalId) -> Result<Proposal, ProposalError>;

    /// Resolves a fulfillment request's envelope id back to the proposal it
    /// was claimed under, used to route the eventual `mcp/response` back to
    /// the proposer's pending promise (§4.6).
    async fn find_by_fulfillment_request(&self, fulfillment_request_id: EnvelopeId) -> Option<ProposalId>;

    /// Drops bookkeeping for proposals that reached a terminal state before
    /// `older_than`, bounding memory growth (mirrors the registry's
    /// expired-conversation sweep).
    async fn sweep_terminal_before(&self, older_than: GatewayTimestamp) -> usize;
}

/// Deterministic tie-break for two terminal (reject/withdraw) attempts that
/// arrive in the same processing batch with indistinguishable gateway
/// ingress order: earlier timestamp wins; ties broken by sender id
/// lexicographic order (§4.6). Pure and total, so callers can sort a batch
/// of simultaneous terminal envelopes before applying them one at a time.
#[must_use]
pub fn earlier(
    a: (GatewayTimestamp, ParticipantId),
    b: (GatewayTimestamp, ParticipantId),
) -> std::cmp::Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.to_string().cmp(&b.1.to_string()))
}
