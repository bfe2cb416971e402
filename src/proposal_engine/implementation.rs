//! `DashMap`-backed [`ProposalEngine`] implementation.
//!
//! One `DashMap` of aggregates keyed by id, mutated in place via `get_mut`,
//! plus a secondary index `DashMap` for a derived lookup (fulfillment
//! request id -> proposal).

use super::ProposalEngine;
use crate::domain::{EnvelopeId, GatewayTimestamp, ParticipantId, Proposal, ProposalId, ProposalStatus};
use crate::error::ProposalError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Tracks every open and recently-terminal proposal in a space.
pub struct ProposalEngineImpl {
    proposals: DashMap<ProposalId, Proposal>,
    by_fulfillment_request: DashMap<EnvelopeId, ProposalId>,
}

impl ProposalEngineImpl {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            proposals: DashMap::new(),
            by_fulfillment_request: DashMap::new(),
        }
    }
}

impl Default for ProposalEngineImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProposalEngine for ProposalEngineImpl {
    async fn open(
        &self,
        id: ProposalId,
        proposer: ParticipantId,
        targets: Vec<ParticipantId>,
    ) -> Result<(), ProposalError> {
        self.proposals.insert(id, Proposal::open(id, proposer, targets));
        Ok(())
    }

    async fn claim_fulfillment(
        &self,
        proposal_id: ProposalId,
        fulfiller: ParticipantId,
        fulfillment_request_id: EnvelopeId,
    ) -> Result<bool, ProposalError> {
        let mut proposal = self
            .proposals
            .get_mut(&proposal_id)
            .ok_or(ProposalError::NotFound { proposal: proposal_id })?;
        let won = proposal.claim_fulfillment(fulfiller, fulfillment_request_id);
        if won {
            self.by_fulfillment_request.insert(fulfillment_request_id, proposal_id);
        }
        Ok(won)
    }

    async fn complete(&self, proposal_id: ProposalId) -> Result<(), ProposalError> {
        let mut proposal = self
            .proposals
            .get_mut(&proposal_id)
            .ok_or(ProposalError::NotFound { proposal: proposal_id })?;
        if proposal.complete() {
            Ok(())
        } else {
            Err(ProposalError::NotOpen {
                proposal: proposal_id,
                status: proposal.status().to_string(),
            })
        }
    }

    async fn reject(&self, proposal_id: ProposalId, rejector: ParticipantId) -> Result<bool, ProposalError> {
        let mut proposal = self
            .proposals
            .get_mut(&proposal_id)
            .ok_or(ProposalError::NotFound { proposal: proposal_id })?;
        Ok(proposal.reject(rejector))
    }

    async fn withdraw(&self, proposal_id: ProposalId, withdrawer: ParticipantId) -> Result<bool, ProposalError> {
        let mut proposal = self
            .proposals
            .get_mut(&proposal_id)
            .ok_or(ProposalError::NotFound { proposal: proposal_id })?;
        Ok(proposal.withdraw(withdrawer))
    }

    async fn get(&self, proposal_id: ProposalId) -> Result<Proposal, ProposalError> {
        self.proposals
            .get(&proposal_id)
            .map(|entry| entry.value().clone())
            .ok_or(ProposalError::NotFound { proposal: proposal_id })
    }

    async fn find_by_fulfillment_request(&self, fulfillment_request_id: EnvelopeId) -> Option<ProposalId> {
        self.by_fulfillment_request
            .get(&fulfillment_request_id)
            .map(|entry| *entry.value())
    }

    async fn sweep_terminal_before(&self, older_than: GatewayTimestamp) -> usize {
        let expired: Vec<ProposalId> = self
            .proposals
            .iter()
            .filter(|entry| {
                let proposal = entry.value();
                is_terminal(proposal.status()) && proposal.opened_at() < older_than
            })
            .map(|entry| *entry.key())
            .collect();
        let count = expired.len();
        for id in expired {
            if let Some((_, proposal)) = self.proposals.remove(&id) {
                if let Some(request_id) = proposal.fulfillment_request_id() {
                    self.by_fulfillment_request.remove(&request_id);
                }
            }
        }
        count
    }
}

fn is_terminal(status: ProposalStatus) -> bool {
    matches!(
        status,
        ProposalStatus::Rejected | ProposalStatus::Withdrawn | ProposalStatus::Completed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_fulfillment_indexes_request_id_and_blocks_second_claim() {
        let engine = ProposalEngineImpl::new();
        let id = ProposalId::generate();
        let proposer = ParticipantId::generate();
        let target = ParticipantId::generate();
        engine.open(id, proposer, vec![target]).await.unwrap();

        let request_id = EnvelopeId::generate();
        assert!(engine.claim_fulfillment(id, target, request_id).await.unwrap());
        assert_eq!(engine.find_by_fulfillment_request(request_id).await, Some(id));

        let other_request = EnvelopeId::generate();
        assert!(!engine
            .claim_fulfillment(id, ParticipantId::generate(), other_request)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn reject_requires_addressed_target() {
        let engine = ProposalEngineImpl::new();
        let id = ProposalId::generate();
        let proposer = ParticipantId::generate();
        let target = ParticipantId::generate();
        engine.open(id, proposer, vec![target]).await.unwrap();

        assert!(!engine.reject(id, ParticipantId::generate()).await.unwrap());
        assert!(engine.reject(id, target).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_drops_terminal_proposals_and_their_index_entries() {
        let engine = ProposalEngineImpl::new();
        let id = ProposalId::generate();
        let proposer = ParticipantId::generate();
        engine.open(id, proposer, vec![proposer]).await.unwrap();
        engine.reject(id, proposer).await.unwrap();

        let cutoff = GatewayTimestamp::now();
        // The proposal's opened_at was stamped before `cutoff`.
        assert_eq!(engine.sweep_terminal_before(cutoff).await, 1);
        assert!(engine.get(id).await.is_err());
    }
}
