//! Proposal and client-side Pending Request state (§3, §4.6): the
//! contract-net-style "propose, fulfill-or-reject" lifecycle.

use crate::domain::primitives::{EnvelopeId, GatewayTimestamp, ParticipantId, ProposalId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lifecycle state of a router-observable [`Proposal`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Awaiting a fulfillment or rejection.
    Open,
    /// A fulfiller has claimed it and is working the underlying request.
    Fulfilling,
    /// An addressed participant rejected it.
    Rejected,
    /// The proposer withdrew it.
    Withdrawn,
    /// The fulfiller's response resolved the proposer's pending promise.
    Completed,
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Open => "open",
            Self::Fulfilling => "fulfilling",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// A router-observable proposal (§3): the state the gateway tracks for an
/// `mcp/proposal` envelope so it can route fulfillment requests, rejections,
/// and withdrawals back to the right proposer.
#[derive(Debug, Clone)]
pub struct Proposal {
    id: ProposalId,
    proposer: ParticipantId,
    targets: Vec<ParticipantId>,
    status: ProposalStatus,
    fulfiller_id: Option<ParticipantId>,
    fulfillment_request_id: Option<EnvelopeId>,
    opened_at: GatewayTimestamp,
}

impl Proposal {
    /// Opens a new proposal addressed to `targets`.
    #[must_use]
    pub fn open(id: ProposalId, proposer: ParticipantId, targets: Vec<ParticipantId>) -> Self {
        Self {
            id,
            proposer,
            targets,
            status: ProposalStatus::Open,
            fulfiller_id: None,
            fulfillment_request_id: None,
            opened_at: GatewayTimestamp::now(),
        }
    }

    /// The proposal id.
    #[must_use]
    pub fn id(&self) -> ProposalId {
        self.id
    }

    /// The participant who opened the proposal.
    #[must_use]
    pub fn proposer(&self) -> ParticipantId {
        self.proposer
    }

    /// The addressed participants.
    #[must_use]
    pub fn targets(&self) -> &[ParticipantId] {
        &self.targets
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    /// The gateway ingress timestamp this proposal was opened at, used for
    /// the tie-break rule on simultaneous rejects/withdraws (§4.6).
    #[must_use]
    pub fn opened_at(&self) -> GatewayTimestamp {
        self.opened_at
    }

    /// Records the first fulfiller claiming this proposal (§4.6:
    /// first-responder-wins). Returns `false` if a fulfiller was already
    /// claimed or the proposal is not open.
    pub fn claim_fulfillment(
        &mut self,
        fulfiller: ParticipantId,
        fulfillment_request_id: EnvelopeId,
    ) -> bool {
        if self.status != ProposalStatus::Open {
            return false;
        }
        self.fulfiller_id = Some(fulfiller);
        self.fulfillment_request_id = Some(fulfillment_request_id);
        self.status = ProposalStatus::Fulfilling;
        true
    }

    /// The fulfiller, once claimed.
    #[must_use]
    pub fn fulfiller_id(&self) -> Option<ParticipantId> {
        self.fulfiller_id
    }

    /// The envelope id of the fulfillment request, used to link the
    /// eventual `mcp/response` back to this proposal (§4.6).
    #[must_use]
    pub fn fulfillment_request_id(&self) -> Option<EnvelopeId> {
        self.fulfillment_request_id
    }

    /// Completes the proposal once the fulfiller's response has resolved
    /// the proposer's pending promise.
    pub fn complete(&mut self) -> bool {
        if self.status != ProposalStatus::Fulfilling {
            return false;
        }
        self.status = ProposalStatus::Completed;
        true
    }

    /// Rejects the proposal, if `rejector` is among `targets` and the
    /// proposal is still open (§4.6: only an addressed participant may
    /// reject; first reject wins).
    pub fn reject(&mut self, rejector: ParticipantId) -> bool {
        if self.status != ProposalStatus::Open || !self.targets.contains(&rejector) {
            return false;
        }
        self.status = ProposalStatus::Rejected;
        true
    }

    /// Withdraws the proposal, if `withdrawer` is the original proposer
    /// (§4.6 scenario D: unauthorized withdrawal is ignored).
    pub fn withdraw(&mut self, withdrawer: ParticipantId) -> bool {
        if self.status != ProposalStatus::Open || withdrawer != self.proposer {
            return false;
        }
        self.status = ProposalStatus::Withdrawn;
        true
    }
}

/// What kind of client-side request a [`PendingRequest`] is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    /// An `mcp/request` awaiting an `mcp/response`.
    Request,
    /// An `mcp/proposal` awaiting fulfillment or rejection.
    Proposal,
}

/// Client-side bookkeeping for one outstanding request or proposal (§3),
/// held by the Participant Runtime rather than the gateway.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    id: EnvelopeId,
    kind_sent: PendingKind,
    proposer_id: ParticipantId,
    correlation_targets: HashSet<EnvelopeId>,
    fulfillment_id: Option<EnvelopeId>,
}

impl PendingRequest {
    /// Records a new pending request/proposal sent by `proposer_id`.
    #[must_use]
    pub fn new(id: EnvelopeId, kind_sent: PendingKind, proposer_id: ParticipantId) -> Self {
        Self {
            id,
            kind_sent,
            proposer_id,
            correlation_targets: HashSet::from([id]),
            fulfillment_id: None,
        }
    }

    /// The id of the original `mcp/request`/`mcp/proposal` envelope.
    #[must_use]
    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    /// Whether this pending entry is a request or a proposal.
    #[must_use]
    pub fn kind_sent(&self) -> PendingKind {
        self.kind_sent
    }

    /// The participant awaiting resolution.
    #[must_use]
    pub fn proposer_id(&self) -> ParticipantId {
        self.proposer_id
    }

    /// Whether `candidate`'s correlation ids overlap this pending entry's
    /// tracked targets (the resolution test in §4.6's correlation rule).
    #[must_use]
    pub fn resolved_by(&self, correlation_ids: &[EnvelopeId]) -> bool {
        correlation_ids
            .iter()
            .any(|id| self.correlation_targets.contains(id))
    }

    /// Links a proposal's fulfillment request id so a later response
    /// correlated to it also resolves this pending proposal (§4.6).
    pub fn link_fulfillment(&mut self, fulfillment_request_id: EnvelopeId) {
        self.fulfillment_id = Some(fulfillment_request_id);
        self.correlation_targets.insert(fulfillment_request_id);
    }

    /// The linked fulfillment request id, if any.
    #[must_use]
    pub fn fulfillment_id(&self) -> Option<EnvelopeId> {
        self.fulfillment_id
    }
}
