//! Structured observability events (§SPEC_FULL ambient stack): the subset
//! of gateway activity worth recording as a typed event rather than a free
//! `tracing` log line — in particular the security events §4.6 calls out
//! explicitly ("a valid... withdrawal... mismatched withdrawals are
//! dropped and logged as a security event").
//!
//! Each event carries an id, a timestamp, a tagged event variant, and an
//! optional trace id — the MEW protocol's own set of noteworthy
//! occurrences.

use crate::domain::{EnvelopeId, GatewayTimestamp, ParticipantId, ProposalId};
use serde::{Deserialize, Serialize};

/// A single noteworthy gateway occurrence, emitted alongside (not instead
/// of) the `tracing` spans each subsystem already logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SecurityEventKind {
    /// A `mcp/withdraw` arrived whose `from` did not match the proposal's
    /// original proposer (§4.6: "verify `withdraw.from == proposal.from`;
    /// mismatched withdrawals are dropped and logged as a security
    /// event").
    UnauthorizedWithdrawal {
        /// The proposal the withdrawal targeted.
        proposal: ProposalId,
        /// The proposal's actual owner.
        proposer: ParticipantId,
        /// Who attempted the withdrawal.
        attempted_by: ParticipantId,
    },
    /// A control-plane envelope (`participant/pause`, `/shutdown`, ...)
    /// targeted a participant other than the sender without the sender
    /// holding an authorizing capability for that kind.
    UnauthorizedControlAttempt {
        /// The control-plane kind attempted (`participant/pause`, etc).
        kind: String,
        /// Who attempted it.
        attempted_by: ParticipantId,
        /// The intended target.
        target: ParticipantId,
    },
    /// A connection was closed after repeated malformed envelopes past the
    /// rate-limited disconnect threshold (§4.1, §7).
    RepeatedMalformedEnvelopes {
        /// The offending connection's participant id.
        participant: ParticipantId,
        /// How many malformed envelopes were observed before disconnect.
        count: u32,
    },
}

/// A structured security/audit event, timestamped at observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// When the gateway observed this event.
    pub timestamp: GatewayTimestamp,
    /// The event itself.
    pub kind: SecurityEventKind,
    /// The envelope id that triggered this event, if any.
    pub envelope_id: Option<EnvelopeId>,
}

impl SecurityEvent {
    /// Builds and immediately emits a [`tracing::warn!`] span for `kind`,
    /// returning the structured event for callers that also want to sink
    /// it elsewhere (an audit log, a metrics counter).
    #[must_use]
    pub fn emit(kind: SecurityEventKind, envelope_id: Option<EnvelopeId>) -> Self {
        let event = Self {
            timestamp: GatewayTimestamp::now(),
            kind,
            envelope_id,
        };
        match &event.kind {
            SecurityEventKind::UnauthorizedWithdrawal {
                proposal,
                proposer,
                attempted_by,
            } => {
                tracing::warn!(
                    %proposal,
                    %proposer,
                    %attempted_by,
                    "unauthorized withdrawal attempt rejected"
                );
            }
            SecurityEventKind::UnauthorizedControlAttempt {
                kind,
                attempted_by,
                target,
            } => {
                tracing::warn!(%kind, %attempted_by, %target, "unauthorized control-plane attempt rejected");
            }
            SecurityEventKind::RepeatedMalformedEnvelopes { participant, count } => {
                tracing::warn!(%participant, count, "connection closed for repeated malformed envelopes");
            }
        }
        event
    }
}
