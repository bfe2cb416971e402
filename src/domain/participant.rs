//! The Participant Record (§3): per-space presence, capabilities, and
//! context-usage accounting for one connected participant.

use crate::domain::capability::Capability;
use crate::domain::primitives::{EnvelopeId, GatewayTimestamp, ParticipantId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Presence state machine (§3): `joining -> active -> {paused, leaving}`,
/// with `paused -> active` on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    /// Connected but the join handshake has not completed.
    Joining,
    /// Fully participating in the space.
    Active,
    /// Temporarily not receiving most envelope kinds.
    Paused,
    /// Tearing down; no further envelopes will be delivered.
    Leaving,
}

impl std::fmt::Display for PresenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Joining => "joining",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Leaving => "leaving",
        };
        f.write_str(label)
    }
}

impl PresenceState {
    /// Whether `self -> next` is a legal presence transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Joining, Self::Active)
                | (Self::Active, Self::Paused)
                | (Self::Active, Self::Leaving)
                | (Self::Paused, Self::Active)
                | (Self::Paused, Self::Leaving)
        )
    }
}

/// Running token/message usage against a reasoning context (§4.8).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUsage {
    /// Tokens consumed so far.
    pub tokens: u64,
    /// Messages exchanged so far.
    pub messages: u64,
}

impl ContextUsage {
    /// Records additional usage.
    pub fn record(&mut self, tokens: u64, messages: u64) {
        self.tokens = self.tokens.saturating_add(tokens);
        self.messages = self.messages.saturating_add(messages);
    }

    /// Whether usage has crossed `soft_limit_tokens` (§4.8's proactive
    /// `participant/status` threshold).
    #[must_use]
    pub fn crosses_soft_limit(&self, soft_limit_tokens: u64) -> bool {
        self.tokens >= soft_limit_tokens
    }
}

/// The per-space record of one connected participant (§3).
#[derive(Debug, Clone)]
pub struct ParticipantRecord {
    id: ParticipantId,
    capabilities: Vec<Capability>,
    presence_state: PresenceState,
    pause_until: Option<GatewayTimestamp>,
    pause_allow_list: HashSet<String>,
    context_usage: ContextUsage,
    pending_status_request_ids: HashSet<EnvelopeId>,
}

impl ParticipantRecord {
    /// Creates a participant record in the `joining` state.
    #[must_use]
    pub fn new(id: ParticipantId, capabilities: Vec<Capability>) -> Self {
        Self {
            id,
            capabilities,
            presence_state: PresenceState::Joining,
            pause_until: None,
            pause_allow_list: HashSet::new(),
            context_usage: ContextUsage::default(),
            pending_status_request_ids: HashSet::new(),
        }
    }

    /// The participant id.
    #[must_use]
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// The participant's ordered capability list.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// The current presence state.
    #[must_use]
    pub fn presence_state(&self) -> PresenceState {
        self.presence_state
    }

    /// Attempts a presence transition, returning whether it was legal and
    /// applied.
    pub fn transition_to(&mut self, next: PresenceState) -> bool {
        if self.presence_state.can_transition_to(next) {
            self.presence_state = next;
            true
        } else {
            false
        }
    }

    /// Marks the participant paused, with an optional deadline and a set of
    /// kinds still deliverable while paused (§4.9).
    pub fn pause(&mut self, until: Option<GatewayTimestamp>, allow_list: HashSet<String>) -> bool {
        if !self.transition_to(PresenceState::Paused) {
            return false;
        }
        self.pause_until = until;
        self.pause_allow_list = allow_list;
        true
    }

    /// Resumes an active participant, clearing pause state.
    pub fn resume(&mut self) -> bool {
        let ok = self.transition_to(PresenceState::Active);
        if ok {
            self.pause_until = None;
            self.pause_allow_list.clear();
        }
        ok
    }

    /// The pause deadline, if any.
    #[must_use]
    pub fn pause_until(&self) -> Option<GatewayTimestamp> {
        self.pause_until
    }

    /// Whether `kind` bypasses the pause queue while this participant is
    /// paused.
    #[must_use]
    pub fn deliverable_while_paused(&self, kind: &str) -> bool {
        self.pause_allow_list.contains(kind)
    }

    /// The running context-usage counters.
    #[must_use]
    pub fn context_usage(&self) -> ContextUsage {
        self.context_usage
    }

    /// Records additional context usage.
    pub fn record_context_usage(&mut self, tokens: u64, messages: u64) {
        self.context_usage.record(tokens, messages);
    }

    /// Records an outstanding `participant/request-status` id awaiting a
    /// `participant/status` reply.
    pub fn record_pending_status_request(&mut self, id: EnvelopeId) {
        self.pending_status_request_ids.insert(id);
    }

    /// Clears a previously recorded pending status request id.
    pub fn clear_pending_status_request(&mut self, id: EnvelopeId) -> bool {
        self.pending_status_request_ids.remove(&id)
    }

    /// Whether any status request is currently outstanding.
    #[must_use]
    pub fn has_pending_status_request(&self) -> bool {
        !self.pending_status_request_ids.is_empty()
    }

    /// Replaces the capability list wholesale, as happens when a fresh
    /// `system/welcome` re-issues grants (§3).
    pub fn reissue_capabilities(&mut self, capabilities: Vec<Capability>) {
        self.capabilities = capabilities;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joining_can_only_become_active() {
        assert!(PresenceState::Joining.can_transition_to(PresenceState::Active));
        assert!(!PresenceState::Joining.can_transition_to(PresenceState::Paused));
    }

    #[test]
    fn pause_then_resume_round_trips() {
        let mut record = ParticipantRecord::new(ParticipantId::generate(), vec![]);
        assert!(record.transition_to(PresenceState::Active));
        assert!(record.pause(None, HashSet::from(["system/error".to_string()])));
        assert_eq!(record.presence_state(), PresenceState::Paused);
        assert!(record.deliverable_while_paused("system/error"));
        assert!(record.resume());
        assert_eq!(record.presence_state(), PresenceState::Active);
        assert!(!record.deliverable_while_paused("system/error"));
    }

    #[test]
    fn context_usage_crosses_soft_limit() {
        let mut usage = ContextUsage::default();
        usage.record(900, 1);
        assert!(!usage.crosses_soft_limit(1_000));
        usage.record(200, 1);
        assert!(usage.crosses_soft_limit(1_000));
    }
}
