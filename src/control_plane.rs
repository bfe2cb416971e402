//! Control Plane Handlers (§4.9): pause/resume/forget/clear/restart/
//! shutdown/status, plus the per-participant control-plane state machine
//! (`active -> paused -> active`, `active -> restarting -> active`,
//! any state `-> shutting_down`).
//!
//! Grounded in `domain/agent_lifecycle.rs`'s state-machine style
//! (`AgentLifecycleState::can_transition_to`/`valid_transitions`, a
//! `StateTransitionError` with `from`/`to` fields), applied to the simpler
//! machine §4.9 names.

use crate::domain::{Envelope, EnvelopeId, EnvelopeParams, GatewayTimestamp, Kind, ParticipantId, PresenceState};
use crate::error::{GatewayError, RegistryError};
use crate::registry::ParticipantRegistry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Control-plane lifecycle state of one participant (§4.9), independent of
/// — but coordinated with — the presence state machine in
/// [`crate::domain::participant::PresenceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    /// Normal operation.
    Active,
    /// Paused via `participant/pause`.
    Paused,
    /// A `participant/restart` is in flight.
    Restarting,
    /// A `participant/shutdown` is in flight; terminal.
    ShuttingDown,
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::ShuttingDown => "shutting_down",
        };
        f.write_str(label)
    }
}

impl ControlState {
    /// The states reachable in one legal transition from `self` (§4.9).
    #[must_use]
    pub fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Active => &[Self::Paused, Self::Restarting, Self::ShuttingDown],
            Self::Paused => &[Self::Active, Self::ShuttingDown],
            Self::Restarting => &[Self::Active, Self::ShuttingDown],
            Self::ShuttingDown => &[],
        }
    }

    /// Whether `self -> next` is legal.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Raised when a requested control-plane transition is illegal from the
/// current state.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid control-plane transition for {participant}: {from} -> {to}")]
pub struct StateTransitionError {
    /// The participant attempting the transition.
    pub participant: ParticipantId,
    /// Current state, rendered for display.
    pub from: String,
    /// Requested state, rendered for display.
    pub to: String,
}

/// Per-participant control-plane record: the lifecycle state plus the
/// pause deadline/allow-list §4.9 hands off to the router.
#[derive(Debug, Clone)]
pub struct ControlRecord {
    state: ControlState,
    pause_until: Option<GatewayTimestamp>,
    pause_allow_list: HashSet<String>,
}

impl Default for ControlRecord {
    fn default() -> Self {
        Self {
            state: ControlState::Active,
            pause_until: None,
            pause_allow_list: HashSet::new(),
        }
    }
}

impl ControlRecord {
    /// The current control-plane state.
    #[must_use]
    pub fn state(&self) -> ControlState {
        self.state
    }

    fn transition(&mut self, participant: ParticipantId, next: ControlState) -> Result<(), StateTransitionError> {
        if self.state.can_transition_to(next) {
            self.state = next;
            Ok(())
        } else {
            Err(StateTransitionError {
                participant,
                from: self.state.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Applies `participant/pause`, optionally with a deadline and an
    /// allow-list of kinds still deliverable (§4.9).
    ///
    /// # Errors
    /// Returns [`StateTransitionError`] if not currently active.
    pub fn pause(
        &mut self,
        participant: ParticipantId,
        until: Option<GatewayTimestamp>,
        allow_list: HashSet<String>,
    ) -> Result<(), StateTransitionError> {
        self.transition(participant, ControlState::Paused)?;
        self.pause_until = until;
        self.pause_allow_list = allow_list;
        Ok(())
    }

    /// Applies `participant/resume`, clearing pause state.
    ///
    /// # Errors
    /// Returns [`StateTransitionError`] if not currently paused.
    pub fn resume(&mut self, participant: ParticipantId) -> Result<(), StateTransitionError> {
        self.transition(participant, ControlState::Active)?;
        self.pause_until = None;
        self.pause_allow_list.clear();
        Ok(())
    }

    /// Whether a pause deadline has elapsed as of `now`, for the gateway's
    /// pause-sweep timer to auto-resume (§4.9's `pause_until` deadline).
    #[must_use]
    pub fn pause_deadline_elapsed(&self, now: GatewayTimestamp) -> bool {
        self.pause_until.is_some_and(|deadline| now >= deadline)
    }

    /// Begins a restart.
    ///
    /// # Errors
    /// Returns [`StateTransitionError`] if not currently active.
    pub fn begin_restart(&mut self, participant: ParticipantId) -> Result<(), StateTransitionError> {
        self.transition(participant, ControlState::Restarting)
    }

    /// Completes a restart, returning to active.
    ///
    /// # Errors
    /// Returns [`StateTransitionError`] if not currently restarting.
    pub fn restart_ready(&mut self, participant: ParticipantId) -> Result<(), StateTransitionError> {
        self.transition(participant, ControlState::Active)
    }

    /// Begins shutdown, the only transition legal from every non-terminal
    /// state (§4.9: "any state `--shutdown--> shutting_down`").
    ///
    /// # Errors
    /// Returns [`StateTransitionError`] if already shutting down.
    pub fn begin_shutdown(&mut self, participant: ParticipantId) -> Result<(), StateTransitionError> {
        self.transition(participant, ControlState::ShuttingDown)
    }
}

/// What the control plane asks the target Participant Runtime to do,
/// beyond the state-machine transition itself (§4.9: "invoke the
/// corresponding hooks on the target runtime").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeHook {
    /// Drop the oldest tracked conversation/tool-cache entries.
    Forget,
    /// Clear all local state, starting fresh.
    Clear,
}

/// Errors the control plane surfaces when a `participant/*` control
/// envelope names a target outside this space or requests an illegal
/// transition.
#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    /// The target participant is not registered in this space.
    #[error(transparent)]
    NotFound(#[from] RegistryError),
    /// The requested transition is not legal from the target's current state.
    #[error(transparent)]
    InvalidTransition(#[from] StateTransitionError),
}

/// Tracks an outstanding `participant/request-status` so the eventual
/// `participant/status` reply can be correlated back to it.
#[derive(Debug, Clone, Copy)]
pub struct StatusRequest {
    /// The envelope id of the `participant/request-status` that triggered this.
    pub request_id: EnvelopeId,
    /// Who asked.
    pub requested_by: ParticipantId,
}

/// Drives `participant/pause|resume|forget|clear|restart|shutdown|status|
/// request-status` envelopes against a space's [`ParticipantRegistry`],
/// tracking the `restarting`/`shutting_down` states the presence state
/// machine in [`crate::domain::participant`] doesn't model, and producing
/// the acknowledgment/status envelopes to route back (§4.9).
pub struct ControlPlane {
    registry: Arc<dyn ParticipantRegistry>,
    control_states: DashMap<ParticipantId, ControlRecord>,
}

impl ControlPlane {
    /// Creates a control plane bound to `registry`.
    #[must_use]
    pub fn new(registry: Arc<dyn ParticipantRegistry>) -> Self {
        Self {
            registry,
            control_states: DashMap::new(),
        }
    }

    fn record_for(&self, id: ParticipantId) -> dashmap::mapref::one::RefMut<'_, ParticipantId, ControlRecord> {
        self.control_states.entry(id).or_default()
    }

    fn ack(from: ParticipantId, to: ParticipantId, kind: &str, request_id: EnvelopeId) -> Result<Envelope, GatewayError> {
        Envelope::try_new_validated(EnvelopeParams {
            from,
            to: Some(vec![to]),
            kind: Kind::try_new(kind)?,
            correlation_id: Some(vec![request_id]),
            context: None,
            payload: json!({ "ok": true }),
        })
    }

    /// Pauses `target` on behalf of `requested_by`, also driving the
    /// registry's presence state (§4.9, §3).
    ///
    /// # Errors
    /// Returns [`ControlPlaneError`] if `target` is unknown or already
    /// paused/shutting down.
    pub async fn pause(
        &self,
        requested_by: ParticipantId,
        target: ParticipantId,
        request_id: EnvelopeId,
        until: Option<GatewayTimestamp>,
        allow_list: HashSet<String>,
    ) -> Result<Envelope, ControlPlaneError> {
        self.registry.get(target).await?;
        self.record_for(target).pause(target, until, allow_list.clone())?;
        self.registry
            .update(
                target,
                Box::new(move |record| {
                    record.pause(until, allow_list);
                }),
            )
            .await?;
        info!(%requested_by, %target, "participant paused");
        Self::ack(requested_by, target, "participant/status", request_id).map_err(|_| {
            ControlPlaneError::NotFound(RegistryError::NotFound { participant: target })
        })
    }

    /// Resumes `target`, clearing pause state on both the control-plane
    /// record and the registry's presence.
    ///
    /// # Errors
    /// Returns [`ControlPlaneError`] if `target` is unknown or not paused.
    pub async fn resume(
        &self,
        requested_by: ParticipantId,
        target: ParticipantId,
        request_id: EnvelopeId,
    ) -> Result<Envelope, ControlPlaneError> {
        self.registry.get(target).await?;
        self.record_for(target).resume(target)?;
        self.registry
            .update(target, Box::new(|record| { record.resume(); }))
            .await?;
        info!(%requested_by, %target, "participant resumed");
        Self::ack(requested_by, target, "participant/status", request_id).map_err(|_| {
            ControlPlaneError::NotFound(RegistryError::NotFound { participant: target })
        })
    }

    /// Acknowledges a `participant/forget` or `participant/clear`, neither
    /// of which changes control-plane or presence state — the hook itself
    /// runs on the target's own Participant Runtime (§4.8, §4.9); the
    /// gateway's role is routing the request through and acknowledging it.
    ///
    /// # Errors
    /// Returns [`ControlPlaneError`] if `target` is unknown.
    pub async fn acknowledge_hook(
        &self,
        requested_by: ParticipantId,
        target: ParticipantId,
        hook: RuntimeHook,
        request_id: EnvelopeId,
    ) -> Result<Envelope, ControlPlaneError> {
        self.registry.get(target).await?;
        info!(%requested_by, %target, ?hook, "acknowledged runtime hook");
        Self::ack(requested_by, target, "participant/status", request_id).map_err(|_| {
            ControlPlaneError::NotFound(RegistryError::NotFound { participant: target })
        })
    }

    /// Begins a restart, transitioning the control state to `restarting`
    /// (§4.9: `active --restart--> restarting --ready--> active`).
    ///
    /// # Errors
    /// Returns [`ControlPlaneError`] if `target` is unknown or not active.
    pub async fn restart(
        &self,
        requested_by: ParticipantId,
        target: ParticipantId,
        request_id: EnvelopeId,
    ) -> Result<Envelope, ControlPlaneError> {
        self.registry.get(target).await?;
        self.record_for(target).begin_restart(target)?;
        info!(%requested_by, %target, "participant restart initiated");
        Self::ack(requested_by, target, "participant/status", request_id).map_err(|_| {
            ControlPlaneError::NotFound(RegistryError::NotFound { participant: target })
        })
    }

    /// Marks a restart complete, returning `target` to `active`.
    ///
    /// # Errors
    /// Returns [`ControlPlaneError`] if `target` was not restarting.
    pub fn restart_ready(&self, target: ParticipantId) -> Result<(), ControlPlaneError> {
        self.record_for(target).restart_ready(target)?;
        Ok(())
    }

    /// Begins shutdown, reachable from any non-terminal state, and
    /// transitions presence to `leaving` so no further envelopes are
    /// delivered (§4.9, §3).
    ///
    /// # Errors
    /// Returns [`ControlPlaneError`] if `target` is unknown or already
    /// shutting down.
    pub async fn shutdown(
        &self,
        requested_by: ParticipantId,
        target: ParticipantId,
        request_id: EnvelopeId,
    ) -> Result<Envelope, ControlPlaneError> {
        self.registry.get(target).await?;
        self.record_for(target).begin_shutdown(target)?;
        let current = self.registry.get(target).await?.presence_state();
        if current != PresenceState::Leaving {
            let _ = self.registry.transition_presence(target, PresenceState::Leaving).await;
        }
        info!(%requested_by, %target, "participant shutdown initiated");
        Self::ack(requested_by, target, "participant/status", request_id).map_err(|_| {
            ControlPlaneError::NotFound(RegistryError::NotFound { participant: target })
        })
    }

    /// Records that `target` received `participant/request-status` and
    /// should broadcast a `participant/status` (§4.9). The caller (the
    /// router) is responsible for delivering the request to the target and,
    /// once it replies, for clearing the record via the registry's own
    /// `clear_pending_status_request`.
    pub async fn request_status(&self, target: ParticipantId, request_id: EnvelopeId) -> Result<(), ControlPlaneError> {
        self.registry
            .update(
                target,
                Box::new(move |record| record.record_pending_status_request(request_id)),
            )
            .await?;
        Ok(())
    }

    /// The control-plane state currently recorded for `target`, defaulting
    /// to `active` if it has no history of pause/restart/shutdown.
    #[must_use]
    pub fn state_of(&self, target: ParticipantId) -> ControlState {
        self.control_states
            .get(&target)
            .map_or(ControlState::Active, |entry| entry.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParticipantRegistryImpl;

    #[test]
    fn active_can_pause_restart_or_shutdown() {
        let state = ControlState::Active;
        assert!(state.can_transition_to(ControlState::Paused));
        assert!(state.can_transition_to(ControlState::Restarting));
        assert!(state.can_transition_to(ControlState::ShuttingDown));
        assert!(!state.can_transition_to(ControlState::Active));
    }

    #[test]
    fn shutting_down_is_terminal() {
        assert!(ControlState::ShuttingDown.valid_transitions().is_empty());
    }

    #[test]
    fn pause_then_resume_round_trips() {
        let participant = ParticipantId::generate();
        let mut record = ControlRecord::default();
        record
            .pause(participant, None, HashSet::from(["system/error".to_string()]))
            .unwrap();
        assert_eq!(record.state(), ControlState::Paused);
        record.resume(participant).unwrap();
        assert_eq!(record.state(), ControlState::Active);
    }

    #[test]
    fn resume_fails_when_not_paused() {
        let participant = ParticipantId::generate();
        let mut record = ControlRecord::default();
        assert!(record.resume(participant).is_err());
    }

    #[test]
    fn shutdown_is_reachable_from_paused_and_restarting() {
        let participant = ParticipantId::generate();
        let mut record = ControlRecord::default();
        record.pause(participant, None, HashSet::new()).unwrap();
        record.begin_shutdown(participant).unwrap();
        assert_eq!(record.state(), ControlState::ShuttingDown);
        assert!(record.resume(participant).is_err());
    }

    #[test]
    fn pause_deadline_elapsed_detects_expiry() {
        let participant = ParticipantId::generate();
        let mut record = ControlRecord::default();
        let deadline = GatewayTimestamp::now();
        record.pause(participant, Some(deadline), HashSet::new()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(record.pause_deadline_elapsed(GatewayTimestamp::now()));
    }

    async fn registry_with_active_participant() -> (Arc<dyn ParticipantRegistry>, ParticipantId) {
        let registry: Arc<dyn ParticipantRegistry> = Arc::new(ParticipantRegistryImpl::new());
        let id = ParticipantId::generate();
        registry.register(id, vec![]).await.unwrap();
        registry.transition_presence(id, PresenceState::Active).await.unwrap();
        (registry, id)
    }

    #[tokio::test]
    async fn control_plane_pause_then_resume_updates_registry_presence() {
        let (registry, target) = registry_with_active_participant().await;
        let plane = ControlPlane::new(Arc::clone(&registry));
        let requester = ParticipantId::generate();

        plane
            .pause(requester, target, EnvelopeId::generate(), None, HashSet::new())
            .await
            .unwrap();
        assert_eq!(registry.get(target).await.unwrap().presence_state(), PresenceState::Paused);
        assert_eq!(plane.state_of(target), ControlState::Paused);

        plane.resume(requester, target, EnvelopeId::generate()).await.unwrap();
        assert_eq!(registry.get(target).await.unwrap().presence_state(), PresenceState::Active);
        assert_eq!(plane.state_of(target), ControlState::Active);
    }

    #[tokio::test]
    async fn control_plane_shutdown_moves_presence_to_leaving() {
        let (registry, target) = registry_with_active_participant().await;
        let plane = ControlPlane::new(Arc::clone(&registry));

        plane
            .shutdown(ParticipantId::generate(), target, EnvelopeId::generate())
            .await
            .unwrap();
        assert_eq!(registry.get(target).await.unwrap().presence_state(), PresenceState::Leaving);
        assert_eq!(plane.state_of(target), ControlState::ShuttingDown);
    }

    #[tokio::test]
    async fn control_plane_rejects_unknown_target() {
        let registry: Arc<dyn ParticipantRegistry> = Arc::new(ParticipantRegistryImpl::new());
        let plane = ControlPlane::new(registry);
        let result = plane
            .resume(ParticipantId::generate(), ParticipantId::generate(), EnvelopeId::generate())
            .await;
        assert!(matches!(result, Err(ControlPlaneError::NotFound(_))));
    }
}
