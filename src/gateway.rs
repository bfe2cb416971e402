//! The Space runtime (§4.4, §4): binds one space's registry, router,
//! proposal engine, stream manager, and control plane together behind the
//! join protocol and the per-envelope dispatch pipeline.
//!
//! A composition root bundling a registry, router, and correlation table
//! behind one `Arc`-shared struct, generalized here to the proposal engine,
//! stream manager, and control plane this protocol adds on top.

use crate::config::GatewayConfig;
use crate::control_plane::{ControlPlane, ControlPlaneError, RuntimeHook};
use crate::domain::{
    Capability, Envelope, EnvelopeParams, GatewayTimestamp, Kind, ParticipantId, PresenceState,
    ProposalId, Space, SpaceId, StreamDirection, StreamId,
};
use crate::error::GatewayError;
use crate::metrics::MetricsCollector;
use crate::proposal_engine::{ProposalEngine, ProposalEngineImpl};
use crate::registry::{ParticipantRegistry, ParticipantRegistryImpl};
use crate::router::{Router, RouteReport, RouterImpl};
use crate::stream_manager::{StreamManager, StreamManagerImpl};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// The sender id stamped on gateway-originated `system/*` and acknowledgment
/// envelopes: the nil UUID, never assignable to a real connection.
fn system_sender() -> ParticipantId {
    ParticipantId::from(Uuid::nil())
}

fn system_envelope(to: Option<Vec<ParticipantId>>, kind: &str, payload: Value) -> Result<Envelope, GatewayError> {
    system_envelope_correlated(to, kind, None, payload)
}

fn system_envelope_correlated(
    to: Option<Vec<ParticipantId>>,
    kind: &str,
    correlation_id: Option<Vec<crate::domain::EnvelopeId>>,
    payload: Value,
) -> Result<Envelope, GatewayError> {
    Envelope::try_new_validated(EnvelopeParams {
        from: system_sender(),
        to,
        kind: Kind::try_new(kind)?,
        correlation_id,
        context: None,
        payload,
    })
}

fn capabilities_json(capabilities: &[Capability]) -> Value {
    serde_json::to_value(capabilities).unwrap_or_else(|_| Value::Array(Vec::new()))
}

fn parse_deadline(payload: &Value) -> Option<GatewayTimestamp> {
    payload
        .get("until")
        .and_then(Value::as_str)
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| GatewayTimestamp::new(dt.with_timezone(&chrono::Utc)))
}

fn parse_allow_list(payload: &Value) -> HashSet<String> {
    payload
        .get("allow_list")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn parse_stream_id(payload: &Value) -> Option<StreamId> {
    payload.get("stream_id")?.as_str()?.parse::<Uuid>().ok().map(StreamId::from)
}

fn first_target(envelope: &Envelope) -> Option<ParticipantId> {
    envelope.to().and_then(<[ParticipantId]>::first).copied()
}

/// What the join protocol hands back for the connection layer to deliver: a
/// direct `system/welcome` to the new connection, and a `system/presence`
/// broadcast to the rest of the space (§4.4).
pub struct JoinOutcome {
    /// Sent only to the joining connection.
    pub welcome: Envelope,
    /// Broadcast to every other active participant.
    pub presence: Envelope,
}

/// One MEW space's full runtime: the registry, router, proposal engine,
/// stream manager, and control plane bound together, plus the dispatch
/// pipeline that drives them from inbound envelopes (§4.4, §4).
pub struct SpaceRuntime {
    space: Space,
    config: Arc<GatewayConfig>,
    registry: Arc<dyn ParticipantRegistry>,
    router: Arc<dyn Router>,
    proposals: Arc<dyn ProposalEngine>,
    streams: Arc<dyn StreamManager>,
    control: Arc<ControlPlane>,
    metrics: Arc<dyn MetricsCollector>,
}

impl SpaceRuntime {
    /// Builds a fresh runtime for `space_id`, with empty registry/router/
    /// proposal/stream state.
    #[must_use]
    pub fn new(space_id: SpaceId, config: Arc<GatewayConfig>, metrics: Arc<dyn MetricsCollector>) -> Self {
        let registry: Arc<dyn ParticipantRegistry> = Arc::new(ParticipantRegistryImpl::new());
        let router: Arc<dyn Router> = Arc::new(RouterImpl::new(Arc::clone(&registry), config.pause_queue_size));
        let control = Arc::new(ControlPlane::new(Arc::clone(&registry)));
        Self {
            space: Space::new(space_id),
            config,
            registry,
            router,
            proposals: Arc::new(ProposalEngineImpl::new()),
            streams: Arc::new(StreamManagerImpl::new()),
            control,
            metrics,
        }
    }

    /// The space this runtime serves.
    #[must_use]
    pub fn space_id(&self) -> &SpaceId {
        self.space.space_id()
    }

    /// The bound registry, for the connection layer to inspect presence.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn ParticipantRegistry> {
        &self.registry
    }

    /// The bound router, for the connection layer to register/deregister
    /// per-connection send queues.
    #[must_use]
    pub fn router(&self) -> &Arc<dyn Router> {
        &self.router
    }

    /// The bound control plane, for a connection's restart-complete signal.
    #[must_use]
    pub fn control_plane(&self) -> &Arc<ControlPlane> {
        &self.control
    }

    /// The bound proposal engine, for observers inspecting proposal state
    /// (tests, status reporting).
    #[must_use]
    pub fn proposals(&self) -> &Arc<dyn ProposalEngine> {
        &self.proposals
    }

    /// The bound stream manager, for observers inspecting stream state.
    #[must_use]
    pub fn streams(&self) -> &Arc<dyn StreamManager> {
        &self.streams
    }

    /// The runtime's configuration, shared with the connection layer for
    /// queue/timeout settings.
    #[must_use]
    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    /// Registers a newly authenticated connection, transitions it to
    /// active, and builds the `system/welcome`/`system/presence` envelopes
    /// the caller must deliver (§4.4).
    ///
    /// # Errors
    /// Returns [`GatewayError::Conflict`] if `id` is already joined.
    pub async fn join(&self, id: ParticipantId, capabilities: Vec<Capability>) -> Result<JoinOutcome, GatewayError> {
        if self.registry.get(id).await.is_ok() {
            return Err(GatewayError::Conflict {
                reason: format!("{id} is already joined"),
            });
        }

        self.registry
            .register(id, capabilities.clone())
            .await
            .map_err(|error| GatewayError::Conflict { reason: error.to_string() })?;
        self.registry
            .transition_presence(id, PresenceState::Active)
            .await
            .map_err(|error| GatewayError::Internal { detail: error.to_string() })?;
        self.metrics.record_participant_joined();

        let participants: Vec<Value> = self
            .registry
            .list_active()
            .await
            .into_iter()
            .map(|record| {
                json!({
                    "id": record.id().to_string(),
                    "capabilities": capabilities_json(record.capabilities()),
                })
            })
            .collect();

        let welcome = system_envelope(
            Some(vec![id]),
            "system/welcome",
            json!({
                "you": { "id": id.to_string(), "capabilities": capabilities_json(&capabilities) },
                "participants": participants,
            }),
        )?;
        let presence = system_envelope(
            None,
            "system/presence",
            json!({ "event": "join", "participant": id.to_string() }),
        )?;

        info!(participant = %id, space = %self.space.space_id(), "participant joined");
        Ok(JoinOutcome { welcome, presence })
    }

    /// Tears down a disconnecting participant: broadcasts `system/presence
    /// leave`, deregisters its connection and registry record (§5).
    pub async fn leave(&self, id: ParticipantId) {
        let _ = self.registry.transition_presence(id, PresenceState::Leaving).await;
        let recipients = self.other_active_ids(id).await;
        self.router.deregister_connection(id).await;
        if let Ok(presence) = system_envelope(None, "system/presence", json!({ "event": "leave", "participant": id.to_string() })) {
            self.router.deliver_system(recipients, presence).await;
        }
        let _ = self.registry.deregister(id).await;
        self.metrics.record_participant_left();
        info!(participant = %id, "participant left");
    }

    async fn other_active_ids(&self, exclude: ParticipantId) -> Vec<ParticipantId> {
        self.registry
            .list_active()
            .await
            .into_iter()
            .map(|record| record.id())
            .filter(|id| *id != exclude)
            .collect()
    }

    /// Routes a validated inbound envelope and drives any proposal/stream/
    /// control-plane bookkeeping implied by its kind (§4, §4.6, §4.7, §4.9).
    ///
    /// # Errors
    /// Propagates the [`GatewayError`] routing itself raised. Kind-specific
    /// hook failures are logged rather than raised — the envelope has
    /// already been delivered (or denied) by that point.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<RouteReport, GatewayError> {
        let report = self.router.route(envelope.clone()).await?;
        self.apply_kind_hooks(&envelope).await;
        Ok(report)
    }

    async fn apply_kind_hooks(&self, envelope: &Envelope) {
        match envelope.kind().as_str() {
            "mcp/proposal" => self.on_proposal_opened(envelope).await,
            "mcp/request" => self.on_request(envelope).await,
            "mcp/response" => self.on_response(envelope).await,
            "mcp/reject" => self.on_reject(envelope).await,
            "mcp/withdraw" => self.on_withdraw(envelope).await,
            "stream/request" => self.on_stream_request(envelope).await,
            "stream/data" => self.on_stream_data(envelope).await,
            "stream/close" => self.on_stream_close(envelope).await,
            "participant/pause" => self.on_pause(envelope).await,
            "participant/resume" => self.on_resume(envelope).await,
            "participant/forget" => self.on_hook(envelope, RuntimeHook::Forget).await,
            "participant/clear" => self.on_hook(envelope, RuntimeHook::Clear).await,
            "participant/restart" => self.on_restart(envelope).await,
            "participant/shutdown" => self.on_shutdown(envelope).await,
            "participant/request-status" => self.on_request_status(envelope).await,
            _ => {}
        }
    }

    async fn on_proposal_opened(&self, envelope: &Envelope) {
        let proposal_id = ProposalId::from(envelope.id().into_inner());
        let targets = match envelope.to() {
            Some(explicit) => explicit.to_vec(),
            None => self.other_active_ids(envelope.from()).await,
        };
        match self.proposals.open(proposal_id, envelope.from(), targets).await {
            Ok(()) => self.metrics.record_proposal_opened(),
            Err(error) => warn!(%error, %proposal_id, "failed to open proposal"),
        }
    }

    async fn on_request(&self, envelope: &Envelope) {
        let Some(correlated) = envelope.correlation_id() else { return };
        for &candidate in correlated {
            let proposal_id = ProposalId::from(candidate.into_inner());
            match self.proposals.claim_fulfillment(proposal_id, envelope.from(), envelope.id()).await {
                Ok(true) => {
                    info!(%proposal_id, fulfiller = %envelope.from(), "proposal fulfillment claimed");
                    self.deliver_copy_to_proposer(proposal_id, envelope).await;
                    break;
                }
                Ok(false) | Err(_) => continue,
            }
        }
    }

    async fn on_response(&self, envelope: &Envelope) {
        let Some(correlated) = envelope.correlation_id() else { return };
        for &candidate in correlated {
            if let Some(proposal_id) = self.proposals.find_by_fulfillment_request(candidate).await {
                if self.proposals.complete(proposal_id).await.is_ok() {
                    self.metrics.record_proposal_completed();
                    self.deliver_copy_to_proposer(proposal_id, envelope).await;
                }
                break;
            }
        }
    }

    /// Gives the proposal's original proposer broadcast-style visibility of
    /// a fulfillment `mcp/request` or its eventual `mcp/response` (§4.6):
    /// both are ordinarily addressed to someone else (the fulfiller's own
    /// target, then the fulfiller), so without this the proposer's
    /// connection never observes either and has nothing to resolve its
    /// pending proposal with. Skipped when the proposer is already an
    /// explicit recipient, or the envelope was already a broadcast (`to`
    /// absent), to avoid delivering a second copy.
    async fn deliver_copy_to_proposer(&self, proposal_id: ProposalId, envelope: &Envelope) {
        let Ok(proposal) = self.proposals.get(proposal_id).await else { return };
        let proposer = proposal.proposer();
        if envelope.from() == proposer {
            return;
        }
        let already_addressed = envelope.to().is_none_or(|to| to.contains(&proposer));
        if already_addressed {
            return;
        }
        self.router
            .deliver_system(vec![proposer], envelope.clone().with_to(Some(vec![proposer])))
            .await;
    }

    async fn on_reject(&self, envelope: &Envelope) {
        let Some(correlated) = envelope.correlation_id() else { return };
        for &candidate in correlated {
            let proposal_id = ProposalId::from(candidate.into_inner());
            if matches!(self.proposals.reject(proposal_id, envelope.from()).await, Ok(true)) {
                self.metrics.record_proposal_rejected();
                break;
            }
        }
    }

    async fn on_withdraw(&self, envelope: &Envelope) {
        let Some(correlated) = envelope.correlation_id() else { return };
        for &candidate in correlated {
            let proposal_id = ProposalId::from(candidate.into_inner());
            match self.proposals.withdraw(proposal_id, envelope.from()).await {
                Ok(true) => {
                    self.metrics.record_proposal_withdrawn();
                    break;
                }
                Ok(false) => {
                    if let Ok(proposal) = self.proposals.get(proposal_id).await {
                        crate::observability::SecurityEvent::emit(
                            crate::observability::SecurityEventKind::UnauthorizedWithdrawal {
                                proposal: proposal_id,
                                proposer: proposal.proposer(),
                                attempted_by: envelope.from(),
                            },
                            Some(envelope.id()),
                        );
                    }
                }
                Err(_) => {}
            }
        }
    }

    async fn on_stream_request(&self, envelope: &Envelope) {
        let payload = envelope.payload();
        let direction = match payload.get("direction").and_then(Value::as_str) {
            Some("upload") => StreamDirection::Upload,
            Some("download") => StreamDirection::Download,
            _ => StreamDirection::Bidirectional,
        };
        let peers = envelope.to().map(<[ParticipantId]>::to_vec).unwrap_or_default();
        let formats = payload
            .get("formats")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let description = payload.get("description").and_then(Value::as_str).unwrap_or("").to_string();

        let stream_id = self.streams.request(envelope.from(), direction, peers, formats, description).await;
        let _ = self.streams.open(stream_id).await;
        self.metrics.record_stream_opened();

        if let Ok(open_envelope) = system_envelope_correlated(
            Some(vec![envelope.from()]),
            "stream/open",
            Some(vec![envelope.id()]),
            json!({ "stream_id": stream_id.to_string() }),
        ) {
            self.router.deliver_system(vec![envelope.from()], open_envelope).await;
        }
    }

    /// Threads structured JSON `stream/data` chunks through the same
    /// sequence-gap tracking and idle-activity bookkeeping as binary
    /// frames (§4.7). The envelope itself was already routed by
    /// [`Self::dispatch`]; this only updates stream state.
    async fn on_stream_data(&self, envelope: &Envelope) {
        let Some(stream_id) = parse_stream_id(envelope.payload()) else { return };
        let Some(sequence) = envelope.payload().get("sequence").and_then(Value::as_u64) else { return };
        if let Err(error) = self.record_stream_data(stream_id, envelope.from(), sequence).await {
            warn!(%error, %stream_id, "failed to record stream/data chunk");
        }
    }

    async fn on_stream_close(&self, envelope: &Envelope) {
        let Some(stream_id) = parse_stream_id(envelope.payload()) else { return };
        if self.streams.close(stream_id, envelope.from()).await.is_ok() {
            info!(%stream_id, "stream closed");
        }
    }

    /// Records an inbound binary `stream/data` frame and returns the peer
    /// ids the connection layer should forward the raw bytes to (§4.7, §6).
    /// Gap detection only warns; it never tears the stream down.
    ///
    /// # Errors
    /// Propagates the stream manager's error as [`GatewayError::Conflict`].
    pub async fn record_stream_data(
        &self,
        stream_id: StreamId,
        sender: ParticipantId,
        sequence: u64,
    ) -> Result<Vec<ParticipantId>, GatewayError> {
        let outcome = self
            .streams
            .record_data(stream_id, sender, sequence)
            .await
            .map_err(|error| GatewayError::Conflict { reason: error.to_string() })?;
        if outcome.gap_detected {
            warn!(%stream_id, sequence = outcome.sequence, "stream sequence gap detected");
        }
        let session = self
            .streams
            .get(stream_id)
            .await
            .map_err(|error| GatewayError::Conflict { reason: error.to_string() })?;
        Ok(session
            .peers()
            .iter()
            .copied()
            .chain(std::iter::once(session.owner()))
            .filter(|id| *id != sender)
            .collect())
    }

    async fn on_pause(&self, envelope: &Envelope) {
        let Some(target) = first_target(envelope) else { return };
        let until = parse_deadline(envelope.payload());
        let allow_list = parse_allow_list(envelope.payload());
        match self.control.pause(envelope.from(), target, envelope.id(), until, allow_list).await {
            Ok(ack) => {
                self.router.deliver_system(vec![envelope.from()], ack).await;
            }
            Err(error) => warn!(%error, %target, "participant/pause failed"),
        }
    }

    async fn on_resume(&self, envelope: &Envelope) {
        let Some(target) = first_target(envelope) else { return };
        match self.control.resume(envelope.from(), target, envelope.id()).await {
            Ok(ack) => {
                self.router.deliver_system(vec![envelope.from()], ack).await;
                for queued in self.router.drain_pause_queue(target).await {
                    let _ = self.router.route(queued).await;
                }
            }
            Err(error) => warn!(%error, %target, "participant/resume failed"),
        }
    }

    async fn on_hook(&self, envelope: &Envelope, hook: RuntimeHook) {
        let Some(target) = first_target(envelope) else { return };
        match self.control.acknowledge_hook(envelope.from(), target, hook, envelope.id()).await {
            Ok(ack) => {
                self.router.deliver_system(vec![envelope.from()], ack).await;
            }
            Err(error) => warn!(%error, %target, ?hook, "runtime hook acknowledgment failed"),
        }
    }

    async fn on_restart(&self, envelope: &Envelope) {
        let Some(target) = first_target(envelope) else { return };
        match self.control.restart(envelope.from(), target, envelope.id()).await {
            Ok(ack) => {
                self.router.deliver_system(vec![envelope.from()], ack).await;
            }
            Err(error) => warn!(%error, %target, "participant/restart failed"),
        }
    }

    /// Marks a previously initiated restart complete, called once the
    /// target's Participant Runtime signals it has come back up (§4.9).
    ///
    /// # Errors
    /// Returns [`ControlPlaneError`] if `target` was not restarting.
    pub fn restart_ready(&self, target: ParticipantId) -> Result<(), ControlPlaneError> {
        self.control.restart_ready(target)
    }

    async fn on_shutdown(&self, envelope: &Envelope) {
        let Some(target) = first_target(envelope) else { return };
        match self.control.shutdown(envelope.from(), target, envelope.id()).await {
            Ok(ack) => {
                self.router.deliver_system(vec![envelope.from()], ack).await;
                self.router.deregister_connection(target).await;
            }
            Err(error) => warn!(%error, %target, "participant/shutdown failed"),
        }
    }

    async fn on_request_status(&self, envelope: &Envelope) {
        let Some(target) = first_target(envelope) else { return };
        if let Err(error) = self.control.request_status(target, envelope.id()).await {
            warn!(%error, %target, "participant/request-status failed");
        }
    }

    /// Force-closes every stream idle past `idle_timeout`. Driven by a
    /// periodic sweep task (§4.7).
    pub async fn sweep_idle_streams(&self, idle_timeout: Duration) {
        for stream_id in self.streams.idle_streams(idle_timeout).await {
            self.streams.terminate(stream_id).await;
            self.metrics.record_stream_idle_closed();
            warn!(%stream_id, "stream force-closed after idle timeout");
        }
    }

    /// Drops proposal bookkeeping that reached a terminal state before
    /// `older_than`, bounding memory growth. Driven by a periodic sweep
    /// task (§4.6).
    pub async fn sweep_terminal_proposals(&self, older_than: GatewayTimestamp) -> usize {
        self.proposals.sweep_terminal_before(older_than).await
    }

    /// Auto-resumes every participant whose pause deadline has elapsed,
    /// draining their pause queue back through the router (§4.9). Driven
    /// by a periodic sweep task.
    pub async fn sweep_pause_deadlines(&self) {
        let now = GatewayTimestamp::now();
        for record in self.registry.list_all().await {
            if record.presence_state() != PresenceState::Paused {
                continue;
            }
            if !record.pause_until().is_some_and(|deadline| now >= deadline) {
                continue;
            }
            if self.registry.transition_presence(record.id(), PresenceState::Active).await.is_err() {
                continue;
            }
            let _ = self.registry.update(record.id(), Box::new(|rec| { rec.resume(); })).await;
            for queued in self.router.drain_pause_queue(record.id()).await {
                let _ = self.router.route(queued).await;
            }
            info!(participant = %record.id(), "pause deadline elapsed, auto-resumed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KindPattern;
    use crate::metrics::AtomicMetricsCollector;

    fn runtime() -> SpaceRuntime {
        SpaceRuntime::new(
            SpaceId::try_new("test-space").unwrap(),
            Arc::new(GatewayConfig::testing()),
            Arc::new(AtomicMetricsCollector::new()),
        )
    }

    fn chat_capability() -> Capability {
        Capability::new(KindPattern::parse("chat").unwrap(), None)
    }

    #[tokio::test]
    async fn join_produces_welcome_and_presence() {
        let space = runtime();
        let alice = ParticipantId::generate();
        let outcome = space.join(alice, vec![chat_capability()]).await.unwrap();
        assert_eq!(outcome.welcome.kind().as_str(), "system/welcome");
        assert_eq!(outcome.presence.kind().as_str(), "system/presence");
        assert_eq!(outcome.presence.payload()["event"], "join");
    }

    #[tokio::test]
    async fn duplicate_join_is_a_conflict() {
        let space = runtime();
        let alice = ParticipantId::generate();
        space.join(alice, vec![]).await.unwrap();
        assert!(matches!(space.join(alice, vec![]).await, Err(GatewayError::Conflict { .. })));
    }

    #[tokio::test]
    async fn dispatch_denies_envelopes_without_capability() {
        let space = runtime();
        let alice = ParticipantId::generate();
        space.join(alice, vec![]).await.unwrap();

        let envelope = Envelope::try_new_validated(EnvelopeParams {
            from: alice,
            to: None,
            kind: Kind::try_new("chat").unwrap(),
            correlation_id: None,
            context: None,
            payload: json!({"text": "hi"}),
        })
        .unwrap();

        let result = space.dispatch(envelope).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn proposal_lifecycle_is_tracked_from_dispatch() {
        let space = runtime();
        let proposer = ParticipantId::generate();
        let fulfiller = ParticipantId::generate();
        let proposal_cap = Capability::new(KindPattern::parse("mcp/proposal").unwrap(), None);
        let request_cap = Capability::new(KindPattern::parse("mcp/request").unwrap(), None);
        space.join(proposer, vec![proposal_cap]).await.unwrap();
        space.join(fulfiller, vec![request_cap]).await.unwrap();

        let proposal = Envelope::try_new_validated(EnvelopeParams {
            from: proposer,
            to: Some(vec![fulfiller]),
            kind: Kind::try_new("mcp/proposal").unwrap(),
            correlation_id: None,
            context: None,
            payload: json!({"method": "tools/call"}),
        })
        .unwrap();
        let proposal_id = ProposalId::from(proposal.id().into_inner());
        space.dispatch(proposal).await.unwrap();

        let tracked = space.proposals.get(proposal_id).await.unwrap();
        assert_eq!(tracked.status(), crate::domain::ProposalStatus::Open);
    }

    #[tokio::test]
    async fn leave_deregisters_and_broadcasts() {
        let space = runtime();
        let alice = ParticipantId::generate();
        let bob = ParticipantId::generate();
        space.join(alice, vec![]).await.unwrap();
        space.join(bob, vec![]).await.unwrap();

        space.leave(alice).await;
        assert!(space.registry.get(alice).await.is_err());
    }
}
