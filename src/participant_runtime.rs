//! The Participant Runtime, client-side (§4.8): the capability-aware send
//! API, MCP request/proposal dispatch, a discovered-tools cache with
//! staggered refresh, and context-usage tracking with soft-threshold
//! status publishing.
//!
//! This is the one module in the core that runs inside a participant's own
//! process rather than the gateway's — it exercises the same
//! [`crate::codec`] and [`crate::capability_matcher`] locally that the
//! gateway applies to its inbound envelopes, so a capability violation is
//! caught before a single byte crosses the wire.
//!
//! The tool cache reuses the same `DashMap`-keyed-aggregate-with-sweep shape
//! as the rest of this crate; request/response matching goes through
//! [`crate::correlation::CorrelationTable`].

use crate::capability_matcher::can_send;
use crate::correlation::{CorrelationOutcome, CorrelationTable};
use crate::domain::{
    Capability, ContextUsage, Envelope, EnvelopeParams, Kind, ParticipantId, PendingKind,
    ProposalId, RequestTimeoutMs,
};
use crate::error::RuntimeError;
use dashmap::DashMap;
use rand::Rng;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A peer's cached tool/resource listing plus when it was fetched, for the
/// discovered-tools cache (§4.8: "keyed by peer id with TTL").
#[derive(Debug, Clone)]
struct ToolCacheEntry {
    tools: Vec<Value>,
    fetched_at: Instant,
}

impl ToolCacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// A locally registered tool this participant exposes to others holding
/// `mcp/request` toward it, dispatched when an inbound `mcp/request`'s
/// `payload.method` is `tools/call` (§4.8).
pub trait ToolHandler: Send + Sync {
    /// The tool's advertised descriptor, returned from `tools/list`.
    fn descriptor(&self) -> Value;

    /// Invokes the tool, returning its MCP-shaped result or error.
    fn call(&self, params: &Value) -> Result<Value, Value>;
}

/// Runtime configuration the participant runtime needs beyond its identity
/// and capabilities (§4.8).
#[derive(Debug, Clone, Copy)]
pub struct RuntimeLimits {
    /// Default timeout applied to `mcp/request`/`mcp/proposal` dispatches.
    pub request_timeout: RequestTimeoutMs,
    /// How long a cached tool listing remains usable before refresh.
    pub tool_cache_ttl: Duration,
    /// The maximum jitter added to a presence-triggered tool refresh, to
    /// avoid every participant refreshing in lockstep (§4.8).
    pub refresh_jitter: Duration,
    /// Token budget before [`ParticipantRuntime::record_usage`] publishes a
    /// proactive `participant/status` (§4.8).
    pub soft_limit_tokens: u64,
}

/// The client-side counterpart to the gateway's router/registry/proposal
/// engine: one per connected participant process, driving outbound sends
/// and dispatching inbound envelopes addressed to it.
pub struct ParticipantRuntime {
    self_id: ParticipantId,
    capabilities: RwLock<Vec<Capability>>,
    outbound: mpsc::Sender<Envelope>,
    correlation: CorrelationTable,
    tool_cache: DashMap<ParticipantId, ToolCacheEntry>,
    local_tools: DashMap<String, Arc<dyn ToolHandler>>,
    context_tokens: AtomicU64,
    context_messages: AtomicU64,
    limits: RuntimeLimits,
}

impl ParticipantRuntime {
    /// Creates a runtime for `self_id`, sending outbound envelopes on
    /// `outbound` (the connection endpoint's inbound-to-wire channel).
    #[must_use]
    pub fn new(
        self_id: ParticipantId,
        capabilities: Vec<Capability>,
        outbound: mpsc::Sender<Envelope>,
        limits: RuntimeLimits,
    ) -> Self {
        Self {
            self_id,
            capabilities: RwLock::new(capabilities),
            outbound,
            correlation: CorrelationTable::new(limits.request_timeout),
            tool_cache: DashMap::new(),
            local_tools: DashMap::new(),
            context_tokens: AtomicU64::new(0),
            context_messages: AtomicU64::new(0),
            limits,
        }
    }

    /// Replaces the capability grant set, as happens on a fresh
    /// `system/welcome` (§3).
    pub fn reissue_capabilities(&self, capabilities: Vec<Capability>) {
        *self.capabilities.write().unwrap_or_else(std::sync::PoisonError::into_inner) = capabilities;
    }

    fn capabilities_snapshot(&self) -> Vec<Capability> {
        self.capabilities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn can_send_locally(&self, envelope: &Envelope) -> bool {
        can_send(&self.capabilities_snapshot(), envelope)
    }

    async fn send(&self, envelope: Envelope) -> Result<(), RuntimeError> {
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| RuntimeError::Disconnected)
    }

    /// Registers a locally exposed tool, made discoverable to peers via
    /// `tools/list` when this participant holds `mcp/response` (§4.8).
    pub fn register_tool(&self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.local_tools.insert(name.into(), handler);
    }

    /// Checks whether `request` (any inbound `mcp/request`, not only ones
    /// addressed to this participant) carries a `correlation_id` matching
    /// one of this runtime's own outstanding `mcp/proposal`s, and if so
    /// links it as that proposal's fulfillment request — so the eventual
    /// `mcp/response` correlated to `request` resolves the original
    /// proposal (§4.6). The gateway gives a proposer broadcast visibility
    /// into the fulfillment request even though it is addressed to the
    /// fulfiller, which is what makes this observation possible here
    /// rather than only at the gateway.
    pub fn observe_possible_fulfillment(&self, request: &Envelope) {
        let Some(correlated) = request.correlation_id() else { return };
        for &candidate in correlated {
            if self.correlation.is_pending_proposal(candidate) {
                let proposal_id = ProposalId::from(candidate.into_inner());
                if let Err(error) = self.correlation.link_fulfillment(proposal_id, request.id()) {
                    debug!(%error, %proposal_id, "fulfillment link raced with proposal resolution");
                }
                break;
            }
        }
    }

    /// Handles an inbound `mcp/request`, first linking it as a possible
    /// proposal fulfillment (see [`ParticipantRuntime::observe_possible_fulfillment`]),
    /// then — if addressed to this participant — dispatching
    /// `tools/list`/`tools/call`/`resources/list`/`resources/read` against
    /// the locally registered tool set and returning the `mcp/response`
    /// envelope to send back (§4.8).
    ///
    /// Returns `None` if this participant does not hold `mcp/response` —
    /// the caller should not synthesize a response in that case (§4.2: a
    /// response without the matching capability would itself be denied by
    /// the gateway on egress).
    #[must_use]
    pub fn handle_inbound_request(&self, request: &Envelope) -> Option<Envelope> {
        self.observe_possible_fulfillment(request);

        let method = request.payload().get("method").and_then(Value::as_str).unwrap_or("");
        let result = match method {
            "tools/list" => Ok(Value::Array(
                self.local_tools.iter().map(|entry| entry.value().descriptor()).collect(),
            )),
            "tools/call" => {
                let tool_name = request
                    .payload()
                    .get("params")
                    .and_then(|params| params.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let empty = serde_json::json!({});
                let params = request
                    .payload()
                    .get("params")
                    .and_then(|params| params.get("arguments"))
                    .unwrap_or(&empty);
                match self.local_tools.get(tool_name) {
                    Some(tool) => tool.call(params),
                    None => Err(serde_json::json!({"code": "unknown_tool", "tool": tool_name})),
                }
            }
            _ => Err(serde_json::json!({"code": "unsupported_method", "method": method})),
        };

        let payload = match result {
            Ok(value) => serde_json::json!({ "result": value }),
            Err(error) => serde_json::json!({ "error": error }),
        };

        let response = Envelope::try_new_validated(EnvelopeParams {
            from: self.self_id,
            to: Some(vec![request.from()]),
            kind: Kind::try_new("mcp/response").ok()?,
            correlation_id: Some(vec![request.id()]),
            context: request.context().cloned(),
            payload,
        })
        .ok()?;

        self.can_send_locally(&response).then_some(response)
    }

    /// Dispatches an MCP operation toward `target`: a direct `mcp/request`
    /// if this runtime holds that capability toward `target`, else an
    /// `mcp/proposal` with `target` as the sole explicit addressee if it
    /// holds that capability instead, else fails synchronously (§4.8).
    ///
    /// # Errors
    /// Returns [`RuntimeError::NoCapability`] if neither capability covers
    /// this dispatch, [`RuntimeError::Disconnected`] if the outbound
    /// channel has closed, or [`RuntimeError::TimedOut`]/
    /// [`RuntimeError::Remote`] once the wait resolves.
    pub async fn call_mcp(&self, target: ParticipantId, method: &str, params: Value) -> Result<Value, RuntimeError> {
        let payload = serde_json::json!({ "method": method, "params": params });

        let direct = self.build_probe("mcp/request", target, payload.clone());
        if direct.as_ref().is_some_and(|envelope| self.can_send_locally(envelope)) {
            let envelope = direct.unwrap();
            return self.dispatch_and_await(envelope, PendingKind::Request, None).await;
        }

        let proposal = self.build_probe("mcp/proposal", target, payload);
        if let Some(envelope) = proposal.filter(|envelope| self.can_send_locally(envelope)) {
            let proposal_id = ProposalId::from(envelope.id().into_inner());
            return self.dispatch_and_await(envelope, PendingKind::Proposal, Some(proposal_id)).await;
        }

        Err(RuntimeError::NoCapability {
            kind: format!("mcp toward {method}"),
            target,
        })
    }

    fn build_probe(&self, kind: &str, target: ParticipantId, payload: Value) -> Option<Envelope> {
        Envelope::try_new_validated(EnvelopeParams {
            from: self.self_id,
            to: Some(vec![target]),
            kind: Kind::try_new(kind).ok()?,
            correlation_id: None,
            context: None,
            payload,
        })
        .ok()
    }

    async fn dispatch_and_await(
        &self,
        envelope: Envelope,
        pending_kind: PendingKind,
        _proposal_id: Option<ProposalId>,
    ) -> Result<Value, RuntimeError> {
        let id = envelope.id();
        let receiver = self.correlation.track(id, pending_kind, self.self_id);
        self.send(envelope).await?;

        match tokio::time::timeout(self.limits.request_timeout.as_duration(), receiver).await {
            Ok(Ok(CorrelationOutcome::Result(value))) => Ok(value),
            Ok(Ok(CorrelationOutcome::Error { reason })) => Err(RuntimeError::Remote { reason }),
            Ok(Err(_)) => Err(RuntimeError::Disconnected),
            Err(_) => {
                self.correlation.cancel(id);
                Err(RuntimeError::TimedOut)
            }
        }
    }

    /// Resolves a correlation entry from an inbound `mcp/response`,
    /// including the fulfillment path of a proposal if
    /// [`ParticipantRuntime::observe_possible_fulfillment`] linked it
    /// earlier, returning whether a pending caller was actually waiting
    /// on it.
    pub fn resolve_inbound_response(&self, response: &Envelope) -> bool {
        let ids = response.correlation_id().unwrap_or_default();
        let outcome = match response.payload().get("error") {
            Some(error) => CorrelationOutcome::Error { reason: error.clone() },
            None => CorrelationOutcome::Result(
                response.payload().get("result").cloned().unwrap_or(Value::Null),
            ),
        };
        self.correlation.resolve(ids, outcome)
    }

    /// Cancels every pending `mcp/request`/`mcp/proposal` with a
    /// disconnect error (§5: disconnect bounds in-flight requests).
    pub fn fail_all_pending(&self, reason: Value) {
        self.correlation.fail_all(reason);
    }

    /// Looks up `peer`'s cached tool listing if it is still within TTL.
    #[must_use]
    pub fn cached_tools(&self, peer: ParticipantId) -> Option<Vec<Value>> {
        self.tool_cache
            .get(&peer)
            .filter(|entry| entry.is_fresh(self.limits.tool_cache_ttl))
            .map(|entry| entry.tools.clone())
    }

    /// Refreshes `peer`'s tool cache by sending `tools/list` and awaiting
    /// the response, storing the result regardless of whether a capability
    /// gap means the request never actually went out (§4.8).
    pub async fn refresh_tools(&self, peer: ParticipantId) {
        match self.call_mcp(peer, "tools/list", Value::Null).await {
            Ok(Value::Array(tools)) => {
                self.tool_cache.insert(
                    peer,
                    ToolCacheEntry {
                        tools,
                        fetched_at: Instant::now(),
                    },
                );
            }
            Ok(_) => debug!(%peer, "tools/list returned a non-array result"),
            Err(error) => warn!(%peer, %error, "tool cache refresh failed"),
        }
    }

    /// Schedules a staggered refresh of `peer`'s tool cache in response to
    /// a `system/presence join`, waiting a randomized delay up to
    /// [`RuntimeLimits::refresh_jitter`] before firing, to avoid every
    /// participant hitting a newcomer's `tools/list` at once (§4.8).
    pub fn schedule_presence_refresh(self: &Arc<Self>, peer: ParticipantId) {
        let jitter = self.limits.refresh_jitter;
        let delay = if jitter.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter.as_millis() as u64))
        };
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            runtime.refresh_tools(peer).await;
        });
    }

    /// Records additional context usage, publishing a proactive
    /// `participant/status` the first time the soft threshold is crossed
    /// (§4.8). Returns the usage snapshot after recording.
    pub async fn record_usage(&self, tokens: u64, messages: u64) -> ContextUsage {
        let previous_tokens = self.context_tokens.fetch_add(tokens, Ordering::SeqCst);
        self.context_messages.fetch_add(messages, Ordering::SeqCst);
        let usage = ContextUsage {
            tokens: previous_tokens + tokens,
            messages: self.context_messages.load(Ordering::SeqCst),
        };

        let crossed_now = usage.crosses_soft_limit(self.limits.soft_limit_tokens);
        let crossed_before = ContextUsage {
            tokens: previous_tokens,
            messages: 0,
        }
        .crosses_soft_limit(self.limits.soft_limit_tokens);

        if crossed_now && !crossed_before {
            self.publish_status(usage).await;
        }

        usage
    }

    async fn publish_status(&self, usage: ContextUsage) {
        let Ok(envelope) = Envelope::try_new_validated(EnvelopeParams {
            from: self.self_id,
            to: None,
            kind: Kind::try_new("participant/status").expect("literal kind is valid"),
            correlation_id: None,
            context: None,
            payload: serde_json::json!({
                "context_usage": {
                    "tokens": usage.tokens,
                    "messages": usage.messages,
                },
                "soft_limit_tokens": self.limits.soft_limit_tokens,
            }),
        }) else {
            return;
        };
        if self.can_send_locally(&envelope) {
            if let Err(error) = self.send(envelope).await {
                warn!(%error, "failed to publish proactive status");
            }
        } else {
            info!(self_id = %self.self_id, "crossed soft context limit but lacks participant/status capability");
        }
    }

    /// The current context-usage snapshot.
    #[must_use]
    pub fn context_usage(&self) -> ContextUsage {
        ContextUsage {
            tokens: self.context_tokens.load(Ordering::SeqCst),
            messages: self.context_messages.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KindPattern;

    fn runtime(capabilities: Vec<Capability>) -> (Arc<ParticipantRuntime>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(16);
        let runtime = Arc::new(ParticipantRuntime::new(
            ParticipantId::generate(),
            capabilities,
            tx,
            RuntimeLimits {
                request_timeout: RequestTimeoutMs::try_new(50).unwrap(),
                tool_cache_ttl: Duration::from_secs(60),
                refresh_jitter: Duration::from_millis(0),
                soft_limit_tokens: 1_000,
            },
        ));
        (runtime, rx)
    }

    #[tokio::test]
    async fn call_mcp_without_any_capability_fails_synchronously() {
        let (runtime, _rx) = runtime(vec![]);
        let target = ParticipantId::generate();
        let result = runtime.call_mcp(target, "tools/list", Value::Null).await;
        assert!(matches!(result, Err(RuntimeError::NoCapability { .. })));
    }

    #[tokio::test]
    async fn call_mcp_prefers_direct_request_and_times_out_without_reply() {
        let (runtime, mut rx) = runtime(vec![Capability::new(KindPattern::parse("mcp/request").unwrap(), None)]);
        let target = ParticipantId::generate();
        let result = runtime.call_mcp(target, "tools/list", Value::Null).await;
        assert!(matches!(result, Err(RuntimeError::TimedOut)));
        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.kind().as_str(), "mcp/request");
    }

    #[tokio::test]
    async fn call_mcp_falls_back_to_proposal_when_only_proposal_is_granted() {
        let (runtime, mut rx) = runtime(vec![Capability::new(KindPattern::parse("mcp/proposal").unwrap(), None)]);
        let target = ParticipantId::generate();
        let _ = runtime.call_mcp(target, "tools/list", Value::Null).await;
        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.kind().as_str(), "mcp/proposal");
    }

    #[tokio::test]
    async fn record_usage_publishes_status_once_on_crossing_soft_limit() {
        let (runtime, mut rx) = runtime(vec![Capability::new(KindPattern::parse("participant/status").unwrap(), None)]);
        runtime.record_usage(500, 1).await;
        assert!(rx.try_recv().is_err());

        runtime.record_usage(600, 1).await;
        let status = rx.recv().await.unwrap();
        assert_eq!(status.kind().as_str(), "participant/status");

        runtime.record_usage(10, 1).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn observing_a_broadcast_fulfillment_request_resolves_the_proposal() {
        let (runtime, mut rx) = runtime(vec![Capability::new(KindPattern::parse("mcp/proposal").unwrap(), None)]);
        let target = ParticipantId::generate();
        let call = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.call_mcp(target, "tools/call", Value::Null).await }
        });
        let proposal = rx.recv().await.unwrap();

        // A fulfillment request correlated to the proposal, addressed to
        // someone other than this runtime and not a response to anything
        // it sent directly — this is the broadcast copy the gateway now
        // delivers to the original proposer.
        let fulfiller = ParticipantId::generate();
        let fulfillment_request = Envelope::try_new_validated(EnvelopeParams {
            from: fulfiller,
            to: Some(vec![ParticipantId::generate()]),
            kind: Kind::try_new("mcp/request").unwrap(),
            correlation_id: Some(vec![proposal.id()]),
            context: None,
            payload: serde_json::json!({"method": "tools/call"}),
        })
        .unwrap();
        assert!(runtime.handle_inbound_request(&fulfillment_request).is_none());

        let response = Envelope::try_new_validated(EnvelopeParams {
            from: fulfiller,
            to: Some(vec![proposal.from()]),
            kind: Kind::try_new("mcp/response").unwrap(),
            correlation_id: Some(vec![fulfillment_request.id()]),
            context: None,
            payload: serde_json::json!({"result": 3}),
        })
        .unwrap();
        assert!(runtime.resolve_inbound_response(&response));

        assert_eq!(call.await.unwrap().unwrap(), serde_json::json!(3));
    }

    #[tokio::test]
    async fn handle_inbound_request_dispatches_registered_tool() {
        struct Echo;
        impl ToolHandler for Echo {
            fn descriptor(&self) -> Value {
                serde_json::json!({"name": "echo"})
            }

            fn call(&self, params: &Value) -> Result<Value, Value> {
                Ok(params.clone())
            }
        }

        let (runtime, _rx) = runtime(vec![Capability::new(KindPattern::parse("mcp/response").unwrap(), None)]);
        runtime.register_tool("echo", Arc::new(Echo));

        let sender = ParticipantId::generate();
        let request = Envelope::try_new_validated(EnvelopeParams {
            from: sender,
            to: None,
            kind: Kind::try_new("mcp/request").unwrap(),
            correlation_id: None,
            context: None,
            payload: serde_json::json!({
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {"x": 1}},
            }),
        })
        .unwrap();

        let response = runtime.handle_inbound_request(&request).unwrap();
        assert_eq!(response.payload()["result"]["x"], 1);
    }
}
