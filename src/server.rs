//! The axum HTTP/WebSocket surface (§6): one WebSocket connection per
//! participant, upgraded under `/ws/{space_id}`, plus `/health` and
//! `/metrics` for operators.
//!
//! `create_router`/`serve`/graceful-shutdown wiring around a duplex
//! message-framing channel carrying JSON envelope frames and
//! `#<stream_id>#`-prefixed binary stream frames (§6), dispatched into a
//! per-space [`SpaceRuntime`].

use crate::config::GatewayConfig;
use crate::connection::{ConnectionEndpoint, FrameSink, OutboundFrame};
use crate::domain::{Envelope, ParticipantId, SpaceId, StreamId};
use crate::error::GatewayError;
use crate::gateway::SpaceRuntime;
use crate::metrics::MetricsCollector;
use crate::resolver::{ResolvedIdentity, TokenResolver};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{info, warn};

/// One space's runtime plus the server's own bookkeeping of raw-frame
/// senders, used to fan out `#stream_id#`-prefixed binary data that never
/// passes through the [`crate::router::Router`]'s envelope queue (§4.7,
/// §6).
struct SpaceHandle {
    runtime: Arc<SpaceRuntime>,
    frame_senders: DashMap<ParticipantId, mpsc::Sender<OutboundFrame>>,
}

impl SpaceHandle {
    fn new(runtime: Arc<SpaceRuntime>) -> Self {
        Self {
            runtime,
            frame_senders: DashMap::new(),
        }
    }
}

/// Server-wide shared state: every live space, the token resolver, and
/// shared configuration/metrics.
pub struct AppState {
    spaces: DashMap<SpaceId, Arc<SpaceHandle>>,
    resolver: Arc<dyn TokenResolver>,
    config: Arc<GatewayConfig>,
    metrics: Arc<dyn MetricsCollector>,
}

impl AppState {
    /// Builds empty shared state over an injected resolver/config/metrics
    /// collector (§6: the resolver is an external dependency).
    #[must_use]
    pub fn new(
        resolver: Arc<dyn TokenResolver>,
        config: Arc<GatewayConfig>,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            spaces: DashMap::new(),
            resolver,
            config,
            metrics,
        }
    }

    /// Returns the existing space handle, or spawns a fresh [`SpaceRuntime`]
    /// and its periodic sweep tasks the first time a space is joined
    /// (§3: "created on first join").
    fn space_for(&self, space_id: &SpaceId) -> Arc<SpaceHandle> {
        if let Some(existing) = self.spaces.get(space_id) {
            return Arc::clone(&existing);
        }
        let runtime = Arc::new(SpaceRuntime::new(
            space_id.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.metrics),
        ));
        spawn_sweep_tasks(Arc::clone(&runtime), Arc::clone(&self.config));
        let handle = Arc::new(SpaceHandle::new(runtime));
        self.spaces.insert(space_id.clone(), Arc::clone(&handle));
        handle
    }
}

/// Spawns the background tasks that force-close idle streams, auto-resume
/// elapsed pauses, and sweep terminal proposal bookkeeping (§4.7, §4.9,
/// §4.6). One set per space, torn down implicitly when the process exits
/// (spaces are not individually destroyed in this single-process server;
/// the grace-period teardown of §3 is left to a future supervisory layer).
fn spawn_sweep_tasks(runtime: Arc<SpaceRuntime>, config: Arc<GatewayConfig>) {
    let idle_timeout = config.stream_idle_timeout_ms.as_duration();
    let sweep_runtime = Arc::clone(&runtime);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5).min(idle_timeout));
        loop {
            ticker.tick().await;
            sweep_runtime.sweep_idle_streams(idle_timeout).await;
            sweep_runtime.sweep_pause_deadlines().await;
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let cutoff = crate::domain::GatewayTimestamp::now();
            let swept = runtime.sweep_terminal_proposals(cutoff).await;
            if swept > 0 {
                info!(swept, "swept terminal proposal bookkeeping");
            }
        }
    });
}

/// Builds the axum router: `/health`, `/metrics`, and the per-space
/// WebSocket upgrade endpoint.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws/{space_id}", get(ws_upgrade))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Authenticates the connecting participant (§6: bearer token presented on
/// connect) and upgrades to a WebSocket on success.
async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Path(space_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Ok(space_id) = SpaceId::try_new(space_id) else {
        return (StatusCode::BAD_REQUEST, "invalid space id").into_response();
    };
    let Some(token) = params.get("token").cloned().or_else(|| bearer_token(&headers)) else {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    };
    let Some(identity) = state.resolver.resolve(&token).await else {
        return (StatusCode::UNAUTHORIZED, "invalid or revoked token").into_response();
    };
    if identity.space != space_id {
        return (StatusCode::FORBIDDEN, "token is not valid for this space").into_response();
    }

    ws.on_upgrade(move |socket| handle_connection(state, identity, socket))
}

/// Drives one authenticated participant's connection end to end: join,
/// inbound read loop, and teardown on disconnect (§4.3, §4.4, §6).
async fn handle_connection(state: Arc<AppState>, identity: ResolvedIdentity, socket: WebSocket) {
    let space = state.space_for(&identity.space);
    let participant_id = identity.participant_id;
    let config = Arc::clone(space.runtime.config());

    let (ws_sink, ws_stream) = socket.split();
    let sink: Box<dyn FrameSink> = Box::new(WebSocketFrameSink { sink: ws_sink });
    let rate_limit = config.enable_rate_limiting.then_some(config.rate_limit_envelopes_per_second);
    let (endpoint, shutdown) = ConnectionEndpoint::spawn(
        participant_id,
        sink,
        config.outbound_queue_size,
        config.heartbeat_interval_ms,
        config.max_missed_pongs,
        rate_limit,
        config.duplicate_id_window_size,
    );

    space.frame_senders.insert(participant_id, endpoint.sender());

    let (router_tx, mut router_rx) = mpsc::channel::<Envelope>(config.outbound_queue_size.as_usize());
    space.runtime.router().register_connection(participant_id, router_tx).await;
    let bridge_sender = endpoint.sender();
    tokio::spawn(async move {
        while let Some(envelope) = router_rx.recv().await {
            if bridge_sender.send(OutboundFrame::Envelope(envelope)).await.is_err() {
                break;
            }
        }
    });

    match space.runtime.join(participant_id, identity.capabilities.clone()).await {
        Ok(outcome) => {
            if endpoint.try_enqueue(OutboundFrame::Envelope(outcome.welcome)).is_err() {
                warn!(%participant_id, "failed to deliver welcome envelope");
            }
            let recipients: Vec<ParticipantId> = space
                .runtime
                .registry()
                .list_active()
                .await
                .into_iter()
                .map(|record| record.id())
                .filter(|id| *id != participant_id)
                .collect();
            space.runtime.router().deliver_system(recipients, outcome.presence).await;
        }
        Err(error) => {
            warn!(%participant_id, %error, "join rejected");
            endpoint.close();
            space.frame_senders.remove(&participant_id);
            return;
        }
    }

    read_loop(&space, participant_id, &endpoint, ws_stream).await;

    endpoint.close();
    shutdown.cancel();
    space.frame_senders.remove(&participant_id);
    space.runtime.leave(participant_id).await;
}

/// Reads inbound frames until the peer disconnects, decoding JSON envelope
/// frames and `#stream_id#<8-byte-sequence>`-prefixed binary stream frames
/// (§4.1, §4.7, §6).
async fn read_loop(
    space: &SpaceHandle,
    participant_id: ParticipantId,
    endpoint: &ConnectionEndpoint,
    mut stream: SplitStream<WebSocket>,
) {
    let config = Arc::clone(space.runtime.config());
    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(error) => {
                warn!(%participant_id, %error, "websocket read error");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                let disconnect =
                    handle_text_frame(space, participant_id, endpoint, text.as_str(), config.max_envelope_bytes).await;
                if disconnect {
                    break;
                }
            }
            Message::Binary(bytes) => {
                handle_binary_frame(space, participant_id, &bytes).await;
            }
            Message::Pong(_) => endpoint.record_pong(),
            Message::Close(_) => break,
            Message::Ping(_) => {}
        }
    }
}

/// Decodes and dispatches one inbound JSON envelope frame. Returns `true`
/// if the connection should be closed, either for exceeding its ingress
/// rate budget or for crossing the repeated-malformed-envelope disconnect
/// threshold (§4.1, §7, §C.4).
async fn handle_text_frame(
    space: &SpaceHandle,
    participant_id: ParticipantId,
    endpoint: &ConnectionEndpoint,
    text: &str,
    max_envelope_bytes: crate::domain::MaxEnvelopeBytes,
) -> bool {
    if !endpoint.check_inbound_rate() {
        deliver_error(
            space,
            participant_id,
            endpoint,
            &GatewayError::RateLimited {
                limit: space.runtime.config().rate_limit_envelopes_per_second.into_inner(),
            },
        )
        .await;
        return false;
    }

    match crate::codec::decode_ingress(text, participant_id, max_envelope_bytes) {
        Ok(envelope) => {
            if endpoint.observe_envelope_id(envelope.id()) {
                deliver_error(
                    space,
                    participant_id,
                    endpoint,
                    &GatewayError::MalformedEnvelope {
                        reason: format!("duplicate envelope id {}", envelope.id()),
                    },
                )
                .await;
                return false;
            }
            if let Err(error) = space.runtime.dispatch(envelope).await {
                deliver_error(space, participant_id, endpoint, &error).await;
            }
            false
        }
        Err(error) => {
            deliver_error(space, participant_id, endpoint, &error).await;
            let (count, crossed) = endpoint.record_malformed();
            if crossed {
                crate::observability::SecurityEvent::emit(
                    crate::observability::SecurityEventKind::RepeatedMalformedEnvelopes {
                        participant: participant_id,
                        count,
                    },
                    None,
                );
            }
            crossed
        }
    }
}

/// Forwards a raw `#stream_id#<sequence><payload>` binary frame to the
/// stream's other peers, recording the sequence for gap detection (§4.7).
/// Out-of-order or missing sequences only warn; the stream is never torn
/// down for it (§4.7, open question 3).
async fn handle_binary_frame(space: &SpaceHandle, sender: ParticipantId, bytes: &Bytes) {
    let Some((stream_id, sequence, payload)) = parse_stream_frame(bytes) else {
        return;
    };
    let Ok(peers) = space.runtime.record_stream_data(stream_id, sender, sequence).await else {
        return;
    };
    for peer in peers {
        if let Some(peer_sender) = space.frame_senders.get(&peer) {
            let _ = peer_sender
                .send(OutboundFrame::StreamData {
                    stream_id,
                    sequence,
                    bytes: payload.clone(),
                })
                .await;
        }
    }
}

/// Parses `#<uuid>#<8-byte big-endian sequence><payload>` (§6's binary
/// frame prefix, extended with an explicit sequence so gap detection has
/// something to compare against for raw frames as well as `stream/data`
/// envelopes).
fn parse_stream_frame(bytes: &Bytes) -> Option<(StreamId, u64, Bytes)> {
    if bytes.first() != Some(&b'#') {
        return None;
    }
    let rest = &bytes[1..];
    let end = rest.iter().position(|&b| b == b'#')?;
    let stream_id: StreamId = std::str::from_utf8(&rest[..end]).ok()?.parse::<uuid::Uuid>().ok()?.into();
    let after_prefix = &rest[end + 1..];
    if after_prefix.len() < 8 {
        return None;
    }
    let sequence = u64::from_be_bytes(after_prefix[..8].try_into().ok()?);
    let payload = bytes.slice(bytes.len() - (after_prefix.len() - 8)..);
    Some((stream_id, sequence, payload))
}

async fn deliver_error(
    space: &SpaceHandle,
    participant_id: ParticipantId,
    endpoint: &ConnectionEndpoint,
    error: &GatewayError,
) {
    let Ok(envelope) = Envelope::try_new_validated(crate::domain::EnvelopeParams {
        from: ParticipantId::from(uuid::Uuid::nil()),
        to: Some(vec![participant_id]),
        kind: crate::domain::Kind::try_new("system/error").unwrap(),
        correlation_id: None,
        context: None,
        payload: serde_json::json!({ "code": error.code(), "message": error.to_string() }),
    }) else {
        return;
    };
    if endpoint.try_enqueue(OutboundFrame::Envelope(envelope)).is_err() {
        space.runtime.leave(participant_id).await;
    }
}

/// Adapts an axum [`WebSocket`]'s write half to [`FrameSink`], so
/// [`ConnectionEndpoint`]'s queueing/heartbeat/backpressure logic stays
/// transport-agnostic (§4.3, §6).
struct WebSocketFrameSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait::async_trait]
impl FrameSink for WebSocketFrameSink {
    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), GatewayError> {
        let message = match frame {
            OutboundFrame::Envelope(envelope) => {
                let text = crate::codec::encode_egress(&envelope)?;
                Message::Text(text.into())
            }
            OutboundFrame::StreamData { stream_id, sequence, bytes } => {
                let mut framed = format!("#{stream_id}#").into_bytes();
                framed.extend_from_slice(&sequence.to_be_bytes());
                framed.extend_from_slice(&bytes);
                Message::Binary(framed.into())
            }
            OutboundFrame::Ping => Message::Ping(Bytes::new()),
        };
        self.sink.send(message).await.map_err(|error| GatewayError::Internal {
            detail: format!("websocket write failed: {error}"),
        })
    }

    async fn close(&mut self, reason: &str) {
        let _ = self.sink.send(Message::Close(None)).await;
        warn!(reason, "closing websocket connection");
        let _ = self.sink.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::InMemoryTokenResolver;
    use crate::metrics::AtomicMetricsCollector;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Arc::new(InMemoryTokenResolver::new()),
            Arc::new(GatewayConfig::testing()),
            Arc::new(AtomicMetricsCollector::new()),
        ))
    }

    #[tokio::test]
    async fn health_and_metrics_routes_exist() {
        let router = create_router(state());
        assert!(!format!("{router:?}").is_empty());
    }

    #[test]
    fn parse_stream_frame_round_trips() {
        let stream_id = StreamId::generate();
        let mut raw = format!("#{stream_id}#").into_bytes();
        raw.extend_from_slice(&7u64.to_be_bytes());
        raw.extend_from_slice(b"payload");
        let bytes = Bytes::from(raw);
        let (parsed_id, sequence, payload) = parse_stream_frame(&bytes).unwrap();
        assert_eq!(parsed_id, stream_id);
        assert_eq!(sequence, 7);
        assert_eq!(&payload[..], b"payload");
    }

    #[test]
    fn non_prefixed_frame_is_rejected() {
        let bytes = Bytes::from_static(b"not a stream frame");
        assert!(parse_stream_frame(&bytes).is_none());
    }
}
