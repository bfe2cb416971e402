//! `DashMap`-backed [`Router`] implementation.
//!
//! Per-recipient `mpsc` send queues looked up in a `DashMap`, a
//! `ThroughputTracker` windowed-rate sampler, and `try_send`/`TrySendError`
//! handling for per-participant delivery plus the pause queue of §4.5
//! step 3.

use super::{RouteReport, Router, RouterStats};
use crate::capability_matcher::can_send;
use crate::domain::{Envelope, ParticipantId, PauseQueueDepth, PresenceState};
use crate::error::RouterError;
use crate::registry::ParticipantRegistry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{trace, warn};

/// Windowed envelopes-per-second sampler.
struct ThroughputTracker {
    window: Duration,
    samples: DashMap<u64, u64>,
}

impl ThroughputTracker {
    fn new(window: Duration) -> Self {
        Self {
            window,
            samples: DashMap::new(),
        }
    }

    fn record(&self) {
        let now = current_second();
        self.samples.entry(now).and_modify(|count| *count += 1).or_insert(1);
        let cutoff = now.saturating_sub(self.window.as_secs());
        self.samples.retain(|&second, _| second >= cutoff);
    }

    fn rate(&self) -> f64 {
        let now = current_second();
        let cutoff = now.saturating_sub(self.window.as_secs());
        let total: u64 = self
            .samples
            .iter()
            .filter(|entry| *entry.key() >= cutoff)
            .map(|entry| *entry.value())
            .sum();
        total as f64 / self.window.as_secs_f64()
    }
}

fn current_second() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Whether `kind` is one of the control-plane operations (§4.9) that act on
/// a target other than the sender, making a denied attempt worth flagging
/// as a security event rather than an ordinary capability violation.
fn is_control_plane_kind(kind: &str) -> bool {
    matches!(
        kind,
        "participant/pause"
            | "participant/resume"
            | "participant/forget"
            | "participant/clear"
            | "participant/restart"
            | "participant/shutdown"
    )
}

/// Routes envelopes within a single space: capability-checks the sender,
/// resolves recipients, and enqueues on each recipient's connection queue
/// or pause queue (§4.5).
pub struct RouterImpl {
    registry: Arc<dyn ParticipantRegistry>,
    connections: DashMap<ParticipantId, mpsc::Sender<Envelope>>,
    pause_queues: DashMap<ParticipantId, Mutex<VecDeque<Envelope>>>,
    pause_queue_capacity: PauseQueueDepth,
    messages_routed: AtomicU64,
    messages_dropped: AtomicU64,
    throughput: ThroughputTracker,
}

impl RouterImpl {
    /// Creates a router over `registry`, bounding each participant's pause
    /// queue to `pause_queue_capacity`.
    #[must_use]
    pub fn new(registry: Arc<dyn ParticipantRegistry>, pause_queue_capacity: PauseQueueDepth) -> Self {
        Self {
            registry,
            connections: DashMap::new(),
            pause_queues: DashMap::new(),
            pause_queue_capacity,
            messages_routed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            throughput: ThroughputTracker::new(Duration::from_secs(60)),
        }
    }

    fn enqueue_while_paused(&self, recipient: ParticipantId, envelope: Envelope) {
        let queue = self
            .pause_queues
            .entry(recipient)
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut queue = queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if queue.len() >= self.pause_queue_capacity.as_usize() {
            queue.pop_front();
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(envelope);
    }

    fn dispatch(&self, recipient: ParticipantId, envelope: Envelope) -> Result<(), RouterError> {
        let Some(sender) = self.connections.get(&recipient) else {
            return Err(RouterError::UnknownRecipient { participant: recipient });
        };
        match sender.try_send(envelope) {
            Ok(()) => {
                trace!(%recipient, "envelope dispatched to connection queue");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(RouterError::QueueFull {
                depth: sender.capacity(),
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(RouterError::UnknownRecipient { participant: recipient })
            }
        }
    }

    /// Delivers `envelope` to each of `recipients`, queueing behind a pause
    /// where applicable (§4.5 step 3) and recording throughput/drop stats.
    async fn deliver_to_recipients(&self, recipients: Vec<ParticipantId>, envelope: Envelope) -> RouteReport {
        let mut report = RouteReport::default();
        for recipient in recipients {
            let record = match self.registry.get(recipient).await {
                Ok(record) => record,
                Err(_) => {
                    report
                        .failed
                        .push((recipient, RouterError::UnknownRecipient { participant: recipient }));
                    continue;
                }
            };

            if record.presence_state() == crate::domain::PresenceState::Paused
                && !record.deliverable_while_paused(envelope.kind().as_str())
            {
                self.enqueue_while_paused(recipient, envelope.clone());
                report.queued_while_paused.push(recipient);
                continue;
            }

            match self.dispatch(recipient, envelope.clone()) {
                Ok(()) => {
                    self.messages_routed.fetch_add(1, Ordering::Relaxed);
                    self.throughput.record();
                    report.delivered.push(recipient);
                }
                Err(RouterError::QueueFull { depth }) => {
                    warn!(%recipient, depth, "recipient queue full, closing slow connection");
                    self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    report.failed.push((recipient, RouterError::QueueFull { depth }));
                }
                Err(err) => {
                    self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    report.failed.push((recipient, err));
                }
            }
        }
        report
    }
}

#[async_trait::async_trait]
impl Router for RouterImpl {
    async fn register_connection(&self, id: ParticipantId, sender: mpsc::Sender<Envelope>) {
        self.connections.insert(id, sender);
    }

    async fn deregister_connection(&self, id: ParticipantId) {
        self.connections.remove(&id);
        self.pause_queues.remove(&id);
    }

    async fn route(&self, envelope: Envelope) -> Result<RouteReport, RouterError> {
        let sender_record = self
            .registry
            .get(envelope.from())
            .await
            .map_err(|_| RouterError::UnknownRecipient {
                participant: envelope.from(),
            })?;

        if !can_send(sender_record.capabilities(), &envelope) {
            if is_control_plane_kind(envelope.kind().as_str()) {
                if let Some(target) = envelope.to().and_then(|to| to.first()).copied() {
                    if target != envelope.from() {
                        crate::observability::SecurityEvent::emit(
                            crate::observability::SecurityEventKind::UnauthorizedControlAttempt {
                                kind: envelope.kind().as_str().to_string(),
                                attempted_by: envelope.from(),
                                target,
                            },
                            Some(envelope.id()),
                        );
                    }
                }
            }
            return Err(RouterError::CapabilityViolation {
                participant: envelope.from(),
                kind: envelope.kind().as_str().to_string(),
            });
        }

        let recipients: Vec<ParticipantId> = match envelope.to() {
            Some(explicit) => explicit.to_vec(),
            None => self
                .registry
                .list_active()
                .await
                .into_iter()
                .map(|record| record.id())
                .filter(|id| *id != envelope.from())
                .collect(),
        };

        Ok(self.deliver_to_recipients(recipients, envelope).await)
    }

    async fn drain_pause_queue(&self, id: ParticipantId) -> Vec<Envelope> {
        let Some(queue) = self.pause_queues.get(&id) else {
            return Vec::new();
        };
        let mut queue = queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.drain(..).collect()
    }

    async fn deliver_system(&self, recipients: Vec<ParticipantId>, envelope: Envelope) -> RouteReport {
        self.deliver_to_recipients(recipients, envelope).await
    }

    fn stats(&self) -> RouterStats {
        RouterStats {
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            envelopes_per_second: self.throughput.rate(),
            connected_participants: self.connections.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Capability, EnvelopeParams, Kind, KindPattern};
    use crate::registry::ParticipantRegistryImpl;
    use serde_json::json;

    fn envelope(from: ParticipantId, to: Option<Vec<ParticipantId>>, kind: &str) -> Envelope {
        Envelope::try_new_validated(EnvelopeParams {
            from,
            to,
            kind: Kind::try_new(kind).unwrap(),
            correlation_id: None,
            context: None,
            payload: json!({}),
        })
        .unwrap()
    }

    async fn active_router() -> (RouterImpl, Arc<ParticipantRegistryImpl>, ParticipantId, ParticipantId) {
        let registry = Arc::new(ParticipantRegistryImpl::new());
        let alice = ParticipantId::generate();
        let bob = ParticipantId::generate();
        let chat_cap = Capability::new(KindPattern::parse("chat").unwrap(), None);
        registry.register(alice, vec![chat_cap.clone()]).await.unwrap();
        registry.register(bob, vec![chat_cap]).await.unwrap();
        registry.transition_presence(alice, PresenceState::Active).await.unwrap();
        registry.transition_presence(bob, PresenceState::Active).await.unwrap();
        let router = RouterImpl::new(registry.clone(), PauseQueueDepth::try_new(16).unwrap());
        (router, registry, alice, bob)
    }

    #[tokio::test]
    async fn broadcast_reaches_every_other_active_participant() {
        let (router, _registry, alice, bob) = active_router().await;
        let (tx, mut rx) = mpsc::channel(4);
        router.register_connection(bob, tx).await;

        let report = router.route(envelope(alice, None, "chat")).await.unwrap();
        assert_eq!(report.delivered, vec![bob]);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn capability_violation_is_rejected_before_routing() {
        let (router, _registry, alice, _bob) = active_router().await;
        let result = router.route(envelope(alice, None, "mcp/request")).await;
        assert!(matches!(result, Err(RouterError::CapabilityViolation { .. })));
    }

    #[tokio::test]
    async fn unauthorized_control_attempt_toward_another_participant_is_still_a_capability_violation() {
        let (router, _registry, alice, bob) = active_router().await;
        let result = router
            .route(envelope(alice, Some(vec![bob]), "participant/pause"))
            .await;
        assert!(matches!(result, Err(RouterError::CapabilityViolation { .. })));
    }

    #[tokio::test]
    async fn paused_recipient_queues_instead_of_dispatching() {
        let (router, registry, alice, bob) = active_router().await;
        let (tx, _rx) = mpsc::channel(4);
        router.register_connection(bob, tx).await;
        registry
            .transition_presence(bob, PresenceState::Paused)
            .await
            .unwrap();

        let report = router.route(envelope(alice, Some(vec![bob]), "chat")).await.unwrap();
        assert_eq!(report.queued_while_paused, vec![bob]);
        assert_eq!(router.drain_pause_queue(bob).await.len(), 1);
    }
}
