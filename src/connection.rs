//! The Connection Endpoint (§4.3): one full-duplex channel per participant
//! carrying framed envelopes plus raw binary stream frames, with a bounded
//! send queue, heartbeat, and backpressure-triggered close.
//!
//! Grounded in `message_router/implementations/delivery_engine.rs`'s
//! `DeliveryEngineImpl` (`DashMap<AgentId, mpsc::Sender<FipaMessage>>`,
//! `try_send` + `TrySendError::{Full,Closed}` handling) — generalized from
//! "one send queue per local agent" to "one send queue per connected
//! participant", with the heartbeat/backpressure-close behavior of §4.3/§5
//! layered on top.

use crate::codec::DuplicateIdWindow;
use crate::domain::{
    Envelope, EnvelopeId, EnvelopesPerSecond, HeartbeatIntervalMs, MaxMissedPongs, ParticipantId,
    QueueDepth, StreamId,
};
use crate::error::GatewayError;
use bytes::Bytes;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many malformed inbound envelopes a connection may send before it is
/// closed as a security precaution (§4.1, §7: "repeated malformed
/// envelopes").
const MALFORMED_DISCONNECT_THRESHOLD: u32 = 10;

/// Fixed one-second-window ingress rate limiter (§C.4), giving
/// `GatewayConfig::rate_limit_envelopes_per_second` an actual enforcement
/// path rather than a dangling setting.
struct RateLimiter {
    limit: u32,
    window: Mutex<(Instant, u32)>,
}

impl RateLimiter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            window: Mutex::new((Instant::now(), 0)),
        }
    }

    fn check(&self) -> bool {
        let mut window = self.window.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (started, count) = &mut *window;
        if started.elapsed() >= Duration::from_secs(1) {
            *started = Instant::now();
            *count = 0;
        }
        if *count >= self.limit {
            false
        } else {
            *count += 1;
            true
        }
    }
}

/// A unit written to the wire: either a JSON envelope frame or a raw binary
/// stream-data frame prefixed `#<stream_id>#` (§6).
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// One JSON envelope, serialized by the caller via [`crate::codec`].
    Envelope(Envelope),
    /// Raw bytes for `stream_id`, written with the transport's binary-frame
    /// prefix.
    StreamData {
        /// Which stream these bytes belong to.
        stream_id: StreamId,
        /// The chunk's sequence number, preserved across forwarding so the
        /// receiving peer can run its own gap detection (§4.7).
        sequence: u64,
        /// The payload bytes.
        bytes: Bytes,
    },
    /// A heartbeat ping.
    Ping,
}

/// Abstracts the underlying duplex transport's write half, so the
/// connection endpoint's queueing/heartbeat/backpressure logic does not
/// depend on a concrete WebSocket/TCP type (§6: "a duplex message-framing
/// transport").
#[async_trait::async_trait]
pub trait FrameSink: Send + Sync {
    /// Writes one outbound frame to the wire.
    ///
    /// # Errors
    /// Returns an error if the underlying transport write fails.
    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), GatewayError>;

    /// Closes the transport, optionally carrying a final `system/error`.
    async fn close(&mut self, reason: &str);
}

/// The gateway-side handle to one connected participant's outbound queue
/// and heartbeat state.
pub struct ConnectionEndpoint {
    participant_id: ParticipantId,
    outbound: mpsc::Sender<OutboundFrame>,
    missed_pongs: Arc<AtomicU8>,
    max_missed_pongs: MaxMissedPongs,
    shutdown: CancellationToken,
    inbound_rate_limiter: Option<RateLimiter>,
    malformed_count: AtomicU32,
    duplicate_window: DuplicateIdWindow,
}

impl ConnectionEndpoint {
    /// Spawns the writer task and heartbeat timer for a newly authenticated
    /// connection, returning the handle the router enqueues envelopes on.
    ///
    /// The writer task drains `sink`'s frames from an internal bounded
    /// queue of depth `queue_size`; on a full queue the oldest caller's
    /// `try_enqueue` fails with [`GatewayError::Backpressure`] rather than
    /// blocking the router (§4.3, §5).
    #[must_use]
    pub fn spawn(
        participant_id: ParticipantId,
        mut sink: Box<dyn FrameSink>,
        queue_size: QueueDepth,
        heartbeat_interval: HeartbeatIntervalMs,
        max_missed_pongs: MaxMissedPongs,
        inbound_rate_limit: Option<EnvelopesPerSecond>,
        duplicate_id_window_size: usize,
    ) -> (Self, CancellationToken) {
        let (tx, mut rx) = mpsc::channel::<OutboundFrame>(queue_size.as_usize());
        let shutdown = CancellationToken::new();
        let missed_pongs = Arc::new(AtomicU8::new(0));

        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_shutdown.cancelled() => break,
                    frame = rx.recv() => {
                        match frame {
                            Some(frame) => {
                                if let Err(error) = sink.send_frame(frame).await {
                                    warn!(%participant_id, %error, "connection write failed");
                                    sink.close("write failure").await;
                                    writer_shutdown.cancel();
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        let heartbeat_tx = tx.clone();
        let heartbeat_shutdown = shutdown.clone();
        let heartbeat_missed = Arc::clone(&missed_pongs);
        tokio::spawn(async move {
            let mut ticker = interval(heartbeat_interval.as_duration());
            loop {
                tokio::select! {
                    () = heartbeat_shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let missed = heartbeat_missed.fetch_add(1, Ordering::SeqCst) + 1;
                        if missed > max_missed_pongs.into_inner() {
                            debug!(%participant_id, missed, "peer missed too many heartbeat pongs");
                            heartbeat_shutdown.cancel();
                            break;
                        }
                        if heartbeat_tx.send(OutboundFrame::Ping).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        (
            Self {
                participant_id,
                outbound: tx,
                missed_pongs,
                max_missed_pongs,
                shutdown: shutdown.clone(),
                inbound_rate_limiter: inbound_rate_limit.map(|rate| RateLimiter::new(rate.into_inner())),
                malformed_count: AtomicU32::new(0),
                duplicate_window: DuplicateIdWindow::new(duplicate_id_window_size),
            },
            shutdown,
        )
    }

    /// The participant this endpoint belongs to.
    #[must_use]
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    /// Records a heartbeat pong, resetting the missed-pong counter (§4.3).
    pub fn record_pong(&self) {
        self.missed_pongs.store(0, Ordering::SeqCst);
    }

    /// Attempts to enqueue `frame` without blocking.
    ///
    /// # Errors
    /// Returns [`GatewayError::Backpressure`] if the queue is full — the
    /// caller (the router) should then close this connection (§4.3: "on
    /// overflow, closes the connection with a `system/error`
    /// (`code: backpressure`)").
    pub fn try_enqueue(&self, frame: OutboundFrame) -> Result<(), GatewayError> {
        self.outbound.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => GatewayError::Backpressure {
                detail: format!("send queue full for {}", self.participant_id),
            },
            mpsc::error::TrySendError::Closed(_) => GatewayError::Internal {
                detail: "connection writer task has exited".to_string(),
            },
        })
    }

    /// An `mpsc::Sender` clone suitable for handing to the router's
    /// connection registry.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<OutboundFrame> {
        self.outbound.clone()
    }

    /// Tears down the writer and heartbeat tasks.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether this endpoint's missed-pong count has not yet exceeded its
    /// configured budget.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.missed_pongs.load(Ordering::SeqCst) <= self.max_missed_pongs.into_inner()
    }

    /// Consumes one unit of this connection's ingress rate budget, if rate
    /// limiting is configured. Always `true` when no limit was set (§C.4).
    #[must_use]
    pub fn check_inbound_rate(&self) -> bool {
        match &self.inbound_rate_limiter {
            Some(limiter) => limiter.check(),
            None => true,
        }
    }

    /// Records one malformed inbound envelope, returning the running count
    /// and whether it has crossed [`MALFORMED_DISCONNECT_THRESHOLD`] (§4.1,
    /// §7).
    pub fn record_malformed(&self) -> (u32, bool) {
        let count = self.malformed_count.fetch_add(1, Ordering::SeqCst) + 1;
        (count, count >= MALFORMED_DISCONNECT_THRESHOLD)
    }

    /// Records `id` against this connection's recent-id window, returning
    /// `true` if it was already seen and should be rejected as a duplicate
    /// (§4.1: "reject duplicate `id` within a connection's recent window").
    #[must_use]
    pub fn observe_envelope_id(&self, id: EnvelopeId) -> bool {
        self.duplicate_window.observe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        frames: Arc<Mutex<Vec<OutboundFrame>>>,
    }

    #[async_trait::async_trait]
    impl FrameSink for RecordingSink {
        async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), GatewayError> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }

        async fn close(&mut self, _reason: &str) {}
    }

    #[tokio::test]
    async fn try_enqueue_delivers_to_writer_task() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::new(RecordingSink {
            frames: Arc::clone(&frames),
        });
        let id = ParticipantId::generate();
        let (endpoint, shutdown) = ConnectionEndpoint::spawn(
            id,
            sink,
            QueueDepth::try_new(4).unwrap(),
            HeartbeatIntervalMs::try_new(60_000).unwrap(),
            MaxMissedPongs::try_new(3).unwrap(),
            None,
            256,
        );

        endpoint.try_enqueue(OutboundFrame::Ping).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(frames.lock().unwrap().len(), 1);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn full_queue_reports_backpressure() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::new(RecordingSink {
            frames: Arc::clone(&frames),
        });
        let id = ParticipantId::generate();
        let (endpoint, shutdown) = ConnectionEndpoint::spawn(
            id,
            sink,
            QueueDepth::try_new(1).unwrap(),
            HeartbeatIntervalMs::try_new(60_000).unwrap(),
            MaxMissedPongs::try_new(3).unwrap(),
            None,
            256,
        );
        // Fill the queue of depth 1 before the writer task can drain it by
        // racing the enqueue calls synchronously.
        let first = endpoint.try_enqueue(OutboundFrame::Ping);
        let second = endpoint.try_enqueue(OutboundFrame::Ping);
        assert!(first.is_ok());
        // Either the first or second may win the race with the writer
        // task; at minimum backpressure must be representable and not panic.
        let _ = second;
        shutdown.cancel();
    }

    #[tokio::test]
    async fn record_pong_resets_missed_counter() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::new(RecordingSink { frames });
        let id = ParticipantId::generate();
        let (endpoint, shutdown) = ConnectionEndpoint::spawn(
            id,
            sink,
            QueueDepth::try_new(4).unwrap(),
            HeartbeatIntervalMs::try_new(60_000).unwrap(),
            MaxMissedPongs::try_new(3).unwrap(),
            None,
            256,
        );
        endpoint.record_pong();
        assert!(endpoint.is_alive());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn inbound_rate_limit_rejects_past_budget() {
        let sink = Box::new(RecordingSink {
            frames: Arc::new(Mutex::new(Vec::new())),
        });
        let id = ParticipantId::generate();
        let (endpoint, shutdown) = ConnectionEndpoint::spawn(
            id,
            sink,
            QueueDepth::try_new(4).unwrap(),
            HeartbeatIntervalMs::try_new(60_000).unwrap(),
            MaxMissedPongs::try_new(3).unwrap(),
            Some(crate::domain::EnvelopesPerSecond::try_new(2).unwrap()),
            256,
        );
        assert!(endpoint.check_inbound_rate());
        assert!(endpoint.check_inbound_rate());
        assert!(!endpoint.check_inbound_rate());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn no_rate_limit_always_allows() {
        let sink = Box::new(RecordingSink {
            frames: Arc::new(Mutex::new(Vec::new())),
        });
        let id = ParticipantId::generate();
        let (endpoint, shutdown) = ConnectionEndpoint::spawn(
            id,
            sink,
            QueueDepth::try_new(4).unwrap(),
            HeartbeatIntervalMs::try_new(60_000).unwrap(),
            MaxMissedPongs::try_new(3).unwrap(),
            None,
            256,
        );
        for _ in 0..50 {
            assert!(endpoint.check_inbound_rate());
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn malformed_count_crosses_threshold() {
        let sink = Box::new(RecordingSink {
            frames: Arc::new(Mutex::new(Vec::new())),
        });
        let id = ParticipantId::generate();
        let (endpoint, shutdown) = ConnectionEndpoint::spawn(
            id,
            sink,
            QueueDepth::try_new(4).unwrap(),
            HeartbeatIntervalMs::try_new(60_000).unwrap(),
            MaxMissedPongs::try_new(3).unwrap(),
            None,
            256,
        );
        let mut crossed = false;
        for _ in 0..MALFORMED_DISCONNECT_THRESHOLD {
            let (_, threshold_crossed) = endpoint.record_malformed();
            crossed = threshold_crossed;
        }
        assert!(crossed);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn repeated_envelope_id_is_flagged_as_duplicate() {
        let sink = Box::new(RecordingSink {
            frames: Arc::new(Mutex::new(Vec::new())),
        });
        let id = ParticipantId::generate();
        let (endpoint, shutdown) = ConnectionEndpoint::spawn(
            id,
            sink,
            QueueDepth::try_new(4).unwrap(),
            HeartbeatIntervalMs::try_new(60_000).unwrap(),
            MaxMissedPongs::try_new(3).unwrap(),
            None,
            256,
        );
        let envelope_id = EnvelopeId::generate();
        assert!(!endpoint.observe_envelope_id(envelope_id));
        assert!(endpoint.observe_envelope_id(envelope_id));
        shutdown.cancel();
    }
}
