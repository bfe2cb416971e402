//! Primitive value types shared across the domain layer.
//!
//! Every identifier and bounded quantity in this crate is a validated
//! `nutype` newtype rather than a bare `Uuid`/`u64`/`String`: illegal values
//! (negative queue depths, empty space ids) simply cannot be constructed.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Identifies a participant within a space.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Generates a fresh random participant id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifies an envelope for idempotence and correlation purposes.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct EnvelopeId(Uuid);

impl EnvelopeId {
    /// Generates a fresh random envelope id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifies a space (an isolated collaboration workspace).
#[nutype(
    validate(len_char_min = 1, len_char_max = 256),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        AsRef
    )
)]
pub struct SpaceId(String);

/// Identifies a stream session.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct StreamId(Uuid);

impl StreamId {
    /// Generates a fresh random stream id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifies a proposal (an open contract-net-style request).
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct ProposalId(Uuid);

impl ProposalId {
    /// Generates a fresh random proposal id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifies an LLM reasoning/work context a participant is tracking usage against.
#[nutype(
    validate(len_char_min = 1, len_char_max = 256),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct ContextId(String);

/// Correlates a response/fulfillment envelope back to the envelope it answers.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh random correlation id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// Derives a correlation id from the envelope it answers.
    #[must_use]
    pub fn from_envelope(id: EnvelopeId) -> Self {
        Self::new(id.into_inner())
    }
}

/// Depth of a bounded per-participant delivery queue.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 256
)]
pub struct QueueDepth(usize);

impl QueueDepth {
    /// Gets the value as `usize` for use with tokio channels.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Depth of the bounded pause-delivery queue held for a paused participant.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 100_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 64
)]
pub struct PauseQueueDepth(usize);

impl PauseQueueDepth {
    /// Gets the value as `usize`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Maximum number of consecutive missed heartbeat pongs before a participant
/// is considered disconnected.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 20),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 3
)]
pub struct MaxMissedPongs(u8);

/// Interval between heartbeat pings, in milliseconds.
#[nutype(
    validate(greater_or_equal = 1_000, less_or_equal = 300_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 30_000
)]
pub struct HeartbeatIntervalMs(u64);

impl HeartbeatIntervalMs {
    /// Converts to a `Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// How long a stream may sit idle (no `stream/data`) before the manager
/// closes it.
#[nutype(
    validate(greater_or_equal = 1_000, less_or_equal = 3_600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 60_000
)]
pub struct StreamIdleTimeoutMs(u64);

impl StreamIdleTimeoutMs {
    /// Converts to a `Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// How long a proposal stays open before the engine auto-rejects it.
#[nutype(
    validate(greater_or_equal = 1_000, less_or_equal = 86_400_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 300_000
)]
pub struct ProposalTimeoutMs(u64);

impl ProposalTimeoutMs {
    /// Converts to a `Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// How long a client-side pending MCP request waits before timing out.
#[nutype(
    validate(greater_or_equal = 100, less_or_equal = 600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 30_000
)]
pub struct RequestTimeoutMs(u64);

impl RequestTimeoutMs {
    /// Converts to a `Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// Maximum serialized envelope size accepted at ingress, in bytes.
#[nutype(
    validate(greater_or_equal = 1_024, less_or_equal = 67_108_864),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1_048_576
)]
pub struct MaxEnvelopeBytes(usize);

impl MaxEnvelopeBytes {
    /// Gets the value as `usize`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Ingress rate limit, in envelopes per second, per connection.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 100_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 200
)]
pub struct EnvelopesPerSecond(u32);

/// A gateway-stamped wall-clock timestamp, rendered on the wire as
/// ISO-8601/RFC-3339 (`ts` in §6's envelope schema).
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize))]
pub struct GatewayTimestamp(DateTime<Utc>);

impl GatewayTimestamp {
    /// Stamps the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Returns the underlying `DateTime<Utc>`.
    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.into_inner()
    }
}

impl Default for GatewayTimestamp {
    fn default() -> Self {
        Self::now()
    }
}
