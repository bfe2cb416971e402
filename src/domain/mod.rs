//! Value objects and aggregates of the MEW protocol domain model (§3):
//! envelopes, capabilities, participants, proposals, streams, and spaces.

pub mod capability;
pub mod envelope;
pub mod participant;
pub mod primitives;
pub mod proposal;
pub mod space;
pub mod stream;

pub use capability::{Capability, KindPattern, PayloadPattern};
pub use envelope::{Envelope, EnvelopeParams, Kind, RawEnvelope, PROTOCOL_VERSION};
pub use participant::{ContextUsage, ParticipantRecord, PresenceState};
pub use primitives::{
    ContextId, CorrelationId, EnvelopeId, EnvelopesPerSecond, GatewayTimestamp,
    HeartbeatIntervalMs, MaxEnvelopeBytes, MaxMissedPongs, PauseQueueDepth, ParticipantId,
    ProposalId, ProposalTimeoutMs, QueueDepth, RequestTimeoutMs, SpaceId, StreamId,
    StreamIdleTimeoutMs,
};
pub use proposal::{PendingKind, PendingRequest, Proposal, ProposalStatus};
pub use space::Space;
pub use stream::{StreamDirection, StreamSession, StreamState};
