//! The Stream Channel Manager (§4.7): negotiation, sequence tracking, and
//! idle teardown for out-of-band data streams (reasoning traces, large tool
//! outputs, media) multiplexed alongside the main envelope stream.

pub mod implementation;

pub use implementation::StreamManagerImpl;

use crate::domain::{ParticipantId, StreamDirection, StreamId, StreamSession};
use crate::error::StreamError;
use async_trait::async_trait;

/// Outcome of recording an inbound `stream/data` chunk or binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataOutcome {
    /// The sequence number assigned/observed.
    pub sequence: u64,
    /// Whether a gap was detected relative to the previously observed
    /// sequence (§4.7: reported as a warning, not a termination).
    pub gap_detected: bool,
}

/// Stream negotiation and lifecycle operations (§4.7), kept object-safe for
/// `Arc<dyn StreamManager>` sharing across connection tasks.
#[async_trait]
pub trait StreamManager: Send + Sync {
    /// Negotiates a new stream on behalf of `owner`, assigning a fresh
    /// [`StreamId`] (§4.7: "gateway assigns a unique `stream_id`").
    async fn request(
        &self,
        owner: ParticipantId,
        direction: StreamDirection,
        peers: Vec<ParticipantId>,
        formats: Vec<String>,
        description: String,
    ) -> StreamId;

    /// Transitions `negotiating -> open`, responding to the gateway's own
    /// `stream/open` emission.
    ///
    /// # Errors
    /// Returns [`StreamError::NotFound`] if no such stream exists, or
    /// [`StreamError::NotOpen`] if it is not currently negotiating.
    async fn open(&self, stream_id: StreamId) -> Result<(), StreamError>;

    /// Records an inbound data chunk/frame for `stream_id`, checking that
    /// `sender` is a registered owner/peer.
    ///
    /// # Errors
    /// Returns [`StreamError::NotFound`], [`StreamError::NotOpen`], or
    /// [`StreamError::NotAPeer`].
    async fn record_data(
        &self,
        stream_id: StreamId,
        sender: ParticipantId,
        sequence: u64,
    ) -> Result<DataOutcome, StreamError>;

    /// Begins clean teardown (`stream/close`).
    ///
    /// # Errors
    /// Returns [`StreamError::NotFound`] or [`StreamError::NotOpen`].
    async fn close(&self, stream_id: StreamId, sender: ParticipantId) -> Result<(), StreamError>;

    /// Force-closes a stream due to an error or idle timeout, removing its
    /// routing state unconditionally.
    async fn terminate(&self, stream_id: StreamId);

    /// Fetches a snapshot of a tracked stream.
    ///
    /// # Errors
    /// Returns [`StreamError::NotFound`] if no such stream exists.
    async fn get(&self, stream_id: StreamId) -> Result<StreamSession, StreamError>;

    /// Returns every open stream that has been idle longer than
    /// `idle_timeout`, for the gateway's idle-sweep timer to force-close
    /// (§4.7: "a stream with no activity for a configurable idle period is
    /// force-closed").
    async fn idle_streams(&self, idle_timeout: std::time::Duration) -> Vec<StreamId>;
}
