//! Stream Session state (§3, §4.7): out-of-band high-volume channels
//! (reasoning traces, large tool outputs, media) negotiated alongside the
//! main envelope stream.

use crate::domain::primitives::{GatewayTimestamp, ParticipantId, StreamId};
use serde::{Deserialize, Serialize};

/// Which way data flows on a stream, relative to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamDirection {
    /// Owner sends data to peers.
    Upload,
    /// Owner receives data from peers.
    Download,
    /// Data flows both ways.
    Bidirectional,
}

/// Negotiation/lifecycle state of a stream (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// `stream/request` sent, `stream/open` not yet issued.
    Negotiating,
    /// Open and carrying data.
    Open,
    /// `stream/close` sent, teardown in progress.
    Closing,
    /// Fully torn down; routing state removed.
    Closed,
}

/// A router-tracked stream session (§3).
#[derive(Debug, Clone)]
pub struct StreamSession {
    stream_id: StreamId,
    direction: StreamDirection,
    owner: ParticipantId,
    peers: Vec<ParticipantId>,
    formats: Vec<String>,
    description: String,
    state: StreamState,
    sequence_counter: u64,
    last_activity: GatewayTimestamp,
}

impl StreamSession {
    /// Negotiates a new stream, assigning a fresh [`StreamId`].
    #[must_use]
    pub fn negotiate(
        direction: StreamDirection,
        owner: ParticipantId,
        peers: Vec<ParticipantId>,
        formats: Vec<String>,
        description: String,
    ) -> Self {
        Self {
            stream_id: StreamId::generate(),
            direction,
            owner,
            peers,
            formats,
            description,
            state: StreamState::Negotiating,
            sequence_counter: 0,
            last_activity: GatewayTimestamp::now(),
        }
    }

    /// The assigned stream id.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The owner (the participant who sent `stream/request`).
    #[must_use]
    pub fn owner(&self) -> ParticipantId {
        self.owner
    }

    /// The peers this stream is shared with.
    #[must_use]
    pub fn peers(&self) -> &[ParticipantId] {
        &self.peers
    }

    /// The direction negotiated for this stream.
    #[must_use]
    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    /// The negotiated payload formats, if any were offered.
    #[must_use]
    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether `participant` is the owner or a registered peer.
    #[must_use]
    pub fn is_participant(&self, participant: ParticipantId) -> bool {
        self.owner == participant || self.peers.contains(&participant)
    }

    /// Transitions `negotiating -> open`, responding to the gateway's
    /// `stream/open`.
    pub fn open(&mut self) -> bool {
        if self.state != StreamState::Negotiating {
            return false;
        }
        self.state = StreamState::Open;
        self.last_activity = GatewayTimestamp::now();
        true
    }

    /// Records a data chunk, returning the assigned sequence number and
    /// whether a gap was detected relative to the last observed sequence
    /// (§4.7: gaps are reported as a warning, not a termination).
    pub fn record_data(&mut self, observed_sequence: u64) -> (u64, bool) {
        let expected = self.sequence_counter + 1;
        let gap = observed_sequence != expected;
        self.sequence_counter = observed_sequence.max(self.sequence_counter);
        self.last_activity = GatewayTimestamp::now();
        (observed_sequence, gap)
    }

    /// Allocates and returns the next outgoing sequence number.
    pub fn next_outgoing_sequence(&mut self) -> u64 {
        self.sequence_counter += 1;
        self.last_activity = GatewayTimestamp::now();
        self.sequence_counter
    }

    /// Begins clean teardown (`stream/close`).
    pub fn begin_close(&mut self) -> bool {
        if self.state != StreamState::Open {
            return false;
        }
        self.state = StreamState::Closing;
        true
    }

    /// Finalizes teardown, removing routing state.
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }

    /// The last time this stream saw open/negotiate/data activity.
    #[must_use]
    pub fn last_activity(&self) -> GatewayTimestamp {
        self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> StreamSession {
        StreamSession::negotiate(
            StreamDirection::Upload,
            ParticipantId::generate(),
            vec![ParticipantId::generate()],
            vec!["text/plain".to_string()],
            "trace".to_string(),
        )
    }

    #[test]
    fn negotiate_starts_in_negotiating_state() {
        assert_eq!(stream().state(), StreamState::Negotiating);
    }

    #[test]
    fn open_requires_negotiating() {
        let mut session = stream();
        assert!(session.open());
        assert!(!session.open());
    }

    #[test]
    fn in_order_sequence_has_no_gap() {
        let mut session = stream();
        session.open();
        let (sequence, gap) = session.record_data(1);
        assert_eq!(sequence, 1);
        assert!(!gap);
        let (sequence, gap) = session.record_data(2);
        assert_eq!(sequence, 2);
        assert!(!gap);
    }

    #[test]
    fn skipped_sequence_is_reported_as_gap_not_terminated() {
        let mut session = stream();
        session.open();
        let (_, gap) = session.record_data(5);
        assert!(gap);
        assert_eq!(session.state(), StreamState::Open);
    }
}
