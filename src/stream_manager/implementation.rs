//! `DashMap`-backed [`StreamManager`] implementation.
//!
//! Grounded in `message_router/implementations/agent_registry.rs`'s
//! `NodeInfo`/`node_registry` bookkeeping (an id-keyed liveness record kept
//! in a `DashMap`, updated in place), applied here per-stream instead of
//! per-cluster-node.

use super::{DataOutcome, StreamManager};
use crate::domain::{GatewayTimestamp, ParticipantId, StreamDirection, StreamId, StreamSession, StreamState};
use crate::error::StreamError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Tracks every negotiating/open stream in a space.
pub struct StreamManagerImpl {
    streams: DashMap<StreamId, StreamSession>,
}

impl StreamManagerImpl {
    /// Creates an empty stream manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
        }
    }
}

impl Default for StreamManagerImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamManager for StreamManagerImpl {
    async fn request(
        &self,
        owner: ParticipantId,
        direction: StreamDirection,
        peers: Vec<ParticipantId>,
        formats: Vec<String>,
        description: String,
    ) -> StreamId {
        let session = StreamSession::negotiate(direction, owner, peers, formats, description);
        let id = session.stream_id();
        self.streams.insert(id, session);
        id
    }

    async fn open(&self, stream_id: StreamId) -> Result<(), StreamError> {
        let mut session = self
            .streams
            .get_mut(&stream_id)
            .ok_or(StreamError::NotFound { stream: stream_id })?;
        if session.open() {
            Ok(())
        } else {
            Err(StreamError::NotOpen {
                stream: stream_id,
                state: format!("{:?}", session.state()),
            })
        }
    }

    async fn record_data(
        &self,
        stream_id: StreamId,
        sender: ParticipantId,
        sequence: u64,
    ) -> Result<DataOutcome, StreamError> {
        let mut session = self
            .streams
            .get_mut(&stream_id)
            .ok_or(StreamError::NotFound { stream: stream_id })?;
        if session.state() != StreamState::Open {
            return Err(StreamError::NotOpen {
                stream: stream_id,
                state: format!("{:?}", session.state()),
            });
        }
        if !session.is_participant(sender) {
            return Err(StreamError::NotAPeer {
                stream: stream_id,
                participant: sender,
            });
        }
        let (sequence, gap_detected) = session.record_data(sequence);
        Ok(DataOutcome { sequence, gap_detected })
    }

    async fn close(&self, stream_id: StreamId, sender: ParticipantId) -> Result<(), StreamError> {
        let mut session = self
            .streams
            .get_mut(&stream_id)
            .ok_or(StreamError::NotFound { stream: stream_id })?;
        if !session.is_participant(sender) {
            return Err(StreamError::NotAPeer {
                stream: stream_id,
                participant: sender,
            });
        }
        if session.begin_close() {
            session.close();
            Ok(())
        } else {
            Err(StreamError::NotOpen {
                stream: stream_id,
                state: format!("{:?}", session.state()),
            })
        }
    }

    async fn terminate(&self, stream_id: StreamId) {
        if let Some(mut session) = self.streams.get_mut(&stream_id) {
            session.close();
        }
        self.streams.remove(&stream_id);
    }

    async fn get(&self, stream_id: StreamId) -> Result<StreamSession, StreamError> {
        self.streams
            .get(&stream_id)
            .map(|entry| entry.value().clone())
            .ok_or(StreamError::NotFound { stream: stream_id })
    }

    async fn idle_streams(&self, idle_timeout: std::time::Duration) -> Vec<StreamId> {
        let now = GatewayTimestamp::now().as_datetime();
        self.streams
            .iter()
            .filter(|entry| {
                let session = entry.value();
                session.state() == StreamState::Open
                    && now
                        .signed_duration_since(session.last_activity().as_datetime())
                        .to_std()
                        .is_ok_and(|elapsed| elapsed >= idle_timeout)
            })
            .map(|entry| *entry.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_then_open_then_data_tracks_sequence() {
        let manager = StreamManagerImpl::new();
        let owner = ParticipantId::generate();
        let peer = ParticipantId::generate();
        let id = manager
            .request(
                owner,
                StreamDirection::Upload,
                vec![peer],
                vec!["text/plain".to_string()],
                "trace".to_string(),
            )
            .await;
        manager.open(id).await.unwrap();
        let outcome = manager.record_data(id, owner, 1).await.unwrap();
        assert_eq!(outcome.sequence, 1);
        assert!(!outcome.gap_detected);
    }

    #[tokio::test]
    async fn data_from_non_peer_is_rejected() {
        let manager = StreamManagerImpl::new();
        let owner = ParticipantId::generate();
        let id = manager
            .request(owner, StreamDirection::Upload, vec![], vec![], "t".to_string())
            .await;
        manager.open(id).await.unwrap();
        let outsider = ParticipantId::generate();
        assert!(matches!(
            manager.record_data(id, outsider, 1).await,
            Err(StreamError::NotAPeer { .. })
        ));
    }

    #[tokio::test]
    async fn close_requires_open_state() {
        let manager = StreamManagerImpl::new();
        let owner = ParticipantId::generate();
        let id = manager
            .request(owner, StreamDirection::Upload, vec![], vec![], "t".to_string())
            .await;
        assert!(manager.close(id, owner).await.is_err());
        manager.open(id).await.unwrap();
        assert!(manager.close(id, owner).await.is_ok());
    }

    #[tokio::test]
    async fn terminate_removes_routing_state() {
        let manager = StreamManagerImpl::new();
        let owner = ParticipantId::generate();
        let id = manager
            .request(owner, StreamDirection::Upload, vec![], vec![], "t".to_string())
            .await;
        manager.terminate(id).await;
        assert!(manager.get(id).await.is_err());
    }
}
