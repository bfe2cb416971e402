//! `DashMap`-backed [`ParticipantRegistry`] implementation.
//!
//! One `DashMap` for O(1) record lookup plus one
//! `DashMap<kind prefix, HashSet<id>>` for capability-based discovery, with
//! insert/remove-with-index-cleanup.

use super::ParticipantRegistry;
use crate::domain::{Capability, ParticipantId, ParticipantRecord, PresenceState};
use crate::error::RegistryError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;

/// `DashMap`-indexed participant registry for a single space.
pub struct ParticipantRegistryImpl {
    participants: DashMap<ParticipantId, ParticipantRecord>,
    kind_index: DashMap<String, HashSet<ParticipantId>>,
}

impl ParticipantRegistryImpl {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            participants: DashMap::new(),
            kind_index: DashMap::new(),
        }
    }

    fn index_capabilities(&self, id: ParticipantId, capabilities: &[Capability]) {
        for capability in capabilities {
            let Some(prefix) = capability_family(capability) else {
                continue;
            };
            self.kind_index
                .entry(prefix)
                .and_modify(|ids| {
                    ids.insert(id);
                })
                .or_insert_with(|| HashSet::from([id]));
        }
    }

    fn deindex_capabilities(&self, id: ParticipantId, capabilities: &[Capability]) {
        for capability in capabilities {
            let Some(prefix) = capability_family(capability) else {
                continue;
            };
            if let Some(mut ids) = self.kind_index.get_mut(&prefix) {
                ids.remove(&id);
                if ids.is_empty() {
                    drop(ids);
                    self.kind_index.remove(&prefix);
                }
            }
        }
    }
}

impl Default for ParticipantRegistryImpl {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort discovery key for a capability: its kind pattern's literal
/// first segment, used only to narrow discovery candidates — authorization
/// itself always goes through the matcher.
fn capability_family(capability: &Capability) -> Option<String> {
    capability
        .kind_pattern()
        .literal_prefix()
        .map(ToString::to_string)
}

#[async_trait]
impl ParticipantRegistry for ParticipantRegistryImpl {
    async fn register(
        &self,
        id: ParticipantId,
        capabilities: Vec<Capability>,
    ) -> Result<(), RegistryError> {
        if self.participants.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered { participant: id });
        }
        self.index_capabilities(id, &capabilities);
        self.participants
            .insert(id, ParticipantRecord::new(id, capabilities));
        Ok(())
    }

    async fn deregister(&self, id: ParticipantId) -> Result<(), RegistryError> {
        let (_, record) = self
            .participants
            .remove(&id)
            .ok_or(RegistryError::NotFound { participant: id })?;
        self.deindex_capabilities(id, record.capabilities());
        Ok(())
    }

    async fn get(&self, id: ParticipantId) -> Result<ParticipantRecord, RegistryError> {
        self.participants
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::NotFound { participant: id })
    }

    async fn update(
        &self,
        id: ParticipantId,
        update: Box<dyn FnOnce(&mut ParticipantRecord) + Send>,
    ) -> Result<ParticipantRecord, RegistryError> {
        let mut entry = self
            .participants
            .get_mut(&id)
            .ok_or(RegistryError::NotFound { participant: id })?;
        update(&mut entry);
        Ok(entry.clone())
    }

    async fn list_active(&self) -> Vec<ParticipantRecord> {
        self.participants
            .iter()
            .filter(|entry| entry.value().presence_state() == PresenceState::Active)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn list_all(&self) -> Vec<ParticipantRecord> {
        self.participants
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn find_by_kind_prefix(&self, kind_prefix: &str) -> Vec<ParticipantId> {
        self.kind_index
            .get(kind_prefix)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    async fn transition_presence(
        &self,
        id: ParticipantId,
        next: PresenceState,
    ) -> Result<(), RegistryError> {
        let mut entry = self
            .participants
            .get_mut(&id)
            .ok_or(RegistryError::NotFound { participant: id })?;
        let from = entry.presence_state();
        if entry.transition_to(next) {
            Ok(())
        } else {
            Err(RegistryError::InvalidTransition {
                participant: id,
                from: from.to_string(),
                to: next.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KindPattern;

    fn chat_capability() -> Capability {
        Capability::new(KindPattern::parse("chat").unwrap(), None)
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = ParticipantRegistryImpl::new();
        let id = ParticipantId::generate();
        registry.register(id, vec![chat_capability()]).await.unwrap();
        let record = registry.get(id).await.unwrap();
        assert_eq!(record.id(), id);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = ParticipantRegistryImpl::new();
        let id = ParticipantId::generate();
        registry.register(id, vec![]).await.unwrap();
        assert!(registry.register(id, vec![]).await.is_err());
    }

    #[tokio::test]
    async fn deregister_cleans_up_kind_index() {
        let registry = ParticipantRegistryImpl::new();
        let id = ParticipantId::generate();
        registry.register(id, vec![chat_capability()]).await.unwrap();
        assert_eq!(registry.find_by_kind_prefix("chat").await, vec![id]);
        registry.deregister(id).await.unwrap();
        assert!(registry.find_by_kind_prefix("chat").await.is_empty());
    }

    #[tokio::test]
    async fn transition_presence_enforces_state_machine() {
        use crate::domain::PresenceState;
        let registry = ParticipantRegistryImpl::new();
        let id = ParticipantId::generate();
        registry.register(id, vec![]).await.unwrap();
        assert!(
            registry
                .transition_presence(id, PresenceState::Paused)
                .await
                .is_err()
        );
        registry
            .transition_presence(id, PresenceState::Active)
            .await
            .unwrap();
        registry
            .transition_presence(id, PresenceState::Paused)
            .await
            .unwrap();
    }
}
