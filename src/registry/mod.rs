//! The Participant Registry (§4.4): O(1) participant lookup and
//! capability-based discovery, scoped to one space.

mod implementation;

pub use implementation::ParticipantRegistryImpl;

use crate::domain::{Capability, ParticipantId, ParticipantRecord, PresenceState};
use crate::error::RegistryError;
use async_trait::async_trait;

/// The Participant Registry operations (§4.4): register/deregister/lookup
/// plus capability-based discovery, all O(1).
#[async_trait]
pub trait ParticipantRegistry: Send + Sync {
    /// Registers a newly joined participant in the `joining` state.
    ///
    /// # Errors
    /// Returns [`RegistryError::AlreadyRegistered`] if the id is already present.
    async fn register(
        &self,
        id: ParticipantId,
        capabilities: Vec<Capability>,
    ) -> Result<(), RegistryError>;

    /// Removes a participant and cleans up its capability index entries.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if the id is not registered.
    async fn deregister(&self, id: ParticipantId) -> Result<(), RegistryError>;

    /// Fetches a snapshot of a participant's current record.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if the id is not registered.
    async fn get(&self, id: ParticipantId) -> Result<ParticipantRecord, RegistryError>;

    /// Applies `update` to the stored record for `id` under the registry's
    /// internal lock and returns the updated snapshot.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if the id is not registered.
    async fn update(
        &self,
        id: ParticipantId,
        update: Box<dyn FnOnce(&mut ParticipantRecord) + Send>,
    ) -> Result<ParticipantRecord, RegistryError>;

    /// Lists every participant currently in the `active` presence state.
    async fn list_active(&self) -> Vec<ParticipantRecord>;

    /// Lists every participant regardless of presence state.
    async fn list_all(&self) -> Vec<ParticipantRecord>;

    /// Finds participants whose capability list grants `kind` outright
    /// (used for discovery, not for per-envelope authorization, which goes
    /// through [`crate::capability_matcher::can_send`]).
    async fn find_by_kind_prefix(&self, kind_prefix: &str) -> Vec<ParticipantId>;

    /// Transitions a participant's presence state.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if the id is not registered, or
    /// [`RegistryError::InvalidTransition`] if the transition is illegal.
    async fn transition_presence(
        &self,
        id: ParticipantId,
        next: PresenceState,
    ) -> Result<(), RegistryError>;
}
