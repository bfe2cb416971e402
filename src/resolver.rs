//! The external resolver contract (§6): `resolve(token) -> {space, id,
//! caps}` or `invalid`. Space configuration loading (YAML capability
//! tables) is out of scope (§1); this module only defines the contract the
//! gateway depends on and an in-memory implementation usable for tests and
//! single-node deployments.
//!
//! Follows the same dependency-injection pattern used elsewhere in this
//! crate: a trait object constructed externally and handed in as
//! `Arc<dyn Trait>`, applied here to token resolution.

use crate::domain::{Capability, ParticipantId, SpaceId};
use async_trait::async_trait;
use dashmap::DashMap;

/// What a bearer token resolves to, per §6.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    /// Which space this token grants access to.
    pub space: SpaceId,
    /// The participant id this token authenticates as.
    pub participant_id: ParticipantId,
    /// The capabilities granted to this participant for the join session.
    pub capabilities: Vec<Capability>,
}

/// The external authentication contract (§6): resolves an opaque bearer
/// token to a `(space, participant_id, capabilities)` triple, or reports it
/// invalid. Space configuration loading/YAML parsing/template scaffolding
/// are out of scope (§1) — this trait is the seam a real implementation of
/// those plugs into.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// Resolves `token`, returning `None` if it is invalid or revoked
    /// (§7: `auth_failed`).
    async fn resolve(&self, token: &str) -> Option<ResolvedIdentity>;

    /// Returns the full participant set and default capabilities
    /// configured for `space`, used by [`crate::registry`] to seed a
    /// `system/welcome`'s `participants` list for participants not yet
    /// connected. Returns an empty vec if the space is unknown.
    async fn known_participants(&self, space: &SpaceId) -> Vec<(ParticipantId, Vec<Capability>)>;
}

/// An in-memory [`TokenResolver`] mapping static tokens to identities,
/// suitable for tests and single-node deployments where capability tables
/// are assembled in process rather than loaded from YAML.
#[derive(Default)]
pub struct InMemoryTokenResolver {
    tokens: DashMap<String, ResolvedIdentity>,
}

impl InMemoryTokenResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as resolving to `identity`.
    pub fn grant(&self, token: impl Into<String>, identity: ResolvedIdentity) {
        self.tokens.insert(token.into(), identity);
    }

    /// Revokes a previously granted token.
    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }
}

#[async_trait]
impl TokenResolver for InMemoryTokenResolver {
    async fn resolve(&self, token: &str) -> Option<ResolvedIdentity> {
        self.tokens.get(token).map(|entry| entry.value().clone())
    }

    async fn known_participants(&self, space: &SpaceId) -> Vec<(ParticipantId, Vec<Capability>)> {
        self.tokens
            .iter()
            .filter(|entry| &entry.value().space == space)
            .map(|entry| (entry.value().participant_id, entry.value().capabilities.clone()))
            .collect()
    }
}
