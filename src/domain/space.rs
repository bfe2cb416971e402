//! The Space aggregate (§3): `{space_id, participants, broadcast_sequence}`,
//! the unit that owns one registry, proposal engine, and stream manager
//! instance.

use crate::domain::primitives::SpaceId;
use std::sync::atomic::{AtomicU64, Ordering};

/// The space aggregate's identity and broadcast sequence counter.
///
/// Participant storage itself lives in the [`crate::registry`]'s
/// `DashMap`-backed registry rather than here — a thin aggregate identity
/// separate from the concurrent index; `Space` is the handle the router,
/// registry, proposal engine, and stream manager are all constructed
/// per-instance for.
#[derive(Debug)]
pub struct Space {
    space_id: SpaceId,
    broadcast_sequence: AtomicU64,
}

impl Space {
    /// Creates a space, as happens on first join (§3: "created on first
    /// join, destroyed when empty after a grace period").
    #[must_use]
    pub fn new(space_id: SpaceId) -> Self {
        Self {
            space_id,
            broadcast_sequence: AtomicU64::new(0),
        }
    }

    /// The space id.
    #[must_use]
    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// Allocates and returns the next broadcast sequence number, used to
    /// order fan-out deliveries within this space.
    pub fn next_broadcast_sequence(&self) -> u64 {
        self.broadcast_sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// The current broadcast sequence counter value.
    #[must_use]
    pub fn broadcast_sequence(&self) -> u64 {
        self.broadcast_sequence.load(Ordering::SeqCst)
    }
}
