//! The Capability Matcher (§4.2): a pure, side-effect-free function from an
//! ordered capability list and an envelope to an allow/deny decision.
//!
//! Grounded in the recursive structural description style of
//! `domain/mcp.rs`'s `CapabilityAllowlist`, generalized from a fixed
//! network/filesystem/system shape to an arbitrary kind/payload pattern.
//! Kept pure per spec §8's matcher-purity law: same inputs always produce
//! the same output, with no observable side effects.

use crate::domain::capability::Capability;
use crate::domain::envelope::Envelope;

/// Whether `envelope` is permitted by `capabilities`.
///
/// `can_send(capabilities, envelope) = (∃ positive capability matches) ∧
/// ¬(∃ negative capability matches)` (§4.2): the effective grant is the
/// union of every matching positive capability, with any matching negative
/// (`!`-prefixed) capability removing the grant entirely.
#[must_use]
pub fn can_send(capabilities: &[Capability], envelope: &Envelope) -> bool {
    let mut has_positive_match = false;
    let mut has_negative_match = false;
    for capability in capabilities {
        if capability.matches(envelope) {
            if capability.is_negated() {
                has_negative_match = true;
            } else {
                has_positive_match = true;
            }
        }
    }
    has_positive_match && !has_negative_match
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::KindPattern;
    use crate::domain::envelope::{EnvelopeParams, Kind};
    use crate::domain::primitives::ParticipantId;
    use serde_json::json;

    fn envelope(kind: &str) -> Envelope {
        Envelope::try_new_validated(EnvelopeParams {
            from: ParticipantId::generate(),
            to: None,
            kind: Kind::try_new(kind).unwrap(),
            correlation_id: None,
            context: None,
            payload: json!({}),
        })
        .unwrap()
    }

    #[test]
    fn no_capabilities_denies_everything() {
        assert!(!can_send(&[], &envelope("chat")));
    }

    #[test]
    fn matching_capability_grants() {
        let caps = vec![Capability::new(KindPattern::parse("chat").unwrap(), None)];
        assert!(can_send(&caps, &envelope("chat")));
    }

    #[test]
    fn later_negation_overrides_earlier_grant() {
        let caps = vec![
            Capability::new(KindPattern::parse("mcp/*").unwrap(), None),
            Capability::new(KindPattern::parse("!mcp/withdraw").unwrap(), None),
        ];
        assert!(can_send(&caps, &envelope("mcp/request")));
        assert!(!can_send(&caps, &envelope("mcp/withdraw")));
    }

    #[test]
    fn matcher_is_pure_and_idempotent() {
        let caps = vec![Capability::new(KindPattern::parse("chat").unwrap(), None)];
        let e = envelope("chat");
        assert_eq!(can_send(&caps, &e), can_send(&caps, &e));
    }
}
