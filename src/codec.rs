//! The Envelope Codec (§4.1): ingress validation, canonicalization, and
//! (de)serialization of the wire-level JSON envelope.
//!
//! Grounded in `fipa.rs::validate_fipa_message` and
//! `message_router::domain_types::FipaMessage::try_new_validated` — the
//! "validate everything in one pass, return a structured error" idiom,
//! generalized from FIPA ACL fields to the MEW envelope schema (§6).

use crate::domain::{Envelope, EnvelopeId, MaxEnvelopeBytes, ParticipantId, RawEnvelope, PROTOCOL_VERSION};
use crate::error::GatewayError;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Decodes and validates a raw text frame as an envelope on ingress.
///
/// Checks, in order: size cap, JSON structure, protocol tag, and the
/// envelope's own structural invariants (§3). `from` is stamped to
/// `authenticated_id` when the wire frame omitted it; when the wire frame
/// declared a `from` that disagrees with `authenticated_id`, the envelope is
/// rejected outright rather than silently overwritten — `from` is never
/// forgeable after authentication (§3, §4.1).
///
/// # Errors
/// Returns [`GatewayError::MalformedEnvelope`] for JSON/structural failures
/// or a declared-vs-authenticated `from` mismatch, or
/// [`GatewayError::ProtocolMismatch`] for a wrong `protocol` tag.
pub fn decode_ingress(
    raw: &str,
    authenticated_id: ParticipantId,
    max_size: MaxEnvelopeBytes,
) -> Result<Envelope, GatewayError> {
    if raw.len() > max_size.as_usize() {
        return Err(GatewayError::MalformedEnvelope {
            reason: format!(
                "envelope of {} bytes exceeds the {}-byte cap",
                raw.len(),
                max_size.as_usize()
            ),
        });
    }

    let mut wire: RawEnvelope = serde_json::from_str(raw).map_err(|err| {
        GatewayError::MalformedEnvelope {
            reason: format!("invalid JSON: {err}"),
        }
    })?;
    match wire.from {
        None => wire.from = Some(authenticated_id),
        Some(declared) if declared != authenticated_id => {
            return Err(GatewayError::MalformedEnvelope {
                reason: format!(
                    "declared `from` {declared} does not match the authenticated identity {authenticated_id}"
                ),
            });
        }
        Some(_) => {}
    }

    Envelope::try_from_wire(wire)
}

/// Serializes an envelope as canonical wire JSON (§4.1: UTF-8, RFC 8259
/// conformant; stable key order is not required).
///
/// # Errors
/// Returns [`GatewayError::Internal`] if serialization somehow fails (it
/// cannot for a well-formed `Envelope`, but the codec still surfaces a
/// `Result` rather than panicking on an invariant it does not itself own).
pub fn encode_egress(envelope: &Envelope) -> Result<String, GatewayError> {
    serde_json::to_string(envelope).map_err(|err| GatewayError::Internal {
        detail: format!("failed to serialize envelope: {err}"),
    })
}

/// Whether `protocol` is one this gateway speaks (§4.1).
#[must_use]
pub fn is_supported_protocol(protocol: &str) -> bool {
    protocol == PROTOCOL_VERSION
}

/// A bounded recent-id window used to reject duplicate `id`s within one
/// connection's lifetime (§4.1).
pub struct DuplicateIdWindow {
    capacity: usize,
    seen: Mutex<(VecDeque<EnvelopeId>, std::collections::HashSet<EnvelopeId>)>,
}

impl DuplicateIdWindow {
    /// Creates a window retaining the most recent `capacity` envelope ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: Mutex::new((VecDeque::new(), std::collections::HashSet::new())),
        }
    }

    /// Records `id`, returning `true` if it was already seen in the current
    /// window (a duplicate that should be rejected).
    pub fn observe(&self, id: EnvelopeId) -> bool {
        let mut guard = self.seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (order, set) = &mut *guard;
        if !set.insert(id) {
            return true;
        }
        order.push_back(id);
        if order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                set.remove(&oldest);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnvelopeParams, Kind};
    use serde_json::json;

    fn sample_envelope(from: ParticipantId) -> Envelope {
        Envelope::try_new_validated(EnvelopeParams {
            from,
            to: None,
            kind: Kind::try_new("chat").unwrap(),
            correlation_id: None,
            context: None,
            payload: json!({"text": "hi"}),
        })
        .unwrap()
    }

    #[test]
    fn round_trip_encode_decode_is_idempotent() {
        let id = ParticipantId::generate();
        let envelope = sample_envelope(id);
        let wire = encode_egress(&envelope).unwrap();
        let decoded = decode_ingress(&wire, id, MaxEnvelopeBytes::try_new(1_048_576).unwrap()).unwrap();
        assert_eq!(decoded.id(), envelope.id());
        assert_eq!(decoded.kind().as_str(), "chat");
    }

    #[test]
    fn oversized_envelope_is_rejected() {
        let id = ParticipantId::generate();
        let wire = encode_egress(&sample_envelope(id)).unwrap();
        let tiny_cap = MaxEnvelopeBytes::try_new((wire.len() / 2).max(1)).unwrap();
        assert!(decode_ingress(&wire, id, tiny_cap).is_err());
    }

    #[test]
    fn from_is_stamped_when_absent_from_the_wire() {
        let id = ParticipantId::generate();
        let mut value: serde_json::Value =
            serde_json::from_str(&encode_egress(&sample_envelope(id)).unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("from");
        let raw = serde_json::to_string(&value).unwrap();

        let authenticated = ParticipantId::generate();
        let decoded =
            decode_ingress(&raw, authenticated, MaxEnvelopeBytes::try_new(1_048_576).unwrap()).unwrap();
        assert_eq!(decoded.from(), authenticated);
    }

    #[test]
    fn from_matching_the_authenticated_identity_is_accepted() {
        let id = ParticipantId::generate();
        let wire = encode_egress(&sample_envelope(id)).unwrap();
        let decoded =
            decode_ingress(&wire, id, MaxEnvelopeBytes::try_new(1_048_576).unwrap()).unwrap();
        assert_eq!(decoded.from(), id);
    }

    #[test]
    fn from_mismatching_the_authenticated_identity_is_rejected() {
        let id = ParticipantId::generate();
        let other = ParticipantId::generate();
        let wire = encode_egress(&sample_envelope(id)).unwrap();
        assert!(matches!(
            decode_ingress(&wire, other, MaxEnvelopeBytes::try_new(1_048_576).unwrap()),
            Err(GatewayError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn protocol_mismatch_is_detected() {
        let id = ParticipantId::generate();
        let mut value: serde_json::Value =
            serde_json::from_str(&encode_egress(&sample_envelope(id)).unwrap()).unwrap();
        value["protocol"] = json!("mew/v0.1");
        let raw = serde_json::to_string(&value).unwrap();
        assert!(matches!(
            decode_ingress(&raw, id, MaxEnvelopeBytes::try_new(1_048_576).unwrap()),
            Err(GatewayError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn duplicate_id_window_detects_repeats_and_evicts_oldest() {
        let window = DuplicateIdWindow::new(2);
        let a = EnvelopeId::generate();
        let b = EnvelopeId::generate();
        let c = EnvelopeId::generate();
        assert!(!window.observe(a));
        assert!(window.observe(a));
        assert!(!window.observe(b));
        assert!(!window.observe(c));
        // `a` has now been evicted by the capacity-2 window, so it is
        // treated as fresh again.
        assert!(!window.observe(a));
    }
}
