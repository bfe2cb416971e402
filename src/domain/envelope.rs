//! The Envelope: the universal message unit of the MEW wire protocol (§3, §6).

use crate::domain::primitives::{ContextId, EnvelopeId, GatewayTimestamp, ParticipantId};
use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The protocol version this gateway speaks.
pub const PROTOCOL_VERSION: &str = "mew/v0.4";

/// A validated, hierarchical envelope kind such as `mcp/request` or
/// `participant/pause`. Segments are ASCII alphanumeric plus `-`/`_`,
/// separated by `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Kind(String);

impl Kind {
    /// Parses and validates a raw kind string.
    ///
    /// # Errors
    /// Returns [`GatewayError::MalformedEnvelope`] if the string is empty, a
    /// segment is empty, or a segment contains characters outside
    /// `[A-Za-z0-9_-]`.
    pub fn try_new(raw: impl Into<String>) -> Result<Self, GatewayError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(GatewayError::MalformedEnvelope {
                reason: "kind must not be empty".to_string(),
            });
        }
        for segment in raw.split('/') {
            if segment.is_empty()
                || !segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(GatewayError::MalformedEnvelope {
                    reason: format!("kind has an invalid segment: {segment:?}"),
                });
            }
        }
        Ok(Self(raw))
    }

    /// The raw dotted/slashed kind string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The top-level family, used for dispatch (`mcp`, `system`, `chat`, ...).
    #[must_use]
    pub fn family(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Kind {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        kind.0
    }
}

/// Parameters for [`Envelope::try_new_validated`], grouped to avoid
/// `clippy::too_many_arguments`.
#[derive(Debug, Clone)]
pub struct EnvelopeParams {
    /// The sender.
    pub from: ParticipantId,
    /// Explicit recipients, or `None` for a space-wide broadcast.
    pub to: Option<Vec<ParticipantId>>,
    /// The envelope kind.
    pub kind: Kind,
    /// Envelope ids this one relates to (reply-to chain, proposal fulfillment).
    pub correlation_id: Option<Vec<EnvelopeId>>,
    /// Optional reasoning/workflow scope grouping.
    pub context: Option<ContextId>,
    /// Kind-specific structured payload.
    pub payload: Value,
}

/// The universal message unit delivered across a space (§3).
///
/// Constructed only through [`Envelope::try_new_validated`], a smart
/// constructor that stamps `id`/`ts`/`protocol` and validates the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    protocol: String,
    id: EnvelopeId,
    ts: GatewayTimestamp,
    from: ParticipantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<Vec<ParticipantId>>,
    kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<Vec<EnvelopeId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<ContextId>,
    payload: Value,
}

impl Envelope {
    /// Builds a new envelope, stamping `protocol`, `id`, and `ts`.
    ///
    /// # Errors
    /// Returns [`GatewayError::MalformedEnvelope`] if `to` is present but
    /// empty, or if `payload` is not a JSON object.
    pub fn try_new_validated(params: EnvelopeParams) -> Result<Self, GatewayError> {
        if let Some(to) = &params.to {
            if to.is_empty() {
                return Err(GatewayError::MalformedEnvelope {
                    reason: "`to` must be non-empty when present".to_string(),
                });
            }
        }
        if !params.payload.is_object() {
            return Err(GatewayError::MalformedEnvelope {
                reason: "`payload` must be a JSON object".to_string(),
            });
        }
        Ok(Self {
            protocol: PROTOCOL_VERSION.to_string(),
            id: EnvelopeId::generate(),
            ts: GatewayTimestamp::now(),
            from: params.from,
            to: params.to,
            kind: params.kind,
            correlation_id: params.correlation_id,
            context: params.context,
            payload: params.payload,
        })
    }

    /// Rebuilds an envelope received off the wire, re-validating everything
    /// the smart constructor would but preserving the sender-supplied `id`
    /// and `ts` instead of re-stamping them.
    ///
    /// Requires the codec to have already resolved `raw.from` against the
    /// authenticated identity (stamped if absent, rejected if it disagreed) —
    /// see [`crate::codec::decode_ingress`]. `raw.from` being `None` here
    /// means that resolution step was skipped, which this function treats
    /// as malformed rather than silently picking an identity.
    ///
    /// # Errors
    /// Returns [`GatewayError::ProtocolMismatch`] if `protocol` does not
    /// match [`PROTOCOL_VERSION`], or the same structural errors as
    /// [`Envelope::try_new_validated`].
    pub fn try_from_wire(raw: RawEnvelope) -> Result<Self, GatewayError> {
        if raw.protocol != PROTOCOL_VERSION {
            return Err(GatewayError::ProtocolMismatch {
                got: raw.protocol,
                expected: PROTOCOL_VERSION.to_string(),
            });
        }
        let Some(from) = raw.from else {
            return Err(GatewayError::MalformedEnvelope {
                reason: "`from` was not resolved against an authenticated identity".to_string(),
            });
        };
        if let Some(to) = &raw.to {
            if to.is_empty() {
                return Err(GatewayError::MalformedEnvelope {
                    reason: "`to` must be non-empty when present".to_string(),
                });
            }
        }
        if !raw.payload.is_object() {
            return Err(GatewayError::MalformedEnvelope {
                reason: "`payload` must be a JSON object".to_string(),
            });
        }
        Ok(Self {
            protocol: raw.protocol,
            id: raw.id,
            ts: raw.ts,
            from,
            to: raw.to,
            kind: raw.kind,
            correlation_id: raw.correlation_id,
            context: raw.context,
            payload: raw.payload,
        })
    }

    /// The envelope id.
    #[must_use]
    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    /// The sender.
    #[must_use]
    pub fn from(&self) -> ParticipantId {
        self.from
    }

    /// Explicit recipients, if any.
    #[must_use]
    pub fn to(&self) -> Option<&[ParticipantId]> {
        self.to.as_deref()
    }

    /// The envelope kind.
    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Correlated envelope ids, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&[EnvelopeId]> {
        self.correlation_id.as_deref()
    }

    /// Whether this envelope's correlation ids include `target`.
    #[must_use]
    pub fn correlates_with(&self, target: EnvelopeId) -> bool {
        self.correlation_id
            .as_ref()
            .is_some_and(|ids| ids.contains(&target))
    }

    /// The reasoning/workflow context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&ContextId> {
        self.context.as_ref()
    }

    /// The structured payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The gateway-observed timestamp.
    #[must_use]
    pub fn ts(&self) -> GatewayTimestamp {
        self.ts
    }

    /// Re-addresses this envelope to a different explicit recipient list,
    /// used by the router when fanning a broadcast out to individual queues
    /// without altering `from`/`kind`/`payload`.
    #[must_use]
    pub fn with_to(mut self, to: Option<Vec<ParticipantId>>) -> Self {
        self.to = to;
        self
    }
}

/// The wire-level shape of an envelope, deserialized before protocol
/// validation so that a protocol mismatch can be reported precisely.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    /// Declared protocol version.
    pub protocol: String,
    /// Sender-supplied (or codec-stamped) id.
    pub id: EnvelopeId,
    /// Sender-supplied (or codec-stamped) timestamp.
    pub ts: GatewayTimestamp,
    /// The sender, if the wire frame declared one. Absent on a well-behaved
    /// client (the codec stamps it from the authenticated identity);
    /// present-but-wrong is a forged `from` and must be rejected rather
    /// than silently overwritten (§3, §4.1).
    #[serde(default)]
    pub from: Option<ParticipantId>,
    /// Explicit recipients, if any.
    #[serde(default)]
    pub to: Option<Vec<ParticipantId>>,
    /// The envelope kind.
    pub kind: Kind,
    /// Correlated envelope ids, if any.
    #[serde(default)]
    pub correlation_id: Option<Vec<EnvelopeId>>,
    /// Reasoning/workflow context, if any.
    #[serde(default)]
    pub context: Option<ContextId>,
    /// Structured payload.
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_params(kind: &str) -> EnvelopeParams {
        EnvelopeParams {
            from: ParticipantId::generate(),
            to: None,
            kind: Kind::try_new(kind).unwrap(),
            correlation_id: None,
            context: None,
            payload: json!({"text": "hi"}),
        }
    }

    #[test]
    fn kind_rejects_empty_segment() {
        assert!(Kind::try_new("mcp//request").is_err());
    }

    #[test]
    fn kind_family_is_first_segment() {
        let kind = Kind::try_new("mcp/request").unwrap();
        assert_eq!(kind.family(), "mcp");
    }

    #[test]
    fn envelope_rejects_empty_to_list() {
        let mut params = make_params("chat");
        params.to = Some(vec![]);
        assert!(Envelope::try_new_validated(params).is_err());
    }

    #[test]
    fn envelope_rejects_non_object_payload() {
        let mut params = make_params("chat");
        params.payload = json!("not an object");
        assert!(Envelope::try_new_validated(params).is_err());
    }

    #[test]
    fn envelope_stamps_protocol_and_id() {
        let envelope = Envelope::try_new_validated(make_params("chat")).unwrap();
        assert_eq!(envelope.kind().as_str(), "chat");
        assert!(envelope.correlation_id().is_none());
    }

    #[test]
    fn envelope_correlates_with_checks_membership() {
        let target = EnvelopeId::generate();
        let mut params = make_params("mcp/response");
        params.correlation_id = Some(vec![target]);
        let envelope = Envelope::try_new_validated(params).unwrap();
        assert!(envelope.correlates_with(target));
        assert!(!envelope.correlates_with(EnvelopeId::generate()));
    }
}
