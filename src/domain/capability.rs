//! Capability grants: a pattern over envelope kind + payload shape (§3, §4.2).

use crate::domain::envelope::{Envelope, Kind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single glob segment in a [`KindPattern`]: a literal token or `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KindSegment {
    Literal(String),
    Wildcard,
}

/// A `kind` pattern: a `/`-segmented glob, optionally negated with a
/// leading `!` (§3). `mcp/*` matches `mcp/request` and `mcp/response`;
/// `!mcp/withdraw` matches `mcp/withdraw` for negation purposes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KindPattern {
    raw: String,
    negated: bool,
    #[serde(skip)]
    segments: Vec<KindSegment>,
}

impl KindPattern {
    /// Parses a kind pattern such as `mcp/*` or `!mcp/withdraw`.
    ///
    /// # Errors
    /// Returns an error string if the pattern (after stripping an optional
    /// leading `!`) has an empty segment.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (negated, body) = raw
            .strip_prefix('!')
            .map_or((false, raw), |rest| (true, rest));
        let segments = body
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    Err(format!("empty kind pattern segment in {raw:?}"))
                } else if segment == "*" {
                    Ok(KindSegment::Wildcard)
                } else {
                    Ok(KindSegment::Literal(segment.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: raw.to_string(),
            negated,
            segments,
        })
    }

    /// Whether this pattern is a negation (`!`-prefixed).
    #[must_use]
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// The pattern's first segment, if it is a literal rather than a
    /// wildcard — used for coarse discovery indexing, not authorization.
    #[must_use]
    pub fn literal_prefix(&self) -> Option<&str> {
        match self.segments.first() {
            Some(KindSegment::Literal(literal)) => Some(literal.as_str()),
            _ => None,
        }
    }

    /// Whether `kind` matches this pattern's glob, ignoring negation.
    #[must_use]
    pub fn matches_kind(&self, kind: &Kind) -> bool {
        let kind_segments: Vec<&str> = kind.as_str().split('/').collect();
        if kind_segments.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(kind_segments.iter())
            .all(|(pattern, actual)| match pattern {
                KindSegment::Wildcard => true,
                KindSegment::Literal(literal) => literal == actual,
            })
    }
}

impl TryFrom<String> for KindPattern {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KindPattern> for String {
    fn from(pattern: KindPattern) -> Self {
        pattern.raw
    }
}

/// A recursive structural pattern over a JSON payload (§3). Object keys in
/// the pattern must all be present and match; array patterns use subset
/// semantics (every pattern element must match some value element);
/// [`PayloadPattern::Wildcard`] matches anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadPattern {
    /// Matches any value.
    Wildcard,
    /// Matches only this exact JSON value.
    Literal(Value),
    /// Every element of the pattern array must be matched by at least one
    /// element of the candidate array (subset semantics, not positional).
    Array(Vec<PayloadPattern>),
    /// Every key in the pattern map must be present in the candidate object
    /// and match the corresponding nested pattern. Extra keys in the
    /// candidate are ignored.
    Object(std::collections::BTreeMap<String, PayloadPattern>),
}

impl PayloadPattern {
    /// A wildcard `*` parsed from the wire (convenience constructor used by
    /// deserializers that see the literal string `"*"`).
    #[must_use]
    pub fn wildcard() -> Self {
        Self::Wildcard
    }

    /// Whether `value` satisfies this pattern.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Literal(expected) => expected == value,
            Self::Array(patterns) => {
                let Value::Array(items) = value else {
                    return false;
                };
                patterns
                    .iter()
                    .all(|pattern| items.iter().any(|item| pattern.matches(item)))
            }
            Self::Object(fields) => {
                let Value::Object(map) = value else {
                    return false;
                };
                fields.iter().all(|(key, pattern)| {
                    map.get(key).is_some_and(|candidate| pattern.matches(candidate))
                })
            }
        }
    }
}

/// A single capability grant: a kind pattern plus an optional payload
/// constraint (§3, §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    kind: KindPattern,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<PayloadPattern>,
}

impl Capability {
    /// Builds a capability from a kind pattern and optional payload pattern.
    #[must_use]
    pub fn new(kind: KindPattern, payload: Option<PayloadPattern>) -> Self {
        Self { kind, payload }
    }

    /// Whether this is a negation grant.
    #[must_use]
    pub fn is_negated(&self) -> bool {
        self.kind.is_negated()
    }

    /// The capability's kind pattern.
    #[must_use]
    pub fn kind_pattern(&self) -> &KindPattern {
        &self.kind
    }

    /// Whether `envelope` satisfies both the kind glob and the payload
    /// structural constraint (§4.2's "matches" relation).
    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.kind.matches_kind(envelope.kind())
            && self
                .payload
                .as_ref()
                .is_none_or(|pattern| pattern.matches(envelope.payload()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::{Envelope, EnvelopeParams};
    use crate::domain::primitives::ParticipantId;
    use serde_json::json;

    fn envelope(kind: &str, payload: Value) -> Envelope {
        Envelope::try_new_validated(EnvelopeParams {
            from: ParticipantId::generate(),
            to: None,
            kind: Kind::try_new(kind).unwrap(),
            correlation_id: None,
            context: None,
            payload,
        })
        .unwrap()
    }

    #[test]
    fn kind_pattern_glob_matches_any_segment() {
        let pattern = KindPattern::parse("mcp/*").unwrap();
        assert!(pattern.matches_kind(&Kind::try_new("mcp/request").unwrap()));
        assert!(!pattern.matches_kind(&Kind::try_new("chat").unwrap()));
    }

    #[test]
    fn kind_pattern_negation_is_tracked_not_matched_differently() {
        let pattern = KindPattern::parse("!mcp/withdraw").unwrap();
        assert!(pattern.is_negated());
        assert!(pattern.matches_kind(&Kind::try_new("mcp/withdraw").unwrap()));
    }

    #[test]
    fn payload_pattern_object_requires_all_keys() {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("method".to_string(), PayloadPattern::Literal(json!("tools/call")));
        let pattern = PayloadPattern::Object(fields);
        assert!(pattern.matches(&json!({"method": "tools/call", "params": {}})));
        assert!(!pattern.matches(&json!({"method": "tools/list"})));
    }

    #[test]
    fn payload_pattern_array_is_subset_not_positional() {
        let pattern = PayloadPattern::Array(vec![PayloadPattern::Literal(json!(1))]);
        assert!(pattern.matches(&json!([2, 1, 3])));
        assert!(!pattern.matches(&json!([2, 3])));
    }

    #[test]
    fn capability_matches_requires_kind_and_payload() {
        let capability = Capability::new(
            KindPattern::parse("chat").unwrap(),
            Some(PayloadPattern::Object({
                let mut fields = std::collections::BTreeMap::new();
                fields.insert("text".to_string(), PayloadPattern::wildcard());
                fields
            })),
        );
        assert!(capability.matches(&envelope("chat", json!({"text": "hi"}))));
        assert!(!capability.matches(&envelope("chat", json!({"format": "markdown"}))));
    }
}
