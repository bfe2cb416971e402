//! Crate-wide error types.
//!
//! `GatewayError` is the error surface exposed to an envelope sender (its
//! variants map 1:1 to the `system/error` `code` values of §7). Subsystem
//! errors (`RouterError`, `RegistryError`, `ProposalError`, `StreamError`,
//! `ConfigError`) stay structured, one enum per subsystem, and convert into
//! `GatewayError` at the boundary where a `system/error` envelope is
//! produced.

use crate::domain::primitives::{EnvelopeId, ParticipantId, ProposalId, StreamId};
use thiserror::Error;

/// The `code` field sent back in a `system/error` envelope (§7 taxonomy).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The envelope's `protocol` tag does not match a version this gateway speaks.
    #[error("protocol mismatch: got {got}, expected {expected}")]
    ProtocolMismatch {
        /// What the envelope declared.
        got: String,
        /// What the gateway speaks.
        expected: String,
    },

    /// The envelope failed structural or field validation.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// Human-readable validation failure.
        reason: String,
    },

    /// The bearer token did not resolve to a valid participant.
    #[error("authentication failed")]
    AuthFailed,

    /// The requested state transition conflicts with the current state.
    #[error("conflict: {reason}")]
    Conflict {
        /// What was in conflict.
        reason: String,
    },

    /// The sender lacks a capability covering this envelope's kind/payload.
    #[error("capability violation: {participant} may not send {kind}")]
    CapabilityViolation {
        /// The sender.
        participant: ParticipantId,
        /// The envelope kind that was denied.
        kind: String,
    },

    /// `to` named a participant id not present in the space.
    #[error("unknown recipient: {participant}")]
    UnknownRecipient {
        /// The unresolvable recipient id.
        participant: ParticipantId,
    },

    /// A per-connection send queue could not absorb this envelope.
    #[error("backpressure: {detail}")]
    Backpressure {
        /// What overflowed.
        detail: String,
    },

    /// The sender exceeded its configured ingress rate.
    #[error("rate limited: {limit} envelopes/sec")]
    RateLimited {
        /// The configured limit that was exceeded.
        limit: u32,
    },

    /// The connection was idle past its heartbeat deadline.
    #[error("idle timeout after {missed_pongs} missed pongs")]
    IdleTimeout {
        /// Number of consecutive missed pongs observed.
        missed_pongs: u8,
    },

    /// An unexpected internal failure.
    #[error("internal error: {detail}")]
    Internal {
        /// Developer-facing detail, not sent verbatim to clients.
        detail: String,
    },
}

impl GatewayError {
    /// The `code` string placed in a `system/error` payload.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProtocolMismatch { .. } => "protocol_mismatch",
            Self::MalformedEnvelope { .. } => "malformed_envelope",
            Self::AuthFailed => "auth_failed",
            Self::Conflict { .. } => "conflict",
            Self::CapabilityViolation { .. } => "capability_violation",
            Self::UnknownRecipient { .. } => "unknown_recipient",
            Self::Backpressure { .. } => "backpressure",
            Self::RateLimited { .. } => "rate_limited",
            Self::IdleTimeout { .. } => "idle_timeout",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Errors raised by the Router (§4.5).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The inbound queue rejected the envelope because it is full.
    #[error("inbound queue full (depth {depth})")]
    QueueFull {
        /// Configured queue depth.
        depth: usize,
    },

    /// The envelope named a recipient absent from the space.
    #[error("unknown recipient: {participant}")]
    UnknownRecipient {
        /// The unresolvable recipient id.
        participant: ParticipantId,
    },

    /// The sender is not authorized to send this envelope.
    #[error("capability violation for {participant} sending {kind}")]
    CapabilityViolation {
        /// The sender.
        participant: ParticipantId,
        /// The denied kind.
        kind: String,
    },

    /// The router has been shut down and no longer accepts envelopes.
    #[error("router is shut down")]
    ShuttingDown,
}

/// Errors raised by the Participant Registry (§4.4).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A participant with this id is already present in the space.
    #[error("participant already registered: {participant}")]
    AlreadyRegistered {
        /// The duplicate id.
        participant: ParticipantId,
    },

    /// No participant with this id is registered.
    #[error("participant not found: {participant}")]
    NotFound {
        /// The missing id.
        participant: ParticipantId,
    },

    /// The requested presence transition is not legal from the current state.
    #[error("invalid presence transition for {participant}: {from} -> {to}")]
    InvalidTransition {
        /// The participant attempting the transition.
        participant: ParticipantId,
        /// Current state, rendered for display.
        from: String,
        /// Requested state, rendered for display.
        to: String,
    },
}

/// Errors raised by the Correlation & Proposal Engine (§4.6).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    /// No open proposal with this id exists.
    #[error("proposal not found: {proposal}")]
    NotFound {
        /// The missing proposal id.
        proposal: ProposalId,
    },

    /// The proposal is not in a state that allows this operation.
    #[error("proposal {proposal} is not open (status: {status})")]
    NotOpen {
        /// The proposal id.
        proposal: ProposalId,
        /// Current status, rendered for display.
        status: String,
    },

    /// A pending request with this envelope id was not found.
    #[error("pending request not found: {envelope}")]
    PendingRequestNotFound {
        /// The missing request's envelope id.
        envelope: EnvelopeId,
    },

    /// The pending request or proposal timed out before resolution.
    #[error("timed out waiting for resolution")]
    TimedOut,
}

/// Errors raised by the Stream Channel Manager (§4.7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// No stream with this id exists.
    #[error("stream not found: {stream}")]
    NotFound {
        /// The missing stream id.
        stream: StreamId,
    },

    /// The stream is not in a state that allows this operation.
    #[error("stream {stream} is not open (state: {state})")]
    NotOpen {
        /// The stream id.
        stream: StreamId,
        /// Current state, rendered for display.
        state: String,
    },

    /// The sender is not a registered peer of this stream.
    #[error("{participant} is not a peer of stream {stream}")]
    NotAPeer {
        /// The stream id.
        stream: StreamId,
        /// The offending participant.
        participant: ParticipantId,
    },

    /// The stream sat idle past its configured timeout.
    #[error("stream {stream} idle timeout")]
    IdleTimeout {
        /// The stream id.
        stream: StreamId,
    },
}

/// Errors raised while validating a `GatewayConfig`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field's value is outside the accepted range.
    #[error("invalid configuration: {field} - {reason}")]
    InvalidField {
        /// The offending field name.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two fields are individually valid but jointly inconsistent.
    #[error("invalid configuration: {reason}")]
    Inconsistent {
        /// The cross-field rule that failed.
        reason: String,
    },

    /// The configuration file could not be read or written.
    #[error("configuration IO error: {0}")]
    Io(String),

    /// The configuration file was not valid JSON.
    #[error("configuration deserialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by the client-side Participant Runtime (§4.8).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Neither a direct `mcp/request` capability nor an `mcp/proposal`
    /// capability covers this operation.
    #[error("no capability covers {kind} toward {target}")]
    NoCapability {
        /// The MCP-ish kind that was attempted.
        kind: String,
        /// The intended recipient.
        target: ParticipantId,
    },

    /// The outbound connection to the gateway is closed.
    #[error("connection to gateway is closed")]
    Disconnected,

    /// No response/fulfillment arrived before the request's timeout.
    #[error("request timed out")]
    TimedOut,

    /// The fulfiller/gateway returned an MCP-shaped error.
    #[error("request failed: {reason}")]
    Remote {
        /// The MCP-shaped error detail.
        reason: serde_json::Value,
    },
}

impl From<RouterError> for GatewayError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::QueueFull { depth } => Self::Backpressure {
                detail: format!("inbound queue full (depth {depth})"),
            },
            RouterError::UnknownRecipient { participant } => {
                Self::UnknownRecipient { participant }
            }
            RouterError::CapabilityViolation { participant, kind } => {
                Self::CapabilityViolation { participant, kind }
            }
            RouterError::ShuttingDown => Self::Internal {
                detail: "router is shut down".to_string(),
            },
        }
    }
}
