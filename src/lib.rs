//! # MEW Gateway
//!
//! A gateway implementation of the Multi-Entity Workspace (MEW) protocol: a
//! capability-governed message bus that lets heterogeneous participants —
//! LLM agents, MCP servers, human operators, automation scripts — join a
//! shared space and exchange structured envelopes, propose work to one
//! another, and negotiate out-of-band data streams, all under per-kind
//! authorization rather than network-level trust.
//!
//! ## Architecture
//!
//! The gateway is organized as a functional domain core (`domain`) plus an
//! imperative shell of `DashMap`-backed services bound together per space by
//! [`gateway::SpaceRuntime`]:
//!
//! - **Domain** (`domain`): envelopes, capabilities, participants,
//!   proposals, streams, and spaces — the value objects and aggregates of
//!   the protocol (§3).
//! - **Capability Matcher** (`capability_matcher`): the pure allow/deny
//!   decision over a capability list and an envelope (§4.2).
//! - **Registry** (`registry`): per-space participant lookup and
//!   capability-based discovery (§4.4).
//! - **Router** (`router`): capability-checked envelope delivery to
//!   connection queues and pause queues (§4.5).
//! - **Proposal Engine** (`proposal_engine`) and **Correlation**
//!   (`correlation`): contract-net-style propose/fulfill/reject/withdraw
//!   tracking, gateway-side and client-side halves (§4.6).
//! - **Stream Manager** (`stream_manager`): out-of-band stream negotiation
//!   and sequence tracking (§4.7).
//! - **Participant Runtime** (`participant_runtime`): the client-side
//!   capability-aware send API (§4.8).
//! - **Control Plane** (`control_plane`): pause/resume/forget/clear/
//!   restart/shutdown/status (§4.9).
//! - **Gateway** (`gateway`): the space runtime binding the above together
//!   behind the join protocol and the envelope dispatch pipeline (§4.4, §4).
//! - **Connection** (`connection`) and **Codec** (`codec`): the WebSocket
//!   transport framing and wire (de)serialization (§6).
//! - **Server** (`server`): the axum HTTP/WebSocket surface.

pub mod capability_matcher;
pub mod codec;
pub mod config;
pub mod connection;
pub mod control_plane;
pub mod correlation;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod observability;
pub mod participant_runtime;
pub mod proposal_engine;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod server;
pub mod stream_manager;

pub use capability_matcher::can_send;
pub use config::GatewayConfig;
pub use control_plane::ControlPlane;
pub use domain::{Capability, Envelope, ParticipantId, SpaceId};
pub use error::GatewayError;
pub use gateway::SpaceRuntime;
pub use resolver::{ResolvedIdentity, TokenResolver};
