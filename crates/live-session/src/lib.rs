//! Live Session Coordinator
//!
//! Client-side coordinator for the Smart Campus video room: a mesh of peer
//! media links negotiated through a signaling relay, with dynamic join and
//! leave, microphone/camera toggles and host-controlled termination.
//!
//! # Architecture
//!
//! One task owns all mutable session state and reacts to relay events,
//! transport callbacks and user intents one at a time:
//!
//! ```text
//! LiveSession (actor, one per joined session)
//! ├── MediaCapture       owns the local stream, releases it exactly once
//! ├── SignalingChannel   typed view of the relay connection
//! ├── PeerTopologyManager
//! │   └── Roster         participant id -> PeerLink (at most one each)
//! └── SessionLifecycle   backend bookkeeping, host-only end-for-all
//! ```
//!
//! The presentation layer drives the session through a [`session::LiveSessionHandle`]
//! and consumes [`session::SessionEvent`]s.
//!
//! # Modules
//!
//! - [`media`] - Local capture and release
//! - [`signaling`] - Relay wire messages and the client channel
//! - [`relay`] - In-process signaling relay
//! - [`topology`] - Peer links, roster and mesh coordination
//! - [`backend`] - Session REST backend
//! - [`lifecycle`] - Session fetch, bookkeeping and termination
//! - [`session`] - The live session actor
//! - [`sim`] - Simulated devices, peers and backend
//! - [`config`] - Configuration from environment
//! - [`observability`] - Metric helpers and recorder setup
//! - [`errors`] - Error types with notice codes

pub mod backend;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod media;
pub mod observability;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod sim;
pub mod topology;
