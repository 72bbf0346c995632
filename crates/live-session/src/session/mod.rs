//! The live session actor.
//!
//! One `LiveSession` task per joined session owns the capture, the signaling
//! channel and the topology manager. Relay events, transport callbacks, the
//! negotiation sweep and user intents are handled one at a time in a single
//! `select!` loop, so no two handlers ever observe the roster concurrently.

mod actor;
mod messages;

pub use actor::{JoinRequest, LiveSession, LiveSessionHandle, SessionDeps, SessionSettings};
pub use messages::{
    EndReason, PeerSnapshot, SessionCommand, SessionEvent, SessionPhase, SessionSnapshot,
};
