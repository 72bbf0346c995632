//! Signaling between a participant and the relay.
//!
//! - [`messages`] - JSON wire vocabulary in both directions
//! - [`channel`] - Client side of one relay connection

pub mod channel;
pub mod messages;

pub use channel::{RelayConnector, RelayLink, SignalingChannel};
pub use messages::{
    ClientMessage, NegotiationPayload, ParticipantIdentity, PeerSummary, RelayEvent,
    RelayEventKind,
};
