//! Peer topology: the full mesh of links to every other participant.
//!
//! - [`transport`] - Seam to the media transport implementation
//! - [`link`] - One link and its state machine
//! - [`roster`] - Participant id to link, at most one each
//! - [`manager`] - Reactions to membership and transport events

pub mod link;
pub mod manager;
pub mod roster;
pub mod transport;

pub use link::{LinkState, PeerLink};
pub use manager::{PeerEvent, PeerTopologyManager, RemovalReason, TopologyConfig};
pub use roster::{Roster, RosterError};
pub use transport::{
    NegotiationRole, PeerConnector, PeerRequest, PeerTransport, RemoteStream, TransportError,
    TransportEvent,
};
