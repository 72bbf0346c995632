//! In-process signaling relay.
//!
//! [`LocalRelay`] implements the relay side of the signaling vocabulary for a
//! single process: rooms keyed by session code, per-connection participant
//! ids, targeted payload routing, disconnect detection and the
//! host-termination broadcast. It implements [`RelayConnector`] so sessions
//! connect to it exactly as they would to a networked relay.
//!
//! [`RelayConnector`]: crate::signaling::RelayConnector

mod actor;

pub use actor::{LocalRelay, RELAY_CONNECTION_BUFFER};
