//! Simulated collaborators.
//!
//! In-process stand-ins for the platform pieces a live session depends on:
//! capture devices, peer transports and the session backend. The
//! `live-session-sim` binary and the test suites run complete sessions on
//! top of them together with [`crate::relay::LocalRelay`].

mod backend;
mod devices;
mod peer;

pub use backend::InMemorySessionBackend;
pub use devices::SimulatedDevices;
pub use peer::{SimulatedPeerConnector, SimulatedTransport};
