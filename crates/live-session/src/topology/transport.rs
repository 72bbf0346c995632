//! Peer transport seam.
//!
//! A [`PeerConnector`] builds one [`PeerTransport`] per remote participant.
//! The transport consumes negotiation payloads through
//! [`PeerTransport::signal`] and reports back asynchronously via
//! [`TransportEvent`]s tagged with the remote participant id, so the owning
//! task can interleave them with relay events.

use crate::media::LocalStream;
use crate::signaling::NegotiationPayload;
use common::types::{ParticipantId, StreamId};
use thiserror::Error;
use tokio::sync::mpsc;

/// Which side starts negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationRole {
    /// Created from a roster snapshot; produces the first payload.
    Initiator,
    /// Created from a join announcement; answers the first payload.
    Responder,
}

impl NegotiationRole {
    /// Returns the role as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            NegotiationRole::Initiator => "initiator",
            NegotiationRole::Responder => "responder",
        }
    }
}

/// A remote participant's media as surfaced to presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: StreamId,
    pub participant_id: ParticipantId,
}

/// Asynchronous transport callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport produced a payload for the remote side.
    Signal {
        remote: ParticipantId,
        payload: NegotiationPayload,
    },

    /// Remote media is flowing.
    RemoteStream {
        remote: ParticipantId,
        stream: RemoteStream,
    },

    /// The transport gave up.
    Failed {
        remote: ParticipantId,
        reason: String,
    },
}

/// Transport construction and negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transport construction failed: {0}")]
    Construction(String),

    #[error("Negotiation payload rejected: {0}")]
    Negotiation(String),

    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Returns the error kind as a metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            TransportError::Construction(_) => "construction",
            TransportError::Negotiation(_) => "rejected",
            TransportError::Closed => "closed",
        }
    }
}

/// Everything a connector needs to build one transport.
#[derive(Debug, Clone)]
pub struct PeerRequest {
    pub remote: ParticipantId,
    pub role: NegotiationRole,
    /// Read-only attachment of the local stream.
    pub local_stream: LocalStream,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

/// Builds peer transports.
pub trait PeerConnector: Send + Sync {
    /// Create a transport. Initiators are expected to emit their first
    /// `Signal` event on their own.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Construction` if the transport cannot be built.
    fn connect(&self, request: PeerRequest) -> Result<Box<dyn PeerTransport>, TransportError>;
}

/// One live peer transport.
pub trait PeerTransport: Send {
    /// Feed a payload from the remote side.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Negotiation` for unusable payloads and
    /// `TransportError::Closed` after `close`.
    fn signal(&mut self, payload: NegotiationPayload) -> Result<(), TransportError>;

    /// Release transport resources. Called exactly once per transport.
    fn close(&mut self);
}
