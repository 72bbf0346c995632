//! `PeerLink` - one negotiated media connection to a remote participant.

use super::transport::{NegotiationRole, PeerTransport, RemoteStream, TransportError};
use crate::signaling::{ClientMessage, NegotiationPayload};
use common::types::ParticipantId;
use std::fmt;
use tokio::time::Instant;
use tracing::debug;

/// Link state.
///
/// `Negotiating(role) -> Connected -> Closed`; `Closed` is terminal and is
/// also reachable directly from `Negotiating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Negotiating(NegotiationRole),
    Connected,
    Closed,
}

impl LinkState {
    /// Returns the state as a string for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LinkState::Negotiating(_) => "negotiating",
            LinkState::Connected => "connected",
            LinkState::Closed => "closed",
        }
    }
}

/// A peer link owned by the roster.
pub struct PeerLink {
    remote: ParticipantId,
    display_name: String,
    role: NegotiationRole,
    state: LinkState,
    transport: Box<dyn PeerTransport>,
    remote_stream: Option<RemoteStream>,
    created_at: Instant,
    introduced: bool,
}

impl fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLink")
            .field("remote", &self.remote)
            .field("display_name", &self.display_name)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("remote_stream", &self.remote_stream)
            .finish_non_exhaustive()
    }
}

impl PeerLink {
    /// Wrap a freshly built transport.
    #[must_use]
    pub fn new(
        remote: ParticipantId,
        display_name: impl Into<String>,
        role: NegotiationRole,
        transport: Box<dyn PeerTransport>,
    ) -> Self {
        Self {
            remote,
            display_name: display_name.into(),
            role,
            state: LinkState::Negotiating(role),
            transport,
            remote_stream: None,
            created_at: Instant::now(),
            introduced: false,
        }
    }

    #[must_use]
    pub fn remote(&self) -> ParticipantId {
        self.remote
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    #[must_use]
    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn is_negotiating(&self) -> bool {
        matches!(self.state, LinkState::Negotiating(_))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == LinkState::Closed
    }

    /// Feed a remote payload into the transport.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` on a closed link, or whatever the
    /// transport rejects the payload with.
    pub fn feed(&mut self, payload: NegotiationPayload) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.transport.signal(payload)
    }

    /// Record that remote media arrived.
    ///
    /// Returns `true` on the first arrival; closed links ignore it.
    pub fn mark_connected(&mut self, stream: RemoteStream) -> bool {
        match self.state {
            LinkState::Closed | LinkState::Connected => false,
            LinkState::Negotiating(_) => {
                self.remote_stream = Some(stream);
                self.state = LinkState::Connected;
                true
            }
        }
    }

    /// Address a locally produced payload to the remote side.
    ///
    /// An initiator's first payload introduces the local participant; every
    /// later payload, and every responder payload, is a plain signal.
    pub fn outbound(&mut self, payload: NegotiationPayload) -> ClientMessage {
        if self.role == NegotiationRole::Initiator && !self.introduced {
            self.introduced = true;
            ClientMessage::Introduce {
                to: self.remote,
                payload,
            }
        } else {
            ClientMessage::Signal {
                to: self.remote,
                payload,
            }
        }
    }

    /// Close the transport. Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.transport.close();
        debug!(
            target: "ls.topology",
            participant_id = %self.remote,
            from = self.state.as_str(),
            "Peer link closed"
        );
        self.state = LinkState::Closed;
        true
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.close();
    }
}
