//! Relay wire messages.
//!
//! Every frame is one JSON object tagged by `type`:
//!
//! ```json
//! {"type":"join-session","sessionCode":"abc-defg-hij","hostId":"u0","identity":{"userId":"u1","displayName":"Ada"}}
//! {"type":"negotiation-payload","from":"6f1c...","payload":{"sdp":"..."}}
//! ```
//!
//! Negotiation payloads are opaque to everything except the peer transport.

use crate::errors::SessionError;
use common::types::ParticipantId;
use serde::{Deserialize, Serialize};

/// Opaque negotiation blob (offer, answer or candidate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NegotiationPayload(pub serde_json::Value);

impl NegotiationPayload {
    /// Wrap a JSON value.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The `type` field of the payload, if present (`offer`, `answer`, ...).
    #[must_use]
    pub fn payload_type(&self) -> Option<&str> {
        self.0.get("type").and_then(serde_json::Value::as_str)
    }
}

/// Who the local user is, as announced to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantIdentity {
    pub user_id: String,
    pub display_name: String,
}

/// A participant already present in the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub participant_id: ParticipantId,
    pub display_name: String,
}

/// Frames sent by a participant to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Announce presence in a session. `host_id` is the session owner's user
    /// id; the first join of a room fixes it.
    JoinSession {
        session_code: String,
        host_id: String,
        identity: ParticipantIdentity,
    },

    /// First payload of an initiator link; the relay delivers it to `to` as
    /// `participant-joined`.
    Introduce {
        to: ParticipantId,
        payload: NegotiationPayload,
    },

    /// Any later payload; delivered to `to` as `negotiation-payload`.
    Signal {
        to: ParticipantId,
        payload: NegotiationPayload,
    },

    /// Host ended the session; the relay broadcasts `session-terminated`.
    /// Refused with `error` unless the sender is the room's host.
    EndSession {
        session_code: String,
        reason: String,
    },
}

impl ClientMessage {
    /// Wire name of the message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinSession { .. } => "join-session",
            ClientMessage::Introduce { .. } => "introduce",
            ClientMessage::Signal { .. } => "signal",
            ClientMessage::EndSession { .. } => "end-session",
        }
    }
}

/// Frames delivered by the relay to a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RelayEvent {
    /// Identifier assigned to this connection.
    Welcome { participant_id: ParticipantId },

    /// Participants present before the local join, excluding the receiver.
    RosterSnapshot { participants: Vec<PeerSummary> },

    /// A newcomer introduced itself, usually carrying its offer.
    ParticipantJoined {
        participant_id: ParticipantId,
        display_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<NegotiationPayload>,
    },

    /// Payload addressed to the receiver.
    NegotiationPayload {
        from: ParticipantId,
        payload: NegotiationPayload,
    },

    /// The relay detected a disconnect.
    ParticipantLeft { participant_id: ParticipantId },

    /// The host ended the session.
    SessionTerminated { reason: String },

    /// The join was refused because the room is at capacity.
    SessionFull { capacity: usize },

    /// The relay rejected a frame.
    Error { message: String },
}

/// Discriminant of a [`RelayEvent`], used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayEventKind {
    Welcome,
    RosterSnapshot,
    ParticipantJoined,
    NegotiationPayload,
    ParticipantLeft,
    SessionTerminated,
    SessionFull,
    Error,
}

impl RelayEventKind {
    /// Wire name of the event kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RelayEventKind::Welcome => "welcome",
            RelayEventKind::RosterSnapshot => "roster-snapshot",
            RelayEventKind::ParticipantJoined => "participant-joined",
            RelayEventKind::NegotiationPayload => "negotiation-payload",
            RelayEventKind::ParticipantLeft => "participant-left",
            RelayEventKind::SessionTerminated => "session-terminated",
            RelayEventKind::SessionFull => "session-full",
            RelayEventKind::Error => "error",
        }
    }
}

impl RelayEvent {
    /// Kind of this event.
    #[must_use]
    pub const fn kind(&self) -> RelayEventKind {
        match self {
            RelayEvent::Welcome { .. } => RelayEventKind::Welcome,
            RelayEvent::RosterSnapshot { .. } => RelayEventKind::RosterSnapshot,
            RelayEvent::ParticipantJoined { .. } => RelayEventKind::ParticipantJoined,
            RelayEvent::NegotiationPayload { .. } => RelayEventKind::NegotiationPayload,
            RelayEvent::ParticipantLeft { .. } => RelayEventKind::ParticipantLeft,
            RelayEvent::SessionTerminated { .. } => RelayEventKind::SessionTerminated,
            RelayEvent::SessionFull { .. } => RelayEventKind::SessionFull,
            RelayEvent::Error { .. } => RelayEventKind::Error,
        }
    }
}

/// Encode a frame as JSON text.
///
/// # Errors
///
/// Returns `SessionError::Signaling` if serialization fails.
pub fn encode<T: Serialize>(message: &T) -> Result<String, SessionError> {
    serde_json::to_string(message)
        .map_err(|e| SessionError::Signaling(format!("encode failed: {e}")))
}

/// Decode a JSON text frame.
///
/// # Errors
///
/// Returns `SessionError::Signaling` for malformed or unknown frames.
pub fn decode<T: for<'de> Deserialize<'de>>(frame: &str) -> Result<T, SessionError> {
    serde_json::from_str(frame).map_err(|e| SessionError::Signaling(format!("decode failed: {e}")))
}
