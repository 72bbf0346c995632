//! Message types for the live session actor and its presentation events.

use crate::backend::SessionMetadata;
use crate::errors::SessionError;
use crate::media::TrackKind;
use crate::topology::{LinkState, PeerEvent};
use common::types::{ParticipantId, StreamId};
use tokio::sync::oneshot;

/// Intents from the presentation layer.
#[derive(Debug)]
pub enum SessionCommand {
    /// Enable or disable the microphone. Replies whether anything changed.
    ToggleAudio {
        enabled: bool,
        respond_to: oneshot::Sender<bool>,
    },

    /// Enable or disable the camera. Replies whether anything changed.
    ToggleVideo {
        enabled: bool,
        respond_to: oneshot::Sender<bool>,
    },

    /// Leave locally. Others learn of it through the relay.
    Leave { respond_to: oneshot::Sender<()> },

    /// Host-only termination for every participant.
    EndForAll {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Current state for rendering.
    GetState {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
}

/// Why the local session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The local user left.
    Left,
    /// The host ended the session for everyone.
    TerminatedByHost { reason: String },
    /// The relay connection dropped.
    RelayLost,
}

impl EndReason {
    /// Returns the reason as a metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndReason::Left => "left",
            EndReason::TerminatedByHost { .. } => "terminated",
            EndReason::RelayLost => "relay_lost",
        }
    }

    /// Text for the terminal notice.
    #[must_use]
    pub fn notice(&self) -> String {
        match self {
            EndReason::Left => "You left the meeting".to_string(),
            EndReason::TerminatedByHost { reason } if reason.is_empty() => {
                "The host ended the meeting".to_string()
            }
            EndReason::TerminatedByHost { reason } => reason.clone(),
            EndReason::RelayLost => "Connection to the meeting was lost".to_string(),
        }
    }
}

/// Events for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The join completed; the local tile can render.
    Joined {
        participant_id: ParticipantId,
        session: SessionMetadata,
        local_stream: StreamId,
    },

    /// Mesh change (tile added or removed, connect failure).
    Peer(PeerEvent),

    /// A local track flag changed.
    MediaToggled { kind: TrackKind, enabled: bool },

    /// Non-terminal notice (error toast).
    Notice { code: i32, message: String },

    /// Terminal notice. No further events follow.
    Ended { reason: EndReason },
}

impl SessionEvent {
    /// Notice for an error, with the client-safe message.
    #[must_use]
    pub fn notice(error: &SessionError) -> Self {
        SessionEvent::Notice {
            code: error.error_code(),
            message: error.user_message(),
        }
    }
}

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Active,
    Ended,
}

/// One remote participant as seen by the local session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub state: LinkState,
    pub has_remote_stream: bool,
}

/// Renderable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub meeting_code: String,
    pub title: String,
    pub local_id: ParticipantId,
    pub is_host: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    /// Ordered by participant id.
    pub peers: Vec<PeerSnapshot>,
    pub phase: SessionPhase,
}
