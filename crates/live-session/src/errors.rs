//! Live session error types.
//!
//! Errors map to numeric codes for the presentation layer and carry a
//! user-safe message for the notice surface. Internal details (backend
//! status lines, transport reasons) are logged but not shown to users.

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::media::DeviceError;
use common::types::ParticipantId;
use thiserror::Error;

/// Live session error type.
///
/// Maps to notice codes:
/// - `Forbidden`: `FORBIDDEN` (3)
/// - `SessionNotFound`: `NOT_FOUND` (4)
/// - Internal, Signaling, Config, Backend: `INTERNAL_ERROR` (6)
/// - `SessionFull`: `CAPACITY_EXCEEDED` (7)
/// - `DeviceUnavailable`: `DEVICE_UNAVAILABLE` (8)
/// - `RelayUnreachable`: `RELAY_UNREACHABLE` (9)
/// - `NegotiationFailure`: `NEGOTIATION_FAILED` (10)
/// - `SessionInactive`: `SESSION_INACTIVE` (11)
#[derive(Debug, Error)]
pub enum SessionError {
    /// Camera or microphone could not be acquired.
    #[error("Media device unavailable: {0}")]
    DeviceUnavailable(DeviceError),

    /// The signaling relay could not be reached.
    #[error("Relay unreachable: {0}")]
    RelayUnreachable(String),

    /// A single peer link failed to negotiate.
    #[error("Negotiation with {participant_id} failed: {reason}")]
    NegotiationFailure {
        participant_id: ParticipantId,
        reason: String,
    },

    /// No session exists for the join code.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The session exists but has ended.
    #[error("Session inactive: {0}")]
    SessionInactive(String),

    /// The relay refused the join because the room is at capacity.
    #[error("Session is full (capacity {capacity})")]
    SessionFull { capacity: usize },

    /// Caller is not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Session backend request failed.
    #[error("Backend error: {0}")]
    Backend(BackendError),

    /// Signaling protocol or channel error.
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns the notice code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            SessionError::Forbidden(_) => 3,
            SessionError::SessionNotFound(_) => 4,
            SessionError::Backend(_)
            | SessionError::Signaling(_)
            | SessionError::Config(_)
            | SessionError::Internal(_) => 6,
            SessionError::SessionFull { .. } => 7,
            SessionError::DeviceUnavailable(_) => 8,
            SessionError::RelayUnreachable(_) => 9,
            SessionError::NegotiationFailure { .. } => 10,
            SessionError::SessionInactive(_) => 11,
        }
    }

    /// Returns a user-facing message (no internal details).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SessionError::DeviceUnavailable(DeviceError::PermissionDenied) => {
                "Camera and microphone access was denied".to_string()
            }
            SessionError::DeviceUnavailable(_) => {
                "Could not access your camera or microphone".to_string()
            }
            SessionError::RelayUnreachable(_) => {
                "Could not connect to the meeting server".to_string()
            }
            SessionError::NegotiationFailure { .. } => {
                "Could not connect to a participant".to_string()
            }
            SessionError::SessionNotFound(_) | SessionError::SessionInactive(_) => {
                "Meeting not found or has expired".to_string()
            }
            SessionError::SessionFull { .. } => "This meeting is full".to_string(),
            SessionError::Forbidden(_) => "Only the host can end this meeting".to_string(),
            SessionError::Backend(_)
            | SessionError::Signaling(_)
            | SessionError::Config(_)
            | SessionError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Whether the error means the session view should be left entirely.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::SessionNotFound(_)
                | SessionError::SessionInactive(_)
                | SessionError::SessionFull { .. }
        )
    }
}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        SessionError::DeviceUnavailable(err)
    }
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        SessionError::Backend(err)
    }
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::Config(err.to_string())
    }
}
