//! Session lifecycle controller.
//!
//! Wraps the [`SessionBackend`] with the policies a live session needs:
//!
//! - `fetch_session` turns missing and ended sessions into user-visible
//!   errors;
//! - `register_join`/`register_leave` are best effort and never fail the
//!   caller;
//! - `end_for_all` is refused locally unless the caller is the host.

use crate::backend::{
    BackendError, CreateSessionRequest, HttpSessionBackend, SessionBackend, SessionMetadata,
};
use crate::config::Config;
use crate::errors::SessionError;
use crate::signaling::ParticipantIdentity;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// The local user, provided by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub user_id: String,
    pub display_name: String,
}

impl LocalIdentity {
    #[must_use]
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Identity as announced to the relay.
    #[must_use]
    pub fn to_participant(&self) -> ParticipantIdentity {
        ParticipantIdentity {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Backend-facing lifecycle operations for one local user.
#[derive(Clone)]
pub struct SessionLifecycle {
    backend: Arc<dyn SessionBackend>,
    identity: LocalIdentity,
}

impl SessionLifecycle {
    #[must_use]
    pub fn new(backend: Arc<dyn SessionBackend>, identity: LocalIdentity) -> Self {
        Self { backend, identity }
    }

    /// Lifecycle bound to the REST backend named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` if the backend URL is unusable.
    pub fn from_config(config: &Config, identity: LocalIdentity) -> Result<Self, SessionError> {
        let backend = HttpSessionBackend::from_config(config)?;
        Ok(Self::new(Arc::new(backend), identity))
    }

    #[must_use]
    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// Create a session hosted by the local user.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Backend` when the backend refuses.
    #[instrument(skip_all, name = "ls.lifecycle.create_session")]
    pub async fn create_session(
        &self,
        title: &str,
        module_id: Option<String>,
    ) -> Result<SessionMetadata, SessionError> {
        let metadata = self
            .backend
            .create_session(CreateSessionRequest {
                title: title.to_string(),
                module_id,
            })
            .await?;

        info!(
            target: "ls.lifecycle",
            session_id = %metadata.id,
            meeting_code = %metadata.meeting_code,
            "Session created"
        );
        Ok(metadata)
    }

    /// Look up an active session by join code.
    ///
    /// # Errors
    ///
    /// - `SessionError::SessionNotFound` - no session for `code`
    /// - `SessionError::SessionInactive` - the session has ended
    /// - `SessionError::Backend` - any other backend failure
    #[instrument(skip_all, name = "ls.lifecycle.fetch_session", fields(meeting_code = %code))]
    pub async fn fetch_session(&self, code: &str) -> Result<SessionMetadata, SessionError> {
        let metadata = self.backend.fetch_session(code).await.map_err(|e| match e {
            BackendError::NotFound => SessionError::SessionNotFound(code.to_string()),
            other => SessionError::Backend(other),
        })?;

        if !metadata.is_active {
            info!(target: "ls.lifecycle", session_id = %metadata.id, "Session is no longer active");
            return Err(SessionError::SessionInactive(code.to_string()));
        }

        Ok(metadata)
    }

    /// Record the join. Failures are logged and swallowed.
    pub async fn register_join(&self, session_id: &str) {
        if let Err(e) = self.backend.register_join(session_id).await {
            warn!(
                target: "ls.lifecycle",
                session_id = %session_id,
                error = %e,
                "Join bookkeeping failed"
            );
        }
    }

    /// Record the leave. Failures are logged and swallowed.
    pub async fn register_leave(&self, session_id: &str) {
        if let Err(e) = self.backend.register_leave(session_id).await {
            warn!(
                target: "ls.lifecycle",
                session_id = %session_id,
                error = %e,
                "Leave bookkeeping failed"
            );
        }
    }

    /// Whether the local user hosts `session`.
    #[must_use]
    pub fn is_host(&self, session: &SessionMetadata) -> bool {
        session.host_id == self.identity.user_id
    }

    /// End `session` for every participant.
    ///
    /// The host check runs locally first; a non-host never reaches the
    /// backend.
    ///
    /// # Errors
    ///
    /// - `SessionError::Forbidden` - caller is not the host
    /// - `SessionError::SessionNotFound` - the backend no longer knows it
    /// - `SessionError::Backend` - any other backend failure
    #[instrument(skip_all, name = "ls.lifecycle.end_for_all", fields(session_id = %session.id))]
    pub async fn end_for_all(&self, session: &SessionMetadata) -> Result<(), SessionError> {
        if !self.is_host(session) {
            warn!(target: "ls.lifecycle", "End-for-all refused, caller is not the host");
            return Err(SessionError::Forbidden(
                "only the host can end the session".to_string(),
            ));
        }

        self.backend
            .end_session(&session.id)
            .await
            .map_err(|e| match e {
                BackendError::NotFound => SessionError::SessionNotFound(session.id.clone()),
                BackendError::Forbidden(reason) => SessionError::Forbidden(reason),
                other => SessionError::Backend(other),
            })?;

        info!(target: "ls.lifecycle", "Session ended for all");
        Ok(())
    }
}
