//! In-memory session backend.
//!
//! Mirrors the campus REST API: sessions are created by their host, looked
//! up by join code, and only the host may end them. Every view shares one
//! store; [`InMemorySessionBackend::for_user`] gives another participant's
//! view so host checks behave as they would against the real backend.

use crate::backend::{BackendError, CreateSessionRequest, SessionBackend, SessionMetadata};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Store {
    sessions: HashMap<String, SessionMetadata>,
    next_id: u64,
    joins: usize,
    leaves: usize,
    ends: usize,
    fail_bookkeeping: bool,
}

/// Shared in-memory backend, viewed as one user.
#[derive(Debug, Clone)]
pub struct InMemorySessionBackend {
    store: Arc<Mutex<Store>>,
    user_id: String,
}

impl InMemorySessionBackend {
    /// Empty store viewed as `user_id`.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            store: Arc::default(),
            user_id: user_id.into(),
        }
    }

    /// Same store, viewed as another user.
    #[must_use]
    pub fn for_user(&self, user_id: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            user_id: user_id.into(),
        }
    }

    /// User this view acts as.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a session.
    pub fn insert(&self, metadata: SessionMetadata) {
        self.store().sessions.insert(metadata.id.clone(), metadata);
    }

    /// Session by join code.
    #[must_use]
    pub fn session(&self, meeting_code: &str) -> Option<SessionMetadata> {
        self.store()
            .sessions
            .values()
            .find(|s| s.meeting_code == meeting_code)
            .cloned()
    }

    /// Make join/leave bookkeeping fail with a server error.
    pub fn fail_bookkeeping(&self, fail: bool) {
        self.store().fail_bookkeeping = fail;
    }

    #[must_use]
    pub fn joins(&self) -> usize {
        self.store().joins
    }

    #[must_use]
    pub fn leaves(&self) -> usize {
        self.store().leaves
    }

    #[must_use]
    pub fn ends(&self) -> usize {
        self.store().ends
    }
}

/// Join code in the `abc-defg-hij` shape.
fn generate_meeting_code() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    let letters: String = raw
        .chars()
        .map(|c| match c.to_digit(16) {
            // Map hex digits onto lowercase letters
            Some(d) => char::from(b'a' + u8::try_from(d).unwrap_or(0)),
            None => 'a',
        })
        .take(10)
        .collect();
    let (first, rest) = letters.split_at(3);
    let (second, third) = rest.split_at(4);
    format!("{first}-{second}-{third}")
}

#[async_trait]
impl SessionBackend for InMemorySessionBackend {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionMetadata, BackendError> {
        let mut store = self.store();
        store.next_id += 1;

        let metadata = SessionMetadata {
            id: store.next_id.to_string(),
            meeting_code: generate_meeting_code(),
            title: request.title,
            module_id: request.module_id,
            host_id: self.user_id.clone(),
            is_active: true,
            created_at: Some(chrono::Utc::now()),
        };
        store
            .sessions
            .insert(metadata.id.clone(), metadata.clone());

        debug!(
            target: "ls.backend",
            session_id = %metadata.id,
            meeting_code = %metadata.meeting_code,
            "Session created in memory"
        );
        Ok(metadata)
    }

    async fn fetch_session(&self, meeting_code: &str) -> Result<SessionMetadata, BackendError> {
        self.session(meeting_code).ok_or(BackendError::NotFound)
    }

    async fn register_join(&self, session_id: &str) -> Result<(), BackendError> {
        let mut store = self.store();
        if store.fail_bookkeeping {
            return Err(BackendError::Unexpected { status: 500 });
        }
        if !store.sessions.contains_key(session_id) {
            return Err(BackendError::NotFound);
        }
        store.joins += 1;
        Ok(())
    }

    async fn register_leave(&self, session_id: &str) -> Result<(), BackendError> {
        let mut store = self.store();
        if store.fail_bookkeeping {
            return Err(BackendError::Unexpected { status: 500 });
        }
        if !store.sessions.contains_key(session_id) {
            return Err(BackendError::NotFound);
        }
        store.leaves += 1;
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<(), BackendError> {
        let mut store = self.store();
        let user_id = self.user_id.clone();
        let session = store
            .sessions
            .get_mut(session_id)
            .ok_or(BackendError::NotFound)?;
        if session.host_id != user_id {
            return Err(BackendError::Forbidden(
                "only the host can end the session".to_string(),
            ));
        }
        session.is_active = false;
        store.ends += 1;
        Ok(())
    }
}
