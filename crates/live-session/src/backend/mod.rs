//! Session REST backend.
//!
//! The backend stores session metadata and bookkeeping. It is an external
//! collaborator reached through the [`SessionBackend`] trait:
//!
//! - [`http::HttpSessionBackend`] - `reqwest` client for the campus REST API
//! - [`crate::sim::InMemorySessionBackend`] - in-process store for tests and
//!   the simulation binary

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpSessionBackend;

/// Session metadata as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub id: String,
    /// Immutable join code.
    pub meeting_code: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    /// User id of the host.
    pub host_id: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of a create-session request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

/// Backend request failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Resource not found")]
    NotFound,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Unexpected status {status}")]
    Unexpected { status: u16 },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Session backend operations.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Create a session hosted by the caller.
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionMetadata, BackendError>;

    /// Look a session up by join code.
    async fn fetch_session(&self, meeting_code: &str) -> Result<SessionMetadata, BackendError>;

    /// Record that the caller joined.
    async fn register_join(&self, session_id: &str) -> Result<(), BackendError>;

    /// Record that the caller left.
    async fn register_leave(&self, session_id: &str) -> Result<(), BackendError>;

    /// End the session. Only the host may do this.
    async fn end_session(&self, session_id: &str) -> Result<(), BackendError>;
}
