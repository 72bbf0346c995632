//! Pre-configured test data fixtures for live session testing.
//!
//! Provides builders for:
//! - Local identities (host and guests)
//! - Session metadata, as domain values or backend JSON

use chrono::{TimeZone, Utc};
use live_session::backend::SessionMetadata;
use live_session::lifecycle::LocalIdentity;
use serde_json::{json, Value};
use uuid::Uuid;

/// Test identity fixture.
#[derive(Debug, Clone)]
pub struct TestIdentity {
    /// User ID.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
}

impl TestIdentity {
    /// Create a new identity with the given display name and a random user id.
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            user_id: format!("user-{}", Uuid::new_v4()),
            display_name: display_name.into(),
        }
    }

    /// Set an explicit user id (for reproducible tests).
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Convert to the domain identity.
    #[must_use]
    pub fn build(&self) -> LocalIdentity {
        LocalIdentity::new(self.user_id.clone(), self.display_name.clone())
    }
}

/// Test session fixture.
#[derive(Debug, Clone)]
pub struct TestSession {
    /// Backend session ID.
    pub id: String,
    /// Join code.
    pub meeting_code: String,
    /// Title.
    pub title: String,
    /// Owning module, if any.
    pub module_id: Option<String>,
    /// Host user ID.
    pub host_id: String,
    /// Whether the session still accepts joins.
    pub is_active: bool,
}

impl TestSession {
    /// Create an active session hosted by `host_id`.
    #[must_use]
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            meeting_code: "abc-defg-hij".to_string(),
            title: "Test Session".to_string(),
            module_id: None,
            host_id: host_id.into(),
            is_active: true,
        }
    }

    /// Set the join code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.meeting_code = code.into();
        self
    }

    /// Set the backend id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the owning module.
    #[must_use]
    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    /// Mark the session as ended.
    #[must_use]
    pub fn ended(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Convert to the domain metadata.
    #[must_use]
    pub fn build(&self) -> SessionMetadata {
        SessionMetadata {
            id: self.id.clone(),
            meeting_code: self.meeting_code.clone(),
            title: self.title.clone(),
            module_id: self.module_id.clone(),
            host_id: self.host_id.clone(),
            is_active: self.is_active,
            created_at: Utc.with_ymd_and_hms(2025, 1, 13, 9, 0, 0).single(),
        }
    }

    /// The body the REST backend returns for this session.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "id": self.id,
            "meetingCode": self.meeting_code,
            "title": self.title,
            "hostId": self.host_id,
            "isActive": self.is_active,
            "createdAt": "2025-01-13T09:00:00Z",
        });
        if let Some(module_id) = &self.module_id {
            body["moduleId"] = json!(module_id);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_json_matches_domain_value() {
        let session = TestSession::new("lecturer-1")
            .with_id("42")
            .with_module("cs-410");

        let parsed: SessionMetadata = serde_json::from_value(session.to_json()).unwrap();
        assert_eq!(parsed, session.build());
    }

    #[test]
    fn test_identity_builder() {
        let identity = TestIdentity::new("Ada").with_user_id("student-1").build();
        assert_eq!(identity.user_id, "student-1");
        assert_eq!(identity.display_name, "Ada");
    }
}
