//! Mock session REST backend for live session testing.
//!
//! Wraps a `wiremock` server that answers the campus meeting endpoints, so
//! the real [`HttpSessionBackend`] can be driven end to end.
//!
//! # Example
//!
//! ```rust,ignore
//! use live_session_test_utils::{MockBackendServer, TestSession};
//!
//! let session = TestSession::new("lecturer-1");
//! let server = MockBackendServer::start().await;
//! server.serve_session(&session).await;
//! server.accept_bookkeeping(&session).await;
//!
//! let backend = server.backend();
//! ```

use crate::fixtures::TestSession;
use common::secret::SecretString;
use live_session::backend::HttpSessionBackend;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bearer token every mock route requires.
pub const TEST_TOKEN: &str = "test-token";

/// Mocked campus backend.
pub struct MockBackendServer {
    server: MockServer,
}

impl MockBackendServer {
    /// Start a mock server with no routes mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the mock.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Client pointed at this mock with the test token.
    #[must_use]
    pub fn backend(&self) -> HttpSessionBackend {
        HttpSessionBackend::new(
            &self.server.uri(),
            SecretString::from(TEST_TOKEN),
            Duration::from_secs(5),
        )
        .expect("mock backend URL is valid")
    }

    /// Answer lookups of `session`'s join code.
    pub async fn serve_session(&self, session: &TestSession) {
        Mock::given(method("GET"))
            .and(path(format!("/api/meetings/code/{}", session.meeting_code)))
            .and(header("authorization", format!("Bearer {TEST_TOKEN}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(session.to_json()))
            .mount(&self.server)
            .await;
    }

    /// Answer lookups of `code` with 404.
    pub async fn missing_session(&self, code: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/api/meetings/code/{code}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
    }

    /// Answer session creation with `session`.
    pub async fn create_returns(&self, session: &TestSession) {
        Mock::given(method("POST"))
            .and(path("/api/meetings"))
            .respond_with(ResponseTemplate::new(201).set_body_json(session.to_json()))
            .mount(&self.server)
            .await;
    }

    /// Accept join and leave bookkeeping for `session`.
    pub async fn accept_bookkeeping(&self, session: &TestSession) {
        for action in ["join", "leave"] {
            Mock::given(method("POST"))
                .and(path(format!("/api/meetings/{}/{action}", session.id)))
                .respond_with(ResponseTemplate::new(204))
                .mount(&self.server)
                .await;
        }
    }

    /// Fail join and leave bookkeeping for `session` with 500.
    pub async fn fail_bookkeeping(&self, session: &TestSession) {
        for action in ["join", "leave"] {
            Mock::given(method("POST"))
                .and(path(format!("/api/meetings/{}/{action}", session.id)))
                .respond_with(ResponseTemplate::new(500))
                .mount(&self.server)
                .await;
        }
    }

    /// Accept ending `session`.
    pub async fn accept_end(&self, session: &TestSession) {
        Mock::given(method("POST"))
            .and(path(format!("/api/meetings/{}/end", session.id)))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
    }

    /// Refuse ending `session` with 403 and `reason` as the body.
    pub async fn forbid_end(&self, session: &TestSession, reason: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/api/meetings/{}/end", session.id)))
            .respond_with(ResponseTemplate::new(403).set_body_string(reason))
            .mount(&self.server)
            .await;
    }

    /// Number of requests received for `request_path`.
    pub async fn hits(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}
