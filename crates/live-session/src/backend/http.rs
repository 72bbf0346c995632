//! HTTP client for the campus session API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create | `POST /api/meetings` |
//! | fetch | `GET /api/meetings/code/{code}` |
//! | join | `POST /api/meetings/{id}/join` |
//! | leave | `POST /api/meetings/{id}/leave` |
//! | end | `POST /api/meetings/{id}/end` |
//!
//! Every request carries the bearer token from configuration.

use super::{BackendError, CreateSessionRequest, SessionBackend, SessionMetadata};
use crate::config::{Config, ConfigError};
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Connect timeout for backend requests.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// `reqwest`-based [`SessionBackend`].
#[derive(Clone)]
pub struct HttpSessionBackend {
    client: Client,
    base_url: Url,
    token: SecretString,
}

impl std::fmt::Debug for HttpSessionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSessionBackend")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpSessionBackend {
    /// Build a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the URL is invalid or the client
    /// cannot be built.
    pub fn new(base_url: &str, token: SecretString, timeout: Duration) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::Http(format!("invalid base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Http("base URL cannot be a base".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Build a client from `backend_url`, `auth_token` and
    /// `backend_timeout_seconds`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the configured URL is unusable.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            &config.backend_url,
            config.auth_token.clone(),
            config.backend_timeout(),
        )
        .map_err(|e| ConfigError::InvalidValue(format!("LS_BACKEND_URL: {e}")))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::Http("base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post_empty(&self, url: Url) -> Result<(), BackendError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                debug!(target: "ls.backend", error = %e, "HTTP request failed");
                BackendError::Http(e.to_string())
            })?;

        check_status(response).await.map(|_| ())
    }
}

/// Map non-success statuses to errors.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    // Body may carry user data; keep it out of normal logs
    trace!(target: "ls.backend", status = %status, body = %body, "Error response body");

    match status {
        StatusCode::NOT_FOUND => Err(BackendError::NotFound),
        StatusCode::FORBIDDEN => Err(BackendError::Forbidden(if body.is_empty() {
            "forbidden".to_string()
        } else {
            body
        })),
        StatusCode::UNAUTHORIZED => Err(BackendError::Unauthorized),
        other => {
            warn!(target: "ls.backend", status = %other, "Unexpected backend status");
            Err(BackendError::Unexpected {
                status: other.as_u16(),
            })
        }
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response.json::<T>().await.map_err(|e| {
        warn!(target: "ls.backend", error = %e, "Failed to parse backend response");
        BackendError::InvalidResponse(e.to_string())
    })
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    #[instrument(skip_all, name = "ls.backend.create_session")]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionMetadata, BackendError> {
        let url = self.url(&["api", "meetings"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let metadata: SessionMetadata = parse_json(check_status(response).await?).await?;
        debug!(
            target: "ls.backend",
            session_id = %metadata.id,
            meeting_code = %metadata.meeting_code,
            "Session created"
        );
        Ok(metadata)
    }

    #[instrument(skip_all, name = "ls.backend.fetch_session", fields(meeting_code = %meeting_code))]
    async fn fetch_session(&self, meeting_code: &str) -> Result<SessionMetadata, BackendError> {
        let url = self.url(&["api", "meetings", "code", meeting_code])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        parse_json(check_status(response).await?).await
    }

    #[instrument(skip_all, name = "ls.backend.register_join", fields(session_id = %session_id))]
    async fn register_join(&self, session_id: &str) -> Result<(), BackendError> {
        self.post_empty(self.url(&["api", "meetings", session_id, "join"])?)
            .await
    }

    #[instrument(skip_all, name = "ls.backend.register_leave", fields(session_id = %session_id))]
    async fn register_leave(&self, session_id: &str) -> Result<(), BackendError> {
        self.post_empty(self.url(&["api", "meetings", session_id, "leave"])?)
            .await
    }

    #[instrument(skip_all, name = "ls.backend.end_session", fields(session_id = %session_id))]
    async fn end_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.post_empty(self.url(&["api", "meetings", session_id, "end"])?)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> HttpSessionBackend {
        HttpSessionBackend::new(
            &server.uri(),
            SecretString::from("test-token"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn session_json(active: bool) -> serde_json::Value {
        json!({
            "id": "42",
            "meetingCode": "abc-defg-hij",
            "title": "Operating Systems - Lecture 7",
            "moduleId": "cs-301",
            "hostId": "lecturer-1",
            "isActive": active,
            "createdAt": "2026-03-02T09:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_fetch_session_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/meetings/code/abc-defg-hij"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json(true)))
            .expect(1)
            .mount(&server)
            .await;

        let metadata = backend(&server)
            .fetch_session("abc-defg-hij")
            .await
            .unwrap();

        assert_eq!(metadata.id, "42");
        assert_eq!(metadata.host_id, "lecturer-1");
        assert_eq!(metadata.module_id.as_deref(), Some("cs-301"));
        assert!(metadata.is_active);
        assert!(metadata.created_at.is_some());
    }

    #[tokio::test]
    async fn test_fetch_session_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = backend(&server).fetch_session("missing").await;
        assert_eq!(result, Err(BackendError::NotFound));
    }

    #[tokio::test]
    async fn test_create_session_sends_title_and_module() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/meetings"))
            .and(body_json(json!({"title": "Office hours", "moduleId": "cs-301"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(session_json(true)))
            .expect(1)
            .mount(&server)
            .await;

        let metadata = backend(&server)
            .create_session(CreateSessionRequest {
                title: "Office hours".to_string(),
                module_id: Some("cs-301".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(metadata.meeting_code, "abc-defg-hij");
    }

    #[tokio::test]
    async fn test_bookkeeping_endpoints() {
        let server = MockServer::start().await;
        for action in ["join", "leave", "end"] {
            Mock::given(method("POST"))
                .and(path(format!("/api/meetings/42/{action}")))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;
        }

        let backend = backend(&server);
        backend.register_join("42").await.unwrap();
        backend.register_leave("42").await.unwrap();
        backend.end_session("42").await.unwrap();
    }

    #[tokio::test]
    async fn test_end_session_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/meetings/42/end"))
            .respond_with(ResponseTemplate::new(403).set_body_string("not the host"))
            .mount(&server)
            .await;

        let result = backend(&server).end_session("42").await;
        assert_eq!(result, Err(BackendError::Forbidden("not the host".to_string())));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/meetings/1/join"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/meetings/2/join"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = backend(&server);
        assert_eq!(
            backend.register_join("1").await,
            Err(BackendError::Unauthorized)
        );
        assert_eq!(
            backend.register_join("2").await,
            Err(BackendError::Unexpected { status: 503 })
        );
    }

    #[tokio::test]
    async fn test_invalid_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = backend(&server).fetch_session("abc").await;
        assert!(matches!(result, Err(BackendError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_code_is_path_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/meetings/code/a%2Fb"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend(&server).fetch_session("a/b").await;
        assert_eq!(result, Err(BackendError::NotFound));
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_url_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/meetings/code/abc-defg-hij"))
            .and(header("authorization", "Bearer from-env"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json(true)))
            .expect(1)
            .mount(&server)
            .await;

        let vars = std::collections::HashMap::from([
            ("LS_BACKEND_URL".to_string(), server.uri()),
            ("LS_AUTH_TOKEN".to_string(), "from-env".to_string()),
            ("LS_BACKEND_TIMEOUT_SECONDS".to_string(), "2".to_string()),
        ]);
        let config = Config::from_vars(&vars).unwrap();

        let metadata = HttpSessionBackend::from_config(&config)
            .unwrap()
            .fetch_session("abc-defg-hij")
            .await
            .unwrap();
        assert_eq!(metadata.id, "42");
    }

    #[test]
    fn test_from_config_rejects_unusable_url() {
        let mut config = Config::from_vars(&std::collections::HashMap::new()).unwrap();
        config.backend_url = "http://".to_string();

        let result = HttpSessionBackend::from_config(&config);
        assert!(matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.starts_with("LS_BACKEND_URL")));
    }

    #[test]
    fn test_unreachable_is_http_error() {
        assert!(HttpSessionBackend::new(
            "not a url",
            SecretString::from(""),
            Duration::from_secs(1)
        )
        .is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let backend = HttpSessionBackend::new(
            "http://localhost:5000",
            SecretString::from("super-secret"),
            Duration::from_secs(1),
        )
        .unwrap();
        let output = format!("{backend:?}");
        assert!(!output.contains("super-secret"));
        assert!(output.contains("[REDACTED]"));
    }
}
