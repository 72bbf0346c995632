//! Lifecycle tests against the REST backend client and a mocked backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use live_session::errors::SessionError;
use live_session::lifecycle::SessionLifecycle;
use live_session::relay::LocalRelay;
use live_session::session::{EndReason, JoinRequest, LiveSession, SessionDeps, SessionEvent};
use live_session::sim::{SimulatedDevices, SimulatedPeerConnector};
use live_session_test_utils::{test_settings, MockBackendServer, TestIdentity, TestSession};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_create_and_fetch_through_rest_backend() {
    let server = MockBackendServer::start().await;
    let session = TestSession::new("lecturer-1")
        .with_id("42")
        .with_title("Databases")
        .with_module("cs-340");
    server.create_returns(&session).await;
    server.serve_session(&session).await;

    let lifecycle = SessionLifecycle::new(
        Arc::new(server.backend()),
        TestIdentity::new("Dr. Codd").with_user_id("lecturer-1").build(),
    );

    let created = lifecycle
        .create_session("Databases", Some("cs-340".to_string()))
        .await
        .unwrap();
    assert_eq!(created, session.build());

    let fetched = lifecycle.fetch_session(&session.meeting_code).await.unwrap();
    assert!(lifecycle.is_host(&fetched));
}

#[tokio::test]
async fn test_missing_and_ended_sessions_map_to_notices() {
    let server = MockBackendServer::start().await;
    let ended = TestSession::new("lecturer-1").with_code("end-edse-ssn").ended();
    server.serve_session(&ended).await;
    server.missing_session("zzz-zzzz-zzz").await;

    let lifecycle = SessionLifecycle::new(
        Arc::new(server.backend()),
        TestIdentity::new("Ada").build(),
    );

    let missing = lifecycle.fetch_session("zzz-zzzz-zzz").await.unwrap_err();
    assert!(matches!(missing, SessionError::SessionNotFound(_)));

    let inactive = lifecycle.fetch_session("end-edse-ssn").await.unwrap_err();
    assert!(matches!(inactive, SessionError::SessionInactive(_)));
}

#[tokio::test]
async fn test_backend_refusal_of_end_is_forbidden() {
    let server = MockBackendServer::start().await;
    let session = TestSession::new("lecturer-1").with_id("7");
    server.forbid_end(&session, "session is locked").await;

    let lifecycle = SessionLifecycle::new(
        Arc::new(server.backend()),
        TestIdentity::new("Dr. Hopper").with_user_id("lecturer-1").build(),
    );

    let result = lifecycle.end_for_all(&session.build()).await;
    assert!(matches!(result, Err(SessionError::Forbidden(reason)) if reason == "session is locked"));
}

#[tokio::test]
async fn test_non_host_never_calls_end_endpoint() {
    let server = MockBackendServer::start().await;
    let session = TestSession::new("lecturer-1").with_id("7");
    server.accept_end(&session).await;

    let lifecycle = SessionLifecycle::new(
        Arc::new(server.backend()),
        TestIdentity::new("Ada").with_user_id("student-1").build(),
    );

    let result = lifecycle.end_for_all(&session.build()).await;
    assert!(matches!(result, Err(SessionError::Forbidden(_))));
    assert_eq!(server.hits("/api/meetings/7/end").await, 0);
}

#[tokio::test]
async fn test_session_joins_and_leaves_despite_failed_bookkeeping() {
    let server = MockBackendServer::start().await;
    let session = TestSession::new("lecturer-1").with_id("9");
    server.serve_session(&session).await;
    server.fail_bookkeeping(&session).await;

    let cancel_token = CancellationToken::new();
    let (relay, _relay_task) = LocalRelay::spawn("local://http-test", 4, cancel_token.child_token());
    let devices = SimulatedDevices::new();
    let deps = SessionDeps {
        devices: Arc::new(devices.clone()),
        relay: Arc::new(relay),
        peers: Arc::new(SimulatedPeerConnector::new()),
        backend: Arc::new(server.backend()),
    };
    let request = JoinRequest::new(
        session.meeting_code.clone(),
        TestIdentity::new("Ada").build(),
    );

    let (handle, mut events, task) = LiveSession::join(
        deps,
        test_settings("local://http-test"),
        request,
        cancel_token.child_token(),
    )
    .await
    .unwrap();

    assert!(matches!(events.recv().await, Some(SessionEvent::Joined { .. })));
    assert_eq!(server.hits("/api/meetings/9/join").await, 1);

    handle.leave().await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(SessionEvent::Ended {
            reason: EndReason::Left
        })
    );
    task.await.unwrap();

    assert_eq!(server.hits("/api/meetings/9/leave").await, 1);
    assert_eq!(devices.live_tracks(), 0);
    cancel_token.cancel();
}
