//! Join failure tests.
//!
//! A failed join must leave nothing behind: no capture tracks, no relay
//! membership and no backend bookkeeping.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use live_session::errors::SessionError;
use live_session::media::DeviceError;
use live_session::sim::{SimulatedDevices, SimulatedPeerConnector};
use live_session_test_utils::{MeshHarness, TestIdentity, TestSession, HOST_USER_ID};

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let mesh = MeshHarness::start().await.unwrap();
    let devices = SimulatedDevices::new();

    let result = mesh
        .join_code(
            "zzz-zzzz-zzz",
            TestIdentity::new("Ada").build(),
            devices.clone(),
            SimulatedPeerConnector::new(),
        )
        .await;

    match result {
        Err(e @ SessionError::SessionNotFound(_)) => {
            assert_eq!(e.error_code(), 4);
        }
        Err(other) => unreachable!("expected SessionNotFound, got {other:?}"),
        Ok(_) => unreachable!("join with an unknown code succeeded"),
    }
    assert_eq!(devices.acquisitions(), 0);
    assert_eq!(mesh.backend().joins(), 0);
}

#[tokio::test]
async fn test_inactive_session_is_refused_before_media() {
    let mesh = MeshHarness::start().await.unwrap();
    let ended = TestSession::new(HOST_USER_ID).with_code("old-sess-ion").ended();
    mesh.backend().insert(ended.build());
    let devices = SimulatedDevices::new();

    let result = mesh
        .join_code(
            "old-sess-ion",
            TestIdentity::new("Ada").build(),
            devices.clone(),
            SimulatedPeerConnector::new(),
        )
        .await;

    assert!(matches!(result, Err(SessionError::SessionInactive(_))));
    assert_eq!(devices.acquisitions(), 0);
}

#[tokio::test]
async fn test_denied_devices_never_reach_the_relay() {
    let mesh = MeshHarness::start().await.unwrap();
    let devices = SimulatedDevices::denying(DeviceError::PermissionDenied);

    let result = mesh
        .join_with("Ada", devices.clone(), SimulatedPeerConnector::new())
        .await;

    match result {
        Err(e @ SessionError::DeviceUnavailable(DeviceError::PermissionDenied)) => {
            assert!(!e.is_terminal());
            assert_eq!(e.error_code(), 8);
        }
        Err(other) => unreachable!("expected DeviceUnavailable, got {other:?}"),
        Ok(_) => unreachable!("join with denied devices succeeded"),
    }
    assert_eq!(devices.tracks_opened(), 0);
    assert_eq!(
        mesh.relay().room_size(&mesh.session().meeting_code).await.unwrap(),
        0
    );
    assert_eq!(mesh.backend().joins(), 0);
}

#[tokio::test]
async fn test_unreachable_relay_releases_media() {
    let mesh = MeshHarness::start().await.unwrap().with_settings(|s| {
        s.relay_address = "local://nowhere".to_string();
    });
    let devices = SimulatedDevices::new();

    let result = mesh
        .join_with("Ada", devices.clone(), SimulatedPeerConnector::new())
        .await;

    assert!(matches!(result, Err(SessionError::RelayUnreachable(_))));
    assert_eq!(devices.acquisitions(), 1);
    assert_eq!(devices.live_tracks(), 0);
    assert_eq!(mesh.backend().joins(), 0);
}

#[tokio::test]
async fn test_stopped_relay_is_unreachable() {
    let mesh = MeshHarness::start().await.unwrap();
    mesh.relay().shutdown();
    let devices = SimulatedDevices::new();

    let result = mesh
        .join_with("Ada", devices.clone(), SimulatedPeerConnector::new())
        .await;

    assert!(matches!(result, Err(SessionError::RelayUnreachable(_))));
    assert_eq!(devices.live_tracks(), 0);
}

#[tokio::test]
async fn test_full_room_refuses_join_and_releases_media() {
    let mesh = MeshHarness::with_capacity(2).await.unwrap();
    let host = mesh.join_host().await.unwrap();
    let ada = mesh.join("Ada").await.unwrap();
    host.wait_connected(1).await;

    let devices = SimulatedDevices::new();
    let result = mesh
        .join_with("Grace", devices.clone(), SimulatedPeerConnector::new())
        .await;

    assert!(matches!(
        result,
        Err(SessionError::SessionFull { capacity: 2 })
    ));
    assert_eq!(devices.live_tracks(), 0);

    // Members already inside never heard of the refused participant
    let host_view = host.handle.get_state().await.unwrap();
    assert_eq!(host_view.peers.len(), 1);
    assert_eq!(
        host_view.peers.first().unwrap().participant_id,
        ada.handle.local_id()
    );
}
