//! End-to-end session flow tests.
//!
//! Runs several sessions against one in-process relay and checks that the
//! mesh forms, tracks membership changes and releases every resource.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use live_session::media::TrackKind;
use live_session::session::{EndReason, SessionEvent, SessionPhase};
use live_session::sim::{SimulatedDevices, SimulatedPeerConnector};
use live_session::topology::{LinkState, PeerEvent, RemovalReason};
use live_session_test_utils::MeshHarness;
use std::time::Duration;

#[tokio::test]
async fn test_join_emits_joined_with_session_metadata() {
    let mesh = MeshHarness::start().await.unwrap();
    let mut host = mesh.join_host().await.unwrap();

    match host.next_event().await {
        SessionEvent::Joined {
            participant_id,
            session,
            ..
        } => {
            assert_eq!(participant_id, host.handle.local_id());
            assert_eq!(session.id, mesh.session().id);
        }
        other => unreachable!("expected Joined, got {other:?}"),
    }

    let state = host.handle.get_state().await.unwrap();
    assert!(state.is_host);
    assert!(state.peers.is_empty());
    assert!(state.audio_enabled);
    assert!(state.video_enabled);
    assert_eq!(state.phase, SessionPhase::Active);
    assert_eq!(mesh.backend().joins(), 1);
}

#[tokio::test]
async fn test_three_participants_form_full_mesh() {
    let mesh = MeshHarness::start().await.unwrap();
    let host = mesh.join_host().await.unwrap();
    let ada = mesh.join("Ada").await.unwrap();
    let grace = mesh.join("Grace").await.unwrap();

    for member in [&host, &ada, &grace] {
        let state = member.wait_connected(2).await;
        assert!(state
            .peers
            .iter()
            .all(|p| p.state == LinkState::Connected));
    }

    let host_view = host.handle.get_state().await.unwrap();
    let mut names: Vec<_> = host_view
        .peers
        .iter()
        .map(|p| p.display_name.clone())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Ada".to_string(), "Grace".to_string()]);

    // Each pair negotiates over exactly one link per side
    assert_eq!(host.peers.links_created(), 2);
    assert_eq!(ada.peers.links_created(), 2);
    assert_eq!(grace.peers.links_created(), 2);
    assert_eq!(mesh.relay().room_size(&mesh.session().meeting_code).await.unwrap(), 3);
}

#[tokio::test]
async fn test_newcomer_sees_remote_tiles_for_existing_members() {
    let mesh = MeshHarness::start().await.unwrap();
    let _host = mesh.join_host().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();

    let added = ada
        .wait_for(|e| matches!(e, SessionEvent::Peer(PeerEvent::PeerAdded { .. })))
        .await;
    let SessionEvent::Peer(PeerEvent::PeerAdded { display_name, .. }) = added else {
        unreachable!("wait_for returned {added:?}");
    };
    assert_eq!(display_name, "Dr. Hopper");

    ada.wait_for(|e| {
        matches!(
            e,
            SessionEvent::Peer(PeerEvent::RemoteStreamAvailable { .. })
        )
    })
    .await;
}

#[tokio::test]
async fn test_leave_is_observed_by_remaining_members_only() {
    let mesh = MeshHarness::start().await.unwrap();
    let mut host = mesh.join_host().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();
    let grace = mesh.join("Grace").await.unwrap();

    host.wait_connected(2).await;
    ada.wait_connected(2).await;
    grace.wait_connected(2).await;

    let ada_id = ada.handle.local_id();
    ada.handle.leave().await.unwrap();
    assert_eq!(ada.wait_ended().await, EndReason::Left);
    ada.assert_released();

    let removed = host
        .wait_for(|e| matches!(e, SessionEvent::Peer(PeerEvent::PeerRemoved { .. })))
        .await;
    assert_eq!(
        removed,
        SessionEvent::Peer(PeerEvent::PeerRemoved {
            participant_id: ada_id,
            reason: RemovalReason::Left,
        })
    );

    // The host's link to Grace is untouched
    let host_view = host.wait_state(|s| s.peers.len() == 1).await;
    assert_eq!(host_view.peers.first().unwrap().participant_id, grace.handle.local_id());
    assert_eq!(host.peers.live_links(), 1);
    grace.wait_state(|s| s.peers.len() == 1).await;

    assert_eq!(mesh.backend().leaves(), 1);
}

#[tokio::test]
async fn test_leave_twice_is_harmless() {
    let mesh = MeshHarness::start().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();

    ada.handle.leave().await.unwrap();
    ada.handle.leave().await.unwrap();
    assert_eq!(ada.wait_ended().await, EndReason::Left);

    assert!(ada.handle.is_ended());
    assert_eq!(ada.devices.tracks_stopped(), 2);
    assert_eq!(mesh.backend().leaves(), 1);
}

#[tokio::test]
async fn test_repeated_join_and_leave_leaks_nothing() {
    let mesh = MeshHarness::start().await.unwrap();
    let host = mesh.join_host().await.unwrap();

    for round in 0..5 {
        let mut guest = mesh.join(&format!("Guest {round}")).await.unwrap();
        guest.wait_connected(1).await;
        host.wait_connected(1).await;

        guest.handle.leave().await.unwrap();
        assert_eq!(guest.wait_ended().await, EndReason::Left);
        guest.assert_released();

        host.wait_state(|s| s.peers.is_empty()).await;
    }

    assert_eq!(host.peers.links_created(), 5);
    assert_eq!(host.peers.live_links(), 0);
    assert_eq!(host.devices.acquisitions(), 1);
    assert_eq!(mesh.backend().joins(), 6);
    assert_eq!(mesh.backend().leaves(), 5);
}

#[tokio::test]
async fn test_toggles_are_idempotent() {
    let mesh = MeshHarness::start().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();
    ada.next_event().await; // Joined

    assert!(ada.handle.toggle_audio(false).await.unwrap());
    assert!(!ada.handle.toggle_audio(false).await.unwrap());
    assert!(ada.handle.toggle_video(false).await.unwrap());
    assert!(ada.handle.toggle_audio(true).await.unwrap());

    let state = ada.handle.get_state().await.unwrap();
    assert!(state.audio_enabled);
    assert!(!state.video_enabled);

    let mut toggles = Vec::new();
    while toggles.len() < 3 {
        if let SessionEvent::MediaToggled { kind, enabled } = ada.next_event().await {
            toggles.push((kind, enabled));
        }
    }
    assert_eq!(
        toggles,
        vec![
            (TrackKind::Audio, false),
            (TrackKind::Video, false),
            (TrackKind::Audio, true),
        ]
    );
    assert_eq!(ada.devices.enabled_flag_writes(), 3);
}

#[tokio::test]
async fn test_toggle_after_leave_reports_inactive() {
    let mesh = MeshHarness::start().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();

    ada.handle.leave().await.unwrap();
    ada.wait_ended().await;

    let result = ada.handle.toggle_audio(false).await;
    assert!(matches!(
        result,
        Err(live_session::errors::SessionError::SessionInactive(_))
    ));
}

#[tokio::test]
async fn test_refused_transport_surfaces_negotiation_notice() {
    let mesh = MeshHarness::start().await.unwrap();
    let host = mesh.join_host().await.unwrap();

    let peers = SimulatedPeerConnector::new().failing_for([host.handle.local_id()]);
    let mut ada = mesh
        .join_with("Ada", SimulatedDevices::new(), peers)
        .await
        .unwrap();

    let failed = ada
        .wait_for(|e| matches!(e, SessionEvent::Peer(PeerEvent::ConnectFailed { .. })))
        .await;
    let SessionEvent::Peer(PeerEvent::ConnectFailed { participant_id, .. }) = failed else {
        unreachable!("wait_for returned {failed:?}");
    };
    assert_eq!(participant_id, host.handle.local_id());

    let notice = ada.next_event().await;
    assert!(matches!(notice, SessionEvent::Notice { code: 10, .. }));

    // The failure stays local to that one link
    let state = ada.handle.get_state().await.unwrap();
    assert!(state.peers.is_empty());
    assert_eq!(state.phase, SessionPhase::Active);
}

#[tokio::test]
async fn test_stalled_negotiation_times_out() {
    let mesh = MeshHarness::start().await.unwrap().with_settings(|s| {
        s.topology.negotiation_timeout = Duration::from_millis(200);
    });
    let host = mesh.join_host().await.unwrap();

    let peers = SimulatedPeerConnector::new().stalled();
    let mut ada = mesh
        .join_with("Ada", SimulatedDevices::new(), peers)
        .await
        .unwrap();

    let removed = ada
        .wait_for(|e| matches!(e, SessionEvent::Peer(PeerEvent::PeerRemoved { .. })))
        .await;
    assert_eq!(
        removed,
        SessionEvent::Peer(PeerEvent::PeerRemoved {
            participant_id: host.handle.local_id(),
            reason: RemovalReason::NegotiationTimeout,
        })
    );
    assert!(matches!(
        ada.next_event().await,
        SessionEvent::Notice { code: 10, .. }
    ));
    assert_eq!(ada.peers.live_links(), 0);
}

#[tokio::test]
async fn test_ended_arrives_even_when_presentation_lags() {
    let mesh = MeshHarness::start().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();

    // Nobody drains while the queue overflows with toggles
    for i in 0..300 {
        assert!(ada.handle.toggle_audio(i % 2 == 1).await.unwrap());
    }
    ada.handle.leave().await.unwrap();

    let mut received = 0;
    loop {
        received += 1;
        if let SessionEvent::Ended { reason } = ada.next_event().await {
            assert_eq!(reason, EndReason::Left);
            break;
        }
    }
    assert!(received <= 256);
    ada.join_task().await;
    ada.assert_released();
}
