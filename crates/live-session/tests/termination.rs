//! Session termination tests: host end-for-all, refused end-for-all and
//! relay loss.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use live_session::errors::SessionError;
use live_session::session::{EndReason, SessionEvent, SessionPhase};
use live_session::topology::{PeerEvent, RemovalReason};
use live_session_test_utils::{MeshHarness, MeshMember};

/// Events up to and including the terminal one.
async fn drain_until_ended(member: &mut MeshMember) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        let event = member.next_event().await;
        let done = matches!(event, SessionEvent::Ended { .. });
        events.push(event);
        if done {
            member.join_task().await;
            return events;
        }
    }
}

fn closed_links(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::Peer(PeerEvent::PeerRemoved {
                    reason: RemovalReason::SessionClosed,
                    ..
                })
            )
        })
        .count()
}

#[tokio::test]
async fn test_host_end_for_all_terminates_every_participant() {
    let mesh = MeshHarness::start().await.unwrap();
    let mut host = mesh.join_host().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();
    let mut grace = mesh.join("Grace").await.unwrap();

    for member in [&host, &ada, &grace] {
        member.wait_connected(2).await;
    }

    host.handle.end_for_all().await.unwrap();

    for member in [&mut host, &mut ada, &mut grace] {
        let events = drain_until_ended(member).await;

        // Every link closed before the terminal notice
        assert_eq!(closed_links(&events), 2);
        match events.last() {
            Some(SessionEvent::Ended {
                reason: reason @ EndReason::TerminatedByHost { .. },
            }) => assert_eq!(reason.notice(), "The host ended the meeting"),
            other => unreachable!("expected a host termination, got {other:?}"),
        }

        member.assert_released();
        assert!(member.handle.is_ended());
    }

    let session = mesh.backend().session(&mesh.session().meeting_code).unwrap();
    assert!(!session.is_active);
    assert_eq!(mesh.backend().ends(), 1);
    assert_eq!(mesh.relay().room_size(&session.meeting_code).await.unwrap(), 0);
}

#[tokio::test]
async fn test_ended_session_refuses_new_joins() {
    let mesh = MeshHarness::start().await.unwrap();
    let mut host = mesh.join_host().await.unwrap();

    host.handle.end_for_all().await.unwrap();
    host.wait_ended().await;

    let result = mesh.join("Late Larry").await;
    assert!(matches!(result, Err(SessionError::SessionInactive(_))));
}

#[tokio::test]
async fn test_non_host_end_for_all_is_refused() {
    let mesh = MeshHarness::start().await.unwrap();
    let host = mesh.join_host().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();

    host.wait_connected(1).await;
    let before = ada.wait_connected(1).await;

    let result = ada.handle.end_for_all().await;
    assert!(matches!(result, Err(SessionError::Forbidden(_))));

    let notice = ada
        .wait_for(|e| matches!(e, SessionEvent::Notice { .. }))
        .await;
    assert!(matches!(notice, SessionEvent::Notice { code: 3, .. }));

    // Nothing changed anywhere
    let after = ada.handle.get_state().await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.phase, SessionPhase::Active);
    host.wait_connected(1).await;
    assert_eq!(mesh.backend().ends(), 0);
    assert!(mesh.backend().session(&mesh.session().meeting_code).unwrap().is_active);
}

#[tokio::test]
async fn test_relay_loss_ends_sessions_and_records_leave() {
    let mesh = MeshHarness::start().await.unwrap();
    let mut host = mesh.join_host().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();

    host.wait_connected(1).await;
    ada.wait_connected(1).await;

    mesh.relay().shutdown();

    for member in [&mut host, &mut ada] {
        assert_eq!(member.wait_ended().await, EndReason::RelayLost);
        member.assert_released();
    }

    assert_eq!(mesh.backend().leaves(), 2);
    assert!(mesh.backend().session(&mesh.session().meeting_code).unwrap().is_active);
}

#[tokio::test]
async fn test_cancellation_tears_down_like_leave() {
    let mesh = MeshHarness::start().await.unwrap();
    let host = mesh.join_host().await.unwrap();
    let mut ada = mesh.join("Ada").await.unwrap();
    host.wait_connected(1).await;

    ada.handle.cancel();
    assert_eq!(ada.wait_ended().await, EndReason::Left);
    ada.assert_released();

    host.wait_state(|s| s.peers.is_empty()).await;
    assert_eq!(mesh.backend().leaves(), 1);
}
