//! In-process mesh harness for end-to-end session tests.
//!
//! `MeshHarness` runs a [`LocalRelay`] and an [`InMemorySessionBackend`]
//! holding one hosted session. Each [`MeshMember`] joins with its own
//! simulated devices and peer connector, and keeps clones of them so tests
//! can assert that every track and transport was released.
//!
//! # Example
//!
//! ```rust,ignore
//! let mesh = MeshHarness::start().await?;
//! let mut host = mesh.join_host().await?;
//! let mut guest = mesh.join("Ada").await?;
//!
//! host.wait_connected(1).await;
//! guest.wait_connected(1).await;
//!
//! guest.handle.leave().await?;
//! assert_eq!(guest.wait_ended().await, EndReason::Left);
//! ```

use live_session::backend::SessionMetadata;
use live_session::errors::SessionError;
use live_session::lifecycle::{LocalIdentity, SessionLifecycle};
use live_session::relay::LocalRelay;
use live_session::session::{
    EndReason, JoinRequest, LiveSession, LiveSessionHandle, SessionDeps, SessionEvent,
    SessionSettings, SessionSnapshot,
};
use live_session::sim::{InMemorySessionBackend, SimulatedDevices, SimulatedPeerConnector};
use live_session::topology::TopologyConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Host user id of the harness session.
pub const HOST_USER_ID: &str = "lecturer-1";

/// How long helpers wait before failing the test.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings tuned for tests: short deadlines and a fast sweep.
#[must_use]
pub fn test_settings(relay_address: impl Into<String>) -> SessionSettings {
    SessionSettings {
        relay_address: relay_address.into(),
        relay_connect_timeout: Duration::from_secs(2),
        topology: TopologyConfig {
            negotiation_timeout: Duration::from_secs(2),
            max_pending_payloads: 32,
        },
        sweep_interval: Duration::from_millis(50),
    }
}

/// A relay, a backend and one hosted session.
pub struct MeshHarness {
    relay: LocalRelay,
    relay_task: Option<JoinHandle<()>>,
    backend: InMemorySessionBackend,
    session: SessionMetadata,
    settings: SessionSettings,
    cancel_token: CancellationToken,
    next_guest: AtomicUsize,
}

impl MeshHarness {
    /// Start a harness with room for eight participants.
    pub async fn start() -> Result<Self, anyhow::Error> {
        Self::with_capacity(8).await
    }

    /// Start a harness whose relay rooms admit at most `capacity` members.
    pub async fn with_capacity(capacity: usize) -> Result<Self, anyhow::Error> {
        let cancel_token = CancellationToken::new();
        let address = format!("local://relay-{}", Uuid::new_v4());
        let (relay, relay_task) = LocalRelay::spawn(&address, capacity, cancel_token.child_token());

        let backend = InMemorySessionBackend::new(HOST_USER_ID);
        let lifecycle = SessionLifecycle::new(
            Arc::new(backend.clone()),
            LocalIdentity::new(HOST_USER_ID, "Dr. Hopper"),
        );
        let session = lifecycle
            .create_session("Operating Systems", Some("cs-330".to_string()))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create session: {}", e))?;

        Ok(Self {
            relay,
            relay_task: Some(relay_task),
            backend,
            session,
            settings: test_settings(address),
            cancel_token,
            next_guest: AtomicUsize::new(1),
        })
    }

    /// Override the session settings used for later joins.
    #[must_use]
    pub fn with_settings(mut self, f: impl FnOnce(&mut SessionSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    #[must_use]
    pub fn relay(&self) -> &LocalRelay {
        &self.relay
    }

    /// Backend store, viewed as the host.
    #[must_use]
    pub fn backend(&self) -> &InMemorySessionBackend {
        &self.backend
    }

    #[must_use]
    pub fn session(&self) -> &SessionMetadata {
        &self.session
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Join as the host.
    pub async fn join_host(&self) -> Result<MeshMember, SessionError> {
        self.join_as(
            LocalIdentity::new(HOST_USER_ID, "Dr. Hopper"),
            SimulatedDevices::new(),
            SimulatedPeerConnector::new(),
        )
        .await
    }

    /// Join as a fresh guest named `name`.
    pub async fn join(&self, name: &str) -> Result<MeshMember, SessionError> {
        self.join_with(name, SimulatedDevices::new(), SimulatedPeerConnector::new())
            .await
    }

    /// Join as a fresh guest with specific devices and peer connector.
    pub async fn join_with(
        &self,
        name: &str,
        devices: SimulatedDevices,
        peers: SimulatedPeerConnector,
    ) -> Result<MeshMember, SessionError> {
        let n = self.next_guest.fetch_add(1, Ordering::SeqCst);
        self.join_as(LocalIdentity::new(format!("student-{n}"), name), devices, peers)
            .await
    }

    /// Join as `identity`.
    pub async fn join_as(
        &self,
        identity: LocalIdentity,
        devices: SimulatedDevices,
        peers: SimulatedPeerConnector,
    ) -> Result<MeshMember, SessionError> {
        self.join_code(&self.session.meeting_code, identity, devices, peers)
            .await
    }

    /// Join `code` as `identity`; lets tests use unknown or ended codes.
    pub async fn join_code(
        &self,
        code: &str,
        identity: LocalIdentity,
        devices: SimulatedDevices,
        peers: SimulatedPeerConnector,
    ) -> Result<MeshMember, SessionError> {
        let backend = self.backend.for_user(identity.user_id.clone());
        let deps = SessionDeps {
            devices: Arc::new(devices.clone()),
            relay: Arc::new(self.relay.clone()),
            peers: Arc::new(peers.clone()),
            backend: Arc::new(backend),
        };
        let request = JoinRequest::new(code, identity.clone());

        let (handle, events, task) = LiveSession::join(
            deps,
            self.settings.clone(),
            request,
            self.cancel_token.child_token(),
        )
        .await?;

        Ok(MeshMember {
            identity,
            handle,
            events,
            task: Some(task),
            devices,
            peers,
        })
    }

    /// Stop the relay and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.relay_task.take() {
            let _ = tokio::time::timeout(WAIT_TIMEOUT, task).await;
        }
    }
}

impl Drop for MeshHarness {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// One joined participant plus its simulated collaborators.
pub struct MeshMember {
    pub identity: LocalIdentity,
    pub handle: LiveSessionHandle,
    pub events: mpsc::Receiver<SessionEvent>,
    task: Option<JoinHandle<()>>,
    /// Shares counters with the devices the session holds.
    pub devices: SimulatedDevices,
    /// Shares counters with the connector the session holds.
    pub peers: SimulatedPeerConnector,
}

impl MeshMember {
    /// Next presentation event; fails the test on timeout or a closed stream.
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(WAIT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("session event stream closed")
    }

    /// Skip events until one matches `predicate`, and return it.
    pub async fn wait_for(&mut self, predicate: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        loop {
            let event = self.next_event().await;
            if predicate(&event) {
                return event;
            }
        }
    }

    /// Wait for the terminal event and the actor task to exit.
    pub async fn wait_ended(&mut self) -> EndReason {
        let event = self
            .wait_for(|e| matches!(e, SessionEvent::Ended { .. }))
            .await;
        self.join_task().await;
        match event {
            SessionEvent::Ended { reason } => reason,
            other => unreachable!("wait_for returned {other:?}"),
        }
    }

    /// Poll state until `count` peers have delivered remote media.
    pub async fn wait_connected(&self, count: usize) -> SessionSnapshot {
        self.wait_state(|s| s.peers.iter().filter(|p| p.has_remote_stream).count() == count)
            .await
    }

    /// Poll state until `predicate` holds.
    pub async fn wait_state(&self, predicate: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        let poll = async {
            loop {
                let state = self
                    .handle
                    .get_state()
                    .await
                    .expect("session ended while waiting for state");
                if predicate(&state) {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(WAIT_TIMEOUT, poll)
            .await
            .expect("timed out waiting for session state")
    }

    /// Wait for the actor task to exit.
    pub async fn join_task(&mut self) {
        if let Some(task) = self.task.take() {
            tokio::time::timeout(WAIT_TIMEOUT, task)
                .await
                .expect("session task did not exit")
                .expect("session task panicked");
        }
    }

    /// Assert that every track and transport this member created is gone.
    pub fn assert_released(&self) {
        assert_eq!(
            self.devices.live_tracks(),
            0,
            "{} still holds capture tracks",
            self.identity.display_name
        );
        assert_eq!(
            self.peers.live_links(),
            0,
            "{} still holds peer transports",
            self.identity.display_name
        );
    }
}
