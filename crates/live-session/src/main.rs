//! Live Session Simulator
//!
//! Runs one complete live session in-process: an in-process relay, a
//! session backend (in-memory, or the REST API with `LS_BACKEND=http`) and
//! simulated capture devices and peer transports. A host creates the session, guests join and the mesh
//! negotiates; one guest mutes, one leaves, and the host ends the session
//! for everyone.
//!
//! Configuration comes from `LS_*` environment variables (see
//! [`live_session::config`]).

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates the scenario, naturally longer

use common::config::ObservabilityConfig;
use live_session::backend::{HttpSessionBackend, SessionBackend};
use live_session::config::{BackendKind, Config};
use live_session::lifecycle::{LocalIdentity, SessionLifecycle};
use live_session::observability::metrics::init_metrics_recorder;
use live_session::relay::LocalRelay;
use live_session::session::{
    EndReason, JoinRequest, LiveSession, LiveSessionHandle, SessionDeps, SessionEvent,
    SessionSettings,
};
use live_session::sim::{InMemorySessionBackend, SimulatedDevices, SimulatedPeerConnector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long to wait for the mesh to settle or for a session to end.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

const HOST_USER_ID: &str = "lecturer-1";

/// One joined participant.
struct Participant {
    name: String,
    handle: LiveSessionHandle,
    events: mpsc::Receiver<SessionEvent>,
    task: JoinHandle<()>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    let observability = ObservabilityConfig::from_vars(&vars);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting live session simulator");

    let config = Config::from_vars(&vars).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        relay_address = %config.relay_address,
        backend = ?config.backend,
        negotiation_timeout_seconds = config.negotiation_timeout_seconds,
        relay_max_participants = config.relay_max_participants,
        sim_guests = config.sim_guests,
        "Configuration loaded"
    );

    // Must be installed before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to initialize metrics recorder");
        e
    })?;

    let shutdown_token = CancellationToken::new();
    let (relay, relay_task) = LocalRelay::spawn(
        config.relay_address.clone(),
        config.relay_max_participants,
        shutdown_token.child_token(),
    );
    let relay = Arc::new(relay);

    let store = InMemorySessionBackend::new(HOST_USER_ID);
    let host_identity = LocalIdentity::new(HOST_USER_ID, "Dr. Hopper");
    let (lifecycle, http_backend) = match config.backend {
        BackendKind::InMemory => (
            SessionLifecycle::new(Arc::new(store.clone()), host_identity.clone()),
            None,
        ),
        BackendKind::Http => {
            let backend: Arc<dyn SessionBackend> =
                Arc::new(HttpSessionBackend::from_config(&config)?);
            (
                SessionLifecycle::from_config(&config, host_identity.clone())?,
                Some(backend),
            )
        }
    };
    let session = lifecycle
        .create_session("Distributed Systems - Week 7", Some("cs-520".to_string()))
        .await?;

    let settings = SessionSettings::from(&config);
    let join = |name: String, user_id: String| {
        let deps = SessionDeps {
            devices: Arc::new(SimulatedDevices::new()),
            relay: relay.clone(),
            peers: Arc::new(SimulatedPeerConnector::new()),
            backend: http_backend
                .clone()
                .unwrap_or_else(|| {
                    Arc::new(store.for_user(user_id.clone())) as Arc<dyn SessionBackend>
                }),
        };
        let request = JoinRequest::new(
            session.meeting_code.clone(),
            LocalIdentity::new(user_id, name.clone()),
        );
        let settings = settings.clone();
        let token = shutdown_token.child_token();
        async move {
            let (handle, events, task) = LiveSession::join(deps, settings, request, token).await?;
            Ok::<_, live_session::errors::SessionError>(Participant {
                name,
                handle,
                events,
                task,
            })
        }
    };

    let mut participants = vec![
        join(
            host_identity.display_name.clone(),
            host_identity.user_id.clone(),
        )
        .await?,
    ];
    for i in 1..=config.sim_guests {
        participants.push(join(format!("Student {i}"), format!("student-{i}")).await?);
    }

    let expected_peers = participants.len().saturating_sub(1);
    if !wait_for_mesh(&participants, expected_peers).await {
        warn!(expected_peers, "Mesh did not fully connect before the deadline");
    }

    for participant in &participants {
        let state = participant.handle.get_state().await?;
        let peers: Vec<String> = state
            .peers
            .iter()
            .map(|p| format!("{}({:?})", p.display_name, p.state))
            .collect();
        info!(
            name = %participant.name,
            participant_id = %state.local_id,
            is_host = state.is_host,
            peers = ?peers,
            "Roster"
        );
    }

    if let Some(guest) = participants.get(1) {
        let changed = guest.handle.toggle_audio(false).await?;
        info!(name = %guest.name, changed, "Guest muted");
    }

    if participants.len() > 2 {
        if let Some(leaver) = participants.pop() {
            leaver.handle.leave().await?;
            report_end(leaver).await;
        }
    }

    let mut participants = participants.into_iter();
    if let Some(host) = participants.next() {
        host.handle.end_for_all().await?;
        report_end(host).await;
    }
    for guest in participants {
        report_end(guest).await;
    }

    if let Some(ended) = store.session(&session.meeting_code) {
        info!(
            is_active = ended.is_active,
            joins = store.joins(),
            leaves = store.leaves(),
            "Session bookkeeping"
        );
    }

    shutdown_token.cancel();
    if let Err(e) = relay_task.await {
        warn!(error = %e, "Relay task ended abnormally");
    }

    info!(metrics = %prometheus_handle.render(), "Final metrics");
    info!("Live session simulator finished");
    Ok(())
}

/// Poll every participant until each sees `expected` connected peers.
async fn wait_for_mesh(participants: &[Participant], expected: usize) -> bool {
    let poll = async {
        loop {
            let mut settled = true;
            for participant in participants {
                match participant.handle.get_state().await {
                    Ok(state) => {
                        let connected = state
                            .peers
                            .iter()
                            .filter(|p| p.has_remote_stream)
                            .count();
                        settled &= connected == expected;
                    }
                    Err(_) => return false,
                }
            }
            if settled {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(SETTLE_TIMEOUT, poll)
        .await
        .unwrap_or(false)
}

/// Drain a participant's events until it ends, then log why.
async fn report_end(mut participant: Participant) {
    let ended = tokio::time::timeout(SETTLE_TIMEOUT, async {
        while let Some(event) = participant.events.recv().await {
            if let SessionEvent::Ended { reason } = event {
                return Some(reason);
            }
        }
        None
    })
    .await;

    match ended {
        Ok(Some(reason)) => {
            let notice = reason.notice();
            match reason {
                EndReason::RelayLost => {
                    warn!(name = %participant.name, notice = %notice, "Session ended");
                }
                _ => info!(name = %participant.name, notice = %notice, "Session ended"),
            }
        }
        Ok(None) => warn!(name = %participant.name, "Event stream closed without an end notice"),
        Err(_) => {
            warn!(name = %participant.name, "Timed out waiting for the session to end");
            participant.handle.cancel();
        }
    }

    if let Err(e) = participant.task.await {
        warn!(name = %participant.name, error = %e, "Session task ended abnormally");
    }
}
