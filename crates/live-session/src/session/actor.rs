//! `LiveSession` actor and handle.
//!
//! # Join
//!
//! 1. Fetch and validate the session (not found / inactive abort the join)
//! 2. Acquire local media (denial aborts the join)
//! 3. Connect to the relay within the connect deadline
//! 4. Announce presence and wait for the relay's `welcome`
//! 5. Register the join with the backend (best effort)
//! 6. Spawn the actor, which receives the roster snapshot next
//!
//! Any failure after step 2 releases the media before returning.
//!
//! # Teardown
//!
//! Leave, host termination, relay loss and cancellation all run the same
//! teardown: close every link, release media, disconnect from the relay.
//! Only leave and relay loss register the departure with the backend.

use super::messages::{
    EndReason, PeerSnapshot, SessionCommand, SessionEvent, SessionPhase, SessionSnapshot,
};
use crate::backend::{SessionBackend, SessionMetadata};
use crate::config::Config;
use crate::errors::SessionError;
use crate::lifecycle::{LocalIdentity, SessionLifecycle};
use crate::media::{MediaCapture, MediaConstraints, MediaDevices, TrackKind};
use crate::observability::metrics;
use crate::signaling::{ClientMessage, RelayConnector, RelayEvent, SignalingChannel};
use crate::topology::{
    PeerConnector, PeerEvent, PeerTopologyManager, RemovalReason, TopologyConfig,
    TransportEvent,
};
use common::types::ParticipantId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Session mailbox buffer.
const SESSION_CHANNEL_BUFFER: usize = 64;

/// Presentation event buffer.
const SESSION_EVENT_BUFFER: usize = 256;

/// Slots held back from ordinary events so the terminal event always fits.
const TERMINAL_EVENT_SLOTS: usize = 1;

/// How often stalled negotiations are swept.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Reason broadcast when the host ends the session.
const HOST_ENDED_REASON: &str = "The host ended the meeting";

/// External collaborators of a session.
#[derive(Clone)]
pub struct SessionDeps {
    pub devices: Arc<dyn MediaDevices>,
    pub relay: Arc<dyn RelayConnector>,
    pub peers: Arc<dyn PeerConnector>,
    pub backend: Arc<dyn SessionBackend>,
}

/// Session tunables.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub relay_address: String,
    pub relay_connect_timeout: Duration,
    pub topology: TopologyConfig,
    pub sweep_interval: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            relay_address: config.relay_address.clone(),
            relay_connect_timeout: config.relay_connect_timeout(),
            topology: TopologyConfig {
                negotiation_timeout: config.negotiation_timeout(),
                max_pending_payloads: config.max_pending_payloads,
            },
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// What to join and as whom.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub meeting_code: String,
    pub identity: LocalIdentity,
    pub constraints: MediaConstraints,
}

impl JoinRequest {
    /// Join `meeting_code` with camera and microphone.
    #[must_use]
    pub fn new(meeting_code: impl Into<String>, identity: LocalIdentity) -> Self {
        Self {
            meeting_code: meeting_code.into(),
            identity,
            constraints: MediaConstraints::default(),
        }
    }
}

/// Entry point for joining a session.
pub struct LiveSession;

impl LiveSession {
    /// Join a session and spawn its actor.
    ///
    /// Returns the handle, the presentation event stream and the actor task.
    ///
    /// # Errors
    ///
    /// - `SessionError::SessionNotFound` / `SessionInactive` - bad join code
    /// - `SessionError::DeviceUnavailable` - media could not be acquired
    /// - `SessionError::RelayUnreachable` - relay connect failed or timed out
    /// - `SessionError::SessionFull` - the relay room is at capacity
    #[instrument(skip_all, name = "ls.session.join", fields(meeting_code = %request.meeting_code))]
    pub async fn join(
        deps: SessionDeps,
        settings: SessionSettings,
        request: JoinRequest,
        cancel_token: CancellationToken,
    ) -> Result<
        (
            LiveSessionHandle,
            mpsc::Receiver<SessionEvent>,
            JoinHandle<()>,
        ),
        SessionError,
    > {
        let start = Instant::now();
        let failed = |_: &SessionError| metrics::record_join("error", start.elapsed());

        let lifecycle = SessionLifecycle::new(deps.backend, request.identity.clone());
        let metadata = lifecycle
            .fetch_session(&request.meeting_code)
            .await
            .inspect_err(failed)?;

        let mut capture = MediaCapture::new(deps.devices).with_constraints(request.constraints);
        let local_stream = capture.acquire().await.inspect_err(failed)?;

        let (channel, local_id) = match establish(
            deps.relay.as_ref(),
            &settings,
            &metadata,
            &request.identity,
        )
        .await
        {
            Ok(established) => established,
            Err(e) => {
                capture.release();
                failed(&e);
                return Err(e);
            }
        };
        metrics::record_join("success", start.elapsed());

        lifecycle.register_join(&metadata.id).await;

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let mut topology = PeerTopologyManager::new(
            local_stream.clone(),
            deps.peers,
            transport_tx,
            settings.topology,
        );
        topology.set_local_id(local_id);

        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(SESSION_EVENT_BUFFER);

        let is_host = lifecycle.is_host(&metadata);
        let actor = SessionActor {
            metadata: metadata.clone(),
            local_id,
            is_host,
            lifecycle,
            capture,
            channel,
            topology,
            receiver,
            transport_rx,
            events: events_tx,
            cancel_token: cancel_token.clone(),
            sweep_interval: settings.sweep_interval,
            phase: SessionPhase::Active,
        };

        actor.emit(SessionEvent::Joined {
            participant_id: local_id,
            session: metadata.clone(),
            local_stream: local_stream.id(),
        });

        info!(
            target: "ls.session",
            session_id = %metadata.id,
            participant_id = %local_id,
            is_host,
            "Joined session"
        );

        let task_handle = tokio::spawn(actor.run());

        let handle = LiveSessionHandle {
            sender,
            cancel_token,
            session_id: metadata.id,
            local_id,
        };

        Ok((handle, events_rx, task_handle))
    }
}

/// Connect, announce and wait for the relay-assigned id.
async fn establish(
    relay: &dyn RelayConnector,
    settings: &SessionSettings,
    metadata: &SessionMetadata,
    identity: &LocalIdentity,
) -> Result<(SignalingChannel, ParticipantId), SessionError> {
    let mut channel = SignalingChannel::connect(
        relay,
        &settings.relay_address,
        settings.relay_connect_timeout,
    )
    .await?;

    channel
        .announce_join(
            &metadata.meeting_code,
            &metadata.host_id,
            identity.to_participant(),
        )
        .await?;

    let welcome = tokio::time::timeout(settings.relay_connect_timeout, async {
        loop {
            match channel.next_event().await {
                Some(RelayEvent::Welcome { participant_id }) => return Ok(participant_id),
                Some(RelayEvent::SessionFull { capacity }) => {
                    return Err(SessionError::SessionFull { capacity })
                }
                Some(RelayEvent::Error { message }) => {
                    return Err(SessionError::Signaling(message))
                }
                Some(other) => {
                    debug!(
                        target: "ls.session",
                        kind = other.kind().as_str(),
                        "Ignoring event before welcome"
                    );
                }
                None => {
                    return Err(SessionError::RelayUnreachable(
                        "relay closed the connection during join".to_string(),
                    ))
                }
            }
        }
    })
    .await;

    match welcome {
        Ok(Ok(local_id)) => Ok((channel, local_id)),
        Ok(Err(e)) => {
            channel.disconnect();
            Err(e)
        }
        Err(_) => {
            channel.disconnect();
            Err(SessionError::RelayUnreachable(
                "relay did not acknowledge the join".to_string(),
            ))
        }
    }
}

/// Handle to a running session.
#[derive(Clone)]
pub struct LiveSessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    cancel_token: CancellationToken,
    session_id: String,
    local_id: ParticipantId,
}

impl LiveSessionHandle {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Relay-assigned id of the local participant.
    #[must_use]
    pub fn local_id(&self) -> ParticipantId {
        self.local_id
    }

    /// Enable or disable the microphone. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionInactive` once the session has ended.
    pub async fn toggle_audio(&self, enabled: bool) -> Result<bool, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::ToggleAudio {
            enabled,
            respond_to: tx,
        })
        .await?;
        self.reply(rx).await
    }

    /// Enable or disable the camera. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionInactive` once the session has ended.
    pub async fn toggle_video(&self, enabled: bool) -> Result<bool, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::ToggleVideo {
            enabled,
            respond_to: tx,
        })
        .await?;
        self.reply(rx).await
    }

    /// Leave the session. Leaving an ended session is a no-op.
    ///
    /// # Errors
    ///
    /// Never returns an error. A session whose task already stopped counts
    /// as left.
    pub async fn leave(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionCommand::Leave { respond_to: tx })
            .await
            .is_err()
        {
            return Ok(());
        }
        // A dropped reply means the actor ended on its own
        let _ = rx.await;
        Ok(())
    }

    /// End the session for every participant (host only).
    ///
    /// # Errors
    ///
    /// - `SessionError::Forbidden` - the local user is not the host
    /// - `SessionError::SessionNotFound` - the backend lost the session
    /// - `SessionError::SessionInactive` - the session already ended
    pub async fn end_for_all(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::EndForAll { respond_to: tx })
            .await?;
        self.reply(rx).await?
    }

    /// Current session state.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionInactive` once the session has ended.
    pub async fn get_state(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.request(SessionCommand::GetState { respond_to: tx })
            .await?;
        self.reply(rx).await
    }

    /// Tear the session down without waiting.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Whether the actor has stopped.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| SessionError::SessionInactive(self.session_id.clone()))
    }

    async fn reply<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, SessionError> {
        rx.await
            .map_err(|_| SessionError::SessionInactive(self.session_id.clone()))
    }
}

/// The session actor.
struct SessionActor {
    metadata: SessionMetadata,
    local_id: ParticipantId,
    is_host: bool,
    lifecycle: SessionLifecycle,
    capture: MediaCapture,
    channel: SignalingChannel,
    topology: PeerTopologyManager,
    receiver: mpsc::Receiver<SessionCommand>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    events: mpsc::Sender<SessionEvent>,
    cancel_token: CancellationToken,
    sweep_interval: Duration,
    phase: SessionPhase,
}

impl SessionActor {
    #[instrument(
        skip_all,
        name = "ls.session",
        fields(session_id = %self.metadata.id, participant_id = %self.local_id)
    )]
    async fn run(mut self) {
        info!(target: "ls.session", "Session actor started");

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "ls.session", "Session received cancellation signal");
                    self.teardown(EndReason::Left, true).await;
                }

                command = self.receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!(target: "ls.session", "All handles dropped, leaving");
                            self.teardown(EndReason::Left, true).await;
                        }
                    }
                }

                event = self.channel.next_event() => {
                    match event {
                        Some(event) => self.handle_relay_event(event).await,
                        None => {
                            warn!(target: "ls.session", "Relay connection lost");
                            self.teardown(EndReason::RelayLost, true).await;
                        }
                    }
                }

                Some(event) = self.transport_rx.recv() => {
                    self.topology.on_transport_event(event);
                }

                _ = sweep.tick() => {
                    self.topology.expire_stalled(Instant::now());
                }
            }

            if self.phase == SessionPhase::Ended {
                break;
            }
            self.flush().await;
        }

        info!(target: "ls.session", "Session actor stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::ToggleAudio {
                enabled,
                respond_to,
            } => {
                let changed = self.toggle(TrackKind::Audio, enabled);
                let _ = respond_to.send(changed);
            }

            SessionCommand::ToggleVideo {
                enabled,
                respond_to,
            } => {
                let changed = self.toggle(TrackKind::Video, enabled);
                let _ = respond_to.send(changed);
            }

            SessionCommand::Leave { respond_to } => {
                self.teardown(EndReason::Left, true).await;
                let _ = respond_to.send(());
            }

            SessionCommand::EndForAll { respond_to } => {
                let result = self.end_for_all().await;
                if let Err(e) = &result {
                    self.emit(SessionEvent::notice(e));
                }
                let _ = respond_to.send(result);
            }

            SessionCommand::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    fn toggle(&mut self, kind: TrackKind, enabled: bool) -> bool {
        let changed = match kind {
            TrackKind::Audio => self.capture.toggle_audio(enabled),
            TrackKind::Video => self.capture.toggle_video(enabled),
        };
        if changed {
            self.emit(SessionEvent::MediaToggled { kind, enabled });
        }
        changed
    }

    /// Backend first, then the relay broadcast. Local teardown happens when
    /// the broadcast comes back like for every other participant.
    async fn end_for_all(&mut self) -> Result<(), SessionError> {
        self.lifecycle.end_for_all(&self.metadata).await?;

        let message = ClientMessage::EndSession {
            session_code: self.metadata.meeting_code.clone(),
            reason: HOST_ENDED_REASON.to_string(),
        };
        if let Err(e) = self.channel.send(&message).await {
            warn!(
                target: "ls.session",
                error = %e,
                "Termination broadcast failed, ending locally"
            );
            self.teardown(
                EndReason::TerminatedByHost {
                    reason: HOST_ENDED_REASON.to_string(),
                },
                false,
            )
            .await;
        }
        Ok(())
    }

    async fn handle_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Welcome { participant_id } => {
                debug!(target: "ls.session", participant_id = %participant_id, "Duplicate welcome ignored");
            }
            RelayEvent::RosterSnapshot { participants } => {
                self.topology.on_roster_snapshot(participants);
            }
            RelayEvent::ParticipantJoined {
                participant_id,
                display_name,
                payload,
            } => {
                self.topology
                    .on_participant_joined(participant_id, display_name, payload);
            }
            RelayEvent::NegotiationPayload { from, payload } => {
                self.topology.on_negotiation_payload(from, payload);
            }
            RelayEvent::ParticipantLeft { participant_id } => {
                self.topology.on_participant_left(participant_id);
            }
            RelayEvent::SessionTerminated { reason } => {
                info!(target: "ls.session", reason = %reason, "Session terminated by host");
                self.teardown(EndReason::TerminatedByHost { reason }, false)
                    .await;
            }
            RelayEvent::SessionFull { capacity } => {
                warn!(target: "ls.session", capacity, "Unexpected session-full after join");
            }
            RelayEvent::Error { message } => {
                warn!(target: "ls.session", message = %message, "Relay reported an error");
            }
        }
    }

    /// Send queued frames and forward topology events.
    async fn flush(&mut self) {
        for message in self.topology.drain_outbound() {
            if let Err(e) = self.channel.send(&message).await {
                // Relay loss surfaces through the inbound stream
                warn!(target: "ls.session", error = %e, kind = message.kind(), "Failed to send frame");
            }
        }
        self.forward_peer_events();
    }

    fn forward_peer_events(&mut self) {
        for event in self.topology.drain_events() {
            let notice = match &event {
                PeerEvent::ConnectFailed {
                    participant_id,
                    reason,
                } => Some(SessionError::NegotiationFailure {
                    participant_id: *participant_id,
                    reason: reason.clone(),
                }),
                PeerEvent::PeerRemoved {
                    participant_id,
                    reason: reason @ (RemovalReason::NegotiationTimeout | RemovalReason::TransportFailed),
                } => Some(SessionError::NegotiationFailure {
                    participant_id: *participant_id,
                    reason: reason.as_str().to_string(),
                }),
                _ => None,
            };
            self.emit(SessionEvent::Peer(event));
            if let Some(error) = notice {
                self.emit(SessionEvent::notice(&error));
            }
        }
    }

    async fn teardown(&mut self, reason: EndReason, register_leave: bool) {
        if self.phase == SessionPhase::Ended {
            return;
        }
        self.phase = SessionPhase::Ended;

        self.topology.close_all();
        self.forward_peer_events();
        self.capture.release();
        self.channel.disconnect();

        if register_leave {
            self.lifecycle.register_leave(&self.metadata.id).await;
        }

        metrics::record_session_ended(reason.as_str());
        info!(target: "ls.session", reason = reason.as_str(), "Session ended");
        self.emit_terminal(SessionEvent::Ended { reason });
    }

    fn snapshot(&self) -> SessionSnapshot {
        let mut peers: Vec<PeerSnapshot> = self
            .topology
            .roster()
            .iter()
            .map(|link| PeerSnapshot {
                participant_id: link.remote(),
                display_name: link.display_name().to_string(),
                state: link.state(),
                has_remote_stream: link.remote_stream().is_some(),
            })
            .collect();
        peers.sort_by_key(|p| p.participant_id);

        SessionSnapshot {
            session_id: self.metadata.id.clone(),
            meeting_code: self.metadata.meeting_code.clone(),
            title: self.metadata.title.clone(),
            local_id: self.local_id,
            is_host: self.is_host,
            audio_enabled: self.capture.is_enabled(TrackKind::Audio).unwrap_or(false),
            video_enabled: self.capture.is_enabled(TrackKind::Video).unwrap_or(false),
            peers,
            phase: self.phase,
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.capacity() <= TERMINAL_EVENT_SLOTS {
            warn!(
                target: "ls.session",
                dropped = ?event,
                "Presentation event queue full, dropping event"
            );
            return;
        }
        self.deliver(event);
    }

    /// Sends into the reserved slot; only `Ended` uses this, once.
    fn emit_terminal(&self, event: SessionEvent) {
        self.deliver(event);
    }

    fn deliver(&self, event: SessionEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    target: "ls.session",
                    dropped = ?event,
                    "Presentation event queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(target: "ls.session", "Presentation gone, event discarded");
            }
        }
    }
}
