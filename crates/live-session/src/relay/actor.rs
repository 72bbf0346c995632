//! `LocalRelay` actor.
//!
//! The actor owns every room and connection. Each connection gets a pump
//! task that forwards client frames into the actor's frame queue and reports
//! `Closed` once the client drops its sending half; that report is the
//! relay's disconnect detection.
//!
//! A connection whose frame queue fills up is evicted rather than silently
//! losing control frames; its client observes a closed inbound stream.

use crate::errors::SessionError;
use crate::observability::metrics;
use crate::signaling::messages::{
    self, ClientMessage, ParticipantIdentity, PeerSummary, RelayEvent,
};
use crate::signaling::{RelayConnector, RelayLink};
use async_trait::async_trait;
use common::types::ParticipantId;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Buffer of each relay-to-client frame queue.
pub const RELAY_CONNECTION_BUFFER: usize = 256;

/// Relay mailbox buffer.
const RELAY_CHANNEL_BUFFER: usize = 64;

/// Client-to-relay frame queue buffer (shared by all pumps).
const RELAY_FRAME_BUFFER: usize = 1024;

/// Messages to the relay actor.
enum RelayMessage {
    /// Accept a new connection.
    Open {
        respond_to: oneshot::Sender<RelayLink>,
    },

    /// Number of members currently in a room.
    RoomSize {
        session_code: String,
        respond_to: oneshot::Sender<usize>,
    },
}

/// Input from a connection pump.
enum Inbound {
    Frame { from: ParticipantId, text: String },
    Closed { from: ParticipantId },
}

/// Handle to the relay actor.
#[derive(Clone)]
pub struct LocalRelay {
    sender: mpsc::Sender<RelayMessage>,
    cancel_token: CancellationToken,
    address: String,
}

impl LocalRelay {
    /// Spawn a relay reachable at `address`.
    ///
    /// Rooms admit at most `max_participants` members.
    #[must_use]
    pub fn spawn(
        address: impl Into<String>,
        max_participants: usize,
        cancel_token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let address = address.into();
        let (sender, receiver) = mpsc::channel(RELAY_CHANNEL_BUFFER);
        let (frames_tx, frames_rx) = mpsc::channel(RELAY_FRAME_BUFFER);

        let actor = RelayActor {
            address: address.clone(),
            receiver,
            frames_tx,
            frames_rx,
            cancel_token: cancel_token.clone(),
            max_participants,
            connections: HashMap::new(),
            rooms: HashMap::new(),
            lagging: Vec::new(),
            mailbox_closed: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = Self {
            sender,
            cancel_token,
            address,
        };

        (handle, task_handle)
    }

    /// Members currently joined to `session_code`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Internal` if the relay has stopped.
    pub async fn room_size(&self, session_code: &str) -> Result<usize, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RelayMessage::RoomSize {
                session_code: session_code.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop the relay. Every connection observes a closed inbound stream.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Whether the relay has been stopped.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

#[async_trait]
impl RelayConnector for LocalRelay {
    async fn open(&self, address: &str) -> Result<RelayLink, SessionError> {
        if address != self.address {
            return Err(SessionError::RelayUnreachable(format!(
                "no relay at {address}"
            )));
        }
        if self.is_shutdown() {
            return Err(SessionError::RelayUnreachable("relay stopped".to_string()));
        }

        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RelayMessage::Open { respond_to: tx })
            .await
            .map_err(|_| SessionError::RelayUnreachable("relay stopped".to_string()))?;

        rx.await
            .map_err(|_| SessionError::RelayUnreachable("relay stopped".to_string()))
    }
}

/// One client connection.
struct Connection {
    outbound: mpsc::Sender<String>,
    session_code: Option<String>,
    user_id: String,
    display_name: String,
}

/// Members of one session code.
struct Room {
    /// User allowed to end the room, fixed by the first join.
    host_id: String,
    /// Members in join order.
    members: Vec<ParticipantId>,
}

/// The relay actor.
struct RelayActor {
    address: String,
    receiver: mpsc::Receiver<RelayMessage>,
    frames_tx: mpsc::Sender<Inbound>,
    frames_rx: mpsc::Receiver<Inbound>,
    cancel_token: CancellationToken,
    max_participants: usize,
    connections: HashMap<ParticipantId, Connection>,
    rooms: HashMap<String, Room>,
    /// Connections whose queue overflowed during the current frame.
    lagging: Vec<ParticipantId>,
    mailbox_closed: bool,
}

impl RelayActor {
    #[instrument(skip_all, name = "ls.relay", fields(address = %self.address))]
    async fn run(mut self) {
        info!(
            target: "ls.relay",
            max_participants = self.max_participants,
            "Relay started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "ls.relay", "Relay received cancellation signal");
                    break;
                }

                msg = self.receiver.recv(), if !self.mailbox_closed => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            debug!(target: "ls.relay", "Relay handles dropped");
                            self.mailbox_closed = true;
                            if self.connections.is_empty() {
                                break;
                            }
                        }
                    }
                }

                Some(inbound) = self.frames_rx.recv() => {
                    match inbound {
                        Inbound::Frame { from, text } => self.handle_frame(from, &text),
                        Inbound::Closed { from } => self.handle_closed(from),
                    }
                    self.evict_lagging();
                    if self.mailbox_closed && self.connections.is_empty() {
                        break;
                    }
                }
            }
        }

        // Dropping the outbound senders closes every client's inbound stream
        let connections = self.connections.len();
        self.connections.clear();
        self.rooms.clear();

        info!(target: "ls.relay", connections, "Relay stopped");
    }

    fn handle_message(&mut self, message: RelayMessage) {
        match message {
            RelayMessage::Open { respond_to } => {
                let link = self.open_connection();
                let _ = respond_to.send(link);
            }
            RelayMessage::RoomSize {
                session_code,
                respond_to,
            } => {
                let size = self.rooms.get(&session_code).map_or(0, |r| r.members.len());
                let _ = respond_to.send(size);
            }
        }
    }

    fn open_connection(&mut self) -> RelayLink {
        let id = ParticipantId::new();
        let (client_tx, mut pump_rx) = mpsc::channel::<String>(RELAY_CONNECTION_BUFFER);
        let (relay_tx, client_rx) = mpsc::channel::<String>(RELAY_CONNECTION_BUFFER);

        self.connections.insert(
            id,
            Connection {
                outbound: relay_tx,
                session_code: None,
                user_id: String::new(),
                display_name: String::new(),
            },
        );

        let frames_tx = self.frames_tx.clone();
        let cancel = self.cancel_token.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    frame = pump_rx.recv() => match frame {
                        Some(text) => {
                            if frames_tx.send(Inbound::Frame { from: id, text }).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    },
                }
            }
            let _ = frames_tx.send(Inbound::Closed { from: id }).await;
        });

        debug!(target: "ls.relay", participant_id = %id, "Connection opened");

        RelayLink {
            outbound: client_tx,
            inbound: client_rx,
        }
    }

    fn handle_frame(&mut self, from: ParticipantId, text: &str) {
        let message = match messages::decode::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(target: "ls.relay", participant_id = %from, error = %e, "Rejecting malformed frame");
                self.deliver(
                    from,
                    &RelayEvent::Error {
                        message: "malformed frame".to_string(),
                    },
                );
                return;
            }
        };

        match message {
            ClientMessage::JoinSession {
                session_code,
                host_id,
                identity,
            } => self.handle_join(from, session_code, host_id, identity),
            ClientMessage::Introduce { to, payload } => {
                if let Some(display_name) = self.route_check(from, to) {
                    self.deliver(
                        to,
                        &RelayEvent::ParticipantJoined {
                            participant_id: from,
                            display_name,
                            payload: Some(payload),
                        },
                    );
                }
            }
            ClientMessage::Signal { to, payload } => {
                if self.route_check(from, to).is_some() {
                    self.deliver(to, &RelayEvent::NegotiationPayload { from, payload });
                }
            }
            ClientMessage::EndSession {
                session_code,
                reason,
            } => self.handle_end(from, &session_code, reason),
        }
    }

    fn handle_join(
        &mut self,
        from: ParticipantId,
        session_code: String,
        host_id: String,
        identity: ParticipantIdentity,
    ) {
        let Some(connection) = self.connections.get(&from) else {
            return;
        };
        if connection.session_code.is_some() {
            warn!(target: "ls.relay", participant_id = %from, "Duplicate join ignored");
            self.deliver(
                from,
                &RelayEvent::Error {
                    message: "already joined".to_string(),
                },
            );
            return;
        }

        let members = self
            .rooms
            .get(&session_code)
            .map(|r| r.members.clone())
            .unwrap_or_default();
        if members.len() >= self.max_participants {
            info!(
                target: "ls.relay",
                participant_id = %from,
                session_code = %session_code,
                capacity = self.max_participants,
                "Room is full"
            );
            self.deliver(
                from,
                &RelayEvent::SessionFull {
                    capacity: self.max_participants,
                },
            );
            return;
        }

        let participants: Vec<PeerSummary> = members
            .iter()
            .filter_map(|id| {
                self.connections.get(id).map(|c| PeerSummary {
                    participant_id: *id,
                    display_name: c.display_name.clone(),
                })
            })
            .collect();

        self.deliver(from, &RelayEvent::Welcome { participant_id: from });
        self.deliver(from, &RelayEvent::RosterSnapshot { participants });

        if let Some(connection) = self.connections.get_mut(&from) {
            connection.session_code = Some(session_code.clone());
            connection.user_id = identity.user_id;
            connection.display_name = identity.display_name;
        }
        let room = self.rooms.entry(session_code.clone()).or_insert_with(|| Room {
            host_id,
            members: Vec::new(),
        });
        room.members.push(from);

        info!(
            target: "ls.relay",
            participant_id = %from,
            session_code = %session_code,
            members = room.members.len(),
            "Participant joined room"
        );
    }

    /// Both ends must share a room. Returns the sender's display name.
    fn route_check(&self, from: ParticipantId, to: ParticipantId) -> Option<String> {
        let sender = self.connections.get(&from)?;
        let target = self.connections.get(&to);

        match (&sender.session_code, target.and_then(|t| t.session_code.as_ref())) {
            (Some(a), Some(b)) if a == b => Some(sender.display_name.clone()),
            _ => {
                debug!(
                    target: "ls.relay",
                    from = %from,
                    to = %to,
                    "Dropping payload for participant outside the sender's room"
                );
                None
            }
        }
    }

    fn handle_end(&mut self, from: ParticipantId, session_code: &str, reason: String) {
        let Some(sender) = self.connections.get(&from) else {
            return;
        };
        if sender.session_code.as_deref() != Some(session_code) {
            warn!(target: "ls.relay", participant_id = %from, "End for a room the sender is not in");
            return;
        }
        let is_host = self
            .rooms
            .get(session_code)
            .is_some_and(|room| room.host_id == sender.user_id);
        if !is_host {
            warn!(
                target: "ls.relay",
                participant_id = %from,
                session_code = %session_code,
                "Refusing end from a participant who is not the host"
            );
            self.deliver(
                from,
                &RelayEvent::Error {
                    message: "only the host can end the session".to_string(),
                },
            );
            return;
        }

        let Some(Room { members, .. }) = self.rooms.remove(session_code) else {
            return;
        };

        let event = RelayEvent::SessionTerminated { reason };
        for id in &members {
            self.deliver(*id, &event);
            if let Some(connection) = self.connections.get_mut(id) {
                connection.session_code = None;
            }
        }

        info!(
            target: "ls.relay",
            session_code = %session_code,
            members = members.len(),
            "Room terminated"
        );
    }

    fn handle_closed(&mut self, from: ParticipantId) {
        debug!(target: "ls.relay", participant_id = %from, "Connection closed");
        self.remove_connection(from);
    }

    /// Close connections that could not keep up. Eviction can overflow
    /// further queues, so this repeats until nothing is lagging.
    fn evict_lagging(&mut self) {
        while let Some(id) = self.lagging.pop() {
            if self.connections.contains_key(&id) {
                warn!(target: "ls.relay", participant_id = %id, "Evicting lagging connection");
                metrics::record_relay_lagging_eviction();
                self.remove_connection(id);
            }
        }
    }

    /// Drop a connection and tell the rest of its room.
    fn remove_connection(&mut self, from: ParticipantId) {
        let Some(connection) = self.connections.remove(&from) else {
            return;
        };
        let Some(session_code) = connection.session_code else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&session_code) else {
            return;
        };
        room.members.retain(|id| *id != from);
        let remaining = room.members.clone();
        if remaining.is_empty() {
            self.rooms.remove(&session_code);
        }

        let event = RelayEvent::ParticipantLeft {
            participant_id: from,
        };
        for id in &remaining {
            self.deliver(*id, &event);
        }

        info!(
            target: "ls.relay",
            participant_id = %from,
            session_code = %session_code,
            members = remaining.len(),
            "Participant left room"
        );
    }

    fn deliver(&mut self, to: ParticipantId, event: &RelayEvent) {
        let Some(connection) = self.connections.get(&to) else {
            return;
        };
        let frame = match messages::encode(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(target: "ls.relay", error = %e, "Failed to encode relay event");
                return;
            }
        };

        match connection.outbound.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    target: "ls.relay",
                    participant_id = %to,
                    kind = event.kind().as_str(),
                    "Connection queue full"
                );
                self.lagging.push(to);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(target: "ls.relay", participant_id = %to, "Connection already gone");
            }
        }
    }
}
