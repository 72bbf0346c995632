//! `PeerTopologyManager` - the mesh coordinator.
//!
//! Owns the roster and reacts to relay membership events and transport
//! callbacks. Every handler checks the roster before creating a link, so any
//! interleaving of events leaves at most one link per remote participant.
//!
//! The manager never touches the relay or the presentation layer directly.
//! Outbound frames accumulate in an outbox and presentation events in an
//! event queue; the owning task drains both after each input.
//!
//! # Early payloads
//!
//! A `negotiation-payload` can arrive before the link it belongs to. Such
//! payloads are held per participant (bounded, oldest dropped) and replayed
//! once the link exists. They are discarded when the participant leaves,
//! when the session tears down, or once they are older than the negotiation
//! timeout. Payloads from departed participants are dropped outright for one
//! negotiation timeout after the departure.

use super::link::PeerLink;
use super::roster::Roster;
use super::transport::{
    NegotiationRole, PeerConnector, PeerRequest, RemoteStream, TransportEvent,
};
use crate::errors::SessionError;
use crate::media::LocalStream;
use crate::observability::metrics;
use crate::signaling::{ClientMessage, NegotiationPayload, PeerSummary};
use common::types::ParticipantId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tunables for the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyConfig {
    /// How long a link may stay negotiating.
    pub negotiation_timeout: Duration,
    /// Early payloads held per participant.
    pub max_pending_payloads: usize,
}

/// Why a link left the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The relay reported the participant gone.
    Left,
    /// The link did not connect in time.
    NegotiationTimeout,
    /// The transport reported a failure.
    TransportFailed,
    /// The local session ended.
    SessionClosed,
}

impl RemovalReason {
    /// Returns the reason as a metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::Left => "left",
            RemovalReason::NegotiationTimeout => "negotiation_timeout",
            RemovalReason::TransportFailed => "transport_failed",
            RemovalReason::SessionClosed => "session_closed",
        }
    }
}

/// Topology changes for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A link was created.
    PeerAdded {
        participant_id: ParticipantId,
        display_name: String,
        role: NegotiationRole,
    },

    /// Remote media is available; presentation adds a tile.
    RemoteStreamAvailable {
        participant_id: ParticipantId,
        stream: RemoteStream,
    },

    /// A link was closed and removed; presentation drops the tile.
    PeerRemoved {
        participant_id: ParticipantId,
        reason: RemovalReason,
    },

    /// A link could not be built.
    ConnectFailed {
        participant_id: ParticipantId,
        reason: String,
    },
}

/// Early payloads for one participant.
#[derive(Debug)]
struct PendingPayloads {
    since: Instant,
    payloads: VecDeque<NegotiationPayload>,
}

/// Mesh coordinator for one session.
pub struct PeerTopologyManager {
    local_id: Option<ParticipantId>,
    local_stream: LocalStream,
    connector: Arc<dyn PeerConnector>,
    transport_events: mpsc::UnboundedSender<TransportEvent>,
    config: TopologyConfig,
    roster: Roster,
    pending: HashMap<ParticipantId, PendingPayloads>,
    /// Departure time of participants who left, pruned by `expire_stalled`.
    departed: HashMap<ParticipantId, Instant>,
    outbox: Vec<ClientMessage>,
    events: Vec<PeerEvent>,
}

impl PeerTopologyManager {
    /// Create a manager attaching `local_stream` to every link.
    ///
    /// Transports report through `transport_events`; the owner feeds those
    /// back through [`Self::on_transport_event`].
    #[must_use]
    pub fn new(
        local_stream: LocalStream,
        connector: Arc<dyn PeerConnector>,
        transport_events: mpsc::UnboundedSender<TransportEvent>,
        config: TopologyConfig,
    ) -> Self {
        Self {
            local_id: None,
            local_stream,
            connector,
            transport_events,
            config,
            roster: Roster::new(),
            pending: HashMap::new(),
            departed: HashMap::new(),
            outbox: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Set the relay-assigned local id so self-references are ignored.
    pub fn set_local_id(&mut self, id: ParticipantId) {
        self.local_id = Some(id);
    }

    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Payloads currently held for `id`.
    #[must_use]
    pub fn pending_for(&self, id: &ParticipantId) -> usize {
        self.pending.get(id).map_or(0, |p| p.payloads.len())
    }

    fn is_self(&self, id: &ParticipantId) -> bool {
        self.local_id.as_ref() == Some(id)
    }

    /// Create initiator links to everyone already present.
    ///
    /// Existing ids are skipped. A failure for one entry is reported and the
    /// rest of the snapshot is still processed.
    pub fn on_roster_snapshot(&mut self, participants: Vec<PeerSummary>) {
        info!(
            target: "ls.topology",
            participants = participants.len(),
            "Processing roster snapshot"
        );

        for peer in participants {
            if self.is_self(&peer.participant_id) {
                continue;
            }
            if self.roster.has(&peer.participant_id) {
                debug!(
                    target: "ls.topology",
                    participant_id = %peer.participant_id,
                    "Link already exists, skipping"
                );
                continue;
            }
            self.departed.remove(&peer.participant_id);

            if let Err(e) = self.create_link(
                peer.participant_id,
                peer.display_name,
                NegotiationRole::Initiator,
            ) {
                self.report_connect_failure(peer.participant_id, &e);
                continue;
            }
            self.replay_pending(peer.participant_id);
        }
    }

    /// Create a responder link for a newcomer and answer its payload.
    pub fn on_participant_joined(
        &mut self,
        participant_id: ParticipantId,
        display_name: String,
        payload: Option<NegotiationPayload>,
    ) {
        if self.is_self(&participant_id) {
            return;
        }
        if self.roster.has(&participant_id) {
            debug!(
                target: "ls.topology",
                participant_id = %participant_id,
                "Link already exists, ignoring join announcement"
            );
            if payload.is_some() {
                metrics::record_payload_dropped("duplicate_join");
            }
            return;
        }
        self.departed.remove(&participant_id);

        if let Err(e) = self.create_link(participant_id, display_name, NegotiationRole::Responder)
        {
            self.report_connect_failure(participant_id, &e);
            self.discard_pending(participant_id, "construction_failed");
            return;
        }

        if let Some(payload) = payload {
            self.feed(participant_id, payload);
        }
        self.replay_pending(participant_id);
    }

    /// Feed a payload to its link, or hold it until the link exists.
    pub fn on_negotiation_payload(&mut self, from: ParticipantId, payload: NegotiationPayload) {
        if self.departed.contains_key(&from) {
            debug!(
                target: "ls.topology",
                participant_id = %from,
                "Dropping payload from departed participant"
            );
            metrics::record_payload_dropped("departed");
            return;
        }

        match self.roster.get(&from).map(PeerLink::is_closed) {
            Some(true) => {
                debug!(target: "ls.topology", participant_id = %from, "Dropping payload for closed link");
                metrics::record_payload_dropped("closed_link");
            }
            Some(false) => self.feed(from, payload),
            None => self.buffer(from, payload),
        }
    }

    /// Close and remove the link for a departed participant.
    ///
    /// Unknown ids are a no-op.
    pub fn on_participant_left(&mut self, participant_id: ParticipantId) {
        self.departed.insert(participant_id, Instant::now());
        self.discard_pending(participant_id, "departed");

        if self.remove(participant_id, RemovalReason::Left) {
            info!(target: "ls.topology", participant_id = %participant_id, "Peer left");
        } else {
            debug!(
                target: "ls.topology",
                participant_id = %participant_id,
                "Leave for unknown participant ignored"
            );
        }
    }

    /// React to a transport callback.
    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Signal { remote, payload } => match self.roster.get_mut(&remote) {
                Some(link) if !link.is_closed() => {
                    let message = link.outbound(payload);
                    self.outbox.push(message);
                }
                _ => {
                    debug!(
                        target: "ls.topology",
                        participant_id = %remote,
                        "Dropping local payload for removed link"
                    );
                    metrics::record_payload_dropped("closed_link");
                }
            },

            TransportEvent::RemoteStream { remote, stream } => {
                let Some(link) = self.roster.get_mut(&remote) else {
                    return;
                };
                if link.mark_connected(stream.clone()) {
                    info!(
                        target: "ls.topology",
                        participant_id = %remote,
                        role = link.role().as_str(),
                        "Peer connected"
                    );
                    self.events.push(PeerEvent::RemoteStreamAvailable {
                        participant_id: remote,
                        stream,
                    });
                }
            }

            TransportEvent::Failed { remote, reason } => {
                if self.roster.has(&remote) {
                    warn!(
                        target: "ls.topology",
                        participant_id = %remote,
                        reason = %reason,
                        "Peer transport failed"
                    );
                    metrics::record_negotiation_failure("transport");
                    self.remove(remote, RemovalReason::TransportFailed);
                }
            }
        }
    }

    /// Close links that stayed negotiating past the timeout and discard
    /// stale early payloads.
    pub fn expire_stalled(&mut self, now: Instant) {
        let timeout = self.config.negotiation_timeout;

        let stalled: Vec<ParticipantId> = self
            .roster
            .iter()
            .filter(|link| {
                link.is_negotiating() && now.saturating_duration_since(link.created_at()) >= timeout
            })
            .map(PeerLink::remote)
            .collect();

        for id in stalled {
            warn!(
                target: "ls.topology",
                participant_id = %id,
                timeout_secs = timeout.as_secs(),
                "Negotiation timed out"
            );
            metrics::record_negotiation_failure("timeout");
            self.remove(id, RemovalReason::NegotiationTimeout);
        }

        let stale: Vec<ParticipantId> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.since) >= timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            self.discard_pending(id, "expired");
        }

        self.departed
            .retain(|_, left_at| now.saturating_duration_since(*left_at) < timeout);
    }

    /// Close every link and forget all buffered state.
    pub fn close_all(&mut self) {
        let count = self.roster.len();
        for id in self.roster.ids() {
            self.remove(id, RemovalReason::SessionClosed);
        }
        let pending: Vec<ParticipantId> = self.pending.keys().copied().collect();
        for id in pending {
            self.discard_pending(id, "session_closed");
        }
        self.outbox.clear();
        self.departed.clear();

        if count > 0 {
            info!(target: "ls.topology", links = count, "All peer links closed");
        }
    }

    /// Take the frames to send to the relay, in production order.
    pub fn drain_outbound(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Take the events for the presentation layer, in production order.
    pub fn drain_events(&mut self) -> Vec<PeerEvent> {
        std::mem::take(&mut self.events)
    }

    fn create_link(
        &mut self,
        remote: ParticipantId,
        display_name: String,
        role: NegotiationRole,
    ) -> Result<(), SessionError> {
        let request = PeerRequest {
            remote,
            role,
            local_stream: self.local_stream.clone(),
            events: self.transport_events.clone(),
        };

        let transport =
            self.connector
                .connect(request)
                .map_err(|e| SessionError::NegotiationFailure {
                    participant_id: remote,
                    reason: e.to_string(),
                })?;

        let link = PeerLink::new(remote, display_name.clone(), role, transport);
        self.roster
            .add_link(link)
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        metrics::record_link_created(role.as_str());
        metrics::set_links_active(self.roster.len());
        debug!(
            target: "ls.topology",
            participant_id = %remote,
            role = role.as_str(),
            "Peer link created"
        );

        self.events.push(PeerEvent::PeerAdded {
            participant_id: remote,
            display_name,
            role,
        });
        Ok(())
    }

    fn feed(&mut self, remote: ParticipantId, payload: NegotiationPayload) {
        let Some(link) = self.roster.get_mut(&remote) else {
            return;
        };
        if let Err(e) = link.feed(payload) {
            warn!(
                target: "ls.topology",
                participant_id = %remote,
                error = %e,
                "Negotiation payload rejected"
            );
            metrics::record_negotiation_failure(e.label());
            self.remove(remote, RemovalReason::TransportFailed);
        }
    }

    fn buffer(&mut self, from: ParticipantId, payload: NegotiationPayload) {
        let max = self.config.max_pending_payloads;
        let entry = self.pending.entry(from).or_insert_with(|| PendingPayloads {
            since: Instant::now(),
            payloads: VecDeque::new(),
        });

        if entry.payloads.len() >= max {
            entry.payloads.pop_front();
            metrics::record_payload_dropped("buffer_full");
        }
        entry.payloads.push_back(payload);
        metrics::record_payload_buffered();

        debug!(
            target: "ls.topology",
            participant_id = %from,
            buffered = entry.payloads.len(),
            "Buffered payload for unknown participant"
        );
    }

    fn replay_pending(&mut self, remote: ParticipantId) {
        let Some(pending) = self.pending.remove(&remote) else {
            return;
        };
        debug!(
            target: "ls.topology",
            participant_id = %remote,
            payloads = pending.payloads.len(),
            "Replaying buffered payloads"
        );
        for payload in pending.payloads {
            if !self.roster.has(&remote) {
                metrics::record_payload_dropped("closed_link");
                continue;
            }
            self.feed(remote, payload);
        }
    }

    fn discard_pending(&mut self, id: ParticipantId, reason: &'static str) {
        if let Some(pending) = self.pending.remove(&id) {
            for _ in &pending.payloads {
                metrics::record_payload_dropped(reason);
            }
            debug!(
                target: "ls.topology",
                participant_id = %id,
                payloads = pending.payloads.len(),
                reason,
                "Discarded buffered payloads"
            );
        }
    }

    fn report_connect_failure(&mut self, participant_id: ParticipantId, error: &SessionError) {
        warn!(
            target: "ls.topology",
            participant_id = %participant_id,
            error = %error,
            "Peer link construction failed"
        );
        metrics::record_negotiation_failure("construction");
        let reason = match error {
            SessionError::NegotiationFailure { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        self.events.push(PeerEvent::ConnectFailed {
            participant_id,
            reason,
        });
    }

    /// Close and remove a link. Returns `false` if there was none.
    fn remove(&mut self, id: ParticipantId, reason: RemovalReason) -> bool {
        let Some(mut link) = self.roster.remove_link(&id) else {
            return false;
        };
        link.close();
        metrics::record_link_removed(reason.as_str());
        metrics::set_links_active(self.roster.len());
        self.events.push(PeerEvent::PeerRemoved {
            participant_id: id,
            reason,
        });
        true
    }
}
