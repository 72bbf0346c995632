//! Simulated peer transports.
//!
//! Performs a minimal offer/answer exchange:
//!
//! - an initiator emits an `offer` as soon as it is built;
//! - any transport fed an `offer` emits an `answer` and reports remote media;
//! - any transport fed an `answer` reports remote media;
//! - `candidate` payloads are accepted silently.
//!
//! Anything else is rejected as a negotiation error.

use crate::signaling::NegotiationPayload;
use crate::topology::{
    NegotiationRole, PeerConnector, PeerRequest, PeerTransport, RemoteStream, TransportError,
    TransportEvent,
};
use common::types::{ParticipantId, StreamId};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct PeerCounters {
    created: AtomicUsize,
    closed: AtomicUsize,
}

/// Connector producing [`SimulatedTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPeerConnector {
    counters: Arc<PeerCounters>,
    fail_for: Arc<Mutex<HashSet<ParticipantId>>>,
    stall: bool,
    trickle: bool,
}

impl SimulatedPeerConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to build transports towards `ids`.
    #[must_use]
    pub fn failing_for(self, ids: impl IntoIterator<Item = ParticipantId>) -> Self {
        self.fail_for
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ids);
        self
    }

    /// Never report remote media, so negotiation never completes.
    #[must_use]
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Follow every offer and answer with a candidate.
    #[must_use]
    pub fn trickle(mut self) -> Self {
        self.trickle = true;
        self
    }

    /// Refuse transports towards `id` from now on.
    pub fn refuse(&self, id: ParticipantId) {
        self.fail_for
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    #[must_use]
    pub fn links_created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn links_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Transports built and not yet closed.
    #[must_use]
    pub fn live_links(&self) -> usize {
        self.links_created().saturating_sub(self.links_closed())
    }
}

impl PeerConnector for SimulatedPeerConnector {
    fn connect(&self, request: PeerRequest) -> Result<Box<dyn PeerTransport>, TransportError> {
        let refused = self
            .fail_for
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&request.remote);
        if refused {
            return Err(TransportError::Construction(format!(
                "simulated failure towards {}",
                request.remote
            )));
        }

        self.counters.created.fetch_add(1, Ordering::SeqCst);

        let transport = SimulatedTransport {
            remote: request.remote,
            local_stream: request.local_stream.id(),
            events: request.events,
            counters: Arc::clone(&self.counters),
            stall: self.stall,
            trickle: self.trickle,
            closed: false,
        };

        if request.role == NegotiationRole::Initiator {
            transport.emit_signal("offer");
        }

        Ok(Box::new(transport))
    }
}

/// One simulated transport.
#[derive(Debug)]
pub struct SimulatedTransport {
    remote: ParticipantId,
    local_stream: StreamId,
    events: mpsc::UnboundedSender<TransportEvent>,
    counters: Arc<PeerCounters>,
    stall: bool,
    trickle: bool,
    closed: bool,
}

impl SimulatedTransport {
    fn emit_signal(&self, kind: &str) {
        let payload = NegotiationPayload::new(json!({
            "type": kind,
            "sdp": format!("v=0 stream={}", self.local_stream),
        }));
        // The owner may already be gone during teardown
        let _ = self.events.send(TransportEvent::Signal {
            remote: self.remote,
            payload,
        });
        if self.trickle && kind != "candidate" {
            let _ = self.events.send(TransportEvent::Signal {
                remote: self.remote,
                payload: NegotiationPayload::new(json!({"type": "candidate"})),
            });
        }
    }

    fn emit_remote_stream(&self) {
        if self.stall {
            return;
        }
        let _ = self.events.send(TransportEvent::RemoteStream {
            remote: self.remote,
            stream: RemoteStream {
                id: StreamId::new(),
                participant_id: self.remote,
            },
        });
    }
}

impl PeerTransport for SimulatedTransport {
    fn signal(&mut self, payload: NegotiationPayload) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        match payload.payload_type() {
            Some("offer") => {
                self.emit_signal("answer");
                self.emit_remote_stream();
                Ok(())
            }
            Some("answer") => {
                self.emit_remote_stream();
                Ok(())
            }
            Some("candidate") => Ok(()),
            other => Err(TransportError::Negotiation(format!(
                "unexpected payload type {other:?}"
            ))),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
