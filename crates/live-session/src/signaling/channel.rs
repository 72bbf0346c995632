//! Client side of a relay connection.
//!
//! A [`RelayConnector`] produces a [`RelayLink`], a pair of text-frame
//! channels. [`SignalingChannel`] layers the typed vocabulary on top:
//! outbound [`ClientMessage`]s are encoded, inbound frames are decoded into an
//! ordered [`RelayEvent`] stream. Malformed frames are logged and skipped.

use super::messages::{self, ClientMessage, ParticipantIdentity, RelayEvent};
use crate::errors::SessionError;
use async_trait::async_trait;
use common::types::ParticipantId;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Raw frame channels of one relay connection.
#[derive(Debug)]
pub struct RelayLink {
    /// Frames towards the relay.
    pub outbound: mpsc::Sender<String>,
    /// Frames from the relay. Closes when the relay drops the connection.
    pub inbound: mpsc::Receiver<String>,
}

/// Opens connections to a relay address.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Open a connection.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RelayUnreachable` when the address cannot be
    /// reached.
    async fn open(&self, address: &str) -> Result<RelayLink, SessionError>;
}

/// Typed signaling channel.
#[derive(Debug)]
pub struct SignalingChannel {
    outbound: Option<mpsc::Sender<String>>,
    inbound: mpsc::Receiver<String>,
    local_id: Option<ParticipantId>,
}

impl SignalingChannel {
    /// Connect to the relay at `address`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RelayUnreachable` if the connector fails or the
    /// deadline passes.
    #[instrument(skip_all, name = "ls.signaling.connect", fields(address = %address))]
    pub async fn connect(
        connector: &dyn RelayConnector,
        address: &str,
        timeout: Duration,
    ) -> Result<Self, SessionError> {
        let link = match tokio::time::timeout(timeout, connector.open(address)).await {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                warn!(target: "ls.signaling", error = %e, "Relay connect failed");
                return Err(e);
            }
            Err(_) => {
                warn!(
                    target: "ls.signaling",
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Relay connect timed out"
                );
                return Err(SessionError::RelayUnreachable(format!(
                    "connect to {address} timed out"
                )));
            }
        };

        info!(target: "ls.signaling", "Relay connected");

        Ok(Self {
            outbound: Some(link.outbound),
            inbound: link.inbound,
            local_id: None,
        })
    }

    /// Identifier the relay assigned, once `welcome` has been received.
    #[must_use]
    pub fn local_id(&self) -> Option<ParticipantId> {
        self.local_id
    }

    /// Whether the channel can still send.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Announce presence in `session_code`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Signaling` if the channel is closed.
    pub async fn announce_join(
        &self,
        session_code: &str,
        host_id: &str,
        identity: ParticipantIdentity,
    ) -> Result<(), SessionError> {
        self.send(&ClientMessage::JoinSession {
            session_code: session_code.to_string(),
            host_id: host_id.to_string(),
            identity,
        })
        .await
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Signaling` if the channel was disconnected or
    /// the relay dropped the connection.
    pub async fn send(&self, message: &ClientMessage) -> Result<(), SessionError> {
        let Some(outbound) = &self.outbound else {
            return Err(SessionError::Signaling("channel disconnected".to_string()));
        };

        let frame = messages::encode(message)?;
        outbound
            .send(frame)
            .await
            .map_err(|_| SessionError::Signaling("relay connection closed".to_string()))?;

        debug!(target: "ls.signaling", kind = message.kind(), "Frame sent");
        Ok(())
    }

    /// Next inbound event, or `None` once the relay connection is gone.
    ///
    /// Cancel-safe: the only await point is the channel receive.
    pub async fn next_event(&mut self) -> Option<RelayEvent> {
        loop {
            let frame = self.inbound.recv().await?;
            match messages::decode::<RelayEvent>(&frame) {
                Ok(event) => {
                    if let RelayEvent::Welcome { participant_id } = &event {
                        self.local_id = Some(*participant_id);
                    }
                    debug!(target: "ls.signaling", kind = event.kind().as_str(), "Frame received");
                    return Some(event);
                }
                Err(e) => {
                    warn!(target: "ls.signaling", error = %e, "Skipping malformed relay frame");
                }
            }
        }
    }

    /// Close both directions.
    ///
    /// Returns `false` if the channel was already disconnected.
    pub fn disconnect(&mut self) -> bool {
        let Some(outbound) = self.outbound.take() else {
            return false;
        };
        drop(outbound);
        self.inbound.close();

        info!(
            target: "ls.signaling",
            local_id = ?self.local_id,
            "Relay disconnected"
        );
        true
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
