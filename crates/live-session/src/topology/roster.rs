//! Roster - participant id to peer link, at most one link per id.

use super::link::PeerLink;
use common::types::ParticipantId;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("Link for {0} already exists")]
    DuplicateLink(ParticipantId),
}

/// Live peer links of one session.
#[derive(Debug, Default)]
pub struct Roster {
    links: HashMap<ParticipantId, PeerLink>,
}

impl Roster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a link.
    ///
    /// # Errors
    ///
    /// Returns `RosterError::DuplicateLink` if a link for the same remote
    /// already exists. The rejected link is dropped, which closes it.
    pub fn add_link(&mut self, link: PeerLink) -> Result<(), RosterError> {
        let remote = link.remote();
        if self.links.contains_key(&remote) {
            return Err(RosterError::DuplicateLink(remote));
        }
        self.links.insert(remote, link);
        Ok(())
    }

    /// Remove and return a link. The caller closes it.
    pub fn remove_link(&mut self, id: &ParticipantId) -> Option<PeerLink> {
        self.links.remove(id)
    }

    #[must_use]
    pub fn has(&self, id: &ParticipantId) -> bool {
        self.links.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &ParticipantId) -> Option<&PeerLink> {
        self.links.get(id)
    }

    pub fn get_mut(&mut self, id: &ParticipantId) -> Option<&mut PeerLink> {
        self.links.get_mut(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerLink> {
        self.links.values()
    }

    /// Remote ids in a stable order.
    #[must_use]
    pub fn ids(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.links.keys().copied().collect();
        ids.sort();
        ids
    }
}
