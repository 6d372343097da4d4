//! Connection registry: who is joined, under what name, from where.
//!
//! A connection appears here only between its `join` and its disconnect.
//! Entries keep registration order, which is also roster order.
//! Display names are not unique; lookups by name return the earliest match.

use std::fmt;

use crate::error::{Error, Result};
use crate::event::SYSTEM_SENDER;

/// Opaque identifier of one transport-level connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A joined connection's chat identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub display_name: String,
    pub origin_address: String,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<(ConnectionId, Participant)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, or replace in place if the connection already joined.
    pub fn register(&mut self, id: ConnectionId, display_name: impl Into<String>, origin_address: impl Into<String>) {
        let participant = Participant {
            display_name: display_name.into(),
            origin_address: origin_address.into(),
        };
        match self.entries.iter_mut().find(|(cid, _)| *cid == id) {
            Some(entry) => entry.1 = participant,
            None => self.entries.push((id, participant)),
        }
    }

    /// Remove a connection. Returns the participant if it had joined.
    pub fn deregister(&mut self, id: ConnectionId) -> Option<Participant> {
        let idx = self.entries.iter().position(|(cid, _)| *cid == id)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Participant> {
        self.entries.iter().find(|(cid, _)| *cid == id).map(|(_, p)| p)
    }

    /// First connection registered under `display_name`.
    pub fn find_by_name(&self, display_name: &str) -> Option<ConnectionId> {
        self.entries
            .iter()
            .find(|(_, p)| p.display_name == display_name)
            .map(|(id, _)| *id)
    }

    /// Display names in registration order.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().map(|(_, p)| p.display_name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Trim and check a requested display name.
pub fn validate_display_name(raw: &str, max_len: usize) -> Result<&str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::InvalidName("name cannot be empty".into()));
    }
    if name.chars().count() > max_len {
        return Err(Error::InvalidName(format!("name is longer than {max_len} characters")));
    }
    if name.eq_ignore_ascii_case(SYSTEM_SENDER) {
        return Err(Error::InvalidName(format!("'{name}' is reserved")));
    }
    Ok(name)
}
