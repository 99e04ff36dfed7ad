//! People and webhook directories mirrored from their management modules.

use serde::{Deserialize, Serialize};

/// Identifier of a webhook in the webhook directory.
pub type WebhookId = String;

/// An entry of the people directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    /// Handle used by the messaging platform to ping this person
    pub contact_id: String,
}

/// An entry of the webhook (chat-bot) directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub name: String,
    pub endpoint: String,
}

/// Anything stored in a [`Directory`].
pub trait DirectoryEntry {
    fn id(&self) -> &str;
}

impl DirectoryEntry for Person {
    fn id(&self) -> &str {
        &self.id
    }
}

impl DirectoryEntry for Webhook {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Ordered list of entries keyed by id.
#[derive(Debug, Clone)]
pub struct Directory<T> {
    entries: Vec<T>,
}

impl<T> Default for Directory<T> {
    fn default() -> Self {
        Self { entries: vec![] }
    }
}

impl<T: DirectoryEntry> Directory<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. Returns `true` if the id was new.
    pub fn upsert(&mut self, entry: T) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.id() == entry.id()) {
            *existing = entry;
            false
        } else {
            self.entries.push(entry);
            true
        }
    }

    /// Remove an entry by id.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let position = self.entries.iter().position(|e| e.id() == id)?;
        Some(self.entries.remove(position))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// The only entry, when there is exactly one.
    #[must_use]
    pub fn single(&self) -> Option<&T> {
        match self.entries.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(DirectoryEntry::id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: DirectoryEntry> FromIterator<T> for Directory<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut directory = Self::new();
        for entry in iter {
            directory.upsert(entry);
        }
        directory
    }
}
