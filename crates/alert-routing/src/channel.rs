//! Notification channels and their per-node toggle state.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a person in the people directory.
pub type PersonId = String;

/// A notification channel that can be toggled on an alert node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Group chat-bot webhook
    Robot,
    /// "Small package" push
    SmallPackage,
    /// Direct ping to one person
    Person(PersonId),
}

impl ChannelKind {
    /// Value of the channel before anything is stored for it.
    ///
    /// Persons are opt-out, the gate channels opt-in.
    #[must_use]
    pub const fn default_enabled(&self) -> bool {
        matches!(self, Self::Person(_))
    }

    /// Whether this channel gates person notifications.
    #[must_use]
    pub const fn is_gate(&self) -> bool {
        matches!(self, Self::Robot | Self::SmallPackage)
    }

    /// Person id for person channels.
    #[must_use]
    pub fn person_id(&self) -> Option<&str> {
        match self {
            Self::Person(id) => Some(id),
            Self::Robot | Self::SmallPackage => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Robot => f.write_str("robot"),
            Self::SmallPackage => f.write_str("small_package"),
            Self::Person(id) => write!(f, "person:{id}"),
        }
    }
}

/// Summary of a boolean across a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    True,
    False,
    Indeterminate,
}

impl TriState {
    /// Fold a sequence of booleans. An empty sequence is `False`.
    pub fn aggregate<I>(values: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let mut any_true = false;
        let mut any_false = false;

        for value in values {
            if value {
                any_true = true;
            } else {
                any_false = true;
            }
            if any_true && any_false {
                return Self::Indeterminate;
            }
        }

        if any_true {
            Self::True
        } else {
            Self::False
        }
    }

    #[must_use]
    pub const fn is_true(self) -> bool {
        matches!(self, Self::True)
    }

    #[must_use]
    pub const fn is_false(self) -> bool {
        matches!(self, Self::False)
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// One stored toggle, as carried by snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub node_key: String,
    pub channel: ChannelKind,
    pub enabled: bool,
}

/// Explicit per-(node, channel) overrides.
///
/// Anything not stored resolves to [`ChannelKind::default_enabled`]. The
/// store knows nothing about the tree; cascading lives in the engine.
#[derive(Debug, Clone, Default)]
pub struct ChannelStateStore {
    entries: HashMap<(String, ChannelKind), bool>,
}

impl ChannelStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved value of `channel` at `node_key`.
    #[must_use]
    pub fn get(&self, node_key: &str, channel: &ChannelKind) -> bool {
        self.stored(node_key, channel)
            .unwrap_or_else(|| channel.default_enabled())
    }

    /// Stored override, if any.
    #[must_use]
    pub fn stored(&self, node_key: &str, channel: &ChannelKind) -> Option<bool> {
        // Tuple keys can't be borrowed as (&str, &ChannelKind), so build one.
        self.entries
            .get(&(node_key.to_string(), channel.clone()))
            .copied()
    }

    pub fn set(&mut self, node_key: &str, channel: ChannelKind, enabled: bool) {
        self.entries.insert((node_key.to_string(), channel), enabled);
    }

    /// Store `enabled` for `channel` only where nothing is stored yet.
    pub fn set_if_absent(&mut self, node_key: &str, channel: ChannelKind, enabled: bool) {
        self.entries
            .entry((node_key.to_string(), channel))
            .or_insert(enabled);
    }

    /// Person ids with a stored entry at `node_key`.
    #[must_use]
    pub fn persons_at(&self, node_key: &str) -> Vec<PersonId> {
        let mut persons: Vec<PersonId> = self
            .entries
            .keys()
            .filter(|(key, _)| key == node_key)
            .filter_map(|(_, channel)| channel.person_id().map(str::to_string))
            .collect();
        persons.sort();
        persons
    }

    /// Drop every entry for `person_id`. Returns the keys that had one, sorted.
    pub fn remove_person(&mut self, person_id: &str) -> Vec<String> {
        let mut affected = Vec::new();
        self.entries.retain(|(key, channel), _| {
            let matches = channel.person_id() == Some(person_id);
            if matches {
                affected.push(key.clone());
            }
            !matches
        });
        affected.sort();
        affected.dedup();
        affected
    }

    /// Whether any entry references `person_id`.
    #[must_use]
    pub fn references_person(&self, person_id: &str) -> bool {
        self.entries
            .keys()
            .any(|(_, channel)| channel.person_id() == Some(person_id))
    }

    /// Entries for the given nodes, sorted by node then channel.
    #[must_use]
    pub fn entries_for<'a, I>(&self, node_keys: I) -> Vec<ChannelEntry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: std::collections::HashSet<&str> = node_keys.into_iter().collect();
        let mut entries: Vec<ChannelEntry> = self
            .entries
            .iter()
            .filter(|((key, _), _)| wanted.contains(key.as_str()))
            .map(|((key, channel), enabled)| ChannelEntry {
                node_key: key.clone(),
                channel: channel.clone(),
                enabled: *enabled,
            })
            .collect();
        entries.sort_by(|a, b| (&a.node_key, &a.channel).cmp(&(&b.node_key, &b.channel)));
        entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
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
