//! Persistence backends for routing configuration.
//!
//! The engine itself never performs I/O. Callers hand a [`Snapshot`] to a
//! [`PersistencePort`] and decide how to retry (see [`crate::session`]).

pub mod http;
pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::ChannelEntry;
use crate::error::PersistError;
use crate::rules::RuleSetEntry;
use crate::webhook::WebhookEntry;

pub use http::HttpPersistence;
pub use memory::MemoryPersistence;

/// Serializable routing configuration for a set of nodes.
///
/// `scope` lists every node the snapshot speaks for. A node in scope with no
/// entries is at its defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
    #[serde(default)]
    pub webhooks: Vec<WebhookEntry>,
    #[serde(default)]
    pub rules: Vec<RuleSetEntry>,
}

impl Snapshot {
    /// Overwrite everything `other` is scoped to with `other`'s entries.
    pub fn merge(&mut self, other: Snapshot) {
        let replaced: HashSet<&str> = other.scope.iter().map(String::as_str).collect();

        self.channels
            .retain(|e| !replaced.contains(e.node_key.as_str()));
        self.webhooks
            .retain(|e| !replaced.contains(e.node_key.as_str()));
        self.rules.retain(|e| !replaced.contains(e.node_key.as_str()));

        for key in &other.scope {
            if !self.scope.contains(key) {
                self.scope.push(key.clone());
            }
        }

        self.channels.extend(other.channels);
        self.webhooks.extend(other.webhooks);
        self.rules.extend(other.rules);
        self.saved_at = other.saved_at.or(self.saved_at);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.webhooks.is_empty() && self.rules.is_empty()
    }
}

/// Backend that stores routing configuration.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    /// Get the name of this backend.
    fn name(&self) -> &'static str;

    /// Persist the subtree snapshot of `node_key`.
    async fn save(&self, node_key: &str, snapshot: &Snapshot) -> Result<(), PersistError>;

    /// Load the full stored configuration.
    async fn load(&self) -> Result<Snapshot, PersistError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;

    fn entry(key: &str, channel: ChannelKind, enabled: bool) -> ChannelEntry {
        ChannelEntry {
            node_key: key.to_string(),
            channel,
            enabled,
        }
    }

    #[test]
    fn test_merge_replaces_scoped_nodes_only() {
        let mut stored = Snapshot {
            scope: vec!["a".to_string(), "b".to_string()],
            channels: vec![
                entry("a", ChannelKind::Robot, true),
                entry("b", ChannelKind::Robot, true),
            ],
            ..Snapshot::default()
        };

        let update = Snapshot {
            saved_at: Some(Utc::now()),
            scope: vec!["b".to_string(), "c".to_string()],
            channels: vec![entry("c", ChannelKind::SmallPackage, true)],
            ..Snapshot::default()
        };

        stored.merge(update);

        assert_eq!(stored.scope, vec!["a", "b", "c"]);
        assert_eq!(
            stored.channels,
            vec![
                entry("a", ChannelKind::Robot, true),
                entry("c", ChannelKind::SmallPackage, true),
            ]
        );
        assert!(stored.saved_at.is_some());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = Snapshot {
            scope: vec!["n".to_string()],
            channels: vec![entry("n", ChannelKind::Person("p1".to_string()), false)],
            ..Snapshot::default()
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["channels"][0]["channel"]["person"], "p1");
        assert_eq!(json["channels"][0]["enabled"], false);
        assert!(json.get("saved_at").is_none());

        let parsed: Snapshot = serde_json::from_str(r#"{"scope": ["n"]}"#).unwrap();
        assert!(parsed.is_empty());
    }
}
