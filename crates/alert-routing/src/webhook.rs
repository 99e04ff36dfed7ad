//! Per-node webhook target assignment.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::directory::WebhookId;

/// One node's assignment, as carried by snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEntry {
    pub node_key: String,
    pub webhook_ids: Vec<WebhookId>,
}

/// Which webhooks the robot channel of each node delivers to.
///
/// An absent or empty set means "no robot trigger".
#[derive(Debug, Clone, Default)]
pub struct WebhookRouter {
    assignments: HashMap<String, BTreeSet<WebhookId>>,
}

impl WebhookRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current assignment of `node_key`.
    #[must_use]
    pub fn assigned(&self, node_key: &str) -> Vec<WebhookId> {
        self.assignments
            .get(node_key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_unassigned(&self, node_key: &str) -> bool {
        self.assignments
            .get(node_key)
            .map_or(true, BTreeSet::is_empty)
    }

    /// Replace the assignment of every key in `node_keys` with `ids`.
    pub fn replace<'a, I>(&mut self, node_keys: I, ids: &BTreeSet<WebhookId>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for key in node_keys {
            if ids.is_empty() {
                self.assignments.remove(key);
            } else {
                self.assignments.insert(key.to_string(), ids.clone());
            }
        }
    }

    /// Remove `webhook_id` from every assignment. Returns the affected keys,
    /// sorted.
    pub fn prune(&mut self, webhook_id: &str) -> Vec<String> {
        let mut affected = Vec::new();
        for (key, ids) in &mut self.assignments {
            if ids.remove(webhook_id) {
                affected.push(key.clone());
            }
        }
        self.assignments.retain(|_, ids| !ids.is_empty());
        affected.sort();
        affected
    }

    /// Whether any node still targets `webhook_id`.
    #[must_use]
    pub fn references(&self, webhook_id: &str) -> bool {
        self.assignments.values().any(|ids| ids.contains(webhook_id))
    }

    /// Assignments for the given nodes in the order given.
    #[must_use]
    pub fn entries_for<'a, I>(&self, node_keys: I) -> Vec<WebhookEntry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        node_keys
            .into_iter()
            .filter_map(|key| {
                self.assignments.get(key).map(|ids| WebhookEntry {
                    node_key: key.to_string(),
                    webhook_ids: ids.iter().cloned().collect(),
                })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.assignments.clear();
    }
}

/// `true` when robot delivery is on somewhere below a node that has no target
/// of its own and the operator has to pick one of several webhooks.
#[must_use]
pub fn needs_configuration(
    robot_off_everywhere: bool,
    unassigned: bool,
    webhook_count: usize,
) -> bool {
    !robot_off_everywhere && unassigned && webhook_count > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<WebhookId> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_replace_is_not_a_merge() {
        let mut router = WebhookRouter::new();
        router.replace(["a", "b"], &ids(&["w1", "w2"]));
        router.replace(["a"], &ids(&["w3"]));

        assert_eq!(router.assigned("a"), vec!["w3"]);
        assert_eq!(router.assigned("b"), vec!["w1", "w2"]);
    }

    #[test]
    fn test_empty_replace_clears() {
        let mut router = WebhookRouter::new();
        router.replace(["a"], &ids(&["w1"]));
        router.replace(["a"], &BTreeSet::new());
        assert!(router.is_unassigned("a"));
        assert!(router.entries_for(["a"]).is_empty());
    }

    #[test]
    fn test_prune() {
        let mut router = WebhookRouter::new();
        router.replace(["a", "b"], &ids(&["w1"]));
        router.replace(["c"], &ids(&["w1", "w2"]));

        assert_eq!(router.prune("w1"), vec!["a", "b", "c"]);
        assert!(!router.references("w1"));
        assert!(router.is_unassigned("a"));
        assert_eq!(router.assigned("c"), vec!["w2"]);
    }

    #[test]
    fn test_needs_configuration_rule() {
        assert!(needs_configuration(false, true, 2));
        assert!(!needs_configuration(true, true, 2));
        assert!(!needs_configuration(false, false, 2));
        assert!(!needs_configuration(false, true, 1));
        assert!(!needs_configuration(false, true, 0));
    }
}
