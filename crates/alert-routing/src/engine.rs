//! The routing engine: cascading toggles over the alert tree.
//!
//! Every mutation goes through [`RoutingEngine`]. Toggles cascade from a node
//! to all of its descendants; parents never store state of their own and are
//! rendered from [`RoutingEngine::aggregate_tri`] over their leaves.
//!
//! Robot and SmallPackage are the gate channels. A person ping is only
//! effective at a leaf while at least one gate is on there, and turning both
//! gates off at a node forces every person toggle at that node off as well.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::channel::{ChannelKind, ChannelStateStore, PersonId, TriState};
use crate::directory::{Directory, Person, Webhook, WebhookId};
use crate::error::{RoutingError, RoutingResult};
use crate::persistence::Snapshot;
use crate::rules::{AlertRule, RuleBook, RuleDefaults, RuleUpdate};
use crate::tree::TreeIndex;
use crate::webhook::{self, WebhookRouter};

/// Routing configuration state for one editing session.
#[derive(Debug, Clone)]
pub struct RoutingEngine {
    index: Arc<TreeIndex>,
    channels: ChannelStateStore,
    router: WebhookRouter,
    rules: RuleBook,
    people: Directory<Person>,
    webhooks: Directory<Webhook>,
    dirty: BTreeSet<String>,
}

impl RoutingEngine {
    /// Create an engine with empty state over an index.
    #[must_use]
    pub fn new(index: Arc<TreeIndex>) -> Self {
        Self {
            index,
            channels: ChannelStateStore::new(),
            router: WebhookRouter::new(),
            rules: RuleBook::default(),
            people: Directory::new(),
            webhooks: Directory::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Create an engine over a freshly indexed catalog.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::new(Arc::new(TreeIndex::build(catalog)))
    }

    /// Use `defaults` when seeding rule sets.
    #[must_use]
    pub fn with_rule_defaults(mut self, defaults: RuleDefaults) -> Self {
        self.rules = RuleBook::new(defaults);
        self
    }

    #[must_use]
    pub fn index(&self) -> &TreeIndex {
        &self.index
    }

    // =========================================================================
    // Directories
    // =========================================================================

    #[must_use]
    pub fn people(&self) -> &Directory<Person> {
        &self.people
    }

    #[must_use]
    pub fn webhook_directory(&self) -> &Directory<Webhook> {
        &self.webhooks
    }

    /// Add or update a person. New persons get an explicit `true` toggle on
    /// every node.
    pub fn add_person(&mut self, person: Person) {
        let id = person.id.clone();
        if self.people.upsert(person) {
            for key in self.index.keys() {
                self.channels
                    .set_if_absent(key, ChannelKind::Person(id.clone()), true);
            }
            debug!(person = %id, "Person added to routing");
        }
    }

    /// Remove a person and every toggle that references them.
    pub fn remove_person(&mut self, person_id: &str) -> Option<Person> {
        let removed = self.people.remove(person_id);
        let affected = self.channels.remove_person(person_id);

        if removed.is_some() || !affected.is_empty() {
            info!(
                person = %person_id,
                nodes = affected.len(),
                "Pruned person from routing"
            );
        }
        self.dirty.extend(affected);
        removed
    }

    /// Add or update a webhook, then auto-assign it if it is the only one.
    pub fn add_webhook(&mut self, webhook: Webhook) {
        let id = webhook.id.clone();
        if self.webhooks.upsert(webhook) {
            debug!(webhook = %id, "Webhook added to routing");
            self.auto_assign_single_webhook();
        }
    }

    /// Remove a webhook, prune every assignment to it and return the nodes that
    /// need configuration afterwards.
    pub fn remove_webhook(&mut self, webhook_id: &str) -> Vec<String> {
        let removed = self.webhooks.remove(webhook_id).is_some();
        let affected = self.router.prune(webhook_id);

        if removed || !affected.is_empty() {
            info!(
                webhook = %webhook_id,
                nodes = affected.len(),
                "Pruned webhook from routing"
            );
        }
        self.dirty.extend(affected);
        self.auto_assign_single_webhook();

        self.nodes_needing_configuration()
    }

    // =========================================================================
    // Channel state and cascading
    // =========================================================================

    /// Resolved value of `channel` at `key`.
    pub fn channel(&self, key: &str, channel: &ChannelKind) -> RoutingResult<bool> {
        self.ensure_node(key)?;
        Ok(self.channels.get(key, channel))
    }

    /// Whether a gate channel is on at `key`.
    pub fn gate_open(&self, key: &str) -> RoutingResult<bool> {
        self.ensure_node(key)?;
        Ok(self.gate_open_unchecked(key))
    }

    /// Set `channel` at `key` and all of its descendants. Returns the affected
    /// keys in pre-order.
    ///
    /// Turning Robot on fails with [`RoutingError::NoWebhookAvailable`] when the
    /// webhook directory is empty; nothing is changed in that case.
    pub fn set_channel_cascade(
        &mut self,
        key: &str,
        channel: ChannelKind,
        value: bool,
    ) -> RoutingResult<Vec<String>> {
        if let ChannelKind::Person(person_id) = &channel {
            return self.set_person_cascade(key, person_id, value);
        }

        let affected = self.index.subtree_of(key)?;

        if value && channel == ChannelKind::Robot && self.webhooks.is_empty() {
            warn!(node = %key, "Refusing to enable robot notifications without webhooks");
            return Err(RoutingError::NoWebhookAvailable {
                key: key.to_string(),
            });
        }

        for node in &affected {
            self.channels.set(node, channel.clone(), value);
        }

        if !value {
            self.close_gates(&affected);
        } else if channel == ChannelKind::Robot {
            self.auto_assign_single_webhook();
        }

        debug!(
            node = %key,
            channel = %channel,
            value,
            affected = affected.len(),
            "Cascaded channel toggle"
        );

        self.dirty.extend(affected.iter().cloned());
        Ok(affected)
    }

    /// Set the toggle of one person at `key` and all of its descendants,
    /// regardless of gate state. The person must be in the people directory.
    pub fn set_person_cascade(
        &mut self,
        key: &str,
        person_id: &str,
        value: bool,
    ) -> RoutingResult<Vec<String>> {
        let affected = self.index.subtree_of(key)?;
        if !self.people.contains(person_id) {
            return Err(RoutingError::UnknownPerson {
                person_id: person_id.to_string(),
            });
        }
        let channel = ChannelKind::Person(person_id.to_string());

        for node in &affected {
            self.channels.set(node, channel.clone(), value);
        }

        debug!(
            node = %key,
            person = %person_id,
            value,
            affected = affected.len(),
            "Cascaded person toggle"
        );

        self.dirty.extend(affected.iter().cloned());
        Ok(affected)
    }

    /// Tri-state of the stored `channel` values over the leaves below `key`.
    pub fn aggregate_tri(&self, key: &str, channel: &ChannelKind) -> RoutingResult<TriState> {
        let leaves = self.index.leaves_of(key)?;
        Ok(TriState::aggregate(
            leaves.iter().map(|leaf| self.channels.get(leaf, channel)),
        ))
    }

    /// Whether pings to `person_id` actually fire below `key`: per leaf the
    /// stored toggle masked by the gate, aggregated over the subtree.
    pub fn effective_person(&self, key: &str, person_id: &str) -> RoutingResult<TriState> {
        let leaves = self.index.leaves_of(key)?;
        let channel = ChannelKind::Person(person_id.to_string());
        Ok(TriState::aggregate(leaves.iter().map(|leaf| {
            self.gate_open_unchecked(leaf) && self.channels.get(leaf, &channel)
        })))
    }

    fn gate_open_unchecked(&self, key: &str) -> bool {
        self.channels.get(key, &ChannelKind::Robot)
            || self.channels.get(key, &ChannelKind::SmallPackage)
    }

    /// Force every person off at nodes where both gates are now closed.
    fn close_gates(&mut self, nodes: &[String]) {
        for node in nodes {
            if self.gate_open_unchecked(node) {
                continue;
            }

            let mut persons: HashSet<PersonId> =
                self.people.ids().map(str::to_string).collect();
            persons.extend(self.channels.persons_at(node));

            for person in persons {
                self.channels.set(node, ChannelKind::Person(person), false);
            }
        }
    }

    // =========================================================================
    // Webhook routing
    // =========================================================================

    /// Replace the webhook assignment of `key` and all of its descendants.
    pub fn assign_webhooks<I, S>(
        &mut self,
        key: &str,
        webhook_ids: I,
    ) -> RoutingResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<WebhookId>,
    {
        let affected = self.index.subtree_of(key)?;
        let ids: BTreeSet<WebhookId> = webhook_ids.into_iter().map(Into::into).collect();

        if let Some(unknown) = ids.iter().find(|id| !self.webhooks.contains(id)) {
            return Err(RoutingError::UnknownWebhook {
                webhook_id: unknown.clone(),
            });
        }

        self.router
            .replace(affected.iter().map(String::as_str), &ids);

        debug!(
            node = %key,
            webhooks = ids.len(),
            affected = affected.len(),
            "Assigned webhooks"
        );

        self.dirty.extend(affected.iter().cloned());
        Ok(affected)
    }

    /// Webhooks the robot channel of `key` delivers to.
    pub fn assigned_webhooks(&self, key: &str) -> RoutingResult<Vec<WebhookId>> {
        self.ensure_node(key)?;
        Ok(self.router.assigned(key))
    }

    /// Whether robot delivery is on below `key` but the operator still has to
    /// pick a webhook for it.
    pub fn needs_configuration(&self, key: &str) -> RoutingResult<bool> {
        let robot = self.aggregate_tri(key, &ChannelKind::Robot)?;
        Ok(webhook::needs_configuration(
            robot.is_false(),
            self.router.is_unassigned(key),
            self.webhooks.len(),
        ))
    }

    /// Every node that needs configuration, in catalog pre-order.
    #[must_use]
    pub fn nodes_needing_configuration(&self) -> Vec<String> {
        self.index
            .keys()
            .filter(|key| self.needs_configuration(key).unwrap_or(false))
            .map(str::to_string)
            .collect()
    }

    /// With exactly one webhook, give it to every unassigned node whose
    /// subtree has robot delivery on somewhere.
    fn auto_assign_single_webhook(&mut self) {
        let Some(single) = self.webhooks.single() else {
            return;
        };
        let ids = BTreeSet::from([single.id.clone()]);

        let targets: Vec<String> = self
            .index
            .keys()
            .filter(|key| self.router.is_unassigned(key) && self.robot_enabled_below(key))
            .map(str::to_string)
            .collect();

        if targets.is_empty() {
            return;
        }

        self.router
            .replace(targets.iter().map(String::as_str), &ids);
        info!(
            webhook = %single.id,
            nodes = targets.len(),
            "Auto-assigned the only available webhook"
        );
        self.dirty.extend(targets);
    }

    fn robot_enabled_below(&self, key: &str) -> bool {
        self.aggregate_tri(key, &ChannelKind::Robot)
            .is_ok_and(|robot| !robot.is_false())
    }

    // =========================================================================
    // Alert rules
    // =========================================================================

    /// Rules of `key`, seeding the defaults on first open.
    pub fn open_rules(&mut self, key: &str) -> RoutingResult<&[AlertRule]> {
        self.ensure_node(key)?;
        let (rules, seeded) = self.rules.open(key);
        if seeded {
            debug!(node = %key, rules = rules.len(), "Seeded default alert rules");
            self.dirty.insert(key.to_string());
        }
        Ok(rules)
    }

    /// Rules of `key` without seeding.
    pub fn rules(&self, key: &str) -> RoutingResult<&[AlertRule]> {
        self.ensure_node(key)?;
        Ok(self.rules.rules(key))
    }

    /// Append an empty rule to `key` and return its id.
    pub fn add_rule(&mut self, key: &str) -> RoutingResult<String> {
        self.ensure_node(key)?;
        let id = self.rules.add(key);
        self.dirty.insert(key.to_string());
        Ok(id)
    }

    pub fn update_rule(
        &mut self,
        key: &str,
        rule_id: &str,
        update: RuleUpdate,
    ) -> RoutingResult<()> {
        self.ensure_node(key)?;
        self.rules.update(key, rule_id, update)?;
        self.dirty.insert(key.to_string());
        Ok(())
    }

    pub fn remove_rule(&mut self, key: &str, rule_id: &str) -> RoutingResult<AlertRule> {
        self.ensure_node(key)?;
        let removed = self.rules.remove(key, rule_id)?;
        self.dirty.insert(key.to_string());
        Ok(removed)
    }

    /// Check the stored rules of `key` for duplicate apps.
    pub fn validate_rules(&self, key: &str) -> RoutingResult<()> {
        self.ensure_node(key)?;
        self.rules.validate(key)
    }

    /// Replace the rules of `key` if they validate; nothing changes otherwise.
    pub fn replace_rules(&mut self, key: &str, rules: Vec<AlertRule>) -> RoutingResult<()> {
        self.ensure_node(key)?;
        self.rules.replace(key, rules)?;
        self.dirty.insert(key.to_string());
        Ok(())
    }

    // =========================================================================
    // Snapshots and dirty tracking
    // =========================================================================

    /// Snapshot of the subtree rooted at `key`.
    pub fn snapshot_for(&self, key: &str) -> RoutingResult<Snapshot> {
        let scope = self.index.subtree_of(key)?;
        Ok(self.snapshot_of(scope))
    }

    /// Snapshot of every node.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_of(self.index.keys().map(str::to_string).collect())
    }

    fn snapshot_of(&self, scope: Vec<String>) -> Snapshot {
        let keys = || scope.iter().map(String::as_str);
        Snapshot {
            saved_at: Some(Utc::now()),
            channels: self.channels.entries_for(keys()),
            webhooks: self.router.entries_for(keys()),
            rules: self.rules.entries_for(keys()),
            scope,
        }
    }

    /// Replace all state with a stored snapshot.
    ///
    /// Directories must be loaded first: entries for unknown nodes, persons or
    /// webhooks are dropped. Rule sets are kept as stored even if they would
    /// fail validation, so the operator can fix them.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.channels.clear();
        self.router.clear();
        self.rules.clear();
        self.dirty.clear();

        let mut dropped = 0usize;

        for entry in snapshot.channels {
            let person_known = entry
                .channel
                .person_id()
                .map_or(true, |id| self.people.contains(id));
            if self.index.contains(&entry.node_key) && person_known {
                self.channels.set(&entry.node_key, entry.channel, entry.enabled);
            } else {
                dropped += 1;
            }
        }

        for entry in snapshot.webhooks {
            let ids: BTreeSet<WebhookId> = entry
                .webhook_ids
                .into_iter()
                .filter(|id| self.webhooks.contains(id))
                .collect();
            if self.index.contains(&entry.node_key) && !ids.is_empty() {
                self.router.replace([entry.node_key.as_str()], &ids);
            } else {
                dropped += 1;
            }
        }

        for entry in snapshot.rules {
            if self.index.contains(&entry.node_key) {
                self.rules.restore(&entry.node_key, entry.rules);
            } else {
                dropped += 1;
            }
        }

        // Persons added before the load keep their opt-out default everywhere.
        for person in self.people.ids().map(str::to_string).collect::<Vec<_>>() {
            for key in self.index.keys() {
                self.channels
                    .set_if_absent(key, ChannelKind::Person(person.clone()), true);
            }
        }

        if dropped > 0 {
            warn!(dropped, "Dropped stale entries while applying routing snapshot");
        }
        info!(nodes = snapshot.scope.len(), "Applied routing snapshot");
    }

    /// Nodes with unsaved changes, in catalog pre-order.
    #[must_use]
    pub fn dirty_nodes(&self) -> Vec<String> {
        self.index
            .keys()
            .filter(|key| self.dirty.contains(*key))
            .map(str::to_string)
            .collect()
    }

    /// Dirty nodes that have no dirty ancestor. Saving these covers every
    /// dirty node.
    #[must_use]
    pub fn dirty_roots(&self) -> Vec<String> {
        self.dirty_nodes()
            .into_iter()
            .filter(|key| {
                self.index
                    .ancestors_of(key)
                    .map(|ancestors| ancestors.iter().all(|a| !self.dirty.contains(a)))
                    .unwrap_or(false)
            })
            .collect()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Mark the subtree of `key` as saved.
    pub fn mark_saved(&mut self, key: &str) -> RoutingResult<()> {
        for node in self.index.subtree_of(key)? {
            self.dirty.remove(&node);
        }
        Ok(())
    }

    fn ensure_node(&self, key: &str) -> RoutingResult<()> {
        if self.index.contains(key) {
            Ok(())
        } else {
            Err(RoutingError::unknown_node(key))
        }
    }
}
