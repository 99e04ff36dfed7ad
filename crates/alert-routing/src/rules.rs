//! Per-node alert throttling rules.
//!
//! Each node owns an ordered list of `(app, frequency)` rules. An app may appear
//! at most once per node; rules whose app is still unset are exempt so that
//! half-edited rows don't block validation of the rest.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RoutingError, RoutingResult};

/// How often an alert may fire for one app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    TwentyFourHours,
}

impl Frequency {
    /// All frequencies, shortest first.
    pub const ALL: [Self; 5] = [
        Self::FiveMinutes,
        Self::OneHour,
        Self::EightHours,
        Self::TwelveHours,
        Self::TwentyFourHours,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FiveMinutes => "5m",
            Self::OneHour => "1h",
            Self::EightHours => "8h",
            Self::TwelveHours => "12h",
            Self::TwentyFourHours => "24h",
        }
    }

    /// Minimum interval between two alerts.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        match self {
            Self::FiveMinutes => Duration::from_secs(5 * 60),
            Self::OneHour => Duration::from_secs(3600),
            Self::EightHours => Duration::from_secs(8 * 3600),
            Self::TwelveHours => Duration::from_secs(12 * 3600),
            Self::TwentyFourHours => Duration::from_secs(24 * 3600),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown frequency '{s}', expected one of 5m, 1h, 8h, 12h, 24h"))
    }
}

/// A single throttling rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
}

impl AlertRule {
    /// A rule with nothing filled in yet.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            app: None,
            frequency: None,
        }
    }

    #[must_use]
    pub fn new(app: impl Into<String>, frequency: Frequency) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            app: Some(app.into()),
            frequency: Some(frequency),
        }
    }

    /// The app name for uniqueness purposes; blank counts as unset.
    #[must_use]
    pub fn app_key(&self) -> Option<&str> {
        self.app.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }
}

/// A single-field edit of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleUpdate {
    App(Option<String>),
    Frequency(Option<Frequency>),
}

/// Rules seeded into a node the first time it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefaults {
    pub apps: Vec<String>,
    pub frequency: Frequency,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            apps: vec!["client".to_string(), "server".to_string()],
            frequency: Frequency::OneHour,
        }
    }
}

impl RuleDefaults {
    fn seed(&self) -> Vec<AlertRule> {
        self.apps
            .iter()
            .map(|app| AlertRule::new(app.clone(), self.frequency))
            .collect()
    }
}

/// One node's rules, as carried by snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetEntry {
    pub node_key: String,
    pub rules: Vec<AlertRule>,
}

/// Check that no two rules share a non-empty app.
pub fn validate(node_key: &str, rules: &[AlertRule]) -> RoutingResult<()> {
    let mut seen = HashSet::new();
    for app in rules.iter().filter_map(AlertRule::app_key) {
        if !seen.insert(app) {
            return Err(RoutingError::DuplicateApp {
                key: node_key.to_string(),
                app: app.to_string(),
            });
        }
    }
    Ok(())
}

/// Rule sets of every node. Node keys are checked by the engine.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    sets: HashMap<String, Vec<AlertRule>>,
    defaults: RuleDefaults,
}

impl RuleBook {
    #[must_use]
    pub fn new(defaults: RuleDefaults) -> Self {
        Self {
            sets: HashMap::new(),
            defaults,
        }
    }

    /// Rules of a node, seeding the defaults if the node never had a rule set.
    ///
    /// Returns whether seeding happened alongside the rules.
    pub fn open(&mut self, node_key: &str) -> (&[AlertRule], bool) {
        let mut seeded = false;
        let rules = self.sets.entry(node_key.to_string()).or_insert_with(|| {
            seeded = true;
            self.defaults.seed()
        });
        (rules.as_slice(), seeded)
    }

    /// Rules of a node without seeding.
    #[must_use]
    pub fn rules(&self, node_key: &str) -> &[AlertRule] {
        self.sets
            .get(node_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Append an empty rule and return its id.
    pub fn add(&mut self, node_key: &str) -> String {
        let rule = AlertRule::empty();
        let id = rule.id.clone();
        self.sets.entry(node_key.to_string()).or_default().push(rule);
        id
    }

    pub fn update(
        &mut self,
        node_key: &str,
        rule_id: &str,
        update: RuleUpdate,
    ) -> RoutingResult<()> {
        let rule = self
            .sets
            .get_mut(node_key)
            .and_then(|rules| rules.iter_mut().find(|r| r.id == rule_id))
            .ok_or_else(|| RoutingError::UnknownRule {
                key: node_key.to_string(),
                rule_id: rule_id.to_string(),
            })?;

        match update {
            RuleUpdate::App(app) => rule.app = app,
            RuleUpdate::Frequency(frequency) => rule.frequency = frequency,
        }
        Ok(())
    }

    pub fn remove(&mut self, node_key: &str, rule_id: &str) -> RoutingResult<AlertRule> {
        let rules = self.sets.get_mut(node_key);
        let position = rules
            .as_ref()
            .and_then(|rules| rules.iter().position(|r| r.id == rule_id));

        match (rules, position) {
            (Some(rules), Some(position)) => Ok(rules.remove(position)),
            _ => Err(RoutingError::UnknownRule {
                key: node_key.to_string(),
                rule_id: rule_id.to_string(),
            }),
        }
    }

    /// Validate the stored rules of a node.
    pub fn validate(&self, node_key: &str) -> RoutingResult<()> {
        validate(node_key, self.rules(node_key))
    }

    /// Replace a node's rules after validating them. Nothing changes on error.
    pub fn replace(&mut self, node_key: &str, rules: Vec<AlertRule>) -> RoutingResult<()> {
        validate(node_key, &rules)?;
        self.sets.insert(node_key.to_string(), rules);
        Ok(())
    }

    /// Rule sets for the given nodes in the order given.
    #[must_use]
    pub fn entries_for<'a, I>(&self, node_keys: I) -> Vec<RuleSetEntry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        node_keys
            .into_iter()
            .filter_map(|key| {
                self.sets.get(key).map(|rules| RuleSetEntry {
                    node_key: key.to_string(),
                    rules: rules.clone(),
                })
            })
            .collect()
    }

    /// Store rules loaded from a snapshot as-is.
    pub(crate) fn restore(&mut self, node_key: &str, rules: Vec<AlertRule>) {
        self.sets.insert(node_key.to_string(), rules);
    }

    pub fn clear(&mut self) {
        self.sets.clear();
    }
}
