//! Configuration for the routing engine and its persistence backend.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::rules::{Frequency, RuleDefaults};
use crate::session::RetryPolicy;

/// Routing engine configuration.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Base URL of the console backend API.
    pub api_url: Option<String>,
    /// Bearer token for the backend API.
    pub api_token: Option<String>,
    /// Per-attempt timeout for save/load requests.
    pub request_timeout_ms: u64,
    /// Attempts per save before giving up.
    pub save_max_attempts: u32,
    /// First backoff delay between attempts.
    pub save_backoff_ms: u64,
    /// Upper bound for the backoff delay.
    pub save_backoff_max_ms: u64,
    /// Apps seeded into a rule set the first time a node is opened.
    pub default_rule_apps: Vec<String>,
    /// Frequency of the seeded rules.
    pub default_rule_frequency: Frequency,
    /// Catalog file; the built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_url: env::var("ROUTING_API_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            api_token: env::var("ROUTING_API_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            request_timeout_ms: env::var("ROUTING_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),
            save_max_attempts: env::var("ROUTING_SAVE_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(3),
            save_backoff_ms: env::var("ROUTING_SAVE_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(500),
            save_backoff_max_ms: env::var("ROUTING_SAVE_BACKOFF_MAX_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5_000),
            default_rule_apps: env::var("ROUTING_DEFAULT_RULE_APPS")
                .ok()
                .map(|s| parse_rule_apps(&s))
                .unwrap_or_else(|| RuleDefaults::default().apps),
            default_rule_frequency: env::var("ROUTING_DEFAULT_RULE_FREQUENCY")
                .ok()
                .and_then(|s| match s.parse() {
                    Ok(frequency) => Some(frequency),
                    Err(e) => {
                        warn!(error = %e, "Ignoring ROUTING_DEFAULT_RULE_FREQUENCY");
                        None
                    }
                })
                .unwrap_or(Frequency::OneHour),
            catalog_path: env::var("ROUTING_CATALOG_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Split a comma-separated app list, dropping blanks and repeats.
fn parse_rule_apps(value: &str) -> Vec<String> {
    let mut apps: Vec<String> = Vec::new();
    for app in value.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        if apps.iter().any(|seen| seen == app) {
            warn!(app, "Ignoring repeated app in ROUTING_DEFAULT_RULE_APPS");
        } else {
            apps.push(app.to_string());
        }
    }
    apps
}

impl RoutingConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Rules seeded into newly opened nodes.
    #[must_use]
    pub fn rule_defaults(&self) -> RuleDefaults {
        RuleDefaults {
            apps: self.default_rule_apps.clone(),
            frequency: self.default_rule_frequency,
        }
    }

    /// Retry policy for saves.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.save_max_attempts.max(1),
            base_delay: Duration::from_millis(self.save_backoff_ms),
            max_delay: Duration::from_millis(self.save_backoff_max_ms),
            attempt_timeout: self.request_timeout(),
        }
    }

    /// Load the configured catalog file, or the built-in catalog.
    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => Catalog::from_path(path),
            None => Ok(Catalog::builtin()),
        }
    }
}
