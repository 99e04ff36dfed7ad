//! Editing session: the engine plus its persistence backend.
//!
//! The engine stays synchronous and never retries anything. Saving, loading
//! and the retry/backoff policy live here, at the call site. A failed save
//! leaves local state untouched and dirty so it can simply be saved again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::config::RoutingConfig;
use crate::engine::RoutingEngine;
use crate::error::{PersistError, RoutingResult};
use crate::persistence::PersistencePort;
use crate::rules::AlertRule;

/// Exponential backoff for persistence calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles per attempt.
    pub base_delay: Duration,
    /// Upper bound for any delay, including `retry-after` hints.
    pub max_delay: Duration,
    /// Bound on each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (starting at 1).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, PersistError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PersistError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(PersistError::Timeout {
                    timeout_ms: u64::try_from(self.attempt_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                }),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempt, "Persistence call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = match &e {
                        PersistError::RateLimited { retry_after_secs } => {
                            Duration::from_secs(*retry_after_secs).min(self.max_delay)
                        }
                        _ => self.delay_for(attempt),
                    };
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Persistence call failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(operation, attempt, error = %e, "Persistence call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// A routing engine bound to a persistence backend.
pub struct ConfigSession {
    engine: RoutingEngine,
    port: Arc<dyn PersistencePort>,
    retry: RetryPolicy,
}

impl ConfigSession {
    #[must_use]
    pub fn new(engine: RoutingEngine, port: Arc<dyn PersistencePort>, retry: RetryPolicy) -> Self {
        Self {
            engine,
            port,
            retry,
        }
    }

    /// Build the catalog, engine and retry policy from configuration.
    pub fn from_config(config: &RoutingConfig, port: Arc<dyn PersistencePort>) -> RoutingResult<Self> {
        let catalog = config.load_catalog()?;
        let engine = RoutingEngine::from_catalog(&catalog).with_rule_defaults(config.rule_defaults());
        Ok(Self::new(engine, port, config.retry_policy()))
    }

    #[must_use]
    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RoutingEngine {
        &mut self.engine
    }

    /// Replace local state with the backend's configuration.
    #[instrument(skip(self), fields(backend = self.port.name()))]
    pub async fn load(&mut self) -> RoutingResult<()> {
        let port = Arc::clone(&self.port);
        let snapshot = self.retry.run("load", || port.load()).await?;
        self.engine.apply_snapshot(snapshot);
        Ok(())
    }

    /// Save the subtree of `key`. On failure the subtree stays dirty.
    #[instrument(skip(self), fields(backend = self.port.name()))]
    pub async fn save(&mut self, key: &str) -> RoutingResult<()> {
        let snapshot = self.engine.snapshot_for(key)?;
        let port = Arc::clone(&self.port);

        self.retry
            .run("save", || port.save(key, &snapshot))
            .await?;

        self.engine.mark_saved(key)?;
        debug!(node = %key, "Routing configuration saved");
        Ok(())
    }

    /// Save every dirty subtree. Keeps going after a failure and returns the
    /// first error once all subtrees were attempted.
    pub async fn save_dirty(&mut self) -> RoutingResult<usize> {
        let mut saved = 0;
        let mut first_error = None;

        for key in self.engine.dirty_roots() {
            match self.save(&key).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    /// Validate and store a node's rules, then persist them.
    ///
    /// A validation error leaves the local rules unchanged. A persistence
    /// error keeps the new rules locally and dirty.
    pub async fn save_rules(&mut self, key: &str, rules: Vec<AlertRule>) -> RoutingResult<()> {
        self.engine.replace_rules(key, rules)?;
        self.save(key).await
    }
}
