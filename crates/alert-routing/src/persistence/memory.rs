//! In-process persistence backend.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{PersistencePort, Snapshot};
use crate::error::PersistError;

/// Keeps the stored configuration in memory.
///
/// Used for local runs of the console and as the reference backend in tests.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    stored: Mutex<Snapshot>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing configuration.
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            stored: Mutex::new(snapshot),
        }
    }

    /// Copy of everything stored so far.
    pub async fn stored(&self) -> Snapshot {
        self.stored.lock().await.clone()
    }
}

#[async_trait]
impl PersistencePort for MemoryPersistence {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, node_key: &str, snapshot: &Snapshot) -> Result<(), PersistError> {
        let mut stored = self.stored.lock().await;
        stored.merge(snapshot.clone());
        debug!(
            backend = "memory",
            node = %node_key,
            scope = snapshot.scope.len(),
            "Stored routing snapshot"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, PersistError> {
        Ok(self.stored.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{AlertRule, Frequency, RuleSetEntry};

    #[tokio::test]
    async fn test_save_then_load() {
        let backend = MemoryPersistence::new();
        let snapshot = Snapshot {
            scope: vec!["server-deploy".to_string()],
            rules: vec![RuleSetEntry {
                node_key: "server-deploy".to_string(),
                rules: vec![AlertRule::new("server", Frequency::OneHour)],
            }],
            ..Snapshot::default()
        };

        backend.save("server-deploy", &snapshot).await.unwrap();
        let loaded = backend.load().await.unwrap();
        assert_eq!(loaded.rules, snapshot.rules);
        assert_eq!(backend.name(), "memory");
    }
}
