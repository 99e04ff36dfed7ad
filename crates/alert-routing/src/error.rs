//! Error types for the alert routing engine.

use thiserror::Error;

/// Errors raised while loading or validating the alert-type catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The same key appears more than once in the forest
    #[error("Duplicate catalog key '{key}'")]
    DuplicateKey { key: String },

    /// A node has an empty or whitespace-only key
    #[error("Catalog node '{name}' has an empty key")]
    EmptyKey { name: String },

    /// A node's declared level does not match its depth in the tree
    #[error("Catalog node '{key}' declares level {level}, expected {expected}")]
    InvalidLevel { key: String, level: u8, expected: u8 },

    /// The catalog text could not be parsed
    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    /// The catalog file could not be read
    #[error("Failed to read catalog file '{path}': {reason}")]
    Io { path: String, reason: String },
}

/// Errors returned by a persistence backend.
#[derive(Debug, Error)]
pub enum PersistError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend is not configured
    #[error("Persistence backend not configured: {0}")]
    NotConfigured(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rate limited by the backend
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying
        retry_after_secs: u64,
    },

    /// The attempt did not complete in time
    #[error("Persistence request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl PersistError {
    /// Whether a retry of the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::NotConfigured(_) | Self::Serialization(_) | Self::Other(_) => false,
        }
    }
}

/// Errors surfaced by the routing engine and its session.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Key is not part of the catalog. The catalog is static, so this points
    /// at a corrupted index or a caller bug rather than user input.
    #[error("Unknown alert node '{key}'")]
    UnknownNode { key: String },

    /// Rule id does not exist in the node's rule set
    #[error("Rule '{rule_id}' not found on node '{key}'")]
    UnknownRule { key: String, rule_id: String },

    /// Webhook id is not in the webhook directory
    #[error("Webhook '{webhook_id}' is not in the webhook directory")]
    UnknownWebhook { webhook_id: String },

    /// Person id is not in the people directory
    #[error("Person '{person_id}' is not in the people directory")]
    UnknownPerson { person_id: String },

    /// Robot cannot be enabled without any webhook to deliver to
    #[error("Cannot enable robot notifications on '{key}': no webhook is available")]
    NoWebhookAvailable { key: String },

    /// Two rules on the same node share an app
    #[error("App '{app}' is configured more than once on node '{key}'")]
    DuplicateApp { key: String, app: String },

    /// Catalog loading or validation failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Persistence backend failed
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl RoutingError {
    pub(crate) fn unknown_node(key: &str) -> Self {
        tracing::error!(node = %key, "Lookup of unknown alert node, catalog index is inconsistent");
        Self::UnknownNode {
            key: key.to_string(),
        }
    }
}

/// Result alias for engine operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PersistError::RateLimited {
            retry_after_secs: 3
        }
        .is_retryable());
        assert!(PersistError::Timeout { timeout_ms: 100 }.is_retryable());
        assert!(PersistError::Rejected {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!PersistError::Rejected {
            status: 400,
            body: "bad".to_string()
        }
        .is_retryable());
        assert!(!PersistError::NotConfigured("ROUTING_API_URL".to_string()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = RoutingError::DuplicateApp {
            key: "server-deploy".to_string(),
            app: "server".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "App 'server' is configured more than once on node 'server-deploy'"
        );

        let err = RoutingError::from(CatalogError::DuplicateKey {
            key: "cdn".to_string(),
        });
        assert_eq!(err.to_string(), "Duplicate catalog key 'cdn'");
    }
}
