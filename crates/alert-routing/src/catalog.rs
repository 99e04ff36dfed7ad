//! Static catalog of alert types.
//!
//! The catalog is an ordered forest of alert-type nodes supplied once at startup.
//! Level 1 nodes are the categories (client, server, CDN), level 2 nodes their
//! subcategories, and level 3 nodes concrete events. A node may be a leaf at
//! any level.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CatalogError;

/// Deepest level a catalog node may have.
pub const MAX_LEVEL: u8 = 3;

/// A single alert-type node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertNode {
    /// Globally unique key
    pub key: String,
    /// Display name
    pub name: String,
    /// Depth in the tree, starting at 1 for roots
    pub level: u8,
    /// Ordered child nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AlertNode>,
}

impl AlertNode {
    /// Create a leaf node.
    #[must_use]
    pub fn leaf(key: impl Into<String>, name: impl Into<String>, level: u8) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            level,
            children: vec![],
        }
    }

    /// Create a node with children.
    #[must_use]
    pub fn branch(
        key: impl Into<String>,
        name: impl Into<String>,
        level: u8,
        children: Vec<AlertNode>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            level,
            children,
        }
    }

    /// Whether this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Validated forest of alert-type nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    roots: Vec<AlertNode>,
}

impl Catalog {
    /// Build a catalog from its roots, validating keys and levels.
    pub fn new(roots: Vec<AlertNode>) -> Result<Self, CatalogError> {
        validate(&roots)?;
        Ok(Self { roots })
    }

    /// Parse a catalog from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        let roots: Vec<AlertNode> =
            serde_json::from_str(text).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(roots)
    }

    /// Parse a catalog from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let roots: Vec<AlertNode> =
            serde_yaml::from_str(text).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(roots)
    }

    /// Load a catalog file. `.yaml`/`.yml` files are read as YAML, anything
    /// else as JSON.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let catalog = if is_yaml {
            Self::from_yaml_str(&text)?
        } else {
            Self::from_json_str(&text)?
        };

        info!(
            path = %path.display(),
            roots = catalog.roots.len(),
            "Loaded alert catalog"
        );
        Ok(catalog)
    }

    /// The default alert catalog of the game platform.
    #[must_use]
    pub fn builtin() -> Self {
        let roots = vec![
            AlertNode::branch(
                "client",
                "Client",
                1,
                vec![
                    AlertNode::branch(
                        "client-crash",
                        "Crashes",
                        2,
                        vec![
                            AlertNode::leaf("client-crash-android", "Android crash", 3),
                            AlertNode::leaf("client-crash-ios", "iOS crash", 3),
                            AlertNode::leaf("client-crash-pc", "PC crash", 3),
                        ],
                    ),
                    AlertNode::branch(
                        "client-performance",
                        "Performance",
                        2,
                        vec![
                            AlertNode::leaf("client-performance-fps", "Low frame rate", 3),
                            AlertNode::leaf("client-performance-memory", "Memory pressure", 3),
                        ],
                    ),
                    AlertNode::leaf("client-release", "Client release", 2),
                ],
            ),
            AlertNode::branch(
                "server",
                "Server",
                1,
                vec![
                    AlertNode::branch(
                        "server-deploy",
                        "Deployment",
                        2,
                        vec![
                            AlertNode::leaf("server-deploy-started", "Deployment started", 3),
                            AlertNode::leaf("server-deploy-failed", "Deployment failed", 3),
                            AlertNode::leaf("server-deploy-rollback", "Rollback", 3),
                        ],
                    ),
                    AlertNode::branch(
                        "server-runtime",
                        "Runtime",
                        2,
                        vec![
                            AlertNode::leaf("server-runtime-error-rate", "Error rate", 3),
                            AlertNode::leaf("server-runtime-latency", "Latency", 3),
                            AlertNode::leaf("server-runtime-restart", "Process restart", 3),
                        ],
                    ),
                ],
            ),
            AlertNode::branch(
                "cdn",
                "CDN",
                1,
                vec![
                    AlertNode::branch(
                        "cdn-sync",
                        "Resource sync",
                        2,
                        vec![
                            AlertNode::leaf("cdn-sync-failed", "Sync failed", 3),
                            AlertNode::leaf("cdn-sync-slow", "Sync slow", 3),
                        ],
                    ),
                    AlertNode::leaf("cdn-refresh", "Cache refresh", 2),
                ],
            ),
        ];

        Self { roots }
    }

    /// Root nodes in catalog order.
    #[must_use]
    pub fn roots(&self) -> &[AlertNode] {
        &self.roots
    }

    /// Total number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&AlertNode> = self.roots.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Whether the catalog has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Check key uniqueness and level consistency over the whole forest.
///
/// A nested forest cannot express a cycle, but a key repeated under its own
/// subtree would make lookups ambiguous, so uniqueness is checked globally.
fn validate(roots: &[AlertNode]) -> Result<(), CatalogError> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&AlertNode, u8)> = roots.iter().rev().map(|n| (n, 1)).collect();

    while let Some((node, depth)) = stack.pop() {
        if node.key.trim().is_empty() {
            return Err(CatalogError::EmptyKey {
                name: node.name.clone(),
            });
        }

        if depth > MAX_LEVEL || node.level != depth {
            return Err(CatalogError::InvalidLevel {
                key: node.key.clone(),
                level: node.level,
                expected: depth.min(MAX_LEVEL),
            });
        }

        if !seen.insert(node.key.as_str()) {
            return Err(CatalogError::DuplicateKey {
                key: node.key.clone(),
            });
        }

        stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
    }

    debug!(nodes = seen.len(), "Catalog validated");
    Ok(())
}
