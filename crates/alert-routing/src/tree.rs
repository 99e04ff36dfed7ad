//! Derived lookup maps over the catalog.

use std::collections::HashMap;

use crate::catalog::{AlertNode, Catalog};
use crate::error::{RoutingError, RoutingResult};

/// Flattened view of a catalog node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub key: String,
    pub name: String,
    pub level: u8,
}

/// Index over a validated catalog, built once per session.
///
/// Holds node-by-key, children-by-key and parent-by-key maps plus the
/// pre-order of all keys, which every ordered query follows.
#[derive(Debug, Clone)]
pub struct TreeIndex {
    nodes: HashMap<String, NodeInfo>,
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, String>,
    roots: Vec<String>,
    order: Vec<String>,
}

impl TreeIndex {
    /// Build the index from a catalog.
    #[must_use]
    pub fn build(catalog: &Catalog) -> Self {
        let mut index = Self {
            nodes: HashMap::new(),
            children: HashMap::new(),
            parents: HashMap::new(),
            roots: catalog.roots().iter().map(|n| n.key.clone()).collect(),
            order: Vec::new(),
        };

        let mut stack: Vec<(&AlertNode, Option<&str>)> =
            catalog.roots().iter().rev().map(|n| (n, None)).collect();

        while let Some((node, parent)) = stack.pop() {
            index.order.push(node.key.clone());
            index.nodes.insert(
                node.key.clone(),
                NodeInfo {
                    key: node.key.clone(),
                    name: node.name.clone(),
                    level: node.level,
                },
            );
            index.children.insert(
                node.key.clone(),
                node.children.iter().map(|c| c.key.clone()).collect(),
            );
            if let Some(parent) = parent {
                index.parents.insert(node.key.clone(), parent.to_string());
            }

            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .map(|c| (c, Some(node.key.as_str()))),
            );
        }

        index
    }

    /// Number of indexed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `key` is part of the catalog.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Look up a node.
    pub fn node(&self, key: &str) -> RoutingResult<&NodeInfo> {
        self.nodes
            .get(key)
            .ok_or_else(|| RoutingError::unknown_node(key))
    }

    /// Root keys in catalog order.
    #[must_use]
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Every key in depth-first pre-order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Direct children of `key` in catalog order.
    pub fn children_of(&self, key: &str) -> RoutingResult<&[String]> {
        self.children
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| RoutingError::unknown_node(key))
    }

    /// Parent of `key`, `None` for roots.
    pub fn parent_of(&self, key: &str) -> RoutingResult<Option<&str>> {
        self.ensure(key)?;
        Ok(self.parents.get(key).map(String::as_str))
    }

    /// Whether `key` has no children.
    pub fn is_leaf(&self, key: &str) -> RoutingResult<bool> {
        Ok(self.children_of(key)?.is_empty())
    }

    /// All descendants of `key` in depth-first pre-order, excluding `key`.
    pub fn descendants_of(&self, key: &str) -> RoutingResult<Vec<String>> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self
            .children_of(key)?
            .iter()
            .rev()
            .map(String::as_str)
            .collect();

        while let Some(current) = stack.pop() {
            out.push(current.to_string());
            if let Some(children) = self.children.get(current) {
                stack.extend(children.iter().rev().map(String::as_str));
            }
        }

        Ok(out)
    }

    /// `key` followed by all of its descendants.
    pub fn subtree_of(&self, key: &str) -> RoutingResult<Vec<String>> {
        let mut out = vec![key.to_string()];
        out.extend(self.descendants_of(key)?);
        Ok(out)
    }

    /// Ancestors of `key` from the immediate parent up to the root.
    pub fn ancestors_of(&self, key: &str) -> RoutingResult<Vec<String>> {
        self.ensure(key)?;

        let mut out = Vec::new();
        let mut current = key;
        while let Some(parent) = self.parents.get(current) {
            out.push(parent.clone());
            current = parent.as_str();
        }
        Ok(out)
    }

    /// Leaves of the subtree rooted at `key`; a leaf's subtree is itself.
    pub fn leaves_of(&self, key: &str) -> RoutingResult<Vec<String>> {
        let subtree = self.subtree_of(key)?;
        Ok(subtree
            .into_iter()
            .filter(|k| self.children.get(k).is_some_and(Vec::is_empty))
            .collect())
    }

    fn ensure(&self, key: &str) -> RoutingResult<()> {
        if self.nodes.contains_key(key) {
            Ok(())
        } else {
            Err(RoutingError::unknown_node(key))
        }
    }
}
