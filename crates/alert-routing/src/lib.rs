//! Hierarchical notification routing for the operations console.
//!
//! Alerts are organised in a tree of up to three levels (category, group,
//! alert). For every node the operator decides which delivery channels fire:
//! a chat robot, a small-package push, and per-person pings. Toggling a
//! channel on a node cascades to the whole subtree, parents render as a
//! tri-state aggregate of their leaves, and person pings only take effect
//! where at least one gate channel (robot or small package) is on.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use alert_routing::{
//!     ChannelKind, ConfigSession, MemoryPersistence, RoutingConfig, Webhook,
//! };
//!
//! # async fn run() -> alert_routing::RoutingResult<()> {
//! let config = RoutingConfig::default();
//! let mut session = ConfigSession::from_config(&config, Arc::new(MemoryPersistence::new()))?;
//!
//! let engine = session.engine_mut();
//! engine.add_webhook(Webhook {
//!     id: "ops-bot".to_string(),
//!     name: "Ops bot".to_string(),
//!     endpoint: "https://chat.example.com/hook/ops".to_string(),
//! });
//! engine.set_channel_cascade("server", ChannelKind::Robot, true)?;
//!
//! session.save_dirty().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! [`RoutingConfig`] reads its settings from the environment:
//!
//! - `ROUTING_API_URL`: base URL of the console API (enables [`HttpPersistence`])
//! - `ROUTING_API_TOKEN`: bearer token for the console API
//! - `ROUTING_REQUEST_TIMEOUT_MS`: per-attempt timeout
//! - `ROUTING_SAVE_MAX_ATTEMPTS`, `ROUTING_SAVE_BACKOFF_MS`,
//!   `ROUTING_SAVE_BACKOFF_MAX_MS`: retry policy for saves
//! - `ROUTING_DEFAULT_RULE_APPS`, `ROUTING_DEFAULT_RULE_FREQUENCY`: rules
//!   seeded into a node the first time it is opened
//! - `ROUTING_CATALOG_PATH`: JSON or YAML catalog replacing the built-in one
//!
//! # Architecture
//!
//! - [`Catalog`] and [`TreeIndex`] describe the static alert tree
//! - [`ChannelStateStore`], [`WebhookRouter`] and [`RuleBook`] hold per-node state
//! - [`RoutingEngine`] owns all of it and performs the cascades
//! - [`PersistencePort`] stores snapshots; [`ConfigSession`] adds retries

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod catalog;
pub mod channel;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod rules;
pub mod session;
pub mod tree;
pub mod webhook;

pub use catalog::{AlertNode, Catalog};
pub use channel::{ChannelEntry, ChannelKind, ChannelStateStore, PersonId, TriState};
pub use config::RoutingConfig;
pub use directory::{Directory, Person, Webhook, WebhookId};
pub use engine::RoutingEngine;
pub use error::{CatalogError, PersistError, RoutingError, RoutingResult};
pub use persistence::{HttpPersistence, MemoryPersistence, PersistencePort, Snapshot};
pub use rules::{AlertRule, Frequency, RuleBook, RuleDefaults, RuleSetEntry, RuleUpdate};
pub use session::{ConfigSession, RetryPolicy};
pub use tree::{NodeInfo, TreeIndex};
pub use webhook::{WebhookEntry, WebhookRouter};
