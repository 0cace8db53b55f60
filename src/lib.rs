//! # swarm-registry
//!
//! A per-shard agent swarm registry and message broker: agents register
//! and heartbeat, messages are enqueued either to a concrete agent or to
//! an abstract `type:`/`role:` target, and the shard either delivers them
//! on request (`poll`) or pushes them out itself (`dispatch`) via an
//! injected namespace resolver and delivery client.
//!
//! ## Architecture
//!
//! One [`domain::RegistryState`] per shard, mutated only through the
//! free-function component modules (`directory`, `subscriptions`,
//! `queue`, `router`, `dispatcher`) under a single writer lock owned by
//! [`shard::Shard`]. [`shard::Shard`] is the only thing that implements
//! [`operator::OperatorInterface`], the surface external callers and
//! transport adapters program against.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swarm_registry::config::RegistryConfig;
//! use swarm_registry::dispatcher::ReqwestDeliveryClient;
//! use swarm_registry::namespace::StaticNamespaceDirectory;
//! use swarm_registry::shard::Shard;
//! use swarm_registry::store::InMemoryStateStore;
//! use swarm_registry::telemetry::Telemetry;
//! use swarm_registry::time::SystemClock;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let shard = Shard::load(
//!     Arc::new(SystemClock),
//!     Arc::new(Telemetry::new()),
//!     Arc::new(StaticNamespaceDirectory::new()),
//!     Arc::new(ReqwestDeliveryClient::default()),
//!     Arc::new(InMemoryStateStore::new()),
//!     RegistryConfig::development(),
//!     None,
//! )
//! .await?;
//! let _maintenance = shard.spawn_maintenance();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod maintenance;
pub mod namespace;
pub mod operator;
pub mod queue;
pub mod router;
pub mod shard;
pub mod store;
pub mod subscriptions;
pub mod telemetry;
pub mod time;

pub use error::{CoreError, CoreResult};
pub use operator::OperatorInterface;
pub use shard::Shard;
