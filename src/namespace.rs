//! The namespace resolver contract (spec §6): an external collaborator
//! the dispatcher consumes but this crate does not implement end to end.
//!
//! Grounded on the teacher's pattern of depending on trait objects at
//! integration seams (`time_provider.rs`'s `Clock`, `message_router`'s
//! `DeliveryEngine`) rather than concrete HTTP clients, so tests can
//! inject a fake and production code can inject a real one without
//! touching the dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::AgentType;

/// Resolves one agent id to the URL its inbound endpoint listens on, for
/// agents of a single [`AgentType`].
pub trait NamespaceResolver: Send + Sync {
    /// The URL to `POST` a message to for `agent_id`.
    fn endpoint(&self, agent_id: &str) -> String;
}

/// Maps an [`AgentType`] to its [`NamespaceResolver`], or `None` if that
/// type has no configured namespace (the dispatcher then treats every
/// delivery to that type as a `namespace_missing` failure).
pub trait NamespaceDirectory: Send + Sync {
    /// Look up the resolver for `agent_type`.
    fn resolve_namespace(&self, agent_type: AgentType) -> Option<Arc<dyn NamespaceResolver>>;
}

/// A fixed `AgentType -> NamespaceResolver` table, built once at shard
/// construction (spec §9, "express this as a small table passed in at
/// shard construction").
#[derive(Clone, Default)]
pub struct StaticNamespaceDirectory {
    resolvers: HashMap<AgentType, Arc<dyn NamespaceResolver>>,
}

impl StaticNamespaceDirectory {
    /// An empty directory; every type is `namespace_missing` until
    /// entries are added with [`with_resolver`](Self::with_resolver).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the resolver for `agent_type`.
    #[must_use]
    pub fn with_resolver(
        mut self,
        agent_type: AgentType,
        resolver: Arc<dyn NamespaceResolver>,
    ) -> Self {
        self.resolvers.insert(agent_type, resolver);
        self
    }
}

impl NamespaceDirectory for StaticNamespaceDirectory {
    fn resolve_namespace(&self, agent_type: AgentType) -> Option<Arc<dyn NamespaceResolver>> {
        self.resolvers.get(&agent_type).cloned()
    }
}

/// A [`NamespaceResolver`] that addresses every agent of a type at
/// `{base_url}/agents/{agent_id}/message`, the convention the original
/// source used (spec §6).
pub struct HttpNamespaceResolver {
    base_url: String,
}

impl HttpNamespaceResolver {
    /// A resolver rooted at `base_url` (no trailing slash expected).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl NamespaceResolver for HttpNamespaceResolver {
    fn endpoint(&self, agent_id: &str) -> String {
        format!("{}/agents/{agent_id}/message", self.base_url)
    }
}
