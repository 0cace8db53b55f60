//! Shared fixtures for the scenario integration tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use swarm_registry::config::RegistryConfig;
use swarm_registry::dispatcher::DeliveryClient;
use swarm_registry::domain::{
    AgentId, AgentRecord, AgentStatus, AgentType, Message, MessageType,
};
use swarm_registry::namespace::{NamespaceDirectory, NamespaceResolver, StaticNamespaceDirectory};
use swarm_registry::shard::Shard;
use swarm_registry::store::InMemoryStateStore;
use swarm_registry::telemetry::Telemetry;
use swarm_registry::time::{Clock, MockClock};

/// Records every `(url, message_id)` delivery attempt and answers with a
/// queued sequence of canned responses, defaulting to `200 OK` once the
/// queue runs dry.
pub struct RecordingDeliveryClient {
    responses: Mutex<VecDeque<Result<u16, String>>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl RecordingDeliveryClient {
    #[must_use]
    pub fn new(responses: Vec<Result<u16, String>>) -> Self {
        Self { responses: Mutex::new(responses.into()), calls: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl DeliveryClient for RecordingDeliveryClient {
    async fn post_json(&self, url: &str, message: &Message, _timeout_ms: u64) -> Result<u16, String> {
        self.calls.lock().unwrap().push((url.to_string(), message.id.clone()));
        self.responses.lock().unwrap().pop_front().unwrap_or(Ok(200))
    }
}

/// A resolver that addresses every agent at `{base}/{agent_id}`.
pub struct FixedResolver(pub String);

impl NamespaceResolver for FixedResolver {
    fn endpoint(&self, agent_id: &str) -> String {
        format!("{}/{agent_id}", self.0)
    }
}

/// Build a shard wired with a testing config, a [`MockClock`] starting at
/// `start_ms`, an in-memory store, and analyst deliveries routed to
/// `delivery` through a single fixed resolver.
pub async fn shard_with_delivery(
    start_ms: i64,
    delivery: Arc<dyn DeliveryClient>,
) -> (Shard, Arc<MockClock>) {
    let clock = Arc::new(MockClock::new(start_ms));
    let namespaces: Arc<dyn NamespaceDirectory> = Arc::new(
        StaticNamespaceDirectory::new()
            .with_resolver(AgentType::Analyst, Arc::new(FixedResolver("http://analysts".to_string()))),
    );
    let shard = Shard::load(
        clock.clone() as Arc<dyn Clock>,
        Arc::new(Telemetry::new()),
        namespaces,
        delivery,
        Arc::new(InMemoryStateStore::new()),
        RegistryConfig::testing(),
        Some("shard-self".to_string()),
    )
    .await
    .unwrap();
    (shard, clock)
}

/// A shard with no configured namespace resolver at all, so any dispatch
/// attempt to any agent type fails with `namespace_missing`.
pub async fn shard_without_namespace(start_ms: i64) -> (Shard, Arc<MockClock>) {
    let clock = Arc::new(MockClock::new(start_ms));
    let shard = Shard::load(
        clock.clone() as Arc<dyn Clock>,
        Arc::new(Telemetry::new()),
        Arc::new(StaticNamespaceDirectory::new()),
        Arc::new(RecordingDeliveryClient::new(vec![])),
        Arc::new(InMemoryStateStore::new()),
        RegistryConfig::testing(),
        Some("shard-self".to_string()),
    )
    .await
    .unwrap();
    (shard, clock)
}

#[must_use]
pub fn agent(id: &str, agent_type: AgentType) -> AgentRecord {
    AgentRecord {
        id: AgentId::try_new(id.to_string()).unwrap(),
        agent_type,
        status: AgentStatus::Active,
        last_heartbeat_ms: 0,
        capabilities: HashSet::new(),
        metrics: HashMap::new(),
        registered_seq: 0,
    }
}

#[must_use]
pub fn message(target: &str, topic: &str) -> Message {
    Message {
        id: format!("msg-{target}-{topic}"),
        source: "scout-1".to_string(),
        target: target.to_string(),
        message_type: MessageType::Command,
        topic: topic.to_string(),
        payload: serde_json::json!({}),
        timestamp_ms: 0,
        correlation_id: None,
        reply_to: None,
        priority: None,
        ttl_ms: None,
        headers: HashMap::new(),
    }
}
