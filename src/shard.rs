//! The Shard aggregate: owns the one [`RegistryState`] behind a
//! single-writer lock and composes every component module behind
//! [`OperatorInterface`].
//!
//! Grounded on the teacher's `Runtime`/`AgentLifecycleManager` aggregate
//! pattern (`runtime.rs`, `agent_lifecycle_manager.rs`): one struct holding
//! every collaborator as a trait object behind an `Arc`, a single mutex
//! around the mutable state, and async methods that lock, call a free
//! function, and unlock — never holding the lock across an awaited I/O
//! call except the dispatcher's own outbound POSTs, which the spec
//! requires to happen with the state lock held (spec §5: single writer,
//! no overlapping dispatch/poll/enqueue passes).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::directory::{self, PruneResult};
use crate::dispatcher::{self, DeliveryClient, DispatchResult};
use crate::domain::{AgentId, AgentRecord, AgentStatus, AgentType, Message, RegistryState};
use crate::error::CoreResult;
use crate::maintenance::{self, MaintenanceDeps};
use crate::namespace::NamespaceDirectory;
use crate::operator::{HealthSnapshot, OperatorInterface, QueueStateSnapshot};
use crate::queue::{self, EnqueueOptions, RequeueResult};
use crate::router;
use crate::store::StateStore;
use crate::subscriptions;
use crate::telemetry::Telemetry;
use crate::time::Clock;

/// The per-shard aggregate. Cheap to clone (every field is an `Arc`),
/// so a handle can be held by the maintenance loop and by however many
/// transport adapters a deployment wires up, all pointing at the same
/// underlying state.
#[derive(Clone)]
pub struct Shard {
    state: Arc<Mutex<RegistryState>>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<Telemetry>,
    namespaces: Arc<dyn NamespaceDirectory>,
    delivery: Arc<dyn DeliveryClient>,
    store: Arc<dyn StateStore>,
    config: RegistryConfig,
    self_id: Option<String>,
}

impl Shard {
    /// Build a shard by loading its persisted state (or a fresh one if
    /// none exists yet) from `store`.
    ///
    /// `self_id`, if given, is the shard's own registry-type agent id,
    /// used so a self-registration attempt is recognised as a no-op
    /// (spec §9).
    ///
    /// # Errors
    /// Propagates [`crate::store::StoreError`] if the initial load fails.
    pub async fn load(
        clock: Arc<dyn Clock>,
        telemetry: Arc<Telemetry>,
        namespaces: Arc<dyn NamespaceDirectory>,
        delivery: Arc<dyn DeliveryClient>,
        store: Arc<dyn StateStore>,
        config: RegistryConfig,
        self_id: Option<String>,
    ) -> Result<Self, crate::store::StoreError> {
        let state = store.load().await?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            clock,
            telemetry,
            namespaces,
            delivery,
            store,
            config,
            self_id,
        })
    }

    /// Spawn this shard's maintenance loop (spec §4.9). The returned
    /// handle runs forever; see [`maintenance::spawn`].
    pub fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        maintenance::spawn(
            self.state.clone(),
            MaintenanceDeps {
                clock: self.clock.clone(),
                telemetry: self.telemetry.clone(),
                namespaces: self.namespaces.clone(),
                delivery: self.delivery.clone(),
                store: self.store.clone(),
                config: self.config.clone(),
            },
        )
    }

    /// Access the telemetry registry directly, e.g. to expose it on a
    /// metrics endpoint a transport adapter bolts on separately.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    fn heartbeat_stale_ms(&self) -> i64 {
        u64::from(self.config.heartbeat_stale_ms) as i64
    }

    async fn persist(&self, state: &RegistryState) {
        if let Err(e) = self.store.save(state).await {
            self.telemetry.increment(
                "maintenance_errors_total",
                1.0,
                &[("reason", "persist_failed")],
            );
            warn!("Failed to persist shard state: {e}");
        }
    }
}

#[async_trait]
impl OperatorInterface for Shard {
    async fn register_agent(&self, record: AgentRecord) -> CoreResult<()> {
        debug!("Registering agent: {}", record.id.as_ref());
        let now = self.clock.now_ms();
        let mut guard = self.state.lock().await;
        directory::register(&mut guard, record, now, self.self_id.as_deref())?;
        self.persist(&guard).await;
        Ok(())
    }

    async fn heartbeat(&self, agent_id: &str, status: Option<AgentStatus>) -> CoreResult<()> {
        debug!("Heartbeat from agent: {agent_id}");
        let now = self.clock.now_ms();
        let mut guard = self.state.lock().await;
        directory::heartbeat(&mut guard, agent_id, status, now)?;
        self.persist(&guard).await;
        Ok(())
    }

    async fn list_agents(&self) -> HashMap<String, AgentRecord> {
        let guard = self.state.lock().await;
        directory::list(&guard)
    }

    async fn subscribe(&self, agent_id: &str, topic: &str) -> bool {
        debug!("Subscribing {agent_id} to topic {topic}");
        let mut guard = self.state.lock().await;
        let changed = subscriptions::subscribe(&mut guard, agent_id, topic);
        if changed {
            self.persist(&guard).await;
        }
        changed
    }

    async fn unsubscribe(&self, agent_id: &str, topic: &str) -> bool {
        debug!("Unsubscribing {agent_id} from topic {topic}");
        let mut guard = self.state.lock().await;
        let changed = subscriptions::unsubscribe(&mut guard, agent_id, topic);
        if changed {
            self.persist(&guard).await;
        }
        changed
    }

    async fn publish(&self, source: &str, topic: &str, payload: serde_json::Value) -> usize {
        debug!("Publishing to topic {topic} from {source}");
        let heartbeat_stale_ms = self.heartbeat_stale_ms();
        let mut guard = self.state.lock().await;
        let fanned_out =
            subscriptions::publish(&mut guard, self.clock.as_ref(), source, topic, payload, heartbeat_stale_ms);
        if fanned_out > 0 {
            self.persist(&guard).await;
        }
        fanned_out
    }

    async fn enqueue(
        &self,
        message: Message,
        delay_ms: Option<i64>,
        max_attempts: Option<i32>,
    ) -> CoreResult<String> {
        debug!("Enqueuing message {} for target {}", message.id, message.target);
        let heartbeat_stale_ms = self.heartbeat_stale_ms();
        let options = EnqueueOptions {
            delay_ms: delay_ms.unwrap_or(0),
            max_attempts: max_attempts.unwrap_or(i32::from(self.config.max_attempts_default)),
        };
        let mut guard = self.state.lock().await;
        let queued = queue::enqueue(&mut guard, self.clock.as_ref(), message, options, heartbeat_stale_ms)?;
        self.persist(&guard).await;
        Ok(queued.queue_id)
    }

    async fn poll(&self, agent_id: &str, limit: Option<usize>) -> Vec<Message> {
        debug!("Polling queue for agent {agent_id}");
        let cap = u32::from(self.config.poll_max_limit) as usize;
        let limit = limit.unwrap_or(cap).min(cap);
        let now = self.clock.now_ms();
        let mut guard = self.state.lock().await;
        let messages = queue::poll(&mut guard, agent_id, limit, now);
        if !messages.is_empty() {
            self.persist(&guard).await;
        }
        messages
    }

    async fn dispatch(&self, limit: Option<usize>) -> DispatchResult {
        debug!("Running operator-triggered dispatch pass");
        let cap = u32::from(self.config.dispatch_max_limit) as usize;
        let default = u32::from(self.config.dispatch_default_limit) as usize;
        let limit = limit.unwrap_or(default).min(cap);
        let heartbeat_stale_ms = self.heartbeat_stale_ms();
        let backoff_cap_ms = u64::from(self.config.backoff_cap_ms) as i64;
        let delivery_timeout_ms = u64::from(self.config.delivery_timeout_ms);

        let mut guard = self.state.lock().await;
        let result = dispatcher::dispatch(
            &mut guard,
            self.clock.as_ref(),
            &self.telemetry,
            self.namespaces.as_ref(),
            self.delivery.as_ref(),
            limit,
            heartbeat_stale_ms,
            backoff_cap_ms,
            delivery_timeout_ms,
        )
        .await;
        self.persist(&guard).await;
        result
    }

    async fn queue_state(&self) -> QueueStateSnapshot {
        let guard = self.state.lock().await;
        QueueStateSnapshot {
            pending: guard.queue_order.len(),
            dead_lettered: guard.dead_letter.len(),
            delivery_stats: guard.delivery_stats,
        }
    }

    async fn routing_preview(&self, agent_type: AgentType, n: usize) -> Vec<AgentId> {
        let now = self.clock.now_ms();
        let heartbeat_stale_ms = self.heartbeat_stale_ms();
        let guard = self.state.lock().await;
        router::preview(&guard, agent_type, n, now, heartbeat_stale_ms)
    }

    async fn requeue_dead_letter(&self, limit: Option<usize>) -> RequeueResult {
        debug!("Requeuing dead-lettered messages");
        let cap = u32::from(self.config.requeue_max_limit) as usize;
        let limit = limit.unwrap_or(cap).min(cap);
        let heartbeat_stale_ms = self.heartbeat_stale_ms();
        let mut guard = self.state.lock().await;
        let result = queue::requeue_dead_letter(&mut guard, self.clock.as_ref(), limit, heartbeat_stale_ms);
        if result.requeued > 0 {
            info!("Requeued {} dead-lettered message(s), {} remaining", result.requeued, result.remaining);
            self.persist(&guard).await;
        }
        result
    }

    async fn prune_stale_agents(&self, stale_threshold_ms: Option<i64>) -> PruneResult {
        debug!("Pruning stale agents");
        let floor = u64::from(self.config.prune_min_stale_ms) as i64;
        let threshold = stale_threshold_ms.unwrap_or(self.heartbeat_stale_ms() * 3).max(floor);
        let now = self.clock.now_ms();
        let mut guard = self.state.lock().await;
        let result = directory::prune_stale(&mut guard, threshold, now);
        if result.removed > 0 {
            info!("Pruned {} stale agent(s), {} remaining", result.removed, result.remaining);
            self.persist(&guard).await;
        }
        result
    }

    async fn health(&self) -> HealthSnapshot {
        let now = self.clock.now_ms();
        let heartbeat_stale_ms = self.heartbeat_stale_ms();
        let guard = self.state.lock().await;
        let known_agents = guard.agents.len();
        let active_agents = guard
            .agents
            .values()
            .filter(|a| directory::is_active(a, now, heartbeat_stale_ms))
            .count();
        HealthSnapshot {
            known_agents,
            active_agents,
            queue: QueueStateSnapshot {
                pending: guard.queue_order.len(),
                dead_lettered: guard.dead_letter.len(),
                delivery_stats: guard.delivery_stats,
            },
            last_dispatch_at_ms: guard.last_dispatch_at_ms,
            telemetry: self.telemetry.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::{NamespaceResolver, StaticNamespaceDirectory};
    use crate::store::InMemoryStateStore;
    use crate::time::MockClock;
    use std::collections::{HashMap as Map, HashSet};

    struct AlwaysOkDelivery;
    #[async_trait]
    impl DeliveryClient for AlwaysOkDelivery {
        async fn post_json(&self, _url: &str, _message: &Message, _timeout_ms: u64) -> Result<u16, String> {
            Ok(200)
        }
    }

    struct FixedResolver;
    impl NamespaceResolver for FixedResolver {
        fn endpoint(&self, agent_id: &str) -> String {
            format!("http://local/{agent_id}")
        }
    }

    async fn test_shard() -> Shard {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new(0));
        Shard::load(
            clock,
            Arc::new(Telemetry::new()),
            Arc::new(
                StaticNamespaceDirectory::new()
                    .with_resolver(AgentType::Analyst, Arc::new(FixedResolver)),
            ),
            Arc::new(AlwaysOkDelivery),
            Arc::new(InMemoryStateStore::new()),
            RegistryConfig::testing(),
            Some("shard-self".to_string()),
        )
        .await
        .unwrap()
    }

    fn agent(id: &str) -> AgentRecord {
        AgentRecord {
            id: crate::domain::AgentId::try_new(id.to_string()).unwrap(),
            agent_type: AgentType::Analyst,
            status: AgentStatus::Active,
            last_heartbeat_ms: 0,
            capabilities: HashSet::new(),
            metrics: Map::new(),
            registered_seq: 0,
        }
    }

    fn message(target: &str) -> Message {
        Message {
            id: "m1".to_string(),
            source: "scout-1".to_string(),
            target: target.to_string(),
            message_type: crate::domain::MessageType::Command,
            topic: "t".to_string(),
            payload: serde_json::json!({}),
            timestamp_ms: 0,
            correlation_id: None,
            reply_to: None,
            priority: None,
            ttl_ms: None,
            headers: Map::new(),
        }
    }

    #[tokio::test]
    async fn register_then_poll_then_dispatch_round_trips() {
        let shard = test_shard().await;
        shard.register_agent(agent("analyst-1")).await.unwrap();
        shard.enqueue(message("analyst-1"), None, None).await.unwrap();

        let result = shard.dispatch(None).await;
        assert_eq!(result.delivered, 1);

        let state = shard.queue_state().await;
        assert_eq!(state.pending, 0);
        assert_eq!(state.delivery_stats.delivered, 1);
    }

    #[tokio::test]
    async fn self_registration_leaves_agent_list_empty() {
        let shard = test_shard().await;
        let mut record = agent("shard-self");
        record.agent_type = AgentType::Registry;
        shard.register_agent(record).await.unwrap();
        assert!(shard.list_agents().await.is_empty());
    }

    #[tokio::test]
    async fn publish_fanout_reaches_subscribers() {
        let shard = test_shard().await;
        shard.subscribe("analyst-1", "signals").await;
        let n = shard.publish("scout-1", "signals", serde_json::json!({"v": 1})).await;
        assert_eq!(n, 1);

        let polled = shard.poll("analyst-1", None).await;
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].topic, "signals");
    }

    #[tokio::test]
    async fn health_reports_known_and_active_agents() {
        let shard = test_shard().await;
        shard.register_agent(agent("analyst-1")).await.unwrap();
        let health = shard.health().await;
        assert_eq!(health.known_agents, 1);
        assert_eq!(health.active_agents, 1);
    }
}
