//! Operator Interface (C10): the one surface external callers use. Every
//! method here is a thin, clamping wrapper around a core component
//! function; no operation here does its own domain logic.
//!
//! Grounded on the teacher's `AgentLifecycleManager`/`MessageRouter`
//! public-trait idiom (`agent_lifecycle_manager.rs`,
//! `message_router/mod.rs`): a single `#[async_trait]` surface the rest of
//! the system programs against, implemented by one concrete aggregate
//! ([`crate::shard::Shard`]).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dispatcher::DispatchResult;
use crate::directory::PruneResult;
use crate::domain::{AgentId, AgentRecord, AgentStatus, AgentType, DeliveryStats, Message};
use crate::error::CoreResult;
use crate::queue::RequeueResult;
use crate::telemetry::TelemetrySnapshot;

/// A point-in-time view of queue occupancy (spec §4.10 `queue_state`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStateSnapshot {
    /// Entries waiting for a poll/dispatch pass.
    pub pending: usize,
    /// Entries parked in the dead letter area.
    pub dead_lettered: usize,
    /// Lifetime delivery counters.
    pub delivery_stats: DeliveryStats,
}

/// A point-in-time operational summary (spec §4.10 `health`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Agents currently known to the directory.
    pub known_agents: usize,
    /// Of those, how many are active by the heartbeat-staleness predicate.
    pub active_agents: usize,
    /// See [`QueueStateSnapshot`].
    pub queue: QueueStateSnapshot,
    /// Wall time of the most recent dispatch pass, or `0` if none yet.
    pub last_dispatch_at_ms: i64,
    /// Deep copy of every counter/timer recorded so far.
    pub telemetry: TelemetrySnapshot,
}

/// The thirteen operations spec §4.10 exposes. Every limit/threshold
/// parameter is clamped to the configured bound rather than rejected when
/// a caller supplies something out of range or omits it.
#[async_trait]
pub trait OperatorInterface: Send + Sync {
    /// Register or update an agent (spec §4.4).
    ///
    /// # Errors
    /// [`crate::error::CoreError::InvalidInput`] if the agent id is empty.
    async fn register_agent(&self, record: AgentRecord) -> CoreResult<()>;

    /// Record a heartbeat, optionally updating status (spec §4.4).
    ///
    /// # Errors
    /// [`crate::error::CoreError::NotFound`] if the agent is unknown.
    async fn heartbeat(&self, agent_id: &str, status: Option<AgentStatus>) -> CoreResult<()>;

    /// Every known agent, keyed by id.
    async fn list_agents(&self) -> HashMap<String, AgentRecord>;

    /// Subscribe `agent_id` to `topic` (spec §4.5).
    async fn subscribe(&self, agent_id: &str, topic: &str) -> bool;

    /// Unsubscribe `agent_id` from `topic` (spec §4.5).
    async fn unsubscribe(&self, agent_id: &str, topic: &str) -> bool;

    /// Fan `payload` out to every current subscriber of `topic` as an
    /// EVENT message (spec §4.5). Returns the number of subscribers
    /// reached.
    async fn publish(&self, source: &str, topic: &str, payload: serde_json::Value) -> usize;

    /// Accept `message` into the queue (spec §4.6).
    ///
    /// `max_attempts`/`delay_ms`, if omitted, fall back to
    /// [`crate::config::RegistryConfig::max_attempts_default`]/`0`.
    ///
    /// # Errors
    /// See [`crate::queue::enqueue`].
    async fn enqueue(
        &self,
        message: Message,
        delay_ms: Option<i64>,
        max_attempts: Option<i32>,
    ) -> CoreResult<String>;

    /// Pull up to `limit` (clamped to
    /// [`crate::config::RegistryConfig::poll_max_limit`]) due messages
    /// addressed to `agent_id` (spec §4.6).
    async fn poll(&self, agent_id: &str, limit: Option<usize>) -> Vec<Message>;

    /// Run one dispatch pass over up to `limit` (clamped to
    /// [`crate::config::RegistryConfig::dispatch_max_limit`], defaulting to
    /// [`crate::config::RegistryConfig::dispatch_default_limit`]) messages
    /// (spec §4.8).
    async fn dispatch(&self, limit: Option<usize>) -> DispatchResult;

    /// Current queue occupancy and lifetime counters (spec §4.10).
    async fn queue_state(&self) -> QueueStateSnapshot;

    /// The next `n` agents the router would hand work to for `agent_type`,
    /// without mutating the routing cursor (spec §4.7).
    async fn routing_preview(&self, agent_type: AgentType, n: usize) -> Vec<AgentId>;

    /// Re-enqueue up to `limit` (clamped to
    /// [`crate::config::RegistryConfig::requeue_max_limit`]) dead-letter
    /// entries, oldest first (spec §4.6).
    async fn requeue_dead_letter(&self, limit: Option<usize>) -> RequeueResult;

    /// Remove agents stale by `stale_threshold_ms` (floored to
    /// [`crate::config::RegistryConfig::prune_min_stale_ms`], defaulting to
    /// 3x [`crate::config::RegistryConfig::heartbeat_stale_ms`]) (spec §4.4).
    async fn prune_stale_agents(&self, stale_threshold_ms: Option<i64>) -> PruneResult;

    /// An operational summary (spec §4.10).
    async fn health(&self) -> HealthSnapshot;
}
