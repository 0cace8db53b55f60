//! Agent Directory (C4): membership, heartbeats, staleness pruning.
//!
//! Implemented as free functions over `&mut RegistryState` rather than a
//! separate owned map, following the functional-core split the teacher
//! documents in `storage.rs`: this component's "storage" is just a field
//! of the one persistent [`RegistryState`], so there is no second copy to
//! keep in sync.

use crate::domain::{AgentRecord, AgentStatus, AgentType, RegistryState};
use crate::error::{CoreError, CoreResult};

/// An agent is active for delivery iff its last heartbeat is within
/// `heartbeat_stale_ms` of `now_ms`.
#[must_use]
pub fn is_active(record: &AgentRecord, now_ms: i64, heartbeat_stale_ms: i64) -> bool {
    now_ms.saturating_sub(record.last_heartbeat_ms) <= heartbeat_stale_ms
}

/// Upsert `record` by id. `last_heartbeat_ms` is always set to `now_ms`
/// regardless of what the caller supplied; `status` is preserved as given
/// (default `Active` is the caller's job to set before calling this).
///
/// The registry never registers itself: a record whose `agent_type` is
/// [`AgentType::Registry`] and whose id equals `self_id` is silently
/// accepted as a no-op success (spec §9 "Cyclic graphs / self-registration").
///
/// # Errors
/// [`CoreError::InvalidInput`] if `record.id` is empty.
pub fn register(
    state: &mut RegistryState,
    mut record: AgentRecord,
    now_ms: i64,
    self_id: Option<&str>,
) -> CoreResult<()> {
    let id = record.id.to_string();
    if id.trim().is_empty() {
        return Err(CoreError::invalid_input("agent id must not be empty"));
    }
    if record.agent_type == AgentType::Registry && self_id == Some(id.as_str()) {
        return Ok(());
    }
    record.last_heartbeat_ms = now_ms;
    record.registered_seq = match state.agents.get(&id) {
        Some(existing) => existing.registered_seq,
        None => {
            let seq = state.next_agent_seq;
            state.next_agent_seq += 1;
            seq
        }
    };
    state
        .routing_state
        .entry(record.agent_type)
        .or_insert(0);
    state.agents.insert(id, record);
    Ok(())
}

/// Update `agent_id`'s heartbeat to `now_ms`, and its status if `status`
/// is `Some`.
///
/// # Errors
/// [`CoreError::NotFound`] if no such agent is registered.
pub fn heartbeat(
    state: &mut RegistryState,
    agent_id: &str,
    status: Option<AgentStatus>,
    now_ms: i64,
) -> CoreResult<()> {
    let record = state
        .agents
        .get_mut(agent_id)
        .ok_or_else(|| CoreError::not_found(format!("no such agent: {agent_id}")))?;
    record.last_heartbeat_ms = now_ms;
    if let Some(status) = status {
        record.status = status;
    }
    Ok(())
}

/// Result of a pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneResult {
    /// Agents removed in this call.
    pub removed: usize,
    /// Agents remaining afterwards.
    pub remaining: usize,
}

/// Remove every agent whose heartbeat is older than `stale_threshold_ms`,
/// and drop them from every subscription list. Idempotent: a second call
/// with nothing newly stale returns `removed: 0`.
pub fn prune_stale(state: &mut RegistryState, stale_threshold_ms: i64, now_ms: i64) -> PruneResult {
    let stale_ids: Vec<String> = state
        .agents
        .iter()
        .filter(|(_, record)| {
            now_ms.saturating_sub(record.last_heartbeat_ms) > stale_threshold_ms
        })
        .map(|(id, _)| id.clone())
        .collect();

    for id in &stale_ids {
        state.agents.remove(id);
        state.subscriptions.retain(|_, subscribers| {
            subscribers.retain(|s| s != id);
            !subscribers.is_empty()
        });
    }

    PruneResult {
        removed: stale_ids.len(),
        remaining: state.agents.len(),
    }
}

/// A stable snapshot of every known agent, keyed by id.
#[must_use]
pub fn list(state: &RegistryState) -> std::collections::HashMap<String, AgentRecord> {
    state.agents.clone()
}
