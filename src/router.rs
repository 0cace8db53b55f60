//! Router (C7): resolves abstract targets to a concrete agent via
//! round-robin among active agents of that type.

use thiserror::Error;

use crate::directory;
use crate::domain::{AgentId, AgentType, Message, ParsedTarget, RegistryState, parse_target};

/// Errors this component raises directly (before they are folded into
/// [`crate::error::CoreError`] at the operator boundary).
#[derive(Debug, Error)]
pub enum RouterError {
    /// The target's `type:`/`role:` suffix does not name a known
    /// [`AgentType`].
    #[error("unknown agent type: {0}")]
    UnknownAgentType(String),
    /// No active agent of the requested type exists and the caller did
    /// not allow an unresolved result.
    #[error("no active agents of type: {0}")]
    NoAgentsOfType(AgentType),
}

const ROUTED_TYPE_HEADER: &str = "x-routed-type";

/// Ordered, stable candidate pool for `agent_type`: agents of that type,
/// preferring active ones, falling back to the full candidate set if none
/// are active, ordered by registration order.
fn candidate_pool(
    state: &RegistryState,
    agent_type: AgentType,
    now_ms: i64,
    heartbeat_stale_ms: i64,
) -> Vec<AgentId> {
    let mut of_type: Vec<&crate::domain::AgentRecord> = state
        .agents
        .values()
        .filter(|r| r.agent_type == agent_type)
        .collect();
    of_type.sort_unstable_by_key(|r| r.registered_seq);

    let active: Vec<&crate::domain::AgentRecord> = of_type
        .iter()
        .copied()
        .filter(|r| directory::is_active(r, now_ms, heartbeat_stale_ms))
        .collect();

    let pool = if active.is_empty() { of_type } else { active };
    pool.into_iter().map(|r| r.id.clone()).collect()
}

/// Select the next agent of `agent_type` by round-robin, advancing
/// `routing_state[agent_type]`. Returns `None` if the candidate pool is
/// empty.
fn select(
    state: &mut RegistryState,
    agent_type: AgentType,
    now_ms: i64,
    heartbeat_stale_ms: i64,
) -> Option<AgentId> {
    let pool = candidate_pool(state, agent_type, now_ms, heartbeat_stale_ms);
    if pool.is_empty() {
        return None;
    }
    #[allow(clippy::cast_sign_loss)]
    let cursor = *state.routing_state.get(&agent_type).unwrap_or(&0) as usize;
    let index = cursor % pool.len();
    let selected = pool[index].clone();
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    let next_cursor = ((index + 1) % pool.len()) as i32;
    state.routing_state.insert(agent_type, next_cursor);
    Some(selected)
}

/// Rewrite `message.target` if it is abstract, per spec §4.7.
///
/// Concrete targets pass through unchanged. An abstract target that names
/// an unknown type is always an error. An abstract target with an empty
/// candidate pool is an error unless `allow_unresolved` is set, in which
/// case the message is returned unchanged so the dispatcher can retry it
/// later.
///
/// # Errors
/// See [`RouterError`].
pub fn resolve(
    state: &mut RegistryState,
    mut message: Message,
    allow_unresolved: bool,
    now_ms: i64,
    heartbeat_stale_ms: i64,
) -> Result<Message, RouterError> {
    let parsed = parse_target(&message.target)
        .map_err(RouterError::UnknownAgentType)?;
    let ParsedTarget::Abstract(agent_type) = parsed else {
        return Ok(message);
    };

    match select(state, agent_type, now_ms, heartbeat_stale_ms) {
        Some(agent_id) => {
            message.target = agent_id.to_string();
            message
                .headers
                .insert(ROUTED_TYPE_HEADER.to_string(), agent_type.to_string());
            Ok(message)
        }
        None if allow_unresolved => Ok(message),
        None => Err(RouterError::NoAgentsOfType(agent_type)),
    }
}

/// The next `n` agents the router would pick for `agent_type`, without
/// mutating `routing_state`.
#[must_use]
pub fn preview(
    state: &RegistryState,
    agent_type: AgentType,
    n: usize,
    now_ms: i64,
    heartbeat_stale_ms: i64,
) -> Vec<AgentId> {
    let pool = candidate_pool(state, agent_type, now_ms, heartbeat_stale_ms);
    if pool.is_empty() {
        return Vec::new();
    }
    #[allow(clippy::cast_sign_loss)]
    let cursor = *state.routing_state.get(&agent_type).unwrap_or(&0) as usize;
    (0..n)
        .map(|offset| pool[(cursor + offset) % pool.len()].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentStatus, MessageType};
    use std::collections::{HashMap, HashSet};

    fn agent(id: &str, agent_type: AgentType, seq: u64) -> crate::domain::AgentRecord {
        crate::domain::AgentRecord {
            id: AgentId::try_new(id.to_string()).unwrap(),
            agent_type,
            status: AgentStatus::Active,
            last_heartbeat_ms: 0,
            capabilities: HashSet::new(),
            metrics: HashMap::new(),
            registered_seq: seq,
        }
    }

    fn message(target: &str) -> Message {
        Message {
            id: "m1".to_string(),
            source: "scout-1".to_string(),
            target: target.to_string(),
            message_type: MessageType::Command,
            topic: "analyze_signals".to_string(),
            payload: serde_json::json!({}),
            timestamp_ms: 0,
            correlation_id: None,
            reply_to: None,
            priority: None,
            ttl_ms: None,
            headers: HashMap::new(),
        }
    }

    #[test]
    fn resolve_passes_through_concrete_targets() {
        let mut state = RegistryState::new();
        let resolved = resolve(&mut state, message("analyst-1"), false, 0, 300_000).unwrap();
        assert_eq!(resolved.target, "analyst-1");
    }

    #[test]
    fn resolve_rejects_unknown_type() {
        let mut state = RegistryState::new();
        assert!(resolve(&mut state, message("type:wizard"), true, 0, 300_000).is_err());
    }

    #[test]
    fn resolve_round_robins_across_active_agents() {
        let mut state = RegistryState::new();
        state.agents.insert("analyst-1".to_string(), agent("analyst-1", AgentType::Analyst, 0));
        state.agents.insert("analyst-2".to_string(), agent("analyst-2", AgentType::Analyst, 1));

        let first = resolve(&mut state, message("type:analyst"), false, 0, 300_000).unwrap();
        let second = resolve(&mut state, message("type:analyst"), false, 0, 300_000).unwrap();
        assert_eq!(first.target, "analyst-1");
        assert_eq!(second.target, "analyst-2");
        assert_eq!(
            first.headers.get("x-routed-type").map(String::as_str),
            Some("analyst")
        );
    }

    #[test]
    fn resolve_empty_pool_fails_unless_allowed() {
        let mut state = RegistryState::new();
        assert!(resolve(&mut state, message("type:analyst"), false, 0, 300_000).is_err());
        let unchanged =
            resolve(&mut state, message("type:analyst"), true, 0, 300_000).unwrap();
        assert_eq!(unchanged.target, "type:analyst");
    }

    #[test]
    fn preview_does_not_mutate_cursor() {
        let mut state = RegistryState::new();
        state.agents.insert("analyst-1".to_string(), agent("analyst-1", AgentType::Analyst, 0));
        state.agents.insert("analyst-2".to_string(), agent("analyst-2", AgentType::Analyst, 1));

        let preview = preview(&state, AgentType::Analyst, 5, 0, 300_000);
        let ids: Vec<String> = preview.iter().map(ToString::to_string).collect();
        assert_eq!(
            ids,
            vec!["analyst-1", "analyst-2", "analyst-1", "analyst-2", "analyst-1"]
        );

        let mut state = state;
        let routed = resolve(&mut state, message("type:analyst"), false, 0, 300_000).unwrap();
        assert_eq!(routed.target, "analyst-1");
    }
}
