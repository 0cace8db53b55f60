//! Subscription Index (C5): topic to ordered subscriber list, and the
//! publish fanout helper.

use crate::domain::{Message, MessageType, RegistryState};
use crate::queue::{self, EnqueueOptions};
use crate::time::Clock;

/// Append `agent_id` to `subscriptions[topic]` if not already present.
/// An empty id or topic is rejected silently (`false`, no error — spec §4.5).
pub fn subscribe(state: &mut RegistryState, agent_id: &str, topic: &str) -> bool {
    if agent_id.trim().is_empty() || topic.trim().is_empty() {
        return false;
    }
    let subscribers = state.subscriptions.entry(topic.to_string()).or_default();
    if subscribers.iter().any(|s| s == agent_id) {
        return false;
    }
    subscribers.push(agent_id.to_string());
    true
}

/// Remove `agent_id` from `subscriptions[topic]`; drops the topic entirely
/// once its subscriber list is empty.
pub fn unsubscribe(state: &mut RegistryState, agent_id: &str, topic: &str) -> bool {
    let Some(subscribers) = state.subscriptions.get_mut(topic) else {
        return false;
    };
    let before = subscribers.len();
    subscribers.retain(|s| s != agent_id);
    let removed = subscribers.len() != before;
    if subscribers.is_empty() {
        state.subscriptions.remove(topic);
    }
    removed
}

/// Fan an EVENT message out to every current subscriber of `topic`.
///
/// The subscriber list is snapshotted before any enqueue happens, so an
/// agent that subscribes mid-publish is unaffected either way and
/// ordering across subscribers matches the list order at call time.
#[must_use]
pub fn publish(
    state: &mut RegistryState,
    clock: &dyn Clock,
    source: &str,
    topic: &str,
    payload: serde_json::Value,
    heartbeat_stale_ms: i64,
) -> usize {
    let subscribers: Vec<String> = state
        .subscriptions
        .get(topic)
        .cloned()
        .unwrap_or_default();

    let mut enqueued = 0;
    for agent_id in subscribers {
        let message = Message {
            id: clock.new_id("msg"),
            source: source.to_string(),
            target: agent_id,
            message_type: MessageType::Event,
            topic: topic.to_string(),
            payload: payload.clone(),
            timestamp_ms: clock.now_ms(),
            correlation_id: None,
            reply_to: None,
            priority: None,
            ttl_ms: None,
            headers: std::collections::HashMap::new(),
        };
        if queue::enqueue(state, clock, message, EnqueueOptions::default(), heartbeat_stale_ms)
            .is_ok()
        {
            enqueued += 1;
        }
    }
    enqueued
}
