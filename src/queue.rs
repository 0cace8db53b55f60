//! Queue Engine (C6): FIFO-by-enqueue message queue with availability
//! time, attempts, TTL, and the dead-letter area.

use crate::domain::{Message, QueueStatus, QueuedMessage, RegistryState};
use crate::error::{CoreError, CoreResult};
use crate::router;
use crate::time::Clock;

/// Reason recorded on a dead-lettered entry when its TTL elapsed before
/// it could be polled.
pub const EXPIRED_BEFORE_POLL: &str = "Message expired before poll";
/// Reason recorded on a dead-lettered entry when its TTL elapsed before
/// a dispatch pass reached it.
pub const EXPIRED_BEFORE_DISPATCH: &str = "Message expired before dispatch";

/// Options accepted by [`enqueue`], mirroring the operator-facing
/// `enqueue` contract (spec §4.10) minus the already-resolved
/// `max_attempts` default (that default is the operator layer's job;
/// see [`crate::config::RegistryConfig::max_attempts_default`]).
#[derive(Debug, Clone, Copy)]
pub struct EnqueueOptions {
    /// Milliseconds to delay availability after enqueue; negative values
    /// are clamped to zero.
    pub delay_ms: i64,
    /// Attempts allowed before dead-lettering; values below 1 are clamped
    /// to 1 (spec §8 boundary behavior).
    pub max_attempts: i32,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self { delay_ms: 0, max_attempts: 3 }
    }
}

fn validate_message(message: &Message) -> CoreResult<()> {
    if message.id.trim().is_empty() {
        return Err(CoreError::invalid_input("message id must not be empty"));
    }
    if message.source.trim().is_empty() {
        return Err(CoreError::invalid_input("message source must not be empty"));
    }
    if message.target.trim().is_empty() {
        return Err(CoreError::invalid_input("message target must not be empty"));
    }
    if message.topic.trim().is_empty() {
        return Err(CoreError::invalid_input("message topic must not be empty"));
    }
    // timestamp_ms is i64, not a float, so it is always finite; the spec's
    // "finite timestamp_ms" validation bullet has no corresponding check here.
    Ok(())
}

/// Accept `message` into the queue (spec §4.6).
///
/// An abstract target is resolved eagerly with `allow_unresolved = false`:
/// an abstract target naming a type with no agents is rejected rather
/// than stored (invariant 3).
///
/// # Errors
/// [`CoreError::InvalidInput`] on a malformed message or unknown agent
/// type in an abstract target; [`CoreError::Unavailable`] if an abstract
/// target cannot be resolved.
pub fn enqueue(
    state: &mut RegistryState,
    clock: &dyn Clock,
    message: Message,
    options: EnqueueOptions,
    heartbeat_stale_ms: i64,
) -> CoreResult<QueuedMessage> {
    validate_message(&message)?;

    let now = clock.now_ms();
    let resolved = router::resolve(state, message, false, now, heartbeat_stale_ms)
        .map_err(|e| match e {
            router::RouterError::UnknownAgentType(t) => {
                CoreError::invalid_input(format!("unknown agent type: {t}"))
            }
            router::RouterError::NoAgentsOfType(t) => {
                CoreError::unavailable(format!("no active agents of type: {t}"))
            }
        })?;

    let queue_id = clock.new_id("qid");
    let queued = QueuedMessage {
        queue_id: queue_id.clone(),
        message: resolved,
        enqueued_at_ms: now,
        available_at_ms: now + options.delay_ms.max(0),
        attempts: 0,
        max_attempts: options.max_attempts.max(1),
        status: QueueStatus::Pending,
        last_error: None,
    };

    state.queue.insert(queue_id.clone(), queued.clone());
    state.queue_order.push_back(queue_id);
    state.delivery_stats.enqueued += 1;
    Ok(queued)
}

/// Scan `queue_order` for up to `limit` messages whose `target` is
/// `agent_id` and whose `available_at_ms` has passed, removing and
/// returning them in scan order. Expired entries encountered along the
/// way are dead-lettered instead of returned (spec §4.6).
#[must_use]
pub fn poll(
    state: &mut RegistryState,
    agent_id: &str,
    limit: usize,
    now_ms: i64,
) -> Vec<Message> {
    let limit = limit.max(1);
    let mut delivered = Vec::new();
    let mut remaining_order = std::collections::VecDeque::new();

    while let Some(qid) = state.queue_order.pop_front() {
        if delivered.len() >= limit {
            remaining_order.push_back(qid);
            continue;
        }
        let Some(entry) = state.queue.get(&qid) else {
            continue;
        };
        if entry.message.target != agent_id {
            remaining_order.push_back(qid);
            continue;
        }
        if entry.message.is_expired(now_ms) {
            let mut expired = state.queue.remove(&qid).expect("entry just looked up");
            expired.last_error = Some(EXPIRED_BEFORE_POLL.to_string());
            state.dead_letter.insert(qid, expired);
            state.delivery_stats.dead_lettered += 1;
            continue;
        }
        if entry.available_at_ms > now_ms {
            remaining_order.push_back(qid);
            continue;
        }
        let matched = state.queue.remove(&qid).expect("entry just looked up");
        state.delivery_stats.delivered += 1;
        delivered.push(matched.message);
    }

    state.queue_order = remaining_order;
    delivered
}

/// Result of a [`requeue_dead_letter`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueResult {
    /// Entries successfully re-enqueued.
    pub requeued: usize,
    /// Entries still in the dead letter area afterwards.
    pub remaining: usize,
}

/// Re-enqueue up to `limit` dead-letter entries, oldest (`enqueued_at_ms`)
/// first, with their original `max_attempts`. An entry that fails to
/// re-enqueue (still unroutable) stays in the DLQ.
pub fn requeue_dead_letter(
    state: &mut RegistryState,
    clock: &dyn Clock,
    limit: usize,
    heartbeat_stale_ms: i64,
) -> RequeueResult {
    let limit = limit.max(1);
    let mut candidates: Vec<(String, i64)> = state
        .dead_letter
        .iter()
        .map(|(qid, entry)| (qid.clone(), entry.enqueued_at_ms))
        .collect();
    candidates.sort_unstable_by_key(|(_, enqueued_at)| *enqueued_at);
    candidates.truncate(limit);

    let mut requeued = 0;
    for (qid, _) in candidates {
        let Some(entry) = state.dead_letter.remove(&qid) else { continue };
        let options = EnqueueOptions { delay_ms: 0, max_attempts: entry.max_attempts };
        match enqueue(state, clock, entry.message.clone(), options, heartbeat_stale_ms) {
            Ok(_) => requeued += 1,
            Err(_) => {
                state.dead_letter.insert(qid, entry);
            }
        }
    }

    RequeueResult { requeued, remaining: state.dead_letter.len() }
}
