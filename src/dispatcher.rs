//! Dispatcher (C8): drains ready messages, delivers via the namespace
//! resolver, applies retry/backoff/DLQ policy.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::directory;
use crate::domain::{Message, QueueStatus, QueuedMessage, RegistryState};
use crate::namespace::NamespaceDirectory;
use crate::queue::EXPIRED_BEFORE_DISPATCH;
use crate::router;
use crate::telemetry::Telemetry;
use crate::time::Clock;

/// Abstracts the outbound HTTP POST so tests can substitute a recording
/// fake instead of a real network call (spec §9: "tests can inject a fake
/// resolver that records delivered messages").
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// POST `message` as JSON to `url`, returning the response status
    /// code, or an `Err` describing a network error/exception/timeout.
    async fn post_json(
        &self,
        url: &str,
        message: &Message,
        timeout_ms: u64,
    ) -> Result<u16, String>;
}

/// A real [`DeliveryClient`] backed by `reqwest`.
pub struct ReqwestDeliveryClient {
    client: reqwest::Client,
}

impl Default for ReqwestDeliveryClient {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl DeliveryClient for ReqwestDeliveryClient {
    async fn post_json(
        &self,
        url: &str,
        message: &Message,
        timeout_ms: u64,
    ) -> Result<u16, String> {
        let response = self
            .client
            .post(url)
            .json(message)
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }
}

/// Result of one [`dispatch`] pass (spec §4.10's `dispatch result`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchResult {
    /// Messages successfully delivered this pass.
    pub delivered: usize,
    /// Messages that failed this pass (including those retried-in-place
    /// and those moved to the dead letter area).
    pub failed: usize,
    /// Messages still pending in the queue after this pass.
    pub pending: usize,
}

fn backoff_delay_ms(attempts: i32, backoff_cap_ms: i64) -> i64 {
    let exponent = (attempts - 1).clamp(0, 30);
    let delay = 1000i64.saturating_mul(1i64 << exponent);
    delay.min(backoff_cap_ms)
}

fn bump_retry(entry: &mut QueuedMessage, last_error: String, now_ms: i64, backoff_cap_ms: i64) {
    entry.attempts += 1;
    entry.last_error = Some(last_error);
    // The source this is ported from sets `status = failed` then
    // immediately back to `pending`; preserved per spec §9, though no
    // caller observes the intermediate value.
    entry.status = QueueStatus::Failed;
    entry.status = QueueStatus::Pending;
    entry.available_at_ms = now_ms + backoff_delay_ms(entry.attempts, backoff_cap_ms);
}

/// `telemetry_reason` tags the `dispatch_failures_total` counter;
/// `last_error` is the human-readable text stored on the queue entry and,
/// if this failure exhausts `max_attempts`, surfaced as the dead letter's
/// reason (spec §4.8).
#[allow(clippy::too_many_arguments)]
fn fail_and_maybe_dlq(
    state: &mut RegistryState,
    telemetry: &Telemetry,
    qid: String,
    mut entry: QueuedMessage,
    telemetry_reason: &str,
    last_error: &str,
    now_ms: i64,
    backoff_cap_ms: i64,
    remaining: &mut VecDeque<String>,
) {
    bump_retry(&mut entry, last_error.to_string(), now_ms, backoff_cap_ms);
    state.delivery_stats.failed += 1;
    telemetry.increment("dispatch_failures_total", 1.0, &[("reason", telemetry_reason)]);
    warn!("Delivery failed for message {}: {telemetry_reason}", entry.message.id);

    if entry.attempts >= entry.max_attempts {
        warn!("Message {} exhausted retries, moving to dead letter", entry.message.id);
        state.dead_letter.insert(qid, entry);
        state.delivery_stats.dead_lettered += 1;
    } else {
        state.queue.insert(qid.clone(), entry);
        remaining.push_back(qid);
    }
}

/// One dispatch pass over `queue_order`, examining up to `limit` messages
/// (spec §4.8). See [`crate::config::RegistryConfig::dispatch_max_limit`]
/// for the hard cap callers should clamp `limit` to before calling this.
#[allow(clippy::too_many_arguments)]
pub async fn dispatch(
    state: &mut RegistryState,
    clock: &dyn Clock,
    telemetry: &Telemetry,
    namespaces: &dyn NamespaceDirectory,
    delivery: &dyn DeliveryClient,
    limit: usize,
    heartbeat_stale_ms: i64,
    backoff_cap_ms: i64,
    delivery_timeout_ms: u64,
) -> DispatchResult {
    let now = clock.now_ms();
    let mut order = std::mem::take(&mut state.queue_order);
    let mut remaining = VecDeque::new();
    let mut delivered = 0usize;
    let mut failed = 0usize;

    while let Some(qid) = order.pop_front() {
        if delivered + failed >= limit {
            remaining.push_back(qid);
            continue;
        }

        let Some(mut entry) = state.queue.remove(&qid) else { continue };

        if entry.available_at_ms > now {
            state.queue.insert(qid.clone(), entry);
            remaining.push_back(qid);
            continue;
        }

        if entry.message.is_expired(now) {
            debug!("Message {} expired before dispatch", entry.message.id);
            entry.last_error = Some(EXPIRED_BEFORE_DISPATCH.to_string());
            state.dead_letter.insert(qid, entry);
            state.delivery_stats.dead_lettered += 1;
            failed += 1;
            continue;
        }

        entry.message = match router::resolve(state, entry.message, true, now, heartbeat_stale_ms)
        {
            Ok(m) => m,
            Err(_) => {
                fail_and_maybe_dlq(
                    state,
                    telemetry,
                    qid,
                    entry,
                    "invalid_target_id",
                    "invalid_target_id",
                    now,
                    backoff_cap_ms,
                    &mut remaining,
                );
                failed += 1;
                continue;
            }
        };

        let Some(agent) = state.agents.get(&entry.message.target).cloned() else {
            fail_and_maybe_dlq(
                state,
                telemetry,
                qid,
                entry,
                "agent_not_found",
                "Target agent unavailable",
                now,
                backoff_cap_ms,
                &mut remaining,
            );
            failed += 1;
            continue;
        };

        if !directory::is_active(&agent, now, heartbeat_stale_ms) {
            state.queue.insert(qid.clone(), entry);
            remaining.push_back(qid);
            continue;
        }

        let Some(resolver) = namespaces.resolve_namespace(agent.agent_type) else {
            fail_and_maybe_dlq(
                state,
                telemetry,
                qid,
                entry,
                "namespace_missing",
                "namespace_missing",
                now,
                backoff_cap_ms,
                &mut remaining,
            );
            failed += 1;
            continue;
        };

        let url = resolver.endpoint(agent.id.as_ref());
        match delivery.post_json(&url, &entry.message, delivery_timeout_ms).await {
            Ok(status) if (200..300).contains(&status) => {
                state.delivery_stats.delivered += 1;
                telemetry.increment("dispatch_delivered_total", 1.0, &[]);
                debug!("Delivered message {} to {url}", entry.message.id);
                delivered += 1;
            }
            Ok(status) => {
                fail_and_maybe_dlq(
                    state,
                    telemetry,
                    qid,
                    entry,
                    &status.to_string(),
                    &format!("delivery returned status {status}"),
                    now,
                    backoff_cap_ms,
                    &mut remaining,
                );
                failed += 1;
            }
            Err(e) => {
                fail_and_maybe_dlq(
                    state,
                    telemetry,
                    qid,
                    entry,
                    "exception",
                    &e,
                    now,
                    backoff_cap_ms,
                    &mut remaining,
                );
                failed += 1;
            }
        }
    }

    state.queue_order = remaining;
    state.last_dispatch_at_ms = now;

    DispatchResult { delivered, failed, pending: state.queue_order.len() }
}
