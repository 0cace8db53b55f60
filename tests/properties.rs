//! Property tests for the invariants the core data structures must hold
//! regardless of the specific sequence of operations driving them.

use std::collections::HashMap;

use proptest::prelude::*;
use swarm_registry::directory::{self, prune_stale};
use swarm_registry::domain::{
    AgentId, AgentRecord, AgentStatus, AgentType, Message, MessageType, RegistryState,
};
use swarm_registry::queue::{self, EnqueueOptions};
use swarm_registry::router;
use swarm_registry::time::MockClock;

prop_compose! {
    fn arb_agent_id()(id in "[a-z][a-z0-9-]{0,15}") -> String { id }
}

prop_compose! {
    fn arb_max_attempts()(n in -5i32..=30) -> i32 { n }
}

prop_compose! {
    fn arb_delay_ms()(d in -1000i64..=60_000) -> i64 { d }
}

fn message(id: &str, target: &str) -> Message {
    Message {
        id: id.to_string(),
        source: "scout-1".to_string(),
        target: target.to_string(),
        message_type: MessageType::Command,
        topic: "t".to_string(),
        payload: serde_json::json!({}),
        timestamp_ms: 0,
        correlation_id: None,
        reply_to: None,
        priority: None,
        ttl_ms: None,
        headers: HashMap::new(),
    }
}

fn agent(id: &str, seq: u64) -> AgentRecord {
    AgentRecord {
        id: AgentId::try_new(id.to_string()).unwrap(),
        agent_type: AgentType::Analyst,
        status: AgentStatus::Active,
        last_heartbeat_ms: 0,
        capabilities: std::collections::HashSet::new(),
        metrics: HashMap::new(),
        registered_seq: seq,
    }
}

proptest! {
    /// `max_attempts` supplied to `enqueue` is always clamped to at least 1,
    /// no matter how the caller misbehaves.
    #[test]
    fn enqueue_never_stores_a_sub_one_max_attempts(max_attempts in arb_max_attempts(), delay_ms in arb_delay_ms()) {
        let mut state = RegistryState::new();
        let clock = MockClock::new(0);
        let queued = queue::enqueue(
            &mut state,
            &clock,
            message("m1", "agent-1"),
            EnqueueOptions { delay_ms, max_attempts },
            300_000,
        )
        .unwrap();
        prop_assert!(queued.max_attempts >= 1);
        prop_assert!(queued.available_at_ms >= queued.enqueued_at_ms);
    }

    /// Enqueueing N messages for the same target and then polling with a
    /// limit of N returns exactly those N messages in enqueue order;
    /// nothing is lost and nothing is duplicated.
    #[test]
    fn poll_preserves_fifo_order_for_one_target(ids in prop::collection::vec(arb_agent_id(), 1..8)) {
        let mut state = RegistryState::new();
        let clock = MockClock::new(0);
        let mut expected = Vec::new();
        for (i, _) in ids.iter().enumerate() {
            let mid = format!("m{i}");
            queue::enqueue(&mut state, &clock, message(&mid, "agent-1"), EnqueueOptions::default(), 300_000).unwrap();
            expected.push(mid);
        }

        let polled = queue::poll(&mut state, "agent-1", expected.len(), 0);
        let polled_ids: Vec<String> = polled.into_iter().map(|m| m.id).collect();
        prop_assert_eq!(polled_ids, expected);
        prop_assert!(state.queue.is_empty());
        prop_assert!(state.queue_order.is_empty());
    }

    /// `delivery_stats.enqueued` only ever grows as more messages are
    /// enqueued, regardless of interleaved polls.
    #[test]
    fn enqueued_counter_is_monotonic(n in 1usize..10) {
        let mut state = RegistryState::new();
        let clock = MockClock::new(0);
        let mut last = 0u64;
        for i in 0..n {
            queue::enqueue(&mut state, &clock, message(&format!("m{i}"), "agent-1"), EnqueueOptions::default(), 300_000).unwrap();
            prop_assert!(state.delivery_stats.enqueued >= last);
            last = state.delivery_stats.enqueued;
            queue::poll(&mut state, "agent-1", 1, 0);
        }
    }

    /// A dead-lettered entry requeued with `requeue_dead_letter` always
    /// reappears in the live queue carrying its original message id.
    #[test]
    fn requeue_round_trips_message_identity(id in arb_agent_id()) {
        let mut state = RegistryState::new();
        let clock = MockClock::new(0);
        let queued = queue::enqueue(
            &mut state,
            &clock,
            message(&id, "agent-1"),
            EnqueueOptions { delay_ms: 0, max_attempts: 1 },
            300_000,
        )
        .unwrap();
        state.queue.remove(&queued.queue_id);
        state.queue_order.retain(|q| q != &queued.queue_id);
        state.dead_letter.insert(queued.queue_id.clone(), queued);

        let result = queue::requeue_dead_letter(&mut state, &clock, 10, 300_000);
        prop_assert_eq!(result.requeued, 1);
        prop_assert!(state.dead_letter.is_empty());

        let polled = queue::poll(&mut state, "agent-1", 10, 0);
        prop_assert_eq!(polled.len(), 1);
        prop_assert_eq!(&polled[0].id, &id);
    }

    /// Pruning with an unchanged state is idempotent: a second call with
    /// the same threshold removes nothing further.
    #[test]
    fn pruning_is_idempotent(stale_ms in 600_000i64..10_000_000) {
        let mut state = RegistryState::new();
        directory::register(&mut state, agent("a1", 0), 0, None).unwrap();

        let first = prune_stale(&mut state, 600_000, stale_ms);
        let second = prune_stale(&mut state, 600_000, stale_ms);
        prop_assert_eq!(second.removed, 0);
        prop_assert_eq!(first.remaining, second.remaining);
    }

    /// Round-robin selection over `k` active agents visits every agent
    /// exactly once per full cycle of `k` selections.
    #[test]
    fn round_robin_is_fair_over_one_full_cycle(k in 2usize..6) {
        let mut state = RegistryState::new();
        for i in 0..k {
            let id = format!("analyst-{i}");
            directory::register(&mut state, agent(&id, i as u64), 0, None).unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..k {
            let resolved = router::resolve(&mut state, message("m", "type:analyst"), false, 0, 300_000).unwrap();
            seen.insert(resolved.target);
        }
        prop_assert_eq!(seen.len(), k);
    }

    /// `Message::is_expired` matches the direct arithmetic definition for
    /// any timestamp/ttl/now combination.
    #[test]
    fn message_expiry_matches_arithmetic_definition(
        timestamp_ms in -1_000_000i64..1_000_000,
        ttl_ms in 0i64..1_000_000,
        now_ms in -1_000_000i64..2_000_000,
    ) {
        let mut msg = message("m1", "agent-1");
        msg.timestamp_ms = timestamp_ms;
        msg.ttl_ms = Some(ttl_ms);
        prop_assert_eq!(msg.is_expired(now_ms), now_ms > timestamp_ms.saturating_add(ttl_ms));
    }
}
