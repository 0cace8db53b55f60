//! A message whose TTL elapses before it is ever polled is dead-lettered
//! instead of delivered, and counted in the lifetime stats.

mod support;

use swarm_registry::domain::AgentType;
use swarm_registry::operator::OperatorInterface;
use support::{agent, message, shard_without_namespace};

#[tokio::test]
async fn expired_message_is_dead_lettered_not_delivered() {
    let (shard, clock) = shard_without_namespace(0).await;
    shard.register_agent(agent("analyst-1", AgentType::Analyst)).await.unwrap();

    let mut msg = message("analyst-1", "analyze");
    msg.timestamp_ms = 0;
    msg.ttl_ms = Some(100);
    shard.enqueue(msg, None, None).await.unwrap();

    clock.advance(10_000);

    let polled = shard.poll("analyst-1", None).await;
    assert!(polled.is_empty());

    let state = shard.queue_state().await;
    assert_eq!(state.pending, 0);
    assert_eq!(state.dead_lettered, 1);
    assert_eq!(state.delivery_stats.dead_lettered, 1);
}

#[tokio::test]
async fn message_within_ttl_is_delivered_normally() {
    let (shard, clock) = shard_without_namespace(0).await;
    shard.register_agent(agent("analyst-1", AgentType::Analyst)).await.unwrap();

    let mut msg = message("analyst-1", "analyze");
    msg.timestamp_ms = 0;
    msg.ttl_ms = Some(100_000);
    shard.enqueue(msg, None, None).await.unwrap();

    clock.advance(1_000);

    let polled = shard.poll("analyst-1", None).await;
    assert_eq!(polled.len(), 1);

    let state = shard.queue_state().await;
    assert_eq!(state.dead_lettered, 0);
}
