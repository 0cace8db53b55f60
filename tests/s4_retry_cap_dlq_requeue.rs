//! A message that exhausts its attempts is moved to the dead letter area,
//! and an operator-triggered requeue brings it back into the live queue.

mod support;

use swarm_registry::domain::AgentType;
use swarm_registry::operator::OperatorInterface;
use support::{agent, message, shard_without_namespace};

#[tokio::test]
async fn single_attempt_failure_moves_straight_to_dead_letter() {
    let (shard, _clock) = shard_without_namespace(0).await;
    shard.register_agent(agent("analyst-1", AgentType::Analyst)).await.unwrap();
    shard.enqueue(message("analyst-1", "analyze"), None, Some(1)).await.unwrap();

    let result = shard.dispatch(None).await;
    assert_eq!(result.delivered, 0);
    assert_eq!(result.failed, 1);

    let state = shard.queue_state().await;
    assert_eq!(state.pending, 0);
    assert_eq!(state.dead_lettered, 1);
}

#[tokio::test]
async fn requeue_moves_dead_letter_entries_back_to_pending() {
    let (shard, _clock) = shard_without_namespace(0).await;
    shard.register_agent(agent("analyst-1", AgentType::Analyst)).await.unwrap();
    shard.enqueue(message("analyst-1", "analyze"), None, Some(1)).await.unwrap();
    shard.dispatch(None).await;
    assert_eq!(shard.queue_state().await.dead_lettered, 1);

    let result = shard.requeue_dead_letter(None).await;
    assert_eq!(result.requeued, 1);
    assert_eq!(result.remaining, 0);

    let state = shard.queue_state().await;
    assert_eq!(state.pending, 1);
    assert_eq!(state.dead_lettered, 0);
}

#[tokio::test]
async fn retry_survives_until_attempt_cap_then_dead_letters() {
    let (shard, clock) = shard_without_namespace(0).await;
    shard.register_agent(agent("analyst-1", AgentType::Analyst)).await.unwrap();
    shard.enqueue(message("analyst-1", "analyze"), None, Some(3)).await.unwrap();

    // each failed attempt backs off exponentially before becoming due
    // again, so the clock must advance past it between dispatch passes.
    shard.dispatch(None).await;
    assert_eq!(shard.queue_state().await.dead_lettered, 0);
    assert_eq!(shard.queue_state().await.pending, 1);

    clock.advance(5_000);
    shard.dispatch(None).await;
    assert_eq!(shard.queue_state().await.dead_lettered, 0);

    // third attempt exhausts max_attempts
    clock.advance(10_000);
    shard.dispatch(None).await;
    assert_eq!(shard.queue_state().await.dead_lettered, 1);
    assert_eq!(shard.queue_state().await.pending, 0);
}
