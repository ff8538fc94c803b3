//! Debounced batch queue driven through the agent runtime.

mod common;

use common::mocks::{Harness, Script, ScriptedAgent};
use energia::agents::{FlushTrigger, QueueReceipt};
use energia::types::{AppError, Document};
use energia::utils::toml_config::{AgentConfig, AgentConfigPatch, BatchConfig};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;

fn batched(id: &str, max_batch_size: usize, batch_timeout_ms: u64) -> AgentConfig {
    AgentConfig::new(id, "Batched agent", "energy").with_batch(BatchConfig {
        max_batch_size,
        batch_timeout_ms,
    })
}

fn doc(id: &str) -> Document {
    Document::new(id, id, "body")
}

#[tokio::test(start_paused = true)]
async fn test_size_flush_then_timer_flush() {
    let harness = Harness::new();
    let agent = harness
        .start(ScriptedAgent::new(
            batched("queue", 2, 1_000),
            Script::Succeed { confidence: 0.9 },
        ))
        .await;
    let mut flushes = agent.subscribe_flushes();

    let first = agent.queue_for_batch_processing(doc("a"), None).await.unwrap();
    assert_eq!(first, QueueReceipt { queued: 1, flushed: false });
    let second = agent.queue_for_batch_processing(doc("b"), None).await.unwrap();
    assert_eq!(second, QueueReceipt { queued: 2, flushed: true });

    let size_flush = flushes.recv().await.unwrap();
    assert_eq!(size_flush.trigger, FlushTrigger::Size);
    assert_eq!(size_flush.size, 2);
    assert_eq!(size_flush.summary.successful, 2);

    let queued_at = Instant::now();
    let third = agent.queue_for_batch_processing(doc("c"), None).await.unwrap();
    assert_eq!(third, QueueReceipt { queued: 1, flushed: false });
    assert!(matches!(flushes.try_recv(), Err(TryRecvError::Empty)));

    let timer_flush = flushes.recv().await.unwrap();
    let waited = queued_at.elapsed();
    assert_eq!(timer_flush.trigger, FlushTrigger::Timer);
    assert_eq!(timer_flush.size, 1);
    assert!(waited >= Duration::from_millis(1_000), "flushed after {:?}", waited);
    assert!(waited < Duration::from_millis(1_100), "flushed after {:?}", waited);

    harness.telemetry.flush().await.unwrap();
    let records = harness.sink.records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|m| m.session_id.starts_with("queue-")));
}

#[tokio::test(start_paused = true)]
async fn test_timer_starts_at_first_document() {
    let harness = Harness::new();
    let agent = harness
        .start(ScriptedAgent::new(
            batched("debounce", 10, 1_000),
            Script::Succeed { confidence: 1.0 },
        ))
        .await;
    let mut flushes = agent.subscribe_flushes();

    let started = Instant::now();
    agent.queue_for_batch_processing(doc("a"), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    agent.queue_for_batch_processing(doc("b"), None).await.unwrap();

    let flush = flushes.recv().await.unwrap();
    assert_eq!(flush.trigger, FlushTrigger::Timer);
    assert_eq!(flush.size, 2);
    // Later documents do not push the deadline back
    assert!(started.elapsed() < Duration::from_millis(1_100));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_flushes_remaining_documents() {
    let harness = Harness::new();
    let runtime_agent = ScriptedAgent::new(
        batched("drain", 10, 60_000),
        Script::Succeed { confidence: 1.0 },
    );
    let calls = runtime_agent.calls.clone();
    let agent = harness.start(runtime_agent).await;
    let mut flushes = agent.subscribe_flushes();

    agent.queue_for_batch_processing(doc("a"), None).await.unwrap();
    agent.queue_for_batch_processing(doc("b"), None).await.unwrap();
    agent.cleanup().await.unwrap();

    let flush = flushes.try_recv().unwrap();
    assert_eq!(flush.trigger, FlushTrigger::Shutdown);
    assert_eq!(flush.size, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let err = agent
        .queue_for_batch_processing(doc("late"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    // Second cleanup is a no-op
    agent.cleanup().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_agent_flushes() {
    let harness = Harness::new();
    let agent = harness
        .start(ScriptedAgent::new(
            batched("dropped", 10, 60_000),
            Script::Succeed { confidence: 1.0 },
        ))
        .await;
    let mut flushes = agent.subscribe_flushes();

    agent.queue_for_batch_processing(doc("a"), None).await.unwrap();
    drop(agent);

    let flush = flushes.recv().await.unwrap();
    assert_eq!(flush.trigger, FlushTrigger::Shutdown);
    assert_eq!(flush.size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_batch_policy_update_applies_to_next_document() {
    let harness = Harness::new();
    let agent = harness
        .start(ScriptedAgent::new(
            batched("tunable", 10, 60_000),
            Script::Succeed { confidence: 1.0 },
        ))
        .await;
    let mut flushes = agent.subscribe_flushes();

    agent.queue_for_batch_processing(doc("a"), None).await.unwrap();
    agent
        .update_config(AgentConfigPatch {
            batch: Some(BatchConfig {
                max_batch_size: 2,
                batch_timeout_ms: 60_000,
            }),
            ..Default::default()
        })
        .unwrap();

    let receipt = agent.queue_for_batch_processing(doc("b"), None).await.unwrap();
    assert!(receipt.flushed);
    let flush = flushes.recv().await.unwrap();
    assert_eq!(flush.trigger, FlushTrigger::Size);
    assert_eq!(flush.size, 2);
}

#[tokio::test(start_paused = true)]
async fn test_flush_failures_are_counted_not_raised() {
    let harness = Harness::new();
    let agent = harness
        .start(ScriptedAgent::new(
            batched("flaky", 3, 1_000),
            Script::FailFor(vec!["b".into()]),
        ))
        .await;
    let mut flushes = agent.subscribe_flushes();

    for id in ["a", "b", "c"] {
        agent.queue_for_batch_processing(doc(id), None).await.unwrap();
    }

    let flush = flushes.recv().await.unwrap();
    assert_eq!(flush.summary.total, 3);
    assert_eq!(flush.summary.successful, 2);
    assert_eq!(flush.summary.failed, 1);
    assert_eq!(flush.summary.results[1].error.as_deref(), Some("b: boom"));
}
