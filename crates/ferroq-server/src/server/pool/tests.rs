use super::{WorkRequest, WorkerPool};
use core::time::Duration;
use ferroq_core::{
    Batch, Error, InvokeError, QueueConfig, ShardId, TaskId,
    id::UlidGenerator,
    invoke::Invoker,
    queue::{Fulfiller, Submitter},
    shard::FixedShardAssigner,
    store::{MemoryStore, TaskStore},
};
use std::sync::Arc;

const TARGET: &str = "task-fulfiller";

fn setup(num_workers: usize) -> (TaskStore<MemoryStore>, QueueConfig, WorkerPool) {
    let config = QueueConfig::new("tasks", TARGET);
    let store = TaskStore::new(Arc::new(MemoryStore::new()), &config);
    let pool = WorkerPool::spawn(
        &Fulfiller::new(store.clone(), &config),
        TARGET,
        num_workers,
        4,
        Duration::from_secs(1),
    );
    (store, config, pool)
}

async fn seed(store: &TaskStore<MemoryStore>, config: &QueueConfig, n: usize) -> Vec<TaskId> {
    let submitter = Submitter::new(
        store.clone(),
        UlidGenerator::new(),
        FixedShardAssigner(ShardId::new(1)),
        config,
    );
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        ids.push(submitter.submit(format!("job {i}")).await.unwrap().id);
    }
    ids
}

async fn pending(store: &TaskStore<MemoryStore>) -> i64 {
    store.read_counters([ShardId::new(1)]).await.unwrap()[&ShardId::new(1)].count
}

#[tokio::test]
async fn round_robin_selection() {
    let (_, _, pool) = setup(3);
    let picks: Vec<usize> = (0..7).map(|_| pool.next_worker_index()).collect();
    assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
}

#[tokio::test]
async fn invoked_batches_are_fulfilled() {
    let (store, config, pool) = setup(2);
    let ids = seed(&store, &config, 6).await;

    for chunk in ids.chunks(2) {
        let batch = Batch::new(ShardId::new(1), chunk.iter().cloned());
        pool.invoke(TARGET, batch.to_json().unwrap()).await.unwrap();
    }

    // Drain through shutdown, which waits for queued batches.
    pool.shutdown().await.unwrap();
    assert_eq!(pool.in_flight(), 0);
    assert_eq!(pending(&store).await, 0);
}

#[tokio::test]
async fn unknown_target_and_bad_payload_are_rejected() {
    let (_, _, pool) = setup(1);

    let err = pool
        .invoke("someone-else", serde_json::json!({ "shard": 1, "ids": [] }))
        .await
        .unwrap_err();
    assert_eq!(err, InvokeError::UnknownTarget("someone-else".to_string()));

    let err = pool
        .invoke(TARGET, serde_json::json!({ "ids": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::Payload { .. }));
    assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn shutdown_refuses_new_work() {
    let (_, _, pool) = setup(2);
    assert!(pool.is_accepting());

    pool.shutdown().await.unwrap();
    assert!(!pool.is_accepting());

    let batch = Batch::new(ShardId::new(1), [TaskId::from("a")]);
    let err = pool.fulfill(batch.clone()).await.unwrap_err();
    assert!(matches!(err, Error::ServiceShutdown));

    let err = pool.invoke(TARGET, batch.to_json().unwrap()).await.unwrap_err();
    assert!(matches!(err, InvokeError::Rejected { .. }));
}

#[tokio::test]
async fn failed_fulfillment_does_not_stall_the_worker() {
    let (store, config, pool) = setup(1);
    let ids = seed(&store, &config, 2).await;

    // Out-of-range shard fails inside the worker; the next batch still runs.
    pool.fulfill(Batch::new(ShardId::new(9), [TaskId::from("x")]))
        .await
        .unwrap();
    pool.fulfill(Batch::new(ShardId::new(1), ids)).await.unwrap();

    pool.shutdown().await.unwrap();
    assert_eq!(pending(&store).await, 0);
}

#[tokio::test]
async fn closed_worker_channel_is_a_channel_error() {
    let (_, _, pool) = setup(1);
    let (tx, rx) = tokio::sync::oneshot::channel();
    pool.send_to_next_worker(WorkRequest::Shutdown { response: tx })
        .await
        .unwrap();
    rx.await.unwrap();
    // Give the worker a moment to drop its receiver.
    for _ in 0..100 {
        match pool.fulfill(Batch::new(ShardId::new(1), [TaskId::from("a")])).await {
            Err(Error::ChannelError { .. }) => return,
            _ => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
    panic!("worker channel never closed");
}

#[tokio::test]
async fn cancelled_send_leaves_nothing_in_flight() {
    let config = QueueConfig::new("tasks", TARGET);
    let store = TaskStore::new(
        Arc::new(MemoryStore::with_latency(Duration::from_millis(100))),
        &config,
    );
    let pool = WorkerPool::spawn(
        &Fulfiller::new(store.clone(), &config),
        TARGET,
        1,
        1,
        Duration::from_secs(1),
    );
    let ids = seed(&store, &config, 3).await;
    let batch = |id: &TaskId| Batch::new(ShardId::new(1), [id.clone()]);

    // The worker is busy with the first batch and the second fills its
    // channel, so the third send can only wait.
    pool.fulfill(batch(&ids[0])).await.unwrap();
    pool.fulfill(batch(&ids[1])).await.unwrap();
    let timed_out = tokio::time::timeout(
        Duration::from_millis(10),
        pool.invoke(TARGET, batch(&ids[2]).to_json().unwrap()),
    )
    .await;
    assert!(timed_out.is_err());

    for _ in 0..200 {
        if pool.in_flight() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pool.in_flight(), 0);

    let started = tokio::time::Instant::now();
    pool.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));

    // Only the abandoned batch is still pending.
    assert_eq!(pending(&store).await, 1);
}

#[tokio::test]
async fn zero_workers_is_clamped_to_one() {
    let (store, config, pool) = setup(0);
    assert_eq!(pool.next_worker_index(), 0);
    assert_eq!(pool.next_worker_index(), 0);

    let ids = seed(&store, &config, 1).await;
    pool.fulfill(Batch::new(ShardId::new(1), ids)).await.unwrap();
    pool.shutdown().await.unwrap();
    assert_eq!(pending(&store).await, 0);
}
