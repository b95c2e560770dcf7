use super::adapter::{counter_key, decode_counter, decode_task, task_key};
use super::memory::{StoreOp, StoreOpKind};
use super::*;
use crate::{
    Error, QueueConfig,
    types::{ShardId, Task, TaskId},
};
use core::time::Duration;
use std::sync::Arc;

const TABLE: &str = "tasks";

fn shard(n: u32) -> ShardId {
    ShardId::new(n)
}

fn task(n: u32, id: &str) -> Task {
    Task {
        shard: shard(n),
        id: TaskId::from(id),
        payload: format!("payload {id}"),
    }
}

fn task_store() -> (Arc<MemoryStore>, TaskStore<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let adapter = TaskStore::new(Arc::clone(&store), &QueueConfig::new(TABLE, "fulfiller"));
    (store, adapter)
}

fn set(values: &[&str]) -> AttributeValue {
    AttributeValue::Ss(values.iter().map(|v| v.to_string()).collect())
}

// ============================================================================
// MemoryStore
// ============================================================================

#[tokio::test]
async fn update_is_an_upsert() {
    let store = MemoryStore::new();
    let key = ItemKey::new("COUNT#1", "COUNT#1");
    store
        .update_item(
            TABLE,
            key.clone(),
            UpdateExpression::new().add("count", 2).add_to_set("ids", ["a", "b"]),
        )
        .await
        .unwrap();

    let item = store.get(TABLE, &key).unwrap();
    assert_eq!(item.get("count"), Some(&AttributeValue::N(2)));
    assert_eq!(item.get("ids"), Some(&set(&["a", "b"])));
}

#[tokio::test]
async fn deleting_every_member_drops_the_set() {
    let store = MemoryStore::new();
    let key = ItemKey::new("COUNT#1", "COUNT#1");
    store
        .update_item(
            TABLE,
            key.clone(),
            UpdateExpression::new().add("count", 1).add_to_set("ids", ["a"]),
        )
        .await
        .unwrap();
    store
        .update_item(
            TABLE,
            key.clone(),
            UpdateExpression::new().add("count", -1).delete_from_set("ids", ["a"]),
        )
        .await
        .unwrap();

    let item = store.get(TABLE, &key).unwrap();
    assert_eq!(item.get("count"), Some(&AttributeValue::N(0)));
    assert!(!item.contains_key("ids"));
}

#[tokio::test]
async fn transaction_with_a_bad_element_applies_nothing() {
    let store = MemoryStore::new();
    let counter = ItemKey::new("COUNT#1", "COUNT#1");
    store
        .transact_write(
            TABLE,
            vec![TransactWriteItem::Put {
                key: counter.clone(),
                item: Item::from([("count".to_string(), AttributeValue::S("oops".into()))]),
            }],
        )
        .await
        .unwrap();

    let task = ItemKey::new("TASK#1", "TASK#a");
    let err = store
        .transact_write(
            TABLE,
            vec![
                TransactWriteItem::Put {
                    key: task.clone(),
                    item: Item::new(),
                },
                TransactWriteItem::Update {
                    key: counter,
                    update: UpdateExpression::new().add("count", 1),
                },
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::TransactionCanceled { .. }));
    assert!(store.get(TABLE, &task).is_none());
}

#[tokio::test]
async fn transaction_rejects_duplicate_keys() {
    let store = MemoryStore::new();
    let key = ItemKey::new("TASK#1", "TASK#a");
    let put = TransactWriteItem::Put {
        key,
        item: Item::new(),
    };
    let err = store
        .transact_write(TABLE, vec![put.clone(), put])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::TransactionCanceled { .. }));
    assert!(store.is_empty(TABLE));
}

#[tokio::test]
async fn injected_failures_are_consumed_in_order() {
    let store = MemoryStore::new();
    store.fail_next(StoreOpKind::BatchGet);

    assert!(store.batch_get(TABLE, vec![]).await.is_err());
    assert!(store.batch_get(TABLE, vec![]).await.is_ok());

    let kinds: Vec<StoreOpKind> = store.operations().iter().map(StoreOp::kind).collect();
    assert_eq!(kinds, vec![StoreOpKind::BatchGet, StoreOpKind::BatchGet]);
}

#[tokio::test]
async fn unprocessed_keys_come_from_the_tail() {
    let store = MemoryStore::new();
    store.leave_unprocessed(StoreOpKind::BatchDelete, 1);
    let keys = vec![ItemKey::new("p", "1"), ItemKey::new("p", "2")];
    let out = store.batch_delete(TABLE, keys).await.unwrap();
    assert_eq!(out.unprocessed_keys, vec![ItemKey::new("p", "2")]);
}

// ============================================================================
// Item codec
// ============================================================================

#[test]
fn key_layout() {
    let id = TaskId::from("01ARZ3NDEKTSV4RRFFQ69G5FAV");
    assert_eq!(
        task_key(shard(2), &id),
        ItemKey::new("TASK#2", "TASK#01ARZ3NDEKTSV4RRFFQ69G5FAV")
    );
    assert_eq!(counter_key(shard(1)), ItemKey::new("COUNT#1", "COUNT#1"));
}

#[test]
fn counter_without_ids_decodes_as_empty() {
    let key = counter_key(shard(1));
    let item = Item::from([("count".to_string(), AttributeValue::N(0))]);
    let counter = decode_counter(&key, &item).unwrap();
    assert_eq!(counter.count, 0);
    assert!(counter.pending_ids.is_empty());
}

#[test]
fn malformed_counters_are_corrupt() {
    let key = counter_key(shard(1));
    let missing_count = Item::from([("ids".to_string(), set(&["a"]))]);
    let wrong_ids = Item::from([
        ("count".to_string(), AttributeValue::N(1)),
        ("ids".to_string(), AttributeValue::S("a".into())),
    ]);
    let bad_key = ItemKey::new("COUNT#x", "COUNT#x");
    let ok = Item::from([("count".to_string(), AttributeValue::N(0))]);

    for (key, item) in [(&key, &missing_count), (&key, &wrong_ids), (&bad_key, &ok)] {
        assert!(matches!(
            decode_counter(key, item),
            Err(StoreError::Corrupt { .. })
        ));
    }
}

#[test]
fn task_codec() {
    let key = task_key(shard(1), &TaskId::from("abc"));
    let item = Item::from([("task".to_string(), AttributeValue::S("buy milk".into()))]);
    let task = decode_task(&key, &item).unwrap();
    assert_eq!(task.shard, shard(1));
    assert_eq!(task.id, TaskId::from("abc"));
    assert_eq!(task.payload, "buy milk");
}

// ============================================================================
// TaskStore
// ============================================================================

#[tokio::test]
async fn create_writes_task_and_counter_together() {
    let (store, adapter) = task_store();
    let t = task(1, "a");
    adapter.create_task_and_increment(&t).await.unwrap();

    assert_eq!(adapter.get_task(t.shard, &t.id).await.unwrap(), Some(t.clone()));
    let counters = adapter.read_counters([shard(1)]).await.unwrap();
    assert_eq!(counters[&shard(1)].count, 1);
    assert!(counters[&shard(1)].pending_ids.contains(&t.id));

    // One transaction, not two writes.
    let writes: Vec<StoreOp> = store
        .operations()
        .into_iter()
        .filter(|op| op.kind() == StoreOpKind::TransactWrite)
        .collect();
    assert_eq!(writes.len(), 1);
}

#[tokio::test]
async fn failed_create_leaves_no_trace() {
    let (store, adapter) = task_store();
    store.fail_next(StoreOpKind::TransactWrite);
    let t = task(1, "a");

    let err = adapter.create_task_and_increment(&t).await.unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Backend { .. })));
    assert!(store.is_empty(TABLE));
    assert_eq!(adapter.get_task(t.shard, &t.id).await.unwrap(), None);
    let counters = adapter.read_counters([shard(1)]).await.unwrap();
    assert_eq!(counters[&shard(1)], crate::ShardCounter::empty(shard(1)));
}

#[tokio::test]
async fn unwritten_shards_read_as_empty() {
    let (_, adapter) = task_store();
    let counters = adapter.read_counters([shard(1), shard(2)]).await.unwrap();
    assert_eq!(counters.len(), 2);
    assert!(counters.values().all(|c| c.count == 0 && c.pending_ids.is_empty()));
}

#[tokio::test]
async fn partial_counter_read_is_an_error() {
    let (store, adapter) = task_store();
    adapter.create_task_and_increment(&task(1, "a")).await.unwrap();
    store.leave_unprocessed(StoreOpKind::BatchGet, 1);

    let err = adapter.read_counters([shard(1), shard(2)]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Store(StoreError::Unprocessed {
            requested: 2,
            unprocessed: 1
        })
    ));
}

#[tokio::test]
async fn counter_reads_are_chunked() {
    let (store, adapter) = task_store();
    let shards = (1..=(MAX_BATCH_GET_KEYS as u32 + 1)).map(shard);
    let counters = adapter.read_counters(shards).await.unwrap();
    assert_eq!(counters.len(), MAX_BATCH_GET_KEYS + 1);
    assert_eq!(store.operations().len(), 2);
}

#[tokio::test]
async fn delete_failure_still_decrements() {
    let (store, adapter) = task_store();
    let t = task(1, "a");
    adapter.create_task_and_increment(&t).await.unwrap();
    store.fail_next(StoreOpKind::BatchDelete);

    adapter
        .delete_tasks_and_decrement(t.shard, std::slice::from_ref(&t.id))
        .await
        .unwrap();

    // The task item survives but the counter no longer references it.
    assert!(adapter.get_task(t.shard, &t.id).await.unwrap().is_some());
    let counters = adapter.read_counters([shard(1)]).await.unwrap();
    assert_eq!(counters[&shard(1)].count, 0);
    assert!(counters[&shard(1)].pending_ids.is_empty());
}

#[tokio::test]
async fn decrement_failure_is_surfaced() {
    let (store, adapter) = task_store();
    let t = task(1, "a");
    adapter.create_task_and_increment(&t).await.unwrap();
    store.fail_next(StoreOpKind::UpdateItem);

    let err = adapter
        .delete_tasks_and_decrement(t.shard, std::slice::from_ref(&t.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Backend { .. })));
}

#[tokio::test]
async fn deletes_are_chunked_but_decrement_once() {
    let (store, adapter) = task_store();
    let ids: Vec<TaskId> = (0..(MAX_BATCH_WRITE_KEYS + 3))
        .map(|i| TaskId::new(format!("{i:03}")))
        .collect();
    for id in &ids {
        adapter
            .create_task_and_increment(&task(1, id.as_str()))
            .await
            .unwrap();
    }
    store.clear_operations();

    adapter.delete_tasks_and_decrement(shard(1), &ids).await.unwrap();

    let kinds: Vec<StoreOpKind> = store.operations().iter().map(StoreOp::kind).collect();
    assert_eq!(
        kinds,
        vec![
            StoreOpKind::BatchDelete,
            StoreOpKind::BatchDelete,
            StoreOpKind::UpdateItem
        ]
    );
    let counters = adapter.read_counters([shard(1)]).await.unwrap();
    assert_eq!(counters[&shard(1)].count, 0);
}

#[tokio::test]
async fn empty_delete_touches_nothing() {
    let (store, adapter) = task_store();
    adapter.delete_tasks_and_decrement(shard(1), &[]).await.unwrap();
    assert!(store.operations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out() {
    let store = Arc::new(MemoryStore::with_latency(Duration::from_secs(5)));
    let config = QueueConfig::new(TABLE, "fulfiller").with_request_timeout(Duration::from_secs(1));
    let adapter = TaskStore::new(store, &config);

    let err = adapter
        .create_task_and_increment(&task(1, "a"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { operation: "create task" }));
}
