//! Edge case tests for the local partitions and record model.

use fieldsync_engine::{
    is_provisional, materialize, Error, Fields, LocalStore, MemoryStore, Partition, Record,
    SqliteStore, WriteBatch,
};
use serde_json::{json, Value};

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap()
}

async fn stores() -> Vec<Box<dyn LocalStore>> {
    vec![
        Box::new(MemoryStore::new()),
        Box::new(SqliteStore::in_memory().await.unwrap()),
    ]
}

// ============================================================================
// Partition Edge Cases
// ============================================================================

#[tokio::test]
async fn pending_keeps_last_value_per_id() {
    for store in stores().await {
        store
            .put(Partition::Pending, &Record::new("a", fields(json!({"n": 1}))))
            .await
            .unwrap();
        store
            .put(Partition::Pending, &Record::new("a", fields(json!({"n": 2}))))
            .await
            .unwrap();

        let pending = store.scan_all(Partition::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].get("n"), Some(&json!(2)));
    }
}

#[tokio::test]
async fn partitions_are_independent() {
    for store in stores().await {
        let record = Record::new("same-id", fields(json!({"side": "mirror"})));
        store.put(Partition::Mirror, &record).await.unwrap();
        store.clear(Partition::Pending).await.unwrap();

        assert!(store.get(Partition::Pending, "same-id").await.unwrap().is_none());
        assert_eq!(
            store.get(Partition::Mirror, "same-id").await.unwrap(),
            Some(record)
        );
    }
}

#[tokio::test]
async fn replace_all_with_nothing_empties_partition() {
    for store in stores().await {
        store
            .put_many(
                Partition::Mirror,
                &[Record::new("1", Fields::new()), Record::new("2", Fields::new())],
            )
            .await
            .unwrap();
        store.replace_all(Partition::Mirror, &[]).await.unwrap();
        assert!(store.scan_all(Partition::Mirror).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn put_many_with_nothing_is_noop() {
    for store in stores().await {
        store.put_many(Partition::Pending, &[]).await.unwrap();
        assert!(store.scan_all(Partition::Pending).await.unwrap().is_empty());
    }
}

// ============================================================================
// Record Edge Cases
// ============================================================================

#[tokio::test]
async fn unicode_and_nested_values_survive_storage() {
    let record = Record::new(
        "r1",
        fields(json!({
            "name": "सीता देवी",
            "notes": "emoji 🐔 and \"quotes\"",
            "sellLocation": ["हाट", "market"],
            "extra": {"nested": [1, 2.5, null]}
        })),
    );
    for store in stores().await {
        store.put(Partition::Pending, &record).await.unwrap();
        let loaded = store.get(Partition::Pending, "r1").await.unwrap();
        assert_eq!(loaded, Some(record.clone()));
    }
}

#[test]
fn record_without_id_is_invalid() {
    assert!(matches!(
        Record::from_value(json!({"name": "no id"})),
        Err(Error::InvalidRecord(_))
    ));
    assert!(matches!(
        Record::from_value(json!(["not", "an", "object"])),
        Err(Error::InvalidRecord(_))
    ));
}

#[test]
fn record_serializes_flat() {
    let record = Record::new("r1", fields(json!({"name": "Asha"})));
    assert_eq!(record.to_value(), json!({"id": "r1", "name": "Asha"}));
}

// ============================================================================
// Identity and Batch Edge Cases
// ============================================================================

#[test]
fn prefix_alone_is_not_provisional() {
    assert!(!is_provisional("pending_"));
    assert!(!is_provisional("PENDING_1_x"));
    assert!(!is_provisional(""));
    assert!(is_provisional("pending_1_x"));
}

#[test]
fn batch_splits_on_identity() {
    let batch = WriteBatch::from_pending(&[
        Record::new("pending_1_a", Fields::new()),
        Record::new("server-id", fields(json!({"name": "edit"}))),
        Record::new("pending_", Fields::new()),
    ]);
    assert_eq!(batch.creates.len(), 1);
    assert_eq!(batch.updates.len(), 2);
    assert!(!batch.is_empty());
    assert!(WriteBatch::from_pending(&[]).is_empty());
}

#[test]
fn materialize_large_overlay() {
    let mirror: Vec<Record> = (0..5_000)
        .map(|i| Record::new(format!("{i:05}"), fields(json!({"v": "mirror"}))))
        .collect();
    let pending: Vec<Record> = (0..5_000)
        .step_by(2)
        .map(|i| Record::new(format!("{i:05}"), fields(json!({"v": "pending"}))))
        .collect();

    let view = materialize(mirror, pending);
    assert_eq!(view.len(), 5_000);
    assert_eq!(view[0].get("v"), Some(&json!("pending")));
    assert_eq!(view[1].get("v"), Some(&json!("mirror")));
}
