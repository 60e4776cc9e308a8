//! `HttpRemote` against a mocked sync server.

use fieldsync_engine::{
    Error, Fields, HttpRemote, LocalStore, MemoryStore, Partition, Record, RemoteStore, Replica,
    ReplicaConfig, Schema, SyncOutcome, WriteBatch,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap()
}

async fn mount_snapshot(server: &MockServer, records: Value) {
    Mock::given(method("GET"))
        .and(path("/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": records })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_all_reads_snapshot() {
    let server = MockServer::start().await;
    mount_snapshot(
        &server,
        json!([
            {"id": "r1", "name": "Asha", "syncedAt": "2024-01-01T00:00:00Z"},
            {"id": "r2", "name": "Ravi"}
        ]),
    )
    .await;

    let remote = HttpRemote::new(server.uri()).unwrap();
    let records = remote.fetch_all().await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "r1");
    assert_eq!(records[0].get("name"), Some(&json!("Asha")));
    assert!(records[1].get("syncedAt").is_none());
}

#[tokio::test]
async fn commit_posts_batch_and_returns_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"assigned": {"pending_1_abc": "srv-1"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let remote = HttpRemote::new(format!("{}/", server.uri())).unwrap();
    let batch = WriteBatch::from_pending(&[
        Record::new("pending_1_abc", fields(json!({"name": "new"}))),
        Record::new("srv-9", fields(json!({"name": "edited"}))),
    ]);
    let receipt = remote.commit_batch(&batch).await.unwrap();

    assert_eq!(receipt.assigned.get("pending_1_abc").map(String::as_str), Some("srv-1"));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["creates"][0]["name"], json!("new"));
    assert_eq!(body["updates"][0]["id"], json!("srv-9"));
    assert_eq!(body["updates"][0]["fields"]["name"], json!("edited"));
}

#[tokio::test]
async fn server_error_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
        .mount(&server)
        .await;

    let remote = HttpRemote::new(server.uri()).unwrap();
    let batch = WriteBatch::from_pending(&[Record::new("x", Fields::new())]);
    let err = remote.commit_batch(&batch).await.unwrap_err();

    match err {
        Error::RemoteRejection(message) => assert!(message.contains("database down")),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_snapshot_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let remote = HttpRemote::new(server.uri()).unwrap();
    assert!(matches!(
        remote.fetch_all().await,
        Err(Error::RemoteRejection(_))
    ));
}

#[tokio::test]
async fn unreachable_server_is_connectivity() {
    let remote = HttpRemote::new("http://127.0.0.1:1").unwrap();

    let err = remote.fetch_all().await.unwrap_err();
    assert!(err.is_connectivity());

    let err = remote.subscribe().await.unwrap_err();
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn replica_flushes_through_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"assigned": {}})))
        .mount(&server)
        .await;
    mount_snapshot(&server, json!([{"id": "srv-1", "name": "Asha"}])).await;

    let store = Arc::new(MemoryStore::new());
    let remote = HttpRemote::new(server.uri()).unwrap();
    let replica = Replica::with_parts(
        store.clone(),
        Some(Arc::new(remote) as Arc<dyn RemoteStore>),
        Schema::households(),
        ReplicaConfig::default()
            .with_commit_timeout(Duration::from_secs(5))
            .with_sync_on_write(false),
        false,
    )
    .await
    .unwrap();

    replica
        .add_record(fields(json!({"name": "Asha"})))
        .await
        .unwrap();
    replica.set_connectivity(true).await;
    replica.settle().await;

    assert!(store.scan_all(Partition::Pending).await.unwrap().is_empty());
    let view = replica.materialize().await.unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, "srv-1");
    assert_eq!(replica.sync_now().await, SyncOutcome::Synced { flushed: 0 });
}
