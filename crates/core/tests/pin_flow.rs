use pinhold_api::node::{FetchError, MockNodeClient};
use pinhold_api::pinner::{FailureCode, Pinner};
use pinhold_api::{BlobId, PinError};
use pinhold_core::factories::core_pinner::{
    read_queue_snapshot, write_queue_snapshot, CorePinner, CorePinnerConfig,
};
use pinhold_core::Ed25519Signer;
use pinhold_test_utils::iter_check;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Attempts = Arc<Mutex<HashMap<String, u32>>>;

/// A node client that succeeds for `a`, times out twice before
/// succeeding for `b`, and cannot reach the node for `c`.
fn scenario_node() -> (Arc<MockNodeClient>, Attempts) {
    let attempts: Attempts = Arc::new(Mutex::new(HashMap::new()));

    let mut node = MockNodeClient::new();
    node.expect_fetch().returning({
        let attempts = attempts.clone();
        move |blob_id, _on_progress| {
            let count = {
                let mut lock = attempts.lock().unwrap();
                let count = lock.entry(blob_id.to_string()).or_insert(0);
                *count += 1;
                *count
            };
            match blob_id.as_str() {
                "b" if count <= 2 => Err(FetchError::DownloadTimeout(
                    PinError::other("download timed out"),
                )),
                "c" => Err(FetchError::ConnectionTimeout(PinError::other(
                    "connection timed out",
                ))),
                _ => Ok(()),
            }
        }
    });
    node.expect_pin().returning(|_| Ok(()));

    (Arc::new(node), attempts)
}

#[test]
fn mixed_batch_resolves_with_one_connection_failure() {
    pinhold_test_utils::enable_tracing();

    let (node, attempts) = scenario_node();
    let pinner =
        CorePinner::spawn(CorePinnerConfig { worker_count: 3 }, node);

    pinner.request_blobs(vec!["a".into(), "b".into(), "c".into()]);

    iter_check!({
        if pinner.in_flight_count() == 0 {
            break;
        }
    });

    let failures = pinner.drain_failures();
    assert_eq!(1, failures.len());
    assert_eq!(BlobId::from("c"), failures[0].blob_id);
    assert_eq!(FailureCode::NodeUnreachable, failures[0].code);

    let attempts = attempts.lock().unwrap();
    assert_eq!(Some(&1), attempts.get("a"));
    assert_eq!(Some(&3), attempts.get("b"));
    assert_eq!(Some(&1), attempts.get("c"));

    pinner.shutdown();
}

#[test]
fn queue_snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue");

    let blob_ids = vec![
        BlobId::from("QmOne"),
        BlobId::from("QmTwo"),
        BlobId::from("QmThree"),
    ];
    write_queue_snapshot(&path, &blob_ids).unwrap();

    assert_eq!(blob_ids, read_queue_snapshot(&path).unwrap());
}

#[test]
fn unrecognized_snapshot_header_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue");

    std::fs::write(&path, "some-other-format\nQmOne\n").unwrap();
    assert!(read_queue_snapshot(&path).is_err());
}

#[test]
fn snapshot_restores_into_the_engine() {
    pinhold_test_utils::enable_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue");
    write_queue_snapshot(
        &path,
        &[BlobId::from("QmOne"), BlobId::from("QmTwo")],
    )
    .unwrap();

    let (node, attempts) = scenario_node();
    let pinner =
        CorePinner::spawn(CorePinnerConfig { worker_count: 2 }, node);

    pinner.request_blobs(read_queue_snapshot(&path).unwrap());

    iter_check!({
        if pinner.in_flight_count() == 0 {
            break;
        }
    });
    let attempts = attempts.lock().unwrap();
    assert_eq!(Some(&1), attempts.get("QmOne"));
    assert_eq!(Some(&1), attempts.get("QmTwo"));
}

#[test]
fn factory_wiring_respects_the_module_config() {
    pinhold_test_utils::enable_tracing();

    let mut builder = pinhold_core::default_builder(Arc::new(
        Ed25519Signer::from_seed(&[1; 32]),
    ));
    builder.set_default_config().unwrap();
    builder.config =
        serde_json::from_str(r#"{"pinner":{"workerCount":2}}"#).unwrap();
    let builder = builder.build();

    let (node, attempts) = scenario_node();
    let pinner = builder.pinner.create(builder.clone(), node).unwrap();

    pinner.request_blobs(vec!["a".into()]);
    iter_check!({
        if pinner.in_flight_count() == 0 {
            break;
        }
    });
    assert_eq!(Some(&1), attempts.lock().unwrap().get("a"));
    assert!(pinner.drain_failures().is_empty());

    pinner.shutdown();
}
