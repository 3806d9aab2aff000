use super::utils::*;
use pinhold_api::node::MockNodeClient;
use pinhold_api::pinner::{FailureCode, Pinner};
use pinhold_api::PinError;
use pinhold_test_utils::id::{create_blob_id_list, random_blob_id};
use pinhold_test_utils::iter_check;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[test]
fn success_decrements_in_flight_once() {
    pinhold_test_utils::enable_tracing();

    let (node, log) = scripted_node(HashMap::new());
    let pinner = spawn_pinner(1, node);

    let blob_id = random_blob_id();
    pinner.request_blobs(vec![blob_id.clone()]);

    iter_check!({
        if pinner.in_flight_count() == 0 {
            break;
        }
    });
    assert_eq!(1, count_of(&log, &blob_id));
    assert!(pinner.drain_failures().is_empty());
}

#[test]
fn pin_failure_is_a_warning_not_a_queue_failure() {
    pinhold_test_utils::enable_tracing();

    let mut node = MockNodeClient::new();
    node.expect_fetch().times(1).returning(|_, _| Ok(()));
    node.expect_pin()
        .times(1)
        .returning(|_| Err(PinError::other("pin rejected")));
    let pinner = spawn_pinner(1, Arc::new(node));

    pinner.request_blobs(vec![random_blob_id()]);

    // the attempt is finalized as completed: no retry, no record
    iter_check!({
        if pinner.in_flight_count() == 0 {
            break;
        }
    });
    assert!(pinner.drain_failures().is_empty());

    pinner.shutdown();
}

#[test]
fn drain_failures_clears_the_list() {
    pinhold_test_utils::enable_tracing();

    let blob_id = random_blob_id();
    let (node, _log) = scripted_node(HashMap::from([(
        blob_id.to_string(),
        FetchScript::ConnectionTimeout,
    )]));
    let pinner = spawn_pinner(1, node);

    pinner.request_blobs(vec![blob_id]);
    iter_check!({
        if pinner.in_flight_count() == 0 {
            break;
        }
    });

    assert_eq!(1, pinner.drain_failures().len());
    assert!(pinner.drain_failures().is_empty());
}

#[test]
fn mixed_outcomes_return_the_counter_to_zero() {
    pinhold_test_utils::enable_tracing();

    let ok = random_blob_id();
    let flaky = random_blob_id();
    let dead = random_blob_id();
    let slow = random_blob_id();
    let (node, _log) = scripted_node(HashMap::from([
        (ok.to_string(), FetchScript::Ok),
        (flaky.to_string(), FetchScript::FailTimes(1)),
        (dead.to_string(), FetchScript::ConnectionTimeout),
        (slow.to_string(), FetchScript::DownloadTimeout),
    ]));
    let pinner = spawn_pinner(2, node);

    pinner.request_blobs(vec![
        ok.clone(),
        flaky.clone(),
        dead.clone(),
        slow.clone(),
    ]);

    iter_check!({
        if pinner.in_flight_count() == 0 {
            break;
        }
    });

    let failures = pinner.drain_failures();
    assert_eq!(2, failures.len());
    let by_id = failures
        .iter()
        .map(|record| (record.blob_id.clone(), record.code))
        .collect::<HashMap<_, _>>();
    assert_eq!(Some(&FailureCode::NodeUnreachable), by_id.get(&dead));
    assert_eq!(Some(&FailureCode::DownloadTimeout), by_id.get(&slow));
}

#[test]
fn concurrent_intake_counter_returns_to_zero() {
    pinhold_test_utils::enable_tracing();

    let (node, log) = scripted_node(HashMap::new());
    let pinner = Arc::new(spawn_pinner(5, node));

    let shared = create_blob_id_list(40);
    let unique = (0..4)
        .map(|_| create_blob_id_list(10))
        .collect::<Vec<_>>();

    let submitters = unique
        .iter()
        .map(|own| {
            let pinner = pinner.clone();
            let shared = shared.clone();
            let own = own.clone();
            std::thread::spawn(move || {
                pinner.request_blobs(shared);
                pinner.request_blobs(own);
            })
        })
        .collect::<Vec<_>>();
    for submitter in submitters {
        submitter.join().unwrap();
    }

    iter_check!({
        if pinner.in_flight_count() == 0 && pinner.task_queue.is_empty() {
            break;
        }
    });

    // ids submitted by a single thread are processed exactly once;
    // racing duplicates of the shared batch at least once
    for blob_id in unique.iter().flatten() {
        assert_eq!(1, count_of(&log, blob_id));
    }
    let processed = log
        .lock()
        .unwrap()
        .iter()
        .cloned()
        .collect::<HashSet<_>>();
    for blob_id in &shared {
        assert!(processed.contains(&blob_id.to_string()));
    }
    assert!(pinner.drain_failures().is_empty());
}
