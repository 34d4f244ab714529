mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::executor::block_on;
use futures::future;

use cas_paxos::prototyping::{RecordingTracer, StorageOp};
use cas_paxos::{PartitionKey, PaxosError, PaxosService, TableId, Timestamp, Trace};

use common::{ballot_at, proposal, Call, KvWrite, RecordingStorage, TIMEOUT};

#[test]
fn learning_twice_equals_learning_once() {
    let storage = common::storage();
    let service = common::service(&storage);
    let table = TableId::random();
    let key = PartitionKey::from("k");

    let decision = proposal(ballot_at(100), "k", "v");
    assert!(block_on(service.accept(Trace::none(), table, decision.clone(), TIMEOUT)).unwrap());

    block_on(service.learn(table, decision.clone(), TIMEOUT, Trace::none())).unwrap();
    let once = (storage.state(table, &key), storage.applied(table));

    block_on(service.learn(table, decision, TIMEOUT, Trace::none())).unwrap();
    let twice = (storage.state(table, &key), storage.applied(table));

    assert_eq!(once, twice);
    assert_eq!(twice.1, vec![KvWrite::new("k", "v")]);
}

#[test]
fn truncated_decisions_are_recorded_but_not_applied() {
    let storage = Arc::new(RecordingStorage::new(common::storage()));
    let service = PaxosService::builder()
        .storing_in(Arc::clone(&storage))
        .with_shards(2)
        .spawn()
        .unwrap();
    let table = TableId::random();
    let key = PartitionKey::from("k");
    let tracer = Arc::new(RecordingTracer::new());

    storage
        .delegate()
        .set_truncated_at(table, Timestamp::from_micros(500));

    let stale = proposal(ballot_at(400), "k", "stale");
    block_on(service.learn(table, stale.clone(), TIMEOUT, Trace::from(Arc::clone(&tracer))))
        .unwrap();

    assert_eq!(
        storage.calls(),
        vec![Call::GetTruncatedAt, Call::SaveDecision(stale.ballot)]
    );
    assert!(storage.delegate().applied(table).is_empty());
    assert_eq!(
        storage.delegate().state(table, &key).most_recent_commit,
        Some(stale.clone())
    );
    assert_eq!(
        tracer.messages(),
        vec![format!(
            "Not committing decision {} as ballot timestamp predates last truncation time",
            stale
        )]
    );
}

#[test]
fn decision_at_truncation_time_is_applied() {
    let storage = common::storage();
    let service = common::service(&storage);
    let table = TableId::random();

    storage.set_truncated_at(table, Timestamp::from_micros(500));

    let decision = proposal(ballot_at(500), "k", "v");
    block_on(service.learn(table, decision, TIMEOUT, Trace::none())).unwrap();

    assert_eq!(storage.applied(table), vec![KvWrite::new("k", "v")]);
}

#[test]
fn failed_application_is_not_recorded() {
    let storage = Arc::new(RecordingStorage::new(common::storage()));
    let service = PaxosService::builder()
        .storing_in(Arc::clone(&storage))
        .with_shards(1)
        .spawn()
        .unwrap();
    let table = TableId::random();
    let key = PartitionKey::from("k");

    let decision = proposal(ballot_at(100), "k", "v");
    assert!(block_on(service.accept(Trace::none(), table, decision.clone(), TIMEOUT)).unwrap());

    storage.delegate().fail_next(StorageOp::ApplyMutation, 1);

    let result = block_on(service.learn(table, decision.clone(), TIMEOUT, Trace::none()));
    assert!(matches!(result, Err(PaxosError::StorageFailure(_))));

    assert!(!storage.calls().contains(&Call::SaveDecision(decision.ballot)));
    let state = storage.delegate().state(table, &key);
    assert_eq!(state.most_recent_commit, None);
    assert_eq!(state.accepted_proposal, Some(decision.clone()));

    // a retry goes through
    block_on(service.learn(table, decision.clone(), TIMEOUT, Trace::none())).unwrap();
    assert_eq!(
        storage.delegate().state(table, &key).most_recent_commit,
        Some(decision)
    );
}

#[test]
fn late_decision_does_not_replace_newer_one() {
    let storage = common::storage();
    let service = common::service(&storage);
    let table = TableId::random();
    let key = PartitionKey::from("k");

    let older = proposal(ballot_at(100), "k", "older");
    let newer = proposal(ballot_at(200), "k", "newer");

    block_on(service.learn(table, newer.clone(), TIMEOUT, Trace::none())).unwrap();
    block_on(service.learn(table, older, TIMEOUT, Trace::none())).unwrap();

    assert_eq!(storage.state(table, &key).most_recent_commit, Some(newer));
}

#[test]
fn learning_clears_only_older_proposals() {
    let storage = common::storage();
    let service = common::service(&storage);
    let table = TableId::random();
    let key = PartitionKey::from("k");

    let decision = proposal(ballot_at(100), "k", "decided");
    let in_progress = proposal(ballot_at(200), "k", "in progress");

    assert!(block_on(service.accept(Trace::none(), table, in_progress.clone(), TIMEOUT)).unwrap());
    block_on(service.learn(table, decision, TIMEOUT, Trace::none())).unwrap();

    assert_eq!(
        storage.state(table, &key).accepted_proposal,
        Some(in_progress)
    );
}

#[test]
fn learning_does_not_wait_for_busy_key() {
    let storage = common::storage();
    let service = common::service(&storage);
    let table = TableId::random();
    let key = PartitionKey::from("k");
    let finished = Mutex::new(Vec::new());

    // the prepare's load is slow, everything after it is not
    storage.set_latency(Duration::from_millis(300));

    let prepare = async {
        let response = service
            .prepare(Trace::none(), table, key.clone(), ballot_at(200), TIMEOUT)
            .await;
        finished.lock().unwrap().push("prepare");
        response
    };

    let decision = proposal(ballot_at(100), "k", "v");
    let learn = async {
        futures_timer::Delay::new(Duration::from_millis(50)).await;
        storage.set_latency(Duration::ZERO);

        let result = service
            .learn(table, decision.clone(), Duration::from_millis(100), Trace::none())
            .await;
        finished.lock().unwrap().push("learn");
        result
    };

    let (prepared, learned) = block_on(future::join(prepare, learn));

    learned.unwrap();
    assert!(prepared.unwrap().is_promise());
    assert_eq!(*finished.lock().unwrap(), vec!["learn", "prepare"]);

    let state = storage.state(table, &key);
    assert_eq!(state.most_recent_commit, Some(decision));
    assert_eq!(state.promised_ballot.timestamp(), Timestamp::from_micros(200));
}
