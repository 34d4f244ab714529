mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::executor::{block_on, LocalPool};
use futures::future;

use cas_paxos::prototyping::StorageOp;
use cas_paxos::{Ballot, Blake3Partitioner, LatencyHistograms, PartitionKey, Partitioner};
use cas_paxos::{PaxosError, PaxosService, Phase, ShardId, SpawnError, TableId, Token, Trace};

use common::{ballot_at, proposal, TIMEOUT};

struct Constant(i64);

impl Partitioner for Constant {
    fn token(&self, _key: &PartitionKey) -> Token {
        Token::new(self.0)
    }
}

#[test]
fn routing_is_deterministic() {
    let storage = common::storage();
    let service = PaxosService::builder()
        .storing_in(Arc::clone(&storage))
        .with_shards(8)
        .spawn()
        .unwrap();

    assert_eq!(service.shard_count(), 8);

    for i in 0..100 {
        let key = PartitionKey::from(format!("key-{}", i).into_bytes());
        let token = Blake3Partitioner.token(&key);

        assert_eq!(service.token_of(&key), token);
        assert_eq!(service.shard_of(&key), ShardId::of(token, 8));
        assert_eq!(service.shard_of(&key), service.shard_of(&key.clone()));
    }
}

#[test]
fn custom_partitioner_routes_everything_to_one_shard() {
    let storage = common::storage();
    let service = PaxosService::builder()
        .storing_in(Arc::clone(&storage))
        .with_shards(4)
        .partitioned_by(Constant(i64::MIN))
        .spawn()
        .unwrap();

    let a = PartitionKey::from("a");
    let b = PartitionKey::from("b");

    assert_eq!(service.token_of(&a), Token::new(i64::MIN));
    assert_eq!(service.shard_of(&a), ShardId::new(0));
    assert_eq!(service.shard_of(&b), ShardId::new(0));

    let table = TableId::random();
    let response = block_on(service.prepare(Trace::none(), table, a, ballot_at(1), TIMEOUT));
    assert!(response.unwrap().is_promise());
}

#[test]
fn zero_shards_are_refused() {
    let result = PaxosService::builder()
        .storing_in(common::storage())
        .with_shards(0)
        .spawn();

    assert!(matches!(result, Err(SpawnError::NoShards)));
}

#[test]
fn runs_in_any_executor() {
    let mut pool = LocalPool::new();

    let storage = common::storage();
    let service = PaxosService::builder()
        .storing_in(Arc::clone(&storage))
        .with_shards(2)
        .with_request_queue_depth(1)
        .spawn_in(pool.spawner())
        .unwrap();
    let table = TableId::random();
    let key = PartitionKey::from("k");

    let ballot = ballot_at(10);
    let prepare = service.prepare(Trace::none(), table, key.clone(), ballot, TIMEOUT);
    assert!(pool.run_until(prepare).unwrap().is_promise());

    let accept = service.accept(Trace::none(), table, proposal(ballot, "k", "v"), TIMEOUT);
    let accepted = pool.run_until(accept);
    assert!(accepted.unwrap());

    pool.run_until(service.shut_down());
    pool.run();

    assert!(storage.state(table, &key).accepted_proposal.is_some());
}

#[test]
fn calls_after_shut_down_fail() {
    let storage = common::storage();
    let service = common::service(&storage);
    let table = TableId::random();
    let key = PartitionKey::from("k");

    block_on(service.shut_down());

    let prepared = block_on(service.prepare(Trace::none(), table, key, ballot_at(1), TIMEOUT));
    assert!(matches!(prepared, Err(PaxosError::ShutDown)));

    let p = proposal(ballot_at(1), "k", "v");

    let accepted = block_on(service.accept(Trace::none(), table, p.clone(), TIMEOUT));
    assert!(matches!(accepted, Err(PaxosError::ShutDown)));

    let learned = block_on(service.learn(table, p, TIMEOUT, Trace::none()));
    assert!(matches!(learned, Err(PaxosError::ShutDown)));

    // shutting down again is harmless
    block_on(service.shut_down());
}

#[test]
fn latency_is_recorded_for_every_outcome() {
    let storage = common::storage();
    let metrics = Arc::new(LatencyHistograms::new());
    let service = PaxosService::builder()
        .storing_in(Arc::clone(&storage))
        .with_shards(2)
        .recording_metrics_in(metrics.clone())
        .spawn()
        .unwrap();
    let table = TableId::random();
    let key = PartitionKey::from("k");

    block_on(service.prepare(Trace::none(), table, key.clone(), ballot_at(100), TIMEOUT)).unwrap();
    block_on(service.prepare(Trace::none(), table, key.clone(), ballot_at(50), TIMEOUT)).unwrap();

    storage.fail_next(StorageOp::Load, 1);
    let failed = block_on(service.prepare(Trace::none(), table, key, ballot_at(200), TIMEOUT));
    assert!(matches!(failed, Err(PaxosError::StorageFailure(_))));

    assert_eq!(metrics.count(table, Phase::Prepare), 3);

    let p = proposal(ballot_at(100), "k", "v");
    block_on(service.accept(Trace::none(), table, p.clone(), TIMEOUT)).unwrap();
    assert_eq!(metrics.count(table, Phase::Propose), 1);

    storage.fail_next(StorageOp::GetTruncatedAt, 1);
    assert!(block_on(service.learn(table, p.clone(), TIMEOUT, Trace::none())).is_err());
    block_on(service.learn(table, p, TIMEOUT, Trace::none())).unwrap();
    assert_eq!(metrics.count(table, Phase::Commit), 2);
}

#[test]
fn storage_failure_releases_the_key() {
    let storage = common::storage();
    let service = common::service(&storage);
    let table = TableId::random();
    let key = PartitionKey::from("k");

    storage.fail_next(StorageOp::SavePromise, 1);

    let ballot = ballot_at(100);

    let failed = block_on(service.prepare(Trace::none(), table, key.clone(), ballot, TIMEOUT));
    assert!(matches!(failed, Err(PaxosError::StorageFailure(_))));

    let retried = block_on(service.prepare(Trace::none(), table, key, ballot, TIMEOUT));
    assert!(retried.unwrap().is_promise());
}

#[test]
fn deadline_covers_time_spent_queued() {
    let storage = common::storage();
    let service = PaxosService::builder()
        .storing_in(Arc::clone(&storage))
        .with_shards(1)
        .with_request_queue_depth(1)
        .spawn()
        .unwrap();
    let table = TableId::random();
    let busy = PartitionKey::from("busy");
    let queued = PartitionKey::from("queued");

    storage.set_latency(Duration::from_millis(300));

    let (first, second) = block_on(future::join(
        service.prepare(Trace::none(), table, busy.clone(), ballot_at(10), TIMEOUT),
        service.prepare(
            Trace::none(),
            table,
            queued.clone(),
            ballot_at(20),
            Duration::from_millis(100),
        ),
    ));

    assert!(first.unwrap().is_promise());
    assert!(matches!(second, Err(PaxosError::Timeout)));

    // expired requests are answered without touching storage
    block_on(service.shut_down());

    assert_eq!(storage.state(table, &queued).promised_ballot, Ballot::MIN);
    assert_eq!(storage.peak_concurrency(table, &queued), 0);
}
