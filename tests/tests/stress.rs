mod common;

use std::sync::Arc;
use std::time::Duration;

use cas_paxos::prototyping::InMemoryStorage;
use cas_paxos::{PartitionKey, PaxosService, TableId, Timestamp, Trace};

use common::{ballot_at, proposal, KvWrite, TIMEOUT};

const KEYS: u64 = 16;
const ROUNDS: u64 = 40;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rounds_on_many_keys() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let storage =
        Arc::new(InMemoryStorage::<KvWrite>::new().with_latency(Duration::from_micros(200)));
    let service = PaxosService::builder()
        .storing_in(Arc::clone(&storage))
        .with_shards(4)
        .spawn()
        .unwrap();
    let table = TableId::random();

    let mut tasks = Vec::new();

    for k in 0..KEYS {
        for round in 1..=ROUNDS {
            let service = service.clone();

            tasks.push(tokio::spawn(async move {
                let name = format!("key-{}", k);
                let key = PartitionKey::from(name.as_str());
                let ballot = ballot_at(round * 1_000 + k);

                let promised = service
                    .prepare(Trace::none(), table, key, ballot, TIMEOUT)
                    .await
                    .unwrap()
                    .is_promise();

                if promised {
                    let p = proposal(ballot, &name, &round.to_string());

                    if service.accept(Trace::none(), table, p.clone(), TIMEOUT).await.unwrap() {
                        service.learn(table, p, TIMEOUT, Trace::none()).await.unwrap();
                    }
                }
            }));
        }
    }

    for task in tasks {
        task.await.unwrap();
    }

    for k in 0..KEYS {
        let key = PartitionKey::from(format!("key-{}", k).as_str());
        let state = storage.state(table, &key);

        assert_eq!(storage.peak_concurrency(table, &key), 1);
        assert_eq!(
            state.promised_ballot.timestamp(),
            Timestamp::from_micros(ROUNDS * 1_000 + k)
        );

        // the highest ballot's round always makes it
        let commit = state.most_recent_commit.unwrap();
        assert_eq!(commit.ballot, state.promised_ballot);
        assert_eq!(commit.update.value, ROUNDS.to_string());
    }

    service.shut_down().await;
}
