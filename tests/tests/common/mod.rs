#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use cas_paxos::prototyping::InMemoryStorage;
use cas_paxos::{Ballot, Deadline, Mutation, PartitionKey, PaxosService, PaxosState, Proposal};
use cas_paxos::{Storage, StorageError, TableId, Timestamp};

pub const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct KvWrite {
    pub key: PartitionKey,
    pub value: String,
}

impl KvWrite {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: PartitionKey::from(key),
            value: value.to_owned(),
        }
    }
}

impl Mutation for KvWrite {
    fn partition_key(&self) -> &PartitionKey {
        &self.key
    }
}

pub type MemStorage = Arc<InMemoryStorage<KvWrite>>;

pub fn storage() -> MemStorage {
    Arc::new(InMemoryStorage::new())
}

pub fn service(storage: &MemStorage) -> PaxosService<MemStorage> {
    PaxosService::builder()
        .storing_in(Arc::clone(storage))
        .with_shards(4)
        .spawn()
        .unwrap()
}

pub fn ballot_at(micros: u64) -> Ballot {
    Ballot::generate(Timestamp::from_micros(micros))
}

pub fn proposal(ballot: Ballot, key: &str, value: &str) -> Proposal<KvWrite> {
    Proposal::new(ballot, KvWrite::new(key, value))
}

/// A storage call as observed by [`RecordingStorage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    LoadStarted(Timestamp),
    LoadFinished(Timestamp),
    SavePromise(Ballot),
    SaveProposal(Ballot),
    SaveDecision(Ballot),
    ApplyMutation(String),
    GetTruncatedAt,
}

/// Wraps a storage and records the calls made to it.
pub struct RecordingStorage<S> {
    delegate: S,
    calls: Mutex<Vec<Call>>,
}

impl<S: Storage<Mutation = KvWrite>> RecordingStorage<S> {
    pub fn new(delegate: S) -> Self {
        Self {
            delegate,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn delegate(&self) -> &S {
        &self.delegate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl<S: Storage<Mutation = KvWrite>> Storage for RecordingStorage<S> {
    type Mutation = KvWrite;

    async fn load(
        &self,
        table: TableId,
        key: &PartitionKey,
        as_of: Timestamp,
        deadline: Deadline,
    ) -> Result<PaxosState<KvWrite>, StorageError> {
        self.record(Call::LoadStarted(as_of));
        let state = self.delegate.load(table, key, as_of, deadline).await;
        self.record(Call::LoadFinished(as_of));

        state
    }

    async fn save_promise(
        &self,
        table: TableId,
        key: &PartitionKey,
        ballot: Ballot,
        deadline: Deadline,
    ) -> Result<(), StorageError> {
        self.record(Call::SavePromise(ballot));
        self.delegate.save_promise(table, key, ballot, deadline).await
    }

    async fn save_proposal(
        &self,
        table: TableId,
        proposal: &Proposal<KvWrite>,
        deadline: Deadline,
    ) -> Result<(), StorageError> {
        self.record(Call::SaveProposal(proposal.ballot));
        self.delegate.save_proposal(table, proposal, deadline).await
    }

    async fn save_decision(
        &self,
        table: TableId,
        decision: &Proposal<KvWrite>,
        deadline: Deadline,
    ) -> Result<(), StorageError> {
        self.record(Call::SaveDecision(decision.ballot));
        self.delegate.save_decision(table, decision, deadline).await
    }

    async fn apply_mutation(
        &self,
        table: TableId,
        mutation: &KvWrite,
        deadline: Deadline,
    ) -> Result<(), StorageError> {
        self.record(Call::ApplyMutation(mutation.value.clone()));
        self.delegate.apply_mutation(table, mutation, deadline).await
    }

    async fn get_truncated_at(&self, table: TableId) -> Result<Timestamp, StorageError> {
        self.record(Call::GetTruncatedAt);
        self.delegate.get_truncated_at(table).await
    }
}
