//! The persistence collaborator.
//!
//! Durable Paxos state and the data itself live outside this crate. The
//! acceptor only talks to them through the [`Storage`] trait and never caches
//! what it loads: every phase starts from a fresh [`load`][Storage::load].

use std::fmt;

use async_trait::async_trait;

use crate::ballot::{Ballot, Timestamp};
use crate::deadline::Deadline;
use crate::error::StorageError;
use crate::partition::PartitionKey;
use crate::proposal::{Mutation, Proposal};

pub type MutationOf<S> = <S as Storage>::Mutation;
pub type PaxosStateOf<S> = PaxosState<MutationOf<S>>;
pub type ProposalOf<S> = Proposal<MutationOf<S>>;

/// Identifies a table, and with it the schema its mutations conform to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct TableId(uuid::Uuid);

impl TableId {
    pub fn new(id: uuid::Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The Paxos state of a single key as persisted.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "M: Mutation")]
pub struct PaxosState<M> {
    /// The most recent ballot this acceptor promised.
    pub promised_ballot: Ballot,
    /// The most recent proposal this acceptor accepted, until it is learned.
    pub accepted_proposal: Option<Proposal<M>>,
    /// The most recent decision this acceptor learned.
    pub most_recent_commit: Option<Proposal<M>>,
}

impl<M> PaxosState<M> {
    pub fn new(
        promised_ballot: Ballot,
        accepted_proposal: Option<Proposal<M>>,
        most_recent_commit: Option<Proposal<M>>,
    ) -> Self {
        Self {
            promised_ballot,
            accepted_proposal,
            most_recent_commit,
        }
    }
}

impl<M> Default for PaxosState<M> {
    fn default() -> Self {
        Self::new(Ballot::MIN, None, None)
    }
}

/// Durable storage of per-key Paxos state and of the data it guards.
///
/// Writes must be ordered by timestamp at the column level: a value written
/// with an older timestamp must not replace one written with a newer
/// timestamp. Prepare, accept and learn use the timestamp of the ballot
/// involved. [`learn`][crate::acceptor::learn] writes without holding the key's
/// lock and depends on this ordering for its correctness.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    type Mutation: Mutation;

    /// Loads the Paxos state of `key`.
    ///
    /// `as_of` is the "now" used to decide whether stored values have
    /// expired. Callers pass the timestamp of the ballot they are acting on,
    /// so that all replicas agree on what has expired.
    async fn load(
        &self,
        table: TableId,
        key: &PartitionKey,
        as_of: Timestamp,
        deadline: Deadline,
    ) -> Result<PaxosState<Self::Mutation>, StorageError>;

    /// Persists `ballot` as the promised ballot of `key`.
    async fn save_promise(
        &self,
        table: TableId,
        key: &PartitionKey,
        ballot: Ballot,
        deadline: Deadline,
    ) -> Result<(), StorageError>;

    /// Persists `proposal` as the accepted proposal of its key.
    async fn save_proposal(
        &self,
        table: TableId,
        proposal: &Proposal<Self::Mutation>,
        deadline: Deadline,
    ) -> Result<(), StorageError>;

    /// Persists `decision` as the most recent commit of its key and deletes
    /// the accepted proposal.
    async fn save_decision(
        &self,
        table: TableId,
        decision: &Proposal<Self::Mutation>,
        deadline: Deadline,
    ) -> Result<(), StorageError>;

    /// Applies `mutation` to the table's data.
    async fn apply_mutation(
        &self,
        table: TableId,
        mutation: &Self::Mutation,
        deadline: Deadline,
    ) -> Result<(), StorageError>;

    /// Time of the table's last truncation.
    ///
    /// Data older than this may have been erased and must not be resurrected.
    /// Tables that were never truncated report [`Timestamp::ZERO`].
    async fn get_truncated_at(&self, table: TableId) -> Result<Timestamp, StorageError>;
}

#[async_trait]
impl<S: Storage> Storage for std::sync::Arc<S> {
    type Mutation = S::Mutation;

    async fn load(
        &self,
        table: TableId,
        key: &PartitionKey,
        as_of: Timestamp,
        deadline: Deadline,
    ) -> Result<PaxosState<Self::Mutation>, StorageError> {
        (**self).load(table, key, as_of, deadline).await
    }

    async fn save_promise(
        &self,
        table: TableId,
        key: &PartitionKey,
        ballot: Ballot,
        deadline: Deadline,
    ) -> Result<(), StorageError> {
        (**self).save_promise(table, key, ballot, deadline).await
    }

    async fn save_proposal(
        &self,
        table: TableId,
        proposal: &Proposal<Self::Mutation>,
        deadline: Deadline,
    ) -> Result<(), StorageError> {
        (**self).save_proposal(table, proposal, deadline).await
    }

    async fn save_decision(
        &self,
        table: TableId,
        decision: &Proposal<Self::Mutation>,
        deadline: Deadline,
    ) -> Result<(), StorageError> {
        (**self).save_decision(table, decision, deadline).await
    }

    async fn apply_mutation(
        &self,
        table: TableId,
        mutation: &Self::Mutation,
        deadline: Deadline,
    ) -> Result<(), StorageError> {
        (**self).apply_mutation(table, mutation, deadline).await
    }

    async fn get_truncated_at(&self, table: TableId) -> Result<Timestamp, StorageError> {
        (**self).get_truncated_at(table).await
    }
}
