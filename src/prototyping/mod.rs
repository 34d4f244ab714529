//! In-memory collaborators for tests and prototypes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::ballot::{Ballot, Timestamp};
use crate::deadline::Deadline;
use crate::error::StorageError;
use crate::partition::PartitionKey;
use crate::proposal::{Mutation, Proposal};
use crate::storage::{PaxosState, Storage, TableId};
use crate::tracer::Tracer;

/// The storage operations, for fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageOp {
    Load,
    SavePromise,
    SaveProposal,
    SaveDecision,
    ApplyMutation,
    GetTruncatedAt,
}

#[derive(Clone, Copy, Debug, Error)]
#[error("injected failure of {0:?}")]
pub struct InjectedFailure(pub StorageOp);

/// One column of a row, last write wins by timestamp.
#[derive(Clone, Debug)]
struct Column<T> {
    /// `None` for a tombstone.
    value: Option<T>,
    timestamp: Timestamp,
    expires_at: Option<Timestamp>,
}

impl<T: Clone> Column<T> {
    fn read(column: &Option<Column<T>>, as_of: Timestamp) -> Option<T> {
        column
            .as_ref()
            .filter(|c| c.expires_at.map_or(true, |e| e > as_of))
            .and_then(|c| c.value.clone())
    }

    fn write(
        column: &mut Option<Column<T>>,
        value: Option<T>,
        timestamp: Timestamp,
        ttl: Option<Duration>,
    ) {
        let supersedes = match column {
            None => true,
            Some(existing) if timestamp > existing.timestamp => true,
            // on ties, deletions win
            Some(existing) if timestamp == existing.timestamp => existing.value.is_some(),
            Some(_) => false,
        };

        if supersedes {
            *column = Some(Column {
                value,
                timestamp,
                expires_at: ttl.map(|ttl| timestamp.saturating_add(ttl)),
            });
        }
    }
}

#[derive(Debug)]
struct Row<M> {
    promised: Option<Column<Ballot>>,
    accepted: Option<Column<Proposal<M>>>,
    commit: Option<Column<Proposal<M>>>,
}

impl<M> Default for Row<M> {
    fn default() -> Self {
        Self {
            promised: None,
            accepted: None,
            commit: None,
        }
    }
}

#[derive(Debug, Default)]
struct Concurrency {
    current: usize,
    peak: usize,
}

#[derive(Debug)]
struct Inner<M> {
    rows: HashMap<(TableId, PartitionKey), Row<M>>,
    applied: HashMap<TableId, Vec<M>>,
    truncated_at: HashMap<TableId, Timestamp>,
    faults: HashMap<StorageOp, usize>,
    concurrency: HashMap<(TableId, PartitionKey), Concurrency>,
    latency: Duration,
    ttl: Option<Duration>,
}

impl<M> Default for Inner<M> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            applied: HashMap::new(),
            truncated_at: HashMap::new(),
            faults: HashMap::new(),
            concurrency: HashMap::new(),
            latency: Duration::ZERO,
            ttl: None,
        }
    }
}

/// A [`Storage`] that keeps everything in memory.
///
/// Columns are written with the timestamp of the ballot involved and a write
/// only takes effect if its timestamp is at least as recent as that of the
/// column's current value. A deletion beats a write with the same timestamp.
///
/// Besides that, the storage can be told to be slow, to fail and to forget.
pub struct InMemoryStorage<M> {
    inner: Mutex<Inner<M>>,
}

impl<M> Default for InMemoryStorage<M> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl<M> fmt::Debug for InMemoryStorage<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();

        f.debug_struct("InMemoryStorage")
            .field("rows", &inner.rows.len())
            .field("latency", &inner.latency)
            .field("ttl", &inner.ttl)
            .finish()
    }
}

impl<M> InMemoryStorage<M> {
    fn lock(&self) -> MutexGuard<'_, Inner<M>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: Mutation + PartialEq> InMemoryStorage<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    /// Paxos state expires `ttl` after the timestamp it was written with.
    pub fn with_ttl(self, ttl: Duration) -> Self {
        self.lock().ttl = Some(ttl);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Makes the next `times` invocations of `op` fail.
    pub fn fail_next(&self, op: StorageOp, times: usize) {
        self.lock().faults.insert(op, times);
    }

    pub fn set_truncated_at(&self, table: TableId, truncated_at: Timestamp) {
        self.lock().truncated_at.insert(table, truncated_at);
    }

    /// The Paxos state of `key` as of the epoch, i.e. ignoring expiry.
    pub fn state(&self, table: TableId, key: &PartitionKey) -> PaxosState<M> {
        self.read_state(table, key, Timestamp::ZERO)
    }

    /// Mutations applied to `table`, in order of application.
    pub fn applied(&self, table: TableId) -> Vec<M> {
        self.lock().applied.get(&table).cloned().unwrap_or_default()
    }

    /// Highest number of operations that were in flight for `key` at once.
    ///
    /// Only counts the operations prepare and accept issue, i.e. loads,
    /// promises and proposals.
    pub fn peak_concurrency(&self, table: TableId, key: &PartitionKey) -> usize {
        self.lock()
            .concurrency
            .get(&(table, key.clone()))
            .map_or(0, |c| c.peak)
    }

    fn read_state(&self, table: TableId, key: &PartitionKey, as_of: Timestamp) -> PaxosState<M> {
        let inner = self.lock();

        let row = match inner.rows.get(&(table, key.clone())) {
            Some(row) => row,
            None => return PaxosState::default(),
        };

        PaxosState::new(
            Column::read(&row.promised, as_of).unwrap_or(Ballot::MIN),
            Column::read(&row.accepted, as_of),
            Column::read(&row.commit, as_of),
        )
    }

    async fn enter<'a>(
        &'a self,
        op: StorageOp,
        key: Option<(TableId, &PartitionKey)>,
    ) -> Result<InFlight<'a, M>, StorageError> {
        let latency = {
            let mut inner = self.lock();

            if let Some(remaining) = inner.faults.get_mut(&op).filter(|n| **n > 0) {
                *remaining -= 1;
                tracing::debug!("Injecting failure of {:?}.", op);

                return Err(StorageError::failure(InjectedFailure(op)));
            }

            inner.latency
        };

        let in_flight = InFlight::enter(self, key);

        if latency > Duration::ZERO {
            futures_timer::Delay::new(latency).await;
        }

        Ok(in_flight)
    }

    fn write<F>(&self, table: TableId, key: &PartitionKey, write: F)
    where
        F: FnOnce(&mut Row<M>, Option<Duration>),
    {
        let mut inner = self.lock();
        let ttl = inner.ttl;

        write(inner.rows.entry((table, key.clone())).or_default(), ttl);
    }
}

/// Counts an operation as in flight for its key until dropped.
struct InFlight<'a, M> {
    storage: &'a InMemoryStorage<M>,
    key: Option<(TableId, PartitionKey)>,
}

impl<'a, M> InFlight<'a, M> {
    fn enter(storage: &'a InMemoryStorage<M>, key: Option<(TableId, &PartitionKey)>) -> Self {
        let key = key.map(|(t, k)| (t, k.clone()));

        if let Some(key) = &key {
            let mut inner = storage.lock();
            let c = inner.concurrency.entry(key.clone()).or_default();

            c.current += 1;
            c.peak = c.peak.max(c.current);
        }

        Self { storage, key }
    }
}

impl<'a, M> Drop for InFlight<'a, M> {
    fn drop(&mut self) {
        if let Some(key) = &self.key {
            let mut inner = self.storage.lock();

            if let Some(c) = inner.concurrency.get_mut(key) {
                c.current -= 1;
            }
        }
    }
}

#[async_trait]
impl<M: Mutation + PartialEq> Storage for InMemoryStorage<M> {
    type Mutation = M;

    async fn load(
        &self,
        table: TableId,
        key: &PartitionKey,
        as_of: Timestamp,
        _deadline: Deadline,
    ) -> Result<PaxosState<M>, StorageError> {
        let _in_flight = self.enter(StorageOp::Load, Some((table, key))).await?;

        Ok(self.read_state(table, key, as_of))
    }

    async fn save_promise(
        &self,
        table: TableId,
        key: &PartitionKey,
        ballot: Ballot,
        _deadline: Deadline,
    ) -> Result<(), StorageError> {
        let _in_flight = self.enter(StorageOp::SavePromise, Some((table, key))).await?;

        self.write(table, key, |row, ttl| {
            Column::write(&mut row.promised, Some(ballot), ballot.timestamp(), ttl);
        });

        Ok(())
    }

    async fn save_proposal(
        &self,
        table: TableId,
        proposal: &Proposal<M>,
        _deadline: Deadline,
    ) -> Result<(), StorageError> {
        let key = proposal.partition_key();
        let _in_flight = self.enter(StorageOp::SaveProposal, Some((table, key))).await?;

        let timestamp = proposal.ballot.timestamp();

        self.write(table, key, |row, ttl| {
            Column::write(&mut row.promised, Some(proposal.ballot), timestamp, ttl);
            Column::write(&mut row.accepted, Some(proposal.clone()), timestamp, ttl);
        });

        Ok(())
    }

    async fn save_decision(
        &self,
        table: TableId,
        decision: &Proposal<M>,
        _deadline: Deadline,
    ) -> Result<(), StorageError> {
        let key = decision.partition_key();
        let _in_flight = self.enter(StorageOp::SaveDecision, None).await?;

        let timestamp = decision.ballot.timestamp();

        self.write(table, key, |row, ttl| {
            Column::write(&mut row.accepted, None, timestamp, ttl);
            Column::write(&mut row.commit, Some(decision.clone()), timestamp, ttl);
        });

        Ok(())
    }

    async fn apply_mutation(
        &self,
        table: TableId,
        mutation: &M,
        _deadline: Deadline,
    ) -> Result<(), StorageError> {
        let _in_flight = self.enter(StorageOp::ApplyMutation, None).await?;

        let mut inner = self.lock();
        let applied = inner.applied.entry(table).or_default();

        if !applied.contains(mutation) {
            applied.push(mutation.clone());
        }

        Ok(())
    }

    async fn get_truncated_at(&self, table: TableId) -> Result<Timestamp, StorageError> {
        let _in_flight = self.enter(StorageOp::GetTruncatedAt, None).await?;

        let truncated_at = self.lock().truncated_at.get(&table).copied();

        Ok(truncated_at.unwrap_or(Timestamp::ZERO))
    }
}

/// A [`Tracer`] that remembers every message.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    messages: Mutex<Vec<String>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Tracer for RecordingTracer {
    fn trace(&self, message: fmt::Arguments<'_>) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
