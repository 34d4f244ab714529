//! The per-key Paxos acceptor.
//!
//! Prepare and accept are read-modify-write sequences on a key's persisted
//! [`PaxosState`][crate::storage::PaxosState] and run under the key's lock.
//! Learn does not take the lock. It relies on storage ordering writes by
//! timestamp instead.

use std::future::Future;
use std::sync::Arc;

use crate::ballot::Ballot;
use crate::deadline::Deadline;
use crate::error::{PaxosError, StorageError};
use crate::locking::KeyLocks;
use crate::metrics::{Metrics, Phase};
use crate::partition::{PartitionKey, ShardId, Token};
use crate::proposal::PrepareResponse;
use crate::storage::{MutationOf, ProposalOf, Storage, TableId};
use crate::tracer::Trace;
use crate::util::Timed;

/// The acceptor of one shard.
///
/// Owns the shard's lock table. Storage and metrics are shared with the
/// other shards.
pub struct Acceptor<S: Storage> {
    shard: ShardId,
    storage: Arc<S>,
    metrics: Arc<dyn Metrics>,
    locks: KeyLocks,
}

impl<S: Storage> Clone for Acceptor<S> {
    fn clone(&self) -> Self {
        Self {
            shard: self.shard,
            storage: Arc::clone(&self.storage),
            metrics: Arc::clone(&self.metrics),
            locks: self.locks.clone(),
        }
    }
}

impl<S: Storage> std::fmt::Debug for Acceptor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptor")
            .field("shard", &self.shard)
            .field("locks", &self.locks)
            .finish()
    }
}

impl<S: Storage> Acceptor<S> {
    pub fn new(shard: ShardId, storage: Arc<S>, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            shard,
            storage,
            metrics,
            locks: KeyLocks::new(),
        }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    /// Handles a prepare request for `ballot`.
    ///
    /// Promises `ballot` if it is strictly newer than the promised ballot and
    /// reports the conflicting ballot otherwise.
    pub async fn prepare(
        &self,
        trace: Trace,
        table: TableId,
        token: Token,
        key: PartitionKey,
        ballot: Ballot,
        deadline: Deadline,
    ) -> Result<PrepareResponse<MutationOf<S>>, PaxosError> {
        let handled = self.handle_prepare(&trace, table, token, &key, ballot, deadline);

        record(&*self.metrics, table, Phase::Prepare, handled).await
    }

    /// Handles a proposal.
    ///
    /// The proposal is accepted if its ballot is the promised one or newer.
    /// Returns whether it was accepted.
    pub async fn accept(
        &self,
        trace: Trace,
        table: TableId,
        token: Token,
        proposal: ProposalOf<S>,
        deadline: Deadline,
    ) -> Result<bool, PaxosError> {
        let handled = self.handle_proposal(&trace, table, token, &proposal, deadline);

        record(&*self.metrics, table, Phase::Propose, handled).await
    }

    async fn handle_prepare(
        &self,
        trace: &Trace,
        table: TableId,
        token: Token,
        key: &PartitionKey,
        ballot: Ballot,
        deadline: Deadline,
    ) -> Result<PrepareResponse<MutationOf<S>>, PaxosError> {
        let _permit = self.locks.acquire(token, deadline).await?;

        let now = ballot.timestamp();
        let state = bounded(deadline, self.storage.load(table, key, now, deadline)).await?;

        if ballot.is_newer_than(&state.promised_ballot) {
            crate::log_and_trace!(trace, "Promising ballot {}", ballot);

            bounded(
                deadline,
                self.storage.save_promise(table, key, ballot, deadline),
            )
            .await?;

            Ok(PrepareResponse::Promise {
                accepted_proposal: state.accepted_proposal,
                most_recent_commit: state.most_recent_commit,
            })
        } else {
            crate::log_and_trace!(
                trace,
                "Promise rejected; {} is not sufficiently newer than {}",
                ballot,
                state.promised_ballot
            );

            Ok(PrepareResponse::Conflict {
                promised_ballot: state.promised_ballot,
            })
        }
    }

    async fn handle_proposal(
        &self,
        trace: &Trace,
        table: TableId,
        token: Token,
        proposal: &ProposalOf<S>,
        deadline: Deadline,
    ) -> Result<bool, PaxosError> {
        let _permit = self.locks.acquire(token, deadline).await?;

        let now = proposal.ballot.timestamp();
        let key = proposal.partition_key();
        let state = bounded(deadline, self.storage.load(table, key, now, deadline)).await?;

        let promised = state.promised_ballot;

        if proposal.ballot == promised || proposal.ballot.is_newer_than(&promised) {
            crate::log_and_trace!(trace, "Accepting proposal {}", proposal);

            bounded(
                deadline,
                self.storage.save_proposal(table, proposal, deadline),
            )
            .await?;

            Ok(true)
        } else {
            crate::log_and_trace!(
                trace,
                "Rejecting proposal for {} because in_progress is now {}",
                proposal,
                promised
            );

            Ok(false)
        }
    }
}

/// Handles a decision.
///
/// Applies the decided mutation unless its ballot predates the table's last
/// truncation, then records the decision as the key's most recent commit.
/// Runs without the key's lock; concurrent writes for the same key are
/// resolved by storage's timestamp ordering.
pub async fn learn<S: Storage>(
    storage: &S,
    metrics: &dyn Metrics,
    table: TableId,
    decision: &ProposalOf<S>,
    deadline: Deadline,
    trace: &Trace,
) -> Result<(), PaxosError> {
    let handled = handle_decision(storage, table, decision, deadline, trace);

    record(metrics, table, Phase::Commit, handled).await
}

async fn handle_decision<S: Storage>(
    storage: &S,
    table: TableId,
    decision: &ProposalOf<S>,
    deadline: Deadline,
    trace: &Trace,
) -> Result<(), PaxosError> {
    let truncated_at = bounded(deadline, storage.get_truncated_at(table)).await?;

    if decision.ballot.timestamp() >= truncated_at {
        crate::log_and_trace!(trace, "Committing decision {}", decision);

        bounded(
            deadline,
            storage.apply_mutation(table, &decision.update, deadline),
        )
        .await?;
    } else {
        crate::log_and_trace!(
            trace,
            "Not committing decision {} as ballot timestamp predates last truncation time",
            decision
        );
    }

    bounded(deadline, storage.save_decision(table, decision, deadline)).await
}

async fn bounded<T>(
    deadline: Deadline,
    storage_call: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, PaxosError> {
    Ok(deadline.run(storage_call).await??)
}

fn record<'a, F: Future>(
    metrics: &'a dyn Metrics,
    table: TableId,
    phase: Phase,
    handled: F,
) -> Timed<F, impl FnOnce(std::time::Duration) + 'a> {
    Timed::new(handled, move |latency| {
        tracing::trace!("{} on table {} took {:?}.", phase, table, latency);
        metrics.record_latency(table, phase, latency)
    })
}
