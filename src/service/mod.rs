//! The request-facing surface of the acceptor.

mod builder;

use std::sync::Arc;
use std::time::Duration;

use futures::future;

use crate::acceptor;
use crate::ballot::Ballot;
use crate::deadline::Deadline;
use crate::error::PaxosError;
use crate::metrics::Metrics;
use crate::partition::{PartitionKey, Partitioner, ShardId, Token};
use crate::proposal::PrepareResponse;
use crate::shard::ShardHandle;
use crate::storage::{MutationOf, ProposalOf, Storage, TableId};
use crate::tracer::Trace;

pub use builder::{PaxosServiceBuilder, PaxosServiceBuilderBlank};

/// Routes Paxos requests to the shard owning the key.
///
/// Prepare and accept make a single hop to the owning shard's event loop.
/// Learn runs on the calling task.
pub struct PaxosService<S: Storage> {
    storage: Arc<S>,
    partitioner: Arc<dyn Partitioner>,
    metrics: Arc<dyn Metrics>,
    shards: Vec<ShardHandle<S>>,
}

impl<S: Storage> Clone for PaxosService<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            partitioner: Arc::clone(&self.partitioner),
            metrics: Arc::clone(&self.metrics),
            shards: self.shards.clone(),
        }
    }
}

impl<S: Storage> std::fmt::Debug for PaxosService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaxosService")
            .field("shards", &self.shards)
            .finish()
    }
}

impl<S: Storage> PaxosService<S> {
    pub fn builder() -> PaxosServiceBuilderBlank<S> {
        PaxosServiceBuilderBlank::new()
    }

    fn new(
        storage: Arc<S>,
        partitioner: Arc<dyn Partitioner>,
        metrics: Arc<dyn Metrics>,
        shards: Vec<ShardHandle<S>>,
    ) -> Self {
        Self {
            storage,
            partitioner,
            metrics,
            shards,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn token_of(&self, key: &PartitionKey) -> Token {
        self.partitioner.token(key)
    }

    pub fn shard_of(&self, key: &PartitionKey) -> ShardId {
        ShardId::of(self.token_of(key), self.shard_count())
    }

    /// Handles a prepare request for `key`.
    pub async fn prepare(
        &self,
        trace: Trace,
        table: TableId,
        key: PartitionKey,
        ballot: Ballot,
        timeout: Duration,
    ) -> Result<PrepareResponse<MutationOf<S>>, PaxosError> {
        let deadline = Deadline::after(timeout);
        let token = self.token_of(&key);

        self.handle_for(token)
            .prepare(trace, table, token, key, ballot, deadline)
            .await
    }

    /// Handles a proposal. Returns whether it was accepted.
    pub async fn accept(
        &self,
        trace: Trace,
        table: TableId,
        proposal: ProposalOf<S>,
        timeout: Duration,
    ) -> Result<bool, PaxosError> {
        let deadline = Deadline::after(timeout);
        let token = self.token_of(proposal.partition_key());

        self.handle_for(token)
            .accept(trace, table, token, proposal, deadline)
            .await
    }

    /// Handles a decision.
    pub async fn learn(
        &self,
        table: TableId,
        decision: ProposalOf<S>,
        timeout: Duration,
        trace: Trace,
    ) -> Result<(), PaxosError> {
        let deadline = Deadline::after(timeout);
        let token = self.token_of(decision.partition_key());

        if self.handle_for(token).is_shut_down() {
            return Err(PaxosError::ShutDown);
        }

        acceptor::learn(
            &*self.storage,
            &*self.metrics,
            table,
            &decision,
            deadline,
            &trace,
        )
        .await
    }

    /// Stops every shard once the requests it already received were answered.
    ///
    /// Requests issued afterwards fail with [`PaxosError::ShutDown`].
    pub async fn shut_down(&self) {
        let stopped = future::join_all(self.shards.iter().map(|s| s.shut_down())).await;

        for (shard, result) in self.shards.iter().zip(stopped) {
            if result.is_err() {
                tracing::debug!("{} was already shut down.", shard.shard());
            }
        }
    }

    fn handle_for(&self, token: Token) -> &ShardHandle<S> {
        &self.shards[ShardId::of(token, self.shards.len()).index()]
    }
}
