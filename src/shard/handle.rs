use std::future::Future;

use futures::channel::{mpsc, oneshot};
use futures::sink::SinkExt;

use crate::ballot::Ballot;
use crate::deadline::Deadline;
use crate::error::{PaxosError, ShutDown};
use crate::partition::{PartitionKey, ShardId, Token};
use crate::proposal::PrepareResponse;
use crate::storage::{MutationOf, ProposalOf, Storage, TableId};
use crate::tracer::Trace;

use super::msg::{Request, Response};
use super::RequestAndResponseSender;

/// Sends requests to a shard's [`ShardKeeper`][super::ShardKeeper].
///
/// Once the keeper has stopped, every request fails with
/// [`ShutDown`][crate::error::ShutDown].
pub struct ShardHandle<S: Storage> {
    shard: ShardId,
    sender: mpsc::Sender<RequestAndResponseSender<S>>,
}

impl<S: Storage> Clone for ShardHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shard: self.shard,
            sender: self.sender.clone(),
        }
    }
}

impl<S: Storage> std::fmt::Debug for ShardHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardHandle")
            .field("shard", &self.shard)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl<S: Storage> ShardHandle<S> {
    pub(super) fn new(shard: ShardId, sender: mpsc::Sender<RequestAndResponseSender<S>>) -> Self {
        Self { shard, sender }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Whether the keeper stopped accepting requests.
    pub fn is_shut_down(&self) -> bool {
        self.sender.is_closed()
    }

    /// Fails with [`PaxosError::Timeout`] if the request is still queued or
    /// being handled when `deadline` passes.
    pub fn prepare(
        &self,
        trace: Trace,
        table: TableId,
        token: Token,
        key: PartitionKey,
        ballot: Ballot,
        deadline: Deadline,
    ) -> impl Future<Output = Result<PrepareResponse<MutationOf<S>>, PaxosError>> {
        crate::dispatch_shard_req!(self, Prepare, {
            trace,
            table,
            token,
            key,
            ballot,
            deadline,
        }, until deadline)
    }

    pub fn accept(
        &self,
        trace: Trace,
        table: TableId,
        token: Token,
        proposal: ProposalOf<S>,
        deadline: Deadline,
    ) -> impl Future<Output = Result<bool, PaxosError>> {
        crate::dispatch_shard_req!(self, Accept, {
            trace,
            table,
            token,
            proposal,
            deadline,
        }, until deadline)
    }

    /// Asks the keeper to stop.
    ///
    /// Resolves once the requests the keeper already received were answered.
    pub fn shut_down(&self) -> impl Future<Output = Result<(), ShutDown>> {
        crate::dispatch_shard_req!(self, Shutdown)
    }
}
