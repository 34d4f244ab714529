use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::acceptor::Acceptor;
use crate::error::SpawnError;
use crate::executor::{ErrorOf, Executor, StdThread};
use crate::metrics::Metrics;
use crate::partition::{Blake3Partitioner, Partitioner, ShardId};
use crate::shard::ShardKeeper;
use crate::storage::Storage;

use super::PaxosService;

const DEFAULT_QUEUE_DEPTH: usize = 32;

pub struct PaxosServiceBuilderBlank<S>(std::marker::PhantomData<S>);

impl<S: Storage> Default for PaxosServiceBuilderBlank<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Storage> PaxosServiceBuilderBlank<S> {
    pub fn new() -> Self {
        Self(std::marker::PhantomData)
    }

    /// Persists Paxos state and applies decided mutations through `storage`.
    ///
    /// Pass an `Arc` to keep access to the storage from outside the service.
    pub fn storing_in(self, storage: S) -> PaxosServiceBuilder<S> {
        PaxosServiceBuilder {
            storage: Arc::new(storage),
            shard_count: default_shard_count(),
            partitioner: Arc::new(Blake3Partitioner),
            metrics: Arc::new(()),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

pub struct PaxosServiceBuilder<S: Storage> {
    storage: Arc<S>,
    shard_count: usize,
    partitioner: Arc<dyn Partitioner>,
    metrics: Arc<dyn Metrics>,
    queue_depth: usize,
}

impl<S: Storage> PaxosServiceBuilder<S> {
    /// Number of shards, i.e. of event loops, to run.
    ///
    /// Defaults to the available parallelism.
    pub fn with_shards(self, shard_count: usize) -> Self {
        Self {
            shard_count,
            ..self
        }
    }

    /// Derives tokens from partition keys with `partitioner` instead of
    /// [`Blake3Partitioner`].
    pub fn partitioned_by(self, partitioner: impl Partitioner) -> Self {
        Self {
            partitioner: Arc::new(partitioner),
            ..self
        }
    }

    pub fn recording_metrics_in(self, metrics: Arc<dyn Metrics>) -> Self {
        Self { metrics, ..self }
    }

    /// Number of requests a shard handles at once.
    ///
    /// Requests beyond that wait in the shard's queue. Their deadline covers
    /// the wait.
    pub fn with_request_queue_depth(self, queue_depth: usize) -> Self {
        Self {
            queue_depth,
            ..self
        }
    }

    /// Spawns one event loop per shard, each on a thread of its own.
    pub fn spawn(self) -> Result<PaxosService<S>, SpawnError<std::io::Error>> {
        self.spawn_in(StdThread)
    }

    /// Spawns one event loop per shard in `executor`.
    pub fn spawn_in<E>(self, executor: E) -> Result<PaxosService<S>, SpawnError<ErrorOf<E>>>
    where
        E: Executor + Clone,
    {
        if self.shard_count == 0 {
            return Err(SpawnError::NoShards);
        }

        let mut shards = Vec::with_capacity(self.shard_count);

        for index in 0..self.shard_count {
            let shard = ShardId::new(index);
            let acceptor = Acceptor::new(
                shard,
                Arc::clone(&self.storage),
                Arc::clone(&self.metrics),
            );
            let (handle, keeper) = ShardKeeper::new(acceptor, self.queue_depth);

            executor
                .clone()
                .execute(keeper)
                .map_err(|err| SpawnError::Executor(index, err))?;

            tracing::info!("Spawned {}.", shard);

            shards.push(handle);
        }

        Ok(PaxosService::new(
            self.storage,
            self.partitioner,
            self.metrics,
            shards,
        ))
    }
}

fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
