//! A single-decree Paxos acceptor for linearizable compare-and-set writes to
//! the partitions of a partitioned data store.
//!
//! Coordinators that race to update the same partition each run a round of
//! [Paxos][wikipedia]. This crate implements the acceptor's side of such a
//! round: the prepare, accept and learn phases, the ballot rules that decide
//! which coordinator may proceed and the per-key mutual exclusion that keeps
//! concurrent rounds for the same key from corrupting each other's view of
//! the persisted state. Quorums, retries and leader election are the
//! coordinator's business.
//!
//! [wikipedia]: https://en.wikipedia.org/wiki/Paxos_(computer_science)
//!
//! # Usage
//!
//! Paxos state and data are persisted through a [`Storage`] implementation,
//! which decides what a [`Mutation`] is. A [`PaxosService`] is then spawned
//! for it, running one event loop per shard.
//!
//! ```
//! use cas_paxos::{Ballot, Mutation, PartitionKey, Proposal, Timestamp};
//!
//! #[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
//! pub struct SetBalance {
//!     account: PartitionKey,
//!     balance: u64,
//! }
//!
//! impl Mutation for SetBalance {
//!     fn partition_key(&self) -> &PartitionKey {
//!         &self.account
//!     }
//! }
//!
//! let first = Ballot::generate(Timestamp::from_micros(1_000));
//! let second = Ballot::generate_after(first);
//! assert!(second.is_newer_than(&first));
//!
//! let proposal = Proposal::new(
//!     second,
//!     SetBalance {
//!         account: PartitionKey::from("alice"),
//!         balance: 42,
//!     },
//! );
//! assert_eq!(proposal.partition_key(), &PartitionKey::from("alice"));
//! ```
//!
//! A service is configured through its builder.
//!
//! ```ignore
//! let service = PaxosService::builder()
//!     .storing_in(storage)
//!     .with_shards(4)
//!     .recording_metrics_in(Arc::new(LatencyHistograms::new()))
//!     .spawn()?;
//!
//! let response = service
//!     .prepare(Trace::none(), table, key, ballot, Duration::from_secs(2))
//!     .await?;
//! ```
//!
//! # Ballots
//!
//! Ballots are version 1 UUIDs. One ballot is newer than another iff its
//! embedded timestamp is strictly greater. A prepare is promised only for a
//! strictly newer ballot, a proposal is accepted for the promised ballot or a
//! strictly newer one. Two distinct ballots with the same timestamp therefore
//! never beat each other.
//!
//! # Features
//!
//! - `prototyping`: In-memory [`Storage`] and a recording [`Tracer`] for tests
//!   and prototypes.

#![warn(rust_2018_idioms)]
#![warn(clippy::wildcard_imports)]

pub mod acceptor;
pub mod ballot;
pub mod deadline;
pub mod error;
pub mod executor;
pub mod locking;
pub mod metrics;
pub mod partition;
#[cfg(feature = "prototyping")]
pub mod prototyping;
pub mod shard;
pub mod storage;
pub mod tracer;

mod proposal;
mod service;
mod util;

pub use ballot::{Ballot, Timestamp};
pub use deadline::Deadline;
pub use error::{PaxosError, SpawnError, StorageError};
pub use executor::Executor;
pub use metrics::{LatencyHistograms, Metrics, Phase};
pub use partition::{Blake3Partitioner, PartitionKey, Partitioner, ShardId, Token};
pub use proposal::{Mutation, PrepareResponse, Proposal};
pub use service::{PaxosService, PaxosServiceBuilder, PaxosServiceBuilderBlank};
pub use storage::{PaxosState, Storage, TableId};
pub use tracer::{Trace, Tracer};
