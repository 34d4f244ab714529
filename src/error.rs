use thiserror::Error;

use crate::deadline::Elapsed;
use crate::locking::LockTimeout;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A Paxos phase could not be carried out.
///
/// Losing to a newer ballot is _not_ an error. Prepare reports it as
/// [`Conflict`][crate::PrepareResponse::Conflict] and accept as `false`.
#[derive(Debug, Error)]
pub enum PaxosError {
    /// The deadline passed while waiting for the key's lock or for storage.
    #[error("operation timed out")]
    Timeout,

    #[error("storage failure")]
    StorageFailure(#[source] BoxError),

    /// The shard that owns the key is no longer running.
    #[error("shard is shut down")]
    ShutDown,
}

impl From<StorageError> for PaxosError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Timeout => PaxosError::Timeout,
            StorageError::Failure(source) => PaxosError::StorageFailure(source),
        }
    }
}

impl From<LockTimeout> for PaxosError {
    fn from(_: LockTimeout) -> Self {
        PaxosError::Timeout
    }
}

impl From<Elapsed> for PaxosError {
    fn from(_: Elapsed) -> Self {
        PaxosError::Timeout
    }
}

impl From<ShutDown> for PaxosError {
    fn from(_: ShutDown) -> Self {
        PaxosError::ShutDown
    }
}

/// Error reported by a [`Storage`][crate::storage::Storage] implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage operation timed out")]
    Timeout,

    #[error("storage operation failed")]
    Failure(#[source] BoxError),
}

impl StorageError {
    pub fn failure(source: impl Into<BoxError>) -> Self {
        Self::Failure(source.into())
    }
}

impl From<Elapsed> for StorageError {
    fn from(_: Elapsed) -> Self {
        StorageError::Timeout
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            StorageError::Timeout
        } else {
            StorageError::Failure(Box::new(e))
        }
    }
}

/// The shard's event loop has stopped.
#[derive(Clone, Copy, Debug, Error)]
#[error("shard is shut down")]
pub struct ShutDown;

#[derive(Debug, Error)]
pub enum SpawnError<E> {
    #[error("at least one shard is required")]
    NoShards,

    #[error("failed to spawn shard {0}")]
    Executor(usize, #[source] E),
}
