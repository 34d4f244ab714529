//! Partition keys, tokens and the mapping of tokens onto shards.
//!
//! Every Paxos call for a key must land on the same shard, otherwise the
//! per-key lock taken there does not exclude anything. Both mappings in this
//! module are therefore pure functions of their inputs.

use std::fmt;

/// Serialized primary key of a partition.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PartitionKey(Vec<u8>);

impl PartitionKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<Vec<u8>> for PartitionKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "PartitionKey({:?})", s),
            Err(_) => write!(f, "PartitionKey({:02x?})", self.0),
        }
    }
}

/// Position of a partition on the token ring.
///
/// The token doubles as the identity of the partition's lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Token(i64);

impl Token {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Derives tokens from partition keys.
///
/// Implementations must be deterministic and must agree across all callers.
pub trait Partitioner: Send + Sync + 'static {
    fn token(&self, key: &PartitionKey) -> Token;
}

/// The default partitioner, based on BLAKE3.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Partitioner;

impl Partitioner for Blake3Partitioner {
    fn token(&self, key: &PartitionKey) -> Token {
        let hash = blake3::hash(key.as_bytes());

        let mut head = [0; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);

        Token(i64::from_le_bytes(head))
    }
}

/// Index of a shard, i.e. of one single-threaded event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardId(usize);

impl ShardId {
    /// Returns the shard owning `token` out of `shard_count` shards.
    ///
    /// The ring is split into `shard_count` contiguous ranges of equal size.
    ///
    /// # Panics
    ///
    /// Panics if `shard_count` is zero.
    pub fn of(token: Token, shard_count: usize) -> Self {
        assert!(shard_count > 0, "there must be at least one shard");

        let unbiased = (token.0 as u64) ^ (1 << 63);
        let scaled = (u128::from(unbiased) * shard_count as u128) >> 64;

        Self(scaled as usize)
    }

    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard#{}", self.0)
    }
}
