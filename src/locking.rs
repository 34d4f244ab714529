//! Per-key mutual exclusion within a shard.
//!
//! Prepare and accept both load a key's Paxos state, decide and then write.
//! Two such read-modify-write sequences for the same key must not interleave,
//! or one of them would decide on state the other is about to overwrite. The
//! [`KeyLocks`] table hands out one [`KeyPermit`] per token at a time.
//!
//! The table only holds entries for keys that are currently locked. An entry
//! is created by the first acquirer and removed by the last release, so the
//! table's size is bounded by the number of contended keys rather than by
//! the number of keys ever touched.

use std::collections::hash_map;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;

use crate::deadline::Deadline;
use crate::partition::Token;

/// Permits per key. A lock table entry whose available permits equal this
/// value has no holder.
const PERMITS_PER_KEY: usize = 1;

type WaiterId = u64;

/// Timed out waiting for a key's permit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("timed out waiting for the lock of token {0}")]
pub struct LockTimeout(pub Token);

struct Entry {
    available: usize,
    waiters: VecDeque<(WaiterId, oneshot::Sender<()>)>,
}

impl Entry {
    fn new() -> Self {
        Self {
            available: PERMITS_PER_KEY,
            waiters: VecDeque::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.available == PERMITS_PER_KEY && self.waiters.is_empty()
    }
}

#[derive(Default)]
struct Table {
    entries: HashMap<Token, Entry>,
    next_waiter_id: WaiterId,
}

impl Table {
    /// Returns one permit for `token`, handing it to the next waiter if there
    /// is one.
    fn release(&mut self, token: Token) {
        let mut entry = match self.entries.entry(token) {
            hash_map::Entry::Occupied(e) => e,
            hash_map::Entry::Vacant(_) => {
                tracing::warn!("Released permit for token {} without lock entry.", token);
                return;
            }
        };

        while let Some((_, waiter)) = entry.get_mut().waiters.pop_front() {
            // The receiving end is only dropped after its waiter was removed
            // from the queue, except when the acquiring task went away without
            // being polled to completion.
            if waiter.send(()).is_ok() {
                return;
            }
        }

        let e = entry.get_mut();
        e.available += 1;

        if e.is_idle() {
            entry.remove();
        }
    }

    fn abandon(&mut self, token: Token, id: WaiterId, receiver: &mut oneshot::Receiver<()>) {
        if let Ok(Some(())) = receiver.try_recv() {
            // handed over after all
            self.release(token);
            return;
        }

        if let hash_map::Entry::Occupied(mut entry) = self.entries.entry(token) {
            entry.get_mut().waiters.retain(|(i, _)| *i != id);

            if entry.get().is_idle() {
                entry.remove();
            }
        }
    }
}

/// The lock table of one shard.
#[derive(Clone, Default)]
pub struct KeyLocks {
    table: Arc<Mutex<Table>>,
}

impl std::fmt::Debug for KeyLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLocks").field("len", &self.len()).finish()
    }
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the permit for `token`.
    ///
    /// Suspends the calling task until the permit is free or `deadline`
    /// passes. The permit is released when the returned [`KeyPermit`] is
    /// dropped. Dropping the returned future before it completes withdraws
    /// from the queue.
    pub async fn acquire(
        &self,
        token: Token,
        deadline: Deadline,
    ) -> Result<KeyPermit, LockTimeout> {
        let mut waiter = {
            let mut table = self.lock_table();
            let id = table.next_waiter_id;
            table.next_waiter_id = id.wrapping_add(1);

            let entry = table.entries.entry(token).or_insert_with(Entry::new);

            if entry.available > 0 {
                entry.available -= 1;

                tracing::trace!("Took uncontended lock for token {}.", token);
                return Ok(self.permit(token));
            }

            let (sender, receiver) = oneshot::channel();
            entry.waiters.push_back((id, sender));

            Waiter {
                table: Arc::clone(&self.table),
                token,
                id,
                receiver,
                settled: false,
            }
        };

        tracing::trace!("Waiting for lock of token {}.", token);

        match deadline.run(&mut waiter.receiver).await {
            Ok(Ok(())) => {
                waiter.settled = true;
                Ok(self.permit(token))
            }
            Ok(Err(oneshot::Canceled)) | Err(_) => {
                // `waiter`'s drop withdraws from the queue, passing on the permit
                // if it was handed over in the meantime.
                Err(LockTimeout(token))
            }
        }
    }

    /// Number of tokens that are currently locked or waited for.
    pub fn len(&self) -> usize {
        self.lock_table().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn permit(&self, token: Token) -> KeyPermit {
        KeyPermit {
            table: Arc::clone(&self.table),
            token,
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, Table> {
        lock(&self.table)
    }
}

fn lock(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    // The table is consistent between statements, a panic elsewhere cannot
    // leave it half-updated.
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Waiter {
    table: Arc<Mutex<Table>>,
    token: Token,
    id: WaiterId,
    receiver: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if !self.settled {
            lock(&self.table).abandon(self.token, self.id, &mut self.receiver);
        }
    }
}

/// Exclusive access to one token's critical section.
#[must_use]
pub struct KeyPermit {
    table: Arc<Mutex<Table>>,
    token: Token,
}

impl KeyPermit {
    pub fn token(&self) -> Token {
        self.token
    }
}

impl std::fmt::Debug for KeyPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyPermit").field(&self.token).finish()
    }
}

impl Drop for KeyPermit {
    fn drop(&mut self) {
        lock(&self.table).release(self.token);
    }
}
