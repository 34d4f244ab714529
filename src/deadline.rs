//! Request deadlines.

use std::future::Future;
use std::time::Duration;

use futures::future::FutureExt;

use crate::util::Race;

/// The point in time by which a request must be answered.
///
/// Waiting for a key's lock and every storage call are bounded by the
/// request's deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(instant::Instant);

impl Deadline {
    pub fn at(instant: instant::Instant) -> Self {
        Self(instant)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(instant::Instant::now() + timeout)
    }

    pub fn instant(&self) -> instant::Instant {
        self.0
    }

    /// Time left until the deadline, zero once it passed.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(instant::Instant::now())
    }

    pub fn has_passed(&self) -> bool {
        self.remaining() == Duration::ZERO
    }

    /// Drives `future` to completion unless the deadline passes first.
    ///
    /// `future` is polled before the deadline is checked, so a future that is
    /// immediately ready always succeeds.
    pub async fn run<F: Future>(self, future: F) -> Result<F::Output, Elapsed> {
        let delay = futures_timer::Delay::new(self.remaining()).map(|_| Err(Elapsed));

        Race::between(future.map(Ok), delay).await
    }
}

/// A deadline passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("deadline has elapsed")]
pub struct Elapsed;
