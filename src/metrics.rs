//! Latency recording hooks.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::storage::TableId;

/// The Paxos phase a latency was recorded for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Prepare,
    Propose,
    Commit,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Prepare, Phase::Propose, Phase::Commit];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Prepare => "cas_prepare",
            Phase::Propose => "cas_propose",
            Phase::Commit => "cas_commit",
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::Prepare => 0,
            Phase::Propose => 1,
            Phase::Commit => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sink for phase latencies.
///
/// Called once per phase invocation, whatever its outcome.
pub trait Metrics: Send + Sync + 'static {
    fn record_latency(&self, table: TableId, phase: Phase, latency: Duration);
}

impl Metrics for () {
    fn record_latency(&self, _table: TableId, _phase: Phase, _latency: Duration) {}
}

impl<M: Metrics> Metrics for std::sync::Arc<M> {
    fn record_latency(&self, table: TableId, phase: Phase, latency: Duration) {
        (**self).record_latency(table, phase, latency)
    }
}

const BUCKETS: usize = 32;

/// A histogram of latencies in power-of-two microsecond buckets.
///
/// Bucket `i` counts latencies in `[2^(i-1), 2^i)` microseconds, with bucket
/// zero holding everything below one microsecond and the last bucket
/// everything that doesn't fit elsewhere.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Histogram {
    count: u64,
    total: Duration,
    max: Duration,
    buckets: [u64; BUCKETS],
}

impl Histogram {
    pub fn record(&mut self, latency: Duration) {
        self.count += 1;
        self.total = self.total.saturating_add(latency);
        self.max = self.max.max(latency);
        self.buckets[bucket_of(latency)] += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }

        let mean_nanos = self.total.as_nanos() / u128::from(self.count);
        Some(Duration::from_nanos(
            u64::try_from(mean_nanos).unwrap_or(u64::MAX),
        ))
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Upper bound of the bucket that contains the `q`-th quantile.
    pub fn quantile_upper_bound(&self, q: f64) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }

        let rank = ((self.count as f64) * q.clamp(0.0, 1.0)).ceil().max(1.0) as u64;

        let mut seen = 0;
        for (i, n) in self.buckets.iter().enumerate() {
            seen += n;

            if seen >= rank {
                if i == BUCKETS - 1 {
                    return Some(self.max);
                }

                return Some(Duration::from_micros(1 << i));
            }
        }

        Some(self.max)
    }
}

fn bucket_of(latency: Duration) -> usize {
    let micros = latency.as_micros();

    if micros == 0 {
        0
    } else {
        let bits = (u128::BITS - micros.leading_zeros()) as usize;
        bits.min(BUCKETS - 1)
    }
}

#[derive(Debug, Default)]
struct TableHistograms([Histogram; 3]);

/// Per-table, per-phase latency histograms.
#[derive(Debug, Default)]
pub struct LatencyHistograms {
    tables: Mutex<HashMap<TableId, TableHistograms>>,
}

impl LatencyHistograms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the histogram for `phase` of `table`.
    pub fn histogram(&self, table: TableId, phase: Phase) -> Histogram {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&table)
            .map(|h| h.0[phase.index()].clone())
            .unwrap_or_default()
    }

    pub fn count(&self, table: TableId, phase: Phase) -> u64 {
        self.histogram(table, phase).count()
    }
}

impl Metrics for LatencyHistograms {
    fn record_latency(&self, table: TableId, phase: Phase, latency: Duration) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);

        tables.entry(table).or_default().0[phase.index()].record(latency);
    }
}
