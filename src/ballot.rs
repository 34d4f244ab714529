//! Ballots and the timestamps embedded in them.

use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;

use uuid::Uuid;

/// Number of 100ns intervals between 1582-10-15 (the UUID epoch) and
/// 1970-01-01 (the Unix epoch).
const UUID_EPOCH_OFFSET: u64 = 0x01B2_1DD2_1381_4000;

const TICKS_PER_MICRO: u64 = 10;

/// Microseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        Self(since_epoch.as_micros() as u64)
    }

    pub fn saturating_add(self, duration: std::time::Duration) -> Self {
        Self(self.0.saturating_add(duration.as_micros() as u64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// The unique, time-ordered identifier of a proposal.
///
/// Ballots are version 1 (time-based) UUIDs. The embedded clock is what
/// decides precedence: a ballot is [newer][Ballot::is_newer_than] than
/// another iff its [timestamp][Ballot::timestamp] is strictly greater.
/// Equality, on the other hand, compares the whole identifier, so two distinct
/// ballots with the same timestamp are neither equal nor newer than each
/// other.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Uuid", into = "Uuid")]
pub struct Ballot(Uuid);

impl Ballot {
    /// The ballot a key is considered promised to before it was ever prepared.
    pub const MIN: Ballot = Ballot::new(Timestamp::ZERO, [0x80, 0, 0, 0, 0, 0, 0, 0]);

    /// Creates a ballot from a timestamp and the eight clock sequence and node
    /// bytes.
    ///
    /// The variant bits of `clock_seq_and_node[0]` are overwritten. The UUID
    /// clock is 60 bits wide, timestamps past the year 5236 wrap around.
    pub const fn new(timestamp: Timestamp, clock_seq_and_node: [u8; 8]) -> Self {
        let ticks = timestamp
            .0
            .wrapping_mul(TICKS_PER_MICRO)
            .wrapping_add(UUID_EPOCH_OFFSET);

        let time_low = ticks as u32;
        let time_mid = (ticks >> 32) as u16;
        let time_hi_and_version = ((ticks >> 48) as u16 & 0x0FFF) | 0x1000;

        let mut tail = clock_seq_and_node;
        tail[0] = (tail[0] & 0x3F) | 0x80;

        Self(Uuid::from_fields(time_low, time_mid, time_hi_and_version, &tail))
    }

    /// Creates a ballot for the given timestamp with random clock sequence and
    /// node bits.
    pub fn generate(timestamp: Timestamp) -> Self {
        let random = Uuid::new_v4();
        let mut tail = [0; 8];
        tail.copy_from_slice(&random.as_bytes()[8..]);

        Self::new(timestamp, tail)
    }

    pub fn now() -> Self {
        Self::generate(Timestamp::now())
    }

    /// Creates a ballot that is newer than `floor` and not older than now.
    ///
    /// This is what a coordinator uses to retry after its ballot was
    /// superseded.
    pub fn generate_after(floor: Ballot) -> Self {
        let timestamp = std::cmp::max(
            Timestamp::now(),
            Timestamp(floor.timestamp().0.saturating_add(1)),
        );

        Self::generate(timestamp)
    }

    /// Microsecond timestamp embedded in the ballot.
    pub fn timestamp(&self) -> Timestamp {
        let (time_low, time_mid, time_hi_and_version, _) = self.0.as_fields();

        let ticks = (u64::from(time_hi_and_version & 0x0FFF) << 48)
            | (u64::from(time_mid) << 32)
            | u64::from(time_low);

        Timestamp(ticks.saturating_sub(UUID_EPOCH_OFFSET) / TICKS_PER_MICRO)
    }

    /// Whether this ballot was generated strictly after `other`.
    pub fn is_newer_than(&self, other: &Ballot) -> bool {
        self.timestamp() > other.timestamp()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

/// Orders by timestamp first and falls back to the raw identifier.
///
/// The Paxos rules never consult this order, see
/// [`is_newer_than`][Ballot::is_newer_than].
impl Ord for Ballot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp()
            .cmp(&other.timestamp())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for Ballot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for Ballot {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Debug for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ballot")
            .field(&self.0)
            .field(&self.timestamp())
            .finish()
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("UUID {0} is not time-based")]
pub struct NotTimeBased(pub Uuid);

impl TryFrom<Uuid> for Ballot {
    type Error = NotTimeBased;

    fn try_from(uuid: Uuid) -> Result<Self, Self::Error> {
        if uuid.get_version_num() == 1 {
            Ok(Self(uuid))
        } else {
            Err(NotTimeBased(uuid))
        }
    }
}

impl From<Ballot> for Uuid {
    fn from(ballot: Ballot) -> Self {
        ballot.0
    }
}
