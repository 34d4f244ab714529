use std::fmt;

use crate::ballot::Ballot;
use crate::partition::PartitionKey;

/// A change to a single partition.
///
/// Mutations are opaque to the protocol. They must be idempotent when
/// replayed because a decision may be learned more than once.
pub trait Mutation:
    Clone + fmt::Debug + Send + Sync + 'static + serde::Serialize + serde::de::DeserializeOwned
{
    /// Key of the partition this mutation applies to.
    fn partition_key(&self) -> &PartitionKey;
}

/// A ballot paired with the mutation the coordinator wants to be accepted.
///
/// Once a quorum has accepted a proposal, it is called a decision.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "M: Mutation")]
pub struct Proposal<M> {
    pub ballot: Ballot,
    pub update: M,
}

impl<M: Mutation> Proposal<M> {
    pub fn new(ballot: Ballot, update: M) -> Self {
        Self { ballot, update }
    }

    pub fn partition_key(&self) -> &PartitionKey {
        self.update.partition_key()
    }
}

impl<M: fmt::Debug> fmt::Display for Proposal<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proposal({}, {:?})", self.ballot, self.update)
    }
}

/// Reply to a prepare request.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "M: Mutation")]
pub enum PrepareResponse<M> {
    /// The ballot was promised.
    ///
    /// The coordinator must complete `accepted_proposal`, if any, in place of
    /// its own mutation.
    Promise {
        accepted_proposal: Option<Proposal<M>>,
        most_recent_commit: Option<Proposal<M>>,
    },

    /// A ballot at least as recent was promised before.
    ///
    /// The coordinator must retry with a ballot newer than `promised_ballot`.
    Conflict { promised_ballot: Ballot },
}

impl<M> PrepareResponse<M> {
    pub fn is_promise(&self) -> bool {
        matches!(self, PrepareResponse::Promise { .. })
    }

    /// The ballot to beat, if the prepare was rejected.
    pub fn conflicting_ballot(&self) -> Option<Ballot> {
        match self {
            PrepareResponse::Promise { .. } => None,
            PrepareResponse::Conflict { promised_ballot } => Some(*promised_ballot),
        }
    }
}

impl<M: fmt::Debug> fmt::Display for PrepareResponse<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareResponse::Promise {
                accepted_proposal,
                most_recent_commit,
            } => {
                f.write_str("promise(")?;
                match accepted_proposal {
                    Some(p) => write!(f, "{}", p)?,
                    None => f.write_str("-")?,
                }
                f.write_str(", ")?;
                match most_recent_commit {
                    Some(p) => write!(f, "{}", p)?,
                    None => f.write_str("-")?,
                }
                f.write_str(")")
            }
            PrepareResponse::Conflict { promised_ballot } => {
                write!(f, "conflict({})", promised_ballot)
            }
        }
    }
}
