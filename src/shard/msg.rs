use crate::ballot::Ballot;
use crate::deadline::Deadline;
use crate::error::{PaxosError, ShutDown};
use crate::partition::{PartitionKey, Token};
use crate::proposal::PrepareResponse;
use crate::storage::{MutationOf, ProposalOf, Storage, TableId};
use crate::tracer::Trace;

#[derive(Debug)]
pub enum Request<S: Storage> {
    Prepare {
        trace: Trace,
        table: TableId,
        token: Token,
        key: PartitionKey,
        ballot: Ballot,
        deadline: Deadline,
    },

    Accept {
        trace: Trace,
        table: TableId,
        token: Token,
        proposal: ProposalOf<S>,
        deadline: Deadline,
    },

    Shutdown,
}

#[derive(Debug)]
pub enum Response<S: Storage> {
    Prepare(Result<PrepareResponse<MutationOf<S>>, PaxosError>),

    Accept(Result<bool, PaxosError>),

    Shutdown(Result<(), ShutDown>),
}

impl<S: Storage> Request<S> {
    pub fn deadline(&self) -> Option<Deadline> {
        match self {
            Request::Prepare { deadline, .. } | Request::Accept { deadline, .. } => Some(*deadline),
            Request::Shutdown => None,
        }
    }

    /// The response to this request once its deadline passed.
    pub fn timed_out(&self) -> Response<S> {
        match self {
            Request::Prepare { .. } => Response::Prepare(Err(PaxosError::Timeout)),
            Request::Accept { .. } => Response::Accept(Err(PaxosError::Timeout)),
            Request::Shutdown => Response::Shutdown(Ok(())),
        }
    }
}
