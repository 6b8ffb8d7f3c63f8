use crate::errors::{Error as ConsensusError, Result as ReconfigResult};
use std::io::{Error, ErrorKind};

use super::Stamp;

/// Outcome of a write submitted to the commit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proposal {
    /// Committed in total order with the assigned stamp.
    Commit(Stamp),
    Pending,
    Timeout,
}

impl Proposal {
    #[inline]
    pub fn committed(&self) -> Option<Stamp> {
        match self {
            Proposal::Commit(stamp) => Some(*stamp),
            _ => None,
        }
    }
}

impl TryFrom<ReconfigResult<Stamp>> for Proposal {
    type Error = ConsensusError;

    fn try_from(value: ReconfigResult<Stamp>) -> Result<Self, Self::Error> {
        match value {
            Ok(stamp) => Ok(Proposal::Commit(stamp)),
            Err(e) => match e {
                ConsensusError::Io(io) if io.kind() == ErrorKind::TimedOut => Ok(Proposal::Timeout),
                ConsensusError::Pending => Ok(Proposal::Pending),
                _ => Err(e),
            },
        }
    }
}

impl From<Proposal> for ReconfigResult<Stamp> {
    fn from(proposal: Proposal) -> Self {
        match proposal {
            Proposal::Commit(stamp) => Ok(stamp),
            Proposal::Pending => Err(ConsensusError::Pending),
            Proposal::Timeout => {
                let timeout_err = Error::new(ErrorKind::TimedOut, "timeout for proposal");
                Err(ConsensusError::Io(timeout_err))
            }
        }
    }
}
