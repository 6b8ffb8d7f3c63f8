pub mod local;

use serde::{Deserialize, Serialize};

use crate::protocol::{
    membership::MembershipConfig, proposal::Proposal, server::ServerSpec, NodeID, SessionID, Stamp,
    Version,
};
use crate::{ConsensusError, ElectionOutcome, HashSet, ReconfigResult};

/// A record travelling through the commit pipeline. Membership changes are
/// ordinary records ordered in the same log as every data write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    CreateSession { session: SessionID, server: NodeID },
    CloseSession { session: SessionID },
    Data(Vec<u8>),
    Reconfig(ConfigProposal),
}

impl Record {
    #[inline]
    pub fn is_reconfig(&self) -> bool {
        matches!(self, Record::Reconfig(_))
    }
}

/// Body of a configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigProposal {
    /// Version of the config the proposal was computed against.
    pub base: Version,
    /// Lowest version the new config may take.
    pub floor: Version,
    pub members: Vec<ServerSpec>,
}

impl ConfigProposal {
    /// The config that committing this proposal at `stamp` produces on top
    /// of `current`. Every replica reaches the same answer: a proposal whose
    /// base is no longer current is a no-op, reported as `StaleVersion`.
    pub fn apply_to(&self, current: &MembershipConfig, stamp: Stamp) -> ReconfigResult<MembershipConfig> {
        if self.base != current.version() {
            return Err(ConsensusError::StaleVersion(self.base, current.version()));
        }
        let version = std::cmp::max(self.floor, stamp);
        MembershipConfig::new(version, self.members.clone())
    }
}

/// The replicated log seam. Implementations provide total order and
/// durability of records, run elections among the replicas and deliver
/// committed records to every replica through its `ApplyListener`.
#[crate::async_trait]
pub trait CommitPipeline: Send + Sync {
    /// Submit `record` as server `from`, only the leader may do it. Returns
    /// after the record committed and was delivered to the local replica.
    async fn propose_write(&self, from: NodeID, record: Record) -> ReconfigResult<Proposal>;

    /// Current leader, if any.
    async fn leader(&self) -> Option<NodeID>;

    /// Replicas connected to the leader and caught up with its log.
    async fn synced_followers(&self) -> HashSet<NodeID>;

    /// Establish a new epoch with `leader` in charge, the returned stamp
    /// carries the new epoch and counter 0.
    async fn establish_epoch(&self, leader: NodeID) -> ReconfigResult<Stamp>;

    /// `leader` gives up leadership, nothing commits until next election.
    async fn resign(&self, leader: NodeID);

    /// Run an election under the latest committed config.
    async fn elect(&self) -> ElectionOutcome;
}

#[allow(unused_variables)]
pub trait ApplyListener: Send + Sync {
    /// Called in commit order, exactly once per record.
    fn on_local_apply(&self, stamp: Stamp, record: &Record);

    /// Called when an election round or an epoch change finished.
    fn on_election(&self, outcome: &ElectionOutcome) {
        // could be customized
    }
}
