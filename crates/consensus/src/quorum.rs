pub mod joint;
pub mod majority;

use std::cmp;
use std::fmt::{self, Display};

use crate::protocol::{membership::MembershipConfig, NodeID};
use crate::HashSet;

use self::{joint::Joint, majority::Majority};

/// Abstraction of quorum, a quorum can be a `joint` (combination of two majority)
/// or a `majority`, it's always act as the voting members of the ensemble and
/// decides whether a set of acknowledgements or votes is binding.
pub trait Quorum {

    /// Determine if there exists specific voter in quorum then true
    fn contain_voter(&self, peer_id: NodeID) -> bool;

    /// Tally the votes, `vote_check` returns `Some(true)` for a granted vote,
    /// `Some(false)` for a rejection and `None` if the voter has not answered.
    fn vote_result(&self, vote_check: impl Fn(NodeID) -> Option<bool>) -> VoteResult;

    /// Whether the acked voters are a strict majority.
    fn is_quorum<'a>(&self, acks: impl IntoIterator<Item = &'a NodeID>) -> bool {
        let acks: HashSet<NodeID> = acks.into_iter().cloned().collect();
        self.vote_result(|id| Some(acks.contains(&id))) == VoteResult::Won
    }
}

/// Enum of vote result, now we provide 3 kinds result type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteResult {
    /// Won indicates that the quorum has voted "yes". "yes" votes more `majority(total: usize)`
    Won,
    /// Pending indicates that the decision of the vote depends on future
    /// votes, i.e. neither "yes" nor "no" has reached quorum yet.
    Pending,
    Lost,
}

impl Display for VoteResult {

    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteResult::Won => write!(f, "VoteWon"),
            VoteResult::Lost => write!(f, "VoteLost"),
            VoteResult::Pending => write!(f, "VotePending"),
        }
    }
}

/// Quorum rules over membership configs. Only participants vote, observers
/// never count toward any quorum.
pub struct QuorumSystem;

impl QuorumSystem {

    /// The majority quorum formed by participants of `config`.
    pub fn majority_of(config: &MembershipConfig) -> Majority {
        Majority::new(config.participants().collect())
    }

    /// Joint quorum used while moving from `old` to `new`, a decision
    /// must be won in both of them.
    pub fn joint(old: &MembershipConfig, new: &MembershipConfig) -> Joint {
        Joint::between(Self::majority_of(old), Self::majority_of(new))
    }

    /// `|acks ∩ participants| > |participants| / 2`
    pub fn is_quorum<'a>(config: &MembershipConfig, acks: impl IntoIterator<Item = &'a NodeID>) -> bool {
        let participants = Self::majority_of(config);
        let acked = acks
            .into_iter()
            .filter(|id| participants.contains(*id))
            .collect::<HashSet<_>>()
            .len();
        acked > participants.len() / 2
    }

    /// Whether every majority of `a` and every majority of `b` must share
    /// at least one participant.
    ///
    /// Two majorities can only be disjoint if `a` can fill its majority with
    /// its exclusive members plus some shared ones, `b` likewise, and the
    /// shared ones needed by both do not exceed the shared members.
    pub fn quorums_intersect(a: &MembershipConfig, b: &MembershipConfig) -> bool {
        let (qa, qb) = (Self::majority_of(a), Self::majority_of(b));
        if qa.is_empty() || qb.is_empty() {
            return false;
        }
        let shared = qa.intersection(&qb).count();
        let only_a = qa.len() - shared;
        let only_b = qb.len() - shared;
        let need_a = majority::majority(qa.len()).saturating_sub(only_a);
        let need_b = majority::majority(qb.len()).saturating_sub(only_b);
        need_a + need_b > shared
    }

    /// Number of distinct participants touched by moving from `a` to `b`.
    pub fn participant_changes(a: &MembershipConfig, b: &MembershipConfig) -> usize {
        let (qa, qb) = (Self::majority_of(a), Self::majority_of(b));
        qa.symmetric_difference(&qb).count()
    }

    /// Size of the smallest quorum of `config`, 0 if it has no participant.
    pub fn quorum_size(config: &MembershipConfig) -> usize {
        let participants = config.participants().count();
        cmp::min(participants, majority::majority(participants))
    }
}
