use crate::protocol::NodeID;
use crate::HashSet;
use super::majority::Majority;

use super::{Quorum, VoteResult};
use super::VoteResult::{Won, Lost, Pending};

/// Joint is made up of 2 kinds of marjority, they're incoming and outgoing.
/// Consider in this scenario, an ensemble with participants [1,2,3] removes
/// participant 3, the config record which commits [1,2] must be acked by a
/// majority of outgoing [1,2,3] and a majority of incoming [1,2], so that
/// neither side can decide without the other noticing.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct Joint {
    /// participants of the config being proposed.
    pub(crate) incoming: Majority,
    /// participants of the config currently in effect.
    pub(crate) outgoing: Majority
}

impl Joint {

    pub fn new(voters: HashSet<NodeID>) -> Self {
        Joint {
            incoming: Majority::new(voters),
            outgoing: Majority::default()
        }
    }

    /// Joint quorum moving from `outgoing` to `incoming`.
    pub fn between(outgoing: Majority, incoming: Majority) -> Self {
        Joint { incoming, outgoing }
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeID> + '_ {
        self.incoming.union(&self.outgoing).cloned()
    }

    #[inline]
    pub fn already_joint(&self) -> bool {
        !self.outgoing.is_empty()
    }
}

impl Quorum for Joint {

    /// Determine if there exists specific voter in joint then true
    fn contain_voter(&self, to_peer_id: NodeID) -> bool {
        self.incoming.contains(&to_peer_id) || self.outgoing.contains(&to_peer_id)
    }

    fn vote_result(&self, vote_check: impl Fn(NodeID) -> Option<bool>) -> VoteResult {
        let vote1 = self.incoming.vote_result(&vote_check);
        let vote2 = self.outgoing.vote_result(vote_check);
        match (vote1, vote2) {
            (Won, Won) => Won,
            (Lost, _) | (_, Lost) => Lost,
            _ => Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_needs_both_sides() {
        let outgoing: Majority = vec![1, 2, 3].into_iter().collect();
        let incoming: Majority = vec![3, 4, 5].into_iter().collect();
        let joint = Joint::between(outgoing, incoming);
        assert!(joint.already_joint());
        assert!(joint.contain_voter(5));
        assert_eq!(joint.ids().count(), 5);

        assert!(!joint.is_quorum(&[1, 2]));
        assert!(!joint.is_quorum(&[4, 5]));
        assert!(joint.is_quorum(&[1, 2, 4, 5]));
        assert!(joint.is_quorum(&[1, 3, 4]));
    }

    #[test]
    fn test_half_populated_joint_acts_as_majority() {
        let joint = Joint::new(vec![1, 2, 3].into_iter().collect());
        assert!(!joint.already_joint());
        assert!(joint.is_quorum(&[1, 2]));
        assert_eq!(joint.vote_result(|id| Some(id == 3)), VoteResult::Lost);
    }
}
