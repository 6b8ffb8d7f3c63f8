// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::protocol::NodeID;
use crate::HashSet;

use std::collections::hash_set::Iter;
use std::fmt::Formatter;
use std::ops::Deref;

use super::{Quorum, VoteResult};

/// A set of IDs that uses majority quorums to make decisions. impl in Hashset
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Majority {
    voters: HashSet<NodeID>,
}

impl Quorum for Majority {

    fn vote_result(&self, check: impl Fn(NodeID) -> Option<bool>) -> VoteResult {
        if self.voters.is_empty() {
            // By convention, the elections on an empty config win. This comes in
            // handy with joint quorums because it'll make a half-populated joint
            // quorum behave like a majority quorum.
            return VoteResult::Won;
        }

        let (mut yes, mut no) = (0, 0);
        for voter in self.voters.iter() {
            match check(*voter) {
                // got ensured vote result from supporter
                Some(true) => yes += 1,
                Some(false) => no += 1,
                // the vote maybe not arrived, not meaning reject
                _ => ()
            }
        }
        let quorum_requirement = majority(self.voters.len());
        if yes >= quorum_requirement {
            VoteResult::Won
        } else if no > self.voters.len() - quorum_requirement {
            VoteResult::Lost
        } else {
            VoteResult::Pending
        }
    }

    #[inline] fn contain_voter(&self, to_peer_id: NodeID) -> bool {
        self.voters.contains(&to_peer_id)
    }
}

impl Majority {
    /// Creates a new Majority using the given IDs.
    pub fn new(voters: HashSet<NodeID>) -> Majority {
        Majority { voters }
    }

    /// Returns an iterator over voters.
    pub fn ids(&self) -> Iter<'_, NodeID> {
        self.voters.iter()
    }

    /// Voter ids in ascending order.
    pub fn sorted(&self) -> Vec<NodeID> {
        let mut voters: Vec<NodeID> = self.voters.iter().cloned().collect();
        voters.sort_unstable();
        voters
    }
}

/// Calculate quorm of given total.
#[inline] pub fn majority (total: usize) -> usize {
    total / 2 + 1
}

impl Deref for Majority {
    type Target = HashSet<NodeID>;

    #[inline]
    fn deref(&self) -> &HashSet<NodeID> {
        &self.voters
    }
}

impl FromIterator<NodeID> for Majority {
    fn from_iter<I: IntoIterator<Item = NodeID>>(iter: I) -> Self {
        Majority::new(iter.into_iter().collect())
    }
}

impl std::fmt::Display for Majority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({})",
            self.sorted()
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_result() {
        let voters: Majority = vec![1, 2, 3].into_iter().collect();
        assert_eq!(voters.vote_result(|id| Some(id != 3)), VoteResult::Won);
        assert_eq!(voters.vote_result(|id| if id == 1 { Some(true) } else { None }), VoteResult::Pending);
        assert_eq!(voters.vote_result(|id| Some(id == 1)), VoteResult::Lost);
        assert_eq!(Majority::default().vote_result(|_| None), VoteResult::Won);
    }

    #[test]
    fn test_is_quorum() {
        let voters: Majority = vec![1, 2, 3, 4].into_iter().collect();
        assert!(!voters.is_quorum(&[1, 2]));
        assert!(voters.is_quorum(&[1, 2, 4]));
        assert!(!voters.is_quorum(&[5, 6, 7]));
        assert_eq!(majority(4), 3);
        assert_eq!(voters.to_string(), "(1 2 3 4)");
    }
}
