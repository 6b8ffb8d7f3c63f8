use crate::errors::{Error, Result};
use crate::protocol::{
    membership::{validate_members, MembershipConfig},
    reconfig::{MemberChange, ReconfigRequest},
    server::ServerSpec,
    NodeID,
};
use crate::quorum::QuorumSystem;
use crate::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    AddPeer,
    RemovePeer,
    /// Same id, but the addresses or the role changed.
    UpdatePeer,
}

/// The ChangeRecord is (peer_id, change), which mark the change of the ensemble<br/>
/// E.g. (peer 1, AddPeer), (peer 1, RemovePeer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord(pub NodeID, pub ChangeType);

/// Candidate member list computed from the current config, together with
/// the records of what changed.
#[derive(Debug, Clone)]
pub struct MemberChanges {
    pub members: Vec<ServerSpec>,
    pub records: Vec<ChangeRecord>,
}

impl MemberChanges {
    /// Whether the set of voting participants differs from `current`.
    pub fn participants_changed(&self, current: &MembershipConfig) -> bool {
        let before: HashSet<NodeID> = current.participants().collect();
        let after: HashSet<NodeID> = self
            .members
            .iter()
            .filter(|m| m.is_participant())
            .map(|m| m.id)
            .collect();
        before != after
    }

    #[inline]
    pub fn participant_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_participant()).count()
    }
}

/// Computes the next member list of a reconfiguration without touching
/// the current config. Nothing here looks at versions or quorums except
/// the zero participant check.
pub struct MembershipChanger<'a> {
    current: &'a MembershipConfig,
}

impl MembershipChanger<'_> {

    pub fn new(current: &MembershipConfig) -> MembershipChanger {
        MembershipChanger { current }
    }

    /// Compute the candidate members of `request`, the result always has at
    /// least one participant and satisfies the member invariants.
    pub fn compute(&self, request: &ReconfigRequest) -> Result<MemberChanges> {
        let changes = match &request.change {
            MemberChange::Incremental { joining, leaving } => self.incremental(joining, leaving)?,
            MemberChange::NonIncremental { new_members } => self.replace(new_members),
        };
        if changes.participant_count() == 0 {
            return Err(Error::invalid_membership(
                "the new config would have no participant",
            ));
        }
        validate_members(&changes.members)?;
        Ok(changes)
    }

    /// `(current \ leaving) ∪ joining`, survivors keep their order and
    /// joining servers are appended in the order given.
    pub fn incremental(&self, joining: &[ServerSpec], leaving: &[NodeID]) -> Result<MemberChanges> {
        let leaving: HashSet<NodeID> = leaving.iter().cloned().collect();
        for id in leaving.iter() {
            if !self.current.contains(*id) {
                return Err(Error::invalid_membership(format!(
                    "leaving server {} is not a member",
                    id
                )));
            }
        }
        let mut records = Vec::with_capacity(joining.len() + leaving.len());
        let mut joined = HashSet::default();
        for spec in joining {
            if leaving.contains(&spec.id) {
                return Err(Error::invalid_membership(format!(
                    "server {} can't both join and leave",
                    spec.id
                )));
            }
            if self.current.contains(spec.id) || !joined.insert(spec.id) {
                return Err(Error::invalid_membership(format!(
                    "joining server {} is already a member",
                    spec.id
                )));
            }
            records.push(ChangeRecord(spec.id, ChangeType::AddPeer));
        }

        let mut members: Vec<ServerSpec> = self
            .current
            .members()
            .iter()
            .filter(|m| {
                let leave = leaving.contains(&m.id);
                if leave {
                    records.push(ChangeRecord(m.id, ChangeType::RemovePeer));
                }
                !leave
            })
            .cloned()
            .collect();
        members.extend(joining.iter().cloned());
        Ok(MemberChanges { members, records })
    }

    /// The replacement list verbatim, records diff it against current.
    pub fn replace(&self, new_members: &[ServerSpec]) -> MemberChanges {
        let mut records = vec![];
        for spec in new_members {
            match self.current.get(spec.id) {
                None => records.push(ChangeRecord(spec.id, ChangeType::AddPeer)),
                Some(old) if old != spec => {
                    records.push(ChangeRecord(spec.id, ChangeType::UpdatePeer))
                }
                _ => (),
            }
        }
        for id in self.current.ids() {
            if !new_members.iter().any(|m| m.id == id) {
                records.push(ChangeRecord(id, ChangeType::RemovePeer));
            }
        }
        MemberChanges {
            members: new_members.to_vec(),
            records,
        }
    }

    /// Reject `next` if some majority of it may miss every majority of
    /// the current config.
    pub fn check_safety(&self, next: &MembershipConfig) -> Result<()> {
        if QuorumSystem::quorums_intersect(self.current, next) {
            return Ok(());
        }
        Err(Error::UnsafeReconfiguration(format!(
            "quorums of {} and {} may be disjoint",
            QuorumSystem::majority_of(self.current),
            QuorumSystem::majority_of(next)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::protocol::server::{Endpoint, ServerRole};

    fn spec(id: NodeID) -> ServerSpec {
        let port = 6000 + id as u16 * 10;
        ServerSpec::new(id, "localhost", port, port + 1, ServerRole::Participant, Endpoint::new("localhost", port + 2))
    }

    fn current() -> MembershipConfig {
        MembershipConfig::bootstrap(vec![spec(1), spec(2), spec(3)]).unwrap()
    }

    #[test]
    fn test_incremental_remove_then_add() {
        let c = current();
        let changer = MembershipChanger::new(&c);
        let removed = changer.compute(&ReconfigRequest::incremental(vec![], vec![2])).unwrap();
        let ids: Vec<NodeID> = removed.members.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(removed.records, vec![ChangeRecord(2, ChangeType::RemovePeer)]);
        assert!(removed.participants_changed(&c));

        let added = changer.compute(&ReconfigRequest::incremental(vec![spec(4)], vec![])).unwrap();
        assert_eq!(added.members.len(), 4);
        assert_eq!(added.records[0].1, ChangeType::AddPeer);
    }

    #[test]
    fn test_incremental_invalid() {
        let c = current();
        let changer = MembershipChanger::new(&c);
        let collide = changer.compute(&ReconfigRequest::incremental(vec![spec(1)], vec![]));
        assert!(matches!(collide, Err(Error::InvalidMembership(_))));
        let unknown = changer.compute(&ReconfigRequest::incremental(vec![], vec![7]));
        assert!(matches!(unknown, Err(Error::InvalidMembership(_))));
        let both = changer.compute(&ReconfigRequest::incremental(vec![spec(4)], vec![4]));
        assert!(matches!(both, Err(Error::InvalidMembership(_))));
        let empty = changer.compute(&ReconfigRequest::incremental(vec![], vec![1, 2, 3]));
        assert!(matches!(empty, Err(Error::InvalidMembership(_))));
    }

    #[test]
    fn test_replace() {
        let c = current();
        let changer = MembershipChanger::new(&c);
        let same = changer
            .compute(&ReconfigRequest::non_incremental(vec![spec(3), spec(2), spec(1)]))
            .unwrap();
        assert!(same.records.is_empty());
        assert!(!same.participants_changed(&c));

        let mut observer = spec(3);
        observer.role = ServerRole::Observer;
        let demote = changer
            .compute(&ReconfigRequest::non_incremental(vec![spec(1), spec(2), observer]))
            .unwrap();
        assert_eq!(demote.records, vec![ChangeRecord(3, ChangeType::UpdatePeer)]);
        assert!(demote.participants_changed(&c));

        let mut clash = spec(4);
        clash.quorum_addr = spec(1).quorum_addr;
        let invalid = changer.compute(&ReconfigRequest::non_incremental(vec![spec(1), clash]));
        assert!(matches!(invalid, Err(Error::InvalidMembership(_))));
    }

    #[test]
    fn test_check_safety() {
        let c = current();
        let changer = MembershipChanger::new(&c);
        let swap_all = MembershipConfig::bootstrap(vec![spec(4), spec(5), spec(6)]).unwrap();
        assert!(matches!(changer.check_safety(&swap_all), Err(Error::UnsafeReconfiguration(_))));
        let grow = MembershipConfig::bootstrap(vec![spec(1), spec(2), spec(3), spec(4)]).unwrap();
        assert!(changer.check_safety(&grow).is_ok());
    }
}
