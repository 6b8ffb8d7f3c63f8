use crate::protocol::{membership::MembershipConfig, NodeID, Stamp};
use crate::quorum::{Quorum, QuorumSystem, VoteResult};
use crate::role::ElectionOutcome;
use crate::{debug, HashMap, HashSet};

/// Run one election round over the participants of `config`.
///
/// Only `live` participants answer. Each of them votes for the live
/// participant with the highest `(last stamp, id)`, which is the one holding
/// the most recent committed history, so the winner never misses a record
/// committed under a quorum of `config`. Observers neither vote nor run.
pub fn elect(
    config: &MembershipConfig,
    live: &HashSet<NodeID>,
    last_stamps: &HashMap<NodeID, Stamp>,
) -> ElectionOutcome {
    let voters = QuorumSystem::majority_of(config);
    let candidate = voters
        .ids()
        .filter(|id| live.contains(*id))
        .map(|id| (last_stamps.get(id).cloned().unwrap_or_default(), *id))
        .max();
    let (_, candidate) = match candidate {
        Some(candidate) => candidate,
        None => return ElectionOutcome::Pending,
    };

    let result = voters.vote_result(|voter| {
        if live.contains(&voter) {
            Some(true)
        } else {
            None
        }
    });
    debug!(
        "election among {} with live {:?}, candidate {} result {}",
        voters, live, candidate, result
    );
    match result {
        VoteResult::Won => ElectionOutcome::Elected(candidate),
        _ => ElectionOutcome::Pending,
    }
}
