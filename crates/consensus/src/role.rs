use std::fmt::{self, Display, Formatter};

use crate::protocol::{membership::MembershipConfig, NodeID};

pub use crate::protocol::server::ServerRole;

/// Runtime role of a server in the ensemble. Unlike `ServerRole`, which is
/// part of the committed membership, this one changes with elections and
/// with every committed config.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum PeerRole {
    /// The server sequences writes and coordinates reconfigurations.
    Leader,
    /// A participant replicating from the leader.
    Follower,
    /// A participant waiting for an election to finish.
    Candidate,
    /// An observer, replicates but never votes.
    Observing,
    /// The server is no longer a member of the ensemble.
    Departed,
}

impl PeerRole {

    /// Whether the role takes part in quorum decisions.
    #[inline]
    pub fn is_voter(&self) -> bool {
        matches!(self, PeerRole::Leader | PeerRole::Follower | PeerRole::Candidate)
    }
}

impl Display for PeerRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let role = match self {
            Self::Leader => "Leader",
            Self::Follower => "Follower",
            Self::Candidate => "Candidate",
            Self::Observing => "Observing",
            Self::Departed => "Departed",
        };
        f.write_str(role)
    }
}

impl From<&str> for PeerRole {
    fn from(case: &str) -> Self {
        let lowcase = case.to_lowercase();
        match lowcase.as_str() {
            "leader" => Self::Leader,
            "follower" => Self::Follower,
            "candidate" => Self::Candidate,
            "observing" | "observer" => Self::Observing,
            "departed" => Self::Departed,
            _ => Self::Follower
        }
    }
}

impl Default for PeerRole {
    fn default() -> Self {
        PeerRole::Follower
    }
}

/// Result of an election round.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ElectionOutcome {
    Elected(NodeID),
    /// No candidate gathered a quorum of votes yet.
    Pending,
}

impl ElectionOutcome {
    #[inline]
    pub fn leader(&self) -> Option<NodeID> {
        match self {
            ElectionOutcome::Elected(leader) => Some(*leader),
            ElectionOutcome::Pending => None,
        }
    }
}

/// Decide the runtime role of server `id` from its `current` role, the
/// latest committed `config`, and the outcome of an election if one just
/// finished.
///
/// A server missing from the config departs, an observer observes whatever
/// happens. Without a fresh election outcome, participants keep their role,
/// except servers coming back from `Observing` or `Departed` which start as
/// followers.
pub fn transition(
    id: NodeID,
    current: PeerRole,
    config: &MembershipConfig,
    outcome: Option<&ElectionOutcome>,
) -> PeerRole {
    match config.role_of(id) {
        None => PeerRole::Departed,
        Some(ServerRole::Observer) => PeerRole::Observing,
        Some(ServerRole::Participant) => match outcome {
            Some(ElectionOutcome::Elected(leader)) if *leader == id => PeerRole::Leader,
            Some(ElectionOutcome::Elected(_)) => PeerRole::Follower,
            Some(ElectionOutcome::Pending) => PeerRole::Candidate,
            None if current.is_voter() => current,
            None => PeerRole::Follower,
        },
    }
}
