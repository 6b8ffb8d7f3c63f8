use quick_error::quick_error;

use crate::protocol::{NodeID, SessionID, Version};

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: std::io::Error) {
            from()
            source(err)
        }
        /// Malformed or contradictory reconfig arguments, e.g. both the
        /// incremental and the non-incremental form were supplied.
        BadArguments(reason: String) {
            display("bad arguments: {}", reason)
        }
        /// The expected version of a reconfig no longer matches the current config.
        StaleVersion(expected: Version, current: Version) {
            display("expected config version {} but current is {}", expected, current)
        }
        InvalidMembership(reason: String) {
            display("invalid membership: {}", reason)
        }
        /// The candidate config has no quorum that intersects the current one,
        /// or no quorum of it is connected to the leader.
        UnsafeReconfiguration(reason: String) {
            display("new config has no quorum: {}", reason)
        }
        ReconfigInProgress {
            display("another reconfiguration is in progress")
        }
        ReconfigDisabled {
            display("dynamic reconfiguration is disabled on this server")
        }
        NotLeader(leader: Option<NodeID>) {
            display("not leader, current leader is {:?}", leader)
        }
        /// The coordinator was deposed (or lost its quorum) before the
        /// config record committed, nothing was applied.
        LostLeadership(reason: String) {
            display("lost leadership during proposal: {}", reason)
        }
        ReplicaLagging(required: Version, applied: Version) {
            display("replica applied config {} while session already observed {}", applied, required)
        }
        NoSuchSession(session: SessionID) {
            display("session {:#x} not found", session)
        }
        NoSuchServer(server: NodeID) {
            display("server {} is not running in this ensemble", server)
        }
        Pending {
            display("request still in pending")
        }
    }
}

impl PartialEq for Error {
    #[cfg_attr(feature = "cargo-clippy", allow(clippy::match_same_arms))]
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (Error::Io(ref e1), Error::Io(ref e2)) => e1.kind() == e2.kind(),
            (Error::BadArguments(_), Error::BadArguments(_)) => true,
            (Error::StaleVersion(e1, c1), Error::StaleVersion(e2, c2)) => e1 == e2 && c1 == c2,
            (Error::InvalidMembership(_), Error::InvalidMembership(_)) => true,
            (Error::UnsafeReconfiguration(_), Error::UnsafeReconfiguration(_)) => true,
            (Error::ReconfigInProgress, Error::ReconfigInProgress) => true,
            (Error::ReconfigDisabled, Error::ReconfigDisabled) => true,
            (Error::NotLeader(l1), Error::NotLeader(l2)) => l1 == l2,
            (Error::LostLeadership(_), Error::LostLeadership(_)) => true,
            (Error::ReplicaLagging(r1, a1), Error::ReplicaLagging(r2, a2)) => r1 == r2 && a1 == a2,
            (Error::NoSuchSession(s1), Error::NoSuchSession(s2)) => s1 == s2,
            (Error::NoSuchServer(s1), Error::NoSuchServer(s2)) => s1 == s2,
            (Error::Pending, Error::Pending) => true,
            _ => false,
        }
    }
}

impl Error {
    pub fn bad_arguments<R: ToString>(reason: R) -> Self {
        Self::BadArguments(reason.to_string())
    }

    pub fn invalid_membership<R: ToString>(reason: R) -> Self {
        Self::InvalidMembership(reason.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
