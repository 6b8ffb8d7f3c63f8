use std::time::Duration;

use crate::protocol::{membership::MembershipConfig, NodeID};
use crate::ReconfigResult;

pub mod node_config_vals {
    /// default 1
    pub const NODE_ID: u64 = 1u64;
    /// default true, a server with reconfig disabled rejects every
    /// reconfiguration with `ReconfigDisabled`.
    pub const RECONFIG_ENABLED: bool = true;
    /// default 3s, how long a config record may wait for its commit.
    pub const PROPOSE_TIMEOUT_MILLIS: u64 = 3000;
    /// default 1s, how long a session read waits for the replica to
    /// catch up with the version the session already observed.
    pub const READ_SYNC_TIMEOUT_MILLIS: u64 = 1000;
    /// default 16, committed configs kept for version conditioned reads.
    pub const CONFIG_HISTORY_LIMIT: usize = 16;
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Node ID, must be the id of a `ServerSpec` in the seed config
    /// or in a config the node joins later.
    pub id: NodeID,
    pub reconfig_enabled: bool,
    pub propose_timeout_millis: u64,
    pub read_sync_timeout_millis: u64,
    pub history_limit: usize,
}

use node_config_vals as vals;
impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: vals::NODE_ID,
            reconfig_enabled: vals::RECONFIG_ENABLED,
            propose_timeout_millis: vals::PROPOSE_TIMEOUT_MILLIS,
            read_sync_timeout_millis: vals::READ_SYNC_TIMEOUT_MILLIS,
            history_limit: vals::CONFIG_HISTORY_LIMIT,
        }
    }
}

impl NodeConfig {

    pub fn with_id(id: NodeID) -> Self {
        Self { id, ..Default::default() }
    }

    /// Copy of this config for another node of the same ensemble.
    pub fn for_node(&self, id: NodeID) -> Self {
        Self { id, ..self.clone() }
    }

    #[inline]
    pub fn propose_timeout(&self) -> Duration {
        Duration::from_millis(self.propose_timeout_millis)
    }

    #[inline]
    pub fn read_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.read_sync_timeout_millis)
    }

    /// At least the current and the previous config are kept.
    #[inline]
    pub fn history_limit(&self) -> usize {
        std::cmp::max(self.history_limit, 2)
    }
}

/// Parse the static seed membership, which uses the same line format as
/// the wire. Whatever version line it carries, an ensemble always starts
/// at version `0`.
pub fn parse_seed(seed: &str) -> ReconfigResult<MembershipConfig> {
    let parsed = MembershipConfig::parse(seed)?;
    MembershipConfig::bootstrap(parsed.members().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Version;

    #[test]
    fn test_parse_seed() {
        let seed = "\
            # static seed\n\
            server.1=localhost:2888:3888:participant;localhost:2181\n\
            server.2=localhost:2889:3889;2182\n\
            version=100000002\n";
        let config = parse_seed(seed).unwrap();
        assert_eq!(config.version(), Version::ZERO);
        assert_eq!(config.participants().count(), 2);
        assert!(parse_seed("server.1=localhost:2888").is_err());
    }

    #[test]
    fn test_limits() {
        let mut conf = NodeConfig::with_id(3);
        conf.history_limit = 0;
        assert_eq!(conf.history_limit(), 2);
        assert_eq!(conf.for_node(4).id, 4);
        assert_eq!(conf.propose_timeout(), Duration::from_millis(3000));
    }
}
