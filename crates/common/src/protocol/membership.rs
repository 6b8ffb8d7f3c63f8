use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use super::{
    server::{ServerRole, ServerSpec, SERVER_KEY_PREFIX},
    NodeID, Version,
};
use crate::errors::{Error, Result};

pub const VERSION_KEY: &str = "version";

/// Versioned description of the ensemble members. Once committed a config
/// is never changed in place, a reconfiguration always produces a new one.
///
/// Members keep their declaration order, so that the serialized form of a
/// config is stable across replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipConfig {
    version: Version,
    members: Vec<ServerSpec>,
}

impl MembershipConfig {
    /// Create a config after checking that ids and addresses are unique.
    pub fn new(version: Version, members: Vec<ServerSpec>) -> Result<Self> {
        validate_members(&members)?;
        Ok(Self { version, members })
    }

    /// The config an ensemble starts with, its version is always `0`.
    pub fn bootstrap(members: Vec<ServerSpec>) -> Result<Self> {
        Self::new(Version::ZERO, members)
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline]
    pub fn members(&self) -> &[ServerSpec] {
        &self.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn get(&self, id: NodeID) -> Option<&ServerSpec> {
        self.members.iter().find(|m| m.id == id)
    }

    #[inline]
    pub fn contains(&self, id: NodeID) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn role_of(&self, id: NodeID) -> Option<ServerRole> {
        self.get(id).map(|m| m.role)
    }

    #[inline]
    pub fn is_participant(&self, id: NodeID) -> bool {
        matches!(self.role_of(id), Some(ServerRole::Participant))
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeID> + '_ {
        self.members.iter().map(|m| m.id)
    }

    /// Ids of members that vote, observers are excluded.
    pub fn participants(&self) -> impl Iterator<Item = NodeID> + '_ {
        self.members
            .iter()
            .filter(|m| m.is_participant())
            .map(|m| m.id)
    }

    pub fn observers(&self) -> impl Iterator<Item = NodeID> + '_ {
        self.members
            .iter()
            .filter(|m| !m.is_participant())
            .map(|m| m.id)
    }

    /// Whether both configs list exactly the same servers with the same
    /// addresses and roles, regardless of order and version.
    pub fn same_members(&self, other: &MembershipConfig) -> bool {
        self.len() == other.len() && self.members.iter().all(|m| other.get(m.id) == Some(m))
    }

    /// Render the config as it is sent to clients, one `server.<id>=...`
    /// line per member followed by a `version=<hex>` line.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.members.len() * 64 + 16);
        for member in self.members.iter() {
            out.push_str(&member.to_string());
            out.push('\n');
        }
        out.push_str(VERSION_KEY);
        out.push('=');
        out.push_str(&self.version.to_string());
        out
    }

    /// Parse the client form of a config. Blank lines, `#` comments and
    /// unknown keys are ignored, a missing version line means version `0`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut members = vec![];
        let mut version = Version::ZERO;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with(SERVER_KEY_PREFIX) {
                members.push(ServerSpec::parse_entry(line)?);
            } else if let Some((key, value)) = line.split_once('=') {
                if key.trim() == VERSION_KEY {
                    version = value.parse::<Version>()?;
                }
            }
        }
        Self::new(version, members)
    }
}

impl Display for MembershipConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for MembershipConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Ids must be positive and unique, and no two members may share an endpoint.
pub fn validate_members(members: &[ServerSpec]) -> Result<()> {
    let mut ids = HashSet::with_capacity(members.len());
    let mut addresses = HashSet::with_capacity(members.len() * 3);
    for member in members {
        if member.id == 0 {
            return Err(Error::invalid_membership("server id must be positive"));
        }
        if !ids.insert(member.id) {
            return Err(Error::invalid_membership(format!(
                "duplicated server id {}",
                member.id
            )));
        }
        for address in member.addresses() {
            if !addresses.insert(address) {
                return Err(Error::invalid_membership(format!(
                    "address {} of server {} is already in use",
                    address, member.id
                )));
            }
        }
    }
    Ok(())
}
