use serde::{Deserialize, Serialize};

use super::{server::ServerSpec, NodeID, Version};
use crate::errors::{Error, Result};

/// The membership change a client asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberChange {
    /// Delta based change, members are added and removed by id.
    Incremental {
        joining: Vec<ServerSpec>,
        leaving: Vec<NodeID>,
    },
    /// Full replacement of the member list.
    NonIncremental { new_members: Vec<ServerSpec> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconfigRequest {
    pub change: MemberChange,
    /// `None` accepts any current version.
    pub expected_version: Option<Version>,
}

impl ReconfigRequest {
    pub fn incremental(joining: Vec<ServerSpec>, leaving: Vec<NodeID>) -> Self {
        Self {
            change: MemberChange::Incremental { joining, leaving },
            expected_version: None,
        }
    }

    pub fn non_incremental(new_members: Vec<ServerSpec>) -> Self {
        Self {
            change: MemberChange::NonIncremental { new_members },
            expected_version: None,
        }
    }

    pub fn expect_version(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }

    #[inline]
    pub fn is_incremental(&self) -> bool {
        matches!(self.change, MemberChange::Incremental { .. })
    }

    /// Build a request from its wire arguments: comma separated `joining`
    /// specs and `leaving` ids, or a comma separated `new_members` list,
    /// plus the expected version in hex (`-1` for any).
    pub fn from_wire(
        joining: Option<&str>,
        leaving: Option<&str>,
        new_members: Option<&str>,
        current_version: &str,
    ) -> Result<Self> {
        let present = |arg: Option<&str>| arg.map(|a| !a.trim().is_empty()).unwrap_or(false);
        let incremental = present(joining) || present(leaving);
        let change = match (incremental, present(new_members)) {
            (true, true) => {
                return Err(Error::bad_arguments(
                    "incremental and non-incremental changes can't be mixed",
                ))
            }
            (false, false) => return Err(Error::bad_arguments("no membership change given")),
            (true, false) => MemberChange::Incremental {
                joining: ServerSpec::parse_list(joining.unwrap_or_default())?,
                leaving: parse_ids(leaving.unwrap_or_default())?,
            },
            (false, true) => MemberChange::NonIncremental {
                new_members: ServerSpec::parse_list(new_members.unwrap_or_default())?,
            },
        };
        Ok(Self {
            change,
            expected_version: Version::parse_expected(current_version)?,
        })
    }
}

fn parse_ids(ids: &str) -> Result<Vec<NodeID>> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            let id = id.strip_prefix("server.").unwrap_or(id);
            id.parse::<NodeID>()
                .map_err(|_| Error::bad_arguments(format!("invalid leaving id {:?}", id)))
        })
        .collect()
}
