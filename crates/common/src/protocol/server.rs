use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use super::NodeID;
use crate::errors::{Error, Result};

pub const SERVER_KEY_PREFIX: &str = "server.";
/// Host used when a client address is given as a bare port.
pub const ANY_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new<H: ToString>(host: H, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse "host:port", or a bare "port" which binds on any host.
impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (host, port) = match s.rfind(':') {
            Some(split) => (&s[..split], &s[split + 1..]),
            None => (ANY_HOST, s),
        };
        if host.is_empty() {
            return Err(Error::bad_arguments(format!("missing host in {:?}", s)));
        }
        let port = parse_port(port)?;
        Ok(Endpoint::new(host, port))
    }
}

/// Whether a member takes part in quorum decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerRole {
    Participant,
    Observer,
}

impl Default for ServerRole {
    fn default() -> Self {
        ServerRole::Participant
    }
}

impl ServerRole {
    #[inline]
    pub fn is_participant(&self) -> bool {
        matches!(self, ServerRole::Participant)
    }
}

impl Display for ServerRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ServerRole::Participant => write!(f, "participant"),
            ServerRole::Observer => write!(f, "observer"),
        }
    }
}

impl FromStr for ServerRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "participant" => Ok(ServerRole::Participant),
            "observer" => Ok(ServerRole::Observer),
            other => Err(Error::bad_arguments(format!("unknown server role {:?}", other))),
        }
    }
}

/// A member of the ensemble, rendered as
/// `server.<id>=<host>:<quorumPort>:<electionPort>:<role>;<clientHost>:<clientPort>`.
///
/// The quorum (peer replication) and election endpoints always share a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerSpec {
    pub id: NodeID,
    pub quorum_addr: Endpoint,
    pub election_addr: Endpoint,
    pub client_addr: Endpoint,
    pub role: ServerRole,
}

impl ServerSpec {
    pub fn new(
        id: NodeID,
        host: &str,
        quorum_port: u16,
        election_port: u16,
        role: ServerRole,
        client_addr: Endpoint,
    ) -> Self {
        Self {
            id,
            quorum_addr: Endpoint::new(host, quorum_port),
            election_addr: Endpoint::new(host, election_port),
            client_addr,
            role,
        }
    }

    #[inline]
    pub fn is_participant(&self) -> bool {
        self.role.is_participant()
    }

    /// All endpoints this server listens on.
    #[inline]
    pub fn addresses(&self) -> [&Endpoint; 3] {
        [&self.quorum_addr, &self.election_addr, &self.client_addr]
    }

    /// Parse one entry of a server list, either `server.<id>=<spec>` or
    /// `<id>=<spec>`.
    pub fn parse_entry(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| Error::bad_arguments(format!("expect <id>=<spec> but {:?}", entry)))?;
        let key = key.trim();
        let id = key.strip_prefix(SERVER_KEY_PREFIX).unwrap_or(key);
        let id = id
            .parse::<NodeID>()
            .map_err(|_| Error::bad_arguments(format!("invalid server id {:?}", key)))?;
        Self::parse_spec(id, value)
    }

    /// Parse `<host>:<quorumPort>:<electionPort>[:<role>];<client>`.
    pub fn parse_spec(id: NodeID, spec: &str) -> Result<Self> {
        let (peer, client) = spec.trim().split_once(';').ok_or_else(|| {
            Error::bad_arguments(format!("missing client address of server {}: {:?}", id, spec))
        })?;
        let parts: Vec<&str> = peer.split(':').collect();
        let role = match parts.len() {
            3 => ServerRole::Participant,
            4 => parts[3].parse::<ServerRole>()?,
            _ => {
                return Err(Error::bad_arguments(format!(
                    "require host:quorumPort:electionPort[:role] but {:?}",
                    peer
                )))
            }
        };
        let host = parts[0].trim();
        if host.is_empty() {
            return Err(Error::bad_arguments(format!("missing host of server {}", id)));
        }
        let quorum_port = parse_port(parts[1])?;
        let election_port = parse_port(parts[2])?;
        let client_addr = client.parse::<Endpoint>()?;
        Ok(Self::new(id, host, quorum_port, election_port, role, client_addr))
    }

    /// Parse a comma separated list of server entries, blank entries are skipped.
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::parse_entry)
            .collect()
    }
}

impl Display for ServerSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}={}:{}:{};{}",
            SERVER_KEY_PREFIX,
            self.id,
            self.quorum_addr,
            self.election_addr.port,
            self.role,
            self.client_addr
        )
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.trim()
        .parse::<u16>()
        .map_err(|_| Error::bad_arguments(format!("invalid port {:?}", port)))
}
