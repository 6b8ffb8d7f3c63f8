use serde::{Deserialize, Serialize};

use crate::cluster::Ensemble;
use crate::protocol::{reconfig::ReconfigRequest, response::Response, SessionID};
use crate::{debug, ReconfigResult};

/// Client requests in their wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Read the config the session's server applied.
    GetConfig,
    /// `joining`/`leaving` are comma separated spec and id lists,
    /// `new_members` a comma separated spec list, `current_version` the
    /// expected version in hex or `-1`.
    Reconfig {
        joining: Option<String>,
        leaving: Option<String>,
        new_members: Option<String>,
        current_version: String,
    },
}

impl ClientRequest {
    pub fn incremental(joining: Option<&str>, leaving: Option<&str>, current_version: &str) -> Self {
        ClientRequest::Reconfig {
            joining: joining.map(str::to_owned),
            leaving: leaving.map(str::to_owned),
            new_members: None,
            current_version: current_version.to_owned(),
        }
    }

    pub fn non_incremental(new_members: &str, current_version: &str) -> Self {
        ClientRequest::Reconfig {
            joining: None,
            leaving: None,
            new_members: Some(new_members.to_owned()),
            current_version: current_version.to_owned(),
        }
    }
}

impl Ensemble {

    /// Serve `request` for `session`. On success the content is the
    /// serialized config, otherwise the response carries the error code.
    pub async fn handle(&self, session: SessionID, request: ClientRequest) -> Response<String> {
        let result = self.handle_request(session, request).await;
        if let Err(e) = &result {
            debug!("session {:#x} request failed with {}: {}", session, e.code(), e);
        }
        result.into()
    }

    async fn handle_request(&self, session: SessionID, request: ClientRequest) -> ReconfigResult<String> {
        match request {
            ClientRequest::GetConfig => {
                let config = self.read_config(session).await?;
                Ok(config.serialize())
            }
            ClientRequest::Reconfig {
                joining,
                leaving,
                new_members,
                current_version,
            } => {
                let request = ReconfigRequest::from_wire(
                    joining.as_deref(),
                    leaving.as_deref(),
                    new_members.as_deref(),
                    &current_version,
                )?;
                let (config, _) = self.reconfig(session, request).await?;
                Ok(config.serialize())
            }
        }
    }
}
