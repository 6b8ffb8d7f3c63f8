use crate::errors::{Error as ReconfigError, Result as ReconfigResult};
use serde::{Deserialize, Serialize};

pub const SUCCESS: u16 = 20000;
pub const UNKNOWN: u16 = 60000;

/// Response of a client request, `content` is only meaningful
/// when `code` is `SUCCESS`.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct Response<T> {
    /// code ok or failure, max code is 65535
    code: u16,
    /// response hint.
    hint: String,
    content: T,
}

impl<T> Response<T>
where
    T: Default,
{
    pub fn ok(content: T) -> Self {
        Self {
            code: SUCCESS,
            hint: "ok".to_owned(),
            content,
        }
    }

    pub fn failure_with_code(code: u16, hint: String) -> Self {
        let code = if Self::validate_code(code) {
            code
        } else {
            UNKNOWN
        };
        Self {
            code,
            hint,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.code == SUCCESS
    }

    #[inline]
    pub fn code(&self) -> u16 {
        self.code
    }

    #[inline]
    pub fn hint(&self) -> &str {
        &self.hint
    }

    #[inline]
    pub fn content(&self) -> &T {
        &self.content
    }

    #[inline]
    pub fn into_content(self) -> T {
        self.content
    }

    /// Check if the code is valid for error `Response`.
    pub fn validate_code(code: u16) -> bool {
        (BAD_ARGUMENTS..=SYSTEM_ERROR).contains(&code)
    }
}

pub mod error_code {
    /// malformed or contradictory reconfig arguments, or an invalid member list.
    pub const BAD_ARGUMENTS: u16 = 40001;
    /// the given `currentVersion` is stale.
    pub const BAD_VERSION: u16 = 40002;
    /// the new config would break quorum intersection, or has no connected quorum.
    pub const NEW_CONFIG_NO_QUORUM: u16 = 40003;
    pub const RECONFIG_IN_PROGRESS: u16 = 40004;
    pub const RECONFIG_DISABLED: u16 = 40005;
    /// the server is not leader, hint carries the known leader.
    pub const NOT_LEADER: u16 = 40006;
    /// the leader was deposed before commit, retry against the new one.
    pub const CONNECTION_LOSS: u16 = 40007;
    pub const SESSION_EXPIRED: u16 = 40008;
    pub const SYSTEM_ERROR: u16 = 40009;
}

use error_code::*;

impl ReconfigError {
    /// Wire code of this error.
    pub fn code(&self) -> u16 {
        match self {
            ReconfigError::BadArguments(_) | ReconfigError::InvalidMembership(_) => BAD_ARGUMENTS,
            ReconfigError::StaleVersion(..) => BAD_VERSION,
            ReconfigError::UnsafeReconfiguration(_) => NEW_CONFIG_NO_QUORUM,
            ReconfigError::ReconfigInProgress => RECONFIG_IN_PROGRESS,
            ReconfigError::ReconfigDisabled => RECONFIG_DISABLED,
            ReconfigError::NotLeader(_) => NOT_LEADER,
            ReconfigError::LostLeadership(_)
            | ReconfigError::ReplicaLagging(..)
            | ReconfigError::NoSuchServer(_)
            | ReconfigError::Pending => CONNECTION_LOSS,
            ReconfigError::NoSuchSession(_) => SESSION_EXPIRED,
            _ => SYSTEM_ERROR,
        }
    }
}

//==================================
//      Mapping errors to Response
//==================================
impl<T: Default> From<ReconfigResult<T>> for Response<T> {
    fn from(result: ReconfigResult<T>) -> Self {
        match result {
            Ok(content) => Response::ok(content),
            Err(err) => err.into(),
        }
    }
}

impl<T> From<ReconfigError> for Response<T>
where
    T: Default,
{
    fn from(err: ReconfigError) -> Self {
        (&err).into()
    }
}

impl<T> From<&ReconfigError> for Response<T>
where
    T: Default,
{
    fn from(err: &ReconfigError) -> Self {
        Self::failure_with_code(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Stamp;

    #[test]
    fn test_error_codes() {
        let stale: Response<String> =
            ReconfigError::StaleVersion(Stamp::ZERO, Stamp::new(1, 2)).into();
        assert!(!stale.is_ok());
        assert_eq!(stale.code(), BAD_VERSION);

        let unsafe_change: Response<String> =
            ReconfigError::UnsafeReconfiguration("disjoint".into()).into();
        assert_eq!(unsafe_change.code(), NEW_CONFIG_NO_QUORUM);

        let not_leader: Response<String> = ReconfigError::NotLeader(Some(2)).into();
        assert_eq!(not_leader.code(), NOT_LEADER);

        for lost in [
            ReconfigError::LostLeadership("deposed".into()),
            ReconfigError::ReplicaLagging(Stamp::new(1, 2), Stamp::ZERO),
            ReconfigError::NoSuchServer(1),
            ReconfigError::Pending,
        ] {
            assert_eq!(lost.code(), CONNECTION_LOSS);
        }
        assert_eq!(ReconfigError::NoSuchSession(7).code(), SESSION_EXPIRED);
        assert_eq!(ReconfigError::InvalidMembership("empty".into()).code(), BAD_ARGUMENTS);
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout");
        assert_eq!(ReconfigError::Io(timeout).code(), SYSTEM_ERROR);

        let ok: Response<String> = ReconfigResult::Ok("version=0".to_owned()).into();
        assert!(ok.is_ok());
        assert_eq!(ok.content(), "version=0");
    }
}
