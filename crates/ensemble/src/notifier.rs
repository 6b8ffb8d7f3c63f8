use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::protocol::{membership::MembershipConfig, NodeID, SessionID, Version};
use crate::store::ConfigStore;
use crate::vendor::prelude::{lock::Mutex, DashMap};
use crate::{debug, info};
use crate::{ConsensusError, ReconfigResult};

/// A config change pushed to a watching session, `payload` is the
/// serialized config in wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub version: Version,
    pub payload: String,
}

impl From<&MembershipConfig> for Notification {
    fn from(config: &MembershipConfig) -> Self {
        Self {
            version: config.version(),
            payload: config.serialize(),
        }
    }
}

#[derive(Debug)]
struct Session {
    server: NodeID,
    /// highest config version this session has seen.
    observed: Version,
    must_reconnect: bool,
    watcher: Option<UnboundedSender<Notification>>,
}

/// Tracks client sessions, the server each of them is connected to and
/// their interest in config changes.
pub struct ClientConfigNotifier {
    sessions: DashMap<SessionID, Session>,
    /// latest version pushed, replays of it are ignored.
    notified: Mutex<Version>,
    read_sync_timeout: Duration,
}

impl ClientConfigNotifier {

    pub fn new(read_sync_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            notified: Mutex::new(Version::ZERO),
            read_sync_timeout,
        }
    }

    /// Register `session` connected to `server` which has seen config
    /// `observed`. A watching session gets the receiving end of its
    /// notifications.
    pub fn register(
        &self,
        session: SessionID,
        server: NodeID,
        observed: Version,
        watch: bool,
    ) -> Option<UnboundedReceiver<Notification>> {
        let (watcher, receiver) = if watch {
            let (tx, rx) = unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        self.sessions.insert(
            session,
            Session {
                server,
                observed,
                must_reconnect: false,
                watcher,
            },
        );
        debug!("session {:#x} registered on server {}", session, server);
        receiver
    }

    /// Push `config` to every watching session and flag the sessions whose
    /// server left the ensemble. Never waits for a client, replaying an
    /// already pushed version does nothing.
    pub fn on_config_committed(&self, config: &MembershipConfig) {
        {
            let mut notified = self.notified.lock();
            if config.version() <= *notified {
                return;
            }
            *notified = config.version();
        }
        let notification = Notification::from(config);
        let mut stranded = 0;
        for mut session in self.sessions.iter_mut() {
            let delivered = match session.watcher.as_ref() {
                Some(watcher) => watcher.send(notification.clone()).is_ok(),
                None => false,
            };
            if delivered {
                session.observed = std::cmp::max(session.observed, config.version());
            } else if session.watcher.is_some() {
                // receiver dropped, stop pushing to it.
                session.watcher = None;
            }
            if !config.contains(session.server) {
                session.must_reconnect = true;
                session.observed = std::cmp::max(session.observed, config.version());
                stranded += 1;
            }
        }
        info!(
            "config {} pushed to {} sessions, {} must reconnect",
            config.version(),
            self.sessions.len(),
            stranded
        );
    }

    pub fn must_reconnect(&self, session: SessionID) -> ReconfigResult<bool> {
        self.with_session(session, |s| s.must_reconnect)
    }

    pub fn connected_server(&self, session: SessionID) -> ReconfigResult<NodeID> {
        self.with_session(session, |s| s.server)
    }

    pub fn observed(&self, session: SessionID) -> ReconfigResult<Version> {
        self.with_session(session, |s| s.observed)
    }

    /// Record that `session` has seen `version`.
    pub fn observe(&self, session: SessionID, version: Version) -> ReconfigResult<()> {
        let mut s = self
            .sessions
            .get_mut(&session)
            .ok_or(ConsensusError::NoSuchSession(session))?;
        s.observed = std::cmp::max(s.observed, version);
        Ok(())
    }

    /// Read the config for `session` from `store`, the replica of the
    /// server it is connected to. Never returns a config older than one
    /// the session already observed.
    pub async fn read_config(&self, session: SessionID, store: &ConfigStore) -> ReconfigResult<Arc<MembershipConfig>> {
        let (server, observed, must_reconnect) =
            self.with_session(session, |s| (s.server, s.observed, s.must_reconnect))?;
        if must_reconnect {
            return Err(ConsensusError::NoSuchServer(server));
        }
        let config = store.wait_for_version(observed, self.read_sync_timeout).await?;
        self.observe(session, config.version())?;
        Ok(config)
    }

    /// Move `session` to `server`, which must be a member of `config`.
    pub fn reconnect(&self, session: SessionID, server: NodeID, config: &MembershipConfig) -> ReconfigResult<()> {
        if !config.contains(server) {
            return Err(ConsensusError::NoSuchServer(server));
        }
        let mut s = self
            .sessions
            .get_mut(&session)
            .ok_or(ConsensusError::NoSuchSession(session))?;
        info!("session {:#x} reconnects from server {} to {}", session, s.server, server);
        s.server = server;
        s.must_reconnect = false;
        Ok(())
    }

    pub fn close(&self, session: SessionID) -> ReconfigResult<()> {
        self.sessions
            .remove(&session)
            .map(|_| ())
            .ok_or(ConsensusError::NoSuchSession(session))
    }

    #[inline]
    pub fn sessions(&self) -> usize {
        self.sessions.len()
    }

    fn with_session<R>(&self, session: SessionID, f: impl FnOnce(&Session) -> R) -> ReconfigResult<R> {
        self.sessions
            .get(&session)
            .map(|s| f(&s))
            .ok_or(ConsensusError::NoSuchSession(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::server::{Endpoint, ServerRole, ServerSpec};
    use crate::protocol::Stamp;

    fn config(version: Version, ids: &[NodeID]) -> MembershipConfig {
        let members = ids
            .iter()
            .map(|id| {
                let port = 10000 + *id as u16 * 10;
                ServerSpec::new(*id, "localhost", port, port + 1, ServerRole::Participant, Endpoint::new("localhost", port + 2))
            })
            .collect();
        MembershipConfig::new(version, members).unwrap()
    }

    #[tokio::test]
    async fn test_push_and_flag_stranded() {
        let notifier = ClientConfigNotifier::new(Duration::from_millis(10));
        let mut on_3 = notifier.register(1, 3, Version::ZERO, true).unwrap();
        let mut on_1 = notifier.register(2, 1, Version::ZERO, true).unwrap();
        assert!(notifier.register(3, 2, Version::ZERO, false).is_none());

        let removed = config(Stamp::new(1, 2), &[1, 2]);
        notifier.on_config_committed(&removed);
        // replaying the same version pushes nothing.
        notifier.on_config_committed(&removed);

        let pushed = on_3.recv().await.unwrap();
        assert_eq!(pushed.version.to_string(), "100000002");
        assert_eq!(pushed.payload, removed.serialize());
        assert!(on_3.try_recv().is_err());
        assert_eq!(on_1.recv().await.unwrap(), pushed);

        assert!(notifier.must_reconnect(1).unwrap());
        assert!(!notifier.must_reconnect(2).unwrap());
        assert!(!notifier.must_reconnect(3).unwrap());
        assert_eq!(notifier.observed(1).unwrap(), Stamp::new(1, 2));

        assert_eq!(notifier.reconnect(1, 3, &removed), Err(ConsensusError::NoSuchServer(3)));
        notifier.reconnect(1, 2, &removed).unwrap();
        assert!(!notifier.must_reconnect(1).unwrap());
        assert_eq!(notifier.connected_server(1).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_closed_receiver_does_not_block() {
        let notifier = ClientConfigNotifier::new(Duration::from_millis(10));
        drop(notifier.register(1, 1, Version::ZERO, true));
        let mut alive = notifier.register(2, 1, Version::ZERO, true).unwrap();
        notifier.on_config_committed(&config(Stamp::new(1, 1), &[1]));
        assert_eq!(alive.recv().await.unwrap().version, Stamp::new(1, 1));

        notifier.close(1).unwrap();
        assert_eq!(notifier.close(1), Err(ConsensusError::NoSuchSession(1)));
        assert_eq!(notifier.sessions(), 1);
    }
}
