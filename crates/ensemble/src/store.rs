use std::{collections::VecDeque, sync::Arc, time::Duration};

use tokio::{sync::watch, time::timeout};

use crate::config::NodeConfig;
use crate::pipeline::{ApplyListener, CommitPipeline, ConfigProposal, Record};
use crate::protocol::{membership::MembershipConfig, server::ServerSpec, NodeID, Stamp, Version};
use crate::{debug, info, trace};
use crate::{ConsensusError, ReconfigResult};

/// Replica local view of the committed membership.
#[derive(Debug, Clone)]
pub struct StoreState {
    current: Arc<MembershipConfig>,
    /// committed configs (current included) with the stamp of the record
    /// that committed them, oldest first. The seed config has stamp 0.
    history: VecDeque<(Stamp, Arc<MembershipConfig>)>,
    last_applied: Stamp,
}

impl StoreState {
    fn new(seed: MembershipConfig) -> Self {
        let seed = Arc::new(seed);
        let mut history = VecDeque::new();
        history.push_back((Stamp::ZERO, seed.clone()));
        Self {
            current: seed,
            history,
            last_applied: Stamp::ZERO,
        }
    }

    #[inline]
    pub fn current(&self) -> &Arc<MembershipConfig> {
        &self.current
    }

    #[inline]
    pub fn last_applied(&self) -> Stamp {
        self.last_applied
    }

    fn committed_by(&self, stamp: Stamp) -> Option<Arc<MembershipConfig>> {
        self.history
            .iter()
            .rev()
            .find(|(committed, _)| *committed == stamp)
            .map(|(_, config)| config.clone())
    }
}

/// Holds the membership config a replica applied. Configs only change by
/// applying committed configuration records, in log order, so every replica
/// walks through the same sequence of configs.
///
/// Readers never block, the state is published through a `watch` channel
/// and waiters are woken when a newer record is applied.
pub struct ConfigStore {
    id: NodeID,
    conf: NodeConfig,
    pipeline: Arc<dyn CommitPipeline>,
    state: watch::Sender<StoreState>,
}

impl ConfigStore {

    pub fn new(conf: &NodeConfig, seed: MembershipConfig, pipeline: Arc<dyn CommitPipeline>) -> Self {
        let (state, _) = watch::channel(StoreState::new(seed));
        Self {
            id: conf.id,
            conf: conf.clone(),
            pipeline,
            state,
        }
    }

    /// The latest locally applied config.
    #[inline]
    pub fn current_config(&self) -> Arc<MembershipConfig> {
        self.state.borrow().current.clone()
    }

    #[inline]
    pub fn last_applied(&self) -> Stamp {
        self.state.borrow().last_applied
    }

    /// Committed configs still kept, oldest first.
    pub fn history(&self) -> Vec<Arc<MembershipConfig>> {
        self.state
            .borrow()
            .history
            .iter()
            .map(|(_, config)| config.clone())
            .collect()
    }

    /// The config that was in effect at `version`, `None` if it's older
    /// than the kept history.
    pub fn config_at(&self, version: Version) -> Option<Arc<MembershipConfig>> {
        self.state
            .borrow()
            .history
            .iter()
            .rev()
            .find(|(_, config)| config.version() <= version)
            .map(|(_, config)| config.clone())
    }

    /// Submit `members` as the config following `base` and wait until this
    /// replica applied it. On any failure to commit nothing is applied.
    pub async fn propose_and_apply(
        &self,
        base: &MembershipConfig,
        members: Vec<ServerSpec>,
        floor: Version,
    ) -> ReconfigResult<Arc<MembershipConfig>> {
        let record = Record::Reconfig(ConfigProposal {
            base: base.version(),
            floor,
            members,
        });
        let proposed = timeout(
            self.conf.propose_timeout(),
            self.pipeline.propose_write(self.id, record),
        )
        .await;
        let committed: ReconfigResult<Stamp> = match proposed {
            Ok(Ok(proposal)) => proposal.into(),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConsensusError::LostLeadership(format!(
                "config proposal not committed in {:?}",
                self.conf.propose_timeout()
            ))),
        };
        let stamp = match committed {
            Ok(stamp) => stamp,
            Err(ConsensusError::LostLeadership(reason)) => {
                return Err(ConsensusError::LostLeadership(reason))
            }
            Err(e) => return Err(ConsensusError::LostLeadership(e.to_string())),
        };

        self.wait_applied(stamp, self.conf.propose_timeout()).await?;
        let state = self.state.borrow();
        match state.committed_by(stamp) {
            Some(config) => Ok(config),
            // applied as a no-op, another change won the race.
            None => Err(ConsensusError::StaleVersion(base.version(), state.current.version())),
        }
    }

    /// Wait until this replica applied a config whose version is at least
    /// `version`, fails with `ReplicaLagging` after `wait`.
    pub async fn wait_for_version(&self, version: Version, wait: Duration) -> ReconfigResult<Arc<MembershipConfig>> {
        let mut watcher = self.state.subscribe();
        let reached = timeout(wait, watcher.wait_for(|s| s.current.version() >= version)).await;
        match reached {
            Ok(Ok(state)) => Ok(state.current.clone()),
            _ => Err(ConsensusError::ReplicaLagging(version, self.current_config().version())),
        }
    }

    async fn wait_applied(&self, stamp: Stamp, wait: Duration) -> ReconfigResult<()> {
        let mut watcher = self.state.subscribe();
        let reached = timeout(wait, watcher.wait_for(|s| s.last_applied >= stamp)).await;
        match reached {
            Ok(Ok(_)) => Ok(()),
            _ => Err(ConsensusError::ReplicaLagging(stamp, self.last_applied())),
        }
    }

    /// Learn a committed record. Records at or below `last_applied` were
    /// seen already and are ignored.
    pub fn apply(&self, stamp: Stamp, record: &Record) {
        let id = self.id;
        let limit = self.conf.history_limit();
        self.state.send_if_modified(|state| {
            if stamp <= state.last_applied {
                trace!("replica {} skip replayed record {:?}", id, stamp);
                return false;
            }
            state.last_applied = stamp;
            let proposal = match record {
                Record::Reconfig(proposal) => proposal,
                _ => return true,
            };
            match proposal.apply_to(&state.current, stamp) {
                Ok(next) => {
                    info!(
                        "replica {} applied config {} at {:?}: {:?}",
                        id,
                        next.version(),
                        stamp,
                        next.ids().collect::<Vec<_>>()
                    );
                    let next = Arc::new(next);
                    state.current = next.clone();
                    state.history.push_back((stamp, next));
                    while state.history.len() > limit {
                        state.history.pop_front();
                    }
                }
                Err(e) => debug!("replica {} ignore config record {:?}: {}", id, stamp, e),
            }
            true
        });
    }
}

impl ApplyListener for ConfigStore {
    fn on_local_apply(&self, stamp: Stamp, record: &Record) {
        self.apply(stamp, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::local::LocalPipeline;
    use crate::protocol::server::{Endpoint, ServerRole};

    fn spec(id: NodeID, role: ServerRole) -> ServerSpec {
        let port = 9000 + id as u16 * 10;
        ServerSpec::new(id, "localhost", port, port + 1, role, Endpoint::new("localhost", port + 2))
    }

    async fn single() -> (Arc<LocalPipeline>, Arc<ConfigStore>) {
        let seed = MembershipConfig::bootstrap(vec![spec(1, ServerRole::Participant)]).unwrap();
        let pipeline = Arc::new(LocalPipeline::new(seed.clone()));
        let store = Arc::new(ConfigStore::new(&NodeConfig::with_id(1), seed, pipeline.clone()));
        let listener: Arc<dyn ApplyListener> = store.clone();
        pipeline.attach(1, &listener).await;
        pipeline.elect().await;
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_propose_and_apply() {
        let (_pipeline, store) = single().await;
        let base = store.current_config();
        let members = vec![spec(1, ServerRole::Participant), spec(2, ServerRole::Observer)];
        let next = store
            .propose_and_apply(&base, members, base.version().next_counter())
            .await
            .unwrap();
        assert_eq!(next.version(), Stamp::new(1, 1));
        assert_eq!(store.current_config(), next);
        assert_eq!(store.last_applied(), Stamp::new(1, 1));
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.config_at(Version::ZERO).unwrap().len(), 1);
        assert_eq!(store.config_at(Stamp::new(1, 5)).unwrap(), next);

        // the base moved on, the record commits but changes nothing.
        let stale = store
            .propose_and_apply(&base, vec![spec(1, ServerRole::Participant)], Stamp::new(0, 1))
            .await;
        assert_eq!(stale.unwrap_err(), ConsensusError::StaleVersion(Version::ZERO, Stamp::new(1, 1)));
        assert_eq!(store.current_config(), next);
        assert_eq!(store.last_applied(), Stamp::new(1, 2));
    }

    #[tokio::test]
    async fn test_failed_commit_changes_nothing() {
        let (pipeline, store) = single().await;
        pipeline.resign(1).await;
        let base = store.current_config();
        let lost = store
            .propose_and_apply(&base, vec![spec(1, ServerRole::Participant)], Stamp::new(0, 1))
            .await;
        assert!(matches!(lost, Err(ConsensusError::LostLeadership(_))));
        assert_eq!(store.current_config(), base);
        assert_eq!(store.last_applied(), Stamp::ZERO);
    }

    #[tokio::test]
    async fn test_replay_and_wait() {
        let seed = MembershipConfig::bootstrap(vec![spec(1, ServerRole::Participant)]).unwrap();
        let pipeline = Arc::new(LocalPipeline::new(seed.clone()));
        let store = ConfigStore::new(&NodeConfig::with_id(1), seed, pipeline);
        let record = Record::Reconfig(ConfigProposal {
            base: Version::ZERO,
            floor: Stamp::new(1, 0),
            members: vec![spec(1, ServerRole::Participant), spec(2, ServerRole::Participant)],
        });
        store.apply(Stamp::new(1, 3), &record);
        store.apply(Stamp::new(1, 3), &record);
        assert_eq!(store.history().len(), 2);

        let reached = store.wait_for_version(Stamp::new(1, 3), Duration::from_millis(10)).await;
        assert_eq!(reached.unwrap().len(), 2);
        let lagging = store.wait_for_version(Stamp::new(2, 0), Duration::from_millis(10)).await;
        assert_eq!(
            lagging.unwrap_err(),
            ConsensusError::ReplicaLagging(Stamp::new(2, 0), Stamp::new(1, 3))
        );
    }
}
