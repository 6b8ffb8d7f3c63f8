use std::sync::Arc;

use consensus::prelude::{MembershipChanger, QuorumSystem};
use tokio::sync::Notify;

use crate::config::NodeConfig;
use crate::notifier::ClientConfigNotifier;
use crate::pipeline::CommitPipeline;
use crate::protocol::{
    membership::MembershipConfig, reconfig::ReconfigRequest, NodeID, Stamp, Version,
};
use crate::store::ConfigStore;
use crate::vendor::prelude::lock::Mutex;
use crate::{debug, info, warn};
use crate::{ConsensusError, ReconfigResult};

/// Base version of the reconfiguration in flight, cleared on drop and
/// the requests waiting for it are woken up.
struct InFlight<'a> {
    slot: &'a Mutex<Option<Version>>,
    settled: &'a Notify,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
        self.settled.notify_waiters();
    }
}

/// Runs reconfigurations on the leader. Requests are validated against the
/// local config, then proposed through the pipeline as a config record.
/// Concurrent requests race optimistically, the pipeline applies at most
/// one config per base version.
pub struct ReconfigCoordinator {
    id: NodeID,
    enabled: bool,
    store: Arc<ConfigStore>,
    pipeline: Arc<dyn CommitPipeline>,
    notifier: Arc<ClientConfigNotifier>,
    in_flight: Mutex<Option<Version>>,
    settled: Notify,
    /// latest version whose follow up ran.
    followed: Mutex<Version>,
}

impl ReconfigCoordinator {

    pub fn new(
        conf: &NodeConfig,
        store: Arc<ConfigStore>,
        pipeline: Arc<dyn CommitPipeline>,
        notifier: Arc<ClientConfigNotifier>,
    ) -> Self {
        Self {
            id: conf.id,
            enabled: conf.reconfig_enabled,
            store,
            pipeline,
            notifier,
            in_flight: Mutex::new(None),
            settled: Notify::new(),
            followed: Mutex::new(Version::ZERO),
        }
    }

    /// Change the membership as `request` asks, returns the committed
    /// config and its version.
    pub async fn reconfig(&self, request: ReconfigRequest) -> ReconfigResult<(Arc<MembershipConfig>, Version)> {
        if !self.enabled {
            return Err(ConsensusError::ReconfigDisabled);
        }
        let (current, guard) = loop {
            // registered before the slot is looked at, so a proposal
            // settling in between still wakes us.
            let settled = self.settled.notified();
            let leader = self.pipeline.leader().await;
            if leader != Some(self.id) {
                return Err(ConsensusError::NotLeader(leader));
            }
            let current = self.store.current_config();
            match self.begin(&request, current.version())? {
                Some(guard) => break (current, guard),
                None => {
                    debug!(
                        "leader {} waits for the proposal on {} to settle",
                        self.id,
                        current.version()
                    );
                    settled.await;
                }
            }
        };

        if let Some(expected) = request.expected_version {
            if expected != current.version() {
                return Err(ConsensusError::StaleVersion(expected, current.version()));
            }
        }

        let changer = MembershipChanger::new(&current);
        let changes = changer.compute(&request)?;
        let candidate = MembershipConfig::new(current.version(), changes.members.clone())?;
        changer.check_safety(&candidate)?;

        let synced = self.pipeline.synced_followers().await;
        if !QuorumSystem::is_quorum(&candidate, synced.iter()) {
            return Err(ConsensusError::UnsafeReconfiguration(format!(
                "only {:?} are synced with leader {}, not a quorum of {}",
                synced,
                self.id,
                QuorumSystem::majority_of(&candidate)
            )));
        }

        let floor = if changes.participants_changed(&current) {
            current.version().next_epoch()
        } else {
            current.version().next_counter()
        };
        debug!(
            "leader {} proposes {:?} on config {}, floor {}",
            self.id, changes.records, current.version(), floor
        );
        let next = self
            .store
            .propose_and_apply(&current, changes.members, floor)
            .await?;
        drop(guard);
        info!(
            "reconfig committed: {} -> {}",
            current.version(),
            next.version()
        );

        self.follow_up(&current, &next).await;
        let version = next.version();
        Ok((next, version))
    }

    /// Role changes and client notification after `next` replaced `prev`.
    /// Running it again for the same version does nothing.
    pub async fn follow_up(&self, prev: &MembershipConfig, next: &MembershipConfig) {
        {
            let mut followed = self.followed.lock();
            if next.version() <= *followed {
                return;
            }
            *followed = next.version();
        }

        if !next.is_participant(self.id) {
            info!(
                "leader {} is no longer a participant of {}, resign",
                self.id,
                next.version()
            );
            self.pipeline.resign(self.id).await;
            let outcome = self.pipeline.elect().await;
            info!("election under config {}: {:?}", next.version(), outcome);
        } else if QuorumSystem::participant_changes(prev, next) > 0 {
            match self.pipeline.establish_epoch(self.id).await {
                Ok(epoch) => debug!("leader {} continues in epoch {:?}", self.id, epoch),
                Err(e) => warn!("leader {} failed to establish epoch: {}", self.id, e),
            }
        }
        self.notifier.on_config_committed(next);
    }

    /// Claim the in flight slot for a proposal on `base`. `None` if the
    /// request expects the base of the proposal in flight: whether it is
    /// stale is only known once that proposal settled.
    fn begin(&self, request: &ReconfigRequest, base: Version) -> ReconfigResult<Option<InFlight<'_>>> {
        let mut slot = self.in_flight.lock();
        if let Some(pending) = *slot {
            return match request.expected_version {
                Some(expected) if expected == pending => Ok(None),
                _ => Err(ConsensusError::ReconfigInProgress),
            };
        }
        *slot = Some(base);
        Ok(Some(InFlight {
            slot: &self.in_flight,
            settled: &self.settled,
        }))
    }

    /// Base version of the proposal in flight.
    #[inline]
    pub fn in_flight(&self) -> Option<Stamp> {
        *self.in_flight.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{local::LocalPipeline, ApplyListener, Record};
    use crate::protocol::{proposal::Proposal, server::{Endpoint, ServerRole, ServerSpec}};
    use crate::{ElectionOutcome, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn spec(id: NodeID) -> ServerSpec {
        let port = 11000 + id as u16 * 10;
        ServerSpec::new(id, "localhost", port, port + 1, ServerRole::Participant, Endpoint::new("localhost", port + 2))
    }

    /// Wraps a pipeline and never lets a config record commit.
    struct DroppingPipeline(Arc<LocalPipeline>);

    #[crate::async_trait]
    impl CommitPipeline for DroppingPipeline {
        async fn propose_write(&self, from: NodeID, record: Record) -> ReconfigResult<Proposal> {
            if record.is_reconfig() {
                return Ok(Proposal::Timeout);
            }
            self.0.propose_write(from, record).await
        }
        async fn leader(&self) -> Option<NodeID> {
            self.0.leader().await
        }
        async fn synced_followers(&self) -> HashSet<NodeID> {
            self.0.synced_followers().await
        }
        async fn establish_epoch(&self, leader: NodeID) -> ReconfigResult<Stamp> {
            self.0.establish_epoch(leader).await
        }
        async fn resign(&self, leader: NodeID) {
            self.0.resign(leader).await
        }
        async fn elect(&self) -> ElectionOutcome {
            self.0.elect().await
        }
    }

    /// Wraps a pipeline and holds the first config record for a while,
    /// then fails it as if the leader was deposed when `fail` is set.
    struct SlowPipeline {
        inner: Arc<LocalPipeline>,
        fail: bool,
        held: AtomicBool,
    }

    #[crate::async_trait]
    impl CommitPipeline for SlowPipeline {
        async fn propose_write(&self, from: NodeID, record: Record) -> ReconfigResult<Proposal> {
            if record.is_reconfig() && !self.held.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if self.fail {
                    return Err(ConsensusError::LostLeadership("deposed".to_owned()));
                }
            }
            self.inner.propose_write(from, record).await
        }
        async fn leader(&self) -> Option<NodeID> {
            self.inner.leader().await
        }
        async fn synced_followers(&self) -> HashSet<NodeID> {
            self.inner.synced_followers().await
        }
        async fn establish_epoch(&self, leader: NodeID) -> ReconfigResult<Stamp> {
            self.inner.establish_epoch(leader).await
        }
        async fn resign(&self, leader: NodeID) {
            self.inner.resign(leader).await
        }
        async fn elect(&self) -> ElectionOutcome {
            self.inner.elect().await
        }
    }

    fn plain(local: Arc<LocalPipeline>) -> Arc<dyn CommitPipeline> {
        local
    }

    fn dropping(local: Arc<LocalPipeline>) -> Arc<dyn CommitPipeline> {
        Arc::new(DroppingPipeline(local))
    }

    fn slow(local: Arc<LocalPipeline>) -> Arc<dyn CommitPipeline> {
        Arc::new(SlowPipeline { inner: local, fail: false, held: AtomicBool::new(false) })
    }

    fn slow_failing(local: Arc<LocalPipeline>) -> Arc<dyn CommitPipeline> {
        Arc::new(SlowPipeline { inner: local, fail: true, held: AtomicBool::new(false) })
    }

    struct Fixture {
        local: Arc<LocalPipeline>,
        store: Arc<ConfigStore>,
        coordinator: ReconfigCoordinator,
        _peers: Vec<Arc<ConfigStore>>,
    }

    async fn fixture(
        ids: &[NodeID],
        conf: NodeConfig,
        wrap: fn(Arc<LocalPipeline>) -> Arc<dyn CommitPipeline>,
    ) -> Fixture {
        let seed = MembershipConfig::bootstrap(ids.iter().map(|id| spec(*id)).collect()).unwrap();
        let local = Arc::new(LocalPipeline::new(seed.clone()));
        let pipeline = wrap(local.clone());
        let store = Arc::new(ConfigStore::new(&conf, seed.clone(), pipeline.clone()));
        let listener: Arc<dyn ApplyListener> = store.clone();
        local.attach(conf.id, &listener).await;
        // peers only ack, their own state isn't looked at here.
        let mut peers = vec![];
        for id in ids.iter().filter(|id| **id != conf.id) {
            let peer = Arc::new(ConfigStore::new(&conf.for_node(*id), seed.clone(), pipeline.clone()));
            let listener: Arc<dyn ApplyListener> = peer.clone();
            local.attach(*id, &listener).await;
            peers.push(peer);
        }
        // with no history yet, the highest id wins.
        assert_eq!(local.elect().await, ElectionOutcome::Elected(*ids.iter().max().unwrap()));
        let notifier = Arc::new(ClientConfigNotifier::new(Duration::from_millis(10)));
        let coordinator = ReconfigCoordinator::new(&conf, store.clone(), pipeline, notifier);
        Fixture { local, store, coordinator, _peers: peers }
    }

    #[tokio::test]
    async fn test_validation_order() {
        let f = fixture(&[1, 2, 3], NodeConfig::with_id(3), plain).await;
        let stale = ReconfigRequest::incremental(vec![], vec![2]).expect_version(Stamp::new(9, 9));
        assert_eq!(
            f.coordinator.reconfig(stale).await.unwrap_err(),
            ConsensusError::StaleVersion(Stamp::new(9, 9), Version::ZERO)
        );
        let unknown = ReconfigRequest::incremental(vec![], vec![7]);
        assert!(matches!(
            f.coordinator.reconfig(unknown).await,
            Err(ConsensusError::InvalidMembership(_))
        ));
        let unsafe_change = ReconfigRequest::non_incremental(vec![spec(4), spec(5), spec(6)]);
        assert!(matches!(
            f.coordinator.reconfig(unsafe_change).await,
            Err(ConsensusError::UnsafeReconfiguration(_))
        ));
        // server 4 is not connected, a quorum of {1,2,3,4} needs 3 of them.
        f.local.stop(2).await;
        let unreachable = ReconfigRequest::incremental(vec![spec(4)], vec![]);
        assert!(matches!(
            f.coordinator.reconfig(unreachable).await,
            Err(ConsensusError::UnsafeReconfiguration(_))
        ));
        assert_eq!(f.store.current_config().version(), Version::ZERO);
        assert_eq!(f.coordinator.in_flight(), None);
    }

    #[tokio::test]
    async fn test_not_leader_or_disabled() {
        let f = fixture(&[1, 2, 3], NodeConfig::with_id(3), plain).await;
        let follower = ReconfigCoordinator::new(
            &NodeConfig::with_id(1),
            f.store.clone(),
            Arc::new(DroppingPipeline(f.local.clone())),
            Arc::new(ClientConfigNotifier::new(Duration::from_millis(10))),
        );
        let request = ReconfigRequest::incremental(vec![], vec![2]);
        assert_eq!(
            follower.reconfig(request.clone()).await.unwrap_err(),
            ConsensusError::NotLeader(Some(3))
        );

        let mut disabled = NodeConfig::with_id(3);
        disabled.reconfig_enabled = false;
        let disabled = ReconfigCoordinator::new(
            &disabled,
            f.store.clone(),
            f.local.clone(),
            Arc::new(ClientConfigNotifier::new(Duration::from_millis(10))),
        );
        assert_eq!(
            disabled.reconfig(request).await.unwrap_err(),
            ConsensusError::ReconfigDisabled
        );
    }

    #[tokio::test]
    async fn test_lost_leadership_applies_nothing() {
        let f = fixture(&[1, 2, 3], NodeConfig::with_id(3), dropping).await;
        let request = ReconfigRequest::incremental(vec![], vec![1]);
        assert!(matches!(
            f.coordinator.reconfig(request).await,
            Err(ConsensusError::LostLeadership(_))
        ));
        assert_eq!(f.store.current_config().len(), 3);
        assert_eq!(f.coordinator.in_flight(), None);
    }

    #[tokio::test]
    async fn test_epoch_after_participant_change() {
        let f = fixture(&[1, 2, 3], NodeConfig::with_id(3), plain).await;
        let (removed, version) = f
            .coordinator
            .reconfig(ReconfigRequest::incremental(vec![], vec![1]))
            .await
            .unwrap();
        assert_eq!(version, Stamp::new(1, 1));
        assert_eq!(removed.participants().count(), 2);
        assert_eq!(f.local.last_committed().await, Stamp::new(2, 0));

        // same members, only the counter moves.
        let same = ReconfigRequest::non_incremental(removed.members().to_vec()).expect_version(version);
        let (kept, bumped) = f.coordinator.reconfig(same).await.unwrap();
        assert!(kept.same_members(&removed));
        assert_eq!(bumped, Stamp::new(2, 1));
        assert_eq!(f.local.last_committed().await, Stamp::new(2, 1));

        // replaying the follow up of an old version is a no-op.
        f.coordinator.follow_up(&removed, &kept).await;
        assert_eq!(f.local.last_committed().await, Stamp::new(2, 1));
    }

    #[tokio::test]
    async fn test_same_base_waits_for_failed_proposal() {
        let f = fixture(&[1, 2, 3], NodeConfig::with_id(3), slow_failing).await;
        let first = ReconfigRequest::incremental(vec![], vec![1]).expect_version(Version::ZERO);
        let second = ReconfigRequest::incremental(vec![], vec![2]).expect_version(Version::ZERO);
        let (first, second) = tokio::join!(
            f.coordinator.reconfig(first),
            f.coordinator.reconfig(second)
        );
        assert!(matches!(first, Err(ConsensusError::LostLeadership(_))));
        // nothing committed on base 0, so the second one still goes through.
        let (next, version) = second.unwrap();
        assert_eq!(next.participants().collect::<HashSet<_>>(), [1, 3].into_iter().collect());
        assert_eq!(f.store.current_config().version(), version);
        assert_eq!(f.coordinator.in_flight(), None);
    }

    #[tokio::test]
    async fn test_same_base_stale_after_winner_commits() {
        let f = fixture(&[1, 2, 3], NodeConfig::with_id(3), slow).await;
        let first = ReconfigRequest::incremental(vec![], vec![1]).expect_version(Version::ZERO);
        let second = ReconfigRequest::incremental(vec![], vec![2]).expect_version(Version::ZERO);
        let wildcard = ReconfigRequest::incremental(vec![], vec![2]);
        let (first, second, third) = tokio::join!(
            f.coordinator.reconfig(first),
            f.coordinator.reconfig(second),
            f.coordinator.reconfig(wildcard)
        );
        let (_, version) = first.unwrap();
        assert_eq!(second.unwrap_err(), ConsensusError::StaleVersion(Version::ZERO, version));
        assert_eq!(third.unwrap_err(), ConsensusError::ReconfigInProgress);
    }
}
