use std::sync::Arc;

use consensus::prelude::transition;

use crate::config::NodeConfig;
use crate::coordinator::ReconfigCoordinator;
use crate::notifier::ClientConfigNotifier;
use crate::pipeline::{ApplyListener, CommitPipeline, Record};
use crate::protocol::{membership::MembershipConfig, reconfig::ReconfigRequest, NodeID, Stamp, Version};
use crate::store::ConfigStore;
use crate::vendor::prelude::lock::RwLock;
use crate::{info, trace};
use crate::{ElectionOutcome, PeerRole, ReconfigResult};

/// One replica of the ensemble: its applied config, its runtime role and
/// the coordinator it runs reconfigurations with while leading.
pub struct QuorumServer {
    conf: NodeConfig,
    store: Arc<ConfigStore>,
    coordinator: ReconfigCoordinator,
    role: RwLock<PeerRole>,
}

impl QuorumServer {

    pub fn new(
        conf: NodeConfig,
        seed: MembershipConfig,
        pipeline: Arc<dyn CommitPipeline>,
        notifier: Arc<ClientConfigNotifier>,
    ) -> Self {
        let role = transition(conf.id, PeerRole::default(), &seed, None);
        let store = Arc::new(ConfigStore::new(&conf, seed, pipeline.clone()));
        let coordinator = ReconfigCoordinator::new(&conf, store.clone(), pipeline, notifier);
        Self {
            conf,
            store,
            coordinator,
            role: RwLock::new(role),
        }
    }

    #[inline]
    pub fn id(&self) -> NodeID {
        self.conf.id
    }

    #[inline]
    pub fn conf(&self) -> &NodeConfig {
        &self.conf
    }

    #[inline]
    pub fn role(&self) -> PeerRole {
        *self.role.read()
    }

    #[inline]
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    #[inline]
    pub fn coordinator(&self) -> &ReconfigCoordinator {
        &self.coordinator
    }

    #[inline]
    pub fn current_config(&self) -> Arc<MembershipConfig> {
        self.store.current_config()
    }

    pub async fn reconfig(&self, request: ReconfigRequest) -> ReconfigResult<(Arc<MembershipConfig>, Version)> {
        self.coordinator.reconfig(request).await
    }

    fn reevaluate_role(&self, outcome: Option<&ElectionOutcome>) {
        let config = self.store.current_config();
        let mut role = self.role.write();
        let next = transition(self.id(), *role, &config, outcome);
        if next != *role {
            info!(
                "server {} turns {} from {} under config {}",
                self.id(),
                next.to_string(),
                role.to_string(),
                config.version()
            );
            *role = next;
        }
    }
}

impl ApplyListener for QuorumServer {
    fn on_local_apply(&self, stamp: Stamp, record: &Record) {
        trace!("server {} apply {:?}", self.id(), stamp);
        self.store.apply(stamp, record);
        if record.is_reconfig() {
            self.reevaluate_role(None);
        }
    }

    fn on_election(&self, outcome: &ElectionOutcome) {
        self.reevaluate_role(Some(outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{local::LocalPipeline, ConfigProposal};
    use crate::protocol::server::{Endpoint, ServerRole, ServerSpec};
    use std::time::Duration;

    fn spec(id: NodeID, role: ServerRole) -> ServerSpec {
        let port = 12000 + id as u16 * 10;
        ServerSpec::new(id, "localhost", port, port + 1, role, Endpoint::new("localhost", port + 2))
    }

    #[test]
    fn test_role_follows_applied_config() {
        let seed = MembershipConfig::bootstrap(vec![
            spec(1, ServerRole::Participant),
            spec(2, ServerRole::Observer),
        ])
        .unwrap();
        let pipeline = Arc::new(LocalPipeline::new(seed.clone()));
        let notifier = Arc::new(ClientConfigNotifier::new(Duration::from_millis(10)));
        let server = QuorumServer::new(NodeConfig::with_id(2), seed, pipeline, notifier);
        assert_eq!(server.role(), PeerRole::Observing);

        server.on_election(&ElectionOutcome::Elected(1));
        assert_eq!(server.role(), PeerRole::Observing);

        let promote = Record::Reconfig(ConfigProposal {
            base: Version::ZERO,
            floor: Stamp::new(1, 0),
            members: vec![spec(1, ServerRole::Participant), spec(2, ServerRole::Participant)],
        });
        server.on_local_apply(Stamp::new(1, 1), &promote);
        assert_eq!(server.role(), PeerRole::Follower);

        let remove = Record::Reconfig(ConfigProposal {
            base: Stamp::new(1, 1),
            floor: Stamp::new(2, 0),
            members: vec![spec(1, ServerRole::Participant)],
        });
        server.on_local_apply(Stamp::new(1, 2), &remove);
        assert_eq!(server.role(), PeerRole::Departed);
        assert_eq!(server.current_config().version(), Stamp::new(2, 0));
    }
}
