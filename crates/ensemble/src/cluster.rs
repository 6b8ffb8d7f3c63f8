use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::NodeConfig;
use crate::notifier::{ClientConfigNotifier, Notification};
use crate::pipeline::{local::LocalPipeline, ApplyListener, CommitPipeline, Record};
use crate::protocol::{
    membership::MembershipConfig, reconfig::ReconfigRequest, NodeID, SessionID, Stamp, Version,
};
use crate::server::QuorumServer;
use crate::vendor::prelude::DashMap;
use crate::{debug, info, warn};
use crate::{ConsensusError, ElectionOutcome, ReconfigResult};

/// Session ids carry the id of the server that created them in the top
/// byte, as the servers of an ensemble hand them out independently.
#[inline]
fn session_id(server: NodeID, seq: u64) -> SessionID {
    (server << 56) | (seq & 0x00ff_ffff_ffff_ffff)
}

/// An ensemble of quorum servers running in one process over a shared
/// `LocalPipeline`. Client sessions are opened on a server, requests are
/// forwarded to the leader the same way a follower forwards them.
pub struct Ensemble {
    conf: NodeConfig,
    seed: MembershipConfig,
    pipeline: Arc<LocalPipeline>,
    notifier: Arc<ClientConfigNotifier>,
    servers: DashMap<NodeID, Arc<QuorumServer>>,
    sessions: AtomicU64,
}

impl Ensemble {

    /// Start every member of `seed` and elect the first leader. `conf` is
    /// the template of every server's node config.
    pub async fn bootstrap(seed: MembershipConfig, conf: NodeConfig) -> ReconfigResult<Self> {
        if seed.participants().next().is_none() {
            return Err(ConsensusError::invalid_membership("seed has no participant"));
        }
        let ensemble = Self {
            pipeline: Arc::new(LocalPipeline::new(seed.clone())),
            notifier: Arc::new(ClientConfigNotifier::new(conf.read_sync_timeout())),
            servers: DashMap::new(),
            sessions: AtomicU64::new(1),
            conf,
            seed,
        };
        let members: Vec<NodeID> = ensemble.seed.ids().collect();
        for id in members {
            ensemble.spawn(id).await;
        }
        let outcome = ensemble.elect().await;
        info!("ensemble {} bootstrapped: {:?}", ensemble.seed.version(), outcome);
        Ok(ensemble)
    }

    /// Start server `id`, it replays the whole log so it can join the
    /// ensemble later. A server already spawned is just returned.
    pub async fn spawn(&self, id: NodeID) -> Arc<QuorumServer> {
        let spawned = self.servers.get(&id).map(|s| s.value().clone());
        if let Some(server) = spawned {
            return server;
        }
        let pipeline: Arc<dyn CommitPipeline> = self.pipeline.clone();
        let server = Arc::new(QuorumServer::new(
            self.conf.for_node(id),
            self.seed.clone(),
            pipeline,
            self.notifier.clone(),
        ));
        let listener: Arc<dyn ApplyListener> = server.clone();
        self.pipeline.attach(id, &listener).await;
        self.servers.insert(id, server.clone());
        debug!("server {} spawned as {}", id, server.role().to_string());
        server
    }

    pub async fn elect(&self) -> ElectionOutcome {
        self.pipeline.elect().await
    }

    pub async fn leader(&self) -> Option<NodeID> {
        self.pipeline.leader().await
    }

    pub fn server(&self, id: NodeID) -> ReconfigResult<Arc<QuorumServer>> {
        self.servers
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or(ConsensusError::NoSuchServer(id))
    }

    pub fn servers(&self) -> Vec<NodeID> {
        let mut ids: Vec<NodeID> = self.servers.iter().map(|s| *s.key()).collect();
        ids.sort_unstable();
        ids
    }

    #[inline]
    pub fn pipeline(&self) -> &Arc<LocalPipeline> {
        &self.pipeline
    }

    #[inline]
    pub fn notifier(&self) -> &Arc<ClientConfigNotifier> {
        &self.notifier
    }

    pub async fn stop(&self, id: NodeID) -> ReconfigResult<()> {
        self.server(id)?;
        self.pipeline.stop(id).await;
        Ok(())
    }

    pub async fn start(&self, id: NodeID) -> ReconfigResult<()> {
        self.pipeline.start(id).await
    }

    /// The current leader, an election is run first if there is none.
    pub async fn leader_or_elect(&self) -> ReconfigResult<NodeID> {
        if let Some(leader) = self.leader().await {
            return Ok(leader);
        }
        self.elect()
            .await
            .leader()
            .ok_or(ConsensusError::NotLeader(None))
    }

    /// Commit `record` through the leader.
    pub async fn write(&self, record: Record) -> ReconfigResult<Stamp> {
        let leader = self.leader_or_elect().await?;
        self.pipeline.propose_write(leader, record).await?.into()
    }

    /// Open a session on `server`. Opening a session is a write, so it is
    /// committed by the leader before the session can be used.
    pub async fn connect(
        &self,
        server: NodeID,
        watch: bool,
    ) -> ReconfigResult<(SessionID, Option<UnboundedReceiver<Notification>>)> {
        let target = self.server(server)?;
        if !self.pipeline.is_online(server) || !target.current_config().contains(server) {
            return Err(ConsensusError::NoSuchServer(server));
        }
        let session = session_id(server, self.sessions.fetch_add(1, Ordering::SeqCst));
        let stamp = self.write(Record::CreateSession { session, server }).await?;
        let observed = target.current_config().version();
        let watcher = self.notifier.register(session, server, observed, watch);
        debug!("session {:#x} opened on server {} at {:?}", session, server, stamp);
        Ok((session, watcher))
    }

    pub async fn close(&self, session: SessionID) -> ReconfigResult<()> {
        self.notifier.close(session)?;
        self.write(Record::CloseSession { session }).await?;
        Ok(())
    }

    /// Read the config through the server `session` is connected to. A
    /// session whose server left the ensemble fails over first.
    pub async fn read_config(&self, session: SessionID) -> ReconfigResult<Arc<MembershipConfig>> {
        if self.notifier.must_reconnect(session)? {
            self.failover(session)?;
        }
        let server = self.server(self.notifier.connected_server(session)?)?;
        self.notifier.read_config(session, server.store()).await
    }

    /// Move `session` to `server`, which must be a member of the config
    /// that server applied.
    pub fn reconnect(&self, session: SessionID, server: NodeID) -> ReconfigResult<()> {
        let target = self.server(server)?;
        if !self.pipeline.is_online(server) {
            return Err(ConsensusError::NoSuchServer(server));
        }
        self.notifier.reconnect(session, server, &target.current_config())
    }

    /// Move `session` to the first running member of the config applied by
    /// the server it is connected to.
    pub fn failover(&self, session: SessionID) -> ReconfigResult<NodeID> {
        let from = self.notifier.connected_server(session)?;
        let config = self.server(from)?.current_config();
        let target = config
            .ids()
            .find(|id| self.servers.contains_key(id) && self.pipeline.is_online(*id))
            .ok_or(ConsensusError::NoSuchServer(from))?;
        self.reconnect(session, target)?;
        info!("session {:#x} fails over from server {} to {}", session, from, target);
        Ok(target)
    }

    /// Run `request` on the server `session` is connected to, forwarding it
    /// to the leader when that server doesn't lead.
    pub async fn reconfig(
        &self,
        session: SessionID,
        request: ReconfigRequest,
    ) -> ReconfigResult<(Arc<MembershipConfig>, Version)> {
        let from = self.notifier.connected_server(session)?;
        let result = match self.server(from)?.reconfig(request.clone()).await {
            Err(ConsensusError::NotLeader(Some(leader))) if leader != from => {
                debug!("server {} forward reconfig to leader {}", from, leader);
                self.server(leader)?.reconfig(request).await
            }
            Err(ConsensusError::NotLeader(None)) => {
                warn!("no leader for reconfig from session {:#x}, elect one", session);
                let leader = self.leader_or_elect().await?;
                self.server(leader)?.reconfig(request).await
            }
            other => other,
        };
        let (config, version) = result?;
        self.notifier.observe(session, version)?;
        Ok((config, version))
    }
}
