use std::sync::{Arc, Weak};

use crate::protocol::{membership::MembershipConfig, proposal::Proposal, NodeID, Stamp};
use tokio::sync::Mutex;
use crate::vendor::prelude::DashSet;
use crate::{debug, info, warn};
use crate::{ConsensusError, ElectionOutcome, HashMap, HashSet, ReconfigResult};
use consensus::prelude::{elect, Quorum, QuorumSystem};

use super::{ApplyListener, CommitPipeline, Record};

struct Replica {
    listener: Weak<dyn ApplyListener>,
    /// index of the next log record to deliver.
    next: usize,
}

struct Sequencer {
    epoch: u32,
    counter: u32,
    leader: Option<NodeID>,
    /// membership in effect for the next record.
    config: MembershipConfig,
    log: Vec<(Stamp, Record)>,
    replicas: HashMap<NodeID, Replica>,
}

impl Sequencer {

    /// Deliver every record `id` has not seen yet.
    fn catch_up(&mut self, id: NodeID) {
        let Sequencer { log, replicas, .. } = self;
        let replica = match replicas.get_mut(&id) {
            Some(replica) => replica,
            None => return,
        };
        let listener = match replica.listener.upgrade() {
            Some(listener) => listener,
            None => return,
        };
        for (stamp, record) in log[replica.next..].iter() {
            listener.on_local_apply(*stamp, record);
        }
        replica.next = log.len();
    }

    fn last_stamp_of(&self, id: NodeID) -> Stamp {
        match self.replicas.get(&id) {
            Some(replica) if replica.next > 0 => self.log[replica.next - 1].0,
            _ => Stamp::ZERO,
        }
    }

    fn notify_election(&self, outcome: &ElectionOutcome, online: &DashSet<NodeID>) {
        for (id, replica) in self.replicas.iter() {
            if !online.contains(id) {
                continue;
            }
            if let Some(listener) = replica.listener.upgrade() {
                listener.on_election(outcome);
            }
        }
    }
}

/// In-memory commit pipeline shared by every server of an in-process
/// ensemble. One lock sequences records and fans them out, so all
/// replicas apply the same records in the same order.
///
/// A record commits once the replicas that are running make up a quorum
/// of the membership in effect, configuration records need a quorum of
/// both the old and the new participants.
pub struct LocalPipeline {
    sequencer: Mutex<Sequencer>,
    /// servers started (attached and not stopped).
    online: DashSet<NodeID>,
}

impl LocalPipeline {

    pub fn new(seed: MembershipConfig) -> Self {
        Self {
            sequencer: Mutex::new(Sequencer {
                epoch: seed.version().epoch(),
                counter: seed.version().counter(),
                leader: None,
                config: seed,
                log: vec![],
                replicas: HashMap::default(),
            }),
            online: DashSet::new(),
        }
    }

    /// Attach the replica of server `id`, it receives the whole log it
    /// missed before this returns.
    pub async fn attach(&self, id: NodeID, listener: &Arc<dyn ApplyListener>) {
        let mut seq = self.sequencer.lock().await;
        seq.replicas.insert(id, Replica { listener: Arc::downgrade(listener), next: 0 });
        self.online.insert(id);
        seq.catch_up(id);
        debug!("replica {} attached at {:?}", id, seq.last_stamp_of(id));
    }

    /// Crash server `id`, a leader stopping leaves the ensemble leaderless.
    pub async fn stop(&self, id: NodeID) {
        let mut seq = self.sequencer.lock().await;
        self.online.remove(&id);
        if seq.leader == Some(id) {
            info!("leader {} stopped, ensemble is leaderless", id);
            seq.leader = None;
            seq.notify_election(&ElectionOutcome::Pending, &self.online);
        }
    }

    /// Restart server `id`, it syncs with the log before this returns.
    pub async fn start(&self, id: NodeID) -> ReconfigResult<()> {
        let mut seq = self.sequencer.lock().await;
        if !seq.replicas.contains_key(&id) {
            return Err(ConsensusError::NoSuchServer(id));
        }
        self.online.insert(id);
        seq.catch_up(id);
        Ok(())
    }

    #[inline]
    pub fn is_online(&self, id: NodeID) -> bool {
        self.online.contains(&id)
    }

    /// Membership the pipeline commits the next record under.
    pub async fn config(&self) -> MembershipConfig {
        self.sequencer.lock().await.config.clone()
    }

    /// Stamp of the latest committed record, or of the latest epoch.
    pub async fn last_committed(&self) -> Stamp {
        let seq = self.sequencer.lock().await;
        Stamp::new(seq.epoch, seq.counter)
    }

    fn online_replicas(&self, seq: &Sequencer) -> HashSet<NodeID> {
        seq.replicas
            .keys()
            .filter(|id| self.online.contains(*id))
            .cloned()
            .collect()
    }

    fn step_down(&self, seq: &mut Sequencer, reason: String) -> ConsensusError {
        warn!("leader {:?} steps down: {}", seq.leader, reason);
        seq.leader = None;
        seq.notify_election(&ElectionOutcome::Pending, &self.online);
        ConsensusError::LostLeadership(reason)
    }
}

#[crate::async_trait]
impl CommitPipeline for LocalPipeline {

    async fn propose_write(&self, from: NodeID, record: Record) -> ReconfigResult<Proposal> {
        let mut seq = self.sequencer.lock().await;
        if seq.leader != Some(from) {
            return Err(ConsensusError::NotLeader(seq.leader));
        }
        let stamp = Stamp::new(seq.epoch, seq.counter.saturating_add(1));
        let acks = self.online_replicas(&seq);

        let next = match &record {
            Record::Reconfig(proposal) => proposal.apply_to(&seq.config, stamp).ok(),
            _ => None,
        };
        let acked = match &next {
            Some(next) => QuorumSystem::joint(&seq.config, next).is_quorum(acks.iter()),
            None => QuorumSystem::majority_of(&seq.config).is_quorum(acks.iter()),
        };
        if !acked {
            let reason = format!("record {:?} acked only by {:?}", stamp, acks);
            return Err(self.step_down(&mut seq, reason));
        }

        seq.counter = stamp.counter();
        if let Some(next) = next {
            info!(
                "config {} committed at {:?} by leader {}",
                next.version(), stamp, from
            );
            seq.config = next;
        }
        seq.log.push((stamp, record));
        let replicas: Vec<NodeID> = seq.replicas.keys().cloned().collect();
        for id in replicas {
            if self.online.contains(&id) {
                seq.catch_up(id);
            }
        }
        Ok(Proposal::Commit(stamp))
    }

    async fn leader(&self) -> Option<NodeID> {
        self.sequencer.lock().await.leader
    }

    async fn synced_followers(&self) -> HashSet<NodeID> {
        let seq = self.sequencer.lock().await;
        if seq.leader.is_none() {
            return HashSet::default();
        }
        let head = seq.log.len();
        seq.replicas
            .iter()
            .filter(|(id, replica)| self.online.contains(*id) && replica.next == head)
            .map(|(id, _)| *id)
            .collect()
    }

    async fn establish_epoch(&self, leader: NodeID) -> ReconfigResult<Stamp> {
        let mut seq = self.sequencer.lock().await;
        if seq.leader != Some(leader) {
            return Err(ConsensusError::NotLeader(seq.leader));
        }
        let acks = self.online_replicas(&seq);
        if !QuorumSystem::majority_of(&seq.config).is_quorum(acks.iter()) {
            let reason = format!("new epoch acked only by {:?}", acks);
            return Err(self.step_down(&mut seq, reason));
        }
        seq.epoch = seq.epoch.saturating_add(1);
        seq.counter = 0;
        let established = Stamp::new(seq.epoch, 0);
        info!("leader {} established epoch {:?}", leader, established);
        seq.notify_election(&ElectionOutcome::Elected(leader), &self.online);
        Ok(established)
    }

    async fn resign(&self, leader: NodeID) {
        let mut seq = self.sequencer.lock().await;
        if seq.leader == Some(leader) {
            info!("leader {} resigned", leader);
            seq.leader = None;
            seq.notify_election(&ElectionOutcome::Pending, &self.online);
        }
    }

    async fn elect(&self) -> ElectionOutcome {
        let mut seq = self.sequencer.lock().await;
        let live = self.online_replicas(&seq);
        let last_stamps: HashMap<NodeID, Stamp> = live
            .iter()
            .map(|id| (*id, seq.last_stamp_of(*id)))
            .collect();
        let outcome = elect(&seq.config, &live, &last_stamps);
        match outcome {
            ElectionOutcome::Elected(leader) => {
                seq.leader = Some(leader);
                seq.epoch = seq.epoch.saturating_add(1);
                seq.counter = 0;
                info!("server {} elected as leader of epoch {}", leader, seq.epoch);
            }
            ElectionOutcome::Pending => {
                seq.leader = None;
                warn!("no leader elected among live servers {:?}", live);
            }
        }
        seq.notify_election(&outcome, &self.online);
        outcome
    }
}
