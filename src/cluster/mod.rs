//! Cluster membership, leader election, and heartbeat monitoring (the
//! control plane) plus task distribution and consensus (the data plane).
//! A node's role is a tagged state rather than scattered booleans, driven
//! by typed events through a single-owner actor.

pub mod actor;
pub mod dispatcher;
pub mod election;
pub mod heartbeat;
pub mod recommender;

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use crate::model::{NodeId, Proposal, RecommendationRequest};

/// A node's role in the cluster, as an explicit, named state rather than
/// scattered boolean flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Freshly started; passively listening for an existing leader during
    /// the startup window.
    Discovering,
    /// No leader known; gossiping registration and waiting for quorum.
    Registering,
    /// Active member following the named leader.
    Follower(NodeId),
    /// Authoritative for consensus.
    Leader,
}

impl Role {
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader)
    }

    pub fn current_leader(&self, me: &NodeId) -> Option<NodeId> {
        match self {
            Role::Leader => Some(me.clone()),
            Role::Follower(leader) => Some(leader.clone()),
            Role::Discovering | Role::Registering => None,
        }
    }
}

/// Per-node cluster state. Owned exclusively by the node's actor; no
/// other task ever touches it directly.
#[derive(Debug, Clone)]
pub struct ClusterState {
    pub self_id: NodeId,
    pub active_nodes: BTreeSet<NodeId>,
    pub current_leader: Option<NodeId>,
    pub last_heartbeat_at: Instant,
    pub received_proposals: HashMap<NodeId, Proposal>,
}

impl ClusterState {
    pub fn new(self_id: NodeId) -> Self {
        let mut active_nodes = BTreeSet::new();
        active_nodes.insert(self_id.clone());
        ClusterState {
            self_id,
            active_nodes,
            current_leader: None,
            last_heartbeat_at: Instant::now(),
            received_proposals: HashMap::new(),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.current_leader.as_ref() == Some(&self.self_id)
    }

    /// `currentLeader ∈ activeNodes ∨ currentLeader == ⊥`.
    pub fn leader_in_active_nodes(&self) -> bool {
        match &self.current_leader {
            None => true,
            Some(leader) => self.active_nodes.contains(leader),
        }
    }

    pub fn clear_membership(&mut self) {
        self.active_nodes.clear();
        self.active_nodes.insert(self.self_id.clone());
        self.current_leader = None;
    }
}

/// Typed internal events driving the node's actor loop. Every suspension
/// point (broker recv, timer fire) is a producer of one of these.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A `HEARTBEAT:<id>` message was observed on the heartbeat exchange.
    HeartbeatSeen { leader: NodeId },
    /// A `NODE_LIST_UPDATE:<csv>` message was observed.
    MembershipUpdate { nodes: Vec<NodeId> },
    /// A registration message was observed on the election exchange.
    Registration { from: NodeId },
    /// The leader's heartbeat-emission timer fired.
    HeartbeatTick,
    /// The non-leader watchdog timer fired.
    WatchdogTick,
    /// The startup listening window elapsed.
    StartupWindowElapsed,
    /// A client recommendation request arrived on the inbound queue.
    ClientRequest(RecommendationRequest),
    /// A follower's proposal arrived for the current round.
    ProposalReceived { from: NodeId, proposal: Proposal },
    /// A consensus round's deadline elapsed without reaching quorum.
    RoundTimedOut { round_id: u64 },
}
