//! The single-owner event loop driving one cluster node. Every other
//! task in this crate — heartbeat timers, the election/heartbeat/task
//! consumers, the round deadline — only ever talks to the node by sending
//! a [`NodeEvent`] into its mailbox; `ClusterNodeActor::run` is the only
//! code that ever touches [`ClusterState`] or [`Role`] directly.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::dispatcher::RoundState;
use super::{dispatcher, election, heartbeat, recommender, ClusterState, NodeEvent, Role};
use crate::broker::{names, BrokerAdapter};
use crate::config::NodeConfig;
use crate::dataview::DataView;
use crate::error::ParkClusterError;
use crate::model::{NodeId, Proposal, RecommendationRequest};
use crate::print;
use crate::{pf_error, pf_info, pf_warn};

/// Owns a node's cluster state and drives it to completion. Never cloned,
/// never shared — background tasks reach it only through `tx`.
pub struct ClusterNodeActor {
    config: NodeConfig,
    broker: Arc<dyn BrokerAdapter>,
    data_view: Arc<dyn DataView>,
    state: ClusterState,
    role: Role,
    tx: mpsc::UnboundedSender<NodeEvent>,
    rx: mpsc::UnboundedReceiver<NodeEvent>,
    background: Vec<JoinHandle<()>>,
    pending_requests: VecDeque<RecommendationRequest>,
    current_round: Option<RoundState>,
    next_round_id: u64,
}

impl ClusterNodeActor {
    pub fn new(
        config: NodeConfig,
        broker: Arc<dyn BrokerAdapter>,
        data_view: Arc<dyn DataView>,
    ) -> Self {
        print::set_me(config.node_id.as_str());
        let (tx, rx) = mpsc::unbounded_channel();
        let state = ClusterState::new(config.node_id.clone());
        ClusterNodeActor {
            config,
            broker,
            data_view,
            state,
            role: Role::Discovering,
            tx,
            rx,
            background: Vec::new(),
            pending_requests: VecDeque::new(),
            current_round: None,
            next_round_id: 0,
        }
    }

    /// Runs until the mailbox is closed (every sender dropped), which only
    /// happens on process shutdown since the actor itself holds a clone.
    pub async fn run(mut self) -> Result<(), ParkClusterError> {
        pf_info!(
            "starting node {} (min_nodes={})",
            self.state.self_id,
            self.config.min_nodes
        );

        let hb_queue = heartbeat::bind_own_queue(self.broker.as_ref(), &self.state.self_id).await?;
        self.background
            .push(heartbeat::spawn_consumer(self.broker.clone(), hb_queue, self.tx.clone()));

        let election_queue =
            election::bind_own_queue(self.broker.as_ref(), &self.state.self_id).await?;
        self.background.push(election::spawn_consumer(
            self.broker.clone(),
            election_queue,
            self.tx.clone(),
        ));

        self.background.push(heartbeat::spawn_ticker(
            self.config.heartbeat_interval(),
            self.tx.clone(),
            || NodeEvent::HeartbeatTick,
        ));
        self.background.push(heartbeat::spawn_ticker(
            self.config.leader_check_interval(),
            self.tx.clone(),
            || NodeEvent::WatchdogTick,
        ));

        let startup_tx = self.tx.clone();
        let initial_wait = self.config.initial_wait_time();
        self.background.push(tokio::spawn(async move {
            tokio::time::sleep(initial_wait).await;
            let _ = startup_tx.send(NodeEvent::StartupWindowElapsed);
        }));

        while let Some(event) = self.rx.recv().await {
            self.handle_event(event).await?;
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: NodeEvent) -> Result<(), ParkClusterError> {
        match event {
            NodeEvent::HeartbeatSeen { leader } => self.handle_heartbeat_seen(leader).await,
            NodeEvent::MembershipUpdate { nodes } => {
                heartbeat::apply_membership_update(&mut self.state, nodes);
                Ok(())
            }
            NodeEvent::Registration { from } => self.handle_registration(from).await,
            NodeEvent::HeartbeatTick => self.handle_heartbeat_tick().await,
            NodeEvent::WatchdogTick => self.handle_watchdog_tick().await,
            NodeEvent::StartupWindowElapsed => self.handle_startup_window_elapsed().await,
            NodeEvent::ClientRequest(request) => self.handle_client_request(request).await,
            NodeEvent::ProposalReceived { from, proposal } => {
                self.handle_proposal_received(from, proposal).await
            }
            NodeEvent::RoundTimedOut { round_id } => self.handle_round_timed_out(round_id).await,
        }
    }

    async fn handle_heartbeat_seen(&mut self, leader: NodeId) -> Result<(), ParkClusterError> {
        heartbeat::apply_heartbeat_seen(&mut self.state, leader.clone());
        if !matches!(self.role, Role::Follower(_) | Role::Leader) {
            self.state.current_leader = Some(leader.clone());
            if leader == self.state.self_id {
                self.become_leader().await?;
            } else {
                self.become_follower(leader).await?;
            }
        }
        Ok(())
    }

    async fn handle_registration(&mut self, from: NodeId) -> Result<(), ParkClusterError> {
        if matches!(self.role, Role::Follower(_) | Role::Leader) {
            return Ok(());
        }
        let is_new = election::apply_registration(&mut self.state, from.clone());
        if is_new && from != self.state.self_id {
            election::publish_registration(self.broker.as_ref(), &self.state.self_id).await?;
        }
        if let Some(leader) = election::try_elect(&self.state, self.config.min_nodes) {
            self.state.current_leader = Some(leader.clone());
            if leader == self.state.self_id {
                self.become_leader().await?;
            } else {
                self.become_follower(leader).await?;
            }
        }
        Ok(())
    }

    async fn handle_heartbeat_tick(&mut self) -> Result<(), ParkClusterError> {
        if !self.role.is_leader() {
            return Ok(());
        }
        if let Err(e) = heartbeat::emit(self.broker.as_ref(), &self.state.self_id, &self.state.active_nodes).await
        {
            pf_error!("heartbeat emission failed: {}", e);
        }
        Ok(())
    }

    /// Runs at `LEADER_CHECK_INTERVAL` on every node; only non-leader nodes
    /// with a known leader ever act on it.
    async fn handle_watchdog_tick(&mut self) -> Result<(), ParkClusterError> {
        if self.role.is_leader() || self.state.current_leader.is_none() {
            return Ok(());
        }
        if heartbeat::leader_is_silent(&self.state, self.config.heartbeat_interval()) {
            pf_warn!(
                "leader {:?} appears silent; clearing membership and re-registering",
                self.state.current_leader
            );
            self.state.clear_membership();
            self.role = Role::Registering;
            election::publish_registration(self.broker.as_ref(), &self.state.self_id).await?;
        }
        Ok(())
    }

    async fn handle_startup_window_elapsed(&mut self) -> Result<(), ParkClusterError> {
        if matches!(self.role, Role::Follower(_) | Role::Leader) {
            return Ok(());
        }
        self.role = Role::Registering;
        election::publish_registration(self.broker.as_ref(), &self.state.self_id).await?;
        Ok(())
    }

    async fn handle_client_request(
        &mut self,
        request: RecommendationRequest,
    ) -> Result<(), ParkClusterError> {
        if !self.role.is_leader() {
            pf_warn!("dropping client request received while not leader");
            return Ok(());
        }
        self.pending_requests.push_back(request);
        self.maybe_start_next_round().await
    }

    async fn handle_proposal_received(
        &mut self,
        from: NodeId,
        proposal: Proposal,
    ) -> Result<(), ParkClusterError> {
        if !self.role.is_leader() || self.current_round.is_none() {
            return Ok(());
        }
        self.state.received_proposals.insert(from, proposal);
        if dispatcher::round_ready(&self.state.received_proposals, self.config.min_nodes) {
            self.close_round().await?;
            self.maybe_start_next_round().await?;
        }
        Ok(())
    }

    async fn handle_round_timed_out(&mut self, round_id: u64) -> Result<(), ParkClusterError> {
        let still_open = self
            .current_round
            .as_ref()
            .is_some_and(|round| round.round_id == round_id);
        if !still_open {
            return Ok(());
        }
        pf_warn!(
            "round {} timed out with {}/{} responses; closing with what arrived",
            round_id,
            self.state.received_proposals.len(),
            self.config.min_nodes
        );
        self.close_round().await?;
        self.maybe_start_next_round().await
    }

    /// Decides the current round with whatever proposals have arrived and
    /// replies to the caller. Does not advance the queue itself — every
    /// caller does that afterward, since this is also reached from inside
    /// `maybe_start_next_round`'s own loop.
    async fn close_round(&mut self) -> Result<(), ParkClusterError> {
        let Some(round) = self.current_round.take() else {
            return Ok(());
        };
        let outcome = dispatcher::decide(&self.state.received_proposals);
        self.state.received_proposals.clear();

        if let Err(e) = dispatcher::publish_final_decision(
            self.broker.as_ref(),
            &round.request.correlation_id,
            &outcome,
        )
        .await
        {
            pf_error!("failed to broadcast final decision: {}", e);
        }
        dispatcher::reply_to_caller(self.broker.as_ref(), &round.request, &outcome).await
    }

    /// Opens rounds off the pending queue until one is left genuinely
    /// waiting on followers. The leader counts as a responder too
    /// (matching `min_nodes`'s "cluster size" interpretation): it computes
    /// its own proposal locally instead of round-tripping a task to itself
    /// over the fanout exchange, so a single-node or already-quorate round
    /// can close without waiting on anyone.
    async fn maybe_start_next_round(&mut self) -> Result<(), ParkClusterError> {
        while self.current_round.is_none() {
            let Some(request) = self.pending_requests.pop_front() else {
                return Ok(());
            };
            self.state.received_proposals.clear();
            let round_id = self.next_round_id;
            self.next_round_id += 1;

            let own_proposal = recommender::generate_recommendation(
                self.data_view.as_ref(),
                &request.zone_name,
                &request.requested_space_tag,
            )
            .await;
            self.state
                .received_proposals
                .insert(self.state.self_id.clone(), own_proposal);

            dispatcher::publish_task(self.broker.as_ref(), &request).await?;
            self.background.push(dispatcher::spawn_round_deadline(
                round_id,
                self.config.request_reply_timeout(),
                self.tx.clone(),
            ));
            self.current_round = Some(RoundState { round_id, request });

            if dispatcher::round_ready(&self.state.received_proposals, self.config.min_nodes) {
                self.close_round().await?;
            }
        }
        Ok(())
    }

    async fn become_leader(&mut self) -> Result<(), ParkClusterError> {
        pf_info!("elected leader");
        self.role = Role::Leader;
        self.broker.declare_fanout(names::RECOMMENDATION_TASK_EXCHANGE).await?;
        self.broker.declare_queue(names::LEADER_FINAL_RECOMMENDATION).await?;
        self.background.push(dispatcher::spawn_client_request_consumer(
            self.broker.clone(),
            self.tx.clone(),
        ));
        self.background.push(dispatcher::spawn_proposal_consumer(
            self.broker.clone(),
            self.tx.clone(),
        ));
        Ok(())
    }

    async fn become_follower(&mut self, leader: NodeId) -> Result<(), ParkClusterError> {
        pf_info!("following leader {}", leader);
        self.role = Role::Follower(leader);
        self.broker.declare_fanout(names::RECOMMENDATION_TASK_EXCHANGE).await?;
        let task_queue = names::task_queue_name(self.state.self_id.as_str());
        self.broker.declare_queue(&task_queue).await?;
        self.broker
            .bind_fanout(names::RECOMMENDATION_TASK_EXCHANGE, &task_queue)
            .await?;
        self.background.push(recommender::spawn_task_consumer(
            self.broker.clone(),
            self.data_view.clone(),
            self.state.self_id.clone(),
            task_queue,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::dataview::FixtureDataView;

    fn test_config(node_id: &str, min_nodes: usize) -> NodeConfig {
        NodeConfig {
            broker_host: "unused".into(),
            broker_ports: vec![0],
            broker_user: "guest".into(),
            broker_password: "guest".into(),
            node_id: NodeId::new(node_id),
            min_nodes,
            timings: Default::default(),
        }
    }

    /// A non-leader actor must never publish a task for a request it has
    /// no business answering — a follower never answers client requests.
    #[tokio::test]
    async fn client_request_ignored_while_not_leader() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
        let data_view: Arc<dyn DataView> = Arc::new(FixtureDataView::new());
        let mut actor = ClusterNodeActor::new(test_config("A", 3), broker, data_view);
        assert_eq!(actor.role, Role::Discovering);

        actor
            .handle_client_request(RecommendationRequest {
                zone_name: "ZoneA".into(),
                requested_space_tag: "PS1".into(),
                correlation_id: "corr-1".into(),
                reply_to: "reply-1".into(),
            })
            .await
            .unwrap();

        assert!(actor.pending_requests.is_empty());
        assert!(actor.current_round.is_none());
    }

    /// Registration gossip below quorum must never produce a leader.
    #[tokio::test]
    async fn no_leader_below_quorum_from_registration_alone() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
        let data_view: Arc<dyn DataView> = Arc::new(FixtureDataView::new());
        let mut actor = ClusterNodeActor::new(test_config("B", 3), broker, data_view);

        actor.handle_registration(NodeId::new("A")).await.unwrap();
        assert_eq!(actor.role, Role::Discovering);
        assert!(actor.state.current_leader.is_none());
    }
}
