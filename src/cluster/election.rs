//! Registration gossip and deterministic leader election.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ClusterState, NodeEvent};
use crate::broker::{names, BrokerAdapter};
use crate::codec;
use crate::error::ParkClusterError;
use crate::model::NodeId;
use crate::{pf_error, pf_trace};

/// Records a registration. Returns `true` if the sender was not already
/// known, so the caller can decide whether to re-gossip its own ID
/// (gossip convergence in O(N) rounds).
pub fn apply_registration(state: &mut ClusterState, from: NodeId) -> bool {
    state.active_nodes.insert(from)
}

/// Deterministic election rule: the natural-order minimum of the active
/// set, only once quorum is met and no leader is already known.
pub fn try_elect(state: &ClusterState, min_nodes: usize) -> Option<NodeId> {
    if state.current_leader.is_some() {
        return None;
    }
    if state.active_nodes.len() < min_nodes {
        return None;
    }
    state.active_nodes.iter().min().cloned()
}

/// Publishes this node's ID to the election exchange.
pub async fn publish_registration(
    broker: &dyn BrokerAdapter,
    self_id: &NodeId,
) -> Result<(), ParkClusterError> {
    broker
        .publish_fanout(
            names::LEADER_ELECTION_EXCHANGE,
            codec::format_registration(self_id).as_bytes(),
        )
        .await
}

/// Declares and binds this node's private queue on the election exchange.
pub async fn bind_own_queue(
    broker: &dyn BrokerAdapter,
    self_id: &NodeId,
) -> Result<String, ParkClusterError> {
    broker.declare_fanout(names::LEADER_ELECTION_EXCHANGE).await?;
    let queue = broker
        .declare_exclusive_queue(&format!("{}_election", self_id))
        .await?;
    broker
        .bind_fanout(names::LEADER_ELECTION_EXCHANGE, &queue)
        .await?;
    Ok(queue)
}

/// Spawns the consumer loop for the election-exchange-bound queue.
pub fn spawn_consumer(
    broker: Arc<dyn BrokerAdapter>,
    queue: String,
    tx: mpsc::UnboundedSender<NodeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut consumer = match broker.consume(&queue).await {
            Ok(c) => c,
            Err(e) => {
                pf_error!("failed to consume election queue {}: {}", queue, e);
                return;
            }
        };
        loop {
            let delivery = match consumer.recv().await {
                Ok(Some(d)) => d,
                Ok(None) => return,
                Err(e) => {
                    pf_error!("election consumer error: {}", e);
                    continue;
                }
            };
            let Ok(text) = delivery.text() else {
                pf_error!("non-utf8 registration payload dropped");
                continue;
            };
            match codec::parse_registration(text) {
                Ok(from) => {
                    pf_trace!("observed registration from {}", from);
                    if tx.send(NodeEvent::Registration { from }).is_err() {
                        return;
                    }
                }
                Err(e) => pf_error!("dropping malformed registration: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Election picks the natural-order minimum.
    #[test]
    fn election_picks_lowest_id() {
        let mut state = ClusterState::new(NodeId::new("B"));
        state.active_nodes.insert(NodeId::new("A"));
        state.active_nodes.insert(NodeId::new("C"));
        assert_eq!(try_elect(&state, 3), Some(NodeId::new("A")));
    }

    /// No election below quorum.
    #[test]
    fn no_election_below_quorum() {
        let mut state = ClusterState::new(NodeId::new("B"));
        state.active_nodes.insert(NodeId::new("A"));
        assert_eq!(try_elect(&state, 3), None);
    }

    #[test]
    fn no_re_election_once_leader_known() {
        let mut state = ClusterState::new(NodeId::new("B"));
        state.active_nodes.insert(NodeId::new("A"));
        state.active_nodes.insert(NodeId::new("C"));
        state.current_leader = Some(NodeId::new("A"));
        assert_eq!(try_elect(&state, 3), None);
    }

    #[test]
    fn registration_reports_whether_new() {
        let mut state = ClusterState::new(NodeId::new("A"));
        assert!(apply_registration(&mut state, NodeId::new("B")));
        assert!(!apply_registration(&mut state, NodeId::new("B")));
    }
}
