//! Heartbeat emission, consumption, and the non-leader watchdog. State
//! mutation is kept in small pure functions — the timestamp-before-
//! membership ordering and the membership-replacement semantics are
//! directly unit-testable — while the surrounding loops are thin glue
//! over the broker.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ClusterState, NodeEvent};
use crate::broker::{names, BrokerAdapter};
use crate::codec;
use crate::error::ParkClusterError;
use crate::model::NodeId;
use crate::{pf_error, pf_trace};

/// Applies an observed `HEARTBEAT:<leader>` message: the timestamp
/// updates before the membership set does.
pub fn apply_heartbeat_seen(state: &mut ClusterState, leader: NodeId) {
    state.last_heartbeat_at = std::time::Instant::now();
    state.active_nodes.insert(leader);
}

/// Applies an observed `NODE_LIST_UPDATE:<csv>` message: replaces
/// `activeNodes` wholesale, re-inserting self if the list omitted it.
pub fn apply_membership_update(state: &mut ClusterState, nodes: Vec<NodeId>) {
    let mut set: BTreeSet<NodeId> = nodes.into_iter().collect();
    set.insert(state.self_id.clone());
    state.active_nodes = set;
}

/// Publishes `HEARTBEAT:<leader>` then `NODE_LIST_UPDATE:<csv>`, in that
/// order, to the heartbeat exchange. Failures are returned for the caller
/// to log — the emitter loop must not crash the scheduler over a single
/// failed publish.
pub async fn emit(
    broker: &dyn BrokerAdapter,
    self_id: &NodeId,
    active_nodes: &BTreeSet<NodeId>,
) -> Result<(), ParkClusterError> {
    broker
        .publish_fanout(
            names::HEARTBEAT_EXCHANGE,
            codec::format_heartbeat(self_id).as_bytes(),
        )
        .await?;
    let nodes: Vec<NodeId> = active_nodes.iter().cloned().collect();
    broker
        .publish_fanout(
            names::HEARTBEAT_EXCHANGE,
            codec::format_node_list_update(&nodes).as_bytes(),
        )
        .await?;
    Ok(())
}

/// Spawns a periodic ticker that sends `make_event()` into `tx` every
/// `interval`, forever (until the receiver is dropped).
pub fn spawn_ticker(
    interval: Duration,
    tx: mpsc::UnboundedSender<NodeEvent>,
    make_event: impl Fn() -> NodeEvent + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if tx.send(make_event()).is_err() {
                return;
            }
        }
    })
}

/// Spawns the consumer loop for a node's heartbeat-exchange-bound queue:
/// parses each delivery as either a heartbeat or a membership update and
/// forwards the corresponding [`NodeEvent`]. A malformed message is
/// logged and dropped rather than crashing the loop or propagating.
pub fn spawn_consumer(
    broker: Arc<dyn BrokerAdapter>,
    queue: String,
    tx: mpsc::UnboundedSender<NodeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut consumer = match broker.consume(&queue).await {
            Ok(c) => c,
            Err(e) => {
                pf_error!("failed to consume heartbeat queue {}: {}", queue, e);
                return;
            }
        };
        loop {
            let delivery = match consumer.recv().await {
                Ok(Some(d)) => d,
                Ok(None) => return,
                Err(e) => {
                    pf_error!("heartbeat consumer error: {}", e);
                    continue;
                }
            };
            let Ok(text) = delivery.text() else {
                pf_error!("non-utf8 heartbeat payload dropped");
                continue;
            };
            if text.starts_with("HEARTBEAT:") {
                match codec::parse_heartbeat(text) {
                    Ok(leader) => {
                        pf_trace!("observed heartbeat from {}", leader);
                        if tx.send(NodeEvent::HeartbeatSeen { leader }).is_err() {
                            return;
                        }
                    }
                    Err(e) => pf_error!("dropping malformed heartbeat: {}", e),
                }
            } else if text.starts_with("NODE_LIST_UPDATE:") {
                match codec::parse_node_list_update(text) {
                    Ok(nodes) => {
                        pf_trace!("observed membership update: {:?}", nodes);
                        if tx.send(NodeEvent::MembershipUpdate { nodes }).is_err() {
                            return;
                        }
                    }
                    Err(e) => pf_error!("dropping malformed membership update: {}", e),
                }
            } else {
                pf_error!("dropping unknown heartbeat-exchange message: {:?}", text);
            }
        }
    })
}

/// Declares and binds this node's private queue on the heartbeat
/// exchange, returning the assigned queue name.
pub async fn bind_own_queue(
    broker: &dyn BrokerAdapter,
    self_id: &NodeId,
) -> Result<String, ParkClusterError> {
    broker.declare_fanout(names::HEARTBEAT_EXCHANGE).await?;
    let queue = broker
        .declare_exclusive_queue(&format!("{}_heartbeat", self_id))
        .await?;
    broker.bind_fanout(names::HEARTBEAT_EXCHANGE, &queue).await?;
    Ok(queue)
}

/// A silent leader, per the watchdog rule: no heartbeat seen for longer
/// than `heartbeat_interval`.
pub fn leader_is_silent(
    state: &ClusterState,
    heartbeat_interval: Duration,
) -> bool {
    state.last_heartbeat_at.elapsed() > heartbeat_interval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_seen_updates_timestamp_then_membership() {
        let mut state = ClusterState::new(NodeId::new("B"));
        let before = state.last_heartbeat_at;
        std::thread::sleep(Duration::from_millis(5));
        apply_heartbeat_seen(&mut state, NodeId::new("A"));
        assert!(state.last_heartbeat_at > before);
        assert!(state.active_nodes.contains(&NodeId::new("A")));
    }

    #[test]
    fn membership_update_replaces_set_and_keeps_self() {
        let mut state = ClusterState::new(NodeId::new("C"));
        state.active_nodes.insert(NodeId::new("stale"));
        apply_membership_update(&mut state, vec![NodeId::new("A"), NodeId::new("B")]);
        assert!(state.active_nodes.contains(&NodeId::new("A")));
        assert!(state.active_nodes.contains(&NodeId::new("B")));
        assert!(state.active_nodes.contains(&NodeId::new("C")));
        assert!(!state.active_nodes.contains(&NodeId::new("stale")));
    }

    /// A silent leader is detected once more than `HEARTBEAT_INTERVAL`
    /// has elapsed since the last observed heartbeat.
    #[test]
    fn silent_leader_detected_after_interval() {
        let mut state = ClusterState::new(NodeId::new("B"));
        state.last_heartbeat_at =
            std::time::Instant::now() - Duration::from_secs(10);
        assert!(leader_is_silent(&state, Duration::from_secs(5)));
    }

    #[test]
    fn fresh_heartbeat_is_not_silent() {
        let state = ClusterState::new(NodeId::new("B"));
        assert!(!leader_is_silent(&state, Duration::from_secs(5)));
    }
}
