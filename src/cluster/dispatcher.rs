//! Leader-side task distribution and consensus collection. Rounds are
//! serialized on the leader, so [`crate::cluster::actor::ClusterNodeActor`]
//! only ever has one [`RoundState`] open at a time, queuing any request
//! that arrives mid-round.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::NodeEvent;
use crate::broker::{names, BrokerAdapter, PublishOptions};
use crate::codec;
use crate::consensus::majority_rule;
use crate::error::ParkClusterError;
use crate::model::{ConsensusOutcome, NodeId, Proposal, RecommendationRequest};
use crate::{pf_error, pf_info, pf_trace};

/// State of one in-flight consensus round.
#[derive(Debug, Clone)]
pub struct RoundState {
    pub round_id: u64,
    pub request: RecommendationRequest,
}

/// A round is ready once a proposal has arrived from at least `min_nodes`
/// distinct senders — in practice the full cluster size.
pub fn round_ready(received: &HashMap<NodeId, Proposal>, min_nodes: usize) -> bool {
    received.len() >= min_nodes
}

/// Runs the majority rule over everything collected so far.
pub fn decide(received: &HashMap<NodeId, Proposal>) -> ConsensusOutcome {
    majority_rule(&received.values().cloned().collect::<Vec<_>>())
}

/// Publishes the task, unchanged, to the fan-out exchange.
pub async fn publish_task(
    broker: &dyn BrokerAdapter,
    request: &RecommendationRequest,
) -> Result<(), ParkClusterError> {
    broker
        .publish_fanout(
            names::RECOMMENDATION_TASK_EXCHANGE,
            request.task_payload().as_bytes(),
        )
        .await
}

/// Broadcasts the final decision (informational only).
pub async fn publish_final_decision(
    broker: &dyn BrokerAdapter,
    correlation_id: &str,
    outcome: &[crate::model::Entry],
) -> Result<(), ParkClusterError> {
    broker
        .publish(
            names::LEADER_FINAL_RECOMMENDATION,
            codec::format_final_decision(correlation_id, outcome).as_bytes(),
            PublishOptions::none(),
        )
        .await
}

/// Replies to the original caller on its private reply queue with its own
/// correlation ID.
pub async fn reply_to_caller(
    broker: &dyn BrokerAdapter,
    request: &RecommendationRequest,
    outcome: &[crate::model::Entry],
) -> Result<(), ParkClusterError> {
    broker
        .publish(
            &request.reply_to,
            codec::format_reply(outcome).as_bytes(),
            PublishOptions {
                correlation_id: Some(request.correlation_id.clone()),
                reply_to: None,
            },
        )
        .await
}

/// Spawns the consumer loop for the inbound client-request queue.
/// Messages missing a correlation ID or reply-to are protocol errors:
/// logged and dropped, since there is nowhere to send a reply.
pub fn spawn_client_request_consumer(
    broker: Arc<dyn BrokerAdapter>,
    tx: mpsc::UnboundedSender<NodeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        broker
            .declare_queue(names::RECOMMENDATION_QUEUE)
            .await
            .ok();
        let mut consumer = match broker.consume(names::RECOMMENDATION_QUEUE).await {
            Ok(c) => c,
            Err(e) => {
                pf_error!("failed to consume recommendation queue: {}", e);
                return;
            }
        };
        loop {
            let delivery = match consumer.recv().await {
                Ok(Some(d)) => d,
                Ok(None) => return,
                Err(e) => {
                    pf_error!("client request consumer error: {}", e);
                    continue;
                }
            };
            let (Some(correlation_id), Some(reply_to)) =
                (delivery.correlation_id.clone(), delivery.reply_to.clone())
            else {
                pf_error!("dropping client request with no correlation/reply_to");
                continue;
            };
            let Ok(text) = delivery.text() else {
                pf_error!("non-utf8 client request payload dropped");
                continue;
            };
            match codec::parse_task(text) {
                Ok((zone_name, requested_space_tag)) => {
                    pf_info!(
                        "accepted request {} for {}:{}",
                        correlation_id,
                        zone_name,
                        requested_space_tag
                    );
                    let request = RecommendationRequest {
                        zone_name,
                        requested_space_tag,
                        correlation_id,
                        reply_to,
                    };
                    if tx.send(NodeEvent::ClientRequest(request)).is_err() {
                        return;
                    }
                }
                Err(e) => pf_error!("dropping malformed client request: {}", e),
            }
        }
    })
}

/// Spawns the consumer loop for the inbound proposals queue.
pub fn spawn_proposal_consumer(
    broker: Arc<dyn BrokerAdapter>,
    tx: mpsc::UnboundedSender<NodeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        broker
            .declare_queue(names::LEADER_RECOMMENDATION_QUEUE)
            .await
            .ok();
        let mut consumer = match broker.consume(names::LEADER_RECOMMENDATION_QUEUE).await {
            Ok(c) => c,
            Err(e) => {
                pf_error!("failed to consume leader recommendation queue: {}", e);
                return;
            }
        };
        loop {
            let delivery = match consumer.recv().await {
                Ok(Some(d)) => d,
                Ok(None) => return,
                Err(e) => {
                    pf_error!("proposal consumer error: {}", e);
                    continue;
                }
            };
            let Ok(text) = delivery.text() else {
                pf_error!("non-utf8 proposal payload dropped");
                continue;
            };
            match codec::parse_proposal(text) {
                Ok((from, proposal)) => {
                    pf_trace!("received proposal from {}: {:?}", from, proposal);
                    if tx
                        .send(NodeEvent::ProposalReceived { from, proposal })
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => pf_error!("dropping malformed proposal: {}", e),
            }
        }
    })
}

/// Spawns the per-round deadline timer, bounding how long the dispatcher
/// waits on a missing follower instead of hanging forever.
pub fn spawn_round_deadline(
    round_id: u64,
    timeout: Duration,
    tx: mpsc::UnboundedSender<NodeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = tx.send(NodeEvent::RoundTimedOut { round_id });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entry, Score};

    #[test]
    fn round_ready_gate() {
        let mut received = HashMap::new();
        assert!(!round_ready(&received, 3));
        received.insert(NodeId::new("A"), vec![]);
        received.insert(NodeId::new("B"), vec![]);
        assert!(!round_ready(&received, 3));
        received.insert(NodeId::new("C"), vec![]);
        assert!(round_ready(&received, 3));
    }

    /// decide() only ever looks at what is passed in — no hidden
    /// round-to-round state to leak.
    #[test]
    fn decide_depends_only_on_input() {
        let mut round1 = HashMap::new();
        round1.insert(NodeId::new("A"), vec![Entry::new("PS1", Score::Citations(1))]);
        round1.insert(NodeId::new("B"), vec![Entry::new("PS1", Score::Citations(1))]);
        round1.insert(NodeId::new("C"), vec![Entry::new("PS1", Score::Citations(1))]);
        let outcome1 = decide(&round1);

        let mut round2 = HashMap::new();
        round2.insert(NodeId::new("A"), vec![Entry::new("PS2", Score::Citations(9))]);
        round2.insert(NodeId::new("B"), vec![Entry::new("PS2", Score::Citations(9))]);
        round2.insert(NodeId::new("C"), vec![Entry::new("PS2", Score::Citations(9))]);
        let outcome2 = decide(&round2);

        assert_eq!(outcome1, vec![Entry::new("PS1", Score::Citations(1))]);
        assert_eq!(outcome2, vec![Entry::new("PS2", Score::Citations(9))]);
    }
}
