//! Well-known broker object names shared by every node and client.

/// External callers publish recommendation requests here; the leader consumes.
pub const RECOMMENDATION_QUEUE: &str = "recommendation_queue";
/// Leader fans tasks out to all followers.
pub const RECOMMENDATION_TASK_EXCHANGE: &str = "recommendation_task_exchange";
/// Followers publish proposals to the leader here.
pub const LEADER_RECOMMENDATION_QUEUE: &str = "leader_recommendation_queue";
/// Leader broadcasts the final decision here (informational).
pub const LEADER_FINAL_RECOMMENDATION: &str = "leader_final_recommendation";
/// Heartbeats and membership updates.
pub const HEARTBEAT_EXCHANGE: &str = "heartbeat_exchange";
/// Node registration gossip.
pub const LEADER_ELECTION_EXCHANGE: &str = "leader_election_exchange";

/// Per-node queue bound to [`RECOMMENDATION_TASK_EXCHANGE`].
pub fn task_queue_name(node_id: &str) -> String {
    format!("{}_task_queue", node_id)
}
