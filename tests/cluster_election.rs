//! Multi-node election and membership behavior driven against the
//! in-memory broker with shortened timing constants, since it would
//! otherwise take tens of seconds to exercise a single watchdog cycle.

use std::sync::Arc;
use std::time::Duration;

use parkcluster::broker::memory::MemoryBroker;
use parkcluster::broker::BrokerAdapter;
use parkcluster::config::TimingOverrides;
use parkcluster::dataview::FixtureDataView;
use parkcluster::{ClusterNodeActor, NodeConfig, NodeId, RecommendationClient};

fn fast_timings() -> TimingOverrides {
    TimingOverrides {
        heartbeat_interval_ms: Some(30),
        leader_check_interval_ms: Some(90),
        initial_wait_time_ms: Some(40),
        request_reply_timeout_ms: Some(500),
        broker_reconnect_delay_ms: Some(30),
    }
}

fn node_config(node_id: &str, min_nodes: usize) -> NodeConfig {
    NodeConfig {
        broker_host: "unused".into(),
        broker_ports: vec![0],
        broker_user: "guest".into(),
        broker_password: "guest".into(),
        node_id: NodeId::new(node_id),
        min_nodes,
        timings: fast_timings(),
    }
}

fn spawn_node(broker: Arc<dyn BrokerAdapter>, node_id: &str, min_nodes: usize) {
    let actor = ClusterNodeActor::new(
        node_config(node_id, min_nodes),
        broker,
        Arc::new(FixtureDataView::new().with_zone("ZoneA", [1, 2, 3])),
    );
    tokio::spawn(async move {
        let _ = actor.run().await;
    });
}

/// Three nodes converge on the lowest-ID leader only once quorum is
/// reached, and a request only succeeds once that has happened.
#[tokio::test]
async fn three_nodes_elect_lowest_id_and_serve_requests() {
    let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
    spawn_node(broker.clone(), "C", 3);
    spawn_node(broker.clone(), "B", 3);
    spawn_node(broker.clone(), "A", 3);

    // give the startup window, registration gossip, and election a moment
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = RecommendationClient::new(broker, Duration::from_secs(2));
    let reply = client.recommend("ZoneA", "PS1").await.unwrap();
    assert!(!reply.is_empty(), "leader should have formed and replied");
}

/// Below quorum, no leader can ever form, so a request has nobody to
/// answer it and times out.
#[tokio::test]
async fn request_times_out_below_quorum() {
    let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
    // only one of the two required nodes ever starts
    spawn_node(broker.clone(), "A", 2);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = RecommendationClient::new(broker, Duration::from_millis(300));
    let result = client.recommend("ZoneA", "PS1").await;
    assert!(result.is_err(), "no leader should ever have formed");
}

/// A late joiner discovers the existing leader via heartbeats and
/// becomes a follower without disrupting service.
#[tokio::test]
async fn late_joiner_follows_without_disrupting_leader() {
    let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
    spawn_node(broker.clone(), "A", 2);
    spawn_node(broker.clone(), "B", 2);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // C joins after A and B have already elected A as leader
    spawn_node(broker.clone(), "C", 2);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let client = RecommendationClient::new(broker, Duration::from_secs(2));
    let reply = client.recommend("ZoneA", "PS2").await.unwrap();
    assert!(!reply.is_empty(), "existing leader should still serve requests");
}
