//! End-to-end consensus scenarios and round isolation driven against a
//! full three-node cluster over the in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use parkcluster::broker::memory::MemoryBroker;
use parkcluster::broker::BrokerAdapter;
use parkcluster::config::TimingOverrides;
use parkcluster::dataview::FixtureDataView;
use parkcluster::model::{Entry, Score};
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

fn fixture() -> Arc<FixtureDataView> {
    Arc::new(
        FixtureDataView::new()
            .with_zone("ZoneA", [3])
            .with_citations(3, 1),
    )
}

fn spawn_node(broker: Arc<dyn BrokerAdapter>, node_id: &str, min_nodes: usize) -> tokio::task::JoinHandle<()> {
    let actor = ClusterNodeActor::new(node_config(node_id, min_nodes), broker, fixture());
    tokio::spawn(async move {
        let _ = actor.run().await;
    })
}

/// Three nodes, quorum 3, requested space already at minimum citations
/// on every node — the reply is that exact entry.
#[tokio::test]
async fn three_node_unanimity_returns_requested_space() {
    let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
    spawn_node(broker.clone(), "A", 3);
    spawn_node(broker.clone(), "B", 3);
    spawn_node(broker.clone(), "C", 3);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = RecommendationClient::new(broker, Duration::from_secs(2));
    let reply = client.recommend("ZoneA", "PS3").await.unwrap();
    assert_eq!(reply, vec![Entry::new("PS3", Score::Citations(1))]);
}

/// The outcome of a second, independent request is unaffected by what a
/// prior round decided.
#[tokio::test]
async fn successive_rounds_are_isolated() {
    let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
    spawn_node(broker.clone(), "A", 2);
    spawn_node(broker.clone(), "B", 2);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let client = RecommendationClient::new(broker, Duration::from_secs(2));
    let first = client.recommend("ZoneA", "PS3").await.unwrap();
    let second = client.recommend("ZoneA", "PS3").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, vec![Entry::new("PS3", Score::Citations(1))]);
}

/// Once the leader goes silent, the watchdog clears membership on the
/// survivors, they re-register, and a new leader picks up client requests.
#[tokio::test]
async fn leader_crash_triggers_reelection() {
    let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
    let leader = spawn_node(broker.clone(), "A", 3);
    spawn_node(broker.clone(), "B", 3);
    spawn_node(broker.clone(), "C", 3);

    tokio::time::sleep(Duration::from_millis(200)).await;

    // confirm the cluster is serving requests before the crash
    let client = RecommendationClient::new(broker.clone(), Duration::from_secs(2));
    assert!(client.recommend("ZoneA", "PS3").await.is_ok());

    leader.abort();

    // past HEARTBEAT_INTERVAL + LEADER_CHECK_INTERVAL, B and C should have
    // cleared membership, re-registered, and elected B as the new leader
    tokio::time::sleep(Duration::from_millis(400)).await;

    let reply = client.recommend("ZoneA", "PS3").await.unwrap();
    assert_eq!(reply, vec![Entry::new("PS3", Score::Citations(1))]);
}
