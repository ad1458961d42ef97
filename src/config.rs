//! Per-node configuration and the timing constants referenced throughout
//! the cluster (heartbeat interval, election timeouts, reconnect delay).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ParkClusterError;
use crate::model::NodeId;

/// Leader publishes `HEARTBEAT`/`NODE_LIST_UPDATE` at this cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Non-leader nodes check for a silent leader at this cadence. Must stay
/// strictly greater than [`HEARTBEAT_INTERVAL`].
pub const LEADER_CHECK_INTERVAL: Duration = Duration::from_secs(7);
/// A freshly started node listens passively for an existing leader this long
/// before registering itself as a new candidate.
pub const INITIAL_WAIT_TIME: Duration = Duration::from_secs(5);
/// Bounded wait for a request/reply round-trip.
pub const REQUEST_REPLY_TIMEOUT: Duration = Duration::from_secs(15);
/// Fixed back-off between broker reconnect attempts.
pub const BROKER_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Recognized configuration keys for a cluster node, matching the
/// configuration table in the external interfaces section. Loaded as a
/// plain struct; environment-variable plumbing is left to the caller
/// (the node binary's `main`), not performed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hostname of the message broker.
    pub broker_host: String,
    /// Candidate ports, tried in order on connect.
    pub broker_ports: Vec<u16>,
    /// Broker auth user.
    #[serde(default = "default_broker_user")]
    pub broker_user: String,
    /// Broker auth password.
    #[serde(default = "default_broker_password")]
    pub broker_password: String,
    /// Stable identity of this node.
    pub node_id: NodeId,
    /// Quorum required to elect a leader and to close a consensus round.
    pub min_nodes: usize,

    /// Timing overrides, only ever non-default in tests that need to
    /// shrink the real-world intervals above.
    #[serde(default)]
    pub timings: TimingOverrides,
}

fn default_broker_user() -> String {
    "guest".to_string()
}

fn default_broker_password() -> String {
    "guest".to_string()
}

/// Optional overrides of the module-level timing constants, in
/// milliseconds. Absent fields fall back to the production defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingOverrides {
    pub heartbeat_interval_ms: Option<u64>,
    pub leader_check_interval_ms: Option<u64>,
    pub initial_wait_time_ms: Option<u64>,
    pub request_reply_timeout_ms: Option<u64>,
    pub broker_reconnect_delay_ms: Option<u64>,
}

impl NodeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        self.timings
            .heartbeat_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(HEARTBEAT_INTERVAL)
    }

    pub fn leader_check_interval(&self) -> Duration {
        self.timings
            .leader_check_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(LEADER_CHECK_INTERVAL)
    }

    pub fn initial_wait_time(&self) -> Duration {
        self.timings
            .initial_wait_time_ms
            .map(Duration::from_millis)
            .unwrap_or(INITIAL_WAIT_TIME)
    }

    pub fn request_reply_timeout(&self) -> Duration {
        self.timings
            .request_reply_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(REQUEST_REPLY_TIMEOUT)
    }

    pub fn broker_reconnect_delay(&self) -> Duration {
        self.timings
            .broker_reconnect_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(BROKER_RECONNECT_DELAY)
    }

    /// Validates the sanity constraints that are cheap to check up front:
    /// a quorum of zero or a check interval that is not strictly greater
    /// than the heartbeat interval would silently break watchdog
    /// detection later.
    pub fn validate(&self) -> Result<(), ParkClusterError> {
        if self.min_nodes == 0 {
            return logged_err!("invalid min_nodes '{}'", self.min_nodes);
        }
        if self.broker_ports.is_empty() {
            return logged_err!("no broker_ports configured");
        }
        if self.leader_check_interval() <= self.heartbeat_interval() {
            return logged_err!(
                "leader_check_interval ({:?}) must exceed heartbeat_interval ({:?})",
                self.leader_check_interval(),
                self.heartbeat_interval()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_quorum() {
        let cfg = NodeConfig {
            broker_host: "localhost".into(),
            broker_ports: vec![5672],
            broker_user: default_broker_user(),
            broker_password: default_broker_password(),
            node_id: NodeId::new("A"),
            min_nodes: 0,
            timings: TimingOverrides::default(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_intervals() {
        let mut cfg = NodeConfig {
            broker_host: "localhost".into(),
            broker_ports: vec![5672],
            broker_user: default_broker_user(),
            broker_password: default_broker_password(),
            node_id: NodeId::new("A"),
            min_nodes: 3,
            timings: TimingOverrides::default(),
        };
        cfg.timings.heartbeat_interval_ms = Some(1000);
        cfg.timings.leader_check_interval_ms = Some(500);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_sane_config() {
        let cfg = NodeConfig {
            broker_host: "localhost".into(),
            broker_ports: vec![5672, 5673],
            broker_user: default_broker_user(),
            broker_password: default_broker_password(),
            node_id: NodeId::new("A"),
            min_nodes: 3,
            timings: TimingOverrides::default(),
        };
        assert!(cfg.validate().is_ok());
    }
}
