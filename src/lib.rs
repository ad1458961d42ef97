//! Public interface to the parking recommendation cluster core, linked by
//! both the node executable and the demo client executable.

pub mod broker;
pub mod client;
pub mod cluster;
pub mod codec;
pub mod config;
pub mod consensus;
pub mod dataview;
pub mod error;
pub mod gateway;
pub mod model;
pub mod print;

pub use client::RecommendationClient;
pub use cluster::actor::ClusterNodeActor;
pub use cluster::{ClusterState, NodeEvent, Role};
pub use config::NodeConfig;
pub use error::ParkClusterError;
pub use model::{ConsensusOutcome, Entry, NodeId, Proposal, RecommendationRequest, Score};
