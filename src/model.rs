//! Core data model: node identity, proposal entries, and the wire-level
//! request/reply shapes the cluster exchanges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, totally-ordered identity of a cluster member. Stable for the
/// lifetime of the owning process.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// A proposal entry's score: either a non-negative citation count or the
/// `BUSY` sentinel meaning the space is currently occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Score {
    Citations(u32),
    Busy,
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Score::Citations(n) => write!(f, "{}", n),
            Score::Busy => write!(f, "BUSY"),
        }
    }
}

/// One `(spaceTag, score)` pair as it appears in a proposal or a
/// consensus outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub space_tag: String,
    pub score: Score,
}

impl Entry {
    pub fn new(space_tag: impl Into<String>, score: Score) -> Self {
        Entry {
            space_tag: space_tag.into(),
            score,
        }
    }

    /// The wire representation `<spaceTag>;<score>`, also used as the
    /// vote key for the majority rule: entries are counted by this
    /// serialization, never by a structural `Score` comparison.
    pub fn wire(&self) -> String {
        format!("{};{}", self.space_tag, self.score)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.wire())
    }
}

/// A follower's ranked suggestion list for one request. Empty means no
/// available alternative was found.
pub type Proposal = Vec<Entry>;

/// The result of a consensus round: a possibly empty list of entries.
pub type ConsensusOutcome = Vec<Entry>;

/// A client-facing recommendation request plus its request/reply carrier
/// metadata.
#[derive(Debug, Clone)]
pub struct RecommendationRequest {
    pub zone_name: String,
    pub requested_space_tag: String,
    pub correlation_id: String,
    pub reply_to: String,
}

impl RecommendationRequest {
    /// The `<zone>:<requestedSpace>` task-broadcast payload, unchanged
    /// from the inbound request body.
    pub fn task_payload(&self) -> String {
        format!("{}:{}", self.zone_name, self.requested_space_tag)
    }
}
