//! Read-only accessor over zones, spaces, and active transactions. Stands
//! in for the municipal document store from the follower's point of
//! view — it only ever needs to look up the handful of facts the
//! recommender computes from.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

/// Numeric parking space identifier. Recommender ranking compares these
/// by absolute difference, so it has to be a number, not an opaque tag —
/// the wire-level space tag (`"PS3"`) is just this ID with a fixed
/// prefix.
pub type SpaceId = u32;

/// Opaque zone identifier as understood by the data store, distinct from
/// the human-facing zone name used on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneId(pub String);

/// Renders a space ID back into the wire-level tag used in proposals.
pub fn space_tag(id: SpaceId) -> String {
    format!("PS{}", id)
}

/// Parses a wire-level space tag (`"PS3"`) back into its numeric ID.
/// Returns `None` for anything that doesn't fit the `PS<digits>` shape —
/// callers treat that as a protocol error, not a data error.
pub fn parse_space_tag(tag: &str) -> Option<SpaceId> {
    tag.strip_prefix("PS")?.parse().ok()
}

/// Read-only view over parking zones, spaces, open transactions, and
/// citation history. The follower never writes through this trait.
#[async_trait]
pub trait DataView: Send + Sync {
    /// Resolves a human-facing zone name to its data-store ID, or `None`
    /// if the zone is unknown.
    async fn zone_id(&self, zone_name: &str) -> Option<ZoneId>;

    /// All parking space IDs belonging to a zone.
    async fn spaces_in_zone(&self, zone: &ZoneId) -> Vec<SpaceId>;

    /// Space IDs with an open transaction (`end` field missing or null).
    async fn occupied_space_ids(&self, zone: &ZoneId) -> HashSet<SpaceId>;

    /// Citation counts for the given space IDs; any ID absent from the
    /// underlying store defaults to 0 rather than being omitted.
    async fn citation_counts(&self, space_ids: &[SpaceId]) -> HashMap<SpaceId, u32>;
}

/// In-memory fixture implementation used by tests and the demo CLI,
/// standing in for the real document store.
#[derive(Debug, Default, Clone)]
pub struct FixtureDataView {
    zones: HashMap<String, ZoneId>,
    spaces: HashMap<String, Vec<SpaceId>>,
    occupied: HashMap<String, HashSet<SpaceId>>,
    citations: HashMap<SpaceId, u32>,
}

impl FixtureDataView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zone(
        mut self,
        name: impl Into<String>,
        spaces: impl IntoIterator<Item = SpaceId>,
    ) -> Self {
        let name = name.into();
        self.zones.insert(name.clone(), ZoneId(name.clone()));
        self.spaces.insert(name.clone(), spaces.into_iter().collect());
        self.occupied.entry(name).or_default();
        self
    }

    pub fn occupy(mut self, zone: &str, space: SpaceId) -> Self {
        self.occupied.entry(zone.to_string()).or_default().insert(space);
        self
    }

    pub fn with_citations(mut self, space: SpaceId, count: u32) -> Self {
        self.citations.insert(space, count);
        self
    }
}

#[async_trait]
impl DataView for FixtureDataView {
    async fn zone_id(&self, zone_name: &str) -> Option<ZoneId> {
        self.zones.get(zone_name).cloned()
    }

    async fn spaces_in_zone(&self, zone: &ZoneId) -> Vec<SpaceId> {
        self.spaces.get(&zone.0).cloned().unwrap_or_default()
    }

    async fn occupied_space_ids(&self, zone: &ZoneId) -> HashSet<SpaceId> {
        self.occupied.get(&zone.0).cloned().unwrap_or_default()
    }

    async fn citation_counts(&self, space_ids: &[SpaceId]) -> HashMap<SpaceId, u32> {
        space_ids
            .iter()
            .map(|id| (*id, self.citations.get(id).copied().unwrap_or(0)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_tag_roundtrip() {
        assert_eq!(space_tag(3), "PS3");
        assert_eq!(parse_space_tag("PS3"), Some(3));
        assert_eq!(parse_space_tag("garbage"), None);
    }

    #[tokio::test]
    async fn fixture_defaults_missing_citations_to_zero() {
        let view = FixtureDataView::new()
            .with_zone("ZoneA", [1, 2, 3])
            .with_citations(1, 5);
        let counts = view.citation_counts(&[1, 2, 3]).await;
        assert_eq!(counts.get(&1), Some(&5));
        assert_eq!(counts.get(&2), Some(&0));
        assert_eq!(counts.get(&3), Some(&0));
    }
}
