//! Follower-side recommendation computation. Pure with respect to the
//! [`DataView`] it is handed — no broker access here, so the ranking
//! policy is directly unit-testable against a [`FixtureDataView`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broker::{names, BrokerAdapter, PublishOptions};
use crate::codec;
use crate::dataview::{self, DataView, SpaceId};
use crate::model::{Entry, NodeId, Proposal, Score};
use crate::{pf_error, pf_trace, pf_warn};

/// Computes the ranked suggestion list for one `(zone, requestedSpace)`
/// task.
///
/// Resolves the ambiguity between "requested space available" and "no
/// alternative at all" as follows (see DESIGN.md): when zero spaces in
/// the zone are free, the only signal worth returning is that the
/// originally requested space is busy — `[(requestedSpace, BUSY)]`.
/// Otherwise ranking distance is always measured from the *originally
/// requested* space ID, even when a substitute target is needed to
/// decide the min-citations comparison.
pub async fn generate_recommendation(
    data_view: &dyn DataView,
    zone_name: &str,
    requested_space_tag: &str,
) -> Proposal {
    let Some(zone) = data_view.zone_id(zone_name).await else {
        pf_warn!(
            "unknown zone {:?} for requested space {:?}; returning empty proposal",
            zone_name,
            requested_space_tag
        );
        return Vec::new();
    };

    let Some(requested_id) = dataview::parse_space_tag(requested_space_tag) else {
        pf_warn!(
            "unparseable requested space tag {:?}; returning empty proposal",
            requested_space_tag
        );
        return Vec::new();
    };

    let all_spaces = data_view.spaces_in_zone(&zone).await;
    let occupied = data_view.occupied_space_ids(&zone).await;
    let available: Vec<SpaceId> = all_spaces
        .into_iter()
        .filter(|id| !occupied.contains(id))
        .collect();

    if available.is_empty() {
        return vec![Entry::new(requested_space_tag, Score::Busy)];
    }

    let target_id = if available.contains(&requested_id) {
        requested_id
    } else {
        nearest_by_id(&available, requested_id)
            .expect("available is non-empty")
    };

    let citations = data_view.citation_counts(&available).await;
    let min_citations = available
        .iter()
        .map(|id| citations.get(id).copied().unwrap_or(0))
        .min()
        .unwrap_or(0);

    let target_citations = citations.get(&target_id).copied().unwrap_or(0);
    if target_citations == min_citations {
        return vec![Entry::new(
            dataview::space_tag(target_id),
            Score::Citations(min_citations),
        )];
    }

    let mut alternatives: Vec<SpaceId> = available
        .iter()
        .copied()
        .filter(|id| *id != target_id && citations.get(id).copied().unwrap_or(0) == min_citations)
        .collect();
    alternatives.sort_by_key(|id| distance(*id, requested_id));
    alternatives.truncate(2);

    if alternatives.is_empty() {
        let nearest = nearest_by_id(&available, requested_id)
            .expect("available is non-empty");
        return vec![Entry::new(
            dataview::space_tag(nearest),
            Score::Citations(citations.get(&nearest).copied().unwrap_or(0)),
        )];
    }

    alternatives
        .into_iter()
        .map(|id| {
            Entry::new(
                dataview::space_tag(id),
                Score::Citations(citations.get(&id).copied().unwrap_or(0)),
            )
        })
        .collect()
}

fn distance(a: SpaceId, b: SpaceId) -> u32 {
    a.abs_diff(b)
}

fn nearest_by_id(available: &[SpaceId], anchor: SpaceId) -> Option<SpaceId> {
    available.iter().copied().min_by_key(|id| distance(*id, anchor))
}

/// Spawns the follower's task consumer loop: on each `<zone>:<space>`
/// delivery, computes a proposal and publishes it to the leader's
/// inbound-proposals queue as `<nodeId>:<csv>`. A malformed task is
/// logged and dropped — no proposal is published for it.
pub fn spawn_task_consumer(
    broker: Arc<dyn BrokerAdapter>,
    data_view: Arc<dyn DataView>,
    self_id: NodeId,
    task_queue: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut consumer = match broker.consume(&task_queue).await {
            Ok(c) => c,
            Err(e) => {
                pf_error!("failed to consume task queue {}: {}", task_queue, e);
                return;
            }
        };
        loop {
            let delivery = match consumer.recv().await {
                Ok(Some(d)) => d,
                Ok(None) => return,
                Err(e) => {
                    pf_error!("task consumer error: {}", e);
                    continue;
                }
            };
            let Ok(text) = delivery.text() else {
                pf_error!("non-utf8 task payload dropped");
                continue;
            };
            let (zone, requested_space) = match codec::parse_task(text) {
                Ok(pair) => pair,
                Err(e) => {
                    pf_error!("dropping malformed task: {}", e);
                    continue;
                }
            };

            let proposal =
                generate_recommendation(data_view.as_ref(), &zone, &requested_space).await;
            pf_trace!(
                "computed proposal for {}:{} -> {:?}",
                zone,
                requested_space,
                proposal
            );

            let wire = codec::format_proposal(&self_id, &proposal);
            if let Err(e) = broker
                .publish(
                    names::LEADER_RECOMMENDATION_QUEUE,
                    wire.as_bytes(),
                    PublishOptions::none(),
                )
                .await
            {
                pf_error!("failed to publish proposal: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataview::FixtureDataView;

    /// A proposal never contains an occupied space.
    #[tokio::test]
    async fn availability_filter_excludes_occupied() {
        let view = FixtureDataView::new()
            .with_zone("ZoneA", [1, 2, 3])
            .occupy("ZoneA", 2)
            .with_citations(1, 0)
            .with_citations(3, 0);
        let proposal = generate_recommendation(&view, "ZoneA", "PS2").await;
        assert!(proposal.iter().all(|e| e.space_tag != "PS2"));
    }

    /// Requested space is available and already minimal -> returned verbatim.
    #[tokio::test]
    async fn requested_space_at_minimum_returned_verbatim() {
        let view = FixtureDataView::new()
            .with_zone("ZoneA", [3])
            .with_citations(3, 1);
        let proposal = generate_recommendation(&view, "ZoneA", "PS3").await;
        assert_eq!(proposal, vec![Entry::new("PS3", Score::Citations(1))]);
    }

    #[tokio::test]
    async fn unknown_zone_yields_empty_proposal() {
        let view = FixtureDataView::new();
        let proposal = generate_recommendation(&view, "Nowhere", "PS1").await;
        assert!(proposal.is_empty());
    }

    #[tokio::test]
    async fn fully_occupied_zone_reports_requested_space_busy() {
        let view = FixtureDataView::new()
            .with_zone("ZoneA", [1, 2])
            .occupy("ZoneA", 1)
            .occupy("ZoneA", 2);
        let proposal = generate_recommendation(&view, "ZoneA", "PS1").await;
        assert_eq!(proposal, vec![Entry::new("PS1", Score::Busy)]);
    }

    #[tokio::test]
    async fn requested_occupied_falls_back_to_nearest_alternative() {
        let view = FixtureDataView::new()
            .with_zone("ZoneA", [1, 2, 5])
            .occupy("ZoneA", 2)
            .with_citations(1, 4)
            .with_citations(5, 1);
        // requested PS2 is occupied; among {1,5} min citations is space 5 (1)
        let proposal = generate_recommendation(&view, "ZoneA", "PS2").await;
        assert_eq!(proposal, vec![Entry::new("PS5", Score::Citations(1))]);
    }

    #[tokio::test]
    async fn alternatives_limited_to_two_and_ordered_by_proximity() {
        let view = FixtureDataView::new()
            .with_zone("ZoneA", [1, 5, 6, 7, 20])
            .occupy("ZoneA", 1)
            .with_citations(5, 3)
            .with_citations(6, 0)
            .with_citations(7, 0)
            .with_citations(20, 0);
        // requested PS1 is occupied; nearest available (5) has 3 citations,
        // above the zone minimum of 0, so up to two closer-to-PS1
        // alternatives at the minimum are returned instead.
        let proposal = generate_recommendation(&view, "ZoneA", "PS1").await;
        assert_eq!(
            proposal,
            vec![
                Entry::new("PS6", Score::Citations(0)),
                Entry::new("PS7", Score::Citations(0)),
            ]
        );
    }
}
