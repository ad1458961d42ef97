//! The majority rule: a pure function over the set of proposals collected
//! during one consensus round. No I/O, no cluster state — kept
//! free-standing so it can be exercised directly with plain unit tests.

use std::collections::HashMap;

use crate::model::{ConsensusOutcome, Entry, Proposal};

/// Runs the majority rule over a round's collected proposals.
///
/// 1. Flattens all entries and counts occurrences by their wire string.
/// 2. Unanimity shortcut: if every proposal list is structurally equal
///    (same entries, same order), returns that list verbatim.
/// 3. Otherwise requires the largest occurrence count to strictly exceed
///    half the total vote count (integer division); ties at the max are
///    all returned, in first-seen order.
pub fn majority_rule(proposals: &[Proposal]) -> ConsensusOutcome {
    if proposals.is_empty() {
        return Vec::new();
    }

    if proposals.windows(2).all(|w| w[0] == w[1]) {
        return proposals[0].clone();
    }

    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, Entry> = HashMap::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total_votes: usize = 0;

    for proposal in proposals {
        for entry in proposal {
            let key = entry.wire();
            total_votes += 1;
            *counts.entry(key.clone()).or_insert(0) += 1;
            if !by_key.contains_key(&key) {
                order.push(key.clone());
                by_key.insert(key, entry.clone());
            }
        }
    }

    if total_votes == 0 {
        return Vec::new();
    }

    let max_votes = counts.values().copied().max().unwrap_or(0);
    if max_votes <= total_votes / 2 {
        return Vec::new();
    }

    order
        .into_iter()
        .filter(|k| counts[k] == max_votes)
        .map(|k| by_key.remove(&k).expect("key present by construction"))
        .collect()
}
