//! Wire codec: isolates every `split`-on-separator parse/format pair
//! behind explicit functions returning structured errors, per the
//! "parsing by positional split" re-architecture note — the protocol
//! handlers never touch a raw string outside this module.

use crate::error::ParkClusterError;
use crate::model::{Entry, NodeId, Proposal, Score};

/// `HEARTBEAT:<leaderId>`.
pub fn format_heartbeat(leader: &NodeId) -> String {
    format!("HEARTBEAT:{}", leader)
}

pub fn parse_heartbeat(body: &str) -> Result<NodeId, ParkClusterError> {
    match body.split_once(':') {
        Some(("HEARTBEAT", id)) if !id.is_empty() => Ok(NodeId::new(id)),
        _ => Err(ParkClusterError::protocol(format!(
            "malformed heartbeat message: {:?}",
            body
        ))),
    }
}

/// `NODE_LIST_UPDATE:<csv of activeNodes>`.
pub fn format_node_list_update(nodes: &[NodeId]) -> String {
    let csv = nodes
        .iter()
        .map(|n| n.as_str())
        .collect::<Vec<_>>()
        .join(",");
    format!("NODE_LIST_UPDATE:{}", csv)
}

pub fn parse_node_list_update(
    body: &str,
) -> Result<Vec<NodeId>, ParkClusterError> {
    match body.split_once(':') {
        Some(("NODE_LIST_UPDATE", csv)) => Ok(csv
            .split(',')
            .filter(|s| !s.is_empty())
            .map(NodeId::new)
            .collect()),
        _ => Err(ParkClusterError::protocol(format!(
            "malformed node list update: {:?}",
            body
        ))),
    }
}

/// Bare registration message: just the sender's ID.
pub fn format_registration(id: &NodeId) -> String {
    id.to_string()
}

pub fn parse_registration(body: &str) -> Result<NodeId, ParkClusterError> {
    if body.is_empty() {
        return Err(ParkClusterError::protocol(
            "empty registration message",
        ));
    }
    Ok(NodeId::new(body))
}

/// `<zone>:<requestedSpace>`, used both for the client-facing request body
/// and (unchanged) the task broadcast.
pub fn format_task(zone: &str, requested_space: &str) -> String {
    format!("{}:{}", zone, requested_space)
}

pub fn parse_task(
    body: &str,
) -> Result<(String, String), ParkClusterError> {
    match body.split_once(':') {
        Some((zone, space)) if !zone.is_empty() && !space.is_empty() => {
            Ok((zone.to_string(), space.to_string()))
        }
        _ => Err(ParkClusterError::protocol(format!(
            "malformed task payload: {:?}",
            body
        ))),
    }
}

fn parse_score(raw: &str) -> Result<Score, ParkClusterError> {
    if raw == "BUSY" {
        Ok(Score::Busy)
    } else {
        raw.parse::<u32>().map(Score::Citations).map_err(|_| {
            ParkClusterError::protocol(format!(
                "unparseable score: {:?}",
                raw
            ))
        })
    }
}

fn parse_entry(raw: &str) -> Result<Entry, ParkClusterError> {
    match raw.split_once(';') {
        Some((tag, score)) if !tag.is_empty() => {
            Ok(Entry::new(tag, parse_score(score)?))
        }
        _ => Err(ParkClusterError::protocol(format!(
            "malformed proposal entry: {:?}",
            raw
        ))),
    }
}

fn format_entries(entries: &[Entry]) -> String {
    entries
        .iter()
        .map(Entry::wire)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_entries(csv: &str) -> Result<Proposal, ParkClusterError> {
    if csv.is_empty() {
        return Ok(Vec::new());
    }
    csv.split(',').map(parse_entry).collect()
}

/// `<senderNodeId>:<comma-separated proposal entries>`.
pub fn format_proposal(sender: &NodeId, proposal: &[Entry]) -> String {
    format!("{}:{}", sender, format_entries(proposal))
}

pub fn parse_proposal(
    body: &str,
) -> Result<(NodeId, Proposal), ParkClusterError> {
    match body.split_once(':') {
        Some((sender, csv)) if !sender.is_empty() => {
            Ok((NodeId::new(sender), parse_entries(csv)?))
        }
        _ => Err(ParkClusterError::protocol(format!(
            "malformed proposal message: {:?}",
            body
        ))),
    }
}

/// `<entry>(,<entry>)*`, possibly empty — the reply payload sent back to
/// the original caller.
pub fn format_reply(outcome: &[Entry]) -> String {
    format_entries(outcome)
}

pub fn parse_reply(body: &str) -> Result<Vec<Entry>, ParkClusterError> {
    parse_entries(body)
}

/// Free-form final-decision broadcast: `<correlationId>:<csv>`. Structured
/// enough to associate with its originating request while staying
/// plain text on the wire.
pub fn format_final_decision(correlation_id: &str, outcome: &[Entry]) -> String {
    format!("{}:{}", correlation_id, format_entries(outcome))
}
