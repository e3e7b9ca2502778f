//! EG-007: Grouped-edge expansion and re-grouping.
//!
//! `[add, [subtract, power]]` expands to `add -> subtract`, `add -> power`.
//! Expansion is source-major, keeps input order and drops later duplicates.

use super::error::Error;
use super::types::{Edge, GroupedEdge, NodeGroup};
use indexmap::IndexSet;

/// Expand grouped edges into a flat, deduplicated edge list.
pub fn expand_grouped_edges(grouped: &[GroupedEdge]) -> Result<Vec<Edge>, Error> {
    let mut edges: IndexSet<Edge> = IndexSet::new();

    for (i, entry) in grouped.iter().enumerate() {
        let sources = entry.sources().to_vec();
        let targets = entry.targets().to_vec();
        if sources.is_empty() || targets.is_empty() {
            return Err(Error::config(
                format!("grouped_edges[{}]", i),
                "edge groups must name at least one node",
            ));
        }
        for from in &sources {
            for to in &targets {
                edges.insert(Edge::new(from.as_str(), to.as_str()));
            }
        }
    }

    Ok(edges.into_iter().collect())
}

/// Compact an edge list by grouping consecutive edges that share a source.
///
/// `expand_grouped_edges(&regroup(edges))` returns `edges` unchanged for any
/// duplicate-free list.
pub fn regroup(edges: &[Edge]) -> Vec<GroupedEdge> {
    let mut grouped = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for edge in edges {
        match current.as_mut() {
            Some((from, targets)) if *from == edge.from => targets.push(edge.to.clone()),
            _ => {
                if let Some((from, targets)) = current.take() {
                    grouped.push(GroupedEdge::new(
                        NodeGroup::Single(from),
                        NodeGroup::from_names(targets),
                    ));
                }
                current = Some((edge.from.clone(), vec![edge.to.clone()]));
            }
        }
    }
    if let Some((from, targets)) = current {
        grouped.push(GroupedEdge::new(
            NodeGroup::Single(from),
            NodeGroup::from_names(targets),
        ));
    }

    grouped
}
