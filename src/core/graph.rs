//! EG-010: Graph assembly: node registry + expanded edges + graph metadata.
//!
//! Edges are expanded from grouped notation and checked against the
//! registry. Topological order uses Kahn's algorithm with alphabetical
//! tie-breaking, so it is deterministic for any registry order.

use super::config::{CyclePolicy, LoaderConfig};
use super::edges::{expand_grouped_edges, regroup};
use super::error::Error;
use super::nodes::{validate_outputs, NodeRegistry, NodeSpec};
use super::types::{Edge, GroupedEdge};
use indexmap::{IndexMap, IndexSet};
use serde_yaml_ng::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::debug;

/// A named computation graph.
///
/// Equality compares the expanded edge list, not the grouped notation.
#[derive(Debug, Clone)]
pub struct Graph {
    pub name: String,
    pub nodes: NodeRegistry,
    /// Grouped notation as written; re-emitted on dump.
    pub grouped_edges: Vec<GroupedEdge>,
    edges: Vec<Edge>,
    /// Execution semantics selector, opaque to this crate.
    pub graph_type: Option<String>,
    /// Additional graph-level attributes, preserved verbatim.
    pub attrs: IndexMap<String, Value>,
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.nodes == other.nodes
            && self.edges == other.edges
            && self.graph_type == other.graph_type
            && self.attrs == other.attrs
    }
}

impl Graph {
    /// Assemble a graph and validate its structure.
    pub fn assemble(
        name: &str,
        nodes: NodeRegistry,
        grouped_edges: Vec<GroupedEdge>,
        graph_type: Option<String>,
        attrs: IndexMap<String, Value>,
        config: &LoaderConfig,
    ) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::config("graph", "graph name must not be empty"));
        }
        validate_outputs(&nodes)?;
        let edges = expand_grouped_edges(&grouped_edges).map_err(|e| match e {
            Error::Configuration { context, message } => Error::Configuration {
                context: format!("graph '{}' {}", name, context),
                message,
            },
            other => other,
        })?;

        for edge in &edges {
            for endpoint in [&edge.from, &edge.to] {
                if !nodes.contains_key(endpoint) {
                    return Err(Error::UnknownNode {
                        graph: name.to_string(),
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
            if edge.from == edge.to {
                return Err(Error::config(
                    format!("graph '{}'", name),
                    format!("node '{}' has an edge to itself", edge.from),
                ));
            }
        }

        let graph = Self {
            name: name.to_string(),
            nodes,
            grouped_edges,
            edges,
            graph_type,
            attrs,
        };

        if config.cycles == CyclePolicy::Reject {
            graph.topological_order()?;
        }

        debug!(
            graph = %graph.name,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "assembled graph"
        );
        Ok(graph)
    }

    /// Assemble from an explicit edge list; grouped notation is derived.
    pub fn from_edges(
        name: &str,
        nodes: impl IntoIterator<Item = NodeSpec>,
        edges: &[(&str, &str)],
        graph_type: Option<&str>,
    ) -> Result<Self, Error> {
        let nodes: NodeRegistry = nodes.into_iter().map(|n| (n.name.clone(), n)).collect();
        let edges: Vec<Edge> = edges
            .iter()
            .map(|(from, to)| Edge::new(*from, *to))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        Self::assemble(
            name,
            nodes,
            regroup(&edges),
            graph_type.map(str::to_string),
            IndexMap::new(),
            &LoaderConfig::default(),
        )
    }

    /// Expanded edges in first-seen order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    /// Names of nodes mentioned by at least one edge, in registry order.
    pub fn connected_nodes(&self) -> Vec<String> {
        let mentioned: HashSet<&str> = self
            .edges
            .iter()
            .flat_map(|e| [e.from.as_str(), e.to.as_str()])
            .collect();
        self.nodes
            .keys()
            .filter(|n| mentioned.contains(n.as_str()))
            .cloned()
            .collect()
    }

    /// All output names in registry order.
    pub fn outputs(&self) -> Vec<String> {
        self.nodes.values().flat_map(NodeSpec::outputs).collect()
    }

    /// Inputs not produced by any node, first-seen order.
    pub fn free_inputs(&self) -> Vec<String> {
        let produced: HashSet<String> = self.outputs().into_iter().collect();
        let mut free: IndexSet<String> = IndexSet::new();
        for node in self.nodes.values() {
            for input in &node.inputs {
                if !produced.contains(input) {
                    free.insert(input.clone());
                }
            }
        }
        free.into_iter().collect()
    }

    /// Outputs of nodes without outgoing edges, sorted.
    pub fn terminal_outputs(&self) -> Vec<String> {
        let sources: HashSet<&str> = self.edges.iter().map(|e| e.from.as_str()).collect();
        let mut outputs: Vec<String> = self
            .nodes
            .values()
            .filter(|n| !sources.contains(n.name.as_str()))
            .flat_map(NodeSpec::outputs)
            .collect();
        outputs.sort();
        outputs
    }

    /// Output name -> unit over all nodes.
    pub fn output_units(&self) -> IndexMap<String, String> {
        self.nodes
            .values()
            .flat_map(|n| n.units.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    /// Topological order (Kahn's algorithm, alphabetical tie-breaking).
    pub fn topological_order(&self) -> Result<Vec<String>, Error> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.keys().map(|k| (k.as_str(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

        for edge in &self.edges {
            adjacency
                .entry(edge.from.as_str())
                .or_default()
                .push(edge.to.as_str());
            if let Some(degree) = in_degree.get_mut(edge.to.as_str()) {
                *degree += 1;
            }
        }

        let mut zero_degree: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| *id)
            .collect();
        zero_degree.sort_unstable();
        let mut queue: VecDeque<&str> = zero_degree.into_iter().collect();

        let mut order = Vec::new();
        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());

            let mut next_ready: Vec<&str> = Vec::new();
            for neighbor in adjacency.get(current).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(*neighbor);
                    }
                }
            }
            next_ready.sort_unstable();
            queue.extend(next_ready);
        }

        if order.len() != self.nodes.len() {
            let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
            let members: Vec<&str> = self
                .nodes
                .keys()
                .map(String::as_str)
                .filter(|n| !ordered.contains(n))
                .collect();
            return Err(Error::Cycle {
                graph: self.name.clone(),
                members: members.join(", "),
            });
        }

        Ok(order)
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.graph_type {
            Some(graph_type) => writeln!(f, "{} ({})", self.name, graph_type)?,
            None => writeln!(f, "{}", self.name)?,
        }
        writeln!(f, "nodes:")?;
        for node in self.nodes.values() {
            writeln!(
                f,
                "- {}: {}({}) -> {}",
                node.name,
                node.func.name(),
                node.inputs.join(", "),
                node.output
            )?;
        }
        writeln!(f, "edges:")?;
        for edge in &self.edges {
            writeln!(f, "- {}", edge)?;
        }
        writeln!(f, "free inputs: {}", self.free_inputs().join(", "))?;
        writeln!(f, "terminal outputs: {}", self.terminal_outputs().join(", "))
    }
}
