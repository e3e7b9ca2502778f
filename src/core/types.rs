//! EG-001: Shared document types.
//!
//! Node groups, grouped edges, expanded edges, node outputs and unit
//! annotations. The serde forms here are the exact YAML shapes accepted
//! inside `!Graph:` and `!Nodes` documents.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Edges
// ============================================================================

/// One side of a grouped edge: a single node name or a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeGroup {
    Single(String),
    Multiple(Vec<String>),
}

impl NodeGroup {
    /// Expand to a list of node names.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Multiple(v) => v.clone(),
        }
    }

    /// Build the most compact group for a list of names.
    pub fn from_names(mut names: Vec<String>) -> Self {
        if names.len() == 1 {
            Self::Single(names.remove(0))
        } else {
            Self::Multiple(names)
        }
    }
}

/// Grouped edge entry: `[sources, targets]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedEdge(pub NodeGroup, pub NodeGroup);

impl GroupedEdge {
    pub fn new(sources: NodeGroup, targets: NodeGroup) -> Self {
        Self(sources, targets)
    }

    pub fn sources(&self) -> &NodeGroup {
        &self.0
    }

    pub fn targets(&self) -> &NodeGroup {
        &self.1
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

// ============================================================================
// Node outputs
// ============================================================================

/// Node output: one name or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Output {
    Single(String),
    Multiple(Vec<String>),
}

impl Output {
    /// Output names in declaration order.
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Multiple(v) => v.clone(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::Single(s) => s == name,
            Self::Multiple(v) => v.iter().any(|o| o == name),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(s) => write!(f, "{}", s),
            Self::Multiple(v) => write!(f, "({})", v.join(", ")),
        }
    }
}

/// `output_unit` field: a bare unit for single-output nodes, or a
/// per-output mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitSpec {
    Single(String),
    PerOutput(IndexMap<String, String>),
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a short display string.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        serde_yaml_ng::Value::Sequence(items) => format!(
            "[{}]",
            items
                .iter()
                .map(yaml_value_to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        serde_yaml_ng::Value::Mapping(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", yaml_value_to_string(k), yaml_value_to_string(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        serde_yaml_ng::Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let value = yaml_value_to_string(&tagged.value);
            let tag = tag.trim_start_matches('!');
            if value.is_empty() {
                format!("!{}", tag)
            } else {
                format!("!{} {}", tag, value)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eg001_grouped_edge_parse() {
        let yaml = r#"
- [add, [subtract, power, log]]
- [[subtract, power], multiply]
"#;
        let edges: Vec<GroupedEdge> = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].sources().to_vec(), vec!["add"]);
        assert_eq!(edges[0].targets().to_vec(), vec!["subtract", "power", "log"]);
        assert_eq!(edges[1].sources().to_vec(), vec!["subtract", "power"]);
        assert_eq!(edges[1].targets().to_vec(), vec!["multiply"]);
    }

    #[test]
    fn test_eg001_grouped_edge_wrong_arity() {
        let result: Result<Vec<GroupedEdge>, _> = serde_yaml_ng::from_str("- [a, b, c]");
        assert!(result.is_err());
    }

    #[test]
    fn test_eg001_node_group_from_names() {
        assert_eq!(
            NodeGroup::from_names(vec!["a".into()]),
            NodeGroup::Single("a".into())
        );
        assert_eq!(
            NodeGroup::from_names(vec!["a".into(), "b".into()]),
            NodeGroup::Multiple(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_eg001_value_to_string() {
        let value: serde_yaml_ng::Value =
            serde_yaml_ng::from_str("{a: 1, b: [x, true], c: !import 'math.pi'}").unwrap();
        assert_eq!(
            yaml_value_to_string(&value),
            "{a: 1, b: [x, true], c: !import math.pi}"
        );
        let value: serde_yaml_ng::Value = serde_yaml_ng::from_str("!import:f {k: 2}").unwrap();
        assert_eq!(yaml_value_to_string(&value), "!import:f {k: 2}");
    }

    #[test]
    fn test_eg001_output_forms() {
        let single: Output = serde_yaml_ng::from_str("c").unwrap();
        assert_eq!(single.names(), vec!["c"]);
        let multi: Output = serde_yaml_ng::from_str("[x, y]").unwrap();
        assert!(multi.contains("y"));
        assert_eq!(multi.to_string(), "(x, y)");
    }

    #[test]
    fn test_eg001_unit_spec_forms() {
        let single: UnitSpec = serde_yaml_ng::from_str("m^2").unwrap();
        assert_eq!(single, UnitSpec::Single("m^2".into()));
        let per: UnitSpec = serde_yaml_ng::from_str("{x: s, y: m}").unwrap();
        match per {
            UnitSpec::PerOutput(map) => assert_eq!(map["y"], "m"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_eg001_edge_display() {
        assert_eq!(Edge::new("add", "log").to_string(), "add -> log");
    }

    #[test]
    fn test_eg001_yaml_value_to_string() {
        assert_eq!(
            yaml_value_to_string(&serde_yaml_ng::Value::String("hello".into())),
            "hello"
        );
        assert_eq!(yaml_value_to_string(&serde_yaml_ng::Value::Bool(true)), "true");
        assert_eq!(yaml_value_to_string(&serde_yaml_ng::Value::Null), "");
        let seq: serde_yaml_ng::Value = serde_yaml_ng::from_str("[1, 2]").unwrap();
        assert_eq!(yaml_value_to_string(&seq), "[1, 2]");
    }
}
