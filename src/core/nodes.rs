//! EG-009: Node registry construction and validation.
//!
//! A node binds one function to named inputs and one or more outputs.
//! Output names are unique across a registry, and so are the names of
//! inline `!func:` functions.

use super::error::Error;
use super::function::{Function, FunctionSource};
use super::types::{Output, UnitSpec};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// A node description as written in a `!Nodes` mapping, with its
/// callable already resolved.
#[derive(Debug, Clone, Default)]
pub struct RawNode {
    pub func: Option<Arc<Function>>,
    pub expr: Option<String>,
    pub inputs: Option<Vec<String>>,
    pub output: Option<Output>,
    pub output_unit: Option<UnitSpec>,
    pub doc: Option<String>,
}

/// A validated node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub func: Arc<Function>,
    pub inputs: Vec<String>,
    pub output: Output,
    /// Output name -> unit.
    pub units: IndexMap<String, String>,
    pub doc: Option<String>,
}

/// Node name -> node, in declaration order.
pub type NodeRegistry = IndexMap<String, NodeSpec>;

impl NodeSpec {
    /// Node whose inputs are the function's parameters.
    pub fn new(name: impl Into<String>, func: Arc<Function>, output: Output) -> Self {
        Self {
            name: name.into(),
            inputs: func.params().to_vec(),
            func,
            output,
            units: IndexMap::new(),
            doc: None,
        }
    }

    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        self.inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_unit(mut self, output: &str, unit: &str) -> Self {
        self.units.insert(output.to_string(), unit.to_string());
        self
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    pub fn outputs(&self) -> Vec<String> {
        self.output.names()
    }

    /// Whether `inputs` is exactly the function's parameter list.
    pub fn inputs_are_default(&self) -> bool {
        self.inputs == self.func.params()
    }
}

/// Validate one raw node description.
pub fn build_node(name: &str, raw: RawNode) -> Result<NodeSpec, Error> {
    let context = format!("node '{}'", name);
    if name.is_empty() {
        return Err(Error::config("node registry", "node names must not be empty"));
    }

    let func = match (raw.func, raw.expr) {
        (Some(_), Some(_)) => {
            return Err(Error::config(
                context,
                "declares both 'func' and 'expr'; exactly one callable source is allowed",
            ))
        }
        (None, None) => {
            return Err(Error::config(
                context,
                "declares no callable source (expected 'func' or 'expr')",
            ))
        }
        (Some(func), None) => func,
        (None, Some(expr)) => Arc::new(Function::inline(name, &expr)?),
    };

    let inputs = match raw.inputs {
        Some(inputs) => {
            if inputs.len() != func.params().len() {
                return Err(Error::config(
                    context,
                    format!(
                        "lists {} input(s) but function '{}' takes {}",
                        inputs.len(),
                        func.name(),
                        func.params().len()
                    ),
                ));
            }
            inputs
        }
        None => func.params().to_vec(),
    };

    let output = raw
        .output
        .ok_or_else(|| Error::config(&context, "declares no output"))?;
    let names = output.names();
    if names.is_empty() || names.iter().any(String::is_empty) {
        return Err(Error::config(&context, "output names must not be empty"));
    }
    for (i, out) in names.iter().enumerate() {
        if names[..i].contains(out) {
            return Err(Error::DuplicateOutput {
                node: name.to_string(),
                output: out.clone(),
                other: name.to_string(),
            });
        }
    }

    let units = match raw.output_unit {
        None => IndexMap::new(),
        Some(UnitSpec::Single(unit)) => {
            if names.len() != 1 {
                return Err(Error::config(
                    context,
                    "has several outputs; output_unit must map output names to units",
                ));
            }
            IndexMap::from([(names[0].clone(), unit)])
        }
        Some(UnitSpec::PerOutput(map)) => {
            if let Some(unknown) = map.keys().find(|k| !names.contains(*k)) {
                return Err(Error::config(
                    context,
                    format!("output_unit names undeclared output '{}'", unknown),
                ));
            }
            map
        }
    };

    Ok(NodeSpec {
        name: name.to_string(),
        func,
        inputs,
        output,
        units,
        doc: raw.doc,
    })
}

/// Build a registry from named raw nodes and check output uniqueness.
pub fn build_registry(raw: Vec<(String, RawNode)>) -> Result<NodeRegistry, Error> {
    let mut registry = NodeRegistry::new();
    let mut inline: HashMap<String, String> = HashMap::new();
    for (name, node) in raw {
        if registry.contains_key(&name) {
            return Err(Error::config(
                "node registry",
                format!("node '{}' is declared twice", name),
            ));
        }
        let spec = build_node(&name, node)?;
        if let FunctionSource::Inline(_) = spec.func.source() {
            let func_name = spec.func.name().to_string();
            if let Some(first) = inline.get(&func_name) {
                // An alias of the same definition is the same function.
                if *registry[first].func != *spec.func {
                    return Err(Error::config(
                        "node registry",
                        format!(
                            "nodes '{}' and '{}' both define inline function '{}'",
                            first, name, func_name
                        ),
                    ));
                }
            } else {
                inline.insert(func_name, name.clone());
            }
        }
        registry.insert(name, spec);
    }
    validate_outputs(&registry)?;
    Ok(registry)
}

/// Output names must be pairwise disjoint across nodes.
pub fn validate_outputs(registry: &NodeRegistry) -> Result<(), Error> {
    let mut producers: HashMap<String, &str> = HashMap::new();
    for (name, node) in registry {
        for output in node.outputs() {
            if let Some(other) = producers.get(&output) {
                return Err(Error::DuplicateOutput {
                    node: name.clone(),
                    output,
                    other: other.to_string(),
                });
            }
            producers.insert(output, name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pow() -> Arc<Function> {
        Arc::new(Function::native("math.pow", &["x", "y"], |a| Ok(a[0].powf(a[1]))))
    }

    fn raw_expr(expr: &str, output: &str) -> RawNode {
        RawNode {
            expr: Some(expr.to_string()),
            output: Some(Output::Single(output.to_string())),
            ..Default::default()
        }
    }

    #[test]
    fn test_eg009_inputs_default_to_params() {
        let node = build_node("add", raw_expr("lambda a, h: a + h", "c")).unwrap();
        assert_eq!(node.inputs, vec!["a", "h"]);
        assert!(node.inputs_are_default());
        assert_eq!(node.func.name(), "add");
        assert_eq!(node.outputs(), vec!["c"]);
    }

    #[test]
    fn test_eg009_explicit_inputs_checked_against_arity() {
        let raw = RawNode {
            func: Some(pow()),
            inputs: Some(vec!["c".into(), "f".into()]),
            output: Some(Output::Single("g".into())),
            ..Default::default()
        };
        let node = build_node("power", raw).unwrap();
        assert_eq!(node.inputs, vec!["c", "f"]);
        assert!(!node.inputs_are_default());

        let raw = RawNode {
            func: Some(pow()),
            inputs: Some(vec!["c".into()]),
            output: Some(Output::Single("g".into())),
            ..Default::default()
        };
        let err = build_node("power", raw).unwrap_err();
        assert!(err.to_string().contains("node 'power'"));
        assert!(err.to_string().contains("takes 2"));
    }

    #[test]
    fn test_eg009_callable_source_exactly_one() {
        let both = RawNode {
            func: Some(pow()),
            expr: Some("lambda x, y: x".into()),
            output: Some(Output::Single("g".into())),
            ..Default::default()
        };
        let err = build_node("power", both).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("both"));

        let neither = RawNode {
            output: Some(Output::Single("g".into())),
            ..Default::default()
        };
        let err = build_node("power", neither).unwrap_err();
        assert!(err.to_string().contains("no callable source"));
    }

    #[test]
    fn test_eg009_missing_output() {
        let raw = RawNode {
            func: Some(pow()),
            ..Default::default()
        };
        assert!(build_node("power", raw).unwrap_err().to_string().contains("no output"));
    }

    #[test]
    fn test_eg009_units() {
        let mut raw = raw_expr("lambda e, g: e * g", "k");
        raw.output_unit = Some(UnitSpec::Single("m^2".into()));
        let node = build_node("multiply", raw).unwrap();
        assert_eq!(node.units["k"], "m^2");

        let raw = RawNode {
            expr: Some("lambda a: a".into()),
            output: Some(Output::Multiple(vec!["x".into(), "y".into()])),
            output_unit: Some(UnitSpec::Single("s".into())),
            ..Default::default()
        };
        assert!(build_node("split", raw).is_err());

        let raw = RawNode {
            expr: Some("lambda a: a".into()),
            output: Some(Output::Multiple(vec!["x".into(), "y".into()])),
            output_unit: Some(UnitSpec::PerOutput(IndexMap::from([("z".into(), "s".into())]))),
            ..Default::default()
        };
        let err = build_node("split", raw).unwrap_err();
        assert!(err.to_string().contains("'z'"));
    }

    #[test]
    fn test_eg009_duplicate_output_across_nodes() {
        let raw = vec![
            ("add".to_string(), raw_expr("lambda a, h: a + h", "c")),
            ("sub".to_string(), raw_expr("lambda a, b: a - b", "c")),
        ];
        match build_registry(raw).unwrap_err() {
            Error::DuplicateOutput { node, output, other } => {
                assert_eq!(node, "sub");
                assert_eq!(output, "c");
                assert_eq!(other, "add");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_eg009_inline_function_names_unique() {
        let inline = |body: &str, output: &str| RawNode {
            func: Some(Arc::new(Function::inline("add", body).unwrap())),
            output: Some(Output::Single(output.to_string())),
            ..Default::default()
        };
        let raw = vec![
            ("one".to_string(), inline("lambda a, h: a + h", "c")),
            ("two".to_string(), inline("lambda x, y: x * y", "z")),
        ];
        let err = build_registry(raw).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        let message = err.to_string();
        assert!(message.contains("'one'") && message.contains("'two'"));
        assert!(message.contains("'add'"));

        // An `expr` node's function is named after the node.
        let raw = vec![
            ("one".to_string(), inline("lambda a, h: a + h", "c")),
            ("add".to_string(), raw_expr("lambda x: x", "y")),
        ];
        assert!(build_registry(raw).is_err());

        // The same definition twice, as a YAML alias produces, is allowed.
        let raw = vec![
            ("one".to_string(), inline("lambda a, h: a + h", "c")),
            ("two".to_string(), inline("lambda a, h: a + h", "z")),
        ];
        assert_eq!(build_registry(raw).unwrap().len(), 2);
    }

    #[test]
    fn test_eg009_duplicate_output_within_node() {
        let raw = RawNode {
            expr: Some("lambda a: a".into()),
            output: Some(Output::Multiple(vec!["x".into(), "x".into()])),
            ..Default::default()
        };
        assert!(matches!(
            build_node("split", raw),
            Err(Error::DuplicateOutput { .. })
        ));
    }

    #[test]
    fn test_eg009_duplicate_node_name() {
        let raw = vec![
            ("add".to_string(), raw_expr("lambda a: a", "c")),
            ("add".to_string(), raw_expr("lambda a: a", "d")),
        ];
        assert!(build_registry(raw).unwrap_err().to_string().contains("declared twice"));
    }

    #[test]
    fn test_eg009_expr_syntax_error_propagates() {
        let err = build_node("bad", raw_expr("lambda a: a +", "c")).unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }
}
