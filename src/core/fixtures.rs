//! Shared test fixtures: the five-node model graph and its YAML forms.
//!
//! Results of the model graph:
//! `k = (a + h - d) * (a + h)^f`, `m = log(a + h, b)`.

use super::config::LoaderConfig;
use super::function::Function;
use super::graph::Graph;
use super::nodes::{NodeRegistry, NodeSpec};
use super::registry::{Entry, Registry};
use super::types::{GroupedEdge, NodeGroup, Output};
use indexmap::IndexMap;
use std::sync::Arc;

pub(crate) fn builtin(path: &str) -> Arc<Function> {
    match Registry::with_builtins().get(path) {
        Some(Entry::Function(f)) => Arc::clone(f),
        other => panic!("no builtin function '{}': {:?}", path, other),
    }
}

pub(crate) fn model_nodes() -> NodeRegistry {
    let add = Function::inline("add", "lambda a, h: a + h").unwrap();
    [
        NodeSpec::new("add", Arc::new(add), Output::Single("c".into())),
        NodeSpec::new("subtract", builtin("operator.sub"), Output::Single("e".into()))
            .with_inputs(&["c", "d"]),
        NodeSpec::new("power", builtin("math.pow"), Output::Single("g".into()))
            .with_inputs(&["c", "f"]),
        NodeSpec::new("log", builtin("math.log"), Output::Single("m".into()))
            .with_inputs(&["c", "b"]),
        NodeSpec::new("multiply", builtin("operator.mul"), Output::Single("k".into()))
            .with_inputs(&["e", "g"])
            .with_unit("k", "m^2"),
    ]
    .into_iter()
    .map(|n| (n.name.clone(), n))
    .collect()
}

pub(crate) fn model_edges() -> Vec<GroupedEdge> {
    let names = |v: &[&str]| NodeGroup::Multiple(v.iter().map(|s| s.to_string()).collect());
    vec![
        GroupedEdge::new(
            NodeGroup::Single("add".into()),
            names(&["subtract", "power", "log"]),
        ),
        GroupedEdge::new(names(&["subtract", "power"]), NodeGroup::Single("multiply".into())),
    ]
}

pub(crate) fn model_graph() -> Graph {
    Graph::assemble(
        "test_graph",
        model_nodes(),
        model_edges(),
        Some("mrfmsim".into()),
        IndexMap::new(),
        &LoaderConfig::default(),
    )
    .unwrap()
}

pub(crate) const GRAPH_YAML: &str = "\
!Graph:test_graph
grouped_edges:
- [add, [subtract, power, log]]
- [[subtract, power], multiply]
node_objects: !nodes
  add:
    func: !func:add 'lambda a, h: a + h'
    output: c
  subtract:
    func: !import 'operator.sub'
    inputs: [c, d]
    output: e
  power:
    func: !import 'math.pow'
    inputs: [c, f]
    output: g
  log:
    func: !import 'math.log'
    inputs: [c, b]
    output: m
  multiply:
    func: !import 'operator.mul'
    inputs: [e, g]
    output: k
    output_unit: m^2
graph_type: mrfmsim
";

pub(crate) const EXPERIMENT_PLAIN_YAML: &str = "\
!Experiment:test_experiment_plain
graph: !Graph:test_graph
  grouped_edges:
  - [add, [subtract, power, log]]
  - [[subtract, power], multiply]
  node_objects: !nodes
    add:
      func: !func:add 'lambda a, h: a + h'
      output: c
    subtract:
      func: !import 'operator.sub'
      inputs: [c, d]
      output: e
    power:
      func: !import 'math.pow'
      inputs: [c, f]
      output: g
    log:
      func: !import 'math.log'
      inputs: [c, b]
      output: m
    multiply:
      func: !import 'operator.mul'
      inputs: [e, g]
      output: k
      output_unit: m^2
  graph_type: mrfmsim
param_defaults:
  h: 2
";

pub(crate) const EXPERIMENT_MOD_YAML: &str = "\
!Experiment:test_experiment
graph: !Graph:test_graph
  grouped_edges:
  - [add, [subtract, power, log]]
  - [[subtract, power], multiply]
  node_objects: !nodes
    add:
      func: !func:add 'lambda a, h: a + h'
      output: c
    subtract:
      func: !import 'operator.sub'
      inputs: [c, d]
      output: e
    power:
      func: !import 'math.pow'
      inputs: [c, f]
      output: g
    log:
      func: !import 'math.log'
      inputs: [c, b]
      output: m
    multiply:
      func: !import 'operator.mul'
      inputs: [e, g]
      output: k
      output_unit: m^2
  graph_type: mrfmsim
components:
  replace_obj: [[a, a1], [b, b1]]
modifiers: [!import:modifier.loop_input {parameter: d}]
doc: Test experiment with components.
param_defaults:
  h: 2
";

pub(crate) const GROUP_YAML: &str = "\
!ExperimentGroup:test_group
doc: Test group object.
node_objects: !nodes
  add:
    func: !func:add 'lambda a, h: a + h'
    output: c
  subtract:
    func: !import 'operator.sub'
    output: e
    inputs: [c, d]
  power:
    func: !import 'math.pow'
    output: g
    inputs: [c, f]
  multiply:
    func: !import 'operator.mul'
    output: k
    inputs: [e, g]
    output_unit: m^2
  log:
    func: !import 'math.log'
    output: m
    inputs: [c, b]
experiment_recipes:
  test1:
    grouped_edges:
    - [add, [subtract, power, log]]
    - [[subtract, power], multiply]
    returns: [k]
  test2:
    grouped_edges:
    - [add, [subtract, power, log]]
    doc: Shortened graph.
    returns: [c, m]
experiment_defaults:
  components:
    replace_obj: [[a, a1], [b, b1]]
  doc: Global docstring.
  param_defaults:
    h: 2
";
