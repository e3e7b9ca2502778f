//! EG-014: YAML dumping.
//!
//! The inverse of the loader: functions dump as `!import` references or
//! `!func:` lambdas, and graphs, experiments and groups dump under their
//! tags. Loading a dump yields an object equal to the one dumped. Only
//! fields that differ from their defaults are written.

use super::error::Error;
use super::experiment::{Experiment, ExperimentSpec};
use super::function::{Function, FunctionSource};
use super::graph::Graph;
use super::group::{ExperimentGroup, Member, Recipe};
use super::loader::{Document, Tag};
use super::nodes::{NodeRegistry, NodeSpec};
use super::resolver::{Reference, Resolved};
use super::types::Output;
use serde::Serialize;
use serde_yaml_ng::value::{Tag as YamlTag, TaggedValue};
use serde_yaml_ng::{Mapping, Value};
use std::path::Path;

/// Dump a document to YAML text.
pub fn dump(doc: &Document) -> Result<String, Error> {
    Ok(serde_yaml_ng::to_string(&document_value(doc)?)?)
}

/// Dump a document to disk (temp file + rename).
pub fn dump_file(doc: &Document, path: &Path) -> Result<(), Error> {
    let text = dump(doc)?;
    let tmp = path.with_extension("yaml.tmp");
    let io = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(&tmp, text).map_err(io)?;
    std::fs::rename(&tmp, path).map_err(io)?;
    Ok(())
}

pub fn document_value(doc: &Document) -> Result<Value, Error> {
    match doc {
        Document::Experiment(e) => experiment_value(e),
        Document::Graph(g) => graph_value(g),
        Document::Group(g) => group_value(g),
        Document::Nodes(nodes) => nodes_value(nodes),
        Document::Function(f) => Ok(function_value(f)),
        Document::Object(o) => resolved_value(o),
        Document::Data(v) => Ok(v.clone()),
    }
}

fn tagged(tag: Tag, value: Value) -> Value {
    Value::Tagged(Box::new(TaggedValue {
        tag: YamlTag::new(tag.to_string()),
        value,
    }))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, Error> {
    Ok(serde_yaml_ng::to_value(value)?)
}

pub fn function_value(func: &Function) -> Value {
    match func.source() {
        FunctionSource::Import(path) => tagged(Tag::Import, Value::from(path.as_str())),
        FunctionSource::Inline(expr) => {
            tagged(Tag::Func(func.name().to_string()), Value::from(expr.as_str()))
        }
    }
}

pub fn reference_value(reference: &Reference) -> Result<Value, Error> {
    Ok(match &reference.args {
        None => tagged(Tag::Import, Value::from(reference.path.as_str())),
        Some(args) => tagged(Tag::ImportCall(reference.path.clone()), to_value(args)?),
    })
}

/// Resolved objects dump as the reference that produced them.
pub fn resolved_value(resolved: &Resolved) -> Result<Value, Error> {
    match resolved {
        Resolved::Function(f) => Ok(function_value(f)),
        Resolved::Modifier(m) => reference_value(&m.reference),
        Resolved::Factory(reference) => reference_value(reference),
        Resolved::Value { reference, .. } => reference_value(reference),
    }
}

fn node_value(node: &NodeSpec) -> Result<Value, Error> {
    let mut map = Mapping::new();
    map.insert("func".into(), function_value(&node.func));
    if !node.inputs_are_default() {
        map.insert("inputs".into(), to_value(&node.inputs)?);
    }
    map.insert("output".into(), to_value(&node.output)?);
    if !node.units.is_empty() {
        let unit = match (&node.output, node.units.len()) {
            (Output::Single(name), 1) => match node.units.get(name) {
                Some(unit) => Value::from(unit.as_str()),
                None => to_value(&node.units)?,
            },
            _ => to_value(&node.units)?,
        };
        map.insert("output_unit".into(), unit);
    }
    if let Some(doc) = &node.doc {
        map.insert("doc".into(), Value::from(doc.as_str()));
    }
    Ok(Value::Mapping(map))
}

fn node_map(nodes: &NodeRegistry) -> Result<Value, Error> {
    let mut map = Mapping::new();
    for (name, node) in nodes {
        map.insert(name.as_str().into(), node_value(node)?);
    }
    Ok(Value::Mapping(map))
}

pub fn nodes_value(nodes: &NodeRegistry) -> Result<Value, Error> {
    Ok(tagged(Tag::Nodes, node_map(nodes)?))
}

fn graph_body(graph: &Graph) -> Result<Mapping, Error> {
    let mut map = Mapping::new();
    map.insert("grouped_edges".into(), to_value(&graph.grouped_edges)?);
    map.insert("node_objects".into(), nodes_value(&graph.nodes)?);
    if let Some(graph_type) = &graph.graph_type {
        map.insert("graph_type".into(), Value::from(graph_type.as_str()));
    }
    for (key, value) in &graph.attrs {
        map.insert(key.as_str().into(), value.clone());
    }
    Ok(map)
}

pub fn graph_value(graph: &Graph) -> Result<Value, Error> {
    Ok(tagged(
        Tag::Graph(graph.name.clone()),
        Value::Mapping(graph_body(graph)?),
    ))
}

fn spec_into(map: &mut Mapping, spec: &ExperimentSpec) -> Result<(), Error> {
    if let Some(components) = &spec.components {
        map.insert("components".into(), to_value(components)?);
    }
    if let Some(modifiers) = &spec.modifiers {
        let items = modifiers
            .iter()
            .map(reference_value)
            .collect::<Result<Vec<_>, _>>()?;
        map.insert("modifiers".into(), Value::Sequence(items));
    }
    if let Some(doc) = &spec.doc {
        map.insert("doc".into(), Value::from(doc.as_str()));
    }
    if let Some(defaults) = &spec.param_defaults {
        map.insert("param_defaults".into(), to_value(defaults)?);
    }
    if let Some(returns) = &spec.returns {
        map.insert("returns".into(), to_value(returns)?);
    }
    if let Some(units) = &spec.return_units {
        map.insert("return_units".into(), to_value(units)?);
    }
    Ok(())
}

pub fn experiment_value(expt: &Experiment) -> Result<Value, Error> {
    let mut map = Mapping::new();
    map.insert("graph".into(), graph_value(&expt.graph)?);
    let spec = ExperimentSpec {
        components: (!expt.components.is_empty()).then(|| expt.components.clone()),
        modifiers: (!expt.modifiers.is_empty())
            .then(|| expt.modifiers.iter().map(|m| m.reference.clone()).collect()),
        doc: expt.doc.clone(),
        param_defaults: (!expt.param_defaults.is_empty()).then(|| expt.param_defaults.clone()),
        returns: expt.returns.clone(),
        return_units: (!expt.return_units.is_empty()).then(|| expt.return_units.clone()),
    };
    spec_into(&mut map, &spec)?;
    Ok(tagged(Tag::Experiment(expt.name.clone()), Value::Mapping(map)))
}

fn recipe_value(recipe: &Recipe) -> Result<Value, Error> {
    let mut map = Mapping::new();
    if let Some(grouped) = &recipe.grouped_edges {
        map.insert("grouped_edges".into(), to_value(grouped)?);
    }
    if let Some(nodes) = &recipe.nodes {
        map.insert("node_objects".into(), nodes_value(nodes)?);
    }
    if let Some(graph_type) = &recipe.graph_type {
        map.insert("graph_type".into(), Value::from(graph_type.as_str()));
    }
    spec_into(&mut map, &recipe.spec)?;
    Ok(Value::Mapping(map))
}

pub fn group_value(group: &ExperimentGroup) -> Result<Value, Error> {
    let mut map = Mapping::new();
    if let Some(doc) = &group.doc {
        map.insert("doc".into(), Value::from(doc.as_str()));
    }
    if !group.nodes.is_empty() {
        map.insert("node_objects".into(), nodes_value(&group.nodes)?);
    }
    if !group.recipes.is_empty() {
        let mut recipes = Mapping::new();
        for (name, recipe) in &group.recipes {
            recipes.insert(name.as_str().into(), recipe_value(recipe)?);
        }
        map.insert("experiment_recipes".into(), Value::Mapping(recipes));
    }
    if !group.defaults.is_empty() {
        map.insert("experiment_defaults".into(), recipe_value(&group.defaults)?);
    }
    let extra = group
        .extra_members()
        .map(|member| match member {
            Member::Experiment(e) => experiment_value(e),
            Member::Graph(g) => graph_value(g),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if !extra.is_empty() {
        map.insert("experiments".into(), Value::Sequence(extra));
    }
    Ok(tagged(
        Tag::ExperimentGroup(group.name.clone()),
        Value::Mapping(map),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;
    use crate::core::loader::load;
    use crate::core::registry::Registry;
    use pretty_assertions::assert_eq;

    fn reload(doc: &Document) -> Document {
        let text = dump(doc).unwrap();
        load(&text, &Registry::with_builtins()).unwrap()
    }

    #[test]
    fn test_eg014_function_forms() {
        let pow = fixtures::builtin("math.pow");
        assert_eq!(
            serde_yaml_ng::to_string(&function_value(&pow)).unwrap(),
            "!import math.pow\n"
        );
        let add = Function::inline("add", "lambda a, h: a + h").unwrap();
        let text = serde_yaml_ng::to_string(&function_value(&add)).unwrap();
        assert!(text.starts_with("!func:add "));
        assert!(text.contains("lambda a, h: a + h"));
    }

    #[test]
    fn test_eg014_graph_round_trip() {
        let graph = fixtures::model_graph();
        let doc = Document::Graph(graph.clone());
        let text = dump(&doc).unwrap();
        assert!(text.starts_with("!Graph:test_graph\n"));
        assert!(text.contains("graph_type: mrfmsim"));
        assert!(text.contains("output_unit: m^2"));
        assert_eq!(reload(&doc), Document::Graph(graph));
    }

    #[test]
    fn test_eg014_default_inputs_omitted() {
        let graph = fixtures::model_graph();
        let Value::Tagged(tagged) = graph_value(&graph).unwrap() else {
            panic!()
        };
        let nodes = match tagged.value.get("node_objects") {
            Some(Value::Tagged(t)) => t.value.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert!(nodes["add"].get("inputs").is_none());
        assert!(nodes["subtract"].get("inputs").is_some());
    }

    #[test]
    fn test_eg014_experiment_round_trip() {
        let registry = Registry::with_builtins();
        let doc = load(fixtures::EXPERIMENT_MOD_YAML, &registry).unwrap();
        let text = dump(&doc).unwrap();
        assert!(text.starts_with("!Experiment:test_experiment\n"));
        assert!(text.contains("!import:modifier.loop_input"));
        assert!(text.contains("doc: Test experiment with components."));

        let again = load(&text, &registry).unwrap();
        assert_eq!(again, doc);
        let Document::Experiment(expt) = again else { panic!() };
        assert_eq!(expt.signature(), "(d_loop, f, replace_obj, h=2)");
    }

    #[test]
    fn test_eg014_group_round_trip() {
        let registry = Registry::with_builtins();
        let doc = load(fixtures::GROUP_YAML, &registry).unwrap();
        let text = dump(&doc).unwrap();
        assert!(text.contains("experiment_recipes:"));
        assert!(text.contains("experiment_defaults:"));
        assert!(!text.contains("experiments:"));
        assert_eq!(load(&text, &registry).unwrap(), doc);
    }

    #[test]
    fn test_eg014_extra_attrs_and_members_survive() {
        let registry = Registry::with_builtins();
        let text = format!(
            "{}experiments:\n- !Graph:extra\n  grouped_edges: []\n  node_objects: {{}}\n  label: kept\n",
            fixtures::GROUP_YAML
        );
        let doc = load(&text, &registry).unwrap();
        let dumped = dump(&doc).unwrap();
        assert!(dumped.contains("label: kept"));
        assert_eq!(load(&dumped, &registry).unwrap(), doc);
    }

    #[test]
    fn test_eg014_object_and_nodes_documents() {
        let registry = Registry::with_builtins();
        let doc = load("!import:math.pow {x: 2, y: 3}\n", &registry).unwrap();
        let text = dump(&doc).unwrap();
        assert!(text.starts_with("!import:math.pow"));
        assert_eq!(load(&text, &registry).unwrap(), doc);

        let nodes = Document::Nodes(fixtures::model_nodes());
        assert!(dump(&nodes).unwrap().starts_with("!Nodes\n"));
        assert_eq!(reload(&nodes), nodes);
    }

    #[test]
    fn test_eg014_uninvoked_factory_round_trip() {
        let registry = Registry::with_builtins();
        let doc = load("!import 'modifier.loop_input'\n", &registry).unwrap();
        assert_eq!(dump(&doc).unwrap(), "!import modifier.loop_input\n");
        assert_eq!(load(&dump(&doc).unwrap(), &registry).unwrap(), doc);
    }

    #[test]
    fn test_eg014_dump_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.yaml");
        let doc = Document::Graph(fixtures::model_graph());
        dump_file(&doc, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, dump(&doc).unwrap());
        assert!(!path.with_extension("yaml.tmp").exists());
    }
}
