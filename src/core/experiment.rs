//! EG-011: Experiment assembly: a graph plus execution metadata.
//!
//! Modifiers are resolved and stored in order but never executed. The
//! experiment signature is derived from the graph's free inputs:
//! component-replaced parameters collapse into the component name and
//! modifier renames apply on top (`d` -> `d_loop`).

use super::config::{LoaderConfig, MetadataPolicy};
use super::error::Error;
use super::graph::Graph;
use super::resolver::{Modifier, Reference, Resolved, Resolver};
use super::types::yaml_value_to_string;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// Component name -> `(parameter, attribute)` substitutions.
pub type Components = IndexMap<String, Vec<(String, String)>>;

/// Experiment metadata as written. Every field is optional so recipe
/// values can be layered over group defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentSpec {
    pub components: Option<Components>,
    pub modifiers: Option<Vec<Reference>>,
    pub doc: Option<String>,
    pub param_defaults: Option<IndexMap<String, Value>>,
    pub returns: Option<Vec<String>>,
    pub return_units: Option<IndexMap<String, String>>,
}

impl ExperimentSpec {
    /// Fill unset fields from `defaults`.
    pub fn or(self, defaults: &ExperimentSpec) -> ExperimentSpec {
        ExperimentSpec {
            components: self.components.or_else(|| defaults.components.clone()),
            modifiers: self.modifiers.or_else(|| defaults.modifiers.clone()),
            doc: self.doc.or_else(|| defaults.doc.clone()),
            param_defaults: self
                .param_defaults
                .or_else(|| defaults.param_defaults.clone()),
            returns: self.returns.or_else(|| defaults.returns.clone()),
            return_units: self.return_units.or_else(|| defaults.return_units.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ExperimentSpec::default()
    }
}

/// A parameter of the experiment signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Value>,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.default {
            Some(value) => write!(f, "{}={}", self.name, yaml_value_to_string(value)),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A graph with execution metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub name: String,
    pub graph: Graph,
    pub components: Components,
    pub modifiers: Vec<Modifier>,
    pub doc: Option<String>,
    pub param_defaults: IndexMap<String, Value>,
    /// Explicit result selection; `None` selects the terminal outputs.
    pub returns: Option<Vec<String>>,
    /// Explicit unit overrides on top of the node output units.
    pub return_units: IndexMap<String, String>,
}

impl Experiment {
    /// Resolve modifiers, validate metadata names against the graph and
    /// build the experiment.
    pub fn assemble(
        name: &str,
        graph: Graph,
        spec: ExperimentSpec,
        resolver: &mut Resolver<'_>,
        config: &LoaderConfig,
    ) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::config("experiment", "experiment name must not be empty"));
        }
        let context = format!("experiment '{}'", name);

        let mut modifiers = Vec::new();
        for reference in spec.modifiers.unwrap_or_default() {
            let resolved = resolver.resolve(&reference)?;
            match resolved.as_ref() {
                Resolved::Modifier(modifier) => modifiers.push(modifier.clone()),
                _ => {
                    return Err(Error::config(
                        &context,
                        format!("'{}' does not resolve to a modifier", reference.path),
                    ))
                }
            }
        }

        let experiment = Self {
            name: name.to_string(),
            graph,
            components: spec.components.unwrap_or_default(),
            modifiers,
            doc: spec.doc,
            param_defaults: spec.param_defaults.unwrap_or_default(),
            returns: spec.returns,
            return_units: spec.return_units.unwrap_or_default(),
        };

        for problem in experiment.metadata_problems() {
            match config.metadata {
                MetadataPolicy::Strict => return Err(problem),
                MetadataPolicy::Warn => {
                    warn!(experiment = %experiment.name, "{}", problem);
                }
            }
        }

        debug!(
            experiment = %experiment.name,
            graph = %experiment.graph.name,
            modifiers = experiment.modifiers.len(),
            "assembled experiment"
        );
        Ok(experiment)
    }

    /// Metadata names that do not match the graph surface.
    fn metadata_problems(&self) -> Vec<Error> {
        let mut problems = Vec::new();
        let free: HashSet<String> = self.graph.free_inputs().into_iter().collect();
        let unknown_param = |field: &'static str, parameter: &str| Error::UnknownParameter {
            experiment: self.name.clone(),
            field,
            parameter: parameter.to_string(),
        };
        let unknown_output = |field: &'static str, output: &str| Error::UnknownOutput {
            experiment: self.name.clone(),
            field,
            output: output.to_string(),
        };

        for (parameter, _) in self.components.values().flatten() {
            if !free.contains(parameter) {
                problems.push(unknown_param("components", parameter));
            }
        }
        for parameter in self.param_defaults.keys() {
            if !free.contains(parameter) {
                problems.push(unknown_param("param_defaults", parameter));
            }
        }

        let mut names: HashSet<String> = self.base_parameters().into_iter().map(|(n, _)| n).collect();
        for modifier in &self.modifiers {
            for (from, to) in &modifier.renames {
                if names.remove(from) {
                    names.insert(to.clone());
                } else {
                    problems.push(unknown_param("modifiers", from));
                }
            }
        }

        let outputs: HashSet<String> = self.graph.outputs().into_iter().collect();
        if let Some(returns) = &self.returns {
            for output in returns {
                if !outputs.contains(output) {
                    problems.push(unknown_output("returns", output));
                }
            }
        }
        let selected = self.outputs();
        for output in self.return_units.keys() {
            if !selected.contains(output) {
                problems.push(unknown_output("return_units", output));
            }
        }

        problems
    }

    /// `(signature name, original parameter)` pairs before modifier renames.
    fn base_parameters(&self) -> Vec<(String, String)> {
        let replaced: HashSet<&str> = self
            .components
            .values()
            .flatten()
            .map(|(p, _)| p.as_str())
            .collect();
        let mut params: Vec<(String, String)> = self
            .graph
            .free_inputs()
            .into_iter()
            .filter(|p| !replaced.contains(p.as_str()))
            .map(|p| (p.clone(), p))
            .collect();
        for component in self.components.keys() {
            if !params.iter().any(|(n, _)| n == component) {
                params.push((component.clone(), component.clone()));
            }
        }
        params
    }

    /// Signature parameters: required ones first, then defaulted ones,
    /// each group sorted by name.
    pub fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.base_parameters();
        for modifier in &self.modifiers {
            for (from, to) in &modifier.renames {
                for (name, _) in params.iter_mut().filter(|(n, _)| n == from) {
                    name.clone_from(to);
                }
            }
        }

        let mut params: Vec<Parameter> = params
            .into_iter()
            .map(|(name, origin)| Parameter {
                default: self.param_defaults.get(&origin).cloned(),
                name,
            })
            .collect();
        params.sort_by(|a, b| {
            (a.default.is_some(), &a.name).cmp(&(b.default.is_some(), &b.name))
        });
        params
    }

    /// `(d_loop, f, replace_obj, h=2)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.parameters().iter().map(|p| p.to_string()).collect();
        format!("({})", params.join(", "))
    }

    /// Selected outputs: explicit `returns`, else the graph's terminal outputs.
    pub fn outputs(&self) -> Vec<String> {
        match &self.returns {
            Some(returns) => returns.clone(),
            None => self.graph.terminal_outputs(),
        }
    }

    /// Units of the selected outputs: node units overridden by
    /// `return_units`.
    pub fn units(&self) -> IndexMap<String, String> {
        let node_units = self.graph.output_units();
        let mut units = IndexMap::new();
        for output in self.outputs() {
            let unit = self
                .return_units
                .get(&output)
                .or_else(|| node_units.get(&output));
            if let Some(unit) = unit {
                units.insert(output, unit.clone());
            }
        }
        units
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.name, self.signature())?;
        writeln!(f, "returns: ({})", self.outputs().join(", "))?;
        let units: Vec<String> = self
            .units()
            .iter()
            .map(|(k, v)| format!("'{}': '{}'", k, v))
            .collect();
        writeln!(f, "return_units: {{{}}}", units.join(", "))?;
        writeln!(f, "graph: {}", self.graph.name)?;
        if let Some(handler) = &self.graph.graph_type {
            writeln!(f, "handler: {}", handler)?;
        }
        if self.modifiers.is_empty() {
            writeln!(f, "modifiers: []")?;
        } else {
            writeln!(f, "modifiers:")?;
            for modifier in &self.modifiers {
                writeln!(f, "- {}", modifier)?;
            }
        }
        if let Some(doc) = &self.doc {
            writeln!(f, "{}", doc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;
    use crate::core::registry::{Kwargs, Registry};

    fn loop_d() -> Reference {
        Reference::with_args(
            "modifier.loop_input",
            Kwargs::from([("parameter".to_string(), Value::from("d"))]),
        )
    }

    fn component_spec() -> ExperimentSpec {
        ExperimentSpec {
            components: Some(Components::from([(
                "replace_obj".to_string(),
                vec![("a".into(), "a1".into()), ("b".into(), "b1".into())],
            )])),
            modifiers: Some(vec![loop_d()]),
            doc: Some("Test experiment with components.".into()),
            param_defaults: Some(IndexMap::from([("h".to_string(), Value::from(2))])),
            ..Default::default()
        }
    }

    #[test]
    fn test_eg011_plain_signature() {
        let registry = Registry::with_builtins();
        let mut resolver = Resolver::new(&registry);
        let spec = ExperimentSpec {
            param_defaults: Some(IndexMap::from([("h".to_string(), Value::from(2))])),
            ..Default::default()
        };
        let expt = Experiment::assemble(
            "test_experiment_plain",
            fixtures::model_graph(),
            spec,
            &mut resolver,
            &LoaderConfig::default(),
        )
        .unwrap();
        assert_eq!(expt.signature(), "(a, b, d, f, h=2)");
        assert_eq!(expt.outputs(), vec!["k", "m"]);
    }

    #[test]
    fn test_eg011_components_and_modifiers() {
        let registry = Registry::with_builtins();
        let mut resolver = Resolver::new(&registry);
        let expt = Experiment::assemble(
            "test_experiment",
            fixtures::model_graph(),
            component_spec(),
            &mut resolver,
            &LoaderConfig::default(),
        )
        .unwrap();
        assert_eq!(expt.signature(), "(d_loop, f, replace_obj, h=2)");
        assert_eq!(expt.units(), IndexMap::from([("k".to_string(), "m^2".to_string())]));
        assert_eq!(expt.modifiers.len(), 1);
        assert_eq!(expt.modifiers[0].to_string(), "loop_input(parameter=d)");
    }

    #[test]
    fn test_eg011_summary() {
        let registry = Registry::with_builtins();
        let mut resolver = Resolver::new(&registry);
        let expt = Experiment::assemble(
            "test_experiment",
            fixtures::model_graph(),
            component_spec(),
            &mut resolver,
            &LoaderConfig::default(),
        )
        .unwrap();
        let expected = "\
test_experiment(d_loop, f, replace_obj, h=2)
returns: (k, m)
return_units: {'k': 'm^2'}
graph: test_graph
handler: mrfmsim
modifiers:
- loop_input(parameter=d)
Test experiment with components.
";
        assert_eq!(expt.to_string(), expected);
    }

    #[test]
    fn test_eg011_unknown_default_strict_and_lenient() {
        let registry = Registry::with_builtins();
        let spec = ExperimentSpec {
            param_defaults: Some(IndexMap::from([("zeta".to_string(), Value::from(1))])),
            ..Default::default()
        };

        let mut resolver = Resolver::new(&registry);
        let err = Experiment::assemble(
            "e",
            fixtures::model_graph(),
            spec.clone(),
            &mut resolver,
            &LoaderConfig::default(),
        )
        .unwrap_err();
        match err {
            Error::UnknownParameter { experiment, field, parameter } => {
                assert_eq!(experiment, "e");
                assert_eq!(field, "param_defaults");
                assert_eq!(parameter, "zeta");
            }
            other => panic!("unexpected {:?}", other),
        }

        let lenient = LoaderConfig {
            metadata: MetadataPolicy::Warn,
            ..Default::default()
        };
        let mut resolver = Resolver::new(&registry);
        let expt = Experiment::assemble("e", fixtures::model_graph(), spec, &mut resolver, &lenient)
            .unwrap();
        assert_eq!(expt.param_defaults["zeta"], Value::from(1));
    }

    #[test]
    fn test_eg011_unknown_outputs() {
        let registry = Registry::with_builtins();
        let mut resolver = Resolver::new(&registry);
        let spec = ExperimentSpec {
            returns: Some(vec!["k".into(), "nope".into()]),
            ..Default::default()
        };
        let err = Experiment::assemble(
            "e",
            fixtures::model_graph(),
            spec,
            &mut resolver,
            &LoaderConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownOutput { field: "returns", .. }));

        let spec = ExperimentSpec {
            returns: Some(vec!["k".into()]),
            return_units: Some(IndexMap::from([("m".to_string(), "1".to_string())])),
            ..Default::default()
        };
        let err = Experiment::assemble(
            "e",
            fixtures::model_graph(),
            spec,
            &mut resolver,
            &LoaderConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownOutput { field: "return_units", .. }));
    }

    #[test]
    fn test_eg011_explicit_returns_and_unit_override() {
        let registry = Registry::with_builtins();
        let mut resolver = Resolver::new(&registry);
        let spec = ExperimentSpec {
            returns: Some(vec!["c".into(), "k".into()]),
            return_units: Some(IndexMap::from([("c".to_string(), "m".to_string())])),
            ..Default::default()
        };
        let expt = Experiment::assemble(
            "e",
            fixtures::model_graph(),
            spec,
            &mut resolver,
            &LoaderConfig::default(),
        )
        .unwrap();
        assert_eq!(expt.outputs(), vec!["c", "k"]);
        let units = expt.units();
        assert_eq!(units["c"], "m");
        assert_eq!(units["k"], "m^2");
    }

    #[test]
    fn test_eg011_modifier_on_unknown_parameter() {
        let registry = Registry::with_builtins();
        let mut resolver = Resolver::new(&registry);
        let spec = ExperimentSpec {
            modifiers: Some(vec![Reference::with_args(
                "modifier.loop_input",
                Kwargs::from([("parameter".to_string(), Value::from("zz"))]),
            )]),
            ..Default::default()
        };
        let err = Experiment::assemble(
            "e",
            fixtures::model_graph(),
            spec,
            &mut resolver,
            &LoaderConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownParameter { field: "modifiers", .. }));
    }

    #[test]
    fn test_eg011_non_modifier_rejected() {
        let registry = Registry::with_builtins();
        let mut resolver = Resolver::new(&registry);
        let spec = ExperimentSpec {
            modifiers: Some(vec![Reference::new("math.pow")]),
            ..Default::default()
        };
        let err = Experiment::assemble(
            "e",
            fixtures::model_graph(),
            spec,
            &mut resolver,
            &LoaderConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not resolve to a modifier"));
    }

    #[test]
    fn test_eg011_spec_layering() {
        let defaults = component_spec();
        let recipe = ExperimentSpec {
            doc: Some("Shortened graph.".into()),
            returns: Some(vec!["c".into()]),
            ..Default::default()
        };
        let merged = recipe.or(&defaults);
        assert_eq!(merged.doc.as_deref(), Some("Shortened graph."));
        assert_eq!(merged.returns, Some(vec!["c".to_string()]));
        assert_eq!(merged.components, defaults.components);
        assert!(ExperimentSpec::default().is_empty());
        assert!(!merged.is_empty());
    }
}
