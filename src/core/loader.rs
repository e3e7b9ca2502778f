//! EG-013: Tag-driven YAML loading.
//!
//! Recognized tags:
//! - `!import 'a.b.c'`: registered object by qualified name
//! - `!import:a.b.c {k: v}`: registered factory/function called with kwargs
//! - `!func:name 'lambda x: ...'`: inline function
//! - `!Nodes` / `!nodes`: node registry
//! - `!Graph:name`, `!Experiment:name`, `!ExperimentGroup:name`
//!
//! Each load owns a fresh [`Resolver`], so references are memoized within
//! one document and never across loads. Untagged documents load as plain
//! data. YAML anchors, aliases and `<<` merge keys are expanded before
//! construction, so a graph defined once can be referenced from several
//! experiments. Tagged values nested in free-form data (`param_defaults`,
//! graph attributes, `!import:` arguments) are built too, so a bad
//! reference anywhere fails the load.

use super::config::LoaderConfig;
use super::error::Error;
use super::experiment::{Experiment, ExperimentSpec};
use super::function::Function;
use super::graph::Graph;
use super::group::{ExperimentGroup, Member, Recipe};
use super::nodes::{build_registry, NodeRegistry, RawNode};
use super::registry::{Kwargs, Registry};
use super::resolver::{Reference, Resolved, Resolver};
use super::types::GroupedEdge;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_yaml_ng::{Mapping, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A recognized document tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Import,
    ImportCall(String),
    Func(String),
    Nodes,
    Graph(String),
    Experiment(String),
    ExperimentGroup(String),
}

impl Tag {
    /// Parse a raw tag, with or without the leading `!`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.strip_prefix('!').unwrap_or(raw);
        let (head, suffix) = match raw.split_once(':') {
            Some((head, suffix)) if !suffix.is_empty() => (head, Some(suffix.to_string())),
            Some(_) => return None,
            None => (raw, None),
        };
        match (head, suffix) {
            ("import", None) => Some(Self::Import),
            ("import", Some(path)) => Some(Self::ImportCall(path)),
            ("func", Some(name)) => Some(Self::Func(name)),
            ("Nodes" | "nodes", None) => Some(Self::Nodes),
            ("Graph", Some(name)) => Some(Self::Graph(name)),
            ("Experiment", Some(name)) => Some(Self::Experiment(name)),
            ("ExperimentGroup", Some(name)) => Some(Self::ExperimentGroup(name)),
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Import => write!(f, "!import"),
            Self::ImportCall(path) => write!(f, "!import:{}", path),
            Self::Func(name) => write!(f, "!func:{}", name),
            Self::Nodes => write!(f, "!Nodes"),
            Self::Graph(name) => write!(f, "!Graph:{}", name),
            Self::Experiment(name) => write!(f, "!Experiment:{}", name),
            Self::ExperimentGroup(name) => write!(f, "!ExperimentGroup:{}", name),
        }
    }
}

/// A loaded document.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Experiment(Experiment),
    Graph(Graph),
    Group(ExperimentGroup),
    Nodes(NodeRegistry),
    Function(Arc<Function>),
    Object(Arc<Resolved>),
    Data(Value),
}

impl Document {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Experiment(_) => "experiment",
            Self::Graph(_) => "graph",
            Self::Group(_) => "group",
            Self::Nodes(_) => "nodes",
            Self::Function(_) => "function",
            Self::Object(_) => "object",
            Self::Data(_) => "data",
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Experiment(e) => Some(&e.name),
            Self::Graph(g) => Some(&g.name),
            Self::Group(g) => Some(&g.name),
            Self::Function(f) => Some(f.name()),
            Self::Object(o) => match o.as_ref() {
                Resolved::Function(f) => Some(f.name()),
                Resolved::Modifier(m) => Some(m.name()),
                Resolved::Factory(reference) => Some(reference.short_name()),
                Resolved::Value { reference, .. } => Some(reference.short_name()),
            },
            Self::Nodes(_) | Self::Data(_) => None,
        }
    }
}

/// Load a document with the default config.
pub fn load(text: &str, registry: &Registry) -> Result<Document, Error> {
    Loader::new(registry, LoaderConfig::default()).load_str(text)
}

pub fn load_with(text: &str, registry: &Registry, config: LoaderConfig) -> Result<Document, Error> {
    Loader::new(registry, config).load_str(text)
}

/// Load a document from disk.
pub fn load_file(path: &Path, registry: &Registry, config: LoaderConfig) -> Result<Document, Error> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_with(&content, registry, config)
}

/// Single-use loader. Consumed by [`Loader::load_str`].
pub struct Loader<'r> {
    resolver: Resolver<'r>,
    config: LoaderConfig,
}

impl<'r> Loader<'r> {
    pub fn new(registry: &'r Registry, config: LoaderConfig) -> Self {
        Self {
            resolver: Resolver::new(registry),
            config,
        }
    }

    pub fn load_str(mut self, text: &str) -> Result<Document, Error> {
        let mut value: Value = serde_yaml_ng::from_str(text)?;
        value.apply_merge()?;
        self.construct(&value)
    }

    /// Build a document from an already parsed value. Merge keys must
    /// already be applied.
    pub fn load_value(mut self, value: &Value) -> Result<Document, Error> {
        self.construct(value)
    }

    fn construct(&mut self, value: &Value) -> Result<Document, Error> {
        let Value::Tagged(tagged) = value else {
            return Ok(Document::Data(value.clone()));
        };
        let raw = tagged.tag.to_string();
        let tag = Tag::parse(&raw)
            .ok_or_else(|| Error::config("document", format!("unrecognized tag '{}'", raw)))?;
        let inner = &tagged.value;

        match tag {
            Tag::Import | Tag::ImportCall(_) => {
                let (_, resolved) = self.import(&tag, inner)?;
                Ok(Document::Object(resolved))
            }
            Tag::Func(name) => Ok(Document::Function(Arc::new(inline_function(&name, inner)?))),
            Tag::Nodes => Ok(Document::Nodes(self.nodes(inner)?)),
            Tag::Graph(name) => Ok(Document::Graph(self.graph(&name, inner)?)),
            Tag::Experiment(name) => Ok(Document::Experiment(self.experiment(&name, inner)?)),
            Tag::ExperimentGroup(name) => Ok(Document::Group(self.group(&name, inner)?)),
        }
    }

    /// Resolve an `!import` or `!import:` reference. Tagged values in the
    /// arguments are built first and the entry receives their values.
    fn import(&mut self, tag: &Tag, inner: &Value) -> Result<(Reference, Arc<Resolved>), Error> {
        let reference = reference(tag, inner)?;
        let args = match &reference.args {
            Some(args) => {
                let mut evaluated = Kwargs::new();
                for (key, value) in args {
                    evaluated.insert(key.clone(), self.nested(value)?);
                }
                Some(evaluated)
            }
            None => None,
        };
        let resolved = self.resolver.resolve_evaluated(&reference, args.as_ref())?;
        Ok((reference, resolved))
    }

    /// Build every tagged value inside free-form data. Returns the data
    /// with imports of plain values replaced by those values; any other
    /// tagged value is kept as written.
    fn nested(&mut self, value: &Value) -> Result<Value, Error> {
        match value {
            Value::Tagged(_) => {
                if let Document::Object(obj) = self.construct(value)? {
                    if let Resolved::Value { value: data, .. } = obj.as_ref() {
                        return Ok(data.clone());
                    }
                }
                Ok(value.clone())
            }
            Value::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.nested(item)?);
                }
                Ok(Value::Sequence(out))
            }
            Value::Mapping(map) => {
                let mut out = Mapping::new();
                for (key, field) in map {
                    out.insert(key.clone(), self.nested(field)?);
                }
                Ok(Value::Mapping(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// A node `func`: an inline `!func:` or an `!import` of a function.
    fn function(&mut self, value: &Value, context: &str) -> Result<Arc<Function>, Error> {
        let Value::Tagged(tagged) = value else {
            return Err(Error::config(
                context,
                "'func' must be an '!import' or '!func:' tagged value",
            ));
        };
        match Tag::parse(&tagged.tag.to_string()) {
            Some(Tag::Func(name)) => Ok(Arc::new(inline_function(&name, &tagged.value)?)),
            Some(tag @ (Tag::Import | Tag::ImportCall(_))) => {
                let (reference, resolved) = self.import(&tag, &tagged.value)?;
                match resolved.as_ref() {
                    Resolved::Function(func) => Ok(Arc::clone(func)),
                    _ => Err(Error::config(
                        context,
                        format!("'{}' does not resolve to a function", reference.path),
                    )),
                }
            }
            _ => Err(Error::config(
                context,
                format!("unexpected tag '{}' for 'func'", tagged.tag),
            )),
        }
    }

    fn nodes(&mut self, value: &Value) -> Result<NodeRegistry, Error> {
        let map = as_mapping(value, "node registry")?;
        let mut raw = Vec::with_capacity(map.len());
        for (key, field) in map {
            let name = key_str(key, "node registry")?;
            raw.push((name.to_string(), self.raw_node(name, field)?));
        }
        build_registry(raw)
    }

    fn raw_node(&mut self, name: &str, value: &Value) -> Result<RawNode, Error> {
        let context = format!("node '{}'", name);
        let map = as_mapping(value, &context)?;
        let mut raw = RawNode::default();
        for (key, field) in map {
            match key_str(key, &context)? {
                "func" => raw.func = Some(self.function(field, &context)?),
                "expr" => raw.expr = Some(string(field, &context, "expr")?),
                "inputs" => raw.inputs = Some(typed(field, &context, "inputs")?),
                "output" => raw.output = Some(typed(field, &context, "output")?),
                "output_unit" => raw.output_unit = Some(typed(field, &context, "output_unit")?),
                "doc" => raw.doc = Some(string(field, &context, "doc")?),
                other => {
                    return Err(Error::config(context, format!("unknown field '{}'", other)))
                }
            }
        }
        Ok(raw)
    }

    /// `node_objects`: a `!Nodes` document or a plain mapping.
    fn node_objects(&mut self, value: &Value, context: &str) -> Result<NodeRegistry, Error> {
        match value {
            Value::Tagged(tagged) => match Tag::parse(&tagged.tag.to_string()) {
                Some(Tag::Nodes) => self.nodes(&tagged.value),
                _ => Err(Error::config(
                    context,
                    format!("'node_objects' must be a '!Nodes' mapping, got '{}'", tagged.tag),
                )),
            },
            Value::Mapping(_) => self.nodes(value),
            _ => Err(Error::config(context, "'node_objects' must be a mapping")),
        }
    }

    fn graph(&mut self, name: &str, value: &Value) -> Result<Graph, Error> {
        let context = format!("graph '{}'", name);
        let map = as_mapping(value, &context)?;
        let mut grouped_edges: Option<Vec<GroupedEdge>> = None;
        let mut nodes = None;
        let mut graph_type = None;
        let mut attrs = IndexMap::new();

        for (key, field) in map {
            match key_str(key, &context)? {
                "grouped_edges" => {
                    grouped_edges = Some(typed(field, &context, "grouped_edges")?)
                }
                "node_objects" => nodes = Some(self.node_objects(field, &context)?),
                "graph_type" => graph_type = Some(string(field, &context, "graph_type")?),
                "name" => {
                    return Err(Error::config(
                        context,
                        "the graph name is given by the tag, not a 'name' field",
                    ))
                }
                other => {
                    self.nested(field)?;
                    attrs.insert(other.to_string(), field.clone());
                }
            }
        }

        let grouped_edges =
            grouped_edges.ok_or_else(|| Error::config(&context, "missing 'grouped_edges'"))?;
        let nodes = nodes.ok_or_else(|| Error::config(&context, "missing 'node_objects'"))?;
        Graph::assemble(name, nodes, grouped_edges, graph_type, attrs, &self.config)
    }

    /// An experiment's `graph` field must be a `!Graph:` document.
    fn graph_field(&mut self, value: &Value, context: &str) -> Result<Graph, Error> {
        if let Value::Tagged(tagged) = value {
            if let Some(Tag::Graph(name)) = Tag::parse(&tagged.tag.to_string()) {
                return self.graph(&name, &tagged.value);
            }
        }
        Err(Error::config(context, "'graph' must be a '!Graph:<name>' document"))
    }

    /// Parse one experiment metadata field into `spec`. Returns `false`
    /// for keys that are not experiment metadata.
    fn spec_field(
        &mut self,
        spec: &mut ExperimentSpec,
        key: &str,
        field: &Value,
        context: &str,
    ) -> Result<bool, Error> {
        match key {
            "components" => spec.components = Some(typed(field, context, key)?),
            "modifiers" => {
                let Value::Sequence(items) = field else {
                    return Err(Error::config(context, "'modifiers' must be a list"));
                };
                let mut modifiers = Vec::with_capacity(items.len());
                for item in items {
                    let (tag, inner) = import_tag(item, context)?;
                    let (reference, _) = self.import(&tag, inner)?;
                    modifiers.push(reference);
                }
                spec.modifiers = Some(modifiers);
            }
            "doc" => spec.doc = Some(string(field, context, key)?),
            "param_defaults" => {
                self.nested(field)?;
                spec.param_defaults = Some(typed(field, context, key)?)
            }
            "returns" => spec.returns = Some(typed(field, context, key)?),
            "return_units" => spec.return_units = Some(typed(field, context, key)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn experiment(&mut self, name: &str, value: &Value) -> Result<Experiment, Error> {
        let context = format!("experiment '{}'", name);
        let map = as_mapping(value, &context)?;
        let mut graph = None;
        let mut spec = ExperimentSpec::default();

        for (key, field) in map {
            let key = key_str(key, &context)?;
            if key == "graph" {
                graph = Some(self.graph_field(field, &context)?);
            } else if !self.spec_field(&mut spec, key, field, &context)? {
                return Err(Error::config(context, format!("unknown field '{}'", key)));
            }
        }

        let graph = graph.ok_or_else(|| Error::config(&context, "missing 'graph'"))?;
        Experiment::assemble(name, graph, spec, &mut self.resolver, &self.config)
    }

    fn recipe(&mut self, value: &Value, context: &str) -> Result<Recipe, Error> {
        let map = as_mapping(value, context)?;
        let mut recipe = Recipe::default();
        for (key, field) in map {
            let key = key_str(key, context)?;
            match key {
                "grouped_edges" => recipe.grouped_edges = Some(typed(field, context, key)?),
                "node_objects" => recipe.nodes = Some(self.node_objects(field, context)?),
                "graph_type" => recipe.graph_type = Some(string(field, context, key)?),
                _ => {
                    if !self.spec_field(&mut recipe.spec, key, field, context)? {
                        return Err(Error::config(context, format!("unknown field '{}'", key)));
                    }
                }
            }
        }
        Ok(recipe)
    }

    fn group(&mut self, name: &str, value: &Value) -> Result<ExperimentGroup, Error> {
        let context = format!("group '{}'", name);
        let map = as_mapping(value, &context)?;
        let mut doc = None;
        let mut nodes = None;
        let mut recipes = IndexMap::new();
        let mut defaults = Recipe::default();
        let mut extra = Vec::new();

        for (key, field) in map {
            match key_str(key, &context)? {
                "doc" => doc = Some(string(field, &context, "doc")?),
                "node_objects" => nodes = Some(self.node_objects(field, &context)?),
                "experiment_recipes" => {
                    for (recipe_key, recipe_value) in as_mapping(field, &context)? {
                        let recipe_name = key_str(recipe_key, &context)?;
                        let recipe_context = format!("{} recipe '{}'", context, recipe_name);
                        recipes.insert(
                            recipe_name.to_string(),
                            self.recipe(recipe_value, &recipe_context)?,
                        );
                    }
                }
                "experiment_defaults" => {
                    defaults = self.recipe(field, &format!("{} experiment_defaults", context))?
                }
                "experiments" => {
                    let Value::Sequence(items) = field else {
                        return Err(Error::config(context, "'experiments' must be a list"));
                    };
                    for item in items {
                        match self.construct(item)? {
                            Document::Experiment(e) => extra.push(Member::Experiment(e)),
                            Document::Graph(g) => extra.push(Member::Graph(g)),
                            other => {
                                return Err(Error::config(
                                    context,
                                    format!(
                                        "'experiments' entries must be experiments or graphs, got {}",
                                        other.kind()
                                    ),
                                ))
                            }
                        }
                    }
                }
                other => {
                    return Err(Error::config(context, format!("unknown field '{}'", other)))
                }
            }
        }

        ExperimentGroup::assemble(
            name,
            doc,
            nodes.unwrap_or_default(),
            recipes,
            defaults,
            extra,
            &mut self.resolver,
            &self.config,
        )
    }
}

fn reference(tag: &Tag, inner: &Value) -> Result<Reference, Error> {
    match tag {
        Tag::Import => match inner {
            Value::String(path) => Ok(Reference::new(path.clone())),
            _ => Err(Error::config(
                "!import",
                "expects a qualified name string, e.g. !import 'math.pow'",
            )),
        },
        Tag::ImportCall(path) => {
            let args: Kwargs = match inner {
                Value::Null => Kwargs::new(),
                Value::Mapping(_) => typed(inner, &format!("!import:{}", path), "arguments")?,
                _ => {
                    return Err(Error::config(
                        format!("!import:{}", path),
                        "arguments must be a mapping of keyword arguments",
                    ))
                }
            };
            Ok(Reference::with_args(path.clone(), args))
        }
        other => Err(Error::config("document", format!("'{}' is not an import tag", other))),
    }
}

fn import_tag<'v>(value: &'v Value, context: &str) -> Result<(Tag, &'v Value), Error> {
    if let Value::Tagged(tagged) = value {
        if let Some(tag @ (Tag::Import | Tag::ImportCall(_))) = Tag::parse(&tagged.tag.to_string()) {
            return Ok((tag, &tagged.value));
        }
    }
    Err(Error::config(context, "'modifiers' entries must be '!import' references"))
}

fn inline_function(name: &str, inner: &Value) -> Result<Function, Error> {
    match inner {
        Value::String(source) => Function::inline(name, source),
        _ => Err(Error::config(
            format!("!func:{}", name),
            "expects a lambda expression string",
        )),
    }
}

fn as_mapping<'v>(value: &'v Value, context: &str) -> Result<&'v Mapping, Error> {
    match value {
        Value::Mapping(map) => Ok(map),
        _ => Err(Error::config(context, "expected a mapping")),
    }
}

fn key_str<'v>(key: &'v Value, context: &str) -> Result<&'v str, Error> {
    key.as_str()
        .ok_or_else(|| Error::config(context, "field names must be strings"))
}

fn string(value: &Value, context: &str, field: &str) -> Result<String, Error> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::config(context, format!("'{}' must be a string", field)))
}

fn typed<T: DeserializeOwned>(value: &Value, context: &str, field: &str) -> Result<T, Error> {
    serde_yaml_ng::from_value(value.clone())
        .map_err(|e| Error::config(context, format!("invalid '{}': {}", field, e)))
}
