//! EG-012: Experiment groups.
//!
//! A group shares one node registry across several experiments. Each
//! recipe supplies its own grouped edges and metadata; unset metadata is
//! taken from the group defaults. A recipe without its own
//! `node_objects` uses the shared registry, restricted to the nodes its
//! edges mention.

use super::config::LoaderConfig;
use super::edges::expand_grouped_edges;
use super::error::Error;
use super::experiment::{Experiment, ExperimentSpec};
use super::graph::Graph;
use super::nodes::NodeRegistry;
use super::resolver::Resolver;
use super::types::GroupedEdge;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Experiment recipe: graph shape plus experiment metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recipe {
    pub grouped_edges: Option<Vec<GroupedEdge>>,
    pub nodes: Option<NodeRegistry>,
    pub graph_type: Option<String>,
    pub spec: ExperimentSpec,
}

impl Recipe {
    pub fn is_empty(&self) -> bool {
        *self == Recipe::default()
    }
}

/// A group member.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Experiment(Experiment),
    Graph(Graph),
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Self::Experiment(e) => &e.name,
            Self::Graph(g) => &g.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentGroup {
    pub name: String,
    pub doc: Option<String>,
    pub nodes: NodeRegistry,
    pub recipes: IndexMap<String, Recipe>,
    pub defaults: Recipe,
    members: IndexMap<String, Member>,
}

impl ExperimentGroup {
    /// Build every recipe, then add the explicitly listed members.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        name: &str,
        doc: Option<String>,
        nodes: NodeRegistry,
        recipes: IndexMap<String, Recipe>,
        defaults: Recipe,
        extra: Vec<Member>,
        resolver: &mut Resolver<'_>,
        config: &LoaderConfig,
    ) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::config("group", "group name must not be empty"));
        }
        let context = format!("group '{}'", name);
        if defaults.grouped_edges.is_some() {
            return Err(Error::config(
                &context,
                "experiment_defaults must not define grouped_edges",
            ));
        }
        if defaults.nodes.is_some() {
            return Err(Error::config(
                &context,
                "experiment_defaults must not define node_objects; use the group node_objects",
            ));
        }

        let mut group = Self {
            name: name.to_string(),
            doc,
            nodes,
            recipes,
            defaults,
            members: IndexMap::new(),
        };

        let mut built = Vec::with_capacity(group.recipes.len());
        for (recipe_name, recipe) in &group.recipes {
            built.push(group.build_recipe(recipe_name, recipe, resolver, config)?);
        }
        for experiment in built {
            group.add_member(Member::Experiment(experiment))?;
        }
        for member in extra {
            group.add_member(member)?;
        }

        debug!(
            group = %group.name,
            recipes = group.recipes.len(),
            members = group.members.len(),
            "assembled experiment group"
        );
        Ok(group)
    }

    fn build_recipe(
        &self,
        recipe_name: &str,
        recipe: &Recipe,
        resolver: &mut Resolver<'_>,
        config: &LoaderConfig,
    ) -> Result<Experiment, Error> {
        let context = format!("group '{}' recipe '{}'", self.name, recipe_name);
        let grouped = recipe
            .grouped_edges
            .clone()
            .ok_or_else(|| Error::config(&context, "missing 'grouped_edges'"))?;

        let nodes = match &recipe.nodes {
            Some(own) => own.clone(),
            None => {
                let edges = expand_grouped_edges(&grouped)?;
                let mentioned: HashSet<&str> = edges
                    .iter()
                    .flat_map(|e| [e.from.as_str(), e.to.as_str()])
                    .collect();
                self.nodes
                    .iter()
                    .filter(|(name, _)| mentioned.is_empty() || mentioned.contains(name.as_str()))
                    .map(|(name, node)| (name.clone(), node.clone()))
                    .collect()
            }
        };

        let graph_type = recipe
            .graph_type
            .clone()
            .or_else(|| self.defaults.graph_type.clone());
        let graph = Graph::assemble(
            &format!("{}.{}", self.name, recipe_name),
            nodes,
            grouped,
            graph_type,
            IndexMap::new(),
            config,
        )?;
        let spec = recipe.spec.clone().or(&self.defaults.spec);
        Experiment::assemble(recipe_name, graph, spec, resolver, config)
    }

    /// Add a member; names are unique within a group.
    pub fn add_member(&mut self, member: Member) -> Result<(), Error> {
        let name = member.name().to_string();
        if self.members.contains_key(&name) {
            return Err(Error::DuplicateMember {
                group: self.name.clone(),
                member: name,
            });
        }
        self.members.insert(name, member);
        Ok(())
    }

    pub fn members(&self) -> &IndexMap<String, Member> {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn experiment(&self, name: &str) -> Option<&Experiment> {
        match self.members.get(name) {
            Some(Member::Experiment(e)) => Some(e),
            _ => None,
        }
    }

    /// Members not produced by a recipe.
    pub fn extra_members(&self) -> impl Iterator<Item = &Member> {
        self.members
            .iter()
            .filter(|(name, _)| !self.recipes.contains_key(*name))
            .map(|(_, member)| member)
    }
}

impl fmt::Display for ExperimentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        if let Some(doc) = &self.doc {
            writeln!(f, "{}", doc)?;
        }
        writeln!(f, "members:")?;
        for member in self.members.values() {
            match member {
                Member::Experiment(e) => writeln!(f, "- {}{}", e.name, e.signature())?,
                Member::Graph(g) => writeln!(f, "- {} (graph)", g.name)?,
            }
        }
        Ok(())
    }
}
