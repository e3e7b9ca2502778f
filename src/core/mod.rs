//! Core document logic: types, resolution, node/graph/experiment assembly,
//! loading and dumping.

pub mod config;
pub mod dumper;
pub mod edges;
pub mod error;
pub mod experiment;
pub mod expr;
pub mod fingerprint;
pub mod function;
pub mod graph;
pub mod group;
pub mod loader;
pub mod nodes;
pub mod registry;
pub mod resolver;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;
