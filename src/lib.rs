//! expgraph: tagged-YAML documents for computation graphs and experiments.
//!
//! Loads `!Graph:`, `!Experiment:` and `!ExperimentGroup:` documents into
//! validated in-memory objects and dumps them back losslessly.

pub mod cli;
pub mod core;

pub use crate::core::error::Error;
pub use crate::core::loader::{load, load_file, load_with, Document};
pub use crate::core::dumper::{dump, dump_file};
pub use crate::core::registry::Registry;
