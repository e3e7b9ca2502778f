//! EG-002: Error taxonomy for loading, assembling and dumping documents.

use std::path::PathBuf;
use thiserror::Error;

/// Load/dump errors. Every variant carries the name of the offending
/// node, graph or experiment.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot resolve '{path}': {reason}")]
    Resolution { path: String, reason: String },

    #[error("function '{name}' has an invalid expression \"{expr}\": {reason}")]
    Syntax {
        name: String,
        expr: String,
        reason: String,
    },

    #[error("{context}: {message}")]
    Configuration { context: String, message: String },

    #[error("node '{node}' declares output '{output}' already produced by node '{other}'")]
    DuplicateOutput {
        node: String,
        output: String,
        other: String,
    },

    #[error("group '{group}' already has a member named '{member}'")]
    DuplicateMember { group: String, member: String },

    #[error("graph '{graph}': edge {from} -> {to} references unknown node '{node}'")]
    UnknownNode {
        graph: String,
        from: String,
        to: String,
        node: String,
    },

    #[error("experiment '{experiment}': {field} names unknown parameter '{parameter}'")]
    UnknownParameter {
        experiment: String,
        field: &'static str,
        parameter: String,
    },

    #[error("experiment '{experiment}': {field} names unknown output '{output}'")]
    UnknownOutput {
        experiment: String,
        field: &'static str,
        output: String,
    },

    #[error("graph '{graph}' has a cycle involving: {members}")]
    Cycle { graph: String, members: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("invalid loader config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn config(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            context: context.into(),
            message: message.into(),
        }
    }

    pub(crate) fn resolution(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised when calling a compiled function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    UndefinedName(String),

    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("missing argument '{0}'")]
    MissingArgument(String),

    #[error("argument '{0}' must be a number")]
    NotANumber(String),

    #[error("{0}")]
    Domain(String),
}
