//! EG-008: Loader configuration: metadata strictness and cycle policy.
//!
//! Loaded from TOML (`expgraph.toml`):
//!
//! ```toml
//! metadata = "warn"   # or "strict" (default)
//! cycles = "reject"   # or "allow" (default)
//! ```

use super::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How unknown parameter/output names in experiment metadata are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataPolicy {
    /// Fail the load.
    #[default]
    Strict,
    /// Log a warning and keep the metadata.
    Warn,
}

/// Whether cyclic graphs are accepted at assembly time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Defer cycle handling to the execution runtime.
    #[default]
    Allow,
    /// Reject cyclic graphs with `Error::Cycle`.
    Reject,
}

/// Loader settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub metadata: MetadataPolicy,
    pub cycles: CyclePolicy,
}

impl LoaderConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file from disk.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}
