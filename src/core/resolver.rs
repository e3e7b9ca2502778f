//! EG-006: Reference resolution with per-load memoization.
//!
//! Resolves `!import 'path'` and `!import:path {args}` references against a
//! [`Registry`]. A reference with arguments invokes the entry once and
//! yields the result; without arguments the entry itself comes back.
//! Results are cached for the lifetime of one
//! [`Resolver`], so identical references share one `Arc` and factories
//! run at most once per load.

use super::error::Error;
use super::function::Function;
use super::registry::{Entry, Kwargs, Product, Registry};
use super::types::yaml_value_to_string;
use indexmap::IndexMap;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_yaml_ng::Value;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::debug;

static QUALIFIED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .unwrap_or_else(|e| panic!("qualified-name pattern: {}", e))
});

/// Check that `path` is a dotted identifier path.
pub fn is_qualified_name(path: &str) -> bool {
    QUALIFIED_NAME.is_match(path)
}

/// A qualified path plus optional keyword arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub path: String,
    pub args: Option<Kwargs>,
}

impl Reference {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: None,
        }
    }

    pub fn with_args(path: impl Into<String>, args: Kwargs) -> Self {
        Self {
            path: path.into(),
            args: Some(args),
        }
    }

    /// Last path segment.
    pub fn short_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Memo key: path plus arguments sorted by name.
    fn cache_key(&self) -> Result<String, Error> {
        let Some(args) = &self.args else {
            return Ok(self.path.clone());
        };
        let mut sorted: Vec<(&String, &Value)> = args.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let encoded = serde_yaml_ng::to_string(&sorted)
            .map_err(|e| Error::resolution(&self.path, format!("unhashable arguments: {}", e)))?;
        Ok(format!("{}\u{0}{}", self.path, encoded))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            None => write!(f, "{}", self.path),
            Some(args) => write!(f, "{}({})", self.path, format_kwargs(args)),
        }
    }
}

fn format_kwargs(args: &Kwargs) -> String {
    args.iter()
        .map(|(k, v)| format!("{}={}", k, yaml_value_to_string(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// An experiment modifier: the reference that produced it plus its effect
/// on the experiment signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Modifier {
    pub reference: Reference,
    pub renames: IndexMap<String, String>,
}

impl Modifier {
    pub fn name(&self) -> &str {
        self.reference.short_name()
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self.reference.args.as_ref().map(format_kwargs).unwrap_or_default();
        write!(f, "{}({})", self.name(), args)
    }
}

/// A resolved object.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Function(Arc<Function>),
    Modifier(Modifier),
    /// A factory referenced without arguments, not invoked.
    Factory(Reference),
    Value { reference: Reference, value: Value },
}

/// Resolves references against a registry. One resolver per load/dump.
#[derive(Debug)]
pub struct Resolver<'r> {
    registry: &'r Registry,
    cache: FxHashMap<String, Arc<Resolved>>,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            cache: FxHashMap::default(),
        }
    }

    /// Number of distinct references resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolve a reference, memoized per path and arguments.
    pub fn resolve(&mut self, reference: &Reference) -> Result<Arc<Resolved>, Error> {
        self.resolve_evaluated(reference, reference.args.as_ref())
    }

    /// Like [`Resolver::resolve`], but invokes the entry with `args`
    /// instead of the written arguments. `args` is the written arguments
    /// with nested references already replaced by their values; the memo
    /// key stays the written form.
    pub fn resolve_evaluated(
        &mut self,
        reference: &Reference,
        args: Option<&Kwargs>,
    ) -> Result<Arc<Resolved>, Error> {
        let key = reference.cache_key()?;
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Arc::clone(hit));
        }
        let resolved = Arc::new(self.resolve_uncached(reference, args)?);
        debug!(reference = %reference, "resolved reference");
        self.cache.insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    fn resolve_uncached(
        &self,
        reference: &Reference,
        args: Option<&Kwargs>,
    ) -> Result<Resolved, Error> {
        let path = reference.path.as_str();
        if !is_qualified_name(path) {
            return Err(Error::resolution(path, "not a dotted identifier path"));
        }
        let entry = self.registry.get(path).ok_or_else(|| {
            let reason = match self.registry.nearest_namespace(path) {
                Some(ns) => format!("no object named '{}' in '{}'", reference.short_name(), ns),
                None => "no such object is registered".to_string(),
            };
            Error::resolution(path, reason)
        })?;

        match (entry, args) {
            (Entry::Function(func), None) => Ok(Resolved::Function(Arc::clone(func))),
            (Entry::Function(func), Some(args)) => {
                let value = func
                    .call_kwargs(args)
                    .map_err(|e| Error::resolution(path, format!("invocation failed: {}", e)))?;
                Ok(Resolved::Value {
                    reference: reference.clone(),
                    value: Value::from(value),
                })
            }
            (Entry::Constant(value), None) => Ok(Resolved::Value {
                reference: reference.clone(),
                value: value.clone(),
            }),
            (Entry::Constant(_), Some(_)) => Err(Error::resolution(
                path,
                "object is not callable but arguments were supplied",
            )),
            (Entry::Factory(_), None) => Ok(Resolved::Factory(reference.clone())),
            (Entry::Factory(factory), Some(kwargs)) => {
                match factory(kwargs) {
                    Ok(Product::Value(value)) => Ok(Resolved::Value {
                        reference: reference.clone(),
                        value,
                    }),
                    Ok(Product::Modifier { renames }) => Ok(Resolved::Modifier(Modifier {
                        reference: reference.clone(),
                        renames,
                    })),
                    Err(e) => Err(Error::resolution(path, format!("invocation failed: {}", e))),
                }
            }
        }
    }
}
