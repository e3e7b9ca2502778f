//! EG-005: Explicit object registry: qualified path to function, constant
//! or factory.
//!
//! Documents name callables by dotted path (`math.pow`,
//! `modifier.loop_input`). The host populates a [`Registry`] once at
//! startup; resolution is a map lookup.

use super::error::EvalError;
use super::function::Function;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::sync::Arc;

/// Keyword arguments attached to a reference.
pub type Kwargs = IndexMap<String, Value>;

/// A factory invoked with keyword arguments.
pub type Factory = Arc<dyn Fn(&Kwargs) -> Result<Product, String> + Send + Sync>;

/// What a factory produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Product {
    /// Plain data.
    Value(Value),
    /// An experiment modifier. `renames` maps a wrapped parameter to the
    /// name it takes in the experiment signature.
    Modifier { renames: IndexMap<String, String> },
}

/// A registry entry.
#[derive(Clone)]
pub enum Entry {
    Function(Arc<Function>),
    Constant(Value),
    Factory(Factory),
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function(func) => write!(f, "Function({})", func),
            Self::Constant(v) => write!(f, "Constant({:?})", v),
            Self::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

/// Registry of loadable objects keyed by qualified path.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: IndexMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `math.*`, `operator.*` and `modifier.*`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_math(&mut registry);
        register_operator(&mut registry);
        register_modifiers(&mut registry);
        registry
    }

    /// Register a native function under `path`.
    pub fn register_function<F>(&mut self, path: &str, params: &[&str], kernel: F) -> &mut Self
    where
        F: Fn(&[f64]) -> Result<f64, EvalError> + Send + Sync + 'static,
    {
        let func = Function::native(path, params, kernel);
        self.entries
            .insert(path.to_string(), Entry::Function(Arc::new(func)));
        self
    }

    pub fn register_constant(&mut self, path: &str, value: Value) -> &mut Self {
        self.entries.insert(path.to_string(), Entry::Constant(value));
        self
    }

    pub fn register_factory<F>(&mut self, path: &str, factory: F) -> &mut Self
    where
        F: Fn(&Kwargs) -> Result<Product, String> + Send + Sync + 'static,
    {
        self.entries
            .insert(path.to_string(), Entry::Factory(Arc::new(factory)));
        self
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered paths in registration order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Longest dotted prefix of `path` that is a registered namespace.
    pub fn nearest_namespace(&self, path: &str) -> Option<String> {
        let segments: Vec<&str> = path.split('.').collect();
        (1..segments.len()).rev().find_map(|n| {
            let prefix = segments[..n].join(".");
            let dotted = format!("{}.", prefix);
            self.entries
                .keys()
                .any(|k| k.starts_with(&dotted))
                .then_some(prefix)
        })
    }
}

fn register_math(registry: &mut Registry) {
    let domain = || EvalError::Domain("math domain error".to_string());
    registry
        .register_function("math.pow", &["x", "y"], |a| Ok(a[0].powf(a[1])))
        .register_function("math.log", &["x", "base"], move |a| {
            if a[0] <= 0.0 || a[1] <= 0.0 || a[1] == 1.0 {
                return Err(domain());
            }
            Ok(a[0].ln() / a[1].ln())
        })
        .register_function("math.log10", &["x"], move |a| {
            if a[0] <= 0.0 {
                return Err(domain());
            }
            Ok(a[0].log10())
        })
        .register_function("math.exp", &["x"], |a| Ok(a[0].exp()))
        .register_function("math.sqrt", &["x"], move |a| {
            if a[0] < 0.0 {
                return Err(domain());
            }
            Ok(a[0].sqrt())
        })
        .register_function("math.sin", &["x"], |a| Ok(a[0].sin()))
        .register_function("math.cos", &["x"], |a| Ok(a[0].cos()))
        .register_function("math.tan", &["x"], |a| Ok(a[0].tan()))
        .register_function("math.hypot", &["x", "y"], |a| Ok(a[0].hypot(a[1])))
        .register_function("math.fabs", &["x"], |a| Ok(a[0].abs()))
        .register_constant("math.pi", Value::from(std::f64::consts::PI))
        .register_constant("math.e", Value::from(std::f64::consts::E));
}

fn register_operator(registry: &mut Registry) {
    registry
        .register_function("operator.add", &["a", "b"], |a| Ok(a[0] + a[1]))
        .register_function("operator.sub", &["a", "b"], |a| Ok(a[0] - a[1]))
        .register_function("operator.mul", &["a", "b"], |a| Ok(a[0] * a[1]))
        .register_function("operator.truediv", &["a", "b"], |a| {
            if a[1] == 0.0 {
                return Err(EvalError::Domain("division by zero".to_string()));
            }
            Ok(a[0] / a[1])
        })
        .register_function("operator.neg", &["a"], |a| Ok(-a[0]));
}

fn register_modifiers(registry: &mut Registry) {
    registry.register_factory("modifier.loop_input", |kwargs| {
        if let Some(extra) = kwargs.keys().find(|k| k.as_str() != "parameter") {
            return Err(format!("loop_input() got an unexpected argument '{}'", extra));
        }
        let parameter = kwargs
            .get("parameter")
            .and_then(Value::as_str)
            .ok_or("loop_input() requires a string 'parameter' argument")?;
        let renames = IndexMap::from([(parameter.to_string(), format!("{}_loop", parameter))]);
        Ok(Product::Modifier { renames })
    });
}
