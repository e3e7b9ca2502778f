//! EG-004: Node functions: registered kernels and inline `!func:` lambdas.

use super::error::{Error, EvalError};
use super::expr;
use super::registry::Kwargs;
use std::fmt;
use std::sync::Arc;

/// Compiled function body over positional `f64` arguments.
pub type Kernel = Arc<dyn Fn(&[f64]) -> Result<f64, EvalError> + Send + Sync>;

/// Where a function came from. Drives how it is dumped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionSource {
    /// Registered under a qualified path (`!import 'math.pow'`).
    Import(String),
    /// Inline lambda source (`!func:add 'lambda a, h: a + h'`).
    Inline(String),
}

/// A callable with a display name and declared parameters.
///
/// Equality compares name, parameters and source; the kernel itself is
/// not comparable.
#[derive(Clone)]
pub struct Function {
    name: String,
    params: Vec<String>,
    source: FunctionSource,
    kernel: Kernel,
}

impl Function {
    /// Wrap a native kernel registered under `path`. The display name is
    /// the last path segment.
    pub fn native<F>(path: &str, params: &[&str], kernel: F) -> Self
    where
        F: Fn(&[f64]) -> Result<f64, EvalError> + Send + Sync + 'static,
    {
        let name = path.rsplit('.').next().unwrap_or(path).to_string();
        Self {
            name,
            params: params.iter().map(|p| p.to_string()).collect(),
            source: FunctionSource::Import(path.to_string()),
            kernel: Arc::new(kernel),
        }
    }

    /// Compile an inline lambda expression under `name`.
    pub fn inline(name: &str, source: &str) -> Result<Self, Error> {
        let lambda = expr::parse_lambda(source).map_err(|reason| Error::Syntax {
            name: name.to_string(),
            expr: source.to_string(),
            reason,
        })?;
        let params = lambda.params.clone();
        Ok(Self {
            name: name.to_string(),
            params,
            source: FunctionSource::Inline(source.to_string()),
            kernel: Arc::new(move |args: &[f64]| lambda.eval(args)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn source(&self) -> &FunctionSource {
        &self.source
    }

    /// Inline functions document themselves with their expression.
    pub fn doc(&self) -> Option<&str> {
        match &self.source {
            FunctionSource::Inline(expr) => Some(expr),
            FunctionSource::Import(_) => None,
        }
    }

    /// Call with positional arguments.
    pub fn call(&self, args: &[f64]) -> Result<f64, EvalError> {
        if args.len() != self.params.len() {
            return Err(EvalError::Arity {
                name: self.name.clone(),
                expected: self.params.len(),
                got: args.len(),
            });
        }
        (self.kernel)(args)
    }

    /// Call with keyword arguments matched to the declared parameters.
    pub fn call_kwargs(&self, kwargs: &Kwargs) -> Result<f64, EvalError> {
        if let Some(extra) = kwargs.keys().find(|k| !self.params.contains(k)) {
            return Err(EvalError::UndefinedName(extra.clone()));
        }
        let args = self
            .params
            .iter()
            .map(|p| {
                let value = kwargs
                    .get(p)
                    .ok_or_else(|| EvalError::MissingArgument(p.clone()))?;
                value
                    .as_f64()
                    .ok_or_else(|| EvalError::NotANumber(p.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.call(&args)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.params == other.params && self.source == other.source
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}
