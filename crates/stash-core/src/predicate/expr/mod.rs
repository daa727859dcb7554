//! Sandboxed filter expressions.
//!
//! A small, closed expression language evaluated against item metadata:
//!
//! ```text
//! width >= 1000 and extension in ("jpg", "png")
//! "sample" not in title.lower() if title else True
//! re.search(r"\bpart (\d+)", description) and parse_int(num) % 2 == 0
//! ```
//!
//! Names resolve to metadata keys first, then to a fixed set of helper
//! functions. Nothing outside that set is reachable.

mod builtins;
mod eval;
mod lexer;
mod parser;

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

use crate::value::{Metadata, Value};
use parser::Expr;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("name {0:?} is not defined")]
    Name(String),
    #[error("{kind} object has no attribute {name:?}")]
    Attribute { kind: &'static str, name: String },
    #[error("{0}")]
    Type(String),
    #[error("{0}")]
    Value(String),
    #[error("index out of range")]
    Index,
    #[error("key {0:?} not found")]
    Key(String),
    #[error("division by zero")]
    ZeroDivision,
    #[error("integer overflow")]
    Overflow,
    #[error("invalid regular expression: {0}")]
    Regex(String),
    /// Raised by `abort()`; callers turn this into a stop signal.
    #[error("abort() called")]
    Abort,
}

impl ExprError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        ExprError::Type(message.into())
    }
}

/// Compiled regular expressions, keyed by anchoring mode and pattern.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: HashMap<String, Regex>,
}

impl RegexCache {
    pub(crate) fn get(&mut self, source: String) -> Result<&Regex, ExprError> {
        match self.compiled.entry(source) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let regex = Regex::new(entry.key()).map_err(|e| ExprError::Regex(e.to_string()))?;
                Ok(entry.insert(regex))
            }
        }
    }
}

/// A parsed expression, evaluated any number of times.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = lexer::tokenize(source)?;
        let root = parser::parse(&tokens)?;
        Ok(Expression {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate and return the result's truth value.
    pub fn test(&self, metadata: &Metadata, regexes: &mut RegexCache) -> Result<bool, ExprError> {
        Ok(eval::Evaluator::new(metadata, regexes)
            .eval(&self.root)?
            .is_truthy())
    }

    /// Evaluate to a plain value. Functions and match objects have no value
    /// form and are reported as type errors.
    pub fn evaluate(&self, metadata: &Metadata, regexes: &mut RegexCache) -> Result<Value, ExprError> {
        eval::Evaluator::new(metadata, regexes)
            .eval(&self.root)?
            .into_value()
    }
}

#[cfg(test)]
mod tests;
