use thiserror::Error;

use super::expr::{ExprError, Expression, RegexCache};
use super::{Predicate, PredicateError};
use crate::control::StopExtraction;
use crate::value::Metadata;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter expression {expr:?}: {source}")]
    Syntax {
        expr: String,
        #[source]
        source: ExprError,
    },
    #[error("evaluating filter {expr:?} failed: {source}")]
    Eval {
        expr: String,
        #[source]
        source: ExprError,
    },
}

/// Accepts items for which a filter expression is truthy.
#[derive(Debug)]
pub struct FilterPredicate {
    expr: Expression,
    regexes: RegexCache,
}

impl FilterPredicate {
    pub fn new(expr: &str) -> Result<Self, FilterError> {
        let expr = Expression::parse(expr).map_err(|source| FilterError::Syntax {
            expr: expr.to_string(),
            source,
        })?;
        Ok(FilterPredicate {
            expr,
            regexes: RegexCache::default(),
        })
    }
}

impl Predicate for FilterPredicate {
    fn check(&mut self, _url: &str, metadata: &Metadata) -> Result<bool, PredicateError> {
        match self.expr.test(metadata, &mut self.regexes) {
            Ok(accepted) => Ok(accepted),
            Err(ExprError::Abort) => Err(StopExtraction.into()),
            Err(source) => Err(FilterError::Eval {
                expr: self.expr.source().to_string(),
                source,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn meta(pairs: &[(&str, Value)]) -> Metadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn filters_on_metadata() {
        let mut p = FilterPredicate::new("width >= 1000 and extension in ('jpg', 'png')").unwrap();
        let big = meta(&[("width", Value::Int(1920)), ("extension", Value::from("jpg"))]);
        let small = meta(&[("width", Value::Int(640)), ("extension", Value::from("jpg"))]);
        let gif = meta(&[("width", Value::Int(1920)), ("extension", Value::from("gif"))]);
        assert!(p.check("u", &big).unwrap());
        assert!(!p.check("u", &small).unwrap());
        assert!(!p.check("u", &gif).unwrap());
    }

    #[test]
    fn abort_passes_through_as_stop() {
        let mut p = FilterPredicate::new("num < 3 or abort()").unwrap();
        assert!(p.check("u", &meta(&[("num", Value::Int(1))])).unwrap());
        assert!(matches!(
            p.check("u", &meta(&[("num", Value::Int(5))])),
            Err(PredicateError::Stop(_))
        ));
    }

    #[test]
    fn evaluation_errors_are_wrapped() {
        let mut p = FilterPredicate::new("missing > 1").unwrap();
        let err = p.check("u", &Metadata::new()).unwrap_err();
        assert!(matches!(
            err,
            PredicateError::Filter(FilterError::Eval {
                source: ExprError::Name(_),
                ..
            })
        ));
    }

    #[test]
    fn syntax_errors_at_construction() {
        assert!(matches!(
            FilterPredicate::new("width >"),
            Err(FilterError::Syntax { .. })
        ));
    }
}
