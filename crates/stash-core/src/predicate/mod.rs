//! Item predicates: decide per (url, metadata) whether an item is processed.
//!
//! Predicates are stateful (the range counter, the unique URL set) and owned
//! by a single job. Any predicate may end the job by returning
//! [`PredicateError::Stop`].

pub mod expr;
mod filter;
mod range;
mod unique;

use thiserror::Error;

use crate::control::StopExtraction;
use crate::value::Metadata;
pub use filter::{FilterError, FilterPredicate};
pub use range::{optimize_range, parse_range, RangeError, RangePredicate};
pub use unique::UniquePredicate;

#[derive(Debug, Error)]
pub enum PredicateError {
    /// Stop processing the job; not a failure.
    #[error(transparent)]
    Stop(#[from] StopExtraction),
    #[error(transparent)]
    Filter(#[from] FilterError),
}

pub trait Predicate: Send {
    fn check(&mut self, url: &str, metadata: &Metadata) -> Result<bool, PredicateError>;
}

/// Accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysTrue;

impl Predicate for AlwaysTrue {
    fn check(&mut self, _url: &str, _metadata: &Metadata) -> Result<bool, PredicateError> {
        Ok(true)
    }
}

/// Logical AND of its members, evaluated in order with short-circuit.
pub struct ChainPredicate {
    predicates: Vec<Box<dyn Predicate>>,
}

impl ChainPredicate {
    pub fn new(predicates: Vec<Box<dyn Predicate>>) -> Self {
        ChainPredicate { predicates }
    }
}

impl Predicate for ChainPredicate {
    fn check(&mut self, url: &str, metadata: &Metadata) -> Result<bool, PredicateError> {
        for predicate in &mut self.predicates {
            if !predicate.check(url, metadata)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Combine `predicates`: none accepts everything, one is used as is, more
/// are chained.
pub fn build_predicate(mut predicates: Vec<Box<dyn Predicate>>) -> Box<dyn Predicate> {
    match predicates.len() {
        0 => Box::new(AlwaysTrue),
        1 => match predicates.pop() {
            Some(only) => only,
            None => Box::new(AlwaysTrue),
        },
        _ => Box::new(ChainPredicate::new(predicates)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        result: bool,
        calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Predicate for Counting {
        fn check(&mut self, _: &str, _: &Metadata) -> Result<bool, PredicateError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.result)
        }
    }

    #[test]
    fn empty_build_accepts_everything() {
        let mut p = build_predicate(Vec::new());
        assert!(p.check("https://x", &Metadata::new()).unwrap());
    }

    #[test]
    fn chain_short_circuits_in_order() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut p = build_predicate(vec![
            Box::new(Counting { result: false, calls: calls.clone() }),
            Box::new(Counting { result: true, calls: calls.clone() }),
        ]);
        assert!(!p.check("u", &Metadata::new()).unwrap());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn chain_requires_all() {
        let mut p = build_predicate(vec![
            Box::new(UniquePredicate::new()),
            Box::new(RangePredicate::new("1-3").unwrap()),
        ]);
        let m = Metadata::new();
        assert!(p.check("a", &m).unwrap());
        assert!(!p.check("a", &m).unwrap());
        assert!(p.check("b", &m).unwrap());
        // Range counter only advances when the unique check passes.
        assert!(p.check("c", &m).unwrap());
        assert!(matches!(p.check("d", &m), Err(PredicateError::Stop(_))));
    }
}
