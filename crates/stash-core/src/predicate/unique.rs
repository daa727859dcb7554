use std::collections::HashSet;

use super::{Predicate, PredicateError};
use crate::value::Metadata;

/// Accepts each URL the first time it is seen. Inline `text:` content is
/// always accepted.
#[derive(Debug, Default, Clone)]
pub struct UniquePredicate {
    seen: HashSet<String>,
}

impl UniquePredicate {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Predicate for UniquePredicate {
    fn check(&mut self, url: &str, _metadata: &Metadata) -> Result<bool, PredicateError> {
        if url.starts_with("text:") {
            return Ok(true);
        }
        Ok(self.seen.insert(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_rejected() {
        let mut p = UniquePredicate::new();
        let m = Metadata::new();
        assert!(p.check("https://example.org/a.jpg", &m).unwrap());
        assert!(p.check("https://example.org/b.jpg", &m).unwrap());
        assert!(!p.check("https://example.org/a.jpg", &m).unwrap());
    }

    #[test]
    fn text_urls_always_pass() {
        let mut p = UniquePredicate::new();
        let m = Metadata::new();
        assert!(p.check("text:hello", &m).unwrap());
        assert!(p.check("text:hello", &m).unwrap());
    }
}
