//! Index ranges such as `-2,4,6-8,10-`.

use thiserror::Error;

use super::{Predicate, PredicateError};
use crate::control::StopExtraction;
use crate::value::Metadata;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid range {group:?}: expected N, N-, -N or A-B")]
pub struct RangeError {
    pub group: String,
}

/// Parse a comma-separated list of 1-based inclusive ranges.
///
/// `N` is a single index, `A-B` an interval, `-N` starts at 1 and `N-` is
/// unbounded. Whitespace is ignored, empty groups are skipped and reversed
/// bounds are swapped. The result is neither sorted nor merged.
pub fn parse_range(spec: &str) -> Result<Vec<(u64, u64)>, RangeError> {
    let mut ranges = Vec::new();
    for group in spec.split(',') {
        if group.trim().is_empty() {
            continue;
        }
        let bad = || RangeError {
            group: group.to_string(),
        };
        let number = |s: &str| s.trim().parse::<u64>().map_err(|_| bad());

        let (beg, end) = match group.split_once('-') {
            None => {
                let n = number(group)?;
                (n, n)
            }
            Some((first, last)) => {
                let beg = if first.trim().is_empty() { 1 } else { number(first)? };
                let end = if last.trim().is_empty() { u64::MAX } else { number(last)? };
                (beg, end)
            }
        };
        ranges.push(if beg <= end { (beg, end) } else { (end, beg) });
    }
    Ok(ranges)
}

/// Sort and merge overlapping or adjacent ranges.
pub fn optimize_range(mut ranges: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    if ranges.len() <= 1 {
        return ranges;
    }
    ranges.sort_unstable();

    let mut result = Vec::with_capacity(ranges.len());
    let (mut beg, mut end) = ranges[0];
    for &(lower, upper) in &ranges[1..] {
        if lower > end.saturating_add(1) {
            result.push((beg, end));
            (beg, end) = (lower, upper);
        } else if upper > end {
            end = upper;
        }
    }
    result.push((beg, end));
    result
}

/// Accepts the items whose 1-based position falls into the ranges and stops
/// the job once past the last one.
#[derive(Debug, Clone)]
pub struct RangePredicate {
    ranges: Vec<(u64, u64)>,
    upper: u64,
    index: u64,
}

impl RangePredicate {
    pub fn new(spec: &str) -> Result<Self, RangeError> {
        let ranges = optimize_range(parse_range(spec)?);
        let upper = ranges.last().map_or(0, |&(_, upper)| upper);
        Ok(RangePredicate {
            ranges,
            upper,
            index: 0,
        })
    }

    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.ranges
    }
}

impl Predicate for RangePredicate {
    fn check(&mut self, _url: &str, _metadata: &Metadata) -> Result<bool, PredicateError> {
        self.index = self.index.saturating_add(1);
        if self.index > self.upper {
            return Err(StopExtraction.into());
        }
        Ok(self
            .ranges
            .iter()
            .any(|&(lower, upper)| lower <= self.index && self.index <= upper))
    }
}
