//! `stash eval` – evaluate a filter expression and print the result.

use anyhow::Result;
use stash_core::predicate::expr::{Expression, RegexCache};

use super::parse_metadata;

pub fn run_eval(expr: &str, json: &str) -> Result<()> {
    let metadata = parse_metadata(json)?;
    let expression = Expression::parse(expr)?;
    let value = expression.evaluate(&metadata, &mut RegexCache::default())?;
    println!("{}", value.repr());
    Ok(())
}
