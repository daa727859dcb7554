//! `stash render` – render a format string against metadata.

use anyhow::{Context, Result};
use stash_core::template::Template;
use stash_core::value::Value;

use super::parse_metadata;

pub fn run_render(template: &str, json: &str, default: Option<String>) -> Result<()> {
    let metadata = parse_metadata(json)?;
    let template = Template::compile(template, default.map(Value::from))
        .with_context(|| format!("invalid format string {template:?}"))?;
    println!("{}", template.render(&metadata));
    Ok(())
}
