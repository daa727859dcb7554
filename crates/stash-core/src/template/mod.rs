//! Metadata-driven string templates.
//!
//! A template such as `{category}/{id:>05}_{title!l:L40/long/}.{extension}`
//! is compiled once into literal fragments and precompiled fields, then
//! rendered against any number of [`Metadata`] maps without re-parsing.
//!
//! Field syntax is `{path!conversion:spec}`:
//!
//! - `path`: a top-level key followed by `.name` or `[key]` steps; `[n]`
//!   indexes sequences (negative from the end), `[a:b:c]` slices.
//! - `conversion`: `l` lower, `u` upper, `c` capitalize, `C` capitalize
//!   words, `U` percent-decode, `S` stringify lists, `s` string, `r` repr,
//!   `a` ASCII repr.
//! - `spec`: `?before/after/`, `Lmax/replacement/`, `Jseparator/`,
//!   `Rold/new/` or a standard format spec; the directive forms take a
//!   trailing standard spec after their last `/`.
//!
//! A field whose path cannot be resolved renders the template's default.

mod field;
mod spec;

use thiserror::Error;

use crate::value::{Metadata, Value};
use field::{Conversion, Directive, Field, Step};

/// Template compilation failure. Setup-time only; rendering never fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("single '{{' encountered in template")]
    UnmatchedOpen,
    #[error("single '}}' encountered in template")]
    UnmatchedClose,
    #[error("empty field name")]
    EmptyField,
    #[error("invalid field name {0:?}: {1}")]
    FieldName(String, &'static str),
    #[error("unknown conversion specifier '!{0}'")]
    UnknownConversion(char),
    #[error("expected ':' after conversion specifier in {0:?}")]
    ConversionSyntax(String),
    #[error("invalid format spec {spec:?}: {reason}")]
    Spec { spec: String, reason: &'static str },
}

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    default: Option<Value>,
    body: Body,
}

#[derive(Debug, Clone)]
enum Body {
    Literal(String),
    Single(Field),
    Pieces(Vec<Piece>),
}

#[derive(Debug, Clone)]
enum Piece {
    Literal(String),
    Field(Field),
}

impl Template {
    /// Compile `source`. Unresolvable fields render `default` at render time
    /// (`None` renders as the string `None`).
    pub fn compile(source: &str, default: Option<Value>) -> Result<Self, FormatError> {
        let mut pieces = parse_pieces(source)?;
        let body = match pieces.len() {
            0 => Body::Literal(String::new()),
            1 => match pieces.pop() {
                Some(Piece::Field(field)) => Body::Single(field),
                Some(Piece::Literal(text)) => Body::Literal(text),
                None => Body::Literal(String::new()),
            },
            _ => Body::Pieces(pieces),
        };
        Ok(Template {
            source: source.to_string(),
            default,
            body,
        })
    }

    /// Render against `metadata`.
    pub fn render(&self, metadata: &Metadata) -> String {
        let default = self.default.as_ref();
        match &self.body {
            Body::Literal(text) => text.clone(),
            Body::Single(field) => field.render(metadata, default),
            Body::Pieces(pieces) => {
                let mut out = String::new();
                for piece in pieces {
                    match piece {
                        Piece::Literal(text) => out.push_str(text),
                        Piece::Field(field) => out.push_str(&field.render(metadata, default)),
                    }
                }
                out
            }
        }
    }

    /// The template text this was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Split `source` into literal text and compiled fields (`{{`/`}}` escape braces).
fn parse_pieces(source: &str) -> Result<Vec<Piece>, FormatError> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(FormatError::UnmatchedClose),
            '{' => {
                let body_start = start + 1;
                let mut depth = 1usize;
                let mut brackets = 0usize;
                let mut end = None;
                for (i, c) in chars.by_ref() {
                    match c {
                        '[' => brackets += 1,
                        ']' => brackets = brackets.saturating_sub(1),
                        '{' => depth += 1,
                        '}' if brackets == 0 || depth > 1 => {
                            depth -= 1;
                            if depth == 0 {
                                end = Some(i);
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                let end = end.ok_or(FormatError::UnmatchedOpen)?;
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Field(parse_field(&source[body_start..end])?));
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

/// Compile the text between the braces of one replacement field.
fn parse_field(text: &str) -> Result<Field, FormatError> {
    // The field name ends at the first '!' or ':' outside brackets.
    let mut brackets = 0usize;
    let mut name_end = text.len();
    for (i, c) in text.char_indices() {
        match c {
            '[' => brackets += 1,
            ']' => brackets = brackets.saturating_sub(1),
            '!' | ':' if brackets == 0 => {
                name_end = i;
                break;
            }
            _ => {}
        }
    }
    let (name, rest) = text.split_at(name_end);

    let (conversion, spec) = match rest.strip_prefix('!') {
        Some(conv) => {
            let mut it = conv.chars();
            let c = it.next().ok_or_else(|| FormatError::ConversionSyntax(text.to_string()))?;
            let after = it.as_str();
            let spec = match after.strip_prefix(':') {
                Some(spec) => spec,
                None if after.is_empty() => "",
                None => return Err(FormatError::ConversionSyntax(text.to_string())),
            };
            (Some(Conversion::from_char(c)?), spec)
        }
        None => (None, rest.strip_prefix(':').unwrap_or("")),
    };

    let (key, steps) = parse_field_name(name)?;
    Ok(Field {
        key,
        steps,
        conversion,
        directive: Directive::parse(spec)?,
    })
}

fn parse_field_name(name: &str) -> Result<(String, Vec<Step>), FormatError> {
    let bad = |reason| FormatError::FieldName(name.to_string(), reason);
    let first_end = name.find(['.', '[']).unwrap_or(name.len());
    let key = &name[..first_end];
    if key.is_empty() {
        return Err(FormatError::EmptyField);
    }

    let mut steps = Vec::new();
    let mut rest = &name[first_end..];
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            if end == 0 {
                return Err(bad("empty attribute in field name"));
            }
            steps.push(Step::Key(after[..end].to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']').ok_or_else(|| bad("missing ']' in field name"))?;
            let inner = &after[..end];
            if inner.is_empty() {
                return Err(bad("empty subscript in field name"));
            }
            steps.push(parse_subscript(inner).ok_or_else(|| bad("invalid slice"))?);
            rest = &after[end + 1..];
            if !rest.is_empty() && !rest.starts_with(['.', '[']) {
                return Err(bad("only '.' or '[' may follow ']' in field name"));
            }
        } else {
            return Err(bad("unexpected character in field name"));
        }
    }
    Ok((key.to_string(), steps))
}

/// `[3]`, `[-1]` -> index; `[a:b:c]` -> slice; anything else -> mapping key.
fn parse_subscript(inner: &str) -> Option<Step> {
    if inner.contains(':') {
        let mut parts = inner.splitn(3, ':');
        let mut bound = || -> Option<Option<i64>> {
            match parts.next().map(str::trim) {
                None | Some("") => Some(None),
                Some(n) => n.parse().ok().map(Some),
            }
        };
        let start = bound()?;
        let stop = bound()?;
        let step = bound()?;
        return Some(Step::Slice { start, stop, step });
    }
    Some(match inner.parse::<i64>() {
        Ok(i) => Step::Index(i),
        Err(_) => Step::Key(inner.to_string()),
    })
}

#[cfg(test)]
mod tests;
