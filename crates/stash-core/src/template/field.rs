//! Compiled replacement fields: access chain, conversion and format directive.

use std::borrow::Cow;

use super::spec::Spec;
use super::FormatError;
use crate::value::{Metadata, Value};

/// One step of a field's access chain.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Key(String),
    Index(i64),
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
}

/// `!x` conversion applied after the access chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conversion {
    Lower,
    Upper,
    Capitalize,
    CapWords,
    Unquote,
    Stringify,
    Str,
    Repr,
    Ascii,
}

/// What happens to the resolved value before it lands in the output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Directive {
    Format(Spec),
    Optional {
        before: String,
        after: String,
        spec: Spec,
    },
    MaxLen {
        max: usize,
        replacement: String,
        spec: Spec,
    },
    Join {
        separator: String,
        spec: Spec,
    },
    Replace {
        old: String,
        new: String,
        spec: Spec,
    },
}

/// A precompiled replacement field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Field {
    pub(crate) key: String,
    pub(crate) steps: Vec<Step>,
    pub(crate) conversion: Option<Conversion>,
    pub(crate) directive: Directive,
}

impl Field {
    /// Render this field; any lookup or conversion failure uses `default`.
    pub(crate) fn render(&self, metadata: &Metadata, default: Option<&Value>) -> String {
        let resolved = self.resolve(metadata);
        let value = match &resolved {
            Some(v) => Some(v.as_ref()),
            None => default,
        };
        self.directive.apply(value)
    }

    fn resolve<'a>(&self, metadata: &'a Metadata) -> Option<Cow<'a, Value>> {
        let mut current = Cow::Borrowed(metadata.get(&self.key)?);
        for step in &self.steps {
            current = match (step, current) {
                (Step::Key(key), Cow::Borrowed(v)) => Cow::Borrowed(v.get(key)?),
                (Step::Key(key), Cow::Owned(v)) => Cow::Owned(v.get(key)?.clone()),
                (Step::Index(i), Cow::Borrowed(v)) => v.index(*i)?,
                (Step::Index(i), Cow::Owned(v)) => Cow::Owned(v.index(*i)?.into_owned()),
                (Step::Slice { start, stop, step: stride }, v) => {
                    Cow::Owned(v.slice(*start, *stop, *stride)?)
                }
            };
        }
        match self.conversion {
            Some(conversion) => conversion.apply(&current).map(Cow::Owned),
            None => Some(current),
        }
    }
}

impl Conversion {
    pub(crate) fn from_char(c: char) -> Result<Self, FormatError> {
        Ok(match c {
            'l' => Conversion::Lower,
            'u' => Conversion::Upper,
            'c' => Conversion::Capitalize,
            'C' => Conversion::CapWords,
            'U' => Conversion::Unquote,
            'S' => Conversion::Stringify,
            's' => Conversion::Str,
            'r' => Conversion::Repr,
            'a' => Conversion::Ascii,
            other => return Err(FormatError::UnknownConversion(other)),
        })
    }

    /// String conversions only accept strings; `None` means "use the default".
    fn apply(self, value: &Value) -> Option<Value> {
        let converted = match self {
            Conversion::Lower => value.as_str()?.to_lowercase(),
            Conversion::Upper => value.as_str()?.to_uppercase(),
            Conversion::Capitalize => capitalize(value.as_str()?),
            Conversion::CapWords => value
                .as_str()?
                .split_whitespace()
                .map(capitalize)
                .collect::<Vec<_>>()
                .join(" "),
            Conversion::Unquote => percent_decode(value.as_str()?),
            Conversion::Stringify => stringify(value),
            Conversion::Str => value.to_string(),
            Conversion::Repr => value.repr(),
            Conversion::Ascii => value.ascii_repr(),
        };
        Some(Value::Str(converted))
    }
}

impl Directive {
    /// Build a directive from the text after `:`.
    pub(crate) fn parse(spec: &str) -> Result<Self, FormatError> {
        let bad = |reason| FormatError::Spec {
            spec: spec.to_string(),
            reason,
        };
        let Some(first) = spec.chars().next() else {
            return Ok(Directive::Format(Spec::Empty));
        };
        let rest = &spec[first.len_utf8()..];
        match first {
            '?' => {
                let (before, after, tail) =
                    split3(rest).ok_or_else(|| bad("expected '?<before>/<after>/'"))?;
                Ok(Directive::Optional {
                    before: before.to_string(),
                    after: after.to_string(),
                    spec: Spec::parse(tail)?,
                })
            }
            'L' => {
                let (max, replacement, tail) =
                    split3(rest).ok_or_else(|| bad("expected 'L<maxlen>/<replacement>/'"))?;
                let max = max
                    .trim()
                    .parse()
                    .map_err(|_| bad("maximum length is not an integer"))?;
                Ok(Directive::MaxLen {
                    max,
                    replacement: replacement.to_string(),
                    spec: Spec::parse(tail)?,
                })
            }
            'J' => {
                let (separator, tail) = rest.split_once('/').unwrap_or((rest, ""));
                Ok(Directive::Join {
                    separator: separator.to_string(),
                    spec: Spec::parse(tail)?,
                })
            }
            'R' => {
                let (old, new, tail) =
                    split3(rest).ok_or_else(|| bad("expected 'R<old>/<new>/'"))?;
                Ok(Directive::Replace {
                    old: old.to_string(),
                    new: new.to_string(),
                    spec: Spec::parse(tail)?,
                })
            }
            _ => Ok(Directive::Format(Spec::parse(spec)?)),
        }
    }

    fn apply(&self, value: Option<&Value>) -> String {
        match self {
            Directive::Format(spec) => spec.apply(value),
            Directive::Optional { before, after, spec } => match value {
                Some(v) if v.is_truthy() => format!("{before}{}{after}", spec.apply(Some(v))),
                _ => String::new(),
            },
            Directive::MaxLen {
                max,
                replacement,
                spec,
            } => {
                let out = spec.apply(value);
                if out.chars().count() > *max {
                    replacement.clone()
                } else {
                    out
                }
            }
            Directive::Join { separator, spec } => {
                let joined = match value {
                    Some(Value::List(items)) => items
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(separator),
                    Some(Value::Str(s)) => s
                        .chars()
                        .map(String::from)
                        .collect::<Vec<_>>()
                        .join(separator),
                    Some(other) => other.to_string(),
                    None => "None".to_string(),
                };
                spec.apply_str(&joined)
            }
            Directive::Replace { old, new, spec } => {
                let s = match value {
                    Some(v) => v.to_string(),
                    None => "None".to_string(),
                };
                let replaced = if old.is_empty() { s } else { s.replace(old.as_str(), new) };
                spec.apply_str(&replaced)
            }
        }
    }
}

/// `a/b/rest` -> (a, b, rest). Requires both slashes.
fn split3(s: &str) -> Option<(&str, &str, &str)> {
    let (a, rest) = s.split_once('/')?;
    let (b, rest) = rest.split_once('/')?;
    Some((a, b, rest))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Falsy values become empty; sequences are joined with `", "`.
fn stringify(value: &Value) -> String {
    if !value.is_truthy() {
        return String::new();
    }
    match value {
        Value::List(items) => items
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Percent-decode (`%20` -> space); invalid escapes are kept verbatim and
/// invalid UTF-8 is replaced.
pub(crate) fn percent_decode(input: &str) -> String {
    let mut out = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(high << 4 | low);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
