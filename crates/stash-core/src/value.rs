//! Item metadata: a recursive tree of mappings, sequences and scalars.
//!
//! Collectors hand every discovered item to the core as a [`Metadata`] map.
//! Values render through templates, feed filter expressions and supply the
//! `extension` / `_mtime` keys the path machine reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Metadata describing one downloadable item.
pub type Metadata = BTreeMap<String, Value>;

/// A single metadata value.
///
/// Deserializes from plain JSON. Timestamps never come out of JSON (strings
/// stay strings); collectors construct them directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Metadata),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Empty strings and containers, zero, `false` and null are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Timestamp(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in filter error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Timestamp(_) => "datetime",
        }
    }

    /// Mapping key lookup. Fails on every non-mapping value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Sequence or string index lookup; negative indices count from the end.
    /// Mappings fall back to a lookup of the index's decimal key.
    pub fn index(&self, index: i64) -> Option<Cow<'_, Value>> {
        match self {
            Value::List(items) => {
                let i = absolute_index(index, items.len())?;
                items.get(i).map(Cow::Borrowed)
            }
            Value::Str(s) => {
                let len = s.chars().count();
                let i = absolute_index(index, len)?;
                s.chars().nth(i).map(|c| Cow::Owned(Value::Str(c.to_string())))
            }
            Value::Map(m) => m.get(&index.to_string()).map(Cow::Borrowed),
            _ => None,
        }
    }

    /// Slice a sequence or string with Python slice semantics.
    /// Returns `None` for a zero step or a non-sliceable value.
    pub fn slice(&self, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Option<Value> {
        match self {
            Value::List(items) => {
                let picked = slice_indices(items.len(), start, stop, step)?;
                Some(Value::List(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = slice_indices(chars.len(), start, stop, step)?;
                Some(Value::Str(picked.into_iter().map(|i| chars[i]).collect()))
            }
            _ => None,
        }
    }

    /// Quoted, escaped representation (`'text'`, `['a', 1]`).
    pub fn repr(&self) -> String {
        let mut out = String::new();
        write_repr(self, &mut out, false);
        out
    }

    /// Like [`Value::repr`] but with every non-ASCII character escaped.
    pub fn ascii_repr(&self) -> String {
        let mut out = String::new();
        write_repr(self, &mut out, true);
        out
    }
}

/// The plain string form: strings as-is, `None`, `True`/`False`, floats in
/// shortest round-trip form, containers in repr form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&float_repr(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            Value::List(_) | Value::Map(_) => f.write_str(&self.repr()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Metadata> for Value {
    fn from(map: Metadata) -> Self {
        Value::Map(map)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Recursively merge `other` into `base`: nested mappings present on both
/// sides are merged, everything else in `other` overwrites `base`.
pub fn combine(base: &mut Metadata, other: Metadata) {
    for (key, value) in other {
        match (base.get_mut(&key), value) {
            (Some(Value::Map(existing)), Value::Map(incoming)) => combine(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply `func` to every non-mapping value in `map`, descending into nested mappings.
pub fn transform<F>(map: &mut Metadata, func: &mut F)
where
    F: FnMut(&mut Value),
{
    for value in map.values_mut() {
        match value {
            Value::Map(nested) => transform(nested, func),
            other => func(other),
        }
    }
}

fn absolute_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let i = if index < 0 { index + len } else { index };
    if (0..len).contains(&i) {
        usize::try_from(i).ok()
    } else {
        None
    }
}

/// Indices selected by `[start:stop:step]` over a sequence of `len` elements.
fn slice_indices(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Option<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return None;
    }
    let len = i64::try_from(len).ok()?;
    let clamp = |i: i64| -> i64 {
        if i < 0 {
            let i = i + len;
            if i < 0 {
                if step < 0 {
                    -1
                } else {
                    0
                }
            } else {
                i
            }
        } else if i >= len {
            if step < 0 {
                len - 1
            } else {
                len
            }
        } else {
            i
        }
    };

    let (mut i, stop) = if step > 0 {
        (start.map_or(0, clamp), stop.map_or(len, clamp))
    } else {
        (start.map_or(len - 1, clamp), stop.map_or(-1, clamp))
    };

    let mut out = Vec::new();
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Some(out)
}

/// Shortest round-trip float form with an explicit `.0` for integral values
/// and a signed two-digit exponent for very large or small magnitudes.
pub(crate) fn float_repr(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        return normalize_exponent(&format!("{x:e}"));
    }
    let s = format!("{x}");
    if s.contains('.') {
        s
    } else {
        format!("{s}.0")
    }
}

/// Rewrite Rust's `1.5e-7` exponent form as `1.5e-07`.
pub(crate) fn normalize_exponent(s: &str) -> String {
    let Some(pos) = s.find(['e', 'E']) else {
        return s.to_string();
    };
    let (mantissa, rest) = s.split_at(pos);
    let marker = &rest[..1];
    let exp = &rest[1..];
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exp.trim_start_matches('+')),
    };
    format!("{mantissa}{marker}{sign}{digits:0>2}")
}

fn write_repr(value: &Value, out: &mut String, ascii: bool) {
    match value {
        Value::Str(s) => write_str_repr(s, out, ascii),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(item, out, ascii);
            }
            out.push(']');
        }
        Value::Map(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_str_repr(key, out, ascii);
                out.push_str(": ");
                write_repr(item, out, ascii);
            }
            out.push('}');
        }
        Value::Timestamp(ts) => {
            out.push_str(&ts.format("datetime.datetime(%Y, %-m, %-d, %-H, %-M, %-S)").to_string());
        }
        other => out.push_str(&other.to_string()),
    }
}

fn write_str_repr(s: &str, out: &mut String, ascii: bool) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() || (ascii && !c.is_ascii()) => {
                let code = c as u32;
                if code <= 0xff {
                    out.push_str(&format!("\\x{code:02x}"));
                } else if code <= 0xffff {
                    out.push_str(&format!("\\u{code:04x}"));
                } else {
                    out.push_str(&format!("\\U{code:08x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}
