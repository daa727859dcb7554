//! The whitelisted functions and methods filter expressions may call.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use url::{Position, Url};

use super::eval::{order, values_equal, Evaluator, Obj};
use super::ExprError;
use crate::value::{Metadata, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    ParseInt,
    UrlSplit,
    Datetime,
    Abort,
    Len,
    Str,
    Int,
    Float,
    Bool,
    Abs,
    Min,
    Max,
    ReMatch,
    ReSearch,
    ReFullMatch,
}

impl Builtin {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "parse_int" => Builtin::ParseInt,
            "urlsplit" => Builtin::UrlSplit,
            "datetime" => Builtin::Datetime,
            "abort" => Builtin::Abort,
            "len" => Builtin::Len,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "bool" => Builtin::Bool,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            _ => return None,
        })
    }

    pub(crate) fn from_re_name(name: &str) -> Option<Self> {
        Some(match name {
            "match" => Builtin::ReMatch,
            "search" => Builtin::ReSearch,
            "fullmatch" => Builtin::ReFullMatch,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Builtin::ParseInt => "parse_int",
            Builtin::UrlSplit => "urlsplit",
            Builtin::Datetime => "datetime",
            Builtin::Abort => "abort",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::ReMatch => "re.match",
            Builtin::ReSearch => "re.search",
            Builtin::ReFullMatch => "re.fullmatch",
        }
    }
}

/// Captured groups of a successful `re.match` / `re.search`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MatchObject {
    groups: Vec<Option<String>>,
    names: Vec<Option<String>>,
    start: usize,
    end: usize,
}

pub(crate) const MATCH_METHODS: &[&str] = &["group", "groups", "start", "end"];

fn arity(name: &str, args: &[Obj], min: usize, max: usize) -> Result<(), ExprError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(ExprError::type_error(format!(
            "{name}() takes {expected} argument(s) ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn values(args: Vec<Obj>) -> Result<Vec<Value>, ExprError> {
    args.into_iter().map(Obj::into_value).collect()
}

fn string_arg<'v>(func: &str, v: &'v Value) -> Result<&'v str, ExprError> {
    v.as_str().ok_or_else(|| {
        ExprError::type_error(format!("{func}() expected string, got {}", v.kind()))
    })
}

pub(crate) fn call(ev: &mut Evaluator<'_>, builtin: Builtin, args: Vec<Obj>) -> Result<Obj, ExprError> {
    let name = builtin.name();
    match builtin {
        Builtin::Abort => {
            arity(name, &args, 0, 0)?;
            Err(ExprError::Abort)
        }
        Builtin::ParseInt => {
            arity(name, &args, 1, 2)?;
            let mut args = values(args)?.into_iter();
            let value = args.next().unwrap_or(Value::Null);
            let default = args.next().unwrap_or(Value::Int(0));
            if !value.is_truthy() {
                return Ok(default.into());
            }
            Ok(to_int(&value).map(Value::Int).unwrap_or(default).into())
        }
        Builtin::UrlSplit => {
            arity(name, &args, 1, 1)?;
            let args = values(args)?;
            Ok(Value::Map(urlsplit(string_arg(name, &args[0])?)).into())
        }
        Builtin::Datetime => {
            arity(name, &args, 3, 6)?;
            let mut parts = [0i64; 6];
            for (slot, v) in parts.iter_mut().zip(values(args)?) {
                *slot = v.as_i64().ok_or_else(|| {
                    ExprError::type_error(format!("datetime() expected integer, got {}", v.kind()))
                })?;
            }
            datetime(parts).map(|ts| Value::Timestamp(ts).into())
        }
        Builtin::Len => {
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Obj::Value(Value::Str(s)) => s.chars().count(),
                Obj::Value(Value::List(items)) => items.len(),
                Obj::Value(Value::Map(map)) => map.len(),
                Obj::Match(m) => m.groups.len(),
                other => {
                    return Err(ExprError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.kind()
                    )))
                }
            };
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)).into())
        }
        Builtin::Str => {
            arity(name, &args, 0, 1)?;
            let s = match args.into_iter().next() {
                Some(Obj::Value(v)) => v.to_string(),
                Some(other) => format!("<{}>", other.kind()),
                None => String::new(),
            };
            Ok(Value::Str(s).into())
        }
        Builtin::Int => {
            arity(name, &args, 0, 1)?;
            let Some(v) = values(args)?.into_iter().next() else {
                return Ok(Value::Int(0).into());
            };
            to_int(&v)
                .map(|i| Value::Int(i).into())
                .ok_or_else(|| ExprError::Value(format!("invalid literal for int(): {}", v.repr())))
        }
        Builtin::Float => {
            arity(name, &args, 0, 1)?;
            let Some(v) = values(args)?.into_iter().next() else {
                return Ok(Value::Float(0.0).into());
            };
            let f = match &v {
                Value::Str(s) => s.trim().parse::<f64>().ok(),
                other => other.as_f64(),
            };
            f.map(|f| Value::Float(f).into())
                .ok_or_else(|| ExprError::Value(format!("could not convert to float: {}", v.repr())))
        }
        Builtin::Bool => {
            arity(name, &args, 0, 1)?;
            let truthy = args.first().is_some_and(Obj::is_truthy);
            Ok(Value::Bool(truthy).into())
        }
        Builtin::Abs => {
            arity(name, &args, 1, 1)?;
            match values(args)?.remove(0) {
                Value::Int(i) => i.checked_abs().map(|i| Value::Int(i).into()).ok_or(ExprError::Overflow),
                Value::Bool(b) => Ok(Value::Int(i64::from(b)).into()),
                Value::Float(f) => Ok(Value::Float(f.abs()).into()),
                other => Err(ExprError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.kind()
                ))),
            }
        }
        Builtin::Min | Builtin::Max => {
            let mut items = values(args)?;
            if items.len() == 1 {
                match items.pop() {
                    Some(Value::List(inner)) => items = inner,
                    Some(other) => {
                        return Err(ExprError::type_error(format!(
                            "'{}' object is not iterable",
                            other.kind()
                        )))
                    }
                    None => {}
                }
            }
            extreme(name, items, builtin == Builtin::Max).map(Obj::Value)
        }
        Builtin::ReMatch | Builtin::ReSearch | Builtin::ReFullMatch => {
            arity(name, &args, 2, 2)?;
            let args = values(args)?;
            let pattern = string_arg(name, &args[0])?;
            let subject = string_arg(name, &args[1])?;
            let source = match builtin {
                Builtin::ReMatch => format!(r"\A(?:{pattern})"),
                Builtin::ReFullMatch => format!(r"\A(?:{pattern})\z"),
                _ => pattern.to_string(),
            };
            let regex = ev.regexes.get(source)?;
            let Some(caps) = regex.captures(subject) else {
                return Ok(Value::Null.into());
            };
            let whole = caps.get(0);
            Ok(Obj::Match(MatchObject {
                groups: caps
                    .iter()
                    .map(|g| g.map(|m| m.as_str().to_string()))
                    .collect(),
                names: regex.capture_names().map(|n| n.map(str::to_string)).collect(),
                start: whole.map_or(0, |m| subject[..m.start()].chars().count()),
                end: whole.map_or(0, |m| subject[..m.end()].chars().count()),
            }))
        }
    }
}

fn extreme(name: &str, items: Vec<Value>, max: bool) -> Result<Value, ExprError> {
    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| ExprError::Value(format!("{name}() arg is an empty sequence")))?;
    for item in iter {
        let ordering = order(&item, &best).ok_or_else(|| {
            ExprError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                item.kind(),
                best.kind()
            ))
        })?;
        if (max && ordering.is_gt()) || (!max && ordering.is_lt()) {
            best = item;
        }
    }
    Ok(best)
}

/// Integer conversion: ints, bools, truncated floats and trimmed decimal strings.
fn to_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Float(f) if f.is_finite() && f.abs() < 9.2e18 => Some(f.trunc() as i64),
        Value::Str(s) => s.trim().replace('_', "").parse().ok(),
        _ => None,
    }
}

fn datetime(parts: [i64; 6]) -> Result<DateTime<Utc>, ExprError> {
    let [year, month, day, hour, minute, second] = parts;
    let field = |v: i64| u32::try_from(v).ok();
    i32::try_from(year)
        .ok()
        .zip(field(month).zip(field(day)))
        .and_then(|(y, (m, d))| NaiveDate::from_ymd_opt(y, m, d))
        .and_then(|date| {
            date.and_hms_opt(field(hour)?, field(minute)?, field(second)?)
        })
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ExprError::Value("datetime() argument out of range".to_string()))
}

/// Split a URL into `scheme`, `netloc`, `path`, `query` and `fragment`, plus
/// `hostname` and `port` when the URL has an authority.
pub(crate) fn urlsplit(input: &str) -> Metadata {
    let mut parts = Metadata::new();
    let mut put = |key: &str, value: Value| {
        parts.insert(key.to_string(), value);
    };

    if let Ok(url) = Url::parse(input) {
        put("scheme", Value::from(url.scheme()));
        put(
            "netloc",
            Value::from(&url[Position::BeforeUsername..Position::AfterPort]),
        );
        put("path", Value::from(url.path()));
        put("query", Value::from(url.query().unwrap_or("")));
        put("fragment", Value::from(url.fragment().unwrap_or("")));
        put("hostname", url.host_str().map_or(Value::Null, |h| Value::from(h.to_lowercase())));
        put("port", url.port().map_or(Value::Null, |p| Value::Int(i64::from(p))));
        return parts;
    }

    // Relative references: no scheme or authority.
    let (rest, fragment) = input.split_once('#').unwrap_or((input, ""));
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    put("scheme", Value::from(""));
    put("netloc", Value::from(""));
    put("path", Value::from(path));
    put("query", Value::from(query));
    put("fragment", Value::from(fragment));
    put("hostname", Value::Null);
    put("port", Value::Null);
    parts
}

pub(crate) fn timestamp_field(ts: &DateTime<Utc>, name: &str) -> Option<Value> {
    let v = match name {
        "year" => i64::from(ts.year()),
        "month" => i64::from(ts.month()),
        "day" => i64::from(ts.day()),
        "hour" => i64::from(ts.hour()),
        "minute" => i64::from(ts.minute()),
        "second" => i64::from(ts.second()),
        _ => return None,
    };
    Some(Value::Int(v))
}

const STR_METHODS: &[&str] = &[
    "lower", "upper", "strip", "lstrip", "rstrip", "startswith", "endswith", "split", "replace",
    "find", "count", "isdigit", "isalpha", "title",
];
const LIST_METHODS: &[&str] = &["count", "index"];
const MAP_METHODS: &[&str] = &["get", "keys", "values", "items"];
const TIMESTAMP_METHODS: &[&str] = &["timestamp", "strftime", "weekday"];

pub(crate) fn has_method(receiver: &Value, name: &str) -> bool {
    let table = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Map(_) => MAP_METHODS,
        Value::Timestamp(_) => TIMESTAMP_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

pub(crate) fn call_method(receiver: Obj, name: &str, args: Vec<Obj>) -> Result<Obj, ExprError> {
    match receiver {
        Obj::Match(m) => match_method(&m, name, values(args)?),
        Obj::Value(Value::Str(s)) => str_method(&s, name, values(args)?).map(Obj::Value),
        Obj::Value(Value::List(items)) => list_method(&items, name, values(args)?).map(Obj::Value),
        Obj::Value(Value::Map(map)) => map_method(&map, name, values(args)?).map(Obj::Value),
        Obj::Value(Value::Timestamp(ts)) => {
            timestamp_method(&ts, name, values(args)?).map(Obj::Value)
        }
        other => Err(ExprError::Attribute {
            kind: other.kind(),
            name: name.to_string(),
        }),
    }
}

fn method_arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExprError> {
    if args.len() < min || args.len() > max {
        return Err(ExprError::type_error(format!(
            "{name}() got {} argument(s)",
            args.len()
        )));
    }
    Ok(())
}

fn str_method(s: &str, name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    let text_arg = |i: usize| -> Result<&str, ExprError> { string_arg(name, &args[i]) };
    let strip_chars = |i: usize| -> Result<Option<Vec<char>>, ExprError> {
        match args.get(i) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => Ok(Some(string_arg(name, v)?.chars().collect())),
        }
    };
    let out = match name {
        "lower" => Value::from(s.to_lowercase()),
        "upper" => Value::from(s.to_uppercase()),
        "title" => Value::from(title(s)),
        "isdigit" => Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_numeric())),
        "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "strip" | "lstrip" | "rstrip" => {
            method_arity(name, &args, 0, 1)?;
            let chars = strip_chars(0)?;
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            Value::from(match name {
                "lstrip" => s.trim_start_matches(matcher),
                "rstrip" => s.trim_end_matches(matcher),
                _ => s.trim_matches(matcher),
            })
        }
        "startswith" | "endswith" => {
            method_arity(name, &args, 1, 1)?;
            let candidates: Vec<&str> = match &args[0] {
                Value::List(items) => items
                    .iter()
                    .map(|v| string_arg(name, v))
                    .collect::<Result<_, _>>()?,
                v => vec![string_arg(name, v)?],
            };
            Value::Bool(candidates.iter().any(|c| {
                if name == "startswith" {
                    s.starts_with(c)
                } else {
                    s.ends_with(c)
                }
            }))
        }
        "split" => {
            method_arity(name, &args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Null) => s.split_whitespace().map(Value::from).collect(),
                Some(_) => {
                    let sep = text_arg(0)?;
                    if sep.is_empty() {
                        return Err(ExprError::Value("empty separator".to_string()));
                    }
                    s.split(sep).map(Value::from).collect()
                }
            };
            Value::List(parts)
        }
        "replace" => {
            method_arity(name, &args, 2, 2)?;
            Value::from(s.replace(text_arg(0)?, text_arg(1)?))
        }
        "find" => {
            method_arity(name, &args, 1, 1)?;
            let index = s
                .find(text_arg(0)?)
                .map_or(-1, |byte| s[..byte].chars().count() as i64);
            Value::Int(index)
        }
        "count" => {
            method_arity(name, &args, 1, 1)?;
            let needle = text_arg(0)?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Value::Int(n as i64)
        }
        _ => {
            return Err(ExprError::Attribute {
                kind: "str",
                name: name.to_string(),
            })
        }
    };
    Ok(out)
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if prev_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_cased = c.is_alphabetic();
    }
    out
}

fn list_method(items: &[Value], name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    method_arity(name, &args, 1, 1)?;
    let target = &args[0];
    match name {
        "count" => Ok(Value::Int(
            items.iter().filter(|v| values_equal(v, target)).count() as i64,
        )),
        "index" => items
            .iter()
            .position(|v| values_equal(v, target))
            .map(|i| Value::Int(i as i64))
            .ok_or_else(|| ExprError::Value(format!("{} is not in list", target.repr()))),
        _ => Err(ExprError::Attribute {
            kind: "list",
            name: name.to_string(),
        }),
    }
}

fn map_method(map: &Metadata, name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    match name {
        "get" => {
            method_arity(name, &args, 1, 2)?;
            let key = match &args[0] {
                Value::Str(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(map
                .get(&key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Null)))
        }
        "keys" => Ok(Value::List(map.keys().map(|k| Value::from(k.as_str())).collect())),
        "values" => Ok(Value::List(map.values().cloned().collect())),
        "items" => Ok(Value::List(
            map.iter()
                .map(|(k, v)| Value::List(vec![Value::from(k.as_str()), v.clone()]))
                .collect(),
        )),
        _ => Err(ExprError::Attribute {
            kind: "dict",
            name: name.to_string(),
        }),
    }
}

fn timestamp_method(ts: &DateTime<Utc>, name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    match name {
        "timestamp" => {
            method_arity(name, &args, 0, 0)?;
            Ok(Value::Float(
                ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9,
            ))
        }
        "weekday" => {
            method_arity(name, &args, 0, 0)?;
            Ok(Value::Int(i64::from(ts.weekday().num_days_from_monday())))
        }
        "strftime" => {
            method_arity(name, &args, 1, 1)?;
            let format = string_arg(name, &args[0])?;
            let items: Vec<_> = chrono::format::StrftimeItems::new(format).collect();
            if items.iter().any(|item| matches!(item, chrono::format::Item::Error)) {
                return Err(ExprError::Value(format!("invalid format string {format:?}")));
            }
            Ok(Value::Str(ts.format_with_items(items.into_iter()).to_string()))
        }
        _ => Err(ExprError::Attribute {
            kind: "datetime",
            name: name.to_string(),
        }),
    }
}

fn match_method(m: &MatchObject, name: &str, args: Vec<Value>) -> Result<Obj, ExprError> {
    match name {
        "group" => {
            method_arity(name, &args, 0, 1)?;
            let index = args.first().cloned().unwrap_or(Value::Int(0));
            match_group(m, &index).map(Obj::Value)
        }
        "groups" => {
            method_arity(name, &args, 0, 0)?;
            Ok(Value::List(
                m.groups
                    .iter()
                    .skip(1)
                    .map(|g| g.clone().map_or(Value::Null, Value::Str))
                    .collect(),
            )
            .into())
        }
        "start" => Ok(Value::Int(m.start as i64).into()),
        "end" => Ok(Value::Int(m.end as i64).into()),
        _ => Err(ExprError::Attribute {
            kind: "re.Match",
            name: name.to_string(),
        }),
    }
}

/// `m.group(n)`, `m.group("name")` and `m[n]`.
pub(crate) fn match_group(m: &MatchObject, index: &Value) -> Result<Value, ExprError> {
    let slot = match index {
        Value::Str(name) => m
            .names
            .iter()
            .position(|n| n.as_deref() == Some(name.as_str()))
            .ok_or_else(|| ExprError::Index)?,
        other => other
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or(ExprError::Index)?,
    };
    m.groups
        .get(slot)
        .map(|g| g.clone().map_or(Value::Null, Value::Str))
        .ok_or(ExprError::Index)
}
