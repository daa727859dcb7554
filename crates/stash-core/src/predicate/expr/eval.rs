//! Tree-walking evaluator.

use std::cmp::Ordering;

use super::builtins::{self, Builtin, MatchObject};
use super::parser::{BinOp, CmpOp, Expr};
use super::{ExprError, RegexCache};
use crate::value::{Metadata, Value};

/// Runtime object: a metadata value or one of the few non-value things an
/// expression can produce.
#[derive(Debug, Clone)]
pub(crate) enum Obj {
    Value(Value),
    Builtin(Builtin),
    /// The `re` namespace.
    ReModule,
    Match(MatchObject),
    /// A method looked up on a receiver, waiting to be called.
    Method(Box<Obj>, String),
}

impl Obj {
    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            Obj::Value(v) => v.is_truthy(),
            _ => true,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Obj::Value(v) => v.kind(),
            Obj::Builtin(_) | Obj::Method(..) => "function",
            Obj::ReModule => "module",
            Obj::Match(_) => "re.Match",
        }
    }

    pub(crate) fn into_value(self) -> Result<Value, ExprError> {
        match self {
            Obj::Value(v) => Ok(v),
            other => Err(ExprError::type_error(format!(
                "{} object has no value form",
                other.kind()
            ))),
        }
    }
}

impl From<Value> for Obj {
    fn from(v: Value) -> Self {
        Obj::Value(v)
    }
}

pub(crate) struct Evaluator<'a> {
    metadata: &'a Metadata,
    pub(crate) regexes: &'a mut RegexCache,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(metadata: &'a Metadata, regexes: &'a mut RegexCache) -> Self {
        Evaluator { metadata, regexes }
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Obj, ExprError> {
        match expr {
            Expr::Literal(v) => Ok(Obj::Value(v.clone())),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item)?.into_value())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Obj::Value(Value::List(values)))
            }
            Expr::Attr(target, name) => {
                let target = self.eval(target)?;
                attribute(target, name)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?.into_value()?;
                subscript(target, &index)
            }
            Expr::Slice {
                target,
                start,
                stop,
                step,
            } => {
                let target = self.eval(target)?.into_value()?;
                let start = self.bound(start.as_deref())?;
                let stop = self.bound(stop.as_deref())?;
                let step = self.bound(step.as_deref())?;
                if step == Some(0) {
                    return Err(ExprError::Value("slice step cannot be zero".into()));
                }
                target
                    .slice(start, stop, step)
                    .map(Obj::Value)
                    .ok_or_else(|| {
                        ExprError::type_error(format!("{} object is not subscriptable", target.kind()))
                    })
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args)
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.is_truthy()).into()),
            Expr::Neg(inner) => match self.eval(inner)?.into_value()? {
                Value::Int(i) => i.checked_neg().map(Value::Int).map(Obj::Value).ok_or(ExprError::Overflow),
                Value::Bool(b) => Ok(Value::Int(-i64::from(b)).into()),
                Value::Float(f) => Ok(Value::Float(-f).into()),
                other => Err(ExprError::type_error(format!(
                    "bad operand type for unary -: '{}'",
                    other.kind()
                ))),
            },
            Expr::Pos(inner) => {
                let v = self.eval(inner)?.into_value()?;
                match v {
                    Value::Int(_) | Value::Float(_) => Ok(Obj::Value(v)),
                    Value::Bool(b) => Ok(Value::Int(i64::from(b)).into()),
                    other => Err(ExprError::type_error(format!(
                        "bad operand type for unary +: '{}'",
                        other.kind()
                    ))),
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?.into_value()?;
                let right = self.eval(right)?.into_value()?;
                arithmetic(*op, &left, &right).map(Obj::Value)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, right) in rest {
                    let right = self.eval(right)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false).into());
                    }
                    left = right;
                }
                Ok(Value::Bool(true).into())
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Obj, ExprError> {
        if let Some(v) = self.metadata.get(name) {
            return Ok(Obj::Value(v.clone()));
        }
        if name == "re" {
            return Ok(Obj::ReModule);
        }
        Builtin::from_name(name)
            .map(Obj::Builtin)
            .ok_or_else(|| ExprError::Name(name.to_string()))
    }

    fn bound(&mut self, expr: Option<&Expr>) -> Result<Option<i64>, ExprError> {
        let Some(expr) = expr else { return Ok(None) };
        match self.eval(expr)?.into_value()? {
            Value::Null => Ok(None),
            v => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| ExprError::type_error("slice indices must be integers or None")),
        }
    }

    fn call(&mut self, callee: Obj, args: Vec<Obj>) -> Result<Obj, ExprError> {
        match callee {
            Obj::Builtin(builtin) => builtins::call(self, builtin, args),
            Obj::Method(receiver, name) => builtins::call_method(*receiver, &name, args),
            other => Err(ExprError::type_error(format!(
                "{} object is not callable",
                other.kind()
            ))),
        }
    }
}

fn attribute(target: Obj, name: &str) -> Result<Obj, ExprError> {
    let missing = |kind| ExprError::Attribute {
        kind,
        name: name.to_string(),
    };
    match target {
        Obj::ReModule => Builtin::from_re_name(name)
            .map(Obj::Builtin)
            .ok_or_else(|| missing("module")),
        Obj::Value(v) => {
            if let Some(found) = v.get(name) {
                return Ok(Obj::Value(found.clone()));
            }
            if let Value::Timestamp(ts) = &v {
                if let Some(field) = builtins::timestamp_field(ts, name) {
                    return Ok(Obj::Value(field));
                }
            }
            if builtins::has_method(&v, name) {
                Ok(Obj::Method(Box::new(Obj::Value(v)), name.to_string()))
            } else {
                Err(missing(v.kind()))
            }
        }
        Obj::Match(m) if builtins::MATCH_METHODS.contains(&name) => {
            Ok(Obj::Method(Box::new(Obj::Match(m)), name.to_string()))
        }
        other => Err(missing(other.kind())),
    }
}

fn subscript(target: Obj, index: &Value) -> Result<Obj, ExprError> {
    match (target, index) {
        (Obj::Value(Value::Map(map)), key) => {
            let key = match key {
                Value::Str(s) => s.clone(),
                other => other.to_string(),
            };
            map.get(&key)
                .cloned()
                .map(Obj::Value)
                .ok_or(ExprError::Key(key))
        }
        (Obj::Value(v @ (Value::List(_) | Value::Str(_))), index) => {
            let i = index.as_i64().ok_or_else(|| {
                ExprError::type_error(format!("{} indices must be integers", v.kind()))
            })?;
            v.index(i)
                .map(|found| Obj::Value(found.into_owned()))
                .ok_or(ExprError::Index)
        }
        (Obj::Match(m), index) => builtins::match_group(&m, index).map(Obj::Value),
        (other, _) => Err(ExprError::type_error(format!(
            "{} object is not subscriptable",
            other.kind()
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn as_float(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

pub(crate) fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    if let (Some(a), Some(b)) = (num(left), num(right)) {
        return numeric(op, a, b);
    }
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if num_int(n).is_some() => {
            let times = repeat_count(s.len(), n)?;
            Ok(Value::Str(s.repeat(times)))
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if num_int(n).is_some() =>
        {
            let times = repeat_count(items.len(), n)?;
            Ok(Value::List(
                std::iter::repeat(items.iter().cloned()).take(times).flatten().collect(),
            ))
        }
        _ => Err(ExprError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            symbol(op),
            left.kind(),
            right.kind()
        ))),
    }
}

/// Longest string (in bytes) or list a repetition may build.
const MAX_REPEAT_LEN: usize = 1 << 24;

/// Repetition count for `seq * n`; non-positive counts give an empty result.
fn repeat_count(len: usize, n: &Value) -> Result<usize, ExprError> {
    let n = num_int(n).unwrap_or(0);
    if n <= 0 || len == 0 {
        return Ok(0);
    }
    let times = usize::try_from(n).map_err(|_| ExprError::Overflow)?;
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(ExprError::Overflow),
    }
}

fn num_int(v: &Value) -> Option<i64> {
    match num(v)? {
        Num::Int(i) => Some(i),
        Num::Float(_) => None,
    }
}

fn numeric(op: BinOp, a: Num, b: Num) -> Result<Value, ExprError> {
    if let (Num::Int(a), Num::Int(b)) = (a, b) {
        let result = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return Err(ExprError::ZeroDivision);
                }
                return Ok(Value::Float(a as f64 / b as f64));
            }
            BinOp::FloorDiv => {
                if b == 0 {
                    return Err(ExprError::ZeroDivision);
                }
                a.checked_div(b).map(|q| {
                    if a % b != 0 && ((a < 0) != (b < 0)) {
                        q - 1
                    } else {
                        q
                    }
                })
            }
            BinOp::Mod => {
                if b == 0 {
                    return Err(ExprError::ZeroDivision);
                }
                a.checked_rem(b).map(|r| {
                    if r != 0 && ((r < 0) != (b < 0)) {
                        r + b
                    } else {
                        r
                    }
                })
            }
            BinOp::Pow => {
                if b < 0 {
                    return Ok(Value::Float((a as f64).powf(b as f64)));
                }
                u32::try_from(b).ok().and_then(|e| a.checked_pow(e))
            }
        };
        return result.map(Value::Int).ok_or(ExprError::Overflow);
    }

    let (a, b) = (as_float(a), as_float(b));
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => {
            return Err(ExprError::ZeroDivision)
        }
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Pow => a.powf(b),
    };
    Ok(Value::Float(result))
}

/// Equality with numeric cross-kind comparison (`1 == 1.0 == True`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (num(a), num(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
        (Some(x), Some(y)) => as_float(x) == as_float(y),
        _ => match (a, b) {
            (Value::List(x), Value::List(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q))
            }
            (Value::Map(x), Value::Map(y)) => {
                x.len() == y.len()
                    && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
            }
            _ => a == b,
        },
    }
}

pub(crate) fn order(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            _ => as_float(x).partial_cmp(&as_float(y)),
        };
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        (Value::List(x), Value::List(y)) => {
            for (p, q) in x.iter().zip(y) {
                if !values_equal(p, q) {
                    return order(p, q);
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => None,
    }
}

fn contains(container: &Obj, item: &Obj) -> Result<bool, ExprError> {
    let (Obj::Value(container), Obj::Value(item)) = (container, item) else {
        return Err(ExprError::type_error(format!(
            "argument of type '{}' is not iterable",
            container.kind()
        )));
    };
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(ExprError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.kind()
            ))),
        },
        Value::List(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Map(map) => Ok(item.as_str().is_some_and(|key| map.contains_key(key))),
        other => Err(ExprError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.kind()
        ))),
    }
}

fn compare(op: CmpOp, left: &Obj, right: &Obj) -> Result<bool, ExprError> {
    let ordered = |check: fn(Ordering) -> bool, symbol: &str| -> Result<bool, ExprError> {
        match (left, right) {
            (Obj::Value(a), Obj::Value(b)) => match order(a, b) {
                Some(ordering) => Ok(check(ordering)),
                None if matches!((num(a), num(b)), (Some(_), Some(_))) => Ok(false),
                None => Err(ExprError::type_error(format!(
                    "'{symbol}' not supported between instances of '{}' and '{}'",
                    a.kind(),
                    b.kind()
                ))),
            },
            _ => Err(ExprError::type_error(format!(
                "'{symbol}' not supported between instances of '{}' and '{}'",
                left.kind(),
                right.kind()
            ))),
        }
    };
    let equal = || match (left, right) {
        (Obj::Value(a), Obj::Value(b)) => values_equal(a, b),
        _ => false,
    };

    match op {
        CmpOp::Eq => Ok(equal()),
        CmpOp::Ne => Ok(!equal()),
        CmpOp::Lt => ordered(Ordering::is_lt, "<"),
        CmpOp::Le => ordered(Ordering::is_le, "<="),
        CmpOp::Gt => ordered(Ordering::is_gt, ">"),
        CmpOp::Ge => ordered(Ordering::is_ge, ">="),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Is => Ok(identical(left, right)),
        CmpOp::IsNot => Ok(!identical(left, right)),
    }
}

/// `is` only distinguishes the singletons `None`, `True` and `False`.
fn identical(left: &Obj, right: &Obj) -> bool {
    match (left, right) {
        (Obj::Value(Value::Null), Obj::Value(Value::Null)) => true,
        (Obj::Value(Value::Bool(a)), Obj::Value(Value::Bool(b))) => a == b,
        _ => false,
    }
}
