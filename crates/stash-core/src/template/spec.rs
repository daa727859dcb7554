//! Standard format specs: `[[fill]align][sign][#][0][width][,|_][.precision][type]`.

use chrono::format::{Item, StrftimeItems};

use super::FormatError;
use crate::value::{float_repr, normalize_exponent, Value};

/// A parsed format spec, validated at compile time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Spec {
    /// No spec: the plain string form.
    Empty,
    Standard(StandardSpec),
    /// A `strftime` pattern; only meaningful for timestamps.
    Strftime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
    /// Padding goes between the sign and the digits.
    AfterSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Minus,
    Plus,
    Space,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StandardSpec {
    fill: char,
    align: Option<Align>,
    sign: Sign,
    alternate: bool,
    /// `0` flag: zero fill, sign-aware for numbers without explicit alignment.
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl Spec {
    pub(crate) fn parse(spec: &str) -> Result<Self, FormatError> {
        if spec.is_empty() {
            return Ok(Spec::Empty);
        }
        match StandardSpec::parse(spec) {
            Ok(standard) => Ok(Spec::Standard(standard)),
            Err(reason) if spec.contains('%') => {
                if StrftimeItems::new(spec).any(|item| matches!(item, Item::Error)) {
                    return Err(FormatError::Spec {
                        spec: spec.to_string(),
                        reason,
                    });
                }
                Ok(Spec::Strftime(spec.to_string()))
            }
            Err(reason) => Err(FormatError::Spec {
                spec: spec.to_string(),
                reason,
            }),
        }
    }

    /// Format `value` (absent when `None`). Never fails: a spec that does not
    /// fit the value's kind falls back to padding its string form.
    pub(crate) fn apply(&self, value: Option<&Value>) -> String {
        match self {
            Spec::Empty => display(value),
            Spec::Strftime(pattern) => match value {
                Some(Value::Timestamp(ts)) => ts.format(pattern).to_string(),
                other => display(other),
            },
            Spec::Standard(spec) => spec.apply(value),
        }
    }

    /// Format an already rendered string (after `J`/`R` directives).
    pub(crate) fn apply_str(&self, s: &str) -> String {
        match self {
            Spec::Standard(spec) => spec.format_str(s),
            Spec::Empty | Spec::Strftime(_) => s.to_string(),
        }
    }
}

fn display(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}

impl StandardSpec {
    fn parse(spec: &str) -> Result<Self, &'static str> {
        let chars: Vec<char> = spec.chars().collect();
        let mut pos = 0;
        let mut out = StandardSpec {
            fill: ' ',
            align: None,
            sign: Sign::Minus,
            alternate: false,
            zero: false,
            width: 0,
            grouping: None,
            precision: None,
            kind: None,
        };

        let align_of = |c: char| match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            '=' => Some(Align::AfterSign),
            _ => None,
        };

        let mut fill_specified = false;
        if chars.len() >= 2 {
            if let Some(align) = align_of(chars[1]) {
                out.fill = chars[0];
                out.align = Some(align);
                fill_specified = true;
                pos = 2;
            }
        }
        if out.align.is_none() {
            if let Some(align) = chars.first().copied().and_then(align_of) {
                out.align = Some(align);
                pos = 1;
            }
        }

        match chars.get(pos) {
            Some('+') => {
                out.sign = Sign::Plus;
                pos += 1;
            }
            Some('-') => pos += 1,
            Some(' ') => {
                out.sign = Sign::Space;
                pos += 1;
            }
            _ => {}
        }

        if chars.get(pos) == Some(&'#') {
            out.alternate = true;
            pos += 1;
        }

        if chars.get(pos) == Some(&'0') {
            if !fill_specified {
                out.fill = '0';
                out.zero = true;
            }
            pos += 1;
        }

        let (width, next) = read_number(&chars, pos);
        out.width = width.unwrap_or(0);
        pos = next;

        if let Some(c @ (',' | '_')) = chars.get(pos).copied() {
            out.grouping = Some(c);
            pos += 1;
        }

        if chars.get(pos) == Some(&'.') {
            let (precision, next) = read_number(&chars, pos + 1);
            if precision.is_none() {
                return Err("format specifier missing precision");
            }
            out.precision = precision;
            pos = next;
        }

        if let Some(&c) = chars.get(pos) {
            if !"sdbcoxXneEfFgG%".contains(c) {
                return Err("unknown format code");
            }
            out.kind = Some(c);
            pos += 1;
        }

        if pos != chars.len() {
            return Err("invalid format specifier");
        }
        Ok(out)
    }

    fn apply(&self, value: Option<&Value>) -> String {
        match (value, self.kind) {
            (Some(Value::Int(i)), None | Some('d' | 'n' | 'b' | 'o' | 'x' | 'X' | 'c')) => {
                self.format_int(*i)
            }
            (Some(Value::Int(i)), Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%')) => {
                self.format_float(*i as f64)
            }
            (Some(Value::Float(x)), None | Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%')) => {
                self.format_float(*x)
            }
            (Some(Value::Str(s)), None | Some('s')) => {
                let s = match self.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s.clone(),
                };
                self.pad(&s, Align::Left)
            }
            (other, _) => self.format_str(&display(other)),
        }
    }

    /// Pad a string form, honouring only fill, alignment and width.
    fn format_str(&self, s: &str) -> String {
        self.pad(s, Align::Left)
    }

    fn format_int(&self, i: i64) -> String {
        let negative = i < 0;
        let magnitude = i.unsigned_abs();
        let digits = match self.kind {
            Some('b') => format!("{}{magnitude:b}", if self.alternate { "0b" } else { "" }),
            Some('o') => format!("{}{magnitude:o}", if self.alternate { "0o" } else { "" }),
            Some('x') => format!("{}{magnitude:x}", if self.alternate { "0x" } else { "" }),
            Some('X') => format!("{}{magnitude:X}", if self.alternate { "0X" } else { "" }),
            Some('c') => {
                return self.pad(
                    &u32::try_from(i)
                        .ok()
                        .and_then(char::from_u32)
                        .map(String::from)
                        .unwrap_or_default(),
                    Align::Left,
                );
            }
            _ => group(&magnitude.to_string(), self.grouping),
        };
        self.pad_number(negative, &digits)
    }

    fn format_float(&self, x: f64) -> String {
        let negative = x.is_sign_negative() && !x.is_nan();
        let x = x.abs();
        let upper = matches!(self.kind, Some('E' | 'F' | 'G'));

        let mut body = if x.is_nan() {
            "nan".to_string()
        } else if x.is_infinite() {
            "inf".to_string()
        } else {
            match self.kind {
                Some('f' | 'F') => group_float(&format!("{:.*}", self.precision.unwrap_or(6), x), self.grouping),
                Some('e' | 'E') => normalize_exponent(&format!("{:.*e}", self.precision.unwrap_or(6), x)),
                Some('%') => format!("{:.*}%", self.precision.unwrap_or(6), x * 100.0),
                Some('g' | 'G') => general(x, self.precision.unwrap_or(6), self.alternate),
                _ => match self.precision {
                    Some(p) => {
                        let g = general(x, p, self.alternate);
                        if g.contains(['.', 'e']) {
                            g
                        } else {
                            format!("{g}.0")
                        }
                    }
                    None => float_repr(x),
                },
            }
        };
        if upper {
            body = body.to_uppercase();
        }
        self.pad_number(negative, &body)
    }

    fn pad_number(&self, negative: bool, digits: &str) -> String {
        let sign = match (negative, self.sign) {
            (true, _) => "-",
            (false, Sign::Plus) => "+",
            (false, Sign::Space) => " ",
            (false, Sign::Minus) => "",
        };
        let align = match self.align {
            None if self.zero => Some(Align::AfterSign),
            align => align,
        };
        if align == Some(Align::AfterSign) {
            let len = sign.chars().count() + digits.chars().count();
            let fill: String = std::iter::repeat(self.fill)
                .take(self.width.saturating_sub(len))
                .collect();
            return format!("{sign}{fill}{digits}");
        }
        self.pad(&format!("{sign}{digits}"), Align::Right)
    }

    fn pad(&self, s: &str, default_align: Align) -> String {
        let len = s.chars().count();
        if len >= self.width {
            return s.to_string();
        }
        let missing = self.width - len;
        let (left, right) = match self.align.unwrap_or(default_align) {
            Align::Left => (0, missing),
            Align::Right | Align::AfterSign => (missing, 0),
            Align::Center => (missing / 2, missing - missing / 2),
        };
        let mut out = String::with_capacity(s.len() + missing);
        out.extend(std::iter::repeat(self.fill).take(left));
        out.push_str(s);
        out.extend(std::iter::repeat(self.fill).take(right));
        out
    }
}

/// `%g`-style general format with `precision` significant digits.
fn general(x: f64, precision: usize, keep_zeros: bool) -> String {
    let p = precision.max(1);
    if x == 0.0 {
        return if keep_zeros {
            format!("{:.*}", p - 1, 0.0)
        } else {
            "0".to_string()
        };
    }
    let sci = format!("{:.*e}", p - 1, x);
    let exp: i64 = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    let out = if exp >= -4 && exp < p as i64 {
        let decimals = (p as i64 - 1 - exp).max(0) as usize;
        format!("{:.*}", decimals, x)
    } else {
        sci
    };
    let out = if keep_zeros { out } else { strip_zeros(&out) };
    normalize_exponent(&out)
}

fn strip_zeros(s: &str) -> String {
    let (mantissa, exp) = match s.find('e') {
        Some(pos) => s.split_at(pos),
        None => (s, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{mantissa}{exp}")
}

fn read_number(chars: &[char], mut pos: usize) -> (Option<usize>, usize) {
    let start = pos;
    let mut n: usize = 0;
    while let Some(d) = chars.get(pos).and_then(|c| c.to_digit(10)) {
        n = n.saturating_mul(10).saturating_add(d as usize);
        pos += 1;
    }
    if pos == start {
        (None, pos)
    } else {
        (Some(n), pos)
    }
}

fn group(digits: &str, separator: Option<char>) -> String {
    let Some(sep) = separator else {
        return digits.to_string();
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

fn group_float(s: &str, separator: Option<char>) -> String {
    match s.split_once('.') {
        Some((int, frac)) => format!("{}.{frac}", group(int, separator)),
        None => group(s, separator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(spec: &str, value: Value) -> String {
        Spec::parse(spec).unwrap().apply(Some(&value))
    }

    #[test]
    fn zero_padded_integers() {
        assert_eq!(fmt(">03", Value::Int(7)), "007");
        assert_eq!(fmt("03", Value::Int(-7)), "-07");
        assert_eq!(fmt("03d", Value::Int(1234)), "1234");
    }

    #[test]
    fn alignment_and_fill() {
        assert_eq!(fmt("<5", Value::from("ab")), "ab   ");
        assert_eq!(fmt(">5", Value::from("ab")), "   ab");
        assert_eq!(fmt("*^6", Value::from("ab")), "**ab**");
        assert_eq!(fmt("5", Value::Int(42)), "   42");
    }

    #[test]
    fn integer_kinds() {
        assert_eq!(fmt("x", Value::Int(255)), "ff");
        assert_eq!(fmt("#X", Value::Int(255)), "0XFF");
        assert_eq!(fmt("b", Value::Int(5)), "101");
        assert_eq!(fmt(",", Value::Int(1234567)), "1,234,567");
        assert_eq!(fmt("+d", Value::Int(3)), "+3");
    }

    #[test]
    fn float_kinds() {
        assert_eq!(fmt(".2f", Value::Float(3.14159)), "3.14");
        assert_eq!(fmt(".1e", Value::Float(12345.0)), "1.2e+04");
        assert_eq!(fmt(".0%", Value::Float(0.25)), "25%");
        assert_eq!(fmt("g", Value::Float(0.0001)), "0.0001");
        assert_eq!(fmt("g", Value::Float(1234567.0)), "1.23457e+06");
        assert_eq!(fmt(".3", Value::Float(2.0)), "2.0");
        assert_eq!(fmt("06.2f", Value::Float(-1.5)), "-01.50");
    }

    #[test]
    fn string_precision_truncates() {
        assert_eq!(fmt(".3", Value::from("abcdef")), "abc");
        assert_eq!(fmt(".3s", Value::from("abcdef")), "abc");
    }

    #[test]
    fn mismatched_kind_falls_back_to_padding() {
        assert_eq!(fmt(">4d", Value::from("ab")), "  ab");
        assert_eq!(fmt(">6", Value::Null), "  None");
        assert_eq!(Spec::parse(">6").unwrap().apply(None), "  None");
    }

    #[test]
    fn strftime_patterns() {
        let ts = chrono::DateTime::parse_from_rfc3339("2019-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(fmt("%Y-%m-%d", Value::Timestamp(ts)), "2019-03-04");
        assert_eq!(fmt("%Y", Value::from("x")), "x");
    }

    #[test]
    fn malformed_specs_are_rejected() {
        assert!(Spec::parse("5q").is_err());
        assert!(Spec::parse(".f").is_err());
        assert!(Spec::parse(">5d!").is_err());
    }
}
