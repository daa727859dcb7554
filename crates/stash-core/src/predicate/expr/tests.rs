//! Expression evaluation tests.

use super::{ExprError, Expression, RegexCache};
use crate::value::{Metadata, Value};

fn meta() -> Metadata {
    let mut user = Metadata::new();
    user.insert("name".to_string(), Value::from("Ann"));
    user.insert("id".to_string(), Value::Int(42));

    let mut m = Metadata::new();
    m.insert("title".to_string(), Value::from("Holiday Photos - Part 3"));
    m.insert("width".to_string(), Value::Int(1920));
    m.insert("ratio".to_string(), Value::Float(1.5));
    m.insert("num".to_string(), Value::Int(7));
    m.insert("count".to_string(), Value::from("12"));
    m.insert("empty".to_string(), Value::from(""));
    m.insert("none".to_string(), Value::Null);
    m.insert(
        "tags".to_string(),
        Value::List(vec![Value::from("beach"), Value::from("sun")]),
    );
    m.insert("user".to_string(), Value::Map(user));
    m.insert("url".to_string(), Value::from("https://Example.org:8080/a/b.jpg?x=1#top"));
    m
}

fn eval(src: &str) -> Result<Value, ExprError> {
    let mut regexes = RegexCache::default();
    Expression::parse(src)?.evaluate(&meta(), &mut regexes)
}

fn check(src: &str) -> bool {
    let mut regexes = RegexCache::default();
    Expression::parse(src)
        .unwrap()
        .test(&meta(), &mut regexes)
        .unwrap()
}

#[test]
fn arithmetic() {
    assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
    assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
    assert_eq!(eval("7 // 2").unwrap(), Value::Int(3));
    assert_eq!(eval("-7 // 2").unwrap(), Value::Int(-4));
    assert_eq!(eval("-7 % 3").unwrap(), Value::Int(2));
    assert_eq!(eval("7 % -3").unwrap(), Value::Int(-2));
    assert_eq!(eval("2 ** 10").unwrap(), Value::Int(1024));
    assert_eq!(eval("-2 ** 2").unwrap(), Value::Int(-4));
    assert_eq!(eval("width * ratio").unwrap(), Value::Float(2880.0));
    assert_eq!(eval("'ab' * 2 + 'c'").unwrap(), Value::from("ababc"));
    assert_eq!(eval("True + 1").unwrap(), Value::Int(2));
    assert_eq!(eval("1 / 0"), Err(ExprError::ZeroDivision));
    assert_eq!(eval("9223372036854775807 + 1"), Err(ExprError::Overflow));
    assert_eq!(eval("'ab' * 9223372036854775807"), Err(ExprError::Overflow));
    assert_eq!(eval("[1] * 100000000"), Err(ExprError::Overflow));
    assert_eq!(eval("[1, 2] * -3").unwrap(), Value::List(vec![]));
    assert_eq!(eval("'' * 9223372036854775807").unwrap(), Value::from(""));
    assert!(matches!(eval("'a' - 1"), Err(ExprError::Type(_))));
}

#[test]
fn comparisons() {
    assert!(check("width > 1000"));
    assert!(check("1 < num < 10"));
    assert!(!check("1 < num < 5"));
    assert!(check("1 == 1.0"));
    assert!(check("'a' < 'b'"));
    assert!(check("[1, 2] < [1, 3]"));
    assert!(check("none is None"));
    assert!(check("empty is not None"));
    assert!(check("'beach' in tags"));
    assert!(check("'rain' not in tags"));
    assert!(check("'Part' in title"));
    assert!(check("'name' in user"));
    assert!(matches!(eval("'a' < 1"), Err(ExprError::Type(_))));
    assert!(matches!(eval("1 in 5"), Err(ExprError::Type(_))));
}

#[test]
fn boolean_operators_return_operands() {
    assert_eq!(eval("empty or 'fallback'").unwrap(), Value::from("fallback"));
    assert_eq!(eval("num and title").unwrap(), Value::from("Holiday Photos - Part 3"));
    assert_eq!(eval("none and undefined_name").unwrap(), Value::Null);
    assert_eq!(eval("not empty").unwrap(), Value::Bool(true));
    assert_eq!(eval("'big' if width > 1000 else 'small'").unwrap(), Value::from("big"));
}

#[test]
fn access_chains() {
    assert_eq!(eval("user['name']").unwrap(), Value::from("Ann"));
    assert_eq!(eval("user.id").unwrap(), Value::Int(42));
    assert_eq!(eval("tags[-1]").unwrap(), Value::from("sun"));
    assert_eq!(eval("title[:7]").unwrap(), Value::from("Holiday"));
    assert_eq!(eval("title[::-1][0]").unwrap(), Value::from("3"));
    assert_eq!(eval("tags[5]"), Err(ExprError::Index));
    assert_eq!(eval("user['age']"), Err(ExprError::Key("age".to_string())));
    assert!(matches!(eval("user.age"), Err(ExprError::Attribute { .. })));
    assert_eq!(eval("user.get('age', 0)").unwrap(), Value::Int(0));
    assert_eq!(eval("len(user.keys())").unwrap(), Value::Int(2));
}

#[test]
fn string_methods() {
    assert!(check("title.lower().startswith('holiday')"));
    assert!(check("title.endswith(('3', '4'))"));
    assert_eq!(eval("title.split(' - ')[1]").unwrap(), Value::from("Part 3"));
    assert_eq!(eval("'  x '.strip()").unwrap(), Value::from("x"));
    assert_eq!(eval("'xxhixx'.strip('x')").unwrap(), Value::from("hi"));
    assert_eq!(eval("title.find('Part')").unwrap(), Value::Int(17));
    assert_eq!(eval("'a-b'.replace('-', '_')").unwrap(), Value::from("a_b"));
    assert_eq!(eval("'hello world'.title()").unwrap(), Value::from("Hello World"));
    assert!(check("count.isdigit()"));
    assert!(matches!(eval("title.nope()"), Err(ExprError::Attribute { .. })));
}

#[test]
fn builtin_functions() {
    assert_eq!(eval("parse_int(count)").unwrap(), Value::Int(12));
    assert_eq!(eval("parse_int('x')").unwrap(), Value::Int(0));
    assert_eq!(eval("parse_int(empty, -1)").unwrap(), Value::Int(-1));
    assert_eq!(eval("int('  5 ') + int(2.9)").unwrap(), Value::Int(7));
    assert!(matches!(eval("int('five')"), Err(ExprError::Value(_))));
    assert_eq!(eval("str(num) + 'x'").unwrap(), Value::from("7x"));
    assert_eq!(eval("len(tags)").unwrap(), Value::Int(2));
    assert_eq!(eval("len(title)").unwrap(), Value::Int(23));
    assert_eq!(eval("max(3, num, 5)").unwrap(), Value::Int(7));
    assert_eq!(eval("min([4, 2, 9])").unwrap(), Value::Int(2));
    assert_eq!(eval("abs(-3)").unwrap(), Value::Int(3));
    assert_eq!(eval("float('2.5')").unwrap(), Value::Float(2.5));
    assert!(matches!(eval("len(num)"), Err(ExprError::Type(_))));
    assert!(matches!(eval("len()"), Err(ExprError::Type(_))));
}

#[test]
fn urlsplit_parts() {
    assert_eq!(eval("urlsplit(url).netloc").unwrap(), Value::from("example.org:8080"));
    assert_eq!(eval("urlsplit(url).scheme").unwrap(), Value::from("https"));
    assert_eq!(eval("urlsplit(url).hostname").unwrap(), Value::from("example.org"));
    assert_eq!(eval("urlsplit(url).port").unwrap(), Value::Int(8080));
    assert_eq!(eval("urlsplit(url).path").unwrap(), Value::from("/a/b.jpg"));
    assert_eq!(eval("urlsplit(url).query").unwrap(), Value::from("x=1"));
    assert_eq!(eval("urlsplit(url).fragment").unwrap(), Value::from("top"));
    assert_eq!(eval("urlsplit('a/b?q#f').path").unwrap(), Value::from("a/b"));
}

#[test]
fn datetime_values() {
    assert!(check("datetime(2020, 1, 2) < datetime(2020, 1, 2, 0, 0, 1)"));
    assert_eq!(eval("datetime(2021, 3, 4).year").unwrap(), Value::Int(2021));
    assert_eq!(eval("datetime(2021, 3, 4).strftime('%d.%m')").unwrap(), Value::from("04.03"));
    assert_eq!(eval("datetime(2024, 2, 5).weekday()").unwrap(), Value::Int(0));
    assert!(matches!(eval("datetime(2021, 13, 1)"), Err(ExprError::Value(_))));
}

#[test]
fn regular_expressions() {
    assert!(check(r"re.match(r'Holiday', title)"));
    assert!(!check(r"re.match(r'Photos', title)"));
    assert!(check(r"re.search(r'Part \d', title)"));
    assert!(!check(r"re.fullmatch(r'\d', count)"));
    assert_eq!(eval(r"re.search(r'Part (\d+)', title).group(1)").unwrap(), Value::from("3"));
    assert_eq!(
        eval(r"re.search(r'(?P<word>\w+) (\w+)', title).group('word')").unwrap(),
        Value::from("Holiday")
    );
    assert_eq!(
        eval(r"re.search(r'(\w+) (\w+)', title).groups()").unwrap(),
        Value::List(vec![Value::from("Holiday"), Value::from("Photos")])
    );
    assert_eq!(eval(r"re.search('zzz', title)").unwrap(), Value::Null);
    assert!(matches!(eval("re.search('(', title)"), Err(ExprError::Regex(_))));
}

#[test]
fn abort_and_unknown_names() {
    assert_eq!(eval("abort()"), Err(ExprError::Abort));
    assert_eq!(eval("num > 100 and abort()").unwrap(), Value::Bool(false));
    assert_eq!(eval("undefined"), Err(ExprError::Name("undefined".to_string())));
    // Metadata shadows helper names.
    let mut m = Metadata::new();
    m.insert("len".to_string(), Value::Int(3));
    let mut regexes = RegexCache::default();
    let v = Expression::parse("len + 1").unwrap().evaluate(&m, &mut regexes).unwrap();
    assert_eq!(v, Value::Int(4));
}

#[test]
fn nothing_outside_the_whitelist_is_callable() {
    for src in ["__import__('os')", "open('x')", "eval('1')", "re.compile('x')", "num()"] {
        assert!(eval(src).is_err(), "{src:?} must not evaluate");
    }
}

#[test]
fn functions_have_no_value_form() {
    assert!(matches!(eval("len"), Err(ExprError::Type(_))));
    assert!(check("len"));
}
