//! Template compile/render tests.

use super::{FormatError, Template};
use crate::value::{Metadata, Value};

fn meta(pairs: &[(&str, Value)]) -> Metadata {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn render(source: &str, metadata: &Metadata) -> String {
    Template::compile(source, None).unwrap().render(metadata)
}

#[test]
fn lower_and_upper_conversions() {
    let m = meta(&[("f", Value::from("Example"))]);
    assert_eq!(render("{f!l}", &m), "example");
    assert_eq!(render("{f!u}", &m), "EXAMPLE");
    assert_eq!(render("{f!c}", &meta(&[("f", Value::from("eXAMPLE"))])), "Example");
}

#[test]
fn optional_wrap() {
    let empty = meta(&[("f", Value::from(""))]);
    let full = meta(&[("f", Value::from("Example"))]);
    assert_eq!(render("{f:?-+/+-/}", &empty), "");
    assert_eq!(render("{f:?-+/+-/}", &full), "-+Example+-");
    assert_eq!(render("{f:?-+/+-/}", &Metadata::new()), "");
    assert_eq!(render("{n:?v/ />02}", &meta(&[("n", Value::Int(3))])), "v03 ");
}

#[test]
fn max_length() {
    assert_eq!(
        render("{f:L5/too long/}", &meta(&[("f", Value::from("foobar"))])),
        "too long"
    );
    assert_eq!(render("{f:L5/too long/}", &meta(&[("f", Value::from("foo"))])), "foo");
}

#[test]
fn join_and_replace() {
    let tags = Value::List(vec![Value::from("a"), Value::from("b"), Value::from("c")]);
    let m = meta(&[("t", tags), ("s", Value::from("f o o b a r"))]);
    assert_eq!(render("{t:J - /}", &m), "a - b - c");
    assert_eq!(render("{t:J,/>7}", &m), "  a,b,c");
    assert_eq!(render("{s:R /_/}", &m), "f_o_o_b_a_r");
}

#[test]
fn missing_field_uses_default() {
    let t = Template::compile("{missing}", Some(Value::from("N/A"))).unwrap();
    assert_eq!(t.render(&Metadata::new()), "N/A");

    let t = Template::compile("{missing}", None).unwrap();
    assert_eq!(t.render(&Metadata::new()), "None");
}

#[test]
fn failure_anywhere_in_chain_uses_default() {
    let m = meta(&[
        ("user", Value::Map(meta(&[("name", Value::from("ann"))]))),
        ("n", Value::Int(4)),
    ]);
    let t = Template::compile("{user[name]}|{user.name}|{user.age}|{n[0]}|{n!l}", Some(Value::from("?")))
        .unwrap();
    assert_eq!(t.render(&m), "ann|ann|?|?|?");
}

#[test]
fn nested_index_and_slices() {
    let m = meta(&[
        ("items", Value::List(vec![Value::from("first"), Value::from("second")])),
        ("title", Value::from("abcdefgh")),
    ]);
    assert_eq!(render("{items[1]}", &m), "second");
    assert_eq!(render("{items[-1]}", &m), "second");
    assert_eq!(render("{title[:3]}", &m), "abc");
    assert_eq!(render("{title[::2]}", &m), "aceg");
    assert_eq!(render("{title[2:4]!u}", &m), "CD");
    assert_eq!(render("{items[5]}", &m), "None");
    assert_eq!(render("{title[1::9223372036854775807]}", &m), "b");
}

#[test]
fn literal_text_and_escaped_braces() {
    let m = meta(&[("id", Value::Int(7)), ("extension", Value::from("jpg"))]);
    assert_eq!(render("{{{id:>03}}}.{extension}", &m), "{007}.jpg");
    assert_eq!(render("plain text", &m), "plain text");
    assert_eq!(render("", &m), "");
}

#[test]
fn stringify_and_repr_conversions() {
    let m = meta(&[
        ("tags", Value::List(vec![Value::from("x"), Value::Int(1)])),
        ("s", Value::from("caf\u{e9}")),
        ("none", Value::Null),
    ]);
    assert_eq!(render("{tags!S}", &m), "x, 1");
    assert_eq!(render("{none!S}", &m), "");
    assert_eq!(render("{s!r}", &m), "'caf\u{e9}'");
    assert_eq!(render("{s!a}", &m), "'caf\\xe9'");
    assert_eq!(render("{tags}", &m), "['x', 1]");
}

#[test]
fn unquote_conversion() {
    let m = meta(&[("name", Value::from("hello%20world"))]);
    assert_eq!(render("{name!U}", &m), "hello world");
}

#[test]
fn timestamp_strftime() {
    let ts = chrono::DateTime::parse_from_rfc3339("2020-01-02T03:04:05Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let m = meta(&[("date", Value::Timestamp(ts))]);
    assert_eq!(render("{date:%Y%m%d}", &m), "20200102");
    assert_eq!(render("{date}", &m), "2020-01-02 03:04:05");
}

#[test]
fn compile_is_reusable_across_items() {
    let t = Template::compile("{category}_{id:>04}.{extension}", None).unwrap();
    for i in 1..=3 {
        let m = meta(&[
            ("category", Value::from("test")),
            ("id", Value::Int(i)),
            ("extension", Value::from("png")),
        ]);
        assert_eq!(t.render(&m), format!("test_{i:04}.png"));
    }
    assert_eq!(t.source(), "{category}_{id:>04}.{extension}");
}

#[test]
fn compile_errors() {
    assert_eq!(Template::compile("{abc", None).unwrap_err(), FormatError::UnmatchedOpen);
    assert_eq!(Template::compile("abc}", None).unwrap_err(), FormatError::UnmatchedClose);
    assert_eq!(Template::compile("{}", None).unwrap_err(), FormatError::EmptyField);
    assert_eq!(
        Template::compile("{a!z}", None).unwrap_err(),
        FormatError::UnknownConversion('z')
    );
    assert!(matches!(
        Template::compile("{a!lx}", None),
        Err(FormatError::ConversionSyntax(_))
    ));
    assert!(matches!(
        Template::compile("{a[0]x}", None),
        Err(FormatError::FieldName(..))
    ));
    assert!(matches!(
        Template::compile("{a[1:x]}", None),
        Err(FormatError::FieldName(..))
    ));
    assert!(matches!(
        Template::compile("{a:?only/}", None),
        Err(FormatError::Spec { .. })
    ));
}
