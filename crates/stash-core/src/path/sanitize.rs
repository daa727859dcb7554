//! Character-set based path sanitizing.
//!
//! Two cleaners run over every rendered name: the segment cleaner substitutes
//! characters the target filesystem forbids (`path-restrict`), the path
//! cleaner strips characters illegal in any context (`path-remove`).

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Characters Windows forbids in file names.
const WINDOWS_RESTRICT: &str = "\\\\|/<>:\"?*";

/// Control characters, stripped from whole paths by default.
pub const DEFAULT_REMOVE: &str = "\u{0}-\u{1f}\u{7f}";

/// Which characters the segment cleaner replaces with `_`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PathRestrict {
    /// `Windows` on Windows hosts, `Unix` everywhere else.
    #[default]
    Auto,
    Unix,
    Windows,
    /// An explicit character set (`a-z` ranges and `\` escapes allowed).
    Chars(String),
}

impl PathRestrict {
    /// The character-set specification this mode stands for.
    pub fn charset(&self) -> &str {
        match self {
            PathRestrict::Auto if cfg!(windows) => WINDOWS_RESTRICT,
            PathRestrict::Auto | PathRestrict::Unix => "/",
            PathRestrict::Windows => WINDOWS_RESTRICT,
            PathRestrict::Chars(chars) => chars,
        }
    }
}

impl From<String> for PathRestrict {
    fn from(s: String) -> Self {
        match s.as_str() {
            "auto" => PathRestrict::Auto,
            "unix" => PathRestrict::Unix,
            "windows" => PathRestrict::Windows,
            _ => PathRestrict::Chars(s),
        }
    }
}

impl From<PathRestrict> for String {
    fn from(r: PathRestrict) -> Self {
        match r {
            PathRestrict::Auto => "auto".to_string(),
            PathRestrict::Unix => "unix".to_string(),
            PathRestrict::Windows => "windows".to_string(),
            PathRestrict::Chars(chars) => chars,
        }
    }
}

/// Replaces every character of a set with a fixed replacement.
#[derive(Debug, Clone)]
pub struct Cleaner {
    ranges: Vec<(char, char)>,
    replacement: String,
}

impl Cleaner {
    /// Build a cleaner from a character-set spec such as `"\u{0}-\u{1f}\u{7f}"`.
    /// An empty spec yields a cleaner that leaves input untouched.
    pub fn new(charset: &str, replacement: &str) -> Self {
        Cleaner {
            ranges: parse_charset(charset),
            replacement: replacement.to_string(),
        }
    }

    fn matches(&self, c: char) -> bool {
        self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi)
    }

    pub fn clean<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.chars().any(|c| self.matches(c)) {
            return Cow::Borrowed(input);
        }
        let mut out = String::with_capacity(input.len());
        for c in input.chars() {
            if self.matches(c) {
                out.push_str(&self.replacement);
            } else {
                out.push(c);
            }
        }
        Cow::Owned(out)
    }
}

/// Parse a regex-style character class body: single chars, `a-b` ranges,
/// `\x` escapes. A trailing or leading `-` is literal.
fn parse_charset(spec: &str) -> Vec<(char, char)> {
    let mut chars = Vec::new();
    let mut it = spec.chars();
    while let Some(c) = it.next() {
        if c == '\\' {
            chars.push((it.next().unwrap_or('\\'), true));
        } else {
            chars.push((c, c != '-'));
        }
    }

    let mut ranges = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (lo, _) = chars[i];
        // `x-y`: an unescaped '-' between two characters.
        if i + 2 < chars.len() && chars[i + 1] == ('-', false) {
            let (hi, _) = chars[i + 2];
            ranges.push(if lo <= hi { (lo, hi) } else { (hi, lo) });
            i += 3;
        } else {
            ranges.push((lo, lo));
            i += 1;
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_replaces_slash_only() {
        let c = Cleaner::new(PathRestrict::Unix.charset(), "_");
        assert_eq!(c.clean("a/b\\c:d.txt"), "a_b\\c:d.txt");
    }

    #[test]
    fn windows_replaces_reserved_characters() {
        let c = Cleaner::new(PathRestrict::Windows.charset(), "_");
        assert_eq!(c.clean("a/b\\c:d|e<f>g\"h?i*j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn control_chars_are_stripped() {
        let c = Cleaner::new(DEFAULT_REMOVE, "");
        assert_eq!(c.clean("file\u{0}na\tme\u{7f}.txt"), "filename.txt");
        assert!(matches!(c.clean("clean.txt"), Cow::Borrowed(_)));
    }

    #[test]
    fn empty_charset_is_identity() {
        let c = Cleaner::new("", "_");
        assert_eq!(c.clean("a/b"), "a/b");
    }

    #[test]
    fn ranges_and_literal_dash() {
        let c = Cleaner::new("a-c-", "#");
        assert_eq!(c.clean("abcd-e"), "###d#e");
        let escaped = Cleaner::new("\\-x", "");
        assert_eq!(escaped.clean("a-x-b"), "ab");
    }

    #[test]
    fn restrict_from_config_strings() {
        assert_eq!(PathRestrict::from("auto".to_string()), PathRestrict::Auto);
        assert_eq!(PathRestrict::from("windows".to_string()), PathRestrict::Windows);
        assert_eq!(
            PathRestrict::from("#%".to_string()),
            PathRestrict::Chars("#%".to_string())
        );
    }
}
