//! Tokenizer for filter expressions.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(&'static str),
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexed {
    pub(crate) token: Token,
    pub(crate) offset: usize,
}

/// Longest operators first so `//` wins over `/`.
const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "(", ")", "[", "]",
    ",", ".", ":",
];

fn syntax(offset: usize, message: impl Into<String>) -> ExprError {
    ExprError::Syntax {
        offset,
        message: message.into(),
    }
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Lexed>, ExprError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        let rest = &src[pos..];
        let Some(c) = rest.chars().next() else { break };

        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }

        let starts_number = c.is_ascii_digit()
            || (c == '.' && rest[1..].starts_with(|d: char| d.is_ascii_digit()));
        if starts_number {
            let (token, len) = number(rest).map_err(|m| syntax(pos, m))?;
            tokens.push(Lexed { token, offset: pos });
            pos += len;
            continue;
        }

        if let Some(quote_at) = string_start(rest) {
            let (value, len) = string(rest, quote_at).map_err(|m| syntax(pos, m))?;
            tokens.push(Lexed {
                token: Token::Str(value),
                offset: pos,
            });
            pos += len;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let len = rest
                .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            tokens.push(Lexed {
                token: Token::Name(rest[..len].to_string()),
                offset: pos,
            });
            pos += len;
            continue;
        }

        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(&op) => {
                tokens.push(Lexed {
                    token: Token::Op(op),
                    offset: pos,
                });
                pos += op.len();
            }
            None => return Err(syntax(pos, format!("unexpected character {c:?}"))),
        }
    }

    tokens.push(Lexed {
        token: Token::End,
        offset: src.len(),
    });
    Ok(tokens)
}

/// Integer (decimal, `0x`, `0o`, `0b`) or float literal; `_` separators allowed.
fn number(s: &str) -> Result<(Token, usize), String> {
    let bytes = s.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        let radix = match bytes[1] {
            b'x' | b'X' => Some(16),
            b'o' | b'O' => Some(8),
            b'b' | b'B' => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            let len = 2 + s[2..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(s.len() - 2);
            let digits: String = s[2..len].chars().filter(|&c| c != '_').collect();
            return i64::from_str_radix(&digits, radix)
                .map(|n| (Token::Int(n), len))
                .map_err(|_| format!("invalid integer literal {:?}", &s[..len]));
        }
    }

    let digits = |from: usize| {
        s[from..]
            .find(|c: char| !(c.is_ascii_digit() || c == '_'))
            .map_or(s.len(), |n| from + n)
    };
    let mut is_float = false;
    let mut len = digits(0);
    if s[len..].starts_with('.') {
        is_float = true;
        len = digits(len + 1);
    }
    if s[len..].starts_with(['e', 'E']) {
        let mut exp = len + 1;
        if s[exp..].starts_with(['+', '-']) {
            exp += 1;
        }
        if s[exp..].starts_with(|c: char| c.is_ascii_digit()) {
            is_float = true;
            len = digits(exp);
        }
    }
    if s[len..].starts_with(|c: char| c.is_alphanumeric() || c == '_') {
        return Err(format!("invalid numeric literal {:?}", &s[..len]));
    }

    let text: String = s[..len].chars().filter(|&c| c != '_').collect();
    let token = if is_float {
        Token::Float(text.parse().map_err(|_| format!("invalid float literal {text:?}"))?)
    } else {
        Token::Int(text.parse().map_err(|_| format!("integer literal {text:?} out of range"))?)
    };
    Ok((token, len))
}

/// Offset of the opening quote when `s` starts a string literal, allowing an
/// `r`/`R` prefix.
fn string_start(s: &str) -> Option<usize> {
    let mut chars = s.chars();
    match chars.next()? {
        '\'' | '"' => Some(0),
        'r' | 'R' if matches!(chars.next(), Some('\'' | '"')) => Some(1),
        _ => None,
    }
}

fn string(s: &str, quote_at: usize) -> Result<(String, usize), String> {
    let raw = quote_at == 1;
    let body = &s[quote_at..];
    let quote = body.chars().next().ok_or("unterminated string")?;
    let mut out = String::new();
    let mut chars = body.char_indices().skip(1);

    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((out, quote_at + i + c.len_utf8()));
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        let (_, esc) = chars.next().ok_or("unterminated string")?;
        if raw {
            out.push('\\');
            out.push(esc);
            continue;
        }
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' | '\'' | '"' => out.push(esc),
            'x' | 'u' => {
                let width = if esc == 'x' { 2 } else { 4 };
                let hex: String = chars.by_ref().take(width).map(|(_, h)| h).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == width)
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid \\{esc} escape"))?;
                out.push(code);
            }
            // Unknown escapes keep their backslash.
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Err("unterminated string".to_string())
}
