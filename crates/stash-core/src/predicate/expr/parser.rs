//! Recursive-descent parser producing the expression tree.
//!
//! Precedence, lowest first: conditional, `or`, `and`, `not`, comparisons,
//! `+ -`, `* / // %`, unary `- +`, `**`, then calls, attributes and
//! subscripts.

use super::lexer::{Lexed, Token};
use super::ExprError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call(Box<Expr>, Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Pos(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

/// Deepest nesting of sub-expressions, `not`, unary signs and powers.
const MAX_DEPTH: usize = 200;

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "True", "False", "None", "lambda", "for",
];

pub(crate) fn parse(tokens: &[Lexed]) -> Result<Expr, ExprError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.peek() {
        Token::End => Ok(expr),
        other => Err(parser.error(format!("unexpected {}", describe(other)))),
    }
}

struct Parser<'a> {
    tokens: &'a [Lexed],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map_or(&Token::End, |lexed| &lexed.token)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.pos + ahead)
            .map_or(&Token::End, |lexed| &lexed.token)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        let offset = self
            .tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map_or(0, |lexed| lexed.offset);
        ExprError::Syntax {
            offset,
            message: message.into(),
        }
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == word)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let found = self.is_op(op);
        if found {
            self.advance();
        }
        found
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        let found = self.is_keyword(word);
        if found {
            self.advance();
        }
        found
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ExprError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}', found {}", describe(self.peek()))))
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, ExprError> {
        let then = self.or_test()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let cond = self.or_test()?;
        if !self.eat_keyword("else") {
            return Err(self.error("expected 'else' in conditional expression"));
        }
        let otherwise = self.expression()?;
        Ok(Expr::IfElse {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or_test(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and_test()?;
        while self.eat_keyword("or") {
            let right = self.and_test()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_test(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.not_test()?;
        while self.eat_keyword("and") {
            let right = self.not_test()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_test(&mut self) -> Result<Expr, ExprError> {
        self.nested(|p| {
            if p.eat_keyword("not") {
                return Ok(Expr::Not(Box::new(p.not_test()?)));
            }
            p.comparison()
        })
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    /// Consume a comparison operator, if one comes next.
    fn comparison_op(&mut self) -> Option<CmpOp> {
        let keyword = |token: &Token, word: &str| matches!(token, Token::Name(n) if n == word);
        let (op, width) = match (self.peek(), self.peek_at(1)) {
            (Token::Op("=="), _) => (CmpOp::Eq, 1),
            (Token::Op("!="), _) => (CmpOp::Ne, 1),
            (Token::Op("<"), _) => (CmpOp::Lt, 1),
            (Token::Op("<="), _) => (CmpOp::Le, 1),
            (Token::Op(">"), _) => (CmpOp::Gt, 1),
            (Token::Op(">="), _) => (CmpOp::Ge, 1),
            (first, _) if keyword(first, "in") => (CmpOp::In, 1),
            (first, second) if keyword(first, "not") && keyword(second, "in") => (CmpOp::NotIn, 2),
            (first, second) if keyword(first, "is") && keyword(second, "not") => (CmpOp::IsNot, 2),
            (first, _) if keyword(first, "is") => (CmpOp::Is, 1),
            _ => return None,
        };
        for _ in 0..width {
            self.advance();
        }
        Some(op)
    }

    fn arith(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.factor()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("//") {
                BinOp::FloorDiv
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                return Ok(left);
            };
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn factor(&mut self) -> Result<Expr, ExprError> {
        self.nested(|p| {
            if p.eat_op("-") {
                return Ok(Expr::Neg(Box::new(p.factor()?)));
            }
            if p.eat_op("+") {
                return Ok(Expr::Pos(Box::new(p.factor()?)));
            }
            p.power()
        })
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            // Right-associative and binds tighter than a unary minus on its left.
            let exponent = self.factor()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                match self.peek().clone() {
                    Token::Name(name) if !KEYWORDS.contains(&name.as_str()) => {
                        self.advance();
                        expr = Expr::Attr(Box::new(expr), name);
                    }
                    other => {
                        return Err(self.error(format!(
                            "expected attribute name, found {}",
                            describe(&other)
                        )))
                    }
                }
            } else if self.eat_op("(") {
                let args = self.sequence(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else {
                return Ok(expr);
            }
        }
    }

    /// After `[`: an index expression or a `start:stop:step` slice.
    fn subscript(&mut self, target: Expr) -> Result<Expr, ExprError> {
        let start = self.optional_bound()?;
        if !self.eat_op(":") {
            let index = start.ok_or_else(|| self.error("empty subscript"))?;
            self.expect_op("]")?;
            return Ok(Expr::Index(Box::new(target), index));
        }
        let stop = self.optional_bound()?;
        let step = if self.eat_op(":") {
            self.optional_bound()?
        } else {
            None
        };
        self.expect_op("]")?;
        Ok(Expr::Slice {
            target: Box::new(target),
            start,
            stop,
            step,
        })
    }

    fn optional_bound(&mut self) -> Result<Option<Box<Expr>>, ExprError> {
        if self.is_op(":") || self.is_op("]") {
            Ok(None)
        } else {
            Ok(Some(Box::new(self.expression()?)))
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn sequence(&mut self, close: &str) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        loop {
            if self.eat_op(close) {
                return Ok(items);
            }
            items.push(self.expression()?);
            if !self.eat_op(",") {
                self.expect_op(close)?;
                return Ok(items);
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, ExprError> {
        let token = self.peek().clone();
        match token {
            Token::Int(i) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(i)))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Value::Float(f)))
            }
            Token::Str(mut s) => {
                self.advance();
                // Adjacent string literals concatenate.
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::Name(name) => {
                let literal = match name.as_str() {
                    "True" => Some(Value::Bool(true)),
                    "False" => Some(Value::Bool(false)),
                    "None" => Some(Value::Null),
                    n if KEYWORDS.contains(&n) => {
                        return Err(self.error(format!("unexpected keyword '{n}'")))
                    }
                    _ => None,
                };
                self.advance();
                Ok(literal.map_or(Expr::Name(name), Expr::Literal))
            }
            Token::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.eat_op(")") {
                    return Ok(first);
                }
                // A parenthesized tuple evaluates as a list.
                self.expect_op(",")?;
                let mut items = vec![first];
                items.extend(self.sequence(")")?);
                Ok(Expr::List(items))
            }
            Token::Op("[") => {
                self.advance();
                Ok(Expr::List(self.sequence("]")?))
            }
            other => Err(self.error(format!("unexpected {}", describe(&other)))),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(i) => format!("number {i}"),
        Token::Float(f) => format!("number {f}"),
        Token::Str(s) => format!("string {s:?}"),
        Token::Name(n) => format!("name '{n}'"),
        Token::Op(op) => format!("'{op}'"),
        Token::End => "end of expression".to_string(),
    }
}
