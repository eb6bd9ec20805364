//! Lexer and recursive-descent parser for the predicate language.
//!
//! Operator precedence, lowest to highest:
//!
//! ```text
//! ||
//! &&
//! !                    (prefix)
//! == < <= > >=         (left-associative)
//! literal | ( expr ) | ident(.ident)*
//! ```
//!
//! Function calls, indexing, `!=` and arithmetic are recognized only so that
//! they can be rejected with [`Error::NotSupported`].

use log::debug;

use crate::ast::{BinaryOp, Expr};
use crate::error::{Error, Result};
use crate::types::Value;

#[derive(Debug, Clone, Eq, PartialEq)]
enum Tok {
    Ident(String),
    Int(String),
    Str(String),
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Not,
    AndAnd,
    OrOr,
    EqEq,
    Lt,
    Le,
    Gt,
    Ge,
    /// Operator that lexes fine but is outside the language.
    Unsupported(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    pos: usize,
}

fn lex(src: &str) -> Result<Vec<Token>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token {
                tok: Tok::Ident(src[start..i].to_string()),
                pos: start,
            });
            continue;
        }

        if c.is_ascii_digit() {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i].is_ascii_alphabetic() || bytes[i] == b'_') {
                return Err(Error::syntax(i, "invalid digit in integer literal"));
            }
            tokens.push(Token {
                tok: Tok::Int(src[start..i].to_string()),
                pos: start,
            });
            continue;
        }

        if c == b'"' {
            i += 1;
            loop {
                match bytes.get(i) {
                    None => return Err(Error::syntax(start, "unterminated string literal")),
                    Some(b'\n') => return Err(Error::syntax(start, "newline in string literal")),
                    // An escaped quote does not terminate the literal; the
                    // backslash itself is kept verbatim.
                    Some(b'\\') if i + 1 < bytes.len() => i += 2,
                    Some(b'"') => break,
                    Some(_) => i += 1,
                }
            }
            tokens.push(Token {
                tok: Tok::Str(src[start + 1..i].to_string()),
                pos: start,
            });
            i += 1;
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let (tok, len) = match (c, next) {
            (b'&', Some(b'&')) => (Tok::AndAnd, 2),
            (b'|', Some(b'|')) => (Tok::OrOr, 2),
            (b'=', Some(b'=')) => (Tok::EqEq, 2),
            (b'!', Some(b'=')) => (Tok::Unsupported("!="), 2),
            (b'<', Some(b'=')) => (Tok::Le, 2),
            (b'>', Some(b'=')) => (Tok::Ge, 2),
            (b'<', _) => (Tok::Lt, 1),
            (b'>', _) => (Tok::Gt, 1),
            (b'!', _) => (Tok::Not, 1),
            (b'.', _) => (Tok::Dot, 1),
            (b'(', _) => (Tok::LParen, 1),
            (b')', _) => (Tok::RParen, 1),
            (b'[', _) => (Tok::LBracket, 1),
            (b']', _) => (Tok::RBracket, 1),
            (b',', _) => (Tok::Comma, 1),
            (b'+', _) => (Tok::Unsupported("+"), 1),
            (b'-', _) => (Tok::Unsupported("-"), 1),
            (b'*', _) => (Tok::Unsupported("*"), 1),
            (b'/', _) => (Tok::Unsupported("/"), 1),
            (b'%', _) => (Tok::Unsupported("%"), 1),
            (b'&', _) => (Tok::Unsupported("&"), 1),
            (b'|', _) => (Tok::Unsupported("|"), 1),
            (b'^', _) => (Tok::Unsupported("^"), 1),
            _ => {
                let ch = src[start..].chars().next().unwrap_or('?');
                return Err(Error::syntax(start, format!("unexpected character {:?}", ch)));
            }
        };
        tokens.push(Token { tok, pos: start });
        i += len;
    }

    tokens.push(Token {
        tok: Tok::Eof,
        pos: src.len(),
    });
    Ok(tokens)
}

/// Parses predicate source text into an [`Expr`].
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, index: 0 };
    let expr = parser.parse_or()?;
    parser.expect_end()?;
    debug!("parsed predicate: {}", expr);
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with `Eof`, which is never consumed.
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.index + offset).min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if token.tok != Tok::Eof {
            self.index += 1;
        }
        token
    }

    fn unexpected(&self) -> Error {
        let token = self.peek();
        match &token.tok {
            Tok::Eof => Error::syntax(token.pos, "unexpected end of input"),
            Tok::Unsupported(op) => Error::NotSupported(format!("operator `{}`", op)),
            tok => Error::syntax(token.pos, format!("unexpected token {}", describe(tok))),
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.peek().tok == Tok::Eof {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek().tok == Tok::OrOr {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::or(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while self.peek().tok == Tok::AndAnd {
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::and(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek().tok == Tok::Not {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::not(operand));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_postfix()?;
        loop {
            let op = match self.peek().tok {
                Tok::EqEq => BinaryOp::Eq,
                Tok::Lt => BinaryOp::Lt,
                Tok::Le => BinaryOp::Le,
                Tok::Gt => BinaryOp::Gt,
                Tok::Ge => BinaryOp::Ge,
                Tok::Unsupported(op) => {
                    return Err(Error::NotSupported(format!("operator `{}`", op)));
                }
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_postfix()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let expr = self.parse_primary()?;
        match self.peek().tok {
            Tok::LParen => Err(Error::NotSupported(match &expr {
                Expr::Identifier(path) => format!("function call `{}`", path.join(".")),
                _ => "function call".to_string(),
            })),
            Tok::LBracket => Err(Error::NotSupported(match &expr {
                Expr::Identifier(path) => format!("index expression on `{}`", path.join(".")),
                _ => "index expression".to_string(),
            })),
            Tok::Dot => Err(Error::NotSupported(
                "selector on a non-identifier expression".to_string(),
            )),
            _ => Ok(expr),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.bump();
        let at_eof = token.tok == Tok::Eof;
        match token.tok {
            Tok::Int(digits) => parse_int(&digits, false, token.pos).map(Expr::Literal),
            Tok::Str(text) => Ok(Expr::Literal(Value::Str(text))),
            Tok::Unsupported("-") => {
                let next = self.peek().clone();
                match next.tok {
                    Tok::Int(digits) if next.pos == token.pos + 1 => {
                        self.bump();
                        parse_int(&digits, true, token.pos).map(Expr::Literal)
                    }
                    _ => Err(Error::NotSupported("unary operator `-`".to_string())),
                }
            }
            Tok::Ident(name) if name == "true" || name == "false" => {
                Ok(Expr::Literal(Value::Bool(name == "true")))
            }
            Tok::Ident(name) => {
                let mut path = vec![name];
                while self.peek().tok == Tok::Dot {
                    if let Tok::Ident(segment) = &self.peek_at(1).tok {
                        path.push(segment.clone());
                        self.bump();
                        self.bump();
                    } else {
                        self.bump();
                        return Err(self.unexpected());
                    }
                }
                Ok(Expr::Identifier(path))
            }
            Tok::LParen => {
                let inner = self.parse_or()?;
                if self.peek().tok != Tok::RParen {
                    return Err(self.unexpected());
                }
                self.bump();
                Ok(inner)
            }
            _ => {
                self.index -= usize::from(!at_eof);
                Err(self.unexpected())
            }
        }
    }
}

fn parse_int(digits: &str, negative: bool, pos: usize) -> Result<Value> {
    let text = if negative {
        format!("-{}", digits)
    } else {
        digits.to_string()
    };
    text.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| Error::syntax(pos, format!("integer literal {} out of range", text)))
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(name) => format!("identifier `{}`", name),
        Tok::Int(digits) => format!("integer `{}`", digits),
        Tok::Str(text) => format!("string \"{}\"", text),
        Tok::Dot => "`.`".to_string(),
        Tok::LParen => "`(`".to_string(),
        Tok::RParen => "`)`".to_string(),
        Tok::LBracket => "`[`".to_string(),
        Tok::RBracket => "`]`".to_string(),
        Tok::Comma => "`,`".to_string(),
        Tok::Not => "`!`".to_string(),
        Tok::AndAnd => "`&&`".to_string(),
        Tok::OrOr => "`||`".to_string(),
        Tok::EqEq => "`==`".to_string(),
        Tok::Lt => "`<`".to_string(),
        Tok::Le => "`<=`".to_string(),
        Tok::Gt => "`>`".to_string(),
        Tok::Ge => "`>=`".to_string(),
        Tok::Unsupported(op) => format!("`{}`", op),
        Tok::Eof => "end of input".to_string(),
    }
}
