//! Predicate syntax tree.
//!
//! Trees are built by [`parse`][crate::parser::parse] (or by the
//! constructors below) and are never mutated afterwards.
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use crate::types::Value;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    Not,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        !matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Dotted identifier path, e.g. `env.stage` is `["env", "stage"]`.
    Identifier(Vec<String>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

// Constructors
impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn ident(path: &str) -> Self {
        Expr::Identifier(path.split('.').map(str::to_string).collect())
    }

    pub fn not(value: Self) -> Self {
        Expr::Unary(UnaryOp::Not, Box::new(value))
    }

    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn and(lhs: Self, rhs: Self) -> Self {
        Self::binary(BinaryOp::And, lhs, rhs)
    }

    pub fn or(lhs: Self, rhs: Self) -> Self {
        Self::binary(BinaryOp::Or, lhs, rhs)
    }

    pub fn eq(lhs: Self, rhs: Self) -> Self {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }
}

// Queries
impl Expr {
    /// Returns the dotted paths of all identifiers, sorted and deduplicated.
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Identifier(path) => {
                out.insert(path.join("."));
            }
            Expr::Unary(_, a) => a.collect_identifiers(out),
            Expr::Binary(_, a, b) => {
                a.collect_identifiers(out);
                b.collect_identifiers(out);
            }
        }
    }

    /// Returns `true` if the tree uses only boolean connectives over
    /// identifiers and boolean literals, i.e. it can go to the DPLL path.
    pub fn is_propositional(&self) -> bool {
        match self {
            Expr::Literal(value) => matches!(value, Value::Bool(_)),
            Expr::Identifier(_) => true,
            Expr::Unary(UnaryOp::Not, a) => a.is_propositional(),
            Expr::Binary(op, a, b) => {
                !op.is_comparison() && a.is_propositional() && b.is_propositional()
            }
        }
    }
}

/// Fully parenthesized rendering; parsing the output yields the same tree.
impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Identifier(path) => write!(f, "{}", path.join(".")),
            Expr::Unary(op, a) => write!(f, "{}({})", op, a),
            Expr::Binary(op, a, b) => write!(f, "({} {} {})", a, op, b),
        }
    }
}
