//! Direct evaluation of fully-known predicates.
//!
//! This is the ground truth the solver answers must agree with: plugging a
//! returned value back into the predicate and evaluating it here yields
//! `true`.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{Error, Result};
use crate::resolve::Resolver;
use crate::types::Value;

pub trait Eval {
    fn eval(&self, resolver: &dyn Resolver) -> Result<Value>;
}

impl Eval for Expr {
    fn eval(&self, resolver: &dyn Resolver) -> Result<Value> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Identifier(path) => resolver
                .resolve(path)
                .ok_or_else(|| Error::NotFound(path.join("."))),
            Expr::Unary(UnaryOp::Not, a) => match a.eval(resolver)? {
                Value::Bool(v) => Ok(Value::Bool(!v)),
                other => Err(Error::Type(format!(
                    "operator `!` requires Bool, got {}",
                    other.sort()
                ))),
            },
            Expr::Binary(op, a, b) => eval_binary(*op, a, b, resolver),
        }
    }
}

fn eval_binary(op: BinaryOp, a: &Expr, b: &Expr, resolver: &dyn Resolver) -> Result<Value> {
    let mismatch = |x: &Value, y: &Value| {
        Error::Type(format!(
            "operator `{}` cannot be applied to {} and {}",
            op,
            x.sort(),
            y.sort()
        ))
    };

    // Both sides are always evaluated so that type errors are never masked
    // by short-circuiting.
    let x = a.eval(resolver)?;
    let y = b.eval(resolver)?;

    let result = match (op, &x, &y) {
        (BinaryOp::Eq, Value::Int(l), Value::Int(r)) => l == r,
        (BinaryOp::Eq, Value::Bool(l), Value::Bool(r)) => l == r,
        (BinaryOp::Eq, Value::Str(l), Value::Str(r)) => l == r,
        (BinaryOp::Lt, Value::Int(l), Value::Int(r)) => l < r,
        (BinaryOp::Le, Value::Int(l), Value::Int(r)) => l <= r,
        (BinaryOp::Gt, Value::Int(l), Value::Int(r)) => l > r,
        (BinaryOp::Ge, Value::Int(l), Value::Int(r)) => l >= r,
        (BinaryOp::And, Value::Bool(l), Value::Bool(r)) => *l && *r,
        (BinaryOp::Or, Value::Bool(l), Value::Bool(r)) => *l || *r,
        _ => return Err(mismatch(&x, &y)),
    };
    Ok(Value::Bool(result))
}

/// Evaluates `expr` to a boolean, requiring every identifier to be known.
pub fn evaluate(expr: &Expr, resolver: &dyn Resolver) -> Result<bool> {
    match expr.eval(resolver)? {
        Value::Bool(v) => Ok(v),
        other => Err(Error::Type(format!(
            "predicate must be Bool, got {}",
            other.sort()
        ))),
    }
}
