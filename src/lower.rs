//! Lowering of parsed predicates into Z3 formulas.
//!
//! Each distinct identifier path is resolved at most once per lowering. A
//! resolved path becomes a constant of the value's sort; an unresolved one
//! becomes a solver variable. The variable's sort comes from the operator it
//! is first used with (`!`/`&&`/`||` need Bool, orderings need Int, `==` takes
//! the sort of its other operand), except for the query path, whose sort is
//! given up front and which is never passed to the resolver.

use std::collections::HashMap;

use log::debug;
use z3::ast::{self, Ast, Bool, Int};

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{Error, Result};
use crate::resolve::Resolver;
use crate::smt::{Checkout, Term, VarId};
use crate::types::{Sort, Value};

/// Result of lowering a predicate.
#[derive(Debug, Clone)]
pub struct Lowered<'ctx> {
    pub formula: Bool<'ctx>,
    /// Variable of the query path, if the predicate mentions it.
    pub query: Option<VarId>,
}

#[derive(Debug, Clone)]
enum Binding {
    Known(Value),
    Var(VarId),
    /// Unresolved, sort not decided yet.
    Pending,
}

#[derive(Debug, Clone)]
enum Node<'ctx> {
    Bool(Bool<'ctx>),
    Int(Int<'ctx>),
    Str(ast::String<'ctx>),
    /// Unresolved identifier without a sort.
    Free(String),
}

impl<'ctx> From<Term<'ctx>> for Node<'ctx> {
    fn from(term: Term<'ctx>) -> Self {
        match term {
            Term::Int(x) => Node::Int(x),
            Term::Bool(x) => Node::Bool(x),
            Term::Str(x) => Node::Str(x),
        }
    }
}

impl Node<'_> {
    fn sort(&self) -> Option<Sort> {
        match self {
            Node::Bool(_) => Some(Sort::Bool),
            Node::Int(_) => Some(Sort::Int),
            Node::Str(_) => Some(Sort::String),
            Node::Free(_) => None,
        }
    }
}

fn mismatch(op: &str, expected: Sort, lhs: Sort, rhs: Sort) -> Error {
    Error::Type(format!(
        "operator `{}` expects {} operands, found {} and {}",
        op, expected, lhs, rhs
    ))
}

struct Lowerer<'a, 'ctx> {
    solver: &'a mut Checkout<'ctx>,
    resolver: &'a dyn Resolver,
    query: Option<(&'a str, Sort)>,
    idents: HashMap<String, Binding>,
    query_var: Option<VarId>,
}

impl<'ctx> Lowerer<'_, 'ctx> {
    fn constant(&self, value: &Value) -> Result<Node<'ctx>> {
        Ok(self.solver.constant(value)?.into())
    }

    fn var(&self, var: VarId) -> Node<'ctx> {
        self.solver.var(var).clone().into()
    }

    fn node(&self, key: &str, binding: &Binding) -> Result<Node<'ctx>> {
        match binding {
            Binding::Known(value) => self.constant(value),
            Binding::Var(var) => Ok(self.var(*var)),
            Binding::Pending => Ok(Node::Free(key.to_string())),
        }
    }

    fn identifier(&mut self, path: &[String]) -> Result<Node<'ctx>> {
        let key = path.join(".");
        if let Some(binding) = self.idents.get(&key) {
            return self.node(&key, binding);
        }

        let binding = match self.query {
            Some((query, sort)) if query == key => {
                let var = self.solver.declare(&key, sort);
                self.query_var = Some(var);
                debug!("query `{}` bound to {} of sort {}", key, var, sort);
                Binding::Var(var)
            }
            _ => match self.resolver.resolve(path) {
                Some(value) => {
                    debug!("`{}` resolved to {}", key, value);
                    Binding::Known(value)
                }
                None => {
                    debug!("`{}` is unknown", key);
                    Binding::Pending
                }
            },
        };
        let node = self.node(&key, &binding)?;
        self.idents.insert(key, binding);
        Ok(node)
    }

    /// Gives a free identifier the sort `sort`; other nodes are returned as is.
    fn pin(&mut self, node: Node<'ctx>, sort: Sort) -> Node<'ctx> {
        match node {
            Node::Free(key) => {
                // Another use of the same path may have decided it already.
                if let Some(Binding::Var(var)) = self.idents.get(&key) {
                    return self.var(*var);
                }
                let var = self.solver.declare(&key, sort);
                debug!("`{}` inferred as {} ({})", key, sort, var);
                self.idents.insert(key, Binding::Var(var));
                self.var(var)
            }
            other => other,
        }
    }

    fn lower(&mut self, expr: &Expr) -> Result<Node<'ctx>> {
        match expr {
            Expr::Literal(value) => self.constant(value),
            Expr::Identifier(path) => self.identifier(path),
            Expr::Unary(UnaryOp::Not, inner) => {
                let inner = self.lower(inner)?;
                match self.pin(inner, Sort::Bool) {
                    Node::Bool(f) => Ok(Node::Bool(f.not())),
                    other => Err(Error::Type(format!(
                        "operator `!` expects a Bool operand, found {}",
                        other.sort().unwrap_or(Sort::Bool)
                    ))),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.lower(lhs)?;
                let rhs = self.lower(rhs)?;
                self.binary(*op, lhs, rhs)
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: Node<'ctx>, rhs: Node<'ctx>) -> Result<Node<'ctx>> {
        let expected = match op {
            BinaryOp::And | BinaryOp::Or => Sort::Bool,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Sort::Int,
            BinaryOp::Eq => match (lhs.sort(), rhs.sort()) {
                (Some(a), Some(b)) if a != b => return Err(mismatch("==", a, a, b)),
                (Some(sort), _) | (_, Some(sort)) => sort,
                (None, None) => {
                    return Err(Error::Type(format!(
                        "cannot infer the sort of `{}` and `{}` in `==`",
                        free_name(&lhs),
                        free_name(&rhs)
                    )))
                }
            },
        };

        let ctx = self.solver.context();
        let lhs = self.pin(lhs, expected);
        let rhs = self.pin(rhs, expected);
        let formula = match (op, lhs, rhs) {
            (BinaryOp::And, Node::Bool(a), Node::Bool(b)) => Bool::and(ctx, &[&a, &b]),
            (BinaryOp::Or, Node::Bool(a), Node::Bool(b)) => Bool::or(ctx, &[&a, &b]),
            (BinaryOp::Eq, Node::Bool(a), Node::Bool(b)) => a._eq(&b),
            (BinaryOp::Eq, Node::Int(a), Node::Int(b)) => a._eq(&b),
            (BinaryOp::Eq, Node::Str(a), Node::Str(b)) => a._eq(&b),
            (BinaryOp::Lt, Node::Int(a), Node::Int(b)) => a.lt(&b),
            (BinaryOp::Le, Node::Int(a), Node::Int(b)) => a.le(&b),
            (BinaryOp::Gt, Node::Int(a), Node::Int(b)) => a.gt(&b),
            (BinaryOp::Ge, Node::Int(a), Node::Int(b)) => a.ge(&b),
            (op, lhs, rhs) => {
                return Err(mismatch(
                    op.symbol(),
                    expected,
                    lhs.sort().unwrap_or(expected),
                    rhs.sort().unwrap_or(expected),
                ))
            }
        };
        Ok(Node::Bool(formula))
    }
}

fn free_name<'a>(node: &'a Node<'_>) -> &'a str {
    match node {
        Node::Free(key) => key,
        _ => "?",
    }
}

/// Lowers `expr` into a formula over variables declared in `solver`.
///
/// With `query = Some((path, sort))`, `path` becomes a variable of `sort`
/// regardless of what the resolver knows about it.
pub fn lower<'ctx>(
    expr: &Expr,
    solver: &mut Checkout<'ctx>,
    resolver: &dyn Resolver,
    query: Option<(&str, Sort)>,
) -> Result<Lowered<'ctx>> {
    let mut lowerer = Lowerer {
        solver,
        resolver,
        query,
        idents: HashMap::new(),
        query_var: None,
    };
    let node = lowerer.lower(expr)?;
    let formula = match lowerer.pin(node, Sort::Bool) {
        Node::Bool(formula) => formula,
        other => {
            return Err(Error::Type(format!(
                "predicate must be Bool, found {}",
                other.sort().unwrap_or(Sort::Bool)
            )))
        }
    };
    debug!("lowered formula: {}", formula);
    Ok(Lowered {
        formula,
        query: lowerer.query_var,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use test_log::test;

    use super::*;
    use crate::parser::parse;
    use crate::resolve::{Bindings, Unresolved};
    use crate::smt::{CheckResult, Engine};

    /// Lowers `src` and returns the declared variables with their sorts.
    fn declared(src: &str, resolver: &dyn Resolver, query: Option<(&str, Sort)>) -> Result<Vec<(String, Sort)>> {
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        lower(&parse(src)?, &mut solver, resolver, query)?;
        Ok((0..solver.num_vars() as u32)
            .map(|i| {
                let var = VarId(i);
                (solver.name(var).to_string(), solver.sort(var))
            })
            .collect())
    }

    #[test]
    fn test_sort_inference() {
        let sorts = declared(r#"a && b > 3 && c == "x" && d == b"#, &Unresolved, None).unwrap();
        assert_eq!(
            sorts,
            vec![
                ("b".to_string(), Sort::Int),
                ("a".to_string(), Sort::Bool),
                ("c".to_string(), Sort::String),
                ("d".to_string(), Sort::Int),
            ]
        );
    }

    #[test]
    fn test_query_ignores_resolver() {
        let bindings = Bindings::new().with("age", 40);
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        let lowered = lower(&parse("age >= 18").unwrap(), &mut solver, &bindings, Some(("age", Sort::Int))).unwrap();
        let var = lowered.query.unwrap();
        assert_eq!(solver.sort(var), Sort::Int);
        assert_eq!(solver.name(var), "age");
    }

    #[test]
    fn test_query_absent() {
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        let lowered = lower(&parse("a || b").unwrap(), &mut solver, &Unresolved, Some(("c", Sort::Bool))).unwrap();
        assert_eq!(lowered.query, None);
    }

    #[test]
    fn test_known_values_fold() {
        let bindings = Bindings::new().with("env.stage", "dev");
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        let expr = parse(r#"env.stage == "prod" && level > 3"#).unwrap();
        let lowered = lower(&expr, &mut solver, &bindings, Some(("level", Sort::Int))).unwrap();
        assert_eq!(lowered.formula.simplify().as_bool(), Some(false));
        assert!(lowered.query.is_some());
    }

    #[test]
    fn test_known_bool() {
        let bindings = Bindings::new().with("user.admin", true);
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        let lowered = lower(&parse("!user.admin").unwrap(), &mut solver, &bindings, None).unwrap();
        assert_eq!(solver.num_vars(), 0);
        solver.assert(&lowered.formula);
        assert_eq!(solver.check(), Ok(CheckResult::Unsat));
    }

    #[test]
    fn test_resolver_called_once_per_path() {
        let calls = Cell::new(0);
        let resolver = |path: &[String]| -> Option<Value> {
            calls.set(calls.get() + 1);
            (path == ["limit"]).then_some(Value::Int(10))
        };
        declared("x < limit && x > 0 && limit > 5 && x == x", &resolver, None).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_type_errors() {
        let cases = [
            r#"age < "x""#,
            "a == b",
            "!1",
            "1",
            r#""a" == 3"#,
            "flag && flag > 1",
            "x > 1 && x",
        ];
        for src in cases {
            let result = declared(src, &Unresolved, None);
            assert!(matches!(result, Err(Error::Type(_))), "{}: {:?}", src, result);
        }
    }

    #[test]
    fn test_mismatch_message() {
        let err = declared(r#"x < "a""#, &Unresolved, None).unwrap_err();
        assert_eq!(
            err,
            Error::Type("operator `<` expects Int operands, found Int and String".to_string())
        );
        let bindings = Bindings::new().with("tier", 2);
        let err = declared(r#"tier == "gold""#, &bindings, None).unwrap_err();
        assert_eq!(
            err,
            Error::Type("operator `==` expects Int operands, found Int and String".to_string())
        );
    }

    #[test]
    fn test_query_sort_drives_equality() {
        let sorts = declared("role == other", &Unresolved, Some(("role", Sort::String))).unwrap();
        assert_eq!(
            sorts,
            vec![("role".to_string(), Sort::String), ("other".to_string(), Sort::String)]
        );
    }
}
