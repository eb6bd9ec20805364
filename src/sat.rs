//! Satisfiability of purely boolean predicates.
//!
//! This path skips the SMT engine entirely: the predicate is converted to
//! clause form, identifiers the resolver knows become fixed assignments, and
//! the remaining identifiers are searched by [`dpll`][crate::dpll]. It
//! answers satisfiability only; enumeration needs
//! [`Solver::solve_for_all`][crate::partial::Solver::solve_for_all].

use std::collections::HashMap;

use log::debug;

use crate::ast::Expr;
use crate::cnf::to_cnf;
use crate::dpll::{Lit, State, Var};
use crate::error::{Error, Result};
use crate::parser::parse;
use crate::resolve::Resolver;
use crate::types::Value;

/// Parses `predicate` and decides whether some assignment of the unknown
/// identifiers makes it true.
pub fn is_satisfiable(predicate: &str, resolver: &dyn Resolver) -> Result<bool> {
    let expr = parse(predicate)?;
    is_satisfiable_expr(&expr, resolver)
}

/// Same as [`is_satisfiable`] for an already parsed predicate.
///
/// Every identifier is resolved (once) before clause conversion, so a path
/// whose clauses are later dropped as tautologies is still type-checked.
pub fn is_satisfiable_expr(expr: &Expr, resolver: &dyn Resolver) -> Result<bool> {
    let mut vars: HashMap<String, Var> = HashMap::new();
    let mut fixed: Vec<(Var, bool)> = Vec::new();
    for key in expr.identifiers() {
        let var = Var::new(vars.len() as u32);
        let path: Vec<String> = key.split('.').map(str::to_string).collect();
        match resolver.resolve(&path) {
            Some(Value::Bool(value)) => fixed.push((var, value)),
            Some(other) => {
                return Err(Error::Type(format!(
                    "identifier `{}` resolved to {}, expected Bool",
                    key,
                    other.sort()
                )));
            }
            None => {}
        }
        vars.insert(key, var);
    }

    let cnf = to_cnf(expr)?;
    let mut clauses: Vec<Vec<Lit>> = Vec::with_capacity(cnf.len());
    for clause in &cnf {
        let mut lits = Vec::with_capacity(clause.len());
        for literal in clause {
            let var = vars.get(&literal.key).copied().ok_or_else(|| {
                Error::NotFound(literal.key.clone())
            })?;
            lits.push(Lit::new(var, !literal.positive));
        }
        clauses.push(lits);
    }

    debug!(
        "dpll: {} clauses over {} identifiers ({} known)",
        clauses.len(),
        vars.len(),
        fixed.len()
    );

    let outcome = State::new(vars.len(), clauses, &fixed).solve();
    Ok(outcome.is_sat())
}
