//! Partial evaluation: which values of one unknown identifier satisfy a
//! predicate, given everything else the resolver knows?
//!
//! [`Solver::solve_for_all`] enumerates models with blocking clauses: after
//! each model the query variable is constrained to differ from the value just
//! read, and the loop ends when the engine reports unsatisfiable. The engine
//! is checked out for the duration of a call and reset on every exit path, so
//! one `Solver` can serve any number of unrelated calls.
//!
//! ```
//! use std::time::Duration;
//!
//! use predicate_rs::partial::Solver;
//! use predicate_rs::resolve::Unresolved;
//! use predicate_rs::types::{Sort, Value};
//!
//! let mut solver = Solver::new();
//! let mut ages = solver
//!     .solve_for_all("age >= 18 && age < 21", &Unresolved, "age", Sort::Int, Duration::from_secs(5))
//!     .unwrap();
//! ages.sort_by_key(|v| v.as_int());
//! assert_eq!(ages, vec![Value::Int(18), Value::Int(19), Value::Int(20)]);
//! ```

use std::time::{Duration, Instant};

use log::debug;

use crate::ast::Expr;
use crate::error::{Error, Result};
use crate::lower::lower;
use crate::parser::parse;
use crate::resolve::{Resolver, Unresolved};
use crate::sat;
use crate::smt::{CheckResult, Engine};
use crate::supervisor::run_with_deadline;
use crate::types::{Sort, Value};

#[derive(Debug, Default)]
pub struct Solver {
    engine: Engine,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying engine. Between calls no solver is checked out of it.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns every value of `query` (of sort `sort`) for which `predicate`
    /// holds, in discovery order and without duplicates.
    ///
    /// `query` is treated as unknown even if `resolver` knows it. Fails with
    /// [`Error::NotFound`] if the predicate never mentions `query`, and with
    /// [`Error::Timeout`] if enumeration does not finish within `timeout`;
    /// no partial result is returned in that case.
    pub fn solve_for_all<R>(
        &mut self,
        predicate: &str,
        resolver: &R,
        query: &str,
        sort: Sort,
        timeout: Duration,
    ) -> Result<Vec<Value>>
    where
        R: Resolver,
    {
        let deadline = Instant::now() + timeout;
        let result = {
            let mut solver = self.engine.checkout();
            let handle = solver.handle();
            run_with_deadline(move || handle.interrupt(), timeout, || {
                let expr = parse(predicate)?;
                let lowered = lower(&expr, &mut solver, resolver, Some((query, sort)))?;
                let var = lowered
                    .query
                    .ok_or_else(|| Error::NotFound(query.to_string()))?;
                solver.assert(&lowered.formula);

                let mut values = Vec::new();
                loop {
                    // An interrupt that lands between two checks is not seen by Z3.
                    if Instant::now() >= deadline {
                        return Err(Error::Timeout(timeout));
                    }
                    match solver.check()? {
                        CheckResult::Sat(model) => {
                            let value = model.value(var).clone();
                            debug!("`{}` = {} (#{})", query, value, values.len() + 1);
                            solver.block(var, &value)?;
                            values.push(value);
                        }
                        CheckResult::Unsat => break,
                        CheckResult::Unknown(reason) => return Err(Error::Solver(reason)),
                    }
                }
                debug!("`{}`: {} values", query, values.len());
                Ok(values)
            })
        };
        self.settle(result)
    }

    /// Decides whether some assignment of the unknown identifiers satisfies
    /// `predicate`.
    ///
    /// Purely boolean predicates take the DPLL path; everything else goes
    /// through Z3 under `timeout`.
    pub fn check<R>(&mut self, predicate: &str, resolver: &R, timeout: Duration) -> Result<bool>
    where
        R: Resolver,
    {
        let expr = parse(predicate)?;
        if expr.is_propositional() {
            debug!("check: boolean predicate, using dpll");
            sat::is_satisfiable_expr(&expr, resolver)
        } else {
            self.is_satisfiable(&expr, resolver, timeout)
        }
    }

    /// Decides `expr` with Z3, whatever its shape.
    pub fn is_satisfiable<R>(&mut self, expr: &Expr, resolver: &R, timeout: Duration) -> Result<bool>
    where
        R: Resolver,
    {
        let result = {
            let mut solver = self.engine.checkout();
            let handle = solver.handle();
            run_with_deadline(move || handle.interrupt(), timeout, || {
                let lowered = lower(expr, &mut solver, resolver, None)?;
                solver.assert(&lowered.formula);
                match solver.check()? {
                    CheckResult::Sat(_) => Ok(true),
                    CheckResult::Unsat => Ok(false),
                    CheckResult::Unknown(reason) => Err(Error::Solver(reason)),
                }
            })
        };
        self.settle(result)
    }

    /// A context that may have seen an interrupt is not reused.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(Error::Timeout(_))) {
            self.engine.renew();
        }
        result
    }
}

/// One-shot [`Solver::solve_for_all`] with no known identifiers.
pub fn solve_for_all(predicate: &str, query: &str, sort: Sort, timeout: Duration) -> Result<Vec<Value>> {
    Solver::new().solve_for_all(predicate, &Unresolved, query, sort, timeout)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::resolve::Bindings;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn sorted(mut values: Vec<Value>) -> Vec<Value> {
        values.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        values
    }

    #[test]
    fn test_int_range() {
        let values = solve_for_all("age >= 18 && age < 21", "age", Sort::Int, TIMEOUT).unwrap();
        assert_eq!(sorted(values), vec![Value::Int(18), Value::Int(19), Value::Int(20)]);
    }

    #[test]
    fn test_string_alternatives() {
        let values = solve_for_all(r#"role == "admin" || role == "auditor""#, "role", Sort::String, TIMEOUT).unwrap();
        assert_eq!(sorted(values), vec![Value::from("admin"), Value::from("auditor")]);
    }

    #[test]
    fn test_known_mismatch_is_empty() {
        let bindings = Bindings::new().with("env.stage", "dev");
        let values = Solver::new()
            .solve_for_all(r#"env.stage == "prod" && level > 3"#, &bindings, "level", Sort::Int, TIMEOUT)
            .unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_bool_query() {
        let bindings = Bindings::new().with("user.admin", false);
        let values = Solver::new()
            .solve_for_all("user.admin || override", &bindings, "override", Sort::Bool, TIMEOUT)
            .unwrap();
        assert_eq!(values, vec![Value::Bool(true)]);
    }

    #[test]
    fn test_negative_range() {
        let values = solve_for_all("x > -3 && x <= -1", "x", Sort::Int, TIMEOUT).unwrap();
        assert_eq!(sorted(values), vec![Value::Int(-1), Value::Int(-2)]);
    }

    #[test]
    fn test_query_overrides_resolver() {
        let bindings = Bindings::new().with("age", 40).with("limit", 3);
        let values = Solver::new()
            .solve_for_all("age >= 0 && age < limit", &bindings, "age", Sort::Int, TIMEOUT)
            .unwrap();
        assert_eq!(sorted(values), vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_query_not_found() {
        let result = solve_for_all("a && b", "c", Sort::Bool, TIMEOUT);
        assert_eq!(result, Err(Error::NotFound("c".to_string())));
    }

    #[test]
    fn test_errors_propagate() {
        assert!(matches!(
            solve_for_all("a ==", "a", Sort::Int, TIMEOUT),
            Err(Error::Syntax { .. })
        ));
        assert!(matches!(
            solve_for_all("f(a)", "a", Sort::Int, TIMEOUT),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            solve_for_all(r#"a < "x""#, "a", Sort::Int, TIMEOUT),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn test_engine_reset_after_each_call() {
        let mut solver = Solver::new();
        solver
            .solve_for_all("x > 0 && x < 3", &Unresolved, "x", Sort::Int, TIMEOUT)
            .unwrap();
        assert_eq!(solver.engine().resets(), 1);

        let result = solver.solve_for_all("x >", &Unresolved, "x", Sort::Int, TIMEOUT);
        assert!(result.is_err());
        assert_eq!(solver.engine().resets(), 2);
    }

    #[test]
    fn test_timeout_then_reuse() {
        let mut solver = Solver::new();
        let result = solver.solve_for_all("x > 0", &Unresolved, "x", Sort::Int, Duration::from_millis(50));
        assert_eq!(result, Err(Error::Timeout(Duration::from_millis(50))));
        assert_eq!(solver.engine().resets(), 1);

        let values = solver
            .solve_for_all("x >= 1 && x <= 2", &Unresolved, "x", Sort::Int, TIMEOUT)
            .unwrap();
        assert_eq!(sorted(values), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_check_routes() {
        let mut solver = Solver::new();
        assert_eq!(solver.check("a && !a", &Unresolved, TIMEOUT), Ok(false));
        assert_eq!(solver.check("a || b", &Unresolved, TIMEOUT), Ok(true));
        assert_eq!(solver.check("x > 3 && x < 4", &Unresolved, TIMEOUT), Ok(false));
        assert_eq!(solver.check("x > 3 && x < 5", &Unresolved, TIMEOUT), Ok(true));
        let bindings = Bindings::new().with("x", 7);
        assert_eq!(solver.check("x > 3 && x < 5", &bindings, TIMEOUT), Ok(false));
    }

    #[test]
    fn test_check_type_checks_tautology_operands() {
        let bindings = Bindings::new().with("a", 1);
        let mut solver = Solver::new();
        assert!(matches!(
            solver.check("(a || !a) && b", &bindings, TIMEOUT),
            Err(Error::Type(_))
        ));
        let expr = parse("(a || !a) && b").unwrap();
        assert!(matches!(
            solver.is_satisfiable(&expr, &bindings, TIMEOUT),
            Err(Error::Type(_))
        ));
    }
}
