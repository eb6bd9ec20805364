//! # The SMT engine
//!
//! Lowered predicates are decided by Z3. [`Engine`] owns a Z3 [`Context`];
//! [`Engine::checkout`] hands out a [`Checkout`] that pairs the context with a
//! fresh [`z3::Solver`] plus the table of declared variables. Dropping the
//! checkout resets the solver, whichever way its holder exits.
//!
//! Enumeration is incremental: after each model a blocking assertion
//! `!(x == v)` is added to the same solver and [`Checkout::check`] is called
//! again, so Z3 keeps everything it learned so far.
//!
//! ```
//! use predicate_rs::smt::{CheckResult, Engine, Term};
//! use predicate_rs::types::{Sort, Value};
//!
//! let mut engine = Engine::new();
//! let mut solver = engine.checkout();
//! let x = solver.declare("x", Sort::Int);
//! let three = solver.constant(&Value::Int(3)).unwrap();
//! let eq = solver.var(x).eq(&three).unwrap();
//! solver.assert(&eq);
//! match solver.check().unwrap() {
//!     CheckResult::Sat(model) => assert_eq!(model.value(x), &Value::Int(3)),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use std::cell::Cell;
use std::fmt::{self, Debug, Display, Formatter};

use log::debug;
use z3::ast::{self, Ast, Bool, Int};
use z3::{Config, Context, ContextHandle, SatResult, Solver};

use crate::error::{Error, Result};
use crate::types::{Sort, Value};

/// Handle of a variable declared in a [`Checkout`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarId(pub(crate) u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for VarId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A Z3 term of one of the three predicate sorts.
#[derive(Debug, Clone)]
pub enum Term<'ctx> {
    Int(Int<'ctx>),
    Bool(Bool<'ctx>),
    Str(ast::String<'ctx>),
}

impl<'ctx> Term<'ctx> {
    pub fn constant(ctx: &'ctx Context, value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Int(v) => Term::Int(Int::from_i64(ctx, *v)),
            Value::Bool(b) => Term::Bool(Bool::from_bool(ctx, *b)),
            Value::Str(s) => Term::Str(
                ast::String::from_str(ctx, s)
                    .map_err(|_| Error::NotSupported(format!("string {:?} contains a NUL byte", s)))?,
            ),
        })
    }

    pub fn sort(&self) -> Sort {
        match self {
            Term::Int(_) => Sort::Int,
            Term::Bool(_) => Sort::Bool,
            Term::Str(_) => Sort::String,
        }
    }

    /// `self == other`, or `None` if the sorts differ.
    pub fn eq(&self, other: &Term<'ctx>) -> Option<Bool<'ctx>> {
        match (self, other) {
            (Term::Int(a), Term::Int(b)) => Some(a._eq(b)),
            (Term::Bool(a), Term::Bool(b)) => Some(a._eq(b)),
            (Term::Str(a), Term::Str(b)) => Some(a._eq(b)),
            _ => None,
        }
    }

    fn read(&self, model: &z3::Model<'ctx>) -> Option<Value> {
        match self {
            Term::Int(x) => model.eval(x, true).and_then(|v| v.as_i64()).map(Value::Int),
            Term::Bool(x) => model.eval(x, true).and_then(|v| v.as_bool()).map(Value::Bool),
            Term::Str(x) => model.eval(x, true).and_then(|v| v.as_string()).map(Value::Str),
        }
    }
}

/// Values of all declared variables, indexed by [`VarId`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Model {
    values: Vec<Value>,
}

impl Model {
    pub fn value(&self, var: VarId) -> &Value {
        &self.values[var.index()]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CheckResult {
    Sat(Model),
    Unsat,
    /// Z3 gave up; carries its reason (`"canceled"` after an interrupt).
    Unknown(String),
}

pub struct Engine {
    ctx: Context,
    resets: Cell<u64>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            ctx: Self::context(),
            resets: Cell::new(0),
        }
    }

    fn context() -> Context {
        let mut cfg = Config::new();
        cfg.set_model_generation(true);
        Context::new(&cfg)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("resets", &self.resets.get()).finish()
    }
}

impl Engine {
    /// Number of checkouts that have ended (and reset their solver) so far.
    pub fn resets(&self) -> u64 {
        self.resets.get()
    }

    /// Replaces the Z3 context with a fresh one. Used after an interrupt, so
    /// a cancellation never carries over into the next call.
    pub fn renew(&mut self) {
        debug!("engine: replacing interrupted context");
        self.ctx = Self::context();
    }

    /// Exclusive use of the engine through a fresh solver that is
    /// [`reset`][z3::Solver::reset] when the guard drops.
    pub fn checkout(&mut self) -> Checkout<'_> {
        let engine: &Engine = self;
        Checkout {
            engine,
            solver: Solver::new(&engine.ctx),
            vars: Vec::new(),
        }
    }
}

/// Guard returned by [`Engine::checkout`].
pub struct Checkout<'ctx> {
    engine: &'ctx Engine,
    solver: Solver<'ctx>,
    vars: Vec<(String, Term<'ctx>)>,
}

impl Debug for Checkout<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkout")
            .field("num_vars", &self.vars.len())
            .field("num_assertions", &self.num_assertions())
            .finish()
    }
}

impl<'ctx> Checkout<'ctx> {
    pub fn context(&self) -> &'ctx Context {
        &self.engine.ctx
    }

    /// A handle that can interrupt a running [`check`][Checkout::check] from
    /// another thread.
    pub fn handle(&self) -> ContextHandle<'ctx> {
        self.context().handle()
    }

    /// Declares a fresh variable. Names are informational only; declaring the
    /// same name twice yields two distinct variables. Integer variables are
    /// bounded to the `i64` range.
    pub fn declare(&mut self, name: &str, sort: Sort) -> VarId {
        let ctx = self.context();
        let term = match sort {
            Sort::Int => {
                let x = Int::fresh_const(ctx, name);
                self.solver.assert(&x.ge(&Int::from_i64(ctx, i64::MIN)));
                self.solver.assert(&x.le(&Int::from_i64(ctx, i64::MAX)));
                Term::Int(x)
            }
            Sort::Bool => Term::Bool(Bool::fresh_const(ctx, name)),
            Sort::String => Term::Str(ast::String::fresh_const(ctx, name)),
        };
        let var = VarId(self.vars.len() as u32);
        self.vars.push((name.to_string(), term));
        var
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn var(&self, var: VarId) -> &Term<'ctx> {
        &self.vars[var.index()].1
    }

    pub fn sort(&self, var: VarId) -> Sort {
        self.var(var).sort()
    }

    pub fn name(&self, var: VarId) -> &str {
        &self.vars[var.index()].0
    }

    pub fn constant(&self, value: &Value) -> Result<Term<'ctx>> {
        Term::constant(self.context(), value)
    }

    pub fn assert(&mut self, formula: &Bool<'ctx>) {
        self.solver.assert(formula);
    }

    pub fn num_assertions(&self) -> usize {
        self.solver.get_assertions().len()
    }

    /// Asserts `var != value`.
    pub fn block(&mut self, var: VarId, value: &Value) -> Result<()> {
        let value = self.constant(value)?;
        let eq = self.var(var).eq(&value).ok_or_else(|| {
            Error::Type(format!(
                "cannot block {} of sort {} with a {} value",
                var,
                self.sort(var),
                value.sort()
            ))
        })?;
        self.solver.assert(&eq.not());
        Ok(())
    }

    /// Decides the conjunction of all assertions.
    pub fn check(&self) -> Result<CheckResult> {
        match self.solver.check() {
            SatResult::Sat => {
                let model = self
                    .solver
                    .get_model()
                    .ok_or_else(|| Error::Solver("satisfiable, but no model".to_string()))?;
                let values = self
                    .vars
                    .iter()
                    .map(|(name, term)| {
                        term.read(&model).ok_or_else(|| {
                            Error::Solver(format!("no {} value for `{}` in the model", term.sort(), name))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CheckResult::Sat(Model { values }))
            }
            SatResult::Unsat => Ok(CheckResult::Unsat),
            SatResult::Unknown => {
                let reason = self.solver.get_reason_unknown().unwrap_or_default();
                debug!("check: unknown ({})", reason);
                Ok(CheckResult::Unknown(reason))
            }
        }
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        debug!(
            "engine reset: {} vars, {} assertions dropped",
            self.vars.len(),
            self.num_assertions()
        );
        self.solver.reset();
        self.vars.clear();
        self.engine.resets.set(self.engine.resets.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn enumerate(solver: &mut Checkout<'_>, var: VarId) -> Vec<Value> {
        let mut found = Vec::new();
        while let CheckResult::Sat(model) = solver.check().unwrap() {
            let value = model.value(var).clone();
            solver.block(var, &value).unwrap();
            found.push(value);
        }
        found
    }

    #[test]
    fn test_int_range() {
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        let x = solver.declare("x", Sort::Int);
        let ctx = solver.context();
        let Term::Int(tx) = solver.var(x).clone() else { unreachable!() };
        solver.assert(&tx.ge(&Int::from_i64(ctx, -2)));
        solver.assert(&tx.le(&Int::from_i64(ctx, 2)));
        let mut values = enumerate(&mut solver, x);
        values.sort_by_key(|v| v.as_int());
        let expected: Vec<Value> = (-2..=2).map(Value::Int).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_int_bounded_to_i64() {
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        let x = solver.declare("x", Sort::Int);
        let max = solver.constant(&Value::Int(i64::MAX)).unwrap();
        let Term::Int(tx) = solver.var(x).clone() else { unreachable!() };
        let Term::Int(max) = max else { unreachable!() };
        solver.assert(&tx.ge(&max));
        assert_eq!(enumerate(&mut solver, x), vec![Value::Int(i64::MAX)]);
    }

    #[test]
    fn test_string_alternatives() {
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        let role = solver.declare("role", Sort::String);
        let admin = solver.constant(&Value::from("admin")).unwrap();
        let auditor = solver.constant(&Value::from("auditor")).unwrap();
        let either = Bool::or(
            solver.context(),
            &[&solver.var(role).eq(&admin).unwrap(), &solver.var(role).eq(&auditor).unwrap()],
        );
        solver.assert(&either);
        let mut values = enumerate(&mut solver, role);
        values.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        assert_eq!(values, vec![Value::from("admin"), Value::from("auditor")]);
    }

    #[test]
    fn test_bool_model_covers_every_var() {
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        let flag = solver.declare("flag", Sort::Bool);
        let other = solver.declare("other", Sort::Int);
        let Term::Bool(tf) = solver.var(flag).clone() else { unreachable!() };
        solver.assert(&tf);
        match solver.check().unwrap() {
            CheckResult::Sat(model) => {
                assert_eq!(model.values().len(), 2);
                assert_eq!(model.value(flag), &Value::Bool(true));
                assert_eq!(model.value(other).sort(), Sort::Int);
            }
            other => panic!("expected sat, got {:?}", other),
        }
        assert_eq!(enumerate(&mut solver, flag), vec![Value::Bool(true)]);
    }

    #[test]
    fn test_unsat_and_trivial() {
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        assert!(matches!(solver.check(), Ok(CheckResult::Sat(_))));
        let falsum = Bool::from_bool(solver.context(), false);
        solver.assert(&falsum);
        assert_eq!(solver.check(), Ok(CheckResult::Unsat));
    }

    #[test]
    fn test_block_sort_mismatch() {
        let mut engine = Engine::new();
        let mut solver = engine.checkout();
        let x = solver.declare("x", Sort::Int);
        assert!(matches!(solver.block(x, &Value::from("a")), Err(Error::Type(_))));
        assert!(matches!(
            solver.constant(&Value::from("a\0b")),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_checkout_resets() {
        let mut engine = Engine::new();
        {
            let mut solver = engine.checkout();
            let x = solver.declare("x", Sort::Bool);
            assert_eq!(solver.name(x), "x");
            let Term::Bool(tx) = solver.var(x).clone() else { unreachable!() };
            solver.assert(&tx);
            assert_eq!(solver.num_assertions(), 1);
        }
        assert_eq!(engine.resets(), 1);
        let solver = engine.checkout();
        assert_eq!(solver.num_vars(), 0);
        assert_eq!(solver.num_assertions(), 0);
    }

    #[test]
    fn test_checkout_resets_on_panic() {
        let mut engine = Engine::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut solver = engine.checkout();
            solver.declare("x", Sort::Int);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(engine.resets(), 1);
    }

    #[test]
    fn test_renewed_context_is_usable() {
        let mut engine = Engine::new();
        engine.checkout().handle().interrupt();
        engine.renew();
        let mut solver = engine.checkout();
        let x = solver.declare("x", Sort::Bool);
        let Term::Bool(tx) = solver.var(x).clone() else { unreachable!() };
        solver.assert(&tx.not());
        assert_eq!(enumerate(&mut solver, x), vec![Value::Bool(false)]);
    }
}
