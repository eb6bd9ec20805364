//! # predicate-rs: Partial evaluation of policy predicates
//!
//! **`predicate-rs`** answers the question *"for which values of this one unknown
//! identifier does the predicate hold, given everything else we know?"*.
//! It is meant for policy engines: the known facts come from a request context,
//! the unknown one is the attribute being queried.
//!
//! ## How it works
//!
//! A predicate such as `age >= 18 && age < 21` is parsed into an [`Expr`][crate::ast::Expr] tree,
//! lowered into a Z3 formula (known identifiers become constants, unknown ones become variables),
//! and handed to a Z3 solver. The solver reports one model at a time;
//! after each model the queried value is blocked and the solver is asked again,
//! until no model is left.
//!
//! - **Integers** are Z3 integers bounded to the `i64` range.
//! - **Strings** support equality only.
//! - **Booleans** are plain propositional variables.
//!
//! Purely boolean predicates can skip Z3 and go through a standalone DPLL solver ([`sat`]).
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use predicate_rs::partial::Solver;
//! use predicate_rs::resolve::Bindings;
//! use predicate_rs::types::{Sort, Value};
//!
//! // 1. Describe what is known
//! let known = Bindings::new().with("env.stage", "prod");
//!
//! // 2. Ask for every `level` that satisfies the predicate
//! let mut solver = Solver::new();
//! let mut levels = solver
//!     .solve_for_all(
//!         r#"env.stage == "prod" && level > 3 && level <= 5"#,
//!         &known,
//!         "level",
//!         Sort::Int,
//!         Duration::from_secs(5),
//!     )
//!     .unwrap();
//! levels.sort_by_key(|v| v.as_int());
//! assert_eq!(levels, vec![Value::Int(4), Value::Int(5)]);
//!
//! // 3. The same solver can be reused right away
//! assert_eq!(solver.engine().resets(), 1);
//! ```
//!
//! Enumeration over an unbounded domain (`level > 3` alone) never runs out of models,
//! which is why every call takes a timeout.
//!
//! ## Core Components
//!
//! - **[`parser`]**: Predicate grammar and [`parse`][crate::parser::parse].
//! - **[`lower`]**: Identifier resolution and sort inference.
//! - **[`smt`]**: The Z3-backed [`Engine`][crate::smt::Engine] and its checkout guard.
//! - **[`partial`]**: The [`Solver`][crate::partial::Solver] front end (`solve_for_all`, `check`).
//! - **[`dpll`]**: The propositional search core behind [`sat`].

pub mod ast;
pub mod cnf;
pub mod dpll;
pub mod error;
pub mod eval;
pub mod lower;
pub mod parser;
pub mod partial;
pub mod resolve;
pub mod sat;
pub mod smt;
pub mod supervisor;
pub mod types;

pub use crate::error::{Error, Result};
