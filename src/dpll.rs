//! DPLL satisfiability search.
//!
//! The search works on clauses over [`Lit`]s and proceeds in three phases:
//!
//! 1. **Classify.** Clauses whose literals are all fixed up front go to the
//!    `enforce` bucket, clauses with exactly one free literal go to `uprop`,
//!    and every other clause watches two of its free literals.
//! 2. **Check enforce.** An enforce clause that does not evaluate to
//!    satisfied makes the formula unsatisfiable without any search; uprop
//!    clauses then force their free literal.
//! 3. **Search.** Pick the first free literal of the first clause not yet
//!    satisfied, try `true`, propagate units through the watch lists, and on
//!    conflict undo back to the most recent decision that has not been
//!    flipped yet and flip it (chronological backtracking).

use std::fmt::{self, Display, Formatter};
use std::ops::Neg;

use log::trace;

/// A propositional variable (0-indexed).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(u32);

impl Var {
    pub const fn new(index: u32) -> Self {
        Var(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn pos(self) -> Lit {
        Lit::new(self, false)
    }

    pub const fn neg(self) -> Lit {
        Lit::new(self, true)
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// A variable together with a polarity, packed as `var << 1 | negated`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Lit(u32);

impl Lit {
    pub const fn new(var: Var, negated: bool) -> Self {
        Lit((var.0 << 1) | negated as u32)
    }

    pub const fn var(self) -> Var {
        Var(self.0 >> 1)
    }

    pub const fn is_negated(self) -> bool {
        self.0 & 1 != 0
    }

    /// Position of this literal in per-literal tables.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Neg for Lit {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Lit(self.0 ^ 1)
    }
}

impl Display for Lit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            if self.is_negated() { "~" } else { "" },
            self.var()
        )
    }
}

/// Three-valued clause evaluation result.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClauseState {
    Satisfied,
    Unsatisfied,
    Unknown,
}

/// Partial assignment with an ordered trail; backtracking truncates it.
#[derive(Debug, Clone)]
pub struct Assignment {
    values: Vec<Option<bool>>,
    trail: Vec<(Var, bool)>,
}

impl Assignment {
    fn new(num_vars: usize) -> Self {
        Self {
            values: vec![None; num_vars],
            trail: Vec::new(),
        }
    }

    pub fn value(&self, var: Var) -> Option<bool> {
        self.values.get(var.index()).copied().flatten()
    }

    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        self.value(lit.var()).map(|v| v != lit.is_negated())
    }

    pub fn trail(&self) -> &[(Var, bool)] {
        &self.trail
    }

    pub fn num_vars(&self) -> usize {
        self.values.len()
    }

    fn assign(&mut self, var: Var, value: bool) {
        debug_assert!(self.values[var.index()].is_none(), "{} assigned twice", var);
        self.values[var.index()] = Some(value);
        self.trail.push((var, value));
    }

    fn truncate(&mut self, len: usize) {
        while self.trail.len() > len {
            if let Some((var, _)) = self.trail.pop() {
                self.values[var.index()] = None;
            }
        }
    }
}

/// Evaluates one clause under a (partial) assignment.
pub fn eval_clause(clause: &[Lit], assignment: &Assignment) -> ClauseState {
    let mut unknown = false;
    for &lit in clause {
        match assignment.lit_value(lit) {
            Some(true) => return ClauseState::Satisfied,
            Some(false) => {}
            None => unknown = true,
        }
    }
    if unknown {
        ClauseState::Unknown
    } else {
        ClauseState::Unsatisfied
    }
}

#[derive(Debug)]
pub enum Outcome {
    Sat(Assignment),
    Unsat,
}

impl Outcome {
    pub fn is_sat(&self) -> bool {
        matches!(self, Outcome::Sat(_))
    }
}

#[derive(Debug, Copy, Clone)]
struct Decision {
    trail_len: usize,
    var: Var,
    value: bool,
    flipped: bool,
}

enum Pick {
    Var(Var),
    Done,
    Conflict,
}

/// Formula state for one satisfiability check.
#[derive(Debug)]
pub struct State {
    clauses: Vec<Vec<Lit>>,
    assignment: Assignment,
    /// Clause indices watching each literal, indexed by [`Lit::index`].
    watched: Vec<Vec<usize>>,
    enforce: Vec<usize>,
    uprop: Vec<usize>,
    decisions: Vec<Decision>,
    /// Next trail position whose consequences have not been propagated.
    queue_head: usize,
}

impl State {
    /// Builds the state for `clauses` over `num_vars` variables, with the
    /// variables in `fixed` assigned before the search starts.
    pub fn new(num_vars: usize, clauses: Vec<Vec<Lit>>, fixed: &[(Var, bool)]) -> Self {
        let mut assignment = Assignment::new(num_vars);
        for &(var, value) in fixed {
            if assignment.value(var).is_none() {
                assignment.assign(var, value);
            }
        }

        let mut state = Self {
            clauses,
            queue_head: assignment.trail.len(),
            assignment,
            watched: vec![Vec::new(); 2 * num_vars],
            enforce: Vec::new(),
            uprop: Vec::new(),
            decisions: Vec::new(),
        };
        state.classify();
        state
    }

    fn classify(&mut self) {
        for (i, clause) in self.clauses.iter_mut().enumerate() {
            // Move free literals to the front so that positions 0 and 1 hold
            // the watches.
            let assignment = &self.assignment;
            clause.sort_by_key(|&lit| assignment.lit_value(lit).is_some());
            let free = clause
                .iter()
                .take_while(|&&lit| assignment.lit_value(lit).is_none())
                .count();
            match free {
                0 => self.enforce.push(i),
                1 => self.uprop.push(i),
                _ => {
                    self.watched[clause[0].index()].push(i);
                    self.watched[clause[1].index()].push(i);
                }
            }
        }
        trace!(
            "classified {} clauses: {} enforce, {} uprop",
            self.clauses.len(),
            self.enforce.len(),
            self.uprop.len()
        );
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    pub fn enforce(&self) -> impl Iterator<Item = &[Lit]> {
        self.enforce.iter().map(|&i| self.clauses[i].as_slice())
    }

    pub fn uprop(&self) -> impl Iterator<Item = &[Lit]> {
        self.uprop.iter().map(|&i| self.clauses[i].as_slice())
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// Runs the search to completion.
    pub fn solve(mut self) -> Outcome {
        for &i in &self.enforce {
            match eval_clause(&self.clauses[i], &self.assignment) {
                ClauseState::Satisfied => {}
                ClauseState::Unsatisfied | ClauseState::Unknown => {
                    trace!("enforce clause {} is violated", i);
                    return Outcome::Unsat;
                }
            }
        }

        for idx in 0..self.uprop.len() {
            let i = self.uprop[idx];
            match eval_clause(&self.clauses[i], &self.assignment) {
                ClauseState::Satisfied => {}
                ClauseState::Unsatisfied => return Outcome::Unsat,
                ClauseState::Unknown => {
                    let unit = self.clauses[i]
                        .iter()
                        .copied()
                        .find(|&lit| self.assignment.lit_value(lit).is_none());
                    if let Some(lit) = unit {
                        self.assignment.assign(lit.var(), !lit.is_negated());
                    }
                }
            }
        }

        loop {
            let ok = self.propagate();
            let ok = ok
                && match self.pick() {
                    Pick::Done => return Outcome::Sat(self.assignment),
                    Pick::Conflict => false,
                    Pick::Var(var) => {
                        self.decide(var, true);
                        true
                    }
                };

            if !ok && !self.backtrack() {
                return Outcome::Unsat;
            }
        }
    }

    fn decide(&mut self, var: Var, value: bool) {
        trace!("decide {}={} at level {}", var, value, self.decisions.len() + 1);
        self.decisions.push(Decision {
            trail_len: self.assignment.trail.len(),
            var,
            value,
            flipped: false,
        });
        self.assignment.assign(var, value);
    }

    /// Undoes the most recent unflipped decision and flips it. Returns
    /// `false` once every decision has been tried both ways.
    fn backtrack(&mut self) -> bool {
        while let Some(decision) = self.decisions.pop() {
            self.assignment.truncate(decision.trail_len);
            self.queue_head = decision.trail_len;
            if !decision.flipped {
                trace!("backtrack: flip {} to {}", decision.var, !decision.value);
                self.decisions.push(Decision {
                    value: !decision.value,
                    flipped: true,
                    ..decision
                });
                self.assignment.assign(decision.var, !decision.value);
                return true;
            }
        }
        false
    }

    /// Unit propagation over the watch lists. Returns `false` on conflict.
    fn propagate(&mut self) -> bool {
        while self.queue_head < self.assignment.trail.len() {
            let (var, value) = self.assignment.trail[self.queue_head];
            self.queue_head += 1;

            let false_lit = if value { var.neg() } else { var.pos() };
            let mut watchers = std::mem::take(&mut self.watched[false_lit.index()]);
            let mut conflict = false;
            let mut i = 0;

            while i < watchers.len() {
                let ci = watchers[i];
                let clause = &mut self.clauses[ci];
                if clause[0] == false_lit {
                    clause.swap(0, 1);
                }
                let other = clause[0];
                if self.assignment.lit_value(other) == Some(true) {
                    i += 1;
                    continue;
                }

                let replacement = (2..clause.len())
                    .find(|&k| self.assignment.lit_value(clause[k]) != Some(false));
                if let Some(k) = replacement {
                    clause.swap(1, k);
                    self.watched[clause[1].index()].push(ci);
                    watchers.swap_remove(i);
                    continue;
                }

                match self.assignment.lit_value(other) {
                    None => {
                        self.assignment.assign(other.var(), !other.is_negated());
                        i += 1;
                    }
                    _ => {
                        trace!("conflict in clause {}", ci);
                        conflict = true;
                        break;
                    }
                }
            }

            self.watched[false_lit.index()] = watchers;
            if conflict {
                return false;
            }
        }
        true
    }

    fn pick(&self) -> Pick {
        for clause in &self.clauses {
            match eval_clause(clause, &self.assignment) {
                ClauseState::Satisfied => {}
                ClauseState::Unsatisfied => return Pick::Conflict,
                ClauseState::Unknown => {
                    let free = clause
                        .iter()
                        .find(|&&lit| self.assignment.lit_value(lit).is_none());
                    if let Some(lit) = free {
                        return Pick::Var(lit.var());
                    }
                }
            }
        }
        Pick::Done
    }
}

/// Convenience wrapper: is the clause set satisfiable?
pub fn is_satisfiable(num_vars: usize, clauses: Vec<Vec<Lit>>) -> bool {
    State::new(num_vars, clauses, &[]).solve().is_sat()
}
