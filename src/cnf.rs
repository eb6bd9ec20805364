//! Clause-form conversion for purely boolean predicates.
//!
//! Negations are pushed down to identifiers first (De Morgan), then
//! disjunctions are distributed over conjunctions. Boolean literals are
//! folded away, so the result only mentions identifiers. The conversion is
//! exponential in the worst case, which is acceptable for policy-sized
//! predicates; the SMT path uses a Tseitin encoding instead.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{Error, Result};
use crate::types::Value;

/// An identifier (dotted path) with a polarity.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Literal {
    pub key: String,
    pub positive: bool,
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.positive { "" } else { "!" }, self.key)
    }
}

pub type Clause = Vec<Literal>;

#[derive(Debug)]
enum Nnf {
    Const(bool),
    Lit(Literal),
    And(Vec<Nnf>),
    Or(Vec<Nnf>),
}

fn to_nnf(expr: &Expr, negated: bool) -> Result<Nnf> {
    match expr {
        Expr::Literal(Value::Bool(b)) => Ok(Nnf::Const(*b != negated)),
        Expr::Literal(other) => Err(Error::Type(format!(
            "boolean formula cannot contain a {} literal",
            other.sort()
        ))),
        Expr::Identifier(path) => Ok(Nnf::Lit(Literal {
            key: path.join("."),
            positive: !negated,
        })),
        Expr::Unary(UnaryOp::Not, a) => to_nnf(a, !negated),
        Expr::Binary(op @ (BinaryOp::And | BinaryOp::Or), a, b) => {
            let items = vec![to_nnf(a, negated)?, to_nnf(b, negated)?];
            // `!(a && b)` is `!a || !b` and vice versa.
            let conjunction = (*op == BinaryOp::And) != negated;
            Ok(if conjunction {
                Nnf::And(items)
            } else {
                Nnf::Or(items)
            })
        }
        Expr::Binary(op, _, _) => Err(Error::NotSupported(format!(
            "comparison `{}` in a boolean-only formula",
            op
        ))),
    }
}

fn clauses(nnf: Nnf) -> Vec<Clause> {
    match nnf {
        Nnf::Const(true) => vec![],
        Nnf::Const(false) => vec![vec![]],
        Nnf::Lit(lit) => vec![vec![lit]],
        Nnf::And(items) => items.into_iter().flat_map(clauses).collect(),
        Nnf::Or(items) => {
            let mut acc: Vec<Clause> = vec![vec![]];
            for item in items {
                let rhs = clauses(item);
                let mut next = Vec::with_capacity(acc.len() * rhs.len());
                for lhs in &acc {
                    for r in &rhs {
                        let mut clause = lhs.clone();
                        clause.extend(r.iter().cloned());
                        next.push(clause);
                    }
                }
                acc = next;
            }
            acc
        }
    }
}

/// Removes duplicate literals; returns `None` for tautologies (`a || !a`).
fn normalize(clause: Clause) -> Option<Clause> {
    let set: BTreeSet<Literal> = clause.into_iter().collect();
    let tautology = set.iter().any(|lit| {
        set.contains(&Literal {
            key: lit.key.clone(),
            positive: !lit.positive,
        })
    });
    if tautology {
        None
    } else {
        Some(set.into_iter().collect())
    }
}

/// Converts a boolean predicate into conjunctive normal form.
///
/// Comparisons are rejected with [`Error::NotSupported`]; non-boolean
/// literals with [`Error::Type`]. An empty clause in the output means the
/// formula is structurally false.
pub fn to_cnf(expr: &Expr) -> Result<Vec<Clause>> {
    let nnf = to_nnf(expr, false)?;
    Ok(clauses(nnf).into_iter().filter_map(normalize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn render(cnf: &[Clause]) -> Vec<String> {
        cnf.iter()
            .map(|c| c.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(" | "))
            .collect()
    }

    #[test]
    fn test_flatten_conjunctions() {
        let cnf = to_cnf(&parse("a && (b || c) && !d").unwrap()).unwrap();
        assert_eq!(render(&cnf), vec!["a", "b | c", "!d"]);
    }

    #[test]
    fn test_de_morgan() {
        let cnf = to_cnf(&parse("!(a && !b)").unwrap()).unwrap();
        assert_eq!(render(&cnf), vec!["!a | b"]);

        let cnf = to_cnf(&parse("!(a || b)").unwrap()).unwrap();
        assert_eq!(render(&cnf), vec!["!a", "!b"]);
    }

    #[test]
    fn test_distribution() {
        let cnf = to_cnf(&parse("a || (b && c)").unwrap()).unwrap();
        assert_eq!(render(&cnf), vec!["a | b", "a | c"]);
    }

    #[test]
    fn test_constants() {
        assert!(to_cnf(&parse("true").unwrap()).unwrap().is_empty());
        assert_eq!(to_cnf(&parse("false").unwrap()).unwrap(), vec![Vec::<Literal>::new()]);
        assert_eq!(render(&to_cnf(&parse("a || false").unwrap()).unwrap()), vec!["a"]);
        assert!(to_cnf(&parse("a || !false").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_tautology_dropped() {
        let cnf = to_cnf(&parse("(a || !a) && b").unwrap()).unwrap();
        assert_eq!(render(&cnf), vec!["b"]);
    }

    #[test]
    fn test_contradiction_kept() {
        let cnf = to_cnf(&parse("a && !a").unwrap()).unwrap();
        assert_eq!(render(&cnf), vec!["a", "!a"]);
    }

    #[test]
    fn test_rejects_comparisons() {
        assert!(matches!(
            to_cnf(&parse("a && x > 3").unwrap()),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(to_cnf(&parse("a || 1").unwrap()), Err(Error::Type(_))));
    }
}
