//! Anti-unification of terms.
//!
//! Anti-unifying two terms computes their least general generalization: the
//! most specific term that both are instances of. Positions where the terms
//! disagree become holes, and the substitutions recorded alongside the
//! generalization map each hole back to what it stood for on either side.
//!
//! A generalization is not yet something that can be defined as a function.
//! [`Generalization::close`] turns it into one by making every variable that
//! escapes the generalization a hole too, and by rejecting generalizations
//! whose holes would have to capture variables bound inside them.

use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;

use crate::{
    fresh::Fresh,
    term::{DeBruijnIndex, Head, Substitution, Term},
};

/// The result of anti-unifying two terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generalization {
    /// The generalized term.
    pub term: Term,
    /// What each hole stands for in the first term.
    pub left: Substitution,
    /// What each hole stands for in the second term.
    pub right: Substitution,
}

/// A closed generalization, ready to be registered as an abstraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The abstraction body, with holes `#0` to `#arity - 1` numbered by
    /// first use.
    pub body: Term,
    /// The number of distinct holes in the body.
    pub arity: usize,
}

/// The reason a generalization can't become an abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CloseError {
    /// A hole's value refers to a variable bound inside the generalization.
    #[error("hole #{hole} would capture a bound variable")]
    Capture {
        /// The hole, as numbered in the generalization.
        hole: usize,
    },
    /// The generalization is a bare hole and matches anything.
    #[error("generalization is a bare hole")]
    Trivial,
    /// The abstraction would need more parameters than allowed.
    #[error("abstraction needs {arity} parameters but at most {max} are allowed")]
    AntiUnificationArityOverflow {
        /// The number of parameters needed.
        arity: usize,
        /// The configured maximum.
        max: usize,
    },
}

struct AntiUnifier<'a> {
    fresh: &'a mut Fresh,
    seen: HashMap<(Term, Term, usize), usize>,
    left: Substitution,
    right: Substitution,
}

impl AntiUnifier<'_> {
    fn generalize(&mut self, t1: &Term, t2: &Term, depth: usize) -> Term {
        if t1 == t2 {
            return t1.clone();
        }
        let head = t1.head();
        let (ops1, ops2) = (t1.operands(), t2.operands());
        if head != t2.head() || matches!(head, Head::Leaf(_)) || ops1.len() != ops2.len() {
            return self.hole(t1, t2, depth);
        }
        let inner = if head == Head::Lambda { depth + 1 } else { depth };
        let operands = ops1
            .into_iter()
            .zip(ops2)
            .map(|(a, b)| self.generalize(a, b, inner))
            .collect();
        t1.with_operands(operands)
    }

    /// The hole for a disagreement. The same pair at the same binder depth
    /// always gets the same hole.
    fn hole(&mut self, t1: &Term, t2: &Term, depth: usize) -> Term {
        let key = (t1.clone(), t2.clone(), depth);
        if let Some(&k) = self.seen.get(&key) {
            return Term::Hole(k);
        }
        let k = self.fresh.gen();
        self.seen.insert(key, k);
        self.left.insert(k, t1.clone());
        self.right.insert(k, t2.clone());
        Term::Hole(k)
    }
}

/// Compute the least general generalization of `t1` and `t2`.
///
/// Hole numbers are drawn from `fresh`.
pub fn anti_unify(t1: &Term, t2: &Term, fresh: &mut Fresh) -> Generalization {
    let mut au = AntiUnifier {
        fresh,
        seen: HashMap::new(),
        left: Substitution::new(),
        right: Substitution::new(),
    };
    let term = au.generalize(t1, t2, 0);
    Generalization {
        term,
        left: au.left,
        right: au.right,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Param {
    Hole(usize),
    Escaping(usize),
}

impl Generalization {
    /// Turn this generalization into an abstraction candidate with at most
    /// `max_arity` parameters.
    ///
    /// Variables escaping the generalized term become parameters, one per
    /// referent. Parameters are numbered by first use.
    ///
    /// # Errors
    ///
    /// Returns an error if a hole would capture a variable bound inside the
    /// term, if the term is a bare hole, or if it needs too many parameters.
    pub fn close(&self, max_arity: usize) -> Result<Candidate, CloseError> {
        if let Term::Hole(_) = self.term {
            return Err(CloseError::Trivial);
        }
        let mut params: IndexMap<Param, usize> = IndexMap::new();
        let mut number = |param| {
            let next = params.len();
            Term::Hole(*params.entry(param).or_insert(next))
        };
        let body = self.term.try_transform(&mut |term, depth| match term {
            Term::Hole(k) => {
                let escapes = |subst: &Substitution| {
                    subst.get(k).map_or(true, |value| value.lower(depth).is_some())
                };
                if escapes(&self.left) && escapes(&self.right) {
                    Ok(Some(number(Param::Hole(*k))))
                } else {
                    Err(CloseError::Capture { hole: *k })
                }
            }
            Term::Var(DeBruijnIndex(i)) if *i >= depth => Ok(Some(number(Param::Escaping(i - depth)))),
            _ => Ok(None),
        })?;
        let arity = params.len();
        if arity > max_arity {
            return Err(CloseError::AntiUnificationArityOverflow {
                arity,
                max: max_arity,
            });
        }
        Ok(Candidate { body, arity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Term {
        s.parse().unwrap()
    }

    fn au(a: &str, b: &str) -> Generalization {
        anti_unify(&t(a), &t(b), &mut Fresh::new())
    }

    fn assert_sound(a: &str, b: &str) {
        let g = au(a, b);
        assert_eq!(g.term.fill(&g.left), t(a), "left of {}", g.term);
        assert_eq!(g.term.fill(&g.right), t(b), "right of {}", g.term);
    }

    #[test]
    fn generalizes_disagreements() {
        let g = au("(add (mul x 2) 3)", "(add (mul y 2) 4)");
        assert_eq!(g.term, t("(add (mul #0 2) #1)"));
        assert_eq!(g.left[&0], t("x"));
        assert_eq!(g.right[&1], t("4"));
    }

    #[test]
    fn different_heads_and_arities_become_holes() {
        assert_eq!(au("(add 1 2)", "(sub 1 2)").term, t("#0"));
        assert_eq!(au("(f 1)", "(f 1 2)").term, t("#0"));
        assert_eq!(au("(lam $0)", "(add 1 2)").term, t("#0"));
    }

    #[test]
    fn identical_terms_have_no_holes() {
        let g = au("(lam (lam (and (gt $1 0) (eq $0 -1))))", "(lam (lam (and (gt $1 0) (eq $0 -1))))");
        assert_eq!(g.term, t("(lam (lam (and (gt $1 0) (eq $0 -1))))"));
        assert!(g.left.is_empty() && g.right.is_empty());
    }

    #[test]
    fn repeated_disagreements_share_a_hole() {
        let g = au("(add (mul a a) a)", "(add (mul b b) b)");
        assert_eq!(g.term, t("(add (mul #0 #0) #0)"));
        assert_eq!(g.left.len(), 1);
    }

    #[test]
    fn generalizations_are_sound() {
        for (a, b) in [
            ("(add (mul x 2) 3)", "(add (mul y 2) 4)"),
            ("(lam (add $0 $1))", "(lam (mul $0 $1))"),
            ("(lam (lam (get $0 $1)))", "(lam (lam (get $1 $0)))"),
            ("(fn_0 (neg $0) 1)", "(fn_0 $1 2)"),
            ("(pair \"a\" (cons 1 nil))", "(pair \"b\" (cons 2 nil))"),
        ] {
            assert_sound(a, b);
        }
    }

    #[test]
    fn holes_come_from_the_shared_counter() {
        let mut fresh = Fresh::new();
        let first = anti_unify(&t("(add 1 2)"), &t("(add 3 2)"), &mut fresh);
        let second = anti_unify(&t("(add 1 2)"), &t("(add 3 2)"), &mut fresh);
        assert_eq!(first.term, t("(add #0 2)"));
        assert_eq!(second.term, t("(add #1 2)"));
    }

    #[test]
    fn closing_turns_escaping_variables_into_parameters() {
        let g = au("(and (gt $1 0) (eq $0 -1))", "(and (gt $2 0) (eq $1 -1))");
        let candidate = g.close(3).unwrap();
        assert_eq!(candidate.body, t("(and (gt #0 0) (eq #1 -1))"));
        assert_eq!(candidate.arity, 2);

        let g = au("(lam (add $0 (mul $1 3)))", "(lam (add $0 (mul $1 3)))");
        assert_eq!(g.close(3).unwrap().body, t("(lam (add $0 (mul #0 3)))"));
    }

    #[test]
    fn closing_rejects_captured_variables() {
        let g = au("(lam (add $0 1))", "(lam (add (neg $0) 1))");
        assert_eq!(g.term, t("(lam (add #0 1))"));
        assert_eq!(g.close(3), Err(CloseError::Capture { hole: 0 }));

        let g = au("(lam (add $1 1))", "(lam (add (neg $1) 1))");
        assert_eq!(g.close(3).unwrap().body, t("(lam (add #0 1))"));
    }

    #[test]
    fn closing_limits_arity() {
        let g = au("(add (add a b) (add c d))", "(add (add e f) (add g h))");
        assert_eq!(
            g.close(3),
            Err(CloseError::AntiUnificationArityOverflow { arity: 4, max: 3 })
        );
        assert_eq!(au("(add 1 2)", "(sub 1 2)").close(3), Err(CloseError::Trivial));
    }
}
