//! Matching abstraction bodies against terms and rewriting matches into
//! calls.
//!
//! A body matches a term when the two are equal except at holes, and every
//! occurrence of a hole corresponds to the same value. A hole under `d`
//! binders of the body matches a term only if that term doesn't refer to any
//! of those binders; the value recorded for the hole is lowered past them, so
//! that it is valid at the position of the call that replaces the match.

use egg::Symbol;

use crate::term::Term;

/// Match `body`, whose holes are `#0` to `#arity - 1`, against `term`.
///
/// On success, returns the value of each hole in order.
#[must_use]
pub fn match_body(body: &Term, arity: usize, term: &Term) -> Option<Vec<Term>> {
    let mut bindings = vec![None; arity];
    if !bind(body, term, 0, &mut bindings) {
        return None;
    }
    bindings.into_iter().collect()
}

fn bind(pattern: &Term, term: &Term, depth: usize, bindings: &mut [Option<Term>]) -> bool {
    match (pattern, term) {
        (Term::Hole(k), _) => {
            let Some(value) = term.lower(depth) else {
                return false;
            };
            match bindings.get_mut(*k) {
                Some(Some(bound)) => *bound == value,
                Some(slot) => {
                    *slot = Some(value);
                    true
                }
                None => false,
            }
        }
        (Term::App(pf, pa), Term::App(tf, ta)) => {
            bind(pf, tf, depth, bindings) && bind(pa, ta, depth, bindings)
        }
        (Term::Lambda(pb), Term::Lambda(tb)) => bind(pb, tb, depth + 1, bindings),
        (Term::Abstraction(pn, pargs), Term::Abstraction(tn, targs)) => {
            pn == tn
                && pargs.len() == targs.len()
                && pargs
                    .iter()
                    .zip(targs)
                    .all(|(p, t)| bind(p, t, depth, bindings))
        }
        _ => pattern.is_leaf() && pattern == term,
    }
}

/// Rewrites every match of an abstraction body into a call.
#[derive(Debug, Clone, Copy)]
pub struct Rewriter<'a> {
    name: Symbol,
    body: &'a Term,
    arity: usize,
}

impl<'a> Rewriter<'a> {
    #[must_use]
    pub fn new(name: Symbol, body: &'a Term, arity: usize) -> Self {
        Self { name, body, arity }
    }

    /// Rewrite `term` top-down, outermost matches first. The arguments of
    /// every call are themselves rewritten. Returns the rewritten term and
    /// the number of calls introduced.
    #[must_use]
    pub fn rewrite(&self, term: &Term) -> (Term, usize) {
        let mut uses = 0;
        let term = self.rewrite_counting(term, &mut uses);
        (term, uses)
    }

    fn rewrite_counting(&self, term: &Term, uses: &mut usize) -> Term {
        term.transform(|t, _| {
            let args = match_body(self.body, self.arity, t)?;
            *uses += 1;
            let args = args
                .iter()
                .map(|arg| self.rewrite_counting(arg, uses))
                .collect();
            Some(Term::Abstraction(self.name, args))
        })
    }

    /// Rewrite every term of `programs`, returning the new corpus and the
    /// total number of calls introduced.
    #[must_use]
    pub fn rewrite_all(&self, programs: &[Term]) -> (Vec<Term>, usize) {
        let mut total = 0;
        let programs = programs
            .iter()
            .map(|program| {
                let (program, uses) = self.rewrite(program);
                total += uses;
                program
            })
            .collect();
        (programs, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Term {
        s.parse().unwrap()
    }

    fn matched(body: &str, arity: usize, term: &str) -> Option<Vec<String>> {
        match_body(&t(body), arity, &t(term))
            .map(|args| args.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn holes_bind_consistently() {
        assert_eq!(matched("(add #0 #0)", 1, "(add 1 1)"), Some(vec!["1".to_owned()]));
        assert_eq!(matched("(add #0 #0)", 1, "(add 1 2)"), None);
        assert_eq!(
            matched("(add #0 #1)", 2, "(add (mul x 2) y)"),
            Some(vec!["(mul x 2)".to_owned(), "y".to_owned()])
        );
        assert_eq!(matched("(add #0 1)", 1, "(sub 2 1)"), None);
    }

    #[test]
    fn holes_under_binders_are_lowered() {
        assert_eq!(
            matched("(lam (add #0 $0))", 1, "(lam (add $3 $0))"),
            Some(vec!["$2".to_owned()])
        );
        assert_eq!(matched("(lam (add #0 $0))", 1, "(lam (add $0 $0))"), None);
        assert_eq!(matched("(lam (add $0 1))", 0, "(lam (add $1 1))"), None);
    }

    #[test]
    fn instantiating_a_match_recovers_the_term() {
        let body = t("(lam (mul (add #0 $0) #1))");
        for term in ["(lam (mul (add $2 $0) (fst $1)))", "(lam (mul (add 5 $0) none))"] {
            let term = t(term);
            let args = match_body(&body, 2, &term).unwrap();
            assert_eq!(body.instantiate(&args), term);
        }
    }

    #[test]
    fn rewrites_outermost_first_and_inside_arguments() {
        let body = t("(and (gt #0 0) (eq #1 -1))");
        let rewriter = Rewriter::new("fn_0".into(), &body, 2);
        let (term, uses) = rewriter.rewrite(&t("(lam (lam (and (gt $1 0) (eq $0 -1))))"));
        assert_eq!(term, t("(lam (lam (fn_0 $1 $0)))"));
        assert_eq!(uses, 1);

        let body = t("(add #0 1)");
        let rewriter = Rewriter::new("fn_1".into(), &body, 1);
        let (term, uses) = rewriter.rewrite(&t("(add (add (add x 1) 1) 1)"));
        assert_eq!(term, t("(fn_1 (fn_1 (fn_1 x)))"));
        assert_eq!(uses, 3);
    }

    #[test]
    fn rewrites_whole_corpus() {
        let body = t("(and (gt #0 0) (eq #1 -1))");
        let programs = vec![
            t("(lam (lam (and (gt $1 0) (eq $0 -1))))"),
            t("(lam (lam (lam (and (and (gt $2 0) (eq $1 -1)) (lt $0 5)))))"),
        ];
        let (programs, uses) = Rewriter::new("fn_0".into(), &body, 2).rewrite_all(&programs);
        assert_eq!(uses, 2);
        assert_eq!(programs[1], t("(lam (lam (lam (and (fn_0 $2 $1) (lt $0 5)))))"));
    }
}
