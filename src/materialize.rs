//! Reconstructing source from learned abstractions and rewritten programs.
//!
//! Calls to abstractions can be inlined back into their bodies, fully or only
//! to a given nesting depth, and terms are printed as source of the language
//! the programs were written in. Reconstruction is best effort: primitives
//! without a recorded inverse are printed as calls of their own name.

use egg::Symbol;
use thiserror::Error;

use crate::{
    corpus::Program,
    learn::{Abstraction, Library},
    term::Term,
};

mod pretty;

pub use pretty::Python;

/// How far to inline abstraction calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inline {
    /// Inline until no calls remain.
    Full,
    /// Inline calls in the term itself and in the bodies of abstractions up
    /// to this many levels deep. `Depth(0)` leaves the term as it is.
    Depth(usize),
}

/// An error produced while inlining.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    #[error("unknown abstraction {0}")]
    UnknownAbstraction(Symbol),
    #[error("{name} takes {expected} arguments but was given {found}")]
    ArityMismatch {
        name: Symbol,
        expected: usize,
        found: usize,
    },
}

/// Replace calls to abstractions in `term` by their instantiated bodies.
///
/// # Errors
///
/// Returns an error if `term` calls an abstraction missing from `library` or
/// calls one with the wrong number of arguments.
pub fn inline(term: &Term, library: &Library, depth: Inline) -> Result<Term, MaterializeError> {
    let budget = match depth {
        Inline::Full => None,
        Inline::Depth(n) => Some(n),
    };
    inline_within(term, library, budget)
}

fn inline_within(
    term: &Term,
    library: &Library,
    budget: Option<usize>,
) -> Result<Term, MaterializeError> {
    if budget == Some(0) {
        return Ok(term.clone());
    }
    term.try_transform(&mut |t, _| {
        let Term::Abstraction(name, args) = t else {
            return Ok(None);
        };
        let abstraction = library
            .get(*name)
            .ok_or(MaterializeError::UnknownAbstraction(*name))?;
        if abstraction.arity != args.len() {
            return Err(MaterializeError::ArityMismatch {
                name: *name,
                expected: abstraction.arity,
                found: args.len(),
            });
        }
        let args = args
            .iter()
            .map(|arg| inline_within(arg, library, budget))
            .collect::<Result<Vec<_>, _>>()?;
        let body = inline_within(&abstraction.body, library, budget.map(|n| n - 1))?;
        Ok(Some(body.instantiate(&args)))
    })
}

/// The parameter names of an abstraction body.
fn hole_names(arity: usize) -> Vec<String> {
    (0..arity).map(|k| format!("a{k}")).collect()
}

/// Print an abstraction as a function definition.
#[must_use]
pub fn materialize_abstraction(abstraction: &Abstraction) -> String {
    format!(
        "def {}({}):\n    return {}",
        abstraction.name,
        hole_names(abstraction.arity).join(", "),
        Python::new(&abstraction.body)
    )
}

/// Print the body of `abstraction` instantiated with the arguments of one of
/// its calls in `program`.
#[must_use]
pub fn materialize_call(abstraction: &Abstraction, args: &[Term], program: &Program) -> String {
    let instance = abstraction.instantiate(args);
    Python::new(&instance)
        .with_params(&program.params)
        .with_free(&program.free)
        .to_string()
}

/// Print `term`, the current form of `program`, as a function definition,
/// after inlining calls to `depth`.
///
/// # Errors
///
/// Returns an error if inlining fails.
pub fn materialize_program(
    program: &Program,
    term: &Term,
    library: &Library,
    depth: Inline,
) -> Result<String, MaterializeError> {
    let term = inline(term, library, depth)?;
    let mut body = &term;
    let mut bound = 0;
    while bound < program.params.len() {
        match body {
            Term::Lambda(inner) => {
                body = inner;
                bound += 1;
            }
            _ => break,
        }
    }
    let params = &program.params[..bound];
    Ok(format!(
        "def {}({}):\n    return {}",
        program.name,
        params.join(", "),
        Python::new(body).with_params(params).with_free(&program.free)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corpus::{Corpus, SourceEntry},
        eval::{run, Value},
        learn::{Compressor, Miner},
    };

    fn t(s: &str) -> Term {
        s.parse().unwrap()
    }

    fn python(term: &str, params: &[&str]) -> String {
        let params: Vec<String> = params.iter().map(|&p| p.to_owned()).collect();
        Python::new(&t(term)).with_params(&params).to_string()
    }

    fn corpus(sources: &[(&str, &str)]) -> Corpus {
        Corpus::ingest(sources.iter().map(|&(id, source)| SourceEntry {
            id: id.to_owned(),
            description: serde_json::Value::Null,
            source: source.to_owned(),
        }))
    }

    #[test]
    fn operators_are_parenthesized_by_precedence() {
        assert_eq!(python("(mul (add $0 1) 2)", &["x"]), "(x + 1) * 2");
        assert_eq!(python("(sub (sub $0 1) 2)", &["x"]), "x - 1 - 2");
        assert_eq!(python("(sub $0 (sub 1 2))", &["x"]), "x - (1 - 2)");
        assert_eq!(python("(pow (neg $0) 2)", &["x"]), "(-x) ** 2");
        assert_eq!(python("(neg (pow $0 2))", &["x"]), "-x ** 2");
        assert_eq!(python("(and (gt $1 0) (eq $0 -1))", &["a", "b"]), "a > 0 and b == -1");
        assert_eq!(python("(not (or $0 $0))", &["p"]), "not (p or p)");
    }

    #[test]
    fn sequences_use_their_own_syntax() {
        assert_eq!(python("(get (slice 1 none none) $0)", &["x"]), "x[1:]");
        assert_eq!(python("(get (slice none -1 2) $0)", &["x"]), "x[:-1:2]");
        assert_eq!(python("(get 0 (add $0 $0))", &["x"]), "(x + x)[0]");
        assert_eq!(python("(snd (pair $0 \"a\"))", &["x"]), "(x, \"a\")[1]");
        assert_eq!(python("(cons 1 (cons $0 nil))", &["x"]), "[1, x]");
        assert_eq!(python("(cons 1 $0)", &["x"]), "[1, *x]");
        assert_eq!(python("(count (upper $0))", &["s"]), "np.count_nonzero(s.upper())");
        assert_eq!(python("(shape $0)", &["a"]), "a.shape");
    }

    #[test]
    fn binders_get_names() {
        assert_eq!(python("((lam (add $0 $1)) 2)", &["x"]), "(lambda x1: x1 + x)(2)");
        assert_eq!(python("(lam (lam (sub $1 $0)))", &[]), "lambda x0, x1: x0 - x1");
        assert_eq!(python("(zip $0)", &["x"]), "lambda x1: zip(x, x1)");
        assert_eq!(python("(add #0 $3)", &[]), "a0 + $3");
    }

    fn conjunctions() -> Vec<Term> {
        vec![
            t("(lam (lam (and (gt $1 0) (eq $0 -1))))"),
            t("(lam (lam (and (gt $1 0) (eq $0 -1))))"),
            t("(lam (lam (lam (and (and (gt $2 0) (eq $1 -1)) (lt $0 5)))))"),
        ]
    }

    #[test]
    fn abstractions_print_as_definitions() {
        let result = Miner::default().compress(&conjunctions());
        let abstraction = result.library.iter().next().unwrap();
        assert_eq!(
            materialize_abstraction(abstraction),
            "def fn_0(a0, a1):\n    return a0 > 0 and a1 == -1"
        );
    }

    #[test]
    fn programs_are_reconstructed() {
        let corpus = corpus(&[
            ("f", "def f(a, b):\n    return a > 0 and b == -1\n"),
            ("g", "def g(a, b):\n    return a > 0 and b == -1\n"),
            ("h", "def h(a, b, c):\n    return a > 0 and b == -1 and c < 5\n"),
        ]);
        let result = Miner::default().compress(&corpus.terms());
        let h = &corpus.programs()[2];
        let rewritten = &result.programs[2];
        assert_eq!(
            materialize_program(h, rewritten, &result.library, Inline::Depth(0)).unwrap(),
            "def h(a, b, c):\n    return fn_0(a, b) and c < 5"
        );
        assert_eq!(
            materialize_program(h, rewritten, &result.library, Inline::Full).unwrap(),
            "def h(a, b, c):\n    return a > 0 and b == -1 and c < 5"
        );

        let fn_0 = result.library.get("fn_0".into()).unwrap();
        assert_eq!(
            materialize_call(fn_0, &[t("$2"), t("$1")], h),
            "a > 0 and b == -1"
        );
    }

    #[test]
    fn free_symbols_print_as_their_identifiers() {
        let corpus = corpus(&[
            ("p", "def p(s):\n    return s.strip() + WORD\n"),
            ("q", "def q(board):\n    return board.shape\n"),
        ]);
        let library = Library::default();
        let printed: Vec<String> = corpus
            .programs()
            .iter()
            .map(|p| materialize_program(p, &p.term, &library, Inline::Full).unwrap())
            .collect();
        assert_eq!(printed[0], "def p(s):\n    return s.strip() + WORD");
        assert_eq!(printed[1], "def q(board):\n    return board.shape");
    }

    #[test]
    fn inlining_undoes_rewriting() {
        let programs = vec![
            t("(lam (add (mul $0 2) (mul $0 3)))"),
            t("(lam (sub (mul $0 2) (mul $0 3)))"),
            t("(lam (lam (add (mul $1 2) (mul $0 3))))"),
            t("(lam (pair (add (mul $0 2) (mul $0 3)) 7))"),
            t("(lam ((lam (add (mul $0 2) (mul $0 3))) (add $0 1)))"),
        ];
        let result = Miner::default().compress(&programs);
        assert!(!result.library.is_empty());
        for (original, rewritten) in programs.iter().zip(&result.programs) {
            let inlined = inline(rewritten, &result.library, Inline::Full).unwrap();
            assert_eq!(&inlined, original);
        }
        let inlined = inline(&result.programs[0], &result.library, Inline::Full).unwrap();
        assert_eq!(run(&inlined, vec![Value::Int(5)]), Ok(Value::Int(25)));
    }

    #[test]
    fn inlining_depth_and_errors() {
        let result = Miner::default().compress(&conjunctions());
        let call = t("(fn_0 1 2)");
        assert_eq!(inline(&call, &result.library, Inline::Depth(0)), Ok(call.clone()));
        assert_eq!(
            inline(&call, &result.library, Inline::Depth(1)),
            Ok(t("(and (gt 1 0) (eq 2 -1))"))
        );
        assert_eq!(
            inline(&t("(fn_9 1)"), &result.library, Inline::Full),
            Err(MaterializeError::UnknownAbstraction("fn_9".into()))
        );
        assert!(matches!(
            inline(&t("(fn_0 1)"), &result.library, Inline::Full),
            Err(MaterializeError::ArityMismatch { expected: 2, found: 1, .. })
        ));
    }
}
