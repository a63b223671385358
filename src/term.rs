//! Closed lambda terms with de Bruijn indices.
//!
//! Every program in a corpus is represented as a [`Term`]. Bound variables
//! are de Bruijn indices, so two terms that differ only in the names of their
//! bound variables compare equal. Anything that is not bound by a lambda is
//! either a primitive from the fixed vocabulary, a literal constant, a free
//! symbol, or a reference to a learned abstraction.

use std::{
    collections::BTreeSet,
    convert::Infallible,
    fmt::{self, Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};

use egg::Symbol;
use indexmap::IndexMap;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod parse;

pub use parse::ParseTermError;

/// A de Bruijn index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeBruijnIndex(pub usize);

impl Display for DeBruijnIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Error type for parsing a de Bruijn index from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDeBruijnIndexError {
    /// The string didn't start with '$'.
    #[error("expected de Bruijn index to start with '$'")]
    MissingSigil,

    /// There was an error parsing the index.
    #[error(transparent)]
    ParseIntError(#[from] ParseIntError),
}

impl FromStr for DeBruijnIndex {
    type Err = ParseDeBruijnIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ParseDeBruijnIndexError::{MissingSigil, ParseIntError};

        s.strip_prefix('$')
            .ok_or(MissingSigil)
            .and_then(|s| s.parse().map_err(ParseIntError))
            .map(Self)
    }
}

/// A literal constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    /// An integer.
    Int(i64),
    /// A finite floating point number.
    Float(NotNan<f64>),
    /// A boolean.
    Bool(bool),
    /// A string.
    Str(String),
    /// The unit value, `None` in the source language.
    None,
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{:?}", x.into_inner()),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::None => f.write_str("none"),
            Literal::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// A mapping from holes to the terms they stand for.
pub type Substitution = IndexMap<usize, Term>;

/// A term of the untyped lambda calculus.
///
/// Applications are binary and curried; `(f a b)` in the text form is
/// `App(App(f, a), b)`. Holes (`#k`) never appear in converted programs: they
/// are the placeholders of generalized terms and abstraction bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Term {
    /// A variable bound by an enclosing lambda.
    Var(DeBruijnIndex),
    /// A placeholder in a pattern.
    Hole(usize),
    /// An identifier that is neither bound nor a primitive.
    Free(Symbol),
    /// A literal constant.
    Const(Literal),
    /// A member of the primitive vocabulary.
    Prim(Symbol),
    /// Application of a function to one argument.
    App(Box<Term>, Box<Term>),
    /// An anonymous function of one argument.
    Lambda(Box<Term>),
    /// A call to a learned abstraction with its arguments.
    Abstraction(Symbol, Vec<Term>),
}

/// The operator at the root of a term, as seen by generalization.
///
/// Applications whose spine ends in a leaf are treated as calls of that leaf
/// with all their arguments, so that `(add a b)` and `(sub a b)` differ at the
/// root rather than only in function position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Head<'a> {
    /// A leaf, compared by equality.
    Leaf(&'a Term),
    /// A leaf applied to this many arguments.
    Call(&'a Term, usize),
    /// An application whose function is not a leaf.
    App,
    /// A lambda.
    Lambda,
    /// An abstraction reference with this many arguments.
    Abstraction(Symbol, usize),
}

/// Returns `true` if `name` is the name of a learned abstraction.
#[must_use]
pub fn is_abstraction_name(name: &str) -> bool {
    name.strip_prefix("fn_")
        .map_or(false, |n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

impl Term {
    /// Create a variable with de Bruijn index `index`.
    #[must_use]
    pub fn var(index: usize) -> Self {
        Term::Var(DeBruijnIndex(index))
    }

    /// Create the hole `#k`.
    #[must_use]
    pub fn hole(k: usize) -> Self {
        Term::Hole(k)
    }

    /// Create a primitive.
    #[must_use]
    pub fn prim(name: &str) -> Self {
        Term::Prim(Symbol::from(name))
    }

    /// Create a free symbol.
    #[must_use]
    pub fn free(name: &str) -> Self {
        Term::Free(Symbol::from(name))
    }

    /// Create an integer constant.
    #[must_use]
    pub fn int(i: i64) -> Self {
        Term::Const(Literal::Int(i))
    }

    /// Create a lambda with body `body`.
    #[must_use]
    pub fn lambda(body: Self) -> Self {
        Term::Lambda(Box::new(body))
    }

    /// Wrap `body` in `n` lambdas.
    #[must_use]
    pub fn lambdas(n: usize, body: Self) -> Self {
        (0..n).fold(body, |body, _| Term::lambda(body))
    }

    /// Create an application of `fun` to `arg`.
    #[must_use]
    pub fn app(fun: Self, arg: Self) -> Self {
        Term::App(Box::new(fun), Box::new(arg))
    }

    /// Apply `fun` to each of `args` in turn.
    #[must_use]
    pub fn apply<I: IntoIterator<Item = Self>>(fun: Self, args: I) -> Self {
        args.into_iter().fold(fun, Term::app)
    }

    /// Call primitive `name` with `args`.
    #[must_use]
    pub fn call<I: IntoIterator<Item = Self>>(name: &str, args: I) -> Self {
        Term::apply(Term::prim(name), args)
    }

    /// The number of nodes in this term.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Term::App(fun, arg) => 1 + fun.size() + arg.size(),
            Term::Lambda(body) => 1 + body.size(),
            Term::Abstraction(_, args) => 1 + args.iter().map(Term::size).sum::<usize>(),
            _ => 1,
        }
    }

    /// Returns `true` if this term has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        match self {
            Term::App(..) | Term::Lambda(_) => false,
            Term::Abstraction(_, args) => args.is_empty(),
            _ => true,
        }
    }

    /// The immediate children of this term, in order.
    #[must_use]
    pub fn children(&self) -> Vec<&Term> {
        match self {
            Term::App(fun, arg) => vec![&**fun, &**arg],
            Term::Lambda(body) => vec![&**body],
            Term::Abstraction(_, args) => args.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Split an application into its head and arguments.
    #[must_use]
    pub fn spine(&self) -> (&Term, Vec<&Term>) {
        let mut args = Vec::new();
        let mut head = self;
        while let Term::App(fun, arg) = head {
            args.push(&**arg);
            head = fun;
        }
        args.reverse();
        (head, args)
    }

    /// The operator at the root of this term.
    #[must_use]
    pub fn head(&self) -> Head<'_> {
        match self {
            Term::App(..) => {
                let (head, args) = self.spine();
                if head.is_leaf() {
                    Head::Call(head, args.len())
                } else {
                    Head::App
                }
            }
            Term::Lambda(_) => Head::Lambda,
            Term::Abstraction(name, args) => Head::Abstraction(*name, args.len()),
            _ => Head::Leaf(self),
        }
    }

    /// The operands of [`Term::head`], in order.
    #[must_use]
    pub fn operands(&self) -> Vec<&Term> {
        match self.head() {
            Head::Call(..) => self.spine().1,
            _ => self.children(),
        }
    }

    /// Rebuild a term with the same head as `self` and new operands.
    ///
    /// # Panics
    ///
    /// Panics if `operands` doesn't have as many elements as
    /// [`Term::operands`] returns for `self`.
    #[must_use]
    pub fn with_operands(&self, operands: Vec<Term>) -> Term {
        match self.head() {
            Head::Leaf(leaf) => leaf.clone(),
            Head::Call(head, _) => Term::apply(head.clone(), operands),
            Head::App => {
                let [fun, arg]: [Term; 2] = operands.try_into().expect("binary application");
                Term::app(fun, arg)
            }
            Head::Lambda => {
                let [body]: [Term; 1] = operands.try_into().expect("unary lambda");
                Term::lambda(body)
            }
            Head::Abstraction(name, _) => Term::Abstraction(name, operands),
        }
    }

    /// Visit every subterm in pre-order together with the number of lambdas
    /// enclosing it (relative to `self`).
    pub fn visit<F: FnMut(&Term, usize)>(&self, f: &mut F) {
        self.visit_at(0, f);
    }

    fn visit_at<F: FnMut(&Term, usize)>(&self, depth: usize, f: &mut F) {
        f(self, depth);
        match self {
            Term::App(fun, arg) => {
                fun.visit_at(depth, f);
                arg.visit_at(depth, f);
            }
            Term::Lambda(body) => body.visit_at(depth + 1, f),
            Term::Abstraction(_, args) => args.iter().for_each(|arg| arg.visit_at(depth, f)),
            _ => {}
        }
    }

    /// Rebuild this term top-down. At each node, `f` receives the node and its
    /// binder depth; returning `Ok(Some(t))` replaces the node with `t`
    /// without descending further, `Ok(None)` keeps the node and descends.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_transform<E, F>(&self, f: &mut F) -> Result<Term, E>
    where
        F: FnMut(&Term, usize) -> Result<Option<Term>, E>,
    {
        self.try_transform_at(0, f)
    }

    fn try_transform_at<E, F>(&self, depth: usize, f: &mut F) -> Result<Term, E>
    where
        F: FnMut(&Term, usize) -> Result<Option<Term>, E>,
    {
        if let Some(replacement) = f(self, depth)? {
            return Ok(replacement);
        }
        Ok(match self {
            Term::App(fun, arg) => Term::app(
                fun.try_transform_at(depth, f)?,
                arg.try_transform_at(depth, f)?,
            ),
            Term::Lambda(body) => Term::lambda(body.try_transform_at(depth + 1, f)?),
            Term::Abstraction(name, args) => Term::Abstraction(
                *name,
                args.iter()
                    .map(|arg| arg.try_transform_at(depth, f))
                    .collect::<Result<_, _>>()?,
            ),
            leaf => leaf.clone(),
        })
    }

    /// Infallible version of [`Term::try_transform`].
    #[must_use]
    pub fn transform<F>(&self, mut f: F) -> Term
    where
        F: FnMut(&Term, usize) -> Option<Term>,
    {
        let result: Result<_, Infallible> = self.try_transform(&mut |term, depth| Ok(f(term, depth)));
        match result {
            Ok(term) => term,
            Err(never) => match never {},
        }
    }

    /// Raise every free variable by `amount`, as needed when moving this term
    /// under `amount` additional binders.
    #[must_use]
    pub fn shift(&self, amount: usize) -> Term {
        if amount == 0 {
            return self.clone();
        }
        self.transform(|term, depth| match term {
            Term::Var(DeBruijnIndex(i)) if *i >= depth => Some(Term::var(i + amount)),
            _ => None,
        })
    }

    /// Lower every free variable by `amount`, as needed when moving this term
    /// out from under `amount` binders. Returns `None` if the term refers to
    /// one of those binders.
    #[must_use]
    pub fn lower(&self, amount: usize) -> Option<Term> {
        if amount == 0 {
            return Some(self.clone());
        }
        self.try_transform(&mut |term, depth| match term {
            Term::Var(DeBruijnIndex(i)) if *i >= depth => {
                if i - depth < amount {
                    Err(())
                } else {
                    Ok(Some(Term::var(i - amount)))
                }
            }
            _ => Ok(None),
        })
        .ok()
    }

    /// The free variables of this term, as indices relative to its root.
    #[must_use]
    pub fn free_vars(&self) -> BTreeSet<usize> {
        let mut vars = BTreeSet::new();
        self.visit(&mut |term, depth| {
            if let Term::Var(DeBruijnIndex(i)) = term {
                if *i >= depth {
                    vars.insert(i - depth);
                }
            }
        });
        vars
    }

    /// Returns `true` if no variable escapes its binder.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.free_vars().is_empty()
    }

    /// The distinct holes in this term, in order of first use.
    #[must_use]
    pub fn holes(&self) -> Vec<usize> {
        let mut holes = Vec::new();
        self.visit(&mut |term, _| {
            if let Term::Hole(k) = term {
                if !holes.contains(k) {
                    holes.push(*k);
                }
            }
        });
        holes
    }

    /// The distinct free symbols in this term, in order of first appearance.
    #[must_use]
    pub fn free_symbols(&self) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        self.visit(&mut |term, _| {
            if let Term::Free(s) = term {
                if !symbols.contains(s) {
                    symbols.push(*s);
                }
            }
        });
        symbols
    }

    /// Replace holes with the terms `subst` maps them to, verbatim.
    #[must_use]
    pub fn fill(&self, subst: &Substitution) -> Term {
        self.transform(|term, _| match term {
            Term::Hole(k) => subst.get(k).cloned(),
            _ => None,
        })
    }

    /// Replace hole `#k` with `args[k]`, shifting each argument under the
    /// binders it is moved beneath.
    #[must_use]
    pub fn instantiate(&self, args: &[Term]) -> Term {
        self.transform(|term, depth| match term {
            Term::Hole(k) => args.get(*k).map(|arg| arg.shift(depth)),
            _ => None,
        })
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(index) => write!(f, "{index}"),
            Term::Hole(k) => write!(f, "#{k}"),
            Term::Free(symbol) | Term::Prim(symbol) => write!(f, "{symbol}"),
            Term::Const(literal) => write!(f, "{literal}"),
            Term::Lambda(body) => write!(f, "(lam {body})"),
            Term::Abstraction(name, args) if args.is_empty() => write!(f, "{name}"),
            Term::Abstraction(name, args) => {
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
            Term::App(..) => {
                let (head, args) = self.spine();
                match head {
                    Term::Abstraction(name, args) if args.is_empty() => write!(f, "(({name})")?,
                    head => write!(f, "({head}")?,
                }
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl FromStr for Term {
    type Err = ParseTermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::parse(s)
    }
}

impl From<Term> for String {
    fn from(term: Term) -> Self {
        term.to_string()
    }
}

impl TryFrom<String> for Term {
    type Error = ParseTermError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Term {
        s.parse().unwrap()
    }

    #[test]
    fn display_round_trips() {
        let inputs = [
            "(lam (lam (add $1 $0)))",
            "(lam (and (gt $0 0) (eq v0 -1)))",
            "(fn_0 $1 #0)",
            "((fn_0 $1) $0)",
            "((fn_2) 3)",
            "fn_4",
            "(lam ((lam $0) $0))",
            "(pair \"a \\\"b\\\"\" none)",
            "(mul 2.5 true)",
        ];
        for input in inputs {
            assert_eq!(t(input).to_string(), input);
        }
    }

    #[test]
    fn parses_primitives_and_free_symbols() {
        assert_eq!(
            t("(add x 1)"),
            Term::app(Term::app(Term::prim("add"), Term::free("x")), Term::int(1))
        );
        assert_eq!(
            t("(fn_1 #0)"),
            Term::Abstraction("fn_1".into(), vec![Term::hole(0)])
        );
        assert!(matches!(t("1.0"), Term::Const(Literal::Float(_))));
    }

    #[test]
    fn rejects_malformed_text() {
        assert!("(add 1".parse::<Term>().is_err());
        assert!("(lam)".parse::<Term>().is_err());
        assert!("".parse::<Term>().is_err());
        assert!("(lt $0 1e999)".parse::<Term>().is_err());
    }

    #[test]
    fn size_counts_every_node() {
        assert_eq!(t("(lam (lam (add $1 $0)))").size(), 7);
        assert_eq!(t("(fn_0 $1 $0)").size(), 3);
        assert_eq!(t("fn_0").size(), 1);
    }

    #[test]
    fn head_sees_through_application_spines() {
        let term = t("(add $0 1)");
        assert_eq!(term.head(), Head::Call(&Term::prim("add"), 2));
        assert_eq!(term.operands(), vec![&Term::var(0), &Term::int(1)]);
        assert_eq!(term.with_operands(vec![Term::int(2), Term::int(3)]), t("(add 2 3)"));
        assert_eq!(t("((lam $0) 1)").head(), Head::App);
    }

    #[test]
    fn shift_and_lower_respect_binders() {
        let term = t("(add $0 (lam (mul $0 $1)))");
        assert_eq!(term.shift(2), t("(add $2 (lam (mul $0 $3)))"));
        assert_eq!(term.shift(2).lower(2), Some(term.clone()));
        assert_eq!(term.lower(1), None);
    }

    #[test]
    fn free_vars_are_relative_to_root() {
        let term = t("(lam (add $0 $2))");
        assert_eq!(term.free_vars().into_iter().collect::<Vec<_>>(), vec![1]);
        assert!(t("(lam (lam $1))").is_closed());
    }

    #[test]
    fn instantiate_shifts_arguments_under_binders() {
        let body = t("(lam (add #0 $0))");
        assert_eq!(body.instantiate(&[Term::var(0)]), t("(lam (add $1 $0))"));
        let mut subst = Substitution::new();
        subst.insert(0, Term::var(0));
        assert_eq!(body.fill(&subst), t("(lam (add $0 $0))"));
    }

    #[test]
    fn holes_in_first_use_order() {
        assert_eq!(t("(add #3 (mul #1 #3))").holes(), vec![3, 1]);
    }

    #[test]
    fn serializes_as_text() {
        let term = t("(lam (not $0))");
        let json = serde_json::to_string(&term).unwrap();
        assert_eq!(json, "\"(lam (not $0))\"");
        assert_eq!(serde_json::from_str::<Term>(&json).unwrap(), term);
    }
}
