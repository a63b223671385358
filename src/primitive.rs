//! The fixed primitive vocabulary.
//!
//! Identifiers that resolve to one of these primitives are never treated as
//! free symbols. Each primitive also records how it is written back out as
//! source, where such an inverse is known.

use std::collections::HashMap;

use egg::Symbol;
use indexmap::IndexMap;
use lazy_static::lazy_static;

use crate::syntax::{BinaryOp, BoolOp, CompareOp, UnaryOp};

/// Operator precedence in rendered source. Higher binds tighter.
pub type Precedence = u8;

/// Precedence levels of the rendered source language.
pub mod precedence {
    use super::Precedence;

    pub const LAMBDA: Precedence = 1;
    pub const OR: Precedence = 2;
    pub const AND: Precedence = 3;
    pub const NOT: Precedence = 4;
    pub const COMPARE: Precedence = 5;
    pub const BITOR: Precedence = 6;
    pub const BITXOR: Precedence = 7;
    pub const BITAND: Precedence = 8;
    pub const ARITH: Precedence = 10;
    pub const TERM: Precedence = 11;
    pub const UNARY: Precedence = 12;
    pub const POWER: Precedence = 13;
    pub const POSTFIX: Precedence = 14;
    pub const ATOM: Precedence = 15;
}

/// How a primitive applied to all of its arguments is written as source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    /// `a op b`
    Infix(&'static str, Precedence),
    /// `op a`
    Prefix(&'static str, Precedence),
    /// `name(a, b)`
    Call(&'static str),
    /// `a.name(b)`
    Method(&'static str),
    /// `a.name`
    Attribute(&'static str),
    /// `(get i a)` is `a[i]`
    Index,
    /// `(slice lo hi step)` is `lo:hi:step`
    Slice,
    /// `(a, b)`
    Pair,
    /// `a[0]`
    First,
    /// `a[1]`
    Second,
    /// `[a, *b]`
    Cons,
    /// `[]`
    Nil,
    /// No inverse is recorded; rendered as a call of the primitive's name.
    Unrecorded,
}

/// A member of the primitive vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    /// The primitive's name in terms.
    pub name: &'static str,
    /// The number of arguments it takes.
    pub arity: usize,
    /// How it is written back out as source.
    pub rendering: Rendering,
}

lazy_static! {
    static ref VOCABULARY: IndexMap<&'static str, Primitive> = {
        use precedence::{AND, ARITH, BITAND, BITOR, BITXOR, COMPARE, NOT, OR, POWER, TERM, UNARY};
        use Rendering::{
            Attribute, Call, Cons, First, Index, Infix, Method, Nil, Pair, Prefix, Second, Slice,
            Unrecorded,
        };

        let table = [
            ("add", 2, Infix("+", ARITH)),
            ("sub", 2, Infix("-", ARITH)),
            ("mul", 2, Infix("*", TERM)),
            ("div", 2, Infix("/", TERM)),
            ("floordiv", 2, Infix("//", TERM)),
            ("mod", 2, Infix("%", TERM)),
            ("pow", 2, Infix("**", POWER)),
            ("neg", 1, Prefix("-", UNARY)),
            ("invert", 1, Prefix("~", UNARY)),
            ("bitand", 2, Infix("&", BITAND)),
            ("bitor", 2, Infix("|", BITOR)),
            ("bitxor", 2, Infix("^", BITXOR)),
            ("and", 2, Infix("and", AND)),
            ("or", 2, Infix("or", OR)),
            ("not", 1, Prefix("not ", NOT)),
            ("eq", 2, Infix("==", COMPARE)),
            ("ne", 2, Infix("!=", COMPARE)),
            ("lt", 2, Infix("<", COMPARE)),
            ("lte", 2, Infix("<=", COMPARE)),
            ("gt", 2, Infix(">", COMPARE)),
            ("gte", 2, Infix(">=", COMPARE)),
            ("in", 2, Infix("in", COMPARE)),
            ("notin", 2, Infix("not in", COMPARE)),
            ("is", 2, Infix("is", COMPARE)),
            ("isnot", 2, Infix("is not", COMPARE)),
            ("get", 2, Index),
            ("slice", 3, Slice),
            ("pair", 2, Pair),
            ("fst", 1, First),
            ("snd", 1, Second),
            ("cons", 2, Cons),
            ("nil", 0, Nil),
            ("any", 1, Call("np.any")),
            ("all", 1, Call("np.all")),
            ("sum", 1, Call("np.sum")),
            ("len", 1, Call("len")),
            ("min", 1, Call("min")),
            ("max", 1, Call("max")),
            ("abs", 1, Call("abs")),
            ("round", 1, Call("round")),
            ("sorted", 1, Call("sorted")),
            ("range", 1, Call("range")),
            ("zip", 2, Call("zip")),
            ("unique", 1, Call("np.unique")),
            ("where", 1, Call("np.where")),
            ("argwhere", 1, Call("np.argwhere")),
            ("count", 1, Call("np.count_nonzero")),
            ("nonzero", 1, Unrecorded),
            ("tobool", 1, Call("bool")),
            ("toint", 1, Call("int")),
            ("tofloat", 1, Call("float")),
            ("tostr", 1, Call("str")),
            ("tolist", 1, Call("list")),
            ("ord", 1, Call("ord")),
            ("chr", 1, Call("chr")),
            ("upper", 1, Method("upper")),
            ("lower", 1, Method("lower")),
            ("isdigit", 1, Method("isdigit")),
            ("isalpha", 1, Method("isalpha")),
            ("shape", 1, Attribute("shape")),
        ];
        table
            .into_iter()
            .map(|(name, arity, rendering)| (name, Primitive { name, arity, rendering }))
            .collect()
    };

    /// Function names, dotted or not, that call a primitive.
    static ref CALLS: HashMap<&'static str, &'static str> = [
        ("any", "any"),
        ("np.any", "any"),
        ("numpy.any", "any"),
        ("all", "all"),
        ("np.all", "all"),
        ("numpy.all", "all"),
        ("sum", "sum"),
        ("np.sum", "sum"),
        ("numpy.sum", "sum"),
        ("len", "len"),
        ("min", "min"),
        ("np.min", "min"),
        ("max", "max"),
        ("np.max", "max"),
        ("abs", "abs"),
        ("np.abs", "abs"),
        ("round", "round"),
        ("sorted", "sorted"),
        ("range", "range"),
        ("zip", "zip"),
        ("np.unique", "unique"),
        ("np.where", "where"),
        ("np.argwhere", "argwhere"),
        ("np.count_nonzero", "count"),
        ("np.nonzero", "nonzero"),
        ("bool", "tobool"),
        ("int", "toint"),
        ("float", "tofloat"),
        ("str", "tostr"),
        ("list", "tolist"),
        ("ord", "ord"),
        ("chr", "chr"),
    ]
    .into_iter()
    .collect();

    /// Method names that call a primitive on their receiver.
    static ref METHODS: HashMap<&'static str, &'static str> = [
        ("upper", "upper"),
        ("lower", "lower"),
        ("isdigit", "isdigit"),
        ("isalpha", "isalpha"),
        ("any", "any"),
        ("all", "all"),
        ("sum", "sum"),
    ]
    .into_iter()
    .collect();

    /// Attribute names that apply a primitive to their receiver.
    static ref ATTRIBUTES: HashMap<&'static str, &'static str> =
        [("shape", "shape")].into_iter().collect();
}

/// Look up a primitive by its name in terms.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static Primitive> {
    VOCABULARY.get(name)
}

/// Returns `true` if `name` is a primitive.
#[must_use]
pub fn is_primitive(name: &str) -> bool {
    VOCABULARY.contains_key(name)
}

/// The primitive called by the (possibly dotted) function name `name`.
#[must_use]
pub fn resolve_call(name: &str) -> Option<Symbol> {
    CALLS.get(name).map(|&p| Symbol::from(p))
}

/// The primitive called by method `name`.
#[must_use]
pub fn resolve_method(name: &str) -> Option<Symbol> {
    METHODS.get(name).map(|&p| Symbol::from(p))
}

/// The primitive computing attribute `name`.
#[must_use]
pub fn resolve_attribute(name: &str) -> Option<Symbol> {
    ATTRIBUTES.get(name).map(|&p| Symbol::from(p))
}

/// The primitive implementing a binary operator.
#[must_use]
pub fn binary(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::FloorDiv => "floordiv",
        BinaryOp::Mod => "mod",
        BinaryOp::Pow => "pow",
        BinaryOp::BitAnd => "bitand",
        BinaryOp::BitOr => "bitor",
        BinaryOp::BitXor => "bitxor",
    }
}

/// The primitive implementing a unary operator, if it isn't the identity.
#[must_use]
pub fn unary(op: UnaryOp) -> Option<&'static str> {
    match op {
        UnaryOp::Neg => Some("neg"),
        UnaryOp::Not => Some("not"),
        UnaryOp::Invert => Some("invert"),
        UnaryOp::Pos => None,
    }
}

/// The primitive implementing a boolean connective.
#[must_use]
pub fn boolean(op: BoolOp) -> &'static str {
    match op {
        BoolOp::And => "and",
        BoolOp::Or => "or",
    }
}

/// The primitive implementing a comparison.
#[must_use]
pub fn comparison(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "lt",
        CompareOp::Lte => "lte",
        CompareOp::Gt => "gt",
        CompareOp::Gte => "gte",
        CompareOp::In => "in",
        CompareOp::NotIn => "notin",
        CompareOp::Is => "is",
        CompareOp::IsNot => "isnot",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_into_the_vocabulary() {
        for (&alias, &name) in CALLS.iter().chain(METHODS.iter()).chain(ATTRIBUTES.iter()) {
            assert!(is_primitive(name), "{alias} resolves to unknown {name}");
        }
        assert_eq!(resolve_call("np.count_nonzero"), Some(Symbol::from("count")));
        assert_eq!(resolve_call("bool"), Some(Symbol::from("tobool")));
        assert_eq!(resolve_call("print"), None);
    }

    #[test]
    fn operators_map_to_primitives() {
        assert_eq!(binary(BinaryOp::BitAnd), "bitand");
        assert_eq!(comparison(CompareOp::Lte), "lte");
        assert_eq!(unary(UnaryOp::Pos), None);
        assert!(VOCABULARY.values().all(|p| lookup(p.name) == Some(p)));
    }
}
