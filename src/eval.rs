//! A call-by-value evaluator for terms.
//!
//! The evaluator gives converted programs a meaning independent of their
//! source, so that conversion and rewriting can be checked to preserve
//! behavior. Primitives follow the semantics of the source language on
//! integers, floats, booleans, strings, pairs and lists. Array primitives
//! that only make sense for multidimensional arrays are not evaluated.

use std::fmt::{self, Display, Formatter};

use egg::Symbol;
use itertools::Itertools;
use thiserror::Error;

use crate::{
    primitive,
    term::{DeBruijnIndex, Literal, Term},
};

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
    Pair(Box<Value>, Box<Value>),
    List(Vec<Value>),
    Slice(Option<i64>, Option<i64>, Option<i64>),
    Closure(Closure),
    /// A primitive applied to fewer arguments than it takes.
    Partial(Symbol, Vec<Value>),
}

/// A lambda together with the values of the variables it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    env: Vec<Value>,
    body: Term,
}

/// An error produced during evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unbound variable ${0}")]
    Unbound(usize),
    #[error("free symbol {0} has no value")]
    Free(Symbol),
    #[error("hole #{0} has no value")]
    Hole(usize),
    #[error("abstraction {0} must be inlined before evaluation")]
    Abstraction(Symbol),
    #[error("{0} is not a function")]
    NotAFunction(Value),
    #[error("bad operands for {prim}: {operands}")]
    Type { prim: Symbol, operands: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in {0}")]
    Overflow(Symbol),
    #[error("index {0} out of range")]
    Index(i64),
    #[error("primitive {0} has no evaluation rule")]
    Unsupported(Symbol),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Str(s) => f.write_str(s),
            Value::None => f.write_str("None"),
            Value::Pair(a, b) => write!(f, "({a}, {b})"),
            Value::List(xs) => write!(f, "[{}]", xs.iter().join(", ")),
            Value::Slice(..) => f.write_str("slice"),
            Value::Closure(_) => f.write_str("<lambda>"),
            Value::Partial(prim, args) => write!(f, "<{prim}/{}>", args.len()),
        }
    }
}

impl Value {
    /// Truthiness in the source language.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::None => false,
            Value::List(xs) => !xs.is_empty(),
            _ => true,
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => self.as_int().map(|i| i as f64),
        }
    }
}

/// Evaluate `term` in `env`, where the last element of `env` is the value of
/// `$0`.
///
/// # Errors
///
/// Returns an error if the term refers to anything without a value, or if a
/// primitive is applied to operands it isn't defined on.
pub fn eval(term: &Term, env: &[Value]) -> Result<Value, EvalError> {
    match term {
        Term::Var(DeBruijnIndex(i)) => env
            .len()
            .checked_sub(i + 1)
            .map(|pos| env[pos].clone())
            .ok_or(EvalError::Unbound(*i)),
        Term::Hole(k) => Err(EvalError::Hole(*k)),
        Term::Free(symbol) => Err(EvalError::Free(*symbol)),
        Term::Abstraction(name, _) => Err(EvalError::Abstraction(*name)),
        Term::Const(literal) => Ok(match literal {
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(x) => Value::Float(x.into_inner()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::None => Value::None,
        }),
        Term::Prim(name) => partial(*name, Vec::new()),
        Term::Lambda(body) => Ok(Value::Closure(Closure {
            env: env.to_vec(),
            body: (**body).clone(),
        })),
        Term::App(fun, arg) => {
            let fun = eval(fun, env)?;
            let arg = eval(arg, env)?;
            apply(fun, arg)
        }
    }
}

/// Apply a function value to an argument.
///
/// # Errors
///
/// Returns an error if `fun` is not a function or evaluating its body fails.
pub fn apply(fun: Value, arg: Value) -> Result<Value, EvalError> {
    match fun {
        Value::Closure(Closure { mut env, body }) => {
            env.push(arg);
            eval(&body, &env)
        }
        Value::Partial(name, mut args) => {
            args.push(arg);
            partial(name, args)
        }
        other => Err(EvalError::NotAFunction(other)),
    }
}

/// Evaluate a closed term and apply it to `args` in order.
///
/// # Errors
///
/// Returns an error if evaluation fails.
pub fn run(term: &Term, args: Vec<Value>) -> Result<Value, EvalError> {
    args.into_iter()
        .try_fold(eval(term, &[])?, apply)
}

fn partial(name: Symbol, args: Vec<Value>) -> Result<Value, EvalError> {
    let arity = primitive::lookup(name.as_str())
        .map(|p| p.arity)
        .ok_or(EvalError::Unsupported(name))?;
    if args.len() < arity {
        Ok(Value::Partial(name, args))
    } else {
        primitive_op(name, args)
    }
}

fn type_error(name: Symbol, args: &[Value]) -> EvalError {
    EvalError::Type {
        prim: name,
        operands: args.iter().join(", "),
    }
}

fn index(i: i64, len: usize) -> Result<usize, EvalError> {
    let len = i64::try_from(len).map_err(|_| EvalError::Index(i))?;
    let resolved = if i < 0 { i + len } else { i };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| EvalError::Index(i))
    } else {
        Err(EvalError::Index(i))
    }
}

fn slice_range(lo: Option<i64>, hi: Option<i64>, len: usize) -> (usize, usize) {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |i: i64| {
        let i = if i < 0 { i + len } else { i };
        usize::try_from(i.clamp(0, len)).unwrap_or(0)
    };
    let start = lo.map_or(0, clamp);
    let end = hi.map_or_else(|| clamp(len), clamp);
    (start, end.max(start))
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a.wrapping_rem(b) != 0 && (a < 0) != (b < 0) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Pair(a1, a2), Value::Pair(b1, b2)) => equal(a1, b1) && equal(a2, b2),
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equal(x, y))
        }
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => a == b,
        },
    }
}

fn ordering(name: Symbol, a: &Value, b: &Value) -> Result<std::cmp::Ordering, EvalError> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => Ok(x.cmp(&y)),
            _ => a
                .as_float()
                .zip(b.as_float())
                .and_then(|(x, y)| x.partial_cmp(&y))
                .ok_or_else(|| type_error(name, &[a.clone(), b.clone()])),
        },
    }
}

fn arithmetic(
    name: Symbol,
    args: &[Value],
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    let (a, b) = (&args[0], &args[1]);
    match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => int(x, y)
            .map(Value::Int)
            .ok_or(EvalError::Overflow(name)),
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => Ok(Value::Float(float(x, y))),
            _ => Err(type_error(name, args)),
        },
    }
}

fn elements(name: Symbol, value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(xs) => Ok(xs.clone()),
        Value::Pair(a, b) => Ok(vec![(**a).clone(), (**b).clone()]),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        other => Err(type_error(name, &[other.clone()])),
    }
}

fn extremum(name: Symbol, value: &Value, want: std::cmp::Ordering) -> Result<Value, EvalError> {
    let mut best: Option<Value> = None;
    for x in elements(name, value)? {
        best = Some(match best {
            Some(b) if ordering(name, &x, &b)? != want => b,
            _ => x,
        });
    }
    best.ok_or_else(|| type_error(name, &[value.clone()]))
}

fn sort(name: Symbol, mut xs: Vec<Value>) -> Result<Vec<Value>, EvalError> {
    let mut error = None;
    xs.sort_by(|a, b| {
        ordering(name, a, b).unwrap_or_else(|e| {
            error.get_or_insert(e);
            std::cmp::Ordering::Equal
        })
    });
    error.map_or(Ok(xs), Err)
}

#[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
fn primitive_op(name: Symbol, args: Vec<Value>) -> Result<Value, EvalError> {
    use Value::{Bool, Float, Int, List, Pair, Str};

    Ok(match (name.as_str(), args.as_slice()) {
        ("add", [Str(a), Str(b)]) => Str(format!("{a}{b}")),
        ("add", [List(a), List(b)]) => List(a.iter().chain(b).cloned().collect()),
        ("add", _) => arithmetic(name, &args, i64::checked_add, |x, y| x + y)?,
        ("sub", _) => arithmetic(name, &args, i64::checked_sub, |x, y| x - y)?,
        ("mul", [Str(s), n]) | ("mul", [n, Str(s)]) => {
            let n = n.as_int().ok_or_else(|| type_error(name, &args))?;
            Str(s.repeat(usize::try_from(n).unwrap_or(0)))
        }
        ("mul", _) => arithmetic(name, &args, i64::checked_mul, |x, y| x * y)?,
        ("div", [a, b]) => match (a.as_float(), b.as_float()) {
            (Some(_), Some(y)) if y == 0.0 => return Err(EvalError::DivisionByZero),
            (Some(x), Some(y)) => Float(x / y),
            _ => return Err(type_error(name, &args)),
        },
        ("floordiv" | "mod", [_, b]) if b.as_float() == Some(0.0) => {
            return Err(EvalError::DivisionByZero)
        }
        ("floordiv", _) => arithmetic(name, &args, floor_div, |x, y| (x / y).floor())?,
        ("mod", _) => arithmetic(name, &args, floor_mod, |x, y| x - y * (x / y).floor())?,
        ("pow", [a, b]) if b.as_int().map_or(false, |y| y < 0) => {
            match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => Float(x.powf(y)),
                _ => return Err(type_error(name, &args)),
            }
        }
        ("pow", _) => arithmetic(
            name,
            &args,
            |x, y| u32::try_from(y).ok().and_then(|y| x.checked_pow(y)),
            f64::powf,
        )?,
        ("neg", [Float(x)]) => Float(-x),
        ("neg", [x]) => Int(x
            .as_int()
            .ok_or_else(|| type_error(name, &args))?
            .checked_neg()
            .ok_or(EvalError::Overflow(name))?),
        ("invert", [x]) => Int(!x.as_int().ok_or_else(|| type_error(name, &args))?),
        ("bitand" | "bitor" | "bitxor", [Bool(a), Bool(b)]) => Bool(match name.as_str() {
            "bitand" => a & b,
            "bitor" => a | b,
            _ => a ^ b,
        }),
        ("bitand", _) => arithmetic(name, &args, |x, y| Some(x & y), |_, _| f64::NAN)?,
        ("bitor", _) => arithmetic(name, &args, |x, y| Some(x | y), |_, _| f64::NAN)?,
        ("bitxor", _) => arithmetic(name, &args, |x, y| Some(x ^ y), |_, _| f64::NAN)?,
        ("and", [a, b]) => {
            if a.truthy() {
                b.clone()
            } else {
                a.clone()
            }
        }
        ("or", [a, b]) => {
            if a.truthy() {
                a.clone()
            } else {
                b.clone()
            }
        }
        ("not", [a]) => Bool(!a.truthy()),
        ("eq" | "is", [a, b]) => Bool(equal(a, b)),
        ("ne" | "isnot", [a, b]) => Bool(!equal(a, b)),
        ("lt", [a, b]) => Bool(ordering(name, a, b)?.is_lt()),
        ("lte", [a, b]) => Bool(ordering(name, a, b)?.is_le()),
        ("gt", [a, b]) => Bool(ordering(name, a, b)?.is_gt()),
        ("gte", [a, b]) => Bool(ordering(name, a, b)?.is_ge()),
        ("in" | "notin", [a, b]) => {
            let found = match (a, b) {
                (Str(needle), Str(haystack)) => haystack.contains(needle.as_str()),
                (_, b) => elements(name, b)?.iter().any(|x| equal(a, x)),
            };
            Bool(found == (name.as_str() == "in"))
        }
        ("get", [Value::Slice(lo, hi, None), List(xs)]) => {
            let (start, end) = slice_range(*lo, *hi, xs.len());
            List(xs[start..end].to_vec())
        }
        ("get", [Value::Slice(lo, hi, None), Str(s)]) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_range(*lo, *hi, chars.len());
            Str(chars[start..end].iter().collect())
        }
        ("get", [i, container]) => {
            let i = i.as_int().ok_or_else(|| type_error(name, &args))?;
            let xs = elements(name, container)?;
            xs[index(i, xs.len())?].clone()
        }
        ("slice", [lo, hi, step]) => {
            let bound = |v: &Value| match v {
                Value::None => Ok(None),
                v => v.as_int().map(Some).ok_or_else(|| type_error(name, &args)),
            };
            Value::Slice(bound(lo)?, bound(hi)?, bound(step)?)
        }
        ("pair", [a, b]) => Pair(Box::new(a.clone()), Box::new(b.clone())),
        ("fst", [Pair(a, _)]) => (**a).clone(),
        ("snd", [Pair(_, b)]) => (**b).clone(),
        ("cons", [x, List(xs)]) => List(std::iter::once(x.clone()).chain(xs.iter().cloned()).collect()),
        ("nil", []) => List(Vec::new()),
        ("len", [x]) => Int(i64::try_from(elements(name, x)?.len()).unwrap_or(i64::MAX)),
        ("sum", [x]) => elements(name, x)?
            .into_iter()
            .try_fold(Int(0), |acc, x| primitive_op(Symbol::from("add"), vec![acc, x]))?,
        ("min", [x]) => extremum(name, x, std::cmp::Ordering::Less)?,
        ("max", [x]) => extremum(name, x, std::cmp::Ordering::Greater)?,
        ("abs", [Float(x)]) => Float(x.abs()),
        ("abs", [x]) => Int(x
            .as_int()
            .ok_or_else(|| type_error(name, &args))?
            .checked_abs()
            .ok_or(EvalError::Overflow(name))?),
        ("round", [x]) => Int(x.as_float().ok_or_else(|| type_error(name, &args))?.round() as i64),
        ("any", [x]) => Bool(elements(name, x)?.iter().any(Value::truthy)),
        ("all", [x]) => Bool(elements(name, x)?.iter().all(Value::truthy)),
        ("count", [x]) => Int(
            i64::try_from(elements(name, x)?.iter().filter(|x| x.truthy()).count())
                .unwrap_or(i64::MAX),
        ),
        ("sorted", [x]) => List(sort(name, elements(name, x)?)?),
        ("unique", [x]) => {
            let mut xs = sort(name, elements(name, x)?)?;
            xs.dedup_by(|a, b| equal(a, b));
            List(xs)
        }
        ("range", [n]) => {
            let n = n.as_int().ok_or_else(|| type_error(name, &args))?;
            List((0..n.max(0)).map(Int).collect())
        }
        ("zip", [a, b]) => List(
            elements(name, a)?
                .into_iter()
                .zip(elements(name, b)?)
                .map(|(x, y)| Pair(Box::new(x), Box::new(y)))
                .collect(),
        ),
        ("tobool", [x]) => Bool(x.truthy()),
        ("toint", [Float(x)]) => Int(x.trunc() as i64),
        ("toint", [Str(s)]) => Int(s.trim().parse().map_err(|_| type_error(name, &args))?),
        ("toint", [x]) => Int(x.as_int().ok_or_else(|| type_error(name, &args))?),
        ("tofloat", [Str(s)]) => Float(s.trim().parse().map_err(|_| type_error(name, &args))?),
        ("tofloat", [x]) => Float(x.as_float().ok_or_else(|| type_error(name, &args))?),
        ("tostr", [x]) => Str(x.to_string()),
        ("tolist", [x]) => List(elements(name, x)?),
        ("ord", [Str(s)]) if s.chars().count() == 1 => {
            Int(s.chars().next().map_or(0, |c| i64::from(u32::from(c))))
        }
        ("chr", [x]) => {
            let code = x.as_int().and_then(|i| u32::try_from(i).ok());
            Str(code
                .and_then(char::from_u32)
                .ok_or_else(|| type_error(name, &args))?
                .to_string())
        }
        ("upper", [Str(s)]) => Str(s.to_uppercase()),
        ("lower", [Str(s)]) => Str(s.to_lowercase()),
        ("isdigit", [Str(s)]) => Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
        ("isalpha", [Str(s)]) => Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        ("where" | "argwhere" | "nonzero" | "shape", _) => return Err(EvalError::Unsupported(name)),
        _ => return Err(type_error(name, &args)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(s: &str) -> Result<Value, EvalError> {
        eval(&s.parse().unwrap(), &[])
    }

    #[test]
    fn arithmetic_follows_source_semantics() {
        assert_eq!(eval_str("(floordiv -7 2)"), Ok(Value::Int(-4)));
        assert_eq!(eval_str("(floordiv 7 -2)"), Ok(Value::Int(-4)));
        assert_eq!(eval_str("(mod -7 2)"), Ok(Value::Int(1)));
        assert_eq!(eval_str("(div 7 2)"), Ok(Value::Float(3.5)));
        assert_eq!(eval_str("(add true 1)"), Ok(Value::Int(2)));
        assert_eq!(eval_str("(div 1 0)"), Err(EvalError::DivisionByZero));
        assert_eq!(eval_str("(pow 2 10)"), Ok(Value::Int(1024)));
        assert_eq!(eval_str("(pow 2 -1)"), Ok(Value::Float(0.5)));
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let min = i64::MIN;
        let overflow = |prim: &str| Err(EvalError::Overflow(prim.into()));
        assert_eq!(eval_str(&format!("(neg {min})")), overflow("neg"));
        assert_eq!(eval_str(&format!("(abs {min})")), overflow("abs"));
        assert_eq!(eval_str(&format!("(floordiv {min} -1)")), overflow("floordiv"));
        assert_eq!(eval_str(&format!("(mod {min} -1)")), Ok(Value::Int(0)));
        assert_eq!(eval_str(&format!("(add {} 1)", i64::MAX)), overflow("add"));
        assert_eq!(eval_str(&format!("(floordiv {min} 2)")), Ok(Value::Int(min / 2)));
    }

    #[test]
    fn boolean_connectives_return_operands() {
        assert_eq!(eval_str("(and 0 5)"), Ok(Value::Int(0)));
        assert_eq!(eval_str("(or 0 5)"), Ok(Value::Int(5)));
        assert_eq!(eval_str("(not \"\")"), Ok(Value::Bool(true)));
    }

    #[test]
    fn sequences() {
        let list = "(cons 1 (cons 2 (cons 3 nil)))";
        assert_eq!(eval_str(&format!("(get -1 {list})")), Ok(Value::Int(3)));
        assert_eq!(
            eval_str(&format!("(get (slice 1 none none) {list})")),
            Ok(Value::List(vec![Value::Int(2), Value::Int(3)]))
        );
        assert_eq!(eval_str(&format!("(sum {list})")), Ok(Value::Int(6)));
        assert_eq!(eval_str(&format!("(in 2 {list})")), Ok(Value::Bool(true)));
        assert_eq!(eval_str("(snd (pair 1 2))"), Ok(Value::Int(2)));
        assert_eq!(eval_str("(get 5 nil)"), Err(EvalError::Index(5)));
    }

    #[test]
    fn closures_capture_their_environment() {
        let term: Term = "(lam (lam (sub $1 $0)))".parse().unwrap();
        assert_eq!(run(&term, vec![Value::Int(10), Value::Int(4)]), Ok(Value::Int(6)));
        let curried = run(&term, vec![Value::Int(10)]).unwrap();
        assert_eq!(apply(curried, Value::Int(1)), Ok(Value::Int(9)));
    }

    #[test]
    fn unevaluable_terms() {
        assert_eq!(eval_str("$0"), Err(EvalError::Unbound(0)));
        assert_eq!(eval_str("(fn_0 1)"), Err(EvalError::Abstraction("fn_0".into())));
        assert!(matches!(eval_str("(add x 1)"), Err(EvalError::Free(_))));
    }
}
