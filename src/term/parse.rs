use egg::Symbol;
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_till1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, cut, flat_map, map, map_res, value, verify},
    error::{context, convert_error, VerboseError},
    multi::{fold_many1, many0},
    sequence::{delimited, pair, preceded, terminated},
    Finish, IResult, Parser,
};
use ordered_float::NotNan;
use thiserror::Error;

use super::{is_abstraction_name, Literal, Term};
use crate::primitive;

type ParseResult<'a, Output> = IResult<&'a str, Output, VerboseError<&'a str>>;

/// An error produced when parsing a term from its text form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseTermError {
    /// The text is not a well-formed term.
    #[error("malformed term:\n{0}")]
    Syntax(String),
}

/// An atom that could not be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid atom")]
struct InvalidAtom;

fn parenthesized<'a, O, P>(parser: P) -> impl FnMut(&'a str) -> ParseResult<'a, O>
where
    P: Parser<&'a str, O, VerboseError<&'a str>>,
{
    delimited(
        char('('),
        delimited(multispace0, parser, multispace0),
        char(')'),
    )
}

fn token(s: &str) -> ParseResult<'_, &str> {
    take_till1(|c: char| c.is_whitespace() || "()\"".contains(c))(s)
}

fn classify(token: &str) -> Result<Term, InvalidAtom> {
    let term = match token {
        "true" => Term::Const(Literal::Bool(true)),
        "false" => Term::Const(Literal::Bool(false)),
        "none" => Term::Const(Literal::None),
        "lam" => return Err(InvalidAtom),
        _ if token.starts_with('$') => Term::Var(token.parse().map_err(|_| InvalidAtom)?),
        _ if token.starts_with('#') => Term::Hole(token[1..].parse().map_err(|_| InvalidAtom)?),
        _ if is_abstraction_name(token) => Term::Abstraction(Symbol::from(token), Vec::new()),
        _ if looks_numeric(token) => {
            if let Ok(i) = token.parse() {
                Term::Const(Literal::Int(i))
            } else {
                let x: f64 = token.parse().map_err(|_| InvalidAtom)?;
                if !x.is_finite() {
                    return Err(InvalidAtom);
                }
                Term::Const(Literal::Float(NotNan::new(x).map_err(|_| InvalidAtom)?))
            }
        }
        _ if primitive::is_primitive(token) => Term::Prim(Symbol::from(token)),
        _ => Term::Free(Symbol::from(token)),
    };
    Ok(term)
}

fn looks_numeric(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    digits.starts_with(|c: char| c.is_ascii_digit())
}

fn atom(s: &str) -> ParseResult<'_, Term> {
    context("atom", map_res(token, classify))(s)
}

fn string(s: &str) -> ParseResult<'_, Term> {
    let contents = escaped_transform(
        is_not("\\\""),
        '\\',
        alt((
            value("\\", char('\\')),
            value("\"", char('"')),
            value("\n", char('n')),
        )),
    );
    context(
        "string",
        map(
            alt((
                delimited(char('"'), contents, char('"')),
                map(tag("\"\""), |_| String::new()),
            )),
            |s| Term::Const(Literal::Str(s)),
        ),
    )(s)
}

fn lambda(s: &str) -> ParseResult<'_, Term> {
    context(
        "lambda",
        map(
            parenthesized(preceded(terminated(tag("lam"), multispace1), cut(expr))),
            Term::lambda,
        ),
    )(s)
}

fn abstraction(s: &str) -> ParseResult<'_, Term> {
    context(
        "abstraction",
        map(
            parenthesized(pair(
                verify(token, is_abstraction_name),
                many0(preceded(multispace1, expr)),
            )),
            |(name, args)| Term::Abstraction(Symbol::from(name), args),
        ),
    )(s)
}

fn app(s: &str) -> ParseResult<'_, Term> {
    context(
        "app",
        parenthesized(flat_map(expr, |fun| {
            fold_many1(preceded(multispace1, expr), move || fun.clone(), Term::app)
        })),
    )(s)
}

fn expr(s: &str) -> ParseResult<'_, Term> {
    alt((string, lambda, abstraction, app, atom))(s)
}

pub(crate) fn parse(s: &str) -> Result<Term, ParseTermError> {
    all_consuming(delimited(multispace0, expr, multispace0))(s)
        .finish()
        .map(|(_, term)| term)
        .map_err(|e| ParseTermError::Syntax(convert_error(s, e)))
}
