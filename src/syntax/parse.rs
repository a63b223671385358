//! A parser for single function definitions written in a Python subset.
//!
//! Only the shape of straight-line functions is modelled in detail. Compound
//! statements are recognized by their header line and recorded as `Loop`,
//! `Conditional` or `Unsupported` nodes, with their blocks skipped, so that
//! the converter can reject them with a precise reason.

use log::debug;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, hex_digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, not, opt, peek, recognize, value, verify},
    error::{context, convert_error, ErrorKind, ParseError as _, VerboseError},
    multi::{fold_many0, many0, many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    Err, Finish, IResult,
};
use thiserror::Error;

use super::{BinaryOp, BoolOp, CompareOp, Node, NodeKind, UnaryOp};

type ParseResult<'a, Output> = IResult<&'a str, Output, VerboseError<&'a str>>;

const TAB_WIDTH: usize = 8;

const RESERVED: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield", "None",
    "True", "False",
];

/// An error produced when parsing a function's source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// The 1-based line the error was found on.
    pub line: usize,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    fn new<S: Into<String>>(line: usize, message: S) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// A logical line: physical lines joined across brackets and continuations,
/// with comments removed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    number: usize,
    indent: usize,
    text: String,
}

fn logical_lines(source: &str) -> Result<Vec<Line>, ParseError> {
    let mut lines = Vec::new();
    let mut chars = source.chars().peekable();
    let mut number = 1;
    let mut start = 1;
    let mut text = String::new();
    let mut indent = 0;
    let mut at_line_start = true;
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        if at_line_start {
            match c {
                ' ' => {
                    indent += 1;
                    continue;
                }
                '\t' => {
                    indent = (indent / TAB_WIDTH + 1) * TAB_WIDTH;
                    continue;
                }
                _ => {
                    at_line_start = false;
                    start = number;
                }
            }
        }
        match c {
            '#' => {
                while chars.peek().map_or(false, |&c| c != '\n') {
                    chars.next();
                }
            }
            '\\' if chars.peek() == Some(&'\n') => {
                chars.next();
                number += 1;
                text.push(' ');
            }
            '\n' => {
                number += 1;
                if depth > 0 {
                    text.push(' ');
                } else {
                    if !text.trim().is_empty() {
                        lines.push(Line {
                            number: start,
                            indent,
                            text: text.trim_end().to_owned(),
                        });
                    }
                    text.clear();
                    indent = 0;
                    at_line_start = true;
                }
            }
            '\'' | '"' => {
                let triple = {
                    let mut ahead = chars.clone();
                    ahead.next() == Some(c) && ahead.next() == Some(c)
                };
                text.push(c);
                if triple {
                    text.push(c);
                    text.push(c);
                    chars.next();
                    chars.next();
                }
                let mut closing = 0;
                loop {
                    let s = chars
                        .next()
                        .ok_or_else(|| ParseError::new(start, "unterminated string"))?;
                    text.push(s);
                    match s {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                number += usize::from(escaped == '\n');
                                text.push(escaped);
                            }
                            closing = 0;
                        }
                        '\n' if !triple => {
                            return Err(ParseError::new(start, "unterminated string"));
                        }
                        _ if s == c => {
                            closing += 1;
                            if !triple || closing == 3 {
                                break;
                            }
                        }
                        _ => {
                            number += usize::from(s == '\n');
                            closing = 0;
                        }
                    }
                }
            }
            '(' | '[' | '{' => {
                depth += 1;
                text.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                text.push(c);
            }
            _ => text.push(c),
        }
    }
    if !text.trim().is_empty() {
        lines.push(Line {
            number: start,
            indent,
            text: text.trim_end().to_owned(),
        });
    }
    Ok(lines)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn sym<'a>(token: &'static str) -> impl FnMut(&'a str) -> ParseResult<'a, &'a str> {
    preceded(multispace0, tag(token))
}

/// `token` not immediately followed by any of `forbidden`.
fn op<'a>(
    token: &'static str,
    forbidden: &'static str,
) -> impl FnMut(&'a str) -> ParseResult<'a, &'a str> {
    terminated(sym(token), not(peek(one_of(forbidden))))
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> ParseResult<'a, &'a str> {
    preceded(
        multispace0,
        terminated(tag(word), not(peek(satisfy(is_ident_char)))),
    )
}

fn word(s: &str) -> ParseResult<'_, &str> {
    preceded(
        multispace0,
        recognize(pair(satisfy(is_ident_start), take_while(is_ident_char))),
    )(s)
}

fn identifier(s: &str) -> ParseResult<'_, &str> {
    context("identifier", verify(word, |w: &str| !RESERVED.contains(&w)))(s)
}

/// Consume input up to, but not including, the first unbalanced closing
/// bracket.
fn balanced(s: &str) -> ParseResult<'_, &str> {
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth == 0 => return Ok((&s[i..], &s[..i])),
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    Err(Err::Error(VerboseError::from_error_kind(s, ErrorKind::TakeUntil)))
}

fn string_literal(s: &str) -> ParseResult<'_, String> {
    let (s, _) = multispace0(s)?;
    let (s, _) = opt(verify(take_while1(|c: char| "rRbBuUfF".contains(c)), |p: &str| {
        p.len() <= 2
    }))(s)?;
    let (rest, quote) = alt((tag("\"\"\""), tag("'''"), tag("\""), tag("'")))(s)?;
    let mut contents = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        if rest[i..].starts_with(quote) {
            return Ok((&rest[i + quote.len()..], contents));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => contents.push('\n'),
                Some((_, 't')) => contents.push('\t'),
                Some((_, e @ ('\\' | '\'' | '"'))) => contents.push(e),
                Some((_, e)) => {
                    contents.push('\\');
                    contents.push(e);
                }
                None => break,
            }
        } else {
            contents.push(c);
        }
    }
    Err(Err::Error(VerboseError::from_error_kind(s, ErrorKind::Escaped)))
}

fn string(s: &str) -> ParseResult<'_, Node> {
    context(
        "string",
        map(many1(string_literal), |parts| {
            Node::leaf(NodeKind::Str, parts.concat())
        }),
    )(s)
}

fn digits(s: &str) -> ParseResult<'_, &str> {
    recognize(pair(digit1, many0(pair(char('_'), digit1))))(s)
}

fn exponent(s: &str) -> ParseResult<'_, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(s)
}

fn number(s: &str) -> ParseResult<'_, Node> {
    let float = recognize(alt((
        recognize(tuple((digits, char('.'), opt(digits), opt(exponent)))),
        recognize(tuple((char('.'), digits, opt(exponent)))),
        recognize(pair(digits, exponent)),
    )));
    let hex = recognize(pair(tag_no_case("0x"), hex_digit1));
    context(
        "number",
        preceded(
            multispace0,
            terminated(
                alt((
                    map(float, |f: &str| Node::leaf(NodeKind::Float, f.replace('_', ""))),
                    map(hex, |h: &str| Node::leaf(NodeKind::Int, h)),
                    map(digits, |i: &str| Node::leaf(NodeKind::Int, i.replace('_', ""))),
                )),
                not(peek(satisfy(is_ident_char))),
            ),
        ),
    )(s)
}

fn name_or_constant(s: &str) -> ParseResult<'_, Node> {
    let usable = |w: &str| matches!(w, "True" | "False" | "None") || !RESERVED.contains(&w);
    map(verify(word, usable), |w| match w {
        "True" | "False" => Node::leaf(NodeKind::Bool, w),
        "None" => Node::leaf(NodeKind::NoneLit, w),
        _ => Node::name(w),
    })(s)
}

/// A comprehension clause following an element, up to the closing bracket.
fn comprehension(s: &str) -> ParseResult<'_, Node> {
    map(preceded(keyword("for"), balanced), |_| {
        Node::leaf(NodeKind::Loop, "comprehension")
    })(s)
}

fn element(s: &str) -> ParseResult<'_, Node> {
    alt((
        map(preceded(op("*", "*"), expression), |e| {
            Node::new(NodeKind::Starred, vec![e])
        }),
        map(pair(expression, opt(comprehension)), |(e, comp)| {
            comp.unwrap_or(e)
        }),
    ))(s)
}

/// A comma-separated sequence; a single element without a trailing comma is
/// returned as is, anything else becomes a tuple.
fn sequence(s: &str) -> ParseResult<'_, Node> {
    map(
        pair(separated_list1(sym(","), element), opt(sym(","))),
        |(mut elements, trailing)| {
            if elements.len() == 1 && trailing.is_none() {
                elements.remove(0)
            } else {
                Node::new(NodeKind::Tuple, elements)
            }
        },
    )(s)
}

fn parenthesized(s: &str) -> ParseResult<'_, Node> {
    context(
        "parenthesized",
        map(delimited(sym("("), opt(sequence), sym(")")), |inner| {
            inner.unwrap_or_else(|| Node::new(NodeKind::Tuple, Vec::new()))
        }),
    )(s)
}

fn list(s: &str) -> ParseResult<'_, Node> {
    context(
        "list",
        map(
            delimited(
                sym("["),
                terminated(separated_list0(sym(","), element), opt(sym(","))),
                sym("]"),
            ),
            |elements| Node::new(NodeKind::List, elements),
        ),
    )(s)
}

fn braces(s: &str) -> ParseResult<'_, Node> {
    map(delimited(sym("{"), balanced, char('}')), |_| {
        Node::leaf(NodeKind::Unsupported, "dict or set display")
    })(s)
}

fn atom(s: &str) -> ParseResult<'_, Node> {
    alt((parenthesized, list, braces, number, string, name_or_constant))(s)
}

enum Trailer {
    Call(Vec<Node>),
    Index(Node),
    Attribute(String),
}

fn argument(s: &str) -> ParseResult<'_, Node> {
    alt((
        map(preceded(sym("**"), expression), |e| {
            Node::new(NodeKind::Starred, vec![e])
        }),
        map(
            pair(identifier, preceded(op("=", "="), expression)),
            |(name, value)| Node::with_literal(NodeKind::Keyword, name, vec![value]),
        ),
        element,
    ))(s)
}

fn slice_bound(s: &str) -> ParseResult<'_, Node> {
    map(opt(expression), |e| {
        e.unwrap_or_else(|| Node::new(NodeKind::Omitted, Vec::new()))
    })(s)
}

fn slice(s: &str) -> ParseResult<'_, Node> {
    map(
        tuple((
            slice_bound,
            sym(":"),
            slice_bound,
            opt(preceded(sym(":"), slice_bound)),
        )),
        |(lower, _, upper, step)| {
            let step = step.unwrap_or_else(|| Node::new(NodeKind::Omitted, Vec::new()));
            Node::new(NodeKind::Slice, vec![lower, upper, step])
        },
    )(s)
}

fn subscript(s: &str) -> ParseResult<'_, Node> {
    map(
        pair(separated_list1(sym(","), alt((slice, expression))), opt(sym(","))),
        |(mut indices, trailing)| {
            if indices.len() == 1 && trailing.is_none() {
                indices.remove(0)
            } else {
                Node::new(NodeKind::Tuple, indices)
            }
        },
    )(s)
}

fn trailer(s: &str) -> ParseResult<'_, Trailer> {
    alt((
        map(
            delimited(
                sym("("),
                terminated(separated_list0(sym(","), argument), opt(sym(","))),
                sym(")"),
            ),
            Trailer::Call,
        ),
        map(delimited(sym("["), subscript, sym("]")), Trailer::Index),
        map(preceded(sym("."), identifier), |attr| {
            Trailer::Attribute(attr.to_owned())
        }),
    ))(s)
}

fn postfix(s: &str) -> ParseResult<'_, Node> {
    let (s, base) = atom(s)?;
    fold_many0(
        trailer,
        move || base.clone(),
        |node, trailer| match trailer {
            Trailer::Call(args) => {
                let mut children = vec![node];
                children.extend(args);
                Node::new(NodeKind::Call, children)
            }
            Trailer::Index(index) => Node::new(NodeKind::Subscript, vec![node, index]),
            Trailer::Attribute(attr) => Node::with_literal(NodeKind::Attribute, attr, vec![node]),
        },
    )(s)
}

fn power(s: &str) -> ParseResult<'_, Node> {
    map(
        pair(postfix, opt(preceded(op("**", "="), factor))),
        |(base, exponent)| match exponent {
            Some(exponent) => Node::new(NodeKind::Binary(BinaryOp::Pow), vec![base, exponent]),
            None => base,
        },
    )(s)
}

fn factor(s: &str) -> ParseResult<'_, Node> {
    let unary = alt((
        value(UnaryOp::Neg, op("-", "=")),
        value(UnaryOp::Pos, op("+", "=")),
        value(UnaryOp::Invert, sym("~")),
    ));
    alt((
        map(pair(unary, factor), |(op, operand)| {
            Node::new(NodeKind::Unary(op), vec![operand])
        }),
        power,
    ))(s)
}

/// A left-associative chain of binary operators.
fn chain<'a>(
    s: &'a str,
    operand: fn(&'a str) -> ParseResult<'a, Node>,
    operator: fn(&'a str) -> ParseResult<'a, BinaryOp>,
) -> ParseResult<'a, Node> {
    let (s, first) = operand(s)?;
    fold_many0(
        pair(operator, operand),
        move || first.clone(),
        |left, (op, right)| Node::new(NodeKind::Binary(op), vec![left, right]),
    )(s)
}

fn term_op(s: &str) -> ParseResult<'_, BinaryOp> {
    alt((
        value(BinaryOp::FloorDiv, op("//", "=")),
        value(BinaryOp::Div, op("/", "=/")),
        value(BinaryOp::Mul, op("*", "*=")),
        value(BinaryOp::Mod, op("%", "=")),
    ))(s)
}

fn term(s: &str) -> ParseResult<'_, Node> {
    chain(s, factor, term_op)
}

fn arith_op(s: &str) -> ParseResult<'_, BinaryOp> {
    alt((
        value(BinaryOp::Add, op("+", "=")),
        value(BinaryOp::Sub, op("-", "=")),
    ))(s)
}

fn arith(s: &str) -> ParseResult<'_, Node> {
    chain(s, term, arith_op)
}

fn bitand_op(s: &str) -> ParseResult<'_, BinaryOp> {
    value(BinaryOp::BitAnd, op("&", "="))(s)
}

fn bitand(s: &str) -> ParseResult<'_, Node> {
    chain(s, arith, bitand_op)
}

fn bitxor_op(s: &str) -> ParseResult<'_, BinaryOp> {
    value(BinaryOp::BitXor, op("^", "="))(s)
}

fn bitxor(s: &str) -> ParseResult<'_, Node> {
    chain(s, bitand, bitxor_op)
}

fn bitor_op(s: &str) -> ParseResult<'_, BinaryOp> {
    value(BinaryOp::BitOr, op("|", "="))(s)
}

fn bitor(s: &str) -> ParseResult<'_, Node> {
    chain(s, bitxor, bitor_op)
}

fn compare_op(s: &str) -> ParseResult<'_, CompareOp> {
    alt((
        value(CompareOp::Eq, sym("==")),
        value(CompareOp::Ne, sym("!=")),
        value(CompareOp::Lte, sym("<=")),
        value(CompareOp::Gte, sym(">=")),
        value(CompareOp::Lt, op("<", "<")),
        value(CompareOp::Gt, op(">", ">")),
        value(CompareOp::NotIn, pair(keyword("not"), keyword("in"))),
        value(CompareOp::In, keyword("in")),
        value(CompareOp::IsNot, pair(keyword("is"), keyword("not"))),
        value(CompareOp::Is, keyword("is")),
    ))(s)
}

fn comparison(s: &str) -> ParseResult<'_, Node> {
    map(
        pair(bitor, many0(pair(compare_op, bitor))),
        |(first, rest)| {
            if rest.is_empty() {
                return first;
            }
            let ops: Vec<_> = rest.iter().map(|(op, _)| op.token()).collect();
            let mut operands = vec![first];
            operands.extend(rest.into_iter().map(|(_, operand)| operand));
            Node::with_literal(NodeKind::Compare, ops.join(","), operands)
        },
    )(s)
}

fn inversion(s: &str) -> ParseResult<'_, Node> {
    alt((
        map(preceded(keyword("not"), inversion), |operand| {
            Node::new(NodeKind::Unary(UnaryOp::Not), vec![operand])
        }),
        comparison,
    ))(s)
}

fn boolean<'a>(
    s: &'a str,
    operand: fn(&'a str) -> ParseResult<'a, Node>,
    word: &'static str,
    op: BoolOp,
) -> ParseResult<'a, Node> {
    map(separated_list1(keyword(word), operand), |mut operands| {
        if operands.len() == 1 {
            operands.remove(0)
        } else {
            Node::new(NodeKind::Boolean(op), operands)
        }
    })(s)
}

fn conjunction(s: &str) -> ParseResult<'_, Node> {
    boolean(s, inversion, "and", BoolOp::And)
}

fn disjunction(s: &str) -> ParseResult<'_, Node> {
    boolean(s, conjunction, "or", BoolOp::Or)
}

fn conditional(s: &str) -> ParseResult<'_, Node> {
    map(
        pair(
            disjunction,
            opt(tuple((keyword("if"), disjunction, keyword("else"), expression))),
        ),
        |(body, condition)| match condition {
            Some(_) => Node::leaf(NodeKind::Conditional, "conditional expression"),
            None => body,
        },
    )(s)
}

fn parameter(s: &str) -> ParseResult<'_, Node> {
    let annotation = opt(preceded(sym(":"), expression));
    let default = opt(preceded(op("=", "="), expression));
    map(
        tuple((opt(alt((sym("**"), sym("*")))), identifier, annotation, default)),
        |(star, name, _, _)| match star {
            Some(_) => Node::new(NodeKind::Starred, vec![Node::name(name)]),
            None => Node::name(name),
        },
    )(s)
}

fn parameters(s: &str) -> ParseResult<'_, Node> {
    map(
        terminated(separated_list0(sym(","), parameter), opt(sym(","))),
        |params| Node::new(NodeKind::Parameters, params),
    )(s)
}

fn lambda(s: &str) -> ParseResult<'_, Node> {
    let params = map(separated_list0(sym(","), identifier), |names| {
        Node::new(
            NodeKind::Parameters,
            names.into_iter().map(Node::name).collect(),
        )
    });
    context(
        "lambda",
        map(
            preceded(keyword("lambda"), pair(terminated(params, sym(":")), expression)),
            |(params, body)| Node::new(NodeKind::Lambda, vec![params, body]),
        ),
    )(s)
}

fn expression(s: &str) -> ParseResult<'_, Node> {
    alt((lambda, conditional))(s)
}

fn aug_op(s: &str) -> ParseResult<'_, BinaryOp> {
    alt((
        value(BinaryOp::Add, sym("+=")),
        value(BinaryOp::Sub, sym("-=")),
        value(BinaryOp::Pow, sym("**=")),
        value(BinaryOp::Mul, sym("*=")),
        value(BinaryOp::FloorDiv, sym("//=")),
        value(BinaryOp::Div, sym("/=")),
        value(BinaryOp::Mod, sym("%=")),
        value(BinaryOp::BitAnd, sym("&=")),
        value(BinaryOp::BitOr, sym("|=")),
        value(BinaryOp::BitXor, sym("^=")),
    ))(s)
}

fn targets(s: &str) -> ParseResult<'_, Node> {
    map(
        pair(separated_list1(sym(","), postfix), opt(sym(","))),
        |(mut targets, trailing)| {
            if targets.len() == 1 && trailing.is_none() {
                targets.remove(0)
            } else {
                Node::new(NodeKind::Tuple, targets)
            }
        },
    )(s)
}

/// Parses one simple statement. `Ok(None)` means the statement has no effect
/// on the function's value and is dropped.
fn simple_statement(s: &str) -> ParseResult<'_, Option<Node>> {
    let ret = map(preceded(keyword("return"), opt(sequence)), |value| {
        Some(Node::new(NodeKind::Return, value.into_iter().collect()))
    });
    let aug = map(tuple((postfix, aug_op, sequence)), |(target, op, value)| {
        Some(Node::new(NodeKind::AugAssign(op), vec![target, value]))
    });
    let assign = map(
        pair(terminated(targets, op("=", "=")), sequence),
        |(target, value)| Some(Node::new(NodeKind::Assign, vec![target, value])),
    );
    let annotated = map(
        tuple((
            identifier,
            sym(":"),
            expression,
            opt(preceded(op("=", "="), sequence)),
        )),
        |(name, _, _, value)| {
            value.map(|value| Node::new(NodeKind::Assign, vec![Node::name(name), value]))
        },
    );
    let expr = map(sequence, |e| {
        if e.kind == NodeKind::Str {
            None
        } else {
            Some(Node::new(NodeKind::Expression, vec![e]))
        }
    });
    terminated(alt((ret, aug, assign, annotated, expr)), multispace0)(s)
}

fn first_word(text: &str) -> &str {
    let end = text.find(|c: char| !is_ident_char(c)).unwrap_or(text.len());
    &text[..end]
}

/// Parse one logical line of a function body. Returns the statement, if any,
/// and whether the line opens a block.
///
/// `pass` and imports produce no statement. Bare expressions such as
/// `print(x)` are kept as [`NodeKind::Expression`] statements, which the
/// converter rejects as unsupported.
fn statement(line: &Line) -> Result<(Option<Node>, bool), ParseError> {
    let text = line.text.trim();
    let opens_block = text.ends_with(':');
    let node = match first_word(text) {
        "for" | "while" => Some(Node::leaf(NodeKind::Loop, first_word(text))),
        "if" | "elif" | "else" => Some(Node::leaf(NodeKind::Conditional, "if")),
        w @ ("with" | "try" | "except" | "finally" | "def" | "class" | "async") => {
            Some(Node::leaf(NodeKind::Unsupported, format!("{w} statement")))
        }
        "match" if opens_block => Some(Node::leaf(NodeKind::Unsupported, "match statement")),
        w @ ("raise" | "assert" | "del" | "global" | "nonlocal" | "yield" | "break"
        | "continue") => Some(Node::leaf(NodeKind::Unsupported, format!("{w} statement"))),
        "pass" | "import" | "from" => None,
        _ => {
            return all_consuming(simple_statement)(text)
                .finish()
                .map(|(_, node)| (node, false))
                .map_err(|e| ParseError::new(line.number, convert_error(text, e)));
        }
    };
    Ok((node, opens_block))
}

fn header(s: &str) -> ParseResult<'_, (&str, Node)> {
    context(
        "function header",
        map(
            tuple((
                keyword("def"),
                identifier,
                sym("("),
                parameters,
                sym(")"),
                opt(preceded(sym("->"), expression)),
                sym(":"),
            )),
            |(_, name, _, params, _, _, _)| (name, params),
        ),
    )(s)
}

/// Parse the first function definition in `source`.
///
/// Module-level lines before the definition, such as imports, are skipped, as
/// is anything after the function's body.
///
/// # Errors
///
/// Returns an error if there is no function definition, or if a line of the
/// function cannot be parsed.
pub fn parse_function(source: &str) -> Result<Node, ParseError> {
    let lines = logical_lines(source)?;
    let start = lines
        .iter()
        .position(|line| first_word(&line.text) == "def")
        .ok_or_else(|| ParseError::new(1, "no function definition"))?;
    let def = &lines[start];
    let (rest, (name, params)) = header(&def.text)
        .finish()
        .map_err(|e| ParseError::new(def.number, convert_error(def.text.as_str(), e)))?;

    let mut body: Vec<Line> = Vec::new();
    if !rest.trim().is_empty() {
        body.push(Line {
            number: def.number,
            indent: def.indent + 1,
            text: rest.trim().to_owned(),
        });
    } else {
        body.extend(
            lines[start + 1..]
                .iter()
                .take_while(|line| line.indent > def.indent)
                .cloned(),
        );
    }
    let base = body
        .first()
        .map(|line| line.indent)
        .ok_or_else(|| ParseError::new(def.number, "function has no body"))?;

    let mut children = vec![params];
    let mut skip_deeper_than = None;
    for line in &body {
        if let Some(indent) = skip_deeper_than {
            if line.indent > indent {
                continue;
            }
            skip_deeper_than = None;
        }
        if line.indent != base {
            return Err(ParseError::new(line.number, "unexpected indentation"));
        }
        let (node, opens_block) = statement(line)?;
        if opens_block {
            skip_deeper_than = Some(base);
        }
        children.extend(node);
    }
    debug!("parsed function {} with {} statements", name, children.len() - 1);
    Ok(Node::with_literal(NodeKind::Function, name, children))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::SyntaxTree;

    fn expr(s: &str) -> Node {
        all_consuming(terminated(expression, multispace0))(s)
            .finish()
            .unwrap()
            .1
    }

    #[test]
    fn joins_bracketed_lines_and_strips_comments() {
        let lines = logical_lines("def f(a,\n      b):  # comment\n    return a # done\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "def f(a,       b):");
        assert_eq!(lines[1].indent, 4);
        assert_eq!(lines[1].number, 3);
        assert_eq!(lines[1].text, "return a");
    }

    #[test]
    fn respects_precedence() {
        let node = expr("a + b * c");
        assert_eq!(node.kind(), NodeKind::Binary(BinaryOp::Add));
        assert_eq!(node.children()[1].kind(), NodeKind::Binary(BinaryOp::Mul));

        let node = expr("not a == b and c");
        assert_eq!(node.kind(), NodeKind::Boolean(BoolOp::And));
        assert_eq!(node.children()[0].kind(), NodeKind::Unary(UnaryOp::Not));
        assert_eq!(node.children()[0].children()[0].kind(), NodeKind::Compare);

        let node = expr("-x ** 2");
        assert_eq!(node.kind(), NodeKind::Unary(UnaryOp::Neg));
    }

    #[test]
    fn comparison_chains() {
        let node = expr("0 <= x < n");
        assert_eq!(node.kind(), NodeKind::Compare);
        assert_eq!(node.literal(), Some("<=,<"));
        assert_eq!(node.children().len(), 3);
        assert_eq!(expr("x not in y").literal(), Some("not in"));
        assert_eq!(expr("x is not None").literal(), Some("is not"));
    }

    #[test]
    fn postfix_forms() {
        let node = expr("np.sum(board[1:, ::2]) > 0");
        let call = &node.children()[0];
        assert_eq!(call.kind(), NodeKind::Call);
        assert_eq!(call.children()[0].kind(), NodeKind::Attribute);
        let index = &call.children()[1].children()[1];
        assert_eq!(index.kind(), NodeKind::Tuple);
        assert_eq!(index.children()[0].kind(), NodeKind::Slice);
        assert_eq!(index.children()[0].children()[1].kind(), NodeKind::Omitted);
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert_eq!(expr("order or x").kind(), NodeKind::Boolean(BoolOp::Or));
        assert_eq!(expr("notable").kind(), NodeKind::Name);
        assert_eq!(expr("f(x, key=y)").children()[2].kind(), NodeKind::Keyword);
    }

    #[test]
    fn comprehensions_and_conditionals() {
        assert_eq!(expr("[x for x in xs if x]").children()[0].kind(), NodeKind::Loop);
        assert_eq!(expr("a if c else b").kind(), NodeKind::Conditional);
        assert_eq!(expr("lambda x, y: x + y").kind(), NodeKind::Lambda);
    }

    #[test]
    fn literals() {
        assert_eq!(expr("1_000").literal(), Some("1000"));
        assert_eq!(expr("2.5e3").kind(), NodeKind::Float);
        assert_eq!(expr("'it\\'s'").literal(), Some("it's"));
        assert_eq!(expr("(1, 2)").kind(), NodeKind::Tuple);
        assert_eq!(expr("(1)").kind(), NodeKind::Int);
        assert_eq!(expr("None").kind(), NodeKind::NoneLit);
    }

    #[test]
    fn parses_a_function() {
        let source = r#"
import numpy as np

def hits(board: np.ndarray, row: int) -> int:
    """Count hits in a row."""
    line = board[row]
    line += 0
    return np.sum(line == 2)
"#;
        let function = parse_function(source).unwrap();
        assert_eq!(function.kind(), NodeKind::Function);
        assert_eq!(function.literal(), Some("hits"));
        let kinds: Vec<_> = function.children().iter().map(SyntaxTree::kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Parameters,
                NodeKind::Assign,
                NodeKind::AugAssign(BinaryOp::Add),
                NodeKind::Return,
            ]
        );
        assert_eq!(function.children()[0].children().len(), 2);
    }

    #[test]
    fn records_compound_statements_and_skips_their_blocks() {
        let source = "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";
        let function = parse_function(source).unwrap();
        let kinds: Vec<_> = function.children().iter().map(SyntaxTree::kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Parameters,
                NodeKind::Assign,
                NodeKind::Loop,
                NodeKind::Return
            ]
        );
    }

    #[test]
    fn one_line_functions() {
        let function = parse_function("def f(x): return x").unwrap();
        assert_eq!(function.children()[1].kind(), NodeKind::Return);
    }

    #[test]
    fn reports_errors_with_line_numbers() {
        assert_eq!(parse_function("x = 1\n").unwrap_err().line, 1);
        let err = parse_function("def f(x):\n    return x +\n").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
