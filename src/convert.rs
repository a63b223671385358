//! Conversion of function syntax trees into closed de Bruijn terms.
//!
//! A function becomes one lambda per parameter wrapped around its return
//! expression, with every local assignment substituted into the expressions
//! that use it. Operators and recognized library calls become applications of
//! primitives; every other identifier is kept verbatim as a free symbol.

use std::collections::HashMap;

use egg::Symbol;
use indexmap::IndexMap;
use log::debug;
use ordered_float::NotNan;
use thiserror::Error;

use crate::{
    primitive,
    syntax::{compare_ops, NodeKind, Source, SyntaxTree, UnaryOp},
    term::{Literal, Term},
};

/// An error produced when a function cannot be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// The function uses a construct the term language doesn't model.
    #[error("unsupported construct: {construct}")]
    StructuralUnsupported {
        /// A description of the construct.
        construct: String,
    },

    /// The syntax tree doesn't have the shape its node kinds promise.
    #[error("malformed syntax tree: {0}")]
    Malformed(String),
}

fn unsupported<T, S: Into<String>>(construct: S) -> Result<T, ConvertError> {
    Err(ConvertError::StructuralUnsupported {
        construct: construct.into(),
    })
}

fn malformed<T, S: Into<String>>(message: S) -> Result<T, ConvertError> {
    Err(ConvertError::Malformed(message.into()))
}

/// Where a free symbol was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeOrigin {
    /// The source text of the expression the symbol first appeared in.
    pub expression: String,
}

/// A converted function.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    /// The function's name.
    pub name: String,
    /// The names of its parameters, in order.
    pub params: Vec<String>,
    /// The closed term.
    pub term: Term,
    /// The free symbols of `term`, in order of discovery.
    pub free: IndexMap<Symbol, FreeOrigin>,
}

/// Conversion state for one function. Created fresh for every function.
#[derive(Debug, Default)]
struct Converter {
    /// Names bound by enclosing lambdas, outermost first.
    bound: Vec<String>,
    /// How many entries of `bound` are the function's own parameters.
    params: usize,
    /// Assigned locals. Each term is valid at depth `params`.
    locals: HashMap<String, Term>,
    free: IndexMap<Symbol, FreeOrigin>,
}

/// Convert a function definition into a closed term.
///
/// # Errors
///
/// Returns [`ConvertError::StructuralUnsupported`] if the function contains
/// loops, conditionals, anything but one final return, keyword or star
/// arguments, or destructuring into anything but a pair.
pub fn convert<T: SyntaxTree>(function: &T) -> Result<Converted, ConvertError> {
    if function.kind() != NodeKind::Function {
        return malformed(format!("expected a function, found {:?}", function.kind()));
    }
    let name = function.literal().unwrap_or_default().to_owned();
    let (params, statements) = match function.children().split_first() {
        Some((params, statements)) if params.kind() == NodeKind::Parameters => (params, statements),
        _ => return malformed("function without a parameter list"),
    };

    let mut converter = Converter::default();
    for param in params.children() {
        match param.kind() {
            NodeKind::Name => converter.bound.push(literal(param)?.to_owned()),
            NodeKind::Starred => return unsupported("star parameters"),
            kind => return malformed(format!("parameter of kind {kind:?}")),
        }
    }
    converter.params = converter.bound.len();

    let body = converter.statements(statements)?;
    let term = Term::lambdas(converter.params, body);
    debug!("converted {} into {}", name, term);
    Ok(Converted {
        name,
        params: converter.bound,
        term,
        free: converter.free,
    })
}

fn literal<T: SyntaxTree>(node: &T) -> Result<&str, ConvertError> {
    node.literal()
        .map_or_else(|| malformed(format!("{:?} without literal", node.kind())), Ok)
}

fn child<T: SyntaxTree>(node: &T, i: usize) -> Result<&T, ConvertError> {
    node.children()
        .get(i)
        .map_or_else(|| malformed(format!("{:?} missing child {i}", node.kind())), Ok)
}

/// The construct a statement or expression node stands for, if the term
/// language can't express it.
fn unsupported_construct<T: SyntaxTree>(node: &T) -> Option<String> {
    match node.kind() {
        NodeKind::Loop => Some(match node.literal() {
            Some("comprehension") => "comprehension".to_owned(),
            Some(keyword) => format!("{keyword} loop"),
            None => "loop".to_owned(),
        }),
        NodeKind::Conditional => Some(node.literal().unwrap_or("conditional").to_owned()),
        NodeKind::Unsupported => Some(node.literal().unwrap_or("unknown construct").to_owned()),
        _ => None,
    }
}

impl Converter {
    fn statements<T: SyntaxTree>(&mut self, statements: &[T]) -> Result<Term, ConvertError> {
        let mut result = None;
        for (i, statement) in statements.iter().enumerate() {
            if result.is_some() {
                return unsupported("multiple return paths");
            }
            if let Some(construct) = unsupported_construct(statement) {
                return unsupported(construct);
            }
            match statement.kind() {
                NodeKind::Return => match statement.children() {
                    [value] => result = Some(self.expr(value)?),
                    [] => return unsupported("return without a value"),
                    _ => return malformed("return with several values"),
                },
                NodeKind::Assign => self.assign(child(statement, 0)?, child(statement, 1)?)?,
                NodeKind::AugAssign(op) => {
                    let target = child(statement, 0)?;
                    if target.kind() != NodeKind::Name {
                        return unsupported("augmented assignment to a non-name target");
                    }
                    let name = literal(target)?;
                    let current = self.name(name, target)?;
                    let value = self.expr(child(statement, 1)?)?;
                    self.locals.insert(
                        name.to_owned(),
                        Term::call(primitive::binary(op), [current, value]),
                    );
                }
                NodeKind::Expression => return unsupported("expression statement"),
                kind => return malformed(format!("statement {i} of kind {kind:?}")),
            }
        }
        result.map_or_else(|| unsupported("missing return"), Ok)
    }

    fn assign<T: SyntaxTree>(&mut self, target: &T, value: &T) -> Result<(), ConvertError> {
        match target.kind() {
            NodeKind::Name => {
                let value = self.expr(value)?;
                self.locals.insert(literal(target)?.to_owned(), value);
                Ok(())
            }
            NodeKind::Tuple => match target.children() {
                [first, second]
                    if first.kind() == NodeKind::Name && second.kind() == NodeKind::Name =>
                {
                    let value = self.expr(value)?;
                    let (first, second) = (literal(first)?, literal(second)?);
                    self.locals
                        .insert(first.to_owned(), Term::call("fst", [value.clone()]));
                    self.locals
                        .insert(second.to_owned(), Term::call("snd", [value]));
                    Ok(())
                }
                [_, _] => unsupported("nested destructuring"),
                targets => unsupported(format!("destructuring into {} targets", targets.len())),
            },
            NodeKind::Subscript => unsupported("assignment to a subscript"),
            NodeKind::Attribute => unsupported("assignment to an attribute"),
            kind => unsupported(format!("assignment to {kind:?}")),
        }
    }

    /// The current number of enclosing lambdas.
    fn depth(&self) -> usize {
        self.bound.len()
    }

    /// Resolve a variable reference, if `name` is bound or a local.
    fn resolve(&self, name: &str) -> Option<Term> {
        let depth = self.depth();
        let inner = &self.bound[self.params..];
        if let Some(pos) = inner.iter().rposition(|b| b == name) {
            return Some(Term::var(inner.len() - 1 - pos));
        }
        if let Some(local) = self.locals.get(name) {
            return Some(local.shift(depth - self.params));
        }
        self.bound[..self.params]
            .iter()
            .rposition(|b| b == name)
            .map(|pos| Term::var(depth - 1 - pos))
    }

    fn record_free<T: SyntaxTree>(&mut self, name: &str, origin: &T) -> Term {
        let symbol = Symbol::from(name);
        self.free.entry(symbol).or_insert_with(|| FreeOrigin {
            expression: Source(origin).to_string(),
        });
        Term::Free(symbol)
    }

    fn name<T: SyntaxTree>(&mut self, name: &str, node: &T) -> Result<Term, ConvertError> {
        if let Some(term) = self.resolve(name) {
            return Ok(term);
        }
        if let Some(prim) = primitive::resolve_call(name) {
            return Ok(Term::Prim(prim));
        }
        Ok(self.record_free(name, node))
    }

    /// The dotted path `a.b.c` of an attribute chain rooted at an unbound name.
    fn free_path<T: SyntaxTree>(&self, node: &T) -> Option<String> {
        match node.kind() {
            NodeKind::Name => {
                let name = node.literal()?;
                self.resolve(name).is_none().then(|| name.to_owned())
            }
            NodeKind::Attribute => {
                let base = self.free_path(node.children().first()?)?;
                Some(format!("{base}.{}", node.literal()?))
            }
            _ => None,
        }
    }

    fn attribute<T: SyntaxTree>(&mut self, node: &T) -> Result<Term, ConvertError> {
        let attr = literal(node)?;
        let object = child(node, 0)?;
        if let Some(path) = self.free_path(node) {
            if let Some(prim) = primitive::resolve_call(&path) {
                return Ok(Term::Prim(prim));
            }
        }
        if let Some(prim) = primitive::resolve_attribute(attr) {
            return Ok(Term::app(Term::Prim(prim), self.expr(object)?));
        }
        if let Some(path) = self.free_path(node) {
            return Ok(self.record_free(&path, node));
        }
        let object = self.expr(object)?;
        Ok(Term::app(self.record_free(&format!(".{attr}"), node), object))
    }

    fn call<T: SyntaxTree>(&mut self, node: &T) -> Result<Term, ConvertError> {
        let (function, args_nodes) = node
            .children()
            .split_first()
            .map_or_else(|| malformed("call without a function"), Ok)?;
        for arg in args_nodes {
            match arg.kind() {
                NodeKind::Keyword => return unsupported("keyword arguments"),
                NodeKind::Starred => return unsupported("star arguments"),
                _ => {}
            }
        }
        let mut receiver = None;
        let head = if function.kind() == NodeKind::Attribute {
            let method = literal(function)?;
            let object = child(function, 0)?;
            let path = self.free_path(function);
            if let Some(prim) = path.as_deref().and_then(primitive::resolve_call) {
                Term::Prim(prim)
            } else if let Some(prim) = primitive::resolve_method(method) {
                receiver = Some(self.expr(object)?);
                Term::Prim(prim)
            } else if let Some(path) = path {
                self.record_free(&path, function)
            } else {
                let head = self.record_free(&format!(".{method}"), node);
                receiver = Some(self.expr(object)?);
                head
            }
        } else {
            self.expr(function)?
        };
        // Primitive methods take their receiver as their only argument. Any
        // other call without arguments passes the unit value.
        let primitive_method = receiver.is_some() && matches!(head, Term::Prim(_));
        let mut args: Vec<Term> = receiver.into_iter().collect();
        for arg in args_nodes {
            args.push(self.expr(arg)?);
        }
        if args_nodes.is_empty() && !primitive_method {
            args.push(Term::Const(Literal::None));
        }
        Ok(Term::apply(head, args))
    }

    fn lambda<T: SyntaxTree>(&mut self, node: &T) -> Result<Term, ConvertError> {
        let params = child(node, 0)?;
        let body = child(node, 1)?;
        let mut arity = 0;
        for param in params.children() {
            match param.kind() {
                NodeKind::Name => self.bound.push(literal(param)?.to_owned()),
                _ => {
                    self.bound.truncate(self.bound.len() - arity);
                    return unsupported("star parameters");
                }
            }
            arity += 1;
        }
        if arity == 0 {
            // Nullary lambdas take the unit argument that nullary calls pass.
            self.bound.push(String::new());
            arity = 1;
        }
        let body = self.expr(body);
        self.bound.truncate(self.bound.len() - arity);
        Ok(Term::lambdas(arity, body?))
    }

    fn index<T: SyntaxTree>(&mut self, node: &T) -> Result<Term, ConvertError> {
        match node.kind() {
            NodeKind::Slice => {
                let bounds = node
                    .children()
                    .iter()
                    .map(|bound| self.expr(bound))
                    .collect::<Result<Vec<_>, _>>()?;
                if bounds.len() != 3 {
                    return malformed("slice without three bounds");
                }
                Ok(Term::call("slice", bounds))
            }
            _ => self.expr(node),
        }
    }

    fn expr<T: SyntaxTree>(&mut self, node: &T) -> Result<Term, ConvertError> {
        if let Some(construct) = unsupported_construct(node) {
            return unsupported(construct);
        }
        let children = node.children();
        match node.kind() {
            NodeKind::Name => self.name(literal(node)?, node),
            NodeKind::Int => int_literal(literal(node)?).map(Term::int),
            NodeKind::Float => float_literal(literal(node)?),
            NodeKind::Str => Ok(Term::Const(Literal::Str(literal(node)?.to_owned()))),
            NodeKind::Bool => Ok(Term::Const(Literal::Bool(literal(node)? == "True"))),
            NodeKind::NoneLit | NodeKind::Omitted => Ok(Term::Const(Literal::None)),
            NodeKind::Tuple => {
                let elements = children
                    .iter()
                    .map(|element| self.index(element))
                    .collect::<Result<Vec<_>, _>>()?;
                pairs(elements)
            }
            NodeKind::List => {
                let elements = children
                    .iter()
                    .map(|element| self.expr(element))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(elements
                    .into_iter()
                    .rev()
                    .fold(Term::prim("nil"), |rest, element| {
                        Term::call("cons", [element, rest])
                    }))
            }
            NodeKind::Lambda => self.lambda(node),
            NodeKind::Binary(op) => {
                let left = self.expr(child(node, 0)?)?;
                let right = self.expr(child(node, 1)?)?;
                Ok(Term::call(primitive::binary(op), [left, right]))
            }
            NodeKind::Unary(op) => {
                let operand = child(node, 0)?;
                match (op, operand.kind()) {
                    (UnaryOp::Neg, NodeKind::Int) => {
                        int_literal(&format!("-{}", literal(operand)?)).map(Term::int)
                    }
                    (UnaryOp::Neg, NodeKind::Float) => {
                        float_literal(&format!("-{}", literal(operand)?))
                    }
                    _ => {
                        let operand = self.expr(operand)?;
                        Ok(match primitive::unary(op) {
                            Some(prim) => Term::call(prim, [operand]),
                            None => operand,
                        })
                    }
                }
            }
            NodeKind::Boolean(op) => {
                let mut operands = children.iter().map(|operand| self.expr(operand));
                let first = operands
                    .next()
                    .map_or_else(|| malformed("boolean operator without operands"), Ok)??;
                operands.try_fold(
                    first,
                    |left, right: Result<Term, ConvertError>| -> Result<Term, ConvertError> {
                        Ok(Term::call(primitive::boolean(op), [left, right?]))
                    },
                )
            }
            NodeKind::Compare => {
                let ops = compare_ops(literal(node)?)
                    .map_or_else(|| malformed("unknown comparison operator"), Ok)?;
                if ops.len() + 1 != children.len() {
                    return malformed("comparison operands don't match operators");
                }
                let operands = children
                    .iter()
                    .map(|operand| self.expr(operand))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut comparisons = ops.iter().zip(operands.windows(2)).map(|(&op, pair)| {
                    Term::call(primitive::comparison(op), [pair[0].clone(), pair[1].clone()])
                });
                let first = comparisons
                    .next()
                    .map_or_else(|| malformed("comparison without operators"), Ok)?;
                Ok(comparisons.fold(first, |left, right| Term::call("and", [left, right])))
            }
            NodeKind::Call => self.call(node),
            NodeKind::Attribute => self.attribute(node),
            NodeKind::Subscript => {
                let value = self.expr(child(node, 0)?)?;
                let index = self.index(child(node, 1)?)?;
                Ok(Term::call("get", [index, value]))
            }
            NodeKind::Slice => self.index(node),
            NodeKind::Keyword => unsupported("keyword arguments"),
            NodeKind::Starred => unsupported("star arguments"),
            kind @ (NodeKind::Function
            | NodeKind::Parameters
            | NodeKind::Assign
            | NodeKind::AugAssign(_)
            | NodeKind::Return
            | NodeKind::Expression
            | NodeKind::Loop
            | NodeKind::Conditional
            | NodeKind::Unsupported) => malformed(format!("{kind:?} in expression position")),
        }
    }
}

/// Right-nested pairs of two or more elements.
fn pairs(mut elements: Vec<Term>) -> Result<Term, ConvertError> {
    match elements.len() {
        0 => unsupported("empty tuple"),
        1 => unsupported("singleton tuple"),
        _ => {
            let last = elements.pop().map_or_else(|| malformed("empty tuple"), Ok)?;
            Ok(elements
                .into_iter()
                .rev()
                .fold(last, |rest, element| Term::call("pair", [element, rest])))
        }
    }
}

fn int_literal(text: &str) -> Result<i64, ConvertError> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, text),
    };
    let value = match digits.get(..2) {
        Some("0x" | "0X") => i64::from_str_radix(&digits[2..], 16),
        _ => digits.parse(),
    };
    match value {
        Ok(value) if negative => Ok(-value),
        Ok(value) => Ok(value),
        Err(_) => unsupported(format!("integer literal {text}")),
    }
}

fn float_literal(text: &str) -> Result<Term, ConvertError> {
    let value: f64 = text
        .parse()
        .map_or_else(|_| malformed(format!("float literal {text}")), Ok)?;
    if !value.is_finite() {
        return malformed(format!("float literal {text} is not finite"));
    }
    NotNan::new(value)
        .map(|value| Term::Const(Literal::Float(value)))
        .map_or_else(|_| malformed(format!("float literal {text}")), Ok)
}
