//! Syntax trees of source functions.
//!
//! The converter only needs to know each node's kind, its children and its
//! literal text, which is what [`SyntaxTree`] provides. [`Node`] is the tree
//! produced by the bundled parser in [`parse`].

use std::fmt::{self, Display, Formatter};

pub mod parse;

pub use parse::{parse_function, ParseError};

/// A binary arithmetic or bitwise operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

/// A short-circuiting boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
}

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Is,
    IsNot,
}

impl BinaryOp {
    /// The operator as written in source.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }
}

impl UnaryOp {
    /// The operator as written in source.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Not => "not ",
            UnaryOp::Invert => "~",
        }
    }
}

impl CompareOp {
    /// The operator as written in source.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }
}

/// The kind of a syntax tree node.
///
/// The comment on each variant describes the node's children and literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A function definition. Literal: its name. Children: a `Parameters`
    /// node followed by the body's statements.
    Function,
    /// Children: one `Name` per parameter, or `Starred` for `*args`.
    Parameters,
    /// `target = value`. Children: target, value.
    Assign,
    /// `target op= value`. Children: target, value.
    AugAssign(BinaryOp),
    /// `return value`. Children: the value, if any.
    Return,
    /// A statement consisting of a lone expression. Children: the expression.
    Expression,
    /// A `for`/`while` statement or a comprehension. Literal: the keyword.
    Loop,
    /// An `if` statement or conditional expression.
    Conditional,
    /// Any other construct. Literal: a description of it.
    Unsupported,
    /// Literal: the identifier.
    Name,
    /// Literal: the digits.
    Int,
    /// Literal: the number.
    Float,
    /// Literal: the string's contents, unescaped.
    Str,
    /// Literal: `True` or `False`.
    Bool,
    /// `None`.
    NoneLit,
    /// Children: the elements.
    Tuple,
    /// Children: the elements.
    List,
    /// `lambda params: body`. Children: a `Parameters` node, the body.
    Lambda,
    /// Children: left and right operands.
    Binary(BinaryOp),
    /// Children: the operand.
    Unary(UnaryOp),
    /// Children: two or more operands.
    Boolean(BoolOp),
    /// A comparison chain. Literal: the operators separated by commas.
    /// Children: the operands, one more than there are operators.
    Compare,
    /// `f(args)`. Children: the function followed by its arguments.
    Call,
    /// `name=value` in a call. Literal: the name. Children: the value.
    Keyword,
    /// `*value` or `**value`. Children: the value.
    Starred,
    /// `value.attr`. Literal: the attribute. Children: the value.
    Attribute,
    /// `value[index]`. Children: value, index.
    Subscript,
    /// `lower:upper:step`. Children: three nodes, `Omitted` where missing.
    Slice,
    /// A missing slice bound.
    Omitted,
}

/// The capability the converter requires of a syntax tree.
pub trait SyntaxTree: Sized {
    /// The kind of this node.
    fn kind(&self) -> NodeKind;

    /// The children of this node.
    fn children(&self) -> &[Self];

    /// The literal text carried by this node, if any.
    fn literal(&self) -> Option<&str>;
}

/// A node of a parsed function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: NodeKind,
    literal: Option<String>,
    children: Vec<Node>,
}

impl Node {
    /// Create a node with no literal.
    #[must_use]
    pub fn new(kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            kind,
            literal: None,
            children,
        }
    }

    /// Create a childless node carrying `literal`.
    #[must_use]
    pub fn leaf<S: Into<String>>(kind: NodeKind, literal: S) -> Self {
        Self {
            kind,
            literal: Some(literal.into()),
            children: Vec::new(),
        }
    }

    /// Create a node carrying both a literal and children.
    #[must_use]
    pub fn with_literal<S: Into<String>>(kind: NodeKind, literal: S, children: Vec<Node>) -> Self {
        Self {
            kind,
            literal: Some(literal.into()),
            children,
        }
    }

    /// Create a `Name` node.
    #[must_use]
    pub fn name<S: Into<String>>(name: S) -> Self {
        Self::leaf(NodeKind::Name, name)
    }
}

impl SyntaxTree for Node {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn children(&self) -> &[Self] {
        &self.children
    }

    fn literal(&self) -> Option<&str> {
        self.literal.as_deref()
    }
}

/// Parse the operators of a `Compare` node's literal.
#[must_use]
pub fn compare_ops(literal: &str) -> Option<Vec<CompareOp>> {
    literal
        .split(',')
        .map(|token| {
            Some(match token.trim() {
                "==" => CompareOp::Eq,
                "!=" => CompareOp::Ne,
                "<" => CompareOp::Lt,
                "<=" => CompareOp::Lte,
                ">" => CompareOp::Gt,
                ">=" => CompareOp::Gte,
                "in" => CompareOp::In,
                "not in" => CompareOp::NotIn,
                "is" => CompareOp::Is,
                "is not" => CompareOp::IsNot,
                _ => return None,
            })
        })
        .collect()
}

/// Writes an expression node back out as source text.
///
/// Used to record where a free symbol came from. Every compound operand is
/// parenthesized, so the output is unambiguous rather than minimal.
#[derive(Debug, Clone, Copy)]
pub struct Source<'a, T>(pub &'a T);

impl<T: SyntaxTree> Display for Source<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let node = self.0;
        let literal = node.literal().unwrap_or_default();
        let children = node.children();
        match node.kind() {
            NodeKind::Name | NodeKind::Int | NodeKind::Float | NodeKind::Bool => f.write_str(literal),
            NodeKind::Str => write!(f, "{literal:?}"),
            NodeKind::NoneLit => f.write_str("None"),
            NodeKind::Omitted => Ok(()),
            NodeKind::Attribute => {
                operand_at(f, children, 0)?;
                write!(f, ".{literal}")
            }
            NodeKind::Subscript => {
                operand_at(f, children, 0)?;
                f.write_str("[")?;
                source_at(f, children, 1)?;
                f.write_str("]")
            }
            NodeKind::Slice => {
                source_at(f, children, 0)?;
                f.write_str(":")?;
                source_at(f, children, 1)?;
                f.write_str(":")?;
                source_at(f, children, 2)
            }
            NodeKind::Call => {
                operand_at(f, children, 0)?;
                f.write_str("(")?;
                comma_separated(f, children.get(1..).unwrap_or_default())?;
                f.write_str(")")
            }
            NodeKind::Keyword => {
                write!(f, "{literal}=")?;
                source_at(f, children, 0)
            }
            NodeKind::Starred => {
                f.write_str("*")?;
                source_at(f, children, 0)
            }
            NodeKind::Tuple => {
                f.write_str("(")?;
                comma_separated(f, children)?;
                f.write_str(")")
            }
            NodeKind::List => {
                f.write_str("[")?;
                comma_separated(f, children)?;
                f.write_str("]")
            }
            NodeKind::Binary(op) => {
                operand_at(f, children, 0)?;
                write!(f, " {} ", op.token())?;
                operand_at(f, children, 1)
            }
            NodeKind::Unary(op) => {
                f.write_str(op.token())?;
                operand_at(f, children, 0)
            }
            NodeKind::Boolean(op) => {
                let token = match op {
                    BoolOp::And => " and ",
                    BoolOp::Or => " or ",
                };
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(token)?;
                    }
                    operand(f, child)?;
                }
                Ok(())
            }
            NodeKind::Compare => {
                let ops = compare_ops(literal).unwrap_or_default();
                for (i, child) in children.iter().enumerate() {
                    if let Some(op) = i.checked_sub(1).and_then(|i| ops.get(i)) {
                        write!(f, " {} ", op.token())?;
                    }
                    operand(f, child)?;
                }
                Ok(())
            }
            NodeKind::Lambda => {
                f.write_str("lambda ")?;
                if let Some(params) = children.first() {
                    comma_separated(f, params.children())?;
                }
                f.write_str(": ")?;
                source_at(f, children, 1)
            }
            NodeKind::Function
            | NodeKind::Parameters
            | NodeKind::Assign
            | NodeKind::AugAssign(_)
            | NodeKind::Return
            | NodeKind::Expression
            | NodeKind::Loop
            | NodeKind::Conditional
            | NodeKind::Unsupported => f.write_str(literal),
        }
    }
}

fn operand<T: SyntaxTree>(f: &mut Formatter<'_>, child: &T) -> fmt::Result {
    if child.children().is_empty() || is_postfix(child.kind()) {
        write!(f, "{}", Source(child))
    } else {
        write!(f, "({})", Source(child))
    }
}

// Missing children of a malformed node are written as nothing.
fn operand_at<T: SyntaxTree>(f: &mut Formatter<'_>, children: &[T], i: usize) -> fmt::Result {
    children.get(i).map_or(Ok(()), |child| operand(f, child))
}

fn source_at<T: SyntaxTree>(f: &mut Formatter<'_>, children: &[T], i: usize) -> fmt::Result {
    children
        .get(i)
        .map_or(Ok(()), |child| write!(f, "{}", Source(child)))
}

fn is_postfix(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Call
            | NodeKind::Attribute
            | NodeKind::Subscript
            | NodeKind::Tuple
            | NodeKind::List
    )
}

fn comma_separated<T: SyntaxTree>(f: &mut Formatter<'_>, nodes: &[T]) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", Source(node))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_text_of_expressions() {
        let attr = Node::with_literal(NodeKind::Attribute, "shape", vec![Node::name("board")]);
        let index = Node::new(NodeKind::Subscript, vec![attr, Node::leaf(NodeKind::Int, "0")]);
        assert_eq!(Source(&index).to_string(), "board.shape[0]");

        let sum = Node::new(
            NodeKind::Binary(BinaryOp::Add),
            vec![
                Node::name("x"),
                Node::new(
                    NodeKind::Binary(BinaryOp::Mul),
                    vec![Node::name("y"), Node::leaf(NodeKind::Int, "2")],
                ),
            ],
        );
        assert_eq!(Source(&sum).to_string(), "x + (y * 2)");
    }

    #[test]
    fn missing_children_print_as_gaps() {
        let index = Node::new(NodeKind::Subscript, vec![Node::name("s")]);
        assert_eq!(Source(&index).to_string(), "s[]");
        let call = Node::new(NodeKind::Call, Vec::new());
        assert_eq!(Source(&call).to_string(), "()");
        let lambda = Node::new(NodeKind::Lambda, Vec::new());
        assert_eq!(Source(&lambda).to_string(), "lambda : ");
    }

    #[test]
    fn compare_literals() {
        assert_eq!(
            compare_ops("<,not in"),
            Some(vec![CompareOp::Lt, CompareOp::NotIn])
        );
        assert_eq!(compare_ops("<>"), None);
    }
}
