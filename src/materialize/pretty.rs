use std::fmt::{self, Display, Write};

use egg::Symbol;

use crate::{
    canonical::FreeSymbolMap,
    primitive::{self, precedence, Precedence, Primitive, Rendering},
    term::{DeBruijnIndex, Literal, Term},
};

/// A wrapper around a [`Term`] whose [`Display`] impl prints it as source.
#[derive(Debug, Clone, Copy)]
pub struct Python<'a> {
    term: &'a Term,
    params: &'a [String],
    free: Option<&'a FreeSymbolMap>,
}

impl<'a> Python<'a> {
    /// Print `term`, with no variables bound outside it.
    #[must_use]
    pub fn new(term: &'a Term) -> Self {
        Self {
            term,
            params: &[],
            free: None,
        }
    }

    /// Name the variables bound outside the term, outermost first.
    #[must_use]
    pub fn with_params(self, params: &'a [String]) -> Self {
        Self { params, ..self }
    }

    /// Print canonical free symbols as the identifiers they stand for.
    #[must_use]
    pub fn with_free(self, free: &'a FreeSymbolMap) -> Self {
        Self {
            free: Some(free),
            ..self
        }
    }
}

impl Display for Python<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer::new(f, self.free);
        printer.bindings.extend(self.params.iter().cloned());
        printer.print(self.term)
    }
}

/// Internal state of the pretty-printer
#[derive(Debug)]
struct Printer<'a, W: Write> {
    /// Buffer where result is accumulated
    writer: W,
    /// Precedence level of the context
    /// (determines whether the next printed term should be parenthesized)
    ctx_precedence: Precedence,
    /// Bound variables in current scope
    bindings: Vec<String>,
    free: Option<&'a FreeSymbolMap>,
}

fn rendering_precedence(rendering: Rendering) -> Precedence {
    match rendering {
        Rendering::Infix(_, prec) | Rendering::Prefix(_, prec) => prec,
        Rendering::Pair | Rendering::Cons | Rendering::Nil => precedence::ATOM,
        _ => precedence::POSTFIX,
    }
}

/// Wrap `term`, a function missing `missing` arguments, in lambdas taking
/// them.
fn eta_expand(term: &Term, missing: usize) -> Term {
    let args = (0..missing).rev().map(Term::var);
    Term::lambdas(missing, Term::apply(term.shift(missing), args))
}

fn is_unit(args: &[&Term]) -> bool {
    matches!(args, [Term::Const(Literal::None)])
}

impl<'a, W: Write> Printer<'a, W> {
    /// Create a fresh printer for a top-level term
    fn new(writer: W, free: Option<&'a FreeSymbolMap>) -> Self {
        Self {
            writer,
            ctx_precedence: 0,
            bindings: vec![],
            free,
        }
    }

    /// The precedence of the outermost construct `term` is printed as.
    fn precedence(term: &Term) -> Precedence {
        match term {
            Term::Lambda(_) => precedence::LAMBDA,
            Term::Const(Literal::Int(i)) if *i < 0 => precedence::UNARY,
            Term::Const(Literal::Float(x)) if x.into_inner() < 0.0 => precedence::UNARY,
            Term::Prim(name) => match primitive::lookup(name.as_str()) {
                Some(p) if p.arity > 0 => precedence::LAMBDA,
                _ => precedence::ATOM,
            },
            Term::Abstraction(..) => precedence::POSTFIX,
            Term::App(..) => {
                let (head, args) = term.spine();
                let primitive = match head {
                    Term::Prim(name) => primitive::lookup(name.as_str()),
                    _ => None,
                };
                match primitive {
                    Some(p) if args.len() < p.arity => precedence::LAMBDA,
                    Some(p) if args.len() == p.arity => rendering_precedence(p.rendering),
                    _ => precedence::POSTFIX,
                }
            }
            _ => precedence::ATOM,
        }
    }

    /// Print `term` into the buffer at the current precedence level
    fn print(&mut self, term: &Term) -> fmt::Result {
        self.print_at(Self::precedence(term), |p| p.print_naked(term))
    }

    /// Run `f`, which prints something of precedence `prec`, parenthesizing
    /// it if the context binds at least as tightly
    fn print_at<T: Fn(&mut Self) -> fmt::Result>(&mut self, prec: Precedence, f: T) -> fmt::Result {
        let old_prec = self.ctx_precedence;
        self.ctx_precedence = prec;
        if prec <= old_prec {
            self.in_parens(|p| {
                let inner = p.ctx_precedence;
                p.ctx_precedence = 0;
                f(p)?;
                p.ctx_precedence = inner;
                Ok(())
            })?;
        } else {
            f(self)?;
        }
        self.ctx_precedence = old_prec;
        Ok(())
    }

    /// Print `term` into the buffer at precedence level `prec`
    fn print_in_context(&mut self, term: &Term, prec: Precedence) -> fmt::Result {
        let old_prec = self.ctx_precedence;
        self.ctx_precedence = prec;
        self.print(term)?;
        self.ctx_precedence = old_prec;
        Ok(())
    }

    /// Print `term` into the buffer (without parentheses)
    fn print_naked(&mut self, term: &Term) -> fmt::Result {
        match term {
            Term::Var(DeBruijnIndex(i)) => match self.bindings.len().checked_sub(i + 1) {
                Some(pos) => self.writer.write_str(&self.bindings[pos]),
                None => write!(self.writer, "${i}"),
            },
            Term::Hole(k) => write!(self.writer, "a{k}"),
            Term::Free(symbol) => {
                let name = self.identifier(*symbol);
                self.writer.write_str(&name)
            }
            Term::Const(literal) => self.print_literal(literal),
            Term::Prim(name) => match primitive::lookup(name.as_str()) {
                Some(p) if p.arity > 0 => self.print_lambda(&eta_expand(term, p.arity)),
                Some(p) => self.print_primitive(p, &[]),
                None => self.writer.write_str(name.as_str()),
            },
            Term::Lambda(_) => self.print_lambda(term),
            Term::Abstraction(name, args) => {
                let args: Vec<&Term> = args.iter().collect();
                self.print_call(name.as_str(), &args)
            }
            Term::App(..) => self.print_app(term),
        }
    }

    /// The source identifier of a free symbol
    fn identifier(&self, symbol: Symbol) -> String {
        self.free
            .and_then(|map| map.get(symbol.as_str()))
            .map_or_else(|| symbol.to_string(), |origin| origin.identifier.clone())
    }

    fn print_literal(&mut self, literal: &Literal) -> fmt::Result {
        match literal {
            Literal::Int(i) => write!(self.writer, "{i}"),
            Literal::Float(x) => write!(self.writer, "{:?}", x.into_inner()),
            Literal::Bool(true) => self.writer.write_str("True"),
            Literal::Bool(false) => self.writer.write_str("False"),
            Literal::None => self.writer.write_str("None"),
            Literal::Str(s) => {
                self.writer.write_char('"')?;
                for c in s.chars() {
                    match c {
                        '"' => self.writer.write_str("\\\"")?,
                        '\\' => self.writer.write_str("\\\\")?,
                        '\n' => self.writer.write_str("\\n")?,
                        '\t' => self.writer.write_str("\\t")?,
                        c => self.writer.write_char(c)?,
                    }
                }
                self.writer.write_char('"')
            }
        }
    }

    /// Print a run of nested lambdas as one `lambda` with several parameters
    fn print_lambda(&mut self, term: &Term) -> fmt::Result {
        let mut body = term;
        let mut names = Vec::new();
        while let Term::Lambda(inner) = body {
            let name = format!("x{}", self.bindings.len());
            self.bindings.push(name.clone());
            names.push(name);
            body = inner;
        }
        write!(self.writer, "lambda {}: ", names.join(", "))?;
        self.print_in_context(body, 0)?;
        self.bindings.truncate(self.bindings.len() - names.len());
        Ok(())
    }

    fn print_app(&mut self, term: &Term) -> fmt::Result {
        let (head, args) = term.spine();
        match head {
            Term::Prim(name) => match primitive::lookup(name.as_str()) {
                Some(p) if args.len() < p.arity => {
                    self.print_lambda(&eta_expand(term, p.arity - args.len()))
                }
                Some(p) if args.len() == p.arity => self.print_primitive(p, &args),
                Some(p) => {
                    let (own, rest) = args.split_at(p.arity);
                    let prec = rendering_precedence(p.rendering);
                    self.print_in_context_with(precedence::POSTFIX - 1, |printer| {
                        printer.print_at(prec, |printer| printer.print_primitive(p, own))
                    })?;
                    self.print_args(rest)
                }
                None => self.print_call(name.as_str(), &args),
            },
            Term::Abstraction(name, own) => {
                let all: Vec<&Term> = own.iter().chain(args).collect();
                self.print_call(name.as_str(), &all)
            }
            Term::Free(symbol) => {
                let name = self.identifier(*symbol);
                match (name.strip_prefix('.'), args.split_first()) {
                    (Some(attribute), Some((receiver, []))) => {
                        self.print_in_context(receiver, precedence::POSTFIX - 1)?;
                        write!(self.writer, ".{attribute}")
                    }
                    (Some(method), Some((receiver, rest))) => {
                        self.print_in_context(receiver, precedence::POSTFIX - 1)?;
                        write!(self.writer, ".{method}")?;
                        self.print_unit_args(rest)
                    }
                    _ => {
                        self.writer.write_str(&name)?;
                        self.print_unit_args(&args)
                    }
                }
            }
            head => {
                self.print_in_context(head, precedence::POSTFIX - 1)?;
                self.print_unit_args(&args)
            }
        }
    }

    /// Run `f` at precedence level `prec`
    fn print_in_context_with<T: Fn(&mut Self) -> fmt::Result>(
        &mut self,
        prec: Precedence,
        f: T,
    ) -> fmt::Result {
        let old_prec = self.ctx_precedence;
        self.ctx_precedence = prec;
        f(self)?;
        self.ctx_precedence = old_prec;
        Ok(())
    }

    fn print_call(&mut self, name: &str, args: &[&Term]) -> fmt::Result {
        self.writer.write_str(name)?;
        self.print_args(args)
    }

    /// Print a parenthesized argument list
    fn print_args(&mut self, args: &[&Term]) -> fmt::Result {
        self.in_parens(|p| p.comma_separated(args))
    }

    /// Print an argument list where a lone `None` is the unit argument of a
    /// call without arguments
    fn print_unit_args(&mut self, args: &[&Term]) -> fmt::Result {
        if is_unit(args) {
            self.writer.write_str("()")
        } else {
            self.print_args(args)
        }
    }

    fn comma_separated(&mut self, terms: &[&Term]) -> fmt::Result {
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                self.writer.write_str(", ")?;
            }
            self.print_in_context(term, 0)?;
        }
        Ok(())
    }

    fn print_primitive(&mut self, p: &Primitive, args: &[&Term]) -> fmt::Result {
        match (p.rendering, args) {
            (Rendering::Infix(op, prec), [left, right]) => {
                let (lprec, rprec) = if p.name == "pow" {
                    (prec, prec - 1)
                } else {
                    (prec - 1, prec)
                };
                self.print_in_context(left, lprec)?;
                write!(self.writer, " {op} ")?;
                self.print_in_context(right, rprec)
            }
            (Rendering::Prefix(op, prec), [operand]) => {
                self.writer.write_str(op)?;
                self.print_in_context(operand, prec - 1)
            }
            (Rendering::Call(name), args) => self.print_call(name, args),
            (Rendering::Method(name), [receiver, rest @ ..]) => {
                self.print_in_context(receiver, precedence::POSTFIX - 1)?;
                write!(self.writer, ".{name}")?;
                self.print_args(rest)
            }
            (Rendering::Attribute(name), [receiver]) => {
                self.print_in_context(receiver, precedence::POSTFIX - 1)?;
                write!(self.writer, ".{name}")
            }
            (Rendering::Index, [index, value]) => {
                self.print_in_context(value, precedence::POSTFIX - 1)?;
                self.in_brackets(|p| p.print_index(index))
            }
            (Rendering::Pair, [first, second]) => {
                self.in_parens(|p| p.comma_separated(&[*first, *second]))
            }
            (Rendering::First, [pair]) | (Rendering::Second, [pair]) => {
                self.print_in_context(pair, precedence::POSTFIX - 1)?;
                let i = usize::from(p.rendering == Rendering::Second);
                write!(self.writer, "[{i}]")
            }
            (Rendering::Cons, [head, tail]) => self.print_list(head, tail),
            (Rendering::Nil, []) => self.writer.write_str("[]"),
            (_, args) => self.print_call(p.name, args),
        }
    }

    /// Print the inside of a subscript, where slices have their own syntax
    fn print_index(&mut self, index: &Term) -> fmt::Result {
        let (head, bounds) = index.spine();
        match (head, bounds.as_slice()) {
            (Term::Prim(name), [lo, hi, step]) if name.as_str() == "slice" => {
                let bound = |p: &mut Self, t: &Term| match t {
                    Term::Const(Literal::None) => Ok(()),
                    t => p.print_in_context(t, 0),
                };
                bound(self, *lo)?;
                self.writer.write_char(':')?;
                bound(self, *hi)?;
                if !matches!(step, Term::Const(Literal::None)) {
                    self.writer.write_char(':')?;
                    bound(self, *step)?;
                }
                Ok(())
            }
            _ => self.print_in_context(index, 0),
        }
    }

    /// Print a chain of `cons` cells as a list display
    fn print_list(&mut self, head: &Term, tail: &Term) -> fmt::Result {
        let mut elements = vec![head];
        let mut rest = tail;
        loop {
            let (h, args) = rest.spine();
            match (h, args.as_slice()) {
                (Term::Prim(name), [x, xs]) if name.as_str() == "cons" => {
                    elements.push(*x);
                    rest = *xs;
                }
                _ => break,
            }
        }
        let nil = matches!(rest, Term::Prim(name) if name.as_str() == "nil");
        self.in_brackets(|p| {
            p.comma_separated(&elements)?;
            if !nil {
                p.writer.write_str(", *")?;
                p.print_in_context(rest, precedence::UNARY)?;
            }
            Ok(())
        })
    }

    /// print f() in parentheses
    fn in_parens<T: Fn(&mut Self) -> fmt::Result>(&mut self, f: T) -> fmt::Result {
        self.writer.write_char('(')?;
        f(self)?;
        self.writer.write_char(')')
    }

    /// print f() in brackets
    fn in_brackets<T: Fn(&mut Self) -> fmt::Result>(&mut self, f: T) -> fmt::Result {
        self.writer.write_char('[')?;
        f(self)?;
        self.writer.write_char(']')
    }
}
