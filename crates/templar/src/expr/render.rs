//! Precedence-aware expression serialization.
//!
//! The inverse of [`fold_postfix`](super::fold_postfix): walk the pipeline in
//! order, rendering operator steps infix (or prefix) and everything else as a
//! filter application. The renderer tracks the top-level [`Form`] of the text
//! built so far and inserts parentheses exactly where the target grammar would
//! otherwise regroup the expression. A grammar without parentheses gets a
//! [`WriteError`] instead.

use super::Operator;
use crate::ir::{IrExpression, IrFilter, PostfixPart};
use crate::traits::WriteError;

/// Top-level shape of a rendered fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// Access chain or literal; never needs grouping.
    Atom,
    /// Infix/prefix operator application with the given precedence.
    Operator(u8),
    /// Ends in a filter application.
    Pipe,
}

/// A rendered expression fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub form: Form,
}

/// How a grammar spells an operator step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorForm {
    /// `acc OP arg`
    Infix(&'static str),
    /// `arg OP acc` (Nunjucks `needle in haystack`)
    InfixSwapped(&'static str),
    /// `OP acc`
    Prefix(&'static str),
    /// Rendered by [`Syntax::filter`] like any other pipeline step.
    Filter,
}

/// Everything the shared renderer needs to know about a target grammar.
pub trait Syntax {
    /// Grammar name used in error messages ("Liquid", "Nunjucks").
    fn language(&self) -> &'static str;

    /// Render an access chain.
    fn postfix(&self, parts: &[PostfixPart]) -> Result<String, WriteError>;

    /// Spelling of an operator, or an error if the grammar lacks it.
    fn operator_form(&self, op: Operator) -> Result<OperatorForm, WriteError>;

    /// Render one non-operator step (or an operator with [`OperatorForm::Filter`]),
    /// without the leading `|`.
    fn filter(&self, filter: &IrFilter) -> Result<String, WriteError>;

    fn precedence(&self, op: Operator) -> u8 {
        op.precedence()
    }

    /// Equal-precedence infix chains group right-to-left.
    fn right_associative(&self) -> bool {
        false
    }

    /// The grammar has grouping parentheses.
    fn has_grouping(&self) -> bool {
        true
    }

    /// `|` binds tighter than every infix operator.
    fn filters_bind_tight(&self) -> bool {
        true
    }

    /// Wrap the complete expression in parentheses.
    fn wrap_whole(&self, _expr: &IrExpression) -> bool {
        false
    }
}

/// Render `expr` for `syntax`.
pub fn render_expression<S: Syntax + ?Sized>(
    syntax: &S,
    expr: &IrExpression,
) -> Result<Rendered, WriteError> {
    let mut text = syntax.postfix(&expr.postfix)?;
    let mut form = Form::Atom;

    for filter in &expr.filters {
        let operator_form = match filter.operator() {
            Some(op) => Some((op, syntax.operator_form(op)?)),
            None => None,
        };

        match operator_form {
            Some((op, OperatorForm::Infix(token))) => {
                let prec = syntax.precedence(op);
                let rhs = render_expression(syntax, operand(filter, op)?)?;
                let left = group_left(syntax, text, form, prec)?;
                let right = group_right(syntax, rhs, prec)?;
                text = format!("{left} {token} {right}");
                form = Form::Operator(prec);
            }
            Some((op, OperatorForm::InfixSwapped(token))) => {
                let prec = syntax.precedence(op);
                let lhs = render_expression(syntax, operand(filter, op)?)?;
                let right = group_right(
                    syntax,
                    Rendered {
                        text: std::mem::take(&mut text),
                        form,
                    },
                    prec,
                )?;
                let left = group_left(syntax, lhs.text, lhs.form, prec)?;
                text = format!("{left} {token} {right}");
                form = Form::Operator(prec);
            }
            Some((op, OperatorForm::Prefix(token))) => {
                let prec = syntax.precedence(op);
                let needed = match form {
                    Form::Atom => false,
                    Form::Operator(p) => p <= prec,
                    Form::Pipe => !syntax.filters_bind_tight(),
                };
                let inner = group(syntax, text, needed)?;
                text = format!("{token} {inner}");
                form = Form::Operator(prec);
            }
            Some((_, OperatorForm::Filter)) | None => {
                let step = syntax.filter(filter)?;
                let needed = matches!(form, Form::Operator(_));
                let left = group(syntax, text, needed)?;
                text = format!("{left} | {step}");
                form = Form::Pipe;
            }
        }
    }

    if syntax.wrap_whole(expr) {
        text = format!("({text})");
        form = Form::Atom;
    }

    Ok(Rendered { text, form })
}

fn operand(filter: &IrFilter, op: Operator) -> Result<&IrExpression, WriteError> {
    match filter {
        IrFilter::Apply { args, .. } if args.len() == 1 => Ok(&args[0]),
        _ => Err(WriteError::malformed(format!(
            "operator '{}' expects exactly one operand",
            op.id()
        ))),
    }
}

fn group_left<S: Syntax + ?Sized>(
    syntax: &S,
    text: String,
    form: Form,
    prec: u8,
) -> Result<String, WriteError> {
    let needed = match form {
        Form::Atom => false,
        Form::Operator(p) => p < prec || (p == prec && syntax.right_associative()),
        Form::Pipe => !syntax.filters_bind_tight(),
    };
    group(syntax, text, needed)
}

fn group_right<S: Syntax + ?Sized>(
    syntax: &S,
    rendered: Rendered,
    prec: u8,
) -> Result<String, WriteError> {
    let needed = match rendered.form {
        Form::Atom => false,
        Form::Operator(p) => p < prec || (p == prec && !syntax.right_associative()),
        Form::Pipe => !syntax.filters_bind_tight(),
    };
    group(syntax, rendered.text, needed)
}

fn group<S: Syntax + ?Sized>(syntax: &S, text: String, needed: bool) -> Result<String, WriteError> {
    if !needed {
        Ok(text)
    } else if syntax.has_grouping() {
        Ok(format!("({text})"))
    } else {
        Err(WriteError::unsupported(
            syntax.language(),
            format!("grouping parentheses around '{text}'"),
        ))
    }
}
