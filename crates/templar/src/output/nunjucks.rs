//! Nunjucks writer.

use super::{output, tag};
use crate::expr::{Operator, OperatorForm, Syntax, render_expression};
use crate::ir::*;
use crate::traits::{WriteError, Writer};

/// Static instance of the Nunjucks writer for registry.
pub static NUNJUCKS_WRITER: NunjucksWriterImpl = NunjucksWriterImpl;

/// Nunjucks writer implementing the Writer trait.
pub struct NunjucksWriterImpl;

impl Writer for NunjucksWriterImpl {
    fn language(&self) -> &'static str {
        "nunjucks"
    }

    fn extension(&self) -> &'static str {
        "njk"
    }

    fn write(&self, nodes: &[IrNode]) -> Result<String, WriteError> {
        NunjucksWriter::emit(nodes)
    }
}

const LANGUAGE: &str = "Nunjucks";

/// Nunjucks expression grammar for the shared renderer.
pub struct NunjucksSyntax;

impl NunjucksSyntax {
    fn call(&self, name: &str, args: &[String]) -> String {
        if args.is_empty() {
            name.to_string()
        } else {
            format!("{name}({})", args.join(", "))
        }
    }

    fn arg(&self, expr: &IrExpression) -> Result<String, WriteError> {
        Ok(render_expression(self, expr)?.text)
    }
}

/// Filters spelled with `name=value` arguments.
fn uses_named_args(filter: &IrFilter) -> bool {
    matches!(filter, IrFilter::Sort { attribute, reverse } if attribute.is_some() || *reverse)
}

impl Syntax for NunjucksSyntax {
    fn language(&self) -> &'static str {
        LANGUAGE
    }

    fn postfix(&self, parts: &[PostfixPart]) -> Result<String, WriteError> {
        let mut out = String::new();
        let on_loop_var = parts.first() == Some(&PostfixPart::LoopVar);

        for (i, part) in parts.iter().enumerate() {
            match (i, part) {
                (0, PostfixPart::Ident(name)) => out.push_str(name),
                (0, PostfixPart::Literal(text)) => out.push_str(text),
                (0, PostfixPart::Null) => out.push_str("none"),
                (0, PostfixPart::Blank) => out.push_str("''"),
                (0, PostfixPart::LoopVar) => out.push_str("loop"),
                (1, PostfixPart::Ident(name)) if on_loop_var => {
                    out.push('.');
                    out.push_str(match name.as_str() {
                        LOOP_REVINDEX => "revindex",
                        LOOP_REVINDEX0 => "revindex0",
                        other => other,
                    });
                }
                (_, PostfixPart::Ident(name)) if i > 0 => {
                    out.push('.');
                    out.push_str(name);
                }
                (_, PostfixPart::Index(index)) if i > 0 => out.push_str(&format!("[{index}]")),
                (_, PostfixPart::Literal(text)) => out.push_str(&format!("[{text}]")),
                (_, other) => {
                    return Err(WriteError::malformed(format!(
                        "{other:?} at position {i} of an access chain"
                    )));
                }
            }
        }
        Ok(out)
    }

    fn operator_form(&self, op: Operator) -> Result<OperatorForm, WriteError> {
        Ok(match op {
            Operator::Add => OperatorForm::Infix("+"),
            Operator::Subtract => OperatorForm::Infix("-"),
            Operator::Multiply => OperatorForm::Infix("*"),
            Operator::Divide => OperatorForm::Infix("/"),
            Operator::FloorDivide => OperatorForm::Infix("//"),
            Operator::Modulo => OperatorForm::Infix("%"),
            Operator::Power => OperatorForm::Infix("**"),
            Operator::Concat => OperatorForm::Infix("~"),
            Operator::Equal => OperatorForm::Infix("=="),
            Operator::NotEqual => OperatorForm::Infix("!="),
            Operator::Greater => OperatorForm::Infix(">"),
            Operator::GreaterEqual => OperatorForm::Infix(">="),
            Operator::Less => OperatorForm::Infix("<"),
            Operator::LessEqual => OperatorForm::Infix("<="),
            Operator::Contains => OperatorForm::InfixSwapped("in"),
            Operator::And => OperatorForm::Infix("and"),
            Operator::Or => OperatorForm::Infix("or"),
            Operator::Not => OperatorForm::Prefix("not"),
        })
    }

    fn filter(&self, filter: &IrFilter) -> Result<String, WriteError> {
        match filter {
            IrFilter::Apply { name, args } => {
                let name = match name {
                    FilterName::Builtin(builtin) => builtin.nunjucks_name(),
                    FilterName::Custom(name) => name.as_str(),
                    FilterName::Op(op) => {
                        return Err(WriteError::malformed(format!(
                            "operator '{}' rendered as a filter",
                            op.id()
                        )));
                    }
                };
                let args = args
                    .iter()
                    .map(|arg| self.arg(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.call(name, &args))
            }
            IrFilter::Truncate {
                length,
                end,
                kill_words,
            } => {
                let mut args = vec![self.arg(length)?];
                if end.is_some() || *kill_words {
                    args.push(kill_words.to_string());
                    args.push(match end {
                        Some(end) => self.arg(end)?,
                        None => "'...'".to_string(),
                    });
                }
                Ok(self.call("truncate", &args))
            }
            IrFilter::Replace { old, new, flags } => {
                let mut args = vec![self.arg(old)?, self.arg(new)?];
                if let Some(flags) = flags {
                    args.push(self.arg(flags)?);
                }
                Ok(self.call("replace", &args))
            }
            IrFilter::Where { attribute, value } => {
                let mut args = vec![self.arg(attribute)?];
                match value {
                    Some(value) if value.as_literal() != Some("true") => {
                        args.push(self.arg(value)?)
                    }
                    _ => {}
                }
                Ok(self.call("selectattr", &args))
            }
            IrFilter::Sort { attribute, reverse } => {
                let mut args = Vec::new();
                if let Some(attribute) = attribute {
                    args.push(format!("attribute={}", self.arg(attribute)?));
                }
                if *reverse {
                    args.push("reverse=true".to_string());
                }
                Ok(self.call("sort", &args))
            }
        }
    }

    fn wrap_whole(&self, expr: &IrExpression) -> bool {
        expr.filters.len() > 1 && expr.filters.iter().any(uses_named_args)
    }
}

/// Emits IR as Nunjucks source.
pub struct NunjucksWriter {
    output: String,
}

impl NunjucksWriter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    /// Emit a node list as Nunjucks source.
    pub fn emit(nodes: &[IrNode]) -> Result<String, WriteError> {
        let mut writer = Self::new();
        writer.write_nodes(nodes)?;
        tracing::debug!(language = "nunjucks", bytes = writer.output.len(), "wrote template");
        Ok(writer.output)
    }

    fn expr(&self, expr: &IrExpression) -> Result<String, WriteError> {
        Ok(render_expression(&NunjucksSyntax, expr)?.text)
    }

    fn write_nodes(&mut self, nodes: &[IrNode]) -> Result<(), WriteError> {
        for node in nodes {
            self.write_node(node)?;
        }
        Ok(())
    }

    fn write_node(&mut self, node: &IrNode) -> Result<(), WriteError> {
        match node {
            IrNode::Text { content } => self.output.push_str(content),

            IrNode::Output { expression, trim } => {
                let text = self.expr(expression)?;
                self.output.push_str(&output(&text, *trim));
            }

            IrNode::Conditional {
                variant,
                branches,
                trim,
                end_trim,
            } => match variant {
                ConditionalVariant::If => self.write_if_chain(branches, *trim, *end_trim)?,
                ConditionalVariant::Unless => {
                    let mut branches = branches.clone();
                    if let Some(Branch {
                        condition: Some(condition),
                        ..
                    }) = branches.first_mut()
                    {
                        *condition = std::mem::take(condition).negate();
                    }
                    self.write_if_chain(&branches, *trim, *end_trim)?;
                }
                ConditionalVariant::Case => self.write_case(branches, *trim, *end_trim)?,
            },

            IrNode::Loop {
                variable,
                collection,
                children,
                else_children,
                trim,
                else_trim,
                end_trim,
            } => {
                let collection = self.expr(collection)?;
                self.output
                    .push_str(&tag(&format!("for {variable} in {collection}"), *trim));
                self.write_nodes(children)?;
                if let Some(else_children) = else_children {
                    self.output.push_str(&tag("else", *else_trim));
                    self.write_nodes(else_children)?;
                }
                self.output.push_str(&tag("endfor", *end_trim));
            }

            IrNode::Assignment {
                target,
                expression,
                children,
                trim,
                end_trim,
            } => match (expression, children) {
                (Some(expression), _) => {
                    let value = self.expr(expression)?;
                    self.output
                        .push_str(&tag(&format!("set {target} = {value}"), *trim));
                }
                (None, Some(children)) => {
                    self.output.push_str(&tag(&format!("set {target}"), *trim));
                    self.write_nodes(children)?;
                    self.output.push_str(&tag("endset", *end_trim));
                }
                (None, None) => {
                    return Err(WriteError::malformed(format!(
                        "assignment to '{target}' has neither value nor body"
                    )));
                }
            },

            // Inner markers have no effect on a Nunjucks comment and are dropped.
            IrNode::Comment {
                content,
                trim,
                end_trim,
            } => {
                let left = if trim.trim_left { "-" } else { "" };
                let right = if end_trim.trim_right { "-" } else { "" };
                if content.is_empty() {
                    self.output.push_str(&format!("{{#{left} {right}#}}"));
                } else {
                    self.output
                        .push_str(&format!("{{#{left} {content} {right}#}}"));
                }
            }

            IrNode::Raw {
                content,
                trim,
                end_trim,
            } => {
                self.output.push_str(&tag("raw", *trim));
                self.output.push_str(content);
                self.output.push_str(&tag("endraw", *end_trim));
            }

            IrNode::Include {
                template,
                ignore_missing,
                trim,
            } => {
                let template = self.expr(template)?;
                let suffix = if *ignore_missing { " ignore missing" } else { "" };
                self.output
                    .push_str(&tag(&format!("include {template}{suffix}"), *trim));
            }

            IrNode::Tag {
                name, args, trim, ..
            } => {
                if name == "break" || name == "continue" {
                    return Err(
                        WriteError::unsupported(LANGUAGE, format!("'{name}' statements"))
                            .with_hint("Restructure the loop with conditionals instead"),
                    );
                }
                let body = if args.is_empty() {
                    name.clone()
                } else {
                    format!("{name} {args}")
                };
                self.output.push_str(&tag(&body, *trim));
            }
        }
        Ok(())
    }

    fn write_if_chain(
        &mut self,
        branches: &[Branch],
        trim: Trim,
        end_trim: Trim,
    ) -> Result<(), WriteError> {
        for (i, branch) in branches.iter().enumerate() {
            match (&branch.condition, i) {
                (Some(condition), 0) => {
                    let condition = self.expr(condition)?;
                    self.output.push_str(&tag(&format!("if {condition}"), trim));
                }
                (Some(condition), _) => {
                    let condition = self.expr(condition)?;
                    self.output
                        .push_str(&tag(&format!("elif {condition}"), branch.trim));
                }
                (None, 0) => {
                    return Err(WriteError::malformed(
                        "if block without a leading condition",
                    ));
                }
                (None, _) => self.output.push_str(&tag("else", branch.trim)),
            }
            self.write_nodes(&branch.children)?;
        }
        self.output.push_str(&tag("endif", end_trim));
        Ok(())
    }

    /// `case` has no Nunjucks counterpart; lower to `subject == value` tests.
    fn write_case(
        &mut self,
        branches: &[Branch],
        trim: Trim,
        end_trim: Trim,
    ) -> Result<(), WriteError> {
        let Some((subject, arms)) = branches.split_first() else {
            return Ok(());
        };
        let subject = subject
            .condition
            .as_ref()
            .ok_or_else(|| WriteError::malformed("case block without a subject"))?;

        let mut chain = Vec::with_capacity(arms.len());
        for arm in arms {
            let condition = match &arm.condition {
                Some(value) => {
                    if value.as_literal().is_some_and(is_value_list) {
                        return Err(WriteError::unsupported(
                            LANGUAGE,
                            "multi-value 'when' clauses",
                        )
                        .with_hint("Split the clause into one 'when' per value"));
                    }
                    Some(subject.clone().op(Operator::Equal, value.clone()))
                }
                None => None,
            };
            chain.push(Branch::new(condition, arm.children.clone()).with_trim(arm.trim));
        }

        match chain.first() {
            // `case` and the first `when` collapse into one `if` tag
            Some(Branch {
                condition: Some(_),
                trim: first,
                ..
            }) => {
                let opening = Trim::new(trim.trim_left, first.trim_right);
                self.write_if_chain(&chain, opening, end_trim)
            }
            // only an `else`: its children always render
            Some(Branch { children, .. }) => self.write_nodes(children),
            None => Ok(()),
        }
    }
}

impl Default for NunjucksWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Liquid `when a, b` / `when a or b` value lists, kept as literal text.
fn is_value_list(text: &str) -> bool {
    let mut quote = None;
    let mut prev = ' ';
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == ',' => return true,
            None if prev.is_whitespace() && text[i..].starts_with("or ") => return true,
            None => {}
        }
        prev = c;
    }
    false
}
