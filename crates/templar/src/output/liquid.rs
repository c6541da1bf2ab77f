//! Liquid writer.
//!
//! Liquid has no grouping parentheses, evaluates `and`/`or` right to left and
//! cannot apply filters inside conditions. Arithmetic is spelled as filters
//! (`plus:`, `times:`), so operator chains only survive when the pipeline is
//! already in evaluation order. Anything else is refused.

use super::{output, tag};
use crate::expr::{Form, Operator, OperatorForm, Syntax, render_expression};
use crate::ir::*;
use crate::traits::{WriteError, Writer};

/// Static instance of the Liquid writer for registry.
pub static LIQUID_WRITER: LiquidWriterImpl = LiquidWriterImpl;

/// Liquid writer implementing the Writer trait.
pub struct LiquidWriterImpl;

impl Writer for LiquidWriterImpl {
    fn language(&self) -> &'static str {
        "liquid"
    }

    fn extension(&self) -> &'static str {
        "liquid"
    }

    fn write(&self, nodes: &[IrNode]) -> Result<String, WriteError> {
        LiquidWriter::emit(nodes)
    }
}

const LANGUAGE: &str = "Liquid";

/// Liquid expression grammar for the shared renderer.
pub struct LiquidSyntax;

impl LiquidSyntax {
    fn args(&self, args: &[&IrExpression]) -> Result<String, WriteError> {
        let rendered = args
            .iter()
            .map(|arg| {
                let rendered = render_expression(self, arg)?;
                match rendered.form {
                    Form::Atom => Ok(rendered.text),
                    _ => Err(WriteError::unsupported(
                        LANGUAGE,
                        format!("compound filter argument '{}'", rendered.text),
                    )),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join(", "))
    }

    fn call(&self, name: &str, args: &[&IrExpression]) -> Result<String, WriteError> {
        if args.is_empty() {
            Ok(name.to_string())
        } else {
            Ok(format!("{name}: {}", self.args(args)?))
        }
    }
}

impl Syntax for LiquidSyntax {
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
                (0, PostfixPart::Null) => out.push_str("nil"),
                (0, PostfixPart::Blank) => out.push_str("blank"),
                (0, PostfixPart::LoopVar) => out.push_str("forloop"),
                (1, PostfixPart::Ident(name)) if on_loop_var => {
                    out.push('.');
                    out.push_str(match name.as_str() {
                        LOOP_REVINDEX => "rindex",
                        LOOP_REVINDEX0 => "rindex0",
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
            Operator::Equal => OperatorForm::Infix("=="),
            Operator::NotEqual => OperatorForm::Infix("!="),
            Operator::Greater => OperatorForm::Infix(">"),
            Operator::GreaterEqual => OperatorForm::Infix(">="),
            Operator::Less => OperatorForm::Infix("<"),
            Operator::LessEqual => OperatorForm::Infix("<="),
            Operator::Contains => OperatorForm::Infix("contains"),
            Operator::And => OperatorForm::Infix("and"),
            Operator::Or => OperatorForm::Infix("or"),
            Operator::Add
            | Operator::Subtract
            | Operator::Multiply
            | Operator::Divide
            | Operator::Modulo
            | Operator::Concat => OperatorForm::Filter,
            Operator::Not => {
                return Err(WriteError::unsupported(LANGUAGE, "the 'not' operator")
                    .with_hint("Use an unless block instead"));
            }
            Operator::Power => {
                return Err(WriteError::unsupported(LANGUAGE, "the '**' operator"));
            }
            Operator::FloorDivide => {
                return Err(WriteError::unsupported(LANGUAGE, "the '//' operator"));
            }
        })
    }

    fn filter(&self, filter: &IrFilter) -> Result<String, WriteError> {
        match filter {
            IrFilter::Apply { name, args } => {
                let args: Vec<_> = args.iter().collect();
                let name = match name {
                    FilterName::Op(op) => liquid_operator_filter(*op)?,
                    FilterName::Builtin(builtin) => builtin.liquid_name(),
                    FilterName::Custom(name) => name.as_str(),
                };
                self.call(name, &args)
            }
            IrFilter::Truncate {
                length,
                end,
                kill_words,
            } => {
                if *kill_words {
                    return Err(WriteError::unsupported(LANGUAGE, "truncate with killwords"));
                }
                let mut args = vec![length];
                args.extend(end.as_ref());
                self.call("truncate", &args)
            }
            IrFilter::Replace { old, new, flags } => {
                if flags.is_some() {
                    return Err(WriteError::unsupported(LANGUAGE, "replace with a count or flags"));
                }
                self.call("replace", &[old, new])
            }
            IrFilter::Where { attribute, value } => {
                let mut args = vec![attribute];
                args.extend(value.as_ref());
                self.call("where", &args)
            }
            IrFilter::Sort { attribute, reverse } => {
                let args: Vec<_> = attribute.iter().collect();
                let sort = self.call("sort", &args)?;
                Ok(if *reverse {
                    format!("{sort} | reverse")
                } else {
                    sort
                })
            }
        }
    }

    fn precedence(&self, op: Operator) -> u8 {
        match op {
            Operator::And | Operator::Or => 1,
            _ => 2,
        }
    }

    fn right_associative(&self) -> bool {
        true
    }

    fn has_grouping(&self) -> bool {
        false
    }

    fn filters_bind_tight(&self) -> bool {
        false
    }
}

fn liquid_operator_filter(op: Operator) -> Result<&'static str, WriteError> {
    Ok(match op {
        Operator::Add => "plus",
        Operator::Subtract => "minus",
        Operator::Multiply => "times",
        Operator::Divide => "divided_by",
        Operator::Modulo => "modulo",
        Operator::Concat => "append",
        other => {
            return Err(WriteError::malformed(format!(
                "operator '{}' has no filter spelling",
                other.id()
            )));
        }
    })
}

/// Emits IR as Liquid source.
pub struct LiquidWriter {
    output: String,
}

impl LiquidWriter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    /// Emit a node list as Liquid source.
    pub fn emit(nodes: &[IrNode]) -> Result<String, WriteError> {
        let mut writer = Self::new();
        writer.write_nodes(nodes)?;
        tracing::debug!(language = "liquid", bytes = writer.output.len(), "wrote template");
        Ok(writer.output)
    }

    fn expr(&self, expr: &IrExpression) -> Result<String, WriteError> {
        Ok(render_expression(&LiquidSyntax, expr)?.text)
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
            } => self.write_conditional(*variant, branches, *trim, *end_trim)?,

            IrNode::Loop {
                variable,
                collection,
                children,
                else_children,
                trim,
                else_trim,
                end_trim,
            } => {
                if variable.contains(',') {
                    return Err(WriteError::unsupported(
                        LANGUAGE,
                        format!("loops over multiple variables ('{variable}')"),
                    ));
                }
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
                        .push_str(&tag(&format!("assign {target} = {value}"), *trim));
                }
                (None, Some(children)) => {
                    self.output.push_str(&tag(&format!("capture {target}"), *trim));
                    self.write_nodes(children)?;
                    self.output.push_str(&tag("endcapture", *end_trim));
                }
                (None, None) => {
                    return Err(WriteError::malformed(format!(
                        "assignment to '{target}' has neither value nor body"
                    )));
                }
            },

            IrNode::Comment {
                content,
                trim,
                end_trim,
            } => {
                self.output.push_str(&tag("comment", *trim));
                self.output.push_str(content);
                self.output.push_str(&tag("endcomment", *end_trim));
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
                if *ignore_missing {
                    return Err(WriteError::unsupported(LANGUAGE, "'include … ignore missing'"));
                }
                let template = self.expr(template)?;
                self.output
                    .push_str(&tag(&format!("include {template}"), *trim));
            }

            IrNode::Tag {
                name, args, trim, ..
            } => {
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

    fn write_conditional(
        &mut self,
        variant: ConditionalVariant,
        branches: &[Branch],
        trim: Trim,
        end_trim: Trim,
    ) -> Result<(), WriteError> {
        let (keyword, subsequent, end) = match variant {
            ConditionalVariant::If => ("if", "elsif", "endif"),
            ConditionalVariant::Unless => ("unless", "elsif", "endunless"),
            ConditionalVariant::Case => ("case", "when", "endcase"),
        };

        for (i, branch) in branches.iter().enumerate() {
            match (&branch.condition, i) {
                (Some(condition), 0) => {
                    let condition = self.expr(condition)?;
                    self.output
                        .push_str(&tag(&format!("{keyword} {condition}"), trim));
                }
                (Some(condition), _) => {
                    let condition = self.expr(condition)?;
                    self.output
                        .push_str(&tag(&format!("{subsequent} {condition}"), branch.trim));
                }
                (None, 0) => {
                    return Err(WriteError::malformed(format!(
                        "{keyword} block without a leading condition"
                    )));
                }
                (None, _) => self.output.push_str(&tag("else", branch.trim)),
            }
            self.write_nodes(&branch.children)?;
        }

        self.output.push_str(&tag(end, end_trim));
        Ok(())
    }
}

impl Default for LiquidWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(expr: &IrExpression) -> Result<String, WriteError> {
        render_expression(&LiquidSyntax, expr).map(|r| r.text)
    }

    #[test]
    fn arithmetic_renders_as_filters() {
        let expr = IrExpression::ident("price")
            .op(Operator::Add, IrExpression::ident("tax"))
            .op(Operator::Multiply, IrExpression::ident("quantity"));
        assert_eq!(render(&expr).unwrap(), "price | plus: tax | times: quantity");
    }

    #[test]
    fn nested_arithmetic_operand_is_refused() {
        let expr = IrExpression::ident("a").op(
            Operator::Multiply,
            IrExpression::ident("b").op(Operator::Add, IrExpression::ident("c")),
        );
        let err = render(&expr).unwrap_err();
        assert!(err.to_string().starts_with("Liquid does not support"), "{err}");
    }

    #[test]
    fn logic_groups_right_to_left_without_parens() {
        let nested = IrExpression::ident("a").op(
            Operator::And,
            IrExpression::ident("b").op(Operator::Or, IrExpression::ident("c")),
        );
        assert_eq!(render(&nested).unwrap(), "a and b or c");

        let left_first = IrExpression::ident("a")
            .op(Operator::And, IrExpression::ident("b"))
            .op(Operator::Or, IrExpression::ident("c"));
        assert!(render(&left_first).is_err());
    }

    #[test]
    fn comparison_inside_logic_needs_no_grouping() {
        let expr = IrExpression::ident("a")
            .op(Operator::GreaterEqual, IrExpression::ident("b"))
            .op(Operator::And, IrExpression::ident("c"));
        assert_eq!(render(&expr).unwrap(), "a >= b and c");
    }

    #[test]
    fn filter_inside_condition_is_refused() {
        let expr = IrExpression::ident("a")
            .builtin(crate::expr::Builtin::Size, vec![])
            .op(Operator::Greater, IrExpression::literal("0"));
        assert!(render(&expr).is_err());
    }

    #[test]
    fn sort_reverse_appends_reverse() {
        let expr = IrExpression::ident("xs").pipe(IrFilter::Sort {
            attribute: Some(IrExpression::literal("'name'")),
            reverse: true,
        });
        assert_eq!(render(&expr).unwrap(), "xs | sort: 'name' | reverse");
    }

    #[test]
    fn loop_sentinel_renders_as_forloop() {
        let expr = IrExpression::new(vec![
            PostfixPart::LoopVar,
            PostfixPart::Ident(LOOP_REVINDEX.into()),
        ]);
        assert_eq!(render(&expr).unwrap(), "forloop.rindex");
    }

    #[test]
    fn emits_case_block() {
        let nodes = vec![IrNode::Conditional {
            variant: ConditionalVariant::Case,
            branches: vec![
                Branch::new(Some(IrExpression::ident("x")), vec![]),
                Branch::new(Some(IrExpression::literal("1")), vec![IrNode::text("one")]),
                Branch::new(None, vec![IrNode::text("other")]),
            ],
            trim: Trim::NONE,
            end_trim: Trim::NONE,
        }];
        assert_eq!(
            LiquidWriter::emit(&nodes).unwrap(),
            "{% case x %}{% when 1 %}one{% else %}other{% endcase %}"
        );
    }

    #[test]
    fn markers_apply_to_each_tag_separately() {
        let nodes = vec![IrNode::Conditional {
            variant: ConditionalVariant::If,
            branches: vec![
                Branch::new(Some(IrExpression::ident("a")), vec![IrNode::text("1")]),
                Branch::new(Some(IrExpression::ident("b")), vec![IrNode::text("2")])
                    .with_trim(Trim::new(true, false)),
                Branch::new(None, vec![IrNode::text("3")]).with_trim(Trim::new(false, true)),
            ],
            trim: Trim::NONE,
            end_trim: Trim::new(true, true),
        }];
        assert_eq!(
            LiquidWriter::emit(&nodes).unwrap(),
            "{% if a %}1{%- elsif b %}2{% else -%}3{%- endif -%}"
        );
    }

    #[test]
    fn ignore_missing_include_is_refused() {
        let nodes = vec![IrNode::Include {
            template: IrExpression::literal("'a'"),
            ignore_missing: true,
            trim: Trim::NONE,
        }];
        assert!(LiquidWriter::emit(&nodes).is_err());
    }
}
