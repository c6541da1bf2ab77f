//! Liquid reader.

use super::syntax::{
    self, ExprToken, Filter, FilterArg, Keyword, Node, Operand, Prop, Tag, TagBody, TagToken, Value,
};
use crate::expr::{Builtin, Operator, PostfixItem, fold_postfix};
use crate::ir::*;
use crate::traits::{ReadError, Reader};

/// Static instance of the Liquid reader for registry.
pub static LIQUID_READER: LiquidReader = LiquidReader;

/// Liquid reader built on the in-crate Liquid syntax tree.
pub struct LiquidReader;

impl Reader for LiquidReader {
    fn language(&self) -> &'static str {
        "liquid"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["liquid"]
    }

    fn read(&self, source: &str) -> Result<Vec<IrNode>, ReadError> {
        read_liquid(source)
    }
}

/// Parse Liquid source into template IR.
pub fn read_liquid(source: &str) -> Result<Vec<IrNode>, ReadError> {
    let nodes = read_in_scope(source, Scope::default())?;
    tracing::debug!(language = "liquid", nodes = nodes.len(), "read template");
    Ok(nodes)
}

fn read_in_scope(source: &str, scope: Scope) -> Result<Vec<IrNode>, ReadError> {
    let tree = syntax::parse(source)?;
    ReadContext::new(source).read_nodes(&tree, scope)
}

const LOOP_MODIFIERS: &[&str] = &["limit", "offset", "reversed", "cols"];

/// Lexical context threaded through the walk.
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    in_loop: bool,
}

impl Scope {
    fn loop_body(self) -> Self {
        Scope { in_loop: true }
    }
}

struct ReadContext<'a> {
    source: &'a str,
}

impl<'a> ReadContext<'a> {
    fn new(source: &'a str) -> Self {
        Self { source }
    }

    fn slice(&self, span: &std::ops::Range<usize>) -> &'a str {
        &self.source[span.clone()]
    }

    fn read_nodes(&self, nodes: &[Node], scope: Scope) -> Result<Vec<IrNode>, ReadError> {
        nodes.iter().map(|node| self.read_node(node, scope)).collect()
    }

    fn read_node(&self, node: &Node, scope: Scope) -> Result<IrNode, ReadError> {
        tracing::trace!(kind = node.kind(), "liquid node");
        match node {
            Node::Html { span } => Ok(IrNode::text(self.slice(span))),
            Node::Output {
                value,
                trim_left,
                trim_right,
                ..
            } => Ok(IrNode::Output {
                expression: self.read_value(value, scope)?,
                trim: Trim::new(*trim_left, *trim_right),
            }),
            Node::Tag(tag) => self.read_tag(tag, scope),
        }
    }

    fn read_tag(&self, tag: &Tag, scope: Scope) -> Result<IrNode, ReadError> {
        let token = &tag.token;
        let trim = tag_trim(token);
        let end_trim = tag.close.as_ref().map(tag_trim).unwrap_or_default();

        match (&tag.body, token.name.as_str()) {
            (
                TagBody::Branches {
                    branches,
                    else_tag,
                    else_templates,
                },
                name,
            ) => {
                let variant = if name == "unless" {
                    ConditionalVariant::Unless
                } else {
                    ConditionalVariant::If
                };
                let mut out = Vec::with_capacity(branches.len() + 1);
                for (i, branch) in branches.iter().enumerate() {
                    let opened_by = if i == 0 { Trim::NONE } else { tag_trim(&branch.tag) };
                    out.push(
                        Branch::new(
                            Some(self.read_expression(&branch.condition.postfix, scope)?),
                            self.read_nodes(&branch.templates, scope)?,
                        )
                        .with_trim(opened_by),
                    );
                }
                if let Some(templates) = else_templates {
                    out.push(self.else_branch(else_tag.as_ref(), templates, scope)?);
                }
                Ok(IrNode::Conditional {
                    variant,
                    branches: out,
                    trim,
                    end_trim,
                })
            }

            (
                TagBody::Case {
                    subject,
                    whens,
                    else_tag,
                    else_templates,
                },
                _,
            ) => {
                let mut out = vec![Branch::new(Some(self.read_value(subject, scope)?), Vec::new())];
                for when in whens {
                    let condition = match when.values.as_slice() {
                        [single] => self.read_operand(single, scope),
                        _ => IrExpression::literal(self.slice(&when.args_span)),
                    };
                    out.push(
                        Branch::new(Some(condition), self.read_nodes(&when.templates, scope)?)
                            .with_trim(tag_trim(&when.tag)),
                    );
                }
                if let Some(templates) = else_templates {
                    out.push(self.else_branch(else_tag.as_ref(), templates, scope)?);
                }
                Ok(IrNode::Conditional {
                    variant: ConditionalVariant::Case,
                    branches: out,
                    trim,
                    end_trim,
                })
            }

            (
                TagBody::Templates {
                    templates,
                    else_tag,
                    else_templates,
                },
                "for",
            ) => {
                let (variable, collection) = self.read_loop_header(&token.args, scope)?;
                let children = self.read_nodes(templates, scope.loop_body())?;
                let else_children = match else_templates {
                    Some(templates) => Some(self.read_nodes(templates, scope)?),
                    None => None,
                };
                Ok(IrNode::Loop {
                    variable,
                    collection,
                    children,
                    else_children,
                    trim,
                    else_trim: else_tag.as_ref().map(tag_trim).unwrap_or_default(),
                    end_trim,
                })
            }

            (TagBody::Templates { templates, .. }, _) => {
                let target = token.args.trim();
                if target.is_empty() {
                    return Err(ReadError::syntax(token.span.start, "capture target is empty"));
                }
                Ok(IrNode::Assignment {
                    target: target.to_string(),
                    expression: None,
                    children: Some(self.read_nodes(templates, scope)?),
                    trim,
                    end_trim,
                })
            }

            (TagBody::Verbatim { content }, "comment") => {
                let comment = IrNode::comment(self.slice(content));
                Ok(comment.with_trim(trim).with_end_trim(end_trim))
            }

            (TagBody::Verbatim { content }, _) => Ok(IrNode::Raw {
                content: self.slice(content).to_string(),
                trim,
                end_trim,
            }),

            (TagBody::Inline, "assign") => {
                let (target, expr) = token.args.split_once('=').ok_or_else(|| {
                    ReadError::syntax(token.span.start, "assign requires 'target = value'")
                })?;
                let target = target.trim();
                if target.is_empty() {
                    return Err(ReadError::syntax(token.span.start, "assign target is empty"));
                }
                Ok(IrNode::Assignment {
                    target: target.to_string(),
                    expression: Some(read_fragment_expression(expr, scope)?),
                    children: None,
                    trim,
                    end_trim: Trim::NONE,
                })
            }

            (TagBody::Inline, "include") => match single_operand(&token.args) {
                Some(_) => Ok(IrNode::Include {
                    template: read_fragment_expression(&token.args, scope)?,
                    ignore_missing: false,
                    trim,
                }),
                None => Ok(passthrough(tag, trim)),
            },

            (TagBody::Inline, _) => Ok(passthrough(tag, trim)),
        }
    }

    fn else_branch(
        &self,
        else_tag: Option<&TagToken>,
        templates: &[Node],
        scope: Scope,
    ) -> Result<Branch, ReadError> {
        Ok(Branch::new(None, self.read_nodes(templates, scope)?)
            .with_trim(else_tag.map(tag_trim).unwrap_or_default()))
    }

    /// `item in collection`
    fn read_loop_header(
        &self,
        args: &str,
        scope: Scope,
    ) -> Result<(String, IrExpression), ReadError> {
        let (variable, collection) = args
            .split_once(" in ")
            .ok_or_else(|| ReadError::Unsupported(format!("for-loop header '{args}'")))?;

        let variable = variable.trim();
        if variable.is_empty() {
            return Err(ReadError::Unsupported(format!("for-loop header '{args}'")));
        }

        let modifier = collection
            .split_whitespace()
            .skip(1)
            .map(|word| word.split(':').next().unwrap_or(word))
            .find(|word| LOOP_MODIFIERS.contains(word));
        if let Some(name) = modifier {
            return Err(ReadError::Unsupported(format!(
                "for-loop modifier '{name}'"
            )));
        }

        Ok((
            variable.to_string(),
            read_fragment_expression(collection, scope)?,
        ))
    }

    fn read_value(&self, value: &Value, scope: Scope) -> Result<IrExpression, ReadError> {
        let mut expr = self.read_expression(&value.initial.postfix, scope)?;
        for filter in &value.filters {
            expr = self.read_filter(expr, filter, scope)?;
        }
        Ok(expr)
    }

    /// Fold the collaborator's postfix stream into one pipeline.
    fn read_expression(
        &self,
        tokens: &[ExprToken],
        scope: Scope,
    ) -> Result<IrExpression, ReadError> {
        let items = tokens
            .iter()
            .map(|token| match token {
                ExprToken::Operand(operand) => {
                    Ok(PostfixItem::Operand(self.read_operand(operand, scope)))
                }
                ExprToken::Operator { text, span } => Operator::from_liquid_token(text)
                    .map(PostfixItem::Operator)
                    .ok_or_else(|| {
                        ReadError::syntax(span.start, format!("unknown operator '{text}'"))
                    }),
            })
            .collect::<Result<Vec<_>, ReadError>>()?;
        Ok(fold_postfix(items))
    }

    fn read_operand(&self, operand: &Operand, scope: Scope) -> IrExpression {
        match operand {
            Operand::Quoted { span } | Operand::Number { span } => {
                IrExpression::literal(self.slice(span))
            }
            Operand::Literal { word, span } => match word {
                Keyword::True | Keyword::False => IrExpression::literal(self.slice(span)),
                Keyword::Nil | Keyword::Null => IrExpression::null(),
                Keyword::Blank => IrExpression::new(vec![PostfixPart::Blank]),
                Keyword::Empty => IrExpression::literal("empty"),
            },
            Operand::Property { root, props, .. } => {
                let loop_var = scope.in_loop && root == "forloop";
                let mut parts = Vec::with_capacity(props.len() + 1);
                parts.push(if loop_var {
                    PostfixPart::LoopVar
                } else {
                    PostfixPart::Ident(root.clone())
                });
                for (i, prop) in props.iter().enumerate() {
                    parts.push(match prop {
                        Prop::Name(name) if loop_var && i == 0 => {
                            PostfixPart::Ident(loop_property(name).to_string())
                        }
                        Prop::Name(name) => PostfixPart::Ident(name.clone()),
                        Prop::Index(index) => PostfixPart::Index(*index),
                        Prop::Key { content, .. } if is_identifier(content) => {
                            PostfixPart::Ident(content.clone())
                        }
                        Prop::Key { span, .. } => PostfixPart::Literal(self.slice(span).to_string()),
                    });
                }
                IrExpression::new(parts)
            }
        }
    }

    fn read_filter(
        &self,
        expr: IrExpression,
        filter: &Filter,
        scope: Scope,
    ) -> Result<IrExpression, ReadError> {
        let args = FilterArgs::new(self, filter, scope);
        let name = filter.name.as_str();

        if let Some(op) = Operator::from_liquid_filter(name) {
            let operand = args.required(0, "operand")?;
            args.reject_keywords()?;
            return Ok(expr.op(op, operand));
        }

        let step = match name {
            "truncate" => IrFilter::Truncate {
                length: args.required(0, "length")?,
                end: args.get(1, "ellipsis"),
                kill_words: false,
            },
            "replace" => IrFilter::Replace {
                old: args.required(0, "old")?,
                new: args.required(1, "new")?,
                flags: None,
            },
            "where" => IrFilter::Where {
                attribute: args.required(0, "attribute")?,
                value: args.get(1, "value"),
            },
            "sort" => IrFilter::Sort {
                attribute: args.get(0, "attribute"),
                reverse: false,
            },
            _ => {
                args.reject_keywords()?;
                let name = match Builtin::from_liquid(name) {
                    Some(builtin) => FilterName::Builtin(builtin),
                    None => FilterName::Custom(name.to_string()),
                };
                IrFilter::Apply {
                    name,
                    args: args.positional,
                }
            }
        };
        Ok(expr.pipe(step))
    }
}

/// Filter arguments split into positional and keyword lists.
struct FilterArgs<'f> {
    filter: &'f Filter,
    positional: Vec<IrExpression>,
    keywords: Vec<(&'f str, IrExpression)>,
}

impl<'f> FilterArgs<'f> {
    fn new(ctx: &ReadContext<'_>, filter: &'f Filter, scope: Scope) -> Self {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        for arg in &filter.args {
            match arg {
                FilterArg::Positional(operand) => positional.push(ctx.read_operand(operand, scope)),
                FilterArg::Keyword { key, value } => {
                    keywords.push((key.as_str(), ctx.read_operand(value, scope)))
                }
            }
        }
        Self {
            filter,
            positional,
            keywords,
        }
    }

    /// Keyword `key` if present, else positional `index`.
    fn get(&self, index: usize, key: &str) -> Option<IrExpression> {
        self.keywords
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .or_else(|| self.positional.get(index).cloned())
    }

    fn required(&self, index: usize, key: &str) -> Result<IrExpression, ReadError> {
        self.get(index, key).ok_or_else(|| {
            ReadError::syntax(
                self.filter.span.start,
                format!("filter '{}' is missing its {key} argument", self.filter.name),
            )
        })
    }

    fn reject_keywords(&self) -> Result<(), ReadError> {
        match self.keywords.first() {
            Some((key, _)) => Err(ReadError::Unsupported(format!(
                "keyword argument '{key}' on filter '{}'",
                self.filter.name
            ))),
            None => Ok(()),
        }
    }
}

/// Re-enter the reader on `{{ text }}` and return its single expression.
fn read_fragment_expression(text: &str, scope: Scope) -> Result<IrExpression, ReadError> {
    let fragment = format!("{{{{ {} }}}}", text.trim());
    let mut nodes = read_in_scope(&fragment, scope)?;
    match (nodes.pop(), nodes.is_empty()) {
        (Some(IrNode::Output { expression, .. }), true) => Ok(expression),
        (other, _) => Err(ReadError::UnexpectedNode {
            expected: "output expression".into(),
            got: other.map_or("nothing", |node| node.kind()).into(),
        }),
    }
}

/// The operand of a tag whose arguments are exactly one value.
fn single_operand(args: &str) -> Option<Operand> {
    let value = syntax::parse_value(args, 0..args.len()).ok()?;
    if !value.filters.is_empty() {
        return None;
    }
    match value.initial.postfix.as_slice() {
        [ExprToken::Operand(operand)] => Some(operand.clone()),
        _ => None,
    }
}

fn tag_trim(token: &TagToken) -> Trim {
    Trim::new(token.trim_left, token.trim_right)
}

fn passthrough(tag: &Tag, trim: Trim) -> IrNode {
    IrNode::Tag {
        name: tag.token.name.clone(),
        args: tag.token.args.clone(),
        children: Vec::new(),
        trim,
    }
}

/// Liquid spelling of a `forloop` property to its shared name.
fn loop_property(name: &str) -> &str {
    match name {
        "rindex" => LOOP_REVINDEX,
        "rindex0" => LOOP_REVINDEX0,
        other => other,
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(source: &str) -> IrExpression {
        match read_liquid(source).unwrap().as_slice() {
            [IrNode::Output { expression, .. }] => expression.clone(),
            other => panic!("expected a single output, got {other:?}"),
        }
    }

    #[test]
    fn builtin_filter_maps_to_canonical_name() {
        assert_eq!(
            output("{{ name | upcase }}"),
            IrExpression::ident("name").builtin(Builtin::Uppercase, vec![])
        );
    }

    #[test]
    fn arithmetic_filters_become_operators() {
        assert_eq!(
            output("{{ price | plus: tax | times: quantity }}"),
            IrExpression::ident("price")
                .op(Operator::Add, IrExpression::ident("tax"))
                .op(Operator::Multiply, IrExpression::ident("quantity"))
        );
    }

    #[test]
    fn literals_are_sliced_verbatim() {
        assert_eq!(output("{{ 'it''s' }}"), IrExpression::literal("'it''s'"));
        assert_eq!(output("{{ 1.50 }}"), IrExpression::literal("1.50"));
        assert_eq!(output("{{ nil }}"), IrExpression::null());
    }

    #[test]
    fn forloop_is_rewritten_only_inside_loops() {
        assert_eq!(output("{{ forloop.rindex }}"), IrExpression::path("forloop.rindex"));

        let nodes = read_liquid("{% for item in items %}{{ forloop.rindex }}{% endfor %}").unwrap();
        let IrNode::Loop { children, .. } = &nodes[0] else {
            panic!("expected loop, got {:?}", nodes[0]);
        };
        assert_eq!(
            children[0],
            IrNode::output(IrExpression::new(vec![
                PostfixPart::LoopVar,
                PostfixPart::Ident(LOOP_REVINDEX.into())
            ]))
        );
    }

    #[test]
    fn loop_else_uses_outer_scope() {
        let nodes =
            read_liquid("{% for x in xs %}{% else %}{{ forloop.index }}{% endfor %}").unwrap();
        let IrNode::Loop { else_children, .. } = &nodes[0] else {
            panic!("expected loop");
        };
        assert_eq!(
            else_children.as_deref(),
            Some(&[IrNode::output(IrExpression::path("forloop.index"))][..])
        );
    }

    #[test]
    fn case_subject_and_when_values() {
        let nodes = read_liquid("{% case x %}{% when 1 %}a{% when 2, 3 %}b{% endcase %}").unwrap();
        let IrNode::Conditional {
            variant, branches, ..
        } = &nodes[0]
        else {
            panic!("expected conditional");
        };
        assert_eq!(*variant, ConditionalVariant::Case);
        assert_eq!(branches[0], Branch::new(Some(IrExpression::ident("x")), vec![]));
        assert_eq!(branches[1].condition, Some(IrExpression::literal("1")));
        assert_eq!(branches[2].condition, Some(IrExpression::literal("2, 3")));
    }

    #[test]
    fn assign_and_capture() {
        let nodes =
            read_liquid("{% assign total = price | plus: 1 %}{% capture msg %}hi{% endcapture %}")
                .unwrap();
        assert_eq!(
            nodes[0],
            IrNode::assign(
                "total",
                IrExpression::ident("price").op(Operator::Add, IrExpression::literal("1"))
            )
        );
        assert_eq!(nodes[1], IrNode::capture("msg", vec![IrNode::text("hi")]));
    }

    #[test]
    fn empty_capture_target_is_rejected() {
        let err = read_liquid("{% capture %}hi{% endcapture %}").unwrap_err();
        assert!(err.to_string().contains("capture target is empty"), "{err}");
    }

    #[test]
    fn every_tag_keeps_its_markers() {
        let nodes =
            read_liquid("{%- if a -%}1{%- elsif b %}2{% else -%}3{%- endif -%}").unwrap();
        let IrNode::Conditional {
            branches,
            trim,
            end_trim,
            ..
        } = &nodes[0]
        else {
            panic!("expected conditional");
        };
        assert_eq!(*trim, Trim::new(true, true));
        assert_eq!(branches[0].trim, Trim::NONE);
        assert_eq!(branches[1].trim, Trim::new(true, false));
        assert_eq!(branches[2].trim, Trim::new(false, true));
        assert_eq!(*end_trim, Trim::new(true, true));

        let nodes = read_liquid("{% capture m %}x{%- endcapture %}{% raw %}y{% endraw -%}").unwrap();
        assert_eq!(
            nodes,
            vec![
                IrNode::capture("m", vec![IrNode::text("x")]).with_end_trim(Trim::new(true, false)),
                IrNode::raw("y").with_end_trim(Trim::new(false, true)),
            ]
        );
    }

    #[test]
    fn specialized_filters() {
        assert_eq!(
            output("{{ s | truncate: 20, '..' }}"),
            IrExpression::ident("s").pipe(IrFilter::Truncate {
                length: IrExpression::literal("20"),
                end: Some(IrExpression::literal("'..'")),
                kill_words: false,
            })
        );
        assert_eq!(
            output("{{ ps | where: 'available' }}"),
            IrExpression::ident("ps").pipe(IrFilter::Where {
                attribute: IrExpression::literal("'available'"),
                value: None,
            })
        );
    }

    #[test]
    fn raw_content_is_verbatim() {
        let nodes = read_liquid("{% raw %}{{ x }}{% endraw %}").unwrap();
        assert_eq!(nodes, vec![IrNode::raw("{{ x }}")]);
    }

    #[test]
    fn include_single_argument() {
        let nodes = read_liquid("{% include 'header.html' %}{% include 'x', a: 1 %}").unwrap();
        assert_eq!(nodes[0], IrNode::include(IrExpression::literal("'header.html'")));
        assert_eq!(nodes[1], IrNode::tag("include", "'x', a: 1"));
    }

    #[test]
    fn unknown_tags_pass_through() {
        let nodes = read_liquid("{% break %}").unwrap();
        assert_eq!(nodes, vec![IrNode::tag("break", "")]);
    }

    #[test]
    fn loop_modifiers_are_rejected() {
        let err = read_liquid("{% for x in xs limit:2 %}{% endfor %}").unwrap_err();
        assert!(err.to_string().contains("'limit'"), "{err}");
    }
}
