//! Nunjucks reader.

use super::preprocess::{Preprocessed, extract_comments};
use super::syntax::{self, BinaryKind, Else, ElseBody, LiteralKind, Node};
use crate::expr::{Builtin, Operator};
use crate::ir::*;
use crate::traits::{ReadError, Reader};
use regex::Regex;
use std::sync::LazyLock;

/// Static instance of the Nunjucks reader for registry.
pub static NUNJUCKS_READER: NunjucksReader = NunjucksReader;

/// Nunjucks reader built on the in-crate Nunjucks parser.
pub struct NunjucksReader;

impl Reader for NunjucksReader {
    fn language(&self) -> &'static str {
        "nunjucks"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["njk", "nunjucks"]
    }

    fn read(&self, source: &str) -> Result<Vec<IrNode>, ReadError> {
        read_nunjucks(source)
    }
}

/// Parse Nunjucks source into template IR.
pub fn read_nunjucks(source: &str) -> Result<Vec<IrNode>, ReadError> {
    let pre = extract_comments(source);
    if !pre.comments.is_empty() {
        tracing::debug!(comments = pre.comments.len(), "captured nunjucks comments");
    }

    let tree = syntax::parse(&pre.source)?;
    let ctx = ReadContext { pre: &pre };
    let nodes = ctx.read_nodes(&tree, Scope::default())?;

    tracing::debug!(language = "nunjucks", nodes = nodes.len(), "read template");
    Ok(nodes)
}

/// How far before a data node to look for an opening `raw` tag.
const RAW_WINDOW: usize = 16;

/// `{% raw %}` / `{% verbatim %}`, with or without padding and markers.
static RAW_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{%-?\s*(?:raw|verbatim)\s*-?%\}").expect("raw tag pattern compiles")
});

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
    pre: &'a Preprocessed,
}

impl<'a> ReadContext<'a> {
    fn source(&self) -> &'a str {
        &self.pre.source
    }

    fn read_nodes(&self, nodes: &[Node], scope: Scope) -> Result<Vec<IrNode>, ReadError> {
        nodes.iter().map(|node| self.read_node(node, scope)).collect()
    }

    /// The one place parser nodes are classified into IR node kinds.
    fn read_node(&self, node: &Node, scope: Scope) -> Result<IrNode, ReadError> {
        tracing::trace!(kind = node.type_name(), "nunjucks node");
        match node {
            Node::Output { children, pos } => match children.as_slice() {
                [Node::TemplateData { value, pos }] => {
                    if self.follows_raw_tag(*pos) {
                        tracing::debug!(offset = pos, "treating template data as raw block");
                        let end = *pos + value.len();
                        Ok(IrNode::raw(self.pre.restore(value))
                            .with_trim(self.trim_before(*pos))
                            .with_end_trim(self.trim_after(end)))
                    } else {
                        Ok(IrNode::text(value.clone()))
                    }
                }
                [Node::Symbol { name }] if self.pre.comment(name).is_some() => {
                    Ok(match self.pre.comment(name) {
                        Some(captured) => IrNode::comment(captured.body.clone())
                            .with_trim(Trim::new(captured.trim_left, false))
                            .with_end_trim(Trim::new(false, captured.trim_right)),
                        None => IrNode::comment(""),
                    })
                }
                [expr] => Ok(IrNode::Output {
                    expression: self.read_expression(expr, scope)?,
                    trim: self.recover_trim(*pos),
                }),
                other => Err(ReadError::UnexpectedNode {
                    expected: "output with one child".into(),
                    got: format!("output with {} children", other.len()),
                }),
            },

            Node::If {
                cond,
                body,
                else_,
                pos,
                end_pos,
            } => self.read_if(cond, body, else_.as_ref(), (*pos, *end_pos), scope),

            Node::For {
                names,
                arr,
                body,
                else_,
                pos,
                end_pos,
            } => Ok(IrNode::Loop {
                variable: names.join(", "),
                collection: self.read_expression(arr, scope)?,
                children: self.read_nodes(body, scope.loop_body())?,
                else_children: match else_ {
                    Some(ElseBody { body, .. }) => Some(self.read_nodes(body, scope)?),
                    None => None,
                },
                trim: self.recover_trim(*pos),
                else_trim: match else_ {
                    Some(ElseBody { pos, .. }) => self.recover_trim(*pos),
                    None => Trim::NONE,
                },
                end_trim: self.recover_trim(*end_pos),
            }),

            Node::Set {
                targets,
                value,
                body,
                pos,
                end_pos,
            } => Ok(IrNode::Assignment {
                target: targets.join(", "),
                expression: match value {
                    Some(value) => Some(self.read_expression(value, scope)?),
                    None => None,
                },
                children: match body {
                    Some(nodes) => Some(self.read_nodes(nodes, scope)?),
                    None => None,
                },
                trim: self.recover_trim(*pos),
                end_trim: end_pos.map_or(Trim::NONE, |at| self.recover_trim(at)),
            }),

            Node::Include {
                template,
                ignore_missing,
                pos,
            } => Ok(IrNode::Include {
                template: self.read_expression(template, scope)?,
                ignore_missing: *ignore_missing,
                trim: self.recover_trim(*pos),
            }),

            other => Err(ReadError::UnexpectedNode {
                expected: "template node".into(),
                got: other.type_name().into(),
            }),
        }
    }

    fn read_if(
        &self,
        cond: &Node,
        body: &[Node],
        else_: Option<&Else>,
        (pos, end_pos): (usize, usize),
        scope: Scope,
    ) -> Result<IrNode, ReadError> {
        let mut branches = vec![Branch::new(
            Some(self.read_expression(cond, scope)?),
            self.read_nodes(body, scope)?,
        )];

        let mut next = else_;
        while let Some(tail) = next {
            match tail {
                Else::Elif(nested) => {
                    let Node::If {
                        cond,
                        body,
                        else_,
                        pos,
                        ..
                    } = nested.as_ref()
                    else {
                        return Err(ReadError::UnexpectedNode {
                            expected: "If".into(),
                            got: nested.type_name().into(),
                        });
                    };
                    branches.push(
                        Branch::new(
                            Some(self.read_expression(cond, scope)?),
                            self.read_nodes(body, scope)?,
                        )
                        .with_trim(self.recover_trim(*pos)),
                    );
                    next = else_.as_ref();
                }
                Else::Body(ElseBody { body, pos }) => {
                    branches.push(
                        Branch::new(None, self.read_nodes(body, scope)?)
                            .with_trim(self.recover_trim(*pos)),
                    );
                    next = None;
                }
            }
        }

        let variant = if strip_outer_negation(&mut branches) {
            ConditionalVariant::Unless
        } else {
            ConditionalVariant::If
        };

        Ok(IrNode::Conditional {
            variant,
            branches,
            trim: self.recover_trim(pos),
            end_trim: self.recover_trim(end_pos),
        })
    }

    fn read_expression(&self, node: &Node, scope: Scope) -> Result<IrExpression, ReadError> {
        match node {
            Node::Symbol { name } if scope.in_loop && name == "loop" => {
                Ok(IrExpression::new(vec![PostfixPart::LoopVar]))
            }
            Node::Symbol { name } => Ok(IrExpression::ident(name.clone())),

            Node::Literal {
                kind: LiteralKind::None,
                ..
            } => Ok(IrExpression::null()),
            Node::Literal { span, .. } => Ok(IrExpression::literal(&self.source()[span.clone()])),

            Node::LookupVal { target, val } => {
                let mut base = self.read_expression(target, scope)?;
                if !base.filters.is_empty() {
                    return Err(ReadError::Unsupported(
                        "property access on a filtered or computed value".into(),
                    ));
                }
                let on_loop_var = base.postfix == [PostfixPart::LoopVar];
                base.postfix.push(self.read_subscript(val, on_loop_var)?);
                Ok(base)
            }

            Node::Group { inner } => self.read_expression(inner, scope),

            Node::Filter { name, args, kwargs } => {
                let (target, rest) = args.split_first().ok_or_else(|| {
                    ReadError::UnexpectedNode {
                        expected: "filter target".into(),
                        got: "nothing".into(),
                    }
                })?;
                let base = self.read_expression(target, scope)?;
                let args = CallArgs {
                    filter: name,
                    positional: rest
                        .iter()
                        .map(|arg| self.read_expression(arg, scope))
                        .collect::<Result<_, _>>()?,
                    keywords: kwargs
                        .iter()
                        .map(|(key, arg)| {
                            Ok::<_, ReadError>((key.as_str(), self.read_expression(arg, scope)?))
                        })
                        .collect::<Result<_, _>>()?,
                };
                Ok(base.pipe(read_filter(name, args)?))
            }

            Node::Binary { op, left, right } => {
                let left = self.read_expression(left, scope)?;
                let right = self.read_expression(right, scope)?;
                Ok(match op {
                    // `needle in haystack` is `haystack contains needle`
                    BinaryKind::In => right.op(Operator::Contains, left),
                    other => left.op(binary_operator(*other), right),
                })
            }

            Node::Compare { expr, ops } => match ops.as_slice() {
                [(token, rhs)] => {
                    let op = Operator::from_nunjucks_compare(token).ok_or_else(|| {
                        ReadError::Unsupported(format!("comparison operator '{token}'"))
                    })?;
                    Ok(self
                        .read_expression(expr, scope)?
                        .op(op, self.read_expression(rhs, scope)?))
                }
                _ => Err(ReadError::Unsupported("chained comparison".into())),
            },

            Node::Not { target } => Ok(self.read_expression(target, scope)?.negate()),

            Node::Neg { target } => match target.as_ref() {
                Node::Literal {
                    kind: LiteralKind::Number,
                    span,
                } => Ok(IrExpression::literal(format!(
                    "-{}",
                    &self.source()[span.clone()]
                ))),
                _ => Err(ReadError::Unsupported("negation of a non-literal".into())),
            },

            Node::Is { .. } => Err(ReadError::Unsupported("'is' test".into())),
            Node::FunCall { .. } => Err(ReadError::Unsupported("function call".into())),
            Node::InlineIf { .. } => Err(ReadError::Unsupported("inline if expression".into())),
            Node::Array { .. } => Err(ReadError::Unsupported("array literal".into())),
            Node::Dict { .. } => Err(ReadError::Unsupported("dict literal".into())),

            other => Err(ReadError::UnexpectedNode {
                expected: "expression".into(),
                got: other.type_name().into(),
            }),
        }
    }

    /// `.name`, `["key"]` or `[0]`.
    fn read_subscript(&self, val: &Node, on_loop_var: bool) -> Result<PostfixPart, ReadError> {
        match val {
            Node::Literal {
                kind: LiteralKind::String,
                span,
            } => {
                let text = &self.source()[span.clone()];
                let key = unquote(text);
                if is_identifier(key) {
                    let key = if on_loop_var { loop_property(key) } else { key };
                    Ok(PostfixPart::Ident(key.to_string()))
                } else {
                    Ok(PostfixPart::Literal(text.to_string()))
                }
            }
            Node::Literal {
                kind: LiteralKind::Number,
                span,
            } => {
                let text = &self.source()[span.clone()];
                text.parse::<i64>()
                    .map(PostfixPart::Index)
                    .map_err(|_| ReadError::Unsupported(format!("subscript '{text}'")))
            }
            _ => Err(ReadError::Unsupported("dynamic subscript".into())),
        }
    }

    /// Raw blocks reach us as plain data; look for an opening raw tag just
    /// before it. Text that happens to follow a literal `{% raw %}` string is
    /// misread as raw.
    fn follows_raw_tag(&self, pos: usize) -> bool {
        let source = self.source();
        let mut start = pos.saturating_sub(RAW_WINDOW);
        while !source.is_char_boundary(start) {
            start -= 1;
        }
        let window = &source[start..pos.min(source.len())];
        RAW_TAG.is_match(window)
    }

    /// Markers of the tag that ends right at `end`.
    fn trim_before(&self, end: usize) -> Trim {
        let head = &self.source()[..end.min(self.source().len())];
        let Some(body) = head.strip_suffix("%}") else {
            return Trim::NONE;
        };
        let trim_left = body
            .rfind("{%")
            .is_some_and(|at| body[at + 2..].starts_with('-'));
        Trim::new(trim_left, body.ends_with('-'))
    }

    /// Markers of the tag that starts right at `start`.
    fn trim_after(&self, start: usize) -> Trim {
        let tail = self.source().get(start..).unwrap_or_default();
        let Some(body) = tail.strip_prefix("{%") else {
            return Trim::NONE;
        };
        let trim_right = body
            .find("%}")
            .is_some_and(|at| body[..at].ends_with('-'));
        Trim::new(body.starts_with('-'), trim_right)
    }

    /// Whitespace-control markers of the delimiters enclosing `pos`.
    fn recover_trim(&self, pos: usize) -> Trim {
        let source = self.source();
        let (head, tail) = source.split_at(pos.min(source.len()));

        let open = [head.rfind("{{"), head.rfind("{%")].into_iter().flatten().max();
        let trim_left = open.is_some_and(|at| source[at + 2..].starts_with('-'));

        let close = [tail.find("}}"), tail.find("%}")].into_iter().flatten().min();
        let trim_right = close.is_some_and(|at| tail[..at].ends_with('-'));

        Trim::new(trim_left, trim_right)
    }
}

/// Filter arguments, with keywords preferred over positions.
struct CallArgs<'n> {
    filter: &'n str,
    positional: Vec<IrExpression>,
    keywords: Vec<(&'n str, IrExpression)>,
}

impl CallArgs<'_> {
    fn get(&self, index: usize, key: &str) -> Option<IrExpression> {
        self.keywords
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .or_else(|| self.positional.get(index).cloned())
    }

    fn required(&self, index: usize, key: &str) -> Result<IrExpression, ReadError> {
        self.get(index, key).ok_or_else(|| ReadError::UnexpectedNode {
            expected: format!("'{key}' argument to '{}'", self.filter),
            got: "nothing".into(),
        })
    }

    fn flag(&self, index: usize, key: &str) -> Result<bool, ReadError> {
        match self.get(index, key) {
            None => Ok(false),
            Some(expr) => match expr.as_literal() {
                Some("true" | "True") => Ok(true),
                Some("false" | "False") => Ok(false),
                _ => Err(ReadError::Unsupported(format!(
                    "non-literal '{key}' argument to '{}'",
                    self.filter
                ))),
            },
        }
    }
}

fn read_filter(name: &str, args: CallArgs<'_>) -> Result<IrFilter, ReadError> {
    Ok(match name {
        "truncate" => IrFilter::Truncate {
            length: args.required(0, "length")?,
            kill_words: args.flag(1, "killwords")?,
            end: args.get(2, "end"),
        },
        "replace" => IrFilter::Replace {
            old: args.required(0, "old")?,
            new: args.required(1, "new")?,
            flags: args.get(2, "maxCount"),
        },
        "selectattr" => IrFilter::Where {
            attribute: args.required(0, "attribute")?,
            value: args.get(1, "value"),
        },
        "sort" => IrFilter::Sort {
            reverse: args.flag(0, "reverse")?,
            attribute: args.get(2, "attribute"),
        },
        _ => {
            if let Some((key, _)) = args.keywords.first() {
                return Err(ReadError::Unsupported(format!(
                    "keyword argument '{key}' on filter '{name}'"
                )));
            }
            let name = match Builtin::from_nunjucks(name) {
                Some(builtin) => FilterName::Builtin(builtin),
                None => FilterName::Custom(name.to_string()),
            };
            IrFilter::Apply {
                name,
                args: args.positional,
            }
        }
    })
}

fn binary_operator(kind: BinaryKind) -> Operator {
    match kind {
        BinaryKind::Add => Operator::Add,
        BinaryKind::Sub => Operator::Subtract,
        BinaryKind::Mul => Operator::Multiply,
        BinaryKind::Div => Operator::Divide,
        BinaryKind::FloorDiv => Operator::FloorDivide,
        BinaryKind::Mod => Operator::Modulo,
        BinaryKind::Pow => Operator::Power,
        BinaryKind::Concat => Operator::Concat,
        BinaryKind::In => Operator::Contains,
        BinaryKind::And => Operator::And,
        BinaryKind::Or => Operator::Or,
    }
}

/// `if not X` with nothing but an empty `else` becomes `unless X`.
fn strip_outer_negation(branches: &mut Vec<Branch>) -> bool {
    let single = match branches.as_slice() {
        [_] => true,
        [_, last] => {
            last.condition.is_none() && last.children.is_empty() && last.trim.is_none()
        }
        _ => false,
    };
    if !single {
        return false;
    }

    let Some(condition) = branches[0].condition.as_mut() else {
        return false;
    };
    if condition.filters.last().and_then(IrFilter::operator) != Some(Operator::Not) {
        return false;
    }

    condition.filters.pop();
    branches.truncate(1);
    true
}

fn loop_property(name: &str) -> &str {
    match name {
        "revindex" => LOOP_REVINDEX,
        "revindex0" => LOOP_REVINDEX0,
        other => other,
    }
}

fn unquote(text: &str) -> &str {
    let quoted = text.len() >= 2
        && (text.starts_with('\'') && text.ends_with('\'')
            || text.starts_with('"') && text.ends_with('"'));
    if quoted { &text[1..text.len() - 1] } else { text }
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
        match read_nunjucks(source).unwrap().as_slice() {
            [IrNode::Output { expression, .. }] => expression.clone(),
            other => panic!("expected a single output, got {other:?}"),
        }
    }

    #[test]
    fn grouping_becomes_pipeline_order() {
        assert_eq!(
            output("{{ (price + tax) * quantity }}"),
            IrExpression::ident("price")
                .op(Operator::Add, IrExpression::ident("tax"))
                .op(Operator::Multiply, IrExpression::ident("quantity"))
        );
    }

    #[test]
    fn right_operand_keeps_its_own_pipeline() {
        assert_eq!(
            output("{{ a * (b + c) }}"),
            IrExpression::ident("a").op(
                Operator::Multiply,
                IrExpression::ident("b").op(Operator::Add, IrExpression::ident("c"))
            )
        );
    }

    #[test]
    fn in_swaps_to_contains() {
        assert_eq!(
            output("{{ 'x' in tags }}"),
            IrExpression::ident("tags").op(Operator::Contains, IrExpression::literal("'x'"))
        );
    }

    #[test]
    fn comments_survive_the_lexer() {
        let nodes = read_nunjucks("a{# note #}b").unwrap();
        assert_eq!(
            nodes,
            vec![IrNode::text("a"), IrNode::comment("note"), IrNode::text("b")]
        );
    }

    #[test]
    fn raw_block_is_detected() {
        let nodes = read_nunjucks("{% raw %}{{ x }}{# c #}{% endraw %}").unwrap();
        assert_eq!(nodes, vec![IrNode::raw("{{ x }}{# c #}")]);
    }

    #[test]
    fn trim_markers_are_recovered() {
        let nodes = read_nunjucks("{{- name }}{% if x -%}y{% endif %}").unwrap();
        assert!(matches!(
            nodes[0],
            IrNode::Output {
                trim: Trim {
                    trim_left: true,
                    trim_right: false
                },
                ..
            }
        ));
        assert!(matches!(
            nodes[1],
            IrNode::Conditional {
                trim: Trim {
                    trim_left: false,
                    trim_right: true
                },
                ..
            }
        ));
    }

    #[test]
    fn closing_and_intermediate_markers_are_recovered() {
        let nodes =
            read_nunjucks("{% if a %}1{%- elif b %}2{% else -%}3{%- endif -%}").unwrap();
        let IrNode::Conditional {
            branches,
            trim,
            end_trim,
            ..
        } = &nodes[0]
        else {
            panic!("expected conditional");
        };
        assert_eq!(*trim, Trim::NONE);
        assert_eq!(branches[1].trim, Trim::new(true, false));
        assert_eq!(branches[2].trim, Trim::new(false, true));
        assert_eq!(*end_trim, Trim::new(true, true));

        let nodes = read_nunjucks("{% for i in xs %}{% else -%}-{%- endfor %}").unwrap();
        let IrNode::Loop {
            else_trim,
            end_trim,
            ..
        } = &nodes[0]
        else {
            panic!("expected loop");
        };
        assert_eq!(*else_trim, Trim::new(false, true));
        assert_eq!(*end_trim, Trim::new(true, false));
    }

    #[test]
    fn trimmed_raw_and_comment_markers() {
        let nodes = read_nunjucks("{%- raw %}{{ x }}{% endraw -%}{#- c #}").unwrap();
        assert_eq!(
            nodes,
            vec![
                IrNode::raw("{{ x }}")
                    .with_trim(Trim::new(true, false))
                    .with_end_trim(Trim::new(false, true)),
                IrNode::comment("c").with_trim(Trim::new(true, false)),
            ]
        );
    }

    #[test]
    fn trimmed_empty_else_is_kept() {
        let nodes = read_nunjucks("{% if not a %}x{%- else %}{% endif %}").unwrap();
        assert!(matches!(
            &nodes[0],
            IrNode::Conditional {
                variant: ConditionalVariant::If,
                branches,
                ..
            } if branches.len() == 2
        ));
    }

    #[test]
    fn loop_variable_only_inside_loop() {
        assert_eq!(output("{{ loop.revindex }}"), IrExpression::path("loop.revindex"));

        let nodes = read_nunjucks("{% for i in xs %}{{ loop.revindex }}{% endfor %}").unwrap();
        let IrNode::Loop { children, .. } = &nodes[0] else {
            panic!("expected loop");
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
    fn if_not_becomes_unless() {
        let nodes = read_nunjucks("{% if not user %}guest{% endif %}").unwrap();
        let IrNode::Conditional {
            variant, branches, ..
        } = &nodes[0]
        else {
            panic!("expected conditional");
        };
        assert_eq!(*variant, ConditionalVariant::Unless);
        assert_eq!(branches[0].condition, Some(IrExpression::ident("user")));
    }

    #[test]
    fn if_not_with_else_stays_if() {
        let nodes = read_nunjucks("{% if not a %}x{% else %}y{% endif %}").unwrap();
        assert!(matches!(
            nodes[0],
            IrNode::Conditional {
                variant: ConditionalVariant::If,
                ..
            }
        ));
    }

    #[test]
    fn keyword_arguments_win() {
        assert_eq!(
            output("{{ xs | sort(false, true, 'a', attribute='b') }}"),
            IrExpression::ident("xs").pipe(IrFilter::Sort {
                attribute: Some(IrExpression::literal("'b'")),
                reverse: false,
            })
        );
    }

    #[test]
    fn selectattr_is_where() {
        assert_eq!(
            output("{{ ps | selectattr('available') }}"),
            IrExpression::ident("ps").pipe(IrFilter::Where {
                attribute: IrExpression::literal("'available'"),
                value: None,
            })
        );
    }

    #[test]
    fn include_ignore_missing() {
        let nodes = read_nunjucks("{% include 'a.njk' ignore missing %}").unwrap();
        assert_eq!(
            nodes[0],
            IrNode::Include {
                template: IrExpression::literal("'a.njk'"),
                ignore_missing: true,
                trim: Trim::NONE,
            }
        );
    }

    #[test]
    fn unsupported_constructs_are_named() {
        for (source, construct) in [
            ("{{ a < b < c }}", "chained comparison"),
            ("{{ x is defined }}", "'is' test"),
            ("{{ f(x) }}", "function call"),
            ("{{ a if b }}", "inline if"),
            ("{{ xs[i] }}", "dynamic subscript"),
            ("{{ -x }}", "negation of a non-literal"),
        ] {
            let err = read_nunjucks(source).unwrap_err();
            assert!(err.to_string().contains(construct), "{source}: {err}");
        }
    }

    #[test]
    fn negative_number_literal() {
        assert_eq!(output("{{ -1.5 }}"), IrExpression::literal("-1.5"));
    }
}
