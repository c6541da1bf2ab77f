//! Language-neutral template IR.
//!
//! Both front-ends lower their concrete syntax into these types and both
//! back-ends render from them. The node set is closed: every native construct
//! must map onto one of the [`IrNode`] variants, or be rejected.
//!
//! # Expressions
//!
//! An [`IrExpression`] is an access chain (`postfix`) followed by a left-to-right
//! pipeline of filters. Binary operators are pseudo-filters carrying the right
//! operand as their single argument, so `a + b * c` and `a | plus: b` share one
//! shape:
//!
//! ```text
//! user.name | upcase      => postfix [user, name]   filters [upper]
//! (price + tax) * qty     => postfix [price]        filters [add(tax), multiply(qty)]
//! ```

mod structure_eq;

pub use structure_eq::StructureEq;

use crate::expr::{Builtin, Operator};
use serde::{Deserialize, Serialize};

/// Sentinel property for Liquid `forloop.rindex` / Nunjucks `loop.revindex`.
pub const LOOP_REVINDEX: &str = "__REVINDEX__";

/// Sentinel property for Liquid `forloop.rindex0` / Nunjucks `loop.revindex0`.
pub const LOOP_REVINDEX0: &str = "__REVINDEX0__";

/// A node in the IR tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IrNode {
    /// Static template text, verbatim.
    Text { content: String },

    /// `{{ expression }}`
    Output {
        expression: IrExpression,
        #[serde(flatten)]
        trim: Trim,
    },

    /// `if`/`unless`/`case` chains.
    Conditional {
        variant: ConditionalVariant,
        branches: Vec<Branch>,
        #[serde(flatten)]
        trim: Trim,
        #[serde(default, skip_serializing_if = "Trim::is_none")]
        end_trim: Trim,
    },

    /// `{% for variable in collection %}`
    Loop {
        variable: String,
        collection: IrExpression,
        children: Vec<IrNode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_children: Option<Vec<IrNode>>,
        #[serde(flatten)]
        trim: Trim,
        #[serde(default, skip_serializing_if = "Trim::is_none")]
        else_trim: Trim,
        #[serde(default, skip_serializing_if = "Trim::is_none")]
        end_trim: Trim,
    },

    /// Inline (`expression` set) or block (`expression` null, `children` set)
    /// assignment.
    Assignment {
        target: String,
        expression: Option<IrExpression>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        children: Option<Vec<IrNode>>,
        #[serde(flatten)]
        trim: Trim,
        /// Markers on the closing tag of the block form.
        #[serde(default, skip_serializing_if = "Trim::is_none")]
        end_trim: Trim,
    },

    /// `trim` holds the markers outside the comment: the left one of the
    /// opening delimiter and, in `end_trim`, the right one of the closing.
    Comment {
        content: String,
        #[serde(flatten)]
        trim: Trim,
        #[serde(default, skip_serializing_if = "Trim::is_none")]
        end_trim: Trim,
    },

    /// Content that must never be interpreted as template syntax.
    Raw {
        content: String,
        #[serde(flatten)]
        trim: Trim,
        #[serde(default, skip_serializing_if = "Trim::is_none")]
        end_trim: Trim,
    },

    Include {
        template: IrExpression,
        #[serde(default)]
        ignore_missing: bool,
        #[serde(flatten)]
        trim: Trim,
    },

    /// Opaque passthrough for tags no front-end understands. `children` is
    /// always empty; nested content travels as sibling nodes.
    Tag {
        name: String,
        args: String,
        children: Vec<IrNode>,
        #[serde(flatten)]
        trim: Trim,
    },
}

/// Whitespace-control markers on a tag or output delimiter pair.
///
/// Block nodes carry one `Trim` per tag: `trim` for the opening tag, then
/// `else_trim`/`end_trim` (and [`Branch::trim`]) for the tags that follow it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trim {
    #[serde(default)]
    pub trim_left: bool,
    #[serde(default)]
    pub trim_right: bool,
}

impl Trim {
    pub const NONE: Trim = Trim {
        trim_left: false,
        trim_right: false,
    };

    pub fn new(trim_left: bool, trim_right: bool) -> Self {
        Self {
            trim_left,
            trim_right,
        }
    }

    pub fn is_none(&self) -> bool {
        !self.trim_left && !self.trim_right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalVariant {
    If,
    Unless,
    Case,
}

/// One arm of a conditional. `condition == None` marks `else`.
///
/// For `case`, the first branch holds the subject expression and no children;
/// every following branch with a condition is a `when`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub condition: Option<IrExpression>,
    pub children: Vec<IrNode>,
    /// Markers on the `elsif`/`when`/`else` tag opening this branch. The
    /// first branch is opened by the node's own tag and leaves this unset.
    #[serde(default, skip_serializing_if = "Trim::is_none")]
    pub trim: Trim,
}

/// An access chain followed by a filter pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrExpression {
    pub postfix: Vec<PostfixPart>,
    pub filters: Vec<IrFilter>,
}

/// One element of an access chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PostfixPart {
    /// Variable or property name.
    Ident(String),
    /// Literal exactly as written in the source (`'it''s'`, `1.50`, `true`).
    Literal(String),
    /// Integer subscript: `items[0]`.
    Index(i64),
    /// `nil` / `null` / `none`.
    Null,
    /// Liquid `blank`; the empty string elsewhere.
    Blank,
    /// The loop variable (`forloop` / `loop`) inside an active loop body.
    LoopVar,
}

/// A step of an expression's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum IrFilter {
    /// Operators and uniformly-shaped filters.
    Apply {
        name: FilterName,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<IrExpression>,
    },

    /// Nunjucks `truncate(length, killwords, end)`; Liquid `truncate: length, end`.
    Truncate {
        length: IrExpression,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<IrExpression>,
        #[serde(default)]
        kill_words: bool,
    },

    Replace {
        old: IrExpression,
        new: IrExpression,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<IrExpression>,
    },

    /// Liquid `where`; Nunjucks `selectattr`. No value means a truthiness test.
    Where {
        attribute: IrExpression,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<IrExpression>,
    },

    Sort {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute: Option<IrExpression>,
        #[serde(default)]
        reverse: bool,
    },
}

/// Identity of an [`IrFilter::Apply`] step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum FilterName {
    Op(Operator),
    Builtin(Builtin),
    /// A filter neither grammar shares; the native spelling passes through.
    Custom(String),
}

// ============================================================================
// Constructors
// ============================================================================

impl IrNode {
    pub fn text(content: impl Into<String>) -> Self {
        IrNode::Text {
            content: content.into(),
        }
    }

    pub fn output(expression: IrExpression) -> Self {
        IrNode::Output {
            expression,
            trim: Trim::NONE,
        }
    }

    pub fn comment(content: impl Into<String>) -> Self {
        IrNode::Comment {
            content: content.into(),
            trim: Trim::NONE,
            end_trim: Trim::NONE,
        }
    }

    pub fn raw(content: impl Into<String>) -> Self {
        IrNode::Raw {
            content: content.into(),
            trim: Trim::NONE,
            end_trim: Trim::NONE,
        }
    }

    pub fn tag(name: impl Into<String>, args: impl Into<String>) -> Self {
        IrNode::Tag {
            name: name.into(),
            args: args.into(),
            children: Vec::new(),
            trim: Trim::NONE,
        }
    }

    pub fn include(template: IrExpression) -> Self {
        IrNode::Include {
            template,
            ignore_missing: false,
            trim: Trim::NONE,
        }
    }

    pub fn assign(target: impl Into<String>, expression: IrExpression) -> Self {
        IrNode::Assignment {
            target: target.into(),
            expression: Some(expression),
            children: None,
            trim: Trim::NONE,
            end_trim: Trim::NONE,
        }
    }

    pub fn capture(target: impl Into<String>, children: Vec<IrNode>) -> Self {
        IrNode::Assignment {
            target: target.into(),
            expression: None,
            children: Some(children),
            trim: Trim::NONE,
            end_trim: Trim::NONE,
        }
    }

    pub fn for_loop(
        variable: impl Into<String>,
        collection: IrExpression,
        children: Vec<IrNode>,
    ) -> Self {
        IrNode::Loop {
            variable: variable.into(),
            collection,
            children,
            else_children: None,
            trim: Trim::NONE,
            else_trim: Trim::NONE,
            end_trim: Trim::NONE,
        }
    }

    pub fn if_chain(branches: Vec<Branch>) -> Self {
        IrNode::Conditional {
            variant: ConditionalVariant::If,
            branches,
            trim: Trim::NONE,
            end_trim: Trim::NONE,
        }
    }

    /// Short name of the node kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            IrNode::Text { .. } => "text",
            IrNode::Output { .. } => "output",
            IrNode::Conditional { .. } => "conditional",
            IrNode::Loop { .. } => "loop",
            IrNode::Assignment { .. } => "assignment",
            IrNode::Comment { .. } => "comment",
            IrNode::Raw { .. } => "raw",
            IrNode::Include { .. } => "include",
            IrNode::Tag { .. } => "tag",
        }
    }

    /// Replace the whitespace markers of nodes that carry them.
    pub fn with_trim(mut self, new_trim: Trim) -> Self {
        match &mut self {
            IrNode::Output { trim, .. }
            | IrNode::Conditional { trim, .. }
            | IrNode::Loop { trim, .. }
            | IrNode::Assignment { trim, .. }
            | IrNode::Comment { trim, .. }
            | IrNode::Raw { trim, .. }
            | IrNode::Include { trim, .. }
            | IrNode::Tag { trim, .. } => *trim = new_trim,
            IrNode::Text { .. } => {}
        }
        self
    }

    /// Replace the markers on a block node's closing tag.
    pub fn with_end_trim(mut self, new_trim: Trim) -> Self {
        match &mut self {
            IrNode::Conditional { end_trim, .. }
            | IrNode::Loop { end_trim, .. }
            | IrNode::Assignment { end_trim, .. }
            | IrNode::Comment { end_trim, .. }
            | IrNode::Raw { end_trim, .. } => *end_trim = new_trim,
            _ => {}
        }
        self
    }
}

impl Branch {
    pub fn new(condition: Option<IrExpression>, children: Vec<IrNode>) -> Self {
        Self {
            condition,
            children,
            trim: Trim::NONE,
        }
    }

    pub fn with_trim(mut self, trim: Trim) -> Self {
        self.trim = trim;
        self
    }
}

impl IrExpression {
    pub fn new(postfix: Vec<PostfixPart>) -> Self {
        Self {
            postfix,
            filters: Vec::new(),
        }
    }

    /// `a.b.c` from `"a.b.c"`.
    pub fn path(path: &str) -> Self {
        Self::new(
            path.split('.')
                .map(|segment| PostfixPart::Ident(segment.to_string()))
                .collect(),
        )
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(vec![PostfixPart::Ident(name.into())])
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::new(vec![PostfixPart::Literal(text.into())])
    }

    pub fn null() -> Self {
        Self::new(vec![PostfixPart::Null])
    }

    /// Append a pipeline step.
    pub fn pipe(mut self, filter: IrFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Append a binary operator step with `rhs` as its operand.
    pub fn op(self, op: Operator, rhs: IrExpression) -> Self {
        let args = if op.is_unary() { Vec::new() } else { vec![rhs] };
        self.pipe(IrFilter::Apply {
            name: FilterName::Op(op),
            args,
        })
    }

    /// Append `not`.
    pub fn negate(self) -> Self {
        self.pipe(IrFilter::Apply {
            name: FilterName::Op(Operator::Not),
            args: Vec::new(),
        })
    }

    /// Append a shared built-in filter.
    pub fn builtin(self, builtin: Builtin, args: Vec<IrExpression>) -> Self {
        self.pipe(IrFilter::Apply {
            name: FilterName::Builtin(builtin),
            args,
        })
    }

    /// True for an expression with no access chain and no filters.
    pub fn is_empty(&self) -> bool {
        self.postfix.is_empty() && self.filters.is_empty()
    }

    /// The single literal this expression consists of, if any.
    pub fn as_literal(&self) -> Option<&str> {
        match (self.postfix.as_slice(), self.filters.is_empty()) {
            ([PostfixPart::Literal(text)], true) => Some(text),
            _ => None,
        }
    }
}

impl IrFilter {
    /// Operator carried by this step, if it is an operator pseudo-filter.
    pub fn operator(&self) -> Option<Operator> {
        match self {
            IrFilter::Apply {
                name: FilterName::Op(op),
                ..
            } => Some(*op),
            _ => None,
        }
    }
}

impl From<Operator> for FilterName {
    fn from(op: Operator) -> Self {
        FilterName::Op(op)
    }
}

impl From<Builtin> for FilterName {
    fn from(builtin: Builtin) -> Self {
        FilterName::Builtin(builtin)
    }
}
