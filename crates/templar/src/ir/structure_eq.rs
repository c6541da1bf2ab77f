//! Structural equality for IR types.
//!
//! `structure_eq` compares IR trees ignoring "surface hints" - details that
//! record how a construct was spelled in one grammar but do not change what
//! the template means.
//!
//! # Hint Fields (normalized during comparison)
//!
//! - `Trim` on every node - whitespace markers are presentation
//! - `PostfixPart::Literal` string quoting - `'a'` and `"a"` compare equal
//!
//! # Core Fields (must match exactly)
//!
//! - Node kinds, names, targets, variants
//! - Access chains and filter pipelines, in order
//! - Child ordering

use super::{Branch, IrExpression, IrFilter, IrNode, PostfixPart};

/// Trait for structural equality comparison.
///
/// Unlike `PartialEq`, this ignores surface hint fields that may differ
/// between grammars for the same template.
pub trait StructureEq {
    /// Compare two values for structural equality.
    fn structure_eq(&self, other: &Self) -> bool;
}

impl StructureEq for [IrNode] {
    fn structure_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.structure_eq(b))
    }
}

impl StructureEq for Vec<IrNode> {
    fn structure_eq(&self, other: &Self) -> bool {
        self.as_slice().structure_eq(other.as_slice())
    }
}

impl StructureEq for IrNode {
    fn structure_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (IrNode::Text { content: a }, IrNode::Text { content: b }) => a == b,

            (IrNode::Output { expression: a, .. }, IrNode::Output { expression: b, .. }) => {
                a.structure_eq(b)
            }

            (
                IrNode::Conditional {
                    variant: v1,
                    branches: b1,
                    ..
                },
                IrNode::Conditional {
                    variant: v2,
                    branches: b2,
                    ..
                },
            ) => {
                v1 == v2
                    && b1.len() == b2.len()
                    && b1.iter().zip(b2).all(|(a, b)| a.structure_eq(b))
            }

            (
                IrNode::Loop {
                    variable: v1,
                    collection: c1,
                    children: ch1,
                    else_children: e1,
                    ..
                },
                IrNode::Loop {
                    variable: v2,
                    collection: c2,
                    children: ch2,
                    else_children: e2,
                    ..
                },
            ) => {
                v1 == v2
                    && c1.structure_eq(c2)
                    && ch1.structure_eq(ch2)
                    && option_structure_eq(e1.as_ref(), e2.as_ref())
            }

            (
                IrNode::Assignment {
                    target: t1,
                    expression: x1,
                    children: c1,
                    ..
                },
                IrNode::Assignment {
                    target: t2,
                    expression: x2,
                    children: c2,
                    ..
                },
            ) => {
                t1 == t2
                    && option_structure_eq(x1.as_ref(), x2.as_ref())
                    && option_structure_eq(c1.as_ref(), c2.as_ref())
            }

            (IrNode::Comment { content: a, .. }, IrNode::Comment { content: b, .. }) => a == b,

            (IrNode::Raw { content: a, .. }, IrNode::Raw { content: b, .. }) => a == b,

            (
                IrNode::Include {
                    template: t1,
                    ignore_missing: i1,
                    ..
                },
                IrNode::Include {
                    template: t2,
                    ignore_missing: i2,
                    ..
                },
            ) => i1 == i2 && t1.structure_eq(t2),

            (
                IrNode::Tag {
                    name: n1,
                    args: a1,
                    children: c1,
                    ..
                },
                IrNode::Tag {
                    name: n2,
                    args: a2,
                    children: c2,
                    ..
                },
            ) => n1 == n2 && a1.trim() == a2.trim() && c1.structure_eq(c2),

            _ => false,
        }
    }
}

impl StructureEq for Branch {
    fn structure_eq(&self, other: &Self) -> bool {
        option_structure_eq(self.condition.as_ref(), other.condition.as_ref())
            && self.children.structure_eq(&other.children)
    }
}

impl StructureEq for IrExpression {
    fn structure_eq(&self, other: &Self) -> bool {
        self.postfix.len() == other.postfix.len()
            && self
                .postfix
                .iter()
                .zip(&other.postfix)
                .all(|(a, b)| a.structure_eq(b))
            && self.filters.len() == other.filters.len()
            && self
                .filters
                .iter()
                .zip(&other.filters)
                .all(|(a, b)| a.structure_eq(b))
    }
}

impl StructureEq for PostfixPart {
    fn structure_eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Ignore quote style - it's a surface hint
            (PostfixPart::Literal(a), PostfixPart::Literal(b)) => {
                unquote(a).unwrap_or(a) == unquote(b).unwrap_or(b)
            }
            _ => self == other,
        }
    }
}

impl StructureEq for IrFilter {
    fn structure_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                IrFilter::Apply { name: n1, args: a1 },
                IrFilter::Apply { name: n2, args: a2 },
            ) => n1 == n2 && vec_structure_eq(a1, a2),

            (
                IrFilter::Truncate {
                    length: l1,
                    end: e1,
                    kill_words: k1,
                },
                IrFilter::Truncate {
                    length: l2,
                    end: e2,
                    kill_words: k2,
                },
            ) => k1 == k2 && l1.structure_eq(l2) && option_structure_eq(e1.as_ref(), e2.as_ref()),

            (
                IrFilter::Replace {
                    old: o1,
                    new: n1,
                    flags: f1,
                },
                IrFilter::Replace {
                    old: o2,
                    new: n2,
                    flags: f2,
                },
            ) => {
                o1.structure_eq(o2)
                    && n1.structure_eq(n2)
                    && option_structure_eq(f1.as_ref(), f2.as_ref())
            }

            (
                IrFilter::Where {
                    attribute: a1,
                    value: v1,
                },
                IrFilter::Where {
                    attribute: a2,
                    value: v2,
                },
            ) => a1.structure_eq(a2) && option_structure_eq(v1.as_ref(), v2.as_ref()),

            (
                IrFilter::Sort {
                    attribute: a1,
                    reverse: r1,
                },
                IrFilter::Sort {
                    attribute: a2,
                    reverse: r2,
                },
            ) => r1 == r2 && option_structure_eq(a1.as_ref(), a2.as_ref()),

            _ => false,
        }
    }
}

/// Body of a quoted literal, without its delimiters.
fn unquote(text: &str) -> Option<&str> {
    let quote = text.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    text.strip_prefix(quote)?.strip_suffix(quote)
}

// Helper functions

fn option_structure_eq<T: StructureEq + ?Sized>(a: Option<&T>, b: Option<&T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.structure_eq(b),
        _ => false,
    }
}

fn vec_structure_eq<T: StructureEq>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structure_eq(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Trim;

    #[test]
    fn test_trim_ignored() {
        let a = IrNode::output(IrExpression::ident("x"));
        let b = IrNode::output(IrExpression::ident("x")).with_trim(Trim::new(true, true));
        assert!(a.structure_eq(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_quote_style_ignored() {
        let a = IrExpression::literal("'header.html'");
        let b = IrExpression::literal("\"header.html\"");
        assert!(a.structure_eq(&b));
    }

    #[test]
    fn test_different_names_not_equal() {
        let a = IrExpression::ident("x");
        let b = IrExpression::ident("y");
        assert!(!a.structure_eq(&b));
    }

    #[test]
    fn test_number_literals_compared_verbatim() {
        let a = IrExpression::literal("1.50");
        let b = IrExpression::literal("1.5");
        assert!(!a.structure_eq(&b));
    }
}
