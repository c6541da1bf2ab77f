//! Folding a flattened postfix operator stream into one filter pipeline.

use super::Operator;
use crate::ir::IrExpression;

/// One entry of a postfix (reverse Polish) stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PostfixItem {
    Operand(IrExpression),
    Operator(Operator),
}

/// Fold `[a, b, >=, c, and]` into `a | >=(b) | and(c)`.
///
/// Operands are pushed; an operator pops its right then left operand (a
/// missing left operand is the empty expression) and appends itself to the
/// left operand's pipeline with the right operand as its argument. Unary
/// operators pop a single operand. The last value left on the stack is the
/// result; an empty stream folds to the empty expression.
pub fn fold_postfix(items: impl IntoIterator<Item = PostfixItem>) -> IrExpression {
    let mut stack: Vec<IrExpression> = Vec::new();

    for item in items {
        match item {
            PostfixItem::Operand(expr) => stack.push(expr),
            PostfixItem::Operator(op) if op.is_unary() => {
                let operand = stack.pop().unwrap_or_default();
                stack.push(operand.negate());
            }
            PostfixItem::Operator(op) => {
                let right = stack.pop().unwrap_or_default();
                let left = stack.pop().unwrap_or_default();
                stack.push(left.op(op, right));
            }
        }
    }

    stack.pop().unwrap_or_default()
}
