//! Shared expression algebra.
//!
//! Canonical operator and filter identifiers, the postfix fold used by the
//! Liquid front-end, and the precedence-aware serializer both back-ends drive.
//! Neither grammar's spelling leaks into these identifiers; each side keeps its
//! own name table (`liquid_name`/`nunjucks_name`).

mod fold;
mod render;

pub use fold::{PostfixItem, fold_postfix};
pub use render::{Form, OperatorForm, Rendered, Syntax, render_expression};

use serde::{Deserialize, Serialize};

/// Canonical operator pseudo-filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Power,
    Concat,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Contains,
    And,
    Or,
    Not,
}

/// Binding strength, loosest first.
pub mod precedence {
    pub const OR: u8 = 10;
    pub const AND: u8 = 20;
    pub const NOT: u8 = 25;
    pub const COMPARE: u8 = 30;
    pub const CONCAT: u8 = 35;
    pub const ADD: u8 = 40;
    pub const MULTIPLY: u8 = 50;
    pub const POWER: u8 = 60;
}

impl Operator {
    pub const ALL: [Operator; 18] = [
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
        Operator::FloorDivide,
        Operator::Modulo,
        Operator::Power,
        Operator::Concat,
        Operator::Equal,
        Operator::NotEqual,
        Operator::Greater,
        Operator::GreaterEqual,
        Operator::Less,
        Operator::LessEqual,
        Operator::Contains,
        Operator::And,
        Operator::Or,
        Operator::Not,
    ];

    /// Precedence tier shared by every grammar that groups with parentheses.
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Or => precedence::OR,
            Operator::And => precedence::AND,
            Operator::Not => precedence::NOT,
            Operator::Equal
            | Operator::NotEqual
            | Operator::Greater
            | Operator::GreaterEqual
            | Operator::Less
            | Operator::LessEqual
            | Operator::Contains => precedence::COMPARE,
            Operator::Concat => precedence::CONCAT,
            Operator::Add | Operator::Subtract => precedence::ADD,
            Operator::Multiply | Operator::Divide | Operator::FloorDivide | Operator::Modulo => {
                precedence::MULTIPLY
            }
            Operator::Power => precedence::POWER,
        }
    }

    pub fn is_unary(self) -> bool {
        matches!(self, Operator::Not)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Not)
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == precedence::COMPARE
    }

    /// Liquid operator token for this operator, if Liquid has one.
    pub fn from_liquid_token(token: &str) -> Option<Operator> {
        Some(match token {
            "==" => Operator::Equal,
            "!=" | "<>" => Operator::NotEqual,
            ">" => Operator::Greater,
            ">=" => Operator::GreaterEqual,
            "<" => Operator::Less,
            "<=" => Operator::LessEqual,
            "contains" => Operator::Contains,
            "and" => Operator::And,
            "or" => Operator::Or,
            _ => return None,
        })
    }

    /// Liquid filters that are really arithmetic/concatenation operators.
    pub fn from_liquid_filter(name: &str) -> Option<Operator> {
        Some(match name {
            "plus" => Operator::Add,
            "minus" => Operator::Subtract,
            "times" => Operator::Multiply,
            "divided_by" => Operator::Divide,
            "modulo" => Operator::Modulo,
            "append" => Operator::Concat,
            _ => return None,
        })
    }

    /// Nunjucks comparison operator token.
    pub fn from_nunjucks_compare(token: &str) -> Option<Operator> {
        Some(match token {
            "==" | "===" => Operator::Equal,
            "!=" | "!==" => Operator::NotEqual,
            ">" => Operator::Greater,
            ">=" => Operator::GreaterEqual,
            "<" => Operator::Less,
            "<=" => Operator::LessEqual,
            _ => return None,
        })
    }

    /// Canonical identifier, as shown in error messages and debug output.
    pub fn id(self) -> &'static str {
        match self {
            Operator::Add => "add",
            Operator::Subtract => "subtract",
            Operator::Multiply => "multiply",
            Operator::Divide => "divide",
            Operator::FloorDivide => "floor_divide",
            Operator::Modulo => "modulo",
            Operator::Power => "power",
            Operator::Concat => "concat",
            Operator::Equal => "equal",
            Operator::NotEqual => "not_equal",
            Operator::Greater => "greater",
            Operator::GreaterEqual => "greater_equal",
            Operator::Less => "less",
            Operator::LessEqual => "less_equal",
            Operator::Contains => "contains",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
        }
    }
}

/// Filters both grammars ship under (possibly different) names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    Uppercase,
    Lowercase,
    Capitalize,
    Trim,
    Escape,
    Default,
    First,
    Last,
    Join,
    Size,
    Reverse,
    Round,
    Abs,
    UrlEncode,
    StripHtml,
    NewlineToBr,
}

impl Builtin {
    pub const ALL: [Builtin; 16] = [
        Builtin::Uppercase,
        Builtin::Lowercase,
        Builtin::Capitalize,
        Builtin::Trim,
        Builtin::Escape,
        Builtin::Default,
        Builtin::First,
        Builtin::Last,
        Builtin::Join,
        Builtin::Size,
        Builtin::Reverse,
        Builtin::Round,
        Builtin::Abs,
        Builtin::UrlEncode,
        Builtin::StripHtml,
        Builtin::NewlineToBr,
    ];

    pub fn liquid_name(self) -> &'static str {
        match self {
            Builtin::Uppercase => "upcase",
            Builtin::Lowercase => "downcase",
            Builtin::Capitalize => "capitalize",
            Builtin::Trim => "strip",
            Builtin::Escape => "escape",
            Builtin::Default => "default",
            Builtin::First => "first",
            Builtin::Last => "last",
            Builtin::Join => "join",
            Builtin::Size => "size",
            Builtin::Reverse => "reverse",
            Builtin::Round => "round",
            Builtin::Abs => "abs",
            Builtin::UrlEncode => "url_encode",
            Builtin::StripHtml => "strip_html",
            Builtin::NewlineToBr => "newline_to_br",
        }
    }

    pub fn nunjucks_name(self) -> &'static str {
        match self {
            Builtin::Uppercase => "upper",
            Builtin::Lowercase => "lower",
            Builtin::Capitalize => "capitalize",
            Builtin::Trim => "trim",
            Builtin::Escape => "escape",
            Builtin::Default => "default",
            Builtin::First => "first",
            Builtin::Last => "last",
            Builtin::Join => "join",
            Builtin::Size => "length",
            Builtin::Reverse => "reverse",
            Builtin::Round => "round",
            Builtin::Abs => "abs",
            Builtin::UrlEncode => "urlencode",
            Builtin::StripHtml => "striptags",
            Builtin::NewlineToBr => "nl2br",
        }
    }

    pub fn from_liquid(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.liquid_name() == name)
    }

    pub fn from_nunjucks(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.nunjucks_name() == name)
    }
}
