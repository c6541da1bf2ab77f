//! Nunjucks concrete syntax.
//!
//! Follows the upstream lexer and parser closely enough that the reader's
//! workarounds stay honest:
//!
//! - `{# … #}` comments are dropped by the lexer and leave no node behind.
//! - `{% raw %}` / `{% verbatim %}` bodies come back as plain template data.
//! - No node records whitespace-control markers; statements and outputs only
//!   carry the byte offset of their first inner token, and blocks add the
//!   offsets of their `elif`/`else`/`end…` tag names.
//!
//! Unlike upstream, text between tags is kept verbatim even next to `-`
//! markers.

use crate::traits::ReadError;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // Template structure
    Output {
        children: Vec<Node>,
        pos: usize,
    },
    TemplateData {
        value: String,
        pos: usize,
    },
    If {
        cond: Box<Node>,
        body: Vec<Node>,
        else_: Option<Else>,
        pos: usize,
        /// Shared by every `elif` of the chain.
        end_pos: usize,
    },
    For {
        names: Vec<String>,
        arr: Box<Node>,
        body: Vec<Node>,
        else_: Option<ElseBody>,
        pos: usize,
        end_pos: usize,
    },
    Set {
        targets: Vec<String>,
        value: Option<Box<Node>>,
        body: Option<Vec<Node>>,
        pos: usize,
        /// `endset` of the block form.
        end_pos: Option<usize>,
    },
    Include {
        template: Box<Node>,
        ignore_missing: bool,
        pos: usize,
    },

    // Expressions
    Symbol {
        name: String,
    },
    Literal {
        kind: LiteralKind,
        span: Range<usize>,
    },
    LookupVal {
        target: Box<Node>,
        val: Box<Node>,
    },
    Group {
        inner: Box<Node>,
    },
    Filter {
        name: String,
        /// The filtered value first, then positional arguments.
        args: Vec<Node>,
        kwargs: Vec<(String, Node)>,
    },
    Binary {
        op: BinaryKind,
        left: Box<Node>,
        right: Box<Node>,
    },
    Compare {
        expr: Box<Node>,
        ops: Vec<(String, Node)>,
    },
    Not {
        target: Box<Node>,
    },
    Neg {
        target: Box<Node>,
    },
    Is {
        left: Box<Node>,
        right: Box<Node>,
    },
    FunCall {
        name: Box<Node>,
        args: Vec<Node>,
    },
    InlineIf {
        cond: Box<Node>,
        body: Box<Node>,
        else_: Option<Box<Node>>,
    },
    Array {
        items: Vec<Node>,
    },
    Dict {
        pairs: Vec<(Node, Node)>,
    },
}

/// What follows the body of an `if`.
#[derive(Debug, Clone, PartialEq)]
pub enum Else {
    /// `elif` / `elseif`: a nested `If` node sharing the outer `endif`.
    Elif(Box<Node>),
    Body(ElseBody),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseBody {
    pub body: Vec<Node>,
    /// Offset of the `else` tag name.
    pub pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    String,
    Number,
    Boolean,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Concat,
    In,
    And,
    Or,
}

impl Node {
    /// Upstream node type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Output { .. } => "Output",
            Node::TemplateData { .. } => "TemplateData",
            Node::If { .. } => "If",
            Node::For { .. } => "For",
            Node::Set { .. } => "Set",
            Node::Include { .. } => "Include",
            Node::Symbol { .. } => "Symbol",
            Node::Literal { .. } => "Literal",
            Node::LookupVal { .. } => "LookupVal",
            Node::Group { .. } => "Group",
            Node::Filter { .. } => "Filter",
            Node::Binary { op, .. } => match op {
                BinaryKind::Add => "Add",
                BinaryKind::Sub => "Sub",
                BinaryKind::Mul => "Mul",
                BinaryKind::Div => "Div",
                BinaryKind::FloorDiv => "FloorDiv",
                BinaryKind::Mod => "Mod",
                BinaryKind::Pow => "Pow",
                BinaryKind::Concat => "Concat",
                BinaryKind::In => "In",
                BinaryKind::And => "And",
                BinaryKind::Or => "Or",
            },
            Node::Compare { .. } => "Compare",
            Node::Not { .. } => "Not",
            Node::Neg { .. } => "Neg",
            Node::Is { .. } => "Is",
            Node::FunCall { .. } => "FunCall",
            Node::InlineIf { .. } => "InlineIf",
            Node::Array { .. } => "Array",
            Node::Dict { .. } => "Dict",
        }
    }
}

/// Parse a Nunjucks template.
pub fn parse(source: &str) -> Result<Vec<Node>, ReadError> {
    let mut parser = Parser { src: source, pos: 0 };
    let (nodes, _) = parser.parse_nodes(&[])?;
    Ok(nodes)
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Name,
    Str,
    Int,
    Float,
    Punct,
    BlockEnd,
    VarEnd,
    Eof,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    start: usize,
    end: usize,
}

const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "//", "**", "<", ">", "+", "-", "*", "/", "%", "~",
    "|", "(", ")", "[", "]", "{", "}", ",", ":", ".", "=",
];

const COMPARE_OPS: &[&str] = &["==", "===", "!=", "!==", "<", ">", "<=", ">="];

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn skip_ws(&self, from: usize) -> usize {
        let rest = &self.src[from..];
        from + (rest.len() - rest.trim_start().len())
    }

    fn peek(&self) -> Result<Token<'a>, ReadError> {
        let start = self.skip_ws(self.pos);
        let rest = &self.src[start..];
        let token = |kind, len: usize| Token {
            kind,
            text: &self.src[start..start + len],
            start,
            end: start + len,
        };

        let Some(c) = rest.chars().next() else {
            return Ok(token(TokenKind::Eof, 0));
        };

        for (close, kind) in [("%}", TokenKind::BlockEnd), ("}}", TokenKind::VarEnd)] {
            if rest.starts_with(close) {
                return Ok(token(kind, 2));
            }
            if rest.starts_with('-') && rest[1..].starts_with(close) {
                return Ok(token(kind, 3));
            }
        }

        if c == '\'' || c == '"' {
            return Ok(token(TokenKind::Str, self.string_len(start)?));
        }

        if c.is_ascii_digit() {
            let bytes = rest.as_bytes();
            let mut len = rest.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(rest.len());
            if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit)
            {
                len += 1;
                len += rest[len..]
                    .find(|ch: char| !ch.is_ascii_digit())
                    .unwrap_or(rest.len() - len);
                return Ok(token(TokenKind::Float, len));
            }
            return Ok(token(TokenKind::Int, len));
        }

        if c.is_alphabetic() || c == '_' {
            let len = rest
                .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            return Ok(token(TokenKind::Name, len));
        }

        for punct in PUNCTUATION {
            if rest.starts_with(punct) {
                return Ok(token(TokenKind::Punct, punct.len()));
            }
        }

        Err(ReadError::syntax(start, format!("unexpected character '{c}'")))
    }

    /// Length of the quoted string at `start`, honouring backslash and
    /// doubled-quote escapes.
    fn string_len(&self, start: usize) -> Result<usize, ReadError> {
        let bytes = self.src.as_bytes();
        let quote = bytes[start];
        let mut i = start + 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b if b == quote && bytes.get(i + 1) == Some(&quote) => i += 2,
                b if b == quote => return Ok(i + 1 - start),
                _ => i += 1,
            }
        }
        Err(ReadError::syntax(start, "unterminated string"))
    }

    fn next(&mut self) -> Result<Token<'a>, ReadError> {
        let token = self.peek()?;
        self.pos = token.end;
        Ok(token)
    }

    fn is_punct(&self, punct: &str) -> Result<bool, ReadError> {
        let token = self.peek()?;
        Ok(token.kind == TokenKind::Punct && token.text == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> Result<bool, ReadError> {
        let found = self.is_punct(punct)?;
        if found {
            self.next()?;
        }
        Ok(found)
    }

    fn eat_name(&mut self, name: &str) -> Result<bool, ReadError> {
        let token = self.peek()?;
        let found = token.kind == TokenKind::Name && token.text == name;
        if found {
            self.next()?;
        }
        Ok(found)
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ReadError> {
        if self.eat_punct(punct)? {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{punct}'"))?)
        }
    }

    fn expect_name(&mut self) -> Result<Token<'a>, ReadError> {
        let token = self.peek()?;
        if token.kind == TokenKind::Name {
            self.next()
        } else {
            Err(self.unexpected("a name")?)
        }
    }

    fn expect_block_end(&mut self) -> Result<(), ReadError> {
        if self.peek()?.kind == TokenKind::BlockEnd {
            self.next()?;
            Ok(())
        } else {
            Err(self.unexpected("end of block tag")?)
        }
    }

    fn unexpected(&self, expected: &str) -> Result<ReadError, ReadError> {
        let token = self.peek()?;
        let got = match token.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", token.text),
        };
        Ok(ReadError::syntax(
            token.start,
            format!("expected {expected}, got {got}"),
        ))
    }

    // ========================================================================
    // Template structure
    // ========================================================================

    /// Parse until one of the `ends` block tags. Returns the matching tag name
    /// and its offset, leaving the cursor just after the name.
    fn parse_nodes(
        &mut self,
        ends: &[&str],
    ) -> Result<(Vec<Node>, Option<(String, usize)>), ReadError> {
        let mut nodes = Vec::new();

        loop {
            let Some(open) = find_open(self.src, self.pos) else {
                self.push_data(&mut nodes, self.src.len());
                if let Some(first) = ends.first() {
                    return Err(ReadError::syntax(
                        self.src.len(),
                        format!("unexpected end of template, expected '{first}'"),
                    ));
                }
                return Ok((nodes, None));
            };
            self.push_data(&mut nodes, open);

            match &self.src[open..open + 2] {
                "{#" => {
                    let close = self.src[open + 2..]
                        .find("#}")
                        .ok_or_else(|| ReadError::syntax(open, "unclosed comment"))?;
                    self.pos = open + 2 + close + 2;
                }
                "{{" => {
                    self.pos = open + 2;
                    if self.src[self.pos..].starts_with('-') {
                        self.pos += 1;
                    }
                    let pos = self.skip_ws(self.pos);
                    let expr = self.parse_expression()?;
                    if self.peek()?.kind != TokenKind::VarEnd {
                        return Err(self.unexpected("'}}'")?);
                    }
                    self.next()?;
                    nodes.push(Node::Output {
                        children: vec![expr],
                        pos,
                    });
                }
                _ => {
                    self.pos = open + 2;
                    if self.src[self.pos..].starts_with('-') {
                        self.pos += 1;
                    }
                    let name = self.expect_name()?;
                    if ends.contains(&name.text) {
                        return Ok((nodes, Some((name.text.to_string(), name.start))));
                    }
                    nodes.push(self.parse_statement(name)?);
                }
            }
        }
    }

    /// Offset of a terminator found by `parse_nodes`.
    fn tag_pos(&self, end: Option<(String, usize)>) -> usize {
        end.map_or(self.src.len(), |(_, pos)| pos)
    }

    fn push_data(&mut self, nodes: &mut Vec<Node>, end: usize) {
        if end > self.pos {
            nodes.push(Node::Output {
                children: vec![Node::TemplateData {
                    value: self.src[self.pos..end].to_string(),
                    pos: self.pos,
                }],
                pos: self.pos,
            });
        }
        self.pos = end;
    }

    fn parse_statement(&mut self, name: Token<'a>) -> Result<Node, ReadError> {
        match name.text {
            "if" => self.parse_if(name.start),
            "for" => self.parse_for(name.start),
            "set" => self.parse_set(name.start),
            "include" => self.parse_include(name.start),
            "raw" | "verbatim" => self.parse_raw(name.text),
            other => Err(ReadError::syntax(
                name.start,
                format!("unknown block tag: {other}"),
            )),
        }
    }

    fn parse_if(&mut self, pos: usize) -> Result<Node, ReadError> {
        let cond = self.parse_expression()?;
        self.expect_block_end()?;

        let (body, end) = self.parse_nodes(&["elif", "elseif", "else", "endif"])?;
        let (else_, end_pos) = match end {
            Some((tag, tag_pos)) if tag == "elif" || tag == "elseif" => {
                let nested = self.parse_if(tag_pos)?;
                let end_pos = match &nested {
                    Node::If { end_pos, .. } => *end_pos,
                    _ => self.pos,
                };
                (Some(Else::Elif(Box::new(nested))), end_pos)
            }
            Some((tag, tag_pos)) if tag == "else" => {
                self.expect_block_end()?;
                let (body, end) = self.parse_nodes(&["endif"])?;
                self.expect_block_end()?;
                let else_ = ElseBody { body, pos: tag_pos };
                (Some(Else::Body(else_)), self.tag_pos(end))
            }
            end => {
                self.expect_block_end()?;
                (None, self.tag_pos(end))
            }
        };

        Ok(Node::If {
            cond: Box::new(cond),
            body,
            else_,
            pos,
            end_pos,
        })
    }

    fn parse_for(&mut self, pos: usize) -> Result<Node, ReadError> {
        let mut names = vec![self.expect_name()?.text.to_string()];
        while self.eat_punct(",")? {
            names.push(self.expect_name()?.text.to_string());
        }
        if !self.eat_name("in")? {
            return Err(self.unexpected("'in'")?);
        }
        let arr = self.parse_expression()?;
        self.expect_block_end()?;

        let (body, end) = self.parse_nodes(&["else", "endfor"])?;
        self.expect_block_end()?;
        let (else_, end_pos) = match end {
            Some((tag, tag_pos)) if tag == "else" => {
                let (body, end) = self.parse_nodes(&["endfor"])?;
                self.expect_block_end()?;
                (Some(ElseBody { body, pos: tag_pos }), self.tag_pos(end))
            }
            end => (None, self.tag_pos(end)),
        };

        Ok(Node::For {
            names,
            arr: Box::new(arr),
            body,
            else_,
            pos,
            end_pos,
        })
    }

    fn parse_set(&mut self, pos: usize) -> Result<Node, ReadError> {
        let mut targets = vec![self.expect_name()?.text.to_string()];
        while self.eat_punct(",")? {
            targets.push(self.expect_name()?.text.to_string());
        }

        if self.eat_punct("=")? {
            let value = self.parse_expression()?;
            self.expect_block_end()?;
            return Ok(Node::Set {
                targets,
                value: Some(Box::new(value)),
                body: None,
                pos,
                end_pos: None,
            });
        }

        self.expect_block_end()?;
        let (body, end) = self.parse_nodes(&["endset"])?;
        self.expect_block_end()?;
        Ok(Node::Set {
            targets,
            value: None,
            body: Some(body),
            pos,
            end_pos: Some(self.tag_pos(end)),
        })
    }

    fn parse_include(&mut self, pos: usize) -> Result<Node, ReadError> {
        let template = self.parse_expression()?;
        let ignore_missing = if self.eat_name("ignore")? {
            if !self.eat_name("missing")? {
                return Err(self.unexpected("'missing'")?);
            }
            true
        } else {
            false
        };
        self.expect_block_end()?;
        Ok(Node::Include {
            template: Box::new(template),
            ignore_missing,
            pos,
        })
    }

    /// Body up to the matching end tag, as plain data.
    fn parse_raw(&mut self, name: &str) -> Result<Node, ReadError> {
        self.expect_block_end()?;
        let body_start = self.pos;
        let end_name = format!("end{name}");

        let mut search = body_start;
        while let Some(open) = find_open(self.src, search) {
            if &self.src[open..open + 2] == "{%" {
                let mut inner = open + 2;
                if self.src[inner..].starts_with('-') {
                    inner += 1;
                }
                let name_start = self.skip_ws(inner);
                let rest = &self.src[name_start..];
                let closes = rest.starts_with(&end_name)
                    && rest[end_name.len()..]
                        .chars()
                        .next()
                        .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));
                if closes {
                    self.pos = name_start + end_name.len();
                    self.expect_block_end()?;
                    return Ok(Node::Output {
                        children: vec![Node::TemplateData {
                            value: self.src[body_start..open].to_string(),
                            pos: body_start,
                        }],
                        pos: body_start,
                    });
                }
            }
            search = open + 2;
        }

        Err(ReadError::syntax(
            body_start,
            format!("expected '{end_name}' before end of template"),
        ))
    }

    // ========================================================================
    // Expressions, loosest first
    // ========================================================================

    fn parse_expression(&mut self) -> Result<Node, ReadError> {
        let body = self.parse_or()?;
        if self.eat_name("if")? {
            let cond = self.parse_or()?;
            let else_ = if self.eat_name("else")? {
                Some(Box::new(self.parse_or()?))
            } else {
                None
            };
            return Ok(Node::InlineIf {
                cond: Box::new(cond),
                body: Box::new(body),
                else_,
            });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> Result<Node, ReadError> {
        let mut node = self.parse_and()?;
        while self.eat_name("or")? {
            node = binary(BinaryKind::Or, node, self.parse_and()?);
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node, ReadError> {
        let mut node = self.parse_not()?;
        while self.eat_name("and")? {
            node = binary(BinaryKind::And, node, self.parse_not()?);
        }
        Ok(node)
    }

    fn parse_not(&mut self) -> Result<Node, ReadError> {
        if self.eat_name("not")? {
            return Ok(Node::Not {
                target: Box::new(self.parse_not()?),
            });
        }
        self.parse_in()
    }

    fn parse_in(&mut self) -> Result<Node, ReadError> {
        let mut node = self.parse_is()?;
        while self.eat_name("in")? {
            node = binary(BinaryKind::In, node, self.parse_is()?);
        }
        Ok(node)
    }

    fn parse_is(&mut self) -> Result<Node, ReadError> {
        let node = self.parse_compare()?;
        if self.eat_name("is")? {
            let negated = self.eat_name("not")?;
            let test = self.parse_compare()?;
            let is = Node::Is {
                left: Box::new(node),
                right: Box::new(test),
            };
            return Ok(if negated {
                Node::Not {
                    target: Box::new(is),
                }
            } else {
                is
            });
        }
        Ok(node)
    }

    fn parse_compare(&mut self) -> Result<Node, ReadError> {
        let expr = self.parse_concat()?;
        let mut ops = Vec::new();
        loop {
            let token = self.peek()?;
            if token.kind == TokenKind::Punct && COMPARE_OPS.contains(&token.text) {
                self.next()?;
                ops.push((token.text.to_string(), self.parse_concat()?));
            } else {
                break;
            }
        }
        if ops.is_empty() {
            Ok(expr)
        } else {
            Ok(Node::Compare {
                expr: Box::new(expr),
                ops,
            })
        }
    }

    fn parse_concat(&mut self) -> Result<Node, ReadError> {
        let mut node = self.parse_add()?;
        while self.eat_punct("~")? {
            node = binary(BinaryKind::Concat, node, self.parse_add()?);
        }
        Ok(node)
    }

    fn parse_add(&mut self) -> Result<Node, ReadError> {
        let mut node = self.parse_mul()?;
        loop {
            let kind = if self.eat_punct("+")? {
                BinaryKind::Add
            } else if self.eat_punct("-")? {
                BinaryKind::Sub
            } else {
                return Ok(node);
            };
            node = binary(kind, node, self.parse_mul()?);
        }
    }

    fn parse_mul(&mut self) -> Result<Node, ReadError> {
        let mut node = self.parse_pow()?;
        loop {
            let kind = if self.eat_punct("*")? {
                BinaryKind::Mul
            } else if self.eat_punct("//")? {
                BinaryKind::FloorDiv
            } else if self.eat_punct("/")? {
                BinaryKind::Div
            } else if self.eat_punct("%")? {
                BinaryKind::Mod
            } else {
                return Ok(node);
            };
            node = binary(kind, node, self.parse_pow()?);
        }
    }

    fn parse_pow(&mut self) -> Result<Node, ReadError> {
        let mut node = self.parse_unary()?;
        while self.eat_punct("**")? {
            node = binary(BinaryKind::Pow, node, self.parse_unary()?);
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Node, ReadError> {
        let node = if self.eat_punct("-")? {
            Node::Neg {
                target: Box::new(self.parse_unary()?),
            }
        } else {
            self.parse_primary()?
        };
        self.parse_filters(node)
    }

    fn parse_primary(&mut self) -> Result<Node, ReadError> {
        let token = self.peek()?;
        let node = match token.kind {
            TokenKind::Str => {
                self.next()?;
                literal(LiteralKind::String, &token)
            }
            TokenKind::Int | TokenKind::Float => {
                self.next()?;
                literal(LiteralKind::Number, &token)
            }
            TokenKind::Name => {
                self.next()?;
                match token.text {
                    "true" | "false" | "True" | "False" => literal(LiteralKind::Boolean, &token),
                    "none" | "null" | "None" => literal(LiteralKind::None, &token),
                    name => Node::Symbol {
                        name: name.to_string(),
                    },
                }
            }
            TokenKind::Punct if token.text == "(" => {
                self.next()?;
                let inner = self.parse_expression()?;
                self.expect_punct(")")?;
                Node::Group {
                    inner: Box::new(inner),
                }
            }
            TokenKind::Punct if token.text == "[" => {
                self.next()?;
                let mut items = Vec::new();
                while !self.eat_punct("]")? {
                    if !items.is_empty() {
                        self.expect_punct(",")?;
                    }
                    items.push(self.parse_expression()?);
                }
                Node::Array { items }
            }
            TokenKind::Punct if token.text == "{" => {
                self.next()?;
                let mut pairs = Vec::new();
                while !self.eat_punct("}")? {
                    if !pairs.is_empty() {
                        self.expect_punct(",")?;
                    }
                    let key = self.parse_primary()?;
                    self.expect_punct(":")?;
                    pairs.push((key, self.parse_expression()?));
                }
                Node::Dict { pairs }
            }
            _ => return Err(self.unexpected("an expression")?),
        };
        self.parse_postfix(node)
    }

    /// `.name`, `[expr]` and call suffixes.
    fn parse_postfix(&mut self, mut node: Node) -> Result<Node, ReadError> {
        loop {
            if self.eat_punct(".")? {
                let name = self.expect_name()?;
                node = Node::LookupVal {
                    target: Box::new(node),
                    val: Box::new(literal(LiteralKind::String, &name)),
                };
            } else if self.eat_punct("[")? {
                let val = self.parse_expression()?;
                self.expect_punct("]")?;
                node = Node::LookupVal {
                    target: Box::new(node),
                    val: Box::new(val),
                };
            } else if self.eat_punct("(")? {
                let (args, kwargs) = self.parse_call_args()?;
                let mut args = args;
                args.extend(kwargs.into_iter().map(|(_, value)| value));
                node = Node::FunCall {
                    name: Box::new(node),
                    args,
                };
            } else {
                return Ok(node);
            }
        }
    }

    /// Arguments after an opening `(`, through the closing `)`.
    #[allow(clippy::type_complexity)]
    fn parse_call_args(&mut self) -> Result<(Vec<Node>, Vec<(String, Node)>), ReadError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        let mut first = true;
        while !self.eat_punct(")")? {
            if !first {
                self.expect_punct(",")?;
            }
            first = false;

            let token = self.peek()?;
            if token.kind == TokenKind::Name {
                let checkpoint = self.pos;
                self.next()?;
                if self.eat_punct("=")? {
                    kwargs.push((token.text.to_string(), self.parse_expression()?));
                    continue;
                }
                self.pos = checkpoint;
            }
            args.push(self.parse_expression()?);
        }
        Ok((args, kwargs))
    }

    fn parse_filters(&mut self, mut node: Node) -> Result<Node, ReadError> {
        while self.eat_punct("|")? {
            let mut name = self.expect_name()?.text.to_string();
            while self.eat_punct(".")? {
                name.push('.');
                name.push_str(self.expect_name()?.text);
            }
            let mut args = vec![node];
            let mut kwargs = Vec::new();
            if self.eat_punct("(")? {
                let (positional, named) = self.parse_call_args()?;
                args.extend(positional);
                kwargs = named;
            }
            node = Node::Filter { name, args, kwargs };
        }
        Ok(node)
    }
}

fn binary(op: BinaryKind, left: Node, right: Node) -> Node {
    Node::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn literal(kind: LiteralKind, token: &Token<'_>) -> Node {
    Node::Literal {
        kind,
        span: token.start..token.end,
    }
}

/// Next `{{`, `{%` or `{#` at or after `from`.
fn find_open(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    (from..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'{' && matches!(bytes[i + 1], b'{' | b'%' | b'#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Node {
        let template = format!("{{{{ {source} }}}}");
        match parse(&template).unwrap().into_iter().next() {
            Some(Node::Output { mut children, .. }) => children.remove(0),
            other => panic!("expected output, got {other:?}"),
        }
    }

    #[test]
    fn data_is_wrapped_in_output() {
        let nodes = parse("Hello").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Output {
                children: vec![Node::TemplateData {
                    value: "Hello".into(),
                    pos: 0
                }],
                pos: 0
            }]
        );
    }

    #[test]
    fn comments_leave_no_node() {
        let nodes = parse("a{# note #}b").unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        match expr("a + b * c") {
            Node::Binary {
                op: BinaryKind::Add,
                right,
                ..
            } => assert_eq!(right.type_name(), "Mul"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn subtraction_is_left_associative() {
        match expr("a - b - c") {
            Node::Binary {
                op: BinaryKind::Sub,
                left,
                ..
            } => assert_eq!(left.type_name(), "Sub"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn filters_take_target_first() {
        match expr("items | join(', ')") {
            Node::Filter { name, args, kwargs } => {
                assert_eq!(name, "join");
                assert_eq!(args.len(), 2);
                assert_eq!(args[0], Node::Symbol { name: "items".into() });
                assert!(kwargs.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn keyword_arguments() {
        match expr("xs | sort(attribute='name', reverse=true)") {
            Node::Filter { kwargs, .. } => {
                let keys: Vec<_> = kwargs.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["attribute", "reverse"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn compare_collects_operator_list() {
        match expr("a < b <= c") {
            Node::Compare { ops, .. } => assert_eq!(ops.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn trim_marker_is_not_minus() {
        let nodes = parse("{{ a -}}").unwrap();
        assert_eq!(
            nodes[0],
            Node::Output {
                children: vec![Node::Symbol { name: "a".into() }],
                pos: 3
            }
        );
    }

    #[test]
    fn if_elif_else_chain() {
        let nodes = parse("{% if a %}1{% elif b %}2{% else %}3{% endif %}").unwrap();
        let Node::If {
            else_: Some(Else::Elif(nested)),
            ..
        } = &nodes[0]
        else {
            panic!("expected elif chain, got {:?}", nodes[0]);
        };
        assert!(matches!(
            nested.as_ref(),
            Node::If {
                else_: Some(Else::Body(_)),
                ..
            }
        ));
    }

    #[test]
    fn blocks_record_closing_tag_offsets() {
        let source = "{% for x in xs %}a{% else %}b{% endfor %}";
        let nodes = parse(source).unwrap();
        let Node::For {
            else_: Some(else_),
            end_pos,
            ..
        } = &nodes[0]
        else {
            panic!("expected for with else, got {:?}", nodes[0]);
        };
        assert_eq!(&source[else_.pos..else_.pos + 4], "else");
        assert_eq!(&source[*end_pos..*end_pos + 6], "endfor");

        let source = "{% if a %}1{% elif b %}2{% endif %}";
        let nodes = parse(source).unwrap();
        let Node::If {
            else_: Some(Else::Elif(nested)),
            end_pos,
            ..
        } = &nodes[0]
        else {
            panic!("expected elif chain, got {:?}", nodes[0]);
        };
        assert_eq!(&source[*end_pos..*end_pos + 5], "endif");
        assert!(matches!(nested.as_ref(), Node::If { end_pos: nested_end, .. } if nested_end == end_pos));
    }

    #[test]
    fn raw_body_is_template_data() {
        let source = "{% raw %}{{ x }}{% endraw %}";
        let nodes = parse(source).unwrap();
        assert_eq!(
            nodes[0],
            Node::Output {
                children: vec![Node::TemplateData {
                    value: "{{ x }}".into(),
                    pos: 9
                }],
                pos: 9
            }
        );
    }

    #[test]
    fn include_ignore_missing() {
        let nodes = parse("{% include 'a.njk' ignore missing %}").unwrap();
        assert!(matches!(
            nodes[0],
            Node::Include {
                ignore_missing: true,
                ..
            }
        ));
    }

    #[test]
    fn unknown_block_tag_is_an_error() {
        let err = parse("{% break %}").unwrap_err();
        assert!(err.to_string().contains("unknown block tag: break"), "{err}");
    }

    #[test]
    fn unclosed_block_is_an_error() {
        assert!(parse("{% if a %}x").is_err());
    }
}
