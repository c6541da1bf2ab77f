//! Liquid concrete syntax.
//!
//! Produces a liquidjs-shaped tree: every node is literal text, an output
//! (`{{ value }}`) or a tag (`{% name args %}`), with block tags owning their
//! nested templates. Expressions are read into postfix token streams with
//! comparisons binding tighter than `and`/`or`, and equal precedence grouping
//! right-to-left.
//!
//! All spans are byte ranges into the parsed source, so callers can recover
//! literals and verbatim bodies exactly as written.

use crate::traits::ReadError;
use std::ops::Range;

/// A parsed tag delimiter pair and its contents.
#[derive(Debug, Clone, PartialEq)]
pub struct TagToken {
    pub name: String,
    /// Argument text after the name, trimmed.
    pub args: String,
    /// Byte offset of `args` in the source.
    pub args_offset: usize,
    pub span: Range<usize>,
    pub trim_left: bool,
    pub trim_right: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Html {
        span: Range<usize>,
    },
    Output {
        value: Value,
        span: Range<usize>,
        trim_left: bool,
        trim_right: bool,
    },
    Tag(Tag),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub token: TagToken,
    pub body: TagBody,
    /// The matching `end…` tag of a block.
    pub close: Option<TagToken>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagBody {
    /// No nested templates.
    Inline,
    /// `if` / `unless`: condition branches plus optional `else`.
    Branches {
        branches: Vec<CondBranch>,
        else_tag: Option<TagToken>,
        else_templates: Option<Vec<Node>>,
    },
    /// `case`: subject, `when` arms, optional `else`.
    Case {
        subject: Value,
        whens: Vec<When>,
        else_tag: Option<TagToken>,
        else_templates: Option<Vec<Node>>,
    },
    /// `for` / `capture`.
    Templates {
        templates: Vec<Node>,
        else_tag: Option<TagToken>,
        else_templates: Option<Vec<Node>>,
    },
    /// `raw` / `comment`: body kept as a source span, never tokenized.
    Verbatim { content: Range<usize> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CondBranch {
    /// The `if`/`unless`/`elsif` tag opening this branch.
    pub tag: TagToken,
    pub condition: Expression,
    pub templates: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct When {
    pub tag: TagToken,
    pub values: Vec<Operand>,
    /// Span of the whole value list, separators included.
    pub args_span: Range<usize>,
    pub templates: Vec<Node>,
}

/// `initial | filter | filter`
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub initial: Expression,
    pub filters: Vec<Filter>,
}

/// Operands and operators in postfix order.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub postfix: Vec<ExprToken>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprToken {
    Operand(Operand),
    Operator { text: String, span: Range<usize> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Quoted { span: Range<usize> },
    Number { span: Range<usize> },
    Literal { word: Keyword, span: Range<usize> },
    Property {
        root: String,
        props: Vec<Prop>,
        span: Range<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    True,
    False,
    Nil,
    Null,
    Empty,
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    Name(String),
    Index(i64),
    /// `["key"]`; span covers the quoted key.
    Key { content: String, span: Range<usize> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<FilterArg>,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterArg {
    Positional(Operand),
    Keyword { key: String, value: Operand },
}

impl Operand {
    pub fn span(&self) -> Range<usize> {
        match self {
            Operand::Quoted { span }
            | Operand::Number { span }
            | Operand::Literal { span, .. }
            | Operand::Property { span, .. } => span.clone(),
        }
    }
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Html { .. } => "html",
            Node::Output { .. } => "output",
            Node::Tag(_) => "tag",
        }
    }
}

/// Parse a Liquid template into its node tree.
pub fn parse(source: &str) -> Result<Vec<Node>, ReadError> {
    let tokens = tokenize(source)?;
    let mut builder = TreeBuilder {
        source,
        tokens: tokens.into_iter(),
    };
    let (nodes, terminator) = builder.parse_block(None, &[])?;
    match terminator {
        Some(tag) => Err(ReadError::syntax(
            tag.span.start,
            format!("unexpected tag '{}'", tag.name),
        )),
        None => Ok(nodes),
    }
}

/// Parse an output value (`expr | filter: arg`) from `source[range]`.
pub fn parse_value(source: &str, range: Range<usize>) -> Result<Value, ReadError> {
    let mut reader = ExprReader::new(source, range);
    let value = reader.read_value()?;
    reader.expect_end()?;
    Ok(value)
}

/// Parse a filterless expression from `source[range]`.
pub fn parse_expression(source: &str, range: Range<usize>) -> Result<Expression, ReadError> {
    let mut reader = ExprReader::new(source, range);
    let expression = reader.read_expression()?;
    reader.expect_end()?;
    Ok(expression)
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug)]
enum Token {
    Html(Range<usize>),
    Output {
        inner: Range<usize>,
        span: Range<usize>,
        trim_left: bool,
        trim_right: bool,
    },
    Tag(TagToken),
    Verbatim {
        open: TagToken,
        content: Range<usize>,
        close: TagToken,
    },
}

fn tokenize(source: &str) -> Result<Vec<Token>, ReadError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let Some(start) = find_open(source, pos) else {
            tokens.push(Token::Html(pos..source.len()));
            break;
        };
        if start > pos {
            tokens.push(Token::Html(pos..start));
        }

        if bytes[start + 1] == b'{' {
            let (inner, end, trim_left, trim_right) = read_delimited(source, start, b'}')?;
            tokens.push(Token::Output {
                inner,
                span: start..end,
                trim_left,
                trim_right,
            });
            pos = end;
        } else {
            let tag = read_tag(source, start)?;
            pos = tag.span.end;
            if tag.name == "raw" || tag.name == "comment" {
                let close_name = format!("end{}", tag.name);
                let close = find_closing_tag(source, pos, &close_name)?.ok_or_else(|| {
                    ReadError::syntax(tag.span.start, format!("tag '{}' not closed", tag.name))
                })?;
                let content = pos..close.span.start;
                pos = close.span.end;
                tokens.push(Token::Verbatim {
                    open: tag,
                    content,
                    close,
                });
            } else {
                tokens.push(Token::Tag(tag));
            }
        }
    }

    Ok(tokens)
}

/// Next `{{` or `{%` at or after `from`.
fn find_open(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && (bytes[i + 1] == b'{' || bytes[i + 1] == b'%') {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Read a `{{ … }}` or `{% … %}` pair starting at `start`. `close` is the
/// byte preceding the final `}`. Quoted strings may contain the delimiter.
///
/// Returns (inner range without trim markers, end offset, trim_left, trim_right).
fn read_delimited(
    source: &str,
    start: usize,
    close: u8,
) -> Result<(Range<usize>, usize, bool, bool), ReadError> {
    let bytes = source.as_bytes();
    let mut inner_start = start + 2;
    let trim_left = bytes.get(inner_start) == Some(&b'-');
    if trim_left {
        inner_start += 1;
    }

    let mut i = inner_start;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if b == close && bytes.get(i + 1) == Some(&b'}') {
                    let trim_right = i > inner_start && bytes[i - 1] == b'-';
                    let inner_end = if trim_right { i - 1 } else { i };
                    return Ok((inner_start..inner_end, i + 2, trim_left, trim_right));
                }
            }
        }
        i += 1;
    }

    let what = if close == b'}' { "output" } else { "tag" };
    Err(ReadError::syntax(start, format!("{what} not closed")))
}

fn read_tag(source: &str, start: usize) -> Result<TagToken, ReadError> {
    let (inner, end, trim_left, trim_right) = read_delimited(source, start, b'%')?;
    let text = &source[inner.clone()];
    let leading = text.len() - text.trim_start().len();
    let body = text.trim();
    let body_offset = inner.start + leading;

    let name_len = if body.starts_with('#') {
        1
    } else {
        body.find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(body.len())
    };
    if name_len == 0 {
        return Err(ReadError::syntax(start, "missing tag name"));
    }

    let name = body[..name_len].to_string();
    let rest = &body[name_len..];
    let args = rest.trim_start();
    let args_offset = body_offset + name_len + (rest.len() - args.len());

    Ok(TagToken {
        name,
        args: args.to_string(),
        args_offset,
        span: start..end,
        trim_left,
        trim_right,
    })
}

/// Find the first `{% name %}` at or after `from`, ignoring anything between.
fn find_closing_tag(source: &str, from: usize, name: &str) -> Result<Option<TagToken>, ReadError> {
    let bytes = source.as_bytes();
    let mut i = from;
    while let Some(start) = find_open(source, i) {
        if bytes[start + 1] == b'%' {
            let mut j = start + 2;
            if bytes.get(j) == Some(&b'-') {
                j += 1;
            }
            let rest = source[j..].trim_start();
            if rest.starts_with(name) {
                let after = rest[name.len()..].chars().next();
                if matches!(after, Some(c) if c.is_whitespace() || c == '-' || c == '%') {
                    return read_tag(source, start).map(Some);
                }
            }
        }
        i = start + 2;
    }
    Ok(None)
}

// ============================================================================
// Tree builder
// ============================================================================

/// Closing and intermediate tags that never stand on their own.
const STRUCTURAL: &[&str] = &[
    "else",
    "elsif",
    "when",
    "endif",
    "endunless",
    "endcase",
    "endfor",
    "endcapture",
    "endraw",
    "endcomment",
];

struct TreeBuilder<'a> {
    source: &'a str,
    tokens: std::vec::IntoIter<Token>,
}

impl<'a> TreeBuilder<'a> {
    /// Collect nodes until one of `stop` (or end of input when `stop` is empty).
    fn parse_block(
        &mut self,
        open: Option<&TagToken>,
        stop: &[&str],
    ) -> Result<(Vec<Node>, Option<TagToken>), ReadError> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.next() {
            match token {
                Token::Html(span) => nodes.push(Node::Html { span }),
                Token::Output {
                    inner,
                    span,
                    trim_left,
                    trim_right,
                } => {
                    let value = parse_value(self.source, inner)?;
                    nodes.push(Node::Output {
                        value,
                        span,
                        trim_left,
                        trim_right,
                    });
                }
                Token::Verbatim {
                    open,
                    content,
                    close,
                } => nodes.push(Node::Tag(Tag {
                    token: open,
                    body: TagBody::Verbatim { content },
                    close: Some(close),
                })),
                Token::Tag(tag) => {
                    if stop.contains(&tag.name.as_str()) {
                        return Ok((nodes, Some(tag)));
                    }
                    if STRUCTURAL.contains(&tag.name.as_str()) {
                        return Err(ReadError::syntax(
                            tag.span.start,
                            format!("unexpected tag '{}'", tag.name),
                        ));
                    }
                    let node = match tag.name.as_str() {
                        "if" => self.parse_conditional(tag, "endif")?,
                        "unless" => self.parse_conditional(tag, "endunless")?,
                        "case" => self.parse_case(tag)?,
                        "for" => self.parse_templates(tag, "endfor", true)?,
                        "capture" => self.parse_templates(tag, "endcapture", false)?,
                        _ => Tag {
                            token: tag,
                            body: TagBody::Inline,
                            close: None,
                        },
                    };
                    nodes.push(Node::Tag(node));
                }
            }
        }

        match open {
            Some(tag) if !stop.is_empty() => Err(ReadError::syntax(
                tag.span.start,
                format!("tag '{}' not closed", tag.name),
            )),
            _ => Ok((nodes, None)),
        }
    }

    fn parse_conditional(&mut self, open: TagToken, end: &str) -> Result<Tag, ReadError> {
        let mut branches = vec![CondBranch {
            tag: open.clone(),
            condition: self.condition(&open)?,
            templates: Vec::new(),
        }];
        let mut else_tag = None;
        let mut else_templates = None;
        let mut close = None;

        loop {
            let (nodes, terminator) = self.parse_block(Some(&open), &["elsif", "else", end])?;
            if let Some(last) = branches.last_mut() {
                last.templates = nodes;
            }
            let Some(terminator) = terminator else {
                break;
            };
            match terminator.name.as_str() {
                "elsif" => branches.push(CondBranch {
                    condition: self.condition(&terminator)?,
                    tag: terminator,
                    templates: Vec::new(),
                }),
                "else" => {
                    let (nodes, end_tag) = self.parse_block(Some(&open), &[end])?;
                    else_tag = Some(terminator);
                    else_templates = Some(nodes);
                    close = end_tag;
                    break;
                }
                _ => {
                    close = Some(terminator);
                    break;
                }
            }
        }

        Ok(Tag {
            token: open,
            body: TagBody::Branches {
                branches,
                else_tag,
                else_templates,
            },
            close,
        })
    }

    fn parse_case(&mut self, open: TagToken) -> Result<Tag, ReadError> {
        let subject = parse_value(self.source, args_range(&open))?;
        let mut whens: Vec<When> = Vec::new();
        let mut else_tag = None;
        let mut else_templates = None;
        let mut close = None;

        // Text between `case` and the first `when` is dropped, as in liquidjs.
        let (_, mut terminator) = self.parse_block(Some(&open), &["when", "else", "endcase"])?;
        while let Some(tag) = terminator.take() {
            match tag.name.as_str() {
                "when" => {
                    let values = read_when_values(self.source, args_range(&tag))?;
                    let (templates, next) =
                        self.parse_block(Some(&open), &["when", "else", "endcase"])?;
                    whens.push(When {
                        values,
                        args_span: args_range(&tag),
                        tag,
                        templates,
                    });
                    terminator = next;
                }
                "else" => {
                    let (nodes, end_tag) = self.parse_block(Some(&open), &["endcase"])?;
                    else_tag = Some(tag);
                    else_templates = Some(nodes);
                    close = end_tag;
                }
                _ => close = Some(tag),
            }
        }

        Ok(Tag {
            token: open,
            body: TagBody::Case {
                subject,
                whens,
                else_tag,
                else_templates,
            },
            close,
        })
    }

    fn parse_templates(
        &mut self,
        open: TagToken,
        end: &str,
        allow_else: bool,
    ) -> Result<Tag, ReadError> {
        let stop: &[&str] = if allow_else { &["else", end] } else { &[end] };
        let (templates, terminator) = self.parse_block(Some(&open), stop)?;
        let (else_tag, else_templates, close) = match terminator {
            Some(tag) if tag.name == "else" => {
                let (nodes, end_tag) = self.parse_block(Some(&open), &[end])?;
                (Some(tag), Some(nodes), end_tag)
            }
            other => (None, None, other),
        };

        Ok(Tag {
            token: open,
            body: TagBody::Templates {
                templates,
                else_tag,
                else_templates,
            },
            close,
        })
    }

    fn condition(&self, tag: &TagToken) -> Result<Expression, ReadError> {
        if tag.args.is_empty() {
            return Err(ReadError::syntax(
                tag.span.start,
                format!("'{}' requires a condition", tag.name),
            ));
        }
        parse_expression(self.source, args_range(tag))
    }
}

fn args_range(tag: &TagToken) -> Range<usize> {
    tag.args_offset..tag.args_offset + tag.args.len()
}

/// `when a, b or c`
fn read_when_values(source: &str, range: Range<usize>) -> Result<Vec<Operand>, ReadError> {
    let mut reader = ExprReader::new(source, range);
    let mut values = vec![reader.read_operand()?];
    loop {
        reader.skip_ws();
        if reader.at_end() {
            break;
        }
        if reader.eat(",") || reader.eat_word("or") {
            values.push(reader.read_operand()?);
        } else {
            return Err(reader.unexpected());
        }
    }
    Ok(values)
}

// ============================================================================
// Expressions
// ============================================================================

struct ExprReader<'a> {
    source: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> ExprReader<'a> {
    fn new(source: &'a str, range: Range<usize>) -> Self {
        Self {
            source,
            pos: range.start,
            end: range.end,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..self.end]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, text: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(text) {
            self.pos += text.len();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        self.skip_ws();
        let rest = self.rest();
        if !rest.starts_with(word) {
            return false;
        }
        let boundary = rest[word.len()..]
            .chars()
            .next()
            .is_none_or(|c| !is_ident_char(c));
        if boundary {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> ReadError {
        match self.peek() {
            Some(c) => ReadError::syntax(self.pos, format!("unexpected '{c}'")),
            None => ReadError::syntax(self.pos, "unexpected end of expression"),
        }
    }

    fn expect_end(&mut self) -> Result<(), ReadError> {
        self.skip_ws();
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn read_value(&mut self) -> Result<Value, ReadError> {
        let initial = self.read_expression()?;
        let mut filters = Vec::new();
        while self.eat("|") {
            filters.push(self.read_filter()?);
        }
        Ok(Value { initial, filters })
    }

    /// Infix operands/operators up to `|` or the end, converted to postfix.
    fn read_expression(&mut self) -> Result<Expression, ReadError> {
        let mut infix: Vec<ExprToken> = Vec::new();
        loop {
            self.skip_ws();
            if self.at_end() || self.peek() == Some('|') {
                break;
            }
            let expect_operand = matches!(infix.last(), None | Some(ExprToken::Operator { .. }));
            if expect_operand {
                infix.push(ExprToken::Operand(self.read_operand()?));
            } else {
                infix.push(self.read_operator()?);
            }
        }

        match infix.last() {
            None => Err(ReadError::syntax(self.pos, "expected an expression")),
            Some(ExprToken::Operator { text, span }) => Err(ReadError::syntax(
                span.start,
                format!("operator '{text}' is missing its right operand"),
            )),
            Some(ExprToken::Operand(_)) => Ok(Expression {
                postfix: to_postfix(infix),
            }),
        }
    }

    fn read_operator(&mut self) -> Result<ExprToken, ReadError> {
        self.skip_ws();
        let start = self.pos;
        for symbol in ["==", "!=", "<>", "<=", ">=", "<", ">"] {
            if self.rest().starts_with(symbol) {
                self.pos += symbol.len();
                return Ok(ExprToken::Operator {
                    text: symbol.to_string(),
                    span: start..self.pos,
                });
            }
        }
        for word in ["contains", "and", "or"] {
            if self.eat_word(word) {
                return Ok(ExprToken::Operator {
                    text: word.to_string(),
                    span: start..self.pos,
                });
            }
        }
        Err(self.unexpected())
    }

    fn read_operand(&mut self) -> Result<Operand, ReadError> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some('\'' | '"') => {
                let span = self.read_quoted()?;
                Ok(Operand::Quoted { span })
            }
            Some(c) if c.is_ascii_digit() || (c == '-' && self.starts_number()) => {
                Ok(Operand::Number {
                    span: self.read_number(),
                })
            }
            Some('(') => Err(ReadError::Unsupported(format!(
                "range literal at byte {start}"
            ))),
            Some(c) if is_ident_start(c) => self.read_property(),
            _ => Err(self.unexpected()),
        }
    }

    fn starts_number(&self) -> bool {
        self.rest()[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn read_number(&mut self) -> Range<usize> {
        let start = self.pos;
        let rest = self.rest();
        let mut len = 0;
        let mut seen_dot = false;
        for (i, c) in rest.char_indices() {
            if c.is_ascii_digit() || (i == 0 && c == '-') {
                len = i + 1;
            } else if c == '.' && !seen_dot && rest[i + 1..].starts_with(|d: char| d.is_ascii_digit())
            {
                seen_dot = true;
                len = i + 1;
            } else {
                break;
            }
        }
        self.pos += len;
        start..self.pos
    }

    /// Quoted string with backslash escapes; a doubled quote continues the
    /// string (`'it''s'`).
    fn read_quoted(&mut self) -> Result<Range<usize>, ReadError> {
        let start = self.pos;
        let bytes = self.source.as_bytes();
        let quote = bytes[start];
        let mut i = start + 1;
        while i < self.end {
            let b = bytes[i];
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == quote {
                if i + 1 < self.end && bytes[i + 1] == quote {
                    i += 2;
                    continue;
                }
                self.pos = i + 1;
                return Ok(start..self.pos);
            }
            i += 1;
        }
        Err(ReadError::syntax(start, "unterminated string"))
    }

    fn read_identifier(&mut self) -> Option<String> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_ident_start(c) => {}
            _ => return None,
        }
        let mut len = rest.len();
        for (i, c) in chars {
            if !is_ident_char(c) {
                len = i;
                break;
            }
        }
        // Liquid permits a trailing `?` on names (`product.available?`).
        if rest[len..].starts_with('?') {
            len += 1;
        }
        self.pos += len;
        Some(rest[..len].to_string())
    }

    fn read_property(&mut self) -> Result<Operand, ReadError> {
        let start = self.pos;
        let root = self.read_identifier().ok_or_else(|| self.unexpected())?;

        let mut props = Vec::new();
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    let name = self.read_identifier().ok_or_else(|| self.unexpected())?;
                    props.push(Prop::Name(name));
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    let prop = match self.peek() {
                        Some('\'' | '"') => {
                            let span = self.read_quoted()?;
                            let content = self.source[span.start + 1..span.end - 1].to_string();
                            Prop::Key { content, span }
                        }
                        Some(c) if c.is_ascii_digit() || c == '-' => {
                            let span = self.read_number();
                            let text = &self.source[span.clone()];
                            let index = text.parse::<i64>().map_err(|_| {
                                ReadError::syntax(span.start, format!("invalid index '{text}'"))
                            })?;
                            Prop::Index(index)
                        }
                        _ => {
                            return Err(ReadError::Unsupported(format!(
                                "dynamic index access at byte {}",
                                self.pos
                            )));
                        }
                    };
                    if !self.eat("]") {
                        return Err(self.unexpected());
                    }
                    props.push(prop);
                }
                _ => break,
            }
        }

        let span = start..self.pos;
        if props.is_empty() {
            let word = match root.as_str() {
                "true" => Some(Keyword::True),
                "false" => Some(Keyword::False),
                "nil" => Some(Keyword::Nil),
                "null" => Some(Keyword::Null),
                "empty" => Some(Keyword::Empty),
                "blank" => Some(Keyword::Blank),
                "not" => {
                    return Err(ReadError::Unsupported(format!(
                        "'not' operator at byte {start}"
                    )));
                }
                _ => None,
            };
            if let Some(word) = word {
                return Ok(Operand::Literal { word, span });
            }
        }

        Ok(Operand::Property { root, props, span })
    }

    fn read_filter(&mut self) -> Result<Filter, ReadError> {
        self.skip_ws();
        let start = self.pos;
        let name = self.read_identifier().ok_or_else(|| self.unexpected())?;
        let mut args = Vec::new();

        if self.eat(":") {
            loop {
                self.skip_ws();
                args.push(self.read_filter_arg()?);
                if !self.eat(",") {
                    break;
                }
            }
        }

        Ok(Filter {
            name,
            args,
            span: start..self.pos,
        })
    }

    fn read_filter_arg(&mut self) -> Result<FilterArg, ReadError> {
        let checkpoint = self.pos;
        if let Some(key) = self.read_identifier() {
            if self.eat(":") {
                let value = self.read_operand()?;
                return Ok(FilterArg::Keyword { key, value });
            }
        }
        self.pos = checkpoint;
        self.read_operand().map(FilterArg::Positional)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn operator_precedence(text: &str) -> u8 {
    match text {
        "and" | "or" => 1,
        _ => 2,
    }
}

/// Shunting-yard; an operator only pops strictly tighter ones, so equal
/// precedence groups right-to-left.
fn to_postfix(infix: Vec<ExprToken>) -> Vec<ExprToken> {
    let mut output = Vec::with_capacity(infix.len());
    let mut ops: Vec<ExprToken> = Vec::new();

    for token in infix {
        match &token {
            ExprToken::Operand(_) => output.push(token),
            ExprToken::Operator { text, .. } => {
                let prec = operator_precedence(text);
                while let Some(ExprToken::Operator { text: top, .. }) = ops.last() {
                    if operator_precedence(top) > prec {
                        output.extend(ops.pop());
                    } else {
                        break;
                    }
                }
                ops.push(token);
            }
        }
    }

    while let Some(op) = ops.pop() {
        output.push(op);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postfix_text(source: &str, expr: &Expression) -> Vec<String> {
        expr.postfix
            .iter()
            .map(|t| match t {
                ExprToken::Operand(op) => source[op.span()].to_string(),
                ExprToken::Operator { text, .. } => text.clone(),
            })
            .collect()
    }

    #[test]
    fn tokenizes_text_outputs_and_tags() {
        let source = "Hello {{ name }}!{% if x %}y{% endif %}";
        let nodes = parse(source).unwrap();
        let kinds: Vec<_> = nodes.iter().map(Node::kind).collect();
        assert_eq!(kinds, vec!["html", "output", "html", "tag"]);
    }

    #[test]
    fn trim_markers() {
        let nodes = parse("{{- x -}}{%- assign y = 1 %}").unwrap();
        match &nodes[0] {
            Node::Output {
                trim_left,
                trim_right,
                ..
            } => assert!(*trim_left && *trim_right),
            other => panic!("expected output, got {other:?}"),
        }
        match &nodes[1] {
            Node::Tag(tag) => {
                assert!(tag.token.trim_left);
                assert!(!tag.token.trim_right);
                assert_eq!(tag.token.name, "assign");
                assert_eq!(tag.token.args, "y = 1");
            }
            other => panic!("expected tag, got {other:?}"),
        }
    }

    #[test]
    fn comparisons_bind_tighter_than_logic() {
        let source = "a >= b and c";
        let expr = parse_expression(source, 0..source.len()).unwrap();
        assert_eq!(postfix_text(source, &expr), vec!["a", "b", ">=", "c", "and"]);
    }

    #[test]
    fn logic_groups_right_to_left() {
        let source = "a and b or c";
        let expr = parse_expression(source, 0..source.len()).unwrap();
        assert_eq!(postfix_text(source, &expr), vec!["a", "b", "c", "or", "and"]);
    }

    #[test]
    fn quoted_delimiters_do_not_close_output() {
        let source = "{{ '}}' }}";
        let nodes = parse(source).unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn doubled_quote_continues_string() {
        let source = "'it''s'";
        let expr = parse_expression(source, 0..source.len()).unwrap();
        assert_eq!(postfix_text(source, &expr), vec!["'it''s'"]);
    }

    #[test]
    fn filters_with_positional_and_keyword_args() {
        let source = "x | truncate: 10, '..' | default: y, allow_false: true";
        let value = parse_value(source, 0..source.len()).unwrap();
        assert_eq!(value.filters.len(), 2);
        assert_eq!(value.filters[0].name, "truncate");
        assert_eq!(value.filters[0].args.len(), 2);
        assert!(matches!(
            &value.filters[1].args[1],
            FilterArg::Keyword { key, .. } if key == "allow_false"
        ));
    }

    #[test]
    fn property_chain_with_index_and_key() {
        let source = "a.b[0][\"c d\"]";
        let expr = parse_expression(source, 0..source.len()).unwrap();
        match &expr.postfix[0] {
            ExprToken::Operand(Operand::Property { root, props, .. }) => {
                assert_eq!(root, "a");
                assert_eq!(props[0], Prop::Name("b".into()));
                assert_eq!(props[1], Prop::Index(0));
                assert!(matches!(&props[2], Prop::Key { content, .. } if content == "c d"));
            }
            other => panic!("expected property, got {other:?}"),
        }
    }

    #[test]
    fn raw_body_is_not_tokenized() {
        let source = "{% raw %}{{ not {% parsed %}{% endraw %}";
        let nodes = parse(source).unwrap();
        match &nodes[0] {
            Node::Tag(Tag {
                body: TagBody::Verbatim { content, .. },
                ..
            }) => assert_eq!(&source[content.clone()], "{{ not {% parsed %}"),
            other => panic!("expected verbatim, got {other:?}"),
        }
    }

    #[test]
    fn if_elsif_else_nesting() {
        let source = "{% if a %}1{% elsif b %}2{% else %}3{% endif %}";
        let nodes = parse(source).unwrap();
        match &nodes[0] {
            Node::Tag(Tag {
                body:
                    TagBody::Branches {
                        branches,
                        else_templates,
                        ..
                    },
                ..
            }) => {
                assert_eq!(branches.len(), 2);
                assert_eq!(else_templates.as_ref().map(Vec::len), Some(1));
            }
            other => panic!("expected branches, got {other:?}"),
        }
    }

    #[test]
    fn case_collects_when_values() {
        let source = "{% case x %} {% when 'a', 'b' %}A{% when 1 or 2 %}B{% else %}C{% endcase %}";
        let nodes = parse(source).unwrap();
        match &nodes[0] {
            Node::Tag(Tag {
                body: TagBody::Case {
                    whens,
                    else_templates,
                    ..
                },
                ..
            }) => {
                assert_eq!(whens.len(), 2);
                assert_eq!(whens[0].values.len(), 2);
                assert_eq!(&source[whens[0].args_span.clone()], "'a', 'b'");
                assert_eq!(whens[1].values.len(), 2);
                assert!(else_templates.is_some());
            }
            other => panic!("expected case, got {other:?}"),
        }
    }

    #[test]
    fn block_keeps_every_tag_token() {
        let source = "{%- for x in xs -%}{{ x }}{% else -%}none{%- endfor %}";
        let nodes = parse(source).unwrap();
        match &nodes[0] {
            Node::Tag(Tag {
                token,
                body: TagBody::Templates { else_tag, .. },
                close,
            }) => {
                assert!(token.trim_left && token.trim_right);
                let else_tag = else_tag.as_ref().unwrap();
                assert!(!else_tag.trim_left && else_tag.trim_right);
                let close = close.as_ref().unwrap();
                assert_eq!(close.name, "endfor");
                assert!(close.trim_left && !close.trim_right);
            }
            other => panic!("expected for block, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_block_is_an_error() {
        let err = parse("{% for x in xs %}body").unwrap_err();
        assert!(err.to_string().contains("'for' not closed"), "{err}");
    }

    #[test]
    fn stray_structural_tag_is_an_error() {
        let err = parse("{% endif %}").unwrap_err();
        assert!(err.to_string().contains("unexpected tag 'endif'"), "{err}");
    }

    #[test]
    fn unknown_tags_are_inline() {
        let nodes = parse("{% tablerow p in ps %}x{% endtablerow %}").unwrap();
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn ranges_are_unsupported() {
        let source = "(1..5)";
        let err = parse_expression(source, 0..source.len()).unwrap_err();
        assert!(matches!(err, ReadError::Unsupported(_)));
    }
}
