//! Minimal template engine hosting custom tags.
//!
//! Templates consist of text, `{{ expression }}` output, `{# comments #}` and
//! `{% tag ... %}` blocks for registered custom tags. There are no built-in
//! control-flow tags; this engine exists to compile and run custom tags.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::context::RenderContext;
use crate::error::{ParseError, RenderError, TemplateError};
use crate::escape::escape;
use crate::expr::{BinaryOp, Expr, ExpressionParser, HostExpressionParser, UnaryOp};
use crate::lexer::{self, Token, TokenKind, TokenStream};
use crate::serialize;
use crate::tag::{self, Body, CallExtension, Tag, TemplateParser};
use crate::tag_parser::TagParser;
use crate::value::{join_values, SafeString, Value};

lazy_static! {
    static ref OPENING: Regex = Regex::new(r"\{\{|\{%|\{#").unwrap();
}

/// Configuration for the environment.
#[derive(Debug, Clone)]
pub struct Options {
    /// Escape the output of `{{ expression }}` unless it is marked safe
    /// (default: true)
    pub autoescape: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { autoescape: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Expr),
    Call(CallExtension<Vec<Node>>),
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

/// Registry of custom tags; compiles and renders templates.
pub struct Environment {
    tags: HashMap<String, Rc<dyn Tag>>,
    options: Options,
    expressions: HostExpressionParser,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            tags: HashMap::new(),
            options,
            expressions: HostExpressionParser,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Register a tag under its `tag_name`, replacing any previous tag of
    /// that name.
    pub fn add_extension(&mut self, tag: impl Tag + 'static) {
        let name = tag.definition().tag_name.clone();
        self.tags.insert(name, Rc::new(tag));
    }

    pub fn get_extension(&self, name: &str) -> Option<&dyn Tag> {
        self.tags.get(name).map(|tag| tag.as_ref())
    }

    pub fn compile(&self, source: &str) -> Result<Template, ParseError> {
        let mut parser = BlockParser {
            env: self,
            segments: split_segments(source).into_iter(),
            tokens: TokenStream::new(Vec::new()),
        };
        let nodes = parser.parse_nodes(None)?;
        Ok(Template { nodes })
    }

    pub fn render(&self, template: &Template, ctx: &mut RenderContext) -> Result<String, RenderError> {
        self.render_nodes(&template.nodes, ctx)
    }

    pub fn render_str(&self, source: &str, ctx: &mut RenderContext) -> Result<String, TemplateError> {
        let template = self.compile(source)?;
        Ok(self.render(&template, ctx)?)
    }

    /// Parse an attribute list (the text after a tag name), evaluate it and
    /// serialize it, e.g. `class="a" data-id=id "checked"` to
    /// `checked class="a" data-id="7"`.
    pub fn render_attributes(&self, source: &str, ctx: &RenderContext) -> Result<String, TemplateError> {
        let mut tokens = lexer::tokenize(source)?;
        let args = TagParser::parse_attributes(&mut tokens, &self.expressions)?.into_args();
        let attrs = self.evaluate_all(&args, ctx)?;
        Ok(serialize::convert_attrs(&attrs))
    }

    pub fn evaluate(&self, expr: &Expr, ctx: &RenderContext) -> Result<Value, RenderError> {
        let value = match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Symbol(name) => ctx.lookup(name),
            Expr::Lookup { target, key } => {
                member_lookup(&self.evaluate(target, ctx)?, &self.evaluate(key, ctx)?)
            }
            Expr::Array(items) => Value::Array(self.evaluate_all(items, ctx)?),
            Expr::Object(entries) => Value::Object(
                self.evaluate_entries(entries.iter().map(|(key, value)| (key, value)), ctx)?,
            ),
            Expr::KeywordArgs(entries) => Value::Keywords(self.evaluate_entries(entries.iter(), ctx)?),
            Expr::Unary { op, operand } => {
                let operand = self.evaluate(operand, ctx)?;
                match op {
                    UnaryOp::Not => Value::Bool(!operand.is_truthy()),
                    UnaryOp::Neg => Value::Number(-operand.to_number()),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.evaluate(left, ctx)?;
                // short-circuit
                match op {
                    BinaryOp::And if !left.is_truthy() => left,
                    BinaryOp::Or if left.is_truthy() => left,
                    _ => binary_op(*op, left, self.evaluate(right, ctx)?),
                }
            }
            Expr::Filter { name, target, args } => {
                let target = self.evaluate(target, ctx)?;
                let args = self.evaluate_all(args, ctx)?;
                apply_filter(name, target, &args)?
            }
        };
        Ok(value)
    }

    fn evaluate_all(&self, exprs: &[Expr], ctx: &RenderContext) -> Result<Vec<Value>, RenderError> {
        exprs.iter().map(|expr| self.evaluate(expr, ctx)).collect()
    }

    fn evaluate_entries<'a>(
        &self,
        entries: impl Iterator<Item = (&'a String, &'a Expr)>,
        ctx: &RenderContext,
    ) -> Result<IndexMap<String, Value>, RenderError> {
        let mut map = IndexMap::new();
        for (key, value) in entries {
            map.insert(key.clone(), self.evaluate(value, ctx)?);
        }
        Ok(map)
    }

    fn render_nodes(&self, nodes: &[Node], ctx: &mut RenderContext) -> Result<String, RenderError> {
        let mut out = String::new();
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => {
                    let value = self.evaluate(expr, ctx)?;
                    out.push_str(&self.suppress_value(&value));
                }
                Node::Call(call) => out.push_str(self.render_call(call, ctx)?.as_str()),
            }
        }
        Ok(out)
    }

    fn render_call(
        &self,
        call: &CallExtension<Vec<Node>>,
        ctx: &mut RenderContext,
    ) -> Result<SafeString, RenderError> {
        let extension = self
            .tags
            .get(&call.tag_name)
            .ok_or_else(|| RenderError::UnknownTag(call.tag_name.clone()))?;
        let attrs = self.evaluate_all(&call.args, ctx)?;
        let body = match &call.body {
            Some(nodes) => Body::deferred(move |ctx| self.render_nodes(nodes, ctx)),
            None => Body::Empty,
        };
        tag::run(extension.as_ref(), ctx, &attrs, body)
    }

    fn suppress_value(&self, value: &Value) -> String {
        match value {
            Value::Undefined | Value::Null => String::new(),
            Value::Safe(html) => html.to_string(),
            other if self.options.autoescape => escape(&other.to_string()),
            other => other.to_string(),
        }
    }
}

enum Segment<'s> {
    Text(&'s str),
    Output { source: &'s str, origin: (usize, usize) },
    Block { source: &'s str, origin: (usize, usize) },
}

fn split_segments(source: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;

    while let Some(open) = OPENING.find_at(source, last) {
        let start = open.end();
        let (closer, in_code) = match open.as_str() {
            "{{" => ("}}", true),
            "{%" => ("%}", true),
            _ => ("#}", false),
        };
        let end = if in_code {
            find_closer(source, start, closer)
        } else {
            source[start..].find(closer).map(|i| start + i)
        };
        // an opening without closer stays text
        let Some(end) = end else { break };

        if open.start() > last {
            segments.push(Segment::Text(&source[last..open.start()]));
        }
        let inner = &source[start..end];
        let origin = line_col(source, start);
        match open.as_str() {
            "{{" => segments.push(Segment::Output { source: inner, origin }),
            "{%" => segments.push(Segment::Block { source: inner, origin }),
            // comments produce nothing
            _ => {}
        }
        last = end + closer.len();
    }

    if last < source.len() {
        segments.push(Segment::Text(&source[last..]));
    }
    segments
}

/// Offset of the first `closer` after `from` that is not inside a string
/// literal. If a string is never terminated, the first `closer` at all.
fn find_closer(source: &str, from: usize, closer: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut quote = None;
    let mut i = from;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => {
                i += 2;
                continue;
            }
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if bytes[i..].starts_with(closer.as_bytes()) => return Some(i),
            None => {}
        }
        i += 1;
    }

    source[from..].find(closer).map(|i| from + i)
}

fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let col = before
        .rsplit('\n')
        .next()
        .map(|current| current.chars().count())
        .unwrap_or(0)
        + 1;
    (line, col)
}

struct BlockParser<'e, 's> {
    env: &'e Environment,
    segments: std::vec::IntoIter<Segment<'s>>,
    /// Tokens of the block being parsed
    tokens: TokenStream,
}

impl BlockParser<'_, '_> {
    fn parse_nodes(&mut self, until: Option<&str>) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();

        while let Some(segment) = self.segments.next() {
            match segment {
                Segment::Text(text) => nodes.push(Node::Text(text.to_string())),
                Segment::Output { source, origin } => {
                    let mut tokens = lexer::tokenize_at(source, origin)?;
                    let expr = self.env.expressions.parse_expression(&mut tokens)?;
                    if !tokens.at_block_end() {
                        return Err(ParseError::unexpected(tokens.peek()));
                    }
                    nodes.push(Node::Output(expr));
                }
                Segment::Block { source, origin } => {
                    self.tokens = lexer::tokenize_at(source, origin)?;
                    let name = self.tokens.peek().clone();
                    if name.kind != TokenKind::Symbol {
                        return Err(ParseError::unexpected(&name));
                    }
                    if until == Some(name.value.as_str()) {
                        return Ok(nodes);
                    }

                    let extension = self.env.tags.get(&name.value).cloned().ok_or_else(|| {
                        let (line, col) = name.line_col;
                        ParseError::UnknownTag {
                            name: name.value.clone(),
                            line,
                            col,
                        }
                    })?;
                    let call = tag::parse(extension.definition(), self)?;
                    tracing::debug!(tag = %call.tag_name, args = call.args.len(), "compiled tag");
                    nodes.push(Node::Call(call));
                }
            }
        }

        match until {
            Some(end) => Err(ParseError::UnclosedTag {
                expected: end.to_string(),
            }),
            None => Ok(nodes),
        }
    }
}

impl TemplateParser for BlockParser<'_, '_> {
    type Body = Vec<Node>;

    fn next_token(&mut self) -> Token {
        self.tokens.next_token()
    }

    fn parse_attributes(&mut self) -> Result<Vec<Expr>, ParseError> {
        let list = TagParser::parse_attributes(&mut self.tokens, &self.env.expressions)?;
        Ok(list.into_args())
    }

    fn parse_signature(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.env.expressions.parse_signature(&mut self.tokens)
    }

    fn advance_after_block_end(&mut self, name: Option<&str>) -> Result<(), ParseError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let token = self.tokens.next_token();
                if token.kind != TokenKind::Symbol {
                    return Err(ParseError::unexpected(&token));
                }
                token.value
            }
        };

        if self.tokens.at_block_end() {
            Ok(())
        } else {
            let (line, col) = self.tokens.peek().line_col;
            Err(ParseError::ExpectedBlockEnd { name, line, col })
        }
    }

    fn parse_until_blocks(&mut self, end: &str) -> Result<Vec<Node>, ParseError> {
        self.parse_nodes(Some(end))
    }
}

fn member_lookup(target: &Value, key: &Value) -> Value {
    match target {
        Value::Object(map) | Value::Keywords(map) => {
            map.get(&key.to_string()).cloned().unwrap_or_default()
        }
        Value::Array(items) => match key {
            Value::Number(n) => as_index(*n)
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or_default(),
            _ if key.as_str() == Some("length") => Value::from(items.len()),
            _ => Value::Undefined,
        },
        Value::String(_) | Value::Safe(_) => {
            let text = target.as_str().unwrap_or_default();
            match key {
                Value::Number(n) => as_index(*n)
                    .and_then(|i| text.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or_default(),
                _ if key.as_str() == Some("length") => Value::from(text.chars().count()),
                _ => Value::Undefined,
            }
        }
        _ => Value::Undefined,
    }
}

fn as_index(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 {
        Some(n as usize)
    } else {
        None
    }
}

fn binary_op(op: BinaryOp, left: Value, right: Value) -> Value {
    match op {
        BinaryOp::And => {
            if left.is_truthy() {
                right
            } else {
                left
            }
        }
        BinaryOp::Or => {
            if left.is_truthy() {
                left
            } else {
                right
            }
        }
        BinaryOp::Eq => Value::Bool(loose_eq(&left, &right)),
        BinaryOp::Ne => Value::Bool(!loose_eq(&left, &right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = match (left.as_str(), right.as_str()) {
                (Some(a), Some(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_some_and(|o| o.is_lt()),
                BinaryOp::Gt => ordering.is_some_and(|o| o.is_gt()),
                BinaryOp::Le => ordering.is_some_and(|o| o.is_le()),
                _ => ordering.is_some_and(|o| o.is_ge()),
            })
        }
        BinaryOp::Add if is_string_like(&left) || is_string_like(&right) => {
            Value::String(format!("{}{}", left, right))
        }
        BinaryOp::Add => Value::Number(left.to_number() + right.to_number()),
        BinaryOp::Concat => Value::String(format!("{}{}", left, right)),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
    }
}

// Anything that converts to a string rather than a number when added
fn is_string_like(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Safe(_) | Value::Array(_) | Value::Object(_) | Value::Keywords(_)
    )
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Array(_) | Value::Object(_) | Value::Keywords(_), _)
        | (_, Value::Array(_) | Value::Object(_) | Value::Keywords(_)) => false,
        _ => match (left.as_str(), right.as_str()) {
            (Some(a), Some(b)) => a == b,
            _ => left.to_number() == right.to_number(),
        },
    }
}

fn apply_filter(name: &str, target: Value, args: &[Value]) -> Result<Value, RenderError> {
    let value = match name {
        "safe" => match target {
            Value::String(s) => Value::Safe(SafeString::new(s)),
            other => other,
        },
        "escape" | "e" => match target {
            Value::Safe(_) => target,
            Value::Undefined | Value::Null => Value::Safe(SafeString::default()),
            other => Value::Safe(SafeString::new(escape(&other.to_string()))),
        },
        "join" => {
            let separator = args.first().map(Value::to_string).unwrap_or_default();
            match &target {
                Value::Array(items) => Value::String(join_values(items, &separator)),
                _ => target,
            }
        }
        "first" => match &target {
            Value::Array(items) => items.first().cloned().unwrap_or_default(),
            _ => target
                .as_str()
                .and_then(|s| s.chars().next())
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default(),
        },
        "last" => match &target {
            Value::Array(items) => items.last().cloned().unwrap_or_default(),
            _ => target
                .as_str()
                .and_then(|s| s.chars().last())
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default(),
        },
        "length" => Value::from(match &target {
            Value::Array(items) => items.len(),
            Value::Object(map) | Value::Keywords(map) => map.len(),
            _ => target.as_str().map(|s| s.chars().count()).unwrap_or(0),
        }),
        "upper" => map_text(target, |s| s.to_uppercase()),
        "lower" => map_text(target, |s| s.to_lowercase()),
        "default" | "d" => match target {
            Value::Undefined => args.first().cloned().unwrap_or_default(),
            other => other,
        },
        _ => return Err(RenderError::UnknownFilter(name.to_string())),
    };
    Ok(value)
}

/// Transform the text of a value, keeping it safe if it was.
fn map_text(target: Value, f: impl Fn(&str) -> String) -> Value {
    match target {
        Value::Safe(html) => Value::Safe(SafeString::new(f(html.as_str()))),
        Value::Undefined | Value::Null => Value::String(String::new()),
        other => Value::String(f(&other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagDefinition;

    fn locals() -> RenderContext {
        let mut deep = IndexMap::new();
        deep.insert("foo".to_string(), Value::from("foo"));
        let mut foo = IndexMap::new();
        foo.insert("bar".to_string(), Value::from("bar"));

        let mut ctx: RenderContext = [
            ("attr1", Value::from("some_attr")),
            ("attr2", Value::from("a2")),
            ("attr3", Value::from(3)),
            ("content", Value::from("this is content")),
            ("undefinedVar", Value::Undefined),
            ("nullVar", Value::Null),
            ("bool", Value::from(true)),
            ("space", Value::from("a b")),
            ("clz", Value::from("test")),
            ("href", Value::from("http://scrat.io")),
            (
                "html",
                Value::from(r#"<img src="http://placehold.it/350x150" onload="alert(1);">"#),
            ),
            ("img", Value::from(r#"<img src="'">"#)),
            ("jsonStr", Value::from(r#"{"a":"b"}"#)),
        ]
        .into_iter()
        .collect();
        ctx.set("deep", deep);
        ctx.set("foo", foo);
        ctx
    }

    fn env() -> Environment {
        let mut env = Environment::new();
        env.add_extension(TagDefinition::new("test").with_end(false));
        env.add_extension(TagDefinition::new("custom"));
        env
    }

    fn render(template: &str) -> String {
        env().render_str(template, &mut locals()).unwrap()
    }

    fn render_err(template: &str) -> TemplateError {
        env().render_str(template, &mut locals()).unwrap_err()
    }

    #[test]
    fn test_parse_cases() {
        let cases = [
            ("11", ""),
            ("12", ""),
            (r#"class="test""#, r#"class="test""#),
            (r#"class="test" count=1"#, r#"class="test" count="1""#),
            (r#"class="test" style="test""#, r#"class="test" style="test""#),
            ("class=clz", r#"class="test""#),
            ("class=foo.bar", r#"class="bar""#),
            ("data-attr=clz", r#"data-attr="test""#),
            (r#""data-attr"=clz"#, r#"data-attr="test""#),
            (r#""data-attr-1-a"=clz"#, r#"data-attr-1-a="test""#),
            (r#""checked""#, "checked"),
            (r#"class=["test1", clz]"#, r#"class="[object Array]""#),
            (r#"class=["test1"], style=clz"#, r#"class="[object Array]" style="test""#),
            (
                r#"class=["test1"] style=clz "checked""#,
                r#"checked class="[object Array]" style="test""#,
            ),
            ("class={}", r#"class="[object Object]""#),
            (r#"class=[clz, "a"]"#, r#"class="[object Array]""#),
            (
                r#"class="<script>alert(1)</script>""#,
                r#"class="&lt;script&gt;alert(1)&lt;/script&gt;""#,
            ),
            (r#"class="<""#, r#"class="&lt;""#),
            (r#""<""#, "&lt;"),
            (r#"class=">""#, r#"class="&gt;""#),
            (r#"class="&""#, r#"class="&amp;""#),
            (r#"class="'""#, r#"class="&#39;""#),
            ("class=jsonStr", r#"class="{&quot;a&quot;:&quot;b&quot;}""#),
            ("class=img", r#"class="&lt;img src=&quot;&#39;&quot;&gt;""#),
            (r#"clz + "_"+foo.bar"#, "test_bar"),
        ];

        for (attrs, expected) in cases {
            let html = if expected.is_empty() {
                "<test>".to_string()
            } else {
                format!("<test {}>", expected)
            };
            assert_eq!(render(&format!("{{% test {} %}}", attrs)), html, "attrs: {}", attrs);
        }
    }

    #[test]
    fn test_single_attrs() {
        assert_eq!(
            render("{% test not-number undefinedVar nullVar 123 0 bool space%}"),
            "<test>"
        );
        assert_eq!(render(r#"{% test attr1 "attr2" %}"#), "<test some_attr attr2>");
    }

    #[test]
    fn test_key_value_attrs() {
        assert_eq!(
            render(r#"{% test attr1=attr1 attr2="attr2" attr3=attr3 %}"#),
            r#"<test attr1="some_attr" attr2="attr2" attr3="3">"#
        );
        assert_eq!(
            render("{% test attr1=bool attr2=undefinedVar attr3=nullVar %}"),
            r#"<test attr1="true">"#
        );
        assert_eq!(
            render(r#"{% test style=[attr1, "attr2"] %}"#),
            r#"<test style="[object Array]">"#
        );
        assert_eq!(
            render(r#"{% test style=[attr1, "attr2"]|join(" ") %}"#),
            r#"<test style="some_attr attr2">"#
        );
        assert_eq!(
            render("{% test class={attr1: true, attr2: false, attr3: bool } %}"),
            r#"<test class="[object Object]">"#
        );
    }

    #[test]
    fn test_key_value_array_with_quote() {
        let mut ctx = locals();
        ctx.set("attr1", "\"");
        assert_eq!(
            env()
                .render_str(r#"{% test style=[attr1, "attr2"] %}"#, &mut ctx)
                .unwrap(),
            r#"<test style="[object Array]">"#
        );
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        assert_eq!(
            render(r#"{% test a="1" b="2" a="3" %}"#),
            r#"<test a="3" b="2">"#
        );
    }

    #[test]
    fn test_escape() {
        assert_eq!(render(r#"{{ "<a"|first|safe == "<" }}"#), "true");
        assert_eq!(render(r#"{% test "<div" %}"#), "<test &lt;div>");
        assert_eq!(render(r#"{% test "<div"|safe %}"#), "<test>");
        assert_eq!(render(r#"{% test attr="<div"|safe %}"#), r#"<test attr="<div">"#);
        assert_eq!(
            render("{% test attr=html href=href json=jsonStr %}"),
            r#"<test attr="&lt;img src=&quot;http://placehold.it/350x150&quot; onload=&quot;alert(1);&quot;&gt;" href="http://scrat.io" json="{&quot;a&quot;:&quot;b&quot;}">"#
        );
    }

    #[test]
    fn test_errors() {
        let err = render_err(r#"{% test <script>="as" %}"#);
        assert!(err.to_string().contains("unexpected token"), "{}", err);

        let err = render_err(r#"{% test data-src-="as" %}"#);
        assert!(err.to_string().contains("unexpected token"), "{}", err);

        let err = render_err(r#"{% test a-"f"="a" %}"#);
        assert!(err.to_string().contains("invalid key name"), "{}", err);
    }

    #[test]
    fn test_unknown_characters_are_unexpected_tokens() {
        let err = render_err(r#"{% test @click="x" %}"#);
        assert!(matches!(
            err,
            TemplateError::Parse(ParseError::UnexpectedToken { ref token, line: 1, col: 9 }) if token == "@"
        ));

        let err = render_err("<p>\n  {% test $x %}");
        assert_eq!(err.to_string(), "unexpected token $ at line 2, column 11");
    }

    #[test]
    fn test_closing_delimiters_inside_strings() {
        assert_eq!(render(r#"{% test title="100%}" %}"#), r#"<test title="100%}">"#);
        assert_eq!(render(r#"{% test title='it\'s %}' %}x"#), r#"<test title="it&#39;s %}">x"#);
        assert_eq!(render(r#"{{ "a}}b" }}"#), "a}}b");
        assert_eq!(render("{# a %} #}{{ clz }}"), "test");
        // no closer at all
        assert_eq!(render("a {% b"), "a {% b");
    }

    #[test]
    fn test_error_positions_point_into_template() {
        let err = render_err("<p>\n  {% test <script> %}");
        assert_eq!(err.to_string(), "unexpected token < at line 2, column 11");
    }

    #[test]
    fn test_unknown_and_unclosed_tags() {
        assert!(env().get_extension("custom").is_some());
        assert!(env().get_extension("nope").is_none());

        let err = render_err("{% nope %}");
        assert!(matches!(
            err,
            TemplateError::Parse(ParseError::UnknownTag { ref name, .. }) if name == "nope"
        ));

        let err = render_err("{% custom %}body");
        assert_eq!(err.to_string(), "unclosed tag, expected {% endcustom %}");

        let err = render_err("{% custom %}{% endcustom extra %}");
        assert!(matches!(
            err,
            TemplateError::Parse(ParseError::ExpectedBlockEnd { ref name, .. }) if name == "endcustom"
        ));
    }

    #[test]
    fn test_unknown_filter() {
        let err = render_err("{{ clz|shout }}");
        assert!(matches!(
            err,
            TemplateError::Render(RenderError::UnknownFilter(ref name)) if name == "shout"
        ));
    }

    #[test]
    fn test_nested_same_tag() {
        assert_eq!(
            render(r#"{% custom a="1" %}{% custom a="2" %}x{% endcustom %}{% endcustom %}"#),
            r#"<custom a="1"><custom a="2">x</custom></custom>"#
        );
    }

    #[test]
    fn test_output_escaping() {
        assert_eq!(render("{{ html }}"), "&lt;img src=&quot;http://placehold.it/350x150&quot; onload=&quot;alert(1);&quot;&gt;");
        assert_eq!(render("{{ html|safe }}"), r#"<img src="http://placehold.it/350x150" onload="alert(1);">"#);
        assert_eq!(render("{{ undefinedVar }}{{ nullVar }}"), "");
        assert_eq!(render("{# note #}{{ deep.foo }}"), "foo");

        let env = Environment::with_options(Options { autoescape: false });
        assert!(!env.options().autoescape);
        assert_eq!(env.render_str("{{ img }}", &mut locals()).unwrap(), r#"<img src="'">"#);
    }

    #[test]
    fn test_tag_output_is_not_escaped_again() {
        assert_eq!(
            render(r#"{% custom title=img %}{{ img }}{% endcustom %}"#),
            r#"<custom title="&lt;img src=&quot;&#39;&quot;&gt;">&lt;img src=&quot;&#39;&quot;&gt;</custom>"#
        );
    }

    #[test]
    fn test_expressions() {
        assert_eq!(render("{{ attr3 + 1 }}"), "4");
        assert_eq!(render(r#"{{ attr3 + "1" }}"#), "31");
        assert_eq!(render(r#"{{ clz ~ 1 }}"#), "test1");
        assert_eq!(render("{{ attr3 * 2 - 1 }}"), "5");
        assert_eq!(render("{{ attr3 > 2 and clz }}"), "test");
        assert_eq!(render("{{ undefinedVar or clz }}"), "test");
        assert_eq!(render("{{ not bool }}"), "false");
        assert_eq!(render("{{ undefinedVar.foo }}"), "");
        assert_eq!(render(r#"{{ deep["foo"] }}"#), "foo");
        assert_eq!(render("{{ [1, 2, 3][1] }}"), "2");
        assert_eq!(render("{{ clz.length }}"), "4");
    }

    #[test]
    fn test_filters() {
        assert_eq!(render(r#"{{ ["a", "b"]|join(", ") }}"#), "a, b");
        assert_eq!(render(r#"{{ ["a", "b"]|last }}"#), "b");
        assert_eq!(render(r#"{{ ["a", "b"]|length }}"#), "2");
        assert_eq!(render("{{ clz|upper }}"), "TEST");
        assert_eq!(render(r#"{{ "ABC"|lower }}"#), "abc");
        assert_eq!(render(r#"{{ undefinedVar|default("none") }}"#), "none");
        assert_eq!(render(r#"{{ nullVar|d("x") }}"#), "");
        assert_eq!(render("{{ img|escape|safe }}"), "&lt;img src=&quot;&#39;&quot;&gt;");
        assert_eq!(render("{{ img|e|e }}"), "&lt;img src=&quot;&#39;&quot;&gt;");
    }

    #[test]
    fn test_render_attributes() {
        let env = env();
        let ctx = locals();
        assert_eq!(
            env.render_attributes(r#"data-attr1=attr1 "readonly""#, &ctx).unwrap(),
            r#"readonly data-attr1="some_attr""#
        );
        assert_eq!(env.render_attributes("", &ctx).unwrap(), "");
    }

    #[test]
    fn test_compile_once_render_many() {
        let env = env();
        let template = env.compile("{% test class=clz %}").unwrap();
        let mut first: RenderContext = [("clz", "a")].into_iter().collect();
        let mut second: RenderContext = [("clz", "b")].into_iter().collect();
        assert_eq!(env.render(&template, &mut first).unwrap(), r#"<test class="a">"#);
        assert_eq!(env.render(&template, &mut second).unwrap(), r#"<test class="b">"#);
    }

    #[test]
    fn test_compiled_nodes() {
        let template = env().compile("a{% test x=1 %}{{ b }}").unwrap();
        let mut keywords = IndexMap::new();
        keywords.insert("x".to_string(), Expr::number(1.0));
        assert_eq!(
            template.nodes(),
            &[
                Node::Text("a".to_string()),
                Node::Call(CallExtension {
                    tag_name: "test".to_string(),
                    args: vec![Expr::KeywordArgs(keywords)],
                    body: None,
                }),
                Node::Output(Expr::symbol("b")),
            ]
        );
    }
}
