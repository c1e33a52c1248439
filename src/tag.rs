//! Custom tags: parse-time node construction and render-time HTML output.
//!
//! A tag is parsed once per occurrence into a [`CallExtension`], then run on
//! every render through [`run`], which calls [`Tag::render`]. The default
//! render is [`render_element`]; implementations override `render` and call
//! `render_element` with transformed attributes or body:
//!
//! ```
//! use attr_tag::{render_element, Body, RenderContext, RenderError, Tag, TagDefinition, Value};
//!
//! struct Card(TagDefinition);
//!
//! impl Tag for Card {
//!     fn definition(&self) -> &TagDefinition {
//!         &self.0
//!     }
//!
//!     fn render(&self, ctx: &mut RenderContext, attrs: &[Value], body: Body<'_>) -> Result<String, RenderError> {
//!         let inner = body.render(ctx)?;
//!         render_element(self, ctx, attrs, Body::from(format!("<div class=\"card-body\">{}</div>", inner)))
//!     }
//! }
//! ```

use std::fmt;

use crate::context::RenderContext;
use crate::error::{ParseError, RenderError};
use crate::escape;
use crate::expr::Expr;
use crate::lexer::Token;
use crate::serialize;
use crate::value::{SafeString, Value};

/// Configuration of a custom tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDefinition {
    /// Name used in templates, `{% tag_name %}`
    pub tag_name: String,
    /// Name of the output HTML element, defaults to `tag_name`
    pub node_name: String,
    /// Whether the tag has a body and an `{% end<tag_name> %}`. Default `true`.
    pub end: bool,
    /// Whether attributes are parsed with the HTML-like attribute grammar
    /// (optional commas, hyphenated and quoted keys). Default `true`.
    /// When `false` the engine's own signature syntax is used.
    pub use_custom_parser: bool,
}

impl TagDefinition {
    pub fn new(tag_name: impl Into<String>) -> Self {
        let tag_name = tag_name.into();
        assert!(!tag_name.is_empty(), "tag_name must not be empty");
        Self {
            node_name: tag_name.clone(),
            tag_name,
            end: true,
            use_custom_parser: true,
        }
    }

    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn with_end(mut self, end: bool) -> Self {
        self.end = end;
        self
    }

    pub fn with_custom_parser(mut self, use_custom_parser: bool) -> Self {
        self.use_custom_parser = use_custom_parser;
        self
    }
}

/// Content between a tag and its end tag.
pub enum Body<'a> {
    /// No body, e.g. for tags without end tag
    Empty,
    /// Already rendered content
    Text(String),
    /// Content rendered on demand, at most once
    Deferred(Box<dyn FnOnce(&mut RenderContext) -> Result<String, RenderError> + 'a>),
}

impl<'a> Body<'a> {
    pub fn deferred(
        render: impl FnOnce(&mut RenderContext) -> Result<String, RenderError> + 'a,
    ) -> Self {
        Body::Deferred(Box::new(render))
    }

    pub fn render(self, ctx: &mut RenderContext) -> Result<String, RenderError> {
        match self {
            Body::Empty => Ok(String::new()),
            Body::Text(text) => Ok(text),
            Body::Deferred(render) => render(ctx),
        }
    }
}

impl fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<String> for Body<'_> {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body<'_> {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<SafeString> for Body<'_> {
    fn from(html: SafeString) -> Self {
        Body::Text(html.into_string())
    }
}

pub trait Tag {
    fn definition(&self) -> &TagDefinition;

    /// Render the tag.
    ///
    /// `attrs` holds the evaluated positional attributes followed by the
    /// keyword map, e.g. `["checked", "readonly", {class: ["a"], alt: "bb"}]`.
    fn render(
        &self,
        ctx: &mut RenderContext,
        attrs: &[Value],
        body: Body<'_>,
    ) -> Result<String, RenderError> {
        render_element(self, ctx, attrs, body)
    }

    /// Attribute list to HTML attribute string, see [`serialize::convert_attrs`].
    fn convert_attrs(&self, attrs: &[Value]) -> String {
        serialize::convert_attrs(attrs)
    }

    fn escape(&self, text: &str) -> String {
        escape::escape(text)
    }

    fn escape_attr(&self, value: &Value) -> Value {
        escape::escape_attr(value)
    }

    fn safe(&self, html: String) -> SafeString {
        SafeString::new(html)
    }
}

impl Tag for TagDefinition {
    fn definition(&self) -> &TagDefinition {
        self
    }
}

/// Default rendering: `<node_name attrs>body</node_name>`, or only the
/// opening tag when the tag has no end tag (the body is then never rendered).
pub fn render_element<T: Tag + ?Sized>(
    tag: &T,
    ctx: &mut RenderContext,
    attrs: &[Value],
    body: Body<'_>,
) -> Result<String, RenderError> {
    let definition = tag.definition();
    let attr_str = tag.convert_attrs(attrs);
    let start_tag = if attr_str.is_empty() {
        format!("<{}>", definition.node_name)
    } else {
        format!("<{} {}>", definition.node_name, attr_str)
    };

    if definition.end {
        let fragment = body.render(ctx)?;
        Ok(format!("{}{}</{}>", start_tag, fragment, definition.node_name))
    } else {
        Ok(start_tag)
    }
}

/// Render entry point called by the engine with evaluated arguments.
/// The output is marked safe so the engine doesn't escape it again.
pub fn run(
    tag: &dyn Tag,
    ctx: &mut RenderContext,
    attrs: &[Value],
    body: Body<'_>,
) -> Result<SafeString, RenderError> {
    let html = tag.render(ctx, attrs, body)?;
    Ok(tag.safe(html))
}

/// Deferred call to a tag, produced at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExtension<B> {
    pub tag_name: String,
    /// Positional attribute expressions, then the keyword map
    pub args: Vec<Expr>,
    pub body: Option<B>,
}

/// The template engine's parser, as seen by a tag at compile time. Every
/// method works on the block currently being parsed.
pub trait TemplateParser {
    type Body;

    fn next_token(&mut self) -> Token;

    /// Attribute grammar of [`crate::tag_parser::TagParser`], merged into call
    /// arguments.
    fn parse_attributes(&mut self) -> Result<Vec<Expr>, ParseError>;

    /// The engine's own argument syntax.
    fn parse_signature(&mut self) -> Result<Vec<Expr>, ParseError>;

    /// Expect the end of the current block. Without `name`, the next token is
    /// consumed as the name of an end tag first.
    fn advance_after_block_end(&mut self, name: Option<&str>) -> Result<(), ParseError>;

    /// Parse template content up to the block named `end`.
    fn parse_until_blocks(&mut self, end: &str) -> Result<Self::Body, ParseError>;
}

/// Parse one occurrence of a tag: name, attributes, and body up to the
/// matching end tag.
pub fn parse<P: TemplateParser + ?Sized>(
    definition: &TagDefinition,
    parser: &mut P,
) -> Result<CallExtension<P::Body>, ParseError> {
    // the tag name token
    let token = parser.next_token();

    let args = if definition.use_custom_parser {
        parser.parse_attributes()?
    } else {
        parser.parse_signature()?
    };
    parser.advance_after_block_end(Some(&token.value))?;

    let body = if definition.end {
        let body = parser.parse_until_blocks(&format!("end{}", token.value))?;
        parser.advance_after_block_end(None)?;
        Some(body)
    } else {
        None
    };

    Ok(CallExtension {
        tag_name: token.value,
        args,
        body,
    })
}
