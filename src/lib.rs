//! Custom template tags that render HTML elements.
//!
//! A tag is written like an HTML element inside a template block:
//!
//! ```text
//! {% button "disabled" class=["btn", kind] data-id=id %}Save{% endbutton %}
//! ```
//!
//! Attributes are parsed by [`TagParser`], evaluated by the host engine and
//! serialized back to HTML attributes by [`convert_attrs`]. [`Environment`] is
//! a small engine that hosts such tags.

pub mod context;
pub mod env;
pub mod error;
pub mod escape;
pub mod expr;
pub mod lexer;
pub mod serialize;
pub mod tag;
pub mod tag_parser;
pub mod value;

#[cfg(feature = "python")]
mod python;

pub use context::RenderContext;
pub use env::{Environment, Options, Template};
pub use error::{ParseError, RenderError, TemplateError};
pub use escape::{escape, escape_attr};
pub use expr::{Expr, ExpressionParser, HostExpressionParser};
pub use serialize::convert_attrs;
pub use tag::{render_element, run, Body, CallExtension, Tag, TagDefinition, TemplateParser};
pub use tag_parser::{AttributeEntry, ParsedAttributeList, TagParser};
pub use value::{SafeString, Value};
