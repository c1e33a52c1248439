//! # Tag Attribute Parser
//!
//! Parses the attribute list of a custom tag, e.g.
//! `{% custom class="btn" data-id=item.id "checked", disabled %}`, on top of the
//! template engine's own expression parser.
//!
//! ## Rules
//!
//! - **Optional commas**: attributes may be separated by whitespace, commas, or both
//! - **Keys**: either a string literal (`"data-key"=value`, any content) or a bare
//!   word with hyphens (`data-key=value`, matching `identifier('-'identifier)*`)
//! - **Values**: any expression of the engine, incl. filter chains and literals
//! - **Positional attributes**: string literals or expressions that don't start
//!   with a hyphenated word, e.g. `"checked"`, `attr1`, `clz + "_" + foo.bar`
//! - **Keyword merging**: all `key=value` pairs end up in one trailing
//!   [`Expr::KeywordArgs`]; a repeated key keeps its first position and its last value
//!
//! ## Error Handling
//!
//! - `unexpected token`: a token that can't start an attribute (`<script>="as"`),
//!   or a hyphen right before `=` (`data-src-="as"`)
//! - `invalid key name`: a string glued into a key (`a-"f"="a"`, `"a""b"=1`)
//! - characters outside the expression syntax (`@click`, `;`) are unexpected tokens

use indexmap::IndexMap;

use crate::error::ParseError;
use crate::expr::{ExpressionParser, Expr};
use crate::lexer::{Token, TokenKind, TokenStream};

pub struct TagParser;

/// One attribute of a tag, as written.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeEntry {
    /// Attribute without key, e.g. `"checked"` or `my_var|filter`
    Positional(Expr),
    /// `key=value`, e.g. `data-id=item.id` or `"data-id"=item.id`
    KeyValue { key: String, value: Expr },
}

/// The attributes of one tag occurrence, in order of appearance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedAttributeList {
    pub entries: Vec<AttributeEntry>,
}

impl ParsedAttributeList {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn positional(&self) -> impl Iterator<Item = &Expr> {
        self.entries.iter().filter_map(|entry| match entry {
            AttributeEntry::Positional(expr) => Some(expr),
            AttributeEntry::KeyValue { .. } => None,
        })
    }

    /// All `key=value` entries merged into one map. Last write wins.
    pub fn keywords(&self) -> IndexMap<String, Expr> {
        let mut keywords = IndexMap::new();
        for entry in &self.entries {
            if let AttributeEntry::KeyValue { key, value } = entry {
                keywords.insert(key.clone(), value.clone());
            }
        }
        keywords
    }

    /// Argument list for the tag call: positional expressions, then the merged
    /// keyword map if there is any `key=value` entry.
    pub fn into_args(self) -> Vec<Expr> {
        let mut args = Vec::with_capacity(self.entries.len());
        let mut keywords = IndexMap::new();
        for entry in self.entries {
            match entry {
                AttributeEntry::Positional(expr) => args.push(expr),
                AttributeEntry::KeyValue { key, value } => {
                    keywords.insert(key, value);
                }
            }
        }
        if !keywords.is_empty() {
            args.push(Expr::KeywordArgs(keywords));
        }
        args
    }
}

impl TagParser {
    /// Parse attributes up to the block end. The tag name must already be
    /// consumed; the block end token is left for the caller.
    pub fn parse_attributes(
        tokens: &mut TokenStream,
        parser: &dyn ExpressionParser,
    ) -> Result<ParsedAttributeList, ParseError> {
        let mut list = ParsedAttributeList::default();

        loop {
            if tokens.at_block_end() {
                break;
            }
            // Commas between attributes are optional
            if tokens.skip_punctuation(",") && tokens.at_block_end() {
                break;
            }

            let entry = Self::parse_entry(tokens, parser)?;
            tracing::trace!(?entry, "parsed attribute");
            list.entries.push(entry);
        }

        Ok(list)
    }

    fn parse_entry(
        tokens: &mut TokenStream,
        parser: &dyn ExpressionParser,
    ) -> Result<AttributeEntry, ParseError> {
        let token = tokens.peek().clone();

        match token.kind {
            TokenKind::String => {
                let next = tokens.peek_nth(1);
                if next.is_operator("=") {
                    tokens.next_token();
                    tokens.next_token();
                    return Self::parse_value(tokens, parser, token.value);
                }
                // `"a""b"=1`, two literals glued into one key
                if next.kind == TokenKind::String
                    && token.touches(next)
                    && tokens.peek_nth(2).is_operator("=")
                {
                    return Err(invalid_key(
                        &token,
                        format!("{}{}", token.display_text(), next.display_text()),
                    ));
                }
                Ok(AttributeEntry::Positional(parser.parse_expression(tokens)?))
            }
            TokenKind::Symbol => match Self::scan_key(tokens)? {
                Some((key, len)) => {
                    for _ in 0..=len {
                        tokens.next_token();
                    }
                    Self::parse_value(tokens, parser, key)
                }
                None => Ok(AttributeEntry::Positional(parser.parse_expression(tokens)?)),
            },
            TokenKind::Number => Ok(AttributeEntry::Positional(parser.parse_expression(tokens)?)),
            TokenKind::Punctuation if matches!(token.value.as_str(), "[" | "{" | "(") => {
                Ok(AttributeEntry::Positional(parser.parse_expression(tokens)?))
            }
            _ => Err(ParseError::unexpected(&token)),
        }
    }

    fn parse_value(
        tokens: &mut TokenStream,
        parser: &dyn ExpressionParser,
        key: String,
    ) -> Result<AttributeEntry, ParseError> {
        let value = parser.parse_expression(tokens)?;
        Ok(AttributeEntry::KeyValue { key, value })
    }

    /// Look ahead for a bare key: `symbol ('-' symbol)*` directly followed by
    /// `=`, with no whitespace between the pieces. Returns the key and the
    /// number of tokens it spans, or `None` if this is not a key. Consumes
    /// nothing.
    fn scan_key(tokens: &TokenStream) -> Result<Option<(String, usize)>, ParseError> {
        let first = tokens.peek();
        let mut key = first.value.clone();
        let mut len = 1;
        let mut last = first;

        loop {
            let dash = tokens.peek_nth(len);
            if !dash.is_operator("-") || !last.touches(dash) {
                break;
            }
            let piece = tokens.peek_nth(len + 1);
            if !dash.touches(piece) {
                break;
            }
            match piece.kind {
                TokenKind::Symbol => {
                    key.push('-');
                    key.push_str(&piece.value);
                    len += 2;
                    last = piece;
                }
                TokenKind::String => {
                    return Err(invalid_key(
                        first,
                        format!("{}-{}", key, piece.display_text()),
                    ));
                }
                // `data-src-="as"`, a key without its last piece
                TokenKind::Operator if piece.value == "=" => {
                    return Err(ParseError::unexpected(piece));
                }
                _ => break,
            }
        }

        if tokens.peek_nth(len).is_operator("=") {
            Ok(Some((key, len)))
        } else {
            Ok(None)
        }
    }
}

fn invalid_key(at: &Token, key: String) -> ParseError {
    let (line, col) = at.line_col;
    ParseError::InvalidKeyName { key, line, col }
}
