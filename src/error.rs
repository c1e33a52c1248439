use thiserror::Error;

use crate::lexer::{Rule, Token, TokenKind};

/// Errors raised while compiling a template. Any of them aborts compilation
/// of the whole template.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Pest parser error: {0}")]
    PestError(#[from] pest::error::Error<Rule>),
    #[error("unexpected token {token} at line {line}, column {col}")]
    UnexpectedToken {
        token: String,
        line: usize,
        col: usize,
    },
    #[error("unexpected end of tag at line {line}, column {col}")]
    UnexpectedEnd { line: usize, col: usize },
    #[error("invalid key name {key} at line {line}, column {col}")]
    InvalidKeyName {
        key: String,
        line: usize,
        col: usize,
    },
    #[error("parseSignature: expected comma after expression (line {line}, column {col})")]
    ExpectedComma { line: usize, col: usize },
    #[error("expected block end in {name} statement (line {line}, column {col})")]
    ExpectedBlockEnd {
        name: String,
        line: usize,
        col: usize,
    },
    #[error("unknown block tag {name:?} at line {line}, column {col}")]
    UnknownTag {
        name: String,
        line: usize,
        col: usize,
    },
    #[error("unclosed tag, expected {{% {expected} %}}")]
    UnclosedTag { expected: String },
}

impl ParseError {
    pub fn unexpected(token: &Token) -> Self {
        let (line, col) = token.line_col;
        match token.kind {
            TokenKind::BlockEnd => ParseError::UnexpectedEnd { line, col },
            _ => ParseError::UnexpectedToken {
                token: token.display_text(),
                line,
                col,
            },
        }
    }
}

/// Errors raised while rendering a compiled template.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unknown filter {0:?}")]
    UnknownFilter(String),
    #[error("unknown tag {0:?}")]
    UnknownTag(String),
    #[error("missing {0} in render context")]
    MissingContext(&'static str),
    #[error("{0}")]
    Tag(String),
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
