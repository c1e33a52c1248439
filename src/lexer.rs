use pest::Parser;
use pest_derive::Parser;

use crate::error::ParseError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct Lexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    String,
    Number,
    Symbol,
    Operator,
    Punctuation,
    /// A character no other token starts with, e.g. `@` or `;`
    Unknown,
    /// Synthetic token standing for the closing `%}` / `}}`
    BlockEnd,
}

/// Metadata of the matched token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text of the token. For string literals this is the unescaped
    /// content, without quotes.
    pub value: String,
    /// Start index (byte offset into the lexed text)
    pub start_index: usize,
    /// End index (byte offset into the lexed text)
    pub end_index: usize,
    /// Line and column in the template
    pub line_col: (usize, usize),
}

impl Token {
    pub fn is_symbol(&self, name: &str) -> bool {
        self.kind == TokenKind::Symbol && self.value == name
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.value == op
    }

    pub fn is_punctuation(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.value == punct
    }

    /// Whether `next` starts exactly where this token ends, with no
    /// whitespace in between.
    pub fn touches(&self, next: &Token) -> bool {
        self.end_index == next.start_index
    }

    /// Text of the token as written in the template, used in error messages.
    pub fn display_text(&self) -> String {
        match self.kind {
            TokenKind::String => format!("\"{}\"", self.value),
            TokenKind::BlockEnd => "end of tag".to_string(),
            _ => self.value.clone(),
        }
    }
}

/// Cursor over the tokens of one block. The last token is always
/// [`TokenKind::BlockEnd`], and the cursor never moves past it.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    index: usize,
}

impl TokenStream {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::BlockEnd) {
            let (end_index, line_col) = tokens
                .last()
                .map(|t| (t.end_index, t.line_col))
                .unwrap_or((0, (1, 1)));
            tokens.push(Token {
                kind: TokenKind::BlockEnd,
                value: String::new(),
                start_index: end_index,
                end_index,
                line_col,
            });
        }
        Self { tokens, index: 0 }
    }

    pub fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    /// Look `n` tokens ahead. Clamps to the block end.
    pub fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.index + n).min(last)]
    }

    pub fn next_token(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::BlockEnd {
            self.index += 1;
        }
        token
    }

    pub fn at_block_end(&self) -> bool {
        self.peek().kind == TokenKind::BlockEnd
    }

    /// Consume the next token if it is the given punctuation.
    pub fn skip_punctuation(&mut self, punct: &str) -> bool {
        if self.peek().is_punctuation(punct) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Consume the next token if it is the given operator.
    pub fn skip_operator(&mut self, op: &str) -> bool {
        if self.peek().is_operator(op) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_punctuation(&mut self, punct: &str) -> Result<Token, ParseError> {
        let token = self.next_token();
        if token.is_punctuation(punct) {
            Ok(token)
        } else {
            Err(ParseError::unexpected(&token))
        }
    }
}

/// Tokenize text that starts at line 1, column 1.
pub fn tokenize(input: &str) -> Result<TokenStream, ParseError> {
    tokenize_at(input, (1, 1))
}

/// Tokenize text that starts at `origin` (line, column) of a template, so that
/// positions in errors point into the template rather than into the block.
pub fn tokenize_at(input: &str, origin: (usize, usize)) -> Result<TokenStream, ParseError> {
    let pairs = Lexer::parse(Rule::tokens, input)?;
    let mut tokens = Vec::new();

    for pair in pairs.flatten() {
        let kind = match pair.as_rule() {
            Rule::string_literal => TokenKind::String,
            Rule::number => TokenKind::Number,
            Rule::symbol => TokenKind::Symbol,
            Rule::operator => TokenKind::Operator,
            Rule::punctuation => TokenKind::Punctuation,
            Rule::unknown => TokenKind::Unknown,
            Rule::EOI => TokenKind::BlockEnd,
            // `tokens` itself and the string content nested in `string_literal`
            _ => continue,
        };

        let span = pair.as_span();
        let value = match kind {
            TokenKind::String => pair
                .clone()
                .into_inner()
                .next()
                .map(|inner| unescape(inner.as_str()))
                .unwrap_or_default(),
            TokenKind::BlockEnd => String::new(),
            _ => pair.as_str().to_string(),
        };

        tokens.push(Token {
            kind,
            value,
            start_index: span.start(),
            end_index: span.end(),
            line_col: shift(pair.line_col(), origin),
        });
    }

    Ok(TokenStream::new(tokens))
}

fn shift((line, col): (usize, usize), (origin_line, origin_col): (usize, usize)) -> (usize, usize) {
    if line == 1 {
        (origin_line, origin_col + col - 1)
    } else {
        (origin_line + line - 1, col)
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_values(input: &str) -> Vec<(TokenKind, String)> {
        let mut stream = tokenize(input).unwrap();
        let mut result = Vec::new();
        loop {
            let token = stream.next_token();
            let done = token.kind == TokenKind::BlockEnd;
            result.push((token.kind, token.value));
            if done {
                break;
            }
        }
        result
    }

    #[test]
    fn test_tokenize_attribute_list() {
        let input = r#"data-attr=clz, "checked""#;
        assert_eq!(
            kinds_and_values(input),
            vec![
                (TokenKind::Symbol, "data".to_string()),
                (TokenKind::Operator, "-".to_string()),
                (TokenKind::Symbol, "attr".to_string()),
                (TokenKind::Operator, "=".to_string()),
                (TokenKind::Symbol, "clz".to_string()),
                (TokenKind::Punctuation, ",".to_string()),
                (TokenKind::String, "checked".to_string()),
                (TokenKind::BlockEnd, String::new()),
            ]
        );
    }

    #[test]
    fn test_tokenize_longest_operator_first() {
        let input = "<script>=\"as\" a==b";
        assert_eq!(
            kinds_and_values(input),
            vec![
                (TokenKind::Operator, "<".to_string()),
                (TokenKind::Symbol, "script".to_string()),
                (TokenKind::Operator, ">=".to_string()),
                (TokenKind::String, "as".to_string()),
                (TokenKind::Symbol, "a".to_string()),
                (TokenKind::Operator, "==".to_string()),
                (TokenKind::Symbol, "b".to_string()),
                (TokenKind::BlockEnd, String::new()),
            ]
        );
    }

    #[test]
    fn test_tokenize_string_escapes() {
        let input = r#"'it\'s' "a\"b" "tab\there""#;
        let values: Vec<String> = kinds_and_values(input)
            .into_iter()
            .filter(|(kind, _)| *kind == TokenKind::String)
            .map(|(_, value)| value)
            .collect();
        assert_eq!(values, vec!["it's", "a\"b", "tab\there"]);
    }

    #[test]
    fn test_tokenize_unterminated_string() {
        let input = r#"attr2="attr2 "#;
        assert_eq!(
            kinds_and_values(input),
            vec![
                (TokenKind::Symbol, "attr2".to_string()),
                (TokenKind::Operator, "=".to_string()),
                (TokenKind::String, "attr2 ".to_string()),
                (TokenKind::BlockEnd, String::new()),
            ]
        );
    }

    #[test]
    fn test_tokenize_positions() {
        let mut stream = tokenize("a-b  c").unwrap();
        let a = stream.next_token();
        let dash = stream.next_token();
        let b = stream.next_token();
        let c = stream.next_token();
        assert!(a.touches(&dash));
        assert!(dash.touches(&b));
        assert!(!b.touches(&c));
        assert_eq!(c.start_index, 5);
        assert_eq!(c.line_col, (1, 6));
    }

    #[test]
    fn test_tokenize_at_origin() {
        let mut stream = tokenize_at("a\n  b", (3, 10)).unwrap();
        assert_eq!(stream.next_token().line_col, (3, 10));
        assert_eq!(stream.next_token().line_col, (4, 3));
    }

    #[test]
    fn test_tokenize_unknown_character() {
        assert_eq!(
            kinds_and_values("a @b;"),
            vec![
                (TokenKind::Symbol, "a".to_string()),
                (TokenKind::Unknown, "@".to_string()),
                (TokenKind::Symbol, "b".to_string()),
                (TokenKind::Unknown, ";".to_string()),
                (TokenKind::BlockEnd, String::new()),
            ]
        );
    }

    #[test]
    fn test_stream_never_moves_past_block_end() {
        let mut stream = tokenize("").unwrap();
        assert!(stream.at_block_end());
        stream.next_token();
        stream.next_token();
        assert!(stream.at_block_end());
        assert_eq!(stream.peek_nth(5).kind, TokenKind::BlockEnd);
    }
}
