use indexmap::IndexMap;

use crate::error::ParseError;
use crate::lexer::{TokenKind, TokenStream};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    /// `~`, string concatenation
    Concat,
    Mul,
    Div,
    Mod,
}

/// Expression node, evaluated by the template engine at render time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String, number, boolean or null literal
    Literal(Value),
    /// Variable, e.g. `my_var`
    Symbol(String),
    /// `target.key` or `target[key]`
    Lookup { target: Box<Expr>, key: Box<Expr> },
    /// `[1, 2, 3]`
    Array(Vec<Expr>),
    /// `{key: value}`
    Object(Vec<(String, Expr)>),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `target|name` or `target|name(args)`
    Filter {
        name: String,
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    /// All `key=value` arguments of one call, merged. Always the last argument.
    KeywordArgs(IndexMap<String, Expr>),
}

impl Expr {
    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Value::String(s.into()))
    }

    pub fn number(n: f64) -> Self {
        Expr::Literal(Value::Number(n))
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }
}

/// The expression grammar of the template engine, as consumed by tag parsers.
pub trait ExpressionParser {
    /// Parse one full expression (filters, operators, literals...) and leave
    /// the stream on the first token after it.
    fn parse_expression(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError>;

    /// The engine's own argument list syntax: expressions separated by
    /// commas, `symbol=value` keyword arguments. Consumes up to the block end.
    fn parse_signature(&self, tokens: &mut TokenStream) -> Result<Vec<Expr>, ParseError>;
}

/// Expression parser of the bundled template engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostExpressionParser;

impl ExpressionParser for HostExpressionParser {
    fn parse_expression(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        self.parse_or(tokens)
    }

    fn parse_signature(&self, tokens: &mut TokenStream) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        let mut kwargs = IndexMap::new();
        let mut check_comma = false;

        while !tokens.at_block_end() {
            if check_comma && !tokens.skip_punctuation(",") {
                let (line, col) = tokens.peek().line_col;
                return Err(ParseError::ExpectedComma { line, col });
            }

            let key_token = tokens.peek().clone();
            let arg = self.parse_expression(tokens)?;
            if tokens.skip_operator("=") {
                let key = match arg {
                    Expr::Symbol(name) => name,
                    Expr::Literal(Value::String(name)) => name,
                    _ => return Err(ParseError::unexpected(&key_token)),
                };
                kwargs.insert(key, self.parse_expression(tokens)?);
            } else {
                args.push(arg);
            }
            check_comma = true;
        }

        if !kwargs.is_empty() {
            args.push(Expr::KeywordArgs(kwargs));
        }
        Ok(args)
    }
}

impl HostExpressionParser {
    fn parse_or(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let mut node = self.parse_and(tokens)?;
        while tokens.peek().is_symbol("or") {
            tokens.next_token();
            let right = self.parse_and(tokens)?;
            node = binary(BinaryOp::Or, node, right);
        }
        Ok(node)
    }

    fn parse_and(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let mut node = self.parse_not(tokens)?;
        while tokens.peek().is_symbol("and") {
            tokens.next_token();
            let right = self.parse_not(tokens)?;
            node = binary(BinaryOp::And, node, right);
        }
        Ok(node)
    }

    fn parse_not(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        if tokens.peek().is_symbol("not") {
            tokens.next_token();
            let operand = self.parse_not(tokens)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_compare(tokens)
    }

    fn parse_compare(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let mut node = self.parse_additive(tokens)?;
        loop {
            let op = match tokens.peek().value.as_str() {
                "==" => BinaryOp::Eq,
                "!=" => BinaryOp::Ne,
                "<" => BinaryOp::Lt,
                ">" => BinaryOp::Gt,
                "<=" => BinaryOp::Le,
                ">=" => BinaryOp::Ge,
                _ => break,
            };
            if tokens.peek().kind != TokenKind::Operator {
                break;
            }
            tokens.next_token();
            let right = self.parse_additive(tokens)?;
            node = binary(op, node, right);
        }
        Ok(node)
    }

    fn parse_additive(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let mut node = self.parse_multiplicative(tokens)?;
        loop {
            let op = match tokens.peek().value.as_str() {
                "+" => BinaryOp::Add,
                "-" => BinaryOp::Sub,
                "~" => BinaryOp::Concat,
                _ => break,
            };
            if tokens.peek().kind != TokenKind::Operator {
                break;
            }
            tokens.next_token();
            let right = self.parse_multiplicative(tokens)?;
            node = binary(op, node, right);
        }
        Ok(node)
    }

    fn parse_multiplicative(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let mut node = self.parse_unary(tokens)?;
        loop {
            let op = match tokens.peek().value.as_str() {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                "%" => BinaryOp::Mod,
                _ => break,
            };
            if tokens.peek().kind != TokenKind::Operator {
                break;
            }
            tokens.next_token();
            let right = self.parse_unary(tokens)?;
            node = binary(op, node, right);
        }
        Ok(node)
    }

    // Filters bind to the operand: `-x|abs` is `-(x|abs)`, and
    // `"<a"|first == "<"` compares the filtered value.
    fn parse_unary(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let node = if tokens.skip_operator("-") {
            Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(self.parse_unary(tokens)?),
            }
        } else {
            self.parse_postfix(tokens)?
        };
        self.parse_filters(tokens, node)
    }

    fn parse_postfix(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let mut node = self.parse_primary(tokens)?;
        loop {
            if tokens.skip_punctuation(".") {
                let name = tokens.next_token();
                if name.kind != TokenKind::Symbol {
                    return Err(ParseError::unexpected(&name));
                }
                node = Expr::Lookup {
                    target: Box::new(node),
                    key: Box::new(Expr::string(name.value)),
                };
            } else if tokens.skip_punctuation("[") {
                let key = self.parse_expression(tokens)?;
                tokens.expect_punctuation("]")?;
                node = Expr::Lookup {
                    target: Box::new(node),
                    key: Box::new(key),
                };
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_filters(&self, tokens: &mut TokenStream, mut node: Expr) -> Result<Expr, ParseError> {
        while tokens.skip_operator("|") {
            let name = tokens.next_token();
            if name.kind != TokenKind::Symbol {
                return Err(ParseError::unexpected(&name));
            }
            let args = if tokens.skip_punctuation("(") {
                self.parse_list(tokens, ")")?
            } else {
                Vec::new()
            };
            node = Expr::Filter {
                name: name.value,
                target: Box::new(node),
                args,
            };
        }
        Ok(node)
    }

    fn parse_primary(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let token = tokens.next_token();
        match token.kind {
            TokenKind::String => Ok(Expr::Literal(Value::String(token.value))),
            TokenKind::Number => token
                .value
                .parse::<f64>()
                .map(Expr::number)
                .map_err(|_| ParseError::unexpected(&token)),
            TokenKind::Symbol => Ok(match token.value.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "none" | "null" => Expr::Literal(Value::Null),
                _ => Expr::Symbol(token.value),
            }),
            TokenKind::Punctuation if token.value == "(" => {
                let node = self.parse_expression(tokens)?;
                tokens.expect_punctuation(")")?;
                Ok(node)
            }
            TokenKind::Punctuation if token.value == "[" => {
                Ok(Expr::Array(self.parse_list(tokens, "]")?))
            }
            TokenKind::Punctuation if token.value == "{" => self.parse_object(tokens),
            _ => Err(ParseError::unexpected(&token)),
        }
    }

    /// Comma separated expressions up to and including `close`. The opening
    /// bracket is already consumed. A trailing comma is allowed.
    fn parse_list(&self, tokens: &mut TokenStream, close: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            if tokens.skip_punctuation(close) {
                return Ok(items);
            }
            items.push(self.parse_expression(tokens)?);
            if !tokens.skip_punctuation(",") {
                tokens.expect_punctuation(close)?;
                return Ok(items);
            }
        }
    }

    fn parse_object(&self, tokens: &mut TokenStream) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        loop {
            if tokens.skip_punctuation("}") {
                return Ok(Expr::Object(entries));
            }
            let key = tokens.next_token();
            if !matches!(key.kind, TokenKind::Symbol | TokenKind::String) {
                return Err(ParseError::unexpected(&key));
            }
            tokens.expect_punctuation(":")?;
            entries.push((key.value, self.parse_expression(tokens)?));
            if !tokens.skip_punctuation(",") {
                tokens.expect_punctuation("}")?;
                return Ok(Expr::Object(entries));
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
