use std::fmt;

use tracing::debug;

use crate::ast::{ClassKind, ClassNode, ClassTree, MAX_DEPTH, Operator, Property, Value};
use crate::lexer::is_number;
use crate::token::{Span, Token, TokenKind};

/// Classifies a parser error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Found a token that cannot appear here.
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    /// Input ended mid-statement.
    UnexpectedEof { expected: &'static str },
    /// Assignment operator other than `=`, `+=`, `-=`.
    UnknownOperator(String),
    /// Statement not terminated by `;`.
    MissingSemicolon { found: Option<String> },
    /// `+=`/`-=` on a property declared without `[]`.
    DuplicateArrayOperatorOnScalar { name: String, operator: &'static str },
    /// Classes and arrays nested deeper than [`MAX_DEPTH`].
    NestingTooDeep,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, got '{found}'")
            }
            Self::UnexpectedEof { expected } => {
                write!(f, "expected {expected}, got end of input")
            }
            Self::UnknownOperator(op) => {
                write!(f, "unknown assignment operator '{op}'")
            }
            Self::MissingSemicolon { found: None } => {
                write!(f, "expected ';'")
            }
            Self::MissingSemicolon { found: Some(t) } => {
                write!(f, "expected ';', got '{t}'")
            }
            Self::DuplicateArrayOperatorOnScalar { name, operator } => {
                write!(
                    f,
                    "array operator '{operator}' used on scalar \
                     property '{name}' (declare it as '{name}[]')"
                )
            }
            Self::NestingTooDeep => {
                write!(f, "nesting deeper than {MAX_DEPTH} levels")
            }
        }
    }
}

/// Error produced during parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

/// Parse a preprocessed token stream into a `ClassTree`.
///
/// Directive tokens must already have been consumed by the
/// preprocessor.
///
/// # Errors
///
/// Returns `ParseError` on the first syntax error.
pub fn parse(tokens: &[Token]) -> Result<ClassTree, ParseError> {
    Parser::new(tokens).parse()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    /// Enclosing classes and arrays.
    depth: usize,
}

impl<'a> Parser<'a> {
    const fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn parse(mut self) -> Result<ClassTree, ParseError> {
        let (properties, classes) = self.parse_body(false)?;
        let tree = ClassTree {
            properties,
            classes,
        };
        debug!(
            classes = tree.class_count(),
            properties = tree.properties.len(),
            "parsed class tree"
        );
        Ok(tree)
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eof_span(&self) -> Span {
        self.tokens
            .last()
            .map_or_else(Span::default, |last| last.span.clone())
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError {
                kind: ParseErrorKind::UnexpectedToken {
                    expected,
                    found: token.source_text(),
                },
                span: token.span.clone(),
            },
            None => ParseError {
                kind: ParseErrorKind::UnexpectedEof { expected },
                span: self.eof_span(),
            },
        }
    }

    /// Open one class or array level at the current token.
    fn enter(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_DEPTH {
            let span = self
                .peek()
                .map_or_else(|| self.eof_span(), |t| t.span.clone());
            return Err(ParseError {
                kind: ParseErrorKind::NestingTooDeep,
                span,
            });
        }
        self.depth += 1;
        Ok(())
    }

    const fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<&'a Token, ParseError> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn expect_semicolon(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Semicolon => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(ParseError {
                kind: ParseErrorKind::MissingSemicolon {
                    found: Some(token.source_text()),
                },
                span: token.span.clone(),
            }),
            None => Err(ParseError {
                kind: ParseErrorKind::MissingSemicolon { found: None },
                span: self.eof_span(),
            }),
        }
    }

    /// Class names may be identifiers or bare numerals.
    fn expect_name(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.peek() {
            Some(token) if matches!(token.kind, TokenKind::Ident | TokenKind::Number) => {
                self.pos += 1;
                Ok(token.text.clone())
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.kind == TokenKind::Ident && t.text == keyword)
    }

    fn parse_body(&mut self, nested: bool) -> Result<(Vec<Property>, Vec<ClassNode>), ParseError> {
        let mut properties = Vec::new();
        let mut classes = Vec::new();

        loop {
            let Some(token) = self.peek() else {
                if nested {
                    return Err(self.unexpected("'}'"));
                }
                break;
            };

            let names_follow = matches!(
                self.peek_kind_at(1),
                Some(TokenKind::Ident | TokenKind::Number)
            );

            match token.kind {
                TokenKind::CloseBrace if nested => break,
                TokenKind::Semicolon => self.pos += 1,
                TokenKind::Ident if self.is_keyword("class") && names_follow => {
                    self.enter()?;
                    classes.push(self.parse_class()?);
                    self.leave();
                }
                TokenKind::Ident if self.is_keyword("delete") && names_follow => {
                    // a delete is stored as a class record of its own
                    self.enter()?;
                    self.leave();
                    self.pos += 1;
                    let name = self.expect_name("class name after 'delete'")?;
                    self.expect_semicolon()?;
                    classes.push(ClassNode {
                        name,
                        parent: None,
                        kind: ClassKind::Delete,
                        properties: Vec::new(),
                        classes: Vec::new(),
                    });
                }
                TokenKind::Ident
                    if self.is_keyword("enum")
                        && self.peek_kind_at(1) == Some(TokenKind::OpenBrace) =>
                {
                    self.parse_enum(&mut properties)?;
                }
                TokenKind::Ident | TokenKind::MacroCall => {
                    properties.push(self.parse_property()?);
                }
                _ => return Err(self.unexpected("'class', 'delete', 'enum', or a property")),
            }
        }

        Ok((properties, classes))
    }

    fn parse_class(&mut self) -> Result<ClassNode, ParseError> {
        self.pos += 1; // skip `class`
        let name = self.expect_name("class name")?;
        let parent = if self.peek_kind() == Some(TokenKind::Colon) {
            self.pos += 1;
            Some(self.expect_name("parent class name")?)
        } else {
            None
        };

        let node = match self.peek_kind() {
            Some(TokenKind::OpenBrace) => {
                self.pos += 1;
                let (properties, classes) = self.parse_body(true)?;
                self.expect(TokenKind::CloseBrace, "'}'")?;
                ClassNode {
                    name,
                    parent,
                    kind: ClassKind::Definition,
                    properties,
                    classes,
                }
            }
            Some(TokenKind::Semicolon) => {
                // `class A : B;` defines an empty subclass;
                // `class A;` only declares the name
                let kind = if parent.is_some() {
                    ClassKind::Definition
                } else {
                    ClassKind::Forward
                };
                ClassNode {
                    name,
                    parent,
                    kind,
                    properties: Vec::new(),
                    classes: Vec::new(),
                }
            }
            _ => return Err(self.unexpected("'{', ':', or ';'")),
        };

        self.expect_semicolon()?;
        Ok(node)
    }

    /// `enum { a = 1, b, 0 = 0 };` -- entries become file- or
    /// class-scope integer properties.
    fn parse_enum(&mut self, properties: &mut Vec<Property>) -> Result<(), ParseError> {
        self.pos += 1; // skip `enum`
        self.expect(TokenKind::OpenBrace, "'{'")?;
        let mut next = 0i64;

        loop {
            if self.peek_kind() == Some(TokenKind::CloseBrace) {
                break;
            }
            let name = self.expect_name("enum key")?;
            let value = if self.peek_kind() == Some(TokenKind::Assign) {
                self.pos += 1;
                self.parse_number()?
            } else {
                Value::Int(next)
            };
            if let Value::Int(n) = value {
                next = n.wrapping_add(1);
            }
            properties.push(Property {
                name,
                operator: Operator::Set,
                value,
            });

            match self.peek_kind() {
                Some(TokenKind::Comma) => self.pos += 1,
                Some(TokenKind::CloseBrace) => {}
                _ => return Err(self.unexpected("',' or '}'")),
            }
        }

        self.expect(TokenKind::CloseBrace, "'}'")?;
        self.expect_semicolon()
    }

    fn parse_property(&mut self) -> Result<Property, ParseError> {
        let name = self.bump().map(|t| t.text.clone()).unwrap_or_default();

        let is_array = self.peek_kind() == Some(TokenKind::OpenBracket);
        if is_array {
            self.pos += 1;
            self.expect(TokenKind::CloseBracket, "']'")?;
        }

        let operator = self.parse_operator()?;
        if !is_array && operator != Operator::Set {
            return Err(ParseError {
                kind: ParseErrorKind::DuplicateArrayOperatorOnScalar {
                    name,
                    operator: operator.symbol(),
                },
                span: self.tokens[self.pos - 1].span.clone(),
            });
        }

        let value = if !is_array {
            if self.peek_kind() == Some(TokenKind::OpenBrace) {
                return Err(self.unexpected("a scalar value (arrays are declared as 'name[]')"));
            }
            self.parse_scalar()?
        } else {
            self.enter()?;
            let items = if self.peek_kind() == Some(TokenKind::OpenBrace) {
                self.parse_array()?
            } else {
                vec![self.parse_scalar()?]
            };
            self.leave();
            Value::Array(items)
        };

        self.expect_semicolon()?;
        Ok(Property {
            name,
            operator,
            value,
        })
    }

    fn parse_operator(&mut self) -> Result<Operator, ParseError> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected("'='"));
        };
        let operator = match token.kind {
            TokenKind::Assign => Operator::Set,
            TokenKind::AddAssign => Operator::Append,
            TokenKind::SubAssign => Operator::Subtract,
            TokenKind::Symbol | TokenKind::Colon | TokenKind::Hash | TokenKind::Plus | TokenKind::Minus => {
                let mut op = token.text.clone();
                if self.peek_kind_at(1) == Some(TokenKind::Assign) {
                    op.push('=');
                }
                return Err(ParseError {
                    kind: ParseErrorKind::UnknownOperator(op),
                    span: token.span.clone(),
                });
            }
            _ => return Err(self.unexpected("'=', '+=', or '-='")),
        };
        self.pos += 1;
        Ok(operator)
    }

    fn parse_array(&mut self) -> Result<Vec<Value>, ParseError> {
        self.expect(TokenKind::OpenBrace, "'{'")?;
        let mut items = Vec::new();

        loop {
            match self.peek_kind() {
                Some(TokenKind::CloseBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(TokenKind::OpenBrace) => {
                    self.enter()?;
                    items.push(Value::Array(self.parse_array()?));
                    self.leave();
                }
                _ => items.push(self.parse_scalar()?),
            }

            match self.peek_kind() {
                // a trailing comma before `}` is tolerated
                Some(TokenKind::Comma) => self.pos += 1,
                Some(TokenKind::CloseBrace) => {}
                _ => return Err(self.unexpected("',' or '}'")),
            }
        }

        Ok(items)
    }

    fn parse_scalar(&mut self) -> Result<Value, ParseError> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected("a value"));
        };
        match token.kind {
            TokenKind::String => {
                self.pos += 1;
                Ok(Value::String(token.text.clone()))
            }
            TokenKind::Number | TokenKind::Minus | TokenKind::Plus => self.parse_number(),
            TokenKind::Ident => {
                self.pos += 1;
                let value = if token.text.eq_ignore_ascii_case("true") {
                    Value::Int(1)
                } else if token.text.eq_ignore_ascii_case("false") {
                    Value::Int(0)
                } else {
                    Value::String(token.text.clone())
                };
                Ok(value)
            }
            _ => Err(self.unexpected("a value")),
        }
    }

    /// Optionally signed numeric literal.
    fn parse_number(&mut self) -> Result<Value, ParseError> {
        let negative = match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.pos += 1;
                true
            }
            Some(TokenKind::Plus) => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        match self.peek() {
            Some(token) if token.kind == TokenKind::Number => {
                let value = number_value(&token.text, negative)
                    .ok_or_else(|| self.unexpected("a number"))?;
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.unexpected("a number")),
        }
    }
}

/// Convert a numeric literal, keeping integers and floats apart.
/// Integers too large for `i64` fall back to floats.
#[must_use]
pub fn number_value(text: &str, negative: bool) -> Option<Value> {
    if !is_number(text) {
        return None;
    }

    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        let n = i64::from_str_radix(hex, 16).ok()?;
        return Some(Value::Int(if negative { n.wrapping_neg() } else { n }));
    }

    if text.bytes().all(|b| b.is_ascii_digit()) {
        let signed = if negative {
            format!("-{text}")
        } else {
            text.to_string()
        };
        if let Ok(n) = signed.parse::<i64>() {
            return Some(Value::Int(n));
        }
    }

    let x = text.parse::<f64>().ok()?;
    Some(Value::Float(if negative { -x } else { x }))
}
