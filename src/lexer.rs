use std::fmt;
use std::sync::Arc;

use crate::token::{Span, Token, TokenKind};

/// Classifies a lexer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// End of input inside a double-quoted string.
    UnterminatedString,
    /// End of input inside a `/* ... */` comment.
    UnterminatedComment,
    /// A digit-led word containing `.` that is not a valid number.
    InvalidNumber(String),
    /// Character that cannot start any token.
    UnexpectedCharacter(char),
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedString => {
                write!(f, "unterminated quoted string")
            }
            Self::UnterminatedComment => {
                write!(f, "unterminated block comment")
            }
            Self::InvalidNumber(text) => {
                write!(f, "invalid numeric literal: {text}")
            }
            Self::UnexpectedCharacter(ch) => {
                write!(f, "unexpected character: {}", ch.escape_debug())
            }
        }
    }
}

/// Error produced during lexing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

/// Tokenize a config source string into a sequence of tokens.
///
/// Comments are stripped. Directive lines (`#define ...`) are
/// emitted as a `Directive` token, the line's tokens, and a
/// closing `DirectiveEnd`.
///
/// # Errors
///
/// Returns `LexError` on unterminated strings or comments,
/// malformed numbers, or stray control characters.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).collect()
}

/// Lazy tokenizer over a source string.
///
/// Yields `Result<Token, LexError>` and stops after the first
/// error. Restart by constructing a new `Lexer`.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
    file: Option<Arc<str>>,
    /// Only whitespace seen since the last newline.
    line_start: bool,
    in_directive: bool,
    done: bool,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        let bytes = input.as_bytes();
        let start = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
            3
        } else {
            0
        };
        Self {
            input,
            bytes,
            pos: start,
            line: 1,
            col: 1,
            file: None,
            line_start: true,
            in_directive: false,
            done: false,
        }
    }

    /// Stamp every span with the given file identifier.
    #[must_use]
    pub fn with_file(mut self, file: Option<Arc<str>>) -> Self {
        self.file = file;
        self
    }

    fn span(&self) -> Span {
        Span {
            file: self.file.clone(),
            line: self.line,
            column: self.col,
            offset: self.pos,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(&b) = self.bytes.get(self.pos) {
            if b == b'\n' {
                self.line += 1;
                self.col = 1;
            } else if b & 0xC0 != 0x80 {
                // count chars, not UTF-8 continuation bytes
                self.col += 1;
            }
            self.pos += 1;
        }
    }

    fn advance_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
    }

    fn skip_line_comment(&mut self) {
        self.advance_while(|b| b != b'\n');
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let span = self.span();
        self.advance(); // skip /
        self.advance(); // skip *
        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedComment,
                        span,
                    });
                }
                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                    self.advance();
                    self.advance();
                    return Ok(());
                }
                Some(_) => self.advance(),
            }
        }
    }

    /// Backslash-newline inside a directive joins the next line.
    fn try_skip_continuation(&mut self) -> bool {
        let skip = match (self.peek_at(1), self.peek_at(2)) {
            (Some(b'\n'), _) => 2,
            (Some(b'\r'), Some(b'\n')) => 3,
            _ => return false,
        };
        for _ in 0..skip {
            self.advance();
        }
        true
    }

    fn read_token(&mut self) -> Result<Token, LexError> {
        let span = self.span();
        let ch = self.bytes[self.pos];

        let single = |lexer: &mut Self, kind: TokenKind| {
            lexer.advance();
            Ok(Token {
                kind,
                text: char::from(ch).to_string(),
                span: span.clone(),
            })
        };

        match ch {
            b'#' if self.line_start && !self.in_directive => Ok(self.read_directive(span)),
            b'"' => self.read_string(span),
            b'0'..=b'9' => self.read_numeric(span),
            b'.' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => self.read_numeric(span),
            b'+' | b'-' if self.peek_at(1) == Some(b'=') => {
                self.advance();
                self.advance();
                let (kind, text) = if ch == b'+' {
                    (TokenKind::AddAssign, "+=")
                } else {
                    (TokenKind::SubAssign, "-=")
                };
                Ok(Token {
                    kind,
                    text: text.to_string(),
                    span,
                })
            }
            b'{' => single(self, TokenKind::OpenBrace),
            b'}' => single(self, TokenKind::CloseBrace),
            b'[' => single(self, TokenKind::OpenBracket),
            b']' => single(self, TokenKind::CloseBracket),
            b'(' => single(self, TokenKind::OpenParen),
            b')' => single(self, TokenKind::CloseParen),
            b';' => single(self, TokenKind::Semicolon),
            b',' => single(self, TokenKind::Comma),
            b':' => single(self, TokenKind::Colon),
            b'=' => single(self, TokenKind::Assign),
            b'+' => single(self, TokenKind::Plus),
            b'-' => single(self, TokenKind::Minus),
            b'#' => single(self, TokenKind::Hash),
            _ if is_word_start(ch) => Ok(self.read_word(span)),
            _ if ch.is_ascii_punctuation() => single(self, TokenKind::Symbol),
            _ => {
                let found = self.input[self.pos..].chars().next().unwrap_or('\u{FFFD}');
                Err(LexError {
                    kind: LexErrorKind::UnexpectedCharacter(found),
                    span,
                })
            }
        }
    }

    fn read_directive(&mut self, span: Span) -> Token {
        self.advance(); // skip #
        self.advance_while(|b| b == b' ' || b == b'\t');
        let start = self.pos;
        self.advance_while(is_word_byte);
        self.in_directive = true;
        Token {
            kind: TokenKind::Directive,
            text: self.input[start..self.pos].to_string(),
            span,
        }
    }

    /// Strings use `""` for an embedded quote; there are no
    /// backslash escapes.
    fn read_string(&mut self, span: Span) -> Result<Token, LexError> {
        self.advance(); // skip opening quote
        let mut value = String::new();
        let mut segment = self.pos;

        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedString,
                        span,
                    });
                }
                Some(b'"') if self.peek_at(1) == Some(b'"') => {
                    value.push_str(&self.input[segment..=self.pos]);
                    self.advance();
                    self.advance();
                    segment = self.pos;
                }
                Some(b'"') => {
                    value.push_str(&self.input[segment..self.pos]);
                    self.advance();
                    break;
                }
                Some(_) => self.advance(),
            }
        }

        Ok(Token {
            kind: TokenKind::String,
            text: value,
            span,
        })
    }

    fn read_numeric(&mut self, span: Span) -> Result<Token, LexError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_word_byte(b) || b == b'.' {
                self.advance();
            } else if (b == b'+' || b == b'-')
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
                && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                && is_decimal_mantissa(&self.input[start..self.pos - 1])
            {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.input[start..self.pos];
        if is_number(text) {
            return Ok(Token {
                kind: TokenKind::Number,
                text: text.to_string(),
                span,
            });
        }
        if text.contains('.') {
            return Err(LexError {
                kind: LexErrorKind::InvalidNumber(text.to_string()),
                span,
            });
        }
        Ok(self.finish_word(start, span))
    }

    fn read_word(&mut self, span: Span) -> Token {
        let start = self.pos;
        self.advance_while(is_word_byte);
        self.finish_word(start, span)
    }

    fn finish_word(&self, start: usize, span: Span) -> Token {
        let kind = if self.peek() == Some(b'(') {
            TokenKind::MacroCall
        } else {
            TokenKind::Ident
        };
        Token {
            kind,
            text: self.input[start..self.pos].to_string(),
            span,
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let Some(ch) = self.peek() else {
                if self.in_directive {
                    self.in_directive = false;
                    return Some(Ok(Token {
                        kind: TokenKind::DirectiveEnd,
                        text: String::new(),
                        span: self.span(),
                    }));
                }
                self.done = true;
                return None;
            };

            match ch {
                b'\n' => {
                    let span = self.span();
                    self.advance();
                    self.line_start = true;
                    if self.in_directive {
                        self.in_directive = false;
                        return Some(Ok(Token {
                            kind: TokenKind::DirectiveEnd,
                            text: "\n".to_string(),
                            span,
                        }));
                    }
                }
                b' ' | b'\t' | b'\r' | 0x0B | 0x0C => self.advance(),
                b'\\' if self.in_directive && self.try_skip_continuation() => {}
                b'/' if self.peek_at(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek_at(1) == Some(b'*') => {
                    if let Err(err) = self.skip_block_comment() {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
                _ => {
                    let result = self.read_token();
                    self.line_start = false;
                    if result.is_err() {
                        self.done = true;
                    }
                    return Some(result);
                }
            }
        }
    }
}

impl std::iter::FusedIterator for Lexer<'_> {}

const fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

const fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// `digits [. digits]` or `. digits` -- the part before an exponent.
fn is_decimal_mantissa(text: &str) -> bool {
    let (int, frac) = text.split_once('.').unwrap_or((text, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    (!int.is_empty() || !frac.is_empty()) && all_digits(int) && all_digits(frac)
}

/// Whether `text` is a complete numeric literal: decimal integer,
/// hexadecimal integer, or decimal float with optional exponent.
#[must_use]
pub fn is_number(text: &str) -> bool {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        return !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit());
    }

    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(idx) => (&text[..idx], Some(&text[idx + 1..])),
        None => (text, None),
    };
    if !is_decimal_mantissa(mantissa) {
        return false;
    }
    exponent.is_none_or(|exp| {
        let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    })
}
