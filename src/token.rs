use std::fmt;
use std::sync::Arc;

/// Source location for error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Span {
    /// Identifier of the input buffer, if the caller supplied one.
    pub file: Option<Arc<str>>,
    pub line: usize,
    pub column: usize,
    /// Byte offset from the start of the input.
    pub offset: usize,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{file}:")?;
        }
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or bare word (`CfgPatches`, `3DEN`).
    Ident,
    /// Identifier immediately followed by `(`, e.g. `LIST_2(`.
    /// The parenthesis is emitted as its own token.
    MacroCall,
    /// Numeric literal, sign excluded (`1`, `0.1`, `1e+11`, `0x1F`).
    Number,
    /// Double-quoted string; `text` holds the decoded value.
    String,
    /// Preprocessor directive (`#define`); `text` holds the directive
    /// name. The directive's tokens follow up to `DirectiveEnd`.
    Directive,
    /// End of a directive's logical line.
    DirectiveEnd,
    /// `{`
    OpenBrace,
    /// `}`
    CloseBrace,
    /// `[`
    OpenBracket,
    /// `]`
    CloseBracket,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `=`
    Assign,
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `#` outside of a directive name position.
    Hash,
    /// Any other ASCII punctuation character.
    Symbol,
}

/// A single token with its kind, text, and source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    /// Whether this token is an identifier-like word a macro could name.
    #[must_use]
    pub const fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Ident | TokenKind::MacroCall)
    }

    /// Render the token back to source text (strings are re-quoted).
    #[must_use]
    pub fn source_text(&self) -> String {
        match self.kind {
            TokenKind::String => quote(&self.text),
            TokenKind::Directive => format!("#{}", self.text),
            _ => self.text.clone(),
        }
    }
}

/// Quote a string value, doubling any embedded `"`.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
