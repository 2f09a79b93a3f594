//! Macro preprocessor operating on the lexer's token stream.
//!
//! Handles `#define` (object-like and function-like), `#undef`,
//! and `#ifdef`/`#ifndef`/`#else`/`#endif`. Expansion is token-level:
//! arguments are substituted positionally, `#param` stringizes an
//! argument, `a ## b` pastes two tokens (re-lexing the result), and
//! every expansion is rescanned for further macro invocations up
//! to a depth limit.
//!
//! The macro table belongs to one `Preprocessor` value, so each
//! parse gets its own isolated set of definitions.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tracing::{debug, trace};

use crate::lexer::{LexError, tokenize};
use crate::token::{Span, Token, TokenKind};

/// Expansion depth used when none is configured.
pub const DEFAULT_RECURSION_LIMIT: usize = 32;

/// Classifies a preprocessor error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreprocessErrorKind {
    /// Expanding `name` nested deeper than the configured limit.
    RecursionLimit { name: String, limit: usize },
    /// A directive whose shape is wrong (`#define` without a name).
    MalformedDirective(String),
    /// `#include`, `#if`, or an unknown directive.
    UnsupportedDirective(String),
    /// Function-like macro invoked with the wrong number of arguments.
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
    /// Function-like macro invocation whose `(` is never closed.
    UnterminatedInvocation(String),
    /// `#else`/`#endif` without `#ifdef`, or a missing `#endif`.
    UnbalancedConditional(String),
    /// `##` produced text that does not lex.
    InvalidPaste(String),
}

impl fmt::Display for PreprocessErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecursionLimit { name, limit } => {
                write!(
                    f,
                    "macro expansion of '{name}' exceeded \
                     recursion limit of {limit}"
                )
            }
            Self::MalformedDirective(msg) => {
                write!(f, "malformed directive: {msg}")
            }
            Self::UnsupportedDirective(name) => {
                write!(f, "unsupported directive: #{name}")
            }
            Self::ArgumentCount {
                name,
                expected,
                found,
            } => {
                write!(
                    f,
                    "macro '{name}' expects {expected} argument(s), \
                     got {found}"
                )
            }
            Self::UnterminatedInvocation(name) => {
                write!(f, "unterminated invocation of macro '{name}'")
            }
            Self::UnbalancedConditional(directive) => {
                write!(f, "unbalanced conditional: #{directive}")
            }
            Self::InvalidPaste(text) => {
                write!(f, "token paste produced invalid text: {text}")
            }
        }
    }
}

/// Error produced during preprocessing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct PreprocessError {
    pub kind: PreprocessErrorKind,
    pub span: Span,
}

/// A registered macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: String,
    /// `None` for object-like macros, `Some` (possibly empty) for
    /// function-like ones.
    pub params: Option<Vec<String>>,
    pub body: Vec<Token>,
}

#[derive(Debug)]
struct Conditional {
    active: bool,
    parent_active: bool,
    seen_else: bool,
}

/// Expand macros in a token stream with a fresh macro table.
///
/// # Errors
///
/// See [`Preprocessor::run`].
pub fn preprocess(tokens: Vec<Token>) -> Result<Vec<Token>, PreprocessError> {
    Preprocessor::new().run(tokens)
}

/// Per-parse macro table and expansion engine.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    macros: HashMap<String, MacroDefinition>,
    recursion_limit: usize,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            macros: HashMap::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    #[must_use]
    pub const fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Register (or replace) a macro.
    pub fn define(&mut self, definition: MacroDefinition) {
        trace!(name = %definition.name, params = ?definition.params, "registered macro");
        self.macros.insert(definition.name.clone(), definition);
    }

    /// Register a macro whose body is given as source text.
    ///
    /// # Errors
    ///
    /// Returns `LexError` if `body` does not tokenize.
    pub fn define_str(
        &mut self,
        name: &str,
        params: Option<&[&str]>,
        body: &str,
    ) -> Result<(), LexError> {
        let body = tokenize(body)?;
        self.define(MacroDefinition {
            name: name.to_string(),
            params: params.map(|p| p.iter().map(ToString::to_string).collect()),
            body,
        });
        Ok(())
    }

    /// Register `LIST_1(x)` through `LIST_max(x)`, each expanding to
    /// its argument repeated that many times, comma-separated.
    pub fn define_list_macros(&mut self, max: usize) {
        let token = |kind, text: &str| Token {
            kind,
            text: text.to_string(),
            span: Span::default(),
        };
        for n in 1..=max {
            let mut body = Vec::with_capacity(n * 2);
            for i in 0..n {
                if i > 0 {
                    body.push(token(TokenKind::Comma, ","));
                }
                body.push(token(TokenKind::Ident, "x"));
            }
            self.define(MacroDefinition {
                name: format!("LIST_{n}"),
                params: Some(vec!["x".to_string()]),
                body,
            });
        }
    }

    /// Remove a macro. Returns whether it was defined.
    pub fn undefine(&mut self, name: &str) -> bool {
        self.macros.remove(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.macros.get(name)
    }

    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Process directives and expand macros.
    ///
    /// Directives take effect in order: a macro is only expanded in
    /// text that follows its `#define`.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessError` on malformed or unsupported
    /// directives, unbalanced conditionals, bad invocations, or
    /// runaway recursion.
    pub fn run(
        &mut self,
        tokens: impl IntoIterator<Item = Token>,
    ) -> Result<Vec<Token>, PreprocessError> {
        let mut out = Vec::new();
        let mut pending = Vec::new();
        let mut conditionals: Vec<(Conditional, Span)> = Vec::new();
        let mut tokens = tokens.into_iter();

        while let Some(token) = tokens.next() {
            if token.kind != TokenKind::Directive {
                if conditionals.last().is_none_or(|(c, _)| c.active) {
                    pending.push(token);
                }
                continue;
            }

            let line: Vec<Token> = tokens
                .by_ref()
                .take_while(|t| t.kind != TokenKind::DirectiveEnd)
                .collect();

            self.expand(std::mem::take(&mut pending), &mut out)?;
            self.directive(&token, &line, &mut conditionals)?;
        }

        if let Some((_, span)) = conditionals.pop() {
            return Err(PreprocessError {
                kind: PreprocessErrorKind::UnbalancedConditional("endif".to_string()),
                span,
            });
        }

        self.expand(pending, &mut out)?;
        debug!(
            macros = self.macros.len(),
            tokens = out.len(),
            "preprocessed token stream"
        );
        Ok(out)
    }

    fn directive(
        &mut self,
        directive: &Token,
        line: &[Token],
        conditionals: &mut Vec<(Conditional, Span)>,
    ) -> Result<(), PreprocessError> {
        let active = conditionals.last().is_none_or(|(c, _)| c.active);
        let span = directive.span.clone();
        let unbalanced = |name: &str| PreprocessError {
            kind: PreprocessErrorKind::UnbalancedConditional(name.to_string()),
            span: span.clone(),
        };

        match directive.text.as_str() {
            "ifdef" | "ifndef" | "if" => {
                let condition = if active {
                    if directive.text == "if" {
                        return Err(PreprocessError {
                            kind: PreprocessErrorKind::UnsupportedDirective("if".to_string()),
                            span,
                        });
                    }
                    let name = macro_name(directive, line)?;
                    self.is_defined(&name.text) == (directive.text == "ifdef")
                } else {
                    false
                };
                conditionals.push((
                    Conditional {
                        active: active && condition,
                        parent_active: active,
                        seen_else: false,
                    },
                    span,
                ));
            }
            "else" => {
                let Some((top, _)) = conditionals.last_mut() else {
                    return Err(unbalanced("else"));
                };
                if top.seen_else {
                    return Err(unbalanced("else"));
                }
                top.active = top.parent_active && !top.active;
                top.seen_else = true;
            }
            "endif" => {
                if conditionals.pop().is_none() {
                    return Err(unbalanced("endif"));
                }
            }
            _ if !active => {}
            "define" => {
                let definition = parse_define(directive, line)?;
                self.define(definition);
            }
            "undef" => {
                let name = macro_name(directive, line)?;
                if self.undefine(&name.text) {
                    trace!(name = %name.text, "undefined macro");
                }
            }
            "" => {
                return Err(PreprocessError {
                    kind: PreprocessErrorKind::MalformedDirective(
                        "missing directive name".to_string(),
                    ),
                    span,
                });
            }
            other => {
                return Err(PreprocessError {
                    kind: PreprocessErrorKind::UnsupportedDirective(other.to_string()),
                    span,
                });
            }
        }
        Ok(())
    }

    /// Expand `tokens` into `out`. Each expansion is pushed back in
    /// front of the remaining input, so it is rescanned together
    /// with whatever follows the invocation. Every token remembers
    /// how many expansions produced it.
    fn expand(&self, tokens: Vec<Token>, out: &mut Vec<Token>) -> Result<(), PreprocessError> {
        let mut input: VecDeque<(Token, usize)> = tokens.into_iter().map(|t| (t, 0)).collect();

        while let Some((token, depth)) = input.pop_front() {
            let definition = if token.is_word() {
                self.macros.get(&token.text)
            } else {
                None
            };

            let Some(definition) = definition else {
                out.push(token);
                continue;
            };

            let args = match &definition.params {
                None => Vec::new(),
                Some(params) => {
                    if input.front().map(|(t, _)| t.kind) != Some(TokenKind::OpenParen) {
                        // function-like name without arguments is plain text
                        out.push(token);
                        continue;
                    }
                    input.pop_front();
                    let mut args = collect_args(&mut input, &token)?;
                    if params.is_empty() && args.len() == 1 && args[0].is_empty() {
                        args.clear();
                    }
                    if args.len() != params.len() {
                        return Err(PreprocessError {
                            kind: PreprocessErrorKind::ArgumentCount {
                                name: definition.name.clone(),
                                expected: params.len(),
                                found: args.len(),
                            },
                            span: token.span,
                        });
                    }
                    args
                }
            };

            if depth >= self.recursion_limit {
                return Err(PreprocessError {
                    kind: PreprocessErrorKind::RecursionLimit {
                        name: definition.name.clone(),
                        limit: self.recursion_limit,
                    },
                    span: token.span,
                });
            }

            let substituted = substitute(definition, &args, &token.span)?;
            for expanded in substituted.into_iter().rev() {
                input.push_front((expanded, depth + 1));
            }
        }
        Ok(())
    }
}

fn macro_name<'t>(directive: &Token, line: &'t [Token]) -> Result<&'t Token, PreprocessError> {
    match line.first() {
        Some(name) if name.is_word() => Ok(name),
        _ => Err(PreprocessError {
            kind: PreprocessErrorKind::MalformedDirective(format!(
                "#{} requires a macro name",
                directive.text
            )),
            span: directive.span.clone(),
        }),
    }
}

fn parse_define(directive: &Token, line: &[Token]) -> Result<MacroDefinition, PreprocessError> {
    let name = macro_name(directive, line)?;
    if name.kind == TokenKind::Ident {
        return Ok(MacroDefinition {
            name: name.text.clone(),
            params: None,
            body: line[1..].to_vec(),
        });
    }

    // `NAME(` -- parameter list up to the closing paren
    let malformed = |msg: &str| PreprocessError {
        kind: PreprocessErrorKind::MalformedDirective(format!("#define {}: {msg}", name.text)),
        span: name.span.clone(),
    };
    let mut params = Vec::new();
    let mut i = 2;
    loop {
        match line.get(i) {
            Some(t) if t.kind == TokenKind::CloseParen && params.is_empty() => break,
            Some(t) if t.is_word() => params.push(t.text.clone()),
            _ => return Err(malformed("expected parameter name")),
        }
        match line.get(i + 1).map(|t| t.kind) {
            Some(TokenKind::Comma) => i += 2,
            Some(TokenKind::CloseParen) => {
                i += 1;
                break;
            }
            _ => return Err(malformed("expected ',' or ')' in parameter list")),
        }
    }

    Ok(MacroDefinition {
        name: name.text.clone(),
        params: Some(params),
        body: line[i + 1..].to_vec(),
    })
}

/// Split invocation arguments at top-level commas, consuming input
/// up to and including the closing paren. The opening paren must
/// already be consumed.
fn collect_args(
    input: &mut VecDeque<(Token, usize)>,
    call: &Token,
) -> Result<Vec<Vec<Token>>, PreprocessError> {
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;

    while let Some((token, _)) = input.pop_front() {
        match token.kind {
            TokenKind::CloseParen if depth == 0 => {
                args.push(current);
                return Ok(args);
            }
            TokenKind::Comma if depth == 0 => {
                args.push(std::mem::take(&mut current));
            }
            TokenKind::OpenParen => {
                depth += 1;
                current.push(token);
            }
            TokenKind::CloseParen => {
                depth -= 1;
                current.push(token);
            }
            _ => current.push(token),
        }
    }

    Err(PreprocessError {
        kind: PreprocessErrorKind::UnterminatedInvocation(call.text.clone()),
        span: call.span.clone(),
    })
}

/// Replace parameters in a macro body, applying `#` and `##`.
/// Every produced token takes the invocation's span.
fn substitute(
    definition: &MacroDefinition,
    args: &[Vec<Token>],
    span: &Span,
) -> Result<Vec<Token>, PreprocessError> {
    let params = definition.params.as_deref().unwrap_or(&[]);
    let param_index = |t: &Token| {
        if t.is_word() {
            params.iter().position(|p| *p == t.text)
        } else {
            None
        }
    };
    let body = &definition.body;
    let mut out: Vec<Token> = Vec::with_capacity(body.len());
    let mut i = 0;

    while i < body.len() {
        let token = &body[i];

        if token.kind == TokenKind::Hash {
            if body.get(i + 1).map(|t| t.kind) == Some(TokenKind::Hash) {
                let mut right = match body.get(i + 2) {
                    Some(t) => param_index(t).map_or_else(|| vec![t.clone()], |idx| args[idx].clone()),
                    None => Vec::new(),
                };
                let left = out.pop();
                let first = if right.is_empty() {
                    None
                } else {
                    Some(right.remove(0))
                };
                let text = format!(
                    "{}{}",
                    left.map(|t| t.source_text()).unwrap_or_default(),
                    first.map(|t| t.source_text()).unwrap_or_default()
                );
                let pasted = tokenize(&text).map_err(|_| PreprocessError {
                    kind: PreprocessErrorKind::InvalidPaste(text.clone()),
                    span: span.clone(),
                })?;
                out.extend(pasted);
                out.extend(right);
                i += 3;
                continue;
            }
            if let Some(idx) = body.get(i + 1).and_then(param_index) {
                out.push(Token {
                    kind: TokenKind::String,
                    text: stringize(&args[idx]),
                    span: span.clone(),
                });
                i += 2;
                continue;
            }
        }

        match param_index(token) {
            Some(idx) => out.extend(args[idx].iter().cloned()),
            None => out.push(token.clone()),
        }
        i += 1;
    }

    for token in &mut out {
        token.span = span.clone();
    }
    Ok(out)
}

/// Render argument tokens as the text of a string literal.
fn stringize(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            let prev = tokens[i - 1].kind;
            let tight = matches!(
                prev,
                TokenKind::OpenParen | TokenKind::OpenBracket | TokenKind::MacroCall
            ) || matches!(
                token.kind,
                TokenKind::CloseParen
                    | TokenKind::CloseBracket
                    | TokenKind::Comma
                    | TokenKind::Semicolon
            );
            if !tight {
                out.push(' ');
            }
        }
        out.push_str(&token.source_text());
    }
    out
}
