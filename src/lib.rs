//! Lexer, preprocessor, parser, inheritance resolver, and binary
//! codec for class-based game config files (`config.cpp`,
//! `description.ext`, `*.hpp`).
//!
//! Text goes through [`tokenize`], [`preprocess`] and [`parse`] to
//! become a [`ClassTree`]. [`resolve`] links classes to their parents
//! and merges inherited properties; [`encode`] and [`decode`] convert
//! a tree to and from its compact binary ("rapified") form; [`format`]
//! turns a tree back into text.
//!
//! # Quick start
//!
//! ## Parse and resolve
//!
//! ```
//! use rapconf::{Value, parse_str, resolve};
//!
//! let input = "
//!     class Base { items[] = {1, 2}; };
//!     class Derived : Base { items[] += {3}; };
//! ";
//! let tree = parse_str(input).unwrap();
//! let resolved = resolve(&tree).unwrap();
//! let derived = resolved.class("Derived").unwrap().unwrap();
//! assert_eq!(
//!     derived.get("items"),
//!     Some(&Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
//! );
//! ```
//!
//! ## Binary round trip
//!
//! ```
//! use rapconf::{decode, encode, format, parse_str};
//!
//! let tree = parse_str("class CfgPatches { class A { units[] = {}; }; };").unwrap();
//! let bytes = encode(&tree);
//! assert_eq!(decode(&bytes).unwrap(), tree);
//! assert!(format(&tree).starts_with("class CfgPatches\n{\n"));
//! ```
//!
//! ## Build a tree programmatically
//!
//! ```
//! use rapconf::{ClassNode, ClassTree, format};
//!
//! let tree = ClassTree::new().class(
//!     ClassNode::new("Rifleman")
//!         .inherits("Man")
//!         .set("displayName", "Rifleman"),
//! );
//! assert!(format(&tree).contains("class Rifleman: Man"));
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod ast;
pub mod builder;
pub mod codec;
pub mod formatter;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod preprocess;
pub mod query;
pub mod resolve;
pub mod token;

use std::collections::BTreeMap;

pub use ast::{ClassKind, ClassNode, ClassTree, MAX_DEPTH, Operator, Property, Value};
pub use codec::{CodecError, CodecErrorKind, decode, decode_class, encode};
pub use formatter::format;
pub use lexer::{LexError, LexErrorKind, Lexer, tokenize};
pub use options::Options;
pub use parser::{ParseError, ParseErrorKind, parse};
pub use preprocess::{
    MacroDefinition, PreprocessError, PreprocessErrorKind, Preprocessor, preprocess,
};
pub use query::Pattern;
pub use resolve::{ResolveError, ResolveErrorKind, Resolved, ResolvedClass, resolve};
pub use token::{Span, Token, TokenKind};

/// Unified error type covering every stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A lexer error.
    #[error("{0}")]
    Lex(#[from] LexError),
    /// A preprocessor error.
    #[error("{0}")]
    Preprocess(#[from] PreprocessError),
    /// A parser error.
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// An inheritance resolution error.
    #[error("{0}")]
    Resolve(#[from] ResolveError),
    /// A binary decoding error.
    #[error("{0}")]
    Codec(#[from] CodecError),
}

/// Tokenize, preprocess and parse a config source string in one step.
pub fn parse_str(input: &str) -> Result<ClassTree, Error> {
    parse_with(input, &Options::default())
}

/// Like [`parse_str`], with a file name, predefined macros, and
/// limits taken from `options`.
pub fn parse_with(input: &str, options: &Options) -> Result<ClassTree, Error> {
    let tokens = options.lexer(input).collect::<Result<Vec<_>, _>>()?;
    let tokens = options.preprocessor()?.run(tokens)?;
    Ok(parse(&tokens)?)
}

/// Parse `input` and resolve every class, keyed by qualified path.
pub fn load_str(input: &str) -> Result<BTreeMap<String, ResolvedClass>, Error> {
    let tree = parse_str(input)?;
    Ok(resolve(&tree)?.resolve_all()?)
}

/// Parse config text and encode it to binary.
pub fn rapify_str(input: &str) -> Result<Vec<u8>, Error> {
    Ok(encode(&parse_str(input)?))
}

/// Decode binary config and render it as text.
pub fn derap(data: &[u8]) -> Result<String, Error> {
    Ok(format(&decode(data)?))
}
