use std::sync::Arc;

use crate::lexer::{LexError, Lexer};
use crate::preprocess::{DEFAULT_RECURSION_LIMIT, Preprocessor};

/// Settings for one parse.
///
/// ```
/// use rapconf::{Options, parse_with};
///
/// let options = Options::new()
///     .file("loadout.hpp")
///     .define("SIDE", "1")
///     .list_macros(10);
/// let tree = parse_with("side = SIDE; items[] = {LIST_2(\"mag\")};", &options).unwrap();
/// assert_eq!(tree.properties.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    file: Option<Arc<str>>,
    recursion_limit: usize,
    macros: Vec<Predefined>,
    list_macros: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Predefined {
    name: String,
    params: Option<Vec<String>>,
    body: String,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            file: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            macros: Vec::new(),
            list_macros: 0,
        }
    }

    /// Name reported in every error span.
    #[must_use]
    pub fn file(mut self, name: &str) -> Self {
        self.file = Some(name.into());
        self
    }

    /// Deepest macro expansion before giving up.
    #[must_use]
    pub const fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Predefine an object-like macro, as if by `#define NAME body`.
    #[must_use]
    pub fn define(mut self, name: &str, body: &str) -> Self {
        self.macros.push(Predefined {
            name: name.to_string(),
            params: None,
            body: body.to_string(),
        });
        self
    }

    /// Predefine a function-like macro.
    #[must_use]
    pub fn define_fn(mut self, name: &str, params: &[&str], body: &str) -> Self {
        self.macros.push(Predefined {
            name: name.to_string(),
            params: Some(params.iter().map(ToString::to_string).collect()),
            body: body.to_string(),
        });
        self
    }

    /// Predefine `LIST_1(x)` through `LIST_max(x)`.
    #[must_use]
    pub const fn list_macros(mut self, max: usize) -> Self {
        self.list_macros = max;
        self
    }

    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Lexer over `input` stamping spans with the configured file.
    #[must_use]
    pub fn lexer<'a>(&self, input: &'a str) -> Lexer<'a> {
        Lexer::new(input).with_file(self.file.clone())
    }

    /// A fresh preprocessor seeded with the predefined macros.
    ///
    /// # Errors
    ///
    /// Returns `LexError` if a predefined macro body does not tokenize.
    pub fn preprocessor(&self) -> Result<Preprocessor, LexError> {
        let mut preprocessor = Preprocessor::new().with_recursion_limit(self.recursion_limit);
        preprocessor.define_list_macros(self.list_macros);
        for predefined in &self.macros {
            let params: Option<Vec<&str>> = predefined
                .params
                .as_ref()
                .map(|p| p.iter().map(String::as_str).collect());
            preprocessor.define_str(&predefined.name, params.as_deref(), &predefined.body)?;
        }
        Ok(preprocessor)
    }
}
