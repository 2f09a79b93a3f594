//! Class tree produced by the parser and consumed by the resolver,
//! formatter, and binary codec.
//!
//! The tree is plain data: it carries no source positions so that
//! trees decoded from binary compare equal to trees parsed from text.

use std::fmt;

use crate::token::quote;

/// Deepest class and array nesting a tree may have. The parser
/// rejects deeper input and the decoder refuses deeper records.
pub const MAX_DEPTH: usize = 256;

/// A parsed config file: file-scope properties (including `enum`
/// entries) and top-level classes, in file order.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassTree {
    pub properties: Vec<Property>,
    pub classes: Vec<ClassNode>,
}

/// What a class statement declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClassKind {
    /// `class Name [: Parent] { ... };` or `class Name : Parent;`
    Definition,
    /// `class Name;` -- an opaque external reference.
    Forward,
    /// `delete Name;`
    Delete,
}

/// A class statement and its body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassNode {
    pub name: String,
    /// Parent name as written; resolved later, never by the parser.
    pub parent: Option<String>,
    pub kind: ClassKind,
    pub properties: Vec<Property>,
    pub classes: Vec<Self>,
}

/// Assignment operator of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operator {
    /// `=`
    Set,
    /// `+=` (arrays only)
    Append,
    /// `-=` (arrays only)
    Subtract,
}

impl Operator {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Set => "=",
            Self::Append => "+=",
            Self::Subtract => "-=",
        }
    }
}

/// `name = value;` or `name[] op {...};`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Property {
    pub name: String,
    pub operator: Operator,
    pub value: Value,
}

impl Property {
    /// Whether the property was declared with `[]`.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self.value, Value::Array(_))
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Self>),
}

impl Value {
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value of an integer or float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Equality used by `-=`. Integers and floats compare exactly; a
    /// float matches an integer only when it holds that integer's
    /// value with no fraction.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(n), Self::Float(x)) | (Self::Float(x), Self::Int(n)) => {
                float_is_int(*x, *n)
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.matches(y))
            }
            _ => false,
        }
    }
}

#[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
fn float_is_int(x: f64, n: i64) -> bool {
    // 2^63, the first float past `i64::MAX`
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    x.fract() == 0.0 && (-LIMIT..LIMIT).contains(&x) && x as i64 == n
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            // out-of-range literals overflow back to infinity
            Self::Float(x) if x.is_infinite() => {
                f.write_str(if x.is_sign_negative() { "-1e999" } else { "1e999" })
            }
            // Debug keeps a `.0` or exponent so floats stay floats
            Self::Float(x) => write!(f, "{x:?}"),
            Self::String(s) => f.write_str(&quote(s)),
            Self::Array(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl ClassNode {
    /// Class names compare without regard to ASCII case.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// First nested class statement with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.classes.iter().find(|c| c.is_named(name))
    }

    /// Last assignment to `name` written directly in this body.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .rev()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

impl ClassTree {
    /// Follow a `/`-separated path of class names (case-insensitive),
    /// taking the first matching statement at each level.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&ClassNode> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut node = self.classes.iter().find(|c| c.is_named(first))?;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Total number of class statements at every depth.
    #[must_use]
    pub fn class_count(&self) -> usize {
        fn count(classes: &[ClassNode]) -> usize {
            classes.iter().map(|c| 1 + count(&c.classes)).sum()
        }
        count(&self.classes)
    }
}
