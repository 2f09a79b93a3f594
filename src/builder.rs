use crate::ast::{ClassKind, ClassNode, ClassTree, Operator, Property, Value};

impl ClassTree {
    /// Create a new empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            properties: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// Add a top-level class statement.
    #[must_use]
    pub fn class(mut self, class: ClassNode) -> Self {
        self.classes.push(class);
        self
    }

    /// Add a file-scope `name = value;` assignment.
    #[must_use]
    pub fn property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.push(Property::new(name, Operator::Set, value));
        self
    }
}

impl ClassNode {
    /// Create a class definition with an empty body.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            kind: ClassKind::Definition,
            properties: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// `class Name;`
    #[must_use]
    pub fn forward(name: &str) -> Self {
        Self {
            kind: ClassKind::Forward,
            ..Self::new(name)
        }
    }

    /// `delete Name;`
    #[must_use]
    pub fn delete(name: &str) -> Self {
        Self {
            kind: ClassKind::Delete,
            ..Self::new(name)
        }
    }

    /// Set the parent class name.
    #[must_use]
    pub fn inherits(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Add a `name = value;` (or `name[] = {...};` for arrays)
    /// assignment.
    #[must_use]
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.push(Property::new(name, Operator::Set, value));
        self
    }

    /// Add a `name[] += {...};` assignment.
    #[must_use]
    pub fn append(mut self, name: &str, items: impl Into<Vec<Value>>) -> Self {
        self.properties.push(Property::new(
            name,
            Operator::Append,
            Value::Array(items.into()),
        ));
        self
    }

    /// Add a `name[] -= {...};` assignment.
    #[must_use]
    pub fn subtract(mut self, name: &str, items: impl Into<Vec<Value>>) -> Self {
        self.properties.push(Property::new(
            name,
            Operator::Subtract,
            Value::Array(items.into()),
        ));
        self
    }

    /// Add a nested class statement.
    #[must_use]
    pub fn class(mut self, class: Self) -> Self {
        self.classes.push(class);
        self
    }
}

impl Property {
    #[must_use]
    pub fn new(name: &str, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            name: name.to_string(),
            operator,
            value: value.into(),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Int(b.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}
