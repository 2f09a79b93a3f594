//! Property-based tests with proptest.
//!
//! Generate random class trees and check that both serializations
//! give the same tree back: `parse(format(tree)) == tree` for text and
//! `decode(encode(tree)) == tree` for binary.
//!
//! Generated trees stay inside what the parser can produce: names are
//! identifiers that avoid the `class`, `delete` and `enum` keywords,
//! array operators only appear on array values, floats are finite,
//! and forward declarations carry no parent.

use proptest::prelude::*;
use rapconf::{
    ClassKind, ClassNode, ClassTree, Operator, Property, Value, decode, encode, format, parse_str,
    tokenize,
};

// -- Leaf strategies --

/// Identifier: letter or underscore start, never a keyword.
fn name() -> impl Strategy<Value = String> {
    "[A-Za-z_][A-Za-z0-9_]{0,12}".prop_filter("keyword", |s| {
        !matches!(
            s.to_ascii_lowercase().as_str(),
            "class" | "delete" | "enum"
        )
    })
}

/// Printable text including quotes and backslashes.
fn text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _.,;:/\\\\\"'{}#-]{0,24}"
}

fn float() -> impl Strategy<Value = f64> {
    prop_oneof![
        -1.0e6..1.0e6f64,
        any::<f64>().prop_filter("finite", |x| x.is_finite()),
    ]
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        float().prop_map(Value::Float),
        text().prop_map(Value::String),
    ]
}

/// Array items, nested up to two levels.
fn items() -> impl Strategy<Value = Vec<Value>> {
    let leaf = scalar();
    let nested = leaf.prop_recursive(2, 16, 4, |inner| {
        prop::collection::vec(inner, 0..=4).prop_map(Value::Array)
    });
    prop::collection::vec(nested, 0..=5)
}

fn property() -> impl Strategy<Value = Property> {
    prop_oneof![
        3 => (name(), scalar()).prop_map(|(name, value)| Property {
            name,
            operator: Operator::Set,
            value,
        }),
        2 => (
            name(),
            prop_oneof![
                Just(Operator::Set),
                Just(Operator::Append),
                Just(Operator::Subtract),
            ],
            items(),
        )
            .prop_map(|(name, operator, items)| Property {
                name,
                operator,
                value: Value::Array(items),
            }),
    ]
}

fn properties() -> impl Strategy<Value = Vec<Property>> {
    prop::collection::vec(property(), 0..=4)
}

/// Class statement at a given depth (limits recursion)
fn class(depth: u32) -> impl Strategy<Value = ClassNode> {
    let forward = name().prop_map(|n| ClassNode::forward(&n));
    let delete = name().prop_map(|n| ClassNode::delete(&n));
    let leaf = (name(), prop::option::of(name()), properties()).prop_map(
        |(name, parent, properties)| ClassNode {
            name,
            parent,
            kind: ClassKind::Definition,
            properties,
            classes: Vec::new(),
        },
    );

    if depth == 0 {
        prop_oneof![
            4 => leaf,
            1 => forward,
            1 => delete,
        ]
        .boxed()
    } else {
        let with_body = (
            name(),
            prop::option::of(name()),
            properties(),
            prop::collection::vec(class(depth - 1), 0..=3),
        )
            .prop_map(|(name, parent, properties, classes)| ClassNode {
                name,
                parent,
                kind: ClassKind::Definition,
                properties,
                classes,
            });

        prop_oneof![
            3 => leaf,
            3 => with_body,
            1 => forward,
            1 => delete,
        ]
        .boxed()
    }
}

/// Full tree
fn tree() -> impl Strategy<Value = ClassTree> {
    (properties(), prop::collection::vec(class(2), 0..=4))
        .prop_map(|(properties, classes)| ClassTree {
            properties,
            classes,
        })
}

// -- Property tests --

proptest! {
    /// Text round-trip: parse(format(tree)) == tree.
    #[test]
    fn format_then_parse(tree in tree()) {
        let formatted = format(&tree);
        let parsed = parse_str(&formatted)
            .map_err(|e| {
                TestCaseError::fail(
                    std::format!("parse error: {e}\n--- output ---\n{formatted}"))
            })?;
        prop_assert_eq!(parsed, tree);
    }

    /// Formatting is idempotent.
    #[test]
    fn format_idempotent(tree in tree()) {
        let once = format(&tree);
        let parsed = parse_str(&once).unwrap();
        prop_assert_eq!(format(&parsed), once);
    }

    /// Binary round-trip: decode(encode(tree)) == tree.
    #[test]
    fn encode_then_decode(tree in tree()) {
        let bytes = encode(&tree);
        let decoded = decode(&bytes)
            .map_err(|e| TestCaseError::fail(std::format!("decode error: {e}")))?;
        prop_assert_eq!(decoded, tree);
    }

    /// Every strict prefix of an encoding is rejected.
    #[test]
    fn truncated_encoding_fails(tree in tree(), cut in any::<prop::sample::Index>()) {
        let bytes = encode(&tree);
        let len = cut.index(bytes.len());
        prop_assert!(decode(&bytes[..len]).is_err());
    }

    /// Arbitrary bytes never panic the decoder.
    #[test]
    fn decode_arbitrary_bytes(mut bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        if bytes.len() >= 8 {
            bytes[..4].copy_from_slice(rapconf::codec::MAGIC);
            bytes[4..8].copy_from_slice(&rapconf::codec::VERSION.to_le_bytes());
        }
        let _ = decode(&bytes);
    }

    /// A doubled quote inside a string literal lexes to one quote.
    #[test]
    fn doubled_quotes_lex_back(s in ".{0,32}") {
        let literal = std::format!("\"{}\"", s.replace('"', "\"\""));
        let tokens = tokenize(&literal)
            .map_err(|e| TestCaseError::fail(std::format!("lex error: {e}")))?;
        prop_assert_eq!(tokens.len(), 1);
        prop_assert_eq!(&tokens[0].text, &s);
    }

    /// Class statement count survives the text round-trip.
    #[test]
    fn class_count_preserved(tree in tree()) {
        let parsed = parse_str(&format(&tree)).unwrap();
        prop_assert_eq!(tree.class_count(), parsed.class_count());
    }
}
