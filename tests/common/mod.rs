#![allow(dead_code)]

use rapconf::{ClassTree, Options, decode, encode, format, parse_str, parse_with};

pub const COMPLEX: &str = include_str!("../fixtures/complex.cpp");
pub const LOADOUT: &str = include_str!("../fixtures/loadout.hpp");

pub fn parse_complex() -> ClassTree {
    parse_with(COMPLEX, &Options::new().file("complex.cpp")).expect("complex.cpp failed to parse")
}

pub fn parse_loadout() -> ClassTree {
    parse_with(LOADOUT, &Options::new().file("loadout.hpp").list_macros(30))
        .expect("loadout.hpp failed to parse")
}

/// Helper: parse config text, format it, assert the output is
/// byte-identical to the input.
pub fn roundtrip(input: &str) {
    let tree = parse_str(input).expect("parse failed");
    let output = format(&tree);
    assert_eq!(
        output, input,
        "round-trip mismatch:\n--- expected ---\n{input}\n--- got ---\n{output}"
    );
}

/// Helper: format a tree, parse it back, assert structural equality.
pub fn assert_ast_roundtrip(original: &ClassTree) {
    let formatted = format(original);
    let parsed = parse_str(&formatted).unwrap_or_else(|e| {
        panic!(
            "failed to re-parse formatted output: {e}\n\
             --- formatted ---\n{formatted}"
        )
    });

    assert_eq!(
        original.properties, parsed.properties,
        "properties mismatch\n--- formatted ---\n{formatted}"
    );
    assert_eq!(
        original.classes, parsed.classes,
        "classes mismatch\n--- formatted ---\n{formatted}"
    );
}

/// Helper: encode a tree, decode it back, assert equality.
pub fn assert_binary_roundtrip(original: &ClassTree) {
    let bytes = encode(original);
    let decoded = decode(&bytes).unwrap_or_else(|e| panic!("failed to decode: {e}"));
    assert_eq!(&decoded, original, "binary round-trip mismatch");
}
