//! Pretty-printer that serializes a class tree back into config text.
//!
//! Output follows the layout of derapped configs: tab indentation,
//! braces on their own line, and numeral-named properties grouped
//! into `enum` blocks since they cannot be written as assignments.

use std::fmt::Write as _;

use crate::ast::{ClassKind, ClassNode, ClassTree, Property};
use crate::lexer::is_number;

/// Format a `ClassTree` as config text.
///
/// Parsing the output yields a tree equal to the input for any tree
/// the parser can produce. Hex literals come back as decimals and
/// bare-word values come back quoted.
#[must_use]
pub fn format(tree: &ClassTree) -> String {
    let mut out = String::new();
    format_body(&mut out, &tree.properties, &tree.classes, 0);

    // Trailing newline
    if !out.ends_with('\n') {
        out.push('\n');
    }

    out
}

fn format_body(out: &mut String, properties: &[Property], classes: &[ClassNode], indent: usize) {
    let prefix = "\t".repeat(indent);

    let mut rest = properties;
    while let Some(first) = rest.first() {
        if is_number(&first.name) {
            let run = rest.iter().take_while(|p| is_number(&p.name)).count();
            format_enum(out, &rest[..run], &prefix);
            rest = &rest[run..];
        } else {
            format_property(out, first, &prefix);
            rest = &rest[1..];
        }
    }

    for (i, class) in classes.iter().enumerate() {
        // Blank line between top-level blocks
        if indent == 0 && (i > 0 || !properties.is_empty()) {
            out.push('\n');
        }
        format_class(out, class, indent);
    }
}

fn format_property(out: &mut String, property: &Property, prefix: &str) {
    let brackets = if property.is_array() { "[]" } else { "" };
    let _ = writeln!(
        out,
        "{prefix}{}{brackets} {} {};",
        property.name,
        property.operator.symbol(),
        property.value
    );
}

fn format_enum(out: &mut String, entries: &[Property], prefix: &str) {
    out.push_str(prefix);
    out.push_str("enum {\n");
    for (i, entry) in entries.iter().enumerate() {
        let separator = if i + 1 < entries.len() { "," } else { "" };
        let _ = writeln!(out, "{prefix}\t{} = {}{separator}", entry.name, entry.value);
    }
    out.push_str(prefix);
    out.push_str("};\n");
}

fn format_class(out: &mut String, class: &ClassNode, indent: usize) {
    let prefix = "\t".repeat(indent);
    out.push_str(&prefix);

    match class.kind {
        ClassKind::Delete => {
            let _ = writeln!(out, "delete {};", class.name);
            return;
        }
        ClassKind::Forward => {
            let _ = writeln!(out, "class {};", class.name);
            return;
        }
        ClassKind::Definition => {}
    }

    out.push_str("class ");
    out.push_str(&class.name);
    if let Some(parent) = &class.parent {
        out.push_str(": ");
        out.push_str(parent);
    }

    if class.properties.is_empty() && class.classes.is_empty() {
        out.push_str(" {};\n");
        return;
    }

    out.push('\n');
    out.push_str(&prefix);
    out.push_str("{\n");
    format_body(out, &class.properties, &class.classes, indent + 1);
    out.push_str(&prefix);
    out.push_str("};\n");
}
