//! Show the error each pipeline stage reports for bad input.

fn report(input: &str) {
    match rapconf::load_str(input) {
        Ok(classes) => println!("Loaded {} classes", classes.len()),
        Err(rapconf::Error::Lex(e)) => {
            println!("Lex error: {e}");
            println!("  Location: line {}, column {}", e.span.line, e.span.column);
        }
        Err(rapconf::Error::Preprocess(e)) => {
            println!("Preprocess error: {e}");
            println!("  Kind: {:?}", e.kind);
        }
        Err(rapconf::Error::Parse(e)) => {
            println!("Parse error: {e}");
            println!("  Kind: {:?}", e.kind);
        }
        Err(rapconf::Error::Resolve(e)) => {
            println!("Resolve error: {e}");
            println!("  Class: {}", e.path);
        }
        Err(rapconf::Error::Codec(e)) => println!("Codec error: {e}"),
    }
}

fn main() {
    // Unterminated string
    report("class A { name = \"unclosed; };");
    // Wrong macro arity
    report("#define PAIR(a, b) a, b\nclass A { x[] = {PAIR(1)}; };");
    // Missing semicolon
    report("class A { x = 1 };");
    // Inheritance cycle
    report("class A : B {}; class B : A {};");

    println!();
    match rapconf::derap(b"not binary") {
        Ok(_) => println!("Decoded OK (unexpected)"),
        Err(e) => println!("{e}"),
    }
}
